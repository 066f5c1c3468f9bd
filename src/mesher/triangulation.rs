// SPDX-License-Identifier: Apache-2.0
// Copyright (c) 2025 Polyframe Inc.

//! Incremental 3D (weighted) Delaunay triangulation
//!
//! Cells live in an arena addressed by stable indices; removed cells go to a
//! free list and are recycled by later insertions. Every live cell is
//! positively oriented and `neighbors[i]` is the cell across the face
//! opposite `vertices[i]`. The triangulation is seeded with a large
//! auxiliary tetrahedron so every inserted point lies strictly inside the
//! convex hull; the four auxiliary vertices are ids 0..4.
//!
//! Insertion is Bowyer-Watson with the exact [`power_test`], which reduces
//! to the in-sphere test while all weights are zero.

use crate::domain::{SubdomainId, BACKGROUND};
use crate::error::{MeshError, MeshResult};
use crate::geometry::quality::{centroid, weighted_circumcenter};
use crate::geometry::robust_predicates::{orient3d, power_test, Orientation};
use crate::geometry::BoundingBox;
use ahash::{AHashMap, AHashSet};
use nalgebra::Point3;
use std::collections::VecDeque;

pub type VertexId = usize;
pub type CellId = usize;

/// Number of auxiliary (bounding) vertices
pub const AUXILIARY_VERTICES: usize = 4;

/// Outward-oriented vertex triples of the face opposite each cell vertex
pub const FACE_VERTICES: [[usize; 3]; 4] = [[1, 2, 3], [0, 3, 2], [0, 1, 3], [0, 2, 1]];

/// Role of a vertex in the mesh
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum VertexKind {
    /// Corner of the bounding tetrahedron, never part of the output
    Auxiliary,
    /// Lies on a domain boundary patch
    Surface,
    /// Strictly inside a subdomain
    Interior,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Vertex {
    pub point: Point3<f64>,
    pub weight: f64,
    pub kind: VertexKind,
}

#[derive(Debug, Clone)]
pub struct Cell {
    pub vertices: [VertexId; 4],
    pub neighbors: [Option<CellId>; 4],
    /// Orthocenter of the weighted corners (circumcenter when unweighted)
    pub center: Point3<f64>,
    pub label: SubdomainId,
    generation: u32,
    alive: bool,
}

/// Outcome of a point insertion
#[derive(Debug, Clone, PartialEq)]
pub enum Insertion {
    Inserted { vertex: VertexId, cells: Vec<CellId> },
    /// The point coincides with an existing vertex
    Duplicate(VertexId),
    /// The weighted point conflicts with no cell
    Hidden,
}

/// Cavity face collected before the conflict zone is removed
struct CavityFace {
    vertices: [VertexId; 4],
    slot: usize,
    outer: Option<(CellId, usize)>,
}

#[derive(Debug, Clone)]
pub struct Triangulation {
    vertices: Vec<Vertex>,
    cells: Vec<Cell>,
    free: Vec<CellId>,
    live: usize,
    hint: CellId,
}

impl Triangulation {
    /// Empty triangulation whose auxiliary tetrahedron encloses `bbox` with room to spare
    pub fn new(bbox: &BoundingBox) -> MeshResult<Self> {
        if bbox.is_empty() || !bbox.min.coords.iter().chain(bbox.max.coords.iter()).all(|c| c.is_finite()) {
            return Err(MeshError::degenerate("cannot triangulate an empty or unbounded region"));
        }
        let c = bbox.center();
        let r = 4.0 * bbox.diagonal().max(f64::EPSILON * c.coords.amax()).max(1e-6);
        let corners = [
            Point3::new(c.x - r, c.y - r, c.z - r),
            Point3::new(c.x + 5.0 * r, c.y - r, c.z - r),
            Point3::new(c.x - r, c.y + 5.0 * r, c.z - r),
            Point3::new(c.x - r, c.y - r, c.z + 5.0 * r),
        ];
        let mut tri = Self {
            vertices: corners
                .iter()
                .map(|&point| Vertex {
                    point,
                    weight: 0.0,
                    kind: VertexKind::Auxiliary,
                })
                .collect(),
            cells: Vec::new(),
            free: Vec::new(),
            live: 0,
            hint: 0,
        };
        tri.reset_cells();
        Ok(tri)
    }

    fn reset_cells(&mut self) {
        self.cells.clear();
        self.free.clear();
        self.live = 0;
        self.hint = self.allocate([0, 1, 2, 3], [None; 4]);
    }

    pub fn vertex_count(&self) -> usize {
        self.vertices.len()
    }

    pub fn vertex(&self, v: VertexId) -> &Vertex {
        &self.vertices[v]
    }

    pub fn vertices(&self) -> &[Vertex] {
        &self.vertices
    }

    pub fn is_auxiliary(&self, v: VertexId) -> bool {
        v < AUXILIARY_VERTICES
    }

    pub fn cell_count(&self) -> usize {
        self.live
    }

    pub fn cell(&self, c: CellId) -> &Cell {
        &self.cells[c]
    }

    pub fn is_alive(&self, c: CellId) -> bool {
        c < self.cells.len() && self.cells[c].alive
    }

    /// Generation counter of a cell slot; changes whenever the slot is recycled
    pub fn generation(&self, c: CellId) -> u32 {
        self.cells[c].generation
    }

    /// Live cells in arena order
    pub fn cells(&self) -> impl Iterator<Item = CellId> + '_ {
        self.cells.iter().enumerate().filter(|(_, cell)| cell.alive).map(|(id, _)| id)
    }

    pub fn set_label(&mut self, c: CellId, label: SubdomainId) {
        self.cells[c].label = label;
    }

    pub fn points(&self, c: CellId) -> [Point3<f64>; 4] {
        self.cells[c].vertices.map(|v| self.vertices[v].point)
    }

    pub fn has_auxiliary_vertex(&self, c: CellId) -> bool {
        self.cells[c].vertices.iter().any(|&v| self.is_auxiliary(v))
    }

    /// Outward-oriented vertices of the face opposite corner `i`
    pub fn face_vertices(&self, c: CellId, i: usize) -> [VertexId; 3] {
        let cell = &self.cells[c];
        FACE_VERTICES[i].map(|k| cell.vertices[k])
    }

    /// The neighbor across face `i` and the index of the shared face in it
    pub fn mirror(&self, c: CellId, i: usize) -> Option<(CellId, usize)> {
        let n = self.cells[c].neighbors[i]?;
        let j = self.cells[n].neighbors.iter().position(|&x| x == Some(c))?;
        Some((n, j))
    }

    /// Move a vertex; call [`Triangulation::retriangulate`] before querying cells again
    pub fn set_point(&mut self, v: VertexId, point: Point3<f64>) {
        self.vertices[v].point = point;
    }

    /// Change a vertex weight; call [`Triangulation::retriangulate`] before querying cells again
    pub fn set_weight(&mut self, v: VertexId, weight: f64) {
        self.vertices[v].weight = weight;
    }

    pub fn has_weights(&self) -> bool {
        self.vertices.iter().any(|v| v.weight != 0.0)
    }

    fn allocate(&mut self, vertices: [VertexId; 4], neighbors: [Option<CellId>; 4]) -> CellId {
        let tet = vertices.map(|v| self.vertices[v].point);
        let weights = vertices.map(|v| self.vertices[v].weight);
        let center = weighted_circumcenter(&tet, &weights).unwrap_or_else(|| centroid(&tet));
        self.live += 1;

        if let Some(id) = self.free.pop() {
            let cell = &mut self.cells[id];
            cell.vertices = vertices;
            cell.neighbors = neighbors;
            cell.center = center;
            cell.label = BACKGROUND;
            cell.alive = true;
            id
        } else {
            self.cells.push(Cell {
                vertices,
                neighbors,
                center,
                label: BACKGROUND,
                generation: 0,
                alive: true,
            });
            self.cells.len() - 1
        }
    }

    fn release(&mut self, c: CellId) {
        let cell = &mut self.cells[c];
        cell.alive = false;
        cell.generation = cell.generation.wrapping_add(1);
        self.free.push(c);
        self.live -= 1;
    }

    /// Orientation of the cell with corner `i` replaced by `p`
    fn orient_with(&self, c: CellId, i: usize, p: &Point3<f64>) -> Orientation {
        let mut pts = self.points(c);
        pts[i] = *p;
        orient3d(&pts[0], &pts[1], &pts[2], &pts[3])
    }

    fn contains(&self, c: CellId, p: &Point3<f64>) -> bool {
        (0..4).all(|i| self.orient_with(c, i, p) != Orientation::Negative)
    }

    /// Find a cell whose closure contains `p`
    pub fn locate(&self, p: &Point3<f64>) -> MeshResult<CellId> {
        let mut current = if self.is_alive(self.hint) {
            self.hint
        } else {
            self.cells().next().ok_or_else(|| MeshError::degenerate("triangulation has no cells"))?
        };

        let max_steps = 4 * self.live + 16;
        'walk: for step in 0..max_steps {
            for k in 0..4 {
                let i = (k + step) % 4;
                if self.orient_with(current, i, p) == Orientation::Negative {
                    match self.cells[current].neighbors[i] {
                        Some(next) => {
                            current = next;
                            continue 'walk;
                        }
                        None => {
                            return Err(MeshError::degenerate(format!(
                                "point ({}, {}, {}) lies outside the triangulated region",
                                p.x, p.y, p.z
                            )))
                        }
                    }
                }
            }
            return Ok(current);
        }

        self.cells()
            .find(|&c| self.contains(c, p))
            .ok_or_else(|| MeshError::degenerate("point location failed"))
    }

    /// Whether the weighted point `(p, w)` conflicts with cell `c`
    pub fn in_conflict(&self, c: CellId, p: &Point3<f64>, w: f64) -> bool {
        let cell = &self.cells[c];
        let corners = cell.vertices.map(|v| &self.vertices[v]);
        power_test(
            [
                (&corners[0].point, corners[0].weight),
                (&corners[1].point, corners[1].weight),
                (&corners[2].point, corners[2].weight),
                (&corners[3].point, corners[3].weight),
            ],
            (p, w),
        ) == Orientation::Positive
    }

    fn duplicate_of(&self, c: CellId, p: &Point3<f64>) -> Option<VertexId> {
        self.cells[c].vertices.iter().copied().find(|&v| self.vertices[v].point == *p)
    }

    /// Cells that inserting `(p, w)` would remove, in breadth-first order
    ///
    /// Empty when the point duplicates a vertex or would be hidden.
    pub fn conflict_zone(&self, p: &Point3<f64>, w: f64) -> MeshResult<Vec<CellId>> {
        let seed = self.locate(p)?;
        if self.duplicate_of(seed, p).is_some() || !self.in_conflict(seed, p, w) {
            return Ok(Vec::new());
        }
        Ok(self.grow_zone(seed, p, w))
    }

    fn grow_zone(&self, seed: CellId, p: &Point3<f64>, w: f64) -> Vec<CellId> {
        let mut zone = vec![seed];
        let mut seen: AHashSet<CellId> = AHashSet::new();
        seen.insert(seed);
        let mut queue = VecDeque::from([seed]);
        while let Some(c) = queue.pop_front() {
            for n in self.cells[c].neighbors.iter().flatten() {
                if seen.insert(*n) && self.in_conflict(*n, p, w) {
                    zone.push(*n);
                    queue.push_back(*n);
                }
            }
        }
        zone
    }

    /// Insert a new vertex
    pub fn insert(&mut self, point: Point3<f64>, weight: f64, kind: VertexKind) -> MeshResult<Insertion> {
        if !point.coords.iter().all(|c| c.is_finite()) {
            return Err(MeshError::degenerate("cannot insert a non-finite point"));
        }
        self.vertices.push(Vertex { point, weight, kind });
        let vertex = self.vertices.len() - 1;
        let outcome = self.insert_vertex(vertex);
        if !matches!(outcome, Ok(Insertion::Inserted { .. })) {
            self.vertices.pop();
        }
        outcome
    }

    /// Star an existing vertex id into the triangulation
    fn insert_vertex(&mut self, vertex: VertexId) -> MeshResult<Insertion> {
        let p = self.vertices[vertex].point;
        let w = self.vertices[vertex].weight;
        let seed = self.locate(&p)?;
        if let Some(existing) = self.duplicate_of(seed, &p) {
            return Ok(Insertion::Duplicate(existing));
        }
        if !self.in_conflict(seed, &p, w) {
            return Ok(Insertion::Hidden);
        }
        let zone = self.grow_zone(seed, &p, w);
        let cells = self.fill_cavity(&zone, vertex);
        Ok(Insertion::Inserted { vertex, cells })
    }

    /// Replace the conflict zone by the star of `vertex`
    fn fill_cavity(&mut self, zone: &[CellId], vertex: VertexId) -> Vec<CellId> {
        let in_zone: AHashSet<CellId> = zone.iter().copied().collect();

        let mut faces = Vec::new();
        for &c in zone {
            for i in 0..4 {
                let outer = match self.cells[c].neighbors[i] {
                    Some(n) if in_zone.contains(&n) => continue,
                    Some(n) => self.cells[n].neighbors.iter().position(|&x| x == Some(c)).map(|j| (n, j)),
                    None => None,
                };
                let mut vertices = self.cells[c].vertices;
                vertices[i] = vertex;
                faces.push(CavityFace { vertices, slot: i, outer });
            }
        }

        for &c in zone {
            self.release(c);
        }

        let mut created = Vec::with_capacity(faces.len());
        let mut open_faces: AHashMap<(VertexId, VertexId), (CellId, usize)> = AHashMap::new();
        for face in &faces {
            let mut neighbors = [None; 4];
            neighbors[face.slot] = face.outer.map(|(n, _)| n);
            let id = self.allocate(face.vertices, neighbors);
            if let Some((n, j)) = face.outer {
                self.cells[n].neighbors[j] = Some(id);
            }

            for j in (0..4).filter(|&j| j != face.slot) {
                let mut others = (0..4).filter(|&k| k != face.slot && k != j).map(|k| face.vertices[k]);
                let (Some(a), Some(b)) = (others.next(), others.next()) else {
                    continue;
                };
                let key = (a.min(b), a.max(b));
                if let Some((other, k)) = open_faces.remove(&key) {
                    self.cells[id].neighbors[j] = Some(other);
                    self.cells[other].neighbors[k] = Some(id);
                } else {
                    open_faces.insert(key, (id, j));
                }
            }
            created.push(id);
        }

        if let Some(&first) = created.first() {
            self.hint = first;
        }
        created
    }

    /// Rebuild every cell from the current vertex positions and weights
    ///
    /// Vertex ids are preserved. Returns the ids of vertices that ended up
    /// in no cell (hidden by heavier neighbours or duplicated).
    pub fn retriangulate(&mut self) -> MeshResult<Vec<VertexId>> {
        self.reset_cells();
        for v in self.insertion_order() {
            self.insert_vertex(v)?;
        }

        let mut used = vec![false; self.vertices.len()];
        for c in self.cells() {
            for &v in &self.cells[c].vertices {
                used[v] = true;
            }
        }
        Ok((AUXILIARY_VERTICES..self.vertices.len()).filter(|&v| !used[v]).collect())
    }

    /// Non-auxiliary vertices sorted along a Morton curve for local walks
    fn insertion_order(&self) -> Vec<VertexId> {
        let bbox = BoundingBox::from_points(self.vertices[AUXILIARY_VERTICES..].iter().map(|v| &v.point));
        let size = bbox.size();
        let scale = |value: f64, lo: f64, extent: f64| -> u64 {
            if extent <= 0.0 {
                0
            } else {
                (((value - lo) / extent).clamp(0.0, 1.0) * 1_048_575.0) as u64
            }
        };
        let mut keyed: Vec<(u64, VertexId)> = (AUXILIARY_VERTICES..self.vertices.len())
            .map(|v| {
                let p = &self.vertices[v].point;
                let code = morton3(
                    scale(p.x, bbox.min.x, size.x),
                    scale(p.y, bbox.min.y, size.y),
                    scale(p.z, bbox.min.z, size.z),
                );
                (code, v)
            })
            .collect();
        keyed.sort_unstable();
        keyed.into_iter().map(|(_, v)| v).collect()
    }

    /// Cells incident to each vertex, in arena order
    pub fn vertex_stars(&self) -> Vec<Vec<CellId>> {
        let mut stars = vec![Vec::new(); self.vertices.len()];
        for c in self.cells() {
            for &v in &self.cells[c].vertices {
                stars[v].push(c);
            }
        }
        stars
    }

    /// Every live cell is locally (weighted) Delaunay with respect to its neighbours
    pub fn is_delaunay(&self) -> bool {
        self.cells().all(|c| {
            (0..4).all(|i| match self.mirror(c, i) {
                Some((n, j)) => {
                    let v = &self.vertices[self.cells[n].vertices[j]];
                    !self.in_conflict(c, &v.point, v.weight)
                }
                None => true,
            })
        })
    }

    /// Structural check: orientation and neighbour symmetry
    pub fn is_valid(&self) -> bool {
        self.cells().all(|c| {
            let p = self.points(c);
            if orient3d(&p[0], &p[1], &p[2], &p[3]) != Orientation::Positive {
                return false;
            }
            (0..4).all(|i| match self.cells[c].neighbors[i] {
                None => true,
                Some(n) => {
                    if !self.is_alive(n) {
                        return false;
                    }
                    let Some((_, j)) = self.mirror(c, i) else {
                        return false;
                    };
                    let mut mine = self.face_vertices(c, i);
                    let mut theirs = self.face_vertices(n, j);
                    mine.sort_unstable();
                    theirs.sort_unstable();
                    mine == theirs
                }
            })
        })
    }
}

/// Interleave the low 21 bits of three coordinates
fn morton3(x: u64, y: u64, z: u64) -> u64 {
    fn spread(mut v: u64) -> u64 {
        v &= 0x1f_ffff;
        v = (v | (v << 32)) & 0x1f00000000ffff;
        v = (v | (v << 16)) & 0x1f0000ff0000ff;
        v = (v | (v << 8)) & 0x100f00f00f00f00f;
        v = (v | (v << 4)) & 0x10c30c30c30c30c3;
        v = (v | (v << 2)) & 0x1249249249249249;
        v
    }
    spread(x) | (spread(y) << 1) | (spread(z) << 2)
}
