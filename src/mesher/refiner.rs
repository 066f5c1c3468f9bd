// SPDX-License-Identifier: Apache-2.0
// Copyright (c) 2025 Polyframe Inc.

//! Delaunay refinement against a [`MeshDomain`]
//!
//! The refiner grows a Delaunay triangulation until every restricted facet
//! (a face whose two cells lie in different subdomains) and every cell
//! inside the domain satisfy the [`RefinementCriteria`]. Facets are always
//! refined before cells; a cell whose circumcenter would fall inside the
//! surface Delaunay ball of a restricted facet refines that facet instead.

use super::criteria::{CellSize, RefinementCriteria, TOPOLOGY_SEVERITY};
use super::queue::WorkQueue;
use super::triangulation::{CellId, Insertion, Triangulation, VertexId, VertexKind};
use crate::domain::{MeshDomain, SubdomainId, SurfacePatchId, BACKGROUND};
use crate::error::{MeshError, MeshResult};
use crate::geometry::quality::circumcenter;
use crate::geometry::{BoundaryFacet, TetCell, TetMesh};
use ahash::AHashSet;
use nalgebra::Point3;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

/// Insertion budget used when none is configured
pub const DEFAULT_MAX_INSERTIONS: usize = 500_000;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RefinementState {
    Initial,
    FacetRefinement,
    CellRefinement,
    Converged,
}

/// Counters collected while refining
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RefinementStats {
    /// Seed points that made it into the triangulation
    pub initial_points: usize,
    /// Refinement points inserted
    pub insertions: usize,
    pub facet_refinements: usize,
    pub cell_refinements: usize,
    /// Cell refinements redirected to an encroached facet
    pub encroachments: usize,
    /// Refinement points rejected as duplicates or unlocatable
    pub skipped: usize,
    /// Full verification scans
    pub passes: usize,
}

/// A facet of the restricted Delaunay surface
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RestrictedFacet {
    /// Center of the surface Delaunay ball
    pub center: Point3<f64>,
    pub patch: SurfacePatchId,
    /// The crossing patch separates the two cell labels and the domain declares it
    pub consistent: bool,
    /// `center` lies on the domain boundary rather than at the dual edge midpoint
    pub on_surface: bool,
}

impl RestrictedFacet {
    /// Kind of the vertex inserted at `center` when this facet is refined
    pub fn refinement_kind(&self) -> VertexKind {
        if self.on_surface {
            VertexKind::Surface
        } else {
            VertexKind::Interior
        }
    }
}

#[derive(Debug, Clone, Copy)]
struct FacetItem {
    cell: CellId,
    index: usize,
    generation: u32,
}

#[derive(Debug, Clone, Copy)]
struct CellItem {
    cell: CellId,
    generation: u32,
}

type ElementKey = [VertexId; 4];

fn facet_key(tri: &Triangulation, c: CellId, i: usize) -> ElementKey {
    let mut face = tri.face_vertices(c, i);
    face.sort_unstable();
    [face[0], face[1], face[2], usize::MAX]
}

fn cell_key(tri: &Triangulation, c: CellId) -> ElementKey {
    let mut vertices = tri.cell(c).vertices;
    vertices.sort_unstable();
    vertices
}

/// Assign every live cell the domain label at its center
pub fn label_cells(domain: &dyn MeshDomain, tri: &mut Triangulation) {
    let ids: Vec<CellId> = tri.cells().collect();
    let labels: Vec<SubdomainId> = ids.par_iter().map(|&c| domain.label_at(&tri.cell(c).center)).collect();
    for (c, label) in ids.into_iter().zip(labels) {
        tri.set_label(c, label);
    }
}

/// The restricted facet across face `i` of cell `c`, if the labels on both sides differ
///
/// The dual edge is always walked from the cell with the smaller id so both
/// sides of a face see the same ball center.
pub fn restricted_facet(domain: &dyn MeshDomain, tri: &Triangulation, c: CellId, i: usize) -> Option<RestrictedFacet> {
    let (n, _) = tri.mirror(c, i)?;
    let (lc, ln) = (tri.cell(c).label, tri.cell(n).label);
    if lc == ln {
        return None;
    }
    let (from, to) = if c < n { (c, n) } else { (n, c) };
    let a = tri.cell(from).center;
    let b = tri.cell(to).center;
    Some(match domain.boundary_crossing(&a, &b) {
        Some((center, patch)) => RestrictedFacet {
            center,
            patch,
            consistent: patch.separates(lc, ln) && domain.is_patch(lc, ln),
            on_surface: true,
        },
        None => RestrictedFacet {
            center: nalgebra::center(&a, &b),
            patch: SurfacePatchId::new(lc.max(ln), lc.min(ln)),
            consistent: false,
            on_surface: false,
        },
    })
}

/// Severity of the worst criterion a restricted facet violates
pub fn facet_violation(
    domain: &dyn MeshDomain,
    criteria: &RefinementCriteria,
    tri: &Triangulation,
    c: CellId,
    i: usize,
) -> Option<(f64, RestrictedFacet)> {
    let facet = restricted_facet(domain, tri, c, i)?;
    let vertices = tri.face_vertices(c, i);
    let off_surface = vertices.iter().any(|&v| match tri.vertex(v).kind {
        VertexKind::Auxiliary => true,
        VertexKind::Interior => criteria.facet_topology,
        VertexKind::Surface => false,
    });
    if !facet.consistent || off_surface {
        return Some((TOPOLOGY_SEVERITY, facet));
    }
    let points = vertices.map(|v| tri.vertex(v).point);
    criteria.facet_severity(&points, &facet.center).map(|s| (s, facet))
}

/// Severity of the worst criterion a cell inside the domain violates
pub fn cell_violation(
    domain: &dyn MeshDomain,
    criteria: &RefinementCriteria,
    tri: &Triangulation,
    c: CellId,
) -> Option<f64> {
    let cell = tri.cell(c);
    if cell.label == BACKGROUND {
        return None;
    }
    if tri.has_auxiliary_vertex(c) {
        return Some(TOPOLOGY_SEVERITY);
    }
    let tet = tri.points(c);
    let center = circumcenter(&tet).unwrap_or(cell.center);
    let size_bound = match criteria.cell_size {
        CellSize::Uniform(size) => size,
        CellSize::Field => domain.sizing_at(&center).unwrap_or(f64::INFINITY),
    };
    criteria.cell_severity(&tet, &center, size_bound)
}

/// Number of restricted facets and domain cells violating the criteria
pub fn count_violations(domain: &dyn MeshDomain, criteria: &RefinementCriteria, tri: &Triangulation) -> usize {
    tri.cells()
        .map(|c| {
            let cells = usize::from(cell_violation(domain, criteria, tri, c).is_some());
            let facets = (0..4)
                .filter(|&i| matches!(tri.mirror(c, i), Some((n, _)) if c < n))
                .filter(|&i| facet_violation(domain, criteria, tri, c, i).is_some())
                .count();
            cells + facets
        })
        .sum()
}

/// Extract the labeled cells and oriented boundary facets
///
/// Vertices are renumbered compactly in triangulation order; auxiliary
/// vertices and background cells are dropped. Each facet is emitted once,
/// wound so its normal points from the patch's inside toward its outside.
pub fn extract_mesh(domain: &dyn MeshDomain, tri: &Triangulation) -> TetMesh {
    let kept: Vec<CellId> = tri
        .cells()
        .filter(|&c| tri.cell(c).label != BACKGROUND && !tri.has_auxiliary_vertex(c))
        .collect();

    let mut used = vec![false; tri.vertex_count()];
    for &c in &kept {
        for &v in &tri.cell(c).vertices {
            used[v] = true;
        }
    }
    let mut index = vec![usize::MAX; tri.vertex_count()];
    let mut vertices = Vec::new();
    for (v, _) in used.iter().enumerate().filter(|(_, &u)| u) {
        index[v] = vertices.len();
        vertices.push(tri.vertex(v).point);
    }

    let cells = kept
        .iter()
        .map(|&c| TetCell {
            vertices: tri.cell(c).vertices.map(|v| index[v]),
            label: tri.cell(c).label,
        })
        .collect();

    let mut facets = Vec::new();
    for &c in &kept {
        let label = tri.cell(c).label;
        for i in 0..4 {
            let Some(facet) = restricted_facet(domain, tri, c, i) else {
                continue;
            };
            let Some((n, _)) = tri.mirror(c, i) else {
                continue;
            };
            let other = tri.cell(n).label;
            let patch = if facet.consistent {
                facet.patch
            } else {
                SurfacePatchId::new(label.max(other), label.min(other))
            };
            let [a, b, d] = tri.face_vertices(c, i).map(|v| index[v]);
            if patch.inside == label {
                facets.push(BoundaryFacet { vertices: [a, b, d], patch });
            } else if other == BACKGROUND {
                facets.push(BoundaryFacet { vertices: [a, d, b], patch });
            }
        }
    }

    TetMesh { vertices, cells, facets }
}

/// Delaunay refinement state machine
///
/// `Initial → FacetRefinement ⇄ CellRefinement → Converged`
pub struct DelaunayMeshRefiner<'d> {
    domain: &'d dyn MeshDomain,
    criteria: RefinementCriteria,
    tri: Triangulation,
    facets: WorkQueue<FacetItem>,
    cells: WorkQueue<CellItem>,
    stuck: AHashSet<ElementKey>,
    state: RefinementState,
    stats: RefinementStats,
    max_insertions: usize,
}

impl<'d> DelaunayMeshRefiner<'d> {
    /// Validate the criteria against the domain and build the bounding triangulation
    pub fn new(domain: &'d dyn MeshDomain, criteria: RefinementCriteria) -> MeshResult<Self> {
        criteria.validate()?;
        let bbox = domain.bounding_box();
        if criteria.cell_size == CellSize::Field && domain.sizing_at(&bbox.center()).is_none() {
            return Err(MeshError::criteria(
                "field-valued cell size requires a domain with a sizing field",
            ));
        }
        let tri = Triangulation::new(&bbox)?;
        Ok(Self {
            domain,
            criteria,
            tri,
            facets: WorkQueue::new(),
            cells: WorkQueue::new(),
            stuck: AHashSet::new(),
            state: RefinementState::Initial,
            stats: RefinementStats::default(),
            max_insertions: DEFAULT_MAX_INSERTIONS,
        })
    }

    pub fn with_max_insertions(mut self, max_insertions: usize) -> Self {
        self.max_insertions = max_insertions;
        self
    }

    pub fn state(&self) -> RefinementState {
        self.state
    }

    pub fn stats(&self) -> &RefinementStats {
        &self.stats
    }

    pub fn criteria(&self) -> &RefinementCriteria {
        &self.criteria
    }

    pub fn triangulation(&self) -> &Triangulation {
        &self.tri
    }

    pub fn into_triangulation(self) -> Triangulation {
        self.tri
    }

    /// Current mesh, converged or not
    pub fn mesh(&self) -> TetMesh {
        extract_mesh(self.domain, &self.tri)
    }

    /// Remaining criteria violations over the whole triangulation
    pub fn count_violations(&self) -> usize {
        count_violations(self.domain, &self.criteria, &self.tri)
    }

    /// Refine until every facet and cell is good
    ///
    /// Fails with [`MeshError::RefinementDidNotConverge`] when the insertion
    /// budget runs out or bad elements remain that no insertion can fix.
    pub fn refine(&mut self) -> MeshResult<RefinementStats> {
        match self.state {
            RefinementState::Converged => return Ok(self.stats.clone()),
            RefinementState::Initial => self.initialize()?,
            _ => {}
        }

        loop {
            if let Some((c, i, facet)) = self.next_facet() {
                self.state = RefinementState::FacetRefinement;
                self.check_budget()?;
                let key = facet_key(&self.tri, c, i);
                if self.insert_point(facet.center, facet.refinement_kind(), key) {
                    self.stats.facet_refinements += 1;
                }
                continue;
            }

            if let Some(c) = self.next_cell() {
                self.state = RefinementState::CellRefinement;
                self.check_budget()?;
                self.refine_cell(c);
                continue;
            }

            self.stats.passes += 1;
            let queued = self.scan();
            debug!(
                pass = self.stats.passes,
                queued,
                vertices = self.tri.vertex_count(),
                cells = self.tri.cell_count(),
                "verification scan"
            );
            if queued == 0 {
                break;
            }
        }

        let remaining = self.count_violations();
        if remaining > 0 {
            warn!(remaining, stuck = self.stuck.len(), "refinement stalled on unrefinable elements");
            return Err(MeshError::RefinementDidNotConverge {
                insertions: self.stats.insertions,
                remaining,
            });
        }

        self.state = RefinementState::Converged;
        info!(
            vertices = self.tri.vertex_count(),
            cells = self.tri.cell_count(),
            insertions = self.stats.insertions,
            facet_refinements = self.stats.facet_refinements,
            cell_refinements = self.stats.cell_refinements,
            "refinement converged"
        );
        Ok(self.stats.clone())
    }

    fn initialize(&mut self) -> MeshResult<()> {
        let points = self.domain.initial_points();
        for p in &points {
            if let Insertion::Inserted { .. } = self.tri.insert(*p, 0.0, VertexKind::Surface)? {
                self.stats.initial_points += 1;
            }
        }
        label_cells(self.domain, &mut self.tri);
        let queued = self.scan();
        info!(
            seeds = points.len(),
            inserted = self.stats.initial_points,
            queued,
            "triangulation initialized"
        );
        self.state = RefinementState::FacetRefinement;
        Ok(())
    }

    fn check_budget(&self) -> MeshResult<()> {
        if self.stats.insertions < self.max_insertions {
            return Ok(());
        }
        let remaining = self.count_violations();
        warn!(
            insertions = self.stats.insertions,
            remaining, "insertion budget exhausted"
        );
        Err(MeshError::RefinementDidNotConverge {
            insertions: self.stats.insertions,
            remaining,
        })
    }

    /// Queue every violating element; returns how many were queued
    fn scan(&mut self) -> usize {
        let before = self.facets.len() + self.cells.len();
        let ids: Vec<CellId> = self.tri.cells().collect();
        for c in ids {
            self.push_cell(c);
            for i in 0..4 {
                if matches!(self.tri.mirror(c, i), Some((n, _)) if c < n) {
                    self.push_facet(c, i);
                }
            }
        }
        self.facets.len() + self.cells.len() - before
    }

    fn push_cell(&mut self, c: CellId) {
        let Some(severity) = cell_violation(self.domain, &self.criteria, &self.tri, c) else {
            return;
        };
        let key = cell_key(&self.tri, c);
        if !self.stuck.contains(&key) {
            let generation = self.tri.generation(c);
            self.cells.push(severity, key, CellItem { cell: c, generation });
        }
    }

    fn push_facet(&mut self, c: CellId, i: usize) {
        let Some((severity, _)) = facet_violation(self.domain, &self.criteria, &self.tri, c, i) else {
            return;
        };
        let key = facet_key(&self.tri, c, i);
        if !self.stuck.contains(&key) {
            let generation = self.tri.generation(c);
            self.facets.push(
                severity,
                key,
                FacetItem {
                    cell: c,
                    index: i,
                    generation,
                },
            );
        }
    }

    fn is_current(&self, c: CellId, generation: u32) -> bool {
        self.tri.is_alive(c) && self.tri.generation(c) == generation
    }

    fn next_facet(&mut self) -> Option<(CellId, usize, RestrictedFacet)> {
        while let Some((_, item)) = self.facets.pop() {
            if !self.is_current(item.cell, item.generation) {
                continue;
            }
            if let Some((_, facet)) = facet_violation(self.domain, &self.criteria, &self.tri, item.cell, item.index) {
                return Some((item.cell, item.index, facet));
            }
        }
        None
    }

    fn next_cell(&mut self) -> Option<CellId> {
        while let Some((_, item)) = self.cells.pop() {
            if self.is_current(item.cell, item.generation)
                && cell_violation(self.domain, &self.criteria, &self.tri, item.cell).is_some()
            {
                return Some(item.cell);
            }
        }
        None
    }

    fn refine_cell(&mut self, c: CellId) {
        let tet = self.tri.points(c);
        let center = circumcenter(&tet).unwrap_or(self.tri.cell(c).center);

        if let Some((key, facet)) = self.encroached_facet(&center) {
            self.stats.encroachments += 1;
            if self.insert_point(facet.center, facet.refinement_kind(), key) {
                self.stats.facet_refinements += 1;
                if self.tri.is_alive(c) {
                    self.push_cell(c);
                }
            } else {
                self.stuck.insert(cell_key(&self.tri, c));
            }
            return;
        }

        let key = cell_key(&self.tri, c);
        if self.insert_point(center, VertexKind::Interior, key) {
            self.stats.cell_refinements += 1;
        }
    }

    /// A restricted facet in the conflict zone of `p` whose surface ball contains `p`
    fn encroached_facet(&self, p: &Point3<f64>) -> Option<(ElementKey, RestrictedFacet)> {
        let zone = self.tri.conflict_zone(p, 0.0).ok()?;
        for &z in &zone {
            for i in 0..4 {
                let Some(facet) = restricted_facet(self.domain, &self.tri, z, i) else {
                    continue;
                };
                let corner = self.tri.vertex(self.tri.face_vertices(z, i)[0]).point;
                let radius = (corner - facet.center).norm();
                if (p - facet.center).norm() < radius {
                    return Some((facet_key(&self.tri, z, i), facet));
                }
            }
        }
        None
    }

    /// Insert a refinement point and queue the new cells and their faces
    ///
    /// Returns false, marking `key` as unrefinable, when the point is a
    /// duplicate or cannot be located.
    fn insert_point(&mut self, point: Point3<f64>, kind: VertexKind, key: ElementKey) -> bool {
        let cells = match self.tri.insert(point, 0.0, kind) {
            Ok(Insertion::Inserted { cells, .. }) => cells,
            Ok(_) => {
                debug!(x = point.x, y = point.y, z = point.z, "refinement point already present");
                self.stats.skipped += 1;
                self.stuck.insert(key);
                return false;
            }
            Err(err) => {
                warn!(error = %err, "refinement point rejected");
                self.stats.skipped += 1;
                self.stuck.insert(key);
                return false;
            }
        };

        self.stats.insertions += 1;
        for &c in &cells {
            let label = self.domain.label_at(&self.tri.cell(c).center);
            self.tri.set_label(c, label);
        }
        for &c in &cells {
            self.push_cell(c);
            for i in 0..4 {
                self.push_facet(c, i);
            }
        }
        true
    }
}
