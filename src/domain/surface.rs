// SPDX-License-Identifier: Apache-2.0
// Copyright (c) 2025 Polyframe Inc.

//! Domain bounded by closed triangulated surfaces

use super::{MeshDomain, SizingField, SubdomainId, SurfacePatchId, BACKGROUND};
use crate::error::{MeshError, MeshResult};
use crate::geometry::mesh_utils::validate_closed_surface;
use crate::geometry::robust_predicates::{orient3d, Orientation};
use crate::geometry::{segment_triangle_intersect, BoundingBox, SurfaceMesh, BVH};
use crate::query::mesh_self_intersects;
use nalgebra::{Point3, Vector3};
use std::collections::BTreeSet;
use std::sync::Arc;
use tracing::debug;

/// Ray directions tried in turn for parity tests; irrational ratios make
/// grazing an edge or vertex unlikely.
const RAY_DIRECTIONS: [[f64; 3]; 3] = [
    [0.577_215_664_9, 0.618_033_988_7, 0.533_150_392_8],
    [-0.707_106_781_2, 0.271_828_182_8, 0.651_327_093_1],
    [0.314_159_265_3, -0.836_118_202_4, 0.449_341_137_5],
];

/// An input surface with the unordered pair of subdomains it separates
#[derive(Debug, Clone)]
pub struct LabeledSurface {
    pub mesh: SurfaceMesh,
    pub labels: (SubdomainId, SubdomainId),
}

impl LabeledSurface {
    pub fn new(mesh: SurfaceMesh, labels: (SubdomainId, SubdomainId)) -> Self {
        Self { mesh, labels }
    }
}

#[derive(Debug, Clone)]
struct SurfaceEntry {
    mesh: SurfaceMesh,
    bvh: BVH,
    bbox: BoundingBox,
    patch: SurfacePatchId,
    depth: usize,
}

/// Domain described by a set of closed, non-intersecting surfaces
///
/// Which declared label lies inside each surface is decided by nesting: a
/// top-level surface has the background outside it, and a nested surface
/// has its parent's inside label outside it.
#[derive(Debug, Clone)]
pub struct SurfaceDomain {
    surfaces: Vec<SurfaceEntry>,
    /// All faces of all surfaces, with the surface each came from
    combined: SurfaceMesh,
    face_surface: Vec<usize>,
    bvh: BVH,
    bbox: BoundingBox,
    sizing: Option<Arc<SizingField>>,
}

impl SurfaceDomain {
    /// Validate the surfaces and resolve their patch labels
    pub fn new(surfaces: Vec<LabeledSurface>) -> MeshResult<Self> {
        if surfaces.is_empty() {
            return Err(MeshError::domain("no surfaces given"));
        }

        let mut meshes = Vec::with_capacity(surfaces.len());
        for (index, surface) in surfaces.iter().enumerate() {
            let (a, b) = surface.labels;
            if a == b {
                return Err(MeshError::domain(format!(
                    "surface {} separates label {} from itself",
                    index, a
                )));
            }
            validate_closed_surface(&surface.mesh).map_err(|err| match err {
                MeshError::DomainInconsistency(msg) => MeshError::domain(format!("surface {}: {}", index, msg)),
                MeshError::DegenerateGeometry(msg) => MeshError::degenerate(format!("surface {}: {}", index, msg)),
                other => other,
            })?;

            let mut mesh = surface.mesh.clone();
            if mesh.signed_volume() < 0.0 {
                mesh.reverse_orientation();
            }
            meshes.push(mesh);
        }

        let mut combined = SurfaceMesh::default();
        let mut face_surface = Vec::new();
        for (index, mesh) in meshes.iter().enumerate() {
            combined.merge(mesh);
            face_surface.extend(std::iter::repeat(index).take(mesh.faces.len()));
        }
        if mesh_self_intersects(&combined) {
            return Err(MeshError::domain("input surfaces intersect each other or themselves"));
        }

        let entries: Vec<(SurfaceMesh, BVH, BoundingBox)> = meshes
            .into_iter()
            .map(|mesh| {
                let bvh = BVH::from_triangles(&mesh.vertices, &mesh.faces);
                let bbox = mesh.bounding_box();
                (mesh, bvh, bbox)
            })
            .collect();

        let parents = nesting_parents(&entries);
        let order = nesting_order(&parents);

        let mut resolved: Vec<Option<(SurfacePatchId, usize)>> = vec![None; entries.len()];
        for index in order {
            let (outside, depth) = match parents[index] {
                None => (BACKGROUND, 0),
                Some(parent) => match resolved[parent] {
                    Some((patch, depth)) => (patch.inside, depth + 1),
                    None => return Err(MeshError::domain("surface nesting could not be resolved")),
                },
            };
            let (a, b) = surfaces[index].labels;
            let inside = if a == outside {
                b
            } else if b == outside {
                a
            } else {
                return Err(MeshError::domain(format!(
                    "surface {} declares labels ({}, {}) but lies in subdomain {}",
                    index, a, b, outside
                )));
            };
            resolved[index] = Some((SurfacePatchId::on_surface(inside, outside, index), depth));
        }

        let mut surface_entries = Vec::with_capacity(entries.len());
        for ((mesh, bvh, bbox), resolution) in entries.into_iter().zip(resolved) {
            let Some((patch, depth)) = resolution else {
                return Err(MeshError::domain("surface nesting could not be resolved"));
            };
            debug!(%patch, depth, faces = mesh.faces.len(), "resolved surface");
            surface_entries.push(SurfaceEntry {
                mesh,
                bvh,
                bbox,
                patch,
                depth,
            });
        }

        let bvh = BVH::from_triangles(&combined.vertices, &combined.faces);
        let bbox = combined.bounding_box();
        Ok(Self {
            surfaces: surface_entries,
            combined,
            face_surface,
            bvh,
            bbox,
            sizing: None,
        })
    }

    pub fn with_sizing_field(mut self, field: Arc<SizingField>) -> Self {
        self.sizing = Some(field);
        self
    }

    pub fn surface_count(&self) -> usize {
        self.surfaces.len()
    }

    /// Resolved patch of each input surface, in input order
    pub fn patches(&self) -> Vec<SurfacePatchId> {
        self.surfaces.iter().map(|s| s.patch).collect()
    }

    fn contains(&self, surface: usize, p: &Point3<f64>) -> bool {
        let entry = &self.surfaces[surface];
        if !entry.bbox.contains(p) {
            return false;
        }
        point_in_surface(&entry.mesh, &entry.bvh, &entry.bbox, p)
    }
}

/// Innermost other surface containing each surface, if any
fn nesting_parents(entries: &[(SurfaceMesh, BVH, BoundingBox)]) -> Vec<Option<usize>> {
    let volumes: Vec<f64> = entries.iter().map(|(mesh, _, _)| mesh.signed_volume()).collect();
    (0..entries.len())
        .map(|i| {
            // Surfaces do not intersect, so one vertex decides containment.
            let sample = entries[i].0.vertices[entries[i].0.faces[0][0]];
            (0..entries.len())
                .filter(|&j| j != i && volumes[j] > volumes[i])
                .filter(|&j| {
                    let (mesh, bvh, bbox) = &entries[j];
                    bbox.contains(&sample) && point_in_surface(mesh, bvh, bbox, &sample)
                })
                .min_by(|&a, &b| volumes[a].total_cmp(&volumes[b]).then(a.cmp(&b)))
        })
        .collect()
}

/// Surfaces ordered so every parent precedes its children
fn nesting_order(parents: &[Option<usize>]) -> Vec<usize> {
    let depth = |mut i: usize| {
        let mut d = 0;
        while let Some(p) = parents[i] {
            d += 1;
            i = p;
            if d > parents.len() {
                break;
            }
        }
        d
    };
    let mut order: Vec<usize> = (0..parents.len()).collect();
    order.sort_by_key(|&i| (depth(i), i));
    order
}

/// Inside test for a closed, outward-oriented surface
///
/// Ray parity with exact crossing classification; if every ray direction
/// grazes an edge or vertex, falls back to the generalized winding number.
fn point_in_surface(mesh: &SurfaceMesh, bvh: &BVH, bbox: &BoundingBox, p: &Point3<f64>) -> bool {
    let reach = bbox.diagonal() + (p - bbox.center()).norm() + 1.0;
    for dir in RAY_DIRECTIONS {
        let far = p + Vector3::from(dir) * reach;
        if let Some(parity) = ray_parity(mesh, bvh, p, &far) {
            return parity;
        }
    }
    winding_number(mesh, p) > 0.5
}

/// Number of proper crossings mod 2, `None` when the ray touches an edge,
/// a vertex, or starts on the surface
fn ray_parity(mesh: &SurfaceMesh, bvh: &BVH, p: &Point3<f64>, far: &Point3<f64>) -> Option<bool> {
    let mut inside = false;
    for face in bvh.query_segment(p, far) {
        let [t0, t1, t2] = mesh.triangle(face);
        let sp = orient3d(&t0, &t1, &t2, p);
        let sf = orient3d(&t0, &t1, &t2, far);
        if sp.is_degenerate() || sf.is_degenerate() {
            if segment_triangle_intersect(p, far, &[t0, t1, t2]).is_some() {
                return None;
            }
            continue;
        }
        if sp == sf {
            continue;
        }
        let edges = [orient3d(p, far, &t0, &t1), orient3d(p, far, &t1, &t2), orient3d(p, far, &t2, &t0)];
        let positive = edges.iter().filter(|&&o| o == Orientation::Positive).count();
        let negative = edges.iter().filter(|&&o| o == Orientation::Negative).count();
        if positive == 3 || negative == 3 {
            inside = !inside;
        } else if positive > 0 && negative > 0 {
            continue;
        } else {
            return None;
        }
    }
    Some(inside)
}

/// Generalized winding number (sum of signed solid angles over 4 pi)
fn winding_number(mesh: &SurfaceMesh, p: &Point3<f64>) -> f64 {
    let total: f64 = mesh
        .faces
        .iter()
        .map(|face| {
            let [a, b, c] = face.map(|v| mesh.vertices[v] - p);
            let (la, lb, lc) = (a.norm(), b.norm(), c.norm());
            let numerator = a.dot(&b.cross(&c));
            let denominator = la * lb * lc + a.dot(&b) * lc + b.dot(&c) * la + c.dot(&a) * lb;
            2.0 * numerator.atan2(denominator)
        })
        .sum();
    total / (4.0 * std::f64::consts::PI)
}

impl MeshDomain for SurfaceDomain {
    fn bounding_box(&self) -> BoundingBox {
        self.bbox
    }

    fn label_at(&self, p: &Point3<f64>) -> SubdomainId {
        if !self.bbox.contains(p) {
            return BACKGROUND;
        }
        (0..self.surfaces.len())
            .filter(|&i| self.contains(i, p))
            .max_by_key(|&i| (self.surfaces[i].depth, std::cmp::Reverse(i)))
            .map_or(BACKGROUND, |i| self.surfaces[i].patch.inside)
    }

    fn boundary_crossing(&self, a: &Point3<f64>, b: &Point3<f64>) -> Option<(Point3<f64>, SurfacePatchId)> {
        self.bvh
            .query_segment(a, b)
            .into_iter()
            .filter_map(|face| {
                segment_triangle_intersect(a, b, &self.combined.triangle(face)).map(|hit| (hit.t, face, hit.point))
            })
            .min_by(|x, y| x.0.total_cmp(&y.0).then(x.1.cmp(&y.1)))
            .map(|(_, face, point)| (point, self.surfaces[self.face_surface[face]].patch))
    }

    fn sizing_at(&self, p: &Point3<f64>) -> Option<f64> {
        self.sizing.as_ref().map(|field| field.sample(p))
    }

    fn initial_points(&self) -> Vec<Point3<f64>> {
        self.surfaces
            .iter()
            .flat_map(|s| s.mesh.vertices.iter().copied())
            .collect()
    }

    fn is_patch(&self, a: SubdomainId, b: SubdomainId) -> bool {
        self.surfaces.iter().any(|s| s.patch.separates(a, b))
    }

    fn subdomains(&self) -> Vec<SubdomainId> {
        self.surfaces
            .iter()
            .flat_map(|s| [s.patch.inside, s.patch.outside])
            .filter(|&l| l != BACKGROUND)
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect()
    }
}
