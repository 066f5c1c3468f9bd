// SPDX-License-Identifier: Apache-2.0
// Copyright (c) 2025 Polyframe Inc.

//! Batch intersection queries over raw triangle meshes
//!
//! Both queries index the faces with a [`BVH`] and test candidates in
//! parallel. Results never depend on the number of worker threads.

use crate::error::{MeshError, MeshResult};
use crate::geometry::triangle_intersection::segment_intersects_triangle;
use crate::geometry::{segment_triangle_intersect, triangle_triangle_intersect, BoundingBox, SurfaceMesh, BVH};
use crate::geometry::robust_predicates::{orient2d, orient3d};
use nalgebra::Point3;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use tracing::debug;

/// One segment/face contact
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SegmentFaceHit {
    pub face: usize,
    pub segment: usize,
    pub point: Point3<f64>,
}

/// Flat form of segment query results
///
/// `pairs[i]` is `(face, segment)` and `points[3 i .. 3 i + 3]` its hit point.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SegmentHits {
    pub pairs: Vec<(usize, usize)>,
    pub points: Vec<f64>,
}

impl SegmentHits {
    pub fn len(&self) -> usize {
        self.pairs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pairs.is_empty()
    }
}

impl From<Vec<SegmentFaceHit>> for SegmentHits {
    fn from(hits: Vec<SegmentFaceHit>) -> Self {
        let mut result = SegmentHits {
            pairs: Vec::with_capacity(hits.len()),
            points: Vec::with_capacity(hits.len() * 3),
        };
        for hit in hits {
            result.pairs.push((hit.face, hit.segment));
            result.points.extend_from_slice(&[hit.point.x, hit.point.y, hit.point.z]);
        }
        result
    }
}

/// Check a flat vertex/face buffer for self-intersections
pub fn check_self_intersections(vertices: &[f64], faces: &[u32]) -> MeshResult<bool> {
    let mesh = SurfaceMesh::from_buffers(vertices, faces)?;
    Ok(mesh_self_intersects(&mesh))
}

/// Intersect every segment with every face of a flat mesh buffer
pub fn segment_triangle_intersections(
    vertices: &[f64],
    faces: &[u32],
    segment_starts: &[f64],
    segment_ends: &[f64],
) -> MeshResult<SegmentHits> {
    let mesh = SurfaceMesh::from_buffers(vertices, faces)?;
    if segment_starts.len() != segment_ends.len() {
        return Err(MeshError::domain(format!(
            "{} segment start coordinates but {} end coordinates",
            segment_starts.len(),
            segment_ends.len()
        )));
    }
    if segment_starts.len() % 3 != 0 {
        return Err(MeshError::domain("segment buffers must hold 3 coordinates per point"));
    }
    if segment_starts.iter().chain(segment_ends).any(|c| !c.is_finite()) {
        return Err(MeshError::degenerate("segment buffers contain non-finite coordinates"));
    }
    let starts: Vec<Point3<f64>> = segment_starts
        .chunks_exact(3)
        .map(|c| Point3::new(c[0], c[1], c[2]))
        .collect();
    let ends: Vec<Point3<f64>> = segment_ends
        .chunks_exact(3)
        .map(|c| Point3::new(c[0], c[1], c[2]))
        .collect();
    Ok(segment_hits(&mesh, &starts, &ends).into())
}

/// Whether any two faces of the mesh intersect beyond their shared topology
///
/// Faces sharing an edge intersect only when they fold onto each other;
/// faces sharing a vertex intersect when the edge opposite the shared vertex
/// of one touches the other; faces sharing all three vertices are duplicates
/// and always intersect.
pub fn mesh_self_intersects(mesh: &SurfaceMesh) -> bool {
    if mesh.faces.len() < 2 {
        return false;
    }
    let bvh = BVH::from_triangles(&mesh.vertices, &mesh.faces);
    debug!(faces = mesh.faces.len(), "checking self-intersections");

    let found = (0..mesh.faces.len()).into_par_iter().any(|f| {
        let tri_f = mesh.triangle(f);
        let bbox = BoundingBox::from_points(&tri_f);
        bvh.query(&bbox)
            .into_iter()
            .filter(|&g| g > f)
            .any(|g| faces_intersect(mesh, f, g))
    });

    debug!(found, "self-intersection check finished");
    found
}

fn faces_intersect(mesh: &SurfaceMesh, f: usize, g: usize) -> bool {
    let face_f = mesh.faces[f];
    let face_g = mesh.faces[g];
    let shared: Vec<usize> = face_f.iter().copied().filter(|v| face_g.contains(v)).collect();
    let p = mesh.triangle(f);
    let q = mesh.triangle(g);

    match shared.len() {
        0 => triangle_triangle_intersect(&p, &q),
        1 => {
            let s = shared[0];
            let (a, b) = opposite_edge(mesh, &face_f, s);
            let (c, d) = opposite_edge(mesh, &face_g, s);
            segment_intersects_triangle(&a, &b, &q) || segment_intersects_triangle(&c, &d, &p)
        }
        2 => {
            let u = mesh.vertices[shared[0]];
            let v = mesh.vertices[shared[1]];
            let Some(&pf) = face_f.iter().find(|i| !shared.contains(i)) else {
                return true;
            };
            let Some(&pg) = face_g.iter().find(|i| !shared.contains(i)) else {
                return true;
            };
            folds_over(&u, &v, &mesh.vertices[pf], &mesh.vertices[pg])
        }
        _ => true,
    }
}

/// The two corners of `face` other than `shared`
fn opposite_edge(mesh: &SurfaceMesh, face: &[usize; 3], shared: usize) -> (Point3<f64>, Point3<f64>) {
    let k = face.iter().position(|&v| v == shared).unwrap_or(0);
    (mesh.vertices[face[(k + 1) % 3]], mesh.vertices[face[(k + 2) % 3]])
}

/// Triangles `u v p` and `u v q` lie in one plane with `p`, `q` on the same side of `u v`
fn folds_over(u: &Point3<f64>, v: &Point3<f64>, p: &Point3<f64>, q: &Point3<f64>) -> bool {
    if !orient3d(u, v, p, q).is_degenerate() {
        return false;
    }
    let normal = (v - u).cross(&(p - u));
    let axis = normal.iamax();
    let project = |x: &Point3<f64>| match axis {
        0 => [x.y, x.z],
        1 => [x.z, x.x],
        _ => [x.x, x.y],
    };
    let sp = orient2d(project(u), project(v), project(p));
    let sq = orient2d(project(u), project(v), project(q));
    !sp.is_degenerate() && sp == sq
}

/// Every `(face, segment)` contact, ordered by segment then face
pub fn segment_hits(mesh: &SurfaceMesh, starts: &[Point3<f64>], ends: &[Point3<f64>]) -> Vec<SegmentFaceHit> {
    let bvh = BVH::from_triangles(&mesh.vertices, &mesh.faces);
    debug!(faces = mesh.faces.len(), segments = starts.len(), "intersecting segments");

    starts
        .par_iter()
        .zip(ends.par_iter())
        .enumerate()
        .map(|(segment, (a, b))| {
            let mut candidates = bvh.query_segment(a, b);
            candidates.sort_unstable();
            candidates
                .into_iter()
                .filter_map(|face| {
                    segment_triangle_intersect(a, b, &mesh.triangle(face)).map(|hit| SegmentFaceHit {
                        face,
                        segment,
                        point: hit.point,
                    })
                })
                .collect::<Vec<_>>()
        })
        .collect::<Vec<_>>()
        .into_iter()
        .flatten()
        .collect()
}
