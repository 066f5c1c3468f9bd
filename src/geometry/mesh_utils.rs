// SPDX-License-Identifier: Apache-2.0
// Copyright (c) 2025 Polyframe Inc.

//! Surface validation utilities

use super::robust_predicates::is_degenerate_triangle;
use super::SurfaceMesh;
use crate::error::{MeshError, MeshResult};
use std::collections::HashMap;

/// Edge representation for connectivity checking
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Edge {
    pub v0: usize,
    pub v1: usize,
}

impl Edge {
    pub fn new(v0: usize, v1: usize) -> Self {
        // Always store edges with smaller index first for consistent hashing
        if v0 < v1 {
            Self { v0, v1 }
        } else {
            Self { v0: v1, v1: v0 }
        }
    }
}

fn face_edges(face: &[usize; 3]) -> [(usize, usize); 3] {
    [(face[0], face[1]), (face[1], face[2]), (face[2], face[0])]
}

/// Build edge count map for a mesh
pub fn build_edge_counts(mesh: &SurfaceMesh) -> HashMap<Edge, u32> {
    let mut edge_counts: HashMap<Edge, u32> = HashMap::new();
    for face in &mesh.faces {
        for (a, b) in face_edges(face) {
            *edge_counts.entry(Edge::new(a, b)).or_insert(0) += 1;
        }
    }
    edge_counts
}

/// Check if mesh is manifold (each edge shared by at most 2 triangles)
pub fn is_manifold(mesh: &SurfaceMesh) -> bool {
    build_edge_counts(mesh).values().all(|&count| count <= 2)
}

/// Check if mesh is closed (each edge shared by exactly 2 triangles)
pub fn is_closed(mesh: &SurfaceMesh) -> bool {
    build_edge_counts(mesh).values().all(|&count| count == 2)
}

/// Every directed edge appears once and is matched by its reverse
pub fn is_consistently_oriented(mesh: &SurfaceMesh) -> bool {
    let mut directed: HashMap<(usize, usize), u32> = HashMap::new();
    for face in &mesh.faces {
        for edge in face_edges(face) {
            *directed.entry(edge).or_insert(0) += 1;
        }
    }
    directed
        .iter()
        .all(|(&(a, b), &count)| count == 1 && directed.get(&(b, a)) == Some(&1))
}

/// Every vertex's incident faces form a single fan
///
/// Assumes the mesh is closed and consistently oriented, so each link
/// vertex has exactly one successor around the fan.
fn has_manifold_vertices(mesh: &SurfaceMesh) -> bool {
    let mut links: HashMap<usize, HashMap<usize, usize>> = HashMap::new();
    for &[a, b, c] in &mesh.faces {
        links.entry(a).or_default().insert(b, c);
        links.entry(b).or_default().insert(c, a);
        links.entry(c).or_default().insert(a, b);
    }

    links.values().all(|successor| {
        let Some((&start, _)) = successor.iter().min_by_key(|(&k, _)| k) else {
            return true;
        };
        let mut current = start;
        let mut steps = 0;
        loop {
            match successor.get(&current) {
                Some(&next) => {
                    steps += 1;
                    current = next;
                }
                None => return false,
            }
            if current == start || steps > successor.len() {
                break;
            }
        }
        current == start && steps == successor.len()
    })
}

/// Validate that a surface can bound a region
///
/// Fails with `DegenerateGeometry` on zero-area faces and with
/// `DomainInconsistency` on open, non-manifold or inconsistently wound input.
pub fn validate_closed_surface(mesh: &SurfaceMesh) -> MeshResult<()> {
    mesh.check_indices()?;
    if mesh.faces.is_empty() {
        return Err(MeshError::domain("surface has no faces"));
    }
    for (i, face) in mesh.faces.iter().enumerate() {
        let [a, b, c] = mesh.triangle(i);
        if face[0] == face[1] || face[1] == face[2] || face[2] == face[0] || is_degenerate_triangle(&a, &b, &c) {
            return Err(MeshError::degenerate(format!("face {} has zero area", i)));
        }
    }

    let validation = validate_mesh(mesh);
    if !validation.is_manifold {
        return Err(MeshError::domain("surface has edges shared by more than two faces"));
    }
    if !validation.is_closed {
        return Err(MeshError::domain(format!(
            "surface is not closed ({} boundary edges)",
            validation.boundary_edge_count
        )));
    }
    if !validation.is_oriented {
        return Err(MeshError::domain("surface faces are not consistently oriented"));
    }
    if !has_manifold_vertices(mesh) {
        return Err(MeshError::domain("surface has a non-manifold vertex"));
    }
    Ok(())
}

/// Get mesh validation report
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MeshValidation {
    pub is_manifold: bool,
    pub is_closed: bool,
    pub is_oriented: bool,
    pub edge_count: usize,
    pub boundary_edge_count: usize,
}

pub fn validate_mesh(mesh: &SurfaceMesh) -> MeshValidation {
    let edge_counts = build_edge_counts(mesh);
    let boundary_edges = edge_counts.values().filter(|&&count| count == 1).count();

    MeshValidation {
        is_manifold: edge_counts.values().all(|&count| count <= 2),
        is_closed: edge_counts.values().all(|&count| count == 2),
        is_oriented: is_consistently_oriented(mesh),
        edge_count: edge_counts.len(),
        boundary_edge_count: boundary_edges,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geometry::Primitive;
    use nalgebra::Point3;

    #[test]
    fn test_cube_is_closed_manifold() {
        let mesh = Primitive::cube(10.0).to_mesh();
        let validation = validate_mesh(&mesh);
        assert!(validation.is_manifold);
        assert!(validation.is_closed);
        assert!(validation.is_oriented);
        assert_eq!(validation.edge_count, 18);
        assert_eq!(validation.boundary_edge_count, 0);
        assert!(validate_closed_surface(&mesh).is_ok());
    }

    #[test]
    fn test_open_surface_rejected() {
        let mut mesh = Primitive::cube(1.0).to_mesh();
        mesh.faces.pop();
        assert!(!is_closed(&mesh));
        assert!(matches!(validate_closed_surface(&mesh), Err(MeshError::DomainInconsistency(_))));
    }

    #[test]
    fn test_flipped_face_rejected() {
        let mut mesh = Primitive::tetrahedron().to_mesh();
        mesh.faces[0].swap(1, 2);
        assert!(is_closed(&mesh));
        assert!(!is_consistently_oriented(&mesh));
        assert!(validate_closed_surface(&mesh).is_err());
    }

    #[test]
    fn test_degenerate_face_rejected() {
        let mut mesh = Primitive::tetrahedron().to_mesh();
        // Face [0, 1, 3] becomes collinear
        mesh.vertices[3] = Point3::new(0.5, 0.0, 0.0);
        assert!(matches!(validate_closed_surface(&mesh), Err(MeshError::DegenerateGeometry(_))));
    }

    #[test]
    fn test_pinched_vertex_rejected() {
        // Two tetrahedra sharing a single vertex: edge-manifold but not vertex-manifold
        let mut mesh = Primitive::tetrahedron().to_mesh();
        let mut other = Primitive::tetrahedron().to_mesh();
        for p in &mut other.vertices {
            *p = Point3::new(-p.x, -p.y, -p.z);
        }
        other.reverse_orientation();
        mesh.merge(&other);
        // Weld the two origins together
        assert_eq!(mesh.weld_vertices(), 1);
        assert!(is_manifold(&mesh) && is_closed(&mesh) && is_consistently_oriented(&mesh));
        assert!(matches!(validate_closed_surface(&mesh), Err(MeshError::DomainInconsistency(_))));
    }
}
