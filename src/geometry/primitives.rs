// SPDX-License-Identifier: Apache-2.0
// Copyright (c) 2025 Polyframe Inc.

//! Closed surface primitives with shared, outward-wound vertices

use super::SurfaceMesh;
use nalgebra::Point3;
use std::collections::HashMap;

/// Geometric primitives
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Primitive {
    Cuboid { min: Point3<f64>, max: Point3<f64> },
    Sphere { center: Point3<f64>, radius: f64, subdivisions: u32 },
    Tetrahedron,
}

impl Primitive {
    /// Cube with the given edge length centered at the origin
    pub fn cube(edge: f64) -> Self {
        let h = edge / 2.0;
        Self::Cuboid {
            min: Point3::new(-h, -h, -h),
            max: Point3::new(h, h, h),
        }
    }

    pub fn cuboid(min: Point3<f64>, max: Point3<f64>) -> Self {
        Self::Cuboid { min, max }
    }

    /// Icosphere: a subdivided icosahedron projected onto the sphere
    pub fn sphere(center: Point3<f64>, radius: f64, subdivisions: u32) -> Self {
        Self::Sphere {
            center,
            radius,
            subdivisions,
        }
    }

    /// Unit corner tetrahedron (origin and the three unit points)
    pub fn tetrahedron() -> Self {
        Self::Tetrahedron
    }

    pub fn to_mesh(&self) -> SurfaceMesh {
        match *self {
            Self::Cuboid { min, max } => generate_cuboid_mesh(min, max),
            Self::Sphere {
                center,
                radius,
                subdivisions,
            } => generate_icosphere_mesh(center, radius, subdivisions),
            Self::Tetrahedron => generate_tetrahedron_mesh(),
        }
    }
}

fn generate_cuboid_mesh(min: Point3<f64>, max: Point3<f64>) -> SurfaceMesh {
    let vertices = vec![
        Point3::new(min.x, min.y, min.z),
        Point3::new(max.x, min.y, min.z),
        Point3::new(max.x, max.y, min.z),
        Point3::new(min.x, max.y, min.z),
        Point3::new(min.x, min.y, max.z),
        Point3::new(max.x, min.y, max.z),
        Point3::new(max.x, max.y, max.z),
        Point3::new(min.x, max.y, max.z),
    ];

    let faces = vec![
        // Front (z+)
        [4, 5, 6],
        [4, 6, 7],
        // Back (z-)
        [1, 0, 3],
        [1, 3, 2],
        // Right (x+)
        [5, 1, 2],
        [5, 2, 6],
        // Left (x-)
        [0, 4, 7],
        [0, 7, 3],
        // Top (y+)
        [7, 6, 2],
        [7, 2, 3],
        // Bottom (y-)
        [0, 1, 5],
        [0, 5, 4],
    ];

    SurfaceMesh::new(vertices, faces)
}

fn generate_icosphere_mesh(center: Point3<f64>, radius: f64, subdivisions: u32) -> SurfaceMesh {
    let t = (1.0 + 5.0f64.sqrt()) / 2.0;
    let mut unit: Vec<Point3<f64>> = [
        (-1.0, t, 0.0),
        (1.0, t, 0.0),
        (-1.0, -t, 0.0),
        (1.0, -t, 0.0),
        (0.0, -1.0, t),
        (0.0, 1.0, t),
        (0.0, -1.0, -t),
        (0.0, 1.0, -t),
        (t, 0.0, -1.0),
        (t, 0.0, 1.0),
        (-t, 0.0, -1.0),
        (-t, 0.0, 1.0),
    ]
    .iter()
    .map(|&(x, y, z)| Point3::from(Point3::new(x, y, z).coords.normalize()))
    .collect();

    let mut faces: Vec<[usize; 3]> = vec![
        [0, 11, 5],
        [0, 5, 1],
        [0, 1, 7],
        [0, 7, 10],
        [0, 10, 11],
        [1, 5, 9],
        [5, 11, 4],
        [11, 10, 2],
        [10, 7, 6],
        [7, 1, 8],
        [3, 9, 4],
        [3, 4, 2],
        [3, 2, 6],
        [3, 6, 8],
        [3, 8, 9],
        [4, 9, 5],
        [2, 4, 11],
        [6, 2, 10],
        [8, 6, 7],
        [9, 8, 1],
    ];

    for _ in 0..subdivisions {
        let mut midpoints: HashMap<(usize, usize), usize> = HashMap::new();
        let mut midpoint = |a: usize, b: usize, unit: &mut Vec<Point3<f64>>| -> usize {
            let key = (a.min(b), a.max(b));
            *midpoints.entry(key).or_insert_with(|| {
                let m = (unit[a].coords + unit[b].coords).normalize();
                unit.push(Point3::from(m));
                unit.len() - 1
            })
        };

        let mut refined = Vec::with_capacity(faces.len() * 4);
        for [a, b, c] in faces {
            let ab = midpoint(a, b, &mut unit);
            let bc = midpoint(b, c, &mut unit);
            let ca = midpoint(c, a, &mut unit);
            refined.push([a, ab, ca]);
            refined.push([b, bc, ab]);
            refined.push([c, ca, bc]);
            refined.push([ab, bc, ca]);
        }
        faces = refined;
    }

    let vertices = unit.iter().map(|p| center + p.coords * radius).collect();
    SurfaceMesh::new(vertices, faces)
}

fn generate_tetrahedron_mesh() -> SurfaceMesh {
    SurfaceMesh::new(
        vec![
            Point3::new(0.0, 0.0, 0.0),
            Point3::new(1.0, 0.0, 0.0),
            Point3::new(0.0, 1.0, 0.0),
            Point3::new(0.0, 0.0, 1.0),
        ],
        vec![[0, 2, 1], [0, 1, 3], [0, 3, 2], [1, 2, 3]],
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geometry::mesh_utils::validate_closed_surface;

    #[test]
    fn test_primitives_are_closed_and_outward() {
        for primitive in [
            Primitive::cube(2.0),
            Primitive::sphere(Point3::new(1.0, 2.0, 3.0), 1.5, 2),
            Primitive::tetrahedron(),
        ] {
            let mesh = primitive.to_mesh();
            assert!(validate_closed_surface(&mesh).is_ok(), "{:?}", primitive);
            assert!(mesh.signed_volume() > 0.0, "{:?}", primitive);
        }
    }

    #[test]
    fn test_icosphere_counts() {
        let mesh = Primitive::sphere(Point3::origin(), 1.0, 1).to_mesh();
        assert_eq!(mesh.face_count(), 80);
        assert_eq!(mesh.vertex_count(), 42);
        assert!(mesh.vertices.iter().all(|p| (p.coords.norm() - 1.0).abs() < 1e-12));
    }
}
