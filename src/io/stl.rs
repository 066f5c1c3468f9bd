// SPDX-License-Identifier: Apache-2.0
// Copyright (c) 2025 Polyframe Inc.

//! STL surface reader and writer

use crate::error::{MeshError, MeshResult};
use crate::geometry::SurfaceMesh;
use crate::utils::math::triangle_normal;
use nalgebra::Point3;
use std::fs::File;
use std::io::BufWriter;
use std::path::Path;
use stl_io::{Normal, Triangle as StlTriangle, Vertex as StlVertex};
use tracing::debug;

/// Read an ASCII or binary STL file into an indexed surface with welded vertices
pub fn read_stl(path: impl AsRef<Path>) -> MeshResult<SurfaceMesh> {
    let path = path.as_ref();
    let mut file = File::open(path).map_err(|e| MeshError::io(path, e))?;
    let stl = stl_io::read_stl(&mut file).map_err(|e| MeshError::format(path, e.to_string()))?;

    let vertices = stl
        .vertices
        .iter()
        .map(|v| Point3::new(f64::from(v[0]), f64::from(v[1]), f64::from(v[2])))
        .collect();
    let faces = stl.faces.iter().map(|f| f.vertices).collect();
    let mut mesh = SurfaceMesh::new(vertices, faces);
    let merged = mesh.weld_vertices();
    debug!(
        path = %path.display(),
        vertices = mesh.vertex_count(),
        faces = mesh.face_count(),
        merged,
        "STL loaded"
    );
    Ok(mesh)
}

/// Write a surface as binary STL with per-face normals computed from the geometry
pub fn write_stl(path: impl AsRef<Path>, mesh: &SurfaceMesh) -> MeshResult<()> {
    let path = path.as_ref();
    let triangles: Vec<StlTriangle> = (0..mesh.face_count())
        .map(|face| {
            let [a, b, c] = mesh.triangle(face);
            let normal = triangle_normal(&a, &b, &c).unwrap_or_else(nalgebra::Vector3::zeros);
            let vertex = |p: Point3<f64>| StlVertex::new([p.x as f32, p.y as f32, p.z as f32]);
            StlTriangle {
                normal: Normal::new([normal.x as f32, normal.y as f32, normal.z as f32]),
                vertices: [vertex(a), vertex(b), vertex(c)],
            }
        })
        .collect();

    let file = File::create(path).map_err(|e| MeshError::io(path, e))?;
    let mut writer = BufWriter::new(file);
    stl_io::write_stl(&mut writer, triangles.iter()).map_err(|e| MeshError::io(path, e))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geometry::Primitive;

    #[test]
    fn test_stl_round_trip_welds_vertices() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("cube.stl");
        let cube = Primitive::cube(2.0).to_mesh();
        write_stl(&path, &cube).unwrap();

        let loaded = read_stl(&path).unwrap();
        assert_eq!(loaded.vertex_count(), 8);
        assert_eq!(loaded.face_count(), 12);
        assert!((loaded.signed_volume() - 8.0).abs() < 1e-9);
    }

    #[test]
    fn test_missing_and_malformed_files() {
        let dir = tempfile::tempdir().unwrap();
        assert!(matches!(read_stl(dir.path().join("none.stl")), Err(MeshError::Io { .. })));

        let path = dir.path().join("bad.stl");
        std::fs::write(&path, b"solid nonsense\nfacet normal x y z\n").unwrap();
        assert!(matches!(read_stl(&path), Err(MeshError::Format { .. })));
    }
}
