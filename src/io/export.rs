// SPDX-License-Identifier: Apache-2.0
// Copyright (c) 2025 Polyframe Inc.

//! Tetrahedral mesh writers

use super::stl::write_stl;
use crate::domain::SurfacePatchId;
use crate::error::{MeshError, MeshResult};
use crate::geometry::TetMesh;
use std::collections::BTreeMap;
use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::Path;

/// Output formats chosen from the file extension
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MeshFormat {
    /// Gmsh MSH 2.2 ASCII
    Gmsh,
    Json,
    /// Boundary facets only
    Stl,
}

impl MeshFormat {
    pub fn from_path(path: &Path) -> MeshResult<Self> {
        let ext = path
            .extension()
            .and_then(|e| e.to_str())
            .map(|e| e.to_ascii_lowercase())
            .unwrap_or_default();
        match ext.as_str() {
            "msh" => Ok(MeshFormat::Gmsh),
            "json" => Ok(MeshFormat::Json),
            "stl" => Ok(MeshFormat::Stl),
            other => Err(MeshError::format(
                path,
                format!("unsupported output format '{}' (expected msh, json or stl)", other),
            )),
        }
    }
}

/// Write a mesh in the format implied by the file extension
pub fn write_mesh(path: impl AsRef<Path>, mesh: &TetMesh) -> MeshResult<()> {
    let path = path.as_ref();
    match MeshFormat::from_path(path)? {
        MeshFormat::Gmsh => write_gmsh(path, mesh),
        MeshFormat::Json => write_mesh_json(path, mesh),
        MeshFormat::Stl => write_stl(path, &mesh.boundary_surface()),
    }
}

/// Gmsh MSH 2.2 ASCII
///
/// Tetrahedra carry their subdomain label as physical group (dimension 3).
/// Boundary triangles carry a physical group per patch (dimension 2),
/// numbered from 1 in patch order and named `patch_<inside>_<outside>`.
pub fn write_gmsh(path: impl AsRef<Path>, mesh: &TetMesh) -> MeshResult<()> {
    let path = path.as_ref();
    let file = File::create(path).map_err(|e| MeshError::io(path, e))?;
    let mut out = BufWriter::new(file);
    write_gmsh_to(&mut out, mesh)
        .and_then(|_| out.flush())
        .map_err(|e| MeshError::io(path, e))
}

fn write_gmsh_to(out: &mut impl Write, mesh: &TetMesh) -> std::io::Result<()> {
    let patches: BTreeMap<SurfacePatchId, usize> = mesh
        .facets
        .iter()
        .map(|f| f.patch)
        .collect::<std::collections::BTreeSet<_>>()
        .into_iter()
        .enumerate()
        .map(|(i, patch)| (patch, i + 1))
        .collect();
    let subdomains = mesh.subdomains();

    writeln!(out, "$MeshFormat")?;
    writeln!(out, "2.2 0 8")?;
    writeln!(out, "$EndMeshFormat")?;

    writeln!(out, "$PhysicalNames")?;
    writeln!(out, "{}", patches.len() + subdomains.len())?;
    for (patch, id) in &patches {
        writeln!(out, "2 {} \"patch_{}_{}\"", id, patch.inside, patch.outside)?;
    }
    for label in &subdomains {
        writeln!(out, "3 {} \"subdomain_{}\"", label, label)?;
    }
    writeln!(out, "$EndPhysicalNames")?;

    writeln!(out, "$Nodes")?;
    writeln!(out, "{}", mesh.vertex_count())?;
    for (i, p) in mesh.vertices.iter().enumerate() {
        writeln!(out, "{} {} {} {}", i + 1, p.x, p.y, p.z)?;
    }
    writeln!(out, "$EndNodes")?;

    writeln!(out, "$Elements")?;
    writeln!(out, "{}", mesh.facet_count() + mesh.cell_count())?;
    let mut id = 1;
    for facet in &mesh.facets {
        let tag = patches.get(&facet.patch).copied().unwrap_or(0);
        let [a, b, c] = facet.vertices;
        writeln!(out, "{} 2 2 {} {} {} {} {}", id, tag, tag, a + 1, b + 1, c + 1)?;
        id += 1;
    }
    for cell in &mesh.cells {
        let [a, b, c, d] = cell.vertices;
        writeln!(
            out,
            "{} 4 2 {} {} {} {} {} {}",
            id,
            cell.label,
            cell.label,
            a + 1,
            b + 1,
            c + 1,
            d + 1
        )?;
        id += 1;
    }
    writeln!(out, "$EndElements")?;
    Ok(())
}

pub fn write_mesh_json(path: impl AsRef<Path>, mesh: &TetMesh) -> MeshResult<()> {
    let path = path.as_ref();
    let content = serde_json::to_string(mesh).map_err(|e| MeshError::format(path, e.to_string()))?;
    fs::write(path, content).map_err(|e| MeshError::io(path, e))
}

pub fn read_mesh_json(path: impl AsRef<Path>) -> MeshResult<TetMesh> {
    let path = path.as_ref();
    let content = fs::read_to_string(path).map_err(|e| MeshError::io(path, e))?;
    serde_json::from_str(&content).map_err(|e| MeshError::format(path, e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geometry::{BoundaryFacet, TetCell};
    use nalgebra::Point3;

    fn single_tet() -> TetMesh {
        TetMesh {
            vertices: vec![
                Point3::new(0.0, 0.0, 0.0),
                Point3::new(1.0, 0.0, 0.0),
                Point3::new(0.0, 1.0, 0.0),
                Point3::new(0.0, 0.0, 1.0),
            ],
            cells: vec![TetCell {
                vertices: [0, 1, 2, 3],
                label: 3,
            }],
            facets: vec![
                BoundaryFacet {
                    vertices: [0, 2, 1],
                    patch: SurfacePatchId::new(3, 0),
                },
                BoundaryFacet {
                    vertices: [0, 1, 3],
                    patch: SurfacePatchId::new(3, 0),
                },
            ],
        }
    }

    #[test]
    fn test_format_from_extension() {
        assert_eq!(MeshFormat::from_path(Path::new("a.MSH")).unwrap(), MeshFormat::Gmsh);
        assert_eq!(MeshFormat::from_path(Path::new("a.json")).unwrap(), MeshFormat::Json);
        assert_eq!(MeshFormat::from_path(Path::new("a.stl")).unwrap(), MeshFormat::Stl);
        assert!(MeshFormat::from_path(Path::new("a.vtk")).is_err());
        assert!(MeshFormat::from_path(Path::new("mesh")).is_err());
    }

    #[test]
    fn test_gmsh_layout() {
        let mut buffer = Vec::new();
        write_gmsh_to(&mut buffer, &single_tet()).unwrap();
        let text = String::from_utf8(buffer).unwrap();
        let lines: Vec<&str> = text.lines().collect();

        assert_eq!(lines[0], "$MeshFormat");
        assert_eq!(lines[1], "2.2 0 8");
        assert!(text.contains("2 1 \"patch_3_0\""));
        assert!(text.contains("3 3 \"subdomain_3\""));
        assert!(text.contains("$Nodes\n4\n1 0 0 0\n"));
        assert!(text.contains("$Elements\n3\n1 2 2 1 1 1 3 2\n"));
        assert!(text.contains("3 4 2 3 3 1 2 3 4\n$EndElements"));
    }

    #[test]
    fn test_json_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("mesh.json");
        let mesh = single_tet();
        write_mesh(&path, &mesh).unwrap();
        let loaded = read_mesh_json(&path).unwrap();
        assert_eq!(loaded, mesh);
        assert_eq!(loaded.fingerprint(), mesh.fingerprint());
    }
}
