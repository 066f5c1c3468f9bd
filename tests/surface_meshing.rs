// SPDX-License-Identifier: Apache-2.0
// Copyright (c) 2025 Polyframe Inc.

//! End-to-end meshing of nested closed surfaces

use anyhow::Result;
use nalgebra::Point3;
use std::collections::BTreeSet;
use volmesh::geometry::quality::circumcenter;
use volmesh::geometry::Primitive;
use volmesh::{
    io, mesh_surface_set, mesh_surface_set_with_sizing_field, mesh_surfaces, status_code, CellSize, LabeledSurface,
    MeshError, RefinementCriteria, SizingField, SurfaceMesh,
};

fn criteria() -> RefinementCriteria {
    RefinementCriteria::new(20.0, 1.0, 0.3, 3.0, CellSize::Uniform(1.0))
}

fn sphere(radius: f64) -> SurfaceMesh {
    Primitive::sphere(Point3::origin(), radius, 2).to_mesh()
}

fn nested() -> Vec<LabeledSurface> {
    vec![
        LabeledSurface::new(sphere(2.0), (0, 1)),
        LabeledSurface::new(sphere(1.0), (1, 2)),
    ]
}

#[test]
fn test_nested_spheres() -> Result<()> {
    let mesh = mesh_surface_set(nested(), &criteria(), false)?;

    assert_eq!(mesh.subdomains(), vec![1, 2]);
    assert_eq!(mesh.patch_labels(), BTreeSet::from([(1, 0), (2, 1)]));

    // Inner facets sit near radius 1, outer ones near radius 2
    for facet in &mesh.facets {
        let r = facet
            .vertices
            .iter()
            .map(|&v| mesh.vertices[v].coords.norm())
            .sum::<f64>()
            / 3.0;
        let expected = if facet.patch.inside == 2 { 1.0 } else { 2.0 };
        assert!((r - expected).abs() < 0.2, "facet at radius {} on {}", r, facet.patch);
    }
    Ok(())
}

#[test]
fn test_nested_spheres_any_order() -> Result<()> {
    let mut reversed = nested();
    reversed.reverse();
    let mesh = mesh_surface_set(reversed, &criteria(), false)?;
    assert_eq!(mesh.subdomains(), vec![1, 2]);
    Ok(())
}

#[test]
fn test_nested_spheres_with_sizing_field() -> Result<()> {
    let field = SizingField::uniform([4, 4, 4], [1.0; 3], [-2.0; 3], 0.6)?;
    let fine = mesh_surface_set_with_sizing_field(nested(), &criteria(), field, false)?;
    let plain = mesh_surface_set(nested(), &criteria(), false)?;

    assert_eq!(fine.subdomains(), vec![1, 2]);
    assert!(fine.cell_count() > plain.cell_count());
    for c in 0..fine.cell_count() {
        let tet = fine.tet(c);
        let center = circumcenter(&tet).expect("refined cells are not flat");
        assert!((center - tet[0]).norm() <= 0.6 * (1.0 + 1e-9));
    }
    Ok(())
}

#[test]
fn test_overlapping_spheres_rejected() {
    let a = sphere(1.0);
    let b = Primitive::sphere(Point3::new(0.5, 0.0, 0.0), 1.0, 2).to_mesh();
    let result = mesh_surface_set(
        vec![LabeledSurface::new(a, (0, 1)), LabeledSurface::new(b, (0, 2))],
        &criteria(),
        false,
    );
    assert!(matches!(result, Err(MeshError::DomainInconsistency(_))));
}

#[test]
fn test_inconsistent_labels_rejected() {
    let surfaces = vec![
        LabeledSurface::new(sphere(2.0), (0, 1)),
        LabeledSurface::new(sphere(1.0), (3, 4)),
    ];
    let result = mesh_surface_set(surfaces, &criteria(), false);
    assert_eq!(status_code(&result), 1);
}

#[test]
fn test_open_surface_rejected() {
    let mut open = sphere(1.0);
    open.faces.pop();
    let result = mesh_surface_set(vec![LabeledSurface::new(open, (0, 1))], &criteria(), false);
    assert!(matches!(result, Err(MeshError::DomainInconsistency(_))));
}

#[test]
fn test_mesh_surfaces_from_stl() -> Result<()> {
    let dir = tempfile::tempdir()?;
    let outer = dir.path().join("outer.stl");
    let inner = dir.path().join("inner.stl");
    let output = dir.path().join("spheres.msh");
    io::write_stl(&outer, &sphere(2.0))?;
    io::write_stl(&inner, &sphere(1.0))?;

    let summary = mesh_surfaces(&[&outer, &inner], &[(0, 1), (1, 2)], &output, &criteria(), false)?;

    assert_eq!(summary.subdomains, vec![1, 2]);
    assert_eq!(summary.patches, vec![(1, 0), (2, 1)]);
    let msh = std::fs::read_to_string(&output)?;
    assert!(msh.contains("\"subdomain_2\""));
    Ok(())
}

#[test]
fn test_mesh_surfaces_pair_count_mismatch() -> Result<()> {
    let dir = tempfile::tempdir()?;
    let outer = dir.path().join("outer.stl");
    io::write_stl(&outer, &sphere(2.0))?;
    let result = mesh_surfaces(&[&outer], &[(0, 1), (1, 2)], dir.path().join("out.msh"), &criteria(), false);
    assert!(matches!(result, Err(MeshError::DomainInconsistency(_))));
    Ok(())
}
