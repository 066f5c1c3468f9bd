// SPDX-License-Identifier: Apache-2.0
// Copyright (c) 2025 Polyframe Inc.

//! Volmesh
//!
//! Delaunay-refinement tetrahedral mesher for labeled images and
//! multi-surface domains, with exact geometric predicates and
//! self-intersection / segment-triangle intersection queries.

pub mod config;
pub mod domain;
pub mod error;
pub mod geometry;
pub mod io;
pub mod kernel;
pub mod mesher;
pub mod query;
pub mod utils;

#[cfg(any(feature = "wasm", feature = "napi"))]
pub mod ffi;

pub use domain::{
    LabelVolume, LabeledImageDomain, LabeledSurface, MeshDomain, SizingField, SubdomainId, SurfaceDomain,
    SurfacePatchId, BACKGROUND,
};
pub use error::{status_code, MeshError, MeshResult};
pub use geometry::{SurfaceMesh, TetMesh};
pub use kernel::{
    check_self_intersections, mesh_image, mesh_image_with_sizing_field, mesh_surface_set,
    mesh_surface_set_with_sizing_field, mesh_surfaces, mesh_volume, segment_triangle_intersection, MeshSummary, Mesher,
};
pub use mesher::{CellSize, DelaunayMeshRefiner, MeshOptimizer, OptimizerConfig, RefinementCriteria};
pub use query::SegmentHits;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_basic_volume() {
        let volume = LabelVolume::filled([3, 3, 3], [1.0; 3], [0.0; 3], 1).unwrap();
        let criteria = RefinementCriteria::new(20.0, 2.0, 1.0, 3.0, CellSize::Uniform(2.0));
        let mesh = mesh_volume(volume, &criteria, false).unwrap();
        assert_eq!(mesh.subdomains(), vec![1]);
    }
}
