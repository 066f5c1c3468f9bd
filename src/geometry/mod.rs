// SPDX-License-Identifier: Apache-2.0
// Copyright (c) 2025 Polyframe Inc.

//! Geometry module - predicates, spatial indexing and mesh representations

pub mod analytics;
mod bbox;
pub mod bvh;
mod mesh;
pub mod mesh_utils;
mod primitives;
pub mod quality;
pub mod robust_predicates;
pub mod triangle_intersection;

pub use analytics::{analyze, MeshStatistics};
pub use bbox::BoundingBox;
pub use bvh::BVH;
pub use mesh::{BoundaryFacet, SurfaceMesh, TetCell, TetMesh};
pub use primitives::Primitive;
pub use robust_predicates::{in_sphere, orient3d, Orientation};
pub use triangle_intersection::{segment_triangle_intersect, triangle_triangle_intersect, SegmentHit};
