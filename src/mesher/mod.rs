// SPDX-License-Identifier: Apache-2.0
// Copyright (c) 2025 Polyframe Inc.

//! Delaunay refinement mesher and sliver optimizer

pub mod criteria;
pub mod optimizer;
pub mod queue;
pub mod refiner;
pub mod triangulation;

pub use criteria::{CellSize, RefinementCriteria};
pub use optimizer::{MeshOptimizer, OptimizerConfig, OptimizerReport, OptimizerStage, StageReport};
pub use refiner::{extract_mesh, DelaunayMeshRefiner, RefinementState, RefinementStats, RestrictedFacet};
pub use triangulation::{Insertion, Triangulation, VertexKind};
