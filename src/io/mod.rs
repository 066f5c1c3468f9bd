// SPDX-License-Identifier: Apache-2.0
// Copyright (c) 2025 Polyframe Inc.

//! I/O module - label volumes, surfaces, sizing fields and mesh writers

mod export;
mod stl;
mod volume;

pub use export::{read_mesh_json, write_gmsh, write_mesh, write_mesh_json, MeshFormat};
pub use stl::{read_stl, write_stl};
pub use volume::{read_label_volume, read_png_stack, read_sizing_field, write_label_volume, write_sizing_field};
