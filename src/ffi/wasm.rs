// SPDX-License-Identifier: Apache-2.0
// Copyright (c) 2025 Polyframe Inc.

//! WASM bindings using wasm-bindgen

use crate::query;
use wasm_bindgen::prelude::*;

/// Segment hits in flat arrays
#[wasm_bindgen]
pub struct WasmSegmentHits {
    inner: query::SegmentHits,
}

#[wasm_bindgen]
impl WasmSegmentHits {
    pub fn len(&self) -> usize {
        self.inner.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.is_empty()
    }

    /// Face index of each hit
    pub fn faces(&self) -> Vec<u32> {
        self.inner.pairs.iter().map(|&(f, _)| f as u32).collect()
    }

    /// Segment index of each hit
    pub fn segments(&self) -> Vec<u32> {
        self.inner.pairs.iter().map(|&(_, s)| s as u32).collect()
    }

    /// Hit points, three coordinates each
    pub fn points(&self) -> Vec<f64> {
        self.inner.points.clone()
    }
}

fn to_js(err: crate::error::MeshError) -> JsValue {
    JsValue::from_str(&format!("[{}] {}", err.status_code(), err))
}

/// Whether the triangle mesh intersects itself
#[wasm_bindgen(js_name = checkSelfIntersections)]
pub fn check_self_intersections(vertices: &[f64], faces: &[u32]) -> Result<bool, JsValue> {
    query::check_self_intersections(vertices, faces).map_err(to_js)
}

/// Every segment/face intersection
#[wasm_bindgen(js_name = segmentTriangleIntersection)]
pub fn segment_triangle_intersection(
    vertices: &[f64],
    faces: &[u32],
    starts: &[f64],
    ends: &[f64],
) -> Result<WasmSegmentHits, JsValue> {
    query::segment_triangle_intersections(vertices, faces, starts, ends)
        .map(|inner| WasmSegmentHits { inner })
        .map_err(to_js)
}

/// Get version information
#[wasm_bindgen]
pub fn version() -> String {
    env!("CARGO_PKG_VERSION").to_string()
}
