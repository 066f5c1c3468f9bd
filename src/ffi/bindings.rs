// SPDX-License-Identifier: Apache-2.0
// Copyright (c) 2025 Polyframe Inc.

//! Node.js bindings using napi-rs

use napi::bindgen_prelude::*;
use napi_derive::napi;

/// Segment hits in flat arrays
#[napi(object)]
pub struct JsSegmentHits {
    pub faces: Vec<u32>,
    pub segments: Vec<u32>,
    /// Hit points, three coordinates each
    pub points: Vec<f64>,
}

fn to_napi(err: crate::error::MeshError) -> Error {
    Error::from_reason(format!("[{}] {}", err.status_code(), err))
}

/// Whether the triangle mesh intersects itself
#[napi]
pub fn check_self_intersections(vertices: Vec<f64>, faces: Vec<u32>) -> Result<bool> {
    crate::query::check_self_intersections(&vertices, &faces).map_err(to_napi)
}

/// Every segment/face intersection
#[napi]
pub fn segment_triangle_intersection(
    vertices: Vec<f64>,
    faces: Vec<u32>,
    starts: Vec<f64>,
    ends: Vec<f64>,
) -> Result<JsSegmentHits> {
    let hits = crate::query::segment_triangle_intersections(&vertices, &faces, &starts, &ends).map_err(to_napi)?;
    Ok(JsSegmentHits {
        faces: hits.pairs.iter().map(|&(f, _)| f as u32).collect(),
        segments: hits.pairs.iter().map(|&(_, s)| s as u32).collect(),
        points: hits.points,
    })
}
