// SPDX-License-Identifier: Apache-2.0
// Copyright (c) 2025 Polyframe Inc.

//! Math utilities

use nalgebra::{Point3, Vector3};

/// Unit normal of a triangle given three vertices, `None` when the triangle has no area
pub fn triangle_normal(p0: &Point3<f64>, p1: &Point3<f64>, p2: &Point3<f64>) -> Option<Vector3<f64>> {
    let n = (p1 - p0).cross(&(p2 - p0));
    let len = n.norm();
    (len > 0.0).then(|| n / len)
}

fn lerp(a: f64, b: f64, t: f64) -> f64 {
    a + (b - a) * t
}

/// Trilinear interpolation of the eight corner values of a unit cell
///
/// `c[i + 2 j + 4 k]` is the value at corner `(i, j, k)`.
pub fn trilerp(c: &[f64; 8], t: &Vector3<f64>) -> f64 {
    let x00 = lerp(c[0], c[1], t.x);
    let x10 = lerp(c[2], c[3], t.x);
    let x01 = lerp(c[4], c[5], t.x);
    let x11 = lerp(c[6], c[7], t.x);
    lerp(lerp(x00, x10, t.y), lerp(x01, x11, t.y), t.z)
}

/// Convert radians to degrees
pub fn rad_to_deg(rad: f64) -> f64 {
    rad * 180.0 / std::f64::consts::PI
}
