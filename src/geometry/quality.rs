// SPDX-License-Identifier: Apache-2.0
// Copyright (c) 2025 Polyframe Inc.

//! Element shape measures used by refinement criteria and the optimizer

use crate::utils::math::rad_to_deg;
use nalgebra::{Matrix3, Point3, Vector3};

/// Circumcenter of a tetrahedron, `None` when the tetrahedron is flat
pub fn circumcenter(tet: &[Point3<f64>; 4]) -> Option<Point3<f64>> {
    weighted_circumcenter(tet, &[0.0; 4])
}

/// Orthocenter of four weighted points (the circumcenter for zero weights)
///
/// Solves `2 (p_i - p_0) . y = |p_i - p_0|^2 - w_i + w_0` for `y = x - p_0`.
pub fn weighted_circumcenter(tet: &[Point3<f64>; 4], weights: &[f64; 4]) -> Option<Point3<f64>> {
    let p0 = tet[0];
    let rows: Vec<Vector3<f64>> = (1..4).map(|i| tet[i] - p0).collect();
    let matrix = Matrix3::from_rows(&[
        rows[0].transpose() * 2.0,
        rows[1].transpose() * 2.0,
        rows[2].transpose() * 2.0,
    ]);
    let rhs = Vector3::new(
        rows[0].norm_squared() - weights[1] + weights[0],
        rows[1].norm_squared() - weights[2] + weights[0],
        rows[2].norm_squared() - weights[3] + weights[0],
    );

    let scale = rows.iter().map(|r| r.norm_squared()).fold(0.0, f64::max);
    if matrix.determinant().abs() <= 1e-14 * scale.powf(1.5) * 8.0 {
        return None;
    }
    let y = matrix.lu().solve(&rhs)?;
    let center = p0 + y;
    center.coords.iter().all(|c| c.is_finite()).then_some(center)
}

/// Squared orthoradius of a weighted cell given its orthocenter
pub fn weighted_radius_squared(center: &Point3<f64>, vertex: &Point3<f64>, weight: f64) -> f64 {
    (center - vertex).norm_squared() - weight
}

/// Circumcenter of a triangle in its own plane
pub fn triangle_circumcenter(a: &Point3<f64>, b: &Point3<f64>, c: &Point3<f64>) -> Option<Point3<f64>> {
    let ab = b - a;
    let ac = c - a;
    let normal = ab.cross(&ac);
    let denom = 2.0 * normal.norm_squared();
    if denom <= f64::MIN_POSITIVE {
        return None;
    }
    let offset = (ac.norm_squared() * normal.cross(&ab) + ab.norm_squared() * ac.cross(&normal)) / denom;
    Some(a + offset)
}

/// Smallest interior angle of a triangle in degrees
pub fn triangle_min_angle(a: &Point3<f64>, b: &Point3<f64>, c: &Point3<f64>) -> f64 {
    let corners = [(a, b, c), (b, c, a), (c, a, b)];
    corners
        .iter()
        .map(|(p, q, r)| angle_between(&(*q - *p), &(*r - *p)))
        .fold(180.0, f64::min)
}

/// Length of the shortest edge of a tetrahedron
pub fn shortest_edge(tet: &[Point3<f64>; 4]) -> f64 {
    let mut shortest = f64::INFINITY;
    for i in 0..4 {
        for j in (i + 1)..4 {
            shortest = shortest.min((tet[i] - tet[j]).norm());
        }
    }
    shortest
}

/// Circumradius over shortest edge; infinite for flat tetrahedra
pub fn radius_edge_ratio(tet: &[Point3<f64>; 4]) -> f64 {
    let Some(center) = circumcenter(tet) else {
        return f64::INFINITY;
    };
    let edge = shortest_edge(tet);
    if edge == 0.0 {
        return f64::INFINITY;
    }
    (center - tet[0]).norm() / edge
}

/// Smallest of the six interior dihedral angles in degrees
pub fn min_dihedral_angle(tet: &[Point3<f64>; 4]) -> f64 {
    const EDGES: [(usize, usize, usize, usize); 6] = [
        (0, 1, 2, 3),
        (0, 2, 1, 3),
        (0, 3, 1, 2),
        (1, 2, 0, 3),
        (1, 3, 0, 2),
        (2, 3, 0, 1),
    ];
    EDGES
        .iter()
        .map(|&(i, j, k, l)| {
            let edge = tet[j] - tet[i];
            let n1 = edge.cross(&(tet[k] - tet[i]));
            let n2 = edge.cross(&(tet[l] - tet[i]));
            angle_between(&n1, &n2)
        })
        .fold(180.0, f64::min)
}

/// Signed volume (positive for positively oriented corners)
pub fn tet_volume(tet: &[Point3<f64>; 4]) -> f64 {
    (tet[1] - tet[0]).dot(&(tet[2] - tet[0]).cross(&(tet[3] - tet[0]))) / 6.0
}

pub fn centroid(tet: &[Point3<f64>; 4]) -> Point3<f64> {
    Point3::from((tet[0].coords + tet[1].coords + tet[2].coords + tet[3].coords) / 4.0)
}

/// Angle between two vectors in degrees; 0 for zero vectors
fn angle_between(u: &Vector3<f64>, v: &Vector3<f64>) -> f64 {
    let denom = u.norm() * v.norm();
    if denom == 0.0 {
        return 0.0;
    }
    rad_to_deg((u.dot(v) / denom).clamp(-1.0, 1.0).acos())
}
