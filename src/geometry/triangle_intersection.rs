// SPDX-License-Identifier: Apache-2.0
// Copyright (c) 2025 Polyframe Inc.

//! Segment-triangle and triangle-triangle intersection
//! Handles coplanar cases robustly using robust predicates
//!
//! Intersection *decisions* are exact (they only combine signs of
//! [`orient3d`] and [`orient2d`]); intersection *points* and barycentric
//! coordinates are computed in floating point afterwards.

use super::robust_predicates::{is_degenerate_triangle, orient2d, orient3d, oriented_volume, Orientation};
use nalgebra::Point3;

/// Where a segment meets a triangle
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SegmentHit {
    /// Segment parameter in [0, 1], 0 at the segment start
    pub t: f64,
    /// Barycentric coordinates of the hit with respect to the triangle corners
    pub barycentric: [f64; 3],
    pub point: Point3<f64>,
}

/// Intersect segment `a`-`b` with a closed triangle
///
/// Returns the first point of contact seen from `a`. Zero-length segments and
/// zero-area triangles never intersect.
pub fn segment_triangle_intersect(
    a: &Point3<f64>,
    b: &Point3<f64>,
    tri: &[Point3<f64>; 3],
) -> Option<SegmentHit> {
    if a == b || is_degenerate_triangle(&tri[0], &tri[1], &tri[2]) {
        return None;
    }

    let sa = orient3d(&tri[0], &tri[1], &tri[2], a);
    let sb = orient3d(&tri[0], &tri[1], &tri[2], b);

    if sa.is_degenerate() && sb.is_degenerate() {
        return coplanar_segment_hit(a, b, tri);
    }
    if sa == sb {
        return None;
    }
    if !line_pierces_triangle(a, b, tri) {
        return None;
    }

    let t = if sa.is_degenerate() {
        0.0
    } else if sb.is_degenerate() {
        1.0
    } else {
        let va = oriented_volume(&tri[0], &tri[1], &tri[2], a);
        let vb = oriented_volume(&tri[0], &tri[1], &tri[2], b);
        (va / (va - vb)).clamp(0.0, 1.0)
    };
    let point = a + (b - a) * t;
    Some(SegmentHit {
        t,
        barycentric: barycentric_from_line(a, b, tri),
        point,
    })
}

/// Exact closed test: does segment `a`-`b` touch triangle `tri`?
pub fn segment_intersects_triangle(a: &Point3<f64>, b: &Point3<f64>, tri: &[Point3<f64>; 3]) -> bool {
    if a == b || is_degenerate_triangle(&tri[0], &tri[1], &tri[2]) {
        return false;
    }
    let sa = orient3d(&tri[0], &tri[1], &tri[2], a);
    let sb = orient3d(&tri[0], &tri[1], &tri[2], b);

    if sa.is_degenerate() && sb.is_degenerate() {
        return match projection_axis(tri) {
            Some(axis) => coplanar_segment_touches(a, b, tri, axis),
            None => false,
        };
    }
    if sa == sb {
        return false;
    }
    line_pierces_triangle(a, b, tri)
}

/// Test if two closed triangles share at least one point
pub fn triangle_triangle_intersect(p: &[Point3<f64>; 3], q: &[Point3<f64>; 3]) -> bool {
    if is_degenerate_triangle(&p[0], &p[1], &p[2]) || is_degenerate_triangle(&q[0], &q[1], &q[2]) {
        return false;
    }

    let dq = [
        orient3d(&p[0], &p[1], &p[2], &q[0]),
        orient3d(&p[0], &p[1], &p[2], &q[1]),
        orient3d(&p[0], &p[1], &p[2], &q[2]),
    ];
    if strictly_one_side(&dq) {
        return false;
    }
    if dq.iter().all(|o| o.is_degenerate()) {
        return coplanar_triangles_intersect(p, q);
    }

    let dp = [
        orient3d(&q[0], &q[1], &q[2], &p[0]),
        orient3d(&q[0], &q[1], &q[2], &p[1]),
        orient3d(&q[0], &q[1], &q[2], &p[2]),
    ];
    if strictly_one_side(&dp) {
        return false;
    }

    // Two non-coplanar triangles meet iff an edge of one touches the other.
    (0..3).any(|i| segment_intersects_triangle(&p[i], &p[(i + 1) % 3], q))
        || (0..3).any(|i| segment_intersects_triangle(&q[i], &q[(i + 1) % 3], p))
}

/// Check whether two triangles lying in one plane overlap
pub fn coplanar_triangles_intersect(p: &[Point3<f64>; 3], q: &[Point3<f64>; 3]) -> bool {
    let Some(axis) = projection_axis(p) else {
        return false;
    };
    let p2 = p.map(|v| project(&v, axis));
    let q2 = q.map(|v| project(&v, axis));

    for i in 0..3 {
        for j in 0..3 {
            if segments_intersect_2d(p2[i], p2[(i + 1) % 3], q2[j], q2[(j + 1) % 3]) {
                return true;
            }
        }
    }
    point_in_triangle_2d(p2[0], &q2) || point_in_triangle_2d(q2[0], &p2)
}

fn strictly_one_side(signs: &[Orientation; 3]) -> bool {
    signs.iter().all(|&o| o == Orientation::Positive) || signs.iter().all(|&o| o == Orientation::Negative)
}

/// The infinite line through `a`, `b` passes through the closed triangle
fn line_pierces_triangle(a: &Point3<f64>, b: &Point3<f64>, tri: &[Point3<f64>; 3]) -> bool {
    let s = [
        orient3d(a, b, &tri[0], &tri[1]).sign(),
        orient3d(a, b, &tri[1], &tri[2]).sign(),
        orient3d(a, b, &tri[2], &tri[0]).sign(),
    ];
    let has_positive = s.iter().any(|&x| x > 0);
    let has_negative = s.iter().any(|&x| x < 0);
    !(has_positive && has_negative)
}

fn barycentric_from_line(a: &Point3<f64>, b: &Point3<f64>, tri: &[Point3<f64>; 3]) -> [f64; 3] {
    let w0 = oriented_volume(a, b, &tri[1], &tri[2]);
    let w1 = oriented_volume(a, b, &tri[2], &tri[0]);
    let w2 = oriented_volume(a, b, &tri[0], &tri[1]);
    let sum = w0 + w1 + w2;
    if sum == 0.0 {
        return [1.0 / 3.0; 3];
    }
    [w0 / sum, w1 / sum, w2 / sum]
}

/// Pick a coordinate plane the triangle projects onto without collapsing
fn projection_axis(tri: &[Point3<f64>; 3]) -> Option<usize> {
    let normal = (tri[1] - tri[0]).cross(&(tri[2] - tri[0]));
    let mut axes = [0usize, 1, 2];
    axes.sort_by(|&i, &j| normal[j].abs().total_cmp(&normal[i].abs()));
    axes.into_iter().find(|&axis| {
        !orient2d(project(&tri[0], axis), project(&tri[1], axis), project(&tri[2], axis)).is_degenerate()
    })
}

/// Drop coordinate `axis`, keeping a right-handed pair
fn project(p: &Point3<f64>, axis: usize) -> [f64; 2] {
    match axis {
        0 => [p.y, p.z],
        1 => [p.z, p.x],
        _ => [p.x, p.y],
    }
}

fn coplanar_segment_touches(a: &Point3<f64>, b: &Point3<f64>, tri: &[Point3<f64>; 3], axis: usize) -> bool {
    let a2 = project(a, axis);
    let b2 = project(b, axis);
    let t2 = tri.map(|v| project(&v, axis));
    point_in_triangle_2d(a2, &t2)
        || point_in_triangle_2d(b2, &t2)
        || (0..3).any(|i| segments_intersect_2d(a2, b2, t2[i], t2[(i + 1) % 3]))
}

/// Entry point of a segment lying in the triangle's plane
fn coplanar_segment_hit(a: &Point3<f64>, b: &Point3<f64>, tri: &[Point3<f64>; 3]) -> Option<SegmentHit> {
    let axis = projection_axis(tri)?;
    if !coplanar_segment_touches(a, b, tri, axis) {
        return None;
    }

    // Cyrus-Beck clip of the projected segment against the three edge half-planes.
    let a2 = project(a, axis);
    let b2 = project(b, axis);
    let t2 = tri.map(|v| project(&v, axis));
    let ccw = orient2d(t2[0], t2[1], t2[2]).sign() as f64;
    let mut t_enter = 0.0f64;
    for i in 0..3 {
        let p = t2[i];
        let q = t2[(i + 1) % 3];
        let side = |x: [f64; 2]| ccw * ((q[0] - p[0]) * (x[1] - p[1]) - (q[1] - p[1]) * (x[0] - p[0]));
        let sa = side(a2);
        let sb = side(b2);
        if sa < 0.0 && sb > sa {
            t_enter = t_enter.max(sa / (sa - sb));
        }
    }
    let t = t_enter.clamp(0.0, 1.0);
    let point = a + (b - a) * t;
    Some(SegmentHit {
        t,
        barycentric: planar_barycentric(&point, tri, axis),
        point,
    })
}

fn planar_barycentric(point: &Point3<f64>, tri: &[Point3<f64>; 3], axis: usize) -> [f64; 3] {
    let p = project(point, axis);
    let [v0, v1, v2] = tri.map(|v| project(&v, axis));
    let area = |a: [f64; 2], b: [f64; 2], c: [f64; 2]| (b[0] - a[0]) * (c[1] - a[1]) - (b[1] - a[1]) * (c[0] - a[0]);
    let total = area(v0, v1, v2);
    if total == 0.0 {
        return [1.0 / 3.0; 3];
    }
    [area(p, v1, v2) / total, area(v0, p, v2) / total, area(v0, v1, p) / total]
}

/// Test if point is inside the closed 2D triangle
fn point_in_triangle_2d(p: [f64; 2], tri: &[[f64; 2]; 3]) -> bool {
    let orientation = orient2d(tri[0], tri[1], tri[2]).sign();
    if orientation == 0 {
        return false;
    }
    (0..3).all(|i| {
        let s = orient2d(tri[i], tri[(i + 1) % 3], p).sign();
        s == 0 || s == orientation
    })
}

/// Exact closed segment-segment test in 2D
fn segments_intersect_2d(p1: [f64; 2], p2: [f64; 2], q1: [f64; 2], q2: [f64; 2]) -> bool {
    let d1 = orient2d(q1, q2, p1).sign();
    let d2 = orient2d(q1, q2, p2).sign();
    let d3 = orient2d(p1, p2, q1).sign();
    let d4 = orient2d(p1, p2, q2).sign();

    if d1 * d2 < 0 && d3 * d4 < 0 {
        return true;
    }
    (d1 == 0 && within_span(q1, q2, p1))
        || (d2 == 0 && within_span(q1, q2, p2))
        || (d3 == 0 && within_span(p1, p2, q1))
        || (d4 == 0 && within_span(p1, p2, q2))
}

/// For a point collinear with segment a-b, check it lies between the endpoints
fn within_span(a: [f64; 2], b: [f64; 2], p: [f64; 2]) -> bool {
    p[0] >= a[0].min(b[0]) && p[0] <= a[0].max(b[0]) && p[1] >= a[1].min(b[1]) && p[1] <= a[1].max(b[1])
}

#[cfg(test)]
mod tests {
    use super::*;

    fn xy_triangle(x: f64, y: f64, size: f64) -> [Point3<f64>; 3] {
        [
            Point3::new(x, y, 0.0),
            Point3::new(x + size, y, 0.0),
            Point3::new(x + size / 2.0, y + size, 0.0),
        ]
    }

    #[test]
    fn test_segment_hits_unit_triangle() {
        let tri = [
            Point3::new(0.0, 0.0, 0.0),
            Point3::new(1.0, 0.0, 0.0),
            Point3::new(0.0, 1.0, 0.0),
        ];
        let hit = segment_triangle_intersect(
            &Point3::new(0.2, 0.2, -1.0),
            &Point3::new(0.2, 0.2, 1.0),
            &tri,
        )
        .expect("segment crosses the triangle");

        assert_eq!(hit.point, Point3::new(0.2, 0.2, 0.0));
        assert!((hit.t - 0.5).abs() < 1e-15);
        let sum: f64 = hit.barycentric.iter().sum();
        assert!((sum - 1.0).abs() < 1e-12);
        assert!((hit.barycentric[1] - 0.2).abs() < 1e-12);
    }

    #[test]
    fn test_segment_misses_triangle() {
        let tri = xy_triangle(0.0, 0.0, 1.0);
        // passes beside the triangle
        assert!(segment_triangle_intersect(&Point3::new(2.0, 2.0, -1.0), &Point3::new(2.0, 2.0, 1.0), &tri).is_none());
        // stops short of the plane
        assert!(segment_triangle_intersect(&Point3::new(0.5, 0.2, -1.0), &Point3::new(0.5, 0.2, -0.1), &tri).is_none());
        // zero length
        let p = Point3::new(0.5, 0.2, 0.0);
        assert!(segment_triangle_intersect(&p, &p, &tri).is_none());
    }

    #[test]
    fn test_segment_through_vertex_counts() {
        let tri = xy_triangle(0.0, 0.0, 1.0);
        assert!(segment_intersects_triangle(&Point3::new(0.0, 0.0, -1.0), &Point3::new(0.0, 0.0, 1.0), &tri));
    }

    #[test]
    fn test_coplanar_segment_entry_point() {
        let tri = [
            Point3::new(0.0, 0.0, 0.0),
            Point3::new(1.0, 0.0, 0.0),
            Point3::new(0.0, 1.0, 0.0),
        ];
        let hit = segment_triangle_intersect(&Point3::new(-1.0, 0.25, 0.0), &Point3::new(1.0, 0.25, 0.0), &tri)
            .expect("coplanar segment crosses the triangle");
        assert!((hit.point.x - 0.0).abs() < 1e-12);
        assert!((hit.t - 0.5).abs() < 1e-12);
    }

    #[test]
    fn test_triangle_intersection_disjoint() {
        let tri_a = xy_triangle(0.0, 0.0, 1.0);
        let tri_b = xy_triangle(2.0, 0.0, 1.0);
        assert!(!triangle_triangle_intersect(&tri_a, &tri_b));
    }

    #[test]
    fn test_triangle_intersection_coplanar_overlap() {
        let tri_a = xy_triangle(0.0, 0.0, 2.0);
        let tri_b = xy_triangle(0.5, 0.5, 2.0);
        assert!(triangle_triangle_intersect(&tri_a, &tri_b));
    }

    #[test]
    fn test_triangle_intersection_coplanar_nested() {
        let outer = xy_triangle(0.0, 0.0, 10.0);
        let inner = xy_triangle(4.0, 1.0, 1.0);
        assert!(triangle_triangle_intersect(&outer, &inner));
        assert!(triangle_triangle_intersect(&inner, &outer));
    }

    #[test]
    fn test_perpendicular_triangles() {
        let t1 = [
            Point3::new(-1.0, -1.0, 0.0),
            Point3::new(1.0, -1.0, 0.0),
            Point3::new(0.0, 1.0, 0.0),
        ];
        let crossing = [
            Point3::new(-1.0, 0.0, -1.0),
            Point3::new(1.0, 0.0, -1.0),
            Point3::new(0.0, 0.0, 1.0),
        ];
        let apart = [
            Point3::new(-1.0, 5.0, -1.0),
            Point3::new(1.0, 5.0, -1.0),
            Point3::new(0.0, 5.0, 1.0),
        ];
        assert!(triangle_triangle_intersect(&t1, &crossing));
        assert!(!triangle_triangle_intersect(&t1, &apart));
    }

    #[test]
    fn test_degenerate_triangle_never_intersects() {
        let flat = [
            Point3::new(0.0, 0.0, 0.0),
            Point3::new(1.0, 0.0, 0.0),
            Point3::new(2.0, 0.0, 0.0),
        ];
        let tri = xy_triangle(0.0, -1.0, 3.0);
        assert!(!triangle_triangle_intersect(&flat, &tri));
    }
}
