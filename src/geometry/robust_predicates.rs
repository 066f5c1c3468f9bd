// SPDX-License-Identifier: Apache-2.0
// Copyright (c) 2025 Polyframe Inc.

//! Robust geometric predicates for Delaunay refinement
//! Implements adaptive precision fallback for near-degenerate cases
//!
//! Every predicate first evaluates its determinant in plain `f64` together with
//! a static error bound derived from the permanent of the expression. When the
//! magnitude of the result is below that bound the determinant is re-evaluated
//! exactly on floating-point expansions (sums of non-overlapping doubles built
//! from error-free two-sum and fused two-product). The returned signs are
//! therefore exact for every finite input; only overflow or underflow of the
//! intermediate products can break the guarantee.

use nalgebra::Point3;

/// Unit roundoff of `f64` (2^-53)
const EPSILON: f64 = f64::EPSILON * 0.5;

const O2D_ERRBOUND: f64 = (3.0 + 16.0 * EPSILON) * EPSILON;
const O3D_ERRBOUND: f64 = (7.0 + 56.0 * EPSILON) * EPSILON;
// The weighted lift adds two terms per row on top of the classic insphere
// evaluation, so the classic (16 + 224e)e bound is doubled.
const POWER_ERRBOUND: f64 = (32.0 + 448.0 * EPSILON) * EPSILON;

/// Sign of an orientation-like determinant
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Orientation {
    Positive,
    Negative,
    /// Exactly zero: the points are coplanar (or collinear in 2D)
    Degenerate,
}

impl Orientation {
    fn from_value(value: f64) -> Self {
        if value > 0.0 {
            Orientation::Positive
        } else if value < 0.0 {
            Orientation::Negative
        } else {
            Orientation::Degenerate
        }
    }

    pub fn sign(self) -> i32 {
        match self {
            Orientation::Positive => 1,
            Orientation::Negative => -1,
            Orientation::Degenerate => 0,
        }
    }

    pub fn is_degenerate(self) -> bool {
        self == Orientation::Degenerate
    }
}

/// Compute oriented volume of tetrahedron (a, b, c, d)
/// Returns positive value if d is on the positive side of plane (a, b, c)
///
/// This is six times the signed volume in plain floating point; use
/// [`orient3d`] when only the sign matters.
pub fn oriented_volume(
    a: &Point3<f64>,
    b: &Point3<f64>,
    c: &Point3<f64>,
    d: &Point3<f64>,
) -> f64 {
    let ab = b - a;
    let ac = c - a;
    let ad = d - a;
    ab.dot(&ac.cross(&ad))
}

/// Exact sign of det[b - a, c - a, d - a]
///
/// Positive when `d` lies on the side of plane (a, b, c) that the normal
/// `(b - a) x (c - a)` points to.
pub fn orient3d(a: &Point3<f64>, b: &Point3<f64>, c: &Point3<f64>, d: &Point3<f64>) -> Orientation {
    let (ux, uy, uz) = (b.x - a.x, b.y - a.y, b.z - a.z);
    let (vx, vy, vz) = (c.x - a.x, c.y - a.y, c.z - a.z);
    let (wx, wy, wz) = (d.x - a.x, d.y - a.y, d.z - a.z);

    let m1 = vy * wz - vz * wy;
    let m2 = vz * wx - vx * wz;
    let m3 = vx * wy - vy * wx;
    let det = ux * m1 + uy * m2 + uz * m3;

    let permanent = ux.abs() * ((vy * wz).abs() + (vz * wy).abs())
        + uy.abs() * ((vz * wx).abs() + (vx * wz).abs())
        + uz.abs() * ((vx * wy).abs() + (vy * wx).abs());

    if det.abs() > O3D_ERRBOUND * permanent {
        return Orientation::from_value(det);
    }

    orient3d_exact(a, b, c, d)
}

fn orient3d_exact(a: &Point3<f64>, b: &Point3<f64>, c: &Point3<f64>, d: &Point3<f64>) -> Orientation {
    let u = diff_point(b, a);
    let v = diff_point(c, a);
    let w = diff_point(d, a);
    Orientation::from_value(det3_exact(&u, &v, &w).sign())
}

/// Exact sign of the 2D orientation of (a, b, c)
///
/// Positive when the triangle turns counterclockwise.
pub fn orient2d(a: [f64; 2], b: [f64; 2], c: [f64; 2]) -> Orientation {
    let left = (b[0] - a[0]) * (c[1] - a[1]);
    let right = (b[1] - a[1]) * (c[0] - a[0]);
    let det = left - right;
    let permanent = left.abs() + right.abs();

    if det.abs() > O2D_ERRBOUND * permanent {
        return Orientation::from_value(det);
    }

    let bx = Expansion::diff(b[0], a[0]);
    let by = Expansion::diff(b[1], a[1]);
    let cx = Expansion::diff(c[0], a[0]);
    let cy = Expansion::diff(c[1], a[1]);
    let exact = bx.mul(&cy).sub(&by.mul(&cx));
    Orientation::from_value(exact.sign())
}

/// Exact in-sphere test
///
/// For a positively oriented tetrahedron (a, b, c, d) returns `Positive` when
/// `e` lies strictly inside its circumsphere, `Negative` when strictly outside
/// and `Degenerate` when the five points are cospherical.
pub fn in_sphere(
    a: &Point3<f64>,
    b: &Point3<f64>,
    c: &Point3<f64>,
    d: &Point3<f64>,
    e: &Point3<f64>,
) -> Orientation {
    power_test([(a, 0.0), (b, 0.0), (c, 0.0), (d, 0.0)], (e, 0.0))
}

/// Exact power test for weighted points
///
/// The weighted generalization of [`in_sphere`]: for a positively oriented
/// cell, `Positive` means the query's power distance to the cell's orthosphere
/// is smaller than its own weight, i.e. the query conflicts with the cell in a
/// regular (weighted Delaunay) triangulation.
pub fn power_test(cell: [(&Point3<f64>, f64); 4], query: (&Point3<f64>, f64)) -> Orientation {
    let (e, we) = query;

    let mut rows = [[0.0f64; 4]; 4];
    for (row, (p, w)) in rows.iter_mut().zip(cell.iter()) {
        let dx = p.x - e.x;
        let dy = p.y - e.y;
        let dz = p.z - e.z;
        *row = [dx, dy, dz, dx * dx + dy * dy + dz * dz - w + we];
    }

    let minors = [
        det3_rows(&rows[1], &rows[2], &rows[3]),
        det3_rows(&rows[0], &rows[2], &rows[3]),
        det3_rows(&rows[0], &rows[1], &rows[3]),
        det3_rows(&rows[0], &rows[1], &rows[2]),
    ];
    let det = -rows[0][3] * minors[0] + rows[1][3] * minors[1] - rows[2][3] * minors[2]
        + rows[3][3] * minors[3];

    let lift_permanent = |i: usize| {
        let (p, w) = cell[i];
        let dx = p.x - e.x;
        let dy = p.y - e.y;
        let dz = p.z - e.z;
        dx * dx + dy * dy + dz * dz + w.abs() + we.abs()
    };
    let permanent = lift_permanent(0) * perm3_rows(&rows[1], &rows[2], &rows[3])
        + lift_permanent(1) * perm3_rows(&rows[0], &rows[2], &rows[3])
        + lift_permanent(2) * perm3_rows(&rows[0], &rows[1], &rows[3])
        + lift_permanent(3) * perm3_rows(&rows[0], &rows[1], &rows[2]);

    // The lifted determinant is negative for conflicting queries.
    if det.abs() > POWER_ERRBOUND * permanent {
        return Orientation::from_value(-det);
    }

    power_test_exact(cell, query)
}

fn power_test_exact(cell: [(&Point3<f64>, f64); 4], query: (&Point3<f64>, f64)) -> Orientation {
    let (e, we) = query;
    let weight_e = Expansion::from_f64(we);

    let rows: Vec<([Expansion; 3], Expansion)> = cell
        .iter()
        .map(|(p, w)| {
            let d = diff_point(p, e);
            let lift = d[0]
                .mul(&d[0])
                .add(&d[1].mul(&d[1]))
                .add(&d[2].mul(&d[2]))
                .sub(&Expansion::from_f64(*w))
                .add(&weight_e);
            (d, lift)
        })
        .collect();

    let m0 = det3_exact(&rows[1].0, &rows[2].0, &rows[3].0);
    let m1 = det3_exact(&rows[0].0, &rows[2].0, &rows[3].0);
    let m2 = det3_exact(&rows[0].0, &rows[1].0, &rows[3].0);
    let m3 = det3_exact(&rows[0].0, &rows[1].0, &rows[2].0);

    let det = rows[1]
        .1
        .mul(&m1)
        .add(&rows[3].1.mul(&m3))
        .sub(&rows[0].1.mul(&m0))
        .sub(&rows[2].1.mul(&m2));

    Orientation::from_value(-det.sign())
}

/// Exact test for a zero-area triangle (coincident or collinear corners)
pub fn is_degenerate_triangle(a: &Point3<f64>, b: &Point3<f64>, c: &Point3<f64>) -> bool {
    orient2d([a.x, a.y], [b.x, b.y], [c.x, c.y]).is_degenerate()
        && orient2d([a.y, a.z], [b.y, b.z], [c.y, c.z]).is_degenerate()
        && orient2d([a.z, a.x], [b.z, b.x], [c.z, c.x]).is_degenerate()
}

fn det3_rows(p: &[f64; 4], q: &[f64; 4], r: &[f64; 4]) -> f64 {
    p[0] * (q[1] * r[2] - q[2] * r[1]) + p[1] * (q[2] * r[0] - q[0] * r[2])
        + p[2] * (q[0] * r[1] - q[1] * r[0])
}

fn perm3_rows(p: &[f64; 4], q: &[f64; 4], r: &[f64; 4]) -> f64 {
    p[0].abs() * ((q[1] * r[2]).abs() + (q[2] * r[1]).abs())
        + p[1].abs() * ((q[2] * r[0]).abs() + (q[0] * r[2]).abs())
        + p[2].abs() * ((q[0] * r[1]).abs() + (q[1] * r[0]).abs())
}

fn diff_point(p: &Point3<f64>, q: &Point3<f64>) -> [Expansion; 3] {
    [
        Expansion::diff(p.x, q.x),
        Expansion::diff(p.y, q.y),
        Expansion::diff(p.z, q.z),
    ]
}

fn det3_exact(u: &[Expansion; 3], v: &[Expansion; 3], w: &[Expansion; 3]) -> Expansion {
    let m1 = v[1].mul(&w[2]).sub(&v[2].mul(&w[1]));
    let m2 = v[2].mul(&w[0]).sub(&v[0].mul(&w[2]));
    let m3 = v[0].mul(&w[1]).sub(&v[1].mul(&w[0]));
    u[0].mul(&m1).add(&u[1].mul(&m2)).add(&u[2].mul(&m3))
}

/// Error-free transformation: a + b = s + err exactly
#[inline]
fn two_sum(a: f64, b: f64) -> (f64, f64) {
    let s = a + b;
    let bv = s - a;
    let av = s - bv;
    (s, (a - av) + (b - bv))
}

/// Two-sum for |a| >= |b|
#[inline]
fn fast_two_sum(a: f64, b: f64) -> (f64, f64) {
    let s = a + b;
    (s, b - (s - a))
}

/// Error-free transformation: a * b = p + err exactly (fused multiply-add)
#[inline]
fn two_product(a: f64, b: f64) -> (f64, f64) {
    let p = a * b;
    (p, a.mul_add(b, -p))
}

/// Arbitrary precision value stored as a sum of non-overlapping doubles
/// ordered by increasing magnitude, zero components removed
#[derive(Debug, Clone, Default)]
struct Expansion(Vec<f64>);

impl Expansion {
    fn from_f64(value: f64) -> Self {
        if value == 0.0 {
            Self(Vec::new())
        } else {
            Self(vec![value])
        }
    }

    fn diff(a: f64, b: f64) -> Self {
        let (s, err) = two_sum(a, -b);
        Self::from_pair(s, err)
    }

    fn from_pair(high: f64, low: f64) -> Self {
        let mut components = Vec::with_capacity(2);
        if low != 0.0 {
            components.push(low);
        }
        if high != 0.0 {
            components.push(high);
        }
        Self(components)
    }

    /// Shewchuk's GROW-EXPANSION with zero elimination
    fn grow(components: &[f64], b: f64) -> Vec<f64> {
        let mut result = Vec::with_capacity(components.len() + 1);
        let mut q = b;
        for &e in components {
            let (s, err) = two_sum(q, e);
            if err != 0.0 {
                result.push(err);
            }
            q = s;
        }
        if q != 0.0 {
            result.push(q);
        }
        result
    }

    fn add(&self, other: &Expansion) -> Expansion {
        let mut acc = self.0.clone();
        for &f in &other.0 {
            acc = Self::grow(&acc, f);
        }
        Expansion(acc)
    }

    fn sub(&self, other: &Expansion) -> Expansion {
        self.add(&other.negate())
    }

    fn negate(&self) -> Expansion {
        Expansion(self.0.iter().map(|x| -x).collect())
    }

    /// Shewchuk's SCALE-EXPANSION with zero elimination
    fn scale(&self, b: f64) -> Expansion {
        if b == 0.0 || self.0.is_empty() {
            return Expansion::default();
        }
        let mut result = Vec::with_capacity(2 * self.0.len());
        let (mut q, low) = two_product(self.0[0], b);
        if low != 0.0 {
            result.push(low);
        }
        for &e in &self.0[1..] {
            let (product_high, product_low) = two_product(e, b);
            let (sum, err) = two_sum(q, product_low);
            if err != 0.0 {
                result.push(err);
            }
            let (next, err) = fast_two_sum(product_high, sum);
            if err != 0.0 {
                result.push(err);
            }
            q = next;
        }
        if q != 0.0 {
            result.push(q);
        }
        Expansion(result)
    }

    fn mul(&self, other: &Expansion) -> Expansion {
        other
            .0
            .iter()
            .fold(Expansion::default(), |acc, &f| acc.add(&self.scale(f)))
    }

    /// The largest component carries the sign of the whole expansion
    fn sign(&self) -> f64 {
        self.0.last().map(|x| x.signum()).unwrap_or(0.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn unit_tetrahedron() -> [Point3<f64>; 4] {
        [
            Point3::new(0.0, 0.0, 0.0),
            Point3::new(1.0, 0.0, 0.0),
            Point3::new(0.0, 1.0, 0.0),
            Point3::new(0.0, 0.0, 1.0),
        ]
    }

    #[test]
    fn test_oriented_volume() {
        let [a, b, c, d] = unit_tetrahedron();
        assert!(oriented_volume(&a, &b, &c, &d) > 0.0);

        let d2 = Point3::new(0.0, 0.0, -1.0);
        assert!(oriented_volume(&a, &b, &c, &d2) < 0.0);
    }

    #[test]
    fn test_orient3d_signs() {
        let [a, b, c, d] = unit_tetrahedron();
        assert_eq!(orient3d(&a, &b, &c, &d), Orientation::Positive);
        assert_eq!(orient3d(&b, &a, &c, &d), Orientation::Negative);

        let on_plane = Point3::new(0.3, 0.3, 0.0);
        assert_eq!(orient3d(&a, &b, &c, &on_plane), Orientation::Degenerate);
    }

    #[test]
    fn test_orient3d_near_degenerate_is_exact() {
        // d sits a couple of ulps above the plane z = 0.1.
        let a = Point3::new(0.1, 0.1, 0.1);
        let b = Point3::new(0.7, 0.3, 0.1);
        let c = Point3::new(0.2, 0.9, 0.1);
        let above = Point3::new(0.4, 0.4, 0.1 + 1e-17 + f64::EPSILON * 0.1);
        let exactly_on = Point3::new(0.4, 0.4, 0.1);

        assert_eq!(orient3d(&a, &b, &c, &exactly_on), Orientation::Degenerate);
        let sign = orient3d(&a, &b, &c, &above);
        assert_eq!(sign, Orientation::from_value(above.z - 0.1));
    }

    #[test]
    fn test_orient2d() {
        assert_eq!(orient2d([0.0, 0.0], [1.0, 0.0], [0.0, 1.0]), Orientation::Positive);
        assert_eq!(orient2d([0.0, 0.0], [0.0, 1.0], [1.0, 0.0]), Orientation::Negative);
        assert_eq!(orient2d([0.0, 0.0], [1.0, 1.0], [3.0, 3.0]), Orientation::Degenerate);
    }

    #[test]
    fn test_in_sphere() {
        let [a, b, c, d] = unit_tetrahedron();
        let center = Point3::new(0.5, 0.5, 0.5);
        let far = Point3::new(5.0, 5.0, 5.0);
        let on_sphere = Point3::new(1.0, 1.0, 1.0);

        assert_eq!(in_sphere(&a, &b, &c, &d, &center), Orientation::Positive);
        assert_eq!(in_sphere(&a, &b, &c, &d, &far), Orientation::Negative);
        assert_eq!(in_sphere(&a, &b, &c, &d, &on_sphere), Orientation::Degenerate);
    }

    #[test]
    fn test_power_test_weight_shrinks_conflict() {
        let [a, b, c, d] = unit_tetrahedron();
        // (1, 1, 1) is cospherical; a positive query weight pushes it into conflict,
        // a negative one pushes it out.
        let query = Point3::new(1.0, 1.0, 1.0);
        let cell = [(&a, 0.0), (&b, 0.0), (&c, 0.0), (&d, 0.0)];
        assert_eq!(power_test(cell, (&query, 0.1)), Orientation::Positive);
        assert_eq!(power_test(cell, (&query, -0.1)), Orientation::Negative);

        // Pumping a cell vertex enlarges the orthosphere.
        let pumped = [(&a, 0.5), (&b, 0.0), (&c, 0.0), (&d, 0.0)];
        assert_eq!(power_test(pumped, (&query, 0.0)), Orientation::Positive);
    }

    #[test]
    fn test_degenerate_triangle() {
        let a = Point3::new(0.0, 0.0, 0.0);
        let b = Point3::new(1.0, 1.0, 1.0);
        let c = Point3::new(2.0, 2.0, 2.0);
        assert!(is_degenerate_triangle(&a, &b, &c));
        assert!(!is_degenerate_triangle(&a, &b, &Point3::new(0.0, 1.0, 0.0)));
    }

    #[test]
    fn test_expansion_arithmetic_is_exact() {
        // 1e16 + 1 - 1e16 loses the 1 in plain floating point.
        let big = Expansion::from_f64(1e16);
        let one = Expansion::from_f64(1.0);
        let result = big.add(&one).sub(&big);
        assert_eq!(result.sign(), 1.0);

        let product = Expansion::from_f64(3.0).mul(&Expansion::from_f64(-2.0));
        assert_eq!(product.sign(), -1.0);
    }
}
