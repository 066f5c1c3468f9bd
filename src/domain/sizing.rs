// SPDX-License-Identifier: Apache-2.0
// Copyright (c) 2025 Polyframe Inc.

//! Spatially varying target element size

use crate::error::{MeshError, MeshResult};
use crate::utils::math::trilerp;
use nalgebra::{Point3, Vector3};
use serde::{Deserialize, Serialize};

/// Grid of per-voxel target sizes, sampled at voxel centers
///
/// Values are stored x fastest, then y, then z. Queries outside the grid
/// clamp to the nearest boundary sample.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SizingField {
    pub dims: [usize; 3],
    pub spacing: [f64; 3],
    pub origin: [f64; 3],
    pub values: Vec<f64>,
}

impl SizingField {
    pub fn new(dims: [usize; 3], spacing: [f64; 3], origin: [f64; 3], values: Vec<f64>) -> MeshResult<Self> {
        let field = Self {
            dims,
            spacing,
            origin,
            values,
        };
        field.validate()?;
        Ok(field)
    }

    /// Constant field covering the given grid
    pub fn uniform(dims: [usize; 3], spacing: [f64; 3], origin: [f64; 3], size: f64) -> MeshResult<Self> {
        Self::new(dims, spacing, origin, vec![size; dims.iter().product()])
    }

    pub fn validate(&self) -> MeshResult<()> {
        if self.dims.iter().any(|&d| d == 0) {
            return Err(MeshError::criteria("sizing field has an empty dimension"));
        }
        let expected: usize = self.dims.iter().product();
        if self.values.len() != expected {
            return Err(MeshError::criteria(format!(
                "sizing field holds {} values, expected {}",
                self.values.len(),
                expected
            )));
        }
        if self.spacing.iter().any(|s| !(s.is_finite() && *s > 0.0)) {
            return Err(MeshError::criteria("sizing field spacing must be positive"));
        }
        if self.origin.iter().any(|o| !o.is_finite()) {
            return Err(MeshError::criteria("sizing field origin must be finite"));
        }
        if let Some(bad) = self.values.iter().find(|v| !(v.is_finite() && **v > 0.0)) {
            return Err(MeshError::criteria(format!("sizing field value {} is not positive", bad)));
        }
        Ok(())
    }

    pub fn min_value(&self) -> f64 {
        self.values.iter().copied().fold(f64::INFINITY, f64::min)
    }

    fn value(&self, i: usize, j: usize, k: usize) -> f64 {
        self.values[i + self.dims[0] * (j + self.dims[1] * k)]
    }

    /// Trilinearly interpolated size at `p`
    pub fn sample(&self, p: &Point3<f64>) -> f64 {
        let mut base = [0usize; 3];
        let mut next = [0usize; 3];
        let mut frac = Vector3::zeros();
        for axis in 0..3 {
            let max_index = (self.dims[axis] - 1) as f64;
            let u = ((p[axis] - self.origin[axis]) / self.spacing[axis] - 0.5).clamp(0.0, max_index);
            let i0 = u.floor();
            base[axis] = i0 as usize;
            next[axis] = (base[axis] + 1).min(self.dims[axis] - 1);
            frac[axis] = u - i0;
        }

        let mut corners = [0.0; 8];
        for (c, corner) in corners.iter_mut().enumerate() {
            let i = if c & 1 == 0 { base[0] } else { next[0] };
            let j = if c & 2 == 0 { base[1] } else { next[1] };
            let k = if c & 4 == 0 { base[2] } else { next[2] };
            *corner = self.value(i, j, k);
        }
        trilerp(&corners, &frac)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn ramp() -> SizingField {
        // Size grows linearly along x: 1, 2, 3, 4 at voxel centers 0.5 .. 3.5
        let dims = [4, 2, 2];
        let mut values = Vec::new();
        for _k in 0..2 {
            for _j in 0..2 {
                for i in 0..4 {
                    values.push(1.0 + i as f64);
                }
            }
        }
        SizingField::new(dims, [1.0; 3], [0.0; 3], values).unwrap()
    }

    #[test]
    fn test_sample_at_voxel_centers() {
        let field = ramp();
        assert_relative_eq!(field.sample(&Point3::new(0.5, 0.5, 0.5)), 1.0);
        assert_relative_eq!(field.sample(&Point3::new(2.5, 1.5, 0.5)), 3.0);
    }

    #[test]
    fn test_sample_interpolates_and_clamps() {
        let field = ramp();
        assert_relative_eq!(field.sample(&Point3::new(1.0, 1.0, 1.0)), 1.5, epsilon = 1e-12);
        assert_relative_eq!(field.sample(&Point3::new(-10.0, 0.0, 0.0)), 1.0);
        assert_relative_eq!(field.sample(&Point3::new(50.0, 9.0, 9.0)), 4.0);
        assert_eq!(field.min_value(), 1.0);
    }

    #[test]
    fn test_rejects_bad_fields() {
        assert!(matches!(
            SizingField::new([2, 2, 2], [1.0; 3], [0.0; 3], vec![1.0; 7]),
            Err(MeshError::InvalidCriteria(_))
        ));
        assert!(SizingField::uniform([2, 2, 2], [1.0; 3], [0.0; 3], 0.0).is_err());
        assert!(SizingField::uniform([2, 2, 2], [0.0, 1.0, 1.0], [0.0; 3], 1.0).is_err());
        assert!(SizingField::uniform([2, 2, 2], [1.0; 3], [0.0; 3], 0.5).is_ok());
    }

    #[test]
    fn test_rejects_non_finite_origin() {
        for origin in [[f64::NAN, 0.0, 0.0], [0.0, f64::INFINITY, 0.0], [0.0, 0.0, f64::NEG_INFINITY]] {
            assert!(matches!(
                SizingField::uniform([2, 2, 2], [1.0; 3], origin, 1.0),
                Err(MeshError::InvalidCriteria(_))
            ));
        }
    }
}
