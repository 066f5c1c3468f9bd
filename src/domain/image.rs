// SPDX-License-Identifier: Apache-2.0
// Copyright (c) 2025 Polyframe Inc.

//! Labeled voxel image domain

use super::{MeshDomain, SizingField, SubdomainId, SurfacePatchId, BACKGROUND};
use crate::error::{MeshError, MeshResult};
use crate::geometry::BoundingBox;
use nalgebra::{Point3, Vector3};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::sync::Arc;

/// Seed lines per axis pair when sampling the boundary
const SEED_LINES_PER_AXIS: usize = 5;

/// A 3D grid of subdomain labels
///
/// Voxel `(i, j, k)` covers `[origin + i * spacing, origin + (i + 1) * spacing)`
/// on each axis; labels are stored x fastest, then y, then z.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LabelVolume {
    pub dims: [usize; 3],
    pub spacing: [f64; 3],
    pub origin: [f64; 3],
    pub labels: Vec<u16>,
}

impl LabelVolume {
    pub fn new(dims: [usize; 3], spacing: [f64; 3], origin: [f64; 3], labels: Vec<u16>) -> MeshResult<Self> {
        let volume = Self {
            dims,
            spacing,
            origin,
            labels,
        };
        volume.validate()?;
        Ok(volume)
    }

    /// Volume where every voxel carries `label`
    pub fn filled(dims: [usize; 3], spacing: [f64; 3], origin: [f64; 3], label: u16) -> MeshResult<Self> {
        Self::new(dims, spacing, origin, vec![label; dims.iter().product()])
    }

    /// Build a volume by evaluating `f` at every voxel center
    pub fn from_fn(
        dims: [usize; 3],
        spacing: [f64; 3],
        origin: [f64; 3],
        f: impl Fn(Point3<f64>) -> u16,
    ) -> MeshResult<Self> {
        let mut labels = Vec::with_capacity(dims.iter().product());
        for k in 0..dims[2] {
            for j in 0..dims[1] {
                for i in 0..dims[0] {
                    let center = Point3::new(
                        origin[0] + (i as f64 + 0.5) * spacing[0],
                        origin[1] + (j as f64 + 0.5) * spacing[1],
                        origin[2] + (k as f64 + 0.5) * spacing[2],
                    );
                    labels.push(f(center));
                }
            }
        }
        Self::new(dims, spacing, origin, labels)
    }

    pub fn validate(&self) -> MeshResult<()> {
        if self.dims.iter().any(|&d| d == 0) {
            return Err(MeshError::domain("label volume has an empty dimension"));
        }
        let expected: usize = self.dims.iter().product();
        if self.labels.len() != expected {
            return Err(MeshError::domain(format!(
                "label volume holds {} voxels, expected {}",
                self.labels.len(),
                expected
            )));
        }
        if self.spacing.iter().any(|s| !(s.is_finite() && *s > 0.0)) {
            return Err(MeshError::domain("voxel spacing must be positive"));
        }
        if self.origin.iter().any(|o| !o.is_finite()) {
            return Err(MeshError::domain("volume origin must be finite"));
        }
        Ok(())
    }

    pub fn voxel_count(&self) -> usize {
        self.labels.len()
    }

    pub fn bounding_box(&self) -> BoundingBox {
        let min = Point3::from(self.origin);
        let extent = Vector3::new(
            self.dims[0] as f64 * self.spacing[0],
            self.dims[1] as f64 * self.spacing[1],
            self.dims[2] as f64 * self.spacing[2],
        );
        BoundingBox::new(min, min + extent)
    }

    fn label(&self, idx: [i64; 3]) -> SubdomainId {
        if (0..3).any(|axis| idx[axis] < 0 || idx[axis] >= self.dims[axis] as i64) {
            return BACKGROUND;
        }
        let [i, j, k] = idx.map(|v| v as usize);
        SubdomainId::from(self.labels[i + self.dims[0] * (j + self.dims[1] * k)])
    }

    fn voxel_of(&self, p: &Point3<f64>) -> [i64; 3] {
        let mut idx = [0i64; 3];
        for axis in 0..3 {
            idx[axis] = ((p[axis] - self.origin[axis]) / self.spacing[axis]).floor() as i64;
        }
        idx
    }
}

/// Domain backed by a label volume, with an optional sizing field
#[derive(Debug, Clone)]
pub struct LabeledImageDomain {
    volume: LabelVolume,
    sizing: Option<Arc<SizingField>>,
    subdomains: Vec<SubdomainId>,
}

impl LabeledImageDomain {
    /// Wrap a volume; fails when no voxel carries a non-background label
    pub fn new(volume: LabelVolume) -> MeshResult<Self> {
        volume.validate()?;
        let subdomains: Vec<SubdomainId> = volume
            .labels
            .iter()
            .filter(|&&l| SubdomainId::from(l) != BACKGROUND)
            .map(|&l| SubdomainId::from(l))
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect();
        if subdomains.is_empty() {
            return Err(MeshError::domain("label volume contains only background voxels"));
        }
        Ok(Self {
            volume,
            sizing: None,
            subdomains,
        })
    }

    pub fn with_sizing_field(mut self, field: Arc<SizingField>) -> Self {
        self.sizing = Some(field);
        self
    }

    pub fn volume(&self) -> &LabelVolume {
        &self.volume
    }

    pub fn sizing_field(&self) -> Option<&Arc<SizingField>> {
        self.sizing.as_ref()
    }

    /// Every label change along `a`-`b`, in order from `a`
    ///
    /// Exact voxel traversal (Amanatides-Woo) over the half-open voxel grid;
    /// stops after the first change when `first_only` is set.
    fn label_changes(&self, a: &Point3<f64>, b: &Point3<f64>, first_only: bool) -> Vec<(Point3<f64>, SurfacePatchId)> {
        let mut changes = Vec::new();
        let dir = b - a;
        if dir.norm_squared() == 0.0 {
            return changes;
        }
        let bbox = self.volume.bounding_box();
        let Some((t_enter, _)) = bbox.clip_segment(a, b) else {
            return changes;
        };

        let mut current = self.label_at(a);
        let mut idx = self.volume.voxel_of(a);
        let inside = |idx: &[i64; 3]| (0..3).all(|axis| idx[axis] >= 0 && idx[axis] < self.volume.dims[axis] as i64);

        if !inside(&idx) {
            // Enter the grid at t_enter, picking the voxel on the far side of the entry face.
            let entry = a + dir * t_enter;
            for axis in 0..3 {
                let u = (entry[axis] - self.volume.origin[axis]) / self.volume.spacing[axis];
                let mut i = u.floor() as i64;
                if dir[axis] < 0.0 && u == u.floor() {
                    i -= 1;
                }
                idx[axis] = i.clamp(0, self.volume.dims[axis] as i64 - 1);
            }
            let entered = self.volume.label(idx);
            if entered != current {
                changes.push((entry, patch_between(current, entered)));
                if first_only {
                    return changes;
                }
                current = entered;
            }
        }

        let step: [i64; 3] = [0, 1, 2].map(|axis| {
            if dir[axis] > 0.0 {
                1
            } else if dir[axis] < 0.0 {
                -1
            } else {
                0
            }
        });

        loop {
            let mut t_next = f64::INFINITY;
            let mut axis_next = 0;
            for axis in 0..3 {
                if step[axis] == 0 {
                    continue;
                }
                let face = if step[axis] > 0 { idx[axis] + 1 } else { idx[axis] };
                let plane = self.volume.origin[axis] + face as f64 * self.volume.spacing[axis];
                let t = (plane - a[axis]) / dir[axis];
                if t < t_next {
                    t_next = t;
                    axis_next = axis;
                }
            }
            if !(t_next <= 1.0) {
                return changes;
            }

            idx[axis_next] += step[axis_next];
            let next = self.volume.label(idx);
            if next != current {
                changes.push((a + dir * t_next.max(0.0), patch_between(current, next)));
                if first_only {
                    return changes;
                }
                current = next;
            }
            if !inside(&idx) {
                return changes;
            }
        }
    }
}

/// Image patches are keyed by their label pair, larger label inside
fn patch_between(a: SubdomainId, b: SubdomainId) -> SurfacePatchId {
    SurfacePatchId::new(a.max(b), a.min(b))
}

impl MeshDomain for LabeledImageDomain {
    fn bounding_box(&self) -> BoundingBox {
        self.volume.bounding_box()
    }

    fn label_at(&self, p: &Point3<f64>) -> SubdomainId {
        self.volume.label(self.volume.voxel_of(p))
    }

    fn boundary_crossing(&self, a: &Point3<f64>, b: &Point3<f64>) -> Option<(Point3<f64>, SurfacePatchId)> {
        self.label_changes(a, b, true).into_iter().next()
    }

    fn sizing_at(&self, p: &Point3<f64>) -> Option<f64> {
        self.sizing.as_ref().map(|field| field.sample(p))
    }

    fn initial_points(&self) -> Vec<Point3<f64>> {
        let bbox = self.volume.bounding_box();
        let margin = 0.05 * bbox.diagonal();
        let size = bbox.size();
        let mut points = Vec::new();

        for axis in 0..3 {
            let (u, v) = ((axis + 1) % 3, (axis + 2) % 3);
            for i in 0..SEED_LINES_PER_AXIS {
                for j in 0..SEED_LINES_PER_AXIS {
                    let mut start = bbox.min;
                    start[u] += size[u] * (i as f64 + 0.5) / SEED_LINES_PER_AXIS as f64;
                    start[v] += size[v] * (j as f64 + 0.5) / SEED_LINES_PER_AXIS as f64;
                    let mut end = start;
                    start[axis] = bbox.min[axis] - margin;
                    end[axis] = bbox.max[axis] + margin;
                    points.extend(self.label_changes(&start, &end, false).into_iter().map(|(p, _)| p));
                }
            }
        }
        points
    }

    fn is_patch(&self, a: SubdomainId, b: SubdomainId) -> bool {
        a != b
    }

    fn subdomains(&self) -> Vec<SubdomainId> {
        self.subdomains.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn two_label_volume() -> LabeledImageDomain {
        // 4x2x2 voxels: x < 2 is label 1, x >= 2 is label 2
        let volume = LabelVolume::from_fn([4, 2, 2], [1.0; 3], [0.0; 3], |p| if p.x < 2.0 { 1 } else { 2 }).unwrap();
        LabeledImageDomain::new(volume).unwrap()
    }

    #[test]
    fn test_label_at() {
        let domain = two_label_volume();
        assert_eq!(domain.label_at(&Point3::new(0.5, 0.5, 0.5)), 1);
        assert_eq!(domain.label_at(&Point3::new(2.0, 0.5, 0.5)), 2);
        assert_eq!(domain.label_at(&Point3::new(4.0, 0.5, 0.5)), 0);
        assert_eq!(domain.label_at(&Point3::new(-0.1, 0.5, 0.5)), 0);
        assert_eq!(domain.subdomains(), vec![1, 2]);
    }

    #[test]
    fn test_first_crossing_from_outside() {
        let domain = two_label_volume();
        let (hit, patch) = domain
            .boundary_crossing(&Point3::new(-1.0, 0.5, 0.5), &Point3::new(5.0, 0.5, 0.5))
            .unwrap();
        assert!((hit.x - 0.0).abs() < 1e-12);
        assert_eq!(patch, SurfacePatchId::new(1, 0));
    }

    #[test]
    fn test_internal_crossing() {
        let domain = two_label_volume();
        let (hit, patch) = domain
            .boundary_crossing(&Point3::new(0.5, 0.5, 0.5), &Point3::new(3.5, 1.5, 0.5))
            .unwrap();
        assert!((hit.x - 2.0).abs() < 1e-12);
        assert_eq!(patch, SurfacePatchId::new(2, 1));

        // Walking backwards finds the same interface first.
        let (back, _) = domain
            .boundary_crossing(&Point3::new(3.5, 1.5, 0.5), &Point3::new(0.5, 0.5, 0.5))
            .unwrap();
        assert!((back.x - 2.0).abs() < 1e-12);
    }

    #[test]
    fn test_crossing_consistent_with_labels() {
        let domain = two_label_volume();
        let a = Point3::new(3.5, 1.5, 1.5);
        let b = Point3::new(6.0, 1.5, 1.5);
        let (hit, patch) = domain.boundary_crossing(&a, &b).unwrap();
        assert!((hit.x - 4.0).abs() < 1e-12);
        assert!(patch.separates(domain.label_at(&a), domain.label_at(&b)));

        let same = domain.boundary_crossing(&Point3::new(0.2, 0.2, 0.2), &Point3::new(1.8, 1.8, 1.8));
        assert!(same.is_none());
        let outside = domain.boundary_crossing(&Point3::new(-5.0, -5.0, -5.0), &Point3::new(-4.0, 9.0, -5.0));
        assert!(outside.is_none());
    }

    #[test]
    fn test_initial_points_lie_on_boundary() {
        let volume = LabelVolume::filled([3, 3, 3], [1.0; 3], [0.0; 3], 1).unwrap();
        let domain = LabeledImageDomain::new(volume).unwrap();
        let points = domain.initial_points();
        assert_eq!(points.len(), 3 * SEED_LINES_PER_AXIS * SEED_LINES_PER_AXIS * 2);
        let bbox = domain.bounding_box();
        for p in &points {
            let on_face = (0..3).any(|axis| (p[axis] - bbox.min[axis]).abs() < 1e-9 || (p[axis] - bbox.max[axis]).abs() < 1e-9);
            assert!(on_face);
        }
    }

    #[test]
    fn test_rejects_empty_volume() {
        let volume = LabelVolume::filled([2, 2, 2], [1.0; 3], [0.0; 3], 0).unwrap();
        assert!(matches!(LabeledImageDomain::new(volume), Err(MeshError::DomainInconsistency(_))));
        assert!(LabelVolume::new([2, 2, 2], [1.0; 3], [0.0; 3], vec![1; 3]).is_err());
    }

    #[test]
    fn test_sizing_field_attached() {
        let field = Arc::new(SizingField::uniform([2, 2, 2], [2.0; 3], [0.0; 3], 0.75).unwrap());
        let domain = two_label_volume().with_sizing_field(field);
        assert_eq!(domain.sizing_at(&Point3::new(1.0, 1.0, 1.0)), Some(0.75));
        assert_eq!(two_label_volume().sizing_at(&Point3::origin()), None);
    }
}
