// SPDX-License-Identifier: Apache-2.0
// Copyright (c) 2025 Polyframe Inc.

//! Meshing domains
//!
//! A domain tells the refiner which material occupies a point and where a
//! segment first crosses a material boundary. Two concrete domains exist:
//! labeled voxel images ([`LabeledImageDomain`]) and sets of closed
//! triangulated surfaces ([`SurfaceDomain`]).

mod image;
mod sizing;
mod surface;

pub use image::{LabelVolume, LabeledImageDomain};
pub use sizing::SizingField;
pub use surface::{LabeledSurface, SurfaceDomain};

use crate::geometry::BoundingBox;
use nalgebra::Point3;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Material region identifier; 0 is the exterior / background.
pub type SubdomainId = u32;

/// Label of the region outside every defined subdomain.
pub const BACKGROUND: SubdomainId = 0;

/// A boundary patch: the ordered pair of subdomains it separates
///
/// `surface` names the input surface for surface domains and is `None` for
/// image domains, where a patch is identified by its label pair alone.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct SurfacePatchId {
    pub inside: SubdomainId,
    pub outside: SubdomainId,
    pub surface: Option<usize>,
}

impl SurfacePatchId {
    pub fn new(inside: SubdomainId, outside: SubdomainId) -> Self {
        Self {
            inside,
            outside,
            surface: None,
        }
    }

    pub fn on_surface(inside: SubdomainId, outside: SubdomainId, surface: usize) -> Self {
        Self {
            inside,
            outside,
            surface: Some(surface),
        }
    }

    /// Whether this patch separates exactly the labels `a` and `b` (in either order)
    pub fn separates(&self, a: SubdomainId, b: SubdomainId) -> bool {
        (self.inside == a && self.outside == b) || (self.inside == b && self.outside == a)
    }

    pub fn labels(&self) -> (SubdomainId, SubdomainId) {
        (self.inside, self.outside)
    }
}

impl fmt::Display for SurfacePatchId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.surface {
            Some(index) => write!(f, "surface {} ({}|{})", index, self.inside, self.outside),
            None => write!(f, "({}|{})", self.inside, self.outside),
        }
    }
}

/// Capability interface shared by the image and surface domains
///
/// Implementations must keep `label_at` total (background outside the
/// defined regions) and `boundary_crossing` consistent with it: the returned
/// point splits `a`-`b` where the label first changes.
pub trait MeshDomain: Sync {
    /// Box enclosing every non-background region
    fn bounding_box(&self) -> BoundingBox;

    /// Subdomain occupying `p`
    fn label_at(&self, p: &Point3<f64>) -> SubdomainId;

    /// First boundary crossing walking from `a` toward `b`
    fn boundary_crossing(&self, a: &Point3<f64>, b: &Point3<f64>) -> Option<(Point3<f64>, SurfacePatchId)>;

    /// Local target size at `p`, `None` when the domain carries no sizing field
    fn sizing_at(&self, _p: &Point3<f64>) -> Option<f64> {
        None
    }

    /// Points on the domain boundary used to seed the triangulation
    fn initial_points(&self) -> Vec<Point3<f64>>;

    /// Whether two labels are separated by a declared boundary patch
    fn is_patch(&self, a: SubdomainId, b: SubdomainId) -> bool;

    /// Every label appearing in the domain, background excluded
    fn subdomains(&self) -> Vec<SubdomainId>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_patch_separates() {
        let patch = SurfacePatchId::new(2, 1);
        assert!(patch.separates(1, 2));
        assert!(patch.separates(2, 1));
        assert!(!patch.separates(0, 2));
        assert_eq!(patch.labels(), (2, 1));
    }

    #[test]
    fn test_patch_display() {
        assert_eq!(SurfacePatchId::new(1, 0).to_string(), "(1|0)");
        assert_eq!(SurfacePatchId::on_surface(2, 1, 1).to_string(), "surface 1 (2|1)");
    }
}
