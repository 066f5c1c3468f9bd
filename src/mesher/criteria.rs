// SPDX-License-Identifier: Apache-2.0
// Copyright (c) 2025 Polyframe Inc.

//! Refinement criteria for boundary facets and tetrahedral cells

use crate::error::{MeshError, MeshResult};
use crate::geometry::quality::{radius_edge_ratio, shortest_edge, triangle_circumcenter, triangle_min_angle};
use nalgebra::Point3;
use serde::{Deserialize, Serialize};

/// Smallest facet angle bound accepted (degrees)
pub const MIN_FACET_ANGLE: f64 = 1.0;
/// Largest facet angle bound for which refinement is known to terminate (degrees)
pub const MAX_FACET_ANGLE: f64 = 30.0;
/// Smallest radius-edge bound accepted
pub const MIN_RADIUS_EDGE_RATIO: f64 = 1.0;

/// Priority given to facets whose topology is wrong (off-surface vertex,
/// undeclared label pair) and to cells touching the bounding tetrahedron
pub(crate) const TOPOLOGY_SEVERITY: f64 = 1.0e6;

/// Upper bound on cell circumradius
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CellSize {
    /// Same bound everywhere
    Uniform(f64),
    /// Read from the domain's sizing field at the cell circumcenter
    Field,
}

/// Facet and cell quality targets driving refinement
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RefinementCriteria {
    /// Lower bound on the smallest angle of a boundary facet, degrees
    pub facet_angle: f64,
    /// Upper bound on the radius of a facet's surface Delaunay ball
    pub facet_size: f64,
    /// Upper bound on the distance between a facet's circumcenter and its ball center
    pub facet_distance: f64,
    /// Upper bound on cell circumradius over shortest edge
    pub cell_radius_edge_ratio: f64,
    /// Require every boundary facet vertex to lie on the boundary
    #[serde(default = "default_facet_topology")]
    pub facet_topology: bool,
    pub cell_size: CellSize,
}

fn default_facet_topology() -> bool {
    true
}

impl Default for RefinementCriteria {
    fn default() -> Self {
        Self {
            facet_angle: 25.0,
            facet_size: 1.0,
            facet_distance: 0.1,
            cell_radius_edge_ratio: 3.0,
            facet_topology: true,
            cell_size: CellSize::Uniform(1.0),
        }
    }
}

impl RefinementCriteria {
    pub fn new(
        facet_angle: f64,
        facet_size: f64,
        facet_distance: f64,
        cell_radius_edge_ratio: f64,
        cell_size: CellSize,
    ) -> Self {
        Self {
            facet_angle,
            facet_size,
            facet_distance,
            cell_radius_edge_ratio,
            facet_topology: true,
            cell_size,
        }
    }

    pub fn with_facet_topology(mut self, enabled: bool) -> Self {
        self.facet_topology = enabled;
        self
    }

    /// Reject bounds refinement cannot satisfy
    pub fn validate(&self) -> MeshResult<()> {
        let positive = |name: &str, value: f64| {
            if value.is_finite() && value > 0.0 {
                Ok(())
            } else {
                Err(MeshError::criteria(format!("{} must be positive, got {}", name, value)))
            }
        };
        positive("facet_size", self.facet_size)?;
        positive("facet_distance", self.facet_distance)?;
        positive("cell_radius_edge_ratio", self.cell_radius_edge_ratio)?;
        if let CellSize::Uniform(size) = self.cell_size {
            positive("cell_size", size)?;
        }

        if !(MIN_FACET_ANGLE..=MAX_FACET_ANGLE).contains(&self.facet_angle) {
            return Err(MeshError::criteria(format!(
                "facet_angle must lie in [{}, {}] degrees, got {}",
                MIN_FACET_ANGLE, MAX_FACET_ANGLE, self.facet_angle
            )));
        }
        if self.cell_radius_edge_ratio < MIN_RADIUS_EDGE_RATIO {
            return Err(MeshError::criteria(format!(
                "cell_radius_edge_ratio must be at least {}, got {}",
                MIN_RADIUS_EDGE_RATIO, self.cell_radius_edge_ratio
            )));
        }
        Ok(())
    }

    /// Violation severity of a boundary facet, `None` when it is good
    ///
    /// Severity is the largest ratio of measured value to bound (inverted
    /// for the angle), so values above 1 are bad and larger is worse.
    pub fn facet_severity(&self, facet: &[Point3<f64>; 3], ball_center: &Point3<f64>) -> Option<f64> {
        let [a, b, c] = facet;
        let min_angle = triangle_min_angle(a, b, c);
        let Some(circumcenter) = triangle_circumcenter(a, b, c) else {
            return Some(TOPOLOGY_SEVERITY);
        };
        if min_angle <= 0.0 {
            return Some(TOPOLOGY_SEVERITY);
        }

        let radius = (ball_center - a).norm();
        let distance = (circumcenter - ball_center).norm();
        let severity = (self.facet_angle / min_angle)
            .max(radius / self.facet_size)
            .max(distance / self.facet_distance);
        (severity > 1.0).then_some(severity)
    }

    /// Violation severity of a cell given its local size bound, `None` when it is good
    pub fn cell_severity(&self, tet: &[Point3<f64>; 4], circumcenter: &Point3<f64>, size_bound: f64) -> Option<f64> {
        if shortest_edge(tet) == 0.0 {
            return Some(TOPOLOGY_SEVERITY);
        }
        let ratio = radius_edge_ratio(tet);
        let radius = (circumcenter - tet[0]).norm();
        let severity = (ratio / self.cell_radius_edge_ratio).max(radius / size_bound);
        (severity > 1.0).then_some(severity)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn equilateral() -> [Point3<f64>; 3] {
        [
            Point3::new(0.0, 0.0, 0.0),
            Point3::new(1.0, 0.0, 0.0),
            Point3::new(0.5, 3.0f64.sqrt() / 2.0, 0.0),
        ]
    }

    #[test]
    fn test_validate() {
        assert!(RefinementCriteria::default().validate().is_ok());

        let mut criteria = RefinementCriteria::default();
        criteria.facet_angle = 0.5;
        assert!(matches!(criteria.validate(), Err(MeshError::InvalidCriteria(_))));
        criteria.facet_angle = 35.0;
        assert!(criteria.validate().is_err());

        let zero_size = RefinementCriteria::new(20.0, 0.0, 1.0, 2.0, CellSize::Uniform(1.0));
        assert!(zero_size.validate().is_err());
        let bad_cell = RefinementCriteria::new(20.0, 1.0, 1.0, 2.0, CellSize::Uniform(-1.0));
        assert!(bad_cell.validate().is_err());
        let bad_ratio = RefinementCriteria::new(20.0, 1.0, 1.0, 0.5, CellSize::Field);
        assert!(bad_ratio.validate().is_err());
        let field = RefinementCriteria::new(20.0, 1.0, 1.0, 2.0, CellSize::Field);
        assert!(field.validate().is_ok());
    }

    #[test]
    fn test_facet_severity() {
        let criteria = RefinementCriteria::new(25.0, 10.0, 10.0, 3.0, CellSize::Uniform(10.0));
        let facet = equilateral();
        let circumcenter = triangle_circumcenter(&facet[0], &facet[1], &facet[2]).unwrap();
        assert_eq!(criteria.facet_severity(&facet, &circumcenter), None);

        // Ball center far off the facet plane violates the distance bound
        let off = circumcenter + nalgebra::Vector3::new(0.0, 0.0, 20.0);
        assert!(criteria.facet_severity(&facet, &off).unwrap() > 1.0);

        let skinny = [
            Point3::new(0.0, 0.0, 0.0),
            Point3::new(1.0, 0.0, 0.0),
            Point3::new(0.5, 0.05, 0.0),
        ];
        let center = triangle_circumcenter(&skinny[0], &skinny[1], &skinny[2]).unwrap();
        assert!(criteria.facet_severity(&skinny, &center).unwrap() > 1.0);
    }

    #[test]
    fn test_cell_severity() {
        let criteria = RefinementCriteria::new(25.0, 1.0, 1.0, 2.0, CellSize::Uniform(1.0));
        let tet = [
            Point3::new(1.0, 1.0, 1.0),
            Point3::new(1.0, -1.0, -1.0),
            Point3::new(-1.0, 1.0, -1.0),
            Point3::new(-1.0, -1.0, 1.0),
        ];
        // circumradius sqrt(3) exceeds the size bound of 1
        let severity = criteria.cell_severity(&tet, &Point3::origin(), 1.0).unwrap();
        assert!((severity - 3.0f64.sqrt()).abs() < 1e-12);
        assert_eq!(criteria.cell_severity(&tet, &Point3::origin(), 2.0), None);
    }
}
