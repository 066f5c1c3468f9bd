// SPDX-License-Identifier: Apache-2.0
// Copyright (c) 2025 Polyframe Inc.

//! Tetrahedral mesh analytics and statistics

use super::quality::{min_dihedral_angle, radius_edge_ratio, tet_volume};
use super::TetMesh;
use crate::domain::SubdomainId;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Mesh statistics and quality summary
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MeshStatistics {
    pub vertex_count: usize,
    pub cell_count: usize,
    pub facet_count: usize,
    /// Total volume of all cells
    pub volume: f64,
    /// Volume per subdomain label
    pub subdomain_volumes: BTreeMap<SubdomainId, f64>,
    /// Bounding box [min_x, min_y, min_z, max_x, max_y, max_z]
    pub bbox: [f64; 6],
    /// Smallest dihedral angle over all cells, in degrees
    pub min_dihedral_angle: f64,
    /// Largest circumradius to shortest edge ratio over all cells
    pub max_radius_edge_ratio: f64,
}

impl MeshStatistics {
    /// Create empty stats
    pub fn empty() -> Self {
        Self {
            vertex_count: 0,
            cell_count: 0,
            facet_count: 0,
            volume: 0.0,
            subdomain_volumes: BTreeMap::new(),
            bbox: [0.0; 6],
            min_dihedral_angle: 0.0,
            max_radius_edge_ratio: 0.0,
        }
    }

    /// Pretty print statistics
    pub fn print(&self) {
        println!("╔══════════════════════════════════════════════════════════╗");
        println!("║              MESH STATISTICS                             ║");
        println!("╠══════════════════════════════════════════════════════════╣");
        println!("║ Vertices:        {:>10}                              ║", self.vertex_count);
        println!("║ Cells:           {:>10}                              ║", self.cell_count);
        println!("║ Boundary facets: {:>10}                              ║", self.facet_count);
        println!("║ Volume:          {:>10.4}                              ║", self.volume);
        for (label, volume) in &self.subdomain_volumes {
            println!("║   Subdomain {:>4}: {:>10.4}                            ║", label, volume);
        }
        println!("║                                                          ║");
        println!(
            "║   Min: ({:>7.2}, {:>7.2}, {:>7.2})                      ║",
            self.bbox[0], self.bbox[1], self.bbox[2]
        );
        println!(
            "║   Max: ({:>7.2}, {:>7.2}, {:>7.2})                      ║",
            self.bbox[3], self.bbox[4], self.bbox[5]
        );
        println!("║                                                          ║");
        println!("║ Min dihedral:    {:>10.2}°                             ║", self.min_dihedral_angle);
        println!("║ Max radius-edge: {:>10.3}                              ║", self.max_radius_edge_ratio);
        println!("╚══════════════════════════════════════════════════════════╝");
    }
}

/// Analyze a tetrahedral mesh and compute statistics
pub fn analyze(mesh: &TetMesh) -> MeshStatistics {
    if mesh.is_empty() {
        return MeshStatistics {
            vertex_count: mesh.vertex_count(),
            facet_count: mesh.facet_count(),
            ..MeshStatistics::empty()
        };
    }

    let mut subdomain_volumes = BTreeMap::new();
    let mut min_dihedral = f64::INFINITY;
    let mut max_ratio = 0.0f64;
    for (i, cell) in mesh.cells.iter().enumerate() {
        let tet = mesh.tet(i);
        *subdomain_volumes.entry(cell.label).or_insert(0.0) += tet_volume(&tet).abs();
        min_dihedral = min_dihedral.min(min_dihedral_angle(&tet));
        max_ratio = max_ratio.max(radius_edge_ratio(&tet));
    }

    let bbox = mesh.bounding_box();
    MeshStatistics {
        vertex_count: mesh.vertex_count(),
        cell_count: mesh.cell_count(),
        facet_count: mesh.facet_count(),
        volume: subdomain_volumes.values().sum(),
        subdomain_volumes,
        bbox: [bbox.min.x, bbox.min.y, bbox.min.z, bbox.max.x, bbox.max.y, bbox.max.z],
        min_dihedral_angle: min_dihedral,
        max_radius_edge_ratio: max_ratio,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geometry::TetCell;
    use nalgebra::Point3;

    #[test]
    fn test_analyze_two_tets() {
        let mesh = TetMesh {
            vertices: vec![
                Point3::new(0.0, 0.0, 0.0),
                Point3::new(1.0, 0.0, 0.0),
                Point3::new(0.0, 1.0, 0.0),
                Point3::new(0.0, 0.0, 1.0),
                Point3::new(0.0, 0.0, -1.0),
            ],
            cells: vec![
                TetCell {
                    vertices: [0, 1, 2, 3],
                    label: 1,
                },
                TetCell {
                    vertices: [0, 2, 1, 4],
                    label: 2,
                },
            ],
            facets: Vec::new(),
        };
        let stats = analyze(&mesh);
        assert_eq!(stats.cell_count, 2);
        assert!((stats.volume - 1.0 / 3.0).abs() < 1e-12);
        assert_eq!(stats.subdomain_volumes.len(), 2);
        assert!((stats.subdomain_volumes[&1] - 1.0 / 6.0).abs() < 1e-12);
        assert!(stats.min_dihedral_angle > 0.0 && stats.min_dihedral_angle <= 90.0);
        assert!(stats.max_radius_edge_ratio > 0.0);
        assert_eq!(stats.bbox, [0.0, 0.0, -1.0, 1.0, 1.0, 1.0]);
    }

    #[test]
    fn test_analyze_empty() {
        let stats = analyze(&TetMesh::default());
        assert_eq!(stats, MeshStatistics::empty());
    }
}
