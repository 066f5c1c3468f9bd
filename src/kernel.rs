// SPDX-License-Identifier: Apache-2.0
// Copyright (c) 2025 Polyframe Inc.

//! Kernel API: meshing entry points and geometric queries

use crate::config::MesherConfig;
use crate::domain::{LabelVolume, LabeledImageDomain, LabeledSurface, MeshDomain, SizingField, SubdomainId, SurfaceDomain};
use crate::error::{MeshError, MeshResult};
use crate::geometry::quality::min_dihedral_angle;
use crate::geometry::TetMesh;
use crate::io;
use crate::mesher::{
    extract_mesh, CellSize, DelaunayMeshRefiner, MeshOptimizer, OptimizerReport, RefinementCriteria, RefinementStats,
};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;
use tracing::info;

pub use crate::error::status_code;
pub use crate::query::{check_self_intersections, segment_triangle_intersections as segment_triangle_intersection, SegmentHits};

/// Outcome of a meshing call
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MeshSummary {
    pub vertices: usize,
    pub cells: usize,
    pub facets: usize,
    pub subdomains: Vec<SubdomainId>,
    /// Distinct `(inside, outside)` label pairs of the boundary facets
    pub patches: Vec<(SubdomainId, SubdomainId)>,
    pub min_dihedral_angle: f64,
    pub refinement: RefinementStats,
    pub optimization: Option<OptimizerReport>,
    pub fingerprint: String,
    pub output: Option<PathBuf>,
    pub elapsed_ms: u128,
}

/// Meshing pipeline: refine, optionally optimize, extract
#[derive(Debug, Clone, Default)]
pub struct Mesher {
    config: MesherConfig,
}

impl Mesher {
    pub fn new(config: MesherConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &MesherConfig {
        &self.config
    }

    /// Mesh any domain; nothing is returned unless refinement converges
    pub fn mesh_domain(
        &self,
        domain: &dyn MeshDomain,
        criteria: &RefinementCriteria,
        optimize: bool,
    ) -> MeshResult<(TetMesh, MeshSummary)> {
        let start = Instant::now();
        let mut refiner =
            DelaunayMeshRefiner::new(domain, *criteria)?.with_max_insertions(self.config.max_insertions);
        let refinement = refiner.refine()?;
        let mut tri = refiner.into_triangulation();

        let optimization = if optimize {
            let mut optimizer = MeshOptimizer::new(domain, *criteria, self.config.optimizer.clone());
            Some(optimizer.optimize(&mut tri)?)
        } else {
            None
        };

        let mesh = extract_mesh(domain, &tri);
        let summary = MeshSummary {
            vertices: mesh.vertex_count(),
            cells: mesh.cell_count(),
            facets: mesh.facet_count(),
            subdomains: mesh.subdomains(),
            patches: mesh.patch_labels().into_iter().collect(),
            min_dihedral_angle: (0..mesh.cell_count())
                .map(|c| min_dihedral_angle(&mesh.tet(c)))
                .fold(180.0, f64::min),
            refinement,
            optimization,
            fingerprint: mesh.fingerprint(),
            output: None,
            elapsed_ms: start.elapsed().as_millis(),
        };
        info!(
            vertices = summary.vertices,
            cells = summary.cells,
            facets = summary.facets,
            elapsed_ms = summary.elapsed_ms,
            "mesh generated"
        );
        Ok((mesh, summary))
    }

    pub fn mesh_volume(&self, volume: LabelVolume, criteria: &RefinementCriteria, optimize: bool) -> MeshResult<TetMesh> {
        criteria.validate()?;
        let domain = LabeledImageDomain::new(volume)?;
        self.mesh_domain(&domain, criteria, optimize).map(|(mesh, _)| mesh)
    }

    pub fn mesh_surface_set(
        &self,
        surfaces: Vec<LabeledSurface>,
        criteria: &RefinementCriteria,
        optimize: bool,
    ) -> MeshResult<TetMesh> {
        criteria.validate()?;
        let domain = SurfaceDomain::new(surfaces)?;
        self.mesh_domain(&domain, criteria, optimize).map(|(mesh, _)| mesh)
    }

    /// As [`Mesher::mesh_surface_set`], with cell size taken from `sizing_field`
    pub fn mesh_surface_set_with_sizing_field(
        &self,
        surfaces: Vec<LabeledSurface>,
        criteria: &RefinementCriteria,
        sizing_field: SizingField,
        optimize: bool,
    ) -> MeshResult<TetMesh> {
        let criteria = RefinementCriteria {
            cell_size: CellSize::Field,
            ..*criteria
        };
        criteria.validate()?;
        sizing_field.validate()?;
        let domain = SurfaceDomain::new(surfaces)?.with_sizing_field(Arc::new(sizing_field));
        self.mesh_domain(&domain, &criteria, optimize).map(|(mesh, _)| mesh)
    }

    pub fn mesh_image(
        &self,
        image_path: impl AsRef<Path>,
        output_path: impl AsRef<Path>,
        criteria: &RefinementCriteria,
        optimize: bool,
    ) -> MeshResult<MeshSummary> {
        criteria.validate()?;
        let domain = LabeledImageDomain::new(io::read_label_volume(image_path)?)?;
        self.mesh_to_file(&domain, output_path.as_ref(), criteria, optimize)
    }

    pub fn mesh_image_with_sizing_field(
        &self,
        image_path: impl AsRef<Path>,
        output_path: impl AsRef<Path>,
        criteria: &RefinementCriteria,
        sizing_field: SizingField,
        optimize: bool,
    ) -> MeshResult<MeshSummary> {
        let criteria = RefinementCriteria {
            cell_size: CellSize::Field,
            ..*criteria
        };
        criteria.validate()?;
        sizing_field.validate()?;
        let domain =
            LabeledImageDomain::new(io::read_label_volume(image_path)?)?.with_sizing_field(Arc::new(sizing_field));
        self.mesh_to_file(&domain, output_path.as_ref(), &criteria, optimize)
    }

    pub fn mesh_surfaces<P: AsRef<Path>>(
        &self,
        surface_paths: &[P],
        incident_pairs: &[(SubdomainId, SubdomainId)],
        output_path: impl AsRef<Path>,
        criteria: &RefinementCriteria,
        optimize: bool,
    ) -> MeshResult<MeshSummary> {
        criteria.validate()?;
        if surface_paths.len() != incident_pairs.len() {
            return Err(MeshError::domain(format!(
                "{} surfaces but {} incident subdomain pairs",
                surface_paths.len(),
                incident_pairs.len()
            )));
        }
        let surfaces = surface_paths
            .iter()
            .zip(incident_pairs)
            .map(|(path, &pair)| io::read_stl(path).map(|mesh| LabeledSurface::new(mesh, pair)))
            .collect::<MeshResult<Vec<_>>>()?;
        let domain = SurfaceDomain::new(surfaces)?;
        self.mesh_to_file(&domain, output_path.as_ref(), criteria, optimize)
    }

    fn mesh_to_file(
        &self,
        domain: &dyn MeshDomain,
        output_path: &Path,
        criteria: &RefinementCriteria,
        optimize: bool,
    ) -> MeshResult<MeshSummary> {
        io::MeshFormat::from_path(output_path)?;
        let (mesh, mut summary) = self.mesh_domain(domain, criteria, optimize)?;
        io::write_mesh(output_path, &mesh)?;
        summary.output = Some(output_path.to_path_buf());
        Ok(summary)
    }
}

/// Mesh a label volume file (JSON or PNG slice directory) and write the result
pub fn mesh_image(
    image_path: impl AsRef<Path>,
    output_path: impl AsRef<Path>,
    criteria: &RefinementCriteria,
    optimize: bool,
) -> MeshResult<MeshSummary> {
    Mesher::default().mesh_image(image_path, output_path, criteria, optimize)
}

/// As [`mesh_image`], with cell size taken from `sizing_field`
pub fn mesh_image_with_sizing_field(
    image_path: impl AsRef<Path>,
    output_path: impl AsRef<Path>,
    criteria: &RefinementCriteria,
    sizing_field: SizingField,
    optimize: bool,
) -> MeshResult<MeshSummary> {
    Mesher::default().mesh_image_with_sizing_field(image_path, output_path, criteria, sizing_field, optimize)
}

/// Mesh a set of closed STL surfaces, each with its pair of incident subdomains
pub fn mesh_surfaces<P: AsRef<Path>>(
    surface_paths: &[P],
    incident_pairs: &[(SubdomainId, SubdomainId)],
    output_path: impl AsRef<Path>,
    criteria: &RefinementCriteria,
    optimize: bool,
) -> MeshResult<MeshSummary> {
    Mesher::default().mesh_surfaces(surface_paths, incident_pairs, output_path, criteria, optimize)
}

pub fn mesh_volume(volume: LabelVolume, criteria: &RefinementCriteria, optimize: bool) -> MeshResult<TetMesh> {
    Mesher::default().mesh_volume(volume, criteria, optimize)
}

pub fn mesh_surface_set(
    surfaces: Vec<LabeledSurface>,
    criteria: &RefinementCriteria,
    optimize: bool,
) -> MeshResult<TetMesh> {
    Mesher::default().mesh_surface_set(surfaces, criteria, optimize)
}

pub fn mesh_surface_set_with_sizing_field(
    surfaces: Vec<LabeledSurface>,
    criteria: &RefinementCriteria,
    sizing_field: SizingField,
    optimize: bool,
) -> MeshResult<TetMesh> {
    Mesher::default().mesh_surface_set_with_sizing_field(surfaces, criteria, sizing_field, optimize)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn coarse() -> RefinementCriteria {
        RefinementCriteria::new(20.0, 2.0, 1.0, 3.0, CellSize::Uniform(2.0))
    }

    #[test]
    fn test_invalid_criteria_fail_before_io() {
        let bad = RefinementCriteria::new(45.0, 1.0, 1.0, 2.0, CellSize::Uniform(1.0));
        let result = mesh_image("does/not/exist.json", "out.msh", &bad, false);
        assert!(matches!(result, Err(MeshError::InvalidCriteria(_))));
        assert_eq!(status_code(&result), 2);
    }

    #[test]
    fn test_missing_image_is_io_failure() {
        let dir = tempfile::tempdir().unwrap();
        let result = mesh_image(dir.path().join("absent.json"), dir.path().join("out.msh"), &coarse(), false);
        assert!(matches!(result, Err(MeshError::Io { .. })));
    }

    #[test]
    fn test_mismatched_pairs() {
        let result = mesh_surfaces(&["a.stl", "b.stl"], &[(0, 1)], "out.msh", &coarse(), false);
        assert!(matches!(result, Err(MeshError::DomainInconsistency(_))));
    }

    #[test]
    fn test_all_background_volume() {
        let volume = LabelVolume::filled([3, 3, 3], [1.0; 3], [0.0; 3], 0).unwrap();
        assert!(matches!(
            mesh_volume(volume, &coarse(), false),
            Err(MeshError::DomainInconsistency(_))
        ));
    }

    #[test]
    fn test_mesh_image_writes_output() {
        let dir = tempfile::tempdir().unwrap();
        let image = dir.path().join("cube.json");
        let output = dir.path().join("cube.msh");
        let volume = LabelVolume::filled([4, 4, 4], [1.0; 3], [0.0; 3], 1).unwrap();
        io::write_label_volume(&image, &volume).unwrap();

        let summary = mesh_image(&image, &output, &coarse(), false).unwrap();
        assert_eq!(summary.subdomains, vec![1]);
        assert_eq!(summary.patches, vec![(1, 0)]);
        assert_eq!(summary.output.as_deref(), Some(output.as_path()));
        assert!(summary.optimization.is_none());
        let text = std::fs::read_to_string(&output).unwrap();
        assert!(text.starts_with("$MeshFormat\n2.2 0 8\n"));
    }
}
