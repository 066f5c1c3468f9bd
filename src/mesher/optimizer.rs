// SPDX-License-Identifier: Apache-2.0
// Copyright (c) 2025 Polyframe Inc.

//! Sliver removal on a refined triangulation
//!
//! Three stages run in order, each optional: random perturbation of
//! interior vertices, exudation (vertex weight pumping) and sliver
//! smoothing. Every iteration queues the interior vertices of the domain
//! cells whose smallest dihedral angle is below `sliver_angle`, worst cell
//! first, and tries the stage's edit on each of them. An edit is applied to
//! a copy of the triangulation, which is rebuilt and kept only when the
//! moved vertex's star gets better, the global minimum does not drop, the
//! total sliver deficit shrinks and the restricted surface and refinement
//! criteria are preserved.

use super::criteria::RefinementCriteria;
use super::refiner::{count_violations, label_cells, restricted_facet};
use super::triangulation::{CellId, Triangulation, VertexId, VertexKind};
use crate::domain::{MeshDomain, SurfacePatchId, BACKGROUND};
use crate::error::MeshResult;
use crate::geometry::quality::{min_dihedral_angle, tet_volume};
use ahash::AHashSet;
use nalgebra::{Point3, Vector3};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;
use tracing::{debug, info, warn};

/// Largest exudation weight relative to the squared nearest-neighbour distance
pub const MAX_PUMP_RATIO: f64 = 0.2;

const PUMP_RATIOS: [f64; 4] = [0.05, 0.1, 0.15, MAX_PUMP_RATIO];
const PERTURBATION_TRIES: usize = 4;
const SMOOTHING_STEPS: [f64; 3] = [0.1, 0.05, 0.025];
const MAX_VERTICES_PER_ITERATION: usize = 32;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OptimizerConfig {
    pub perturb: bool,
    pub exude: bool,
    pub smooth: bool,
    /// Iteration cap per stage
    pub max_iterations: usize,
    /// Smallest gain (degrees) a move must bring to its vertex star and to the sliver deficit
    pub min_improvement: f64,
    /// Cells with a smaller minimum dihedral angle (degrees) are queued for repair
    pub sliver_angle: f64,
    /// Perturbation distance as a fraction of the vertex's shortest edge
    pub perturbation_scale: f64,
    pub seed: u64,
}

impl Default for OptimizerConfig {
    fn default() -> Self {
        Self {
            perturb: true,
            exude: true,
            smooth: true,
            max_iterations: 10,
            min_improvement: 0.01,
            sliver_angle: 20.0,
            perturbation_scale: 0.1,
            seed: 0,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum OptimizerStage {
    Perturbation,
    Exudation,
    SliverSmoothing,
}

impl fmt::Display for OptimizerStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            OptimizerStage::Perturbation => "perturbation",
            OptimizerStage::Exudation => "exudation",
            OptimizerStage::SliverSmoothing => "sliver smoothing",
        };
        f.write_str(name)
    }
}

/// Outcome of one stage; `accepted` counts vertex moves, `rejected` queued vertices left alone
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StageReport {
    pub stage: OptimizerStage,
    pub iterations: usize,
    pub accepted: usize,
    pub rejected: usize,
    pub min_dihedral_before: f64,
    pub min_dihedral_after: f64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct OptimizerReport {
    pub stages: Vec<StageReport>,
}

impl OptimizerReport {
    pub fn accepted(&self) -> usize {
        self.stages.iter().map(|s| s.accepted).sum()
    }

    pub fn min_dihedral_before(&self) -> Option<f64> {
        self.stages.first().map(|s| s.min_dihedral_before)
    }

    pub fn min_dihedral_after(&self) -> Option<f64> {
        self.stages.last().map(|s| s.min_dihedral_after)
    }
}

type SurfaceSignature = BTreeSet<([VertexId; 3], SurfacePatchId)>;

/// What an accepted candidate must preserve or beat
struct Baseline {
    min_dihedral: f64,
    deficit: f64,
    surface: SurfaceSignature,
    violations: usize,
}

pub struct MeshOptimizer<'d> {
    domain: &'d dyn MeshDomain,
    criteria: RefinementCriteria,
    config: OptimizerConfig,
    rng: StdRng,
}

impl<'d> MeshOptimizer<'d> {
    pub fn new(domain: &'d dyn MeshDomain, criteria: RefinementCriteria, config: OptimizerConfig) -> Self {
        let rng = StdRng::seed_from_u64(config.seed);
        Self {
            domain,
            criteria,
            config,
            rng,
        }
    }

    pub fn config(&self) -> &OptimizerConfig {
        &self.config
    }

    /// Run the enabled stages in order
    pub fn optimize(&mut self, tri: &mut Triangulation) -> MeshResult<OptimizerReport> {
        let stages = [
            (self.config.perturb, OptimizerStage::Perturbation),
            (self.config.exude, OptimizerStage::Exudation),
            (self.config.smooth, OptimizerStage::SliverSmoothing),
        ];
        let mut report = OptimizerReport::default();
        for (enabled, stage) in stages {
            if enabled {
                report.stages.push(self.run_stage(stage, tri)?);
            }
        }
        Ok(report)
    }

    fn run_stage(&mut self, stage: OptimizerStage, tri: &mut Triangulation) -> MeshResult<StageReport> {
        let mut baseline = self.baseline(tri);
        let mut report = StageReport {
            stage,
            iterations: 0,
            accepted: 0,
            rejected: 0,
            min_dihedral_before: baseline.min_dihedral,
            min_dihedral_after: baseline.min_dihedral,
        };

        let mut stalled = 0;
        while report.iterations < self.config.max_iterations && stalled < 2 {
            let queue = poor_vertices(tri, self.config.sliver_angle);
            if queue.is_empty() {
                debug!(%stage, "no poor cells with movable vertices");
                break;
            }
            report.iterations += 1;

            let mut moved = 0;
            for v in queue {
                let candidate = match stage {
                    OptimizerStage::Perturbation => self.perturb(tri, &baseline, v)?,
                    OptimizerStage::Exudation => self.exude(tri, &baseline, v)?,
                    OptimizerStage::SliverSmoothing => self.smooth(tri, &baseline, v)?,
                };
                match candidate {
                    Some((improved, next)) => {
                        *tri = improved;
                        baseline = next;
                        moved += 1;
                    }
                    None => report.rejected += 1,
                }
            }

            report.accepted += moved;
            if moved == 0 {
                stalled += 1;
                warn!(%stage, iteration = report.iterations, "no vertex move improved the mesh");
            } else {
                stalled = 0;
                debug!(%stage, iteration = report.iterations, moved, min_dihedral = baseline.min_dihedral, "iteration accepted");
            }
        }

        report.min_dihedral_after = baseline.min_dihedral;
        info!(
            %stage,
            iterations = report.iterations,
            accepted = report.accepted,
            before = report.min_dihedral_before,
            after = report.min_dihedral_after,
            "optimizer stage finished"
        );
        Ok(report)
    }

    fn baseline(&self, tri: &Triangulation) -> Baseline {
        Baseline {
            min_dihedral: global_min_dihedral(tri),
            deficit: sliver_deficit(tri, self.config.sliver_angle),
            surface: surface_signature(self.domain, tri),
            violations: self.violations(tri),
        }
    }

    fn violations(&self, tri: &Triangulation) -> usize {
        count_violations(self.domain, &self.criteria, tri)
    }

    /// Apply `edit` to a copy, rebuild it and keep it only if it beats `baseline` around `v`
    fn try_candidate(
        &self,
        tri: &Triangulation,
        baseline: &Baseline,
        v: VertexId,
        edit: impl FnOnce(&mut Triangulation),
    ) -> MeshResult<Option<(Triangulation, Baseline)>> {
        let star_before = star_quality(tri, v);
        let mut candidate = tri.clone();
        edit(&mut candidate);
        if !candidate.retriangulate()?.is_empty() {
            debug!(vertex = v, "candidate hides a vertex");
            return Ok(None);
        }
        label_cells(self.domain, &mut candidate);

        let gain = self.config.min_improvement;
        if star_quality(&candidate, v) < star_before + gain {
            return Ok(None);
        }
        let min_dihedral = global_min_dihedral(&candidate);
        if min_dihedral < baseline.min_dihedral {
            return Ok(None);
        }
        let deficit = sliver_deficit(&candidate, self.config.sliver_angle);
        if deficit > baseline.deficit - gain {
            return Ok(None);
        }
        let surface = surface_signature(self.domain, &candidate);
        if surface != baseline.surface {
            debug!(vertex = v, "candidate changes the restricted surface");
            return Ok(None);
        }
        let violations = self.violations(&candidate);
        if violations > baseline.violations {
            debug!(vertex = v, "candidate violates the refinement criteria");
            return Ok(None);
        }
        let next = Baseline {
            min_dihedral,
            deficit,
            surface,
            violations,
        };
        Ok(Some((candidate, next)))
    }

    /// Random relocation of `v` within a fraction of its shortest edge
    fn perturb(
        &mut self,
        tri: &Triangulation,
        baseline: &Baseline,
        v: VertexId,
    ) -> MeshResult<Option<(Triangulation, Baseline)>> {
        let step = self.config.perturbation_scale * shortest_incident_edge(tri, v);
        for _ in 0..PERTURBATION_TRIES {
            let offset = random_unit_vector(&mut self.rng) * step;
            let target = tri.vertex(v).point + offset;
            if let Some(improved) = self.try_candidate(tri, baseline, v, |t| t.set_point(v, target))? {
                return Ok(Some(improved));
            }
        }
        Ok(None)
    }

    /// Pump increasing weights onto `v`
    fn exude(
        &mut self,
        tri: &Triangulation,
        baseline: &Baseline,
        v: VertexId,
    ) -> MeshResult<Option<(Triangulation, Baseline)>> {
        let nearest = shortest_incident_edge(tri, v);
        for ratio in PUMP_RATIOS {
            let weight = ratio * nearest * nearest;
            if weight <= tri.vertex(v).weight {
                continue;
            }
            if let Some(improved) = self.try_candidate(tri, baseline, v, |t| t.set_weight(v, weight))? {
                return Ok(Some(improved));
            }
        }
        Ok(None)
    }

    /// Gradient ascent on the smallest dihedral angle of the star of `v`
    fn smooth(
        &mut self,
        tri: &Triangulation,
        baseline: &Baseline,
        v: VertexId,
    ) -> MeshResult<Option<(Triangulation, Baseline)>> {
        let star = domain_star(tri, v);
        if star.is_empty() {
            return Ok(None);
        }
        let edge = shortest_incident_edge(tri, v);
        let origin = tri.vertex(v).point;
        let Some(direction) = star_gradient(tri, &star, v, origin, 1e-3 * edge) else {
            return Ok(None);
        };
        let current = star_min_dihedral(tri, &star, v, &origin).unwrap_or(0.0);
        for scale in SMOOTHING_STEPS {
            let target = origin + direction * (scale * edge);
            let better = star_min_dihedral(tri, &star, v, &target).is_some_and(|angle| angle > current);
            if !better {
                continue;
            }
            if let Some(improved) = self.try_candidate(tri, baseline, v, |t| t.set_point(v, target))? {
                return Ok(Some(improved));
            }
        }
        Ok(None)
    }
}

/// Smallest dihedral angle over the domain cells, 180 when there are none
pub fn global_min_dihedral(tri: &Triangulation) -> f64 {
    domain_cells(tri)
        .map(|c| min_dihedral_angle(&tri.points(c)))
        .fold(180.0, f64::min)
}

fn domain_cells(tri: &Triangulation) -> impl Iterator<Item = CellId> + '_ {
    tri.cells()
        .filter(move |&c| tri.cell(c).label != BACKGROUND && !tri.has_auxiliary_vertex(c))
}

/// Sum over domain cells of how far their minimum dihedral angle falls short of `sliver_angle`
fn sliver_deficit(tri: &Triangulation, sliver_angle: f64) -> f64 {
    domain_cells(tri)
        .map(|c| (sliver_angle - min_dihedral_angle(&tri.points(c))).max(0.0))
        .sum()
}

/// Domain cells incident to `v`
fn domain_star(tri: &Triangulation, v: VertexId) -> Vec<CellId> {
    domain_cells(tri).filter(|&c| tri.cell(c).vertices.contains(&v)).collect()
}

/// Smallest dihedral angle around `v`, 180 when it touches no domain cell
fn star_quality(tri: &Triangulation, v: VertexId) -> f64 {
    domain_star(tri, v)
        .into_iter()
        .map(|c| min_dihedral_angle(&tri.points(c)))
        .fold(180.0, f64::min)
}

/// Restricted facets by sorted vertex ids, with their patches
fn surface_signature(domain: &dyn MeshDomain, tri: &Triangulation) -> SurfaceSignature {
    let mut signature = BTreeSet::new();
    for c in tri.cells() {
        for i in 0..4 {
            if !matches!(tri.mirror(c, i), Some((n, _)) if c < n) {
                continue;
            }
            if let Some(facet) = restricted_facet(domain, tri, c, i) {
                let mut face = tri.face_vertices(c, i);
                face.sort_unstable();
                signature.insert((face, facet.patch));
            }
        }
    }
    signature
}

/// Interior vertices of the domain cells below `sliver_angle`, worst cell first
///
/// Cells are ordered by angle with ties broken on sorted vertex ids so the
/// queue does not depend on the cell arena layout.
fn poor_vertices(tri: &Triangulation, sliver_angle: f64) -> Vec<VertexId> {
    let mut poor: Vec<(f64, [VertexId; 4])> = domain_cells(tri)
        .filter_map(|c| {
            let angle = min_dihedral_angle(&tri.points(c));
            (angle < sliver_angle).then(|| {
                let mut key = tri.cell(c).vertices;
                key.sort_unstable();
                (angle, key)
            })
        })
        .collect();
    poor.sort_by(|a, b| a.0.total_cmp(&b.0).then_with(|| a.1.cmp(&b.1)));

    let mut seen = AHashSet::new();
    let mut queue = Vec::new();
    for (_, key) in poor {
        for v in key {
            if tri.vertex(v).kind == VertexKind::Interior && seen.insert(v) {
                queue.push(v);
                if queue.len() == MAX_VERTICES_PER_ITERATION {
                    return queue;
                }
            }
        }
    }
    queue
}

fn shortest_incident_edge(tri: &Triangulation, v: VertexId) -> f64 {
    let p = tri.vertex(v).point;
    tri.cells()
        .filter(|&c| tri.cell(c).vertices.contains(&v))
        .flat_map(|c| tri.cell(c).vertices)
        .filter(|&u| u != v)
        .map(|u| (tri.vertex(u).point - p).norm())
        .fold(f64::INFINITY, f64::min)
}

/// Minimum dihedral angle of the star of `v` with `v` moved to `p`, `None` if a cell inverts
fn star_min_dihedral(tri: &Triangulation, star: &[CellId], v: VertexId, p: &Point3<f64>) -> Option<f64> {
    let mut worst = 180.0f64;
    for &c in star {
        let mut tet = tri.points(c);
        for (k, &u) in tri.cell(c).vertices.iter().enumerate() {
            if u == v {
                tet[k] = *p;
            }
        }
        if tet_volume(&tet) <= 0.0 {
            return None;
        }
        worst = worst.min(min_dihedral_angle(&tet));
    }
    Some(worst)
}

/// Normalized central-difference gradient of the star's minimum dihedral angle
fn star_gradient(tri: &Triangulation, star: &[CellId], v: VertexId, origin: Point3<f64>, h: f64) -> Option<Vector3<f64>> {
    let mut gradient = Vector3::zeros();
    for axis in 0..3 {
        let mut forward = origin;
        let mut backward = origin;
        forward[axis] += h;
        backward[axis] -= h;
        let f = star_min_dihedral(tri, star, v, &forward)?;
        let b = star_min_dihedral(tri, star, v, &backward)?;
        gradient[axis] = (f - b) / (2.0 * h);
    }
    let norm = gradient.norm();
    (norm > 0.0 && norm.is_finite()).then(|| gradient / norm)
}

fn random_unit_vector(rng: &mut StdRng) -> Vector3<f64> {
    loop {
        let v = Vector3::new(
            rng.gen_range(-1.0..1.0),
            rng.gen_range(-1.0..1.0),
            rng.gen_range(-1.0..1.0),
        );
        let norm = v.norm();
        if norm > 1e-3 && norm <= 1.0 {
            return v / norm;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{LabelVolume, LabeledImageDomain};
    use crate::mesher::criteria::CellSize;
    use crate::mesher::refiner::DelaunayMeshRefiner;
    use crate::mesher::triangulation::Insertion;

    fn refined() -> (LabeledImageDomain, RefinementCriteria) {
        let volume = LabelVolume::filled([4, 4, 4], [1.0, 1.0, 1.0], [0.0, 0.0, 0.0], 1).unwrap();
        let domain = LabeledImageDomain::new(volume).unwrap();
        let criteria = RefinementCriteria::new(20.0, 2.0, 1.0, 3.0, CellSize::Uniform(1.5));
        (domain, criteria)
    }

    #[test]
    fn test_optimizer_never_degrades() {
        let (domain, criteria) = refined();
        let mut refiner = DelaunayMeshRefiner::new(&domain, criteria).unwrap();
        refiner.refine().unwrap();
        let mut tri = refiner.into_triangulation();
        let before = global_min_dihedral(&tri);
        let surface = surface_signature(&domain, &tri);

        let mut optimizer = MeshOptimizer::new(&domain, criteria, OptimizerConfig::default());
        let report = optimizer.optimize(&mut tri).unwrap();
        assert_eq!(report.stages.len(), 3);
        assert!(report.stages.iter().all(|s| s.iterations <= 10));

        let after = global_min_dihedral(&tri);
        assert!(after >= before);
        assert_eq!(report.min_dihedral_after(), Some(after));
        assert_eq!(surface_signature(&domain, &tri), surface);
        assert_eq!(count_violations(&domain, &criteria, &tri), 0);
        assert!(tri.is_valid());
    }

    #[test]
    fn test_surface_vertices_stay_fixed() {
        let (domain, criteria) = refined();
        let mut refiner = DelaunayMeshRefiner::new(&domain, criteria).unwrap();
        refiner.refine().unwrap();
        let mut tri = refiner.into_triangulation();
        let surface_points: Vec<Point3<f64>> = tri
            .vertices()
            .iter()
            .filter(|v| v.kind == VertexKind::Surface)
            .map(|v| v.point)
            .collect();

        let config = OptimizerConfig {
            seed: 7,
            ..OptimizerConfig::default()
        };
        MeshOptimizer::new(&domain, criteria, config).optimize(&mut tri).unwrap();
        let after: Vec<Point3<f64>> = tri
            .vertices()
            .iter()
            .filter(|v| v.kind == VertexKind::Surface)
            .map(|v| v.point)
            .collect();
        assert_eq!(surface_points, after);
        assert!(tri
            .vertices()
            .iter()
            .filter(|v| v.kind == VertexKind::Surface)
            .all(|v| v.weight == 0.0));
    }

    #[test]
    fn test_disabled_stages_are_skipped() {
        let (domain, criteria) = refined();
        let mut refiner = DelaunayMeshRefiner::new(&domain, criteria).unwrap();
        refiner.refine().unwrap();
        let mut tri = refiner.into_triangulation();
        let config = OptimizerConfig {
            perturb: false,
            smooth: false,
            ..OptimizerConfig::default()
        };
        let report = MeshOptimizer::new(&domain, criteria, config).optimize(&mut tri).unwrap();
        assert_eq!(report.stages.len(), 1);
        assert_eq!(report.stages[0].stage, OptimizerStage::Exudation);
    }

    /// Body-centred cubic block inside a large filled box, with the central
    /// vertex pushed almost onto one of its corner neighbours
    fn crushed_block() -> (LabeledImageDomain, Triangulation, VertexId) {
        let volume = LabelVolume::filled([10, 10, 10], [1.0, 1.0, 1.0], [0.0, 0.0, 0.0], 1).unwrap();
        let domain = LabeledImageDomain::new(volume).unwrap();
        let mut tri = Triangulation::new(&domain.bounding_box()).unwrap();

        let corner = Point3::new(4.0, 4.0, 4.0);
        let center = Point3::new(4.5, 4.5, 4.5);
        let crushed = corner + (center - corner) * 0.05;
        let mut moved = None;
        for i in 0..4 {
            for j in 0..4 {
                for k in 0..4 {
                    let p = Point3::new(3.0 + i as f64, 3.0 + j as f64, 3.0 + k as f64);
                    let on_hull = [i, j, k].iter().any(|&n| n == 0 || n == 3);
                    let kind = if on_hull { VertexKind::Surface } else { VertexKind::Interior };
                    tri.insert(p, 0.0, kind).unwrap();
                }
            }
        }
        for i in 0..3 {
            for j in 0..3 {
                for k in 0..3 {
                    let p = Point3::new(3.5 + i as f64, 3.5 + j as f64, 3.5 + k as f64);
                    let target = if p == center { crushed } else { p };
                    if let Insertion::Inserted { vertex, .. } = tri.insert(target, 0.0, VertexKind::Interior).unwrap() {
                        if p == center {
                            moved = Some(vertex);
                        }
                    }
                }
            }
        }
        label_cells(&domain, &mut tri);
        (domain, tri, moved.unwrap())
    }

    fn loose() -> RefinementCriteria {
        RefinementCriteria::new(20.0, 10.0, 10.0, 3.0, CellSize::Uniform(10.0))
    }

    #[test]
    fn test_poor_vertex_queue() {
        let (_, tri, crushed) = crushed_block();
        let queue = poor_vertices(&tri, 20.0);
        assert!(queue.contains(&crushed));
        assert!(queue.len() <= MAX_VERTICES_PER_ITERATION);
        assert!(queue.iter().all(|&v| tri.vertex(v).kind == VertexKind::Interior));
        assert!(poor_vertices(&tri, 0.0).is_empty());
    }

    #[test]
    fn test_smoothing_repairs_crushed_vertex() {
        let (domain, mut tri, _) = crushed_block();
        let before = global_min_dihedral(&tri);
        assert!(before < 20.0);
        let surface = surface_signature(&domain, &tri);
        let hull: Vec<Point3<f64>> = tri
            .vertices()
            .iter()
            .filter(|v| v.kind == VertexKind::Surface)
            .map(|v| v.point)
            .collect();

        let config = OptimizerConfig {
            perturb: false,
            exude: false,
            max_iterations: 3,
            ..OptimizerConfig::default()
        };
        let report = MeshOptimizer::new(&domain, loose(), config).optimize(&mut tri).unwrap();

        assert!(report.accepted() > 0);
        let after = global_min_dihedral(&tri);
        assert!(after > before, "{} -> {}", before, after);
        assert_eq!(report.min_dihedral_after(), Some(after));
        assert_eq!(surface_signature(&domain, &tri), surface);
        let hull_after: Vec<Point3<f64>> = tri
            .vertices()
            .iter()
            .filter(|v| v.kind == VertexKind::Surface)
            .map(|v| v.point)
            .collect();
        assert_eq!(hull, hull_after);
        assert!(tri.is_valid() && tri.is_delaunay());
    }

    #[test]
    fn test_sliver_deficit() {
        let (_, tri, _) = crushed_block();
        assert!(sliver_deficit(&tri, 20.0) > 0.0);
        assert_eq!(sliver_deficit(&tri, 0.0), 0.0);
        assert_eq!(star_quality(&tri, 0), 180.0);
    }

    #[test]
    fn test_random_unit_vector() {
        let mut rng = StdRng::seed_from_u64(3);
        for _ in 0..32 {
            let v = random_unit_vector(&mut rng);
            assert!((v.norm() - 1.0).abs() < 1e-12);
        }
    }
}
