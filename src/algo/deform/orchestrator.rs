//! Runs the enabled backends and commits one result to the mesh.
//!
//! A solve goes through four phases:
//!
//! 1. **Initialize**: validate the mesh, the landmarks and the configuration, build the
//!    energy and ask every enabled backend whether it can run.
//! 2. **RunBackend**: run each available backend, in fidelity order, on its own copy of
//!    the current positions.
//! 3. **SelectOrCompare**: pick the run to commit according to the
//!    [`SelectionPolicy`] and measure how far the other runs are from it.
//! 4. **Finalize**: write the committed positions into the mesh.
//!
//! Nothing touches the mesh before phase 4, so any error leaves it unchanged.

use std::time::{Duration, Instant};

use nalgebra::Point3;
use tracing::{debug, info, info_span, warn};

use super::backend::{Availability, SolveStatus};
use super::config::{BackendKind, SelectionPolicy, SolverConfig};
use super::energy::ArapEnergy;
use super::scalar::{to_mesh, to_solver, Precision, Real};
use crate::algo::Progress;
use crate::constraints::ConstraintSet;
use crate::error::{DeformError, Result};
use crate::mesh::MeshGraph;

/// Orchestration phase, as reported in debug logs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    Initialize,
    RunBackend(BackendKind),
    SelectOrCompare,
    Finalize,
}

fn enter(phase: Phase) {
    debug!(?phase, "entering phase");
}

/// A backend that was enabled but could not run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Unavailable {
    /// The backend.
    pub kind: BackendKind,
    /// Why it could not run.
    pub reason: String,
}

/// Metrics and result of one backend run.
#[derive(Debug, Clone)]
pub struct BackendRun {
    /// The backend.
    pub kind: BackendKind,
    /// How the run ended.
    pub status: SolveStatus,
    /// Outer alternations performed.
    pub alternations: usize,
    /// Inner linear iterations performed.
    pub linear_iterations: usize,
    /// Wall-clock time of the run.
    pub elapsed: Duration,
    /// Energy before the run.
    pub initial_energy: f64,
    /// Energy of the returned positions.
    pub final_energy: f64,
    /// RMS landmark distance after the run.
    pub constraint_rms: f64,
    /// Largest landmark distance after the run.
    pub constraint_max: f64,
    /// Largest per-vertex distance to the committed positions (zero for the committed
    /// run itself).
    pub max_deviation: f64,
    /// Resulting positions.
    pub positions: Vec<Point3<f64>>,
}

/// Summary of a deformation.
#[derive(Debug, Clone)]
pub struct DeformReport {
    /// The backend whose result was committed.
    pub committed: BackendKind,
    /// Status of the committed run.
    pub status: SolveStatus,
    /// Every run, in execution order.
    pub runs: Vec<BackendRun>,
    /// Enabled backends that could not run.
    pub unavailable: Vec<Unavailable>,
    /// Alternation cap used for this mesh.
    pub alternation_budget: usize,
}

impl DeformReport {
    /// The run of a given backend, if it ran.
    pub fn run(&self, kind: BackendKind) -> Option<&BackendRun> {
        self.runs.iter().find(|r| r.kind == kind)
    }

    /// The committed run.
    pub fn committed_run(&self) -> Option<&BackendRun> {
        self.run(self.committed)
    }

    /// Returns true if every run ended within `tolerance` of the committed positions.
    pub fn backends_agree(&self, tolerance: f64) -> bool {
        self.runs.iter().all(|r| r.max_deviation <= tolerance)
    }
}

/// Validates, runs and reconciles solver backends for one configuration.
///
/// # Example
///
/// ```
/// use arap_deform::prelude::*;
/// use nalgebra::Point3;
///
/// let vertices = vec![
///     Point3::new(0.0, 0.0, 0.0),
///     Point3::new(1.0, 0.0, 0.0),
///     Point3::new(0.0, 1.0, 0.0),
///     Point3::new(0.0, 0.0, 1.0),
/// ];
/// let faces = [[0, 2, 1], [0, 1, 3], [1, 2, 3], [0, 3, 2]];
/// let mut mesh = MeshGraph::from_triangles(&vertices, &faces).unwrap();
/// let landmarks = ConstraintSet::new(vec![
///     Constraint::new(0, Point3::new(0.0, 0.0, 0.0)),
///     Constraint::new(3, Point3::new(0.0, 0.0, 1.5)),
/// ])
/// .unwrap();
///
/// let config = SolverConfig::default().with_precision(Precision::Double);
/// let report = SolveOrchestrator::new(config).deform(&mut mesh, &landmarks).unwrap();
/// assert_eq!(report.committed, BackendKind::GenericNls);
/// assert!(mesh.position(VertexId::new(3)).z > 1.0);
/// ```
#[derive(Debug, Default)]
pub struct SolveOrchestrator {
    config: SolverConfig,
    progress: Progress,
}

impl SolveOrchestrator {
    /// Create an orchestrator for a configuration.
    pub fn new(config: SolverConfig) -> Self {
        Self {
            config,
            progress: Progress::none(),
        }
    }

    /// Attach a progress callback, called once per backend run and once at the end.
    pub fn with_progress(mut self, progress: Progress) -> Self {
        self.progress = progress;
        self
    }

    /// The configuration.
    pub fn config(&self) -> &SolverConfig {
        &self.config
    }

    /// Deform `graph` towards `constraints` and commit the selected result.
    ///
    /// Starts from the graph's current positions.
    ///
    /// # Errors
    ///
    /// Configuration errors only, all raised before any solver runs:
    /// - [`DeformError::EmptyMesh`]
    /// - [`DeformError::ConstraintOutOfRange`]
    /// - [`DeformError::NoBackendsEnabled`] and [`DeformError::InvalidParameter`] from
    ///   [`SolverConfig::validate`]
    /// - [`DeformError::NoBackendAvailable`] if every enabled backend is unavailable
    pub fn deform(
        &self,
        graph: &mut MeshGraph,
        constraints: &ConstraintSet,
    ) -> Result<DeformReport> {
        let span = info_span!(
            "deform",
            vertices = graph.num_vertices(),
            landmarks = constraints.len(),
            precision = ?self.config.precision
        );
        let _guard = span.enter();
        let start = Instant::now();

        enter(Phase::Initialize);
        self.config.validate()?;
        if graph.is_empty() {
            return Err(DeformError::EmptyMesh);
        }
        constraints.validate(graph.num_vertices())?;

        let (mut runs, unavailable) = match self.config.precision {
            Precision::Single => self.run_backends::<f32>(graph, constraints)?,
            Precision::Double => self.run_backends::<f64>(graph, constraints)?,
        };

        enter(Phase::SelectOrCompare);
        let chosen = select(&runs, self.config.selection);
        let committed = runs[chosen].positions.clone();
        for run in &mut runs {
            run.max_deviation = max_deviation(&run.positions, &committed);
        }
        let committed_kind = runs[chosen].kind;
        for run in runs.iter().filter(|r| r.kind != committed_kind) {
            if run.max_deviation > self.config.agreement_tolerance {
                warn!(
                    "{} deviates from {} by up to {:.3e} (tolerance {:.1e})",
                    run.kind, committed_kind, run.max_deviation, self.config.agreement_tolerance
                );
            }
        }

        enter(Phase::Finalize);
        graph.commit_positions(committed)?;
        let total = runs.len() + 1;
        self.progress.report(runs.len(), total, "commit");

        let report = DeformReport {
            committed: committed_kind,
            status: runs[chosen].status,
            alternation_budget: self.config.alternation_budget(graph.num_vertices()),
            runs,
            unavailable,
        };
        info!(
            committed = %report.committed,
            status = ?report.status,
            elapsed_ms = start.elapsed().as_secs_f64() * 1e3,
            "deformation committed"
        );
        Ok(report)
    }

    /// Initialize in precision `T`, then run every available backend.
    fn run_backends<T: Real>(
        &self,
        graph: &MeshGraph,
        constraints: &ConstraintSet,
    ) -> Result<(Vec<BackendRun>, Vec<Unavailable>)> {
        let model = ArapEnergy::<T>::from_config(graph, constraints, &self.config)?;

        let mut backends = Vec::new();
        let mut unavailable = Vec::new();
        for kind in self.config.backends.iter() {
            let backend = kind.backend::<T>();
            match backend.availability(&model) {
                Availability::Available => backends.push(backend),
                Availability::Unavailable(reason) => {
                    warn!("{} backend unavailable: {}", kind, reason);
                    unavailable.push(Unavailable { kind, reason });
                }
            }
        }
        if backends.is_empty() {
            let reasons = unavailable
                .iter()
                .map(|u| format!("{}: {}", u.kind, u.reason))
                .collect::<Vec<_>>()
                .join("; ");
            return Err(DeformError::NoBackendAvailable { reasons });
        }

        let initial = to_solver::<T>(graph.positions());
        let total = backends.len() + 1;
        let mut runs = Vec::with_capacity(backends.len());

        for (step, backend) in backends.iter().enumerate() {
            let kind = backend.kind();
            enter(Phase::RunBackend(kind));
            self.progress.report(step, total, kind.name());
            let span = info_span!("backend", backend = %kind);
            let _guard = span.enter();

            let start = Instant::now();
            let outcome = backend.solve(&model, initial.clone(), &self.config);
            let elapsed = start.elapsed();

            let error = model.constraint_error(&outcome.positions);
            info!(
                status = ?outcome.status,
                alternations = outcome.alternations,
                linear_iterations = outcome.linear_iterations,
                final_energy = outcome.final_energy.widen(),
                constraint_rms = error.rms,
                elapsed_ms = elapsed.as_secs_f64() * 1e3,
                "backend finished"
            );
            if outcome.status == SolveStatus::Diverged {
                warn!("{} diverged after {} alternations", kind, outcome.alternations);
            }

            runs.push(BackendRun {
                kind,
                status: outcome.status,
                alternations: outcome.alternations,
                linear_iterations: outcome.linear_iterations,
                elapsed,
                initial_energy: outcome.initial_energy.widen(),
                final_energy: outcome.final_energy.widen(),
                constraint_rms: error.rms,
                constraint_max: error.max,
                max_deviation: 0.0,
                positions: to_mesh(&outcome.positions),
            });
        }

        Ok((runs, unavailable))
    }
}

/// Index of the run to commit. `runs` must not be empty.
fn select(runs: &[BackendRun], policy: SelectionPolicy) -> usize {
    let healthy = runs
        .iter()
        .enumerate()
        .filter(|(_, r)| r.status != SolveStatus::Diverged);

    let chosen = match policy {
        SelectionPolicy::Fidelity => healthy.min_by_key(|(_, r)| r.kind),
        SelectionPolicy::Fastest => healthy.min_by_key(|(_, r)| r.elapsed),
    };

    chosen.map(|(i, _)| i).unwrap_or_else(|| {
        warn!("every backend diverged, committing the lowest-energy result");
        runs.iter()
            .enumerate()
            .min_by(|(_, a), (_, b)| a.final_energy.total_cmp(&b.final_energy))
            .map(|(i, _)| i)
            .unwrap_or(0)
    })
}

fn max_deviation(a: &[Point3<f64>], b: &[Point3<f64>]) -> f64 {
    a.iter().zip(b).map(|(p, q)| (p - q).norm()).fold(0.0, f64::max)
}

/// Deform `graph` with a one-off [`SolveOrchestrator`].
pub fn deform(
    graph: &mut MeshGraph,
    constraints: &ConstraintSet,
    config: &SolverConfig,
) -> Result<DeformReport> {
    SolveOrchestrator::new(config.clone()).deform(graph, constraints)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::algo::deform::config::BackendSet;
    use crate::algo::deform::fixtures::{grid, lifted_corner};
    use crate::constraints::Constraint;
    use std::sync::{Arc, Mutex};

    fn run(kind: BackendKind, status: SolveStatus, millis: u64, energy: f64) -> BackendRun {
        BackendRun {
            kind,
            status,
            alternations: 1,
            linear_iterations: 1,
            elapsed: Duration::from_millis(millis),
            initial_energy: 10.0,
            final_energy: energy,
            constraint_rms: 0.0,
            constraint_max: 0.0,
            max_deviation: 0.0,
            positions: Vec::new(),
        }
    }

    #[test]
    fn test_select_fidelity_prefers_generic() {
        let runs = vec![
            run(BackendKind::GenericNls, SolveStatus::MaxIterationsReached, 30, 1.0),
            run(BackendKind::LevenbergMarquardt, SolveStatus::Converged, 20, 0.5),
            run(BackendKind::GaussNewton, SolveStatus::Converged, 10, 0.5),
        ];
        assert_eq!(select(&runs, SelectionPolicy::Fidelity), 0);
        assert_eq!(select(&runs, SelectionPolicy::Fastest), 2);
    }

    #[test]
    fn test_select_skips_diverged() {
        let runs = vec![
            run(BackendKind::GenericNls, SolveStatus::Diverged, 30, f64::NAN),
            run(BackendKind::GaussNewton, SolveStatus::Converged, 10, 0.5),
        ];
        assert_eq!(select(&runs, SelectionPolicy::Fidelity), 1);
    }

    #[test]
    fn test_select_all_diverged_takes_lowest_energy() {
        let runs = vec![
            run(BackendKind::GenericNls, SolveStatus::Diverged, 30, 5.0),
            run(BackendKind::LevenbergMarquardt, SolveStatus::Diverged, 20, 2.0),
            run(BackendKind::GaussNewton, SolveStatus::Diverged, 10, 3.0),
        ];
        assert_eq!(select(&runs, SelectionPolicy::Fidelity), 1);
    }

    #[test]
    fn test_deform_commits_and_reports() {
        let mut graph = grid(4);
        let constraints = lifted_corner(&graph, 4);
        let config = SolverConfig::default().with_precision(Precision::Double);

        let report = SolveOrchestrator::new(config).deform(&mut graph, &constraints).unwrap();
        assert_eq!(report.committed, BackendKind::GenericNls);
        let expected = if cfg!(feature = "parallel") { 3 } else { 2 };
        assert_eq!(report.runs.len(), expected);
        assert_eq!(report.runs.len() + report.unavailable.len(), 3);
        assert_eq!(report.alternation_budget, 20);

        let committed = report.committed_run().unwrap();
        assert_eq!(committed.max_deviation, 0.0);
        assert_eq!(graph.positions(), committed.positions.as_slice());
        assert!(graph.max_displacement() > 0.5);
    }

    #[test]
    fn test_progress_reports_each_backend() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        let progress = Progress::new(move |current, total, message| {
            sink.lock().unwrap().push((current, total, message.to_string()));
        });

        let mut graph = grid(3);
        let constraints = lifted_corner(&graph, 3);
        let config = SolverConfig::default().with_backends(
            BackendSet::only(BackendKind::GenericNls).with(BackendKind::LevenbergMarquardt),
        );
        SolveOrchestrator::new(config)
            .with_progress(progress)
            .deform(&mut graph, &constraints)
            .unwrap();

        let seen = seen.lock().unwrap();
        assert_eq!(
            seen.as_slice(),
            &[
                (0, 3, "generic-nls".to_string()),
                (1, 3, "levenberg-marquardt".to_string()),
                (2, 3, "commit".to_string()),
            ]
        );
    }

    #[test]
    fn test_errors_leave_mesh_untouched() {
        let mut graph = grid(3);
        let before = graph.positions().to_vec();

        let out_of_range =
            ConstraintSet::new(vec![Constraint::new(9, Point3::origin())]).unwrap();
        let err = deform(&mut graph, &out_of_range, &SolverConfig::default()).unwrap_err();
        assert!(err.is_configuration_error());

        let empty_set = SolverConfig::default().with_backends(BackendSet::empty());
        let err = deform(&mut graph, &ConstraintSet::empty(), &empty_set).unwrap_err();
        assert_eq!(err, DeformError::NoBackendsEnabled);

        assert_eq!(graph.positions(), before.as_slice());
    }

    #[test]
    fn test_no_backend_available() {
        let mut graph = grid(46);
        let constraints = lifted_corner(&graph, 46);
        let config =
            SolverConfig::default().with_backends(BackendSet::only(BackendKind::GenericNls));

        match deform(&mut graph, &constraints, &config) {
            Err(DeformError::NoBackendAvailable { reasons }) => {
                assert!(reasons.starts_with("generic-nls"));
            }
            other => panic!("expected NoBackendAvailable, got {:?}", other),
        }
    }
}
