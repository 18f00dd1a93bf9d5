//! The local/global alternation shared by every backend.
//!
//! Each alternation fits rotations to the current positions (local step), then solves
//! the quadratic energy with those rotations frozen (global step). Backends only
//! differ in how the global step is solved, so they plug a [`GlobalSolve`] into
//! [`solve_staged`].

use nalgebra::Vector3;
use tracing::{debug, trace};

use super::backend::{BackendOutcome, SolveStatus};
use super::config::SolverConfig;
use super::energy::{ArapEnergy, Linearization};
use super::exec::Execution;
use super::scalar::Real;

/// Where the alternation loop is.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum AlternationState {
    /// Refit rotations to a proposed position buffer and review the step.
    EstimateRotations,
    /// Run the backend's global step.
    AssembleAndSolve,
    /// Decide whether to stop.
    CheckConvergence,
    /// Finished with a status.
    Done(SolveStatus),
}

/// Result of one global step.
#[derive(Debug, Clone)]
pub(crate) struct GlobalStep<T: Real> {
    /// Proposed positions.
    pub positions: Vec<Vector3<T>>,
    /// Inner linear iterations spent (direct solves count one).
    pub linear_iterations: usize,
}

/// What to do with a proposed step once its energy is known.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum StepReview {
    /// Move to the proposed positions.
    Accept,
    /// Stay put and try again.
    Reject,
    /// Stay put; no further progress is possible.
    Stall,
}

/// The backend-specific global step.
pub(crate) trait GlobalSolve<T: Real> {
    /// Solve the linearized problem starting at `positions`.
    fn step(&mut self, lin: &Linearization<'_, T>, positions: &[Vector3<T>]) -> GlobalStep<T>;

    /// Judge a step by the energy before and after it (rotations refitted).
    fn review(&mut self, _current: T, _proposed: T) -> StepReview {
        StepReview::Accept
    }

    /// Reset per-solve state before a new load step.
    fn restart(&mut self) {}
}

/// Tracks the best iterate and decides convergence.
#[derive(Debug, Clone)]
pub(crate) struct ConvergenceMonitor<T: Real> {
    best_energy: T,
    best_positions: Vec<Vector3<T>>,
    absolute_tolerance: T,
    early_out_tolerance: Option<T>,
}

impl<T: Real> ConvergenceMonitor<T> {
    pub fn new(config: &SolverConfig, energy: T, positions: &[Vector3<T>]) -> Self {
        Self {
            best_energy: energy,
            best_positions: positions.to_vec(),
            absolute_tolerance: T::of(config.absolute_tolerance),
            early_out_tolerance: config
                .early_out
                .then(|| T::of(config.early_out_tolerance)),
        }
    }

    /// Remember `positions` if they beat the best energy seen so far.
    pub fn record(&mut self, energy: T, positions: &[Vector3<T>]) {
        if energy.is_finite() && energy < self.best_energy {
            self.best_energy = energy;
            self.best_positions.clear();
            self.best_positions.extend_from_slice(positions);
        }
    }

    /// Stop status for the current energy, if any.
    ///
    /// `previous` is the energy before the last accepted step; `None` skips the
    /// relative improvement test.
    pub fn verdict(&self, energy: T, previous: Option<T>) -> Option<SolveStatus> {
        if !energy.is_finite() {
            return Some(SolveStatus::Diverged);
        }
        if energy <= self.absolute_tolerance {
            return Some(SolveStatus::Converged);
        }
        if let (Some(tolerance), Some(previous)) = (self.early_out_tolerance, previous) {
            if previous > T::zero() && (previous - energy) / previous < tolerance {
                return Some(SolveStatus::Converged);
            }
        }
        None
    }

    pub fn into_best(self) -> (Vec<Vector3<T>>, T) {
        (self.best_positions, self.best_energy)
    }
}

/// Run alternations on `model` from `initial` until convergence or the budget runs out.
///
/// The returned positions are always the lowest-energy iterate seen.
pub(crate) fn run_alternations<T, S>(
    model: &ArapEnergy<'_, T>,
    initial: Vec<Vector3<T>>,
    budget: usize,
    config: &SolverConfig,
    exec: Execution,
    stepper: &mut S,
) -> BackendOutcome<T>
where
    T: Real,
    S: GlobalSolve<T>,
{
    let mut lin = model.linearize(&initial, exec);
    let initial_energy = lin.energy(&initial);
    let mut monitor = ConvergenceMonitor::new(config, initial_energy, &initial);

    let mut positions = initial;
    let mut energy = initial_energy;
    let mut previous: Option<T> = None;
    let mut proposal: Vec<Vector3<T>> = Vec::new();
    let mut alternations = 0;
    let mut linear_iterations = 0;

    let mut state = if budget == 0 {
        AlternationState::Done(SolveStatus::MaxIterationsReached)
    } else {
        AlternationState::CheckConvergence
    };

    let status = loop {
        state = match state {
            AlternationState::EstimateRotations => {
                let candidate = model.linearize(&proposal, exec);
                let candidate_energy = candidate.energy(&proposal);
                match stepper.review(energy, candidate_energy) {
                    StepReview::Accept => {
                        previous = Some(energy);
                        positions = std::mem::take(&mut proposal);
                        lin = candidate;
                        energy = candidate_energy;
                        monitor.record(energy, &positions);
                        AlternationState::CheckConvergence
                    }
                    StepReview::Reject => {
                        previous = None;
                        AlternationState::CheckConvergence
                    }
                    StepReview::Stall => AlternationState::Done(SolveStatus::Converged),
                }
            }
            AlternationState::CheckConvergence => match monitor.verdict(energy, previous) {
                Some(status) => AlternationState::Done(status),
                None if alternations >= budget => {
                    AlternationState::Done(SolveStatus::MaxIterationsReached)
                }
                None => AlternationState::AssembleAndSolve,
            },
            AlternationState::AssembleAndSolve => {
                let step = stepper.step(&lin, &positions);
                alternations += 1;
                linear_iterations += step.linear_iterations;
                debug!(
                    alternation = alternations,
                    energy = energy.widen(),
                    linear_iterations = step.linear_iterations,
                    degenerate_rotations = lin.degenerate_rotations(),
                    "global step"
                );
                proposal = step.positions;
                AlternationState::EstimateRotations
            }
            AlternationState::Done(status) => break status,
        };
    };

    trace!(?status, alternations, "alternations finished");
    let (best, best_energy) = monitor.into_best();
    BackendOutcome {
        positions: best,
        status,
        alternations,
        linear_iterations,
        initial_energy,
        final_energy: best_energy,
    }
}

/// Run the alternations once per load step, approaching the targets gradually.
///
/// With one load step this is a plain [`run_alternations`]. Energies in the outcome
/// are measured on the unblended `model`.
pub(crate) fn solve_staged<T, S>(
    model: &ArapEnergy<'_, T>,
    initial: Vec<Vector3<T>>,
    config: &SolverConfig,
    exec: Execution,
    stepper: &mut S,
) -> BackendOutcome<T>
where
    T: Real,
    S: GlobalSolve<T>,
{
    let budget = config.alternation_budget(model.num_vertices());
    let steps = config.load_steps.max(1);
    if steps == 1 {
        return run_alternations(model, initial, budget, config, exec, stepper);
    }

    let initial_energy = model.energy(&initial, exec);
    let start = initial.clone();
    let mut positions = initial;
    let mut alternations = 0;
    let mut linear_iterations = 0;
    let mut status = SolveStatus::MaxIterationsReached;

    for step in 1..=steps {
        let alpha = T::of(step as f64 / steps as f64);
        let staged = model.with_target_blend(&start, alpha);
        stepper.restart();
        let outcome = run_alternations(&staged, positions, budget, config, exec, stepper);
        debug!(
            load_step = step,
            status = ?outcome.status,
            alternations = outcome.alternations,
            "load step finished"
        );

        positions = outcome.positions;
        alternations += outcome.alternations;
        linear_iterations += outcome.linear_iterations;
        status = outcome.status;
        if status == SolveStatus::Diverged {
            break;
        }
    }

    let final_energy = model.energy(&positions, exec);
    BackendOutcome {
        positions,
        status,
        alternations,
        linear_iterations,
        initial_energy,
        final_energy,
    }
}
