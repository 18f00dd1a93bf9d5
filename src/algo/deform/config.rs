//! Solver configuration.
//!
//! A [`SolverConfig`] is built once, validated once, and passed by reference into the
//! orchestrator. Nothing downstream mutates it; derived values such as the adaptive
//! alternation budget are computed from it on demand.

use std::collections::BTreeSet;
use std::fmt;

use super::scalar::Precision;
use crate::error::{DeformError, Result};

/// The available solver backends.
///
/// Variants are declared in fidelity order, so the derived `Ord` sorts the most
/// trustworthy backend first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum BackendKind {
    /// Dense direct solve per alternation; numerical reference for small meshes.
    GenericNls,
    /// Damped Gauss-Newton on an assembled sparse system.
    LevenbergMarquardt,
    /// Data-parallel matrix-free Gauss-Newton with preconditioned CG.
    GaussNewton,
}

impl BackendKind {
    /// All backends, highest fidelity first.
    pub const ALL: [BackendKind; 3] = [
        BackendKind::GenericNls,
        BackendKind::LevenbergMarquardt,
        BackendKind::GaussNewton,
    ];

    /// Stable short name used in logs and progress messages.
    pub fn name(self) -> &'static str {
        match self {
            BackendKind::GenericNls => "generic-nls",
            BackendKind::LevenbergMarquardt => "levenberg-marquardt",
            BackendKind::GaussNewton => "gauss-newton",
        }
    }
}

impl fmt::Display for BackendKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Explicit set of enabled backends. Iterates in fidelity order.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct BackendSet {
    kinds: BTreeSet<BackendKind>,
}

impl BackendSet {
    /// No backend enabled.
    pub fn empty() -> Self {
        Self::default()
    }

    /// Every backend enabled.
    pub fn all() -> Self {
        BackendKind::ALL.into_iter().collect()
    }

    /// Exactly one backend.
    pub fn only(kind: BackendKind) -> Self {
        std::iter::once(kind).collect()
    }

    /// Add a backend.
    pub fn with(mut self, kind: BackendKind) -> Self {
        self.kinds.insert(kind);
        self
    }

    /// Remove a backend.
    pub fn without(mut self, kind: BackendKind) -> Self {
        self.kinds.remove(&kind);
        self
    }

    /// Whether `kind` is enabled.
    pub fn contains(&self, kind: BackendKind) -> bool {
        self.kinds.contains(&kind)
    }

    /// Number of enabled backends.
    pub fn len(&self) -> usize {
        self.kinds.len()
    }

    /// Whether nothing is enabled.
    pub fn is_empty(&self) -> bool {
        self.kinds.is_empty()
    }

    /// Enabled backends, highest fidelity first.
    pub fn iter(&self) -> impl Iterator<Item = BackendKind> + '_ {
        self.kinds.iter().copied()
    }
}

impl FromIterator<BackendKind> for BackendSet {
    fn from_iter<I: IntoIterator<Item = BackendKind>>(iter: I) -> Self {
        Self {
            kinds: iter.into_iter().collect(),
        }
    }
}

/// Which run gets committed when several backends ran.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SelectionPolicy {
    /// Highest-fidelity backend that did not diverge.
    #[default]
    Fidelity,
    /// Fastest backend that did not diverge; the others only provide metrics.
    Fastest,
}

/// Overall solve mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SolveMode {
    /// Alternation cap taken from `nonlinear_iter` as is.
    #[default]
    Standard,
    /// Landmark-only solve of a full-resolution mesh: above
    /// `adaptive_vertex_threshold` vertices the cap grows with the vertex count.
    LandmarkOnlyFullSolve,
}

/// How one-ring edges are weighted in the rotation fit and the energy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum EdgeWeighting {
    /// Every edge weighs 1.
    #[default]
    Uniform,
    /// Edges weigh their rest length.
    RestLength,
    /// Cotangent weights from the triangle list (uniform where no triangle exists).
    Cotangent,
}

/// Relative weights of the two residual families.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EnergyWeights {
    /// Weight of the landmark data term.
    pub fit: f64,
    /// Weight of the rigidity term.
    pub regularization: f64,
}

impl Default for EnergyWeights {
    fn default() -> Self {
        Self {
            fit: 1000.0,
            regularization: 1.0,
        }
    }
}

/// Trust-region damping schedule for the Levenberg-Marquardt backend.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DampingOptions {
    /// Initial damping factor λ.
    pub initial: f64,
    /// λ is multiplied by this after a rejected step.
    pub increase_factor: f64,
    /// λ is divided by this after an accepted step.
    pub decrease_factor: f64,
    /// Lower clamp.
    pub min: f64,
    /// Upper clamp; reaching it with a rejected step counts as a stall.
    pub max: f64,
}

impl Default for DampingOptions {
    fn default() -> Self {
        Self {
            initial: 1e-3,
            increase_factor: 10.0,
            decrease_factor: 10.0,
            min: 1e-9,
            max: 1e9,
        }
    }
}

/// Options for a deformation solve.
#[derive(Debug, Clone, PartialEq)]
pub struct SolverConfig {
    /// Outer alternation cap (rotation fit + position solve).
    pub nonlinear_iter: usize,

    /// Inner linear-solve iteration cap per alternation.
    pub linear_iter: usize,

    /// Accumulation precision.
    pub precision: Precision,

    /// Stop once the relative energy improvement of an alternation drops below
    /// `early_out_tolerance`.
    pub early_out: bool,

    /// Relative improvement threshold used by `early_out`.
    pub early_out_tolerance: f64,

    /// Energy at or below which a solve counts as converged.
    pub absolute_tolerance: f64,

    /// Relative residual tolerance of the inner linear solves.
    pub linear_tolerance: f64,

    /// Number of load steps: landmark targets are approached in this many equal
    /// increments, each solved with the full alternation budget.
    pub load_steps: usize,

    /// Enabled backends.
    pub backends: BackendSet,

    /// How the committed result is chosen.
    pub selection: SelectionPolicy,

    /// Solve mode (affects the alternation budget).
    pub mode: SolveMode,

    /// Residual weights.
    pub weights: EnergyWeights,

    /// Edge weighting scheme.
    pub edge_weighting: EdgeWeighting,

    /// Levenberg-Marquardt damping schedule.
    pub damping: DampingOptions,

    /// Per-vertex distance above which two backends are reported as disagreeing.
    pub agreement_tolerance: f64,

    /// Vertex count above which [`SolveMode::LandmarkOnlyFullSolve`] scales the cap.
    pub adaptive_vertex_threshold: usize,

    /// Vertices per alternation in the scaled cap.
    pub vertices_per_alternation: usize,
}

impl Default for SolverConfig {
    fn default() -> Self {
        Self {
            nonlinear_iter: 20,
            linear_iter: 1000,
            precision: Precision::Single,
            early_out: true,
            early_out_tolerance: 1e-6,
            absolute_tolerance: 1e-12,
            linear_tolerance: 1e-6,
            load_steps: 1,
            backends: BackendSet::all(),
            selection: SelectionPolicy::Fidelity,
            mode: SolveMode::Standard,
            weights: EnergyWeights::default(),
            edge_weighting: EdgeWeighting::Uniform,
            damping: DampingOptions::default(),
            agreement_tolerance: 1e-3,
            adaptive_vertex_threshold: 100_000,
            vertices_per_alternation: 5000,
        }
    }
}

impl SolverConfig {
    /// Performance comparison preset: every backend runs, the fastest result is
    /// committed, the rest are kept as metrics.
    pub fn performance() -> Self {
        Self {
            selection: SelectionPolicy::Fastest,
            ..Self::default()
        }
    }

    /// Set the outer alternation cap.
    pub fn with_nonlinear_iter(mut self, iterations: usize) -> Self {
        self.nonlinear_iter = iterations;
        self
    }

    /// Set the inner linear iteration cap.
    pub fn with_linear_iter(mut self, iterations: usize) -> Self {
        self.linear_iter = iterations;
        self
    }

    /// Set the precision.
    pub fn with_precision(mut self, precision: Precision) -> Self {
        self.precision = precision;
        self
    }

    /// Enable or disable early out, with its relative tolerance.
    pub fn with_early_out(mut self, enabled: bool, tolerance: f64) -> Self {
        self.early_out = enabled;
        self.early_out_tolerance = tolerance;
        self
    }

    /// Set the absolute energy tolerance.
    pub fn with_absolute_tolerance(mut self, tolerance: f64) -> Self {
        self.absolute_tolerance = tolerance;
        self
    }

    /// Set the inner linear solve tolerance.
    pub fn with_linear_tolerance(mut self, tolerance: f64) -> Self {
        self.linear_tolerance = tolerance;
        self
    }

    /// Set the number of load steps.
    pub fn with_load_steps(mut self, steps: usize) -> Self {
        self.load_steps = steps;
        self
    }

    /// Set the enabled backends.
    pub fn with_backends(mut self, backends: BackendSet) -> Self {
        self.backends = backends;
        self
    }

    /// Set the selection policy.
    pub fn with_selection(mut self, selection: SelectionPolicy) -> Self {
        self.selection = selection;
        self
    }

    /// Set the solve mode.
    pub fn with_mode(mut self, mode: SolveMode) -> Self {
        self.mode = mode;
        self
    }

    /// Set the residual weights.
    pub fn with_weights(mut self, weights: EnergyWeights) -> Self {
        self.weights = weights;
        self
    }

    /// Set the edge weighting.
    pub fn with_edge_weighting(mut self, weighting: EdgeWeighting) -> Self {
        self.edge_weighting = weighting;
        self
    }

    /// Set the damping schedule.
    pub fn with_damping(mut self, damping: DampingOptions) -> Self {
        self.damping = damping;
        self
    }

    /// Set the agreement tolerance.
    pub fn with_agreement_tolerance(mut self, tolerance: f64) -> Self {
        self.agreement_tolerance = tolerance;
        self
    }

    /// Alternation cap for a mesh with `vertex_count` vertices.
    ///
    /// In [`SolveMode::LandmarkOnlyFullSolve`] meshes above the threshold get
    /// `vertex_count / vertices_per_alternation` alternations.
    pub fn alternation_budget(&self, vertex_count: usize) -> usize {
        match self.mode {
            SolveMode::LandmarkOnlyFullSolve if vertex_count > self.adaptive_vertex_threshold => {
                (vertex_count / self.vertices_per_alternation.max(1)).max(1)
            }
            _ => self.nonlinear_iter,
        }
    }

    /// Check every option.
    ///
    /// # Errors
    ///
    /// [`DeformError::NoBackendsEnabled`] for an empty backend set, otherwise
    /// [`DeformError::InvalidParameter`] naming the first bad option.
    pub fn validate(&self) -> Result<()> {
        if self.backends.is_empty() {
            return Err(DeformError::NoBackendsEnabled);
        }
        if self.linear_iter == 0 {
            return Err(DeformError::invalid_param(
                "linear_iter",
                self.linear_iter,
                "must be at least 1",
            ));
        }
        if self.load_steps == 0 {
            return Err(DeformError::invalid_param(
                "load_steps",
                self.load_steps,
                "must be at least 1",
            ));
        }
        if self.vertices_per_alternation == 0 {
            return Err(DeformError::invalid_param(
                "vertices_per_alternation",
                self.vertices_per_alternation,
                "must be at least 1",
            ));
        }
        positive("weights.fit", self.weights.fit)?;
        positive("weights.regularization", self.weights.regularization)?;
        non_negative("early_out_tolerance", self.early_out_tolerance)?;
        non_negative("absolute_tolerance", self.absolute_tolerance)?;
        non_negative("linear_tolerance", self.linear_tolerance)?;
        non_negative("agreement_tolerance", self.agreement_tolerance)?;

        let d = &self.damping;
        positive("damping.min", d.min)?;
        if d.initial.is_nan() || d.initial < d.min || d.initial > d.max {
            return Err(DeformError::invalid_param(
                "damping.initial",
                d.initial,
                "must lie within [damping.min, damping.max]",
            ));
        }
        if d.increase_factor.is_nan() || d.increase_factor <= 1.0 {
            return Err(DeformError::invalid_param(
                "damping.increase_factor",
                d.increase_factor,
                "must be greater than 1",
            ));
        }
        if d.decrease_factor.is_nan() || d.decrease_factor <= 1.0 {
            return Err(DeformError::invalid_param(
                "damping.decrease_factor",
                d.decrease_factor,
                "must be greater than 1",
            ));
        }
        Ok(())
    }
}

fn positive(name: &'static str, value: f64) -> Result<()> {
    if value.is_finite() && value > 0.0 {
        Ok(())
    } else {
        Err(DeformError::invalid_param(name, value, "must be positive and finite"))
    }
}

fn non_negative(name: &'static str, value: f64) -> Result<()> {
    if value.is_finite() && value >= 0.0 {
        Ok(())
    } else {
        Err(DeformError::invalid_param(name, value, "must be non-negative and finite"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_validate() {
        assert!(SolverConfig::default().validate().is_ok());
        assert!(SolverConfig::performance().validate().is_ok());
    }

    #[test]
    fn test_backend_set_fidelity_order() {
        let set = BackendSet::empty()
            .with(BackendKind::GaussNewton)
            .with(BackendKind::GenericNls);
        let order: Vec<BackendKind> = set.iter().collect();
        assert_eq!(order, vec![BackendKind::GenericNls, BackendKind::GaussNewton]);
        assert!(!set.contains(BackendKind::LevenbergMarquardt));
        assert_eq!(BackendSet::all().without(BackendKind::GenericNls).len(), 2);
    }

    #[test]
    fn test_empty_backends_rejected() {
        let config = SolverConfig::default().with_backends(BackendSet::empty());
        assert_eq!(config.validate(), Err(DeformError::NoBackendsEnabled));
    }

    #[test]
    fn test_bad_weights_rejected() {
        let config = SolverConfig::default().with_weights(EnergyWeights {
            fit: 0.0,
            regularization: 1.0,
        });
        assert!(matches!(
            config.validate(),
            Err(DeformError::InvalidParameter { name: "weights.fit", .. })
        ));
    }

    #[test]
    fn test_bad_damping_rejected() {
        let config = SolverConfig::default().with_damping(DampingOptions {
            increase_factor: 1.0,
            ..DampingOptions::default()
        });
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_adaptive_budget() {
        let config = SolverConfig::default().with_mode(SolveMode::LandmarkOnlyFullSolve);
        assert_eq!(config.alternation_budget(1_000), 20);
        assert_eq!(config.alternation_budget(100_000), 20);
        assert_eq!(config.alternation_budget(250_000), 50);

        let standard = SolverConfig::default();
        assert_eq!(standard.alternation_budget(250_000), 20);
    }
}
