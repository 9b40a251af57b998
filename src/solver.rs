use crate::energy::EnergyFunction;
use crate::error::{EnergyError, Result};
use crate::graph::NodeId;

/// Iteration budget, stopping rule and damping shared by both solvers.
#[derive(Debug, Clone, PartialEq)]
pub struct SolverConfig {
    /// Maximum number of synchronous sweeps per call to `solve`.
    pub max_iterations: usize,
    /// Convergence threshold on the largest absolute message change of a sweep.
    pub tolerance: f64,
    /// Weight of the previous message when blending in a new one, in `[0, 1)`.
    /// 0 is plain sum-product.
    pub damping: f64,
}

impl Default for SolverConfig {
    fn default() -> Self {
        Self {
            max_iterations: 100,
            tolerance: 1e-6,
            damping: 0.0,
        }
    }
}

impl SolverConfig {
    pub fn new(max_iterations: usize, tolerance: f64, damping: f64) -> Self {
        Self {
            max_iterations,
            tolerance,
            damping,
        }
    }

    pub fn with_max_iterations(mut self, max_iterations: usize) -> Self {
        self.max_iterations = max_iterations;
        self
    }

    pub fn with_tolerance(mut self, tolerance: f64) -> Self {
        self.tolerance = tolerance;
        self
    }

    pub fn with_damping(mut self, damping: f64) -> Self {
        self.damping = damping;
        self
    }

    pub fn validate(&self) -> Result<()> {
        if self.max_iterations == 0 {
            return Err(EnergyError::InvalidConfig(
                "max_iterations must be at least 1".into(),
            ));
        }
        if !(self.tolerance > 0.0 && self.tolerance.is_finite()) {
            return Err(EnergyError::InvalidConfig(format!(
                "tolerance must be positive and finite, got {}",
                self.tolerance
            )));
        }
        if !(0.0..1.0).contains(&self.damping) {
            return Err(EnergyError::InvalidConfig(format!(
                "damping must lie in [0, 1), got {}",
                self.damping
            )));
        }
        Ok(())
    }
}

/// Message-passing solver over an `EnergyFunction`.
///
/// `init` snapshots the energy function and resets all messages, `solve` runs
/// sweeps until convergence or the iteration cap, after which beliefs can be read.
/// Calling `solve` again resumes from the current messages.
pub trait Solver {
    type Label: Clone + PartialEq;

    fn init<E>(&mut self, energy: &E) -> Result<()>
    where
        E: EnergyFunction<Label = Self::Label> + ?Sized;

    /// Returns whether the sweeps converged; `Ok(false)` still leaves usable beliefs.
    fn solve(&mut self) -> Result<bool>;

    /// Normalized marginal probability of `label` at `node`.
    fn belief(&self, node: NodeId, label: &Self::Label) -> Result<f64>;

    /// All marginals, indexed by node then by position in the node's domain.
    fn marginals(&self) -> Result<&[Vec<f64>]>;

    /// Sweeps run since the last `init`.
    fn iterations(&self) -> usize;

    fn converged(&self) -> bool;
}
