//! Trainers that fit a [`Mixture`] to a dataset.
//!
//! - [`EmTrainer`]: baseline Expectation-Maximization with a concurrent E-step

mod em;
mod init;

pub use em::EmTrainer;

use crate::error::Result;
use crate::gmm::Mixture;
use std::fmt;

/// Fits mixture parameters in place.
pub trait Trainer: fmt::Debug + Send + Sync {
    /// Fits `mixture` to `data` and reports how the run ended.
    ///
    /// On error the mixture holds the last valid parameters, or is untouched
    /// if the dataset was rejected up front. When a restart fails after an
    /// earlier restart completed, the best completed restart is kept.
    fn train(&self, mixture: &mut Mixture, data: &[Vec<f64>]) -> Result<FitReport>;
}

/// Lifecycle of one EM run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TrainerState {
    /// Drawing the starting parameters.
    Initializing,
    /// Alternating E- and M-steps.
    Iterating,
    /// The log-likelihood improvement fell below the threshold.
    Converged,
    /// The iteration budget ran out first.
    MaxIterReached,
}

impl fmt::Display for TrainerState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            TrainerState::Initializing => "initializing",
            TrainerState::Iterating => "iterating",
            TrainerState::Converged => "converged",
            TrainerState::MaxIterReached => "max iterations reached",
        };
        f.write_str(name)
    }
}

/// Outcome of a fit.
#[derive(Debug, Clone, PartialEq)]
pub struct FitReport {
    /// Terminal state of the kept run.
    pub state: TrainerState,
    /// M-steps performed by the kept run.
    pub iterations: usize,
    /// Log-likelihood of the final parameters.
    pub log_likelihood: f64,
    /// Log-likelihood after initialization and after every M-step.
    pub history: Vec<f64>,
    /// `(iteration, component)` for every starved component that was reset.
    pub reinitialized: Vec<(usize, usize)>,
    /// Index of the kept run among the `n_init` restarts.
    pub run: usize,
}

impl FitReport {
    /// True when the kept run converged.
    pub fn converged(&self) -> bool {
        self.state == TrainerState::Converged
    }
}
