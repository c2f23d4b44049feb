//! Baseline Expectation-Maximization trainer.
//!
//! Each iteration cuts the dataset into contiguous shards of
//! `shard_size` samples, accumulates per-shard [`SufficientStats`] on the
//! worker pool, merges them in shard order and applies the closed-form
//! M-step. Shard boundaries do not depend on the number of workers, so the
//! fitted parameters do not either.

use super::init::{initialize, GlobalStats};
use super::{FitReport, Trainer, TrainerState};
use crate::config::{ConvergenceMode, TrainerConfig};
use crate::error::{GmmError, Result};
use crate::gaussian::{Covariance, Gaussian};
use crate::gmm::{Component, Mixture};
use crate::pool::{MapReduce, Sequential, WorkerPool};
use crate::rng::Random;
use crate::stats::SufficientStats;
use log::{debug, info, warn};

/// EM trainer; configuration fixed at construction, workers reused across fits.
#[derive(Debug)]
pub struct EmTrainer<P: MapReduce = WorkerPool> {
    config: TrainerConfig,
    pool: P,
}

impl EmTrainer<WorkerPool> {
    /// Trainer backed by a pool of `config.concurrency` workers.
    pub fn new(config: TrainerConfig) -> Result<Self> {
        let pool = WorkerPool::new(config.concurrency)?;
        Self::with_pool(config, pool)
    }
}

impl EmTrainer<Sequential> {
    /// Trainer that runs the E-step on the calling thread.
    pub fn sequential(config: TrainerConfig) -> Result<Self> {
        Self::with_pool(config, Sequential)
    }
}

impl<P: MapReduce> EmTrainer<P> {
    /// Trainer backed by an arbitrary executor.
    pub fn with_pool(config: TrainerConfig, pool: P) -> Result<Self> {
        config.validate()?;
        Ok(Self { config, pool })
    }

    /// The trainer configuration.
    pub fn config(&self) -> &TrainerConfig {
        &self.config
    }

    /// The E-step executor.
    pub fn pool(&self) -> &P {
        &self.pool
    }

    /// Concurrent E-step: statistics of `data` under `mixture`.
    fn expectation(&self, mixture: &Mixture, data: &[Vec<f64>]) -> SufficientStats {
        let shards: Vec<&[Vec<f64>]> = data.chunks(self.config.shard_size).collect();
        let empty = SufficientStats::new(
            mixture.n_components(),
            mixture.dim().unwrap_or(0),
            mixture.covariance_type(),
        );

        self.pool.map_reduce(
            &shards,
            |shard| SufficientStats::from_samples(mixture, shard),
            empty,
            SufficientStats::merge,
        )
    }

    /// M-step. Returns the indices of components that had to be reset.
    fn maximization(
        &self,
        mixture: &mut Mixture,
        stats: &SufficientStats,
        data: &[Vec<f64>],
        global: &GlobalStats,
        rng: &mut Random,
        iteration: usize,
    ) -> Result<Vec<usize>> {
        let k = mixture.n_components();
        let n = stats.samples as f64;
        let covariance_type = mixture.covariance_type();
        let min_variance = self.config.min_variance;

        let mut components = Vec::with_capacity(k);
        let mut reset = Vec::new();

        for (j, old) in mixture.components().iter().enumerate() {
            let count = stats.counts[j];

            if !(count > self.config.min_component_mass) {
                warn!("{}", GmmError::DegenerateComponent { component: j, iteration });
                let mean = data[rng.index(data.len())].clone();
                let covariance = Covariance::from_variances(covariance_type, &global.variances, min_variance);
                components.push(Component::new(1.0 / k as f64, Gaussian::new(mean, covariance)?));
                reset.push(j);
                continue;
            }

            let mean: Vec<f64> = stats.sum(j).iter().map(|s| s / count).collect();
            let shift: Vec<f64> = mean.iter().zip(old.gaussian.mean()).map(|(new, old)| new - old).collect();
            let covariance = covariance_type.estimate(stats.scatter(j), count, &shift, min_variance);

            components.push(Component::new(count / n, Gaussian::new(mean, covariance)?));
        }

        let total: f64 = components.iter().map(|c| c.weight).sum();
        for c in &mut components {
            c.weight /= total;
        }

        mixture.set_components(components);
        Ok(reset)
    }

    /// One EM run from fresh (or, with `warm`, current) parameters.
    ///
    /// On `LikelihoodRegression` the mixture is rolled back to the
    /// parameters of the previous iteration.
    fn run(
        &self,
        mixture: &mut Mixture,
        data: &[Vec<f64>],
        global: &GlobalStats,
        rng: &mut Random,
        warm: bool,
    ) -> Result<(TrainerState, usize, Vec<f64>, Vec<(usize, usize)>)> {
        let mut state = TrainerState::Initializing;
        if !warm {
            initialize(mixture, data, global, self.config.init, self.config.min_variance, rng)?;
        }
        debug!("EM run {}", state);

        state = TrainerState::Iterating;
        let mut stats = self.expectation(mixture, data);
        let mut history = vec![stats.log_likelihood];
        let mut reinitialized = Vec::new();
        let mut iterations = 0;

        while state == TrainerState::Iterating {
            if iterations == self.config.max_iterations {
                state = TrainerState::MaxIterReached;
                break;
            }
            iterations += 1;

            let previous = mixture.clone();
            let reset = self.maximization(mixture, &stats, data, global, rng, iterations)?;
            let next = self.expectation(mixture, data);
            history.push(next.log_likelihood);

            debug!(
                "Iteration {}/{}: log-likelihood={:.6}, delta={:.3e}",
                iterations,
                self.config.max_iterations,
                next.log_likelihood,
                next.log_likelihood - stats.log_likelihood
            );

            // A reset component breaks EM's monotonicity; skip the check once.
            if reset.is_empty() {
                match check_convergence(&self.config, iterations, stats.log_likelihood, next.log_likelihood) {
                    Ok(true) => state = TrainerState::Converged,
                    Ok(false) => {}
                    Err(err) => {
                        *mixture = previous;
                        return Err(err);
                    }
                }
            } else {
                reinitialized.extend(reset.into_iter().map(|c| (iterations, c)));
            }

            stats = next;
        }

        Ok((state, iterations, history, reinitialized))
    }
}

impl<P: MapReduce> Trainer for EmTrainer<P> {
    fn train(&self, mixture: &mut Mixture, data: &[Vec<f64>]) -> Result<FitReport> {
        let dim = mixture.check_dataset(data)?;
        let k = mixture.n_components();
        if k == 0 || data.len() < k {
            return Err(GmmError::TooFewSamples { samples: data.len(), components: k });
        }

        info!(
            "Fitting GMM: {} samples, {} dim, {} {} components, {} workers",
            data.len(),
            dim,
            k,
            mixture.covariance_type(),
            self.pool.concurrency()
        );

        let global = GlobalStats::compute(data, dim, self.config.min_variance);
        let mut rng = Random::new(self.config.seed);
        let warm = self.config.warm_start && mixture.is_fitted();

        let mut best: Option<(Mixture, FitReport)> = None;
        for run in 0..self.config.n_init {
            let mut candidate = mixture.clone();
            let (state, iterations, history, reinitialized) =
                match self.run(&mut candidate, data, &global, &mut rng, warm && run == 0) {
                    Ok(outcome) => outcome,
                    Err(err) => {
                        // Best completed restart, else the failed run's last valid state.
                        *mixture = match best {
                            Some((kept, _)) => kept,
                            None => candidate,
                        };
                        return Err(err);
                    }
                };

            let log_likelihood = history.last().copied().unwrap_or(f64::NEG_INFINITY);
            info!(
                "Run {}/{}: {} after {} iterations, log-likelihood={:.6}",
                run + 1,
                self.config.n_init,
                state,
                iterations,
                log_likelihood
            );

            let report = FitReport {
                state,
                iterations,
                log_likelihood,
                history,
                reinitialized,
                run,
            };

            let better = match &best {
                Some((_, kept)) => report.log_likelihood > kept.log_likelihood,
                None => true,
            };
            if better {
                best = Some((candidate, report));
            }
        }

        let (fitted, report) = best.ok_or_else(|| GmmError::Config("n_init must be at least 1".to_string()))?;
        *mixture = fitted;
        Ok(report)
    }
}

/// Compares two successive log-likelihoods.
///
/// Returns `Ok(true)` once the improvement is below the threshold (a decrease
/// within `regression_tolerance` counts as converged) and
/// `Err(LikelihoodRegression)` for a larger decrease.
pub(crate) fn check_convergence(
    config: &TrainerConfig,
    iteration: usize,
    previous: f64,
    current: f64,
) -> Result<bool> {
    let delta = current - previous;
    let tolerance = config.regression_tolerance * previous.abs().max(1.0);
    if delta < -tolerance || delta.is_nan() {
        return Err(GmmError::LikelihoodRegression { iteration, previous, current });
    }

    let improvement = match config.convergence {
        ConvergenceMode::Absolute => delta,
        ConvergenceMode::Relative => delta / previous.abs().max(f64::MIN_POSITIVE),
    };
    Ok(improvement < config.threshold)
}
