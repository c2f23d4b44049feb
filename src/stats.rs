//! Sufficient statistics accumulated by the E-step.

use crate::gaussian::CovarianceType;
use crate::gmm::Mixture;

/// Responsibility-weighted statistics for every component of a mixture.
///
/// One record is built per shard and per iteration, merged by plain vector
/// addition, consumed by the M-step and dropped.
#[derive(Debug, Clone, PartialEq)]
pub struct SufficientStats {
    /// Σ r_k over the samples seen.
    pub counts: Vec<f64>,
    /// Σ r_k · x, `K × D` row-major.
    pub sums: Vec<f64>,
    /// Σ r_k · (x - μ_k)² or Σ r_k · (x - μ_k)(x - μ_k)ᵀ, deviations about
    /// the component mean used during the E-step. `K × scatter_len` row-major.
    pub scatters: Vec<f64>,
    /// Σ log p(x).
    pub log_likelihood: f64,
    /// Number of samples accumulated.
    pub samples: usize,
    dim: usize,
    scatter_len: usize,
}

impl SufficientStats {
    /// Empty accumulator for `k` components of dimension `dim`.
    pub fn new(k: usize, dim: usize, covariance_type: CovarianceType) -> Self {
        let scatter_len = covariance_type.scatter_len(dim);
        Self {
            counts: vec![0.0; k],
            sums: vec![0.0; k * dim],
            scatters: vec![0.0; k * scatter_len],
            log_likelihood: 0.0,
            samples: 0,
            dim,
            scatter_len,
        }
    }

    /// Accumulates the statistics of `samples` under `mixture`.
    ///
    /// `samples` must all have the mixture's dimension.
    pub fn from_samples(mixture: &Mixture, samples: &[Vec<f64>]) -> Self {
        let components = mixture.components();
        let k = components.len();
        let dim = mixture.dim().unwrap_or(0);
        let covariance_type = mixture.covariance_type();
        let mut stats = Self::new(k, dim, covariance_type);
        let scatter_len = stats.scatter_len;

        let mut log_probs = vec![0.0; k];
        let mut diff = vec![0.0; dim];

        for x in samples {
            let log_px = mixture.weighted_log_densities(x, &mut log_probs);
            stats.log_likelihood += log_px;
            stats.samples += 1;

            for (j, component) in components.iter().enumerate() {
                let r = (log_probs[j] - log_px).exp();
                if r == 0.0 {
                    continue;
                }
                stats.counts[j] += r;

                let sum = &mut stats.sums[j * dim..(j + 1) * dim];
                for ((s, xi), (d, mi)) in sum
                    .iter_mut()
                    .zip(x)
                    .zip(diff.iter_mut().zip(component.gaussian.mean()))
                {
                    *s += r * xi;
                    *d = xi - mi;
                }

                let scatter = &mut stats.scatters[j * scatter_len..(j + 1) * scatter_len];
                covariance_type.accumulate_scatter(scatter, &diff, r);
            }
        }

        stats
    }

    /// Adds `other` into `self`.
    pub fn merge(mut self, other: Self) -> Self {
        for (a, b) in self.counts.iter_mut().zip(&other.counts) {
            *a += b;
        }
        for (a, b) in self.sums.iter_mut().zip(&other.sums) {
            *a += b;
        }
        for (a, b) in self.scatters.iter_mut().zip(&other.scatters) {
            *a += b;
        }
        self.log_likelihood += other.log_likelihood;
        self.samples += other.samples;
        self
    }

    /// Number of components tracked.
    #[inline]
    pub fn n_components(&self) -> usize {
        self.counts.len()
    }

    /// Weighted sum of samples for component `k`.
    #[inline]
    pub fn sum(&self, k: usize) -> &[f64] {
        &self.sums[k * self.dim..(k + 1) * self.dim]
    }

    /// Scatter for component `k`.
    #[inline]
    pub fn scatter(&self, k: usize) -> &[f64] {
        &self.scatters[k * self.scatter_len..(k + 1) * self.scatter_len]
    }
}
