//! Multivariate normal distributions.

mod covariance;

pub use covariance::{Covariance, CovarianceType, DiagonalCovariance, FullCovariance};

use crate::error::{GmmError, Result};
use crate::rng::Random;
use std::f64::consts::PI;

/// A single multivariate normal distribution.
///
/// The log normalizer `-0.5 * (D ln 2π + ln|Σ|)` is cached, so
/// [`Gaussian::log_density`] costs one Mahalanobis evaluation.
#[derive(Debug, Clone, PartialEq)]
pub struct Gaussian {
    mean: Vec<f64>,
    covariance: Covariance,
    log_norm: f64,
}

impl Gaussian {
    /// Creates a Gaussian; mean and covariance must agree in dimension.
    pub fn new(mean: Vec<f64>, covariance: Covariance) -> Result<Self> {
        if mean.len() != covariance.dim() {
            return Err(GmmError::DimensionMismatch {
                expected: covariance.dim(),
                found: mean.len(),
            });
        }

        let dim = mean.len() as f64;
        let log_norm = -0.5 * (dim * (2.0 * PI).ln() + covariance.log_det());

        Ok(Self { mean, covariance, log_norm })
    }

    /// Creates a Gaussian with diagonal covariance.
    pub fn diagonal(mean: Vec<f64>, variances: Vec<f64>) -> Result<Self> {
        let covariance = Covariance::Diagonal(DiagonalCovariance::new(variances)?);
        Self::new(mean, covariance)
    }

    /// Creates a Gaussian with a full covariance matrix (row-major).
    pub fn full(mean: Vec<f64>, matrix: Vec<f64>) -> Result<Self> {
        let dim = mean.len();
        if matrix.len() != dim * dim {
            return Err(GmmError::DimensionMismatch {
                expected: dim * dim,
                found: matrix.len(),
            });
        }
        Self::new(mean, Covariance::Full(FullCovariance::new(dim, matrix)?))
    }

    /// Mean vector.
    #[inline]
    pub fn mean(&self) -> &[f64] {
        &self.mean
    }

    /// Covariance.
    #[inline]
    pub fn covariance(&self) -> &Covariance {
        &self.covariance
    }

    /// Dimension of the distribution.
    #[inline]
    pub fn dim(&self) -> usize {
        self.mean.len()
    }

    /// Log of the probability density at `x`.
    pub fn log_density(&self, x: &[f64]) -> Result<f64> {
        self.check_dim(x)?;
        Ok(self.log_density_unchecked(x))
    }

    /// Probability density at `x`.
    ///
    /// Computed in the log domain and exponentiated last; in high dimension
    /// this underflows to 0, so prefer [`Gaussian::log_density`].
    pub fn density(&self, x: &[f64]) -> Result<f64> {
        self.log_density(x).map(f64::exp)
    }

    /// Draws one vector from the distribution.
    pub fn sample(&self, rng: &mut Random) -> Vec<f64> {
        let mut x = self.covariance.sample_offset(rng);
        for (v, m) in x.iter_mut().zip(&self.mean) {
            *v += m;
        }
        x
    }

    /// Log-density without the dimension check. `x.len()` must equal `dim()`.
    #[inline]
    pub(crate) fn log_density_unchecked(&self, x: &[f64]) -> f64 {
        let mahalanobis = match &self.covariance {
            // Hot path: avoid the temporary difference vector.
            Covariance::Diagonal(c) => x
                .iter()
                .zip(&self.mean)
                .zip(c.variances())
                .map(|((x, m), v)| (x - m) * (x - m) / v)
                .sum(),
            covariance => {
                let diff: Vec<f64> = x.iter().zip(&self.mean).map(|(x, m)| x - m).collect();
                covariance.mahalanobis(&diff)
            }
        };
        self.log_norm - 0.5 * mahalanobis
    }

    #[inline]
    fn check_dim(&self, x: &[f64]) -> Result<()> {
        if x.len() != self.dim() {
            return Err(GmmError::DimensionMismatch {
                expected: self.dim(),
                found: x.len(),
            });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_standard_normal_density() {
        let g = Gaussian::diagonal(vec![0.0], vec![1.0]).unwrap();
        let expected = 1.0 / (2.0 * PI).sqrt();
        assert!((g.density(&[0.0]).unwrap() - expected).abs() < 1e-12);
        assert!((g.log_density(&[1.0]).unwrap() - (expected.ln() - 0.5)).abs() < 1e-12);
    }

    #[test]
    fn test_dimension_mismatch() {
        let g = Gaussian::diagonal(vec![0.0, 0.0], vec![1.0, 1.0]).unwrap();
        assert!(matches!(
            g.log_density(&[0.0]),
            Err(GmmError::DimensionMismatch { expected: 2, found: 1 })
        ));
        assert!(g.density(&[0.0, 0.0, 0.0]).is_err());
        assert!(Gaussian::diagonal(vec![0.0], vec![1.0, 1.0]).is_err());
    }

    #[test]
    fn test_high_dimension_log_density_is_finite() {
        let dim = 2000;
        let g = Gaussian::diagonal(vec![0.0; dim], vec![0.01; dim]).unwrap();
        let x = vec![0.3; dim];

        // The density itself underflows, the log-density does not.
        assert_eq!(g.density(&x).unwrap(), 0.0);
        assert!(g.log_density(&x).unwrap().is_finite());
    }

    #[test]
    fn test_full_matches_diagonal() {
        let diag = Gaussian::diagonal(vec![1.0, -1.0], vec![0.5, 2.0]).unwrap();
        let full = Gaussian::full(vec![1.0, -1.0], vec![0.5, 0.0, 0.0, 2.0]).unwrap();
        let x = [0.2, 0.7];
        let a = diag.log_density(&x).unwrap();
        let b = full.log_density(&x).unwrap();
        assert!((a - b).abs() < 1e-12);
    }

    #[test]
    fn test_sample_statistics() {
        let g = Gaussian::diagonal(vec![2.0, -3.0], vec![0.25, 4.0]).unwrap();
        let mut rng = Random::seeded(42);
        let n = 20_000;
        let samples: Vec<Vec<f64>> = (0..n).map(|_| g.sample(&mut rng)).collect();

        for d in 0..2 {
            let mean = samples.iter().map(|s| s[d]).sum::<f64>() / n as f64;
            let var = samples.iter().map(|s| (s[d] - mean).powi(2)).sum::<f64>() / n as f64;
            assert!((mean - g.mean()[d]).abs() < 0.1);
            assert!((var / g.covariance().variances()[d] - 1.0).abs() < 0.1);
        }
    }
}
