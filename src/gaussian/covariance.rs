//! Covariance representations and their per-type update formulas.
//!
//! Everything that differs between diagonal and full covariances lives here:
//! the Mahalanobis term of the density, the sampling transform, the scatter
//! accumulated by the E-step and the M-step estimate built from it.

use crate::error::{GmmError, Result};
use crate::rng::Random;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Covariance parameterization, selected once per model.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CovarianceType {
    /// Per-dimension variances, dimensions independent.
    #[default]
    Diagonal,
    /// Dense symmetric positive-definite matrix.
    Full,
}

impl CovarianceType {
    /// Tag used in model dumps and on the command line.
    pub fn as_str(&self) -> &'static str {
        match self {
            CovarianceType::Diagonal => "diagonal",
            CovarianceType::Full => "full",
        }
    }

    /// Number of scatter values one component accumulates.
    #[inline]
    pub fn scatter_len(&self, dim: usize) -> usize {
        match self {
            CovarianceType::Diagonal => dim,
            CovarianceType::Full => dim * dim,
        }
    }

    /// Adds `r * diff²` (diagonal) or `r * diff·diffᵀ` (full) to `scatter`.
    #[inline]
    pub fn accumulate_scatter(&self, scatter: &mut [f64], diff: &[f64], r: f64) {
        match self {
            CovarianceType::Diagonal => {
                for (s, d) in scatter.iter_mut().zip(diff) {
                    *s += r * d * d;
                }
            }
            CovarianceType::Full => {
                let dim = diff.len();
                for i in 0..dim {
                    let ri = r * diff[i];
                    let row = &mut scatter[i * dim..(i + 1) * dim];
                    for (s, d) in row.iter_mut().zip(diff) {
                        *s += ri * d;
                    }
                }
            }
        }
    }

    /// M-step covariance estimate.
    ///
    /// `scatter` holds deviations about the previous mean; `shift` is
    /// `new_mean - previous_mean`, so the estimate is
    /// `scatter / count - shift·shiftᵀ`, floored at `min_variance`.
    ///
    /// This keeps the E-step to a single pass over the data. The subtraction
    /// cancels when `shift²` dwarfs the variance: the absolute error grows
    /// like `shift² · f64::EPSILON`, which is what the floor absorbs after a
    /// component jumps far (for example on the iteration after a reset).
    pub fn estimate(&self, scatter: &[f64], count: f64, shift: &[f64], min_variance: f64) -> Covariance {
        let dim = shift.len();
        match self {
            CovarianceType::Diagonal => {
                let variances = scatter
                    .iter()
                    .zip(shift)
                    .map(|(s, d)| s / count - d * d)
                    .collect();
                Covariance::Diagonal(DiagonalCovariance::floored(variances, min_variance))
            }
            CovarianceType::Full => {
                let mut matrix = vec![0.0; dim * dim];
                for i in 0..dim {
                    for j in 0..=i {
                        let upper = scatter[i * dim + j];
                        let lower = scatter[j * dim + i];
                        let c = 0.5 * (upper + lower) / count - shift[i] * shift[j];
                        matrix[i * dim + j] = c;
                        matrix[j * dim + i] = c;
                    }
                }
                Covariance::Full(FullCovariance::regularized(dim, matrix, min_variance))
            }
        }
    }
}

impl fmt::Display for CovarianceType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for CovarianceType {
    type Err = GmmError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "diagonal" | "diag" => Ok(CovarianceType::Diagonal),
            "full" => Ok(CovarianceType::Full),
            other => Err(GmmError::InvalidModel(format!("unknown covariance type '{}'", other))),
        }
    }
}

/// Covariance of one component.
#[derive(Debug, Clone, PartialEq)]
pub enum Covariance {
    /// Diagonal covariance.
    Diagonal(DiagonalCovariance),
    /// Full covariance.
    Full(FullCovariance),
}

impl Covariance {
    /// Builds a covariance of the given type with `variances` on the diagonal.
    pub fn from_variances(covariance_type: CovarianceType, variances: &[f64], min_variance: f64) -> Self {
        match covariance_type {
            CovarianceType::Diagonal => {
                Covariance::Diagonal(DiagonalCovariance::floored(variances.to_vec(), min_variance))
            }
            CovarianceType::Full => {
                let dim = variances.len();
                let mut matrix = vec![0.0; dim * dim];
                for (i, v) in variances.iter().enumerate() {
                    matrix[i * dim + i] = v.max(min_variance);
                }
                Covariance::Full(FullCovariance::regularized(dim, matrix, 0.0))
            }
        }
    }

    /// Rebuilds a covariance from the values written by [`Covariance::values`].
    pub fn from_values(covariance_type: CovarianceType, dim: usize, values: Vec<f64>) -> Result<Self> {
        match covariance_type {
            CovarianceType::Diagonal => {
                if values.len() != dim {
                    return Err(GmmError::DimensionMismatch { expected: dim, found: values.len() });
                }
                Ok(Covariance::Diagonal(DiagonalCovariance::new(values)?))
            }
            CovarianceType::Full => {
                if values.len() != dim * dim {
                    return Err(GmmError::DimensionMismatch {
                        expected: dim * dim,
                        found: values.len(),
                    });
                }
                Ok(Covariance::Full(FullCovariance::new(dim, values)?))
            }
        }
    }

    /// Parameterization tag.
    pub fn covariance_type(&self) -> CovarianceType {
        match self {
            Covariance::Diagonal(_) => CovarianceType::Diagonal,
            Covariance::Full(_) => CovarianceType::Full,
        }
    }

    /// Dimension of the distribution.
    pub fn dim(&self) -> usize {
        match self {
            Covariance::Diagonal(c) => c.variances.len(),
            Covariance::Full(c) => c.dim,
        }
    }

    /// Natural log of the determinant.
    pub fn log_det(&self) -> f64 {
        match self {
            Covariance::Diagonal(c) => c.log_det,
            Covariance::Full(c) => c.log_det,
        }
    }

    /// Variances (diagonal) or the row-major matrix (full).
    pub fn values(&self) -> &[f64] {
        match self {
            Covariance::Diagonal(c) => &c.variances,
            Covariance::Full(c) => &c.matrix,
        }
    }

    /// Diagonal of the covariance matrix.
    pub fn variances(&self) -> Vec<f64> {
        match self {
            Covariance::Diagonal(c) => c.variances.clone(),
            Covariance::Full(c) => (0..c.dim).map(|i| c.matrix[i * c.dim + i]).collect(),
        }
    }

    /// Squared Mahalanobis norm of `diff = x - mean`.
    #[inline]
    pub fn mahalanobis(&self, diff: &[f64]) -> f64 {
        match self {
            Covariance::Diagonal(c) => c.mahalanobis(diff),
            Covariance::Full(c) => c.mahalanobis(diff),
        }
    }

    /// Zero-mean draw with this covariance.
    pub fn sample_offset(&self, rng: &mut Random) -> Vec<f64> {
        match self {
            Covariance::Diagonal(c) => c
                .variances
                .iter()
                .map(|v| rng.standard_normal() * v.sqrt())
                .collect(),
            Covariance::Full(c) => {
                let z: Vec<f64> = (0..c.dim).map(|_| rng.standard_normal()).collect();
                c.transform(&z)
            }
        }
    }
}

/// Diagonal covariance with a cached log-determinant.
#[derive(Debug, Clone, PartialEq)]
pub struct DiagonalCovariance {
    variances: Vec<f64>,
    log_det: f64,
}

impl DiagonalCovariance {
    /// Fails unless every variance is finite and strictly positive.
    pub fn new(variances: Vec<f64>) -> Result<Self> {
        if let Some(v) = variances.iter().find(|v| !(v.is_finite() && **v > 0.0)) {
            return Err(GmmError::InvalidModel(format!("variance {} is not positive", v)));
        }
        Ok(Self::build(variances))
    }

    /// Clamps every variance to at least `floor`.
    ///
    /// NaN variances are replaced by the floor as well.
    pub fn floored(mut variances: Vec<f64>, floor: f64) -> Self {
        for v in &mut variances {
            if !(*v >= floor) {
                *v = floor;
            }
        }
        Self::build(variances)
    }

    fn build(variances: Vec<f64>) -> Self {
        let log_det = variances.iter().map(|v| v.ln()).sum();
        Self { variances, log_det }
    }

    /// Per-dimension variances.
    pub fn variances(&self) -> &[f64] {
        &self.variances
    }

    #[inline]
    fn mahalanobis(&self, diff: &[f64]) -> f64 {
        diff.iter().zip(&self.variances).map(|(d, v)| d * d / v).sum()
    }
}

/// Full covariance with a cached lower Cholesky factor.
#[derive(Debug, Clone, PartialEq)]
pub struct FullCovariance {
    dim: usize,
    matrix: Vec<f64>,
    cholesky: Vec<f64>,
    log_det: f64,
}

impl FullCovariance {
    /// Fails unless `matrix` (row-major, `dim × dim`) is positive definite.
    pub fn new(dim: usize, matrix: Vec<f64>) -> Result<Self> {
        let cholesky = cholesky(&matrix, dim)
            .ok_or_else(|| GmmError::InvalidModel("covariance is not positive definite".to_string()))?;
        Ok(Self::build(dim, matrix, cholesky))
    }

    /// Adds `reg` to the diagonal (after clamping it at zero) and factorizes.
    ///
    /// A matrix that still is not positive definite is replaced by its
    /// diagonal, floored at `reg` (or at `f64::MIN_POSITIVE` when `reg` is 0).
    pub fn regularized(dim: usize, mut matrix: Vec<f64>, reg: f64) -> Self {
        for i in 0..dim {
            let c = &mut matrix[i * dim + i];
            *c = c.max(0.0) + reg;
        }

        if let Some(l) = cholesky(&matrix, dim) {
            return Self::build(dim, matrix, l);
        }

        let floor = reg.max(f64::MIN_POSITIVE);
        let mut diagonal = vec![0.0; dim * dim];
        for i in 0..dim {
            diagonal[i * dim + i] = matrix[i * dim + i].max(floor);
        }
        let l = (0..dim * dim)
            .map(|idx| if idx % (dim + 1) == 0 { diagonal[idx].sqrt() } else { 0.0 })
            .collect();
        Self::build(dim, diagonal, l)
    }

    fn build(dim: usize, matrix: Vec<f64>, cholesky: Vec<f64>) -> Self {
        let log_det = 2.0 * (0..dim).map(|i| cholesky[i * dim + i].ln()).sum::<f64>();
        Self { dim, matrix, cholesky, log_det }
    }

    /// Row-major covariance matrix.
    pub fn matrix(&self) -> &[f64] {
        &self.matrix
    }

    /// Solves `L y = diff` and returns `|y|²`.
    fn mahalanobis(&self, diff: &[f64]) -> f64 {
        let n = self.dim;
        let mut y = vec![0.0; n];
        let mut total = 0.0;
        for i in 0..n {
            let row = &self.cholesky[i * n..i * n + i];
            let partial: f64 = row.iter().zip(&y).map(|(l, y)| l * y).sum();
            y[i] = (diff[i] - partial) / self.cholesky[i * n + i];
            total += y[i] * y[i];
        }
        total
    }

    /// Returns `L z`.
    fn transform(&self, z: &[f64]) -> Vec<f64> {
        let n = self.dim;
        (0..n)
            .map(|i| {
                self.cholesky[i * n..=i * n + i]
                    .iter()
                    .zip(z)
                    .map(|(l, z)| l * z)
                    .sum()
            })
            .collect()
    }
}

/// Lower Cholesky factor of a row-major symmetric matrix.
fn cholesky(matrix: &[f64], dim: usize) -> Option<Vec<f64>> {
    let mut l = vec![0.0; dim * dim];
    for i in 0..dim {
        for j in 0..=i {
            let mut sum = matrix[i * dim + j];
            for k in 0..j {
                sum -= l[i * dim + k] * l[j * dim + k];
            }
            if i == j {
                if !(sum > 0.0) || !sum.is_finite() {
                    return None;
                }
                l[i * dim + i] = sum.sqrt();
            } else {
                l[i * dim + j] = sum / l[j * dim + j];
            }
        }
    }
    Some(l)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_estimate_after_large_mean_shift() {
        let points = [999.0, 1000.0, 1001.0, 1000.5, 999.5];
        let old_mean = 0.0;
        let count = points.len() as f64;
        let new_mean = points.iter().sum::<f64>() / count;

        let mut scatter = vec![0.0; 1];
        for p in points {
            CovarianceType::Diagonal.accumulate_scatter(&mut scatter, &[p - old_mean], 1.0);
        }
        let estimate = CovarianceType::Diagonal.estimate(&scatter, count, &[new_mean - old_mean], 1e-6);

        let exact = points.iter().map(|p| (p - new_mean).powi(2)).sum::<f64>() / count;
        let error = (estimate.variances()[0] - exact).abs();
        assert!(error < 1e6 * f64::EPSILON * 8.0, "error {}", error);
        assert!((estimate.variances()[0] - 0.5).abs() < 1e-8);
    }

    #[test]
    fn test_type_parsing() {
        assert_eq!("diagonal".parse::<CovarianceType>().unwrap(), CovarianceType::Diagonal);
        assert_eq!("FULL".parse::<CovarianceType>().unwrap(), CovarianceType::Full);
        assert!("tied".parse::<CovarianceType>().is_err());
        assert_eq!(CovarianceType::Full.to_string(), "full");
    }

    #[test]
    fn test_diagonal_floor() {
        let c = DiagonalCovariance::floored(vec![0.5, 0.0, -1.0, f64::NAN], 1e-3);
        assert_eq!(c.variances(), &[0.5, 1e-3, 1e-3, 1e-3]);
        assert!(DiagonalCovariance::new(vec![1.0, 0.0]).is_err());
    }

    #[test]
    fn test_cholesky_log_det() {
        // [[4, 2], [2, 3]] has determinant 8.
        let c = FullCovariance::new(2, vec![4.0, 2.0, 2.0, 3.0]).unwrap();
        assert!((c.log_det - 8f64.ln()).abs() < 1e-12);
        assert!(FullCovariance::new(2, vec![1.0, 2.0, 2.0, 1.0]).is_err());
    }

    #[test]
    fn test_full_matches_diagonal() {
        let variances = [0.5, 2.0, 0.1];
        let diag = Covariance::from_variances(CovarianceType::Diagonal, &variances, 1e-9);
        let full = Covariance::from_variances(CovarianceType::Full, &variances, 1e-9);
        let diff = [0.3, -1.0, 0.2];

        assert!((diag.mahalanobis(&diff) - full.mahalanobis(&diff)).abs() < 1e-12);
        assert!((diag.log_det() - full.log_det()).abs() < 1e-12);
        assert_eq!(full.variances(), variances.to_vec());
    }

    #[test]
    fn test_diagonal_estimate_with_shift() {
        // Samples 1 and 3 around a previous mean of 0: scatter = 1 + 9 = 10,
        // new mean 2, so variance = 10 / 2 - 4 = 1.
        let ty = CovarianceType::Diagonal;
        let mut scatter = vec![0.0];
        ty.accumulate_scatter(&mut scatter, &[1.0], 1.0);
        ty.accumulate_scatter(&mut scatter, &[3.0], 1.0);
        let cov = ty.estimate(&scatter, 2.0, &[2.0], 1e-6);
        assert!((cov.values()[0] - 1.0).abs() < 1e-12);
    }

    #[test]
    fn test_full_estimate() {
        let ty = CovarianceType::Full;
        let mut scatter = vec![0.0; 4];
        for diff in [[1.0, 1.0], [-1.0, -1.0], [1.0, -1.0], [-1.0, 1.0]] {
            ty.accumulate_scatter(&mut scatter, &diff, 1.0);
        }
        let cov = ty.estimate(&scatter, 4.0, &[0.0, 0.0], 0.0);
        assert_eq!(cov.covariance_type(), CovarianceType::Full);
        assert!((cov.values()[0] - 1.0).abs() < 1e-12);
        assert!(cov.values()[1].abs() < 1e-12);
    }

    #[test]
    fn test_singular_full_falls_back_to_diagonal() {
        // Perfectly correlated samples give a rank-one scatter.
        let ty = CovarianceType::Full;
        let mut scatter = vec![0.0; 4];
        ty.accumulate_scatter(&mut scatter, &[1.0, 1.0], 1.0);
        ty.accumulate_scatter(&mut scatter, &[-1.0, -1.0], 1.0);
        let cov = ty.estimate(&scatter, 2.0, &[0.0, 0.0], 0.0);
        assert!(cov.log_det().is_finite());
        assert_eq!(cov.values()[1], 0.0);
    }

    #[test]
    fn test_sample_offset_dimension() {
        let mut rng = Random::seeded(5);
        let full = Covariance::Full(FullCovariance::new(2, vec![1.0, 0.5, 0.5, 1.0]).unwrap());
        assert_eq!(full.sample_offset(&mut rng).len(), 2);
    }
}
