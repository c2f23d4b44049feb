//! Gaussian Mixture Model: weighted components and the public fit/evaluate contract.

use crate::config::Config;
use crate::error::{GmmError, Result};
use crate::gaussian::{CovarianceType, Gaussian};
use crate::storage;
use crate::trainer::{EmTrainer, FitReport, Trainer};
use std::io::{BufRead, Write};
use std::path::Path;

/// Tolerance on `Σ weight = 1` when building a mixture from parts.
const WEIGHT_SUM_TOLERANCE: f64 = 1e-6;

/// One weighted Gaussian of a mixture.
#[derive(Debug, Clone, PartialEq)]
pub struct Component {
    /// Mixture weight, in `(0, 1]`.
    pub weight: f64,
    /// The component distribution.
    pub gaussian: Gaussian,
}

impl Component {
    /// Creates a component.
    pub fn new(weight: f64, gaussian: Gaussian) -> Self {
        Self { weight, gaussian }
    }
}

/// The parameters of a mixture: K components and their covariance type.
///
/// This is the state a [`Trainer`] mutates. `components` is empty until the
/// first fit.
#[derive(Debug, Clone, PartialEq)]
pub struct Mixture {
    n_components: usize,
    covariance_type: CovarianceType,
    dim: Option<usize>,
    components: Vec<Component>,
}

impl Mixture {
    /// Unfitted mixture of `n_components` components.
    pub fn new(n_components: usize, covariance_type: CovarianceType) -> Self {
        Self {
            n_components,
            covariance_type,
            dim: None,
            components: Vec::new(),
        }
    }

    /// Fixes the expected sample dimension up front.
    pub fn with_dim(mut self, dim: usize) -> Self {
        self.dim = Some(dim);
        self
    }

    /// Builds a fitted mixture from explicit components.
    ///
    /// Components must share the covariance type and dimension; weights must
    /// be positive and sum to one.
    pub fn from_components(covariance_type: CovarianceType, components: Vec<Component>) -> Result<Self> {
        let first = components
            .first()
            .ok_or_else(|| GmmError::InvalidModel("mixture has no components".to_string()))?;
        let dim = first.gaussian.dim();

        for c in &components {
            if c.gaussian.dim() != dim {
                return Err(GmmError::DimensionMismatch { expected: dim, found: c.gaussian.dim() });
            }
            if c.gaussian.covariance().covariance_type() != covariance_type {
                return Err(GmmError::InvalidModel(format!(
                    "component covariance is {}, mixture is {}",
                    c.gaussian.covariance().covariance_type(),
                    covariance_type
                )));
            }
            if !(c.weight > 0.0 && c.weight <= 1.0) {
                return Err(GmmError::InvalidModel(format!("weight {} outside (0, 1]", c.weight)));
            }
        }

        let total: f64 = components.iter().map(|c| c.weight).sum();
        if (total - 1.0).abs() > WEIGHT_SUM_TOLERANCE {
            return Err(GmmError::InvalidModel(format!("weights sum to {}", total)));
        }

        Ok(Self {
            n_components: components.len(),
            covariance_type,
            dim: Some(dim),
            components,
        })
    }

    /// Number of components (K).
    #[inline]
    pub fn n_components(&self) -> usize {
        self.n_components
    }

    /// Covariance parameterization.
    #[inline]
    pub fn covariance_type(&self) -> CovarianceType {
        self.covariance_type
    }

    /// Expected sample dimension, once known.
    #[inline]
    pub fn dim(&self) -> Option<usize> {
        self.dim
    }

    /// The components, empty before the first fit.
    #[inline]
    pub fn components(&self) -> &[Component] {
        &self.components
    }

    /// True once the mixture holds K components.
    #[inline]
    pub fn is_fitted(&self) -> bool {
        !self.components.is_empty()
    }

    /// Mixture weights in component order.
    pub fn weights(&self) -> Vec<f64> {
        self.components.iter().map(|c| c.weight).collect()
    }

    /// Replaces the parameters. Used by trainers.
    pub fn set_components(&mut self, components: Vec<Component>) {
        debug_assert_eq!(components.len(), self.n_components);
        if let Some(first) = components.first() {
            self.dim = Some(first.gaussian.dim());
        }
        self.components = components;
    }

    /// Validates a dataset against the expected dimension and returns it.
    ///
    /// The expected dimension is the configured/fitted one, or the length of
    /// the first sample for a fresh mixture.
    pub fn check_dataset(&self, data: &[Vec<f64>]) -> Result<usize> {
        let first = data.first().ok_or(GmmError::EmptyDataset)?;
        let expected = self.dim.unwrap_or(first.len());
        if expected == 0 {
            return Err(GmmError::DimensionMismatch { expected: 1, found: 0 });
        }

        for (i, x) in data.iter().enumerate() {
            if x.len() != expected {
                return Err(GmmError::DimensionMismatch { expected, found: x.len() });
            }
            if let Some(index) = x.iter().position(|v| !v.is_finite()) {
                return Err(GmmError::NonFiniteValue { sample: i, index });
            }
        }

        Ok(expected)
    }

    /// Writes `ln w_k + ln N_k(x)` into `out` and returns `ln p(x)`.
    ///
    /// `x` must have the mixture's dimension.
    pub(crate) fn weighted_log_densities(&self, x: &[f64], out: &mut [f64]) -> f64 {
        for (slot, c) in out.iter_mut().zip(&self.components) {
            *slot = c.weight.ln() + c.gaussian.log_density_unchecked(x);
        }
        log_sum_exp(out)
    }

    /// `ln p(x)` for one sample.
    pub fn log_prob(&self, x: &[f64]) -> Result<f64> {
        self.check_sample(x)?;
        let mut buf = vec![0.0; self.n_components];
        Ok(self.weighted_log_densities(x, &mut buf))
    }

    /// `Σ_x ln Σ_k w_k N_k(x)` over a dataset.
    pub fn log_likelihood(&self, data: &[Vec<f64>]) -> Result<f64> {
        if !self.is_fitted() {
            return Err(GmmError::NotFitted);
        }
        let mut buf = vec![0.0; self.n_components];
        let mut total = 0.0;
        for x in data {
            self.check_sample(x)?;
            total += self.weighted_log_densities(x, &mut buf);
        }
        Ok(total)
    }

    /// Posterior `P(component = k | x)` for every k.
    pub fn responsibilities(&self, x: &[f64]) -> Result<Vec<f64>> {
        self.check_sample(x)?;
        let mut log_probs = vec![0.0; self.n_components];
        let log_px = self.weighted_log_densities(x, &mut log_probs);
        Ok(log_probs.into_iter().map(|lp| (lp - log_px).exp()).collect())
    }

    /// Index of the most responsible component.
    pub fn predict(&self, x: &[f64]) -> Result<usize> {
        self.check_sample(x)?;
        let mut log_probs = vec![0.0; self.n_components];
        self.weighted_log_densities(x, &mut log_probs);
        Ok(log_probs
            .iter()
            .enumerate()
            .max_by(|(_, a), (_, b)| a.total_cmp(b))
            .map(|(i, _)| i)
            .unwrap_or(0))
    }

    fn check_sample(&self, x: &[f64]) -> Result<()> {
        match self.dim {
            _ if !self.is_fitted() => Err(GmmError::NotFitted),
            Some(expected) if expected != x.len() => {
                Err(GmmError::DimensionMismatch { expected, found: x.len() })
            }
            _ => Ok(()),
        }
    }
}

/// Numerically stable `ln Σ exp(v)`.
pub(crate) fn log_sum_exp(values: &[f64]) -> f64 {
    let max = values.iter().copied().fold(f64::NEG_INFINITY, f64::max);
    if !max.is_finite() {
        return max;
    }
    max + values.iter().map(|v| (v - max).exp()).sum::<f64>().ln()
}

/// A Gaussian Mixture Model bound to the trainer that fits it.
#[derive(Debug)]
pub struct Gmm {
    mixture: Mixture,
    trainer: Option<Box<dyn Trainer>>,
    report: Option<FitReport>,
    log_likelihood: Option<f64>,
}

impl Gmm {
    /// Unfitted model with no trainer bound.
    pub fn new(n_components: usize, covariance_type: CovarianceType) -> Self {
        Self::from_mixture(Mixture::new(n_components, covariance_type))
    }

    /// Unfitted model bound to `trainer`.
    pub fn with_trainer<T: Trainer + 'static>(
        n_components: usize,
        covariance_type: CovarianceType,
        trainer: T,
    ) -> Self {
        let mut gmm = Self::new(n_components, covariance_type);
        gmm.bind_trainer(trainer);
        gmm
    }

    /// Model and EM trainer built from a configuration.
    pub fn from_config(config: &Config) -> Result<Self> {
        config.validate()?;
        let mut mixture = Mixture::new(config.model.n_components, config.model.covariance_type);
        if let Some(dim) = config.model.dim {
            mixture = mixture.with_dim(dim);
        }
        let trainer = EmTrainer::new(config.trainer.clone())?;

        let mut gmm = Self::from_mixture(mixture);
        gmm.bind_trainer(trainer);
        Ok(gmm)
    }

    /// Wraps existing parameters, with no trainer bound.
    pub fn from_mixture(mixture: Mixture) -> Self {
        Self {
            mixture,
            trainer: None,
            report: None,
            log_likelihood: None,
        }
    }

    /// Binds (or replaces) the trainer used by [`Gmm::fit`].
    pub fn bind_trainer<T: Trainer + 'static>(&mut self, trainer: T) {
        self.trainer = Some(Box::new(trainer));
    }

    /// Fits the model to `data`, blocking until the trainer reaches a
    /// terminal state.
    ///
    /// The dataset is validated before anything is touched, so a
    /// `DimensionMismatch` or `EmptyDataset` leaves the parameters as they
    /// were. A `LikelihoodRegression` leaves the last valid parameters; the
    /// report is cleared but [`Gmm::final_log_likelihood`] is recomputed for
    /// the restored parameters.
    pub fn fit(&mut self, data: &[Vec<f64>]) -> Result<()> {
        let trainer = self.trainer.as_ref().ok_or(GmmError::NoTrainer)?;
        self.mixture.check_dataset(data)?;

        match trainer.train(&mut self.mixture, data) {
            Ok(report) => {
                self.log_likelihood = Some(report.log_likelihood);
                self.report = Some(report);
                Ok(())
            }
            Err(err) => {
                self.report = None;
                self.log_likelihood = if self.mixture.is_fitted() {
                    self.mixture.log_likelihood(data).ok()
                } else {
                    None
                };
                Err(err)
            }
        }
    }

    /// Log-likelihood of the current parameters on the last dataset fitted.
    ///
    /// After a failed fit this is the value for the restored parameters.
    pub fn final_log_likelihood(&self) -> Option<f64> {
        self.log_likelihood
    }

    /// Summary of the last successful fit.
    pub fn report(&self) -> Option<&FitReport> {
        self.report.as_ref()
    }

    /// `Σ_x ln p(x)` over a dataset.
    pub fn log_likelihood(&self, data: &[Vec<f64>]) -> Result<f64> {
        self.mixture.log_likelihood(data)
    }

    /// `ln p(x)` for a single sample.
    pub fn log_prob(&self, x: &[f64]) -> Result<f64> {
        self.mixture.log_prob(x)
    }

    /// Posterior component probabilities for a single sample.
    pub fn responsibilities(&self, x: &[f64]) -> Result<Vec<f64>> {
        self.mixture.responsibilities(x)
    }

    /// Most responsible component for a single sample.
    pub fn predict(&self, x: &[f64]) -> Result<usize> {
        self.mixture.predict(x)
    }

    /// Writes the text model dump to `sink`.
    pub fn dump<W: Write>(&self, sink: &mut W) -> Result<()> {
        storage::write_model(&self.mixture, sink)
    }

    /// Reads a model written by [`Gmm::dump`]. No trainer is bound.
    pub fn load_dump<R: BufRead>(reader: R) -> Result<Self> {
        storage::read_model(reader).map(Self::from_mixture)
    }

    /// Saves a binary snapshot.
    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        storage::save_snapshot(&self.mixture, path)
    }

    /// Loads a binary snapshot. No trainer is bound.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        storage::load_snapshot(path).map(Self::from_mixture)
    }

    /// The model parameters.
    pub fn mixture(&self) -> &Mixture {
        &self.mixture
    }

    /// The components, empty before the first fit.
    pub fn components(&self) -> &[Component] {
        self.mixture.components()
    }

    /// Mixture weights in component order.
    pub fn weights(&self) -> Vec<f64> {
        self.mixture.weights()
    }

    /// Number of components.
    pub fn n_components(&self) -> usize {
        self.mixture.n_components()
    }

    /// Covariance parameterization.
    pub fn covariance_type(&self) -> CovarianceType {
        self.mixture.covariance_type()
    }

    /// Expected sample dimension, once known.
    pub fn dim(&self) -> Option<usize> {
        self.mixture.dim()
    }

    /// True once the model has parameters.
    pub fn is_fitted(&self) -> bool {
        self.mixture.is_fitted()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn mixture() -> Mixture {
        Mixture::from_components(
            CovarianceType::Diagonal,
            vec![
                Component::new(0.25, Gaussian::diagonal(vec![0.0], vec![1.0]).unwrap()),
                Component::new(0.75, Gaussian::diagonal(vec![10.0], vec![1.0]).unwrap()),
            ],
        )
        .unwrap()
    }

    #[test]
    fn test_log_sum_exp() {
        let v = [1000.0, 1000.0];
        assert!((log_sum_exp(&v) - (1000.0 + 2f64.ln())).abs() < 1e-9);
        assert_eq!(log_sum_exp(&[f64::NEG_INFINITY, f64::NEG_INFINITY]), f64::NEG_INFINITY);
    }

    #[test]
    fn test_responsibilities_normalized() {
        let m = mixture();
        for x in [-3.0, 0.0, 5.0, 9.0, 40.0] {
            let r = m.responsibilities(&[x]).unwrap();
            assert!((r.iter().sum::<f64>() - 1.0).abs() < 1e-12);
        }
        assert_eq!(m.predict(&[0.5]).unwrap(), 0);
        assert_eq!(m.predict(&[9.0]).unwrap(), 1);
        // Far outside both components the densities underflow, the
        // responsibilities do not.
        let r = m.responsibilities(&[-500.0]).unwrap();
        assert!(r[0] > 0.99);
    }

    #[test]
    fn test_log_likelihood_matches_densities() {
        let m = mixture();
        let x = 3.0;
        let expected = (0.25 * m.components()[0].gaussian.density(&[x]).unwrap()
            + 0.75 * m.components()[1].gaussian.density(&[x]).unwrap())
        .ln();
        assert!((m.log_likelihood(&[vec![x]]).unwrap() - expected).abs() < 1e-9);
        assert!((m.log_prob(&[x]).unwrap() - expected).abs() < 1e-9);
    }

    #[test]
    fn test_from_components_validation() {
        let g = Gaussian::diagonal(vec![0.0], vec![1.0]).unwrap();
        assert!(Mixture::from_components(CovarianceType::Diagonal, vec![]).is_err());
        assert!(Mixture::from_components(
            CovarianceType::Diagonal,
            vec![Component::new(0.5, g.clone()), Component::new(0.4, g.clone())],
        )
        .is_err());
        assert!(Mixture::from_components(CovarianceType::Full, vec![Component::new(1.0, g)]).is_err());
    }

    #[test]
    fn test_check_dataset() {
        let fresh = Mixture::new(2, CovarianceType::Diagonal);
        assert!(matches!(fresh.check_dataset(&[]), Err(GmmError::EmptyDataset)));
        assert_eq!(fresh.check_dataset(&[vec![1.0, 2.0], vec![3.0, 4.0]]).unwrap(), 2);
        assert!(matches!(
            fresh.check_dataset(&[vec![1.0, 2.0], vec![3.0]]),
            Err(GmmError::DimensionMismatch { expected: 2, found: 1 })
        ));
        assert!(matches!(
            fresh.check_dataset(&[vec![1.0, f64::NAN]]),
            Err(GmmError::NonFiniteValue { sample: 0, index: 1 })
        ));

        let configured = Mixture::new(2, CovarianceType::Diagonal).with_dim(3);
        assert!(configured.check_dataset(&[vec![1.0, 2.0]]).is_err());
    }

    #[test]
    fn test_unfitted_model() {
        let gmm = Gmm::new(2, CovarianceType::Diagonal);
        assert!(!gmm.is_fitted());
        assert!(matches!(gmm.log_likelihood(&[vec![0.0]]), Err(GmmError::NotFitted)));
        assert!(matches!(gmm.responsibilities(&[0.0]), Err(GmmError::NotFitted)));
    }

    #[test]
    fn test_fit_without_trainer() {
        let mut gmm = Gmm::new(1, CovarianceType::Diagonal);
        assert!(matches!(gmm.fit(&[vec![0.0]]), Err(GmmError::NoTrainer)));
    }

    #[test]
    fn test_sample_dimension_checked() {
        let m = mixture();
        assert!(matches!(
            m.responsibilities(&[0.0, 1.0]),
            Err(GmmError::DimensionMismatch { expected: 1, found: 2 })
        ));
    }
}
