//! Configuration for mixture models and the EM trainer.

use crate::error::{GmmError, Result};
use crate::gaussian::CovarianceType;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

/// Main configuration: the model shape plus the trainer that fits it.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Mixture shape.
    pub model: ModelConfig,

    /// EM trainer settings.
    pub trainer: TrainerConfig,
}

impl Config {
    /// Parses a configuration from JSON. Missing fields take their defaults.
    pub fn from_json_str(json: &str) -> Result<Self> {
        let config: Config = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// Loads a JSON configuration file.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let json = fs::read_to_string(path)?;
        Self::from_json_str(&json)
    }

    /// Checks every section for values the trainer cannot work with.
    pub fn validate(&self) -> Result<()> {
        self.model.validate()?;
        self.trainer.validate()
    }
}

/// Shape of the mixture, fixed at construction.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ModelConfig {
    /// Number of mixture components (K).
    /// Default: 3.
    pub n_components: usize,

    /// Covariance parameterization.
    /// Default: diagonal.
    pub covariance_type: CovarianceType,

    /// Expected sample dimension.
    /// Default: None (taken from the first dataset fitted).
    pub dim: Option<usize>,
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            n_components: 3,
            covariance_type: CovarianceType::Diagonal,
            dim: None,
        }
    }
}

impl ModelConfig {
    /// Rejects zero components or a zero dimension.
    pub fn validate(&self) -> Result<()> {
        if self.n_components == 0 {
            return Err(GmmError::Config("n_components must be at least 1".to_string()));
        }
        if self.dim == Some(0) {
            return Err(GmmError::Config("dim must be at least 1".to_string()));
        }
        Ok(())
    }
}

/// How the log-likelihood delta is compared against the threshold.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConvergenceMode {
    /// `LL(t) - LL(t-1) < threshold`.
    #[default]
    Absolute,
    /// `(LL(t) - LL(t-1)) / |LL(t-1)| < threshold`.
    Relative,
}

/// How the initial component means are drawn from the dataset.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Initialization {
    /// K distinct samples chosen uniformly.
    Random,
    /// D²-weighted seeding: each new mean is a sample drawn with probability
    /// proportional to its squared distance to the closest chosen mean.
    #[default]
    KMeansPlusPlus,
}

/// EM trainer configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TrainerConfig {
    /// Maximum number of M-steps per run.
    /// Default: 100.
    pub max_iterations: usize,

    /// Log-likelihood improvement below which a run has converged.
    /// Default: 1e-3.
    pub threshold: f64,

    /// Absolute or relative comparison against `threshold`.
    /// Default: absolute.
    pub convergence: ConvergenceMode,

    /// Number of E-step workers.
    /// Default: 1. 0 uses all available cores.
    pub concurrency: usize,

    /// Random seed for reproducibility.
    /// Default: None (random).
    pub seed: Option<u64>,

    /// Floor applied to every variance.
    /// Default: 1e-6.
    pub min_variance: f64,

    /// Responsibility mass under which a component counts as starved.
    /// Default: 1e-6.
    pub min_component_mass: f64,

    /// Tolerated log-likelihood decrease, relative to `max(1, |LL|)`.
    /// Default: 1e-6.
    pub regression_tolerance: f64,

    /// Samples per E-step shard.
    /// Default: 1024.
    pub shard_size: usize,

    /// Mean initialization strategy.
    /// Default: k-means++ seeding.
    pub init: Initialization,

    /// Number of independent initializations; the best run is kept.
    /// Default: 1.
    pub n_init: usize,

    /// Start from the current parameters when the model is already fitted.
    /// Default: false.
    pub warm_start: bool,
}

impl Default for TrainerConfig {
    fn default() -> Self {
        Self {
            max_iterations: 100,
            threshold: 1e-3,
            convergence: ConvergenceMode::Absolute,
            concurrency: 1,
            seed: None,
            min_variance: 1e-6,
            min_component_mass: 1e-6,
            regression_tolerance: 1e-6,
            shard_size: 1024,
            init: Initialization::KMeansPlusPlus,
            n_init: 1,
            warm_start: false,
        }
    }
}

impl TrainerConfig {
    /// Rejects settings that would make the trainer misbehave.
    pub fn validate(&self) -> Result<()> {
        if !(self.threshold >= 0.0) {
            return Err(GmmError::Config("threshold must be non-negative".to_string()));
        }
        if !(self.min_variance > 0.0) {
            return Err(GmmError::Config("min_variance must be positive".to_string()));
        }
        if !(self.min_component_mass >= 0.0) {
            return Err(GmmError::Config(
                "min_component_mass must be non-negative".to_string(),
            ));
        }
        if !(self.regression_tolerance >= 0.0) {
            return Err(GmmError::Config(
                "regression_tolerance must be non-negative".to_string(),
            ));
        }
        if self.shard_size == 0 {
            return Err(GmmError::Config("shard_size must be at least 1".to_string()));
        }
        if self.n_init == 0 {
            return Err(GmmError::Config("n_init must be at least 1".to_string()));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.model.n_components, 3);
        assert_eq!(config.model.covariance_type, CovarianceType::Diagonal);
        assert_eq!(config.trainer.max_iterations, 100);
        assert_eq!(config.trainer.concurrency, 1);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_partial_json() {
        let config = Config::from_json_str(
            r#"{"model": {"n_components": 5, "covariance_type": "full"},
                "trainer": {"seed": 7, "convergence": "relative", "init": "random"}}"#,
        )
        .unwrap();

        assert_eq!(config.model.n_components, 5);
        assert_eq!(config.model.covariance_type, CovarianceType::Full);
        assert_eq!(config.trainer.seed, Some(7));
        assert_eq!(config.trainer.convergence, ConvergenceMode::Relative);
        assert_eq!(config.trainer.init, Initialization::Random);
        assert_eq!(config.trainer.shard_size, 1024);
    }

    #[test]
    fn test_invalid_values() {
        let mut config = Config::default();
        config.model.n_components = 0;
        assert!(matches!(config.validate(), Err(GmmError::Config(_))));

        let mut trainer = TrainerConfig::default();
        trainer.min_variance = 0.0;
        assert!(trainer.validate().is_err());

        let mut trainer = TrainerConfig::default();
        trainer.threshold = f64::NAN;
        assert!(trainer.validate().is_err());
    }

    #[test]
    fn test_malformed_json() {
        assert!(matches!(
            Config::from_json_str("{not json"),
            Err(GmmError::Serialization(_))
        ));
    }
}
