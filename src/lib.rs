//! # gmm - Gaussian Mixture Models
//!
//! Fits a Gaussian Mixture Model to a dense dataset of real-valued vectors
//! with Expectation-Maximization. The E-step, which dominates the cost, is
//! split into fixed-size shards and run on a reusable pool of workers; the
//! partial statistics are merged in shard order, so results do not depend on
//! the number of workers.
//!
//! ## Key Features
//!
//! - **Diagonal and full covariances**, evaluated in the log domain
//! - **Concurrent E-step** on a fixed rayon thread pool
//! - **Degenerate component recovery** and variance flooring
//! - **k-means++ seeding**, restarts and warm starts
//! - **Text dump and binary snapshot** persistence
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use gmm::{Config, Gmm};
//!
//! let mut config = Config::default();
//! config.model.n_components = 3;
//! config.trainer.concurrency = 4;
//! config.trainer.seed = Some(42);
//!
//! let mut model = Gmm::from_config(&config)?;
//! model.fit(&data)?;
//!
//! println!("log-likelihood: {:?}", model.final_log_likelihood());
//! model.dump(&mut std::io::stdout())?;
//! ```
//!
//! ## Architecture
//!
//! - [`gaussian`] - Multivariate normal densities and covariance types
//! - [`gmm`] - Mixture parameters and the public fit/evaluate contract
//! - [`trainer`] - EM trainer and its lifecycle
//! - [`stats`] - Sufficient statistics produced by the E-step
//! - [`pool`] - Sharded map-reduce executors
//! - [`storage`] - Model dump and snapshot formats
//! - [`dataset`] - Dataset files and sparse conversion
//! - [`synth`] - Synthetic datasets

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod config;
pub mod dataset;
pub mod error;
pub mod gaussian;
pub mod gmm;
pub mod pool;
pub mod rng;
pub mod stats;
pub mod storage;
pub mod synth;
pub mod trainer;

// Re-export commonly used types
pub use config::{Config, ConvergenceMode, Initialization, ModelConfig, TrainerConfig};
pub use error::{GmmError, Result};
pub use gaussian::{Covariance, CovarianceType, Gaussian};
pub use gmm::{Component, Gmm, Mixture};
pub use pool::{MapReduce, Sequential, WorkerPool};
pub use rng::Random;
pub use stats::SufficientStats;
pub use trainer::{EmTrainer, FitReport, Trainer, TrainerState};

/// Library version.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
