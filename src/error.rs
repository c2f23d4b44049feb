//! Error types for mixture fitting and evaluation.

use thiserror::Error;

/// The main error type for GMM operations.
#[derive(Error, Debug)]
pub enum GmmError {
    /// An input vector does not have the dimension the model expects.
    #[error("Dimension mismatch: expected {expected}, found {found}")]
    DimensionMismatch {
        /// Dimension the model (or the first sample) established.
        expected: usize,
        /// Dimension of the offending vector.
        found: usize,
    },

    /// A sample contains NaN or an infinity.
    #[error("Non-finite value in sample {sample} at index {index}")]
    NonFiniteValue {
        /// Position of the sample in the dataset.
        sample: usize,
        /// Position of the value in the sample.
        index: usize,
    },

    /// The dataset contains no samples.
    #[error("Empty dataset")]
    EmptyDataset,

    /// A component lost (almost) all responsibility mass and was reinitialized.
    ///
    /// Recovered inside the trainer; only ever logged.
    #[error("Component {component} collapsed at iteration {iteration}, reinitialized")]
    DegenerateComponent {
        /// Index of the starved component.
        component: usize,
        /// Iteration at which the collapse was detected.
        iteration: usize,
    },

    /// The log-likelihood went down between two EM iterations.
    #[error("Log-likelihood decreased at iteration {iteration}: {previous} -> {current}")]
    LikelihoodRegression {
        /// Iteration that produced the regression.
        iteration: usize,
        /// Log-likelihood before the iteration.
        previous: f64,
        /// Log-likelihood after the iteration.
        current: f64,
    },

    /// Fewer samples than mixture components.
    #[error("Cannot fit {components} components to {samples} samples")]
    TooFewSamples {
        /// Number of samples in the dataset.
        samples: usize,
        /// Requested number of components.
        components: usize,
    },

    /// The model has no parameters yet.
    #[error("Model has not been fitted")]
    NotFitted,

    /// `fit` was called on a model with no trainer bound.
    #[error("No trainer bound to the model")]
    NoTrainer,

    /// Invalid configuration.
    #[error("Configuration error: {0}")]
    Config(String),

    /// The worker pool could not be created.
    #[error("Worker pool error: {0}")]
    WorkerPool(String),

    /// A model dump could not be parsed or describes an invalid model.
    #[error("Invalid model: {0}")]
    InvalidModel(String),

    /// A dataset line could not be parsed.
    #[error("Parse error at line {line}: {message}")]
    Parse {
        /// 1-based line number.
        line: usize,
        /// What went wrong.
        message: String,
    },

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization/deserialization error.
    #[error("Serialization error: {0}")]
    Serialization(String),
}

/// Result type alias for GMM operations.
pub type Result<T> = std::result::Result<T, GmmError>;

impl From<bincode::Error> for GmmError {
    fn from(err: bincode::Error) -> Self {
        GmmError::Serialization(err.to_string())
    }
}

impl From<serde_json::Error> for GmmError {
    fn from(err: serde_json::Error) -> Self {
        GmmError::Serialization(err.to_string())
    }
}
