//! Error type shared by every stage of the tuning job.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum TunerError {
    #[error("invalid bounds for dimension {dim}: low={low} high={high}")]
    InvalidBounds { dim: usize, low: f64, high: f64 },
    #[error("dimension mismatch: expected {expected}, got {actual}")]
    DimensionMismatch { expected: usize, actual: usize },
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
    #[error("invalid hyperparameter {name}={value}: {reason}")]
    InvalidHyperparameter { name: String, value: f64, reason: String },
    #[error("invalid dataset: {0}")]
    InvalidDataset(String),
    #[error("fitness evaluation failed at {position:?}: {reason}")]
    Evaluation { position: Vec<f64>, reason: String },
    #[error("metric undefined: {0}")]
    UndefinedMetric(String),
    #[error(transparent)]
    Io(#[from] std::io::Error),
    #[error(transparent)]
    Json(#[from] serde_json::Error),
    #[error(transparent)]
    Config(#[from] config::ConfigError),
    #[error(transparent)]
    Tracing(#[from] tracing_subscriber::util::TryInitError),
}

impl TunerError {
    pub(crate) fn hyperparameter(name: &str, value: f64, reason: impl Into<String>) -> Self {
        Self::InvalidHyperparameter { name: name.to_string(), value, reason: reason.into() }
    }
}

pub type Result<T> = std::result::Result<T, TunerError>;
