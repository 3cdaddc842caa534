use thiserror::Error;

/// Main error type for OptiWire orchestration
#[derive(Error, Debug)]
pub enum BoError {
    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Invalid acquisition selected: {0}")]
    InvalidAcquisition(String),

    /// Failure raised by the user objective, passed through untouched.
    #[error(transparent)]
    Evaluation(anyhow::Error),

    #[error("Model error: {0}")]
    Model(String),

    #[error("Acquisition optimizer error: {0}")]
    Optimizer(String),

    #[error("Sampling error: {0}")]
    Sampling(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl BoError {
    /// True for errors raised while validating configuration, before any
    /// objective evaluation can have happened.
    pub fn is_configuration(&self) -> bool {
        matches!(self, Self::Configuration(_) | Self::InvalidAcquisition(_))
    }
}

/// Result type alias for OptiWire operations
pub type BoResult<T> = Result<T, BoError>;

/// Macro for creating configuration errors
#[macro_export]
macro_rules! config_error {
    ($($arg:tt)*) => {
        $crate::errors::BoError::Configuration(format!($($arg)*))
    };
}

/// Macro for creating sampling errors
#[macro_export]
macro_rules! sampling_error {
    ($($arg:tt)*) => {
        $crate::errors::BoError::Sampling(format!($($arg)*))
    };
}
