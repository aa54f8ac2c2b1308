use thiserror::Error;

/// Errors raised by the search core.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum TuningError {
    #[error("Invalid objective '{0}'. Expected 'error' or 'accuracy'")]
    InvalidObjective(String),

    #[error("Unknown acquisition function '{0}'")]
    UnknownAcquisition(String),

    #[error("Unknown model selection strategy '{0}'")]
    UnknownModelSelection(String),

    #[error("Parameter '{parameter}' of model '{model}' has no candidate values")]
    EmptyRange { model: String, parameter: String },

    #[error("Parameter '{parameter}' declared twice for model '{model}'")]
    DuplicateParameter { model: String, parameter: String },

    #[error("Point {point} is outside of the domain of size {size}")]
    PointOutOfDomain { point: usize, size: usize },

    #[error("Dimension mismatch: expected {expected}, found {found}")]
    DimensionMismatch { expected: usize, found: usize },

    #[error("Partitions of models '{first}' and '{second}' overlap")]
    OverlappingPartitions { first: String, second: String },

    #[error("Fraction must be in (0, 1]. Received {0}")]
    InvalidFraction(f64),

    #[error("Setting '{name}' must be a finite non negative number. Received {value}")]
    InvalidSetting { name: &'static str, value: f64 },

    #[error("Scorer returned a non finite value {value} for point {point}")]
    NonFiniteScore { point: usize, value: f64 },

    #[error("Delay {delay} reported for point {point} is not a non negative number")]
    InvalidDelay { point: usize, delay: f64 },

    #[error("Empty input")]
    EmptyInput,
}

pub type Result<T> = std::result::Result<T, TuningError>;
