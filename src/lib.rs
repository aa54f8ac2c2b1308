pub mod acquisition;
pub mod config;
pub mod errors;
pub mod library;
pub mod output;
pub mod paramspace;
pub mod priors;
pub mod runner;
pub mod runners;
pub use anyhow;

pub use config::{BayesianConfig, Objective, SessionConfig};
pub use errors::TuningError;
pub use library::{EvaluationRequest, EvaluationResult, Scorer, Value};
pub use paramspace::{ParameterRanges, ParameterSpace};
pub use priors::PriorStore;
pub use runner::{Tuner, TuningResult};
