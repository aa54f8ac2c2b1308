pub mod bayesian_runner;
pub mod grid_runner;

use serde::{Deserialize, Serialize};

use crate::config::OptimizerKind;
use crate::errors::TuningError;
use crate::paramspace::ParameterSpace;
use crate::priors::PriorStore;

use self::bayesian_runner::BayesianOptimizer;
use self::grid_runner::GridSearchOptimizer;

/// Result of asking an optimizer for the next point.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum Step {
    Sample { point: usize, acquisition: f64 },
    Exhausted,
}

impl Step {
    /// Acquisition reported when no model informed score exists.
    pub const UNINFORMED_ACQUISITION: f64 = 0.0;
    /// Acquisition reported together with [`Step::Exhausted`].
    pub const EXHAUSTED_ACQUISITION: f64 = -2.0;

    pub fn point(&self) -> Option<usize> {
        match self {
            Self::Sample { point, .. } => Some(*point),
            Self::Exhausted => None,
        }
    }

    pub fn acquisition(&self) -> f64 {
        match self {
            Self::Sample { acquisition, .. } => *acquisition,
            Self::Exhausted => Self::EXHAUSTED_ACQUISITION,
        }
    }

    pub fn is_exhausted(&self) -> bool {
        matches!(self, Self::Exhausted)
    }
}

/// One reported evaluation.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct Observation {
    pub point: usize,
    pub value: f64,
    pub delay: f64,
}

/// Shared contract of every search strategy: propose a point, learn its value.
/// Values are rewards, higher is better.
pub trait SearchOptimizer {
    fn next_point(&mut self) -> Step;

    fn add_sample(&mut self, point: usize, value: f64, delay: f64) -> Result<(), TuningError>;

    fn name(&self) -> &str;
}

pub(crate) fn validate_sample(
    point: usize,
    value: f64,
    delay: f64,
    domain_size: usize,
) -> Result<(), TuningError> {
    if point >= domain_size {
        return Err(TuningError::PointOutOfDomain {
            point,
            size: domain_size,
        });
    }
    if !value.is_finite() {
        return Err(TuningError::NonFiniteScore { point, value });
    }
    if !(delay.is_finite() && delay >= 0.0) {
        return Err(TuningError::InvalidDelay { point, delay });
    }
    Ok(())
}

/// Builds the optimizer selected by `kind` over `space`, warm started from
/// `priors` when it is a Bayesian one.
pub fn build_optimizer(
    kind: &OptimizerKind,
    space: &ParameterSpace,
    priors: &PriorStore,
) -> Result<Box<dyn SearchOptimizer>, TuningError> {
    match kind {
        OptimizerKind::Bayesian(config) => Ok(Box::new(BayesianOptimizer::from_prior_store(
            space,
            priors,
            config.clone(),
        )?)),
        OptimizerKind::Grid => Ok(Box::new(GridSearchOptimizer::new(space.len()))),
    }
}
