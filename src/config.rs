use std::collections::BTreeSet;
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::errors::TuningError;
use crate::output::Evaluation;

/// Metric the session minimises.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Objective {
    Error,
    Accuracy,
}

impl Objective {
    /// Maps scorer output to a value where lower is better.
    pub fn objective_value(&self, error: f64, accuracy: f64) -> f64 {
        match self {
            Self::Error => error,
            Self::Accuracy => 1.0 - accuracy,
        }
    }
}

impl FromStr for Objective {
    type Err = TuningError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "error" => Ok(Self::Error),
            "accuracy" => Ok(Self::Accuracy),
            other => Err(TuningError::InvalidObjective(other.to_string())),
        }
    }
}

impl fmt::Display for Objective {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Error => write!(f, "error"),
            Self::Accuracy => write!(f, "accuracy"),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum AcquisitionKind {
    #[default]
    ExpectedImprovement,
    UpperConfidenceBound,
}

impl FromStr for AcquisitionKind {
    type Err = TuningError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "expectedImprovement" => Ok(Self::ExpectedImprovement),
            "upperConfidenceBound" => Ok(Self::UpperConfidenceBound),
            other => Err(TuningError::UnknownAcquisition(other.to_string())),
        }
    }
}

/// How candidate points are restricted to model partitions on each step.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum ModelSelection {
    /// Rank every partition's candidates together.
    #[default]
    #[serde(rename = "ei")]
    ExpectedImprovement,
    #[serde(rename = "roundRobin")]
    RoundRobin,
    #[serde(rename = "random")]
    Random,
}

impl FromStr for ModelSelection {
    type Err = TuningError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "ei" => Ok(Self::ExpectedImprovement),
            "roundRobin" => Ok(Self::RoundRobin),
            "random" => Ok(Self::Random),
            other => Err(TuningError::UnknownModelSelection(other.to_string())),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BayesianConfig {
    /// Share of the domain sampled at random before the GP is used.
    pub priming_fraction: f64,
    pub jitter: f64,
    pub ucb_coefficient: f64,
    pub acquisition: AcquisitionKind,
    pub model_selection: ModelSelection,
    pub exclude_models: BTreeSet<String>,
    /// Divide expected improvement by the estimated delay of each point.
    pub cost_aware: bool,
    pub seed: Option<u64>,
}

impl Default for BayesianConfig {
    fn default() -> Self {
        Self {
            priming_fraction: 0.15,
            jitter: 1e-3,
            ucb_coefficient: 0.75,
            acquisition: AcquisitionKind::ExpectedImprovement,
            model_selection: ModelSelection::ExpectedImprovement,
            exclude_models: BTreeSet::new(),
            cost_aware: false,
            seed: None,
        }
    }
}

impl BayesianConfig {
    /// Rejects settings the optimizer cannot rank candidates with.
    pub fn validate(&self) -> Result<(), TuningError> {
        if !(0.0..=1.0).contains(&self.priming_fraction) {
            return Err(TuningError::InvalidFraction(self.priming_fraction));
        }
        if !(self.jitter.is_finite() && self.jitter >= 0.0) {
            return Err(TuningError::InvalidSetting {
                name: "jitter",
                value: self.jitter,
            });
        }
        if !(self.ucb_coefficient.is_finite() && self.ucb_coefficient >= 0.0) {
            return Err(TuningError::InvalidSetting {
                name: "ucbCoefficient",
                value: self.ucb_coefficient,
            });
        }
        Ok(())
    }
}

#[derive(Clone, Debug, PartialEq)]
pub enum OptimizerKind {
    Bayesian(BayesianConfig),
    Grid,
}

impl Default for OptimizerKind {
    fn default() -> Self {
        Self::Bayesian(BayesianConfig::default())
    }
}

/// Caller supplied early-stopping rule over the session history and the last
/// acquisition value.
pub type StoppingPredicate = Box<dyn Fn(&[Evaluation], f64) -> bool>;

pub struct SessionConfig {
    pub(crate) objective: Objective,
    pub(crate) use_cross_validation: bool,
    pub(crate) max_iteration_fraction: f64,
    pub(crate) stopping_predicate: Option<StoppingPredicate>,
    pub(crate) optimizer: OptimizerKind,
    pub(crate) save_interval: Option<u32>,
    pub(crate) output_path: Option<PathBuf>,
    pub(crate) evaluate_best_on_test_data: bool,
}

impl SessionConfig {
    pub fn builder() -> SessionConfigBuilder {
        SessionConfigBuilder::new()
    }

    pub fn objective(&self) -> Objective {
        self.objective
    }

    pub fn optimizer(&self) -> &OptimizerKind {
        &self.optimizer
    }
}

impl fmt::Debug for SessionConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SessionConfig")
            .field("objective", &self.objective)
            .field("use_cross_validation", &self.use_cross_validation)
            .field("max_iteration_fraction", &self.max_iteration_fraction)
            .field("stopping_predicate", &self.stopping_predicate.is_some())
            .field("optimizer", &self.optimizer)
            .field("save_interval", &self.save_interval)
            .field("output_path", &self.output_path)
            .field("evaluate_best_on_test_data", &self.evaluate_best_on_test_data)
            .finish()
    }
}

pub struct SessionConfigBuilder {
    objective: String,
    use_cross_validation: bool,
    max_iteration_fraction: f64,
    stopping_predicate: Option<StoppingPredicate>,
    grid: bool,
    bayesian: BayesianConfig,
    acquisition: Option<String>,
    model_selection: Option<String>,
    exclude_models: BTreeSet<String>,
    cost_aware: Option<bool>,
    seed: Option<u64>,
    save_interval: Option<u32>,
    output_path: Option<PathBuf>,
    evaluate_best_on_test_data: bool,
}

impl SessionConfigBuilder {
    pub fn new() -> Self {
        SessionConfigBuilder {
            objective: "error".to_string(),
            use_cross_validation: false,
            max_iteration_fraction: 1.0,
            stopping_predicate: None,
            grid: false,
            bayesian: BayesianConfig::default(),
            acquisition: None,
            model_selection: None,
            exclude_models: BTreeSet::new(),
            cost_aware: None,
            seed: None,
            save_interval: None,
            output_path: None,
            evaluate_best_on_test_data: false,
        }
    }

    pub fn objective(mut self, objective: impl Into<String>) -> Self {
        self.objective = objective.into();
        self
    }

    pub fn use_cross_validation(mut self, use_cross_validation: bool) -> Self {
        self.use_cross_validation = use_cross_validation;
        self
    }

    pub fn max_iteration_fraction(mut self, fraction: f64) -> Self {
        self.max_iteration_fraction = fraction;
        self
    }

    pub fn stopping_predicate<F>(mut self, predicate: F) -> Self
    where
        F: Fn(&[Evaluation], f64) -> bool + 'static,
    {
        self.stopping_predicate = Some(Box::new(predicate));
        self
    }

    pub fn grid_search(mut self) -> Self {
        self.grid = true;
        self
    }

    /// Base Bayesian settings. The individual setters below override them
    /// regardless of call order.
    pub fn bayesian(mut self, config: BayesianConfig) -> Self {
        self.grid = false;
        self.bayesian = config;
        self
    }

    pub fn acquisition(mut self, acquisition: impl Into<String>) -> Self {
        self.acquisition = Some(acquisition.into());
        self
    }

    pub fn model_selection(mut self, strategy: impl Into<String>) -> Self {
        self.model_selection = Some(strategy.into());
        self
    }

    pub fn exclude_model(mut self, model_id: impl Into<String>) -> Self {
        self.exclude_models.insert(model_id.into());
        self
    }

    pub fn cost_aware(mut self, cost_aware: bool) -> Self {
        self.cost_aware = Some(cost_aware);
        self
    }

    pub fn seed(mut self, seed: u64) -> Self {
        self.seed = Some(seed);
        self
    }

    pub fn save_interval(mut self, interval: u32) -> Self {
        self.save_interval = Some(interval);
        self
    }

    pub fn output(mut self, path: impl Into<PathBuf>) -> Self {
        self.output_path = Some(path.into());
        self
    }

    pub fn evaluate_best_on_test_data(mut self, evaluate: bool) -> Self {
        self.evaluate_best_on_test_data = evaluate;
        self
    }

    pub fn build(self) -> Result<SessionConfig, TuningError> {
        let objective = self.objective.parse::<Objective>()?;
        if !(self.max_iteration_fraction > 0.0 && self.max_iteration_fraction <= 1.0) {
            return Err(TuningError::InvalidFraction(self.max_iteration_fraction));
        }
        let mut bayesian = self.bayesian;
        if let Some(acquisition) = self.acquisition {
            bayesian.acquisition = acquisition.parse()?;
        }
        if let Some(strategy) = self.model_selection {
            bayesian.model_selection = strategy.parse()?;
        }
        bayesian.exclude_models.extend(self.exclude_models);
        if let Some(cost_aware) = self.cost_aware {
            bayesian.cost_aware = cost_aware;
        }
        if self.seed.is_some() {
            bayesian.seed = self.seed;
        }
        bayesian.validate()?;
        let optimizer = if self.grid {
            OptimizerKind::Grid
        } else {
            OptimizerKind::Bayesian(bayesian)
        };
        Ok(SessionConfig {
            objective,
            use_cross_validation: self.use_cross_validation,
            max_iteration_fraction: self.max_iteration_fraction,
            stopping_predicate: self.stopping_predicate,
            optimizer,
            save_interval: self.save_interval.filter(|interval| *interval > 0),
            output_path: self.output_path,
            evaluate_best_on_test_data: self.evaluate_best_on_test_data,
        })
    }
}

impl Default for SessionConfigBuilder {
    fn default() -> Self {
        Self::new()
    }
}
