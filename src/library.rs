use std::fmt;
use std::ops::Range;

use serde::{Deserialize, Serialize};

use crate::config::Objective;

/// Loss functions a scorer knows how to build.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum LossFunction {
    AbsoluteDifference,
    CosineDistance,
    HingeLoss,
    HuberLoss,
    LogLoss,
    MeanSquaredError,
    SigmoidCrossEntropy,
    SoftmaxCrossEntropy,
    CategoricalCrossentropy,
}

/// Training algorithms a scorer knows how to build.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum OptimizerAlgorithm {
    Sgd,
    Momentum,
    Adagrad,
    Adadelta,
    Adam,
    Adamax,
    Rmsprop,
}

/// One candidate value of a hyperparameter.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
#[serde(tag = "type", content = "value")]
pub enum Value {
    Float(f64),
    Integer(i64),
    Text(String),
    Loss(LossFunction),
    Optimizer(OptimizerAlgorithm),
}

impl Value {
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Self::Float(v) => Some(*v),
            Self::Integer(v) => Some(*v as f64),
            _ => None,
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Self::Integer(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_loss(&self) -> Option<LossFunction> {
        match self {
            Self::Loss(l) => Some(*l),
            _ => None,
        }
    }

    pub fn as_optimizer(&self) -> Option<OptimizerAlgorithm> {
        match self {
            Self::Optimizer(o) => Some(*o),
            _ => None,
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Float(v) => write!(f, "{v}"),
            Self::Integer(v) => write!(f, "{v}"),
            Self::Text(v) => write!(f, "{v}"),
            Self::Loss(v) => write!(f, "{v:?}"),
            Self::Optimizer(v) => write!(f, "{v:?}"),
        }
    }
}

impl From<f64> for Value {
    fn from(value: f64) -> Self {
        Value::Float(value)
    }
}

impl From<i64> for Value {
    fn from(value: i64) -> Self {
        Value::Integer(value)
    }
}

impl From<i32> for Value {
    fn from(value: i32) -> Self {
        Value::Integer(value as i64)
    }
}

impl From<&str> for Value {
    fn from(value: &str) -> Self {
        Value::Text(value.to_string())
    }
}

impl From<String> for Value {
    fn from(value: String) -> Self {
        Value::Text(value)
    }
}

impl From<LossFunction> for Value {
    fn from(value: LossFunction) -> Self {
        Value::Loss(value)
    }
}

impl From<OptimizerAlgorithm> for Value {
    fn from(value: OptimizerAlgorithm) -> Self {
        Value::Optimizer(value)
    }
}

/// Concrete parameter values of one domain point, in declaration order.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Assignment(Vec<(String, Value)>);

impl Assignment {
    pub(crate) fn new(values: Vec<(String, Value)>) -> Self {
        Self(values)
    }

    pub fn get(&self, name: &str) -> Option<&Value> {
        self.0.iter().find(|(n, _)| n == name).map(|(_, v)| v)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.0.iter().map(|(n, v)| (n.as_str(), v))
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl fmt::Display for Assignment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{{")?;
        for (i, (name, value)) in self.0.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{name}: {value}")?;
        }
        write!(f, "}}")
    }
}

/// A fully resolved configuration: the owning model and its parameter values.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DomainPoint {
    pub model_id: String,
    pub params: Assignment,
}

impl fmt::Display for DomainPoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.model_id, self.params)
    }
}

/// What the scorer is asked to evaluate.
#[derive(Clone, Debug)]
pub struct EvaluationRequest {
    pub point: usize,
    pub domain_point: DomainPoint,
    pub objective: Objective,
    pub use_cross_validation: bool,
    pub use_test_data: bool,
}

/// Raw metrics produced by a scorer.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct EvaluationResult {
    pub error: f64,
    pub accuracy: f64,
}

impl EvaluationResult {
    pub fn new(error: f64, accuracy: f64) -> Self {
        Self { error, accuracy }
    }
}

/// The external collaborator that trains and evaluates one configuration.
pub trait Scorer {
    fn evaluate(&mut self, request: &EvaluationRequest) -> anyhow::Result<EvaluationResult>;
}

impl<T> Scorer for T
where
    T: FnMut(&EvaluationRequest) -> anyhow::Result<EvaluationResult>,
{
    fn evaluate(&mut self, request: &EvaluationRequest) -> anyhow::Result<EvaluationResult> {
        self(request)
    }
}

/// Number of cross-validation folds for a dataset: `min(10, floor(sqrt(n)))`.
pub fn fold_count(dataset_size: usize) -> usize {
    if dataset_size == 0 {
        return 0;
    }
    let root = (dataset_size as f64).sqrt().floor() as usize;
    root.clamp(1, 10)
}

/// Splits `0..dataset_size` into `fold_count(dataset_size)` contiguous folds
/// whose sizes differ by at most one.
pub fn fold_ranges(dataset_size: usize) -> Vec<Range<usize>> {
    let k = fold_count(dataset_size);
    if k == 0 {
        return Vec::new();
    }
    let base = dataset_size / k;
    let extra = dataset_size % k;
    let mut start = 0;
    (0..k)
        .map(|i| {
            let len = base + usize::from(i < extra);
            let range = start..start + len;
            start += len;
            range
        })
        .collect()
}
