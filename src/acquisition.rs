//! Acquisition functions and selection helpers used by the Bayesian optimizer.

use std::f64::consts::{PI, SQRT_2};

use statrs::function::erf::erf;

use crate::errors::TuningError;

/// Exploration weight of the upper confidence bound.
pub const DEFAULT_UCB_COEFFICIENT: f64 = 0.75;

/// Index of the largest value. Ties resolve to the first occurrence.
pub fn argmax(values: &[f64]) -> Result<usize, TuningError> {
    let mut iter = values.iter().enumerate();
    let (mut best_index, mut best) = iter.next().ok_or(TuningError::EmptyInput)?;
    for (index, value) in iter {
        if value > best {
            best_index = index;
            best = value;
        }
    }
    Ok(best_index)
}

fn standard_normal_cdf(x: f64) -> f64 {
    0.5 * (1.0 + erf(x / SQRT_2))
}

fn standard_normal_pdf(x: f64) -> f64 {
    (-0.5 * x * x).exp() / (2.0 * PI).sqrt()
}

/// Expected improvement of a single point over `best_objective`.
///
/// A zero standard deviation is the noiseless limit: the improvement is the
/// positive part of `mean - best_objective`.
pub fn point_expected_improvement(best_objective: f64, mean: f64, std: f64) -> f64 {
    if std <= 0.0 || !std.is_finite() {
        return (mean - best_objective).max(0.0);
    }
    let gamma = (mean - best_objective) / std;
    std * (gamma * standard_normal_cdf(gamma) + standard_normal_pdf(gamma))
}

pub fn expected_improvement(best_objective: f64, mean: &[f64], std: &[f64]) -> Vec<f64> {
    mean.iter()
        .zip(std)
        .map(|(&m, &s)| point_expected_improvement(best_objective, m, s))
        .collect()
}

pub fn upper_confidence_bound(mean: &[f64], std: &[f64], coefficient: f64) -> Vec<f64> {
    mean.iter()
        .zip(std)
        .map(|(&m, &s)| m + coefficient * s)
        .collect()
}
