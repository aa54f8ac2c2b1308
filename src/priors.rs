use std::collections::BTreeMap;
use std::fs::File;
use std::io::{BufReader, BufWriter};
use std::path::Path;

use anyhow::Context;
use nalgebra::{DMatrix, DVector};
use serde::{Deserialize, Serialize};

use crate::errors::TuningError;
use crate::paramspace::ParameterSpace;

/// Observation history shared across tuning sessions over one domain.
///
/// The mean and kernel derived from the history warm start the next
/// [`BayesianOptimizer`](crate::runners::bayesian_runner::BayesianOptimizer).
/// The store is only valid for the parameter space (and therefore the domain
/// indexing) it was created for.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PriorStore {
    history: Vec<Vec<f64>>,
    mean: DVector<f64>,
    kernel: DMatrix<f64>,
}

impl PriorStore {
    /// Empty history, zero mean and identity kernel.
    pub fn new(domain_size: usize) -> Self {
        Self {
            history: vec![Vec::new(); domain_size],
            mean: DVector::zeros(domain_size),
            kernel: DMatrix::identity(domain_size, domain_size),
        }
    }

    pub fn for_space(space: &ParameterSpace) -> Self {
        Self::new(space.len())
    }

    pub fn domain_size(&self) -> usize {
        self.history.len()
    }

    pub fn mean(&self) -> &DVector<f64> {
        &self.mean
    }

    pub fn kernel(&self) -> &DMatrix<f64> {
        &self.kernel
    }

    pub fn history(&self, point: usize) -> Option<&[f64]> {
        self.history.get(point).map(Vec::as_slice)
    }

    pub fn ensure_compatible(&self, space: &ParameterSpace) -> Result<(), TuningError> {
        if self.domain_size() != space.len() {
            return Err(TuningError::DimensionMismatch {
                expected: space.len(),
                found: self.domain_size(),
            });
        }
        Ok(())
    }

    /// Appends one session's observations and refreshes mean and kernel.
    ///
    /// Points never observed get the mean of every individual observation.
    /// Kernel entries are rewritten only between distinct observed points.
    pub fn commit(&mut self, observations: &BTreeMap<usize, f64>) -> Result<(), TuningError> {
        let size = self.domain_size();
        if let Some(&point) = observations.keys().find(|&&p| p >= size) {
            return Err(TuningError::PointOutOfDomain { point, size });
        }
        if let Some((&point, &value)) = observations.iter().find(|(_, v)| !v.is_finite()) {
            return Err(TuningError::NonFiniteScore { point, value });
        }

        for (&point, &value) in observations {
            let values = &mut self.history[point];
            values.push(value);
            self.mean[point] = values.iter().sum::<f64>() / values.len() as f64;
        }

        let (sum, count) = self
            .history
            .iter()
            .flatten()
            .fold((0.0, 0usize), |(sum, count), v| (sum + v, count + 1));
        if count > 0 {
            let pooled = sum / count as f64;
            for (point, values) in self.history.iter().enumerate() {
                if values.is_empty() {
                    self.mean[point] = pooled;
                }
            }
        }

        let observed = (0..size)
            .filter(|&p| !self.history[p].is_empty())
            .collect::<Vec<_>>();
        for (a, &i) in observed.iter().enumerate() {
            for &j in &observed[a + 1..] {
                let cov = self.covariance(i, j);
                self.kernel[(i, j)] = cov;
                self.kernel[(j, i)] = cov;
            }
        }
        log::debug!(
            "Committed {} observations, {} points observed so far",
            observations.len(),
            observed.len()
        );
        Ok(())
    }

    fn covariance(&self, i: usize, j: usize) -> f64 {
        let (hi, hj) = (&self.history[i], &self.history[j]);
        let (mi, mj) = (self.mean[i], self.mean[j]);
        let cross: f64 = hi
            .iter()
            .zip(hj)
            .map(|(x, y)| (x - mi) * (y - mj))
            .sum();
        cross / (hi.len() * hj.len()) as f64
    }

    pub fn save<P: AsRef<Path>>(&self, path: P) -> anyhow::Result<()> {
        let path = path.as_ref();
        let file = File::options()
            .write(true)
            .truncate(true)
            .create(true)
            .open(path)
            .with_context(|| format!("Could not open {} for writing", path.display()))?;
        serde_json::to_writer_pretty(BufWriter::new(file), self)
            .with_context(|| format!("Could not write priors to {}", path.display()))?;
        Ok(())
    }

    pub fn load<P: AsRef<Path>>(path: P) -> anyhow::Result<Self> {
        let path = path.as_ref();
        let file =
            File::open(path).with_context(|| format!("Could not open {}", path.display()))?;
        let store: Self = serde_json::from_reader(BufReader::new(file))
            .with_context(|| format!("Could not read priors from {}", path.display()))?;
        let size = store.history.len();
        if store.mean.len() != size {
            return Err(TuningError::DimensionMismatch {
                expected: size,
                found: store.mean.len(),
            }
            .into());
        }
        if store.kernel.shape() != (size, size) {
            return Err(TuningError::DimensionMismatch {
                expected: size,
                found: store.kernel.nrows(),
            }
            .into());
        }
        Ok(store)
    }
}
