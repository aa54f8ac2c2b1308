use std::collections::BTreeSet;

use itertools::Itertools;
use nalgebra::{DMatrix, DVector};
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};

use crate::acquisition::{argmax, expected_improvement, upper_confidence_bound};
use crate::config::{AcquisitionKind, BayesianConfig, ModelSelection};
use crate::errors::TuningError;
use crate::paramspace::{ModelPartition, ParameterSpace};
use crate::priors::PriorStore;

use super::{validate_sample, Observation, SearchOptimizer, Step};

const MAX_JITTER_ESCALATIONS: usize = 4;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SearchState {
    /// Too few observations for the GP; points are drawn at random.
    Priming,
    Modeling,
    Exhausted,
}

/// GP posterior over the whole domain.
#[derive(Clone, Debug, PartialEq)]
pub struct Posterior {
    pub mean: DVector<f64>,
    pub std: DVector<f64>,
}

/// Sequential model based optimizer over a discrete domain.
///
/// The GP is defined directly by a prior mean vector and a kernel matrix over
/// domain indices, usually taken from a [`PriorStore`]. Every call to
/// [`SearchOptimizer::next_point`] recomputes the posterior from scratch.
/// Values are rewards: higher is better.
pub struct BayesianOptimizer<R: Rng = StdRng> {
    domain_size: usize,
    partitions: Vec<ModelPartition>,
    prior_mean: DVector<f64>,
    kernel: DMatrix<f64>,
    config: BayesianConfig,
    observations: Vec<Observation>,
    latest: Vec<Option<f64>>,
    cost_estimates: Vec<Option<f64>>,
    partition_best: Vec<Option<f64>>,
    round_robin: usize,
    rng: R,
}

impl BayesianOptimizer {
    /// Zero prior mean and identity kernel.
    pub fn new(
        domain_size: usize,
        partitions: Vec<ModelPartition>,
        config: BayesianConfig,
    ) -> Result<Self, TuningError> {
        let rng = match config.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };
        Self::new_with_rng(domain_size, partitions, config, rng)
    }

    pub fn from_prior_store(
        space: &ParameterSpace,
        priors: &PriorStore,
        config: BayesianConfig,
    ) -> Result<Self, TuningError> {
        priors.ensure_compatible(space)?;
        Self::new(space.len(), space.partitions().to_vec(), config)?
            .with_priors(priors.mean().clone(), priors.kernel().clone())
    }
}

impl<R: Rng> BayesianOptimizer<R> {
    pub fn new_with_rng(
        domain_size: usize,
        partitions: Vec<ModelPartition>,
        config: BayesianConfig,
        rng: R,
    ) -> Result<Self, TuningError> {
        config.validate()?;
        validate_partitions(domain_size, &partitions)?;
        Ok(Self {
            domain_size,
            prior_mean: DVector::zeros(domain_size),
            kernel: DMatrix::identity(domain_size, domain_size),
            config,
            observations: Vec::new(),
            latest: vec![None; domain_size],
            cost_estimates: vec![None; domain_size],
            partition_best: vec![None; partitions.len()],
            partitions,
            round_robin: 0,
            rng,
        })
    }

    pub fn with_priors(
        mut self,
        mean: DVector<f64>,
        kernel: DMatrix<f64>,
    ) -> Result<Self, TuningError> {
        if mean.len() != self.domain_size {
            return Err(TuningError::DimensionMismatch {
                expected: self.domain_size,
                found: mean.len(),
            });
        }
        if kernel.shape() != (self.domain_size, self.domain_size) {
            return Err(TuningError::DimensionMismatch {
                expected: self.domain_size,
                found: kernel.nrows().max(kernel.ncols()),
            });
        }
        self.prior_mean = mean;
        self.kernel = kernel;
        Ok(self)
    }

    /// Expected evaluation cost of `point`, used when `cost_aware` is set.
    pub fn set_cost_estimate(&mut self, point: usize, delay: f64) -> Result<(), TuningError> {
        validate_sample(point, 0.0, delay, self.domain_size)?;
        self.cost_estimates[point] = Some(delay);
        Ok(())
    }

    pub fn observations(&self) -> &[Observation] {
        &self.observations
    }

    pub fn observed_count(&self) -> usize {
        self.latest.iter().filter(|v| v.is_some()).count()
    }

    /// Best reward seen in each partition, in partition order.
    pub fn partition_best(&self) -> impl Iterator<Item = (&str, Option<f64>)> {
        self.partitions
            .iter()
            .zip(self.partition_best.iter())
            .map(|(p, best)| (p.model_id.as_str(), *best))
    }

    pub fn state(&self) -> SearchState {
        let observed = self.observed_count();
        if observed >= self.domain_size {
            SearchState::Exhausted
        } else if (observed as f64) < self.config.priming_fraction * self.domain_size as f64 {
            SearchState::Priming
        } else {
            SearchState::Modeling
        }
    }

    /// Posterior mean and standard deviation conditioned on the latest value
    /// of every observed point.
    pub fn posterior(&self) -> Posterior {
        let n = self.domain_size;
        let prior = || Posterior {
            mean: self.prior_mean.clone(),
            std: DVector::from_iterator(n, (0..n).map(|i| self.kernel[(i, i)].max(0.0).sqrt())),
        };

        let samples = self
            .latest
            .iter()
            .enumerate()
            .filter_map(|(point, value)| value.map(|v| (point, v)))
            .collect::<Vec<_>>();
        if samples.is_empty() {
            return prior();
        }
        let indices = samples.iter().map(|(point, _)| *point).collect::<Vec<_>>();

        // A single observation still gives a 1x1 matrix here.
        let sample_kernel = self.kernel.select_rows(&indices).select_columns(&indices);
        let inverse = match self.invert_sample_kernel(&sample_kernel) {
            Some(inverse) => inverse,
            None => {
                log::warn!("Could not invert the sample kernel. Falling back to the prior");
                return prior();
            }
        };

        let gain = DVector::from_iterator(
            indices.len(),
            samples.iter().map(|&(point, v)| v - self.prior_mean[point]),
        );
        let cross = self.kernel.select_columns(&indices);
        let weights = &cross * &inverse;
        let mean = &self.prior_mean + &weights * &gain;
        // diag(K - K[:,O] K[O,O]^-1 K[O,:])
        let reduction = weights.component_mul(&cross).column_sum();
        let std = DVector::from_iterator(
            n,
            (0..n).map(|i| (self.kernel[(i, i)] - reduction[i]).max(0.0).sqrt()),
        );
        Posterior { mean, std }
    }

    fn invert_sample_kernel(&self, sample_kernel: &DMatrix<f64>) -> Option<DMatrix<f64>> {
        let size = sample_kernel.nrows();
        let mut jitter = self.config.jitter;
        for attempt in 0..=MAX_JITTER_ESCALATIONS {
            let jittered = sample_kernel + DMatrix::<f64>::identity(size, size) * jitter;
            if let Some(inverse) = jittered.try_inverse() {
                if inverse.iter().all(|v| v.is_finite()) {
                    return Some(inverse);
                }
            }
            log::warn!(
                "Sample kernel singular with jitter {:e} (attempt {}). Increasing jitter",
                jitter,
                attempt + 1
            );
            jitter = (jitter * 10.0).max(1e-6);
        }
        let jittered = sample_kernel + DMatrix::<f64>::identity(size, size) * jitter;
        jittered.pseudo_inverse(f64::EPSILON).ok()
    }

    /// Acquisition value of every domain point. Observed points are 0.
    ///
    /// Each partition is scored on its own, against its own best reward, since
    /// rewards of different models need not share a scale.
    pub fn acquisition_values(&self, posterior: &Posterior) -> Vec<f64> {
        let mut values = vec![0.0; self.domain_size];
        for (index, partition) in self.partitions.iter().enumerate() {
            let points = partition
                .indices
                .clone()
                .filter(|&p| self.latest[p].is_none())
                .collect::<Vec<_>>();
            if points.is_empty() {
                continue;
            }
            let mean = points.iter().map(|&p| posterior.mean[p]).collect::<Vec<_>>();
            let std = points.iter().map(|&p| posterior.std[p]).collect::<Vec<_>>();
            let scores = match self.config.acquisition {
                AcquisitionKind::ExpectedImprovement => {
                    // Without samples of its own a model is compared with its
                    // most promising remaining point.
                    let best = self.partition_best[index]
                        .unwrap_or_else(|| mean.iter().cloned().fold(f64::NEG_INFINITY, f64::max));
                    expected_improvement(best, &mean, &std)
                }
                AcquisitionKind::UpperConfidenceBound => {
                    upper_confidence_bound(&mean, &std, self.config.ucb_coefficient)
                }
            };
            for (&point, score) in points.iter().zip(scores) {
                values[point] = score;
            }
        }
        values
    }

    /// Explicit estimate, else the mean delay observed in the point's model,
    /// else the mean of every observed delay, else 1.
    fn delay_estimate(&self, point: usize) -> f64 {
        if let Some(delay) = self.cost_estimates[point] {
            return delay;
        }
        let model = self
            .partitions
            .iter()
            .find(|p| p.contains(point))
            .map(|p| p.model_id.as_str());
        let same_model = self
            .observations
            .iter()
            .filter(|o| {
                self.partitions
                    .iter()
                    .any(|p| Some(p.model_id.as_str()) == model && p.contains(o.point))
            })
            .map(|o| o.delay)
            .collect::<Vec<_>>();
        let delays = if same_model.is_empty() {
            self.observations.iter().map(|o| o.delay).collect()
        } else {
            same_model
        };
        if delays.is_empty() {
            1.0
        } else {
            delays.iter().sum::<f64>() / delays.len() as f64
        }
    }

    /// Unobserved points grouped by model, skipping excluded models.
    fn candidate_groups(&self, exclude: &BTreeSet<String>) -> Vec<(String, Vec<usize>)> {
        self.partitions
            .iter()
            .map(|p| p.model_id.as_str())
            .unique()
            .filter(|model| !exclude.contains(*model))
            .map(|model| {
                let points = self
                    .partitions
                    .iter()
                    .filter(|p| p.model_id == model)
                    .flat_map(|p| p.indices.clone())
                    .filter(|&point| self.latest[point].is_none())
                    .collect::<Vec<_>>();
                (model.to_string(), points)
            })
            .filter(|(_, points)| !points.is_empty())
            .collect()
    }

    fn restrict_to_model(&mut self, mut groups: Vec<(String, Vec<usize>)>) -> Vec<usize> {
        match self.config.model_selection {
            ModelSelection::ExpectedImprovement => {
                groups.into_iter().flat_map(|(_, points)| points).collect()
            }
            ModelSelection::Random => {
                let chosen = self.rng.gen_range(0..groups.len());
                groups.swap_remove(chosen).1
            }
            ModelSelection::RoundRobin => {
                let models = self
                    .partitions
                    .iter()
                    .map(|p| p.model_id.clone())
                    .unique()
                    .collect::<Vec<_>>();
                for offset in 0..models.len() {
                    let turn = (self.round_robin + offset) % models.len();
                    if let Some(position) = groups.iter().position(|(m, _)| *m == models[turn]) {
                        self.round_robin = (turn + 1) % models.len();
                        return groups.swap_remove(position).1;
                    }
                }
                Vec::new()
            }
        }
    }

    /// Like [`SearchOptimizer::next_point`], ignoring the models in `exclude`
    /// for this call only.
    pub fn next_point_excluding(&mut self, exclude: &BTreeSet<String>) -> Step {
        let state = self.state();
        if state == SearchState::Exhausted {
            log::debug!("Every point of the domain has been observed");
            return Step::Exhausted;
        }
        let groups = self.candidate_groups(exclude);
        if groups.is_empty() {
            log::warn!("Every model with unobserved points is excluded: {:?}", exclude);
            return Step::Exhausted;
        }

        if state == SearchState::Priming {
            let pool = groups
                .iter()
                .flat_map(|(_, points)| points.iter().copied())
                .collect::<Vec<_>>();
            return match pool.choose(&mut self.rng) {
                Some(&point) => Step::Sample {
                    point,
                    acquisition: Step::UNINFORMED_ACQUISITION,
                },
                None => Step::Exhausted,
            };
        }

        let selected = self.restrict_to_model(groups);
        let posterior = self.posterior();
        let acquisition = self.acquisition_values(&posterior);

        let cost_aware = self.config.cost_aware
            && self.config.acquisition == AcquisitionKind::ExpectedImprovement;
        let scores = selected
            .iter()
            .map(|&p| {
                if cost_aware {
                    acquisition[p] / self.delay_estimate(p).max(f64::EPSILON)
                } else {
                    acquisition[p]
                }
            })
            .collect::<Vec<_>>();
        log::trace!("Candidates {:?} scored {:?}", selected, scores);

        let index = match argmax(&scores) {
            Ok(index) => index,
            Err(_) => return Step::Exhausted,
        };
        let mut point = selected[index];
        let value = scores[index];
        if cost_aware && value == 0.0 {
            // Nothing informative left: take the cheapest remaining point.
            if let Some(&cheapest) = selected
                .iter()
                .min_by(|&&a, &&b| self.delay_estimate(a).total_cmp(&self.delay_estimate(b)))
            {
                point = cheapest;
            }
        }
        Step::Sample {
            point,
            acquisition: value,
        }
    }
}

impl<R: Rng> SearchOptimizer for BayesianOptimizer<R> {
    fn next_point(&mut self) -> Step {
        let exclude = self.config.exclude_models.clone();
        self.next_point_excluding(&exclude)
    }

    fn add_sample(&mut self, point: usize, value: f64, delay: f64) -> Result<(), TuningError> {
        validate_sample(point, value, delay, self.domain_size)?;
        if self.latest[point].is_some() {
            log::warn!("Point {} sampled again. Keeping the latest value", point);
        }
        self.latest[point] = Some(value);
        self.observations.push(Observation {
            point,
            value,
            delay,
        });
        for (partition, best) in self.partitions.iter().zip(self.partition_best.iter_mut()) {
            if partition.contains(point) && best.map_or(true, |b| value > b) {
                *best = Some(value);
            }
        }
        Ok(())
    }

    fn name(&self) -> &str {
        "bayesian"
    }
}

fn validate_partitions(
    domain_size: usize,
    partitions: &[ModelPartition],
) -> Result<(), TuningError> {
    if let Some(outside) = partitions.iter().find(|p| p.indices.end > domain_size) {
        return Err(TuningError::PointOutOfDomain {
            point: outside.indices.end - 1,
            size: domain_size,
        });
    }
    let sorted = partitions
        .iter()
        .filter(|p| !p.indices.is_empty())
        .sorted_by_key(|p| (p.indices.start, p.indices.end))
        .collect::<Vec<_>>();
    for pair in sorted.windows(2) {
        if pair[1].indices.start < pair[0].indices.end {
            return Err(TuningError::OverlappingPartitions {
                first: pair[0].model_id.clone(),
                second: pair[1].model_id.clone(),
            });
        }
    }
    let covered = sorted.iter().map(|p| p.indices.len()).sum::<usize>();
    if covered != domain_size {
        return Err(TuningError::DimensionMismatch {
            expected: domain_size,
            found: covered,
        });
    }
    Ok(())
}
