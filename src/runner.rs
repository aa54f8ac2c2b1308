use std::collections::BTreeMap;
use std::time::Instant;

use anyhow::Context;

use crate::config::{OptimizerKind, SessionConfig};
use crate::errors::TuningError;
use crate::library::{DomainPoint, EvaluationRequest, EvaluationResult, Scorer};
use crate::output::{Evaluation, SessionReport};
use crate::paramspace::ParameterSpace;
use crate::priors::PriorStore;
use crate::runners::{build_optimizer, Step};

/// Best configuration of a session, resolved back to its parameters.
#[derive(Clone, Debug, PartialEq)]
pub struct BestConfiguration {
    pub point: usize,
    pub domain_point: DomainPoint,
    pub objective: f64,
    pub error: f64,
    pub accuracy: f64,
}

#[derive(Clone, Debug)]
pub struct TuningResult {
    /// `None` only when nothing was evaluated.
    pub best: Option<BestConfiguration>,
    /// Metrics of `best` on the test data, when requested.
    pub test_result: Option<EvaluationResult>,
    pub report: SessionReport,
}

/// Drives the evaluate, report, stop loop of a tuning session.
pub struct Tuner<S: Scorer> {
    space: ParameterSpace,
    scorer: S,
}

impl<S: Scorer> Tuner<S> {
    pub fn new(space: ParameterSpace, scorer: S) -> Self {
        Self { space, scorer }
    }

    pub fn space(&self) -> &ParameterSpace {
        &self.space
    }

    /// Runs one session and commits its observations into `priors`.
    ///
    /// The optimizer is told `-objective` so that lower error (or higher
    /// accuracy) is a higher reward. If the scorer fails the error is returned
    /// and `priors` is left untouched.
    pub fn tune(
        &mut self,
        config: SessionConfig,
        priors: &mut PriorStore,
    ) -> anyhow::Result<TuningResult> {
        priors.ensure_compatible(&self.space)?;
        let mut optimizer = build_optimizer(&config.optimizer, &self.space, priors)?;
        let cost_aware = matches!(&config.optimizer, OptimizerKind::Bayesian(c) if c.cost_aware);
        let size = self.space.len();
        log::info!(
            "Starting {} search over {} configurations minimising {}",
            optimizer.name(),
            size,
            config.objective
        );

        let mut report = SessionReport {
            objective: config.objective,
            optimizer: optimizer.name().to_string(),
            domain_size: size,
            partitions: self.space.partitions().to_vec(),
            evaluations: Vec::new(),
        };
        let mut rewards = BTreeMap::new();

        loop {
            let (point, acquisition) = match optimizer.next_point() {
                Step::Sample { point, acquisition } => (point, acquisition),
                Step::Exhausted => {
                    log::debug!("Optimizer exhausted the domain");
                    break;
                }
            };
            let request = self.request(point, &config, false)?;
            let started = Instant::now();
            let result = self
                .scorer
                .evaluate(&request)
                .with_context(|| format!("Evaluation of {} failed", request.domain_point))?;
            let seconds = started.elapsed().as_secs_f64();

            let objective = config.objective.objective_value(result.error, result.accuracy);
            if !objective.is_finite() {
                return Err(TuningError::NonFiniteScore {
                    point,
                    value: objective,
                }
                .into());
            }
            let delay = if cost_aware { seconds } else { 1.0 };
            optimizer.add_sample(point, -objective, delay)?;
            rewards.insert(point, -objective);

            report.evaluations.push(Evaluation {
                point,
                model_id: request.domain_point.model_id,
                error: result.error,
                accuracy: result.accuracy,
                objective,
                acquisition,
                seconds,
            });
            let count = report.evaluations.len();
            log::debug!("Function evaluated {}/{}", count, size);
            if let (Some(interval), Some(path)) = (config.save_interval, &config.output_path) {
                if count as u32 % interval == 0 {
                    report.write_to_file(path)?;
                }
            }

            let fraction = report.observed_fraction();
            if fraction > config.max_iteration_fraction {
                log::info!("Observed {:.2} of the domain. Stopping", fraction);
                break;
            }
            if config
                .stopping_predicate
                .as_ref()
                .map_or(false, |stop| stop(&report.evaluations, acquisition))
            {
                log::info!("Stopping predicate met after {} evaluations", count);
                break;
            }
        }

        priors.commit(&rewards)?;

        let best = match report.best() {
            Some(evaluation) => Some(BestConfiguration {
                point: evaluation.point,
                domain_point: self.domain_point(evaluation.point)?,
                objective: evaluation.objective,
                error: evaluation.error,
                accuracy: evaluation.accuracy,
            }),
            None => None,
        };
        let test_result = match &best {
            Some(best) if config.evaluate_best_on_test_data => {
                let request = self.request(best.point, &config, true)?;
                let result = self.scorer.evaluate(&request).with_context(|| {
                    format!("Test evaluation of {} failed", request.domain_point)
                })?;
                Some(result)
            }
            _ => None,
        };
        match &best {
            Some(best) => log::info!(
                "Best configuration {} with {} {}",
                best.domain_point,
                config.objective,
                best.objective
            ),
            None => log::info!("No configuration was evaluated"),
        }

        if let Some(path) = &config.output_path {
            report.write_to_file(path)?;
        }
        Ok(TuningResult {
            best,
            test_result,
            report,
        })
    }

    fn domain_point(&self, point: usize) -> Result<DomainPoint, TuningError> {
        self.space
            .point(point)
            .cloned()
            .ok_or(TuningError::PointOutOfDomain {
                point,
                size: self.space.len(),
            })
    }

    fn request(
        &self,
        point: usize,
        config: &SessionConfig,
        use_test_data: bool,
    ) -> Result<EvaluationRequest, TuningError> {
        Ok(EvaluationRequest {
            point,
            domain_point: self.domain_point(point)?,
            objective: config.objective,
            use_cross_validation: config.use_cross_validation,
            use_test_data,
        })
    }
}
