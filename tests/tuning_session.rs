use hyper_autotuner::anyhow;
use hyper_autotuner::library::{LossFunction, OptimizerAlgorithm};
use hyper_autotuner::output::SessionReport;
use hyper_autotuner::{
    BayesianConfig, EvaluationRequest, EvaluationResult, ParameterRanges, ParameterSpace,
    PriorStore, SessionConfig, Tuner, TuningError,
};

fn space() -> ParameterSpace {
    let mut space = ParameterSpace::new();
    space
        .add_model(
            "mlp",
            ParameterRanges::new()
                .add("learningRate", [0.001, 0.01, 0.1])
                .add("optimizer", [OptimizerAlgorithm::Sgd, OptimizerAlgorithm::Adam]),
        )
        .unwrap();
    space
        .add_model(
            "linear",
            ParameterRanges::new().add("loss", [LossFunction::HuberLoss, LossFunction::LogLoss]),
        )
        .unwrap();
    space
}

/// Error with a single minimum at point 4 (mlp, learningRate 0.1, sgd).
fn error_of(point: usize) -> f64 {
    0.05 + (point as f64 - 4.0).abs() / 10.0
}

fn seeded(priming_fraction: f64) -> BayesianConfig {
    BayesianConfig {
        priming_fraction,
        seed: Some(7),
        ..BayesianConfig::default()
    }
}

#[test]
fn bayesian_session_covers_domain_once_and_finds_minimum() {
    let space = space();
    let size = space.len();
    let mut visited = Vec::new();
    let mut priors = PriorStore::for_space(&space);
    let result = {
        let scorer = |request: &EvaluationRequest| -> anyhow::Result<EvaluationResult> {
            visited.push(request.point);
            assert!(!request.use_test_data);
            Ok(EvaluationResult::new(error_of(request.point), 0.0))
        };
        let mut tuner = Tuner::new(space, scorer);
        let config = SessionConfig::builder().bayesian(seeded(0.15)).build().unwrap();
        tuner.tune(config, &mut priors).unwrap()
    };

    assert_eq!(size, 8);
    let mut sorted = visited.clone();
    sorted.sort_unstable();
    assert_eq!(sorted, (0..size).collect::<Vec<_>>());

    let best = result.best.unwrap();
    assert_eq!(best.point, 4);
    assert_eq!(best.domain_point.model_id, "mlp");
    assert_eq!(best.domain_point.params.get("learningRate").and_then(|v| v.as_f64()), Some(0.1));
    assert_eq!(result.report.optimizer, "bayesian");
    assert!(result.test_result.is_none());

    for point in 0..size {
        assert_eq!(priors.history(point), Some(&[-error_of(point)][..]));
    }
}

#[test]
fn grid_session_visits_points_in_declared_order() {
    let space = space();
    let mut visited = Vec::new();
    let result = {
        let scorer = |request: &EvaluationRequest| -> anyhow::Result<EvaluationResult> {
            visited.push((request.point, request.domain_point.model_id.clone()));
            Ok(EvaluationResult::new(error_of(request.point), 0.0))
        };
        let mut tuner = Tuner::new(space, scorer);
        let config = SessionConfig::builder().grid_search().build().unwrap();
        tuner.tune(config, &mut PriorStore::new(8)).unwrap()
    };
    let points = visited.iter().map(|(p, _)| *p).collect::<Vec<_>>();
    assert_eq!(points, (0..8).collect::<Vec<_>>());
    assert_eq!(visited[5].1, "mlp");
    assert_eq!(visited[6].1, "linear");
    assert_eq!(result.report.optimizer, "grid");
}

#[test]
fn committed_priors_warm_start_next_session() {
    let mut priors = PriorStore::new(8);
    {
        let scorer = |request: &EvaluationRequest| -> anyhow::Result<EvaluationResult> {
            Ok(EvaluationResult::new(error_of(request.point), 0.0))
        };
        let config = SessionConfig::builder().grid_search().build().unwrap();
        Tuner::new(space(), scorer).tune(config, &mut priors).unwrap();
    }
    assert_eq!(priors.mean()[4], -0.05);

    let mut visited = Vec::new();
    {
        let scorer = |request: &EvaluationRequest| -> anyhow::Result<EvaluationResult> {
            visited.push(request.point);
            Ok(EvaluationResult::new(error_of(request.point), 0.0))
        };
        let config = SessionConfig::builder()
            .bayesian(seeded(0.0))
            .max_iteration_fraction(0.1)
            .build()
            .unwrap();
        Tuner::new(space(), scorer).tune(config, &mut priors).unwrap();
    }
    // One evaluation already exceeds a tenth of eight points.
    assert_eq!(visited, vec![4]);
    assert_eq!(priors.history(4).map(|h| h.len()), Some(2));
}

#[test]
fn invalid_objective_is_rejected_before_session_starts() {
    let err = SessionConfig::builder().objective("loss").build().unwrap_err();
    assert_eq!(err, TuningError::InvalidObjective("loss".to_string()));
    assert!(SessionConfig::builder()
        .model_selection("greedy")
        .build()
        .is_err());
}

#[test]
fn predicate_stops_session_and_partial_history_is_committed() {
    let mut priors = PriorStore::new(8);
    let scorer = |request: &EvaluationRequest| -> anyhow::Result<EvaluationResult> {
        Ok(EvaluationResult::new(error_of(request.point), 0.0))
    };
    let config = SessionConfig::builder()
        .bayesian(seeded(0.15))
        .stopping_predicate(|history, _| history.len() >= 2)
        .build()
        .unwrap();
    let result = Tuner::new(space(), scorer).tune(config, &mut priors).unwrap();
    assert_eq!(result.report.evaluations.len(), 2);
    let committed = (0..8)
        .filter(|&p| !priors.history(p).unwrap().is_empty())
        .count();
    assert_eq!(committed, 2);
}

#[test]
fn accuracy_objective_prefers_highest_accuracy() {
    let scorer = |request: &EvaluationRequest| -> anyhow::Result<EvaluationResult> {
        let accuracy = if request.point == 6 { 0.9 } else { 0.6 };
        Ok(EvaluationResult::new(0.0, accuracy))
    };
    let config = SessionConfig::builder()
        .objective("accuracy")
        .grid_search()
        .build()
        .unwrap();
    let result = Tuner::new(space(), scorer)
        .tune(config, &mut PriorStore::new(8))
        .unwrap();
    let best = result.best.unwrap();
    assert_eq!(best.point, 6);
    assert!((best.objective - 0.1).abs() < 1e-12);
    assert_eq!(best.domain_point.model_id, "linear");
}

#[test]
fn report_and_test_evaluation_are_produced() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("session.json");
    let mut test_calls = Vec::new();
    let result = {
        let scorer = |request: &EvaluationRequest| -> anyhow::Result<EvaluationResult> {
            if request.use_test_data {
                test_calls.push(request.point);
                return Ok(EvaluationResult::new(0.5, 0.5));
            }
            Ok(EvaluationResult::new(error_of(request.point), 0.0))
        };
        let config = SessionConfig::builder()
            .grid_search()
            .use_cross_validation(true)
            .save_interval(3)
            .output(&path)
            .evaluate_best_on_test_data(true)
            .build()
            .unwrap();
        Tuner::new(space(), scorer)
            .tune(config, &mut PriorStore::new(8))
            .unwrap()
    };
    assert_eq!(test_calls, vec![4]);
    assert_eq!(result.test_result, Some(EvaluationResult::new(0.5, 0.5)));

    let written: SessionReport =
        serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
    assert_eq!(written, result.report);
    assert_eq!(written.evaluations.len(), 8);
}

#[test]
fn scorer_failure_propagates_and_leaves_priors_untouched() {
    let mut priors = PriorStore::new(8);
    let scorer = |request: &EvaluationRequest| -> anyhow::Result<EvaluationResult> {
        if request.point == 2 {
            anyhow::bail!("training diverged");
        }
        Ok(EvaluationResult::new(error_of(request.point), 0.0))
    };
    let config = SessionConfig::builder().grid_search().build().unwrap();
    let err = Tuner::new(space(), scorer)
        .tune(config, &mut priors)
        .unwrap_err();
    assert!(format!("{:#}", err).contains("training diverged"));
    assert_eq!(priors, PriorStore::new(8));
}

#[test]
fn cost_aware_session_completes_with_measured_delays() {
    let scorer = |request: &EvaluationRequest| -> anyhow::Result<EvaluationResult> {
        Ok(EvaluationResult::new(error_of(request.point), 0.0))
    };
    let config = SessionConfig::builder()
        .bayesian(seeded(0.15))
        .cost_aware(true)
        .model_selection("roundRobin")
        .build()
        .unwrap();
    let result = Tuner::new(space(), scorer)
        .tune(config, &mut PriorStore::new(8))
        .unwrap();
    assert_eq!(result.report.evaluations.len(), 8);
    assert!(result.report.evaluations.iter().all(|e| e.seconds >= 0.0));
}

#[test]
fn excluded_model_is_never_evaluated() {
    let mut models = Vec::new();
    {
        let scorer = |request: &EvaluationRequest| -> anyhow::Result<EvaluationResult> {
            models.push(request.domain_point.model_id.clone());
            Ok(EvaluationResult::new(error_of(request.point), 0.0))
        };
        let config = SessionConfig::builder()
            .bayesian(seeded(0.15))
            .exclude_model("linear")
            .build()
            .unwrap();
        Tuner::new(space(), scorer)
            .tune(config, &mut PriorStore::new(8))
            .unwrap();
    }
    assert_eq!(models.len(), 6);
    assert!(models.iter().all(|m| m == "mlp"));
}
