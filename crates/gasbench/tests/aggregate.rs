//! Tests for ranking benchmark outcomes across networks.

use gasbench::{
    compare, test_utils::*, CompileError, ConfigError, EngineError, Error, FailureStage, ForkError,
    NetworkFailure, NetworkOutcome,
};

fn succeeded(network_id: &str, calls: &[(&str, f64)]) -> NetworkOutcome {
    NetworkOutcome::Succeeded(Box::new(priced_result(network_id, calls, true)))
}

fn unpriced(network_id: &str) -> NetworkOutcome {
    NetworkOutcome::Succeeded(Box::new(priced_result(network_id, &[("increment", 0.0)], false)))
}

fn failed(network_id: &str) -> NetworkOutcome {
    NetworkOutcome::Failed(NetworkFailure::new(
        network_id,
        &Error::Fork(ForkError::Connect("refused".to_string())),
    ))
}

fn ids(ids: &[&str]) -> Vec<String> {
    ids.iter().map(|id| id.to_string()).collect()
}

fn approx(a: f64, b: f64) -> bool {
    (a - b).abs() < 1e-9
}

#[test]
fn test_ranking_savings_and_baseline() {
    let outcomes = [
        succeeded("ethereum", &[("increment", 3.0)]),
        succeeded("base", &[("increment", 1.0)]),
        succeeded("arbitrum", &[("increment", 1.5)]),
    ];
    let result = compare("ethereum", &ids(&["base", "arbitrum"]), &outcomes);

    let order: Vec<_> = result.rankings.iter().map(|r| r.network_id.as_str()).collect();
    assert_eq!(order, ["base", "arbitrum", "ethereum"]);
    let ranks: Vec<_> = result.rankings.iter().map(|r| r.rank).collect();
    assert_eq!(ranks, [1, 2, 3]);
    assert_eq!(result.cheapest().unwrap().network_id, "base");
    assert_eq!(result.most_expensive().unwrap().network_id, "ethereum");

    // Savings are relative to the most expensive network.
    assert!(approx(result.rankings[0].savings_percentage, 200.0 / 3.0));
    assert!(approx(result.rankings[1].savings_percentage, 50.0));
    assert!(approx(result.rankings[2].savings_percentage, 0.0));

    let base_delta = result.rankings[0].baseline_delta.unwrap();
    assert!(approx(base_delta.discount_usd, 2.0));
    assert!(approx(base_delta.discount_percentage, 200.0 / 3.0));
    let baseline_delta = result.rankings[2].baseline_delta.unwrap();
    assert!(approx(baseline_delta.discount_usd, 0.0));

    assert_eq!(result.succeeded, ["ethereum", "base", "arbitrum"]);
    assert!(result.failures.is_empty());
    assert!(result.unpriced.is_empty());
}

#[test]
fn test_failures_unpriced_and_missing() {
    let outcomes = [
        succeeded("ethereum", &[("increment", 2.0)]),
        failed("polygon"),
        unpriced("base"),
        // Not part of the comparison.
        succeeded("scroll", &[("increment", 0.1)]),
    ];
    let result = compare("ethereum", &ids(&["polygon", "base", "linea", "base"]), &outcomes);

    assert_eq!(result.attempted, ["ethereum", "polygon", "base", "linea"]);
    assert_eq!(result.succeeded, ["ethereum", "base"]);
    assert_eq!(result.unpriced, ["base"]);
    assert_eq!(result.rankings.len(), 1);
    assert_eq!(result.rankings[0].network_id, "ethereum");

    let stages: Vec<_> = result.failures.iter().map(|f| (f.network_id.as_str(), f.stage)).collect();
    assert_eq!(stages, [("polygon", FailureStage::Fork), ("linea", FailureStage::Missing)]);
}

#[test]
fn test_failed_baseline_has_no_delta() {
    let outcomes = [failed("ethereum"), succeeded("base", &[("increment", 1.0)])];
    let result = compare("ethereum", &ids(&["base"]), &outcomes);
    assert_eq!(result.rankings.len(), 1);
    assert_eq!(result.rankings[0].baseline_delta, None);
    assert_eq!(result.failures[0].network_id, "ethereum");
}

#[test]
fn test_ties_are_ordered_by_id() {
    let outcomes = [
        succeeded("optimism", &[("increment", 1.0)]),
        succeeded("base", &[("increment", 1.0)]),
    ];
    let result = compare("optimism", &ids(&["base"]), &outcomes);
    let order: Vec<_> = result.rankings.iter().map(|r| r.network_id.as_str()).collect();
    assert_eq!(order, ["base", "optimism"]);
    // Equal costs save nothing relative to each other.
    assert!(result.rankings.iter().all(|r| approx(r.savings_percentage, 0.0)));
}

#[test]
fn test_zero_cost_networks() {
    let outcomes = [
        succeeded("ethereum", &[("increment", 0.0)]),
        succeeded("base", &[("increment", 0.0)]),
    ];
    let result = compare("ethereum", &ids(&["base"]), &outcomes);
    for ranked in &result.rankings {
        assert_eq!(ranked.savings_percentage, 0.0);
        assert_eq!(ranked.baseline_delta.unwrap().discount_percentage, 0.0);
    }
}

#[test]
fn test_function_variability() {
    let outcomes = [
        succeeded("ethereum", &[("increment", 3.0), ("setNumber", 5.0)]),
        succeeded("base", &[("increment", 1.0), ("setNumber", 5.0)]),
        // Only priced on one network.
        succeeded("arbitrum", &[("fail", 9.0)]),
        unpriced("polygon"),
    ];
    let result = compare("ethereum", &ids(&["base", "arbitrum", "polygon"]), &outcomes);

    let functions: Vec<_> =
        result.function_variability.iter().map(|v| v.function.as_str()).collect();
    assert_eq!(functions, ["increment", "setNumber"]);
    let increment = &result.function_variability[0];
    assert_eq!(increment.networks, 2);
    assert!(approx(increment.mean_usd, 2.0));
    assert!(approx(increment.std_dev_usd, 2f64.sqrt()));
    assert!(approx(result.function_variability[1].std_dev_usd, 0.0));
}

#[test]
fn test_failure_stages() {
    let stage = |err: Error| NetworkFailure::new("x", &err).stage;
    assert_eq!(
        stage(ConfigError::UnsupportedNetwork("x".to_string()).into()),
        FailureStage::Validation
    );
    assert_eq!(stage(CompileError::Output("bad".to_string()).into()), FailureStage::Compilation);
    assert_eq!(stage(ForkError::Connect("refused".to_string()).into()), FailureStage::Fork);
    assert_eq!(
        stage(EngineError::Deployment("reverted".to_string()).into()),
        FailureStage::Deployment
    );

    let failure = NetworkFailure::new("x", &EngineError::Rpc("down".to_string()).into());
    assert_eq!(failure.error, "RPC error: down");
}

#[test]
fn test_outcome_serialization() {
    let json = serde_json::to_value(failed("polygon")).unwrap();
    assert_eq!(json["status"], "failed");
    assert_eq!(json["networkId"], "polygon");
    assert_eq!(json["stage"], "fork");

    let result = compare("polygon", &[], &[failed("polygon")]);
    let json = serde_json::to_value(&result).unwrap();
    assert_eq!(json["failures"][0]["networkId"], "polygon");
    assert!(json["rankings"].as_array().unwrap().is_empty());
}
