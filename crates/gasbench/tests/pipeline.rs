//! End-to-end tests of the benchmark service over placeholder forks and scripted clients.
#![cfg(unix)]

use std::sync::Arc;

use alloy_primitives::{Address, Bytes};
use gasbench::{
    constants::data::GAS_PER_BLOB,
    fees::FeeTelemetry,
    test_utils::*,
    BenchmarkRequest, BenchmarkService, CallSpec, ConfigError, EngineConfig, Error, FailureStage,
    FeeModelError, NetworkOutcome, NetworkRegistry, SessionKey, StaticFeeOracle, StaticPriceFeed,
};

const GWEI: u128 = 1_000_000_000;

type Service = BenchmarkService<ProcessBackend, StaticFeeOracle, StaticPriceFeed>;

fn telemetry() -> FeeTelemetry {
    FeeTelemetry {
        network: String::new(),
        base_fee: GWEI / 2,
        l2_gas_price: GWEI / 100,
        l1_gas_price: Some(20 * GWEI),
        base_fee_per_blob: Some(GAS_PER_BLOB),
        blob_gas_price: Some(1),
    }
}

fn service_with(backend: ProcessBackend, oracle: StaticFeeOracle) -> Service {
    BenchmarkService::new(
        backend,
        Arc::new(NetworkRegistry::builtin()),
        fork_config(),
        EngineConfig::default(),
        oracle,
        StaticPriceFeed::new([("ETH".to_string(), 2_000.0)]),
    )
}

fn service(backend: ProcessBackend) -> Service {
    service_with(backend, StaticFeeOracle::new(telemetry()))
}

fn counter_request(network_id: &str) -> BenchmarkRequest {
    BenchmarkRequest::new(network_id, counter_artifact())
        .with_constructor_args(vec!["1".to_string()])
        .with_calls(vec![
            CallSpec::new("increment", Vec::<String>::new()),
            CallSpec::new("setNumber", ["5"]),
            CallSpec::new("increment", Vec::<String>::new()),
        ])
}

#[tokio::test(flavor = "multi_thread")]
async fn test_single_network_run() {
    let service = service(ProcessBackend::healthy());
    let result =
        service.run_live_benchmark(&counter_request("ethereum").at_block(100)).await.unwrap();

    assert_eq!(result.network_id, "ethereum");
    assert_eq!(result.chain_id, 1);
    assert_eq!(result.fork_block, Some(100));
    assert_eq!(result.contract_address, DEPLOYED_ADDRESS);
    assert!(result.warnings.is_empty());
    assert_eq!(result.plan.summary(), "3 of 3 calls executable");
    assert_eq!(result.successful_calls(), 3);

    let deployment = result.deployment.as_ref().unwrap();
    let expected_gas = deployment.receipt.gas_used + 2 * scripted_gas(4) + scripted_gas(36);
    assert_eq!(result.total_gas_used, expected_gas);
    // Single market: every transaction at the 1 gwei effective price.
    assert_eq!(result.total_fee_wei, u128::from(expected_gas) * GWEI);
    let usd = expected_gas as f64 * 1e-9 * 2_000.0;
    assert!((result.total_cost_usd.unwrap() - usd).abs() < 1e-9);

    let costs = result.function_costs_usd();
    assert_eq!(
        costs.keys().map(String::as_str).collect::<Vec<_>>(),
        ["deployment", "increment", "setNumber"]
    );

    // The fork is gone once the run returns.
    assert!(service.list_active_sessions().is_empty());
    assert_eq!(service.forks().ports().reserved_count(), 0);
    assert_eq!(service.forks().backend().client("ethereum", 1).funded().len(), 1);
}

#[tokio::test(flavor = "multi_thread")]
async fn test_runs_across_networks_and_ranks() {
    let service = service(ProcessBackend::healthy().failing("optimism"));
    let request = counter_request("ethereum");
    let requests = [request.clone(), request.on("base"), request.on("optimism")];

    let outcomes = service.run_across(&requests).await.unwrap();
    let statuses: Vec<_> = outcomes
        .iter()
        .map(|outcome| (outcome.network_id(), matches!(outcome, NetworkOutcome::Succeeded(_))))
        .collect();
    assert_eq!(statuses, [("ethereum", true), ("base", true), ("optimism", false)]);
    let NetworkOutcome::Failed(failure) = &outcomes[2] else { unreachable!() };
    assert_eq!(failure.stage, FailureStage::Fork);

    let comparison = service
        .compare_networks("ethereum", &["base".to_string(), "optimism".to_string()], &outcomes)
        .unwrap();
    let order: Vec<_> = comparison.rankings.iter().map(|r| r.network_id.as_str()).collect();
    // The rollup executes at a hundredth of the price and posts one cheap blob per transaction.
    assert_eq!(order, ["base", "ethereum"]);
    assert!(comparison.rankings[0].baseline_delta.unwrap().discount_usd > 0.0);
    assert_eq!(comparison.attempted, ["ethereum", "base", "optimism"]);
    assert_eq!(comparison.succeeded, ["ethereum", "base"]);
    assert_eq!(comparison.failures.len(), 1);
    assert_eq!(comparison.failures[0].network_id, "optimism");

    let NetworkOutcome::Succeeded(base) = &outcomes[1] else { unreachable!() };
    let deployment = base.deployment.as_ref().unwrap();
    assert_eq!(deployment.cost.fees.gas_price, GWEI / 100);
    assert_eq!(deployment.cost.fees.l1_data_fee, Some(GAS_PER_BLOB + 1));

    assert!(service.list_active_sessions().is_empty());
    assert_eq!(service.forks().ports().reserved_count(), 0);
}

#[tokio::test(flavor = "multi_thread")]
async fn test_unknown_network_fails_before_spawning() {
    let service = service(ProcessBackend::healthy());
    let request = counter_request("ethereum");
    let err = service.run_across(&[request.clone(), request.on("solana")]).await.unwrap_err();

    assert!(matches!(
        err,
        Error::Config(ConfigError::UnsupportedNetwork(ref id)) if id == "solana"
    ));
    assert!(service.forks().backend().launches().is_empty());

    assert!(matches!(
        service.compare_networks("ethereum", &["solana".to_string()], &[]),
        Err(Error::Config(ConfigError::UnsupportedNetwork(_)))
    ));
}

#[tokio::test(flavor = "multi_thread")]
async fn test_missing_price_is_a_warning() {
    let service = service(ProcessBackend::healthy());
    let result = service.run_live_benchmark(&counter_request("polygon")).await.unwrap();

    assert_eq!(result.warnings, [FeeModelError::MissingTokenPrice { token: "POL".to_string() }]);
    assert_eq!(result.token_price_usd, None);
    assert_eq!(result.total_cost_usd, None);
    assert!(result.total_fee_wei > 0);
    assert_eq!(result.successful_calls(), 3);
    assert!(result.function_costs_usd().is_empty());
}

#[tokio::test(flavor = "multi_thread")]
async fn test_missing_l1_telemetry_falls_back_to_execution() {
    let bare = FeeTelemetry {
        l1_gas_price: None,
        base_fee_per_blob: None,
        blob_gas_price: None,
        ..telemetry()
    };
    let service = service_with(ProcessBackend::healthy(), StaticFeeOracle::new(bare));
    let result = service.run_live_benchmark(&counter_request("base")).await.unwrap();

    // One warning, although every transaction hit it.
    assert_eq!(
        result.warnings,
        [FeeModelError::MissingTelemetry {
            network: "base".to_string(),
            field: "baseFeePerBlob".to_string(),
        }]
    );
    let deployment = result.deployment.as_ref().unwrap();
    assert_eq!(deployment.cost.fees.l1_data_fee, None);
    assert_eq!(deployment.cost.fees.gas_price, GWEI);
    assert!(result.total_cost_usd.is_some());
}

#[tokio::test(flavor = "multi_thread")]
async fn test_reverted_call_does_not_fail_the_run() {
    let backend = ProcessBackend::healthy()
        .with_client("ethereum", ScriptedClient::new(1).reverting("fail()"));
    let service = service(backend);
    let request = counter_request("ethereum").with_calls(vec![
        CallSpec::new("increment", Vec::<String>::new()),
        CallSpec::new("fail", Vec::<String>::new()),
        CallSpec::new("unknown", Vec::<String>::new()),
    ]);
    let result = service.run_live_benchmark(&request).await.unwrap();

    assert_eq!(result.plan.summary(), "2 of 3 calls executable");
    assert_eq!(result.calls.len(), 3);
    assert_eq!(result.successful_calls(), 1);
    assert!(result.calls[1].cost.is_none());
    let deployment_gas = result.deployment.as_ref().unwrap().receipt.gas_used;
    assert_eq!(result.total_gas_used, deployment_gas + scripted_gas(4));
}

#[tokio::test(flavor = "multi_thread")]
async fn test_existing_contract() {
    let deployed = Address::repeat_byte(0x42);
    let client = ScriptedClient::new(1).with_code(deployed, Bytes::from_static(&[0x60, 0x00]));
    let service = service(ProcessBackend::healthy().with_client("ethereum", client.clone()));

    let request = counter_request("ethereum").with_constructor_args(Vec::new()).against(deployed);
    let result = service.run_live_benchmark(&request).await.unwrap();
    assert_eq!(result.contract_address, deployed);
    assert!(result.deployment.is_none());
    assert_eq!(client.submitted().len(), 3);

    let missing = counter_request("ethereum").against(Address::repeat_byte(0x43));
    let outcomes = service.run_across(&[missing]).await.unwrap();
    let NetworkOutcome::Failed(failure) = &outcomes[0] else { unreachable!() };
    assert_eq!(failure.stage, FailureStage::Deployment);
    // The session is torn down on failure too.
    assert!(service.list_active_sessions().is_empty());
}

#[tokio::test(flavor = "multi_thread")]
async fn test_session_management() {
    let service = service(ProcessBackend::healthy());
    let first = service.forks().create("ethereum", None).await.unwrap();
    let second = service.forks().create("arbitrum", None).await.unwrap();
    assert_eq!(service.list_active_sessions().len(), 2);

    service.cleanup_session(&first.key()).await.unwrap();
    service.cleanup_session(&first.key()).await.unwrap();
    service.cleanup_session(&SessionKey::new("ethereum", 1)).await.unwrap();
    assert_eq!(service.list_active_sessions(), [second.clone()]);

    let report = service.cleanup_all().await;
    assert_eq!(report.stopped, [second.key()]);
    assert!(service.list_active_sessions().is_empty());
    assert!(service.cleanup_all().await.stopped.is_empty());
}

#[test]
fn test_analyze_bytecode() {
    let service = service(ProcessBackend::healthy());
    let report = service.analyze_bytecode("0x6080604052").unwrap();
    assert_eq!(report.size.bytes, 5);
    assert!(matches!(service.analyze_bytecode("0x123"), Err(Error::Analyzer(_))));
}
