//! Tests for deployment and call execution against a scripted fork.

use std::{sync::Arc, time::Duration};

use alloy_json_abi::JsonAbi;
use alloy_primitives::{Address, Bytes, TxKind, U256};
use gasbench::{
    constants::engine::DEFAULT_SENDER,
    test_utils::*,
    CallOutcome, CallSpec, CompiledArtifact, EngineConfig, EngineError, ExecutionEngine,
    FunctionCallError,
};

fn engine(client: &ScriptedClient) -> ExecutionEngine<ScriptedClient> {
    ExecutionEngine::new(client.clone(), EngineConfig::default())
}

fn call(function: &str, args: &[&str]) -> CallSpec {
    CallSpec::new(function, args.iter().copied())
}

#[tokio::test]
async fn test_deploy_appends_constructor_args() {
    let client = ScriptedClient::new(1);
    let artifact = counter_artifact();
    let receipt = engine(&client).deploy(&artifact, &["7".to_string()]).await.unwrap();

    assert_eq!(receipt.contract_address, DEPLOYED_ADDRESS);
    assert_eq!(receipt.payload_bytes, artifact.bytecode.len() as u64 + 32);
    assert_eq!(receipt.gas_used, scripted_gas(artifact.bytecode.len() + 32));

    let submitted = client.submitted();
    assert_eq!(submitted.len(), 1);
    assert_eq!(submitted[0].to, Some(TxKind::Create));
    assert_eq!(submitted[0].from, Some(DEFAULT_SENDER));
    let input = submitted[0].input.input().cloned().unwrap_or_default();
    assert_eq!(&input[..artifact.bytecode.len()], &artifact.bytecode[..]);
    assert_eq!(U256::from_be_slice(&input[artifact.bytecode.len()..]), U256::from(7));
}

#[tokio::test]
async fn test_deploy_rejects_invalid_artifacts_without_submitting() {
    let client = ScriptedClient::new(1);
    let empty = CompiledArtifact::new(
        "Empty",
        Bytes::new(),
        JsonAbi::default(),
        "0.8.26",
        Default::default(),
    );
    assert!(matches!(
        engine(&client).deploy(&empty, &[]).await,
        Err(EngineError::InvalidArtifact(_))
    ));

    // The constructor takes one argument.
    assert!(matches!(
        engine(&client).deploy(&counter_artifact(), &[]).await,
        Err(EngineError::InvalidArtifact(_))
    ));
    assert!(matches!(
        engine(&client).deploy(&counter_artifact(), &["not a number".to_string()]).await,
        Err(EngineError::InvalidArtifact(_))
    ));
    assert!(client.submitted().is_empty());
}

#[tokio::test]
async fn test_reverted_deployment() {
    let client = ScriptedClient::new(1);
    client.queue(Ok(gasbench::engine::RawReceipt {
        tx_hash: Default::default(),
        success: false,
        gas_used: 30_000,
        effective_gas_price: 1,
        block_number: 1,
        contract_address: None,
        l1_gas_used: None,
        l1_fee: None,
    }));
    assert!(matches!(
        engine(&client).deploy(&counter_artifact(), &["1".to_string()]).await,
        Err(EngineError::Deployment(_))
    ));
}

#[tokio::test]
async fn test_execute_preserves_order() {
    let client = ScriptedClient::new(1);
    let artifact = counter_artifact();
    let calls = [call("setNumber", &["5"]), call("increment", &[]), call("number", &[])];
    let outcomes = engine(&client).execute(DEPLOYED_ADDRESS, &artifact.abi, &calls).await;

    let functions: Vec<_> = outcomes.iter().map(CallOutcome::function).collect();
    assert_eq!(functions, ["setNumber", "increment", "number"]);
    assert!(outcomes.iter().all(CallOutcome::is_success));

    let submitted = client.submitted();
    assert_eq!(submitted.len(), 3);
    assert!(submitted.iter().all(|tx| tx.to == Some(TxKind::Call(DEPLOYED_ADDRESS))));
    // Receipts are matched to their own transaction.
    let hashes: Vec<_> = outcomes.iter().map(|o| o.receipt().unwrap().tx_hash[31]).collect();
    assert_eq!(hashes, [1, 2, 3]);
    assert_eq!(outcomes[0].receipt().unwrap().payload_bytes, 36);
    assert_eq!(outcomes[1].receipt().unwrap().gas_used, scripted_gas(4));
}

#[tokio::test]
async fn test_execute_is_sequential_under_uneven_latency() {
    // The first receipt is slow, the others are immediate.
    let client = ScriptedClient::new(1).with_latencies([
        Duration::from_millis(200),
        Duration::ZERO,
        Duration::from_millis(50),
    ]);
    let artifact = counter_artifact();
    let calls = [call("setNumber", &["9"]), call("increment", &[]), call("number", &[])];
    let outcomes = engine(&client).execute(DEPLOYED_ADDRESS, &artifact.abi, &calls).await;

    let functions: Vec<_> = outcomes.iter().map(CallOutcome::function).collect();
    assert_eq!(functions, ["setNumber", "increment", "number"]);
    let hashes: Vec<_> = outcomes.iter().map(|o| o.receipt().unwrap().tx_hash[31]).collect();
    assert_eq!(hashes, [1, 2, 3]);
    assert_eq!(client.max_in_flight(), 1);

    let payloads: Vec<_> =
        client.submitted().iter().map(|tx| tx.input.input().unwrap().len()).collect();
    assert_eq!(payloads, [36, 4, 4]);
}

#[tokio::test]
async fn test_failed_calls_do_not_abort_the_batch() {
    let client = ScriptedClient::new(1).reverting("fail()");
    let artifact = counter_artifact();
    let calls = [
        call("increment", &[]),
        call("fail", &[]),
        call("missing", &[]),
        call("increment", &[]),
    ];
    let outcomes = engine(&client).execute(DEPLOYED_ADDRESS, &artifact.abi, &calls).await;

    assert_eq!(outcomes.len(), 4);
    assert!(outcomes[0].is_success());
    assert!(matches!(
        &outcomes[1],
        CallOutcome::Failed { error: FunctionCallError::Reverted { function, .. } }
            if function == "fail"
    ));
    assert!(matches!(
        &outcomes[2],
        CallOutcome::Failed { error: FunctionCallError::UnknownFunction { .. } }
    ));
    assert!(outcomes[3].is_success());
    // The unknown function was never submitted.
    assert_eq!(client.submitted().len(), 3);
}

#[tokio::test]
async fn test_transport_errors_are_recorded() {
    let client = ScriptedClient::new(1);
    client.queue(Err(EngineError::Rpc("connection reset".to_string())));
    let artifact = counter_artifact();
    let outcomes = engine(&client)
        .execute(DEPLOYED_ADDRESS, &artifact.abi, &[call("increment", &[]), call("increment", &[])])
        .await;
    assert!(matches!(
        &outcomes[0],
        CallOutcome::Failed { error: FunctionCallError::Transport { reason, .. } }
            if reason.contains("connection reset")
    ));
    assert!(outcomes[1].is_success());
}

#[tokio::test]
async fn test_validate_calls() {
    let client = ScriptedClient::new(1);
    let artifact = counter_artifact();
    let calls = [
        call("increment", &[]),
        call("setNumber", &[]),
        call("nope", &[]),
        call("setNumber", &["x"]),
    ];
    let plan = engine(&client)
        .validate_calls(&artifact, &calls, &["1".to_string()], None)
        .await
        .unwrap();

    assert_eq!(plan.summary(), "1 of 4 calls executable");
    assert!(!plan.is_complete());
    assert_eq!(plan.executable[0].signature, "increment()");
    let rejected: Vec<_> = plan.rejected.iter().map(|r| r.index).collect();
    assert_eq!(rejected, [1, 2, 3]);
    assert!(matches!(
        &plan.rejected[0].error,
        FunctionCallError::ArityMismatch { expected, got: 0, .. } if expected == &[1]
    ));
    assert!(matches!(&plan.rejected[2].error, FunctionCallError::InvalidArgument { index: 0, .. }));
    assert!(client.submitted().is_empty());
}

#[tokio::test]
async fn test_validate_existing_contract() {
    let deployed = Address::repeat_byte(0x42);
    let client = ScriptedClient::new(1).with_code(deployed, Bytes::from_static(&[0x60, 0x00]));
    let artifact = Arc::new(CompiledArtifact::new(
        "Remote",
        Bytes::new(),
        counter_artifact().abi.clone(),
        "",
        Default::default(),
    ));

    // Empty bytecode is fine when nothing is deployed.
    let plan = engine(&client)
        .validate_calls(&artifact, &[call("increment", &[])], &[], Some(deployed))
        .await
        .unwrap();
    assert!(plan.is_complete());

    let missing = Address::repeat_byte(0x43);
    assert!(matches!(
        engine(&client).validate_calls(&artifact, &[], &[], Some(missing)).await,
        Err(EngineError::MissingCode(address)) if address == missing
    ));
}

#[tokio::test]
async fn test_sender_funding() {
    let client = ScriptedClient::new(1);
    engine(&client).fund_sender().await.unwrap();
    let balance = U256::from(EngineConfig::default().funding_balance_wei);
    assert_eq!(client.funded(), [(DEFAULT_SENDER, balance)]);

    let unfunded = ScriptedClient::new(1);
    let config = EngineConfig { funding_balance_wei: 0, ..Default::default() };
    ExecutionEngine::new(unfunded.clone(), config).fund_sender().await.unwrap();
    assert!(unfunded.funded().is_empty());
}

#[tokio::test]
async fn test_fixed_gas_limit_and_value() {
    let client = ScriptedClient::new(1);
    let config = EngineConfig { gas_limit: Some(500_000), ..Default::default() };
    let artifact = counter_artifact();
    let paid = call("increment", &[]).with_value(U256::from(3));
    ExecutionEngine::new(client.clone(), config)
        .execute(DEPLOYED_ADDRESS, &artifact.abi, &[paid])
        .await;

    let submitted = client.submitted();
    assert_eq!(submitted[0].gas, Some(500_000));
    assert_eq!(submitted[0].value, Some(U256::from(3)));
}
