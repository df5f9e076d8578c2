//! Deployment and execution against a fork session.
//!
//! The engine submits real transactions from an unlocked dev account and reports the gas used
//! from the receipts. Calls are executed strictly in caller order; a failing call is recorded
//! and does not stop the batch.

use alloy_json_abi::JsonAbi;
use alloy_network::TransactionBuilder;
use alloy_primitives::{Address, Bytes, U256};
use alloy_rpc_types_eth::{TransactionInput, TransactionRequest};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::{
    CallOutcome, CallSpec, CompiledArtifact, DeploymentReceipt, EngineConfig, EngineError,
    ForkError, ForkSession, FunctionCallError, FunctionCallReceipt,
};

pub mod abi;

mod client;
pub use client::{ChainFees, ForkClient, RawReceipt, RpcForkClient};

/// A call that passed ABI validation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PreparedCall {
    /// Position in the requested batch.
    pub index: usize,
    /// Canonical signature of the resolved overload.
    pub signature: String,
    /// Encoded calldata.
    pub calldata: Bytes,
    /// Wei attached to the call.
    pub value: Option<U256>,
}

/// A call that failed ABI validation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RejectedCall {
    /// Position in the requested batch.
    pub index: usize,
    /// Why it was rejected.
    pub error: FunctionCallError,
}

/// Result of validating a batch of calls before anything is submitted.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CallPlan {
    /// Number of calls requested.
    pub requested: usize,
    /// Calls that can be executed, in caller order.
    pub executable: Vec<PreparedCall>,
    /// Calls that cannot, in caller order.
    pub rejected: Vec<RejectedCall>,
}

impl CallPlan {
    /// Validate `calls` against `abi`.
    pub fn new(abi: &JsonAbi, calls: &[CallSpec]) -> Self {
        let mut plan = Self { requested: calls.len(), ..Default::default() };
        for (index, call) in calls.iter().enumerate() {
            match abi::encode_call(abi, call) {
                Ok((function, calldata)) => plan.executable.push(PreparedCall {
                    index,
                    signature: function.signature(),
                    calldata,
                    value: call.value,
                }),
                Err(error) => plan.rejected.push(RejectedCall { index, error }),
            }
        }
        plan
    }

    /// `N of M calls executable`.
    pub fn summary(&self) -> String {
        format!("{} of {} calls executable", self.executable.len(), self.requested)
    }

    /// Whether every requested call is executable.
    pub fn is_complete(&self) -> bool {
        self.rejected.is_empty()
    }
}

/// Deploys contracts and executes calls through a [`ForkClient`].
#[derive(Debug)]
pub struct ExecutionEngine<C> {
    client: C,
    config: EngineConfig,
}

impl ExecutionEngine<RpcForkClient> {
    /// Engine talking JSON-RPC to `session`.
    pub fn connect(session: &ForkSession, config: EngineConfig) -> Result<Self, ForkError> {
        let client = RpcForkClient::connect(&session.endpoint(), config.receipt_timeout())
            .map_err(|err| ForkError::Connect(err.to_string()))?;
        Ok(Self::new(client, config))
    }
}

impl<C: ForkClient> ExecutionEngine<C> {
    /// Engine over an existing client.
    pub const fn new(client: C, config: EngineConfig) -> Self {
        Self { client, config }
    }

    /// The client.
    pub const fn client(&self) -> &C {
        &self.client
    }

    /// Fund the sender account, unless funding is disabled.
    pub async fn fund_sender(&self) -> Result<(), EngineError> {
        if self.config.funding_balance_wei == 0 {
            return Ok(());
        }
        debug!(
            sender = %self.config.sender,
            balance = self.config.funding_balance_wei,
            "funding sender"
        );
        self.client.fund(self.config.sender, U256::from(self.config.funding_balance_wei)).await
    }

    fn request(&self) -> TransactionRequest {
        let request = TransactionRequest::default().from(self.config.sender);
        match self.config.gas_limit {
            Some(gas_limit) => request.gas_limit(gas_limit),
            None => request,
        }
    }

    /// Deploy `artifact` with the given constructor arguments.
    ///
    /// The artifact is validated before anything is submitted.
    pub async fn deploy(
        &self,
        artifact: &CompiledArtifact,
        constructor_args: &[String],
    ) -> Result<DeploymentReceipt, EngineError> {
        let initcode = abi::encode_deployment(artifact, constructor_args)?;
        let payload_bytes = initcode.len() as u64;
        let tx = self.request().into_create().input(TransactionInput::new(initcode));

        let receipt = self.client.submit(tx).await?;
        if !receipt.success {
            return Err(EngineError::Deployment(format!(
                "{} reverted in {} using {} gas",
                artifact.contract_name, receipt.tx_hash, receipt.gas_used
            )));
        }
        let contract_address = receipt.contract_address.ok_or_else(|| {
            let tx_hash = receipt.tx_hash;
            EngineError::Deployment(format!("receipt of {tx_hash} has no contract address"))
        })?;
        info!(
            contract = %artifact.contract_name,
            %contract_address,
            gas_used = receipt.gas_used,
            "deployed"
        );

        Ok(DeploymentReceipt {
            contract_address,
            gas_used: receipt.gas_used,
            effective_gas_price: receipt.effective_gas_price,
            block_number: receipt.block_number,
            tx_hash: receipt.tx_hash,
            payload_bytes,
        })
    }

    /// Validate a batch before running it.
    ///
    /// With `existing` set, the address must hold code on the fork; otherwise the artifact must
    /// be deployable with `constructor_args`. Individual calls that fail validation are reported
    /// in the plan, not as an error.
    pub async fn validate_calls(
        &self,
        artifact: &CompiledArtifact,
        calls: &[CallSpec],
        constructor_args: &[String],
        existing: Option<Address>,
    ) -> Result<CallPlan, EngineError> {
        match existing {
            Some(address) => {
                if self.client.code_at(address).await?.is_empty() {
                    return Err(EngineError::MissingCode(address));
                }
            }
            None => {
                abi::encode_deployment(artifact, constructor_args)?;
            }
        }
        let plan = CallPlan::new(&artifact.abi, calls);
        if !plan.is_complete() {
            warn!(summary = %plan.summary(), "some calls will fail");
        }
        Ok(plan)
    }

    /// Execute `calls` one after another against `contract`.
    ///
    /// The outcomes are in caller order, one per call.
    pub async fn execute(
        &self,
        contract: Address,
        abi: &JsonAbi,
        calls: &[CallSpec],
    ) -> Vec<CallOutcome> {
        let mut outcomes = Vec::with_capacity(calls.len());
        for call in calls {
            let outcome = match self.execute_one(contract, abi, call).await {
                Ok(receipt) => {
                    debug!(function = %call.function, gas_used = receipt.gas_used, "executed");
                    CallOutcome::Executed(receipt)
                }
                Err(error) => {
                    warn!(%error, "call failed");
                    CallOutcome::Failed { error }
                }
            };
            outcomes.push(outcome);
        }
        outcomes
    }

    async fn execute_one(
        &self,
        contract: Address,
        abi: &JsonAbi,
        call: &CallSpec,
    ) -> Result<FunctionCallReceipt, FunctionCallError> {
        let (_, calldata) = abi::encode_call(abi, call)?;
        let payload_bytes = calldata.len() as u64;
        let mut tx = self.request().to(contract).input(TransactionInput::new(calldata));
        if let Some(value) = call.value {
            tx = tx.value(value);
        }

        let receipt = self.client.submit(tx).await.map_err(|err| FunctionCallError::Transport {
            function: call.function.clone(),
            reason: err.to_string(),
        })?;
        if !receipt.success {
            return Err(FunctionCallError::Reverted {
                function: call.function.clone(),
                tx_hash: receipt.tx_hash,
                gas_used: receipt.gas_used,
            });
        }
        Ok(FunctionCallReceipt {
            function: call.function.clone(),
            gas_used: receipt.gas_used,
            effective_gas_price: receipt.effective_gas_price,
            l1_data_gas: receipt.l1_gas_used,
            tx_hash: receipt.tx_hash,
            payload_bytes,
        })
    }
}
