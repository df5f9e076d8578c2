use std::{fmt, time::SystemTime};

use alloy_primitives::{Address, TxHash, U256};
use serde::{Deserialize, Serialize};

use crate::{constants::fork::LOCAL_HOST, FunctionCallError};

/// Identity of a fork session: the network it forks and the local port it listens on.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionKey {
    /// Registry id of the forked network.
    pub network_id: String,
    /// Local RPC port.
    pub port: u16,
}

impl SessionKey {
    /// Create a new session key.
    pub fn new(network_id: impl Into<String>, port: u16) -> Self {
        Self { network_id: network_id.into(), port }
    }
}

impl fmt::Display for SessionKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}@{}", self.network_id, self.port)
    }
}

/// An isolated local instance of a network's state.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ForkSession {
    /// Registry id of the forked network.
    pub network_id: String,
    /// Chain id reported by the fork.
    pub chain_id: u64,
    /// Local RPC port.
    pub port: u16,
    /// The pinned fork block, `None` when forked at the latest block.
    pub block_number: Option<u64>,
    /// Whether the fork process was running when this snapshot was taken.
    pub alive: bool,
    /// When the session became healthy.
    pub created_at: SystemTime,
}

impl ForkSession {
    /// The registry key of this session.
    pub fn key(&self) -> SessionKey {
        SessionKey::new(self.network_id.clone(), self.port)
    }

    /// The local JSON-RPC endpoint of the fork.
    pub fn endpoint(&self) -> String {
        local_endpoint(self.port)
    }
}

/// The local JSON-RPC endpoint for a port.
pub fn local_endpoint(port: u16) -> String {
    format!("http://{LOCAL_HOST}:{port}")
}

/// A function call requested by the caller. Arguments are strings coerced with the ABI types.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CallSpec {
    /// Function name; overloads are resolved by arity.
    pub function: String,
    /// Arguments, one per parameter.
    #[serde(default)]
    pub args: Vec<String>,
    /// Wei attached to the call.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<U256>,
}

impl CallSpec {
    /// A call with the given arguments and no value.
    pub fn new<S: Into<String>>(
        function: impl Into<String>,
        args: impl IntoIterator<Item = S>,
    ) -> Self {
        let args = args.into_iter().map(Into::into).collect();
        Self { function: function.into(), args, value: None }
    }

    /// Attach a value to the call.
    pub fn with_value(mut self, value: U256) -> Self {
        self.value = Some(value);
        self
    }
}

/// Receipt data of a successful deployment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeploymentReceipt {
    /// Address of the deployed contract.
    pub contract_address: Address,
    /// Gas used by the deployment.
    pub gas_used: u64,
    /// Price per gas unit actually paid, in wei.
    pub effective_gas_price: u128,
    /// Block the deployment was mined in.
    pub block_number: u64,
    /// Deployment transaction hash.
    pub tx_hash: TxHash,
    /// Size of the submitted initcode (bytecode plus encoded constructor arguments).
    pub payload_bytes: u64,
}

/// Receipt data of one executed function call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FunctionCallReceipt {
    /// The called function.
    pub function: String,
    /// Gas used by the call.
    pub gas_used: u64,
    /// Price per gas unit actually paid, in wei.
    pub effective_gas_price: u128,
    /// L1 data gas reported by the fork, on networks whose receipts carry it.
    pub l1_data_gas: Option<u64>,
    /// Call transaction hash.
    pub tx_hash: TxHash,
    /// Size of the submitted calldata.
    pub payload_bytes: u64,
}

/// Outcome of one requested call, in caller order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "camelCase")]
pub enum CallOutcome {
    /// The call was mined successfully.
    Executed(FunctionCallReceipt),
    /// The call failed; later calls still ran.
    Failed {
        /// Why it failed.
        error: FunctionCallError,
    },
}

impl CallOutcome {
    /// The function this outcome belongs to.
    pub fn function(&self) -> &str {
        match self {
            Self::Executed(receipt) => &receipt.function,
            Self::Failed { error } => error.function(),
        }
    }

    /// The receipt, if the call succeeded.
    pub const fn receipt(&self) -> Option<&FunctionCallReceipt> {
        match self {
            Self::Executed(receipt) => Some(receipt),
            Self::Failed { .. } => None,
        }
    }

    /// Whether the call succeeded.
    pub const fn is_success(&self) -> bool {
        matches!(self, Self::Executed(_))
    }
}
