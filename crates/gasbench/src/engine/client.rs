use std::{fmt, future::Future, time::Duration};

use alloy_network::{AnyNetwork, AnyTransactionReceipt, ReceiptResponse};
use alloy_primitives::{Address, Bytes, TxHash, U256};
use alloy_provider::{DynProvider, Provider, ProviderBuilder};
use alloy_rpc_types_eth::{BlockNumberOrTag, TransactionRequest};
use alloy_serde::{OtherFields, WithOtherFields};
use serde::{Deserialize, Serialize};

use crate::EngineError;

/// Receipt fields the engine and the fee model care about.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawReceipt {
    /// Transaction hash.
    pub tx_hash: TxHash,
    /// Whether execution succeeded.
    pub success: bool,
    /// Gas used by the transaction.
    pub gas_used: u64,
    /// Price per gas unit actually paid, in wei.
    pub effective_gas_price: u128,
    /// Block the transaction was mined in.
    pub block_number: u64,
    /// Address of the created contract, for deployments.
    pub contract_address: Option<Address>,
    /// L1 data gas, reported by OP stack receipts.
    pub l1_gas_used: Option<u64>,
    /// L1 data fee in wei, reported by OP stack receipts.
    pub l1_fee: Option<u128>,
}

impl RawReceipt {
    fn from_rpc(receipt: &AnyTransactionReceipt) -> Self {
        Self {
            tx_hash: receipt.transaction_hash,
            success: receipt.status(),
            gas_used: receipt.gas_used,
            effective_gas_price: receipt.effective_gas_price,
            block_number: receipt.block_number.unwrap_or_default(),
            contract_address: receipt.contract_address,
            l1_gas_used: other_quantity(&receipt.other, "l1GasUsed"),
            l1_fee: other_quantity(&receipt.other, "l1Fee"),
        }
    }
}

fn other_quantity<T: TryFrom<U256>>(other: &OtherFields, key: &str) -> Option<T> {
    let value = other.get_deserialized::<U256>(key)?.ok()?;
    T::try_from(value).ok()
}

/// Fee market state of the latest block of a chain.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChainFees {
    /// Latest block number.
    pub block_number: u64,
    /// EIP-1559 base fee of the latest block, absent on chains without one.
    pub base_fee: Option<u128>,
    /// Suggested legacy gas price.
    pub gas_price: u128,
    /// Suggested priority fee.
    pub max_priority_fee: Option<u128>,
    /// EIP-4844 blob base fee, absent before Cancun.
    pub blob_base_fee: Option<u128>,
}

/// Everything the engine needs from a fork.
///
/// Implemented by [`RpcForkClient`] against a live fork, and by scripted clients in tests.
pub trait ForkClient: Send + Sync {
    /// Chain id reported by the node.
    fn chain_id(&self) -> impl Future<Output = Result<u64, EngineError>> + Send;

    /// Code deployed at `address`.
    fn code_at(&self, address: Address) -> impl Future<Output = Result<Bytes, EngineError>> + Send;

    /// Set the balance of a dev account.
    fn fund(
        &self,
        account: Address,
        balance: U256,
    ) -> impl Future<Output = Result<(), EngineError>> + Send;

    /// Submit a transaction from an unlocked account and wait for its receipt.
    fn submit(
        &self,
        tx: TransactionRequest,
    ) -> impl Future<Output = Result<RawReceipt, EngineError>> + Send;

    /// Fee market state of the latest block.
    fn fee_snapshot(&self) -> impl Future<Output = Result<ChainFees, EngineError>> + Send;
}

/// JSON-RPC client of a fork (or of any node).
#[derive(Clone)]
pub struct RpcForkClient {
    provider: DynProvider<AnyNetwork>,
    receipt_timeout: Duration,
}

impl fmt::Debug for RpcForkClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RpcForkClient")
            .field("receipt_timeout", &self.receipt_timeout)
            .finish_non_exhaustive()
    }
}

impl RpcForkClient {
    /// Connect to an HTTP JSON-RPC endpoint. No request is made until the client is used.
    pub fn connect(endpoint: &str, receipt_timeout: Duration) -> Result<Self, EngineError> {
        let url = endpoint
            .parse()
            .map_err(|err| EngineError::Rpc(format!("invalid endpoint {endpoint}: {err}")))?;
        let provider = ProviderBuilder::new().network::<AnyNetwork>().connect_http(url).erased();
        Ok(Self { provider, receipt_timeout })
    }

    /// The underlying provider.
    pub const fn provider(&self) -> &DynProvider<AnyNetwork> {
        &self.provider
    }
}

fn rpc_error(err: impl fmt::Display) -> EngineError {
    EngineError::Rpc(err.to_string())
}

impl ForkClient for RpcForkClient {
    async fn chain_id(&self) -> Result<u64, EngineError> {
        self.provider.get_chain_id().await.map_err(rpc_error)
    }

    async fn code_at(&self, address: Address) -> Result<Bytes, EngineError> {
        self.provider.get_code_at(address).await.map_err(rpc_error)
    }

    async fn fund(&self, account: Address, balance: U256) -> Result<(), EngineError> {
        self.provider
            .raw_request::<_, ()>("anvil_setBalance".into(), (account, balance))
            .await
            .map_err(rpc_error)
    }

    async fn submit(&self, tx: TransactionRequest) -> Result<RawReceipt, EngineError> {
        let waited = self.receipt_timeout;
        let sent = self.provider.send_transaction(WithOtherFields::new(tx));
        let pending = tokio::time::timeout(waited, sent)
            .await
            .map_err(|_| EngineError::ReceiptTimeout { tx_hash: None, waited })?
            .map_err(rpc_error)?;
        let tx_hash = *pending.tx_hash();
        let receipt = tokio::time::timeout(waited, pending.get_receipt())
            .await
            .map_err(|_| EngineError::ReceiptTimeout { tx_hash: Some(tx_hash), waited })?
            .map_err(rpc_error)?;
        Ok(RawReceipt::from_rpc(&receipt))
    }

    async fn fee_snapshot(&self) -> Result<ChainFees, EngineError> {
        let block = self
            .provider
            .get_block_by_number(BlockNumberOrTag::Latest)
            .await
            .map_err(rpc_error)?
            .ok_or_else(|| EngineError::Rpc("latest block not available".to_string()))?;
        let gas_price = self.provider.get_gas_price().await.map_err(rpc_error)?;
        let max_priority_fee = self.provider.get_max_priority_fee_per_gas().await.ok();
        let blob_base_fee = self.provider.get_blob_base_fee().await.ok();
        Ok(ChainFees {
            block_number: block.header.number,
            base_fee: block.header.base_fee_per_gas.map(u128::from),
            gas_price,
            max_priority_fee,
            blob_base_fee,
        })
    }
}
