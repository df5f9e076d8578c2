//! Fee composition.
//!
//! A [`FeeStrategy`] turns measured gas plus fee telemetry into a [`FeeComposition`]: an
//! execution price for every network and, on rollups, the L1 data fee of posting the
//! transaction payload. [`CostBreakdown`] then prices the result in the native token and in USD.
//!
//! Nothing here talks to a network. Telemetry comes from a [`FeeOracle`], token prices from a
//! [`PriceFeed`].

use serde::{Deserialize, Serialize};

use crate::{
    constants::{
        data::BLOB_SIZE_BYTES,
        units::{GWEI_TO_NATIVE, WEI_PER_GWEI, WEI_TO_NATIVE},
    },
    DataPosting, FeeModelError, FeeStrategy,
};

mod oracle;
pub use oracle::{FeeOracle, FeeTelemetry, RpcFeeOracle, StaticFeeOracle};

mod price;
pub use price::{PriceFeed, StaticPriceFeed};

/// Gas measured for one transaction.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GasUsage {
    /// Gas used, from the receipt.
    pub gas_used: u64,
    /// Price per gas unit actually paid on the fork, in wei.
    pub effective_gas_price: u128,
    /// Size of the submitted payload (calldata or initcode).
    pub payload_bytes: u64,
}

/// Per-transaction fee components, in wei.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FeeComposition {
    /// Base fee per gas.
    pub base_fee: u128,
    /// Priority fee per gas.
    pub priority_fee: u128,
    /// Fee cap per gas, `2 * base + priority`.
    pub max_fee_per_gas: u128,
    /// Price per gas used to price execution.
    pub gas_price: u128,
    /// Cost of posting the payload to the L1. `None` on single-market networks, and on rollups
    /// whose L1 telemetry was unavailable.
    pub l1_data_fee: Option<u128>,
}

impl FeeComposition {
    /// Execution fee of `gas_used` gas.
    pub const fn execution_fee(&self, gas_used: u64) -> u128 {
        (gas_used as u128).saturating_mul(self.gas_price)
    }

    /// Execution fee plus the L1 data fee, if any.
    pub fn total_fee(&self, gas_used: u64) -> u128 {
        self.execution_fee(gas_used).saturating_add(self.l1_data_fee.unwrap_or_default())
    }
}

/// Number of blobs needed to post `payload_bytes` bytes.
pub const fn required_blobs(payload_bytes: u64) -> u64 {
    payload_bytes.div_ceil(BLOB_SIZE_BYTES)
}

/// Execution-only composition: the single-market model.
///
/// Execution is priced at the effective gas price of the receipt. The priority fee is that
/// price above the base fee, never negative.
pub fn execution_fees(usage: &GasUsage, telemetry: &FeeTelemetry) -> FeeComposition {
    priced_at(usage.effective_gas_price, telemetry.base_fee)
}

fn priced_at(gas_price: u128, base_fee: u128) -> FeeComposition {
    let priority_fee = gas_price.saturating_sub(base_fee);
    FeeComposition {
        base_fee,
        priority_fee,
        max_fee_per_gas: base_fee.saturating_mul(2).saturating_add(priority_fee),
        gas_price,
        l1_data_fee: None,
    }
}

/// L1 data fee of posting `payload_bytes` bytes.
pub fn l1_data_fee(
    posting: DataPosting,
    payload_bytes: u64,
    telemetry: &FeeTelemetry,
) -> Result<u128, FeeModelError> {
    let missing = |field: &str| FeeModelError::MissingTelemetry {
        network: telemetry.network.clone(),
        field: field.to_string(),
    };
    match posting {
        DataPosting::Blob => {
            let base_fee_per_blob =
                telemetry.base_fee_per_blob.ok_or_else(|| missing("baseFeePerBlob"))?;
            let blob_gas_price = telemetry.blob_gas_price.ok_or_else(|| missing("blobGasPrice"))?;
            Ok(u128::from(required_blobs(payload_bytes))
                .saturating_mul(base_fee_per_blob.saturating_add(blob_gas_price)))
        }
        DataPosting::Calldata { gas_per_byte } => {
            let l1_gas_price = telemetry.l1_gas_price.ok_or_else(|| missing("l1GasPrice"))?;
            Ok(u128::from(payload_bytes)
                .saturating_mul(u128::from(gas_per_byte))
                .saturating_mul(l1_gas_price))
        }
    }
}

/// Compose the fees of one transaction under `strategy`.
///
/// Single-market networks price execution at the effective gas price. Rollups price it at the
/// L2 gas price and add the L1 data fee of the payload.
///
/// Fails only when a rollup's L1 telemetry is missing; callers degrade to
/// [`execution_fees`] and record the error.
pub fn compose_fees(
    strategy: FeeStrategy,
    usage: &GasUsage,
    telemetry: &FeeTelemetry,
) -> Result<FeeComposition, FeeModelError> {
    match strategy {
        FeeStrategy::SingleMarket => Ok(execution_fees(usage, telemetry)),
        FeeStrategy::Rollup(posting) => {
            let l1_data_fee = l1_data_fee(posting, usage.payload_bytes, telemetry)?;
            Ok(FeeComposition {
                l1_data_fee: Some(l1_data_fee),
                ..priced_at(telemetry.l2_gas_price, telemetry.base_fee)
            })
        }
    }
}

/// USD cost of `gas_used` gas at `gas_price_gwei`, given the token price.
pub fn cost_usd(gas_used: u64, gas_price_gwei: f64, token_price_usd: f64) -> f64 {
    gas_used as f64 * gas_price_gwei * GWEI_TO_NATIVE * token_price_usd
}

/// USD value of an amount of wei.
pub fn wei_to_usd(wei: u128, token_price_usd: f64) -> f64 {
    wei as f64 * WEI_TO_NATIVE * token_price_usd
}

/// Wei to gwei, for display.
pub fn wei_to_gwei(wei: u128) -> f64 {
    wei as f64 / WEI_PER_GWEI
}

/// Priced fees of one transaction.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CostBreakdown {
    /// Gas used.
    pub gas_used: u64,
    /// Fee components.
    pub fees: FeeComposition,
    /// Execution fee in wei.
    pub execution_fee_wei: u128,
    /// Total fee in wei, including the L1 data fee when known.
    pub total_fee_wei: u128,
    /// Execution cost in USD, `None` without a token price.
    pub execution_cost_usd: Option<f64>,
    /// L1 data cost in USD, `None` without a token price or without an L1 data fee.
    pub l1_data_cost_usd: Option<f64>,
    /// Total cost in USD, `None` without a token price.
    pub total_cost_usd: Option<f64>,
}

impl CostBreakdown {
    /// Price `fees` for `gas_used` gas.
    pub fn new(gas_used: u64, fees: FeeComposition, token_price_usd: Option<f64>) -> Self {
        let execution_fee_wei = fees.execution_fee(gas_used);
        let execution_cost_usd =
            token_price_usd.map(|price| cost_usd(gas_used, wei_to_gwei(fees.gas_price), price));
        let l1_data_cost_usd =
            token_price_usd.zip(fees.l1_data_fee).map(|(price, fee)| wei_to_usd(fee, price));
        let total_cost_usd =
            execution_cost_usd.map(|execution| execution + l1_data_cost_usd.unwrap_or_default());
        Self {
            gas_used,
            fees,
            execution_fee_wei,
            total_fee_wei: fees.total_fee(gas_used),
            execution_cost_usd,
            l1_data_cost_usd,
            total_cost_usd,
        }
    }
}
