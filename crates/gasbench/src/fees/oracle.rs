use std::{collections::HashMap, future::Future};

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::{
    constants::{data::GAS_PER_BLOB, fees::DEFAULT_L1_NETWORK},
    engine::{ChainFees, ForkClient, RpcForkClient},
    BenchConfig, ConfigError, EngineError, FeeModelError, FeeStrategy, Network, NetworkRegistry,
};

/// Live fee fields a [`FeeStrategy`] is evaluated against, in wei.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FeeTelemetry {
    /// The network the telemetry describes.
    pub network: String,
    /// Base fee per gas of the network.
    pub base_fee: u128,
    /// Execution gas price of the network.
    pub l2_gas_price: u128,
    /// Gas price of the L1 the network posts to.
    pub l1_gas_price: Option<u128>,
    /// Cost of one blob at the current blob base fee.
    pub base_fee_per_blob: Option<u128>,
    /// Current blob gas price.
    pub blob_gas_price: Option<u128>,
}

impl FeeTelemetry {
    /// Telemetry from the network's own fee market, without L1 fields.
    pub fn from_chain(network: impl Into<String>, fees: &ChainFees) -> Self {
        Self {
            network: network.into(),
            base_fee: fees.base_fee.unwrap_or_default(),
            l2_gas_price: fees.gas_price,
            ..Default::default()
        }
    }

    /// Fill the L1 fields from the fee market of the L1.
    pub fn with_l1(mut self, l1: &ChainFees) -> Self {
        self.l1_gas_price = Some(l1.gas_price);
        if let Some(blob_base_fee) = l1.blob_base_fee {
            self.base_fee_per_blob = Some(GAS_PER_BLOB.saturating_mul(blob_base_fee));
            self.blob_gas_price = Some(blob_base_fee);
        }
        self
    }
}

/// Source of fee telemetry.
pub trait FeeOracle: Send + Sync {
    /// Telemetry for `network`, whose fork is reachable through `fork`.
    fn telemetry<C: ForkClient>(
        &self,
        network: &Network,
        fork: &C,
    ) -> impl Future<Output = Result<FeeTelemetry, FeeModelError>> + Send;
}

/// Oracle reading the fork's own fee market, plus the live L1 fee market for rollups.
#[derive(Debug, Clone)]
pub struct RpcFeeOracle<L = RpcForkClient> {
    l1: Option<L>,
}

impl<L> Default for RpcFeeOracle<L> {
    fn default() -> Self {
        Self { l1: None }
    }
}

impl<L> RpcFeeOracle<L> {
    /// Oracle reading L1 fees from `l1`, if any.
    pub const fn new(l1: Option<L>) -> Self {
        Self { l1 }
    }

    /// Whether rollups get L1 telemetry.
    pub const fn has_l1(&self) -> bool {
        self.l1.is_some()
    }
}

impl RpcFeeOracle {
    /// Oracle reading L1 fees from the network named by `fees.l1_network`.
    ///
    /// The default L1 is skipped when a custom registry does not define it; an explicitly
    /// configured L1 must exist.
    pub fn from_config(
        config: &BenchConfig,
        networks: &NetworkRegistry,
    ) -> Result<Self, ConfigError> {
        let Some(id) = &config.fees.l1_network else {
            return Ok(Self::default());
        };
        if id == DEFAULT_L1_NETWORK && networks.get(id).is_none() {
            warn!(network = %id, "default L1 not in registry, L1 data fees disabled");
            return Ok(Self::default());
        }
        let endpoint = networks.resolve(id)?.config.endpoint()?;
        let client = RpcForkClient::connect(&endpoint, config.engine.receipt_timeout())
            .map_err(|err| ConfigError::Invalid(format!("L1 endpoint of {id}: {err}")))?;
        Ok(Self::new(Some(client)))
    }
}

fn oracle_error(err: EngineError) -> FeeModelError {
    FeeModelError::Oracle(err.to_string())
}

impl<L: ForkClient> FeeOracle for RpcFeeOracle<L> {
    async fn telemetry<C: ForkClient>(
        &self,
        network: &Network,
        fork: &C,
    ) -> Result<FeeTelemetry, FeeModelError> {
        let fees = fork.fee_snapshot().await.map_err(oracle_error)?;
        let telemetry = FeeTelemetry::from_chain(network.id(), &fees);
        if !matches!(network.strategy, FeeStrategy::Rollup(_)) {
            return Ok(telemetry);
        }
        let Some(l1) = &self.l1 else {
            debug!(network = %network.id(), "no L1 configured");
            return Ok(telemetry);
        };
        match l1.fee_snapshot().await {
            Ok(l1_fees) => Ok(telemetry.with_l1(&l1_fees)),
            Err(err) => {
                warn!(network = %network.id(), %err, "failed to read L1 fees");
                Ok(telemetry)
            }
        }
    }
}

/// Oracle answering from fixed values.
#[derive(Debug, Clone, Default)]
pub struct StaticFeeOracle {
    fallback: FeeTelemetry,
    networks: HashMap<String, FeeTelemetry>,
}

impl StaticFeeOracle {
    /// Answer `fallback` for every network.
    pub fn new(fallback: FeeTelemetry) -> Self {
        Self { fallback, networks: HashMap::new() }
    }

    /// Answer `telemetry` for `network`.
    pub fn with_network(mut self, network: impl Into<String>, telemetry: FeeTelemetry) -> Self {
        self.networks.insert(network.into(), telemetry);
        self
    }
}

impl FeeOracle for StaticFeeOracle {
    async fn telemetry<C: ForkClient>(
        &self,
        network: &Network,
        _fork: &C,
    ) -> Result<FeeTelemetry, FeeModelError> {
        let telemetry = self.networks.get(network.id()).unwrap_or(&self.fallback);
        Ok(FeeTelemetry { network: network.id().to_string(), ..telemetry.clone() })
    }
}
