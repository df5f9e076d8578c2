//! Configuration for the benchmark service.
//!
//! Everything is loaded from a single TOML document. Omitted sections fall back to defaults and
//! omitted `[[networks]]` fall back to the built-in registry.

use std::{collections::HashMap, ops::RangeInclusive, path::Path, time::Duration};

use alloy_primitives::Address;
use serde::{Deserialize, Serialize};

use crate::{
    builtin_networks,
    constants::{engine, fees, fork},
    ConfigError, NetworkConfig, NetworkRegistry,
};

/// Top level configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct BenchConfig {
    /// Fork session settings.
    pub fork: ForkConfig,
    /// Execution engine settings.
    pub engine: EngineConfig,
    /// Fee oracle settings.
    pub fees: FeeConfig,
    /// Networks; the built-in set is used when empty.
    pub networks: Vec<NetworkConfig>,
    /// USD price per native token, keyed by price feed key (e.g. `ETH = 3500.0`).
    pub prices: HashMap<String, f64>,
}

impl BenchConfig {
    /// Parse a TOML document.
    pub fn from_toml(source: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(source)?;
        config.validate()?;
        Ok(config)
    }

    /// Read and parse a TOML file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let source = std::fs::read_to_string(path)
            .map_err(|source| ConfigError::Read { path: path.to_path_buf(), source })?;
        Self::from_toml(&source)
    }

    /// Build the network registry described by this configuration.
    pub fn registry(&self) -> Result<NetworkRegistry, ConfigError> {
        if self.networks.is_empty() {
            NetworkRegistry::new(builtin_networks())
        } else {
            NetworkRegistry::new(self.networks.clone())
        }
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.fork.port_range_start > self.fork.port_range_end {
            return Err(ConfigError::Invalid(format!(
                "fork port range {}..={} is empty",
                self.fork.port_range_start, self.fork.port_range_end
            )));
        }
        let invalid_price =
            self.prices.iter().find(|(_, price)| !price.is_finite() || **price < 0.0);
        if let Some((token, price)) = invalid_price {
            return Err(ConfigError::Invalid(format!(
                "price of {token} must be non-negative, got {price}"
            )));
        }
        Ok(())
    }
}

/// Fork session settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ForkConfig {
    /// Program used to spawn forks.
    pub anvil_path: String,
    /// Extra arguments passed to every fork process.
    pub extra_args: Vec<String>,
    /// First port of the reserved range.
    pub port_range_start: u16,
    /// Last port of the reserved range (inclusive).
    pub port_range_end: u16,
    /// Bound on the time a fork may take to become healthy.
    pub startup_timeout_ms: u64,
    /// Delay between liveness probes.
    pub probe_interval_ms: u64,
    /// Grace period between the terminate signal and the forced kill.
    pub shutdown_grace_ms: u64,
}

impl Default for ForkConfig {
    fn default() -> Self {
        Self {
            anvil_path: "anvil".to_string(),
            extra_args: Vec::new(),
            port_range_start: fork::PORT_RANGE_START,
            port_range_end: fork::PORT_RANGE_END,
            startup_timeout_ms: fork::STARTUP_TIMEOUT_MS,
            probe_interval_ms: fork::PROBE_INTERVAL_MS,
            shutdown_grace_ms: fork::SHUTDOWN_GRACE_MS,
        }
    }
}

impl ForkConfig {
    /// The reserved port range.
    pub const fn port_range(&self) -> RangeInclusive<u16> {
        self.port_range_start..=self.port_range_end
    }

    /// Startup timeout as a [`Duration`].
    pub const fn startup_timeout(&self) -> Duration {
        Duration::from_millis(self.startup_timeout_ms)
    }

    /// Probe interval as a [`Duration`].
    pub const fn probe_interval(&self) -> Duration {
        Duration::from_millis(self.probe_interval_ms)
    }

    /// Shutdown grace period as a [`Duration`].
    pub const fn shutdown_grace(&self) -> Duration {
        Duration::from_millis(self.shutdown_grace_ms)
    }
}

/// Execution engine settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct EngineConfig {
    /// Dev account every transaction is sent from.
    pub sender: Address,
    /// Balance the sender is funded with on each fork, in wei. `0` skips funding.
    pub funding_balance_wei: u128,
    /// Bound on the wait for each receipt.
    pub receipt_timeout_ms: u64,
    /// Fixed gas limit for every transaction; estimated by the fork when unset.
    pub gas_limit: Option<u64>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            sender: engine::DEFAULT_SENDER,
            funding_balance_wei: engine::FUNDING_BALANCE_WEI,
            receipt_timeout_ms: engine::RECEIPT_TIMEOUT_MS,
            gas_limit: None,
        }
    }
}

impl EngineConfig {
    /// Receipt timeout as a [`Duration`].
    pub const fn receipt_timeout(&self) -> Duration {
        Duration::from_millis(self.receipt_timeout_ms)
    }
}

/// Fee oracle settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct FeeConfig {
    /// Registry id of the L1 that rollups post their data to. Defaults to `ethereum`.
    pub l1_network: Option<String>,
}

impl Default for FeeConfig {
    fn default() -> Self {
        Self { l1_network: Some(fees::DEFAULT_L1_NETWORK.to_string()) }
    }
}
