//! Network registry.
//!
//! Networks are described by configuration. The fee strategy of each network is resolved once,
//! when the registry is built, so adding a rollup is a configuration change.

use std::{collections::BTreeMap, sync::Arc};

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::{constants::data::CALLDATA_GAS_PER_BYTE, ConfigError};

/// A network as described in configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", deny_unknown_fields)]
pub struct NetworkConfig {
    /// Registry id, e.g. `arbitrum`.
    pub id: String,
    /// Human readable name.
    #[serde(default)]
    pub name: String,
    /// Expected chain id.
    pub chain_id: u64,
    /// Upstream RPC endpoint. `${VAR}` placeholders are substituted from the environment.
    pub rpc_url: String,
    /// Whether the network is a rollup that posts its data to an L1.
    #[serde(default)]
    pub rollup: bool,
    /// Whether the rollup posts data in EIP-4844 blobs.
    #[serde(default)]
    pub blob_capable: bool,
    /// Gas per byte when the rollup posts data as calldata.
    #[serde(default)]
    pub calldata_gas_per_byte: Option<u64>,
    /// Price feed key of the native token, e.g. `ETH`.
    pub native_token: String,
}

impl NetworkConfig {
    /// Render the upstream endpoint, substituting `${VAR}` placeholders with `lookup`.
    pub fn render_endpoint(
        &self,
        lookup: impl Fn(&str) -> Option<String>,
    ) -> Result<String, ConfigError> {
        let mut rendered = String::with_capacity(self.rpc_url.len());
        let mut rest = self.rpc_url.as_str();
        while let Some(start) = rest.find("${") {
            rendered.push_str(&rest[..start]);
            let after = &rest[start + 2..];
            let Some(end) = after.find('}') else {
                return Err(ConfigError::Invalid(format!(
                    "unterminated placeholder in rpc_url of {}",
                    self.id
                )));
            };
            let var = &after[..end];
            let value = lookup(var).ok_or_else(|| ConfigError::MissingEnv {
                network: self.id.clone(),
                var: var.to_string(),
            })?;
            rendered.push_str(&value);
            rest = &after[end + 1..];
        }
        rendered.push_str(rest);
        Ok(rendered)
    }

    /// Render the upstream endpoint from the process environment.
    pub fn endpoint(&self) -> Result<String, ConfigError> {
        self.render_endpoint(|var| std::env::var(var).ok())
    }

    /// Resolve the fee strategy of this network.
    pub fn fee_strategy(&self) -> FeeStrategy {
        if !self.rollup {
            return FeeStrategy::SingleMarket;
        }
        if self.blob_capable {
            FeeStrategy::Rollup(DataPosting::Blob)
        } else {
            FeeStrategy::Rollup(DataPosting::Calldata {
                gas_per_byte: self.calldata_gas_per_byte.unwrap_or(CALLDATA_GAS_PER_BYTE),
            })
        }
    }
}

/// How a network prices a transaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, derive_more::Display)]
#[serde(rename_all = "camelCase")]
pub enum FeeStrategy {
    /// A single EIP-1559 fee market (Ethereum, Polygon PoS, ...).
    #[display("single-market")]
    SingleMarket,
    /// L2 execution plus the cost of posting data to the L1.
    #[display("rollup ({_0})")]
    Rollup(DataPosting),
}

/// How a rollup posts its data to the L1.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, derive_more::Display)]
#[serde(rename_all = "camelCase")]
pub enum DataPosting {
    /// EIP-4844 blobs.
    #[display("blob")]
    Blob,
    /// Plain calldata priced per byte.
    #[display("calldata, {gas_per_byte} gas/byte")]
    Calldata {
        /// Gas charged per posted byte.
        gas_per_byte: u64,
    },
}

/// A network together with its resolved fee strategy.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Network {
    /// The configured network.
    pub config: NetworkConfig,
    /// Resolved fee strategy.
    pub strategy: FeeStrategy,
}

impl Network {
    /// Registry id.
    pub fn id(&self) -> &str {
        &self.config.id
    }
}

/// Lookup table of networks keyed by id.
#[derive(Debug, Clone, Default)]
pub struct NetworkRegistry {
    networks: BTreeMap<String, Arc<Network>>,
}

impl NetworkRegistry {
    /// Build a registry, resolving each network's fee strategy.
    pub fn new(configs: impl IntoIterator<Item = NetworkConfig>) -> Result<Self, ConfigError> {
        let mut networks = BTreeMap::new();
        for config in configs {
            let strategy = config.fee_strategy();
            debug!(network = %config.id, %strategy, "registered network");
            let id = config.id.clone();
            if networks.insert(id.clone(), Arc::new(Network { config, strategy })).is_some() {
                return Err(ConfigError::DuplicateNetwork(id));
            }
        }
        Ok(Self { networks })
    }

    /// The built-in network set.
    pub fn builtin() -> Self {
        Self::new(builtin_networks()).expect("built-in networks have unique ids")
    }

    /// Look a network up by id.
    pub fn get(&self, id: &str) -> Option<Arc<Network>> {
        self.networks.get(id).cloned()
    }

    /// Look a network up by id, failing with [`ConfigError::UnsupportedNetwork`].
    pub fn resolve(&self, id: &str) -> Result<Arc<Network>, ConfigError> {
        self.get(id).ok_or_else(|| ConfigError::UnsupportedNetwork(id.to_string()))
    }

    /// Check that every id is known, returning the first unknown one as an error.
    pub fn ensure_supported<'a>(
        &self,
        ids: impl IntoIterator<Item = &'a str>,
    ) -> Result<(), ConfigError> {
        ids.into_iter().try_for_each(|id| self.resolve(id).map(drop))
    }

    /// Iterate the registered networks in id order.
    pub fn iter(&self) -> impl Iterator<Item = &Arc<Network>> {
        self.networks.values()
    }

    /// Number of registered networks.
    pub fn len(&self) -> usize {
        self.networks.len()
    }

    /// Whether the registry is empty.
    pub fn is_empty(&self) -> bool {
        self.networks.is_empty()
    }
}

fn network(
    id: &str,
    name: &str,
    chain_id: u64,
    rpc_url: &str,
    rollup: bool,
    blob_capable: bool,
    native_token: &str,
) -> NetworkConfig {
    NetworkConfig {
        id: id.to_string(),
        name: name.to_string(),
        chain_id,
        rpc_url: rpc_url.to_string(),
        rollup,
        blob_capable,
        calldata_gas_per_byte: None,
        native_token: native_token.to_string(),
    }
}

/// The networks known without any configuration.
pub fn builtin_networks() -> Vec<NetworkConfig> {
    vec![
        network("ethereum", "Ethereum", 1, "https://eth.llamarpc.com", false, false, "ETH"),
        network("polygon", "Polygon PoS", 137, "https://polygon-rpc.com", false, false, "POL"),
        network(
            "arbitrum",
            "Arbitrum One",
            42_161,
            "https://arb1.arbitrum.io/rpc",
            true,
            true,
            "ETH",
        ),
        network("optimism", "OP Mainnet", 10, "https://mainnet.optimism.io", true, true, "ETH"),
        network("base", "Base", 8_453, "https://mainnet.base.org", true, true, "ETH"),
        network("scroll", "Scroll", 534_352, "https://rpc.scroll.io", true, true, "ETH"),
        network("linea", "Linea", 59_144, "https://rpc.linea.build", true, true, "ETH"),
        network("zksync", "zkSync Era", 324, "https://mainnet.era.zksync.io", true, false, "ETH"),
    ]
}
