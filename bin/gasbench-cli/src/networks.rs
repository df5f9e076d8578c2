//! `gasbench networks`: list the configured networks.

use clap::Parser;
use gasbench::{BenchConfig, FeeStrategy, Network};
use serde::Serialize;

use crate::{common::Result, print_json};

/// List the configured networks
#[derive(Parser, Debug)]
pub struct Cmd {}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct NetworkSummary<'a> {
    id: &'a str,
    name: &'a str,
    chain_id: u64,
    native_token: &'a str,
    strategy: FeeStrategy,
    fee_model: String,
    priced: bool,
}

impl<'a> NetworkSummary<'a> {
    fn new(network: &'a Network, config: &BenchConfig) -> Self {
        let token = &network.config.native_token;
        Self {
            id: network.id(),
            name: &network.config.name,
            chain_id: network.config.chain_id,
            native_token: token,
            strategy: network.strategy,
            fee_model: network.strategy.to_string(),
            priced: config.prices.keys().any(|key| key.eq_ignore_ascii_case(token)),
        }
    }
}

impl Cmd {
    /// Execute the networks command
    pub fn run(&self, config: &BenchConfig) -> Result<()> {
        let registry = config.registry()?;
        let networks: Vec<_> =
            registry.iter().map(|network| NetworkSummary::new(network, config)).collect();
        print_json(&networks)
    }
}
