//! `gasbench bench`: benchmark a contract on one or more networks.

use clap::Parser;
use gasbench::NetworkOutcome;
use tracing::info;

use crate::{
    common::{ContractArgs, Result},
    print_json, until_interrupted, Service,
};

/// Benchmark a contract on one or more networks
#[derive(Parser, Debug)]
pub struct Cmd {
    /// Network to benchmark on, repeated or comma separated
    #[arg(long = "network", short = 'n', value_delimiter = ',', default_value = "ethereum")]
    pub networks: Vec<String>,

    /// The contract and calls
    #[command(flatten)]
    pub contract: ContractArgs,
}

impl Cmd {
    /// Execute the bench command
    pub async fn run(&self, service: &Service) -> Result<()> {
        service.networks().ensure_supported(self.networks.iter().map(String::as_str))?;
        let requests = self.contract.requests(&self.networks, service)?;
        info!(networks = ?self.networks, "benchmarking");

        let outcomes = until_interrupted(service, service.run_across(&requests)).await??;
        if let [NetworkOutcome::Succeeded(result)] = outcomes.as_slice() {
            return print_json(result);
        }
        print_json(&outcomes)
    }
}
