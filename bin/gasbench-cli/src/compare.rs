//! `gasbench compare`: rank networks by the cost of the same workload.

use clap::Parser;
use gasbench::{ComparisonResult, NetworkOutcome};
use serde::Serialize;

use crate::{
    common::{ContractArgs, Result},
    print_json, until_interrupted, Service,
};

/// Benchmark a contract on several networks and rank them against a baseline
#[derive(Parser, Debug)]
pub struct Cmd {
    /// Network the others are measured against
    #[arg(long = "baseline", short = 'b', default_value = "ethereum")]
    pub baseline: String,

    /// Networks to compare, repeated or comma separated
    #[arg(long = "network", short = 'n', value_delimiter = ',', required = true)]
    pub networks: Vec<String>,

    /// Print only the ranking, without per-network results
    #[arg(long = "summary")]
    pub summary: bool,

    /// The contract and calls
    #[command(flatten)]
    pub contract: ContractArgs,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct Report<'a> {
    comparison: &'a ComparisonResult,
    outcomes: &'a [NetworkOutcome],
}

impl Cmd {
    /// Execute the compare command
    pub async fn run(&self, service: &Service) -> Result<()> {
        let mut networks = vec![self.baseline.clone()];
        networks.extend(self.networks.iter().filter(|id| **id != self.baseline).cloned());
        service.networks().ensure_supported(networks.iter().map(String::as_str))?;

        let requests = self.contract.requests(&networks, service)?;
        let outcomes = until_interrupted(service, service.run_across(&requests)).await??;
        let comparison = service.compare_networks(&self.baseline, &self.networks, &outcomes)?;

        if self.summary {
            return print_json(&comparison);
        }
        print_json(&Report { comparison: &comparison, outcomes: &outcomes })
    }
}
