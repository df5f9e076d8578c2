//! `gasbench` CLI: live gas benchmarks of EVM contracts on forked networks
//!
//! Forks each requested network locally, deploys and exercises the contract, and prints the
//! priced results as JSON.

use std::process::ExitCode;

use clap::Parser;

mod cmd;
pub use cmd::*;

mod analyze;
mod bench;
mod common;
mod compare;
mod networks;

#[tokio::main]
async fn main() -> ExitCode {
    let cmd = MainCmd::parse();
    if let Err(err) = cmd.log.init() {
        eprintln!("{err}");
        return ExitCode::FAILURE;
    }
    match cmd.run().await {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("Error: {err}");
            ExitCode::FAILURE
        }
    }
}
