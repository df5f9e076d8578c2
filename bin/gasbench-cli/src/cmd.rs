use std::path::PathBuf;

use clap::{Parser, Subcommand};
use gasbench::{AnvilBackend, BenchConfig, BenchmarkService, SolcCompiler};
use serde::Serialize;

use crate::common::{parse_price, CliError, LogArgs, Result};

/// Main command of the gasbench CLI
#[derive(Parser, Debug)]
#[command(name = "gasbench", infer_subcommands = true, version)]
pub struct MainCmd {
    /// Configuration file (TOML). Built-in networks and defaults are used when omitted
    #[arg(long = "config", short = 'c', env = "GASBENCH_CONFIG", global = true)]
    pub config: Option<PathBuf>,

    /// Program used to spawn forks, overriding the configuration
    #[arg(long = "anvil", env = "GASBENCH_ANVIL", global = true)]
    pub anvil: Option<String>,

    /// Compiler binary used for `--source`
    #[arg(long = "solc", env = "GASBENCH_SOLC", default_value = "solc", global = true)]
    pub solc: String,

    /// USD price of a native token, e.g. `ETH=3500`. Overrides the configuration
    #[arg(long = "price", value_name = "TOKEN=USD", value_parser = parse_price, global = true)]
    pub prices: Vec<(String, f64)>,

    /// Logging configuration
    #[command(flatten)]
    pub log: LogArgs,

    /// Subcommand
    #[command(subcommand)]
    pub command: Command,
}

/// Subcommands of the gasbench CLI
#[derive(Subcommand, Debug)]
pub enum Command {
    /// Statically analyze contract bytecode
    Analyze(crate::analyze::Cmd),
    /// Benchmark a contract on one or more networks
    Bench(crate::bench::Cmd),
    /// Benchmark a contract on several networks and rank them against a baseline
    Compare(crate::compare::Cmd),
    /// List the configured networks
    Networks(crate::networks::Cmd),
}

/// The CLI service: anvil forks, RPC fee telemetry, configured prices
pub type Service = BenchmarkService<AnvilBackend>;

impl MainCmd {
    /// Execute the selected subcommand
    pub async fn run(&self) -> Result<()> {
        match &self.command {
            Command::Analyze(cmd) => cmd.run(),
            Command::Bench(cmd) => cmd.run(&self.service()?).await,
            Command::Compare(cmd) => cmd.run(&self.service()?).await,
            Command::Networks(cmd) => cmd.run(&self.load_config()?),
        }
    }

    /// Load the configuration file and apply command line overrides.
    pub fn load_config(&self) -> Result<BenchConfig> {
        let mut config = match &self.config {
            Some(path) => BenchConfig::load(path)?,
            None => BenchConfig::default(),
        };
        if let Some(anvil) = &self.anvil {
            config.fork.anvil_path = anvil.clone();
        }
        config.prices.extend(self.prices.iter().cloned());
        Ok(config)
    }

    fn service(&self) -> Result<Service> {
        let service = BenchmarkService::from_config(&self.load_config()?)?;
        Ok(service.with_compiler(SolcCompiler::new(self.solc.clone())))
    }
}

/// Print `value` as pretty JSON on stdout.
pub fn print_json(value: &impl Serialize) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

/// Run `task`, tearing every fork down if the process is interrupted first.
pub async fn until_interrupted<T>(
    service: &Service,
    task: impl std::future::Future<Output = T>,
) -> Result<T> {
    tokio::select! {
        output = task => Ok(output),
        _ = tokio::signal::ctrl_c() => {
            tracing::warn!("interrupted, tearing down forks");
            let report = service.cleanup_all().await;
            for failure in &report.failed {
                tracing::warn!(key = %failure.key, error = %failure.error, "fork left running");
            }
            Err(CliError::Interrupted)
        }
    }
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use super::*;

    #[test]
    fn test_overrides_apply_on_top_of_config() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "[prices]\nETH = 1000.0\nPOL = 0.5").unwrap();
        let path = file.path().to_string_lossy().to_string();

        let cmd = MainCmd::parse_from([
            "gasbench",
            "--config",
            &path,
            "--price",
            "ETH=3000",
            "--anvil",
            "/bin/anvil",
            "networks",
        ]);
        let config = cmd.load_config().unwrap();
        assert_eq!(config.prices["ETH"], 3000.0);
        assert_eq!(config.prices["POL"], 0.5);
        assert_eq!(config.fork.anvil_path, "/bin/anvil");
    }

    #[test]
    fn test_global_flags_after_subcommand() {
        let cmd = MainCmd::parse_from(["gasbench", "networks", "-vvv", "--price", "BNB=600"]);
        assert_eq!(cmd.log.verbose, 3);
        assert_eq!(cmd.prices, [("BNB".to_string(), 600.0)]);
        assert!(matches!(cmd.command, Command::Networks(_)));
    }
}
