//! Contract, call and price arguments shared by `bench` and `compare`.

use std::{path::PathBuf, sync::Arc};

use alloy_primitives::Address;
use clap::{ArgGroup, Parser};
use gasbench::{
    BenchmarkRequest, CallSpec, CompileRequest, CompiledArtifact, OptimizerSettings,
};

use super::{CliError, Result};
use crate::Service;

/// The contract to benchmark and what to do with it.
#[derive(Parser, Debug, Clone)]
#[command(group(ArgGroup::new("contract").required(true).args(["artifact", "source"])))]
pub struct ContractArgs {
    /// Compiled Hardhat or Foundry artifact (JSON)
    #[arg(long = "artifact")]
    pub artifact: Option<PathBuf>,

    /// Solidity source file, compiled with `--solc`
    #[arg(long = "source", requires = "contract_name")]
    pub source: Option<PathBuf>,

    /// Contract to extract from `--source`
    #[arg(long = "contract")]
    pub contract_name: Option<String>,

    /// Required compiler version. Whatever `--solc` reports when omitted
    #[arg(long = "solc-version")]
    pub solc_version: Option<String>,

    /// Optimizer runs
    #[arg(long = "optimizer-runs", default_value = "200")]
    pub optimizer_runs: u32,

    /// Disable the optimizer
    #[arg(long = "no-optimize")]
    pub no_optimize: bool,

    /// Constructor argument, repeated in order
    #[arg(long = "constructor-arg", visible_aliases = ["ctor-arg"])]
    pub constructor_args: Vec<String>,

    /// Function call such as `setNumber(42)`, repeated in order
    #[arg(long = "call")]
    pub calls: Vec<String>,

    /// JSON file with an array of `{"function", "args", "value"}` calls, run after `--call`s
    #[arg(long = "calls-file")]
    pub calls_file: Option<PathBuf>,

    /// Block to fork at. Latest when omitted
    #[arg(long = "block")]
    pub block: Option<u64>,

    /// Benchmark the contract already deployed at this address instead of deploying it
    #[arg(long = "address", visible_aliases = ["at"])]
    pub address: Option<Address>,
}

impl ContractArgs {
    /// Load or compile the artifact.
    pub fn artifact(&self, service: &Service) -> Result<Arc<CompiledArtifact>> {
        if let Some(path) = &self.artifact {
            let json = std::fs::read_to_string(path)?;
            return Ok(Arc::new(CompiledArtifact::from_json(&json)?));
        }
        let (Some(source), Some(contract_name)) = (&self.source, &self.contract_name) else {
            return Err(CliError::InvalidInput(
                "pass --artifact or --source with --contract".to_string(),
            ));
        };
        let request = CompileRequest {
            contract_name: contract_name.clone(),
            source_code: std::fs::read_to_string(source)?,
            compiler_version: match &self.solc_version {
                Some(version) => version.clone(),
                None => service.compiler_version()?,
            },
            optimizer: OptimizerSettings { enabled: !self.no_optimize, runs: self.optimizer_runs },
        };
        Ok(service.compile(&request)?)
    }

    /// Every requested call, in order.
    pub fn calls(&self) -> Result<Vec<CallSpec>> {
        let mut calls = self.calls.iter().map(|call| parse_call(call)).collect::<Result<Vec<_>>>()?;
        if let Some(path) = &self.calls_file {
            let more: Vec<CallSpec> = serde_json::from_str(&std::fs::read_to_string(path)?)?;
            calls.extend(more);
        }
        Ok(calls)
    }

    /// One request per network, sharing one artifact.
    pub fn requests(
        &self,
        networks: &[String],
        service: &Service,
    ) -> Result<Vec<BenchmarkRequest>> {
        let Some(first) = networks.first() else {
            return Ok(Vec::new());
        };
        let mut request = BenchmarkRequest::new(first.as_str(), self.artifact(service)?)
            .with_constructor_args(self.constructor_args.clone())
            .with_calls(self.calls()?);
        if let Some(block) = self.block {
            request = request.at_block(block);
        }
        if let Some(address) = self.address {
            request = request.against(address);
        }
        Ok(networks.iter().map(|network| request.on(network.as_str())).collect())
    }
}

/// Parse `name`, `name()` or `name(arg, [1, 2], "a, b")` into a call.
///
/// Arguments are split on commas outside brackets and quotes, and trimmed.
pub fn parse_call(input: &str) -> Result<CallSpec> {
    let input = input.trim();
    let invalid = || CliError::InvalidInput(format!("malformed call `{input}`"));
    let Some(open) = input.find('(') else {
        if input.is_empty() || input.contains(')') {
            return Err(invalid());
        }
        return Ok(CallSpec::new(input, Vec::<String>::new()));
    };
    let name = input[..open].trim();
    let body = input[open + 1..].strip_suffix(')').ok_or_else(invalid)?;
    if name.is_empty() {
        return Err(invalid());
    }
    if body.trim().is_empty() {
        return Ok(CallSpec::new(name, Vec::<String>::new()));
    }

    let mut args = Vec::new();
    let mut depth = 0usize;
    let mut quoted = false;
    let mut start = 0;
    for (i, c) in body.char_indices() {
        match c {
            '"' => quoted = !quoted,
            '[' | '(' if !quoted => depth += 1,
            ']' | ')' if !quoted => depth = depth.checked_sub(1).ok_or_else(invalid)?,
            ',' if !quoted && depth == 0 => {
                args.push(body[start..i].trim().to_string());
                start = i + 1;
            }
            _ => {}
        }
    }
    if quoted || depth != 0 {
        return Err(invalid());
    }
    args.push(body[start..].trim().to_string());
    Ok(CallSpec::new(name, args))
}

/// Parse `TOKEN=USD`.
pub fn parse_price(input: &str) -> std::result::Result<(String, f64), String> {
    let (token, price) =
        input.split_once('=').ok_or_else(|| format!("expected TOKEN=USD, got `{input}`"))?;
    let price: f64 = price.trim().parse().map_err(|err| format!("invalid price `{price}`: {err}"))?;
    if !price.is_finite() || price < 0.0 {
        return Err(format!("price must be non-negative, got {price}"));
    }
    Ok((token.trim().to_string(), price))
}

#[cfg(test)]
mod tests {
    use rstest::rstest;

    use super::*;

    #[rstest]
    #[case("increment", "increment", &[])]
    #[case("increment()", "increment", &[])]
    #[case(" setNumber( 42 ) ", "setNumber", &["42"])]
    #[case(
        "transfer(0xf39Fd6e51aad88F6F4ce6aB8827279cffFb92266, 1000)",
        "transfer",
        &["0xf39Fd6e51aad88F6F4ce6aB8827279cffFb92266", "1000"]
    )]
    #[case("batch([1, 2, 3], \"a, b\")", "batch", &["[1, 2, 3]", "\"a, b\""])]
    #[case("nested((1, 2), [(3, 4)])", "nested", &["(1, 2)", "[(3, 4)]"])]
    fn test_parse_call(#[case] input: &str, #[case] function: &str, #[case] args: &[&str]) {
        let call = parse_call(input).unwrap();
        assert_eq!(call.function, function);
        assert_eq!(call.args, args);
    }

    #[rstest]
    #[case("")]
    #[case("()")]
    #[case("f(1")]
    #[case("f(1))")]
    #[case("f([1)")]
    #[case("f(\"open)")]
    fn test_parse_call_rejects(#[case] input: &str) {
        assert!(matches!(parse_call(input), Err(CliError::InvalidInput(_))));
    }

    #[test]
    fn test_parse_price() {
        assert_eq!(parse_price("ETH=3500.5").unwrap(), ("ETH".to_string(), 3500.5));
        assert!(parse_price("ETH").is_err());
        assert!(parse_price("ETH=-1").is_err());
        assert!(parse_price("ETH=abc").is_err());
    }
}
