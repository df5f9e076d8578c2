//! Cross-network comparison.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::{BenchmarkResult, EngineError, Error};

/// Pipeline stage a network failed in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, derive_more::Display)]
#[serde(rename_all = "camelCase")]
pub enum FailureStage {
    /// Rejected before any resource was allocated.
    #[display("validation")]
    Validation,
    /// The contract could not be compiled.
    #[display("compilation")]
    Compilation,
    /// The fork could not be started.
    #[display("fork")]
    Fork,
    /// The contract could not be deployed, or the existing contract could not be used.
    #[display("deployment")]
    Deployment,
    /// No outcome was reported for the network.
    #[display("missing")]
    Missing,
}

impl FailureStage {
    /// Stage an error was raised in.
    pub const fn of(err: &Error) -> Self {
        match err {
            Error::Compilation(_) => Self::Compilation,
            Error::Config(_) | Error::Analyzer(_) => Self::Validation,
            Error::Fork(_) => Self::Fork,
            Error::Engine(
                EngineError::InvalidArtifact(_) |
                EngineError::Deployment(_) |
                EngineError::Abi(_) |
                EngineError::Rpc(_) |
                EngineError::ReceiptTimeout { .. } |
                EngineError::MissingCode(_),
            ) => Self::Deployment,
        }
    }
}

/// A network whose pipeline failed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NetworkFailure {
    /// Registry id of the network.
    pub network_id: String,
    /// Where it failed.
    pub stage: FailureStage,
    /// Why.
    pub error: String,
}

impl NetworkFailure {
    /// Failure of `network_id` with `err`.
    pub fn new(network_id: impl Into<String>, err: &Error) -> Self {
        Self { network_id: network_id.into(), stage: FailureStage::of(err), error: err.to_string() }
    }
}

/// Outcome of one network's pipeline.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "camelCase")]
pub enum NetworkOutcome {
    /// The pipeline completed.
    Succeeded(Box<BenchmarkResult>),
    /// The pipeline failed.
    Failed(NetworkFailure),
}

impl NetworkOutcome {
    /// Registry id of the network.
    pub fn network_id(&self) -> &str {
        match self {
            Self::Succeeded(result) => &result.network_id,
            Self::Failed(failure) => &failure.network_id,
        }
    }
}

/// Cost relative to the baseline network.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BaselineDelta {
    /// Baseline cost minus this network's cost, in USD. Positive means cheaper.
    pub discount_usd: f64,
    /// The discount as a percentage of the baseline cost.
    pub discount_percentage: f64,
}

/// A priced network in the ranking.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RankedNetwork {
    /// 1 for the cheapest network.
    pub rank: usize,
    /// Registry id of the network.
    pub network_id: String,
    /// Total cost in USD.
    pub total_cost_usd: f64,
    /// Saving relative to the most expensive network, in percent.
    pub savings_percentage: f64,
    /// Cost relative to the baseline, `None` when the baseline has no cost.
    pub baseline_delta: Option<BaselineDelta>,
}

/// Spread of one function's cost across networks.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FunctionVariability {
    /// The function, or `deployment`.
    pub function: String,
    /// Number of networks the function was priced on.
    pub networks: usize,
    /// Mean USD cost.
    pub mean_usd: f64,
    /// Sample standard deviation of the USD cost.
    pub std_dev_usd: f64,
}

/// Comparison of one run across networks.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ComparisonResult {
    /// The baseline network.
    pub baseline: String,
    /// Networks attempted, baseline first.
    pub attempted: Vec<String>,
    /// Networks whose pipeline completed.
    pub succeeded: Vec<String>,
    /// Priced networks, cheapest first.
    pub rankings: Vec<RankedNetwork>,
    /// Networks that completed without a USD cost.
    pub unpriced: Vec<String>,
    /// Networks that failed.
    pub failures: Vec<NetworkFailure>,
    /// Per-function spread across networks, most variable first.
    pub function_variability: Vec<FunctionVariability>,
}

impl ComparisonResult {
    /// The cheapest priced network.
    pub fn cheapest(&self) -> Option<&RankedNetwork> {
        self.rankings.first()
    }

    /// The most expensive priced network.
    pub fn most_expensive(&self) -> Option<&RankedNetwork> {
        self.rankings.last()
    }
}

/// Rank `outcomes` of `baseline` and `comparisons`.
///
/// Only networks in `baseline` and `comparisons` are considered. A network without an
/// outcome counts as failed.
pub fn compare(
    baseline: &str,
    comparisons: &[String],
    outcomes: &[NetworkOutcome],
) -> ComparisonResult {
    let mut attempted = vec![baseline.to_string()];
    for id in comparisons {
        if !attempted.contains(id) {
            attempted.push(id.clone());
        }
    }

    let mut result = ComparisonResult { baseline: baseline.to_string(), ..Default::default() };
    let mut priced = Vec::new();
    let mut successes = Vec::new();
    for id in &attempted {
        match outcomes.iter().find(|outcome| outcome.network_id() == id) {
            Some(NetworkOutcome::Succeeded(run)) => {
                result.succeeded.push(id.clone());
                successes.push(run.as_ref());
                match run.total_cost_usd {
                    Some(cost) => priced.push((id.clone(), cost)),
                    None => result.unpriced.push(id.clone()),
                }
            }
            Some(NetworkOutcome::Failed(failure)) => result.failures.push(failure.clone()),
            None => result.failures.push(NetworkFailure {
                network_id: id.clone(),
                stage: FailureStage::Missing,
                error: "no outcome reported".to_string(),
            }),
        }
    }

    priced.sort_by(|(a_id, a), (b_id, b)| a.total_cmp(b).then_with(|| a_id.cmp(b_id)));
    let max_cost = priced.last().map(|(_, cost)| *cost).unwrap_or_default();
    let baseline_cost = priced.iter().find(|(id, _)| id == baseline).map(|(_, cost)| *cost);
    result.rankings = priced
        .into_iter()
        .enumerate()
        .map(|(i, (network_id, cost))| RankedNetwork {
            rank: i + 1,
            network_id,
            total_cost_usd: cost,
            savings_percentage: percentage(max_cost - cost, max_cost),
            baseline_delta: baseline_cost.map(|base| BaselineDelta {
                discount_usd: base - cost,
                discount_percentage: percentage(base - cost, base),
            }),
        })
        .collect();
    result.function_variability = function_variability(&successes);
    result.attempted = attempted;
    result
}

fn percentage(part: f64, whole: f64) -> f64 {
    if whole > 0.0 {
        part / whole * 100.0
    } else {
        0.0
    }
}

fn function_variability(results: &[&BenchmarkResult]) -> Vec<FunctionVariability> {
    let mut costs: BTreeMap<String, Vec<f64>> = BTreeMap::new();
    for result in results {
        for (function, cost) in result.function_costs_usd() {
            costs.entry(function).or_default().push(cost);
        }
    }
    let mut spread: Vec<_> = costs
        .into_iter()
        .filter(|(_, costs)| costs.len() > 1)
        .map(|(function, costs)| {
            let n = costs.len() as f64;
            let mean_usd = costs.iter().sum::<f64>() / n;
            let squares = costs.iter().map(|cost| (cost - mean_usd).powi(2)).sum::<f64>();
            let std_dev_usd = (squares / (n - 1.0)).sqrt();
            FunctionVariability { function, networks: costs.len(), mean_usd, std_dev_usd }
        })
        .collect();
    spread.sort_by(|a, b| {
        b.std_dev_usd.total_cmp(&a.std_dev_usd).then_with(|| a.function.cmp(&b.function))
    });
    spread
}
