//! The live benchmark pipeline and the service facade.
//!
//! One pipeline runs per network: fork, deploy (or reuse an existing contract), execute the
//! calls, read fee telemetry and compose the fees. Steps within a pipeline are strictly
//! sequential; pipelines for different networks run concurrently. The fork session is torn
//! down when the pipeline ends, whatever the outcome.

use std::{collections::BTreeMap, fmt, sync::Arc};

use alloy_primitives::Address;
use futures::future::join_all;
use serde::{Deserialize, Serialize};
use tracing::{info, instrument, warn};

use crate::{
    analyzer::{self, BytecodeReport},
    compare,
    engine::{CallPlan, ExecutionEngine},
    fees::{
        compose_fees, execution_fees, CostBreakdown, FeeOracle, FeeTelemetry, GasUsage, PriceFeed,
        RpcFeeOracle, StaticPriceFeed,
    },
    fork::{AnvilBackend, ForkBackend, ForkManager, TeardownReport},
    ArtifactCache, BenchConfig, CallOutcome, CallSpec, ComparisonResult, CompileRequest,
    CompiledArtifact, Compiler, ConfigError, DeploymentReceipt, EngineConfig, FeeModelError,
    FeeStrategy, ForkConfig, ForkSession, Network, NetworkFailure, NetworkOutcome,
    NetworkRegistry, Result, SessionKey, SolcCompiler,
};

/// What to benchmark on one network.
#[derive(Debug, Clone)]
pub struct BenchmarkRequest {
    /// Registry id of the network.
    pub network_id: String,
    /// The contract.
    pub artifact: Arc<CompiledArtifact>,
    /// Constructor arguments, coerced with the constructor's parameter types.
    pub constructor_args: Vec<String>,
    /// Calls to execute, in order.
    pub calls: Vec<CallSpec>,
    /// Block to fork at, latest when `None`.
    pub block_number: Option<u64>,
    /// Benchmark an already deployed contract instead of deploying the artifact.
    pub existing_contract: Option<Address>,
}

impl BenchmarkRequest {
    /// Deploy `artifact` on `network_id` with no constructor arguments and no calls.
    pub fn new(network_id: impl Into<String>, artifact: Arc<CompiledArtifact>) -> Self {
        Self {
            network_id: network_id.into(),
            artifact,
            constructor_args: Vec::new(),
            calls: Vec::new(),
            block_number: None,
            existing_contract: None,
        }
    }

    /// Set the constructor arguments.
    pub fn with_constructor_args(mut self, args: Vec<String>) -> Self {
        self.constructor_args = args;
        self
    }

    /// Set the calls to execute.
    pub fn with_calls(mut self, calls: Vec<CallSpec>) -> Self {
        self.calls = calls;
        self
    }

    /// Fork at `block`.
    pub const fn at_block(mut self, block: u64) -> Self {
        self.block_number = Some(block);
        self
    }

    /// Run the calls against a contract already deployed at `address`.
    pub const fn against(mut self, address: Address) -> Self {
        self.existing_contract = Some(address);
        self
    }

    /// The same request on another network.
    pub fn on(&self, network_id: impl Into<String>) -> Self {
        Self { network_id: network_id.into(), ..self.clone() }
    }
}

/// A priced deployment.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeploymentCost {
    /// The receipt.
    pub receipt: DeploymentReceipt,
    /// The priced fees.
    pub cost: CostBreakdown,
}

/// A call outcome, priced when it succeeded.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CallResult {
    /// What happened.
    pub outcome: CallOutcome,
    /// Priced fees of a successful call.
    pub cost: Option<CostBreakdown>,
}

/// Raw output of the deploy and execute stages.
#[derive(Debug, Clone)]
pub struct Measurements {
    /// The contract the calls ran against.
    pub contract_address: Address,
    /// Validation result of the requested calls.
    pub plan: CallPlan,
    /// Deployment receipt, `None` when an existing contract was used.
    pub deployment: Option<DeploymentReceipt>,
    /// One outcome per requested call, in order.
    pub outcomes: Vec<CallOutcome>,
}

/// Result of benchmarking one network.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BenchmarkResult {
    /// Registry id of the network.
    pub network_id: String,
    /// Chain id of the network.
    pub chain_id: u64,
    /// Fee strategy the costs were composed with.
    pub strategy: FeeStrategy,
    /// Price feed key of the native token.
    pub native_token: String,
    /// USD price of the native token, when known.
    pub token_price_usd: Option<f64>,
    /// Block the fork was pinned at.
    pub fork_block: Option<u64>,
    /// The contract the calls ran against.
    pub contract_address: Address,
    /// Validation result of the requested calls.
    pub plan: CallPlan,
    /// Fee telemetry used, when the oracle answered.
    pub telemetry: Option<FeeTelemetry>,
    /// The deployment, `None` when an existing contract was used.
    pub deployment: Option<DeploymentCost>,
    /// One result per requested call, in order.
    pub calls: Vec<CallResult>,
    /// Gas used by the deployment and every successful call.
    pub total_gas_used: u64,
    /// Fees of the deployment and every successful call, in wei.
    pub total_fee_wei: u128,
    /// The same in USD, `None` without a token price.
    pub total_cost_usd: Option<f64>,
    /// Fee model degradations.
    pub warnings: Vec<FeeModelError>,
}

impl BenchmarkResult {
    /// Price the measurements of one pipeline.
    ///
    /// Telemetry and price failures are recorded as warnings: costs without telemetry fall back
    /// to the effective gas price, USD fields without a price stay `None`.
    pub fn assemble(
        network: &Network,
        session: &ForkSession,
        measured: Measurements,
        telemetry: Result<FeeTelemetry, FeeModelError>,
        price: Result<f64, FeeModelError>,
    ) -> Self {
        let mut warnings = Vec::new();
        let telemetry = telemetry.map_err(|err| warnings.push(err)).ok();
        let token_price_usd = price.map_err(|err| warnings.push(err)).ok();

        let mut price_tx = |usage: GasUsage| {
            let fees = match &telemetry {
                Some(telemetry) => {
                    compose_fees(network.strategy, &usage, telemetry).unwrap_or_else(|err| {
                        if !warnings.contains(&err) {
                            warnings.push(err);
                        }
                        execution_fees(&usage, telemetry)
                    })
                }
                None => execution_fees(&usage, &FeeTelemetry::default()),
            };
            CostBreakdown::new(usage.gas_used, fees, token_price_usd)
        };

        let deployment = measured.deployment.map(|receipt| DeploymentCost {
            cost: price_tx(GasUsage {
                gas_used: receipt.gas_used,
                effective_gas_price: receipt.effective_gas_price,
                payload_bytes: receipt.payload_bytes,
            }),
            receipt,
        });
        let calls: Vec<_> = measured
            .outcomes
            .into_iter()
            .map(|outcome| CallResult {
                cost: outcome.receipt().map(|receipt| {
                    price_tx(GasUsage {
                        gas_used: receipt.gas_used,
                        effective_gas_price: receipt.effective_gas_price,
                        payload_bytes: receipt.payload_bytes,
                    })
                }),
                outcome,
            })
            .collect();

        let costs: Vec<&CostBreakdown> = deployment
            .iter()
            .map(|deployment| &deployment.cost)
            .chain(calls.iter().filter_map(|call| call.cost.as_ref()))
            .collect();
        let total_gas_used = costs.iter().map(|cost| cost.gas_used).sum();
        let total_fee_wei =
            costs.iter().map(|cost| cost.total_fee_wei).fold(0u128, u128::saturating_add);
        let total_cost_usd = token_price_usd
            .map(|_| costs.iter().filter_map(|cost| cost.total_cost_usd).sum::<f64>());

        Self {
            network_id: network.id().to_string(),
            chain_id: network.config.chain_id,
            strategy: network.strategy,
            native_token: network.config.native_token.clone(),
            token_price_usd,
            fork_block: session.block_number,
            contract_address: measured.contract_address,
            plan: measured.plan,
            telemetry,
            deployment,
            calls,
            total_gas_used,
            total_fee_wei,
            total_cost_usd,
            warnings,
        }
    }

    /// Number of calls that succeeded.
    pub fn successful_calls(&self) -> usize {
        self.calls.iter().filter(|call| call.outcome.is_success()).count()
    }

    /// Mean USD cost per function over the successful calls, plus `deployment` when the
    /// contract was deployed. Empty without a token price.
    pub fn function_costs_usd(&self) -> BTreeMap<String, f64> {
        let mut sums: BTreeMap<String, (f64, usize)> = BTreeMap::new();
        let deployment_usd =
            self.deployment.as_ref().and_then(|deployment| deployment.cost.total_cost_usd);
        if let Some(usd) = deployment_usd {
            sums.insert("deployment".to_string(), (usd, 1));
        }
        for call in &self.calls {
            if let Some(usd) = call.cost.as_ref().and_then(|cost| cost.total_cost_usd) {
                let entry = sums.entry(call.outcome.function().to_string()).or_default();
                entry.0 += usd;
                entry.1 += 1;
            }
        }
        sums.into_iter().map(|(function, (sum, count))| (function, sum / count as f64)).collect()
    }
}

/// Facade over the fork manager, the engine, the fee model, the analyzer and the aggregator.
pub struct BenchmarkService<B, O = RpcFeeOracle, P = StaticPriceFeed> {
    forks: ForkManager<B>,
    networks: Arc<NetworkRegistry>,
    engine: EngineConfig,
    oracle: O,
    prices: P,
    compiler: Arc<dyn Compiler>,
    artifacts: ArtifactCache,
}

impl<B, O, P> fmt::Debug for BenchmarkService<B, O, P> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BenchmarkService")
            .field("forks", &self.forks)
            .field("networks", &self.networks.len())
            .field("artifacts", &self.artifacts.len())
            .finish_non_exhaustive()
    }
}

impl BenchmarkService<AnvilBackend> {
    /// Service spawning `anvil` forks, reading fees over RPC and prices from configuration.
    pub fn from_config(config: &BenchConfig) -> Result<Self, ConfigError> {
        let networks = Arc::new(config.registry()?);
        let oracle = RpcFeeOracle::from_config(config, &networks)?;
        let prices = StaticPriceFeed::new(config.prices.clone());
        let backend = AnvilBackend::new(&config.fork, &config.engine);
        Ok(Self::new(backend, networks, config.fork.clone(), config.engine.clone(), oracle, prices))
    }
}

impl<B: ForkBackend, O: FeeOracle, P: PriceFeed> BenchmarkService<B, O, P> {
    /// Assemble a service. Contracts are compiled with `solc` unless
    /// [another compiler](Self::with_compiler) is set.
    pub fn new(
        backend: B,
        networks: Arc<NetworkRegistry>,
        fork: ForkConfig,
        engine: EngineConfig,
        oracle: O,
        prices: P,
    ) -> Self {
        Self {
            forks: ForkManager::new(backend, Arc::clone(&networks), fork),
            networks,
            engine,
            oracle,
            prices,
            compiler: Arc::new(SolcCompiler::default()),
            artifacts: ArtifactCache::new(),
        }
    }

    /// Use `compiler` for [`compile`](Self::compile).
    pub fn with_compiler(mut self, compiler: impl Compiler + 'static) -> Self {
        self.compiler = Arc::new(compiler);
        self
    }

    /// The network registry.
    pub fn networks(&self) -> &NetworkRegistry {
        &self.networks
    }

    /// The fork manager.
    pub const fn forks(&self) -> &ForkManager<B> {
        &self.forks
    }

    /// Version of the configured compiler.
    pub fn compiler_version(&self) -> Result<String> {
        Ok(self.compiler.version()?)
    }

    /// Compile a contract, reusing a cached artifact when the same source was compiled before.
    pub fn compile(&self, request: &CompileRequest) -> Result<Arc<CompiledArtifact>> {
        Ok(self.artifacts.get_or_compile(self.compiler.as_ref(), request)?)
    }

    /// Statically analyze hex encoded bytecode.
    pub fn analyze_bytecode(&self, bytecode: &str) -> Result<BytecodeReport> {
        Ok(analyzer::analyze(bytecode)?)
    }

    /// Benchmark one network.
    ///
    /// The network is resolved before anything is allocated. The fork session is torn down
    /// before returning, on success and on failure.
    #[instrument(skip_all, fields(network = %request.network_id))]
    pub async fn run_live_benchmark(&self, request: &BenchmarkRequest) -> Result<BenchmarkResult> {
        let network = self.networks.resolve(&request.network_id)?;
        let session = self.forks.create(&request.network_id, request.block_number).await?;

        let result = self.run_on_session(&network, &session, request).await;

        if let Err(err) = self.forks.teardown(&session.key()).await {
            warn!(%err, "failed to tear down fork");
        }
        match &result {
            Ok(result) => info!(
                total_gas_used = result.total_gas_used,
                total_cost_usd = ?result.total_cost_usd,
                calls = %result.plan.summary(),
                "benchmark complete"
            ),
            Err(err) => warn!(%err, "benchmark failed"),
        }
        result
    }

    async fn run_on_session(
        &self,
        network: &Network,
        session: &ForkSession,
        request: &BenchmarkRequest,
    ) -> Result<BenchmarkResult> {
        let engine = ExecutionEngine::new(self.forks.connect(session)?, self.engine.clone());
        engine.fund_sender().await?;

        let plan = engine
            .validate_calls(
                &request.artifact,
                &request.calls,
                &request.constructor_args,
                request.existing_contract,
            )
            .await?;
        let (contract_address, deployment) = match request.existing_contract {
            Some(address) => (address, None),
            None => {
                let receipt = engine.deploy(&request.artifact, &request.constructor_args).await?;
                (receipt.contract_address, Some(receipt))
            }
        };
        let outcomes =
            engine.execute(contract_address, &request.artifact.abi, &request.calls).await;

        let telemetry = self.oracle.telemetry(network, engine.client()).await;
        let price = self.prices.price_usd(&network.config.native_token);
        let measured = Measurements { contract_address, plan, deployment, outcomes };
        Ok(BenchmarkResult::assemble(network, session, measured, telemetry, price))
    }

    /// Benchmark several networks concurrently, one pipeline per request.
    ///
    /// Every network id is checked up front; an unknown id fails the whole run before any
    /// fork is spawned. After that, a failing network is reported in its outcome and does not
    /// affect the others.
    pub async fn run_across(&self, requests: &[BenchmarkRequest]) -> Result<Vec<NetworkOutcome>> {
        self.networks.ensure_supported(requests.iter().map(|request| request.network_id.as_str()))?;
        let results =
            join_all(requests.iter().map(|request| self.run_live_benchmark(request))).await;
        Ok(requests
            .iter()
            .zip(results)
            .map(|(request, result)| match result {
                Ok(result) => NetworkOutcome::Succeeded(Box::new(result)),
                Err(err) => NetworkOutcome::Failed(NetworkFailure::new(&request.network_id, &err)),
            })
            .collect())
    }

    /// Rank the outcomes of a run against `baseline`.
    pub fn compare_networks(
        &self,
        baseline: &str,
        comparisons: &[String],
        outcomes: &[NetworkOutcome],
    ) -> Result<ComparisonResult> {
        let ids = std::iter::once(baseline).chain(comparisons.iter().map(String::as_str));
        self.networks.ensure_supported(ids)?;
        Ok(compare(baseline, comparisons, outcomes))
    }

    /// Every live fork session.
    pub fn list_active_sessions(&self) -> Vec<ForkSession> {
        self.forks.list_active()
    }

    /// Tear one session down. Unknown sessions are ignored.
    pub async fn cleanup_session(&self, key: &SessionKey) -> Result<()> {
        Ok(self.forks.teardown(key).await?)
    }

    /// Tear every session down.
    pub async fn cleanup_all(&self) -> TeardownReport {
        self.forks.teardown_all().await
    }
}
