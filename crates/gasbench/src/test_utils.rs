//! Fakes for exercising the pipeline without a node.
//!
//! [`ScriptedClient`] answers like an automining dev node; [`ProcessBackend`] spawns
//! placeholder processes (`sleep`, `sh`) so the fork lifecycle is exercised for real.

use std::{
    collections::{HashMap, HashSet, VecDeque},
    io,
    process::Stdio,
    sync::Arc,
    time::{Duration, SystemTime},
};

use alloy_json_abi::JsonAbi;
use alloy_primitives::{keccak256, Address, Bytes, TxHash, TxKind, B256, U256};
use alloy_rpc_types_eth::TransactionRequest;
use parking_lot::Mutex;
use tokio::process::{Child, Command};

use crate::{
    engine::{ChainFees, ForkClient, RawReceipt},
    fees::{CostBreakdown, FeeComposition},
    fork::{ForkBackend, LaunchRequest},
    BenchmarkResult, CallOutcome, CallPlan, CallResult, CompiledArtifact, EngineError,
    FeeStrategy, ForkConfig, ForkError, ForkSession, FunctionCallReceipt,
};

/// Address every scripted deployment lands at.
pub const DEPLOYED_ADDRESS: Address = Address::repeat_byte(0xc0);

/// Gas charged by the scripted client: 21000 plus 16 per payload byte.
pub const fn scripted_gas(payload_bytes: usize) -> u64 {
    21_000 + 16 * payload_bytes as u64
}

#[derive(Debug, Default)]
struct ClientState {
    chain_id: u64,
    gas_price: u128,
    fees: ChainFees,
    code: HashMap<Address, Bytes>,
    reverting: HashSet<[u8; 4]>,
    queued: VecDeque<Result<RawReceipt, EngineError>>,
    latencies: VecDeque<Duration>,
    in_flight: usize,
    max_in_flight: usize,
    submitted: Vec<TransactionRequest>,
    funded: Vec<(Address, U256)>,
}

/// A [`ForkClient`] answering from a script. Clones share state.
#[derive(Debug, Clone, Default)]
pub struct ScriptedClient {
    state: Arc<Mutex<ClientState>>,
}

impl ScriptedClient {
    /// A client reporting `chain_id`, charging 1 gwei per gas.
    pub fn new(chain_id: u64) -> Self {
        let state = ClientState {
            chain_id,
            gas_price: 1_000_000_000,
            fees: ChainFees {
                base_fee: Some(500_000_000),
                gas_price: 1_000_000_000,
                ..Default::default()
            },
            ..Default::default()
        };
        Self { state: Arc::new(Mutex::new(state)) }
    }

    /// Report `code` at `address`.
    pub fn with_code(self, address: Address, code: Bytes) -> Self {
        self.state.lock().code.insert(address, code);
        self
    }

    /// Report `fees` as the latest fee market.
    pub fn with_fees(self, fees: ChainFees) -> Self {
        self.state.lock().fees = fees;
        self
    }

    /// Revert every call to the function with `signature`, e.g. `fail()`.
    pub fn reverting(self, signature: &str) -> Self {
        let selector = keccak256(signature.as_bytes());
        self.state.lock().reverting.insert([selector[0], selector[1], selector[2], selector[3]]);
        self
    }

    /// Answer the next submission with `response` instead of a generated receipt.
    pub fn queue(&self, response: Result<RawReceipt, EngineError>) {
        self.state.lock().queued.push_back(response);
    }

    /// Delay the receipts of the next submissions, one latency each, in order.
    pub fn with_latencies(self, latencies: impl IntoIterator<Item = Duration>) -> Self {
        self.state.lock().latencies.extend(latencies);
        self
    }

    /// Most submissions ever awaiting a receipt at the same time.
    pub fn max_in_flight(&self) -> usize {
        self.state.lock().max_in_flight
    }

    /// Every submitted transaction, in the order its receipt was produced.
    pub fn submitted(&self) -> Vec<TransactionRequest> {
        self.state.lock().submitted.clone()
    }

    /// Every funding request.
    pub fn funded(&self) -> Vec<(Address, U256)> {
        self.state.lock().funded.clone()
    }

    fn receipt(state: &ClientState, tx: &TransactionRequest) -> RawReceipt {
        let input = tx.input.input().cloned().unwrap_or_default();
        let create = matches!(tx.to, Some(TxKind::Create));
        let reverted = !create &&
            input.len() >= 4 &&
            state.reverting.contains(&[input[0], input[1], input[2], input[3]]);
        RawReceipt {
            tx_hash: B256::with_last_byte(state.submitted.len() as u8),
            success: !reverted,
            gas_used: scripted_gas(input.len()),
            effective_gas_price: state.gas_price,
            block_number: state.submitted.len() as u64,
            contract_address: create.then_some(DEPLOYED_ADDRESS),
            l1_gas_used: None,
            l1_fee: None,
        }
    }
}

impl ForkClient for ScriptedClient {
    async fn chain_id(&self) -> Result<u64, EngineError> {
        Ok(self.state.lock().chain_id)
    }

    async fn code_at(&self, address: Address) -> Result<Bytes, EngineError> {
        Ok(self.state.lock().code.get(&address).cloned().unwrap_or_default())
    }

    async fn fund(&self, account: Address, balance: U256) -> Result<(), EngineError> {
        self.state.lock().funded.push((account, balance));
        Ok(())
    }

    async fn submit(&self, tx: TransactionRequest) -> Result<RawReceipt, EngineError> {
        let latency = {
            let mut state = self.state.lock();
            state.in_flight += 1;
            state.max_in_flight = state.max_in_flight.max(state.in_flight);
            state.latencies.pop_front()
        };
        if let Some(latency) = latency {
            tokio::time::sleep(latency).await;
        }

        let mut state = self.state.lock();
        state.in_flight -= 1;
        state.submitted.push(tx.clone());
        if let Some(response) = state.queued.pop_front() {
            return response;
        }
        Ok(Self::receipt(&state, &tx))
    }

    async fn fee_snapshot(&self) -> Result<ChainFees, EngineError> {
        Ok(self.state.lock().fees)
    }
}

/// How the placeholder process of a network behaves.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Placeholder {
    /// Exits with an error right after launch.
    Failing,
    /// Runs for about a second, then exits on its own.
    Crashing,
    /// Ignores `SIGTERM`, so teardown has to kill it.
    IgnoringTerm,
    /// Writes far more to stderr than a pipe buffers, then exits.
    Chatty,
}

impl Placeholder {
    const fn script(self) -> &'static str {
        match self {
            Self::Failing => "exit 1",
            Self::Crashing => "sleep 1",
            Self::IgnoringTerm => "trap '' TERM; exec sleep 30",
            Self::Chatty => "head -c 1048576 /dev/zero | tr '\\0' x >&2; exit 0",
        }
    }
}

/// A [`ForkBackend`] spawning `sleep` as a stand-in for a healthy fork, and `sh` scripts for
/// forks that fail to start, crash later or ignore `SIGTERM`.
#[derive(Debug, Default)]
pub struct ProcessBackend {
    healthy: bool,
    placeholders: HashMap<String, Placeholder>,
    clients: Mutex<HashMap<String, ScriptedClient>>,
    launches: Mutex<Vec<LaunchRecord>>,
}

/// A recorded launch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LaunchRecord {
    /// The network.
    pub network_id: String,
    /// The port.
    pub port: u16,
    /// The pinned block.
    pub block_number: Option<u64>,
}

impl ProcessBackend {
    /// Forks that become healthy immediately.
    pub fn healthy() -> Self {
        Self { healthy: true, ..Default::default() }
    }

    /// Forks that never answer a probe.
    pub fn unresponsive() -> Self {
        Self::default()
    }

    /// Forks of `network_id` exit right after launch.
    pub fn failing(mut self, network_id: &str) -> Self {
        self.placeholders.insert(network_id.to_string(), Placeholder::Failing);
        self
    }

    /// Forks of `network_id` start healthy and exit on their own about a second later.
    pub fn crashing(mut self, network_id: &str) -> Self {
        self.placeholders.insert(network_id.to_string(), Placeholder::Crashing);
        self
    }

    /// Forks of `network_id` write 1 MiB to stderr, then exit.
    pub fn chatty(mut self, network_id: &str) -> Self {
        self.placeholders.insert(network_id.to_string(), Placeholder::Chatty);
        self
    }

    /// Forks of `network_id` ignore `SIGTERM`.
    pub fn ignoring_term(mut self, network_id: &str) -> Self {
        self.placeholders.insert(network_id.to_string(), Placeholder::IgnoringTerm);
        self
    }

    /// Connect sessions of `network_id` to `client`.
    pub fn with_client(self, network_id: &str, client: ScriptedClient) -> Self {
        self.clients.lock().insert(network_id.to_string(), client);
        self
    }

    /// The client sessions of `network_id` connect to.
    pub fn client(&self, network_id: &str, chain_id: u64) -> ScriptedClient {
        self.clients
            .lock()
            .entry(network_id.to_string())
            .or_insert_with(|| ScriptedClient::new(chain_id))
            .clone()
    }

    /// Every launch so far.
    pub fn launches(&self) -> Vec<LaunchRecord> {
        self.launches.lock().clone()
    }
}

impl ForkBackend for ProcessBackend {
    type Client = ScriptedClient;

    fn launch(&self, request: &LaunchRequest<'_>) -> io::Result<Child> {
        self.launches.lock().push(LaunchRecord {
            network_id: request.network.id().to_string(),
            port: request.port,
            block_number: request.block_number,
        });
        let mut command = match self.placeholders.get(request.network.id()) {
            Some(placeholder) => {
                let mut sh = Command::new("sh");
                sh.arg("-c").arg(placeholder.script());
                sh
            }
            None => {
                let mut sleep = Command::new("sleep");
                sleep.arg("30");
                sleep
            }
        };
        command
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
    }

    async fn probe(&self, request: &LaunchRequest<'_>) -> bool {
        self.healthy && self.placeholders.get(request.network.id()) != Some(&Placeholder::Failing)
    }

    fn connect(&self, session: &ForkSession) -> Result<Self::Client, ForkError> {
        Ok(self.client(&session.network_id, session.chain_id))
    }
}

/// Fork settings with short timeouts.
pub fn fork_config() -> ForkConfig {
    ForkConfig {
        startup_timeout_ms: 2_000,
        probe_interval_ms: 20,
        shutdown_grace_ms: 500,
        ..Default::default()
    }
}

/// A counter contract: `increment()`, `setNumber(uint256)`, `fail()` and a one-argument
/// constructor.
pub fn counter_artifact() -> Arc<CompiledArtifact> {
    let abi = JsonAbi::parse([
        "constructor(uint256 initial)",
        "function increment()",
        "function setNumber(uint256 value)",
        "function fail()",
        "function number() view returns (uint256)",
    ])
    .unwrap_or_default();
    Arc::new(CompiledArtifact::new(
        "Counter",
        Bytes::from_static(&[0x60, 0x80, 0x60, 0x40, 0x52, 0x00]),
        abi,
        "0.8.26",
        Default::default(),
    ))
}

/// A successful result costing `calls` (function, USD) on `network_id`.
pub fn priced_result(network_id: &str, calls: &[(&str, f64)], priced: bool) -> BenchmarkResult {
    let calls: Vec<_> = calls
        .iter()
        .enumerate()
        .map(|(i, (function, usd))| CallResult {
            outcome: CallOutcome::Executed(FunctionCallReceipt {
                function: function.to_string(),
                gas_used: 50_000,
                effective_gas_price: 1,
                l1_data_gas: None,
                tx_hash: TxHash::with_last_byte(i as u8),
                payload_bytes: 4,
            }),
            cost: Some(CostBreakdown {
                gas_used: 50_000,
                fees: FeeComposition::default(),
                execution_fee_wei: 0,
                total_fee_wei: 0,
                execution_cost_usd: priced.then_some(*usd),
                l1_data_cost_usd: None,
                total_cost_usd: priced.then_some(*usd),
            }),
        })
        .collect();
    let total_cost_usd =
        priced.then(|| calls.iter().filter_map(|call| call.cost.as_ref()?.total_cost_usd).sum());
    BenchmarkResult {
        network_id: network_id.to_string(),
        chain_id: 1,
        strategy: FeeStrategy::SingleMarket,
        native_token: "ETH".to_string(),
        token_price_usd: priced.then_some(1.0),
        fork_block: None,
        contract_address: DEPLOYED_ADDRESS,
        plan: CallPlan::default(),
        telemetry: None,
        deployment: None,
        total_gas_used: 50_000 * calls.len() as u64,
        calls,
        total_fee_wei: 0,
        total_cost_usd,
        warnings: Vec::new(),
    }
}

/// A session snapshot for tests that need one without spawning.
pub fn session(network_id: &str, chain_id: u64) -> ForkSession {
    ForkSession {
        network_id: network_id.to_string(),
        chain_id,
        port: 0,
        block_number: None,
        alive: true,
        created_at: SystemTime::now(),
    }
}

/// Poll `condition` until it holds or `timeout` elapses.
pub async fn eventually(timeout: Duration, mut condition: impl FnMut() -> bool) -> bool {
    let deadline = tokio::time::Instant::now() + timeout;
    while tokio::time::Instant::now() < deadline {
        if condition() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    condition()
}
