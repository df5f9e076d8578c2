use std::{future::Future, io, process::Stdio, time::Duration};

use tokio::process::{Child, Command};

use crate::{
    constants::fork::LOCAL_HOST,
    engine::{ForkClient, RpcForkClient},
    EngineConfig, ForkConfig, ForkError, ForkSession, Network,
};

/// Everything a backend needs to start one fork.
#[derive(Debug, Clone, Copy)]
pub struct LaunchRequest<'a> {
    /// The network being forked.
    pub network: &'a Network,
    /// Rendered upstream RPC endpoint.
    pub upstream: &'a str,
    /// Local port the fork must listen on.
    pub port: u16,
    /// Block to pin the fork at, latest when `None`.
    pub block_number: Option<u64>,
}

/// Starts fork processes and talks to them.
///
/// The manager owns the process lifecycle (health polling, timeouts, teardown); a backend only
/// knows how to launch a process, how to tell it is healthy and how to connect to it.
pub trait ForkBackend: Send + Sync {
    /// Client used to drive a healthy fork.
    type Client: ForkClient;

    /// Start the fork process. The returned child must be killed when dropped.
    fn launch(&self, request: &LaunchRequest<'_>) -> io::Result<Child>;

    /// Whether the fork answers on its port with the expected chain id.
    fn probe(&self, request: &LaunchRequest<'_>) -> impl Future<Output = bool> + Send;

    /// Connect a client to a healthy session.
    fn connect(&self, session: &ForkSession) -> Result<Self::Client, ForkError>;
}

/// Backend spawning `anvil` processes.
#[derive(Debug, Clone)]
pub struct AnvilBackend {
    program: String,
    extra_args: Vec<String>,
    receipt_timeout: Duration,
}

impl AnvilBackend {
    /// Create a backend from configuration.
    pub fn new(fork: &ForkConfig, engine: &EngineConfig) -> Self {
        Self {
            program: fork.anvil_path.clone(),
            extra_args: fork.extra_args.clone(),
            receipt_timeout: engine.receipt_timeout(),
        }
    }

    /// The command line used for `request`.
    pub fn command(&self, request: &LaunchRequest<'_>) -> Command {
        let mut command = Command::new(&self.program);
        command
            .arg("--fork-url")
            .arg(request.upstream)
            .arg("--host")
            .arg(LOCAL_HOST)
            .arg("--port")
            .arg(request.port.to_string())
            .arg("--chain-id")
            .arg(request.network.config.chain_id.to_string())
            .arg("--silent");
        if let Some(block) = request.block_number {
            command.arg("--fork-block-number").arg(block.to_string());
        }
        command.args(&self.extra_args);
        command
    }
}

impl ForkBackend for AnvilBackend {
    type Client = RpcForkClient;

    fn launch(&self, request: &LaunchRequest<'_>) -> io::Result<Child> {
        self.command(request)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
    }

    async fn probe(&self, request: &LaunchRequest<'_>) -> bool {
        let endpoint = crate::local_endpoint(request.port);
        let Ok(client) = RpcForkClient::connect(&endpoint, self.receipt_timeout) else {
            return false;
        };
        matches!(client.chain_id().await, Ok(id) if id == request.network.config.chain_id)
    }

    fn connect(&self, session: &ForkSession) -> Result<Self::Client, ForkError> {
        RpcForkClient::connect(&session.endpoint(), self.receipt_timeout)
            .map_err(|err| ForkError::Connect(err.to_string()))
    }
}
