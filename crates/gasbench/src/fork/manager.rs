use std::{collections::HashMap, io, sync::Arc, time::SystemTime};

use futures::future::join_all;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tokio::{
    io::{AsyncBufReadExt, AsyncReadExt, BufReader},
    process::{Child, ChildStderr},
    time::Instant,
};
use tracing::{debug, info, instrument, warn};

use super::{ForkBackend, LaunchRequest, PortAllocator};
use crate::{ForkConfig, ForkError, ForkSession, NetworkRegistry, SessionKey};

struct ForkHandle {
    session: ForkSession,
    child: Child,
}

/// Outcome of tearing down every session.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TeardownReport {
    /// Sessions that were stopped.
    pub stopped: Vec<SessionKey>,
    /// Sessions whose process could not be stopped, with the reason.
    pub failed: Vec<TeardownFailure>,
}

impl TeardownReport {
    /// Whether every session was stopped.
    pub fn is_clean(&self) -> bool {
        self.failed.is_empty()
    }
}

/// A session that could not be stopped.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TeardownFailure {
    /// The session.
    pub key: SessionKey,
    /// Why teardown failed.
    pub error: String,
}

/// Owns every live fork session.
///
/// Sessions are keyed by network and port. The registry and the port allocator are the only
/// shared state; each is guarded by its own lock and neither lock is held across an await.
pub struct ForkManager<B> {
    backend: B,
    networks: Arc<NetworkRegistry>,
    config: ForkConfig,
    ports: Arc<PortAllocator>,
    sessions: Mutex<HashMap<SessionKey, ForkHandle>>,
}

impl<B> std::fmt::Debug for ForkManager<B> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ForkManager")
            .field("config", &self.config)
            .field("sessions", &self.sessions.lock().len())
            .finish_non_exhaustive()
    }
}

impl<B: ForkBackend> ForkManager<B> {
    /// Create a manager spawning forks through `backend`.
    pub fn new(backend: B, networks: Arc<NetworkRegistry>, config: ForkConfig) -> Self {
        let ports = PortAllocator::new(config.port_range());
        Self { backend, networks, config, ports, sessions: Mutex::new(HashMap::new()) }
    }

    /// The backend.
    pub const fn backend(&self) -> &B {
        &self.backend
    }

    /// The port allocator.
    pub const fn ports(&self) -> &Arc<PortAllocator> {
        &self.ports
    }

    /// Start a fork of `network_id` and wait until it is healthy.
    ///
    /// The network is resolved before any port is taken. On any failure the process is killed
    /// and its port released; nothing is registered.
    #[instrument(skip(self), fields(port = tracing::field::Empty))]
    pub async fn create(
        &self,
        network_id: &str,
        block_number: Option<u64>,
    ) -> Result<ForkSession, ForkError> {
        let network = self.networks.resolve(network_id)?;
        let upstream = network.config.endpoint()?;
        let lease = self.ports.reserve()?;
        tracing::Span::current().record("port", lease.port());

        let request = LaunchRequest {
            network: &network,
            upstream: &upstream,
            port: lease.port(),
            block_number,
        };
        debug!("spawning fork");
        let mut child = self.backend.launch(&request).map_err(|err| ForkError::Spawn {
            network: network_id.to_string(),
            reason: err.to_string(),
        })?;

        if let Err(err) = self.wait_healthy(&request, &mut child).await {
            warn!(%err, "fork failed to start");
            if let Err(kill) = child.kill().await {
                debug!(%kill, "failed to kill unhealthy fork");
            }
            return Err(err);
        }

        let session = ForkSession {
            network_id: network_id.to_string(),
            chain_id: network.config.chain_id,
            port: lease.keep(),
            block_number,
            alive: true,
            created_at: SystemTime::now(),
        };
        info!(key = %session.key(), "fork ready");
        if let Some(stderr) = child.stderr.take() {
            tokio::spawn(forward_stderr(session.key(), stderr));
        }
        self.sessions
            .lock()
            .insert(session.key(), ForkHandle { session: session.clone(), child });
        Ok(session)
    }

    async fn wait_healthy(
        &self,
        request: &LaunchRequest<'_>,
        child: &mut Child,
    ) -> Result<(), ForkError> {
        let network = request.network.id();
        let timeout = self.config.startup_timeout();
        let deadline = Instant::now() + timeout;
        loop {
            let exited = child.try_wait().map_err(|err| ForkError::Spawn {
                network: network.to_string(),
                reason: err.to_string(),
            })?;
            if let Some(status) = exited {
                let mut stderr = String::new();
                if let Some(mut pipe) = child.stderr.take() {
                    let _ = pipe.read_to_string(&mut stderr).await;
                }
                let stderr = stderr.trim();
                let reason = if stderr.is_empty() {
                    format!("process exited with {status}")
                } else {
                    format!("process exited with {status}: {stderr}")
                };
                return Err(ForkError::Spawn { network: network.to_string(), reason });
            }

            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                return Err(ForkError::Timeout {
                    network: network.to_string(),
                    port: request.port,
                    waited: timeout,
                });
            }
            if let Ok(true) = tokio::time::timeout(remaining, self.backend.probe(request)).await {
                return Ok(());
            }
            tokio::time::sleep(self.config.probe_interval().min(remaining)).await;
        }
    }

    /// Snapshot of the session of `network_id` on `port`.
    pub fn get(&self, network_id: &str, port: u16) -> Option<ForkSession> {
        let key = SessionKey::new(network_id, port);
        self.sessions.lock().get(&key).map(|handle| handle.session.clone())
    }

    /// Connect a client to a live session.
    pub fn connect(&self, session: &ForkSession) -> Result<B::Client, ForkError> {
        self.backend.connect(session)
    }

    /// Every live session, ordered by key. Sessions whose process has exited are removed from
    /// the registry and their ports released.
    pub fn list_active(&self) -> Vec<ForkSession> {
        let mut sessions = self.sessions.lock();
        let mut crashed = Vec::new();
        for (key, handle) in &mut *sessions {
            if !matches!(handle.child.try_wait(), Ok(None)) {
                crashed.push(key.clone());
            }
        }
        for key in crashed {
            warn!(%key, "fork exited unexpectedly");
            sessions.remove(&key);
            self.ports.release(key.port);
        }
        let mut active: Vec<_> = sessions.values().map(|handle| handle.session.clone()).collect();
        active.sort_by(|a, b| a.key().cmp(&b.key()));
        active
    }

    /// Stop a session and release its port. Unknown keys are a no-op, so teardown is
    /// idempotent.
    #[instrument(skip(self, key), fields(%key))]
    pub async fn teardown(&self, key: &SessionKey) -> Result<(), ForkError> {
        let Some(handle) = self.sessions.lock().remove(key) else {
            debug!("no such session");
            return Ok(());
        };
        let result = terminate(handle.child, self.config.shutdown_grace())
            .await
            .map_err(|source| ForkError::Teardown { key: key.clone(), source });
        self.ports.release(key.port);
        if result.is_ok() {
            info!("fork stopped");
        }
        result
    }

    /// Stop every session. One failure does not prevent stopping the others.
    pub async fn teardown_all(&self) -> TeardownReport {
        let keys: Vec<_> = self.sessions.lock().keys().cloned().collect();
        let results = join_all(keys.iter().map(|key| self.teardown(key))).await;

        let mut report = TeardownReport::default();
        for (key, result) in keys.into_iter().zip(results) {
            match result {
                Ok(()) => report.stopped.push(key),
                Err(err) => report.failed.push(TeardownFailure { key, error: err.to_string() }),
            }
        }
        report.stopped.sort();
        report
    }
}

/// Log the output of a running fork until it closes its stderr.
async fn forward_stderr(key: SessionKey, stderr: ChildStderr) {
    let mut lines = BufReader::new(stderr).lines();
    while let Ok(Some(line)) = lines.next_line().await {
        debug!(%key, %line, "fork stderr");
    }
}

/// Ask the process to exit, then kill it once the grace period is over.
async fn terminate(mut child: Child, grace: std::time::Duration) -> io::Result<()> {
    if child.try_wait()?.is_some() {
        return Ok(());
    }

    #[cfg(unix)]
    if let Some(pid) = child.id() {
        use nix::{
            sys::signal::{kill, Signal},
            unistd::Pid,
        };
        if kill(Pid::from_raw(pid as i32), Signal::SIGTERM).is_ok() {
            if let Ok(status) = tokio::time::timeout(grace, child.wait()).await {
                return status.map(drop);
            }
        }
    }
    #[cfg(not(unix))]
    let _ = grace;

    match child.kill().await {
        Ok(()) => Ok(()),
        Err(_) if matches!(child.try_wait(), Ok(Some(_))) => Ok(()),
        Err(err) => Err(err),
    }
}
