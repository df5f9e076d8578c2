use std::{path::PathBuf, time::Duration};

use alloy_primitives::{hex::FromHexError, Address, TxHash};
use serde::{Deserialize, Serialize};

use crate::SessionKey;

/// Top level error type of the crate.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// The contract could not be compiled. Raised before any fork is spawned.
    #[error("Compilation error: {0}")]
    Compilation(#[from] CompileError),

    /// Configuration or network registry error.
    #[error("{0}")]
    Config(#[from] ConfigError),

    /// Fork session lifecycle error.
    #[error("{0}")]
    Fork(#[from] ForkError),

    /// Deployment or execution error.
    #[error("{0}")]
    Engine(#[from] EngineError),

    /// Bytecode analysis error.
    #[error("{0}")]
    Analyzer(#[from] AnalyzerError),
}

/// Result type of the crate.
pub type Result<T, E = Error> = std::result::Result<T, E>;

/// Errors raised while loading configuration or resolving networks.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// The requested network is not in the registry.
    #[error("Unsupported network: {0}")]
    UnsupportedNetwork(String),

    /// An RPC endpoint template references an environment variable that is not set.
    #[error("Network {network}: environment variable {var} is not set")]
    MissingEnv {
        /// The network whose endpoint could not be rendered.
        network: String,
        /// The missing variable.
        var: String,
    },

    /// Two registry entries share an id.
    #[error("Duplicate network id: {0}")]
    DuplicateNetwork(String),

    /// Failed to read a configuration file.
    #[error("Failed to read {path}: {source}")]
    Read {
        /// The file being read.
        path: PathBuf,
        /// The underlying IO error.
        source: std::io::Error,
    },

    /// Failed to parse a configuration document.
    #[error("Invalid configuration: {0}")]
    Parse(#[from] toml::de::Error),

    /// A configuration value is out of range or inconsistent.
    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

/// Errors raised by the compiler adapter.
#[derive(Debug, thiserror::Error)]
pub enum CompileError {
    /// The compiler reported errors.
    #[error("{contract}: {}", errors.join("; "))]
    Failed {
        /// The contract being compiled.
        contract: String,
        /// Compiler error messages.
        errors: Vec<String>,
    },

    /// The compiler could not be run.
    #[error("Failed to run compiler: {0}")]
    Io(#[from] std::io::Error),

    /// The compiler output (or an artifact file) could not be understood.
    #[error("Malformed compiler output: {0}")]
    Output(String),

    /// The installed compiler is not the requested version.
    #[error("Requested solc {requested}, but the compiler is {found}")]
    VersionMismatch {
        /// Version asked for in the request.
        requested: String,
        /// Version the compiler reports.
        found: String,
    },
}

/// Errors raised by the fork session manager.
#[derive(Debug, thiserror::Error)]
pub enum ForkError {
    /// The fork process could not be started, or exited before it became healthy.
    #[error("Failed to spawn fork of {network}: {reason}")]
    Spawn {
        /// The network being forked.
        network: String,
        /// What went wrong.
        reason: String,
    },

    /// The fork never answered a liveness probe.
    #[error("Fork of {network} on port {port} not healthy after {waited:?}")]
    Timeout {
        /// The network being forked.
        network: String,
        /// The port the fork was told to listen on.
        port: u16,
        /// How long we waited.
        waited: Duration,
    },

    /// Every port of the reserved range is taken.
    #[error("No free port in range {start}..={end}")]
    NoFreePort {
        /// First port of the range.
        start: u16,
        /// Last port of the range.
        end: u16,
    },

    /// The fork process could not be terminated.
    #[error("Failed to tear down {key}: {source}")]
    Teardown {
        /// The session being torn down.
        key: SessionKey,
        /// The underlying IO error.
        source: std::io::Error,
    },

    /// Failed to build an RPC client for a session.
    #[error("Failed to connect to fork: {0}")]
    Connect(String),

    /// The network could not be resolved.
    #[error("{0}")]
    Network(#[from] ConfigError),
}

/// Errors raised by the deployment and execution engine.
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    /// The artifact cannot be deployed; nothing was submitted.
    #[error("Invalid artifact: {0}")]
    InvalidArtifact(String),

    /// The deployment transaction failed.
    #[error("Deployment failed: {0}")]
    Deployment(String),

    /// ABI encoding failed.
    #[error("ABI error: {0}")]
    Abi(String),

    /// The fork answered with an error, or could not be reached.
    #[error("RPC error: {0}")]
    Rpc(String),

    /// No receipt arrived in time.
    #[error("Timed out after {waited:?} waiting for receipt")]
    ReceiptTimeout {
        /// The transaction hash, if the transaction was accepted.
        tx_hash: Option<TxHash>,
        /// How long we waited.
        waited: Duration,
    },

    /// The contract address has no code on the fork.
    #[error("No code at {0}")]
    MissingCode(Address),
}

/// Failure of a single function call. Recorded in the call outcome; never aborts the batch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, thiserror::Error)]
#[serde(tag = "kind", rename_all = "camelCase")]
pub enum FunctionCallError {
    /// No function with this name exists on the ABI.
    #[error("Function {function} not found in ABI")]
    UnknownFunction {
        /// The requested function.
        function: String,
    },

    /// The function exists but with a different number of parameters.
    #[error("Function {function} takes {expected:?} arguments, got {got}")]
    ArityMismatch {
        /// The requested function.
        function: String,
        /// Parameter counts of every overload.
        expected: Vec<usize>,
        /// Number of arguments supplied.
        got: usize,
    },

    /// An argument could not be coerced to its parameter type.
    #[error("Argument {index} of {function}: {reason}")]
    InvalidArgument {
        /// The requested function.
        function: String,
        /// Position of the offending argument.
        index: usize,
        /// Why coercion failed.
        reason: String,
    },

    /// The transaction was mined but reverted.
    #[error("Call to {function} reverted in {tx_hash} using {gas_used} gas")]
    Reverted {
        /// The requested function.
        function: String,
        /// The reverted transaction.
        tx_hash: TxHash,
        /// Gas burnt by the revert.
        gas_used: u64,
    },

    /// The transaction could not be submitted or its receipt could not be fetched.
    #[error("Call to {function} failed: {reason}")]
    Transport {
        /// The requested function.
        function: String,
        /// What went wrong.
        reason: String,
    },
}

impl FunctionCallError {
    /// The function the failed call targeted.
    pub fn function(&self) -> &str {
        match self {
            Self::UnknownFunction { function } |
            Self::ArityMismatch { function, .. } |
            Self::InvalidArgument { function, .. } |
            Self::Reverted { function, .. } |
            Self::Transport { function, .. } => function,
        }
    }
}

/// Degradations of the fee model. These never fail a pipeline; the affected cost fields are
/// left empty and the error is recorded as a warning.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, thiserror::Error)]
#[serde(tag = "kind", rename_all = "camelCase")]
pub enum FeeModelError {
    /// No USD price for the network's native token.
    #[error("No price for token {token}")]
    MissingTokenPrice {
        /// Price feed key of the token.
        token: String,
    },

    /// A telemetry field required by the network's fee strategy is unavailable.
    #[error("Network {network}: missing fee telemetry {field}")]
    MissingTelemetry {
        /// The network.
        network: String,
        /// The missing field.
        field: String,
    },

    /// The fee oracle could not be queried.
    #[error("Fee oracle error: {0}")]
    Oracle(String),
}

/// Errors raised while decoding bytecode.
#[derive(Debug, thiserror::Error)]
pub enum AnalyzerError {
    /// The hex string has an odd number of digits.
    #[error("Invalid hex string length: {0} (must be even)")]
    OddLength(usize),

    /// The hex string contains a non-hex character.
    #[error("Invalid hex string: {0}")]
    InvalidHex(#[from] FromHexError),
}
