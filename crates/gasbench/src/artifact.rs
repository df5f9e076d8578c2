//! Compiled artifacts, the compiler adapter seam and the artifact cache.

use std::{
    collections::HashMap,
    io::Write,
    process::{Command, Stdio},
    sync::Arc,
};

use alloy_json_abi::JsonAbi;
use alloy_primitives::{hex, Bytes, B256};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use sha2::{Digest, Sha256};
use tracing::{debug, warn};

use crate::CompileError;

/// Optimizer settings passed to the compiler.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OptimizerSettings {
    /// Whether the optimizer is enabled.
    pub enabled: bool,
    /// Expected number of contract runs.
    pub runs: u32,
}

impl Default for OptimizerSettings {
    fn default() -> Self {
        Self { enabled: true, runs: 200 }
    }
}

/// Creation bytecode and ABI of a compiled contract. Immutable once built.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CompiledArtifact {
    /// Contract name.
    pub contract_name: String,
    /// Creation bytecode.
    pub bytecode: Bytes,
    /// Contract ABI.
    pub abi: JsonAbi,
    /// Compiler version that produced the bytecode.
    pub compiler_version: String,
    /// Optimizer settings used.
    pub optimizer: OptimizerSettings,
    /// Size of the creation bytecode in bytes.
    pub size_bytes: usize,
}

impl CompiledArtifact {
    /// Build an artifact, deriving its size from the bytecode.
    pub fn new(
        contract_name: impl Into<String>,
        bytecode: Bytes,
        abi: JsonAbi,
        compiler_version: impl Into<String>,
        optimizer: OptimizerSettings,
    ) -> Self {
        let size_bytes = bytecode.len();
        Self {
            contract_name: contract_name.into(),
            bytecode,
            abi,
            compiler_version: compiler_version.into(),
            optimizer,
            size_bytes,
        }
    }

    /// Load a Hardhat or Foundry artifact file.
    ///
    /// Hardhat stores the creation code as `"bytecode": "0x…"`, Foundry as
    /// `"bytecode": {"object": "0x…"}`. Compiler metadata is picked up when present.
    pub fn from_json(json: &str) -> Result<Self, CompileError> {
        let value: Value = serde_json::from_str(json).map_err(output_error)?;
        let abi = parse_abi(&value)?;
        let bytecode = value
            .get("bytecode")
            .and_then(|code| code.as_str().or_else(|| code.get("object").and_then(Value::as_str)))
            .ok_or_else(|| CompileError::Output("artifact has no bytecode".to_string()))?;
        let bytecode = decode_bytecode(bytecode)?;
        let contract_name = value
            .get("contractName")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string();
        let compiler_version = value
            .pointer("/metadata/compiler/version")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string();
        let optimizer = value
            .pointer("/metadata/settings/optimizer")
            .and_then(|o| serde_json::from_value(o.clone()).ok())
            .unwrap_or_default();
        Ok(Self::new(contract_name, bytecode, abi, compiler_version, optimizer))
    }
}

fn output_error(err: impl std::fmt::Display) -> CompileError {
    CompileError::Output(err.to_string())
}

fn parse_abi(value: &Value) -> Result<JsonAbi, CompileError> {
    let abi = value.get("abi").cloned().unwrap_or(Value::Array(vec![]));
    serde_json::from_value(abi).map_err(|e| output_error(format!("invalid abi: {e}")))
}

fn decode_bytecode(code: &str) -> Result<Bytes, CompileError> {
    hex::decode(code.trim())
        .map(Bytes::from)
        .map_err(|e| output_error(format!("invalid bytecode: {e}")))
}

/// Input of the compiler adapter.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CompileRequest {
    /// Name of the contract to extract from the compiled source.
    pub contract_name: String,
    /// Solidity source code.
    pub source_code: String,
    /// Requested compiler version.
    pub compiler_version: String,
    /// Optimizer settings.
    pub optimizer: OptimizerSettings,
}

impl CompileRequest {
    /// Cache key: sha256 over source, compiler version and optimizer settings.
    pub fn cache_key(&self) -> B256 {
        let mut hasher = Sha256::new();
        hasher.update(self.source_code.as_bytes());
        hasher.update([0]);
        hasher.update(self.compiler_version.as_bytes());
        hasher.update([0, u8::from(self.optimizer.enabled)]);
        hasher.update(self.optimizer.runs.to_be_bytes());
        B256::from_slice(&hasher.finalize())
    }
}

/// Output of the compiler adapter.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CompileOutput {
    /// Whether compilation succeeded.
    pub success: bool,
    /// Creation bytecode.
    pub bytecode: Bytes,
    /// Contract ABI.
    pub abi: JsonAbi,
    /// Error messages.
    pub errors: Vec<String>,
    /// Warning messages.
    pub warnings: Vec<String>,
}

/// Source to bytecode compilation.
pub trait Compiler: Send + Sync {
    /// Version of the compiler, e.g. `0.8.26`.
    fn version(&self) -> Result<String, CompileError>;

    /// Compile `request.contract_name` from `request.source_code`.
    ///
    /// Fails with [`CompileError::VersionMismatch`] when the compiler is not
    /// `request.compiler_version`.
    fn compile(&self, request: &CompileRequest) -> Result<CompileOutput, CompileError>;
}

/// `0.8.26` out of `solc --version` output (`Version: 0.8.26+commit.8a97fa7a.Linux.g++`).
pub fn parse_solc_version(output: &str) -> Option<String> {
    let line = output.lines().find_map(|line| line.trim().strip_prefix("Version:"))?;
    let version = line.trim().split('+').next()?.trim();
    (!version.is_empty()).then(|| version.to_string())
}

/// Fail unless `found` is the `requested` version. Build metadata and a `v` prefix are ignored.
pub fn ensure_solc_version(requested: &str, found: &str) -> Result<(), CompileError> {
    let normalize = |version: &str| {
        let version = version.trim();
        let version = version.strip_prefix('v').unwrap_or(version);
        version.split('+').next().unwrap_or_default().to_string()
    };
    if normalize(requested) == normalize(found) {
        return Ok(());
    }
    Err(CompileError::VersionMismatch {
        requested: requested.to_string(),
        found: found.to_string(),
    })
}

/// Compiler adapter driving `solc --standard-json`.
#[derive(Debug, Clone)]
pub struct SolcCompiler {
    program: String,
}

impl Default for SolcCompiler {
    fn default() -> Self {
        Self::new("solc")
    }
}

impl SolcCompiler {
    /// Use the `solc` binary at `program`.
    pub fn new(program: impl Into<String>) -> Self {
        Self { program: program.into() }
    }

    fn standard_json_input(request: &CompileRequest) -> Value {
        json!({
            "language": "Solidity",
            "sources": { "Contract.sol": { "content": request.source_code } },
            "settings": {
                "optimizer": {
                    "enabled": request.optimizer.enabled,
                    "runs": request.optimizer.runs
                },
                "outputSelection": { "*": { "*": ["abi", "evm.bytecode.object"] } }
            }
        })
    }

    fn parse_output(
        request: &CompileRequest,
        output: &Value,
    ) -> Result<CompileOutput, CompileError> {
        let mut result = CompileOutput::default();
        for diagnostic in output.get("errors").and_then(Value::as_array).into_iter().flatten() {
            let message = diagnostic
                .get("formattedMessage")
                .or_else(|| diagnostic.get("message"))
                .and_then(Value::as_str)
                .unwrap_or_default()
                .to_string();
            match diagnostic.get("severity").and_then(Value::as_str) {
                Some("error") => result.errors.push(message),
                _ => result.warnings.push(message),
            }
        }
        if !result.errors.is_empty() {
            return Ok(result);
        }

        let pointer = format!("/contracts/Contract.sol/{}", request.contract_name);
        let Some(contract) = output.pointer(&pointer) else {
            result.errors.push(format!("contract {} not found in source", request.contract_name));
            return Ok(result);
        };
        result.abi = parse_abi(contract)?;
        let object = contract
            .pointer("/evm/bytecode/object")
            .and_then(Value::as_str)
            .ok_or_else(|| CompileError::Output("missing evm.bytecode.object".to_string()))?;
        result.bytecode = decode_bytecode(object)?;
        result.success = true;
        Ok(result)
    }
}

impl Compiler for SolcCompiler {
    fn version(&self) -> Result<String, CompileError> {
        let output = Command::new(&self.program).arg("--version").output()?;
        let stdout = String::from_utf8_lossy(&output.stdout);
        parse_solc_version(&stdout)
            .ok_or_else(|| output_error(format!("no version in `{} --version`", self.program)))
    }

    fn compile(&self, request: &CompileRequest) -> Result<CompileOutput, CompileError> {
        ensure_solc_version(&request.compiler_version, &self.version()?)?;
        debug!(contract = %request.contract_name, program = %self.program, "invoking solc");
        let mut child = Command::new(&self.program)
            .arg("--standard-json")
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()?;
        let input = serde_json::to_vec(&Self::standard_json_input(request))
            .map_err(|e| CompileError::Output(e.to_string()))?;
        child
            .stdin
            .take()
            .ok_or_else(|| CompileError::Output("solc stdin unavailable".to_string()))?
            .write_all(&input)?;
        let output = child.wait_with_output()?;
        if !output.status.success() && output.stdout.is_empty() {
            return Err(CompileError::Output(String::from_utf8_lossy(&output.stderr).into_owned()));
        }
        let value: Value = serde_json::from_slice(&output.stdout).map_err(output_error)?;
        Self::parse_output(request, &value)
    }
}

/// Cache of compiled artifacts keyed by [`CompileRequest::cache_key`].
///
/// Artifacts are a pure function of their key, so concurrent misses may both compile and the
/// last insert wins.
#[derive(Debug, Default)]
pub struct ArtifactCache {
    artifacts: RwLock<HashMap<B256, Arc<CompiledArtifact>>>,
}

impl ArtifactCache {
    /// Create an empty cache.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of cached artifacts.
    pub fn len(&self) -> usize {
        self.artifacts.read().len()
    }

    /// Whether the cache is empty.
    pub fn is_empty(&self) -> bool {
        self.artifacts.read().is_empty()
    }

    /// Return the cached artifact for `request`, compiling it on a miss.
    ///
    /// A compilation that reports `success = false` is an error and is not cached.
    pub fn get_or_compile(
        &self,
        compiler: &(impl Compiler + ?Sized),
        request: &CompileRequest,
    ) -> Result<Arc<CompiledArtifact>, CompileError> {
        let key = request.cache_key();
        if let Some(artifact) = self.artifacts.read().get(&key) {
            debug!(contract = %request.contract_name, %key, "artifact cache hit");
            return Ok(artifact.clone());
        }

        let output = compiler.compile(request)?;
        for warning in &output.warnings {
            warn!(contract = %request.contract_name, %warning, "compiler warning");
        }
        if !output.success {
            return Err(CompileError::Failed {
                contract: request.contract_name.clone(),
                errors: output.errors,
            });
        }

        let artifact = Arc::new(CompiledArtifact::new(
            request.contract_name.clone(),
            output.bytecode,
            output.abi,
            request.compiler_version.clone(),
            request.optimizer,
        ));
        self.artifacts.write().insert(key, artifact.clone());
        Ok(artifact)
    }
}
