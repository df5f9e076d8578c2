//! Static bytecode analysis.
//!
//! The analyzer decodes raw bytecode into a linear instruction stream and derives size,
//! opcode distribution, security flags, an optimization score and a complexity estimate.
//! Everything here is a pure function of the bytecode.

use std::collections::{HashMap, HashSet};

use alloy_primitives::hex;
use serde::{Deserialize, Serialize};

use crate::{
    constants::{
        analyzer::TOP_OPCODES,
        size::{MAX_CODE_SIZE, NEAR_LIMIT_PERCENTAGE},
    },
    AnalyzerError,
};

mod decode;
pub use decode::*;

mod score;
pub use score::{ComplexityLevel, ComplexityReport, OptimizationReport, OptimizationSuggestion};

mod security;
pub use security::{IssueKind, SecurityIssue, Severity};

/// Size of the bytecode relative to the EIP-170 ceiling.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SizeMetrics {
    /// Length in bytes.
    pub bytes: usize,
    /// The size ceiling in bytes.
    pub limit: usize,
    /// `bytes / limit * 100`.
    pub utilization_percentage: f64,
    /// Whether utilization exceeds 90%.
    pub is_near_limit: bool,
}

impl SizeMetrics {
    /// Size metrics of `bytes` bytes of code.
    pub fn new(bytes: usize) -> Self {
        let utilization_percentage = bytes as f64 / MAX_CODE_SIZE as f64 * 100.0;
        Self {
            bytes,
            limit: MAX_CODE_SIZE,
            utilization_percentage,
            is_near_limit: utilization_percentage > NEAR_LIMIT_PERCENTAGE,
        }
    }
}

/// Frequency of one mnemonic.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OpcodeFrequency {
    /// The mnemonic.
    pub opcode: String,
    /// Number of occurrences.
    pub count: usize,
    /// Share of all instructions, in percent.
    pub percentage: f64,
}

/// Full analysis of one bytecode.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BytecodeReport {
    /// Size metrics.
    pub size: SizeMetrics,
    /// Number of decoded instructions.
    pub total_instructions: usize,
    /// Number of distinct opcodes.
    pub unique_opcodes: usize,
    /// Most frequent mnemonics, descending.
    pub opcode_distribution: Vec<OpcodeFrequency>,
    /// Flagged patterns, most severe first.
    pub security_issues: Vec<SecurityIssue>,
    /// Optimization score and suggestions.
    pub optimization: OptimizationReport,
    /// Complexity estimate.
    pub complexity: ComplexityReport,
}

/// Decode a hex string, with or without `0x` prefix.
pub fn parse_hex(bytecode: &str) -> Result<Vec<u8>, AnalyzerError> {
    let trimmed = bytecode.trim();
    let digits =
        trimmed.strip_prefix("0x").or_else(|| trimmed.strip_prefix("0X")).unwrap_or(trimmed);
    if digits.len() % 2 != 0 {
        return Err(AnalyzerError::OddLength(digits.len()));
    }
    Ok(hex::decode(digits)?)
}

/// Analyze hex encoded bytecode.
pub fn analyze(bytecode: &str) -> Result<BytecodeReport, AnalyzerError> {
    Ok(analyze_bytes(&parse_hex(bytecode)?))
}

/// Analyze raw bytecode.
pub fn analyze_bytes(code: &[u8]) -> BytecodeReport {
    let instructions = decode(code);
    let unique_opcodes = instructions.iter().map(|i| i.opcode).collect::<HashSet<_>>().len();

    BytecodeReport {
        size: SizeMetrics::new(code.len()),
        total_instructions: instructions.len(),
        unique_opcodes,
        opcode_distribution: distribution(&instructions, TOP_OPCODES),
        security_issues: security::scan(&instructions),
        optimization: score::optimization(&instructions),
        complexity: score::complexity(&instructions, unique_opcodes),
    }
}

/// Frequency of each mnemonic, descending by count then by name, truncated to `top`.
pub fn distribution(instructions: &[Instruction<'_>], top: usize) -> Vec<OpcodeFrequency> {
    let mut counts: HashMap<&'static str, usize> = HashMap::new();
    for instruction in instructions {
        *counts.entry(instruction.mnemonic()).or_default() += 1;
    }
    let total = instructions.len() as f64;
    let mut frequencies: Vec<_> = counts.into_iter().collect();
    frequencies
        .sort_unstable_by(|(a_name, a), (b_name, b)| b.cmp(a).then_with(|| a_name.cmp(b_name)));
    frequencies
        .into_iter()
        .take(top)
        .map(|(opcode, count)| OpcodeFrequency {
            opcode: opcode.to_string(),
            count,
            percentage: count as f64 / total * 100.0,
        })
        .collect()
}
