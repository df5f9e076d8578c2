use std::collections::HashSet;

use revm_bytecode::opcode::*;
use serde::{Deserialize, Serialize};

use super::Instruction;
use crate::constants::analyzer::{
    BASE_OPTIMIZATION_SCORE, COMPLEXITY_FUNCTION_CEILING, COMPLEXITY_GAS_CEILING,
    EXPENSIVE_OPCODE_PENALTY, KECCAK256_SAVINGS, SLOAD_SAVINGS, SSTORE_SAVINGS,
};

/// A suggested optimization for one class of expensive opcode.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OptimizationSuggestion {
    /// The flagged opcode.
    pub opcode: String,
    /// How often it occurs.
    pub occurrences: usize,
    /// Rough gas saved if every occurrence were optimized away.
    pub estimated_savings: u64,
    /// What to do about it.
    pub suggestion: String,
}

/// Optimization score and suggestions.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OptimizationReport {
    /// `100` minus a fixed penalty per expensive opcode, floored at `0`.
    pub score: u32,
    /// Suggestions, one per flagged opcode class.
    pub suggestions: Vec<OptimizationSuggestion>,
}

const EXPENSIVE_OPCODES: [(u8, u64, &str); 3] = [
    (SLOAD, SLOAD_SAVINGS, "cache repeated storage reads in memory"),
    (SSTORE, SSTORE_SAVINGS, "batch storage writes and pack variables into fewer slots"),
    (KECCAK256, KECCAK256_SAVINGS, "precompute constant hashes and avoid hashing in loops"),
];

pub(crate) fn optimization(instructions: &[Instruction<'_>]) -> OptimizationReport {
    let mut penalty = 0u32;
    let mut suggestions = Vec::new();
    for (opcode, savings, suggestion) in EXPENSIVE_OPCODES {
        let occurrences = instructions.iter().filter(|i| i.opcode == opcode).count();
        if occurrences == 0 {
            continue;
        }
        penalty = penalty.saturating_add(
            EXPENSIVE_OPCODE_PENALTY.saturating_mul(u32::try_from(occurrences).unwrap_or(u32::MAX)),
        );
        suggestions.push(OptimizationSuggestion {
            opcode: super::decode::mnemonic(opcode).to_string(),
            occurrences,
            estimated_savings: savings * occurrences as u64,
            suggestion: suggestion.to_string(),
        });
    }
    OptimizationReport { score: BASE_OPTIMIZATION_SCORE.saturating_sub(penalty), suggestions }
}

/// Complexity bucket.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, derive_more::Display)]
pub enum ComplexityLevel {
    /// Score below 25.
    Low,
    /// Score below 50.
    Medium,
    /// Score below 75.
    High,
    /// Score of 75 and above.
    #[display("Very High")]
    #[serde(rename = "Very High")]
    VeryHigh,
}

impl ComplexityLevel {
    /// Bucket a score in `0..=100`.
    pub fn from_score(score: f64) -> Self {
        if score < 25.0 {
            Self::Low
        } else if score < 50.0 {
            Self::Medium
        } else if score < 75.0 {
            Self::High
        } else {
            Self::VeryHigh
        }
    }
}

/// Complexity estimate.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ComplexityReport {
    /// Weighted score in `0..=100`.
    pub score: f64,
    /// Bucket of the score.
    pub level: ComplexityLevel,
    /// Distinct opcodes over total instructions.
    pub diversity_ratio: f64,
    /// Number of distinct selectors matched by the dispatcher.
    pub function_count: usize,
    /// Sum of the static gas of every instruction.
    pub estimated_gas: u64,
}

pub(crate) fn complexity(
    instructions: &[Instruction<'_>],
    unique_opcodes: usize,
) -> ComplexityReport {
    let diversity_ratio = if instructions.is_empty() {
        0.0
    } else {
        unique_opcodes as f64 / instructions.len() as f64
    };
    let function_count = function_selectors(instructions).len();
    let estimated_gas = instructions.iter().map(|i| static_gas(i.opcode)).sum::<u64>();

    let function_component =
        function_count.min(COMPLEXITY_FUNCTION_CEILING) as f64 / COMPLEXITY_FUNCTION_CEILING as f64;
    let gas_component =
        estimated_gas.min(COMPLEXITY_GAS_CEILING) as f64 / COMPLEXITY_GAS_CEILING as f64;
    let score = (diversity_ratio * 40.0 + function_component * 30.0 + gas_component * 30.0)
        .clamp(0.0, 100.0);

    ComplexityReport {
        score,
        level: ComplexityLevel::from_score(score),
        diversity_ratio,
        function_count,
        estimated_gas,
    }
}

/// Selectors compared against in the dispatcher: a `PUSH4` immediately followed by `EQ`.
pub(crate) fn function_selectors<'a>(instructions: &[Instruction<'a>]) -> HashSet<&'a [u8]> {
    instructions
        .windows(2)
        .filter(|pair| pair[0].opcode == PUSH4 && pair[1].opcode == EQ)
        .map(|pair| pair[0].immediate)
        .collect()
}

/// Static (minimum) gas of an opcode. Dynamic components such as memory expansion, cold
/// access surcharges and copy costs are ignored, except that storage and account access are
/// priced cold.
pub(crate) const fn static_gas(opcode: u8) -> u64 {
    match opcode {
        STOP | RETURN | REVERT | INVALID => 0,
        JUMPDEST => 1,
        ADDRESS | ORIGIN | CALLER | CALLVALUE | CALLDATASIZE | CODESIZE | GASPRICE |
        COINBASE | TIMESTAMP | NUMBER | DIFFICULTY | GASLIMIT | CHAINID | RETURNDATASIZE |
        POP | PC | MSIZE | GAS | BASEFEE | BLOBBASEFEE | PUSH0 => 2,
        ADD | SUB | NOT | LT | GT | SLT | SGT | EQ | ISZERO | AND | OR | XOR | BYTE | SHL |
        SHR | SAR | CALLDATALOAD | MLOAD | MSTORE | MSTORE8 | CALLDATACOPY | CODECOPY |
        RETURNDATACOPY | MCOPY | BLOBHASH => 3,
        PUSH1..=PUSH32 | DUP1..=DUP16 | SWAP1..=SWAP16 => 3,
        MUL | DIV | SDIV | MOD | SMOD | SIGNEXTEND | SELFBALANCE => 5,
        ADDMOD | MULMOD | JUMP => 8,
        JUMPI | EXP => 10,
        BLOCKHASH => 20,
        KECCAK256 => 30,
        TLOAD | TSTORE => 100,
        LOG0..=LOG4 => 375 * (opcode - LOG0 + 1) as u64,
        SLOAD => 2_100,
        BALANCE | EXTCODESIZE | EXTCODECOPY | EXTCODEHASH => 2_600,
        CALL | CALLCODE | DELEGATECALL | STATICCALL => 2_600,
        SELFDESTRUCT => 5_000,
        SSTORE => 20_000,
        CREATE | CREATE2 => 32_000,
        _ => 0,
    }
}
