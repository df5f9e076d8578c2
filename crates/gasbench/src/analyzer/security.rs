//! Pattern based security heuristics. A flag marks code worth reviewing, not a proven bug.

use std::collections::BTreeMap;

use revm_bytecode::opcode::{
    BLOCKHASH, CALL, CALLCODE, COINBASE, DELEGATECALL, DIFFICULTY, GASPRICE, ISZERO, NUMBER, ORIGIN,
    SELFDESTRUCT, SSTORE, TIMESTAMP,
};
use serde::{Deserialize, Serialize};

use super::{decode::mnemonic, Instruction};
use crate::constants::analyzer::CALL_CHECK_LOOKAHEAD;

/// Severity of a security issue.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    PartialOrd,
    Ord,
    Hash,
    Serialize,
    Deserialize,
    derive_more::Display,
)]
#[serde(rename_all = "camelCase")]
pub enum Severity {
    /// Informational.
    Low,
    /// Worth reviewing.
    Medium,
    /// Likely exploitable when reachable.
    High,
}

/// Category of a security issue.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, derive_more::Display)]
#[serde(rename_all = "camelCase")]
pub enum IssueKind {
    /// Behaviour depends on transaction or block environment.
    #[display("environment-dependence")]
    EnvironmentDependence,
    /// The contract can destroy itself.
    #[display("self-destruct")]
    SelfDestruct,
    /// State is written right after an external call.
    #[display("reentrancy-risk")]
    Reentrancy,
    /// The success flag of an external call is not checked.
    #[display("unchecked-external-call")]
    UncheckedCall,
}

/// A flagged pattern.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SecurityIssue {
    /// Category.
    pub kind: IssueKind,
    /// Fixed severity of the category and opcode.
    pub severity: Severity,
    /// The opcode that triggered the flag.
    pub opcode: String,
    /// Offsets of every occurrence.
    pub pcs: Vec<usize>,
    /// Human readable explanation.
    pub description: String,
}

/// Environment-dependent opcodes and their fixed severity.
const ENVIRONMENT_OPCODES: [(u8, Severity, &str); 7] = [
    (ORIGIN, Severity::High, "tx.origin used; authorization based on it can be phished"),
    (TIMESTAMP, Severity::Low, "block.timestamp can be skewed by the block producer"),
    (NUMBER, Severity::Low, "block.number is a poor proxy for time"),
    (COINBASE, Severity::Low, "block.coinbase is chosen by the block producer"),
    (DIFFICULTY, Severity::Medium, "prevrandao is not a safe randomness source"),
    (BLOCKHASH, Severity::Medium, "blockhash is predictable and not a safe randomness source"),
    (GASPRICE, Severity::Low, "tx.gasprice is chosen by the sender"),
];

const fn is_external_call(opcode: u8) -> bool {
    matches!(opcode, CALL | CALLCODE | DELEGATECALL)
}

/// Scan the instruction stream for risky patterns.
pub(crate) fn scan(instructions: &[Instruction<'_>]) -> Vec<SecurityIssue> {
    let mut by_opcode: BTreeMap<u8, Vec<usize>> = BTreeMap::new();
    let mut issues = Vec::new();

    for (i, instruction) in instructions.iter().enumerate() {
        let opcode = instruction.opcode;
        if opcode == SELFDESTRUCT || ENVIRONMENT_OPCODES.iter().any(|(op, ..)| *op == opcode) {
            by_opcode.entry(opcode).or_default().push(instruction.pc);
        }
        if !is_external_call(opcode) {
            continue;
        }

        let following = &instructions[i + 1..];
        if opcode == CALL && following.first().is_some_and(|next| next.opcode == SSTORE) {
            issues.push(SecurityIssue {
                kind: IssueKind::Reentrancy,
                severity: Severity::High,
                opcode: instruction.mnemonic().to_string(),
                pcs: vec![instruction.pc],
                description: "storage is written immediately after an external call".to_string(),
            });
        }
        let checked =
            following.iter().take(CALL_CHECK_LOOKAHEAD).any(|next| next.opcode == ISZERO);
        if !checked {
            issues.push(SecurityIssue {
                kind: IssueKind::UncheckedCall,
                severity: Severity::Medium,
                opcode: instruction.mnemonic().to_string(),
                pcs: vec![instruction.pc],
                description: format!(
                    "return value of {} is not checked within {CALL_CHECK_LOOKAHEAD} instructions",
                    instruction.mnemonic()
                ),
            });
        }
    }

    for (opcode, pcs) in by_opcode {
        let (kind, severity, description) = if opcode == SELFDESTRUCT {
            (IssueKind::SelfDestruct, Severity::High, "contract can be destroyed")
        } else {
            let Some((_, severity, description)) =
                ENVIRONMENT_OPCODES.iter().find(|(op, ..)| *op == opcode).copied()
            else {
                continue;
            };
            (IssueKind::EnvironmentDependence, severity, description)
        };
        issues.push(SecurityIssue {
            kind,
            severity,
            opcode: mnemonic(opcode).to_string(),
            pcs,
            description: description.to_string(),
        });
    }

    issues.sort_by(|a, b| b.severity.cmp(&a.severity).then_with(|| a.pcs.cmp(&b.pcs)));
    issues
}

#[cfg(test)]
mod tests {
    use revm_bytecode::opcode::{GAS, POP, PUSH1, STOP};

    use super::*;
    use crate::analyzer::decode;

    fn kinds(code: &[u8]) -> Vec<IssueKind> {
        scan(&decode(code)).into_iter().map(|issue| issue.kind).collect()
    }

    #[test]
    fn test_call_then_sstore_is_reentrancy() {
        let issues = kinds(&[GAS, CALL, SSTORE, ISZERO, STOP]);
        assert_eq!(issues, [IssueKind::Reentrancy]);
    }

    #[test]
    fn test_unchecked_call() {
        assert_eq!(kinds(&[DELEGATECALL, POP, STOP]), [IssueKind::UncheckedCall]);
        // ISZERO beyond the lookahead window does not count.
        assert_eq!(
            kinds(&[CALLCODE, POP, POP, POP, POP, POP, ISZERO]),
            [IssueKind::UncheckedCall]
        );
        assert!(kinds(&[CALL, PUSH1, 0x00, ISZERO]).is_empty());
    }

    #[test]
    fn test_environment_opcodes_grouped() {
        let issues = scan(&decode(&[TIMESTAMP, ORIGIN, TIMESTAMP, SELFDESTRUCT]));
        assert_eq!(issues.len(), 3);
        // High severity first.
        assert_eq!(issues[0].severity, Severity::High);
        let timestamp = issues.iter().find(|i| i.opcode == "TIMESTAMP").unwrap();
        assert_eq!(timestamp.pcs, [0, 2]);
        assert_eq!(timestamp.severity, Severity::Low);
    }

    #[test]
    fn test_push_operand_is_not_flagged() {
        // 0x32 (ORIGIN) only appears as push data.
        assert!(kinds(&[PUSH1, ORIGIN, POP]).is_empty());
    }
}
