use revm_bytecode::opcode::{OpCode, PUSH1, PUSH32};

/// A decoded instruction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Instruction<'a> {
    /// Offset of the opcode in the bytecode.
    pub pc: usize,
    /// The opcode byte.
    pub opcode: u8,
    /// Immediate operand. Only `PUSH1..PUSH32` carry one; it is shorter than the opcode
    /// demands when the bytecode ends mid-operand.
    pub immediate: &'a [u8],
}

impl Instruction<'_> {
    /// Mnemonic of the opcode, `UNKNOWN` for undefined bytes.
    pub fn mnemonic(&self) -> &'static str {
        mnemonic(self.opcode)
    }
}

/// Mnemonic of an opcode byte, `UNKNOWN` for undefined bytes.
pub fn mnemonic(opcode: u8) -> &'static str {
    OpCode::new(opcode).map_or("UNKNOWN", |op| op.as_str())
}

/// Number of immediate bytes following `opcode`.
pub const fn immediate_size(opcode: u8) -> usize {
    match opcode {
        PUSH1..=PUSH32 => (opcode - PUSH1 + 1) as usize,
        _ => 0,
    }
}

/// Linear decoder over raw bytecode.
///
/// The immediate operand of a push is consumed together with its opcode, so operand bytes are
/// never reported as instructions.
#[derive(Debug, Clone)]
pub struct Decoder<'a> {
    code: &'a [u8],
    pc: usize,
}

impl<'a> Decoder<'a> {
    /// Decode `code` from offset zero.
    pub const fn new(code: &'a [u8]) -> Self {
        Self { code, pc: 0 }
    }
}

impl<'a> Iterator for Decoder<'a> {
    type Item = Instruction<'a>;

    fn next(&mut self) -> Option<Self::Item> {
        let pc = self.pc;
        let opcode = *self.code.get(pc)?;
        let start = pc + 1;
        let end = (start + immediate_size(opcode)).min(self.code.len());
        self.pc = end;
        Some(Instruction { pc, opcode, immediate: &self.code[start..end] })
    }
}

/// Decode `code` into its instruction stream.
pub fn decode(code: &[u8]) -> Vec<Instruction<'_>> {
    Decoder::new(code).collect()
}

#[cfg(test)]
mod tests {
    use revm_bytecode::opcode::{ADD, PUSH0, PUSH2, SSTORE, STOP};

    use super::*;

    #[test]
    fn test_push_data_is_skipped() {
        // PUSH2 0x6001 ADD: the operand looks like PUSH1 0x01 but must not be decoded.
        let code = [PUSH2, PUSH1, 0x01, ADD];
        let instructions = decode(&code);
        assert_eq!(instructions.len(), 2);
        assert_eq!(instructions[0].immediate, &[PUSH1, 0x01]);
        assert_eq!(instructions[1].pc, 3);
        assert_eq!(instructions[1].mnemonic(), "ADD");
    }

    #[test]
    fn test_truncated_push() {
        let code = [STOP, PUSH32, 0xaa, 0xbb];
        let instructions = decode(&code);
        assert_eq!(instructions.len(), 2);
        assert_eq!(instructions[1].immediate, &[0xaa, 0xbb]);
    }

    #[test]
    fn test_immediate_sizes() {
        assert_eq!(immediate_size(PUSH0), 0);
        assert_eq!(immediate_size(PUSH1), 1);
        assert_eq!(immediate_size(PUSH32), 32);
        assert_eq!(immediate_size(SSTORE), 0);
        assert_eq!(mnemonic(0x0c), "UNKNOWN");
    }
}
