//! Disassembler
//!
//! Renders one instruction at a time in assembler-compatible form, for
//! the trace line, the monitor's `disasm` command and round-trip tests.

use crate::isa::{self, AddrMode, Reg};

/// Result of disassembling an instruction
#[derive(Debug, Clone)]
pub struct DisasmResult {
    /// Raw instruction bytes as hex (e.g. "01 00 10")
    pub bytes: String,
    /// Mnemonic with operands (e.g. "LDA [$1000]")
    pub mnemonic: String,
    /// Instruction length in bytes
    pub length: usize,
}

/// Disassemble the instruction at the start of `code`.
///
/// `addr` is the instruction's own address, used to resolve branch
/// targets. Unknown bytes render as `???` with length 1.
pub fn disassemble(code: &[u8], addr: u16) -> DisasmResult {
    let Some(&op) = code.first() else {
        return DisasmResult {
            bytes: String::new(),
            mnemonic: "???".to_string(),
            length: 0,
        };
    };

    let Some(inst) = isa::lookup(op) else {
        return DisasmResult {
            bytes: format!("{:02X}", op),
            mnemonic: "???".to_string(),
            length: 1,
        };
    };

    let length = inst.len() as usize;
    let operand1 = code.get(1).copied().unwrap_or(0);
    let operand2 = code.get(2).copied().unwrap_or(0);
    let word = operand1 as u16 | ((operand2 as u16) << 8);

    let mnemonic = match inst.mode {
        AddrMode::Implied => inst.mnemonic.to_string(),
        AddrMode::Immediate => format!("{} #${:02X}", inst.mnemonic, operand1),
        AddrMode::Register => {
            let name = Reg::from_index(operand1).map(Reg::name).unwrap_or("?");
            format!("{} {}", inst.mnemonic, name)
        }
        AddrMode::Absolute => {
            if matches!(op, isa::opcode::JMP | isa::opcode::JSR) {
                format!("{} ${:04X}", inst.mnemonic, word)
            } else {
                format!("{} [${:04X}]", inst.mnemonic, word)
            }
        }
        AddrMode::XIndexed => format!("{} [X+${:04X}]", inst.mnemonic, word),
        AddrMode::YIndexed => format!("{} [Y+${:04X}]", inst.mnemonic, word),
        AddrMode::SpIndexed => format!("{} [SP+${:02X}]", inst.mnemonic, operand1),
        AddrMode::Relative => {
            let target = addr
                .wrapping_add(inst.len())
                .wrapping_add(operand1 as i8 as u16);
            format!("{} ${:04X}", inst.mnemonic, target)
        }
    };

    let bytes = code[..length.min(code.len())]
        .iter()
        .map(|b| format!("{:02X}", b))
        .collect::<Vec<_>>()
        .join(" ");

    DisasmResult {
        bytes,
        mnemonic,
        length,
    }
}
