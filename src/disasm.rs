//! Disassembler (C10): the inverse of `cpu::isa::OPCODE_TABLE`, plus a
//! decode-only decoder for the on-board interpreter's bytecode ("qcode")
//! used for display purposes only — this crate never executes qcode.

use crate::cpu::isa::{self, AddressingMode, Mnemonic};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DisasmLine {
    pub address: u16,
    pub mnemonic: Mnemonic,
    pub operand_text: String,
    pub bytes: Vec<u8>,
}

impl std::fmt::Display for DisasmLine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let hex: String = self.bytes.iter().map(|b| format!("{:02X} ", b)).collect();
        write!(f, "{:04X}  {:<9}{:<6}{}", self.address, hex, self.mnemonic, self.operand_text)
    }
}

/// Names well-known addresses: the semi-custom chip functions in
/// `$01C0-$03FF` and the vector table in `$FFF0-$FFFF`. Returns `None`
/// for ordinary memory.
pub fn named_address(addr: u16) -> Option<&'static str> {
    match addr {
        0x01C0 => Some("SWOFF"),
        0x0200 => Some("V21V_ON"),
        0x0240 => Some("V21V_OFF"),
        0x0280 => Some("BUZZER_ON"),
        0x02C0 => Some("BUZZER_OFF"),
        0x0300 => Some("KBD_CTR_RESET"),
        0x0340 => Some("KBD_CTR_INC"),
        0x0360 => Some("BANK_RESET"),
        0x0380 => Some("NMI_TO_CPU"),
        0x03A0 => Some("RAM_BANK_NEXT"),
        0x03C0 => Some("NMI_TO_COUNTER"),
        0x03E0 => Some("ROM_BANK_NEXT"),
        0xFFF8 => Some("OCI_VEC"),
        0xFFFA => Some("SWI_VEC"),
        0xFFFC => Some("NMI_VEC"),
        0xFFFE => Some("RESET_VEC"),
        _ => None,
    }
}

fn format_operand(mnemonic: Mnemonic, mode: AddressingMode, bytes: &[u8], pc: u16) -> String {
    match mode {
        AddressingMode::Inherent => String::new(),
        AddressingMode::Immediate8 => format!("#${:02X}", bytes[1]),
        AddressingMode::Immediate16 => format!("#${:02X}{:02X}", bytes[1], bytes[2]),
        AddressingMode::Indexed => {
            if isa::BIT_MANIPULATE_MNEMONICS.contains(&mnemonic) {
                format!("#${:02X},${:02X},X", bytes[1], bytes[2])
            } else {
                format!("${:02X},X", bytes[1])
            }
        }
        AddressingMode::Direct => {
            if isa::BIT_MANIPULATE_MNEMONICS.contains(&mnemonic) {
                format!("#${:02X},${:02X}", bytes[1], bytes[2])
            } else {
                let addr = bytes[1] as u16;
                match named_address(addr) {
                    Some(name) => format!("<${:02X} ({})", bytes[1], name),
                    None => format!("<${:02X}", bytes[1]),
                }
            }
        }
        AddressingMode::Extended => {
            let addr = ((bytes[1] as u16) << 8) | bytes[2] as u16;
            match named_address(addr) {
                Some(name) => format!("${:04X} ({})", addr, name),
                None => format!("${:04X}", addr),
            }
        }
        AddressingMode::Relative => {
            let offset = bytes[1] as i8 as i16;
            let target = (pc as i32 + bytes.len() as i32 + offset as i32) as u16;
            match named_address(target) {
                Some(name) => format!("${:04X} ({})", target, name),
                None => format!("${:04X}", target),
            }
        }
    }
}

/// Decodes one instruction starting at `bytes[0]`, which is assumed to
/// sit at address `pc`. Returns the decoded line and the number of bytes
/// consumed. If fewer bytes remain than the opcode demands, the
/// instruction is truncated to whatever is available and reported as
/// `Undefined` so callers never index past the end of the buffer.
pub fn disassemble_one(bytes: &[u8], pc: u16) -> (DisasmLine, usize) {
    if bytes.is_empty() {
        return (DisasmLine { address: pc, mnemonic: Mnemonic::Undefined, operand_text: String::new(), bytes: Vec::new() }, 0);
    }
    let opcode = bytes[0];
    let info = isa::info_for(opcode);
    let len = info.bytes as usize;
    if info.mnemonic == Mnemonic::Undefined || len > bytes.len() {
        return (
            DisasmLine { address: pc, mnemonic: Mnemonic::Undefined, operand_text: format!("${:02X}", opcode), bytes: vec![opcode] },
            1,
        );
    }
    let slice = &bytes[..len];
    let operand_text = format_operand(info.mnemonic, info.mode, slice, pc);
    (DisasmLine { address: pc, mnemonic: info.mnemonic, operand_text, bytes: slice.to_vec() }, len)
}

/// Disassembles a whole buffer starting at `base`, one instruction per line.
pub fn disassemble_range(bytes: &[u8], base: u16) -> Vec<DisasmLine> {
    let mut out = Vec::new();
    let mut offset = 0usize;
    while offset < bytes.len() {
        let pc = base.wrapping_add(offset as u16);
        let (line, consumed) = disassemble_one(&bytes[offset..], pc);
        let consumed = consumed.max(1);
        out.push(line);
        offset += consumed;
    }
    out
}

/// A handful of well-known qcode opcodes, decoded for display only.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum QcodeOp {
    PushConst(u8),
    PushVar(u8),
    Call(u16),
    Return,
    Jump(u16),
    JumpFalse(u16),
    Unknown(u8),
}

/// Decodes one qcode instruction. Never executes it — this crate treats
/// the on-board interpreter's bytecode as opaque beyond what is needed
/// to print it.
pub fn disassemble_qcode_one(bytes: &[u8]) -> (QcodeOp, usize) {
    if bytes.is_empty() {
        return (QcodeOp::Unknown(0), 0);
    }
    match bytes[0] {
        0x01 if bytes.len() >= 2 => (QcodeOp::PushConst(bytes[1]), 2),
        0x02 if bytes.len() >= 2 => (QcodeOp::PushVar(bytes[1]), 2),
        0x03 if bytes.len() >= 3 => (QcodeOp::Call(u16::from_be_bytes([bytes[1], bytes[2]])), 3),
        0x04 => (QcodeOp::Return, 1),
        0x05 if bytes.len() >= 3 => (QcodeOp::Jump(u16::from_be_bytes([bytes[1], bytes[2]])), 3),
        0x06 if bytes.len() >= 3 => (QcodeOp::JumpFalse(u16::from_be_bytes([bytes[1], bytes[2]])), 3),
        op => (QcodeOp::Unknown(op), 1),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decodes_inherent_instruction() {
        let (line, len) = disassemble_one(&[0x01], 0x1000); // NOP
        assert_eq!(line.mnemonic, Mnemonic::Nop);
        assert_eq!(len, 1);
        assert!(line.operand_text.is_empty());
    }

    #[test]
    fn decodes_extended_branch_target_by_name() {
        let (line, len) = disassemble_one(&[0xB6, 0x01, 0xC0], 0x2000); // LDAA extended
        assert_eq!(line.mnemonic, Mnemonic::Ldaa);
        assert_eq!(len, 3);
        assert!(line.operand_text.contains("SWOFF"));
    }

    #[test]
    fn decodes_relative_branch_target() {
        let (line, _) = disassemble_one(&[0x20, 0x02], 0x3000); // BRA +2
        assert_eq!(line.mnemonic, Mnemonic::Bra);
        assert_eq!(line.operand_text, "$3004");
    }

    #[test]
    fn truncated_buffer_falls_back_to_undefined() {
        let (line, len) = disassemble_one(&[0xB6, 0x01], 0x2000); // LDAA extended needs 3 bytes
        assert_eq!(line.mnemonic, Mnemonic::Undefined);
        assert_eq!(len, 1);
    }

    #[test]
    fn disassemble_range_covers_whole_buffer() {
        let lines = disassemble_range(&[0x01, 0x01, 0x20, 0x00], 0);
        assert_eq!(lines.len(), 3);
    }

    #[test]
    fn qcode_decodes_known_opcodes_and_falls_back() {
        assert_eq!(disassemble_qcode_one(&[0x04]).0, QcodeOp::Return);
        assert!(matches!(disassemble_qcode_one(&[0xEE]).0, QcodeOp::Unknown(0xEE)));
    }
}
