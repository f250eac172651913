//! HD6303 instruction set: the single source of truth for opcode byte,
//! mnemonic, addressing mode, instruction length, and base cycle count.
//! Shared by the assembler's code generator, the CPU's dispatcher, and
//! the disassembler (C1 in the design).
//!
//! Opcode layout follows the Motorola 6800/6801 map, extended with the
//! HD6303-specific XGDX, SLP, and the AIM/OIM/EIM/TIM bit-manipulate
//! quartet, which reuse the addressing-mode slots the base 6800 map left
//! unused in the single-operand indexed/extended rows ($60-$6F, $70-$7F).

use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AddressingMode {
    Inherent,
    Immediate8,
    Immediate16,
    Direct,
    Extended,
    Indexed,
    Relative,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Mnemonic {
    Undefined,
    Nop, Lsrd, Asld, Tap, Tpa, Inx, Dex, Clv, Sev, Clc, Sec, Cli, Sei,
    Sba, Cba, Tab, Tba, Xgdx, Daa, Slp, Aba,
    Bra, Brn, Bhi, Bls, Bcc, Bcs, Bne, Beq, Bvc, Bvs, Bpl, Bmi, Bge, Blt, Bgt, Ble,
    Tsx, Ins, Pula, Pulb, Des, Txs, Psha, Pshb, Pulx, Rts, Abx, Rti, Pshx, Mul, Wai, Swi,
    Nega, Coma, Lsra, Rora, Asra, Asla, Rola, Deca, Inca, Tsta, Clra,
    Negb, Comb, Lsrb, Rorb, Asrb, Aslb, Rolb, Decb, Incb, Tstb, Clrb,
    Neg, Com, Lsr, Ror, Asr, Asl, Rol, Dec, Inc, Tst, Jmp, Clr,
    Suba, Cmpa, Sbca, Subd, Anda, Bita, Ldaa, Staa, Eora, Adca, Oraa, Adda, Cpx, Jsr, Lds, Sts, Bsr,
    Subb, Cmpb, Sbcb, Addd, Andb, Bitb, Ldab, Stab, Eorb, Adcb, Orab, Addb, Ldd, Std, Ldx, Stx,
    Aim, Oim, Eim, Tim,
}

impl fmt::Display for Mnemonic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", format!("{:?}", self).to_uppercase())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InstructionInfo {
    pub mnemonic: Mnemonic,
    pub mode: AddressingMode,
    pub bytes: u8,
    pub cycles: u8,
}

macro_rules! ent {
    ($m:ident, $mode:ident, $bytes:expr, $cycles:expr) => {
        InstructionInfo { mnemonic: Mnemonic::$m, mode: AddressingMode::$mode, bytes: $bytes, cycles: $cycles }
    };
}
macro_rules! und {
    () => {
        InstructionInfo { mnemonic: Mnemonic::Undefined, mode: AddressingMode::Inherent, bytes: 1, cycles: 1 }
    };
}

pub const OPCODE_TABLE: [InstructionInfo; 256] = [
    // 0x00
    und!(), ent!(Nop, Inherent, 1, 2), und!(), und!(),
    ent!(Lsrd, Inherent, 1, 3), ent!(Asld, Inherent, 1, 3), ent!(Tap, Inherent, 1, 2), ent!(Tpa, Inherent, 1, 2),
    ent!(Inx, Inherent, 1, 4), ent!(Dex, Inherent, 1, 4), ent!(Clv, Inherent, 1, 2), ent!(Sev, Inherent, 1, 2),
    ent!(Clc, Inherent, 1, 2), ent!(Sec, Inherent, 1, 2), ent!(Cli, Inherent, 1, 2), ent!(Sei, Inherent, 1, 2),
    // 0x10
    ent!(Sba, Inherent, 1, 2), ent!(Cba, Inherent, 1, 2), und!(), und!(),
    und!(), und!(), ent!(Tab, Inherent, 1, 2), ent!(Tba, Inherent, 1, 2),
    ent!(Xgdx, Inherent, 1, 3), ent!(Daa, Inherent, 1, 2), ent!(Slp, Inherent, 1, 4), ent!(Aba, Inherent, 1, 2),
    und!(), und!(), und!(), und!(),
    // 0x20
    ent!(Bra, Relative, 2, 3), ent!(Brn, Relative, 2, 3), ent!(Bhi, Relative, 2, 3), ent!(Bls, Relative, 2, 3),
    ent!(Bcc, Relative, 2, 3), ent!(Bcs, Relative, 2, 3), ent!(Bne, Relative, 2, 3), ent!(Beq, Relative, 2, 3),
    ent!(Bvc, Relative, 2, 3), ent!(Bvs, Relative, 2, 3), ent!(Bpl, Relative, 2, 3), ent!(Bmi, Relative, 2, 3),
    ent!(Bge, Relative, 2, 3), ent!(Blt, Relative, 2, 3), ent!(Bgt, Relative, 2, 3), ent!(Ble, Relative, 2, 3),
    // 0x30
    ent!(Tsx, Inherent, 1, 3), ent!(Ins, Inherent, 1, 3), ent!(Pula, Inherent, 1, 3), ent!(Pulb, Inherent, 1, 3),
    ent!(Des, Inherent, 1, 3), ent!(Txs, Inherent, 1, 3), ent!(Psha, Inherent, 1, 4), ent!(Pshb, Inherent, 1, 4),
    ent!(Pulx, Inherent, 1, 5), ent!(Rts, Inherent, 1, 5), ent!(Abx, Inherent, 1, 3), ent!(Rti, Inherent, 1, 10),
    ent!(Pshx, Inherent, 1, 4), ent!(Mul, Inherent, 1, 10), ent!(Wai, Inherent, 1, 9), ent!(Swi, Inherent, 1, 12),
    // 0x40
    ent!(Nega, Inherent, 1, 2), und!(), und!(), ent!(Coma, Inherent, 1, 2),
    ent!(Lsra, Inherent, 1, 2), und!(), ent!(Rora, Inherent, 1, 2), ent!(Asra, Inherent, 1, 2),
    ent!(Asla, Inherent, 1, 2), ent!(Rola, Inherent, 1, 2), ent!(Deca, Inherent, 1, 2), und!(),
    ent!(Inca, Inherent, 1, 2), ent!(Tsta, Inherent, 1, 2), und!(), ent!(Clra, Inherent, 1, 2),
    // 0x50
    ent!(Negb, Inherent, 1, 2), und!(), und!(), ent!(Comb, Inherent, 1, 2),
    ent!(Lsrb, Inherent, 1, 2), und!(), ent!(Rorb, Inherent, 1, 2), ent!(Asrb, Inherent, 1, 2),
    ent!(Aslb, Inherent, 1, 2), ent!(Rolb, Inherent, 1, 2), ent!(Decb, Inherent, 1, 2), und!(),
    ent!(Incb, Inherent, 1, 2), ent!(Tstb, Inherent, 1, 2), und!(), ent!(Clrb, Inherent, 1, 2),
    // 0x60
    ent!(Neg, Indexed, 2, 6), ent!(Aim, Indexed, 3, 6), ent!(Oim, Indexed, 3, 6), ent!(Com, Indexed, 2, 6),
    ent!(Lsr, Indexed, 2, 6), ent!(Eim, Indexed, 3, 6), ent!(Ror, Indexed, 2, 6), ent!(Asr, Indexed, 2, 6),
    ent!(Asl, Indexed, 2, 6), ent!(Rol, Indexed, 2, 6), ent!(Dec, Indexed, 2, 6), ent!(Tim, Indexed, 3, 6),
    ent!(Inc, Indexed, 2, 6), ent!(Tst, Indexed, 2, 6), ent!(Jmp, Indexed, 2, 3), ent!(Clr, Indexed, 2, 6),
    // 0x70
    ent!(Neg, Extended, 3, 6), ent!(Aim, Direct, 3, 6), ent!(Oim, Direct, 3, 6), ent!(Com, Extended, 3, 6),
    ent!(Lsr, Extended, 3, 6), ent!(Eim, Direct, 3, 6), ent!(Ror, Extended, 3, 6), ent!(Asr, Extended, 3, 6),
    ent!(Asl, Extended, 3, 6), ent!(Rol, Extended, 3, 6), ent!(Dec, Extended, 3, 6), ent!(Tim, Direct, 3, 6),
    ent!(Inc, Extended, 3, 6), ent!(Tst, Extended, 3, 6), ent!(Jmp, Extended, 3, 3), ent!(Clr, Extended, 3, 6),
    // 0x80
    ent!(Suba, Immediate8, 2, 2), ent!(Cmpa, Immediate8, 2, 2), ent!(Sbca, Immediate8, 2, 2), ent!(Subd, Immediate16, 3, 4),
    ent!(Anda, Immediate8, 2, 2), ent!(Bita, Immediate8, 2, 2), ent!(Ldaa, Immediate8, 2, 2), und!(),
    ent!(Eora, Immediate8, 2, 2), ent!(Adca, Immediate8, 2, 2), ent!(Oraa, Immediate8, 2, 2), ent!(Adda, Immediate8, 2, 2),
    ent!(Cpx, Immediate16, 3, 4), ent!(Bsr, Relative, 2, 6), ent!(Lds, Immediate16, 3, 3), und!(),
    // 0x90
    ent!(Suba, Direct, 2, 3), ent!(Cmpa, Direct, 2, 3), ent!(Sbca, Direct, 2, 3), ent!(Subd, Direct, 2, 5),
    ent!(Anda, Direct, 2, 3), ent!(Bita, Direct, 2, 3), ent!(Ldaa, Direct, 2, 3), ent!(Staa, Direct, 2, 3),
    ent!(Eora, Direct, 2, 3), ent!(Adca, Direct, 2, 3), ent!(Oraa, Direct, 2, 3), ent!(Adda, Direct, 2, 3),
    ent!(Cpx, Direct, 2, 4), ent!(Jsr, Direct, 2, 5), ent!(Lds, Direct, 2, 4), ent!(Sts, Direct, 2, 4),
    // 0xA0
    ent!(Suba, Indexed, 2, 4), ent!(Cmpa, Indexed, 2, 4), ent!(Sbca, Indexed, 2, 4), ent!(Subd, Indexed, 2, 6),
    ent!(Anda, Indexed, 2, 4), ent!(Bita, Indexed, 2, 4), ent!(Ldaa, Indexed, 2, 4), ent!(Staa, Indexed, 2, 4),
    ent!(Eora, Indexed, 2, 4), ent!(Adca, Indexed, 2, 4), ent!(Oraa, Indexed, 2, 4), ent!(Adda, Indexed, 2, 4),
    ent!(Cpx, Indexed, 2, 5), ent!(Jsr, Indexed, 2, 5), ent!(Lds, Indexed, 2, 5), ent!(Sts, Indexed, 2, 5),
    // 0xB0
    ent!(Suba, Extended, 3, 4), ent!(Cmpa, Extended, 3, 4), ent!(Sbca, Extended, 3, 4), ent!(Subd, Extended, 3, 6),
    ent!(Anda, Extended, 3, 4), ent!(Bita, Extended, 3, 4), ent!(Ldaa, Extended, 3, 4), ent!(Staa, Extended, 3, 4),
    ent!(Eora, Extended, 3, 4), ent!(Adca, Extended, 3, 4), ent!(Oraa, Extended, 3, 4), ent!(Adda, Extended, 3, 4),
    ent!(Cpx, Extended, 3, 5), ent!(Jsr, Extended, 3, 6), ent!(Lds, Extended, 3, 5), ent!(Sts, Extended, 3, 5),
    // 0xC0
    ent!(Subb, Immediate8, 2, 2), ent!(Cmpb, Immediate8, 2, 2), ent!(Sbcb, Immediate8, 2, 2), ent!(Addd, Immediate16, 3, 4),
    ent!(Andb, Immediate8, 2, 2), ent!(Bitb, Immediate8, 2, 2), ent!(Ldab, Immediate8, 2, 2), und!(),
    ent!(Eorb, Immediate8, 2, 2), ent!(Adcb, Immediate8, 2, 2), ent!(Orab, Immediate8, 2, 2), ent!(Addb, Immediate8, 2, 2),
    ent!(Ldd, Immediate16, 3, 3), und!(), ent!(Ldx, Immediate16, 3, 3), und!(),
    // 0xD0
    ent!(Subb, Direct, 2, 3), ent!(Cmpb, Direct, 2, 3), ent!(Sbcb, Direct, 2, 3), ent!(Addd, Direct, 2, 5),
    ent!(Andb, Direct, 2, 3), ent!(Bitb, Direct, 2, 3), ent!(Ldab, Direct, 2, 3), ent!(Stab, Direct, 2, 3),
    ent!(Eorb, Direct, 2, 3), ent!(Adcb, Direct, 2, 3), ent!(Orab, Direct, 2, 3), ent!(Addb, Direct, 2, 3),
    ent!(Ldd, Direct, 2, 4), ent!(Std, Direct, 2, 4), ent!(Ldx, Direct, 2, 4), ent!(Stx, Direct, 2, 4),
    // 0xE0
    ent!(Subb, Indexed, 2, 4), ent!(Cmpb, Indexed, 2, 4), ent!(Sbcb, Indexed, 2, 4), ent!(Addd, Indexed, 2, 6),
    ent!(Andb, Indexed, 2, 4), ent!(Bitb, Indexed, 2, 4), ent!(Ldab, Indexed, 2, 4), ent!(Stab, Indexed, 2, 4),
    ent!(Eorb, Indexed, 2, 4), ent!(Adcb, Indexed, 2, 4), ent!(Orab, Indexed, 2, 4), ent!(Addb, Indexed, 2, 4),
    ent!(Ldd, Indexed, 2, 5), ent!(Std, Indexed, 2, 5), ent!(Ldx, Indexed, 2, 5), ent!(Stx, Indexed, 2, 5),
    // 0xF0
    ent!(Subb, Extended, 3, 4), ent!(Cmpb, Extended, 3, 4), ent!(Sbcb, Extended, 3, 4), ent!(Addd, Extended, 3, 6),
    ent!(Andb, Extended, 3, 4), ent!(Bitb, Extended, 3, 4), ent!(Ldab, Extended, 3, 4), ent!(Stab, Extended, 3, 4),
    ent!(Eorb, Extended, 3, 4), ent!(Adcb, Extended, 3, 4), ent!(Orab, Extended, 3, 4), ent!(Addb, Extended, 3, 4),
    ent!(Ldd, Extended, 3, 5), ent!(Std, Extended, 3, 5), ent!(Ldx, Extended, 3, 5), ent!(Stx, Extended, 3, 5),
];

/// Mnemonics that, in immediate form, take a 16-bit operand rather than 8-bit.
pub const IMMEDIATE16_MNEMONICS: &[Mnemonic] =
    &[Mnemonic::Ldx, Mnemonic::Ldd, Mnemonic::Lds, Mnemonic::Cpx, Mnemonic::Addd, Mnemonic::Subd];

/// Mnemonics that take no operand at all (pure inherent addressing).
pub const INHERENT_ONLY_MNEMONICS: &[Mnemonic] = &[
    Mnemonic::Nop, Mnemonic::Lsrd, Mnemonic::Asld, Mnemonic::Tap, Mnemonic::Tpa, Mnemonic::Inx, Mnemonic::Dex,
    Mnemonic::Clv, Mnemonic::Sev, Mnemonic::Clc, Mnemonic::Sec, Mnemonic::Cli, Mnemonic::Sei, Mnemonic::Sba,
    Mnemonic::Cba, Mnemonic::Tab, Mnemonic::Tba, Mnemonic::Xgdx, Mnemonic::Daa, Mnemonic::Slp, Mnemonic::Aba,
    Mnemonic::Tsx, Mnemonic::Ins, Mnemonic::Pula, Mnemonic::Pulb, Mnemonic::Des, Mnemonic::Txs, Mnemonic::Psha,
    Mnemonic::Pshb, Mnemonic::Pulx, Mnemonic::Rts, Mnemonic::Abx, Mnemonic::Rti, Mnemonic::Pshx, Mnemonic::Mul,
    Mnemonic::Wai, Mnemonic::Swi, Mnemonic::Nega, Mnemonic::Coma, Mnemonic::Lsra, Mnemonic::Rora, Mnemonic::Asra,
    Mnemonic::Asla, Mnemonic::Rola, Mnemonic::Deca, Mnemonic::Inca, Mnemonic::Tsta, Mnemonic::Clra, Mnemonic::Negb,
    Mnemonic::Comb, Mnemonic::Lsrb, Mnemonic::Rorb, Mnemonic::Asrb, Mnemonic::Aslb, Mnemonic::Rolb, Mnemonic::Decb,
    Mnemonic::Incb, Mnemonic::Tstb, Mnemonic::Clrb,
];

/// Unconditional branches/jumps (no polarity pair, never subject to relaxation inversion).
pub const UNCONDITIONAL_BRANCHES: &[Mnemonic] = &[Mnemonic::Bra, Mnemonic::Bsr];

/// Conditional branch mnemonics paired with their logical inverse, used by the
/// code generator when relaxing a too-far short branch into a long-branch
/// construct (invert the condition, branch over an unconditional long jump).
pub const BRANCH_INVERSES: &[(Mnemonic, Mnemonic)] = &[
    (Mnemonic::Bhi, Mnemonic::Bls), (Mnemonic::Bls, Mnemonic::Bhi),
    (Mnemonic::Bcc, Mnemonic::Bcs), (Mnemonic::Bcs, Mnemonic::Bcc),
    (Mnemonic::Bne, Mnemonic::Beq), (Mnemonic::Beq, Mnemonic::Bne),
    (Mnemonic::Bvc, Mnemonic::Bvs), (Mnemonic::Bvs, Mnemonic::Bvc),
    (Mnemonic::Bpl, Mnemonic::Bmi), (Mnemonic::Bmi, Mnemonic::Bpl),
    (Mnemonic::Bge, Mnemonic::Blt), (Mnemonic::Blt, Mnemonic::Bge),
    (Mnemonic::Bgt, Mnemonic::Ble), (Mnemonic::Ble, Mnemonic::Bgt),
    (Mnemonic::Brn, Mnemonic::Bra),
];

/// The bit-manipulate family: AND/OR/XOR/test an immediate byte against a
/// memory operand; TIM only sets flags, it never writes back.
pub const BIT_MANIPULATE_MNEMONICS: &[Mnemonic] = &[Mnemonic::Aim, Mnemonic::Oim, Mnemonic::Eim, Mnemonic::Tim];

/// All conditional and unconditional branch mnemonics (relative addressing).
pub const BRANCH_MNEMONICS: &[Mnemonic] = &[
    Mnemonic::Bra, Mnemonic::Brn, Mnemonic::Bhi, Mnemonic::Bls, Mnemonic::Bcc, Mnemonic::Bcs, Mnemonic::Bne,
    Mnemonic::Beq, Mnemonic::Bvc, Mnemonic::Bvs, Mnemonic::Bpl, Mnemonic::Bmi, Mnemonic::Bge, Mnemonic::Blt,
    Mnemonic::Bgt, Mnemonic::Ble, Mnemonic::Bsr,
];

pub fn info_for(opcode: u8) -> InstructionInfo {
    OPCODE_TABLE[opcode as usize]
}

/// Reverse lookup: find every (opcode, mode) pair that encodes `mnemonic`.
/// Used by the assembler's code generator to pick the opcode byte for a
/// parsed (mnemonic, addressing mode) pair.
pub fn opcode_for(mnemonic: Mnemonic, mode: AddressingMode) -> Option<u8> {
    OPCODE_TABLE.iter().position(|i| i.mnemonic == mnemonic && i.mode == mode).map(|i| i as u8)
}

pub fn is_branch(mnemonic: Mnemonic) -> bool {
    BRANCH_MNEMONICS.contains(&mnemonic)
}

pub fn invert_branch(mnemonic: Mnemonic) -> Option<Mnemonic> {
    BRANCH_INVERSES.iter().find(|(m, _)| *m == mnemonic).map(|(_, inv)| *inv)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn opcode_table_has_256_entries() {
        assert_eq!(OPCODE_TABLE.len(), 256);
    }

    #[test]
    fn every_defined_opcode_has_plausible_length() {
        for info in OPCODE_TABLE.iter() {
            if info.mnemonic != Mnemonic::Undefined {
                assert!(info.bytes >= 1 && info.bytes <= 4);
                assert!(info.cycles >= 1);
            }
        }
    }

    #[test]
    fn xgdx_and_slp_present() {
        assert_eq!(OPCODE_TABLE[0x18].mnemonic, Mnemonic::Xgdx);
        assert_eq!(OPCODE_TABLE[0x1A].mnemonic, Mnemonic::Slp);
    }

    #[test]
    fn bit_manipulate_opcodes_present() {
        assert_eq!(OPCODE_TABLE[0x61].mnemonic, Mnemonic::Aim);
        assert_eq!(OPCODE_TABLE[0x71].mnemonic, Mnemonic::Aim);
        assert_eq!(OPCODE_TABLE[0x6B].mnemonic, Mnemonic::Tim);
        assert_eq!(OPCODE_TABLE[0x7B].mnemonic, Mnemonic::Tim);
    }

    #[test]
    fn tsx_opcode_is_0x30() {
        assert_eq!(OPCODE_TABLE[0x30].mnemonic, Mnemonic::Tsx);
    }

    #[test]
    fn opcode_for_roundtrips_with_info_for() {
        for (opcode, info) in OPCODE_TABLE.iter().enumerate() {
            if info.mnemonic == Mnemonic::Undefined {
                continue;
            }
            let found = opcode_for(info.mnemonic, info.mode).expect("must resolve back to an opcode");
            // Several (mnemonic, mode) pairs only ever map to one opcode byte.
            assert_eq!(info_for(found).mnemonic, info.mnemonic);
            let _ = opcode;
        }
    }
}
