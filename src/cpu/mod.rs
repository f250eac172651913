//! The HD6303 core: registers, the fetch/dispatch/execute loop, interrupt
//! entry, and single-step mode (C7).
//!
//! The CPU never owns memory, the display, the keyboard, or packs — it
//! only holds a trait-object back-reference to whatever implements
//! `BusAccess`. This keeps the ownership graph a tree (emulator -> bus ->
//! memory/display/keyboard/packs) with no cycles, per the project's
//! single-ownership architecture.

pub mod alu;
pub mod isa;

use self::isa::{AddressingMode, Mnemonic, info_for};
use crate::error::EmuError;

/// Condition-code bit positions within the processor-status byte. Bits 6
/// and 7 always read as 1.
pub mod ccr {
    pub const C: u8 = 0x01;
    pub const V: u8 = 0x02;
    pub const Z: u8 = 0x04;
    pub const N: u8 = 0x08;
    pub const I: u8 = 0x10;
    pub const H: u8 = 0x20;
    pub const ALWAYS_SET: u8 = 0xC0;
}

/// The capability set the CPU needs from whatever it's plugged into.
/// Implemented by `crate::bus::Bus`; kept as a trait so `Cpu` has no
/// concrete dependency on the bus type.
pub trait BusAccess {
    fn read(&mut self, addr: u16) -> u8;
    fn write(&mut self, addr: u16, value: u8);
    fn is_nmi_due(&mut self) -> bool;
    fn is_oci_due(&mut self) -> bool;
    fn inc_frame(&mut self, cycles: u8);
    fn is_switched_off(&self) -> bool;
}

const RESET_VECTOR: u16 = 0xFFFE;
const NMI_VECTOR: u16 = 0xFFFC;
const SWI_VECTOR: u16 = 0xFFFA;
const OCI_VECTOR: u16 = 0xFFF8;

const NMI_ENTRY_CYCLES: u8 = 11;
const OCI_ENTRY_CYCLES: u8 = 11;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Registers {
    pub a: u8,
    pub b: u8,
    pub x: u16,
    pub sp: u16,
    pub pc: u16,
    pub flags: u8,
}

pub struct Cpu {
    pub a: u8,
    pub b: u8,
    pub x: u16,
    pub sp: u16,
    pub pc: u16,
    pub flags: u8,
    pub sleep: bool,
    on_instruction: Option<Box<dyn FnMut(u16, u8, Registers) -> bool>>,
    on_memory_read: Option<Box<dyn FnMut(u16, u8, Registers) -> bool>>,
    on_memory_write: Option<Box<dyn FnMut(u16, u8, Registers) -> bool>>,
    stop_requested: bool,
}

impl Cpu {
    pub fn new() -> Self {
        Cpu {
            a: 0, b: 0, x: 0, sp: 0, pc: 0, flags: ccr::ALWAYS_SET,
            on_instruction: None,
            on_memory_read: None,
            on_memory_write: None,
            stop_requested: false,
        }
    }

    pub fn set_on_instruction(&mut self, hook: Box<dyn FnMut(u16, u8, Registers) -> bool>) {
        self.on_instruction = Some(hook);
    }

    pub fn set_on_memory_read(&mut self, hook: Box<dyn FnMut(u16, u8, Registers) -> bool>) {
        self.on_memory_read = Some(hook);
    }

    pub fn set_on_memory_write(&mut self, hook: Box<dyn FnMut(u16, u8, Registers) -> bool>) {
        self.on_memory_write = Some(hook);
    }

    pub fn clear_hooks(&mut self) {
        self.on_instruction = None;
        self.on_memory_read = None;
        self.on_memory_write = None;
    }

    pub fn registers(&self) -> Registers {
        Registers { a: self.a, b: self.b, x: self.x, sp: self.sp, pc: self.pc, flags: self.flags }
    }

    pub fn snapshot(&self) -> Vec<u8> {
        vec![
            self.a,
            self.b,
            (self.x >> 8) as u8,
            self.x as u8,
            (self.sp >> 8) as u8,
            self.sp as u8,
            (self.pc >> 8) as u8,
            self.pc as u8,
            self.flags,
            self.sleep as u8,
        ]
    }

    pub fn apply_snapshot(&mut self, bytes: &[u8]) {
        self.a = bytes[0];
        self.b = bytes[1];
        self.x = ((bytes[2] as u16) << 8) | bytes[3] as u16;
        self.sp = ((bytes[4] as u16) << 8) | bytes[5] as u16;
        self.pc = ((bytes[6] as u16) << 8) | bytes[7] as u16;
        self.flags = bytes[8];
        self.sleep = bytes[9] != 0;
    }

    pub fn d(&self) -> u16 {
        ((self.a as u16) << 8) | self.b as u16
    }

    pub fn set_d(&mut self, value: u16) {
        self.a = (value >> 8) as u8;
        self.b = value as u8;
    }

    pub fn flag(&self, mask: u8) -> bool {
        self.flags & mask != 0
    }

    fn set_flag(&mut self, mask: u8, value: bool) {
        if value {
            self.flags |= mask;
        } else {
            self.flags &= !mask;
        }
        self.flags |= ccr::ALWAYS_SET;
    }

    fn apply(&mut self, f: alu::Flags) {
        if let Some(v) = f.h {
            self.set_flag(ccr::H, v);
        }
        if let Some(v) = f.i {
            self.set_flag(ccr::I, v);
        }
        if let Some(v) = f.n {
            self.set_flag(ccr::N, v);
        }
        if let Some(v) = f.z {
            self.set_flag(ccr::Z, v);
        }
        if let Some(v) = f.v {
            self.set_flag(ccr::V, v);
        }
        if let Some(v) = f.c {
            self.set_flag(ccr::C, v);
        }
    }

    /// Loads `pc` from the reset vector and sets all visible flags high.
    pub fn reset(&mut self, bus: &mut dyn BusAccess) {
        self.a = 0;
        self.b = 0;
        self.x = 0;
        self.sp = 0x01FF;
        self.flags = 0xFF;
        self.sleep = false;
        self.pc = self.read16(bus, RESET_VECTOR);
    }

    fn read16(&self, bus: &mut dyn BusAccess, addr: u16) -> u16 {
        let hi = bus.read(addr) as u16;
        let lo = bus.read(addr.wrapping_add(1)) as u16;
        (hi << 8) | lo
    }

    fn mem_read(&mut self, bus: &mut dyn BusAccess, addr: u16) -> u8 {
        let value = bus.read(addr);
        if let Some(mut hook) = self.on_memory_read.take() {
            if !hook(addr, value, self.registers()) {
                self.stop_requested = true;
            }
            self.on_memory_read = Some(hook);
        }
        value
    }

    fn mem_write(&mut self, bus: &mut dyn BusAccess, addr: u16, value: u8) {
        if let Some(mut hook) = self.on_memory_write.take() {
            if !hook(addr, value, self.registers()) {
                self.stop_requested = true;
            }
            self.on_memory_write = Some(hook);
        }
        bus.write(addr, value);
    }

    fn push8(&mut self, bus: &mut dyn BusAccess, value: u8) {
        self.mem_write(bus, self.sp, value);
        self.sp = self.sp.wrapping_sub(1);
    }

    fn pop8(&mut self, bus: &mut dyn BusAccess) -> u8 {
        self.sp = self.sp.wrapping_add(1);
        self.mem_read(bus, self.sp)
    }

    fn push16(&mut self, bus: &mut dyn BusAccess, value: u16) {
        self.push8(bus, value as u8);
        self.push8(bus, (value >> 8) as u8);
    }

    fn pop16(&mut self, bus: &mut dyn BusAccess) -> u16 {
        let hi = self.pop8(bus) as u16;
        let lo = self.pop8(bus) as u16;
        (hi << 8) | lo
    }

    fn check_stack(&self) -> Result<(), EmuError> {
        let sp = self.sp;
        let wandered = (sp > 0 && sp < 0x00E0) || (sp >= 0x0100 && sp < 0x0400) || sp > 0x8000;
        if wandered {
            return Err(EmuError::StackError { sp, pc: self.pc });
        }
        Ok(())
    }

    /// Pushes PC, X, A, B, flags (low to high stack order), sets I, loads
    /// PC from `vector`.
    fn enter_interrupt(&mut self, bus: &mut dyn BusAccess, vector: u16) {
        self.push16(bus, self.pc);
        self.push16(bus, self.x);
        self.push8(bus, self.a);
        self.push8(bus, self.b);
        self.push8(bus, self.flags);
        self.set_flag(ccr::I, true);
        self.sleep = false;
        self.pc = self.read16(bus, vector);
    }

    fn rti(&mut self, bus: &mut dyn BusAccess) {
        self.flags = self.pop8(bus) | ccr::ALWAYS_SET;
        self.b = self.pop8(bus);
        self.a = self.pop8(bus);
        self.x = self.pop16(bus);
        self.pc = self.pop16(bus);
    }

    /// Reads the operand address/value for a given addressing mode,
    /// advancing `pc` past the instruction. Returns the effective address
    /// for modes that have one (direct/extended/indexed), or `None` for
    /// inherent/immediate/relative, whose value is returned separately.
    fn operand_addr(&mut self, bus: &mut dyn BusAccess, mode: AddressingMode) -> Option<u16> {
        match mode {
            AddressingMode::Direct => {
                let addr = self.mem_read(bus, self.pc.wrapping_add(1)) as u16;
                self.pc = self.pc.wrapping_add(2);
                Some(addr)
            }
            AddressingMode::Extended => {
                let addr = self.read16(bus, self.pc.wrapping_add(1));
                self.pc = self.pc.wrapping_add(3);
                Some(addr)
            }
            AddressingMode::Indexed => {
                let offset = self.mem_read(bus, self.pc.wrapping_add(1)) as u16;
                self.pc = self.pc.wrapping_add(2);
                Some(self.x.wrapping_add(offset))
            }
            _ => None,
        }
    }

    fn imm8(&mut self, bus: &mut dyn BusAccess) -> u8 {
        let v = self.mem_read(bus, self.pc.wrapping_add(1));
        self.pc = self.pc.wrapping_add(2);
        v
    }

    fn imm16(&mut self, bus: &mut dyn BusAccess) -> u16 {
        let v = self.read16(bus, self.pc.wrapping_add(1));
        self.pc = self.pc.wrapping_add(3);
        v
    }

    fn skip_inherent(&mut self) {
        self.pc = self.pc.wrapping_add(1);
    }

    /// Undefined opcodes write `$00` to the switch-off address — the real
    /// hardware's reaction to executing garbage.
    fn switch_off(&mut self, bus: &mut dyn BusAccess) {
        self.mem_write(bus, 0x01C0, 0x00);
        self.pc = self.pc.wrapping_add(1);
    }

    /// Runs until `cycles_consumed >= budget` or a hook requests exit.
    /// Not "run exactly `budget` cycles" — see the module-level contract.
    pub fn execute(&mut self, bus: &mut dyn BusAccess, budget: u32) -> Result<u32, EmuError> {
        let mut consumed = 0u32;
        while consumed < budget {
            if bus.is_nmi_due() {
                self.enter_interrupt(bus, NMI_VECTOR);
                bus.inc_frame(NMI_ENTRY_CYCLES);
                consumed += NMI_ENTRY_CYCLES as u32;
                continue;
            }
            if !self.flag(ccr::I) && bus.is_oci_due() {
                self.enter_interrupt(bus, OCI_VECTOR);
                bus.inc_frame(OCI_ENTRY_CYCLES);
                consumed += OCI_ENTRY_CYCLES as u32;
                continue;
            }
            self.check_stack()?;

            if self.sleep || bus.is_switched_off() {
                bus.inc_frame(1);
                consumed += 1;
                continue;
            }

            let pc_at_fetch = self.pc;
            let opcode = self.mem_read(bus, self.pc);
            if self.stop_requested {
                self.stop_requested = false;
                return Ok(consumed);
            }
            if let Some(mut hook) = self.on_instruction.take() {
                let keep_going = hook(pc_at_fetch, opcode, self.registers());
                self.on_instruction = Some(hook);
                if !keep_going {
                    return Ok(consumed);
                }
            }
            let cycles = self.dispatch(bus, opcode);
            bus.inc_frame(cycles);
            consumed += cycles as u32;
            if self.stop_requested {
                self.stop_requested = false;
                return Ok(consumed);
            }
        }
        Ok(consumed)
    }

    /// Executes exactly one instruction with hooks disabled; deterministic
    /// single-stepping for a debugger.
    pub fn step(&mut self, bus: &mut dyn BusAccess) -> Result<u32, EmuError> {
        let saved_instr = self.on_instruction.take();
        let saved_read = self.on_memory_read.take();
        let saved_write = self.on_memory_write.take();

        if bus.is_nmi_due() {
            self.enter_interrupt(bus, NMI_VECTOR);
            bus.inc_frame(NMI_ENTRY_CYCLES);
            self.on_instruction = saved_instr;
            self.on_memory_read = saved_read;
            self.on_memory_write = saved_write;
            return Ok(NMI_ENTRY_CYCLES as u32);
        }
        if !self.flag(ccr::I) && bus.is_oci_due() {
            self.enter_interrupt(bus, OCI_VECTOR);
            bus.inc_frame(OCI_ENTRY_CYCLES);
            self.on_instruction = saved_instr;
            self.on_memory_read = saved_read;
            self.on_memory_write = saved_write;
            return Ok(OCI_ENTRY_CYCLES as u32);
        }
        self.check_stack()?;

        let cycles = if self.sleep || bus.is_switched_off() {
            bus.inc_frame(1);
            1
        } else {
            let opcode = self.mem_read(bus, self.pc);
            let c = self.dispatch(bus, opcode);
            bus.inc_frame(c);
            c as u32
        };

        self.on_instruction = saved_instr;
        self.on_memory_read = saved_read;
        self.on_memory_write = saved_write;
        Ok(cycles)
    }

    fn branch_taken(&self, mnemonic: Mnemonic) -> bool {
        use Mnemonic::*;
        let c = self.flag(ccr::C);
        let z = self.flag(ccr::Z);
        let n = self.flag(ccr::N);
        let v = self.flag(ccr::V);
        match mnemonic {
            Bra | Bsr => true,
            Brn => false,
            Bhi => !c && !z,
            Bls => c || z,
            Bcc => !c,
            Bcs => c,
            Bne => !z,
            Beq => z,
            Bvc => !v,
            Bvs => v,
            Bpl => !n,
            Bmi => n,
            Bge => n == v,
            Blt => n != v,
            Bgt => !z && (n == v),
            Ble => z || (n != v),
            _ => false,
        }
    }

    fn do_branch(&mut self, bus: &mut dyn BusAccess, mnemonic: Mnemonic) {
        let offset = self.mem_read(bus, self.pc.wrapping_add(1)) as i8;
        let next = self.pc.wrapping_add(2);
        if mnemonic == Mnemonic::Bsr {
            self.push16(bus, next);
        }
        self.pc = if self.branch_taken(mnemonic) {
            next.wrapping_add(offset as i16 as u16)
        } else {
            next
        };
    }

    /// Decodes and executes one instruction; returns its cycle cost.
    fn dispatch(&mut self, bus: &mut dyn BusAccess, opcode: u8) -> u8 {
        use Mnemonic::*;
        let info = info_for(opcode);
        let mnemonic = info.mnemonic;
        let mode = info.mode;

        if mnemonic == Undefined {
            self.switch_off(bus);
            return info.cycles;
        }

        if isa::is_branch(mnemonic) {
            self.do_branch(bus, mnemonic);
            return info.cycles;
        }

        match mnemonic {
            // Inherent flag/register ops.
            Nop => self.skip_inherent(),
            Tap => { self.flags = self.a | ccr::ALWAYS_SET; self.skip_inherent(); }
            Tpa => { self.a = self.flags; self.skip_inherent(); }
            Clc => { self.set_flag(ccr::C, false); self.skip_inherent(); }
            Sec => { self.set_flag(ccr::C, true); self.skip_inherent(); }
            Cli => { self.set_flag(ccr::I, false); self.skip_inherent(); }
            Sei => { self.set_flag(ccr::I, true); self.skip_inherent(); }
            Clv => { self.set_flag(ccr::V, false); self.skip_inherent(); }
            Sev => { self.set_flag(ccr::V, true); self.skip_inherent(); }
            Sba => { let (r, f) = alu::sub8(self.a, self.b, false); self.a = r; self.apply(f); self.skip_inherent(); }
            Cba => { let f = alu::test_sub8(self.a, self.b); self.apply(f); self.skip_inherent(); }
            Aba => { let (r, f) = alu::add8(self.a, self.b, false); self.a = r; self.apply(f); self.skip_inherent(); }
            Tab => { self.b = self.a; let f = alu::test8(self.b); self.apply(f); self.skip_inherent(); }
            Tba => { self.a = self.b; let f = alu::test8(self.a); self.apply(f); self.skip_inherent(); }
            Daa => {
                let (r, f) = alu::daa(self.a, self.flag(ccr::H), self.flag(ccr::C));
                self.a = r;
                self.apply(f);
                self.skip_inherent();
            }
            // TSX on HD6303 copies SP directly (no 6800 off-by-one).
            Tsx => { self.x = self.sp; self.skip_inherent(); }
            Txs => { self.sp = self.x; self.skip_inherent(); }
            Ins => { self.sp = self.sp.wrapping_add(1); self.skip_inherent(); }
            Des => { self.sp = self.sp.wrapping_sub(1); self.skip_inherent(); }
            Inx => { self.x = self.x.wrapping_add(1); self.set_flag(ccr::Z, self.x == 0); self.skip_inherent(); }
            Dex => { self.x = self.x.wrapping_sub(1); self.set_flag(ccr::Z, self.x == 0); self.skip_inherent(); }
            Abx => { self.x = self.x.wrapping_add(self.b as u16); self.skip_inherent(); }
            Xgdx => {
                let d = self.d();
                self.set_d(self.x);
                self.x = d;
                self.skip_inherent();
            }
            Mul => { self.set_d((self.a as u16) * (self.b as u16)); self.set_flag(ccr::C, self.b & 0x80 != 0); self.skip_inherent(); }
            Slp => { self.sleep = true; self.skip_inherent(); }
            Lsrd => { let (r, f) = alu::lsr16(self.d()); self.set_d(r); self.apply(f); self.skip_inherent(); }
            Asld => { let (r, f) = alu::asl16(self.d()); self.set_d(r); self.apply(f); self.skip_inherent(); }

            // Stack ops.
            Psha => { self.push8(bus, self.a); self.skip_inherent(); }
            Pula => { self.a = self.pop8(bus); self.skip_inherent(); }
            Pshb => { self.push8(bus, self.b); self.skip_inherent(); }
            Pulb => { self.b = self.pop8(bus); self.skip_inherent(); }
            Pshx => { self.push16(bus, self.x); self.skip_inherent(); }
            Pulx => { self.x = self.pop16(bus); self.skip_inherent(); }

            // Control flow.
            Jmp => { self.pc = self.operand_addr(bus, mode).unwrap(); }
            Jsr => {
                let addr = self.operand_addr(bus, mode).unwrap();
                self.push16(bus, self.pc);
                self.pc = addr;
            }
            Rts => { self.pc = self.pop16(bus); }
            Rti => self.rti(bus),
            Swi => self.enter_interrupt(bus, SWI_VECTOR),
            Wai => { self.sleep = true; self.skip_inherent(); }

            // Single-operand accumulator ops.
            Nega => { let (r, f) = alu::neg8(self.a); self.a = r; self.apply(f); self.skip_inherent(); }
            Coma => { let (r, f) = alu::com8(self.a); self.a = r; self.apply(f); self.skip_inherent(); }
            Lsra => { let (r, f) = alu::lsr8(self.a); self.a = r; self.apply(f); self.skip_inherent(); }
            Rora => { let (r, f) = alu::ror8(self.a, self.flag(ccr::C)); self.a = r; self.apply(f); self.skip_inherent(); }
            Asra => { let (r, f) = alu::asr8(self.a); self.a = r; self.apply(f); self.skip_inherent(); }
            Asla => { let (r, f) = alu::asl8(self.a); self.a = r; self.apply(f); self.skip_inherent(); }
            Rola => { let (r, f) = alu::rol8(self.a, self.flag(ccr::C)); self.a = r; self.apply(f); self.skip_inherent(); }
            Deca => { let (r, f) = alu::dec8(self.a); self.a = r; self.apply(f); self.skip_inherent(); }
            Inca => { let (r, f) = alu::inc8(self.a); self.a = r; self.apply(f); self.skip_inherent(); }
            Tsta => { let f = alu::test8(self.a); self.apply(f); self.skip_inherent(); }
            Clra => { let (r, f) = alu::clr8(); self.a = r; self.apply(f); self.skip_inherent(); }

            Negb => { let (r, f) = alu::neg8(self.b); self.b = r; self.apply(f); self.skip_inherent(); }
            Comb => { let (r, f) = alu::com8(self.b); self.b = r; self.apply(f); self.skip_inherent(); }
            Lsrb => { let (r, f) = alu::lsr8(self.b); self.b = r; self.apply(f); self.skip_inherent(); }
            Rorb => { let (r, f) = alu::ror8(self.b, self.flag(ccr::C)); self.b = r; self.apply(f); self.skip_inherent(); }
            Asrb => { let (r, f) = alu::asr8(self.b); self.b = r; self.apply(f); self.skip_inherent(); }
            Aslb => { let (r, f) = alu::asl8(self.b); self.b = r; self.apply(f); self.skip_inherent(); }
            Rolb => { let (r, f) = alu::rol8(self.b, self.flag(ccr::C)); self.b = r; self.apply(f); self.skip_inherent(); }
            Decb => { let (r, f) = alu::dec8(self.b); self.b = r; self.apply(f); self.skip_inherent(); }
            Incb => { let (r, f) = alu::inc8(self.b); self.b = r; self.apply(f); self.skip_inherent(); }
            Tstb => { let f = alu::test8(self.b); self.apply(f); self.skip_inherent(); }
            Clrb => { let (r, f) = alu::clr8(); self.b = r; self.apply(f); self.skip_inherent(); }

            // Single-operand memory ops (indexed/extended).
            Neg | Com | Lsr | Ror | Asr | Asl | Rol | Dec | Inc | Tst | Clr => {
                let addr = self.operand_addr(bus, mode).unwrap();
                let v = self.mem_read(bus, addr);
                let (r, f) = match mnemonic {
                    Neg => alu::neg8(v),
                    Com => alu::com8(v),
                    Lsr => alu::lsr8(v),
                    Ror => alu::ror8(v, self.flag(ccr::C)),
                    Asr => alu::asr8(v),
                    Asl => alu::asl8(v),
                    Rol => alu::rol8(v, self.flag(ccr::C)),
                    Dec => alu::dec8(v),
                    Inc => alu::inc8(v),
                    Tst => (v, alu::test8(v)),
                    Clr => alu::clr8(),
                    _ => unreachable!(),
                };
                self.apply(f);
                if mnemonic != Tst {
                    self.mem_write(bus, addr, r);
                }
            }

            // A-accumulator two-operand ops.
            Suba | Cmpa | Sbca | Anda | Bita | Ldaa | Eora | Adca | Oraa | Adda => {
                let v = self.read_operand8(bus, mode);
                match mnemonic {
                    Suba => { let (r, f) = alu::sub8(self.a, v, false); self.a = r; self.apply(f); }
                    Cmpa => { let f = alu::test_sub8(self.a, v); self.apply(f); }
                    Sbca => { let (r, f) = alu::sub8(self.a, v, self.flag(ccr::C)); self.a = r; self.apply(f); }
                    Anda => { let (r, f) = alu::and8(self.a, v); self.a = r; self.apply(f); }
                    Bita => { let f = alu::test_and8(self.a, v); self.apply(f); }
                    Ldaa => { self.a = v; let f = alu::test8(v); self.apply(f); }
                    Eora => { let (r, f) = alu::xor8(self.a, v); self.a = r; self.apply(f); }
                    Adca => { let (r, f) = alu::add8(self.a, v, self.flag(ccr::C)); self.a = r; self.apply(f); }
                    Oraa => { let (r, f) = alu::or8(self.a, v); self.a = r; self.apply(f); }
                    Adda => { let (r, f) = alu::add8(self.a, v, false); self.a = r; self.apply(f); }
                    _ => unreachable!(),
                }
            }
            Staa => {
                let addr = self.operand_addr(bus, mode).unwrap();
                self.mem_write(bus, addr, self.a);
                let f = alu::test8(self.a);
                self.apply(f);
            }

            // B-accumulator two-operand ops.
            Subb | Cmpb | Sbcb | Andb | Bitb | Ldab | Eorb | Adcb | Orab | Addb => {
                let v = self.read_operand8(bus, mode);
                match mnemonic {
                    Subb => { let (r, f) = alu::sub8(self.b, v, false); self.b = r; self.apply(f); }
                    Cmpb => { let f = alu::test_sub8(self.b, v); self.apply(f); }
                    Sbcb => { let (r, f) = alu::sub8(self.b, v, self.flag(ccr::C)); self.b = r; self.apply(f); }
                    Andb => { let (r, f) = alu::and8(self.b, v); self.b = r; self.apply(f); }
                    Bitb => { let f = alu::test_and8(self.b, v); self.apply(f); }
                    Ldab => { self.b = v; let f = alu::test8(v); self.apply(f); }
                    Eorb => { let (r, f) = alu::xor8(self.b, v); self.b = r; self.apply(f); }
                    Adcb => { let (r, f) = alu::add8(self.b, v, self.flag(ccr::C)); self.b = r; self.apply(f); }
                    Orab => { let (r, f) = alu::or8(self.b, v); self.b = r; self.apply(f); }
                    Addb => { let (r, f) = alu::add8(self.b, v, false); self.b = r; self.apply(f); }
                    _ => unreachable!(),
                }
            }
            Stab => {
                let addr = self.operand_addr(bus, mode).unwrap();
                self.mem_write(bus, addr, self.b);
                let f = alu::test8(self.b);
                self.apply(f);
            }

            // 16-bit D/X/S ops.
            Subd | Addd | Cpx => {
                let v = self.read_operand16(bus, mode);
                match mnemonic {
                    Subd => { let (r, f) = alu::sub16(self.d(), v); self.set_d(r); self.apply(f); }
                    Addd => { let (r, f) = alu::add16(self.d(), v); self.set_d(r); self.apply(f); }
                    Cpx => { let f = alu::test_sub16(self.x, v); self.apply(f); }
                    _ => unreachable!(),
                }
            }
            Ldd => { let v = self.read_operand16(bus, mode); self.set_d(v); let f = alu::test16(v); self.apply(f); }
            Ldx => { let v = self.read_operand16(bus, mode); self.x = v; let f = alu::test16(v); self.apply(f); }
            Lds => { let v = self.read_operand16(bus, mode); self.sp = v; let f = alu::test16(v); self.apply(f); }
            Std => {
                let addr = self.operand_addr(bus, mode).unwrap();
                let v = self.d();
                self.mem_write(bus, addr, (v >> 8) as u8);
                self.mem_write(bus, addr.wrapping_add(1), v as u8);
                let f = alu::test16(v);
                self.apply(f);
            }
            Stx => {
                let addr = self.operand_addr(bus, mode).unwrap();
                self.mem_write(bus, addr, (self.x >> 8) as u8);
                self.mem_write(bus, addr.wrapping_add(1), self.x as u8);
                let f = alu::test16(self.x);
                self.apply(f);
            }
            Sts => {
                let addr = self.operand_addr(bus, mode).unwrap();
                self.mem_write(bus, addr, (self.sp >> 8) as u8);
                self.mem_write(bus, addr.wrapping_add(1), self.sp as u8);
                let f = alu::test16(self.sp);
                self.apply(f);
            }

            // Bit-manipulate family: immediate byte then a direct/indexed address.
            Aim | Oim | Eim | Tim => {
                let imm = self.mem_read(bus, self.pc.wrapping_add(1));
                let addr = match mode {
                    AddressingMode::Direct => {
                        let a = self.mem_read(bus, self.pc.wrapping_add(2)) as u16;
                        self.pc = self.pc.wrapping_add(3);
                        a
                    }
                    AddressingMode::Indexed => {
                        let offset = self.mem_read(bus, self.pc.wrapping_add(2)) as u16;
                        self.pc = self.pc.wrapping_add(3);
                        self.x.wrapping_add(offset)
                    }
                    _ => unreachable!(),
                };
                let mem = self.mem_read(bus, addr);
                match mnemonic {
                    Aim => { let (r, f) = alu::aim(mem, imm); self.mem_write(bus, addr, r); self.apply(f); }
                    Oim => { let (r, f) = alu::oim(mem, imm); self.mem_write(bus, addr, r); self.apply(f); }
                    Eim => { let (r, f) = alu::eim(mem, imm); self.mem_write(bus, addr, r); self.apply(f); }
                    Tim => { let f = alu::tim(mem, imm); self.apply(f); }
                    _ => unreachable!(),
                }
            }

            Undefined => unreachable!("handled above"),
            _ => self.skip_inherent(),
        }

        info.cycles
    }

    fn read_operand8(&mut self, bus: &mut dyn BusAccess, mode: AddressingMode) -> u8 {
        match mode {
            AddressingMode::Immediate8 => self.imm8(bus),
            _ => {
                let addr = self.operand_addr(bus, mode).unwrap();
                self.mem_read(bus, addr)
            }
        }
    }

    fn read_operand16(&mut self, bus: &mut dyn BusAccess, mode: AddressingMode) -> u16 {
        match mode {
            AddressingMode::Immediate16 => self.imm16(bus),
            _ => {
                let addr = self.operand_addr(bus, mode).unwrap();
                let hi = self.mem_read(bus, addr) as u16;
                let lo = self.mem_read(bus, addr.wrapping_add(1)) as u16;
                (hi << 8) | lo
            }
        }
    }
}

impl Default for Cpu {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct TestBus {
        mem: [u8; 65536],
    }

    impl TestBus {
        fn new() -> Self {
            TestBus { mem: [0xFF; 65536] }
        }
    }

    impl BusAccess for TestBus {
        fn read(&mut self, addr: u16) -> u8 {
            self.mem[addr as usize]
        }
        fn write(&mut self, addr: u16, value: u8) {
            self.mem[addr as usize] = value;
        }
        fn is_nmi_due(&mut self) -> bool {
            false
        }
        fn is_oci_due(&mut self) -> bool {
            false
        }
        fn inc_frame(&mut self, _cycles: u8) {}
        fn is_switched_off(&self) -> bool {
            false
        }
    }

    fn load(bus: &mut TestBus, addr: u16, bytes: &[u8]) {
        for (i, b) in bytes.iter().enumerate() {
            bus.mem[addr as usize + i] = *b;
        }
    }

    // S1: ADC carry chain.
    #[test]
    fn s1_adc_carry_chain() {
        let mut bus = TestBus::new();
        load(&mut bus, 0x0040, &[0x86, 0xFF, 0x8B, 0x01, 0xC6, 0x00, 0xC9, 0x00]);
        let mut cpu = Cpu::new();
        cpu.pc = 0x0040;
        cpu.execute(&mut bus, 100).unwrap();
        assert_eq!(cpu.a, 0x00);
        assert_eq!(cpu.b, 0x01);
        assert!(cpu.flag(ccr::C));
        assert!(cpu.flag(ccr::Z));
    }

    // S2: TSX equals SP on HD6303.
    #[test]
    fn s2_tsx_equals_sp() {
        let mut bus = TestBus::new();
        load(&mut bus, 0x0040, &[0x30]);
        let mut cpu = Cpu::new();
        cpu.pc = 0x0040;
        cpu.sp = 0x01FF;
        cpu.execute(&mut bus, 10).unwrap();
        assert_eq!(cpu.x, 0x01FF);
    }

    // S3: XGDX swaps D and X.
    #[test]
    fn s3_xgdx_swap() {
        let mut bus = TestBus::new();
        load(&mut bus, 0x0040, &[0x18]);
        let mut cpu = Cpu::new();
        cpu.pc = 0x0040;
        cpu.a = 0x12;
        cpu.b = 0x34;
        cpu.x = 0x5678;
        cpu.execute(&mut bus, 10).unwrap();
        assert_eq!(cpu.a, 0x56);
        assert_eq!(cpu.b, 0x78);
        assert_eq!(cpu.x, 0x1234);
    }

    // S8: reset vector load.
    #[test]
    fn s8_reset_vector() {
        let mut bus = TestBus::new();
        load(&mut bus, 0xFFFE, &[0x80, 0x00]);
        let mut cpu = Cpu::new();
        cpu.reset(&mut bus);
        assert_eq!(cpu.pc, 0x8000);
    }

    #[test]
    fn push_pop_is_inverse_and_preserves_sp() {
        let mut bus = TestBus::new();
        let mut cpu = Cpu::new();
        cpu.sp = 0x00F0;
        let sp_before = cpu.sp;
        cpu.push8(&mut bus, 0x42);
        let v = cpu.pop8(&mut bus);
        assert_eq!(v, 0x42);
        assert_eq!(cpu.sp, sp_before);
    }

    #[test]
    fn rti_restores_pre_interrupt_state() {
        let mut bus = TestBus::new();
        load(&mut bus, OCI_VECTOR, &[0x00, 0x60]);
        let mut cpu = Cpu::new();
        cpu.sp = 0x01FF;
        cpu.pc = 0x0040;
        cpu.a = 0x11;
        cpu.b = 0x22;
        cpu.x = 0x3344;
        cpu.flags = 0xC4;
        let pc_before = cpu.pc;
        cpu.enter_interrupt(&mut bus, OCI_VECTOR);
        cpu.rti(&mut bus);
        assert_eq!(cpu.pc, pc_before);
        assert_eq!(cpu.a, 0x11);
        assert_eq!(cpu.b, 0x22);
        assert_eq!(cpu.x, 0x3344);
    }

    #[test]
    fn pc_advances_by_instruction_length_for_non_control_flow() {
        let mut bus = TestBus::new();
        load(&mut bus, 0x0040, &[0x86, 0x01]); // LDAA #1
        let mut cpu = Cpu::new();
        cpu.pc = 0x0040;
        cpu.execute(&mut bus, 2).unwrap();
        assert_eq!(cpu.pc, 0x0042);
    }

    #[test]
    fn undefined_opcode_triggers_switch_off() {
        let mut bus = TestBus::new();
        load(&mut bus, 0x0040, &[0x02]); // unassigned
        let mut cpu = Cpu::new();
        cpu.pc = 0x0040;
        cpu.execute(&mut bus, 1).unwrap();
        assert_eq!(bus.mem[0x01C0], 0x00);
    }
}
