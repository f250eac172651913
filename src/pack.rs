//! Pack (cartridge) controllers (C5). Each variant is a small state
//! machine driven by `write_control(control_bits, data_bus)` and
//! `read_data()`; the bus decides when to call them and OR-combines the
//! read contributions of every selected slot onto the shared data bus.

use std::fmt;

/// A tiny hand-rolled bitflags macro: this pack only needs seven named
/// bits, not a whole crate's worth of trait impls.
macro_rules! bitflags_like {
    (
        $(#[$meta:meta])*
        pub struct $name:ident: $repr:ty {
            $(const $flag:ident = $value:expr;)*
        }
    ) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
        pub struct $name(pub $repr);

        impl $name {
            $(pub const $flag: $repr = $value;)*

            pub fn has(self, bit: $repr) -> bool {
                self.0 & bit != 0
            }
        }
    };
}

bitflags_like! {
    /// Control-pin bitset the bus hands to a pack on every write.
    pub struct ControlBits: u8 {
        const SCLK = 0x01;
        const SMR = 0x02;
        const SPGM_B = 0x04;
        const SOE_B = 0x08;
        const SVPP = 0x10;
        const V21V = 0x20;
        const P2DDR = 0x40;
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AddressingType {
    Linear,
    Paged,
    Segmented,
}

impl AddressingType {
    pub fn for_size_kb(size_kb: usize) -> Self {
        if size_kb <= 16 {
            AddressingType::Linear
        } else if size_kb < 128 {
            AddressingType::Paged
        } else {
            AddressingType::Segmented
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PackKind {
    Eprom,
    Ram,
    Flash,
    Rom,
    TopSlot,
    Empty,
}

/// The address counter shared by every non-empty pack kind: a linear
/// counter that increments on SCLK while SMR is low, plus a page
/// register (paged/segmented) and a segment register (segmented only).
#[derive(Debug, Clone, Copy, Default)]
struct AddressCounter {
    addressing: Option<AddressingType>,
    offset: u32,
    page: u32,
    segment: u32,
    prev_sclk: bool,
    prev_spgm_b: bool,
}

impl AddressCounter {
    fn new(addressing: AddressingType) -> Self {
        AddressCounter { addressing: Some(addressing), offset: 0, page: 0, segment: 0, prev_sclk: false, prev_spgm_b: true }
    }

    fn reset(&mut self) {
        self.offset = 0;
        self.page = 0;
        self.segment = 0;
    }

    fn current(&self) -> u32 {
        match self.addressing {
            Some(AddressingType::Linear) => self.offset,
            Some(AddressingType::Paged) => (self.page << 14) | self.offset,
            Some(AddressingType::Segmented) => (self.segment << 20) | (self.page << 14) | self.offset,
            None => self.offset,
        }
    }

    fn update(&mut self, control: ControlBits, data_bus: u8) {
        let sclk = control.has(ControlBits::SCLK);
        let smr = control.has(ControlBits::SMR);
        let spgm_b = control.has(ControlBits::SPGM_B);

        if smr {
            self.reset();
        } else if sclk && !self.prev_sclk {
            self.offset = self.offset.wrapping_add(1);
        }

        if matches!(self.addressing, Some(AddressingType::Paged) | Some(AddressingType::Segmented)) {
            if smr && !spgm_b && self.prev_spgm_b {
                self.page = self.page.wrapping_add(1);
            }
        }

        if self.addressing == Some(AddressingType::Segmented) && smr && control.has(ControlBits::P2DDR) {
            self.segment = data_bus as u32;
        }

        self.prev_sclk = sclk;
        self.prev_spgm_b = spgm_b;
    }
}

pub struct Pack {
    pub kind: PackKind,
    pub size_kb: usize,
    data: Vec<u8>,
    counter: AddressCounter,
    flash_unlock_step: u8,
    id_mode: bool,
}

impl Pack {
    pub fn empty() -> Self {
        Pack { kind: PackKind::Empty, size_kb: 0, data: Vec::new(), counter: AddressCounter::default(), flash_unlock_step: 0, id_mode: false }
    }

    pub fn new(kind: PackKind, size_kb: usize, data: Vec<u8>) -> Self {
        let addressing = AddressingType::for_size_kb(size_kb);
        Pack { kind, size_kb, data, counter: AddressCounter::new(addressing), flash_unlock_step: 0, id_mode: false }
    }

    pub fn reset(&mut self) {
        self.counter.reset();
        self.flash_unlock_step = 0;
        self.id_mode = false;
    }

    fn addr(&self) -> usize {
        (self.counter.current() as usize) % self.data.len().max(1)
    }

    /// Applies one control-pin update; returns whether a write to the
    /// backing buffer actually occurred (used by the bus to decide
    /// whether to consume the 21 V charge).
    pub fn write_control(&mut self, control: ControlBits, data_bus: u8) -> bool {
        self.counter.update(control, data_bus);

        match self.kind {
            PackKind::Empty | PackKind::Rom | PackKind::TopSlot => false,
            PackKind::Eprom => {
                if control.has(ControlBits::V21V) && control.has(ControlBits::SVPP) {
                    let idx = self.addr();
                    if idx < self.data.len() {
                        // EPROM programming only clears bits; a 0->1 attempt silently fails.
                        self.data[idx] &= data_bus;
                        return true;
                    }
                }
                false
            }
            PackKind::Ram => {
                let idx = self.addr();
                if idx < self.data.len() {
                    self.data[idx] = data_bus;
                    true
                } else {
                    false
                }
            }
            PackKind::Flash => self.flash_write_sequence(data_bus),
        }
    }

    fn flash_write_sequence(&mut self, data_bus: u8) -> bool {
        // Simplified unlock+command+data sequence: $AA at $5555, $55 at
        // $2AAA, $A0 at $5555, then the data byte at the target address.
        let addr = self.addr();
        match (self.flash_unlock_step, addr, data_bus) {
            (0, 0x5555, 0xAA) => { self.flash_unlock_step = 1; false }
            (1, 0x2AAA, 0x55) => { self.flash_unlock_step = 2; false }
            (2, 0x5555, 0x90) => { self.id_mode = true; self.flash_unlock_step = 0; false }
            (2, 0x5555, 0xA0) => { self.flash_unlock_step = 3; false }
            (2, 0x5555, 0xF0) => { self.id_mode = false; self.flash_unlock_step = 0; false }
            (3, idx, value) => {
                self.flash_unlock_step = 0;
                if idx < self.data.len() {
                    self.data[idx] = value;
                    true
                } else {
                    false
                }
            }
            _ => { self.flash_unlock_step = 0; false }
        }
    }

    /// The pack's contribution to the shared data bus.
    pub fn read_data(&self) -> u8 {
        match self.kind {
            PackKind::Empty => 0xFF,
            PackKind::Flash if self.id_mode => 0x01,
            _ => {
                let idx = self.addr();
                self.data.get(idx).copied().unwrap_or(0xFF)
            }
        }
    }
}

impl fmt::Debug for Pack {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Pack").field("kind", &self.kind).field("size_kb", &self.size_kb).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ctrl(bits: u8) -> ControlBits {
        ControlBits(bits)
    }

    #[test]
    fn empty_pack_reads_ff_and_ignores_writes() {
        let mut p = Pack::empty();
        assert_eq!(p.read_data(), 0xFF);
        assert!(!p.write_control(ctrl(ControlBits::SOE_B), 0x00));
    }

    #[test]
    fn ram_pack_reads_and_writes_freely() {
        let mut p = Pack::new(PackKind::Ram, 8, vec![0; 8 * 1024]);
        p.write_control(ctrl(ControlBits::SOE_B), 0x42);
        assert_eq!(p.read_data(), 0x42);
    }

    #[test]
    fn eprom_clears_bits_but_never_sets_them() {
        let mut data = vec![0u8; 8 * 1024];
        data[0] = 0xFF;
        let mut p = Pack::new(PackKind::Eprom, 8, data);
        let bits = ctrl(ControlBits::SOE_B | ControlBits::V21V | ControlBits::SVPP);
        let wrote = p.write_control(bits, 0x0F);
        assert!(wrote);
        assert_eq!(p.read_data(), 0x0F);
        // Attempting to set a cleared bit back to 1 must not take effect.
        p.write_control(bits, 0xFF);
        assert_eq!(p.read_data(), 0x0F);
    }

    #[test]
    fn rom_top_slot_ignores_writes() {
        let mut data = vec![0xAA; 1024];
        data[0] = 0x55;
        let mut p = Pack::new(PackKind::TopSlot, 1, data);
        assert!(!p.write_control(ctrl(ControlBits::SOE_B), 0x00));
        assert_eq!(p.read_data(), 0x55);
    }

    #[test]
    fn linear_counter_advances_on_sclk_rising_edge() {
        let mut p = Pack::new(PackKind::Rom, 8, (0..8192u32).map(|i| i as u8).collect());
        p.write_control(ctrl(ControlBits::SCLK), 0);
        assert_eq!(p.read_data(), 1);
        p.write_control(ctrl(0), 0); // falling edge, no advance
        p.write_control(ctrl(ControlBits::SCLK), 0); // rising edge again
        assert_eq!(p.read_data(), 2);
    }

    #[test]
    fn smr_resets_the_counter() {
        let mut p = Pack::new(PackKind::Rom, 8, (0..8192u32).map(|i| i as u8).collect());
        p.write_control(ctrl(ControlBits::SCLK), 0);
        p.write_control(ctrl(0), 0);
        p.write_control(ctrl(ControlBits::SCLK), 0);
        p.write_control(ctrl(ControlBits::SMR), 0);
        assert_eq!(p.read_data(), 0);
    }
}
