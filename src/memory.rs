//! Banked RAM and ROM (C2). Owned exclusively by the bus.
//!
//! RAM has three physical layouts depending on installed size; ROM is
//! always a 32 KB-or-larger image with a fixed upper half and a
//! bank-switched lower half. Both expose `read`/`write`/`next_bank`/
//! `reset_bank` plus a byte-level snapshot used by `crate::snapshot`.

pub const PROCESSOR_RAM_LOW: u16 = 0x0040;
pub const PROCESSOR_RAM_HIGH: u16 = 0x0100;
const BANK_ADDRESS: u16 = 0x4000;

const ROM_LOW_ADDRESS: u16 = 0x8000;
const ROM_BANK_SIZE: u32 = 0x4000;

pub struct Ram {
    size_kb: usize,
    low_address: u16,
    high_address: u16,
    processor_ram: [u8; (PROCESSOR_RAM_HIGH - PROCESSOR_RAM_LOW) as usize],
    data: Vec<u8>,
    bank_index: u16,
}

impl Ram {
    pub fn new(size_kb: usize) -> Self {
        let (low_address, high_address, buffer_len) = match size_kb {
            8 => (0x2000u16, 0x4000u16, 16 * 1024usize),
            16 => (0x2000u16, 0x6000u16, 24 * 1024usize),
            _ => (0x0000u16, 0x8000u16, size_kb * 1024),
        };
        Ram {
            size_kb,
            low_address,
            high_address,
            processor_ram: [0; (PROCESSOR_RAM_HIGH - PROCESSOR_RAM_LOW) as usize],
            data: vec![0; buffer_len],
            bank_index: BANK_ADDRESS,
        }
    }

    pub fn read(&self, address: u16) -> u8 {
        if (PROCESSOR_RAM_LOW..PROCESSOR_RAM_HIGH).contains(&address) {
            return self.processor_ram[(address - PROCESSOR_RAM_LOW) as usize];
        }
        if address < self.low_address || address >= self.high_address {
            return 0xFF;
        }
        if address < BANK_ADDRESS {
            return self.data[(address - self.low_address) as usize];
        }
        let index = address - BANK_ADDRESS + self.bank_index;
        self.data.get(index as usize).copied().unwrap_or(0xFF)
    }

    pub fn write(&mut self, address: u16, value: u8) {
        if (PROCESSOR_RAM_LOW..PROCESSOR_RAM_HIGH).contains(&address) {
            self.processor_ram[(address - PROCESSOR_RAM_LOW) as usize] = value;
            return;
        }
        if address < self.low_address || address >= self.high_address {
            return;
        }
        if address < BANK_ADDRESS {
            self.data[(address - self.low_address) as usize] = value;
            return;
        }
        let index = address - BANK_ADDRESS + self.bank_index;
        if let Some(slot) = self.data.get_mut(index as usize) {
            *slot = value;
        }
    }

    pub fn next_bank(&mut self) {
        if self.size_kb < 32 {
            return;
        }
        let next = self.bank_index + BANK_ADDRESS;
        self.bank_index = if next as usize >= self.data.len() { BANK_ADDRESS } else { next };
    }

    pub fn reset_bank(&mut self) {
        self.bank_index = BANK_ADDRESS;
    }

    pub fn snapshot(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(7 + self.processor_ram.len() + self.data.len());
        out.push(self.size_kb as u8);
        out.push((self.bank_index >> 8) as u8);
        out.push(self.bank_index as u8);
        out.push((self.low_address >> 8) as u8);
        out.push(self.low_address as u8);
        out.push((self.high_address >> 8) as u8);
        out.push(self.high_address as u8);
        out.extend_from_slice(&self.processor_ram);
        out.extend_from_slice(&self.data[(self.low_address as usize)..]);
        out
    }

    pub fn apply_snapshot(&mut self, bytes: &[u8]) {
        self.size_kb = bytes[0] as usize;
        self.bank_index = ((bytes[1] as u16) << 8) | bytes[2] as u16;
        self.low_address = ((bytes[3] as u16) << 8) | bytes[4] as u16;
        self.high_address = ((bytes[5] as u16) << 8) | bytes[6] as u16;
        let pr_len = self.processor_ram.len();
        self.processor_ram.copy_from_slice(&bytes[7..7 + pr_len]);
        let rest = &bytes[7 + pr_len..];
        let start = self.low_address as usize;
        self.data[start..start + rest.len()].copy_from_slice(rest);
    }
}

pub struct Rom {
    size: usize,
    data: Vec<u8>,
    bank_index: u32,
}

impl Rom {
    pub fn new(data: Vec<u8>) -> Self {
        let size = data.len();
        Rom { size, data, bank_index: 0 }
    }

    pub fn read(&self, address: u16) -> u8 {
        if (address as usize) < ROM_LOW_ADDRESS as usize {
            return 0xFF;
        }
        let index = (address - ROM_LOW_ADDRESS) as u32;
        if index >= ROM_BANK_SIZE || self.bank_index == 0 {
            self.data.get(index as usize).copied().unwrap_or(0xFF)
        } else {
            self.data.get((index + self.bank_index) as usize).copied().unwrap_or(0xFF)
        }
    }

    pub fn next_bank(&mut self) {
        let next = if self.bank_index == 0 { ROM_LOW_ADDRESS as u32 } else { self.bank_index + ROM_BANK_SIZE };
        self.bank_index = if next as usize >= self.size { 0 } else { next };
    }

    pub fn reset_bank(&mut self) {
        self.bank_index = 0;
    }

    pub fn snapshot(&self) -> Vec<u8> {
        vec![(self.bank_index >> 8) as u8, self.bank_index as u8]
    }

    pub fn apply_snapshot(&mut self, bytes: &[u8]) {
        self.bank_index = ((bytes[0] as u32) << 8) | bytes[1] as u32;
    }
}

/// Routes `$0000-$7FFF` to RAM and `$8000-$FFFF` to ROM; writes above
/// `$8000` are silently dropped, matching real hardware.
pub struct Memory {
    pub ram: Ram,
    pub rom: Rom,
}

impl Memory {
    pub fn new(ram_kb: usize, rom_data: Vec<u8>) -> Self {
        Memory { ram: Ram::new(ram_kb), rom: Rom::new(rom_data) }
    }

    pub fn read(&self, address: u16) -> u8 {
        if address >= ROM_LOW_ADDRESS {
            self.rom.read(address)
        } else {
            self.ram.read(address)
        }
    }

    pub fn write(&mut self, address: u16, value: u8) {
        if address < ROM_LOW_ADDRESS {
            self.ram.write(address, value);
        }
    }

    pub fn next_ram_bank(&mut self) {
        self.ram.next_bank();
    }

    pub fn next_rom_bank(&mut self) {
        self.rom.next_bank();
    }

    pub fn reset_banks(&mut self) {
        self.ram.reset_bank();
        self.rom.reset_bank();
    }

    pub fn snapshot(&self) -> Vec<u8> {
        let mut out = self.rom.snapshot();
        out.extend(self.ram.snapshot());
        out
    }

    pub fn apply_snapshot(&mut self, bytes: &[u8]) {
        let rom_len = 2;
        self.rom.apply_snapshot(&bytes[..rom_len]);
        self.ram.apply_snapshot(&bytes[rom_len..]);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn zero_page_is_always_accessible_regardless_of_ram_geometry() {
        let mut mem = Memory::new(8, vec![0; 32 * 1024]);
        mem.write(0x0050, 0xAB);
        assert_eq!(mem.read(0x0050), 0xAB);
    }

    #[test]
    fn rom_writes_are_dropped() {
        let mut mem = Memory::new(32, vec![0x11; 32 * 1024]);
        mem.write(0xC000, 0x99);
        assert_eq!(mem.read(0xC000), 0x11);
    }

    #[test]
    fn rom_upper_half_ignores_bank() {
        let mut data = vec![0; 64 * 1024];
        data[0xC000] = 0x7A;
        let mut rom = Rom::new(data);
        rom.next_bank();
        assert_eq!(rom.read(0xC000), 0x7A);
    }

    #[test]
    fn rom_bank_zero_means_no_banking() {
        let mut data = vec![0; 64 * 1024];
        data[0x8000] = 0x42;
        let rom = Rom::new(data);
        assert_eq!(rom.read(0x8000), 0x42);
    }

    #[test]
    fn ram_bank_switch_selects_new_slab() {
        let mut data = vec![0u8; 64 * 1024];
        data[0x4000] = 0x01;
        data[0x8000] = 0x02;
        let mut ram = Ram::new(64);
        ram.data = data;
        assert_eq!(ram.read(0x4000), 0x01);
        ram.next_bank();
        assert_eq!(ram.read(0x4000), 0x02);
        ram.reset_bank();
        assert_eq!(ram.read(0x4000), 0x01);
    }

    #[test]
    fn reads_outside_populated_range_yield_ff() {
        let ram = Ram::new(8);
        assert_eq!(ram.read(0x7000), 0xFF);
    }

    #[test]
    fn snapshot_roundtrips() {
        let mut mem = Memory::new(32, vec![0x55; 64 * 1024]);
        mem.write(0x1000, 0x77);
        let snap = mem.snapshot();
        let mut restored = Memory::new(32, vec![0x55; 64 * 1024]);
        let rom_snap_len = 2;
        restored.rom.apply_snapshot(&snap[..rom_snap_len]);
        restored.ram.apply_snapshot(&snap[rom_snap_len..]);
        assert_eq!(restored.read(0x1000), 0x77);
    }
}
