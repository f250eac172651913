//! Save-state format (§6): magic `SNA`, a version byte, then four
//! length-prefixed sections in a fixed order — CPU, bus, display,
//! memory — so an external tool can version-gate restore without
//! knowing this crate's internal struct layouts.

use crate::bus::Bus;
use crate::cpu::Cpu;

const MAGIC: [u8; 3] = *b"SNA";
const VERSION: u8 = 1;

fn push_section(out: &mut Vec<u8>, bytes: &[u8]) {
    let len = bytes.len() as u32;
    out.extend_from_slice(&len.to_be_bytes());
    out.extend_from_slice(bytes);
}

fn take_section<'a>(bytes: &'a [u8], offset: &mut usize) -> &'a [u8] {
    let len = u32::from_be_bytes(bytes[*offset..*offset + 4].try_into().unwrap()) as usize;
    *offset += 4;
    let section = &bytes[*offset..*offset + len];
    *offset += len;
    section
}

/// Serializes the full machine state. Pack contents are excluded: they
/// are loaded independently via `Bus::load_pack`.
pub fn save(cpu: &Cpu, bus: &Bus) -> Vec<u8> {
    let mut out = Vec::new();
    out.extend_from_slice(&MAGIC);
    out.push(VERSION);
    push_section(&mut out, &cpu.snapshot());
    push_section(&mut out, &bus.snapshot());
    push_section(&mut out, &bus.display.snapshot());
    push_section(&mut out, &bus.memory.snapshot());
    out
}

#[derive(Debug, thiserror::Error)]
pub enum SnapshotError {
    #[error("bad snapshot magic")]
    BadMagic,
    #[error("unsupported snapshot version {0}")]
    UnsupportedVersion(u8),
    #[error("truncated snapshot data")]
    Truncated,
}

/// Restores `cpu`/`bus` in place from a byte sequence produced by `save`.
pub fn load(cpu: &mut Cpu, bus: &mut Bus, bytes: &[u8]) -> Result<(), SnapshotError> {
    if bytes.len() < 4 || bytes[..3] != MAGIC {
        return Err(SnapshotError::BadMagic);
    }
    let version = bytes[3];
    if version != VERSION {
        return Err(SnapshotError::UnsupportedVersion(version));
    }
    let mut offset = 4;
    let cpu_bytes = take_section(bytes, &mut offset);
    let bus_bytes = take_section(bytes, &mut offset);
    let display_bytes = take_section(bytes, &mut offset);
    let memory_bytes = take_section(bytes, &mut offset);
    if offset > bytes.len() {
        return Err(SnapshotError::Truncated);
    }

    cpu.apply_snapshot(cpu_bytes);
    bus.apply_snapshot(bus_bytes);
    bus.display.apply_snapshot(display_bytes);
    bus.memory.apply_snapshot(memory_bytes);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::display::{Display, Geometry};
    use crate::memory::Memory;

    // Testable property 10: emulator snapshot round-trips for every
    // reachable state, excluding pack contents.
    #[test]
    fn snapshot_roundtrips_cpu_and_bus_state() {
        let mut cpu = Cpu::new();
        let mut bus = Bus::new(Memory::new(32, vec![0xAA; 64 * 1024]), Display::new(Geometry::Lines2x16));
        bus.switch_on();
        cpu.a = 0x12;
        cpu.b = 0x34;
        cpu.x = 0x5678;
        cpu.sp = 0x01F0;
        cpu.pc = 0x9ABC;
        bus.write(0x0180, 0x01);
        bus.write(0x0181, b'X');

        let saved = save(&cpu, &bus);

        let mut cpu2 = Cpu::new();
        let mut bus2 = Bus::new(Memory::new(32, vec![0xAA; 64 * 1024]), Display::new(Geometry::Lines2x16));
        load(&mut cpu2, &mut bus2, &saved).unwrap();

        assert_eq!(cpu2.registers(), cpu.registers());
        assert_eq!(bus2.display.row_text(0)[0], b'X');
        assert_eq!(bus2.is_switched_off(), bus.is_switched_off());
    }

    #[test]
    fn rejects_bad_magic() {
        let mut cpu = Cpu::new();
        let mut bus = Bus::new(Memory::new(32, vec![0; 64 * 1024]), Display::new(Geometry::Lines2x16));
        let err = load(&mut cpu, &mut bus, b"XYZ\x01").unwrap_err();
        assert!(matches!(err, SnapshotError::BadMagic));
    }
}
