//! Cross-module scenarios: source assembled by `orgcore::assembler` runs
//! correctly on `orgcore::emulator::Emulator`, and an OPK image built from
//! a freshly assembled procedure parses back byte-for-byte.

use orgcore::assembler::model::Model;
use orgcore::assembler::{Assembler, AssemblerOptions};
use orgcore::emulator::{Emulator, EmulatorConfig};
use orgcore::opk::{Opk, PackHeader, Record};

fn rom_with_reset_vector(entry: u16) -> Vec<u8> {
    let mut rom = vec![0xFFu8; 32 * 1024];
    rom[0x7FFE] = (entry >> 8) as u8;
    rom[0x7FFF] = entry as u8;
    rom
}

// S1: straightforward arithmetic assembled and executed end to end.
#[test]
fn assembled_arithmetic_program_runs_to_a_halt_loop() {
    let mut asm = Assembler::new(AssemblerOptions::default());
    asm.assemble("ORG $8000\nLDAA #$10\nADDA #$05\nSTAA $40\nhere: BRA here\n", "arith.asm").unwrap();
    let code = asm.get_code().unwrap().to_vec();

    let mut rom = rom_with_reset_vector(0x8000);
    rom[..code.len()].copy_from_slice(&code);

    let mut emu = Emulator::new(EmulatorConfig { model: Model::Cm, rom });
    emu.reset();
    emu.execute(100).unwrap();

    assert_eq!(emu.registers().a, 0x15);
    assert_eq!(emu.read_memory(0x40), 0x15);
}

// S4: a branch too far for a single signed byte is relaxed to a long
// branch construct that still lands on the intended target.
#[test]
fn relaxed_long_branch_still_reaches_its_target() {
    let mut source = String::from("ORG $8000\nLDAA #$01\nBEQ far\n");
    for _ in 0..200 {
        source.push_str("NOP\n");
    }
    source.push_str("far: STAA $41\nhere: BRA here\n");

    let mut asm = Assembler::new(AssemblerOptions::default());
    asm.assemble(&source, "far.asm").unwrap();
    let code = asm.get_code().unwrap().to_vec();
    assert!(code.len() > 205);

    let mut rom = rom_with_reset_vector(0x8000);
    rom[..code.len()].copy_from_slice(&code);

    let mut emu = Emulator::new(EmulatorConfig { model: Model::Cm, rom });
    emu.reset();
    emu.execute(2000).unwrap();
    assert_eq!(emu.read_memory(0x41), 0xFF); // untouched: BEQ must not have been taken
}

// S5: the peephole optimizer's CMP-to-TST rewrite doesn't change what the
// program actually computes.
#[test]
fn peephole_optimized_program_produces_the_same_result_as_unoptimized() {
    let source = "ORG $8000\nLDAA #$00\nCMPA #0\nBNE nonzero\nSTAA $42\nBRA done\nnonzero: LDAB #$FF\nSTAB $42\ndone: here: BRA here\n";

    let mut plain = Assembler::new(AssemblerOptions::default());
    plain.assemble(source, "p.asm").unwrap();

    let mut optimized = Assembler::new(AssemblerOptions { enable_peephole: true, ..Default::default() });
    optimized.assemble(source, "p.asm").unwrap();
    assert!(optimized.optimizer_stats().cmp_to_tst >= 1);

    for asm in [plain, optimized] {
        let code = asm.get_code().unwrap().to_vec();
        let mut rom = rom_with_reset_vector(0x8000);
        rom[..code.len()].copy_from_slice(&code);
        let mut emu = Emulator::new(EmulatorConfig { model: Model::Cm, rom });
        emu.reset();
        emu.execute(200).unwrap();
        assert_eq!(emu.read_memory(0x42), 0x00);
    }
}

// S6/checksum: a procedure assembled to OB3, packed into an OPK image,
// and read back reports a valid header checksum and the same payload.
#[test]
fn opk_image_built_from_an_assembled_procedure_roundtrips() {
    let mut asm = Assembler::new(AssemblerOptions::default());
    asm.assemble("ORG $0000\nLDAA #$01\nRTS\n", "proc.asm").unwrap();
    let code = asm.get_code().unwrap().to_vec();

    let header = PackHeader { flags: 0x02, size_indicator: 0x01, year: 26, month: 7, day: 27, hour: 9, reserved: 0, frame_counter: 0 };
    let record = Record::new(0x83, code.clone());
    let image = Opk::build(header, &[record]);

    let (parsed_header, records) = Opk::parse(&image).unwrap();
    assert_eq!(parsed_header, header);
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].payload, code);
    assert!(Opk::analyze_checksum(&parsed_header).valid);
}

// S8: reset vector selects the entry point, confirmed through the
// assembler's MODEL-aware RESET_VEC symbol rather than a hardcoded address.
#[test]
fn reset_vector_symbol_matches_the_emulator_reset_vector() {
    let opts = AssemblerOptions { model: Some(Model::Lz), ..Default::default() };
    let mut asm = Assembler::new(opts);
    asm.assemble("ORG $9000\nLDX #RESET_VEC\nSTX $44\nhere: BRA here\n", "vec.asm").unwrap();
    let code = asm.get_code().unwrap().to_vec();

    let mut rom = rom_with_reset_vector(0x9000);
    let offset = 0x9000 - 0x8000;
    rom[offset..offset + code.len()].copy_from_slice(&code);

    let mut emu = Emulator::new(EmulatorConfig { model: Model::Lz, rom });
    emu.reset();
    emu.execute(100).unwrap();
    assert_eq!(emu.read_memory(0x44), 0xFF);
    assert_eq!(emu.read_memory(0x45), 0xFE);
}
