//! `orgcli`: thin command-line wrapper around `orgcore` (AMBIENT-4).
//! `asm` assembles a source file, `opk` builds or inspects a pack image,
//! `run` loads a ROM (and optional pack) and executes a cycle budget,
//! printing the final register state.

use std::fs;
use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Parser, Subcommand};
use comfy_table::Table;
use log::info;

use orgcore::assembler::model::Model;
use orgcore::assembler::{Assembler, AssemblerOptions};
use orgcore::opk::{is_valid_procedure_name, Opk, PackHeader, Record};
use orgcore::pack::{Pack, PackKind};
use orgcore::{Emulator, EmulatorConfig};

#[derive(Parser)]
#[command(name = "orgcli", about = "HD6303 assembler / OPK / emulator command line")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Assemble a source file to raw bytes, an OB3 procedure file, a
    /// listing, or a symbol table.
    Asm {
        source: PathBuf,
        #[arg(long)]
        model: Option<String>,
        #[arg(long)]
        peephole: bool,
        #[arg(long)]
        relocatable: bool,
        #[arg(long)]
        out: Option<PathBuf>,
        #[arg(long)]
        ob3: Option<PathBuf>,
        #[arg(long)]
        listing: bool,
        #[arg(long)]
        symbols: bool,
    },
    /// Build an OPK pack image out of one procedure file, or inspect an
    /// existing image's header checksum.
    Opk {
        #[command(subcommand)]
        action: OpkAction,
    },
    /// Load a ROM (and optional pack image) and run a cycle budget.
    Run {
        rom: PathBuf,
        #[arg(long)]
        pack: Option<PathBuf>,
        #[arg(long, default_value_t = 1_000_000)]
        cycles: u32,
        #[arg(long, default_value = "CM")]
        model: String,
    },
}

#[derive(Subcommand)]
enum OpkAction {
    Build {
        name: String,
        procedure: PathBuf,
        #[arg(long)]
        out: PathBuf,
    },
    Inspect {
        image: PathBuf,
    },
}

fn main() -> ExitCode {
    env_logger::init();
    let cli = Cli::parse();

    let result = match cli.command {
        Command::Asm { source, model, peephole, relocatable, out, ob3, listing, symbols } => {
            run_asm(source, model, peephole, relocatable, out, ob3, listing, symbols)
        }
        Command::Opk { action } => run_opk(action),
        Command::Run { rom, pack, cycles, model } => run_emulator(rom, pack, cycles, model),
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(message) => {
            eprintln!("{}", message);
            ExitCode::FAILURE
        }
    }
}

#[allow(clippy::too_many_arguments)]
fn run_asm(
    source: PathBuf,
    model: Option<String>,
    peephole: bool,
    relocatable: bool,
    out: Option<PathBuf>,
    ob3: Option<PathBuf>,
    listing: bool,
    symbols: bool,
) -> Result<(), String> {
    let model = model.map(|name| Model::from_name(&name).ok_or_else(|| format!("unknown model `{}`", name))).transpose()?;
    let text = fs::read_to_string(&source).map_err(|e| format!("{}: {}", source.display(), e))?;
    let filename = source.to_string_lossy().to_string();

    let mut asm = Assembler::new(AssemblerOptions { model, enable_peephole: peephole, relocatable });
    if let Some(dir) = source.parent() {
        asm.add_include_path(dir);
    }

    asm.assemble(&text, &filename).map_err(|errs| errs.report())?;
    info!("assembled {} ({} bytes)", filename, asm.get_code().map_or(0, |c| c.len()));
    if peephole {
        info!("peephole optimizer: {} rewrite(s) applied", asm.optimizer_stats().total());
    }

    if let Some(path) = out {
        fs::write(&path, asm.get_code().unwrap_or(&[])).map_err(|e| e.to_string())?;
    }
    if let Some(path) = ob3 {
        asm.write_ob3(&path).map_err(|e| e.to_string())?;
    }
    if listing {
        println!("{}", asm.get_listing().unwrap_or_default());
    }
    if symbols {
        let mut table = Table::new();
        table.set_header(vec!["symbol", "value"]);
        if let Some(syms) = asm.get_symbols() {
            let mut names: Vec<&String> = syms.keys().collect();
            names.sort();
            for name in names {
                table.add_row(vec![name.clone(), format!("${:04X}", syms[name])]);
            }
        }
        println!("{table}");
    }
    Ok(())
}

fn run_opk(action: OpkAction) -> Result<(), String> {
    match action {
        OpkAction::Build { name, procedure, out } => {
            if !is_valid_procedure_name(&name) {
                return Err(format!("invalid procedure name `{}`", name));
            }
            let payload = fs::read(&procedure).map_err(|e| e.to_string())?;
            let header = PackHeader { flags: 0x02, size_indicator: 0x01, year: 0, month: 1, day: 1, hour: 0, reserved: 0, frame_counter: 0 };
            let record = Record::new(0x83, payload);
            let image = Opk::build(header, &[record]);
            fs::write(&out, image).map_err(|e| e.to_string())?;
            info!("wrote OPK image for procedure {} to {}", name, out.display());
            Ok(())
        }
        OpkAction::Inspect { image } => {
            let bytes = fs::read(&image).map_err(|e| e.to_string())?;
            let (header, records) = Opk::parse(&bytes).map_err(|e| e.to_string())?;
            let analysis = Opk::analyze_checksum(&header);
            println!("flags=${:02X} size_indicator={} records={}", header.flags, header.size_indicator, records.len());
            println!("checksum valid: {}", analysis.valid);
            if analysis.valid_after_stripping_protection {
                info!("checksum mismatch explained by protection bits {:?}", analysis.protection_bits);
                println!("valid after stripping protection bits {:?}", analysis.protection_bits);
            }
            Ok(())
        }
    }
}

fn run_emulator(rom_path: PathBuf, pack_path: Option<PathBuf>, cycles: u32, model_name: String) -> Result<(), String> {
    let model = Model::from_name(&model_name).ok_or_else(|| format!("unknown model `{}`", model_name))?;
    let rom = fs::read(&rom_path).map_err(|e| e.to_string())?;
    let mut emu = Emulator::new(EmulatorConfig { model, rom });
    emu.reset();

    if let Some(path) = pack_path {
        let data = fs::read(&path).map_err(|e| e.to_string())?;
        let size_kb = data.len() / 1024;
        info!("loading pack ({} KB) into slot 0", size_kb);
        let pack = Pack::new(PackKind::Rom, size_kb, data);
        emu.load_pack(pack, 0).map_err(|e| e.to_string())?;
    }

    let consumed = emu.execute(cycles).map_err(|e| e.to_string())?;
    info!("ran {} cycles (budget {})", consumed, cycles);
    if let Some(hit) = emu.last_hit() {
        info!("execution stopped early: {}", hit);
    }

    let regs = emu.registers();
    println!("A=${:02X} B=${:02X} X=${:04X} SP=${:04X} PC=${:04X} flags=${:02X}", regs.a, regs.b, regs.x, regs.sp, regs.pc, regs.flags);
    Ok(())
}
