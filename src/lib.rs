//! A cross-development toolchain and cycle-accurate core for the Psion
//! Organiser II: an HD6303 CPU and peripheral emulation (`cpu`, `memory`,
//! `display`, `keyboard`, `pack`, `bus`), a two-pass assembler
//! (`assembler`), an OPK pack-image codec (`opk`), and the `Emulator`
//! facade that ties the core together for embedders and the `orgcli`
//! binary.

pub mod error;

pub mod cpu;
pub mod memory;
pub mod display;
pub mod keyboard;
pub mod pack;
pub mod bus;
pub mod snapshot;
pub mod disasm;
pub mod emulator;

pub mod assembler;
pub mod opk;

pub use emulator::{Emulator, EmulatorConfig, Model};
