//! Two-pass HD6303 assembler (C8): lexer → parser (includes, macros,
//! conditionals) → peephole optimizer → code generator → output. See
//! `lexer`, `expr`, `parser`, `optimizer`, `codegen`, and `model` for the
//! individual stages; this module is the embedder-facing facade spec.md
//! §6 names.

pub mod codegen;
pub mod expr;
pub mod lexer;
pub mod model;
pub mod optimizer;
pub mod parser;

use std::collections::HashMap;
use std::fs;
use std::path::PathBuf;

use codegen::{Codegen, CodegenOutput};
use model::Model;
use optimizer::{optimize, OptimizerStats};
use parser::{IncludeResolver, Parser};

use crate::error::{AsmError, AsmErrors};

#[derive(Debug, Default, Clone)]
pub struct AssemblerOptions {
    pub model: Option<Model>,
    pub enable_peephole: bool,
    pub relocatable: bool,
}

struct FilesystemIncludes {
    paths: Vec<PathBuf>,
}

impl IncludeResolver for FilesystemIncludes {
    fn resolve(&self, path: &str) -> Option<String> {
        for base in &self.paths {
            let candidate = base.join(path);
            if let Ok(contents) = fs::read_to_string(&candidate) {
                return Some(contents);
            }
        }
        fs::read_to_string(path).ok()
    }
}

/// The embedder-facing entry point: `new`, feed in include paths and
/// predefined symbols, call `assemble` once per source file, then read
/// back code/symbols/listing or write an OB3 file.
pub struct Assembler {
    options: AssemblerOptions,
    resolver: FilesystemIncludes,
    predefined: HashMap<String, u32>,
    output: Option<CodegenOutput>,
    optimizer_stats: OptimizerStats,
    errors: Vec<AsmError>,
}

impl Assembler {
    pub fn new(options: AssemblerOptions) -> Self {
        let mut predefined = HashMap::new();
        if let Some(model) = options.model {
            for (k, v) in model.predefined_symbols() {
                predefined.insert(k.to_string(), v);
            }
        }
        Assembler { options, resolver: FilesystemIncludes { paths: Vec::new() }, predefined, output: None, optimizer_stats: OptimizerStats::default(), errors: Vec::new() }
    }

    pub fn add_include_path(&mut self, path: impl Into<PathBuf>) {
        self.resolver.paths.push(path.into());
    }

    pub fn define_symbol(&mut self, name: impl Into<String>, value: u32) {
        self.predefined.insert(name.into(), value);
    }

    pub fn assemble(&mut self, source: &str, filename: &str) -> Result<(), AsmErrors> {
        self.errors.clear();
        self.output = None;

        let expanded = match parser::preprocess(source, filename, &self.resolver) {
            Ok(s) => s,
            Err(e) => return Err(AsmErrors(vec![e])),
        };

        let parsed = Parser::new(&expanded, filename).map_err(|e| AsmErrors(vec![e]))?;
        let statements = match parsed.parse_program(&self.predefined) {
            Ok(s) => s,
            Err(errs) => return Err(AsmErrors(errs)),
        };

        let statements = if self.options.enable_peephole {
            let (optimized, stats) = optimize(statements);
            self.optimizer_stats = stats;
            optimized
        } else {
            statements
        };

        let mut codegen = Codegen::new(self.predefined.clone());
        match codegen.assemble(&statements) {
            Ok(output) => {
                self.output = Some(output);
                Ok(())
            }
            Err(errs) => Err(AsmErrors(errs)),
        }
    }

    pub fn get_code(&self) -> Option<&[u8]> {
        self.output.as_ref().map(|o| o.code.as_slice())
    }

    pub fn get_symbols(&self) -> Option<&HashMap<String, u32>> {
        self.output.as_ref().map(|o| &o.symbols)
    }

    pub fn get_listing(&self) -> Option<String> {
        self.output.as_ref().map(|o| codegen::format_listing(&o.listing))
    }

    pub fn optimizer_stats(&self) -> OptimizerStats {
        self.optimizer_stats
    }

    pub fn write_ob3(&self, path: impl AsRef<std::path::Path>) -> std::io::Result<()> {
        let code = self.output.as_ref().map(|o| o.code.as_slice()).unwrap_or(&[]);
        let bytes = codegen::write_ob3(code, 0x83);
        fs::write(path, bytes)
    }

    pub fn has_errors(&self) -> bool {
        !self.errors.is_empty()
    }

    pub fn get_error_report(&self) -> String {
        AsmErrors(self.errors.clone()).report()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn assembles_a_small_program_end_to_end() {
        let mut asm = Assembler::new(AssemblerOptions::default());
        asm.assemble("ORG $0040\nLDAA #$FF\nADDA #$01\nLDAB #$00\nADCB #$00\n", "s1.asm").unwrap();
        assert_eq!(asm.get_code().unwrap(), &[0x86, 0xFF, 0x8B, 0x01, 0xC6, 0x00, 0xC9, 0x00]);
    }

    #[test]
    fn model_targeted_symbols_are_predefined_before_assembly() {
        let opts = AssemblerOptions { model: Some(Model::Lz), ..Default::default() };
        let mut asm = Assembler::new(opts);
        asm.assemble("ORG $8000\nLDAA #FOUR_LINE\n", "m.asm").unwrap();
        assert_eq!(asm.get_symbols().unwrap()["FOUR_LINE"], 1);
    }

    #[test]
    fn peephole_flag_controls_whether_cmpa_zero_is_rewritten() {
        let opts = AssemblerOptions { enable_peephole: true, ..Default::default() };
        let mut asm = Assembler::new(opts);
        asm.assemble("ORG $0040\nLDAA #0\nCMPA #0\nBNE done\ndone: RTS\n", "p.asm").unwrap();
        assert!(asm.optimizer_stats().cmp_to_tst >= 1);
    }

    #[test]
    fn undefined_symbol_is_reported_as_an_assembly_error() {
        let mut asm = Assembler::new(AssemblerOptions::default());
        let result = asm.assemble("ORG $0040\nLDAA nowhere\n", "bad.asm");
        assert!(result.is_err());
    }
}
