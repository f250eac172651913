//! Error hierarchy for the assembler, the OPK codec, and the emulator.
//!
//! Mirrors the three independent families a caller can match on: an
//! assembly run collects `AsmError`s and reports them together, the OPK
//! codec raises a single `OpkError` at the first malformed byte, and the
//! emulator raises `EmuError` only for conditions the real hardware
//! cannot produce (a wandering stack, an unknown model, a bad slot).

use std::fmt;
use thiserror::Error;

/// Where in a source file an assembler diagnostic applies.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceLocation {
    pub file: String,
    pub line: u32,
    pub column: u32,
    pub source_line: String,
}

impl SourceLocation {
    pub fn new(file: impl Into<String>, line: u32, column: u32, source_line: impl Into<String>) -> Self {
        SourceLocation { file: file.into(), line, column, source_line: source_line.into() }
    }
}

impl fmt::Display for SourceLocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}:{}", self.file, self.line, self.column)
    }
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum AsmError {
    #[error("{loc}: error: syntax error: {message}\n{source}\n{caret}")]
    Syntax { loc: SourceLocation, message: String, source: String, caret: String },

    #[error("{loc}: error: undefined symbol `{name}`")]
    UndefinedSymbol { loc: SourceLocation, name: String },

    #[error("{loc}: error: symbol `{name}` already defined at {first}")]
    DuplicateSymbol { loc: SourceLocation, name: String, first: SourceLocation },

    #[error("{loc}: error: addressing mode not valid for `{mnemonic}`")]
    BadAddressingMode { loc: SourceLocation, mnemonic: String },

    #[error("{loc}: error: branch to `{target}` out of range ({offset} bytes)")]
    BranchOutOfRange { loc: SourceLocation, target: String, offset: i32 },

    #[error("{loc}: error: {message}")]
    Expression { loc: SourceLocation, message: String },

    #[error("{loc}: error: directive `{directive}`: {message}")]
    Directive { loc: SourceLocation, directive: String, message: String },

    #[error("{loc}: error: include file not found: {path}")]
    IncludeNotFound { loc: SourceLocation, path: String },

    #[error("{loc}: error: macro `{name}`: {message}")]
    Macro { loc: SourceLocation, name: String, message: String },
}

impl AsmError {
    pub fn location(&self) -> &SourceLocation {
        match self {
            AsmError::Syntax { loc, .. }
            | AsmError::UndefinedSymbol { loc, .. }
            | AsmError::DuplicateSymbol { loc, .. }
            | AsmError::BadAddressingMode { loc, .. }
            | AsmError::BranchOutOfRange { loc, .. }
            | AsmError::Expression { loc, .. }
            | AsmError::Directive { loc, .. }
            | AsmError::IncludeNotFound { loc, .. }
            | AsmError::Macro { loc, .. } => loc,
        }
    }
}

/// A batch of errors collected over a whole assembly run.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[error("{} error(s) during assembly", .0.len())]
pub struct AsmErrors(pub Vec<AsmError>);

impl AsmErrors {
    pub fn report(&self) -> String {
        self.0.iter().map(|e| e.to_string()).collect::<Vec<_>>().join("\n")
    }
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum OpkError {
    #[error("bad OPK magic at offset {offset}")]
    BadMagic { offset: usize },

    #[error("truncated OPK data at offset {offset}")]
    Truncated { offset: usize },

    #[error("invalid pack size indicator: {indicator}")]
    InvalidPackSize { indicator: u8 },

    #[error("record at offset {offset} declares length {declared} but only {available} bytes remain")]
    RecordLengthMismatch { offset: usize, declared: usize, available: usize },

    #[error("invalid procedure name `{name}`: must be 1-8 uppercase ASCII characters starting with a letter")]
    InvalidProcedureName { name: String },
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum EmuError {
    #[error("stack error: SP=${sp:04X} wandered out of the valid window (PC=${pc:04X})")]
    StackError { sp: u16, pc: u16 },

    #[error("unknown model `{0}`")]
    UnknownModel(String),

    #[error("invalid pack slot {0} (valid slots are 0, 1, 2)")]
    InvalidSlot(usize),
}

pub type AsmResult<T> = Result<T, AsmError>;
pub type OpkResult<T> = Result<T, OpkError>;
pub type EmuResult<T> = Result<T, EmuError>;
