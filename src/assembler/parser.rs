//! Parser (C8, stage 2): turns a token stream into a flat list of
//! statements. INCLUDE resolution and macro expansion happen first, as a
//! textual pass over the source (spec: macros are string-level templates,
//! expanded before the real parse so ordinary errors inside an expansion
//! point at the invocation line); conditional assembly (`IF`/`ELSE`/
//! `ENDIF`) is handled afterwards, as a nesting stack over statements,
//! since its predicate is a real expression that needs the symbol table.

use std::collections::HashMap;

use super::expr::{evaluate, Expr, ExprParser};
use super::lexer::{Lexer, Token, TokenKind};
use crate::cpu::isa::{self, AddressingMode, Mnemonic};
use crate::error::{AsmError, SourceLocation};

/// Resolves an `INCLUDE "name"` directive to file contents. The assembler
/// facade supplies a filesystem-backed implementation; tests can supply an
/// in-memory one.
pub trait IncludeResolver {
    fn resolve(&self, path: &str) -> Option<String>;
}

#[derive(Debug, Clone, PartialEq)]
pub enum Operand {
    Immediate(Expr),
    Indexed(Expr),
    /// Bare numeric/symbol operand whose direct-vs-extended form the code
    /// generator picks once the value (and the mnemonic's addressing
    /// capability) is known.
    DirectOrExtended(Expr),
    /// Branch target expression (usually a bare symbol, sometimes `*+n`),
    /// kept unevaluated until pass 2 computes the branch offset.
    Relative(Expr),
    BitManipulate { mask: Expr, address: Expr, indexed: bool },
}

#[derive(Debug, Clone, PartialEq)]
pub enum Directive {
    Org(Expr),
    Equ(String, Expr),
    Set(String, Expr),
    Fcb(Vec<Expr>),
    Fdb(Vec<Expr>),
    Fcc(String),
    Rmb(Expr),
    End,
    Model(String),
    Relocatable,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Statement {
    Label { name: String, loc: SourceLocation },
    Instruction { mnemonic: Mnemonic, operand: Option<Operand>, loc: SourceLocation },
    Directive { directive: Directive, loc: SourceLocation },
    MacroCall { name: String, loc: SourceLocation },
}

impl Statement {
    pub fn loc(&self) -> &SourceLocation {
        match self {
            Statement::Label { loc, .. }
            | Statement::Instruction { loc, .. }
            | Statement::Directive { loc, .. }
            | Statement::MacroCall { loc, .. } => loc,
        }
    }
}

struct MacroDef {
    params: Vec<String>,
    body: Vec<String>,
}

/// Expands `INCLUDE` and user macros textually, returning source ready for
/// tokenizing. Recursion through includes is bounded by `max_depth` to
/// catch cycles.
pub fn preprocess(source: &str, filename: &str, resolver: &dyn IncludeResolver) -> Result<String, AsmError> {
    expand(source, filename, resolver, &mut HashMap::new(), 0)
}

fn expand(source: &str, filename: &str, resolver: &dyn IncludeResolver, macros: &mut HashMap<String, MacroDef>, depth: u32) -> Result<String, AsmError> {
    if depth > 32 {
        return Err(AsmError::IncludeNotFound { loc: SourceLocation::new(filename, 0, 0, ""), path: "(include nesting too deep)".into() });
    }

    let mut out = String::new();
    let mut lines = source.lines().peekable();
    let mut current_macro: Option<(String, MacroDef)> = None;
    let mut line_no: u32 = 0;

    while let Some(raw_line) = lines.next() {
        line_no += 1;
        let trimmed = raw_line.trim_start();
        let mut words = trimmed.split_whitespace();
        let first = words.next().unwrap_or("");

        if let Some((name, def)) = current_macro.as_mut() {
            if first.eq_ignore_ascii_case("ENDM") {
                macros.insert(std::mem::take(name), std::mem::replace(def, MacroDef { params: vec![], body: vec![] }));
                current_macro = None;
            } else {
                def.body.push(raw_line.to_string());
            }
            continue;
        }

        if first.eq_ignore_ascii_case("MACRO") {
            let name = words.next().unwrap_or("").to_string();
            let params: Vec<String> = words.flat_map(|w| w.split(',')).filter(|s| !s.is_empty()).map(|s| s.to_string()).collect();
            current_macro = Some((name, MacroDef { params, body: Vec::new() }));
            continue;
        }

        if first.eq_ignore_ascii_case("INCLUDE") {
            let rest = trimmed[first.len()..].trim();
            let path = rest.trim_matches('"');
            let contents = resolver.resolve(path).ok_or_else(|| AsmError::IncludeNotFound {
                loc: SourceLocation::new(filename, line_no, 1, raw_line),
                path: path.to_string(),
            })?;
            out.push_str(&expand(&contents, path, resolver, macros, depth + 1)?);
            out.push('\n');
            continue;
        }

        // A lone identifier (optionally preceded by a label) matching a
        // defined macro name is an invocation; substitute its body with
        // positional parameters bound to the comma-separated arguments.
        let (label_part, rest_of_line) = split_label(trimmed);
        let mut rest_words = rest_of_line.split_whitespace();
        if let Some(candidate) = rest_words.next() {
            if let Some(def) = macros.get(candidate) {
                if let Some(label) = label_part {
                    out.push_str(label);
                    out.push('\n');
                }
                let arg_text = rest_of_line[candidate.len()..].trim();
                let args: Vec<&str> = if arg_text.is_empty() { Vec::new() } else { arg_text.split(',').map(|s| s.trim()).collect() };
                for body_line in &def.body {
                    out.push_str(&substitute_params(body_line, &def.params, &args));
                    out.push('\n');
                }
                continue;
            }
        }

        out.push_str(raw_line);
        out.push('\n');
    }

    Ok(out)
}

fn split_label(line: &str) -> (Option<&str>, &str) {
    if let Some(colon) = line.find(':') {
        let (label, rest) = line.split_at(colon + 1);
        if label[..colon].chars().all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '.') {
            return (Some(label), rest.trim_start());
        }
    }
    (None, line)
}

fn substitute_params(body_line: &str, params: &[String], args: &[&str]) -> String {
    let mut result = body_line.to_string();
    for (i, param) in params.iter().enumerate() {
        let placeholder = format!("%{}", i + 1);
        let value = args.get(i).copied().unwrap_or("");
        result = result.replace(&placeholder, value);
        result = result.replace(param, value);
    }
    result
}

/// Recursive-descent parser producing the flat statement list the
/// optimizer and code generator both operate on.
pub struct Parser<'a> {
    tokens: Vec<Token>,
    pos: usize,
    filename: &'a str,
    source_lines: Vec<&'a str>,
    errors: Vec<AsmError>,
}

struct CondFrame {
    emitting: bool,
    already_emitted: bool,
}

impl<'a> Parser<'a> {
    pub fn new(source: &'a str, filename: &'a str) -> Result<Self, AsmError> {
        let tokens = Lexer::new(source, filename).tokenize()?;
        Ok(Parser { tokens, pos: 0, filename, source_lines: source.lines().collect(), errors: Vec::new() })
    }

    fn loc(&self, tok: &Token) -> SourceLocation {
        let text = self.source_lines.get((tok.line.saturating_sub(1)) as usize).copied().unwrap_or("");
        SourceLocation::new(self.filename, tok.line, tok.column, text)
    }

    fn peek(&self) -> &Token {
        &self.tokens[self.pos.min(self.tokens.len() - 1)]
    }

    fn bump(&mut self) -> Token {
        let t = self.tokens[self.pos.min(self.tokens.len() - 1)].clone();
        if self.pos < self.tokens.len() - 1 {
            self.pos += 1;
        }
        t
    }

    fn at_eof(&self) -> bool {
        matches!(self.peek().kind, TokenKind::Eof)
    }

    fn skip_newlines(&mut self) {
        while matches!(self.peek().kind, TokenKind::Newline) {
            self.bump();
        }
    }

    fn parse_expr(&mut self) -> Result<Expr, AsmError> {
        let loc_of = |t: &Token| self.loc(t);
        let mut ep = ExprParser::new(&self.tokens, self.pos, &loc_of);
        let e = ep.parse()?;
        self.pos = ep.pos();
        Ok(e)
    }

    /// Parses the whole token stream into statements, applying conditional
    /// filtering, and collecting (rather than aborting on) recoverable
    /// errors.
    pub fn parse_program(mut self, symbols: &HashMap<String, u32>) -> Result<Vec<Statement>, Vec<AsmError>> {
        let mut out = Vec::new();
        let mut cond_stack: Vec<CondFrame> = Vec::new();

        loop {
            self.skip_newlines();
            if self.at_eof() {
                break;
            }
            match self.parse_line(symbols, &mut cond_stack) {
                Ok(mut stmts) => {
                    let emitting = cond_stack.iter().all(|f| f.emitting);
                    if emitting {
                        out.append(&mut stmts);
                    }
                }
                Err(e) => {
                    self.errors.push(e);
                    // best-effort recovery: skip to next newline
                    while !matches!(self.peek().kind, TokenKind::Newline | TokenKind::Eof) {
                        self.bump();
                    }
                }
            }
        }

        if self.errors.is_empty() {
            Ok(out)
        } else {
            Err(self.errors)
        }
    }

    fn parse_line(&mut self, symbols: &HashMap<String, u32>, cond_stack: &mut Vec<CondFrame>) -> Result<Vec<Statement>, AsmError> {
        let mut out = Vec::new();

        // optional label
        if let TokenKind::Identifier(name) = self.peek().kind.clone() {
            let save = self.pos;
            let loc = self.loc(self.peek());
            self.bump();
            if matches!(self.peek().kind, TokenKind::Colon) {
                self.bump();
                out.push(Statement::Label { name, loc });
            } else if is_directive_or_mnemonic(&name) {
                self.pos = save;
            } else {
                // a bare label with no colon, immediately followed by an
                // instruction/directive on the same logical line
                out.push(Statement::Label { name, loc });
            }
        }

        if matches!(self.peek().kind, TokenKind::Newline | TokenKind::Eof) {
            return Ok(out);
        }

        let name_tok = self.peek().clone();
        let name = match &name_tok.kind {
            TokenKind::Identifier(n) => n.clone(),
            other => {
                return Err(AsmError::Syntax {
                    loc: self.loc(&name_tok),
                    message: format!("expected mnemonic or directive, found {:?}", other),
                    source: self.loc(&name_tok).source_line,
                    caret: String::new(),
                });
            }
        };
        self.bump();
        let loc = self.loc(&name_tok);
        let upper = name.to_ascii_uppercase();

        match upper.as_str() {
            "IF" => {
                let predicate = self.parse_expr()?;
                let value = evaluate(&predicate, symbols, 0, &loc).unwrap_or(0);
                cond_stack.push(CondFrame { emitting: value != 0, already_emitted: value != 0 });
                return Ok(out);
            }
            "ELSE" => {
                if let Some(frame) = cond_stack.last_mut() {
                    frame.emitting = !frame.already_emitted;
                    frame.already_emitted = frame.already_emitted || frame.emitting;
                }
                return Ok(out);
            }
            "ENDIF" => {
                cond_stack.pop();
                return Ok(out);
            }
            "ORG" => {
                let e = self.parse_expr()?;
                out.push(Statement::Directive { directive: Directive::Org(e), loc });
                return Ok(out);
            }
            "EQU" => {
                return Err(AsmError::Directive { loc, directive: "EQU".into(), message: "EQU requires a label (use `name EQU value`)".into() });
            }
            "RMB" => {
                let e = self.parse_expr()?;
                out.push(Statement::Directive { directive: Directive::Rmb(e), loc });
                return Ok(out);
            }
            "FCB" => {
                let values = self.parse_expr_list()?;
                out.push(Statement::Directive { directive: Directive::Fcb(values), loc });
                return Ok(out);
            }
            "FDB" => {
                let values = self.parse_expr_list()?;
                out.push(Statement::Directive { directive: Directive::Fdb(values), loc });
                return Ok(out);
            }
            "FCC" => {
                if let TokenKind::Str(s) = self.peek().kind.clone() {
                    self.bump();
                    out.push(Statement::Directive { directive: Directive::Fcc(s), loc });
                } else {
                    return Err(AsmError::Directive { loc, directive: "FCC".into(), message: "expected a string literal".into() });
                }
                return Ok(out);
            }
            "END" => {
                out.push(Statement::Directive { directive: Directive::End, loc });
                return Ok(out);
            }
            "MODEL" => {
                if let TokenKind::Identifier(m) = self.peek().kind.clone() {
                    self.bump();
                    out.push(Statement::Directive { directive: Directive::Model(m), loc });
                } else {
                    return Err(AsmError::Directive { loc, directive: "MODEL".into(), message: "expected a model name".into() });
                }
                return Ok(out);
            }
            "RELOCATABLE" => {
                out.push(Statement::Directive { directive: Directive::Relocatable, loc });
                return Ok(out);
            }
            _ => {}
        }

        // `NAME EQU expr` / `NAME SET expr` — label form of these two
        // directives, distinguished from a plain label by what follows.
        if matches!(self.peek().kind, TokenKind::Identifier(ref id) if id.eq_ignore_ascii_case("EQU") || id.eq_ignore_ascii_case("SET")) {
            let is_set = matches!(self.peek().kind, TokenKind::Identifier(ref id) if id.eq_ignore_ascii_case("SET"));
            self.bump();
            let value = self.parse_expr()?;
            out.push(Statement::Directive { directive: if is_set { Directive::Set(name, value) } else { Directive::Equ(name, value) }, loc });
            return Ok(out);
        }

        if let Some(mnemonic) = mnemonic_from_name(&upper) {
            let operand = self.parse_operand(mnemonic, &loc)?;
            out.push(Statement::Instruction { mnemonic, operand, loc });
            return Ok(out);
        }

        // Unknown identifier with no recognized form; treat as an
        // (already-expanded) macro invocation that produced no body.
        out.push(Statement::MacroCall { name, loc });
        Ok(out)
    }

    fn parse_expr_list(&mut self) -> Result<Vec<Expr>, AsmError> {
        let mut out = vec![self.parse_expr()?];
        while matches!(self.peek().kind, TokenKind::Comma) {
            self.bump();
            out.push(self.parse_expr()?);
        }
        Ok(out)
    }

    fn parse_operand(&mut self, mnemonic: Mnemonic, loc: &SourceLocation) -> Result<Option<Operand>, AsmError> {
        if matches!(self.peek().kind, TokenKind::Newline | TokenKind::Eof) {
            return Ok(None);
        }

        if isa::BIT_MANIPULATE_MNEMONICS.contains(&mnemonic) {
            let mask = self.parse_expr()?;
            self.expect_comma()?;
            let address = self.parse_expr()?;
            let indexed = matches!(self.peek().kind, TokenKind::Comma);
            if indexed {
                self.bump();
                self.expect_index_register()?;
            }
            return Ok(Some(Operand::BitManipulate { mask, address, indexed }));
        }

        if matches!(self.peek().kind, TokenKind::Hash) {
            self.bump();
            let e = self.parse_expr()?;
            return Ok(Some(Operand::Immediate(e)));
        }

        if isa::is_branch(mnemonic) {
            let e = self.parse_expr()?;
            return Ok(Some(Operand::Relative(e)));
        }

        let e = self.parse_expr()?;
        if matches!(self.peek().kind, TokenKind::Comma) {
            self.bump();
            self.expect_index_register()?;
            return Ok(Some(Operand::Indexed(e)));
        }

        let _ = loc;
        Ok(Some(Operand::DirectOrExtended(e)))
    }

    fn expect_index_register(&mut self) -> Result<(), AsmError> {
        if let TokenKind::Identifier(id) = self.peek().kind.clone() {
            if id.eq_ignore_ascii_case("X") {
                self.bump();
                return Ok(());
            }
        }
        Err(AsmError::Syntax {
            loc: self.loc(self.peek()),
            message: "expected index register `X` after `,`".into(),
            source: self.loc(self.peek()).source_line,
            caret: String::new(),
        })
    }

    fn expect_comma(&mut self) -> Result<(), AsmError> {
        if matches!(self.peek().kind, TokenKind::Comma) {
            self.bump();
            Ok(())
        } else {
            Err(AsmError::Syntax {
                loc: self.loc(self.peek()),
                message: "expected `,`".into(),
                source: self.loc(self.peek()).source_line,
                caret: String::new(),
            })
        }
    }
}

fn mnemonic_from_name(upper: &str) -> Option<Mnemonic> {
    use Mnemonic::*;
    Some(match upper {
        "NOP" => Nop, "LSRD" => Lsrd, "ASLD" => Asld, "TAP" => Tap, "TPA" => Tpa, "INX" => Inx, "DEX" => Dex,
        "CLV" => Clv, "SEV" => Sev, "CLC" => Clc, "SEC" => Sec, "CLI" => Cli, "SEI" => Sei,
        "SBA" => Sba, "CBA" => Cba, "TAB" => Tab, "TBA" => Tba, "XGDX" => Xgdx, "DAA" => Daa, "SLP" => Slp, "ABA" => Aba,
        "BRA" => Bra, "BRN" => Brn, "BHI" => Bhi, "BLS" => Bls, "BCC" => Bcc, "BCS" => Bcs, "BNE" => Bne, "BEQ" => Beq,
        "BVC" => Bvc, "BVS" => Bvs, "BPL" => Bpl, "BMI" => Bmi, "BGE" => Bge, "BLT" => Blt, "BGT" => Bgt, "BLE" => Ble,
        "TSX" => Tsx, "INS" => Ins, "PULA" => Pula, "PULB" => Pulb, "DES" => Des, "TXS" => Txs, "PSHA" => Psha,
        "PSHB" => Pshb, "PULX" => Pulx, "RTS" => Rts, "ABX" => Abx, "RTI" => Rti, "PSHX" => Pshx, "MUL" => Mul,
        "WAI" => Wai, "SWI" => Swi,
        "NEGA" => Nega, "COMA" => Coma, "LSRA" => Lsra, "RORA" => Rora, "ASRA" => Asra, "ASLA" => Asla, "ROLA" => Rola,
        "DECA" => Deca, "INCA" => Inca, "TSTA" => Tsta, "CLRA" => Clra,
        "NEGB" => Negb, "COMB" => Comb, "LSRB" => Lsrb, "RORB" => Rorb, "ASRB" => Asrb, "ASLB" => Aslb, "ROLB" => Rolb,
        "DECB" => Decb, "INCB" => Incb, "TSTB" => Tstb, "CLRB" => Clrb,
        "NEG" => Neg, "COM" => Com, "LSR" => Lsr, "ROR" => Ror, "ASR" => Asr, "ASL" => Asl, "ROL" => Rol, "DEC" => Dec,
        "INC" => Inc, "TST" => Tst, "JMP" => Jmp, "CLR" => Clr,
        "SUBA" => Suba, "CMPA" => Cmpa, "SBCA" => Sbca, "SUBD" => Subd, "ANDA" => Anda, "BITA" => Bita, "LDAA" => Ldaa,
        "STAA" => Staa, "EORA" => Eora, "ADCA" => Adca, "ORAA" => Oraa, "ADDA" => Adda, "CPX" => Cpx, "JSR" => Jsr,
        "LDS" => Lds, "STS" => Sts, "BSR" => Bsr,
        "SUBB" => Subb, "CMPB" => Cmpb, "SBCB" => Sbcb, "ADDD" => Addd, "ANDB" => Andb, "BITB" => Bitb, "LDAB" => Ldab,
        "STAB" => Stab, "EORB" => Eorb, "ADCB" => Adcb, "ORAB" => Orab, "ADDB" => Addb, "LDD" => Ldd, "STD" => Std,
        "LDX" => Ldx, "STX" => Stx,
        "AIM" => Aim, "OIM" => Oim, "EIM" => Eim, "TIM" => Tim,
        _ => return None,
    })
}

fn is_directive_or_mnemonic(name: &str) -> bool {
    let upper = name.to_ascii_uppercase();
    matches!(upper.as_str(), "ORG" | "EQU" | "SET" | "RMB" | "FCB" | "FDB" | "FCC" | "END" | "MODEL" | "RELOCATABLE" | "IF" | "ELSE" | "ENDIF")
        || mnemonic_from_name(&upper).is_some()
}

#[cfg(test)]
mod tests {
    use super::*;

    struct NoIncludes;
    impl IncludeResolver for NoIncludes {
        fn resolve(&self, _path: &str) -> Option<String> {
            None
        }
    }

    fn parse(src: &str) -> Vec<Statement> {
        let expanded = preprocess(src, "t.asm", &NoIncludes).unwrap();
        Parser::new(&expanded, "t.asm").unwrap().parse_program(&HashMap::new()).unwrap()
    }

    #[test]
    fn parses_label_instruction_and_directive() {
        let stmts = parse("start: LDAA #$41\nORG $0040\n");
        assert!(matches!(&stmts[0], Statement::Label { name, .. } if name == "start"));
        assert!(matches!(&stmts[1], Statement::Instruction { mnemonic: Mnemonic::Ldaa, operand: Some(Operand::Immediate(_)), .. }));
        assert!(matches!(&stmts[2], Statement::Directive { directive: Directive::Org(_), .. }));
    }

    #[test]
    fn equ_defines_a_symbol_directive() {
        let stmts = parse("COUNT EQU 10\n");
        assert!(matches!(&stmts[0], Statement::Directive { directive: Directive::Equ(name, _), .. } if name == "COUNT"));
    }

    #[test]
    fn indexed_operand_requires_x_register() {
        let stmts = parse("LDAA 4,X\n");
        assert!(matches!(&stmts[0], Statement::Instruction { operand: Some(Operand::Indexed(_)), .. }));
    }

    #[test]
    fn branch_operand_is_kept_as_an_unevaluated_expression() {
        let stmts = parse("BEQ done\n");
        assert!(matches!(&stmts[0], Statement::Instruction { operand: Some(Operand::Relative(Expr::Symbol(name))), .. } if name == "done"));
    }

    #[test]
    fn conditional_block_is_filtered_by_predicate() {
        let stmts = parse("IF 0\nNOP\nELSE\nRTS\nENDIF\n");
        assert_eq!(stmts.len(), 1);
        assert!(matches!(&stmts[0], Statement::Instruction { mnemonic: Mnemonic::Rts, .. }));
    }

    #[test]
    fn macro_invocation_expands_with_positional_params() {
        let src = "DOUBLE MACRO REG\nADDA #%1\nENDM\nstart: DOUBLE $05\n";
        let expanded = preprocess(src, "t.asm", &NoIncludes).unwrap();
        assert!(expanded.contains("ADDA #$05"));
    }

    #[test]
    fn bit_manipulate_parses_mask_and_direct_address() {
        let stmts = parse("AIM #$01,$40\n");
        assert!(matches!(&stmts[0], Statement::Instruction { operand: Some(Operand::BitManipulate { .. }), .. }));
    }
}
