//! Peephole optimizer (C8, stage 3): a conservative, label-aware pass run
//! to fixpoint over the parsed statement list. Never crosses a label
//! boundary and never looks inside macro bodies until after expansion
//! (the statement list it sees is already fully expanded).

use super::expr::Expr;
use super::parser::{Directive, Operand, Statement};
use crate::cpu::isa::Mnemonic;

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct OptimizerStats {
    pub cmp_to_tst: u32,
    pub redundant_immediate_loads: u32,
    pub push_pull_pairs_removed: u32,
    pub redundant_tsx: u32,
    pub unreachable_removed: u32,
}

impl OptimizerStats {
    pub fn total(&self) -> u32 {
        self.cmp_to_tst + self.redundant_immediate_loads + self.push_pull_pairs_removed + self.redundant_tsx + self.unreachable_removed
    }
}

fn is_label(s: &Statement) -> bool {
    matches!(s, Statement::Label { .. })
}

fn is_zero_immediate(op: &Option<Operand>) -> bool {
    matches!(op, Some(Operand::Immediate(Expr::Number(0))))
}

fn carry_dependent_branch(mnemonic: Mnemonic) -> bool {
    matches!(mnemonic, Mnemonic::Bcc | Mnemonic::Bcs | Mnemonic::Bhi | Mnemonic::Bls)
}

/// Runs every required transformation to a fixpoint, returning the
/// rewritten statement list and a tally of how many times each fired.
pub fn optimize(statements: Vec<Statement>) -> (Vec<Statement>, OptimizerStats) {
    let mut stats = OptimizerStats::default();
    let mut current = statements;
    loop {
        let (next, round) = run_one_pass(current);
        stats.cmp_to_tst += round.cmp_to_tst;
        stats.redundant_immediate_loads += round.redundant_immediate_loads;
        stats.push_pull_pairs_removed += round.push_pull_pairs_removed;
        stats.redundant_tsx += round.redundant_tsx;
        stats.unreachable_removed += round.unreachable_removed;
        if round.total() == 0 {
            return (next, stats);
        }
        current = next;
    }
}

fn run_one_pass(statements: Vec<Statement>) -> (Vec<Statement>, OptimizerStats) {
    let mut stats = OptimizerStats::default();
    let mut out: Vec<Statement> = Vec::with_capacity(statements.len());
    let mut i = 0;

    while i < statements.len() {
        // Transformation 1: CMPA/CMPB #0 -> TSTA/TSTB, unless the very next
        // real instruction is a carry-dependent branch within this block.
        if let Statement::Instruction { mnemonic, operand, loc } = &statements[i] {
            if (*mnemonic == Mnemonic::Cmpa || *mnemonic == Mnemonic::Cmpb) && is_zero_immediate(operand) {
                let next_is_carry_branch = statements[i + 1..]
                    .iter()
                    .take_while(|s| !is_label(s))
                    .find_map(|s| if let Statement::Instruction { mnemonic: m, .. } = s { Some(*m) } else { None })
                    .map_or(false, carry_dependent_branch);
                if !next_is_carry_branch {
                    let tst = if *mnemonic == Mnemonic::Cmpa { Mnemonic::Tsta } else { Mnemonic::Tstb };
                    out.push(Statement::Instruction { mnemonic: tst, operand: None, loc: loc.clone() });
                    stats.cmp_to_tst += 1;
                    i += 1;
                    continue;
                }
            }
        }

        // Transformation 2: drop a second immediate load into the same
        // register when it repeats the value the first load just set.
        if let Statement::Instruction { mnemonic: m1, operand: op1, .. } = &statements[i] {
            if matches!(m1, Mnemonic::Ldaa | Mnemonic::Ldab | Mnemonic::Ldx | Mnemonic::Ldd) {
                if let Some(Statement::Instruction { mnemonic: m2, operand: op2, .. }) = statements.get(i + 1) {
                    if m1 == m2 && op1 == op2 && matches!(op1, Some(Operand::Immediate(_))) {
                        out.push(statements[i].clone());
                        stats.redundant_immediate_loads += 1;
                        i += 2;
                        continue;
                    }
                }
            }
        }

        // Transformation 3: PSHx immediately undone by a matching PULx with
        // no intervening label or flag-consuming instruction.
        if let Statement::Instruction { mnemonic: m1, loc: _, .. } = &statements[i] {
            let pair = match m1 {
                Mnemonic::Psha => Some(Mnemonic::Pula),
                Mnemonic::Pshb => Some(Mnemonic::Pulb),
                Mnemonic::Pshx => Some(Mnemonic::Pulx),
                _ => None,
            };
            if let Some(expected_pull) = pair {
                if let Some(Statement::Instruction { mnemonic: m2, .. }) = statements.get(i + 1) {
                    if *m2 == expected_pull {
                        stats.push_pull_pairs_removed += 1;
                        i += 2;
                        continue;
                    }
                }
            }
        }

        // Transformation 4: consecutive TSX, keep only the last.
        if let Statement::Instruction { mnemonic: Mnemonic::Tsx, .. } = &statements[i] {
            if let Some(Statement::Instruction { mnemonic: Mnemonic::Tsx, .. }) = statements.get(i + 1) {
                stats.redundant_tsx += 1;
                i += 1;
                continue;
            }
        }

        // Transformation 5: unreachable code between an unconditional
        // branch/jump and the next label.
        if let Statement::Instruction { mnemonic, .. } = &statements[i] {
            if matches!(mnemonic, Mnemonic::Bra | Mnemonic::Jmp | Mnemonic::Rts | Mnemonic::Rti) {
                out.push(statements[i].clone());
                let mut j = i + 1;
                while j < statements.len() && !is_label(&statements[j]) && !matches!(statements[j], Statement::Directive { .. }) {
                    stats.unreachable_removed += 1;
                    j += 1;
                }
                i = j;
                continue;
            }
        }

        out.push(statements[i].clone());
        i += 1;
    }

    (out, stats)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::assembler::parser::{preprocess, Parser};
    use std::collections::HashMap;

    struct NoIncludes;
    impl crate::assembler::parser::IncludeResolver for NoIncludes {
        fn resolve(&self, _path: &str) -> Option<String> {
            None
        }
    }

    fn parse(src: &str) -> Vec<Statement> {
        let expanded = preprocess(src, "t.asm", &NoIncludes).unwrap();
        Parser::new(&expanded, "t.asm").unwrap().parse_program(&HashMap::new()).unwrap()
    }

    #[test]
    fn cmpa_zero_becomes_tsta() {
        let stmts = parse("LDAA #0\nCMPA #0\nBEQ end\nend: RTS\n");
        let (opt, stats) = optimize(stmts);
        assert_eq!(stats.cmp_to_tst, 1);
        assert!(opt.iter().any(|s| matches!(s, Statement::Instruction { mnemonic: Mnemonic::Tsta, .. })));
    }

    #[test]
    fn cmpa_zero_kept_before_carry_branch() {
        let stmts = parse("CMPA #0\nBCC ok\nok: RTS\n");
        let (_, stats) = optimize(stmts);
        assert_eq!(stats.cmp_to_tst, 0);
    }

    #[test]
    fn redundant_push_pull_pair_is_deleted() {
        let stmts = parse("PSHA\nPULA\nRTS\n");
        let (opt, stats) = optimize(stmts);
        assert_eq!(stats.push_pull_pairs_removed, 1);
        assert_eq!(opt.len(), 1);
    }

    #[test]
    fn consecutive_tsx_keeps_only_last() {
        let stmts = parse("TSX\nTSX\nRTS\n");
        let (opt, stats) = optimize(stmts);
        assert_eq!(stats.redundant_tsx, 1);
        assert_eq!(opt.iter().filter(|s| matches!(s, Statement::Instruction { mnemonic: Mnemonic::Tsx, .. })).count(), 1);
    }

    #[test]
    fn unreachable_code_after_bra_is_removed() {
        let stmts = parse("BRA skip\nNOP\nNOP\nskip: RTS\n");
        let (opt, stats) = optimize(stmts);
        assert_eq!(stats.unreachable_removed, 2);
        assert!(!opt.iter().any(|s| matches!(s, Statement::Instruction { mnemonic: Mnemonic::Nop, .. })));
    }

    #[test]
    fn optimizer_never_crosses_a_label() {
        let stmts = parse("BRA skip\nlbl: NOP\nskip: RTS\n");
        let (opt, _) = optimize(stmts);
        assert!(opt.iter().any(|s| matches!(s, Statement::Instruction { mnemonic: Mnemonic::Nop, .. })));
    }
}
