use regex::Regex;
use thiserror::Error;

use crate::instructions::{Instruction, Op};
use crate::REGISTER_COUNT;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("line {line}: {reason}")]
pub struct ParseError {
    pub line: usize,
    pub reason: String,
}
impl ParseError {
    fn new(line: usize, reason: impl Into<String>) -> Self {
        Self {
            line,
            reason: reason.into(),
        }
    }
}

/// Parses MIPS-like program text into an ordered instruction list.
///
/// Whitespace and commas separate tokens, `#` starts a line comment and
/// blank lines are skipped. Register tokens `R0..R31` and `F0..F31` share a
/// single 32-entry namespace.
pub fn parse_program(text: &str) -> Result<Vec<Instruction>, ParseError> {
    let mem_operand = Regex::new(r"^(-?\d+)\(([A-Za-z]\d+)\)$").unwrap();
    let mut instructions = Vec::new();

    for (line_idx, raw) in text.lines().enumerate() {
        let line_no = line_idx + 1;
        let source = raw.split('#').next().unwrap_or("").trim();
        if source.is_empty() {
            continue;
        }

        let upper = source.to_uppercase();
        let tokens: Vec<&str> = upper
            .split(|c: char| c == ',' || c.is_whitespace())
            .filter(|t| !t.is_empty())
            .collect();

        let op = match tokens[0] {
            "ADD" => Op::Add,
            "SUB" => Op::Subtract,
            "MUL" => Op::Multiply,
            "DIV" => Op::Divide,
            "LW" => Op::LoadMemory,
            "SW" => Op::StoreMemory,
            "BEQ" => Op::BranchEqual,
            other => {
                return Err(ParseError::new(line_no, format!("unknown opcode '{other}'")));
            }
        };

        let index = instructions.len();
        let instruction = match op {
            Op::Add | Op::Subtract | Op::Multiply | Op::Divide => {
                expect_operands(line_no, op, &tokens, 3)?;
                Instruction {
                    index,
                    op,
                    dest: Some(parse_register(line_no, tokens[1])?),
                    src1: Some(parse_register(line_no, tokens[2])?),
                    src2: Some(parse_register(line_no, tokens[3])?),
                    immediate: None,
                    text: source.to_string(),
                }
            }
            Op::LoadMemory | Op::StoreMemory => {
                expect_operands(line_no, op, &tokens, 2)?;
                let reg = parse_register(line_no, tokens[1])?;
                let caps = mem_operand.captures(tokens[2]).ok_or_else(|| {
                    ParseError::new(
                        line_no,
                        format!("expected offset(Rn) memory operand, got '{}'", tokens[2]),
                    )
                })?;
                let offset = parse_immediate(line_no, &caps[1])?;
                let base = parse_register(line_no, &caps[2])?;
                if op == Op::LoadMemory {
                    Instruction {
                        index,
                        op,
                        dest: Some(reg),
                        src1: Some(base),
                        src2: None,
                        immediate: Some(offset),
                        text: source.to_string(),
                    }
                } else {
                    // the store reads its data from the first register token
                    Instruction {
                        index,
                        op,
                        dest: None,
                        src1: Some(base),
                        src2: Some(reg),
                        immediate: Some(offset),
                        text: source.to_string(),
                    }
                }
            }
            Op::BranchEqual => {
                expect_operands(line_no, op, &tokens, 3)?;
                let target = parse_immediate(line_no, tokens[3])?;
                if target < 0 {
                    return Err(ParseError::new(
                        line_no,
                        format!("branch target must not be negative, got {target}"),
                    ));
                }
                Instruction {
                    index,
                    op,
                    dest: None,
                    src1: Some(parse_register(line_no, tokens[1])?),
                    src2: Some(parse_register(line_no, tokens[2])?),
                    immediate: Some(target),
                    text: source.to_string(),
                }
            }
        };

        instructions.push(instruction);
    }

    Ok(instructions)
}

fn expect_operands(line: usize, op: Op, tokens: &[&str], count: usize) -> Result<(), ParseError> {
    if tokens.len() != count + 1 {
        return Err(ParseError::new(
            line,
            format!(
                "{} takes {} operands, got {}",
                op.mnemonic(),
                count,
                tokens.len() - 1
            ),
        ));
    }
    Ok(())
}

fn parse_register(line: usize, token: &str) -> Result<usize, ParseError> {
    let mut chars = token.chars();
    let prefix = chars.next();
    if prefix != Some('R') && prefix != Some('F') {
        return Err(ParseError::new(line, format!("invalid register '{token}'")));
    }

    let number: usize = chars
        .as_str()
        .parse()
        .map_err(|_| ParseError::new(line, format!("invalid register '{token}'")))?;
    if number >= REGISTER_COUNT {
        return Err(ParseError::new(
            line,
            format!("register '{token}' is out of range"),
        ));
    }

    Ok(number)
}

fn parse_immediate(line: usize, token: &str) -> Result<i32, ParseError> {
    token
        .parse()
        .map_err(|_| ParseError::new(line, format!("invalid immediate '{token}'")))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_arithmetic_forms() {
        let program = parse_program("ADD R1, R2, R3\nsub r4 r5 r6").unwrap();
        assert_eq!(program.len(), 2);
        assert_eq!(program[0].op, Op::Add);
        assert_eq!(program[0].dest, Some(1));
        assert_eq!(program[0].src1, Some(2));
        assert_eq!(program[0].src2, Some(3));
        assert_eq!(program[1].op, Op::Subtract);
        assert_eq!(program[1].index, 1);
    }

    #[test]
    fn parses_memory_forms() {
        let program = parse_program("LW R1, 8(R2)\nSW R3, -4(R4)").unwrap();
        let lw = &program[0];
        assert_eq!(lw.op, Op::LoadMemory);
        assert_eq!(lw.dest, Some(1));
        assert_eq!(lw.src1, Some(2));
        assert_eq!(lw.immediate, Some(8));

        let sw = &program[1];
        assert_eq!(sw.op, Op::StoreMemory);
        assert_eq!(sw.dest, None);
        assert_eq!(sw.src1, Some(4));
        assert_eq!(sw.src2, Some(3));
        assert_eq!(sw.immediate, Some(-4));
    }

    #[test]
    fn parses_branches() {
        let program = parse_program("BEQ R1, R2, 12").unwrap();
        assert_eq!(program[0].op, Op::BranchEqual);
        assert_eq!(program[0].src1, Some(1));
        assert_eq!(program[0].src2, Some(2));
        assert_eq!(program[0].immediate, Some(12));
    }

    #[test]
    fn float_registers_share_the_namespace() {
        let program = parse_program("ADD F1, F2, R3").unwrap();
        assert_eq!(program[0].dest, Some(1));
        assert_eq!(program[0].src1, Some(2));
    }

    #[test]
    fn skips_comments_and_blank_lines() {
        let program = parse_program("# header\n\nADD R1, R0, R0 # trailing\n\n").unwrap();
        assert_eq!(program.len(), 1);
        assert_eq!(program[0].text, "ADD R1, R0, R0");
    }

    #[test]
    fn rejects_bad_input() {
        assert!(parse_program("NOPE R1, R2, R3").is_err());
        assert!(parse_program("ADD R1, R2").is_err());
        assert!(parse_program("ADD R1, R2, R99").is_err());
        assert!(parse_program("ADD X1, R2, R3").is_err());
        assert!(parse_program("LW R1, R2").is_err());
        assert!(parse_program("BEQ R1, R2, -8").is_err());
    }

    #[test]
    fn reports_the_failing_line() {
        let err = parse_program("ADD R1, R0, R0\nBAD").unwrap_err();
        assert_eq!(err.line, 2);
    }
}
