use serde::Serialize;

use crate::reorder_buffer::RobKind;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Op {
    Add,
    Subtract,
    Multiply,
    Divide,
    LoadMemory,
    StoreMemory,
    BranchEqual,
}
impl Op {
    pub fn mnemonic(&self) -> &'static str {
        match self {
            Op::Add => "ADD",
            Op::Subtract => "SUB",
            Op::Multiply => "MUL",
            Op::Divide => "DIV",
            Op::LoadMemory => "LW",
            Op::StoreMemory => "SW",
            Op::BranchEqual => "BEQ",
        }
    }

    pub fn is_memory(&self) -> bool {
        match self {
            Op::LoadMemory | Op::StoreMemory => true,
            _ => false,
        }
    }

    pub fn is_branch(&self) -> bool {
        *self == Op::BranchEqual
    }

    pub fn rob_kind(&self) -> RobKind {
        match self {
            Op::Add | Op::Subtract | Op::Multiply | Op::Divide | Op::LoadMemory => {
                RobKind::Register
            }
            Op::StoreMemory => RobKind::Store,
            Op::BranchEqual => RobKind::Branch,
        }
    }

    pub fn updates_rat(&self) -> bool {
        match self.rob_kind() {
            RobKind::Register => true,
            RobKind::Store | RobKind::Branch => false,
        }
    }

    pub fn latency(&self) -> usize {
        match self {
            Op::Add => 2,
            Op::Subtract => 2,
            Op::Multiply => 4,
            Op::Divide => 6,
            Op::LoadMemory => 3,
            Op::StoreMemory => 2,
            Op::BranchEqual => 1,
        }
    }

    /// Arithmetic result for the ALU-class ops. Division by zero is masked
    /// to 0 rather than faulting.
    pub fn evaluate(&self, left: i32, right: i32) -> i32 {
        match self {
            Op::Add => left.wrapping_add(right),
            Op::Subtract => left.wrapping_sub(right),
            Op::Multiply => left.wrapping_mul(right),
            Op::Divide => left.checked_div(right).unwrap_or(0),
            _ => left,
        }
    }
}

/// Immutable decoded form of one source line.
///
/// Operand roles depend on the op: arithmetic uses `dest`/`src1`/`src2`,
/// LW puts the base register in `src1` and the byte offset in `immediate`,
/// SW additionally carries its data register in `src2`, and BEQ compares
/// `src1` with `src2` and keeps the encoded target in `immediate`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Instruction {
    pub index: usize,
    pub op: Op,
    pub dest: Option<usize>,
    pub src1: Option<usize>,
    pub src2: Option<usize>,
    pub immediate: Option<i32>,
    pub text: String,
}
