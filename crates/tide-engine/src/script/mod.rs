//! Register-based script functions
//!
//! This is the contract between the engine and a code generator: a
//! [`Proto`] holds a verified instruction list over a fixed register file,
//! and [`ScriptFunction`] runs it against a window of the shared register
//! stack. Suspension can happen at three kinds of instruction:
//! - `Call`, when the callee suspends,
//! - `GetField`, when an `__index` handler suspends,
//! - `Tick`, when the preemption budget is spent.
//!
//! In every case the function resolves the signal with a [`ScriptState`]
//! holding the program counter of the next instruction and the pending
//! operation whose result must be collected on resumption.

mod accounting;
mod interp;
mod verify;

pub use accounting::instrument;
pub use interp::{ScriptFunction, ScriptState};
pub use verify::VerifyError;

use crate::preempt::OpCategory;
use crate::value::Value;

/// Register operand
pub type Reg = u16;

/// Arithmetic operators
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArithOp {
    /// `+`
    Add,
    /// `-`
    Sub,
    /// `*`
    Mul,
    /// `/`, always a float result
    Div,
    /// `%`, floored
    Mod,
}

/// Comparison operators
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompareOp {
    /// `==`
    Eq,
    /// `<`
    Lt,
    /// `<=`
    Le,
}

/// Register machine instruction.
///
/// Operands are described in each variant's doc.
#[allow(missing_docs)]
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Instr {
    /// `R(dst) = K(index)`
    LoadConst { dst: Reg, index: u32 },
    /// `R(dst) = nil`
    LoadNil { dst: Reg },
    /// `R(dst) = R(src)`
    Move { dst: Reg, src: Reg },
    /// `R(dst) = R(lhs) op R(rhs)`
    Arith { op: ArithOp, dst: Reg, lhs: Reg, rhs: Reg },
    /// `R(dst) = R(lhs) op R(rhs)` as a boolean
    Compare { op: CompareOp, dst: Reg, lhs: Reg, rhs: Reg },
    /// `R(dst) = R(lhs) .. R(rhs)`
    Concat { dst: Reg, lhs: Reg, rhs: Reg },
    /// `pc = target`
    Jump { target: u32 },
    /// `if not R(cond) then pc = target`
    JumpIfNot { cond: Reg, target: u32 },
    /// `R(dst) = R(table)[K(key)]`, honouring `__index`
    GetField { dst: Reg, table: Reg, key: u32 },
    /// `R(base), .., R(base+nresults-1) = R(base)(R(base+1), .., R(base+nargs))`.
    ///
    /// The callee runs in the window starting at `R(base+1)`, so the
    /// arguments are not copied. Registers above the arguments do not
    /// survive the call.
    Call { base: Reg, nargs: u16, nresults: u16 },
    /// Return `R(first), .., R(first+count-1)`
    Return { first: Reg, count: u16 },
    /// Debit the preemption budget
    Charge { cost: u32 },
    /// Suspend if the preemption budget is spent
    Tick,
}

impl Instr {
    /// Cost category; `None` for the accounting instructions themselves
    pub fn category(&self) -> Option<OpCategory> {
        Some(match self {
            Instr::LoadConst { .. } | Instr::LoadNil { .. } => OpCategory::Load,
            Instr::Move { .. } => OpCategory::Move,
            Instr::Arith { .. } => OpCategory::Arith,
            Instr::Compare { .. } => OpCategory::Compare,
            Instr::Concat { .. } => OpCategory::Concat,
            Instr::Jump { .. } | Instr::JumpIfNot { .. } => OpCategory::Jump,
            Instr::GetField { .. } => OpCategory::Index,
            Instr::Call { .. } => OpCategory::Call,
            Instr::Return { .. } => OpCategory::Return,
            Instr::Charge { .. } | Instr::Tick => return None,
        })
    }

    /// Check for an accounting instruction
    pub fn is_accounting(&self) -> bool {
        matches!(self, Instr::Charge { .. } | Instr::Tick)
    }

    /// Branch target, if this is a branch
    pub fn jump_target(&self) -> Option<usize> {
        match self {
            Instr::Jump { target } | Instr::JumpIfNot { target, .. } => Some(*target as usize),
            _ => None,
        }
    }

    pub(crate) fn set_jump_target(&mut self, to: usize) {
        if let Instr::Jump { target } | Instr::JumpIfNot { target, .. } = self {
            *target = to as u32;
        }
    }
}

/// Compiled function prototype
#[derive(Debug, Clone)]
pub struct Proto {
    name: String,
    params: u16,
    max_regs: u16,
    constants: Vec<Value>,
    code: Vec<Instr>,
}

impl Proto {
    /// Build and verify a prototype
    pub fn new(
        name: impl Into<String>,
        params: u16,
        max_regs: u16,
        constants: Vec<Value>,
        code: Vec<Instr>,
    ) -> Result<Self, VerifyError> {
        let proto = Self {
            name: name.into(),
            params,
            max_regs,
            constants,
            code,
        };
        verify::verify(&proto)?;
        Ok(proto)
    }

    /// Function name
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Declared parameter count
    pub fn params(&self) -> u16 {
        self.params
    }

    /// Size of the register file
    pub fn max_regs(&self) -> u16 {
        self.max_regs
    }

    /// Constant pool
    pub fn constants(&self) -> &[Value] {
        &self.constants
    }

    /// Instruction list
    pub fn code(&self) -> &[Instr] {
        &self.code
    }

    /// Re-verify after replacing the code with an instrumented version
    pub fn with_code(&self, code: Vec<Instr>) -> Result<Self, VerifyError> {
        Self::new(
            self.name.clone(),
            self.params,
            self.max_regs,
            self.constants.clone(),
            code,
        )
    }
}
