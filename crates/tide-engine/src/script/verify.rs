//! Prototype verification

use super::{Instr, Proto, Reg};

/// Prototype verification errors
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum VerifyError {
    /// More parameters than registers
    #[error("Function '{function}' declares {params} parameters but only {max_regs} registers")]
    TooManyParams {
        /// Name of the prototype
        function: String,
        /// Declared parameter count
        params: u16,
        /// Size of the register file
        max_regs: u16,
    },

    /// Register operand outside the register file
    #[error("Invalid register {register} (max {max}) at offset {offset}")]
    InvalidRegister {
        /// The offending register, or the end of a register range
        register: usize,
        /// Size of the register file
        max: usize,
        /// Instruction offset
        offset: usize,
    },

    /// Branch to a non-existent instruction
    #[error("Invalid jump target {target} at offset {offset}")]
    InvalidJumpTarget {
        /// The branch target
        target: usize,
        /// Instruction offset
        offset: usize,
    },

    /// Constant pool index out of range
    #[error("Invalid constant pool reference: index {index} at offset {offset}")]
    InvalidConstantRef {
        /// The constant index
        index: usize,
        /// Instruction offset
        offset: usize,
    },
}

/// Verify register operands, constant references and branch targets
pub(super) fn verify(proto: &Proto) -> Result<(), VerifyError> {
    if proto.params > proto.max_regs {
        return Err(VerifyError::TooManyParams {
            function: proto.name.clone(),
            params: proto.params,
            max_regs: proto.max_regs,
        });
    }

    let max = usize::from(proto.max_regs);
    let code_len = proto.code.len();

    for (offset, instr) in proto.code.iter().enumerate() {
        // Exclusive end of a register range must not pass max_regs
        let check_end = |end: usize| {
            if end > max {
                Err(VerifyError::InvalidRegister {
                    register: end - 1,
                    max,
                    offset,
                })
            } else {
                Ok(())
            }
        };
        let check = |reg: Reg| check_end(usize::from(reg) + 1);
        let check_const = |index: u32| {
            let index = index as usize;
            if index >= proto.constants.len() {
                Err(VerifyError::InvalidConstantRef { index, offset })
            } else {
                Ok(())
            }
        };

        match *instr {
            Instr::LoadConst { dst, index } => {
                check(dst)?;
                check_const(index)?;
            }
            Instr::LoadNil { dst } => check(dst)?,
            Instr::Move { dst, src } => {
                check(dst)?;
                check(src)?;
            }
            Instr::Arith { dst, lhs, rhs, .. }
            | Instr::Compare { dst, lhs, rhs, .. }
            | Instr::Concat { dst, lhs, rhs } => {
                check(dst)?;
                check(lhs)?;
                check(rhs)?;
            }
            Instr::GetField { dst, table, key } => {
                check(dst)?;
                check(table)?;
                check_const(key)?;
            }
            Instr::Call {
                base,
                nargs,
                nresults,
            } => {
                check(base)?;
                check_end(usize::from(base) + 1 + usize::from(nargs))?;
                check_end(usize::from(base) + usize::from(nresults))?;
            }
            Instr::Return { first, count } => {
                check_end(usize::from(first) + usize::from(count))?;
            }
            Instr::JumpIfNot { cond, .. } => check(cond)?,
            Instr::Jump { .. } | Instr::Charge { .. } | Instr::Tick => {}
        }

        if let Some(target) = instr.jump_target() {
            if target > code_len {
                return Err(VerifyError::InvalidJumpTarget { target, offset });
            }
        }
    }
    Ok(())
}
