use std::fmt;
use thiserror::Error;

/// The two distinguishable division faults.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DivideKind {
    Zero,
    /// The quotient does not fit the destination register.
    Overflow,
}

impl fmt::Display for DivideKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DivideKind::Zero => write!(f, "division by zero"),
            DivideKind::Overflow => write!(f, "quotient overflow"),
        }
    }
}

/// Faults raised by instruction execution. Each one terminates the run; the
/// faulting instruction leaves its destination unmodified.
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum CpuException {
    #[error("invalid opcode {opcode:#04x}")]
    InvalidOpcode { opcode: u8 },
    /// A recognized opcode reached an explicitly unsupported sub-form.
    #[error("invalid instruction {opcode:#04x} /{selector}")]
    InvalidInstruction { opcode: u8, selector: u8 },
    #[error("divide error: {kind}")]
    Divide { kind: DivideKind },
}

/// Mutually exclusive terminal outcomes of [`crate::Interp::run`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunExit {
    Halted,
    InvalidOpcode,
    InvalidInstruction,
    DebugTrap,
    DivideError,
}

impl fmt::Display for RunExit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RunExit::Halted => write!(f, "halted"),
            RunExit::InvalidOpcode => write!(f, "invalid opcode"),
            RunExit::InvalidInstruction => write!(f, "invalid instruction"),
            RunExit::DebugTrap => write!(f, "debug trap"),
            RunExit::DivideError => write!(f, "divide error"),
        }
    }
}

impl From<CpuException> for RunExit {
    fn from(e: CpuException) -> Self {
        match e {
            CpuException::InvalidOpcode { .. } => RunExit::InvalidOpcode,
            CpuException::InvalidInstruction { .. } => RunExit::InvalidInstruction,
            CpuException::Divide { .. } => RunExit::DivideError,
        }
    }
}
