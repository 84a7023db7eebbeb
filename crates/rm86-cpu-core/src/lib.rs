#![forbid(unsafe_code)]

//! Fetch-decode-execute core for the 16-bit real-mode CPU.
//!
//! The interpreter owns no state of its own: it borrows the register file and
//! the address space from the caller and mutates them in place, one
//! instruction at a time, until a terminal condition ends the run.

pub mod alu;
pub mod console;
pub mod exception;
pub mod exec;
mod interrupts;
pub mod shift;

pub use console::Console;
pub use exception::{CpuException, DivideKind, RunExit};
pub use exec::{Interp, StepExit};
