#![forbid(unsafe_code)]

pub mod flags;
pub mod state;

pub use flags::Flags;
pub use state::{CpuState, Gpr, Prefixes, SegReg};
