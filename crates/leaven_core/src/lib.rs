//! Core data structures for the leaven virtual machine
//!
//! This crate defines the shared vocabulary of the compiler and the VM:
//! the instruction set, immediate operands, runtime values, the register
//! file, and the runtime error type.

pub mod error;
pub mod instruction;
pub mod operand;
pub mod register;
pub mod value;

pub use crate::error::RuntimeError;
pub use crate::instruction::{Code, Instr};
pub use crate::operand::Operand;
pub use crate::register::{Register, RegisterFile};
pub use crate::value::{StrId, Value, ValueKind};
