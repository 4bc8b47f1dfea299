//! Machine registers

use std::fmt;

use crate::value::Value;

/// The six machine registers.
///
/// `pc` and `esp` are views over machine state rather than stored cells:
/// reading `pc` yields the current instruction index and reading `esp`
/// yields the logical stack length. Writing `esp` resizes the stack.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Register {
    /// Program counter.
    Pc,
    /// Stack pointer (logical stack length).
    Esp,
    /// Base pointer of the current frame.
    Ebp,
    /// Link register.
    Lr,
    /// Jump target used by `call0`.
    Jm,
    /// Return-value / scratch register.
    Rt,
}

impl Register {
    pub fn name(&self) -> &'static str {
        match self {
            Self::Pc => "pc",
            Self::Esp => "esp",
            Self::Ebp => "ebp",
            Self::Lr => "lr",
            Self::Jm => "jm",
            Self::Rt => "rt",
        }
    }

    /// Parse an embedded-assembly register name.
    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "pc" => Some(Self::Pc),
            "esp" => Some(Self::Esp),
            "ebp" => Some(Self::Ebp),
            "lr" => Some(Self::Lr),
            "jm" => Some(Self::Jm),
            "rt" => Some(Self::Rt),
            _ => None,
        }
    }
}

impl fmt::Display for Register {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name())
    }
}

/// A snapshot of every register, taken when a runtime error is raised.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RegisterFile {
    pub pc: usize,
    pub esp: usize,
    pub ebp: Value,
    pub lr: Value,
    pub jm: Value,
    pub rt: Value,
}

impl Default for RegisterFile {
    fn default() -> Self {
        Self {
            pc: 0,
            esp: 0,
            ebp: Value::I32(0),
            lr: Value::I32(0),
            jm: Value::I32(0),
            rt: Value::I32(0),
        }
    }
}

impl fmt::Display for RegisterFile {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "pc={} esp={} ebp={} lr={} jm={} rt={}",
            self.pc, self.esp, self.ebp, self.lr, self.jm, self.rt
        )
    }
}
