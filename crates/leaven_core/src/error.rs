//! Runtime error type for the leaven virtual machine

use std::fmt::Write as _;

use miette::Diagnostic;
use thiserror::Error;

use crate::instruction::{Code, Instr};
use crate::register::RegisterFile;

/// How many opcodes around the faulting one the backtrace shows.
const BACKTRACE_WINDOW: usize = 3;

/// An error raised while the machine is executing.
///
/// Carries the faulting instruction, the full code vector, and a
/// register snapshot so the reporter can show a window of surrounding
/// opcodes instead of a source excerpt.
#[derive(Debug, Diagnostic, Error)]
#[error("{message}")]
#[diagnostic(code(leaven::runtime_error))]
pub struct RuntimeError {
    pub message: String,
    pub instr: Option<Instr>,
    pub codes: Vec<Code>,
    pub registers: RegisterFile,
}

impl RuntimeError {
    pub fn new(
        message: impl Into<String>,
        instr: Option<Instr>,
        codes: Vec<Code>,
        registers: RegisterFile,
    ) -> Self {
        Self { message: message.into(), instr, codes, registers }
    }

    /// Render the opcodes surrounding the faulting one, the faulting
    /// line marked with `>`, followed by the register snapshot.
    pub fn backtrace(&self) -> String {
        let pc = self.registers.pc;
        let lo = pc.saturating_sub(BACKTRACE_WINDOW);
        let hi = (pc + BACKTRACE_WINDOW + 1).min(self.codes.len());

        let mut out = String::new();
        for (index, code) in self.codes.iter().enumerate().take(hi).skip(lo) {
            let marker = if index == pc { '>' } else { ' ' };
            let _ = writeln!(out, "{marker} {index:>4}  {code}");
        }
        let _ = writeln!(out, "  registers: {}", self.registers);
        out
    }
}
