//! Convenience functions for compiling and running leaven programs

use leaven_core::{RuntimeError, Value};
use leaven_error::CompileError;
use thiserror::Error;

use crate::io::VecOutput;
use crate::vm::Machine;

/// Anything the source-to-execution pipeline can produce.
#[derive(Error, Debug)]
pub enum Error {
    #[error(transparent)]
    Compile(#[from] CompileError),

    #[error(transparent)]
    Runtime(#[from] RuntimeError),
}

/// Result of running a program.
#[derive(Debug)]
pub struct RunResult {
    /// The value left on top of the stack, if any.
    pub stack_top: Option<Value>,
    /// Everything the program printed.
    pub output: Vec<String>,
    /// The number of instructions executed.
    pub steps: usize,
}

/// Compile a source unit (with the prelude) and run it to completion.
pub fn run_source(name: &str, source: &str) -> Result<RunResult, Error> {
    let codes = leaven_compiler::compile(name, source)?;
    let mut machine = Machine::new(codes, VecOutput::new());
    machine.run()?;
    Ok(result(&machine))
}

/// Like [`run_source`], with an instruction budget.
pub fn run_source_with_max_steps(
    name: &str,
    source: &str,
    max_steps: usize,
) -> Result<RunResult, Error> {
    let codes = leaven_compiler::compile(name, source)?;
    let mut machine = Machine::new(codes, VecOutput::new());
    machine.run_with_max_steps(max_steps)?;
    Ok(result(&machine))
}

fn result(machine: &Machine<VecOutput>) -> RunResult {
    RunResult {
        stack_top: machine.stack_top().cloned(),
        output: machine.output.lines.clone(),
        steps: machine.steps(),
    }
}
