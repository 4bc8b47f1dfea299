//! Pipeline driver for the CLI commands

use std::io::Read;
use std::path::Path;

use itertools::Itertools;
use leaven_compiler::{PRELUDE, PRELUDE_NAME, compile};
use leaven_core::Code;
use leaven_error::{Error, to_report};
use leaven_vm::{Machine, StdoutOutput};
use miette::{IntoDiagnostic, Report, WrapErr};
use tracing::info;

/// Load a program from a file path or stdin (`-`).
fn load(program: &str) -> Result<(String, String), Report> {
    if program == "-" {
        let mut source = String::new();
        std::io::stdin()
            .read_to_string(&mut source)
            .into_diagnostic()
            .wrap_err("Failed to read stdin")?;
        return Ok(("<stdin>".to_string(), source));
    }

    let path = Path::new(program);
    if !path.exists() {
        return Err(Report::new(Error::PathNotFound(path.to_path_buf())));
    }
    let source = std::fs::read_to_string(path)
        .into_diagnostic()
        .wrap_err(format!("Failed to read file: {program}"))?;
    Ok((program.to_string(), source))
}

fn compile_program(name: &str, source: &str) -> Result<Vec<Code>, Report> {
    compile(name, source).map_err(|err| {
        let sources = [(PRELUDE_NAME, PRELUDE), (name, source)];
        Report::new(to_report(&err, &sources))
    })
}

/// Compile a program and execute it on the machine, printing program
/// output to stdout.
pub fn run(program: &str, max_steps: Option<usize>) -> Result<(), Report> {
    let (name, source) = load(program)?;
    let codes = compile_program(&name, &source)?;
    info!(codes = codes.len(), "compiled");

    let mut machine = Machine::new(codes, StdoutOutput::new());
    let result = match max_steps {
        Some(max) => machine.run_with_max_steps(max),
        None => machine.run(),
    };

    if let Err(fault) = result {
        eprintln!("{}", fault.backtrace());
        return Err(Report::new(fault));
    }

    info!(steps = machine.steps(), "done");
    Ok(())
}

/// Compile a program without running it; optionally print the listing.
pub fn check(program: &str, emit: bool) -> Result<(), Report> {
    let (name, source) = load(program)?;
    let codes = compile_program(&name, &source)?;
    info!(codes = codes.len(), "compiled");

    if emit {
        let listing = codes
            .iter()
            .map(|code| match code {
                Code::Label(_) => code.to_string(),
                code => format!("  {code}"),
            })
            .join("\n");
        println!("{listing}");
    }

    Ok(())
}
