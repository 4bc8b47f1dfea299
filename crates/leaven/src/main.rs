//! The leaven command-line interface.

use std::process::ExitCode;

use clap::Parser;

use crate::cli::{Cli, Command};

mod cli;
mod run;
mod trace;

fn main() -> ExitCode {
    let cli = Cli::parse();
    trace::init(&cli.global);

    let result = match cli.command {
        Command::Run { program, max_steps } => run::run(&program, max_steps),
        Command::Check { program, emit } => run::check(&program, emit),
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(report) => {
            eprintln!("{report:?}");
            ExitCode::FAILURE
        }
    }
}
