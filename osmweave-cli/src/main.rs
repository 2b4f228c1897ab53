//! Entry point for the command-line interface.
#![forbid(unsafe_code)]

use std::error::Error;
use std::process::ExitCode;

use osmweave_cli::CliError;

fn main() -> ExitCode {
    match osmweave_cli::run() {
        Ok(()) => ExitCode::SUCCESS,
        Err(CliError::ArgumentParsing(err)) => err.exit(),
        Err(err) => {
            eprintln!("osmweave: {err}");
            let mut cause = err.source();
            while let Some(inner) = cause {
                eprintln!("  caused by: {inner}");
                cause = inner.source();
            }
            ExitCode::FAILURE
        }
    }
}
