//! # Scoped Sync CLI
//!
//! Binary entry point for the `scoped-sync` command-line tool.
//!
//! It parses arguments with `clap`, runs the selected command, and turns the
//! outcome into a process exit code. Library errors carry their own code
//! (see [`scoped_sync::exit_codes`]); anything else exits with the general
//! error code. clap exits with the usage code on its own.
//!
//! The exit happens only after the command has returned, so every credential
//! scope guard has already been dropped.

mod cli;
mod commands;

use clap::Parser;
use scoped_sync::error::Error;
use scoped_sync::exit_codes;

fn main() {
    let cli = cli::Cli::parse();
    let code = match cli.execute() {
        Ok(()) => exit_codes::SUCCESS,
        Err(err) => {
            eprintln!("Error: {:#}", err);
            exit_code_for(&err)
        }
    };
    std::process::exit(code);
}

fn exit_code_for(err: &anyhow::Error) -> i32 {
    err.downcast_ref::<Error>()
        .map(Error::exit_code)
        .unwrap_or(exit_codes::GENERAL_ERROR)
}
