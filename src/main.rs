//! canonseal CLI entry point.
//!
//! Thin shell around the library: parse arguments, run the requested
//! command, and translate a chain failure into the `FAIL:` diagnostic plus a
//! non-zero exit code that CI jobs key off.

#![warn(clippy::all, rust_2018_idioms)]

mod cli;

use clap::Parser as _;

fn main() {
    if let Err(e) = canonseal::logging::init() {
        eprintln!("FAIL: {e}");
        std::process::exit(1);
    }

    let args = cli::Cli::parse();
    if let Err(e) = cli::run_command(args.command) {
        eprintln!("FAIL: {e}");
        std::process::exit(cli::exit_code(&e));
    }
}
