//! `reclaim` binary entry point.

mod cli_app;

use clap::Parser;

use crate::cli_app::{Cli, CliError};

fn main() {
    let cli = Cli::parse();
    if let Err(err) = cli_app::run(&cli) {
        if !matches!(err, CliError::Declined) {
            eprintln!("reclaim: {err}");
        }
        std::process::exit(err.exit_code());
    }
}
