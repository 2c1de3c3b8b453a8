//! Binary entry point for the loader CLI.

use std::process::ExitCode;

fn main() -> ExitCode {
    graph_data_loader::cli::run()
}
