//! subunit2csv - Convert a subunit stream into test results
//!
//! Exits 0 when every test passed, 1 when any test failed, and 2 when the
//! stream could not be processed.

use std::process::ExitCode;

use clap::Parser;
use subunit_filter::cli::{self, FilterArgs, FATAL_EXIT_CODE};
use subunit_filter::common::logging;

#[tokio::main(flavor = "current_thread")]
async fn main() -> ExitCode {
    logging::init_cli();

    let args = FilterArgs::parse();

    match cli::run(args).await {
        Ok(status) => status.into(),
        Err(e) => {
            eprintln!("Error: {e}");
            ExitCode::from(FATAL_EXIT_CODE)
        }
    }
}
