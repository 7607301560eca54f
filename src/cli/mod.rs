//! Command line handling for `subunit2csv`
//!
//! Merges flags with the configuration file and runs the filter.

use clap::Parser;
use std::path::PathBuf;
use tokio::io::{AsyncBufRead, BufReader};

use crate::common::config::Config;
use crate::common::{Error, Result};
use crate::filter::{filter_by_result, ExitStatus, FilterOptions};
use crate::result::OutputFormat;

/// Exit code for errors that prevented a complete run
pub const FATAL_EXIT_CODE: u8 = 2;

#[derive(Parser, Debug)]
#[command(name = "subunit2csv", about = "Convert a subunit stream into test results")]
#[command(version, long_about = None)]
pub struct FilterArgs {
    /// Hide all non subunit input
    #[arg(long)]
    pub no_passthrough: bool,

    /// Output the results to this path rather than stdout
    #[arg(short, long, value_name = "PATH")]
    pub output_to: Option<PathBuf>,

    /// Also copy raw subunit packets to standard output
    #[arg(short, long)]
    pub forward: bool,

    /// Result format (default: from config, else csv)
    #[arg(long, value_enum)]
    pub format: Option<OutputFormat>,

    /// Configuration file to use instead of the default location
    #[arg(long, value_name = "PATH")]
    pub config: Option<PathBuf>,

    /// Read the subunit stream from this file rather than stdin
    pub input: Option<PathBuf>,
}

impl FilterArgs {
    /// Combine flags with configuration; a set flag always wins
    pub fn resolve(&self, config: &Config) -> (FilterOptions, OutputFormat) {
        let options = FilterOptions {
            output_path: self.output_to.clone(),
            no_passthrough: self.no_passthrough || config.filter.no_passthrough,
            forward: self.forward || config.filter.forward,
        };
        let format = self.format.unwrap_or(config.output.format);
        (options, format)
    }

    fn load_config(&self) -> Result<Config> {
        match &self.config {
            Some(path) => Config::load_from(path),
            None => Config::load(),
        }
    }
}

/// Run the filter described by `args`
pub async fn run(args: FilterArgs) -> Result<ExitStatus> {
    let config = args.load_config()?;
    let (options, format) = args.resolve(&config);
    tracing::debug!(?options, ?format, "Resolved filter options");

    let mut input: Box<dyn AsyncBufRead + Unpin + Send> = match &args.input {
        Some(path) => {
            let file = tokio::fs::File::open(path).await.map_err(|e| Error::FileRead {
                path: path.display().to_string(),
                error: e.to_string(),
            })?;
            Box::new(BufReader::new(file))
        }
        None => Box::new(BufReader::new(tokio::io::stdin())),
    };

    filter_by_result(format.factory(), options, &mut input).await
}
