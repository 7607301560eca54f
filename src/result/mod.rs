//! Result sinks
//!
//! A [`StreamResult`] receives the decoded events of one run, bracketed by
//! `start_test_run` and `stop_test_run`, and reports whether the run was
//! successful. Renderers are created by a [`ResultFactory`] bound to the
//! output destination.

mod csv;
mod json;
pub mod summary;

use async_trait::async_trait;
use serde::Deserialize;

use crate::common::Result;
use crate::filter::SharedOutput;
use crate::protocol::StatusEvent;

pub use csv::CsvResult;
pub use json::JsonResult;
pub use summary::{CompletedTest, RunSummary};

/// Recipient of the events of a test run
#[async_trait]
pub trait StreamResult: Send {
    /// Called once before any event
    async fn start_test_run(&mut self) -> Result<()>;

    /// Called for every decoded packet, in stream order
    async fn status(&mut self, event: &StatusEvent) -> Result<()>;

    /// Called once after the last event
    async fn stop_test_run(&mut self) -> Result<()>;

    /// Whether the run so far contains no failing test
    fn was_successful(&self) -> bool;
}

/// Creates a result sink writing to the given output
pub type ResultFactory = fn(SharedOutput) -> Box<dyn StreamResult>;

/// Available result renderings
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    /// One CSV row per test
    #[default]
    Csv,
    /// One JSON object per line per test
    Json,
}

impl OutputFormat {
    /// Factory for this format
    pub fn factory(self) -> ResultFactory {
        match self {
            Self::Csv => csv_result,
            Self::Json => json_result,
        }
    }
}

fn csv_result(output: SharedOutput) -> Box<dyn StreamResult> {
    Box::new(CsvResult::new(output))
}

fn json_result(output: SharedOutput) -> Box<dyn StreamResult> {
    Box::new(JsonResult::new(output))
}
