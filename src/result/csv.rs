//! CSV rendering of test results
//!
//! One header row, then one row per completed test:
//! ```text
//! test,status,start_time,stop_time
//! pkg.test_a,success,2013-01-01T00:00:00Z,2013-01-01T00:00:01Z
//! ```

use async_trait::async_trait;
use tokio::io::{AsyncWrite, AsyncWriteExt};

use super::summary::{format_timestamp, CompletedTest, RunSummary};
use super::StreamResult;
use crate::common::Result;
use crate::protocol::StatusEvent;

const HEADER: [&str; 4] = ["test", "status", "start_time", "stop_time"];

/// Writes a CSV row for every test that reaches a final status
pub struct CsvResult<W> {
    writer: W,
    summary: RunSummary,
}

impl<W: AsyncWrite + Unpin + Send> CsvResult<W> {
    pub fn new(writer: W) -> Self {
        Self {
            writer,
            summary: RunSummary::default(),
        }
    }

    pub fn into_inner(self) -> W {
        self.writer
    }

    async fn write_row(&mut self, fields: &[&str]) -> Result<()> {
        let mut line = fields
            .iter()
            .map(|field| escape_field(field))
            .collect::<Vec<_>>()
            .join(",");
        line.push('\n');
        self.writer.write_all(line.as_bytes()).await?;
        self.writer.flush().await?;
        Ok(())
    }

    async fn write_test(&mut self, test: &CompletedTest) -> Result<()> {
        let start = format_timestamp(test.start_time.as_ref()).unwrap_or_default();
        let stop = format_timestamp(test.stop_time.as_ref()).unwrap_or_default();
        self.write_row(&[
            test.test_id.as_str(),
            test.status.as_str(),
            start.as_str(),
            stop.as_str(),
        ])
        .await
    }
}

#[async_trait]
impl<W: AsyncWrite + Unpin + Send> StreamResult for CsvResult<W> {
    async fn start_test_run(&mut self) -> Result<()> {
        self.write_row(&HEADER).await
    }

    async fn status(&mut self, event: &StatusEvent) -> Result<()> {
        if let Some(test) = self.summary.record(event) {
            self.write_test(&test).await?;
        }
        Ok(())
    }

    async fn stop_test_run(&mut self) -> Result<()> {
        tracing::debug!(tests = self.summary.tests_run(), "CSV result complete");
        self.writer.flush().await?;
        Ok(())
    }

    fn was_successful(&self) -> bool {
        self.summary.was_successful()
    }
}

/// Quote a field if it contains a delimiter, quote or line break
fn escape_field(field: &str) -> String {
    if field.contains([',', '"', '\r', '\n']) {
        format!("\"{}\"", field.replace('"', "\"\""))
    } else {
        field.to_string()
    }
}
