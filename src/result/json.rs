//! JSON lines rendering of test results
//!
//! Each completed test becomes one object on its own line.

use async_trait::async_trait;
use serde::Serialize;
use tokio::io::{AsyncWrite, AsyncWriteExt};

use super::summary::{format_timestamp, CompletedTest, RunSummary};
use super::StreamResult;
use crate::common::Result;
use crate::protocol::{StatusEvent, TestStatus};

/// Serialized form of a completed test
#[derive(Debug, Serialize)]
struct TestRecord<'a> {
    test: &'a str,
    status: TestStatus,
    start_time: Option<String>,
    stop_time: Option<String>,
    tags: Vec<&'a str>,
}

impl<'a> From<&'a CompletedTest> for TestRecord<'a> {
    fn from(test: &'a CompletedTest) -> Self {
        Self {
            test: &test.test_id,
            status: test.status,
            start_time: format_timestamp(test.start_time.as_ref()),
            stop_time: format_timestamp(test.stop_time.as_ref()),
            tags: test.tags.iter().map(String::as_str).collect(),
        }
    }
}

/// Writes a JSON object for every test that reaches a final status
pub struct JsonResult<W> {
    writer: W,
    summary: RunSummary,
}

impl<W: AsyncWrite + Unpin + Send> JsonResult<W> {
    pub fn new(writer: W) -> Self {
        Self {
            writer,
            summary: RunSummary::default(),
        }
    }

    pub fn into_inner(self) -> W {
        self.writer
    }
}

#[async_trait]
impl<W: AsyncWrite + Unpin + Send> StreamResult for JsonResult<W> {
    async fn start_test_run(&mut self) -> Result<()> {
        Ok(())
    }

    async fn status(&mut self, event: &StatusEvent) -> Result<()> {
        if let Some(test) = self.summary.record(event) {
            let mut line = serde_json::to_vec(&TestRecord::from(&test))?;
            line.push(b'\n');
            self.writer.write_all(&line).await?;
            self.writer.flush().await?;
        }
        Ok(())
    }

    async fn stop_test_run(&mut self) -> Result<()> {
        tracing::debug!(tests = self.summary.tests_run(), "JSON result complete");
        self.writer.flush().await?;
        Ok(())
    }

    fn was_successful(&self) -> bool {
        self.summary.was_successful()
    }
}
