//! Per-run bookkeeping shared by the result renderers

use chrono::{DateTime, SecondsFormat, Utc};
use std::collections::{BTreeSet, HashMap};

use crate::protocol::{StatusEvent, TestStatus};

/// A test that reached a final status
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompletedTest {
    pub test_id: String,
    pub status: TestStatus,
    /// Timestamp of the last `inprogress` event for the test
    pub start_time: Option<DateTime<Utc>>,
    /// Timestamp of the final event
    pub stop_time: Option<DateTime<Utc>>,
    pub tags: BTreeSet<String>,
}

/// Render a timestamp the way every output format does
pub fn format_timestamp(timestamp: Option<&DateTime<Utc>>) -> Option<String> {
    timestamp.map(|ts| ts.to_rfc3339_opts(SecondsFormat::AutoSi, true))
}

#[derive(Debug, Default)]
struct PendingTest {
    start_time: Option<DateTime<Utc>>,
    tags: BTreeSet<String>,
}

/// Tallies final statuses and pairs them with their start events
#[derive(Debug, Default)]
pub struct RunSummary {
    pending: HashMap<String, PendingTest>,
    counts: HashMap<TestStatus, usize>,
}

impl RunSummary {
    /// Record an event, returning the test it completed, if any
    ///
    /// Events without a test id or status (pure file content) only count
    /// towards nothing.
    pub fn record(&mut self, event: &StatusEvent) -> Option<CompletedTest> {
        let (Some(test_id), Some(status)) = (&event.test_id, event.status) else {
            return None;
        };

        let pending = self.pending.entry(test_id.clone()).or_default();
        if let Some(tags) = &event.tags {
            pending.tags.extend(tags.iter().cloned());
        }
        if status == TestStatus::InProgress {
            if event.timestamp.is_some() {
                pending.start_time = event.timestamp;
            }
            return None;
        }
        if !status.is_final() {
            return None;
        }

        let pending = self.pending.remove(test_id).unwrap_or_default();
        *self.counts.entry(status).or_default() += 1;
        Some(CompletedTest {
            test_id: test_id.clone(),
            status,
            start_time: pending.start_time,
            stop_time: event.timestamp,
            tags: pending.tags,
        })
    }

    /// Number of tests that finished with `status`
    pub fn count(&self, status: TestStatus) -> usize {
        self.counts.get(&status).copied().unwrap_or(0)
    }

    /// Number of tests that reached any final status
    pub fn tests_run(&self) -> usize {
        self.counts.values().sum()
    }

    /// False once any test failed or unexpectedly succeeded
    pub fn was_successful(&self) -> bool {
        self.count(TestStatus::Fail) == 0 && self.count(TestStatus::UxSuccess) == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_completion_carries_start_time_and_tags() {
        let start = DateTime::from_timestamp(100, 0).unwrap();
        let stop = DateTime::from_timestamp(102, 250_000_000).unwrap();
        let mut summary = RunSummary::default();

        let started = StatusEvent::test("t", TestStatus::InProgress)
            .with_timestamp(start)
            .with_tags(["quick"]);
        assert_eq!(summary.record(&started), None);

        let done = summary
            .record(&StatusEvent::test("t", TestStatus::Success).with_timestamp(stop))
            .unwrap();
        assert_eq!(done.start_time, Some(start));
        assert_eq!(done.stop_time, Some(stop));
        assert!(done.tags.contains("quick"));
        assert_eq!(
            format_timestamp(done.stop_time.as_ref()).as_deref(),
            Some("1970-01-01T00:01:42.250Z")
        );
    }

    #[test]
    fn test_vacuous_run_is_successful() {
        let summary = RunSummary::default();
        assert!(summary.was_successful());
        assert_eq!(summary.tests_run(), 0);
    }

    #[test]
    fn test_failures_and_unexpected_successes_fail_the_run() {
        let mut summary = RunSummary::default();
        summary.record(&StatusEvent::test("a", TestStatus::XFail));
        summary.record(&StatusEvent::test("b", TestStatus::Skip));
        assert!(summary.was_successful());

        summary.record(&StatusEvent::test("c", TestStatus::UxSuccess));
        assert!(!summary.was_successful());
        assert_eq!(summary.tests_run(), 3);
    }

    #[test]
    fn test_exists_and_file_events_are_not_counted() {
        let mut summary = RunSummary::default();
        summary.record(&StatusEvent::test("a", TestStatus::Exists));
        summary.record(&StatusEvent::default().with_file("stdout", b"x".to_vec()));
        assert_eq!(summary.tests_run(), 0);
    }
}
