//! Result lifecycle
//!
//! Brackets event delivery with `start_test_run` / `stop_test_run` and
//! reduces the run to a single success flag.

use async_trait::async_trait;

use crate::common::Result;
use crate::result::StreamResult;

/// Something that delivers the events of a run to a result
#[async_trait]
pub trait EventSource: Send {
    async fn deliver(&mut self, result: &mut dyn StreamResult) -> Result<()>;
}

/// Run `source` against `result` between the start and stop calls
///
/// `stop_test_run` is attempted whenever `start_test_run` succeeded, even
/// if delivery failed; a delivery error is then returned in preference to
/// a stop error. The success flag is only read after a clean stop, so a
/// decode error never turns into a plain "tests failed".
pub async fn run_bracketed(
    result: &mut dyn StreamResult,
    source: &mut dyn EventSource,
) -> Result<bool> {
    result.start_test_run().await?;
    tracing::debug!("Test run started");

    let delivered = source.deliver(result).await;
    let stopped = result.stop_test_run().await;
    tracing::debug!("Test run stopped");

    match (delivered, stopped) {
        (Ok(()), Ok(())) => Ok(result.was_successful()),
        (Ok(()), Err(e)) => Err(e),
        (Err(e), Ok(())) => Err(e),
        (Err(e), Err(stop_error)) => {
            tracing::warn!("Failed to stop test run after error: {}", stop_error);
            Err(e)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::common::Error;
    use crate::protocol::{StatusEvent, TestStatus};
    use crate::result::testing::{Call, RecordingResult};

    /// Delivers fixed events, then optionally fails
    struct ScriptedSource {
        events: Vec<StatusEvent>,
        fail_after: bool,
    }

    #[async_trait]
    impl EventSource for ScriptedSource {
        async fn deliver(&mut self, result: &mut dyn StreamResult) -> Result<()> {
            for event in &self.events {
                result.status(event).await?;
            }
            if self.fail_after {
                return Err(Error::Decode("truncated".to_string()));
            }
            Ok(())
        }
    }

    fn source(events: Vec<StatusEvent>, fail_after: bool) -> ScriptedSource {
        ScriptedSource { events, fail_after }
    }

    #[tokio::test]
    async fn test_empty_run_is_bracketed_and_successful() {
        let mut result = RecordingResult::default();

        let ok = run_bracketed(&mut result, &mut source(vec![], false))
            .await
            .unwrap();

        assert!(ok);
        assert_eq!(result.calls, vec![Call::Start, Call::Stop]);
    }

    #[tokio::test]
    async fn test_events_arrive_between_start_and_stop() {
        let event = StatusEvent::test("a", TestStatus::Fail);
        let mut result = RecordingResult::default();

        let ok = run_bracketed(&mut result, &mut source(vec![event.clone()], false))
            .await
            .unwrap();

        assert!(!ok);
        assert_eq!(
            result.calls,
            vec![Call::Start, Call::Status(event), Call::Stop]
        );
    }

    #[tokio::test]
    async fn test_delivery_error_still_stops_once() {
        let mut result = RecordingResult::default();

        let err = run_bracketed(
            &mut result,
            &mut source(vec![StatusEvent::test("a", TestStatus::Success)], true),
        )
        .await
        .unwrap_err();

        assert!(err.is_decode());
        assert_eq!(result.starts(), 1);
        assert_eq!(result.stops(), 1);
    }

    #[tokio::test]
    async fn test_delivery_error_wins_over_stop_error() {
        let mut result = RecordingResult {
            fail_on_stop: true,
            ..RecordingResult::default()
        };

        let err = run_bracketed(&mut result, &mut source(vec![], true))
            .await
            .unwrap_err();

        assert!(err.is_decode());
    }

    #[tokio::test]
    async fn test_stop_error_is_reported() {
        let mut result = RecordingResult {
            fail_on_stop: true,
            ..RecordingResult::default()
        };

        let err = run_bracketed(&mut result, &mut source(vec![], false))
            .await
            .unwrap_err();

        assert!(matches!(err, Error::Io(_)));
    }

    #[tokio::test]
    async fn test_start_error_skips_delivery() {
        let mut result = RecordingResult {
            fail_on_start: true,
            ..RecordingResult::default()
        };

        run_bracketed(&mut result, &mut source(vec![], false))
            .await
            .unwrap_err();

        assert_eq!(result.calls, vec![Call::Start]);
    }
}
