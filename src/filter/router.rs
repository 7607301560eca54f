//! Stream routing
//!
//! Wires the destinations of one invocation into a decoding session. When
//! no passthrough sink is given, non-subunit bytes go to the router's
//! default passthrough, which is standard output unless configured
//! otherwise. Suppressing them takes an explicit discard sink.

use async_trait::async_trait;
use tokio::io::AsyncBufRead;

use super::lifecycle::EventSource;
use crate::common::Result;
use crate::protocol::{ByteSink, ByteStreamDecoder};
use crate::result::StreamResult;

/// Routes protocol bytes to the decoder and everything else to passthrough
pub struct StreamRouter {
    default_passthrough: Box<ByteSink>,
}

impl Default for StreamRouter {
    fn default() -> Self {
        Self::with_default_passthrough(Box::new(tokio::io::stdout()))
    }
}

impl StreamRouter {
    /// Router whose default passthrough is standard output
    pub fn new() -> Self {
        Self::default()
    }

    /// Router whose default passthrough is `sink`
    pub fn with_default_passthrough(sink: Box<ByteSink>) -> Self {
        Self {
            default_passthrough: sink,
        }
    }

    /// Decode `input` to completion, delivering events to `result`
    ///
    /// Protocol bytes are copied to `forward` when given. Nothing is
    /// closed, and success or failure of the tests is left to `result`.
    pub async fn route<R>(
        &mut self,
        input: &mut R,
        result: &mut dyn StreamResult,
        passthrough: Option<&mut ByteSink>,
        forward: Option<&mut ByteSink>,
    ) -> Result<()>
    where
        R: AsyncBufRead + Unpin + Send,
    {
        let passthrough: &mut ByteSink = match passthrough {
            Some(sink) => sink,
            None => &mut *self.default_passthrough,
        };
        let mut decoder = ByteStreamDecoder::new(input).passthrough(passthrough);
        if let Some(forward) = forward {
            tracing::debug!("Forwarding subunit packets");
            decoder = decoder.forward(forward);
        }
        decoder.run(result).await
    }
}

/// One routing pass, packaged as the body of a bracketed run
pub struct RouteSession<'a, R> {
    router: &'a mut StreamRouter,
    input: &'a mut R,
    passthrough: Option<&'a mut ByteSink>,
    forward: Option<&'a mut ByteSink>,
}

impl<'a, R> RouteSession<'a, R> {
    pub fn new(
        router: &'a mut StreamRouter,
        input: &'a mut R,
        passthrough: Option<&'a mut ByteSink>,
        forward: Option<&'a mut ByteSink>,
    ) -> Self {
        Self {
            router,
            input,
            passthrough,
            forward,
        }
    }
}

#[async_trait]
impl<'a, R> EventSource for RouteSession<'a, R>
where
    R: AsyncBufRead + Unpin + Send,
{
    async fn deliver(&mut self, result: &mut dyn StreamResult) -> Result<()> {
        self.router
            .route(
                &mut *self.input,
                result,
                self.passthrough.as_mut().map(|sink| &mut **sink as &mut ByteSink),
                self.forward.as_mut().map(|sink| &mut **sink as &mut ByteSink),
            )
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::filter::SharedOutput;
    use crate::protocol::codec::encode_packet;
    use crate::protocol::{StatusEvent, TestStatus};
    use crate::result::testing::RecordingResult;
    use std::io::Cursor;

    fn stream(parts: &[&[u8]]) -> Cursor<Vec<u8>> {
        Cursor::new(parts.concat())
    }

    #[tokio::test]
    async fn test_absent_passthrough_uses_default() {
        let default = SharedOutput::memory();
        let mut router = StreamRouter::with_default_passthrough(Box::new(default.clone()));
        let mut input = stream(&[b"no markers here\n".as_slice(), b"at all".as_slice()]);
        let mut result = RecordingResult::default();

        router
            .route(&mut input, &mut result, None, None)
            .await
            .unwrap();

        assert_eq!(default.contents(), b"no markers here\nat all");
        assert!(result.statuses().is_empty());
    }

    #[tokio::test]
    async fn test_explicit_discard_suppresses_default() {
        let default = SharedOutput::memory();
        let mut router = StreamRouter::with_default_passthrough(Box::new(default.clone()));
        let packet = encode_packet(&StatusEvent::test("a", TestStatus::Success)).unwrap();
        let mut input = stream(&[b"noise".as_slice(), packet.as_slice(), b"more noise".as_slice()]);
        let mut discard = tokio::io::sink();
        let mut result = RecordingResult::default();

        router
            .route(&mut input, &mut result, Some(&mut discard), None)
            .await
            .unwrap();

        assert!(default.contents().is_empty());
        assert_eq!(result.statuses().len(), 1);
    }

    #[tokio::test]
    async fn test_passthrough_and_forward_stay_separate() {
        let mut router = StreamRouter::with_default_passthrough(Box::new(tokio::io::sink()));
        let first = encode_packet(&StatusEvent::test("a", TestStatus::InProgress)).unwrap();
        let second = encode_packet(&StatusEvent::test("a", TestStatus::Fail)).unwrap();
        let mut input = stream(&[first.as_slice(), b"log line\n".as_slice(), second.as_slice()]);
        let mut passthrough = Vec::new();
        let mut forward = Vec::new();
        let mut result = RecordingResult::default();

        router
            .route(
                &mut input,
                &mut result,
                Some(&mut passthrough),
                Some(&mut forward),
            )
            .await
            .unwrap();

        assert_eq!(passthrough, b"log line\n");
        assert_eq!(forward, [first, second].concat());
        assert_eq!(
            result.statuses(),
            vec![
                ("a".to_string(), TestStatus::InProgress),
                ("a".to_string(), TestStatus::Fail)
            ]
        );
    }
}
