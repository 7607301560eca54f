//! Byte stream demultiplexer
//!
//! Splits a mixed input into subunit packets, which are decoded and handed
//! to a [`StreamResult`], and everything else, which is copied to a
//! passthrough sink. Packets can also be copied verbatim to a forward sink.

use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt};

use super::codec;
use super::types::SIGNATURE;
use crate::common::{Error, Result};
use crate::result::StreamResult;

/// Destination for raw bytes
pub type ByteSink = dyn AsyncWrite + Unpin + Send;

/// A decoding session bound to one input stream
///
/// The decoder never closes the input or either sink.
pub struct ByteStreamDecoder<'a, R> {
    source: &'a mut R,
    passthrough: Option<&'a mut ByteSink>,
    forward: Option<&'a mut ByteSink>,
}

impl<'a, R> ByteStreamDecoder<'a, R>
where
    R: AsyncBufRead + Unpin + Send,
{
    /// Create a session reading from `source`
    ///
    /// Without a passthrough sink any non-subunit byte is a decode error.
    pub fn new(source: &'a mut R) -> Self {
        Self {
            source,
            passthrough: None,
            forward: None,
        }
    }

    /// Send non-subunit bytes to `sink`
    pub fn passthrough(mut self, sink: &'a mut ByteSink) -> Self {
        self.passthrough = Some(sink);
        self
    }

    /// Copy every packet, byte for byte, to `sink`
    pub fn forward(mut self, sink: &'a mut ByteSink) -> Self {
        self.forward = Some(sink);
        self
    }

    /// Parse the source until EOF, emitting events to `result`
    pub async fn run(mut self, result: &mut dyn StreamResult) -> Result<()> {
        loop {
            let buf = self.source.fill_buf().await?;
            if buf.is_empty() {
                return Ok(());
            }

            if buf[0] != SIGNATURE {
                let len = buf
                    .iter()
                    .position(|&b| b == SIGNATURE)
                    .unwrap_or(buf.len());
                let Some(passthrough) = self.passthrough.as_deref_mut() else {
                    return Err(Error::Decode(format!(
                        "Non subunit content: {:?}",
                        String::from_utf8_lossy(&buf[..len.min(32)])
                    )));
                };
                tracing::trace!(bytes = len, "Passing through non-subunit content");
                passthrough.write_all(&buf[..len]).await?;
                passthrough.flush().await?;
                self.source.consume(len);
                continue;
            }

            let (raw, event) = codec::read_packet(&mut *self.source).await?;
            tracing::trace!(
                bytes = raw.len(),
                test_id = ?event.test_id,
                status = ?event.status,
                "Decoded packet"
            );
            if let Some(forward) = self.forward.as_deref_mut() {
                forward.write_all(&raw).await?;
                forward.flush().await?;
            }
            result.status(&event).await?;
        }
    }
}
