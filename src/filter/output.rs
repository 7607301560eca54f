//! Output destinations
//!
//! The rendered results and, optionally, the forwarded packets share one
//! destination. [`SharedOutput`] is a cloneable handle onto it so that the
//! result sink and the forward sink can both write to it in stream order.

use std::io;
use std::path::Path;
use std::pin::Pin;
use std::sync::{Arc, Mutex};
use std::task::{Context, Poll};

use tokio::io::{AsyncWrite, AsyncWriteExt};

use crate::common::{Error, Result};

#[derive(Debug)]
enum Target {
    Stdout(tokio::io::Stdout),
    File(tokio::fs::File),
    Memory(Vec<u8>),
    Closed,
}

impl Target {
    fn as_writer(&mut self) -> io::Result<Pin<&mut (dyn AsyncWrite + Unpin + Send)>> {
        let writer: &mut (dyn AsyncWrite + Unpin + Send) = match self {
            Self::Stdout(stdout) => stdout,
            Self::File(file) => file,
            Self::Memory(buf) => buf,
            Self::Closed => {
                return Err(io::Error::new(
                    io::ErrorKind::BrokenPipe,
                    "output destination is closed",
                ))
            }
        };
        Ok(Pin::new(writer))
    }
}

/// Cloneable handle onto an output destination
#[derive(Debug, Clone)]
pub struct SharedOutput {
    target: Arc<Mutex<Target>>,
}

impl SharedOutput {
    fn new(target: Target) -> Self {
        Self {
            target: Arc::new(Mutex::new(target)),
        }
    }

    /// The process's standard output
    pub fn stdout() -> Self {
        Self::new(Target::Stdout(tokio::io::stdout()))
    }

    /// An in-memory buffer, read back with [`SharedOutput::contents`]
    pub fn memory() -> Self {
        Self::new(Target::Memory(Vec::new()))
    }

    /// Create or truncate the file at `path`
    pub async fn create(path: &Path) -> Result<Self> {
        let file = tokio::fs::File::create(path)
            .await
            .map_err(|e| Error::destination(path, e))?;
        Ok(Self::new(Target::File(file)))
    }

    /// Bytes written so far to an in-memory output; empty for other targets
    pub fn contents(&self) -> Vec<u8> {
        match &*self.lock_target() {
            Target::Memory(buf) => buf.clone(),
            _ => Vec::new(),
        }
    }

    /// Whether writes to this handle now fail
    pub fn is_closed(&self) -> bool {
        matches!(&*self.lock_target(), Target::Closed)
    }

    /// Flush and shut down the destination, then release it
    ///
    /// Every clone observes the close. Closing twice is a no-op.
    pub async fn close(&self) -> Result<()> {
        if self.is_closed() {
            return Ok(());
        }
        self.clone().shutdown().await?;
        *self.lock_target() = Target::Closed;
        Ok(())
    }

    fn lock_target(&self) -> std::sync::MutexGuard<'_, Target> {
        self.target.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn poll_with<T>(
        &self,
        f: impl FnOnce(Pin<&mut (dyn AsyncWrite + Unpin + Send)>) -> Poll<io::Result<T>>,
    ) -> Poll<io::Result<T>> {
        let mut target = self.lock_target();
        match target.as_writer() {
            Ok(writer) => f(writer),
            Err(e) => Poll::Ready(Err(e)),
        }
    }
}

impl AsyncWrite for SharedOutput {
    fn poll_write(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &[u8],
    ) -> Poll<io::Result<usize>> {
        self.poll_with(|writer| writer.poll_write(cx, buf))
    }

    fn poll_flush(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        self.poll_with(|writer| writer.poll_flush(cx))
    }

    fn poll_shutdown(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        self.poll_with(|writer| writer.poll_shutdown(cx))
    }
}

/// The output destination of one pipeline run
///
/// Opened before the run and closed exactly once after it. Only a file
/// opened here is closed; a caller-supplied standard output is flushed.
#[derive(Debug)]
pub struct OutputDestination {
    output: SharedOutput,
    owned: bool,
    released: bool,
}

impl OutputDestination {
    /// Resolve `path` into a destination, falling back to `stdout`
    pub async fn open(path: Option<&Path>, stdout: &SharedOutput) -> Result<Self> {
        let (output, owned) = match path {
            Some(path) => {
                tracing::debug!(path = %path.display(), "Opening output file");
                (SharedOutput::create(path).await?, true)
            }
            None => (stdout.clone(), false),
        };
        Ok(Self {
            output,
            owned,
            released: false,
        })
    }

    /// A handle for writing to the destination
    pub fn output(&self) -> SharedOutput {
        self.output.clone()
    }

    /// Release the destination; later calls do nothing
    pub async fn release(&mut self) -> Result<()> {
        if self.released {
            return Ok(());
        }
        self.released = true;
        if self.owned {
            self.output.close().await
        } else {
            self.output.clone().flush().await?;
            Ok(())
        }
    }
}

impl Drop for OutputDestination {
    fn drop(&mut self) {
        if !self.released {
            tracing::warn!("Output destination dropped without being released");
        }
    }
}
