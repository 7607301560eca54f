//! Pipeline driver
//!
//! Resolves the options of one invocation into concrete sinks, runs the
//! bracketed routing pass and maps the outcome to an exit status.

use std::path::PathBuf;

use tokio::io::AsyncBufRead;

use super::lifecycle::run_bracketed;
use super::output::{OutputDestination, SharedOutput};
use super::router::{RouteSession, StreamRouter};
use crate::common::Result;
use crate::protocol::ByteSink;
use crate::result::ResultFactory;

/// Options of one filter invocation
#[derive(Debug, Clone, Default)]
pub struct FilterOptions {
    /// Write results here instead of standard output
    pub output_path: Option<PathBuf>,
    /// Discard non-subunit input instead of echoing it to standard output
    pub no_passthrough: bool,
    /// Copy subunit packets to standard output as well
    pub forward: bool,
}

/// Exit status of a run that completed without a fatal error
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExitStatus {
    /// Every test succeeded
    Success,
    /// At least one test failed
    TestsFailed,
}

impl ExitStatus {
    pub fn from_outcome(was_successful: bool) -> Self {
        if was_successful {
            Self::Success
        } else {
            Self::TestsFailed
        }
    }

    pub fn code(self) -> u8 {
        match self {
            Self::Success => 0,
            Self::TestsFailed => 1,
        }
    }
}

impl From<ExitStatus> for std::process::ExitCode {
    fn from(status: ExitStatus) -> Self {
        Self::from(status.code())
    }
}

/// A configured filter
pub struct Pipeline {
    options: FilterOptions,
    stdout: SharedOutput,
}

impl Pipeline {
    pub fn new(options: FilterOptions) -> Self {
        Self {
            options,
            stdout: SharedOutput::stdout(),
        }
    }

    /// Use `stdout` wherever the pipeline would write to standard output
    pub fn with_stdout(mut self, stdout: SharedOutput) -> Self {
        self.stdout = stdout;
        self
    }

    /// Filter `input` through a result created by `factory`
    ///
    /// The output destination is opened before the run starts and released
    /// exactly once afterwards, whichever way the run ends.
    pub async fn run<R>(&self, factory: ResultFactory, input: &mut R) -> Result<ExitStatus>
    where
        R: AsyncBufRead + Unpin + Send,
    {
        let mut destination =
            OutputDestination::open(self.options.output_path.as_deref(), &self.stdout).await?;

        let outcome = self.run_with(factory, &destination, input).await;
        let released = destination.release().await;

        let was_successful = match (outcome, released) {
            (Ok(ok), Ok(())) => ok,
            (Ok(_), Err(e)) => return Err(e),
            (Err(e), Ok(())) => return Err(e),
            (Err(e), Err(release_error)) => {
                tracing::warn!("Failed to release output after error: {}", release_error);
                return Err(e);
            }
        };

        let status = ExitStatus::from_outcome(was_successful);
        tracing::info!(?status, "Filter run complete");
        Ok(status)
    }

    async fn run_with<R>(
        &self,
        factory: ResultFactory,
        destination: &OutputDestination,
        input: &mut R,
    ) -> Result<bool>
    where
        R: AsyncBufRead + Unpin + Send,
    {
        let mut result = factory(destination.output());
        let mut router = StreamRouter::with_default_passthrough(Box::new(self.stdout.clone()));

        let mut discard = tokio::io::sink();
        let passthrough: Option<&mut ByteSink> = if self.options.no_passthrough {
            Some(&mut discard)
        } else {
            None
        };

        let mut forward_output = self.stdout.clone();
        let forward: Option<&mut ByteSink> = if self.options.forward {
            Some(&mut forward_output)
        } else {
            None
        };

        let mut session = RouteSession::new(&mut router, input, passthrough, forward);
        run_bracketed(result.as_mut(), &mut session).await
    }
}

/// Filter `input` with `options`, rendering results through `factory`
pub async fn filter_by_result<R>(
    factory: ResultFactory,
    options: FilterOptions,
    input: &mut R,
) -> Result<ExitStatus>
where
    R: AsyncBufRead + Unpin + Send,
{
    Pipeline::new(options).run(factory, input).await
}
