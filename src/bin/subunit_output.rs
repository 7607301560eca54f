//! subunit-output - Generate a subunit v2 stream on stdout
//!
//! Reports a single test status, optionally with a file attachment sent
//! ahead of it in fixed-size chunks.

use std::collections::BTreeSet;
use std::process::ExitCode;

use chrono::Utc;
use clap::{ArgGroup, Parser};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite};

use subunit_filter::cli::FATAL_EXIT_CODE;
use subunit_filter::common::{logging, Error, Result};
use subunit_filter::protocol::codec::write_packet;
use subunit_filter::protocol::{StatusEvent, TestStatus};

/// Attachment chunk size in bytes
const CHUNK_SIZE: usize = 1024;

#[derive(Parser, Debug)]
#[command(name = "subunit-output", about = "A tool to generate a subunit result byte-stream")]
#[command(version, long_about = None)]
#[command(group(
    ArgGroup::new("status")
        .multiple(false)
        .args(["inprogress", "success", "fail", "skip", "exists", "xfail", "uxsuccess"])
))]
struct Args {
    /// Report that a test is in progress
    #[arg(long, value_name = "TEST_ID")]
    inprogress: Option<String>,

    /// Report a test success. This is a final state
    #[arg(long, value_name = "TEST_ID")]
    success: Option<String>,

    /// Report a test failure. This is a final state
    #[arg(long, value_name = "TEST_ID")]
    fail: Option<String>,

    /// Report a skipped test. This is a final state
    #[arg(long, value_name = "TEST_ID")]
    skip: Option<String>,

    /// Report that a test exists
    #[arg(long, value_name = "TEST_ID")]
    exists: Option<String>,

    /// Report an expected failure. This is a final state
    #[arg(long, value_name = "TEST_ID")]
    xfail: Option<String>,

    /// Report an unexpected success. This is a final state
    #[arg(long, value_name = "TEST_ID")]
    uxsuccess: Option<String>,

    /// Attach a file to the result stream for this test ('-' reads stdin)
    #[arg(long, value_name = "PATH")]
    attach_file: Option<String>,

    /// Name to give the attachment (default: the path as given, or 'stdin')
    #[arg(long, requires = "attach_file")]
    file_name: Option<String>,

    /// Mime type to send with the attachment
    #[arg(long, requires = "attach_file")]
    mimetype: Option<String>,

    /// Comma-separated tags to associate with the test
    #[arg(long, value_delimiter = ',', requires = "status")]
    tags: Vec<String>,
}

impl Args {
    /// The status command given, if any
    fn status(&self) -> Option<(String, TestStatus)> {
        [
            (&self.inprogress, TestStatus::InProgress),
            (&self.success, TestStatus::Success),
            (&self.fail, TestStatus::Fail),
            (&self.skip, TestStatus::Skip),
            (&self.exists, TestStatus::Exists),
            (&self.xfail, TestStatus::XFail),
            (&self.uxsuccess, TestStatus::UxSuccess),
        ]
        .into_iter()
        .find_map(|(test_id, status)| test_id.clone().map(|id| (id, status)))
    }
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> ExitCode {
    logging::init_cli();

    let args = Args::parse();
    let mut stdout = tokio::io::stdout();

    match generate(&args, &mut stdout).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("Error: {e}");
            ExitCode::from(FATAL_EXIT_CODE)
        }
    }
}

async fn generate<W: AsyncWrite + Unpin>(args: &Args, output: &mut W) -> Result<()> {
    let (test_id, status) = match args.status() {
        Some((test_id, status)) => (Some(test_id), Some(status)),
        None => (None, None),
    };

    if let Some(attach) = &args.attach_file {
        let (default_name, mut reader): (String, Box<dyn AsyncRead + Unpin + Send>) =
            if attach == "-" {
                ("stdin".to_string(), Box::new(tokio::io::stdin()))
            } else {
                let file = tokio::fs::File::open(attach).await.map_err(|e| {
                    Error::FileRead {
                        path: attach.clone(),
                        error: e.to_string(),
                    }
                })?;
                (attach.clone(), Box::new(file))
            };

        let template = StatusEvent {
            test_id: test_id.clone(),
            mime_type: args.mimetype.clone(),
            ..StatusEvent::default()
        };
        let name = args.file_name.clone().unwrap_or(default_name);
        write_chunked_file(&mut reader, output, &template, &name, CHUNK_SIZE).await?;
    }

    let tags: BTreeSet<String> = args.tags.iter().filter(|t| !t.is_empty()).cloned().collect();
    let event = StatusEvent {
        test_id,
        status,
        tags: (!tags.is_empty()).then_some(tags),
        timestamp: Some(Utc::now()),
        ..StatusEvent::default()
    };
    write_packet(output, &event).await
}

/// Send `reader` as file packets of at most `chunk_size` bytes
///
/// The last packet is always an empty chunk marked as end of file.
async fn write_chunked_file<R, W>(
    reader: &mut R,
    output: &mut W,
    template: &StatusEvent,
    file_name: &str,
    chunk_size: usize,
) -> Result<()>
where
    R: AsyncRead + Unpin + ?Sized,
    W: AsyncWrite + Unpin,
{
    let mut buf = vec![0u8; chunk_size];
    loop {
        let n = reader.read(&mut buf).await?;
        if n == 0 {
            break;
        }
        let chunk = template
            .clone()
            .with_file(file_name, buf[..n].to_vec());
        write_packet(output, &chunk).await?;
    }
    let last = template.clone().with_file(file_name, Vec::new()).with_eof();
    write_packet(output, &last).await
}
