//! Subunit v2 event types
//!
//! A packet carries at most one status change for a test plus optional file
//! content. The decoder presents each packet as one [`StatusEvent`].

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::BTreeSet;

// === Packet Layout ===

/// First byte of every packet
pub const SIGNATURE: u8 = 0xb3;

/// Version nibble stored in the top four bits of the flags
pub const VERSION: u16 = 0x2;

pub const FLAG_TEST_ID: u16 = 0x0800;
pub const FLAG_ROUTE_CODE: u16 = 0x0400;
pub const FLAG_TIMESTAMP: u16 = 0x0200;
pub const FLAG_RUNNABLE: u16 = 0x0100;
pub const FLAG_TAGS: u16 = 0x0080;
pub const FLAG_FILE_CONTENT: u16 = 0x0040;
pub const FLAG_MIME_TYPE: u16 = 0x0020;
pub const FLAG_EOF: u16 = 0x0010;

/// Mask for the status bits
pub const STATUS_MASK: u16 = 0x0007;

/// Signature, flags and length
pub const HEADER_LEN: usize = 6;

/// Trailing CRC32
pub const CRC_LEN: usize = 4;

/// Length is a 24 bit field
pub const MAX_PACKET_LEN: usize = 0x00ff_ffff;

// === Status ===

/// Test status carried in the low three flag bits
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum TestStatus {
    /// The test is known to exist
    Exists,
    /// The test has started running
    InProgress,
    Success,
    /// Expected to fail, but passed
    UxSuccess,
    Skip,
    Fail,
    /// Expected failure
    XFail,
}

impl TestStatus {
    /// Decode the status bits; zero means "no status"
    pub fn from_bits(bits: u16) -> Option<Self> {
        match bits & STATUS_MASK {
            0x1 => Some(Self::Exists),
            0x2 => Some(Self::InProgress),
            0x3 => Some(Self::Success),
            0x4 => Some(Self::UxSuccess),
            0x5 => Some(Self::Skip),
            0x6 => Some(Self::Fail),
            0x7 => Some(Self::XFail),
            _ => None,
        }
    }

    /// Encode to the status bits
    pub fn bits(self) -> u16 {
        match self {
            Self::Exists => 0x1,
            Self::InProgress => 0x2,
            Self::Success => 0x3,
            Self::UxSuccess => 0x4,
            Self::Skip => 0x5,
            Self::Fail => 0x6,
            Self::XFail => 0x7,
        }
    }

    /// Name used on the command line and in rendered output
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Exists => "exists",
            Self::InProgress => "inprogress",
            Self::Success => "success",
            Self::UxSuccess => "uxsuccess",
            Self::Skip => "skip",
            Self::Fail => "fail",
            Self::XFail => "xfail",
        }
    }

    /// No further status may follow a final status for the same test
    pub fn is_final(self) -> bool {
        !matches!(self, Self::Exists | Self::InProgress)
    }

    /// Statuses that make a run unsuccessful
    pub fn is_failure(self) -> bool {
        matches!(self, Self::Fail | Self::UxSuccess)
    }
}

impl std::fmt::Display for TestStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

// === Events ===

/// File content attached to a packet
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct FileChunk {
    pub name: String,
    pub bytes: Vec<u8>,
}

/// One decoded packet
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatusEvent {
    pub test_id: Option<String>,
    pub status: Option<TestStatus>,
    pub tags: Option<BTreeSet<String>>,
    pub runnable: bool,
    pub mime_type: Option<String>,
    pub file: Option<FileChunk>,
    /// End of the file named by this packet, or of the stream for its route
    pub eof: bool,
    pub route_code: Option<String>,
    pub timestamp: Option<DateTime<Utc>>,
}

impl Default for StatusEvent {
    fn default() -> Self {
        Self {
            test_id: None,
            status: None,
            tags: None,
            runnable: true,
            mime_type: None,
            file: None,
            eof: false,
            route_code: None,
            timestamp: None,
        }
    }
}

impl StatusEvent {
    /// A status change for a test
    pub fn test(test_id: impl Into<String>, status: TestStatus) -> Self {
        Self {
            test_id: Some(test_id.into()),
            status: Some(status),
            ..Self::default()
        }
    }

    pub fn with_timestamp(mut self, timestamp: DateTime<Utc>) -> Self {
        self.timestamp = Some(timestamp);
        self
    }

    pub fn with_tags<I, S>(mut self, tags: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.tags = Some(tags.into_iter().map(Into::into).collect());
        self
    }

    pub fn with_file(mut self, name: impl Into<String>, bytes: Vec<u8>) -> Self {
        self.file = Some(FileChunk {
            name: name.into(),
            bytes,
        });
        self
    }

    pub fn with_eof(mut self) -> Self {
        self.eof = true;
        self
    }
}
