//! Error types for the subunit filter
//!
//! Every error here is fatal for the current invocation. A failing test is
//! not an error: it is reported through the run outcome instead.

use std::io;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Result type alias using our Error type
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for the subunit filter
#[derive(Error, Debug)]
pub enum Error {
    // === Protocol Errors ===
    #[error("Subunit decode error: {0}")]
    Decode(String),

    #[error("Short read - got {got} bytes, wanted {wanted} bytes")]
    ShortRead { got: usize, wanted: usize },

    #[error("Bad checksum - calculated (0x{calculated:x}), stored (0x{stored:x})")]
    BadChecksum { calculated: u32, stored: u32 },

    #[error("Cannot encode packet: {0}")]
    Encode(String),

    // === Destination Errors ===
    #[error("Cannot open output '{}': {source}", path.display())]
    Destination {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    // === Configuration Errors ===
    #[error("Invalid configuration file: {0}")]
    ConfigParse(String),

    // === IO Errors ===
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    #[error("Failed to read file '{path}': {error}")]
    FileRead { path: String, error: String },

    // === Serialization Errors ===
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl Error {
    /// Create a destination error for an output path that could not be opened
    pub fn destination(path: &Path, source: io::Error) -> Self {
        Self::Destination {
            path: path.to_path_buf(),
            source,
        }
    }

    /// Create a decode error for a string field at `offset` in a packet body
    pub fn bad_string(offset: usize, reason: &str) -> Self {
        Self::Decode(format!("UTF8 string at offset {offset} {reason}"))
    }

    /// Whether this error came from malformed protocol input
    pub fn is_decode(&self) -> bool {
        matches!(
            self,
            Self::Decode(_) | Self::ShortRead { .. } | Self::BadChecksum { .. }
        )
    }
}
