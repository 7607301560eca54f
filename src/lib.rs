//! subunit-filter - Turn subunit v2 test streams into result reports
//!
//! This library reads a stream that mixes subunit packets with ordinary
//! output, renders the decoded test results, and reduces the run to an
//! exit status.

pub mod cli;
pub mod common;
pub mod filter;
pub mod protocol;
pub mod result;

// Re-export commonly used types for tests
pub use common::{Error, Result};
pub use filter::{filter_by_result, ExitStatus, FilterOptions, Pipeline};
pub use protocol::{StatusEvent, TestStatus};
