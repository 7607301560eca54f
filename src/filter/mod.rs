//! The filter pipeline
//!
//! [`Pipeline`] owns the output destination of one invocation, wires the
//! passthrough and forward sinks into a [`StreamRouter`], and runs it inside
//! the start/stop bracket of [`run_bracketed`].

mod driver;
mod lifecycle;
mod output;
mod router;

pub use driver::{filter_by_result, ExitStatus, FilterOptions, Pipeline};
pub use lifecycle::{run_bracketed, EventSource};
pub use output::{OutputDestination, SharedOutput};
pub use router::{RouteSession, StreamRouter};
