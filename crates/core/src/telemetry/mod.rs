//! Per-job progress stream.
//!
//! Job code emits messages without blocking; a writer task forwards them to
//! the remote progress relay (best effort) and to an append-only log file
//! in the job's output directory. The relay's stop signal is the way an
//! operator cancels a running job.

mod channel;
mod counters;
mod queue;
mod types;
mod ws;

pub use channel::*;
pub use counters::*;
pub use queue::*;
pub use types::*;
pub use ws::*;
