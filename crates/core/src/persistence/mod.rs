//! Success and error persistence queues.
//!
//! Each queue owns one writer task that appends record batches to a
//! workbook. Producers never block: [`PersistenceQueue::enqueue`] hands the
//! batch over and returns.

mod queue;
mod store;
mod types;

pub use queue::*;
pub use store::*;
pub use types::*;
