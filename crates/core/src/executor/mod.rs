//! Record processing loops with a per-record failure boundary.
//!
//! [`PartitionExecutor`] runs partitions on a fixed pool of workers, each
//! owning its own session; [`process_sequential`] walks a plain source.
//! Both check the cancellation flag before every partition and before
//! every record. A record that fails is handed to a [`FailureSink`] and
//! processing moves on.

mod pool;
mod sequential;
mod types;

pub use pool::*;
pub use sequential::*;
pub use types::*;
