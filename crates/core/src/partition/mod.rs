//! Grouping of work records by regional court, with the 1-based row index
//! used in progress reports.

mod index;
mod partitioner;
mod process_number;

pub use index::*;
pub use partitioner::*;
pub use process_number::*;

pub(crate) use partitioner::row_of;

use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum PartitionError {
    #[error("Invalid process number: '{0}'")]
    InvalidProcessNumber(String),
}
