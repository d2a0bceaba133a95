//! Work records: the ordered field maps read from input spreadsheets and
//! written to result sheets.

mod value;
mod work;

pub use value::*;
pub use work::*;

use thiserror::Error;

/// Failure while processing a single record. Never aborts the job; the
/// record is routed to the error sheet with this message as its reason.
#[derive(Debug, Error)]
pub enum RecordError {
    #[error("Record has no '{0}' field")]
    MissingField(String),

    #[error("Nothing found for {0}")]
    NotFound(String),

    #[error("Remote request failed: {0}")]
    Remote(String),

    #[error("{0}")]
    Failed(String),
}
