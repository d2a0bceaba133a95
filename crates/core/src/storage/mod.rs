//! Object storage for job inputs, keystores and output archives.

mod archive;
mod config;
mod fs;
mod traits;

pub use archive::*;
pub use config::*;
pub use fs::*;
pub use traits::*;
