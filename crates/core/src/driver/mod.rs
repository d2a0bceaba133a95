//! Browser automation capability.
//!
//! A [`PageDriver`] is owned by exactly one job or partition worker at a
//! time; it is `Send` but never shared.

mod config;
mod traits;
mod webdriver;

pub use config::*;
pub use traits::*;
pub use webdriver::*;
