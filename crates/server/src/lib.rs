//! HTTP surface of the docket worker: job dispatch, download links and
//! metrics over the core job engine.

pub mod api;
pub mod metrics;
pub mod state;
