//! Site authentication: password form login and the certificate
//! challenge-response flow, plus the session credentials both produce.

mod challenge;
mod password;
mod session;
mod traits;

pub use challenge::*;
pub use password::*;
pub use session::*;
pub use traits::*;
