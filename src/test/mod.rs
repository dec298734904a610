//! Fixtures shared by the unit tests: hand-built metadata and a scripted transport.

mod transport;

pub use metadata::*;
pub use transport::*;
