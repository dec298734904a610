//! Shared helpers: blob reading and cooperative cancellation.

mod cancel;
mod io;
mod parser;

pub use cancel::CancellationToken;
pub use io::{read_le, read_le_at, CilIO};
pub use parser::Parser;
