use thiserror::Error;

use crate::{debug::breakpoints::BreakpointId, metadata::token::Token};

macro_rules! malformed_error {
    // Single string version
    ($msg:expr) => {
        crate::Error::Malformed {
            message: $msg.to_string(),
            file: file!(),
            line: line!(),
        }
    };

    // Format string with arguments version
    ($fmt:expr, $($arg:tt)*) => {
        crate::Error::Malformed {
            message: format!($fmt, $($arg)*),
            file: file!(),
            line: line!(),
        }
    };
}

/// The generic Error type, which provides coverage for all errors this library can potentially
/// return.
///
/// Resolution of metadata tokens never produces an error: a token that is out of range, points
/// into the wrong table or belongs to an unloaded module resolves to `None`. Errors are reserved
/// for conditions a caller can act on - a broken transport, a malformed blob read from the target,
/// a cancelled sweep or a programming error such as re-entrant proxy initialization.
///
/// # Error Categories
///
/// ## Parsing Errors
/// - [`Error::Malformed`] - Corrupted blob, signature or header read from the target
/// - [`Error::OutOfBounds`] - Attempted to read beyond the end of a blob
/// - [`Error::RecursionLimit`] - Signature nesting exceeded the allowed depth
///
/// ## Target Errors
/// - [`Error::Transport`] - The native debugging transport reported a failure
/// - [`Error::TargetDisconnected`] - The target process went away mid-query
/// - [`Error::InvalidToken`] - The target rejected a token
/// - [`Error::ModuleNotFound`] - No module instance is known for a handle
///
/// ## Engine Errors
/// - [`Error::Reentrancy`] - A proxy re-entered its own initialization
/// - [`Error::WrongThread`] - The engine was called from a thread that does not own the target
/// - [`Error::Cancelled`] - A cooperative sweep was cancelled
/// - [`Error::BreakpointNotFound`] - Unknown logical breakpoint id
/// - [`Error::LockError`] - Thread synchronization failure
///
/// # Examples
///
/// ```rust
/// use livescope::Error;
///
/// fn describe(err: &Error) -> &'static str {
///     match err {
///         Error::TargetDisconnected => "target went away",
///         Error::Cancelled => "cancelled",
///         _ => "other",
///     }
/// }
/// assert_eq!(describe(&Error::Cancelled), "cancelled");
/// ```
#[derive(Error, Debug)]
pub enum Error {
    /// A blob read from the target is damaged and could not be parsed.
    ///
    /// The error includes the source location where the malformation was detected
    /// for debugging purposes.
    #[error("Malformed - {file}:{line}: {message}")]
    Malformed {
        /// The message to be printed for the Malformed error
        message: String,
        /// The source file in which this error occured
        file: &'static str,
        /// The source line in which this error occured
        line: u32,
    },

    /// An out of bound access was attempted while parsing a blob.
    #[error("Out of Bound read would have occurred!")]
    OutOfBounds,

    /// Recursion limit reached.
    ///
    /// The associated value shows the recursion limit that was reached.
    #[error("Reach the maximum recursion level allowed - {0}")]
    RecursionLimit(usize),

    /// Failed to lock target.
    #[error("Failed to lock target")]
    LockError,

    /// The target does not consider this token valid.
    #[error("Invalid token - {0}")]
    InvalidToken(Token),

    /// A lazy member proxy re-entered its own initialization on the same thread.
    ///
    /// This is a programming error: initialization of a row must never trigger the
    /// initialization of the same row. The proxy is left uninitialized rather than
    /// half-populated.
    #[error("Re-entrant initialization of {0}")]
    Reentrancy(Token),

    /// A cooperative sweep or discovery loop observed its cancellation token.
    #[error("Operation was cancelled")]
    Cancelled,

    /// The native debugging transport reported a failure.
    #[error("Transport failure - {0}")]
    Transport(String),

    /// The target process is no longer reachable.
    #[error("Target process disconnected")]
    TargetDisconnected,

    /// The engine was called from a thread other than the one owning the debug channel.
    #[error("Engine called from a thread that does not own the debug channel")]
    WrongThread,

    /// No module instance is registered for the given handle.
    #[error("Module instance not found")]
    ModuleNotFound,

    /// No logical breakpoint is registered with the given id.
    #[error("Breakpoint not found - {0}")]
    BreakpointNotFound(BreakpointId),

    /// Generic error for miscellaneous failures.
    #[error("{0}")]
    Error(String),
}
