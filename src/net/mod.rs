//! Non-blocking transport primitives
//!
//! Everything in this module either completes immediately, reports that it
//! would block, or reports a definitive completion or error. Suspension is
//! left to the caller: it returns to the event loop and is invoked again
//! when the descriptor becomes ready.
//!
//! - [`GrowBuffer`]: a byte buffer that greedily fills from and drains to a
//!   socket, growing while it fills and shrinking when it sits mostly empty
//! - [`Registry`]: read/write interest sets over level-triggered `poll(2)`
//! - [`FileStreamPipe`]: streams a file to a socket through a fixed-size
//!   scratch buffer

pub mod buffer;
pub mod pipe;
pub mod registry;

#[cfg(test)]
pub(crate) mod testing;

pub use buffer::{GrowBuffer, RecvStatus};
pub use pipe::{FileStreamPipe, PipeStatus};
pub use registry::{ReadySet, Registry};

use std::io;

/// Initial capacity of a [`GrowBuffer`], and the idle-space threshold past
/// which it shrinks
pub const BUFSIZE: usize = 8192;

/// Capacity of the scratch buffer inside a [`FileStreamPipe`]
pub const PIPE_BUFSIZE: usize = 8192;

/// True if the error only means "try again on the next readiness event"
pub(crate) fn is_transient(err: &io::Error) -> bool {
    matches!(
        err.kind(),
        io::ErrorKind::WouldBlock | io::ErrorKind::Interrupted
    )
}
