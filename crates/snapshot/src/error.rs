use std::io;

use thiserror::Error;

/// Errors surfaced to the consensus transport.
#[derive(Debug, Error)]
pub enum Error {
    #[error("invalid argument: {reason}")]
    InvalidArgument { reason: String },

    /// Open of a virtual file under a snapshot path that was never
    /// introduced via `open_snapshot`.
    #[error("snapshot not found: {path}")]
    NotFound { path: String },

    /// Another reader currently holds the iterator context.
    #[error("file in use: {path}")]
    InUse { path: String },

    #[error("file closed: {path}")]
    Closed { path: String },

    /// The framed stream delivered a key not greater than its predecessor.
    #[error("out-of-order key in bulk-load stream")]
    OutOfOrderKey,

    #[error("operation `{op}` not supported by this file adaptor")]
    Unsupported { op: &'static str },

    #[error(transparent)]
    Frame(#[from] Frame),

    #[error(transparent)]
    Io(#[from] io::Error),
}

/// Truncated or malformed length-prefixed framing.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum Frame {
    #[error("truncated length prefix at byte {at}")]
    TruncatedLen { at: usize },
    #[error("truncated chunk at byte {at}: expected {expected} bytes, {remaining} available")]
    TruncatedChunk {
        at: usize,
        expected: usize,
        remaining: usize,
    },
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
