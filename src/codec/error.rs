//! Error types for the wire layer.
//!
//! The taxonomy separates frame-size violations, envelope-level protocol
//! errors, transport I/O failures, and end-of-stream conditions. A clean
//! close at a frame boundary is a normal termination, not a fault; the
//! [`CodecError::is_clean_close`] helper lets callers pick the right log
//! level without matching the whole enum.

use std::io;

use thiserror::Error;

/// How a peer's end-of-stream was observed.
#[derive(Clone, Copy, Debug, Error, PartialEq, Eq)]
pub enum CloseReason {
    /// Clean EOF at a frame boundary.
    #[error("connection closed cleanly at frame boundary")]
    Clean,

    /// EOF while the length prefix was still incomplete.
    #[error("premature EOF during header: {bytes_received} of {header_size} header bytes")]
    MidHeader {
        /// Header bytes received before EOF.
        bytes_received: usize,
        /// Expected header size.
        header_size: usize,
    },

    /// EOF after the prefix but before the full payload arrived.
    #[error("premature EOF: {bytes_received} bytes of {expected} byte frame received")]
    MidFrame {
        /// Payload bytes received before EOF.
        bytes_received: usize,
        /// Payload size announced by the length prefix.
        expected: usize,
    },
}

/// Envelope-level violations detected after frame extraction.
#[derive(Debug, Error)]
pub enum ProtocolError {
    /// Payload is not a well-formed envelope: bad JSON or an unrecognised
    /// kind. Unknown kinds are rejected, never coerced to a default.
    #[error("malformed envelope: {0}")]
    MalformedEnvelope(#[from] serde_json::Error),
}

/// Top-level error taxonomy for the wire layer.
#[derive(Debug, Error)]
pub enum CodecError {
    /// Frame payload over the configured maximum.
    #[error("frame exceeds max length: {size} > {max}")]
    SizeExceeded {
        /// Payload size announced or submitted.
        size: usize,
        /// Maximum allowed payload size.
        max: usize,
    },

    /// Malformed frame contents or unrecognised envelope kind.
    #[error("protocol error: {0}")]
    Protocol(#[from] ProtocolError),

    /// Transport layer I/O failure.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// The peer closed the stream.
    #[error("{0}")]
    Closed(#[from] CloseReason),
}

impl CodecError {
    /// Returns true if this error represents a clean connection close.
    ///
    /// A clean close occurs at a frame boundary; no data was lost and
    /// nothing beyond a debug log is warranted.
    #[must_use]
    pub fn is_clean_close(&self) -> bool { matches!(self, Self::Closed(CloseReason::Clean)) }
}
