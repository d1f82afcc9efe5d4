//! Length-prefixed frame codec for the chat wire protocol.
//!
//! Every frame on the wire is `[4-byte big-endian length][payload]`. The
//! codec splits the inbound byte stream into discrete payloads and wraps
//! outbound payloads, enforcing the size bound in both directions before
//! any buffer is touched: an oversized outbound payload is rejected with
//! no partial write, and an oversized inbound prefix is rejected without
//! consuming any of the payload that may follow it.
//!
//! End-of-stream handling distinguishes a clean close at a frame boundary
//! (normal termination, surfaced as the end of the stream) from truncation
//! mid-header or mid-frame (surfaced as [`CodecError::Closed`] with a
//! [`CloseReason`] recording what arrived).

use bytes::{Buf, Bytes, BytesMut};
use tokio_util::codec::{Decoder, Encoder};

pub mod error;

pub use error::{CloseReason, CodecError, ProtocolError};

/// Length prefix size in bytes (big-endian u32).
pub const LENGTH_HEADER_SIZE: usize = 4;

/// Minimum frame payload limit in bytes.
///
/// Limits passed to [`FrameCodec::new`] are clamped to at least this value
/// so a frame can always carry a small envelope.
pub const MIN_FRAME_LENGTH: usize = 64;

/// Maximum frame payload limit in bytes (1 MiB).
pub const MAX_FRAME_LENGTH: usize = 1024 * 1024;

pub(crate) fn clamp_frame_length(value: usize) -> usize {
    value.clamp(MIN_FRAME_LENGTH, MAX_FRAME_LENGTH)
}

/// Codec turning a byte stream into discrete length-prefixed payloads.
#[derive(Clone, Debug)]
pub struct FrameCodec {
    max_frame_length: usize,
}

impl FrameCodec {
    /// Construct a codec with a maximum payload length, clamped to
    /// `[MIN_FRAME_LENGTH, MAX_FRAME_LENGTH]`.
    #[must_use]
    pub fn new(max_frame_length: usize) -> Self {
        Self {
            max_frame_length: clamp_frame_length(max_frame_length),
        }
    }

    /// Maximum payload length this codec will accept.
    #[must_use]
    pub fn max_frame_length(&self) -> usize { self.max_frame_length }

    fn peek_len(src: &[u8]) -> Option<usize> {
        let header: [u8; LENGTH_HEADER_SIZE] = src.get(..LENGTH_HEADER_SIZE)?.try_into().ok()?;
        Some(u32::from_be_bytes(header) as usize)
    }
}

impl Default for FrameCodec {
    fn default() -> Self { Self::new(MAX_FRAME_LENGTH) }
}

impl Decoder for FrameCodec {
    type Item = Bytes;
    type Error = CodecError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Bytes>, CodecError> {
        let Some(len) = Self::peek_len(src) else {
            return Ok(None);
        };
        if len > self.max_frame_length {
            return Err(CodecError::SizeExceeded {
                size: len,
                max: self.max_frame_length,
            });
        }
        if src.len() < LENGTH_HEADER_SIZE + len {
            src.reserve(LENGTH_HEADER_SIZE + len - src.len());
            return Ok(None);
        }
        src.advance(LENGTH_HEADER_SIZE);
        Ok(Some(src.split_to(len).freeze()))
    }

    fn decode_eof(&mut self, src: &mut BytesMut) -> Result<Option<Bytes>, CodecError> {
        if let Some(frame) = self.decode(src)? {
            return Ok(Some(frame));
        }
        if src.is_empty() {
            // Clean close: no data remaining at a frame boundary.
            return Ok(None);
        }
        Err(match Self::peek_len(src) {
            Some(expected) => CloseReason::MidFrame {
                bytes_received: src.len() - LENGTH_HEADER_SIZE,
                expected,
            }
            .into(),
            None => CloseReason::MidHeader {
                bytes_received: src.len(),
                header_size: LENGTH_HEADER_SIZE,
            }
            .into(),
        })
    }
}

impl Encoder<Bytes> for FrameCodec {
    type Error = CodecError;

    fn encode(&mut self, item: Bytes, dst: &mut BytesMut) -> Result<(), CodecError> {
        if item.len() > self.max_frame_length {
            return Err(CodecError::SizeExceeded {
                size: item.len(),
                max: self.max_frame_length,
            });
        }
        #[expect(
            clippy::cast_possible_truncation,
            reason = "length validated against max_frame_length, well below u32::MAX"
        )]
        let len = item.len() as u32;
        dst.reserve(LENGTH_HEADER_SIZE + item.len());
        dst.extend_from_slice(&len.to_be_bytes());
        dst.extend_from_slice(&item);
        Ok(())
    }
}

#[cfg(test)]
mod tests;
