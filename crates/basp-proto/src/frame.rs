//! Frame type combining header and payload.
//!
//! A `Frame` is the transport-layer packet consisting of:
//! - 72-byte raw binary header (Big Endian)
//! - Variable-length raw bytes (already encoded)
//!
//! This is a pure data holder (header + bytes). For high-level logic,
//! see `Payload::into_frame()` and `Payload::from_frame()`.

use bytes::{BufMut, Bytes};

use crate::{
    errors::{ProtocolError, Result},
    Header,
};

/// Complete protocol frame (transport layer)
///
/// Layout on the wire:
/// `[Header: 72 bytes, raw binary] + [payload: variable bytes]`
///
/// This type holds raw bytes, NOT the `Payload` enum. This allows a
/// node to forward frames without deserializing the payload.
///
/// # Invariants
///
/// - **Size Consistency**: `payload.len()` MUST match
///   `header.payload_len()`. This invariant is enforced by
///   [`Frame::new`] and verified by [`Frame::decode`].
///
/// - **Size Limit**: `payload.len()` MUST NOT exceed
///   [`Header::MAX_PAYLOAD_SIZE`] (16 MB). Violations are rejected
///   during encoding.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    /// Frame header (72 bytes)
    pub header: Header,

    /// Raw payload bytes (already CBOR-encoded)
    pub payload: Bytes,
}

impl Frame {
    /// Create a new frame with automatic payload_len calculation
    ///
    /// The header's `payload_len` field is automatically set to match
    /// the actual payload length, ensuring consistency.
    ///
    /// The constructor does NOT enforce the 16 MB cap; oversized
    /// frames are rejected later by [`Frame::encode`]. This allows
    /// constructing frames for testing without artificial limits.
    #[must_use]
    pub fn new(mut header: Header, payload: impl Into<Bytes>) -> Self {
        let payload = payload.into();

        #[allow(clippy::cast_possible_truncation)]
        {
            header.payload_len = (payload.len() as u32).to_be_bytes();
        }

        Self { header, payload }
    }

    /// Encode frame into buffer (simple copy, no magic)
    ///
    /// Writes: `[header (72 bytes)] + [payload (variable)]`
    ///
    /// # Errors
    ///
    /// Returns [`ProtocolError::PayloadTooLarge`] if the payload exceeds
    /// [`Header::MAX_PAYLOAD_SIZE`] (16 MB).
    pub fn encode(&self, dst: &mut impl BufMut) -> Result<()> {
        if self.payload.len() > Header::MAX_PAYLOAD_SIZE as usize {
            return Err(ProtocolError::PayloadTooLarge {
                size: self.payload.len(),
                max: Header::MAX_PAYLOAD_SIZE as usize,
            });
        }

        dst.put_slice(&self.header.to_bytes());
        dst.put_slice(&self.payload);

        Ok(())
    }

    /// Decode a frame from wire format
    ///
    /// Returns a Frame with raw bytes (does NOT deserialize the
    /// payload). Use `Payload::from_frame()` for the high-level enum.
    /// Only `Header::SIZE + payload_len` bytes are read; trailing data
    /// is ignored, which is what lets datagram receivers parse several
    /// concatenated frames out of one buffer.
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - Header parsing fails (unknown tag, bad flags, size limits)
    /// - The payload is truncated (fewer bytes than the header claims)
    pub fn decode(bytes: &[u8]) -> Result<Self> {
        let header = Header::from_bytes(bytes)?;

        let payload_len = header.payload_len() as usize;
        let total_size = Header::SIZE + payload_len;

        if bytes.len() < total_size {
            return Err(ProtocolError::FrameTruncated {
                expected: payload_len,
                actual: bytes.len().saturating_sub(Header::SIZE),
            });
        }

        let payload = Bytes::copy_from_slice(&bytes[Header::SIZE..total_size]);

        Ok(Self { header: *header, payload })
    }

    /// Total encoded size of this frame in bytes.
    #[must_use]
    pub fn wire_len(&self) -> usize {
        Header::SIZE + self.payload.len()
    }
}
