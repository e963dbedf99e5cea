//! Frame header implementation with zero-copy parsing.
//!
//! The `Header` is a fixed 72-byte structure that is serialized as raw
//! binary (Big Endian). This allows the routing decision (forward,
//! handle locally, or reject) to be made without deserializing any
//! payload.

use zerocopy::{FromBytes, Immutable, IntoBytes, KnownLayout};

use crate::{
    errors::{ProtocolError, Result},
    ids::{ActorId, NodeId},
    HeaderFlags, Operation,
};

/// Fixed 72-byte frame header (Big Endian network byte order)
///
/// All multi-byte integers are stored in Big Endian format. Fields are
/// stored as raw byte arrays to avoid alignment issues with
/// `#[repr(C, packed)]`.
///
/// # Layout
///
/// | offset | size | field |
/// |--------|------|-------|
/// | 0      | 1    | operation |
/// | 1      | 1    | flags |
/// | 2      | 4    | payload_len |
/// | 6      | 8    | operation_data |
/// | 14     | 24   | source_node |
/// | 38     | 24   | dest_node |
/// | 62     | 4    | source_actor |
/// | 66     | 4    | dest_actor |
/// | 70     | 2    | reserved (zero) |
///
/// `operation_data` is overloaded: dispatch frames carry the message id
/// there, handshake frames carry the protocol version, everything else
/// carries zero.
///
/// # Security Properties
///
/// - **Zero-Copy Safety**: The `#[repr(C, packed)]` layout with
///   `zerocopy` traits ensures that this struct can be safely cast from
///   untrusted network bytes. All 72-byte patterns are valid at the
///   type level (no invalid bit patterns); semantic validation happens
///   in [`Header::from_bytes`] and [`Header::valid`].
///
/// - **Length Binding**: `payload_len` must equal the exact number of
///   bytes between this header and the next one in the same buffer.
///   Receivers that observe a mismatch tear the connection down.
#[repr(C, packed)]
#[derive(Clone, Copy, FromBytes, IntoBytes, KnownLayout, Immutable)]
pub struct Header {
    pub(crate) operation: u8,
    flags: u8,
    pub(crate) payload_len: [u8; 4],
    operation_data: [u8; 8],
    source_node: [u8; NodeId::LENGTH],
    dest_node: [u8; NodeId::LENGTH],
    source_actor: [u8; 4],
    dest_actor: [u8; 4],
    reserved: [u8; 2],
}

impl Header {
    /// Size of the serialized header (72 bytes)
    pub const SIZE: usize = 72;

    /// Maximum payload size (16 MB)
    pub const MAX_PAYLOAD_SIZE: u32 = 16 * 1024 * 1024;

    /// Create a new header with `payload_len` zero.
    ///
    /// The payload length is patched in later by the write path (or by
    /// [`Frame::new`](crate::Frame::new)), after the payload has been
    /// serialized and its size is known.
    #[must_use]
    pub fn new(
        operation: Operation,
        flags: HeaderFlags,
        operation_data: u64,
        source_node: NodeId,
        dest_node: NodeId,
        source_actor: ActorId,
        dest_actor: ActorId,
    ) -> Self {
        Self {
            operation: operation.to_u8(),
            flags: flags.to_byte(),
            payload_len: [0u8; 4],
            operation_data: operation_data.to_be_bytes(),
            source_node: *source_node.as_bytes(),
            dest_node: *dest_node.as_bytes(),
            source_actor: source_actor.to_be_bytes(),
            dest_actor: dest_actor.to_be_bytes(),
            reserved: [0u8; 2],
        }
    }

    /// Parse a header from network bytes (zero-copy, safe)
    ///
    /// This function casts raw bytes directly to a `Header` reference
    /// using compile-time layout verification from `zerocopy`. No data
    /// is copied.
    ///
    /// # Errors
    ///
    /// Returns `ProtocolError` if:
    /// - The buffer is too short (< 72 bytes)
    /// - The operation tag is unknown
    /// - A flag bit outside the defined set is set
    /// - A reserved byte is non-zero
    /// - `payload_len` exceeds the maximum
    ///
    /// Cheapest-to-check properties are validated first, so garbage
    /// data fails fast.
    pub fn from_bytes(bytes: &[u8]) -> Result<&Self> {
        let header = Self::ref_from_prefix(bytes)
            .map_err(|_| ProtocolError::FrameTooShort {
                expected: Self::SIZE,
                actual: bytes.len(),
            })?
            .0;

        if Operation::from_u8(header.operation).is_none() {
            return Err(ProtocolError::InvalidOperation(header.operation));
        }

        if HeaderFlags::from_bits(header.flags).is_none() {
            return Err(ProtocolError::InvalidFlags(header.flags));
        }

        if header.reserved != [0u8; 2] {
            return Err(ProtocolError::ReservedBytes);
        }

        let payload_len = u32::from_be_bytes(header.payload_len);
        if payload_len > Self::MAX_PAYLOAD_SIZE {
            return Err(ProtocolError::PayloadTooLarge {
                size: payload_len as usize,
                max: Self::MAX_PAYLOAD_SIZE as usize,
            });
        }

        Ok(header)
    }

    /// Serialize the header to bytes (zero-copy)
    #[must_use]
    #[allow(clippy::wrong_self_convention)] // Common serialization pattern
    pub fn to_bytes(&self) -> [u8; Self::SIZE] {
        let bytes = IntoBytes::as_bytes(self);
        let mut arr = [0u8; Self::SIZE];
        arr.copy_from_slice(bytes);
        arr
    }

    /// Structural validity predicate.
    ///
    /// A header is valid when the operation tag is known, no flag bit
    /// outside the defined set is set, the reserved bytes are zero,
    /// `payload_len` is within the size cap, and operations that carry
    /// no body ([`Operation::Heartbeat`], [`Operation::AnnounceProxy`])
    /// declare a zero payload length.
    #[must_use]
    pub fn valid(&self) -> bool {
        let Some(operation) = self.operation() else {
            return false;
        };
        if HeaderFlags::from_bits(self.flags).is_none() {
            return false;
        }
        if self.reserved != [0u8; 2] {
            return false;
        }
        let payload_len = self.payload_len();
        if payload_len > Self::MAX_PAYLOAD_SIZE {
            return false;
        }
        if operation.requires_empty_payload() && payload_len != 0 {
            return false;
        }
        true
    }

    /// Get the operation as an enum (if the tag is known)
    #[must_use]
    pub fn operation(&self) -> Option<Operation> {
        Operation::from_u8(self.operation)
    }

    /// Get the raw operation tag
    #[must_use]
    pub fn operation_raw(&self) -> u8 {
        self.operation
    }

    /// Get the frame flags
    #[must_use]
    pub fn flags(&self) -> HeaderFlags {
        HeaderFlags::from_byte(self.flags)
    }

    /// Whether a given flag is set
    #[must_use]
    pub fn has(&self, flag: HeaderFlags) -> bool {
        self.flags().contains(flag)
    }

    /// Get the payload length
    #[must_use]
    pub fn payload_len(&self) -> u32 {
        u32::from_be_bytes(self.payload_len)
    }

    /// Set the payload length. Used by the write path when the header
    /// is back-patched after payload serialization.
    pub fn set_payload_len(&mut self, len: u32) {
        self.payload_len = len.to_be_bytes();
    }

    /// Get the operation data (message id or handshake version)
    #[must_use]
    pub fn operation_data(&self) -> u64 {
        u64::from_be_bytes(self.operation_data)
    }

    /// Get the originating node, or [`NodeId::NONE`]
    #[must_use]
    pub fn source_node(&self) -> NodeId {
        NodeId::from_bytes(self.source_node)
    }

    /// Get the terminal node, or [`NodeId::NONE`] for broadcast and
    /// unrouted frames
    #[must_use]
    pub fn dest_node(&self) -> NodeId {
        NodeId::from_bytes(self.dest_node)
    }

    /// Get the originating actor id, or the invalid sentinel
    #[must_use]
    pub fn source_actor(&self) -> ActorId {
        u32::from_be_bytes(self.source_actor)
    }

    /// Get the terminal actor id, or the invalid sentinel
    #[must_use]
    pub fn dest_actor(&self) -> ActorId {
        u32::from_be_bytes(self.dest_actor)
    }

    /// Whether this frame is part of the connection handshake
    #[must_use]
    pub fn is_handshake(&self) -> bool {
        self.operation().is_some_and(Operation::is_handshake)
    }

    /// Whether this frame is a keepalive
    #[must_use]
    pub fn is_heartbeat(&self) -> bool {
        self.operation().is_some_and(Operation::is_heartbeat)
    }
}

// Manual Debug implementation (can't derive due to packed repr)
impl std::fmt::Debug for Header {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Header")
            .field("operation", &format!("{:#04x}", self.operation_raw()))
            .field("flags", &self.flags())
            .field("payload_len", &self.payload_len())
            .field("operation_data", &self.operation_data())
            .field("source_node", &self.source_node())
            .field("dest_node", &self.dest_node())
            .field("source_actor", &self.source_actor())
            .field("dest_actor", &self.dest_actor())
            .finish_non_exhaustive()
    }
}

// Manual PartialEq implementation (can't derive due to packed repr)
impl PartialEq for Header {
    fn eq(&self, other: &Self) -> bool {
        self.to_bytes() == other.to_bytes()
    }
}

impl Eq for Header {}
