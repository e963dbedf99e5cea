//! CBOR-encoded frame payloads.
//!
//! Each operation has a corresponding payload shape. The `Payload` enum
//! provides type-safe payload handling with automatic CBOR
//! serialization.
//!
//! # Design Rationale
//!
//! ## Why CBOR Instead of Raw Binary?
//!
//! - **Forward Compatibility**: CBOR allows adding optional fields
//!   without breaking old peers. Raw binary formats require version
//!   negotiation for every schema change.
//!
//! - **Type Safety**: CBOR preserves type information, which prevents
//!   interpretation errors and simplifies debugging.
//!
//! - **Performance Trade-off**: A forwarding node never deserializes
//!   payloads; only the terminal node does. The header alone carries
//!   everything routing needs.
//!
//! ## Security Properties
//!
//! - **Bounded Deserialization**: Payloads are validated against the
//!   16 MB size limit before CBOR parsing begins.
//!
//! - **No Variant Tag**: The frame header's operation field already
//!   identifies the payload type, so the variant discriminator is NOT
//!   serialized. Mismatched operation/payload pairs cannot be smuggled.
//!
//! - **Explicit Schema**: Each payload type is an explicit Rust struct.
//!   There is no "generic map" parsing that could accept unexpected
//!   fields.

pub mod handshake;
pub mod message;
pub mod proxy;

use bytes::BufMut;

use crate::{
    errors::{ProtocolError, Result},
    Frame, Header, Operation,
};

/// All possible frame payloads
///
/// The payload type is determined by the operation tag in the frame
/// header, so we serialize only the inner struct content (no variant
/// tag in CBOR).
///
/// # Invariants
///
/// - **Operation Uniqueness**: Each payload variant corresponds to
///   exactly one [`Operation`]; [`Payload::operation`] returns it.
///
/// - **Serialization Consistency**: Encoding a `Payload` and decoding
///   it with the same operation MUST produce an equivalent value. This
///   is verified by round-trip tests.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Payload {
    /// Server side of the stream handshake
    ServerHandshake(handshake::ServerHandshake),
    /// Client side of the stream handshake
    ClientHandshake(handshake::ClientHandshake),
    /// Server side of the datagram handshake
    UdpServerHandshake(handshake::ServerHandshake),
    /// Client side of the datagram handshake
    UdpClientHandshake(handshake::ClientHandshake),
    /// A routed actor message
    Dispatch(message::Dispatch),
    /// Proxy created for a remote actor (zero-byte payload)
    AnnounceProxy,
    /// Proxy must be destroyed, with the exit reason
    KillProxy(proxy::ExitReason),
    /// Keepalive (zero-byte payload)
    Heartbeat,
}

impl Payload {
    /// Get the operation tag for this payload variant
    #[must_use]
    pub const fn operation(&self) -> Operation {
        match self {
            Self::ServerHandshake(_) => Operation::ServerHandshake,
            Self::ClientHandshake(_) => Operation::ClientHandshake,
            Self::UdpServerHandshake(_) => Operation::UdpServerHandshake,
            Self::UdpClientHandshake(_) => Operation::UdpClientHandshake,
            Self::Dispatch(_) => Operation::DispatchMessage,
            Self::AnnounceProxy => Operation::AnnounceProxy,
            Self::KillProxy(_) => Operation::KillProxy,
            Self::Heartbeat => Operation::Heartbeat,
        }
    }

    /// Encode the payload into a buffer (zero intermediate allocation)
    ///
    /// Serializes only the inner struct, NOT the variant tag. The frame
    /// header's operation field already identifies the payload type.
    ///
    /// # Errors
    ///
    /// Returns [`ProtocolError::CborEncode`] if serialization fails.
    pub fn encode(&self, dst: &mut impl BufMut) -> Result<()> {
        let mut writer = dst.writer();

        match self {
            Self::ServerHandshake(inner) | Self::UdpServerHandshake(inner) => {
                ciborium::ser::into_writer(inner, &mut writer)
            }
            Self::ClientHandshake(inner) | Self::UdpClientHandshake(inner) => {
                ciborium::ser::into_writer(inner, &mut writer)
            }
            Self::Dispatch(inner) => ciborium::ser::into_writer(inner, &mut writer),
            Self::KillProxy(inner) => ciborium::ser::into_writer(inner, &mut writer),
            Self::AnnounceProxy | Self::Heartbeat => Ok(()), // Zero-byte payloads
        }
        .map_err(|e| ProtocolError::CborEncode(e.to_string()))
    }

    /// Decode a payload from bytes based on the operation tag
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - `bytes.len() > MAX_PAYLOAD_SIZE` (16 MB)
    /// - CBOR deserialization fails
    pub fn decode(operation: Operation, bytes: &[u8]) -> Result<Self> {
        if bytes.len() > Header::MAX_PAYLOAD_SIZE as usize {
            return Err(ProtocolError::PayloadTooLarge {
                size: bytes.len(),
                max: Header::MAX_PAYLOAD_SIZE as usize,
            });
        }

        let payload = match operation {
            Operation::ServerHandshake => Self::ServerHandshake(
                ciborium::de::from_reader(bytes)
                    .map_err(|e| ProtocolError::CborDecode(e.to_string()))?,
            ),
            Operation::ClientHandshake => Self::ClientHandshake(
                ciborium::de::from_reader(bytes)
                    .map_err(|e| ProtocolError::CborDecode(e.to_string()))?,
            ),
            Operation::UdpServerHandshake => Self::UdpServerHandshake(
                ciborium::de::from_reader(bytes)
                    .map_err(|e| ProtocolError::CborDecode(e.to_string()))?,
            ),
            Operation::UdpClientHandshake => Self::UdpClientHandshake(
                ciborium::de::from_reader(bytes)
                    .map_err(|e| ProtocolError::CborDecode(e.to_string()))?,
            ),
            Operation::DispatchMessage => Self::Dispatch(
                ciborium::de::from_reader(bytes)
                    .map_err(|e| ProtocolError::CborDecode(e.to_string()))?,
            ),
            Operation::AnnounceProxy => Self::AnnounceProxy,
            Operation::KillProxy => Self::KillProxy(
                ciborium::de::from_reader(bytes)
                    .map_err(|e| ProtocolError::CborDecode(e.to_string()))?,
            ),
            Operation::Heartbeat => Self::Heartbeat,
        };

        Ok(payload)
    }

    /// Convert the payload into a transport frame
    ///
    /// This method handles the logic-to-transport conversion:
    /// - Encodes the payload to CBOR bytes
    /// - Sets the matching operation tag in the header
    /// - Creates a Frame with automatic payload_len calculation
    ///
    /// # Errors
    ///
    /// Returns [`ProtocolError::CborEncode`] if serialization fails.
    pub fn into_frame(self, mut header: Header) -> Result<Frame> {
        let mut buf = Vec::new();
        self.encode(&mut buf)?;
        header.operation = self.operation().to_u8();
        Ok(Frame::new(header, buf))
    }

    /// Parse a payload from a raw transport frame
    ///
    /// # Errors
    ///
    /// Returns an error if the operation tag is unknown or CBOR
    /// deserialization fails.
    pub fn from_frame(frame: Frame) -> Result<Self> {
        let operation = frame
            .header
            .operation()
            .ok_or(ProtocolError::InvalidOperation(frame.header.operation_raw()))?;
        Self::decode(operation, &frame.payload)
    }
}
