//! Operation tags for BASP frames.
//!
//! The operation identifies what a frame means and how its payload must
//! be interpreted. Handshake operations come in a stream flavor and a
//! datagram flavor because the two transport families frame their
//! handshakes differently.

/// Frame operation tags
///
/// # Representation
///
/// Operations are serialized as a single byte at offset 0 of the frame
/// header. The `#[repr(u8)]` ensures stable numeric values for wire
/// compatibility.
///
/// # Security
///
/// - **Unknown Tags**: The `from_u8` method returns `None` for unknown
///   values rather than panicking. Frames with unknown tags are
///   rejected with [`ProtocolError::InvalidOperation`](crate::ProtocolError::InvalidOperation).
///
/// - **No Implicit Behavior**: Each operation must be explicitly
///   handled; there is no "default" behavior for unknown tags.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum Operation {
    /// First frame on a fresh stream connection, sent by the accepting
    /// side; carries the published-actor info of the server
    ServerHandshake = 0x00,
    /// Response to a server handshake; carries the application id
    ClientHandshake = 0x01,
    /// Datagram flavor of the server handshake
    UdpServerHandshake = 0x02,
    /// Datagram flavor of the client handshake
    UdpClientHandshake = 0x03,
    /// An actor message routed to a terminal node
    DispatchMessage = 0x04,
    /// A proxy for a remote actor was created
    AnnounceProxy = 0x05,
    /// A proxy for a remote actor must be destroyed
    KillProxy = 0x06,
    /// Keepalive
    Heartbeat = 0x07,
}

impl Operation {
    /// Convert to the raw wire value.
    #[must_use]
    pub const fn to_u8(self) -> u8 {
        self as u8
    }

    /// Convert from the raw wire value.
    ///
    /// Returns `None` if the value doesn't correspond to a known
    /// operation. Unknown tags MUST be treated as protocol errors, not
    /// silently ignored.
    #[must_use]
    pub const fn from_u8(value: u8) -> Option<Self> {
        match value {
            0x00 => Some(Self::ServerHandshake),
            0x01 => Some(Self::ClientHandshake),
            0x02 => Some(Self::UdpServerHandshake),
            0x03 => Some(Self::UdpClientHandshake),
            0x04 => Some(Self::DispatchMessage),
            0x05 => Some(Self::AnnounceProxy),
            0x06 => Some(Self::KillProxy),
            0x07 => Some(Self::Heartbeat),
            _ => None,
        }
    }

    /// Whether this operation is part of the connection handshake.
    ///
    /// Handshake frames are always handled locally, never forwarded.
    #[must_use]
    pub const fn is_handshake(self) -> bool {
        matches!(
            self,
            Self::ServerHandshake
                | Self::ClientHandshake
                | Self::UdpServerHandshake
                | Self::UdpClientHandshake
        )
    }

    /// Whether this operation is a keepalive.
    #[must_use]
    pub const fn is_heartbeat(self) -> bool {
        matches!(self, Self::Heartbeat)
    }

    /// Whether this operation carries no body. A non-zero `payload_len`
    /// on such a frame fails the header validity predicate.
    #[must_use]
    pub const fn requires_empty_payload(self) -> bool {
        matches!(self, Self::AnnounceProxy | Self::Heartbeat)
    }
}
