//! Handshake payload types.
//!
//! Both transport families exchange the same two payload shapes; only
//! the operation tag differs between the stream and datagram flavors.

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

use crate::ids::ActorId;

/// Payload of a server handshake (stream or datagram flavor).
///
/// Sent by the side that accepted the connection. Besides the
/// application identifier, it advertises the actor published at the
/// contacted port so the connecting side can bind to it immediately.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServerHandshake {
    /// Application identifier, compared byte-exactly by the peer
    pub app_id: String,
    /// Id of the actor published at the contacted port, or the invalid
    /// sentinel when nothing is published there
    pub actor: ActorId,
    /// Interface signatures of the published actor
    pub interfaces: BTreeSet<String>,
}

/// Payload of a client handshake (stream or datagram flavor).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClientHandshake {
    /// Application identifier, compared byte-exactly by the peer
    pub app_id: String,
}
