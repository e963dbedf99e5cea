//! Dispatch payload type.

use serde::{Deserialize, Serialize};

use crate::ids::ActorRef;

/// Payload of a dispatched actor message.
///
/// The user message itself is opaque: this layer carries it as raw
/// bytes with a declared length and never interprets it. Serialization
/// of actor messages belongs to the actor system above.
///
/// `receiver_name` is present exactly when the header has the
/// named-receiver flag set; the receiving state machine rejects frames
/// where flag and payload disagree.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Dispatch {
    /// Well-known receiver name, replacing `dest_actor` addressing
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub receiver_name: Option<u64>,
    /// Hops through which the request should travel back
    pub forwarding_stack: Vec<ActorRef>,
    /// Opaque user message bytes
    pub message: Vec<u8>,
}
