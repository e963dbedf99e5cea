//! Observability hook set.
//!
//! Hooks are fire-and-forget notifications about traffic-level events.
//! Unlike [`Callee`](crate::Callee) methods they carry no obligations;
//! every method has a no-op default so observers implement only what
//! they care about.

use std::collections::BTreeSet;

use basp_proto::{ActorId, ActorRef, Header, MessageId, NodeId};

/// Observable stream of instance events.
pub trait Hooks {
    /// A frame addressed to another node was re-emitted on a route.
    fn message_forwarded(&mut self, header: &Header, payload: Option<&[u8]>) {
        let _ = (header, payload);
    }

    /// A frame addressed to another node had no route.
    fn message_forwarding_failed(&mut self, header: &Header, payload: Option<&[u8]>) {
        let _ = (header, payload);
    }

    /// An outbound dispatch was written and flushed.
    fn message_sent(
        &mut self,
        sender: Option<&ActorRef>,
        next_hop: NodeId,
        receiver: &ActorRef,
        message_id: MessageId,
        message: &[u8],
    ) {
        let _ = (sender, next_hop, receiver, message_id, message);
    }

    /// An outbound dispatch had no route to the receiver's node.
    fn message_sending_failed(
        &mut self,
        sender: Option<&ActorRef>,
        receiver: &ActorRef,
        message_id: MessageId,
        message: &[u8],
    ) {
        let _ = (sender, receiver, message_id, message);
    }

    /// A local actor was published at a port.
    fn actor_published(&mut self, actor: ActorId, interfaces: &BTreeSet<String>, port: u16) {
        let _ = (actor, interfaces, port);
    }
}

/// Hook set that ignores every event.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopHooks;

impl Hooks for NoopHooks {}
