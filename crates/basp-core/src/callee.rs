//! Upper-layer capability set.
//!
//! The instance never touches the actor system directly. Everything it
//! needs from above (message delivery, proxy lifecycle, peer state
//! bookkeeping, configuration) is expressed as a method on [`Callee`],
//! so a test double satisfies the contract directly.

use std::collections::BTreeSet;

use basp_proto::{payloads::proxy::ExitReason, ActorId, ActorRef, MessageId, NodeId};

/// Terminal addressee of a delivered message.
///
/// Remote senders either address a concrete actor id or a well-known
/// name registered with the local actor system.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Receiver {
    /// Deliver to the actor with this id
    Actor(ActorId),
    /// Deliver to the actor registered under this name
    Named(u64),
}

/// Capabilities the protocol instance consumes from the layer above.
///
/// Errors are never propagated back through these methods; the
/// instance surfaces failures as connection closure or hook
/// notifications instead.
pub trait Callee {
    /// Application identifier compared byte-exactly in every handshake.
    fn app_identifier(&self) -> &str;

    /// A direct route to `node` was installed.
    fn learned_new_node_directly(&mut self, node: NodeId);

    /// A route to `node` through another peer became known.
    ///
    /// Reserved: the current dispatch path never learns nodes
    /// indirectly.
    fn learned_new_node_indirectly(&mut self, node: NodeId);

    /// A structurally complete handshake from `node` was processed.
    ///
    /// Invoked even when the connection is subsequently dropped
    /// (duplicate route, handshake to self), so the upper layer can
    /// record the peer's published actor either way.
    fn finalize_handshake(&mut self, node: NodeId, actor: ActorId, interfaces: BTreeSet<String>);

    /// All state keyed by `node` must be discarded.
    fn purge_state(&mut self, node: NodeId);

    /// The peer created a proxy for local actor `actor`.
    fn proxy_announced(&mut self, node: NodeId, actor: ActorId);

    /// The proxy for remote actor `actor` must be destroyed.
    fn kill_proxy(&mut self, node: NodeId, actor: ActorId, reason: ExitReason);

    /// Deliver an inbound actor message to its terminal receiver.
    #[allow(clippy::too_many_arguments)]
    fn deliver(
        &mut self,
        source_node: NodeId,
        source_actor: ActorId,
        receiver: Receiver,
        message_id: MessageId,
        forwarding_stack: Vec<ActorRef>,
        message: Vec<u8>,
    );

    /// A heartbeat from `node` arrived.
    fn handle_heartbeat(&mut self, node: NodeId);
}
