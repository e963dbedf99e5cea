//! Shared test doubles and frame helpers for the integration suites.

#![allow(dead_code)]

use std::collections::BTreeSet;

use basp_core::{
    Callee, ConnectionHandle, ConnectionState, Hooks, Instance, Receiver, StreamHandle,
};
use basp_proto::{
    payloads::proxy::ExitReason, ActorId, ActorRef, Frame, Header, HeaderFlags, MessageId, NodeId,
    Operation,
};
use bytes::Bytes;

/// Application identifier shared by all test peers.
pub const APP_ID: &str = "basp/test";

pub fn node(tag: u8) -> NodeId {
    NodeId::from_parts([tag; 20], u32::from(tag))
}

pub fn stream(id: u64) -> StreamHandle {
    StreamHandle(id)
}

/// Everything the instance asked the upper layer to do, in order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CalleeEvent {
    LearnedDirectly(NodeId),
    LearnedIndirectly(NodeId),
    Finalized {
        node: NodeId,
        actor: ActorId,
        interfaces: BTreeSet<String>,
    },
    Purged(NodeId),
    ProxyAnnounced {
        node: NodeId,
        actor: ActorId,
    },
    ProxyKilled {
        node: NodeId,
        actor: ActorId,
        reason: ExitReason,
    },
    Delivered {
        source_node: NodeId,
        source_actor: ActorId,
        receiver: Receiver,
        message_id: MessageId,
        forwarding_stack: Vec<ActorRef>,
        message: Vec<u8>,
    },
    Heartbeat(NodeId),
}

/// Callee double that records every invocation.
#[derive(Debug)]
pub struct RecordingCallee {
    pub app_id: String,
    pub events: Vec<CalleeEvent>,
}

impl RecordingCallee {
    pub fn new() -> Self {
        Self { app_id: APP_ID.to_string(), events: Vec::new() }
    }

    pub fn purged(&self) -> Vec<NodeId> {
        self.events
            .iter()
            .filter_map(|e| match e {
                CalleeEvent::Purged(n) => Some(*n),
                _ => None,
            })
            .collect()
    }

    pub fn contains_purge(&self, node: NodeId) -> bool {
        self.purged().contains(&node)
    }
}

impl Default for RecordingCallee {
    fn default() -> Self {
        Self::new()
    }
}

impl Callee for RecordingCallee {
    fn app_identifier(&self) -> &str {
        &self.app_id
    }

    fn learned_new_node_directly(&mut self, node: NodeId) {
        self.events.push(CalleeEvent::LearnedDirectly(node));
    }

    fn learned_new_node_indirectly(&mut self, node: NodeId) {
        self.events.push(CalleeEvent::LearnedIndirectly(node));
    }

    fn finalize_handshake(&mut self, node: NodeId, actor: ActorId, interfaces: BTreeSet<String>) {
        self.events.push(CalleeEvent::Finalized { node, actor, interfaces });
    }

    fn purge_state(&mut self, node: NodeId) {
        self.events.push(CalleeEvent::Purged(node));
    }

    fn proxy_announced(&mut self, node: NodeId, actor: ActorId) {
        self.events.push(CalleeEvent::ProxyAnnounced { node, actor });
    }

    fn kill_proxy(&mut self, node: NodeId, actor: ActorId, reason: ExitReason) {
        self.events.push(CalleeEvent::ProxyKilled { node, actor, reason });
    }

    fn deliver(
        &mut self,
        source_node: NodeId,
        source_actor: ActorId,
        receiver: Receiver,
        message_id: MessageId,
        forwarding_stack: Vec<ActorRef>,
        message: Vec<u8>,
    ) {
        self.events.push(CalleeEvent::Delivered {
            source_node,
            source_actor,
            receiver,
            message_id,
            forwarding_stack,
            message,
        });
    }

    fn handle_heartbeat(&mut self, node: NodeId) {
        self.events.push(CalleeEvent::Heartbeat(node));
    }
}

/// Hook events, reduced to what the tests compare against.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HookEvent {
    Forwarded { dest: NodeId, payload: Option<Vec<u8>> },
    ForwardingFailed { dest: NodeId },
    Sent { receiver: ActorRef, message_id: MessageId },
    SendingFailed { receiver: ActorRef, message_id: MessageId },
    ActorPublished { actor: ActorId, port: u16 },
}

/// Hook double that records every notification.
#[derive(Debug, Default)]
pub struct RecordingHooks {
    pub events: Vec<HookEvent>,
}

impl Hooks for RecordingHooks {
    fn message_forwarded(&mut self, header: &Header, payload: Option<&[u8]>) {
        self.events.push(HookEvent::Forwarded {
            dest: header.dest_node(),
            payload: payload.map(<[u8]>::to_vec),
        });
    }

    fn message_forwarding_failed(&mut self, header: &Header, _payload: Option<&[u8]>) {
        self.events.push(HookEvent::ForwardingFailed { dest: header.dest_node() });
    }

    fn message_sent(
        &mut self,
        _sender: Option<&ActorRef>,
        _next_hop: NodeId,
        receiver: &ActorRef,
        message_id: MessageId,
        _message: &[u8],
    ) {
        self.events.push(HookEvent::Sent { receiver: *receiver, message_id });
    }

    fn message_sending_failed(
        &mut self,
        _sender: Option<&ActorRef>,
        receiver: &ActorRef,
        message_id: MessageId,
        _message: &[u8],
    ) {
        self.events.push(HookEvent::SendingFailed { receiver: *receiver, message_id });
    }

    fn actor_published(&mut self, actor: ActorId, _interfaces: &BTreeSet<String>, port: u16) {
        self.events.push(HookEvent::ActorPublished { actor, port });
    }
}

/// Scratch header for the broker's per-connection state.
pub fn scratch_header() -> Header {
    Header::new(
        Operation::Heartbeat,
        HeaderFlags::empty(),
        0,
        NodeId::NONE,
        NodeId::NONE,
        0,
        0,
    )
}

/// Drive a full frame through the stream automaton: header phase, then
/// payload phase when requested.
pub fn feed_stream<C: Callee, H: Hooks>(
    instance: &mut Instance<H>,
    callee: &mut C,
    handle: StreamHandle,
    frame: &Frame,
) -> ConnectionState {
    let mut header = scratch_header();
    let header_bytes = frame.header.to_bytes();
    let state = instance.handle_stream(callee, handle, &mut header, &header_bytes, false);
    if state != ConnectionState::AwaitPayload {
        return state;
    }
    instance.handle_stream(callee, handle, &mut header, &frame.payload, true)
}

/// Concatenated flushed bytes for one handle, preserving flush order.
pub fn flushed_bytes(flushed: &[(ConnectionHandle, Bytes)], handle: ConnectionHandle) -> Vec<u8> {
    let mut out = Vec::new();
    for (h, bytes) in flushed {
        if *h == handle {
            out.extend_from_slice(bytes);
        }
    }
    out
}

/// Split a byte stream into frames.
pub fn decode_frames(mut bytes: &[u8]) -> Vec<Frame> {
    let mut frames = Vec::new();
    while !bytes.is_empty() {
        let frame = Frame::decode(bytes).expect("well-formed frame stream");
        bytes = &bytes[frame.wire_len()..];
        frames.push(frame);
    }
    frames
}
