//! The per-node protocol instance.
//!
//! This module implements the engine that binds a local actor system to
//! remote peers: the receive automata for both transport families, the
//! peer write path, and the facade operations the layer above calls
//! (dispatch, heartbeat tick, node shutdown, actor publication).
//!
//! # Receive automaton
//!
//! Stream connections are driven by a two-phase read:
//!
//! ```text
//!             header bytes           payload bytes
//! ┌─────────────┐   │   ┌──────────────┐   │
//! │ AwaitHeader │───┴──>│ AwaitPayload │───┴──> AwaitHeader
//! └─────────────┘       └──────────────┘
//!        │                      │
//!        │ invalid frame        │ length mismatch
//!        ↓                      ↓
//!           CloseConnection (route erased, state purged)
//! ```
//!
//! The broker reads exactly [`Header::SIZE`] bytes, hands them to
//! [`Instance::handle_stream`] with `is_payload = false`, and on
//! `AwaitPayload` reads exactly `payload_len` bytes and re-enters with
//! `is_payload = true`. Datagram endpoints deliver whole datagrams
//! instead; one datagram may carry several concatenated frames.
//!
//! # Concurrency
//!
//! The instance is single-threaded cooperative: every entry point runs
//! in the broker's execution context and returns before another entry
//! point is invoked. There are no locks and no suspension points.

use std::collections::{BTreeMap, BTreeSet};

use basp_proto::{
    payloads::{
        handshake::{ClientHandshake, ServerHandshake},
        message::Dispatch,
        proxy::ExitReason,
    },
    ActorId, ActorRef, Header, HeaderFlags, MessageId, NodeId, Operation, Payload, ProtocolError,
    INVALID_ACTOR_ID, VERSION,
};
use bytes::{Bytes, BytesMut};

use crate::{
    callee::{Callee, Receiver},
    hooks::{Hooks, NoopHooks},
    routing::{ConnectionHandle, DatagramHandle, Endpoint, RoutingTable, StreamHandle},
};

/// Next state of a stream connection after an event.
///
/// Per-connection state is kept by the broker; the instance only
/// returns what to do next.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    /// Read the next [`Header::SIZE`] bytes
    AwaitHeader,
    /// Read exactly `payload_len` bytes and re-enter
    AwaitPayload,
    /// Tear the connection down
    CloseConnection,
}

/// A local actor exposed at a port for remote binding.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PublishedActor {
    /// The published actor's id
    pub actor: ActorId,
    /// Interface signatures advertised to peers
    pub interfaces: BTreeSet<String>,
}

/// Serializer callback for the peer write path.
///
/// Invoked with the transport buffer positioned directly after the
/// reserved header bytes; whatever it appends becomes the frame
/// payload.
pub type PayloadWriter<'a> = &'a mut dyn FnMut(&mut BytesMut) -> Result<(), ProtocolError>;

/// Append one frame to a write buffer, back-patching the header.
///
/// With a payload writer the current buffer length is recorded,
/// [`Header::SIZE`] placeholder bytes are appended, the writer
/// serializes the payload directly into the buffer, and the header
/// (with the now-known payload length) is written over the placeholder
/// range. Without a writer the header is appended with `payload_len`
/// zero.
///
/// The buffer is single, append-only between flushes, and owned by the
/// transport, which is why the payload is serialized in place instead
/// of built separately and prepended.
///
/// A failing writer truncates the buffer back to its pre-call length
/// and logs the error; the caller decides whether to flush. The
/// function itself never fails.
pub fn write_frame(buf: &mut BytesMut, header: &mut Header, writer: Option<PayloadWriter<'_>>) {
    if let Some(writer) = writer {
        let pos = buf.len();
        buf.resize(pos + Header::SIZE, 0);
        if let Err(err) = writer(buf) {
            tracing::error!(error = %err, "failed to serialize frame payload");
            buf.truncate(pos);
            return;
        }
        let payload_len = buf.len() - pos - Header::SIZE;
        debug_assert!(payload_len <= u32::MAX as usize);
        #[allow(clippy::cast_possible_truncation)]
        header.set_payload_len(payload_len as u32);
        buf[pos..pos + Header::SIZE].copy_from_slice(&header.to_bytes());
    } else {
        header.set_payload_len(0);
        buf.extend_from_slice(&header.to_bytes());
    }
}

/// The per-node protocol engine.
///
/// Owns the routing table, this node's identity, and the
/// published-actors registry. All effects on the actor system go
/// through the [`Callee`] passed into each entry point; traffic-level
/// events are reported to the instance's [`Hooks`].
#[derive(Debug)]
pub struct Instance<H: Hooks = NoopHooks> {
    tbl: RoutingTable,
    this_node: NodeId,
    published_actors: BTreeMap<u16, PublishedActor>,
    hooks: H,
}

impl Instance<NoopHooks> {
    /// Create an instance without observers.
    ///
    /// # Panics
    ///
    /// Panics if `this_node` is [`NodeId::NONE`]; the instance must
    /// know its own identity for its whole lifetime.
    #[must_use]
    pub fn new(this_node: NodeId) -> Self {
        Self::with_hooks(this_node, NoopHooks)
    }
}

impl<H: Hooks> Instance<H> {
    /// Create an instance reporting traffic events to `hooks`.
    ///
    /// # Panics
    ///
    /// Panics if `this_node` is [`NodeId::NONE`].
    #[must_use]
    pub fn with_hooks(this_node: NodeId, hooks: H) -> Self {
        assert!(!this_node.is_none(), "instance requires a real node identity");
        Self {
            tbl: RoutingTable::new(),
            this_node,
            published_actors: BTreeMap::new(),
            hooks,
        }
    }

    /// This node's identity. Never [`NodeId::NONE`].
    #[must_use]
    pub fn this_node(&self) -> NodeId {
        self.this_node
    }

    /// Read access to the routing table.
    #[must_use]
    pub fn tbl(&self) -> &RoutingTable {
        &self.tbl
    }

    /// The instance's hook set.
    #[must_use]
    pub fn hooks(&self) -> &H {
        &self.hooks
    }

    /// Resolve a path to `node`.
    #[must_use]
    pub fn lookup(&self, node: NodeId) -> Option<Endpoint> {
        self.tbl.lookup(node)
    }

    /// Write buffer of `handle`, created on first use.
    pub fn wr_buf(&mut self, handle: ConnectionHandle) -> &mut BytesMut {
        self.tbl.wr_buf(handle)
    }

    /// Hand the buffered bytes of `handle` to the transport.
    pub fn flush(&mut self, handle: ConnectionHandle) {
        self.tbl.flush(handle);
    }

    /// Drain everything flushed since the last call, in flush order.
    pub fn take_flushed(&mut self) -> Vec<(ConnectionHandle, Bytes)> {
        self.tbl.take_flushed()
    }

    /// The actor published at `port`, if any.
    #[must_use]
    pub fn published_actor(&self, port: u16) -> Option<&PublishedActor> {
        self.published_actors.get(&port)
    }

    // ------------------------------------------------------------------
    // Receive path
    // ------------------------------------------------------------------

    /// Process one stream read.
    ///
    /// `header` is the broker's per-connection scratch header: it is
    /// filled in by the header phase and consulted by the payload
    /// phase. When `is_payload` is false, `buf` must be exactly
    /// [`Header::SIZE`] bytes; when true, exactly the announced payload
    /// length.
    pub fn handle_stream<C: Callee>(
        &mut self,
        callee: &mut C,
        handle: StreamHandle,
        header: &mut Header,
        buf: &[u8],
        is_payload: bool,
    ) -> ConnectionState {
        let handle = ConnectionHandle::Stream(handle);
        let payload: Option<&[u8]> = if is_payload {
            if buf.len() != header.payload_len() as usize {
                tracing::warn!(?handle, "received invalid payload");
                self.purge(callee, handle);
                return ConnectionState::CloseConnection;
            }
            Some(buf)
        } else {
            if buf.len() != Header::SIZE {
                tracing::warn!(?handle, len = buf.len(), "header read has wrong length");
                self.purge(callee, handle);
                return ConnectionState::CloseConnection;
            }
            let parsed = match Header::from_bytes(buf) {
                Ok(parsed) if parsed.valid() => parsed,
                _ => {
                    tracing::warn!(?handle, "received invalid header");
                    self.purge(callee, handle);
                    return ConnectionState::CloseConnection;
                }
            };
            *header = *parsed;
            if header.payload_len() > 0 {
                tracing::debug!("await payload before processing further");
                return ConnectionState::AwaitPayload;
            }
            None
        };
        tracing::debug!(?header, "handle stream frame");
        // Needs forwarding?
        if !header.is_handshake() && !header.is_heartbeat() && header.dest_node() != self.this_node
        {
            return self.forward(header, payload);
        }
        let Some(operation) = header.operation() else {
            self.purge(callee, handle);
            return ConnectionState::CloseConnection;
        };
        let ok = match operation {
            Operation::ServerHandshake => {
                self.handle_server_handshake(callee, handle, header, payload, operation, true)
            }
            Operation::ClientHandshake => {
                self.handle_client_handshake(callee, handle, header, payload, operation, None)
            }
            Operation::DispatchMessage => self.handle_dispatch(callee, handle, header, payload),
            Operation::AnnounceProxy => {
                callee.proxy_announced(header.source_node(), header.dest_actor());
                true
            }
            Operation::KillProxy => self.handle_kill_proxy(callee, handle, header, payload),
            Operation::Heartbeat => {
                tracing::trace!(source_node = %header.source_node(), "received heartbeat");
                callee.handle_heartbeat(header.source_node());
                true
            }
            Operation::UdpServerHandshake | Operation::UdpClientHandshake => {
                tracing::error!("datagram handshake on a stream transport");
                self.purge(callee, handle)
            }
        };
        if ok {
            ConnectionState::AwaitHeader
        } else {
            ConnectionState::CloseConnection
        }
    }

    /// Process one datagram.
    ///
    /// A datagram may contain one or more concatenated frames; `port`
    /// is the local port the datagram arrived on, used to pick the
    /// published actor advertised in a handshake response. Returns
    /// false when the handle must be torn down.
    pub fn handle_datagram<C: Callee>(
        &mut self,
        callee: &mut C,
        handle: DatagramHandle,
        port: Option<u16>,
        buf: &[u8],
    ) -> bool {
        let handle = ConnectionHandle::Datagram(handle);
        let mut offset = 0;
        while offset < buf.len() {
            let header = match Header::from_bytes(&buf[offset..]) {
                Ok(parsed) if parsed.valid() => *parsed,
                _ => {
                    tracing::warn!(?handle, "received invalid header");
                    return self.purge(callee, handle);
                }
            };
            offset += Header::SIZE;
            let payload_len = header.payload_len() as usize;
            if buf.len() - offset < payload_len {
                tracing::warn!(?handle, "datagram shorter than announced payload");
                return self.purge(callee, handle);
            }
            let payload = if payload_len > 0 {
                Some(&buf[offset..offset + payload_len])
            } else {
                None
            };
            offset += payload_len;
            tracing::debug!(?header, "handle datagram frame");
            // No forwarding on the datagram path: a frame for another
            // node is an error here.
            if !header.is_handshake()
                && !header.is_heartbeat()
                && header.dest_node() != self.this_node
            {
                tracing::warn!(dest_node = %header.dest_node(), "datagram frame addressed to another node");
                return self.purge(callee, handle);
            }
            let Some(operation) = header.operation() else {
                return self.purge(callee, handle);
            };
            let ok = match operation {
                Operation::UdpServerHandshake => self.handle_server_handshake(
                    callee, handle, &header, payload, operation, false,
                ),
                Operation::UdpClientHandshake => self.handle_client_handshake(
                    callee, handle, &header, payload, operation, Some(port),
                ),
                Operation::ServerHandshake | Operation::ClientHandshake => {
                    tracing::debug!("ignoring stream handshake on a datagram transport");
                    true
                }
                Operation::DispatchMessage => self.handle_dispatch(callee, handle, &header, payload),
                Operation::AnnounceProxy => {
                    callee.proxy_announced(header.source_node(), header.dest_actor());
                    true
                }
                Operation::KillProxy => self.handle_kill_proxy(callee, handle, &header, payload),
                Operation::Heartbeat => {
                    tracing::trace!(source_node = %header.source_node(), "received heartbeat");
                    callee.handle_heartbeat(header.source_node());
                    true
                }
            };
            if !ok {
                return false;
            }
        }
        true
    }

    /// Erase the handle's route, purging state for every node that
    /// loses its only path. Returns false for use in handler tails.
    fn purge<C: Callee>(&mut self, callee: &mut C, handle: ConnectionHandle) -> bool {
        self.tbl.erase(handle, |node| callee.purge_state(node));
        false
    }

    /// Like [`Instance::purge`], but additionally purges `source` when
    /// the erased routes did not cover it. Used for semantic handshake
    /// rejections, where the offending peer is known from the header
    /// even though no route was ever installed for it.
    fn purge_source<C: Callee>(
        &mut self,
        callee: &mut C,
        handle: ConnectionHandle,
        source: NodeId,
    ) -> bool {
        let mut covered = false;
        self.tbl.erase(handle, |node| {
            covered |= node == source;
            callee.purge_state(node);
        });
        if !covered && !source.is_none() {
            callee.purge_state(source);
        }
        false
    }

    fn forward(&mut self, header: &Header, payload: Option<&[u8]>) -> ConnectionState {
        let dest = header.dest_node();
        if let Some(ep) = self.tbl.lookup(dest) {
            tracing::debug!(dest_node = %dest, "forward message");
            let buf = self.tbl.wr_buf(ep.handle);
            buf.extend_from_slice(&header.to_bytes());
            if let Some(payload) = payload {
                buf.extend_from_slice(payload);
            }
            self.tbl.flush(ep.handle);
            self.hooks.message_forwarded(header, payload);
        } else {
            tracing::info!(dest_node = %dest, "cannot forward message, no route to destination");
            if header.source_node() == self.this_node {
                tracing::warn!("lost packet with probably spoofed source");
            } else if self.tbl.lookup(header.source_node()).is_none() {
                tracing::warn!(source_node = %header.source_node(), "cannot send error message: no route to source");
            } else {
                // TODO: signal the forwarding failure back to the
                // source node once the error frame format exists.
                tracing::warn!("not implemented: signal forwarding failure to source");
            }
            self.hooks.message_forwarding_failed(header, payload);
        }
        ConnectionState::AwaitHeader
    }

    fn handle_server_handshake<C: Callee>(
        &mut self,
        callee: &mut C,
        handle: ConnectionHandle,
        header: &Header,
        payload: Option<&[u8]>,
        operation: Operation,
        respond: bool,
    ) -> bool {
        let source = header.source_node();
        let Some(payload) = payload else {
            tracing::error!("failed to receive the app identifier");
            return self.purge(callee, handle);
        };
        let hs = match Payload::decode(operation, payload) {
            Ok(Payload::ServerHandshake(hs) | Payload::UdpServerHandshake(hs)) => hs,
            _ => {
                tracing::warn!("received malformed server handshake");
                return self.purge(callee, handle);
            }
        };
        if hs.app_id != callee.app_identifier() {
            tracing::error!("app identifier mismatch");
            return self.purge_source(callee, handle, source);
        }
        if header.operation_data() != VERSION {
            tracing::error!(
                remote_version = header.operation_data(),
                local_version = VERSION,
                "protocol version mismatch"
            );
            return self.purge_source(callee, handle, source);
        }
        // Close a self connection after the handshake is done.
        if source == self.this_node {
            tracing::info!("close connection to self immediately");
            callee.finalize_handshake(source, hs.actor, hs.interfaces);
            return self.purge(callee, handle);
        }
        // Close this connection if we already have a direct one.
        if self.tbl.lookup_hdl(source).is_some() {
            tracing::info!(source_node = %source, "close connection, direct connection already exists");
            callee.finalize_handshake(source, hs.actor, hs.interfaces);
            return self.purge(callee, handle);
        }
        tracing::info!(source_node = %source, "new direct connection");
        self.tbl.add(handle, source);
        if respond {
            // Write a handshake as client in response.
            let Some(ep) = self.tbl.lookup(source) else {
                tracing::error!("no route to host after server handshake");
                return self.purge(callee, handle);
            };
            self.write_client_handshake(callee, ep.handle, source);
            callee.learned_new_node_directly(source);
            callee.finalize_handshake(source, hs.actor, hs.interfaces);
            self.tbl.flush(ep.handle);
        } else {
            // The datagram flavor answers from the client-handshake
            // side instead.
            callee.learned_new_node_directly(source);
            callee.finalize_handshake(source, hs.actor, hs.interfaces);
        }
        true
    }

    fn handle_client_handshake<C: Callee>(
        &mut self,
        callee: &mut C,
        handle: ConnectionHandle,
        header: &Header,
        payload: Option<&[u8]>,
        operation: Operation,
        respond_port: Option<Option<u16>>,
    ) -> bool {
        let source = header.source_node();
        if self.tbl.lookup_hdl(source).is_some() {
            tracing::info!(source_node = %source, "received second client handshake");
            return true;
        }
        let Some(payload) = payload else {
            tracing::error!("failed to receive the app identifier");
            return self.purge(callee, handle);
        };
        let hs = match Payload::decode(operation, payload) {
            Ok(Payload::ClientHandshake(hs) | Payload::UdpClientHandshake(hs)) => hs,
            _ => {
                tracing::warn!("received malformed client handshake");
                return self.purge(callee, handle);
            }
        };
        if hs.app_id != callee.app_identifier() {
            tracing::error!("app identifier mismatch");
            return self.purge_source(callee, handle, source);
        }
        if header.operation_data() != VERSION {
            tracing::error!(
                remote_version = header.operation_data(),
                local_version = VERSION,
                "protocol version mismatch"
            );
            return self.purge_source(callee, handle, source);
        }
        tracing::info!(source_node = %source, "new direct connection");
        self.tbl.add(handle, source);
        if let Some(port) = respond_port {
            // Datagram flavor: answer with a server handshake carrying
            // the actor published at the arrival port.
            let Some(ep) = self.tbl.lookup(source) else {
                tracing::error!("no route to host after client handshake");
                return self.purge(callee, handle);
            };
            self.write_udp_server_handshake(callee, ep.handle, source, port);
            self.tbl.flush(ep.handle);
        }
        callee.learned_new_node_directly(source);
        true
    }

    fn handle_dispatch<C: Callee>(
        &mut self,
        callee: &mut C,
        handle: ConnectionHandle,
        header: &Header,
        payload: Option<&[u8]>,
    ) -> bool {
        let Some(payload) = payload else {
            return self.purge(callee, handle);
        };
        let dispatch = match Payload::decode(Operation::DispatchMessage, payload) {
            Ok(Payload::Dispatch(dispatch)) => dispatch,
            _ => {
                tracing::warn!("received malformed dispatch payload");
                return self.purge(callee, handle);
            }
        };
        let named = header.has(HeaderFlags::NAMED_RECEIVER);
        if named != dispatch.receiver_name.is_some() {
            tracing::warn!("named receiver flag does not match the payload");
            return self.purge(callee, handle);
        }
        let receiver = match dispatch.receiver_name {
            Some(name) => Receiver::Named(name),
            None => Receiver::Actor(header.dest_actor()),
        };
        tracing::debug!(
            ?receiver,
            stack_len = dispatch.forwarding_stack.len(),
            "deliver message"
        );
        callee.deliver(
            header.source_node(),
            header.source_actor(),
            receiver,
            header.operation_data(),
            dispatch.forwarding_stack,
            dispatch.message,
        );
        true
    }

    fn handle_kill_proxy<C: Callee>(
        &mut self,
        callee: &mut C,
        handle: ConnectionHandle,
        header: &Header,
        payload: Option<&[u8]>,
    ) -> bool {
        let Some(payload) = payload else {
            return self.purge(callee, handle);
        };
        let reason = match Payload::decode(Operation::KillProxy, payload) {
            Ok(Payload::KillProxy(reason)) => reason,
            _ => {
                tracing::warn!("received malformed kill proxy payload");
                return self.purge(callee, handle);
            }
        };
        callee.kill_proxy(header.source_node(), header.source_actor(), reason);
        true
    }

    // ------------------------------------------------------------------
    // Facade operations
    // ------------------------------------------------------------------

    /// Send an actor message to a remote receiver.
    ///
    /// Returns false (after a `message_sending_failed` hook) when no
    /// route to the receiver's node exists. A `sender` of `None` stamps
    /// this node and the invalid actor id as the origin.
    pub fn dispatch(
        &mut self,
        sender: Option<ActorRef>,
        forwarding_stack: &[ActorRef],
        receiver: ActorRef,
        message_id: MessageId,
        message: &[u8],
    ) -> bool {
        debug_assert_ne!(receiver.node, self.this_node);
        let Some(ep) = self.tbl.lookup(receiver.node) else {
            self.hooks
                .message_sending_failed(sender.as_ref(), &receiver, message_id, message);
            return false;
        };
        let payload = Payload::Dispatch(Dispatch {
            receiver_name: None,
            forwarding_stack: forwarding_stack.to_vec(),
            message: message.to_vec(),
        });
        let (source_node, source_actor) = match sender {
            Some(sender) => (sender.node, sender.id),
            None => (self.this_node, INVALID_ACTOR_ID),
        };
        let mut header = Header::new(
            Operation::DispatchMessage,
            HeaderFlags::empty(),
            message_id,
            source_node,
            receiver.node,
            source_actor,
            receiver.id,
        );
        write_frame(
            self.tbl.wr_buf(ep.handle),
            &mut header,
            Some(&mut |buf| payload.encode(buf)),
        );
        self.tbl.flush(ep.handle);
        self.hooks
            .message_sent(sender.as_ref(), ep.next_hop, &receiver, message_id, message);
        true
    }

    /// Heartbeat tick: write and flush one heartbeat frame per direct
    /// peer.
    pub fn handle_heartbeat(&mut self) {
        let peers: Vec<(ConnectionHandle, NodeId)> = self.tbl.direct_routes().collect();
        for (handle, node) in peers {
            tracing::trace!(?handle, node = %node, "send heartbeat");
            self.write_heartbeat(handle, node);
            self.tbl.flush(handle);
        }
    }

    /// Drop every route to `affected_node` and purge the state of all
    /// nodes that lose their only path. [`NodeId::NONE`] is a no-op.
    pub fn handle_node_shutdown<C: Callee>(&mut self, callee: &mut C, affected_node: NodeId) {
        if affected_node.is_none() {
            return;
        }
        tracing::info!(node = %affected_node, "lost direct connection");
        self.tbl
            .erase_node(affected_node, |node| callee.purge_state(node));
    }

    /// Publish `actor` at `port`, replacing any previous publication
    /// there. Notifies the `actor_published` hook.
    pub fn add_published_actor(
        &mut self,
        port: u16,
        actor: ActorId,
        interfaces: BTreeSet<String>,
    ) {
        let entry = self
            .published_actors
            .entry(port)
            .or_insert_with(|| PublishedActor {
                actor: INVALID_ACTOR_ID,
                interfaces: BTreeSet::new(),
            });
        entry.actor = actor;
        entry.interfaces = interfaces;
        self.hooks.actor_published(entry.actor, &entry.interfaces, port);
    }

    /// Remove the publication at `port`. Returns the number of removed
    /// entries (0 or 1); `on_removed` sees each removed pair.
    pub fn remove_published_actor(
        &mut self,
        port: u16,
        on_removed: Option<&mut dyn FnMut(ActorId, u16)>,
    ) -> usize {
        let Some(entry) = self.published_actors.remove(&port) else {
            return 0;
        };
        if let Some(on_removed) = on_removed {
            on_removed(entry.actor, port);
        }
        1
    }

    /// Remove publications of `actor`. With a non-zero `port` only that
    /// port is considered (and only if `actor` is published there);
    /// with `port == 0` every publication of `actor` is removed.
    /// Returns the number of removed entries.
    pub fn remove_published_actor_of(
        &mut self,
        actor: ActorId,
        port: u16,
        mut on_removed: Option<&mut dyn FnMut(ActorId, u16)>,
    ) -> usize {
        if port != 0 {
            match self.published_actors.get(&port) {
                Some(entry) if entry.actor == actor => {
                    self.published_actors.remove(&port);
                    if let Some(on_removed) = on_removed.as_mut() {
                        on_removed(actor, port);
                    }
                    1
                }
                _ => 0,
            }
        } else {
            let ports: Vec<u16> = self
                .published_actors
                .iter()
                .filter(|(_, entry)| entry.actor == actor)
                .map(|(&port, _)| port)
                .collect();
            for &port in &ports {
                self.published_actors.remove(&port);
                if let Some(on_removed) = on_removed.as_mut() {
                    on_removed(actor, port);
                }
            }
            ports.len()
        }
    }

    // ------------------------------------------------------------------
    // Write helpers
    // ------------------------------------------------------------------

    /// Write a server handshake onto `handle`'s buffer, advertising the
    /// actor published at `port` (if any).
    pub fn write_server_handshake<C: Callee>(
        &mut self,
        callee: &C,
        handle: ConnectionHandle,
        port: Option<u16>,
    ) {
        self.write_server_handshake_impl(callee, handle, NodeId::NONE, port, Operation::ServerHandshake);
    }

    /// Datagram flavor of [`Instance::write_server_handshake`],
    /// addressed to `remote`.
    pub fn write_udp_server_handshake<C: Callee>(
        &mut self,
        callee: &C,
        handle: ConnectionHandle,
        remote: NodeId,
        port: Option<u16>,
    ) {
        self.write_server_handshake_impl(callee, handle, remote, port, Operation::UdpServerHandshake);
    }

    fn write_server_handshake_impl<C: Callee>(
        &mut self,
        callee: &C,
        handle: ConnectionHandle,
        dest: NodeId,
        port: Option<u16>,
        operation: Operation,
    ) {
        let published = port.and_then(|port| self.published_actors.get(&port));
        if published.is_none() && port.is_some() {
            tracing::debug!(port = port.unwrap_or(0), "no actor published");
        }
        let (actor, interfaces) = match published {
            Some(entry) => (entry.actor, entry.interfaces.clone()),
            None => (INVALID_ACTOR_ID, BTreeSet::new()),
        };
        let payload = match operation {
            Operation::UdpServerHandshake => Payload::UdpServerHandshake(ServerHandshake {
                app_id: callee.app_identifier().to_string(),
                actor,
                interfaces,
            }),
            _ => Payload::ServerHandshake(ServerHandshake {
                app_id: callee.app_identifier().to_string(),
                actor,
                interfaces,
            }),
        };
        let mut header = Header::new(
            operation,
            HeaderFlags::empty(),
            VERSION,
            self.this_node,
            dest,
            actor,
            INVALID_ACTOR_ID,
        );
        write_frame(
            self.tbl.wr_buf(handle),
            &mut header,
            Some(&mut |buf| payload.encode(buf)),
        );
    }

    /// Write a client handshake onto `handle`'s buffer.
    pub fn write_client_handshake<C: Callee>(
        &mut self,
        callee: &C,
        handle: ConnectionHandle,
        remote: NodeId,
    ) {
        self.write_client_handshake_impl(callee, handle, remote, Operation::ClientHandshake);
    }

    /// Datagram flavor of [`Instance::write_client_handshake`]. The
    /// destination is left unrouted; the peer learns us from
    /// `source_node`.
    pub fn write_udp_client_handshake<C: Callee>(&mut self, callee: &C, handle: ConnectionHandle) {
        self.write_client_handshake_impl(callee, handle, NodeId::NONE, Operation::UdpClientHandshake);
    }

    fn write_client_handshake_impl<C: Callee>(
        &mut self,
        callee: &C,
        handle: ConnectionHandle,
        remote: NodeId,
        operation: Operation,
    ) {
        let hs = ClientHandshake { app_id: callee.app_identifier().to_string() };
        let payload = match operation {
            Operation::UdpClientHandshake => Payload::UdpClientHandshake(hs),
            _ => Payload::ClientHandshake(hs),
        };
        let mut header = Header::new(
            operation,
            HeaderFlags::empty(),
            VERSION,
            self.this_node,
            remote,
            INVALID_ACTOR_ID,
            INVALID_ACTOR_ID,
        );
        write_frame(
            self.tbl.wr_buf(handle),
            &mut header,
            Some(&mut |buf| payload.encode(buf)),
        );
    }

    /// Announce that this node created a proxy for `actor` on
    /// `dest_node`.
    pub fn write_announce_proxy(
        &mut self,
        handle: ConnectionHandle,
        dest_node: NodeId,
        actor: ActorId,
    ) {
        let mut header = Header::new(
            Operation::AnnounceProxy,
            HeaderFlags::empty(),
            0,
            self.this_node,
            dest_node,
            INVALID_ACTOR_ID,
            actor,
        );
        write_frame(self.tbl.wr_buf(handle), &mut header, None);
    }

    /// Tell `dest_node` that its proxy for local actor `actor` must
    /// die, with the exit reason as payload.
    pub fn write_kill_proxy(
        &mut self,
        handle: ConnectionHandle,
        dest_node: NodeId,
        actor: ActorId,
        reason: ExitReason,
    ) {
        let payload = Payload::KillProxy(reason);
        let mut header = Header::new(
            Operation::KillProxy,
            HeaderFlags::empty(),
            0,
            self.this_node,
            dest_node,
            actor,
            INVALID_ACTOR_ID,
        );
        write_frame(
            self.tbl.wr_buf(handle),
            &mut header,
            Some(&mut |buf| payload.encode(buf)),
        );
    }

    /// Write one heartbeat frame onto `handle`'s buffer.
    pub fn write_heartbeat(&mut self, handle: ConnectionHandle, remote: NodeId) {
        let mut header = Header::new(
            Operation::Heartbeat,
            HeaderFlags::empty(),
            0,
            self.this_node,
            remote,
            INVALID_ACTOR_ID,
            INVALID_ACTOR_ID,
        );
        write_frame(self.tbl.wr_buf(handle), &mut header, None);
    }
}
