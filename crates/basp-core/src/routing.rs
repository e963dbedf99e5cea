//! Routing table: node identities, transport handles, write buffers.
//!
//! The table is the single source of truth for "which connection do I
//! use to reach node N". It keeps two direct-route indexes (by node and
//! by handle) in lockstep, reserves space for indirect routes, and owns
//! one append-only write buffer per handle.
//!
//! Flushing is sans-IO: [`RoutingTable::flush`] moves the buffered
//! bytes of a handle into an ordered outbox that the transport broker
//! drains with [`RoutingTable::take_flushed`]. Per handle, bytes leave
//! in exactly the order they were appended.

use std::collections::{BTreeMap, VecDeque};

use basp_proto::NodeId;
use bytes::{Bytes, BytesMut};

/// Identifies one stream (TCP-like) connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct StreamHandle(
    /// Broker-assigned connection id
    pub u64,
);

/// Identifies one datagram (UDP-like) endpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct DatagramHandle(
    /// Broker-assigned endpoint id
    pub u64,
);

/// A transport connection of either family.
///
/// This is a closed tagged variant on purpose: every place that cares
/// about the transport family matches exhaustively, and adding a family
/// is a compile-visible change.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum ConnectionHandle {
    /// Stream connection
    Stream(StreamHandle),
    /// Datagram endpoint
    Datagram(DatagramHandle),
}

impl From<StreamHandle> for ConnectionHandle {
    fn from(handle: StreamHandle) -> Self {
        Self::Stream(handle)
    }
}

impl From<DatagramHandle> for ConnectionHandle {
    fn from(handle: DatagramHandle) -> Self {
        Self::Datagram(handle)
    }
}

/// Resolved path to a peer node.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Endpoint {
    /// Connection carrying the traffic
    pub handle: ConnectionHandle,
    /// First node reached over `handle`: the target itself for direct
    /// routes, the relaying peer for indirect ones
    pub next_hop: NodeId,
}

/// Bidirectional mapping between peer node identities and transport
/// handles, plus per-handle write buffers and the flush outbox.
#[derive(Debug, Default)]
pub struct RoutingTable {
    direct_by_node: BTreeMap<NodeId, ConnectionHandle>,
    direct_by_hdl: BTreeMap<ConnectionHandle, NodeId>,
    // Reserved: next-hop entries; nothing in the receive path populates
    // this map today.
    indirect: BTreeMap<NodeId, NodeId>,
    buffers: BTreeMap<ConnectionHandle, BytesMut>,
    flushed: VecDeque<(ConnectionHandle, Bytes)>,
}

impl RoutingTable {
    /// Create an empty table.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Install a direct route `handle <-> node`.
    ///
    /// Idempotent on identity: re-adding the same pair is a no-op. The
    /// state machine guarantees `node` has no other direct route when
    /// this is called (a second handshake is dropped before reaching
    /// the table).
    pub fn add(&mut self, handle: ConnectionHandle, node: NodeId) {
        debug_assert!(!node.is_none());
        if self.direct_by_node.get(&node) == Some(&handle) {
            return;
        }
        debug_assert!(!self.direct_by_node.contains_key(&node));
        debug_assert!(!self.direct_by_hdl.contains_key(&handle));
        self.direct_by_node.insert(node, handle);
        self.direct_by_hdl.insert(handle, node);
    }

    /// Record that `node` is reachable through `hop`.
    ///
    /// Returns true when this taught the table a new node: `node` has
    /// neither a direct route nor a previous indirect entry.
    pub fn add_indirect(&mut self, hop: NodeId, node: NodeId) -> bool {
        if self.direct_by_node.contains_key(&node) || self.indirect.contains_key(&node) {
            return false;
        }
        self.indirect.insert(node, hop);
        true
    }

    /// Drop the indirect entry for `node`, if any.
    pub fn erase_indirect(&mut self, node: NodeId) -> bool {
        self.indirect.remove(&node).is_some()
    }

    /// Resolve a path to `node`: direct routes win, then indirect ones
    /// whose hop has a direct route.
    #[must_use]
    pub fn lookup(&self, node: NodeId) -> Option<Endpoint> {
        if let Some(&handle) = self.direct_by_node.get(&node) {
            return Some(Endpoint { handle, next_hop: node });
        }
        let &hop = self.indirect.get(&node)?;
        let &handle = self.direct_by_node.get(&hop)?;
        Some(Endpoint { handle, next_hop: hop })
    }

    /// Handle of the direct route to `node`, if one exists.
    #[must_use]
    pub fn lookup_hdl(&self, node: NodeId) -> Option<ConnectionHandle> {
        self.direct_by_node.get(&node).copied()
    }

    /// Node directly connected through `handle`, if any.
    #[must_use]
    pub fn lookup_node(&self, handle: ConnectionHandle) -> Option<NodeId> {
        self.direct_by_hdl.get(&handle).copied()
    }

    /// Remove the direct route over `handle`.
    ///
    /// Invokes `purge` exactly once for every node whose only path went
    /// through the removed entry: the directly connected node itself
    /// and every indirectly routed node whose hop it was. The handle's
    /// write buffer is discarded; already flushed bytes are not.
    pub fn erase(&mut self, handle: ConnectionHandle, mut purge: impl FnMut(NodeId)) {
        self.buffers.remove(&handle);
        let Some(node) = self.direct_by_hdl.remove(&handle) else {
            return;
        };
        self.direct_by_node.remove(&node);
        self.indirect.remove(&node);
        let orphaned: Vec<NodeId> = self
            .indirect
            .iter()
            .filter(|(_, &hop)| hop == node)
            .map(|(&n, _)| n)
            .collect();
        for n in orphaned {
            self.indirect.remove(&n);
            purge(n);
        }
        purge(node);
    }

    /// Remove the direct route to `node`. See [`RoutingTable::erase`].
    pub fn erase_node(&mut self, node: NodeId, purge: impl FnMut(NodeId)) {
        if let Some(&handle) = self.direct_by_node.get(&node) {
            self.erase(handle, purge);
        }
    }

    /// Write buffer of `handle`, created on first use.
    ///
    /// A fresh connection needs a buffer before any route exists: the
    /// first handshake is written here.
    pub fn wr_buf(&mut self, handle: ConnectionHandle) -> &mut BytesMut {
        self.buffers.entry(handle).or_default()
    }

    /// Move the buffered bytes of `handle` into the outbox.
    ///
    /// Flushes are ordered per handle; the outbox preserves the global
    /// flush order for the broker.
    pub fn flush(&mut self, handle: ConnectionHandle) {
        if let Some(buf) = self.buffers.get_mut(&handle) {
            if !buf.is_empty() {
                self.flushed.push_back((handle, buf.split().freeze()));
            }
        }
    }

    /// Drain the outbox: everything flushed since the last call, in
    /// flush order.
    pub fn take_flushed(&mut self) -> Vec<(ConnectionHandle, Bytes)> {
        self.flushed.drain(..).collect()
    }

    /// Iterate over all direct routes.
    pub fn direct_routes(&self) -> impl Iterator<Item = (ConnectionHandle, NodeId)> + '_ {
        self.direct_by_hdl.iter().map(|(&h, &n)| (h, n))
    }

    /// Number of direct routes.
    #[must_use]
    pub fn num_direct_routes(&self) -> usize {
        self.direct_by_hdl.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn node(tag: u8) -> NodeId {
        NodeId::from_parts([tag; 20], u32::from(tag))
    }

    fn stream(id: u64) -> ConnectionHandle {
        ConnectionHandle::Stream(StreamHandle(id))
    }

    #[test]
    fn add_and_lookup() {
        let mut tbl = RoutingTable::new();
        tbl.add(stream(1), node(2));

        let ep = tbl.lookup(node(2)).expect("route");
        assert_eq!(ep.handle, stream(1));
        assert_eq!(ep.next_hop, node(2));
        assert_eq!(tbl.lookup_hdl(node(2)), Some(stream(1)));
        assert_eq!(tbl.lookup_node(stream(1)), Some(node(2)));
        assert_eq!(tbl.lookup(node(3)), None);
    }

    #[test]
    fn add_is_idempotent_on_identity() {
        let mut tbl = RoutingTable::new();
        tbl.add(stream(1), node(2));
        tbl.add(stream(1), node(2));
        assert_eq!(tbl.num_direct_routes(), 1);
    }

    #[test]
    fn indirect_lookup_resolves_hop() {
        let mut tbl = RoutingTable::new();
        tbl.add(stream(1), node(2));
        assert!(tbl.add_indirect(node(2), node(3)));
        assert!(!tbl.add_indirect(node(2), node(3)));

        let ep = tbl.lookup(node(3)).expect("indirect route");
        assert_eq!(ep.handle, stream(1));
        assert_eq!(ep.next_hop, node(2));

        // Direct routes are never shadowed by indirect entries.
        assert!(!tbl.add_indirect(node(3), node(2)));
    }

    #[test]
    fn erase_purges_direct_and_indirect() {
        let mut tbl = RoutingTable::new();
        tbl.add(stream(1), node(2));
        tbl.add_indirect(node(2), node(3));
        tbl.add_indirect(node(2), node(4));

        let mut purged = Vec::new();
        tbl.erase(stream(1), |n| purged.push(n));

        assert_eq!(tbl.lookup(node(2)), None);
        assert_eq!(tbl.lookup(node(3)), None);
        assert_eq!(tbl.lookup(node(4)), None);

        purged.sort();
        assert_eq!(purged, vec![node(2), node(3), node(4)]);
    }

    #[test]
    fn erase_node_finds_handle() {
        let mut tbl = RoutingTable::new();
        tbl.add(stream(7), node(5));

        let mut purged = Vec::new();
        tbl.erase_node(node(5), |n| purged.push(n));

        assert_eq!(purged, vec![node(5)]);
        assert_eq!(tbl.lookup_node(stream(7)), None);
    }

    #[test]
    fn erase_unknown_handle_is_noop() {
        let mut tbl = RoutingTable::new();
        let mut purged = Vec::new();
        tbl.erase(stream(9), |n| purged.push(n));
        assert!(purged.is_empty());
    }

    #[test]
    fn flush_preserves_append_order() {
        let mut tbl = RoutingTable::new();
        let h = stream(1);

        tbl.wr_buf(h).extend_from_slice(b"first");
        tbl.flush(h);
        tbl.wr_buf(h).extend_from_slice(b"second");
        tbl.wr_buf(h).extend_from_slice(b"-part");
        tbl.flush(h);

        let out = tbl.take_flushed();
        assert_eq!(out.len(), 2);
        assert_eq!(&out[0].1[..], b"first");
        assert_eq!(&out[1].1[..], b"second-part");
        assert!(tbl.take_flushed().is_empty());
    }

    #[test]
    fn flush_empty_buffer_emits_nothing() {
        let mut tbl = RoutingTable::new();
        tbl.wr_buf(stream(1));
        tbl.flush(stream(1));
        assert!(tbl.take_flushed().is_empty());
    }

    #[test]
    fn buffer_usable_before_route_exists() {
        let mut tbl = RoutingTable::new();
        let h = ConnectionHandle::Datagram(DatagramHandle(3));
        tbl.wr_buf(h).extend_from_slice(b"handshake");
        assert_eq!(tbl.lookup_node(h), None);
        tbl.flush(h);
        assert_eq!(tbl.take_flushed().len(), 1);
    }
}
