//! Dispatch, forwarding, heartbeat fan-out, and shutdown scenarios.

mod common;

use std::collections::BTreeSet;

use basp_core::{
    ConnectionHandle, ConnectionState, Instance, Receiver, RoutingTable, StreamHandle,
};
use basp_proto::{
    payloads::{handshake::ServerHandshake, message::Dispatch, proxy::ExitReason},
    ActorRef, Frame, Header, HeaderFlags, NodeId, Operation, Payload, INVALID_ACTOR_ID, VERSION,
};

use common::{
    decode_frames, feed_stream, flushed_bytes, node, scratch_header, stream, CalleeEvent,
    HookEvent, RecordingCallee, RecordingHooks, APP_ID,
};

/// Install a direct route to `peer` over `handle` via a server
/// handshake, then discard the handshake traffic and events.
fn connect<H: basp_core::Hooks>(
    instance: &mut Instance<H>,
    callee: &mut RecordingCallee,
    handle: StreamHandle,
    peer: NodeId,
) {
    let payload = Payload::ServerHandshake(ServerHandshake {
        app_id: APP_ID.to_string(),
        actor: INVALID_ACTOR_ID,
        interfaces: BTreeSet::new(),
    });
    let header = Header::new(
        Operation::ServerHandshake,
        HeaderFlags::empty(),
        VERSION,
        peer,
        NodeId::NONE,
        INVALID_ACTOR_ID,
        INVALID_ACTOR_ID,
    );
    let frame = payload.into_frame(header).expect("encodable handshake");
    let state = feed_stream(instance, callee, handle, &frame);
    assert_eq!(state, ConnectionState::AwaitHeader);
    instance.take_flushed();
    callee.events.clear();
}

// S4: a dispatched message shows up on the peer's route as exactly one
// frame with the right header and a payload carrying the stack and the
// opaque message bytes.
#[test]
fn dispatch_writes_one_well_formed_frame() {
    let n1 = node(1);
    let n2 = node(2);
    let mut instance = Instance::with_hooks(n1, RecordingHooks::default());
    let mut callee = RecordingCallee::new();
    let handle = stream(1);
    connect(&mut instance, &mut callee, handle, n2);

    let sender = ActorRef::new(n1, 11);
    let receiver = ActorRef::new(n2, 22);
    let stack = vec![ActorRef::new(n1, 11)];
    let message = b"balance-query".to_vec();

    let ok = instance.dispatch(Some(sender), &stack, receiver, 0xfeed, &message);
    assert!(ok);

    let flushed = instance.take_flushed();
    let written = flushed_bytes(&flushed, ConnectionHandle::Stream(handle));
    let frames = decode_frames(&written);
    assert_eq!(frames.len(), 1);

    let frame = &frames[0];
    assert_eq!(frame.header.operation(), Some(Operation::DispatchMessage));
    assert_eq!(frame.header.source_node(), n1);
    assert_eq!(frame.header.dest_node(), n2);
    assert_eq!(frame.header.source_actor(), 11);
    assert_eq!(frame.header.dest_actor(), 22);
    assert_eq!(frame.header.operation_data(), 0xfeed);
    assert_eq!(frame.header.payload_len() as usize, frame.payload.len());

    match Payload::from_frame(frame.clone()).expect("parseable dispatch") {
        Payload::Dispatch(dispatch) => {
            assert_eq!(dispatch.receiver_name, None);
            assert_eq!(dispatch.forwarding_stack, stack);
            assert_eq!(dispatch.message, message);
        }
        other => panic!("expected dispatch payload, got {other:?}"),
    }

    assert_eq!(
        instance.hooks().events,
        vec![HookEvent::Sent { receiver, message_id: 0xfeed }]
    );
}

#[test]
fn dispatch_without_sender_stamps_this_node() {
    let n1 = node(1);
    let n2 = node(2);
    let mut instance = Instance::new(n1);
    let mut callee = RecordingCallee::new();
    connect(&mut instance, &mut callee, stream(1), n2);

    let ok = instance.dispatch(None, &[], ActorRef::new(n2, 5), 1, b"fire-and-forget");
    assert!(ok);

    let flushed = instance.take_flushed();
    let frames = decode_frames(&flushed_bytes(&flushed, ConnectionHandle::Stream(stream(1))));
    assert_eq!(frames[0].header.source_node(), n1);
    assert_eq!(frames[0].header.source_actor(), INVALID_ACTOR_ID);
}

#[test]
fn dispatch_without_route_fails_via_hook() {
    let n1 = node(1);
    let mut instance = Instance::with_hooks(n1, RecordingHooks::default());

    let receiver = ActorRef::new(node(9), 5);
    let ok = instance.dispatch(None, &[], receiver, 7, b"nobody-home");

    assert!(!ok);
    assert!(instance.take_flushed().is_empty());
    assert_eq!(
        instance.hooks().events,
        vec![HookEvent::SendingFailed { receiver, message_id: 7 }]
    );
}

// S5: a stream frame for another node is re-emitted byte-for-byte on
// that node's route.
#[test]
fn forwarding_reemits_frame_unchanged() {
    let n1 = node(1);
    let n2 = node(2);
    let n3 = node(3);
    let mut instance = Instance::with_hooks(n1, RecordingHooks::default());
    let mut callee = RecordingCallee::new();
    connect(&mut instance, &mut callee, stream(2), n2);
    connect(&mut instance, &mut callee, stream(3), n3);

    // Payload bytes are opaque to a forwarder; deliberately not CBOR.
    let payload: Vec<u8> = b"opaque payload bytes".to_vec();
    let header = Header::new(
        Operation::DispatchMessage,
        HeaderFlags::empty(),
        77,
        n2,
        n3,
        5,
        6,
    );
    let frame = Frame::new(header, payload);

    let state = feed_stream(&mut instance, &mut callee, stream(2), &frame);
    assert_eq!(state, ConnectionState::AwaitHeader);

    // Nothing was delivered locally.
    assert!(callee.events.is_empty());

    let flushed = instance.take_flushed();
    let written = flushed_bytes(&flushed, ConnectionHandle::Stream(stream(3)));
    let mut expected = Vec::new();
    frame.encode(&mut expected).unwrap();
    assert_eq!(written, expected);

    assert_eq!(
        instance.hooks().events,
        vec![HookEvent::Forwarded { dest: n3, payload: Some(frame.payload.to_vec()) }]
    );
}

#[test]
fn forwarding_without_route_notifies_and_continues() {
    let n1 = node(1);
    let n2 = node(2);
    let mut instance = Instance::with_hooks(n1, RecordingHooks::default());
    let mut callee = RecordingCallee::new();
    connect(&mut instance, &mut callee, stream(2), n2);

    let header = Header::new(
        Operation::AnnounceProxy,
        HeaderFlags::empty(),
        0,
        n2,
        node(4),
        INVALID_ACTOR_ID,
        33,
    );
    let frame = Frame::new(header, Vec::new());

    let state = feed_stream(&mut instance, &mut callee, stream(2), &frame);
    assert_eq!(state, ConnectionState::AwaitHeader);

    assert!(callee.events.is_empty());
    assert!(instance.take_flushed().is_empty());
    assert_eq!(
        instance.hooks().events,
        vec![HookEvent::ForwardingFailed { dest: node(4) }]
    );
    // The failed forward does not cost the connection its route.
    assert_eq!(instance.tbl().lookup_hdl(n2), Some(ConnectionHandle::Stream(stream(2))));
}

// Heartbeat fan-out: exactly one heartbeat frame per direct peer, each
// flushed on its own handle.
#[test]
fn heartbeat_fans_out_to_every_direct_peer() {
    let n1 = node(1);
    let n2 = node(2);
    let n3 = node(3);
    let mut instance = Instance::new(n1);
    let mut callee = RecordingCallee::new();
    connect(&mut instance, &mut callee, stream(2), n2);
    connect(&mut instance, &mut callee, stream(3), n3);

    instance.handle_heartbeat();

    let flushed = instance.take_flushed();
    for (handle, peer) in [(stream(2), n2), (stream(3), n3)] {
        let frames = decode_frames(&flushed_bytes(&flushed, ConnectionHandle::Stream(handle)));
        assert_eq!(frames.len(), 1, "one heartbeat per peer");
        assert_eq!(frames[0].header.operation(), Some(Operation::Heartbeat));
        assert_eq!(frames[0].header.source_node(), n1);
        assert_eq!(frames[0].header.dest_node(), peer);
        assert_eq!(frames[0].header.payload_len(), 0);
    }
}

#[test]
fn heartbeat_frame_is_delivered_to_callee() {
    let n1 = node(1);
    let n2 = node(2);
    let mut instance = Instance::new(n1);
    let mut callee = RecordingCallee::new();
    connect(&mut instance, &mut callee, stream(2), n2);

    let header = Header::new(
        Operation::Heartbeat,
        HeaderFlags::empty(),
        0,
        n2,
        n1,
        INVALID_ACTOR_ID,
        INVALID_ACTOR_ID,
    );
    let state = feed_stream(&mut instance, &mut callee, stream(2), &Frame::new(header, Vec::new()));

    assert_eq!(state, ConnectionState::AwaitHeader);
    assert_eq!(callee.events, vec![CalleeEvent::Heartbeat(n2)]);
}

#[test]
fn node_shutdown_purges_exactly_once() {
    let n1 = node(1);
    let n2 = node(2);
    let mut instance = Instance::new(n1);
    let mut callee = RecordingCallee::new();
    connect(&mut instance, &mut callee, stream(2), n2);

    instance.handle_node_shutdown(&mut callee, n2);
    assert_eq!(callee.purged(), vec![n2]);
    assert_eq!(instance.tbl().lookup_hdl(n2), None);
    assert_eq!(instance.tbl().num_direct_routes(), 0);

    // Shutting down an unknown or none node does nothing.
    callee.events.clear();
    instance.handle_node_shutdown(&mut callee, n2);
    instance.handle_node_shutdown(&mut callee, NodeId::NONE);
    assert!(callee.events.is_empty());
}

#[test]
fn payload_length_mismatch_closes_connection() {
    let n1 = node(1);
    let n2 = node(2);
    let mut instance = Instance::new(n1);
    let mut callee = RecordingCallee::new();
    let handle = stream(2);
    connect(&mut instance, &mut callee, handle, n2);

    let mut header = Header::new(
        Operation::DispatchMessage,
        HeaderFlags::empty(),
        1,
        n2,
        n1,
        1,
        2,
    );
    header.set_payload_len(5);

    let mut scratch = scratch_header();
    let state =
        instance.handle_stream(&mut callee, handle, &mut scratch, &header.to_bytes(), false);
    assert_eq!(state, ConnectionState::AwaitPayload);

    // Broker hands over fewer bytes than announced.
    let state = instance.handle_stream(&mut callee, handle, &mut scratch, &[1, 2, 3], true);
    assert_eq!(state, ConnectionState::CloseConnection);
    assert!(callee.contains_purge(n2));
}

#[test]
fn malformed_dispatch_payload_closes_connection() {
    let n1 = node(1);
    let n2 = node(2);
    let mut instance = Instance::new(n1);
    let mut callee = RecordingCallee::new();
    connect(&mut instance, &mut callee, stream(2), n2);

    let header = Header::new(
        Operation::DispatchMessage,
        HeaderFlags::empty(),
        1,
        n2,
        n1,
        1,
        2,
    );
    let frame = Frame::new(header, vec![0xff, 0x13, 0x00]);

    let state = feed_stream(&mut instance, &mut callee, stream(2), &frame);
    assert_eq!(state, ConnectionState::CloseConnection);
    assert!(callee.contains_purge(n2));
}

#[test]
fn named_receiver_flag_must_match_payload() {
    let n1 = node(1);
    let n2 = node(2);
    let mut instance = Instance::new(n1);
    let mut callee = RecordingCallee::new();
    connect(&mut instance, &mut callee, stream(2), n2);

    // Flag set, but the payload carries no receiver name.
    let payload = Payload::Dispatch(Dispatch {
        receiver_name: None,
        forwarding_stack: vec![],
        message: vec![1, 2, 3],
    });
    let header = Header::new(
        Operation::DispatchMessage,
        HeaderFlags::NAMED_RECEIVER,
        1,
        n2,
        n1,
        1,
        2,
    );
    let frame = payload.into_frame(header).unwrap();

    let state = feed_stream(&mut instance, &mut callee, stream(2), &frame);
    assert_eq!(state, ConnectionState::CloseConnection);
    assert!(callee.contains_purge(n2));
}

#[test]
fn named_dispatch_delivers_to_named_receiver() {
    let n1 = node(1);
    let n2 = node(2);
    let mut instance = Instance::new(n1);
    let mut callee = RecordingCallee::new();
    connect(&mut instance, &mut callee, stream(2), n2);

    let payload = Payload::Dispatch(Dispatch {
        receiver_name: Some(0xcafe),
        forwarding_stack: vec![],
        message: b"to-the-registry".to_vec(),
    });
    let header = Header::new(
        Operation::DispatchMessage,
        HeaderFlags::NAMED_RECEIVER,
        0x42,
        n2,
        n1,
        5,
        INVALID_ACTOR_ID,
    );
    let frame = payload.into_frame(header).unwrap();

    let state = feed_stream(&mut instance, &mut callee, stream(2), &frame);
    assert_eq!(state, ConnectionState::AwaitHeader);
    assert_eq!(
        callee.events,
        vec![CalleeEvent::Delivered {
            source_node: n2,
            source_actor: 5,
            receiver: Receiver::Named(0xcafe),
            message_id: 0x42,
            forwarding_stack: vec![],
            message: b"to-the-registry".to_vec(),
        }]
    );
}

#[test]
fn announce_and_kill_proxy_reach_the_callee() {
    let n1 = node(1);
    let n2 = node(2);
    let mut instance = Instance::new(n1);
    let mut callee = RecordingCallee::new();
    connect(&mut instance, &mut callee, stream(2), n2);

    let announce = Frame::new(
        Header::new(
            Operation::AnnounceProxy,
            HeaderFlags::empty(),
            0,
            n2,
            n1,
            INVALID_ACTOR_ID,
            33,
        ),
        Vec::new(),
    );
    let state = feed_stream(&mut instance, &mut callee, stream(2), &announce);
    assert_eq!(state, ConnectionState::AwaitHeader);

    let kill = Payload::KillProxy(ExitReason::new(4, "actor terminated"))
        .into_frame(Header::new(
            Operation::KillProxy,
            HeaderFlags::empty(),
            0,
            n2,
            n1,
            44,
            INVALID_ACTOR_ID,
        ))
        .unwrap();
    let state = feed_stream(&mut instance, &mut callee, stream(2), &kill);
    assert_eq!(state, ConnectionState::AwaitHeader);

    assert_eq!(
        callee.events,
        vec![
            CalleeEvent::ProxyAnnounced { node: n2, actor: 33 },
            CalleeEvent::ProxyKilled {
                node: n2,
                actor: 44,
                reason: ExitReason::new(4, "actor terminated"),
            },
        ]
    );
}

#[test]
fn write_announce_and_kill_proxy_helpers() {
    let n1 = node(1);
    let n2 = node(2);
    let mut instance = Instance::new(n1);
    let mut callee = RecordingCallee::new();
    let handle = stream(2);
    connect(&mut instance, &mut callee, handle, n2);
    let handle = ConnectionHandle::Stream(handle);

    instance.write_announce_proxy(handle, n2, 33);
    instance.write_kill_proxy(handle, n2, 44, ExitReason::new(1, "down"));
    instance.flush(handle);

    let flushed = instance.take_flushed();
    let frames = decode_frames(&flushed_bytes(&flushed, handle));
    assert_eq!(frames.len(), 2);

    assert_eq!(frames[0].header.operation(), Some(Operation::AnnounceProxy));
    assert_eq!(frames[0].header.dest_actor(), 33);
    assert_eq!(frames[0].header.payload_len(), 0);

    assert_eq!(frames[1].header.operation(), Some(Operation::KillProxy));
    assert_eq!(frames[1].header.source_actor(), 44);
    match Payload::from_frame(frames[1].clone()).unwrap() {
        Payload::KillProxy(reason) => assert_eq!(reason, ExitReason::new(1, "down")),
        other => panic!("expected kill proxy payload, got {other:?}"),
    }
}

// End to end: what one instance dispatches, a second instance delivers
// unchanged.
#[test]
fn dispatch_round_trips_between_two_instances() {
    let n1 = node(1);
    let n2 = node(2);
    let mut sender_side = Instance::new(n1);
    let mut receiver_side = Instance::new(n2);
    let mut sender_callee = RecordingCallee::new();
    let mut receiver_callee = RecordingCallee::new();
    connect(&mut sender_side, &mut sender_callee, stream(1), n2);

    let stack = vec![ActorRef::new(n1, 7)];
    let ok = sender_side.dispatch(
        Some(ActorRef::new(n1, 7)),
        &stack,
        ActorRef::new(n2, 8),
        99,
        b"request-body",
    );
    assert!(ok);

    let flushed = sender_side.take_flushed();
    let wire = flushed_bytes(&flushed, ConnectionHandle::Stream(stream(1)));
    for frame in decode_frames(&wire) {
        let state = feed_stream(&mut receiver_side, &mut receiver_callee, stream(9), &frame);
        assert_eq!(state, ConnectionState::AwaitHeader);
    }

    assert_eq!(
        receiver_callee.events,
        vec![CalleeEvent::Delivered {
            source_node: n1,
            source_actor: 7,
            receiver: Receiver::Actor(8),
            message_id: 99,
            forwarding_stack: stack,
            message: b"request-body".to_vec(),
        }]
    );
}

// Route lookups prefer direct entries and fall back to reserved
// indirect entries; exercised here against the public table since no
// receive path installs indirect routes today.
#[test]
fn table_lookup_matches_dispatch_routing() {
    let mut tbl = RoutingTable::new();
    let n2 = node(2);
    let h = ConnectionHandle::Stream(stream(1));
    tbl.add(h, n2);
    assert!(tbl.add_indirect(n2, node(3)));

    let direct = tbl.lookup(n2).unwrap();
    assert_eq!(direct.next_hop, n2);

    let indirect = tbl.lookup(node(3)).unwrap();
    assert_eq!(indirect.handle, h);
    assert_eq!(indirect.next_hop, n2);
}
