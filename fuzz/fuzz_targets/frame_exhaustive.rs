//! Exhaustive positive space fuzzer for Frame encoding/decoding
//!
//! Unlike pure random fuzzing, this fuzzer EXHAUSTIVELY tests
//! combinations of:
//! - All 8 operations
//! - Edge-case values (0, 1, MAX) for all id fields
//! - Empty and small payloads
//!
//! This ensures we don't miss bugs that occur only with specific
//! operation+value combinations that random sampling might not hit.
//! The raw input additionally drives a negative decode pass.

#![no_main]

use basp_proto::{Frame, Header, HeaderFlags, NodeId, Operation};
use libfuzzer_sys::fuzz_target;

// All operations to test exhaustively
const ALL_OPERATIONS: &[Operation] = &[
    Operation::ServerHandshake,
    Operation::ClientHandshake,
    Operation::UdpServerHandshake,
    Operation::UdpClientHandshake,
    Operation::DispatchMessage,
    Operation::AnnounceProxy,
    Operation::KillProxy,
    Operation::Heartbeat,
];

// Edge-case values for the 64-bit operation_data field
const U64_EDGES: &[u64] = &[
    0,
    1,
    0x1000,          // Typical small value
    u32::MAX as u64, // 32-bit boundary
    u64::MAX / 2,    // Mid-range
    u64::MAX - 1,
    u64::MAX,
];

// Edge-case values for 32-bit actor ids
const U32_EDGES: &[u32] = &[0, 1, 0x1000, u32::MAX / 2, u32::MAX - 1, u32::MAX];

// Payload sizes to test
const PAYLOAD_SIZES: &[usize] = &[
    0,   // Empty
    1,   // Single byte
    71,  // Just under the header size
    72,  // Exactly the header size
    255, // One length byte
    256, // Two length bytes
    1024,
];

fuzz_target!(|data: &[u8]| {
    // Use input data to select which combination to test. This allows
    // libFuzzer to guide exploration while remaining exhaustive.
    if data.len() < 4 {
        return;
    }

    let operation_idx = data[0] as usize % ALL_OPERATIONS.len();
    let data_idx = data[1] as usize % U64_EDGES.len();
    let actor_idx = data[2] as usize % U32_EDGES.len();
    let node_seed = data[3];

    let operation = ALL_OPERATIONS[operation_idx];
    let operation_data = U64_EDGES[data_idx];
    let actor = U32_EDGES[actor_idx];
    let source_node = NodeId::from_parts([node_seed; 20], u32::from(node_seed));
    let dest_node = NodeId::from_parts([node_seed.wrapping_add(1); 20], 1);

    for &dest_actor in U32_EDGES {
        let header = Header::new(
            operation,
            HeaderFlags::empty(),
            operation_data,
            source_node,
            dest_node,
            actor,
            dest_actor,
        );

        for &payload_size in PAYLOAD_SIZES {
            let payload = if payload_size <= data.len() - 4 {
                data[4..4 + payload_size].to_vec()
            } else {
                vec![0u8; payload_size]
            };

            let frame = Frame::new(header, payload.clone());

            // INVARIANT 1: Encoding must succeed
            let mut buf = Vec::new();
            frame.encode(&mut buf).expect("encode should never fail for valid frame");

            // INVARIANT 2: Decoding must succeed
            let decoded = Frame::decode(&buf).expect("decode should succeed for valid encoding");

            // INVARIANT 3: Round-trip must be identity
            assert_eq!(decoded.header.operation(), Some(operation));
            assert_eq!(decoded.header.operation_data(), operation_data);
            assert_eq!(decoded.header.source_node(), source_node);
            assert_eq!(decoded.header.dest_node(), dest_node);
            assert_eq!(decoded.header.source_actor(), actor);
            assert_eq!(decoded.header.dest_actor(), dest_actor);
            assert_eq!(decoded.payload.len(), payload.len());

            // INVARIANT 4: Encoded size must be correct
            assert_eq!(buf.len(), Header::SIZE + payload.len());
        }
    }

    // Negative space: decoding arbitrary input must never panic, and a
    // successful decode implies a consistent length claim.
    if let Ok(frame) = Frame::decode(data) {
        assert_eq!(frame.header.payload_len() as usize, frame.payload.len());
        assert!(frame.wire_len() <= data.len());
    }
});
