//! # BASP: Wire Format
//!
//! This crate implements the binary framing layer for the Binary Actor
//! System Protocol (BASP), the wire protocol that connects actor system
//! nodes over stream and datagram transports.
//!
//! ## Protocol Design
//!
//! The protocol uses a hybrid encoding strategy optimized for cheap
//! routing decisions:
//! - **Header**: 72 bytes of raw binary (Big Endian) for zero-copy
//!   routing
//! - **Payload**: Variable-length CBOR-encoded structured data
//!
//! A frame is the header followed by exactly `payload_len` bytes of
//! body. Multiple frames may be concatenated inside a single datagram;
//! stream transports read header and payload in two phases.
//!
//! ## Implementation Notes
//!
//! - **Zero-Copy Parsing**: We use [`zerocopy`](https://docs.rs/zerocopy)
//!   to cast network bytes directly to [`Header`] structures, avoiding
//!   deserialization overhead on the receive hot path. The routing
//!   decision (forward or handle locally) only needs the header.
//!
//! - **CBOR for Payloads**: While the header is raw binary for
//!   performance, payloads use CBOR to maintain forward compatibility
//!   and type safety. A node that merely forwards a frame never
//!   deserializes its payload; only the terminal node does.
//!
//! - **Opaque User Messages**: The content of a dispatched actor message
//!   is carried as raw bytes with a declared length. Interpreting those
//!   bytes is the job of the actor system above this crate.
//!
//! ## Security Properties
//!
//! - **No Unsafe Deserialization**: All parsing uses `zerocopy` with
//!   compile-time layout verification. Malformed headers are rejected
//!   before any data is copied.
//!
//! - **Size Limits**: The protocol enforces a 16 MB maximum payload size
//!   to prevent memory exhaustion through a single frame.
//!
//! - **Explicit Validation**: All parsing functions validate invariants
//!   and return `Result` types. There are no "unchecked" fast paths.
#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod errors;
pub mod flags;
pub mod frame;
pub mod header;
pub mod ids;
pub mod operation;
pub mod payloads;

pub use errors::{ProtocolError, Result};
pub use flags::HeaderFlags;
pub use frame::Frame;
pub use header::Header;
pub use ids::{ActorId, ActorRef, MessageId, NodeId, INVALID_ACTOR_ID};
pub use operation::Operation;
pub use payloads::Payload;

/// Protocol version carried in the `operation_data` field of every
/// handshake frame. Peers with a different version are rejected during
/// the handshake.
pub const VERSION: u64 = 1;
