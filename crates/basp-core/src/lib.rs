//! BASP protocol core logic
//!
//! This crate contains the per-node protocol engine for BASP: the
//! routing table, the peer write path, the connection state machine,
//! and the instance facade. It is completely decoupled from I/O,
//! enabling deterministic testing.
//!
//! # Architecture: "The Hollow Shell"
//!
//! Protocol logic is strictly separated from transport concerns:
//!
//! ```text
//!      ┌─────────────────────────────┐
//!      │ basp-core                   │
//!      │ - Connection state machine  │
//!      │ - Routing table             │
//!      │ - Peer write path           │
//!      └─────────────────────────────┘
//!         ↓                      ↓
//! ┌────────────────┐  ┌─────────────────┐
//! │ test doubles   │  │ transport broker│
//! │ - Recording    │  │ - Sockets       │
//! │   callee/hooks │  │ - Read loops    │
//! │ - Scripted     │  │ - Timeouts      │
//! │   frames       │  │ - Production    │
//! └────────────────┘  └─────────────────┘
//! ```
//!
//! # Key Principles
//!
//! - No I/O in Core: the broker owns sockets, reads, and time; the
//!   core is a synchronous automaton over byte buffers
//! - Capability Traits: all effects on the actor system go through the
//!   [`Callee`] trait; observability goes through [`Hooks`]
//! - Deterministic: given the same inputs, produce the same outputs
//!
//! # Modules
//!
//! - [`instance`]: The protocol instance (state machine, write path,
//!   facade operations)
//! - [`routing`]: Routing table, transport handles, write buffers
//! - [`callee`]: Upper-layer capability set
//! - [`hooks`]: Observability hook set

#![forbid(unsafe_code)]
#![deny(missing_docs)]

pub mod callee;
pub mod hooks;
pub mod instance;
pub mod routing;

pub use callee::{Callee, Receiver};
pub use hooks::{Hooks, NoopHooks};
pub use instance::{ConnectionState, Instance, PublishedActor};
pub use routing::{ConnectionHandle, DatagramHandle, Endpoint, RoutingTable, StreamHandle};
