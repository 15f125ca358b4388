#![forbid(unsafe_code)]

//! Negotiation runtime.
//!
//! Rooms around the pure negotiation engine: lifecycle state machine,
//! session gateway, typed event publication, an append-only journal,
//! hashed snapshots and replay-based recovery.
//!
//! No game rules live here. Validation, resolution and invariants are
//! the engine's.

pub mod error;
pub mod config;
pub mod clock;
pub mod events;
pub mod room;
pub mod proto_types;
pub mod proto_bridge;
pub mod event_store;
pub mod snapshot;
pub mod replay;
pub mod session;
pub mod gateway;

pub use config::RuntimeConfig;
pub use error::{Result, RoomError};
pub use events::{EventEnvelope, EventSink, RoomEvent};
pub use gateway::Gateway;
pub use room::{Phase, RoomView};
