#![forbid(unsafe_code)]

//! Architect vs. Prospect negotiation engine.
//!
//! Pure, deterministic kernel: estate graph, scorecards, the two role
//! catalogs and the turn resolver. No I/O apart from loading scenarios.

/// Engine v1. Part of every canonical hash.
pub const ENGINE_VERSION: u32 = 1;

pub mod arithmetic;
pub mod error;
pub mod domain;
pub mod catalog;
pub mod graph;
pub mod metrics;
pub mod transitions;
pub mod scenario;
pub mod state;
pub mod summary;
pub mod resolver;
pub mod invariants;
pub mod hashing;
pub mod engine;

pub use catalog::{ActionClass, ActionKind, PlannedAction};
pub use domain::Role;
pub use error::{EngineError, Rejection};
pub use resolver::{resolve_turn, Submissions};
pub use scenario::Scenario;
pub use state::MatchState;
pub use summary::TurnSummary;
