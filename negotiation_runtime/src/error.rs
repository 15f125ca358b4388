//! Runtime errors.
//!
//! Validation and state-machine errors are returned synchronously to the
//! caller. `Resolution` means the turn was not applied; the room stays
//! valid and is back in planning. `Storage` covers the journal, snapshots
//! and codecs.

use std::io;

use thiserror::Error;

use negotiation_engine::error::Rejection;

use crate::room::Phase;

#[derive(Debug, Error)]
pub enum RoomError {
    #[error("submission rejected: {0}")]
    Validation(#[from] Rejection),

    #[error("room is not ready to start (phase {0})")]
    NotReady(Phase),

    #[error("{operation} is not allowed while the room is {phase}")]
    WrongPhase { operation: &'static str, phase: Phase },

    #[error("room already has two participants")]
    RoomFull,

    #[error("{0} is not a participant of this room")]
    NotParticipant(String),

    #[error("game is complete")]
    Complete,

    #[error("unknown room {0}")]
    UnknownRoom(String),

    #[error("no room with code {0}")]
    UnknownCode(String),

    #[error("unknown scenario {0}")]
    UnknownScenario(String),

    #[error("turn resolution failed: {0}")]
    Resolution(String),

    #[error("storage error: {0}")]
    Storage(String),

    #[error("room lock poisoned")]
    LockPoisoned,
}

impl From<io::Error> for RoomError {
    fn from(err: io::Error) -> Self {
        RoomError::Storage(err.to_string())
    }
}

impl From<serde_json::Error> for RoomError {
    fn from(err: serde_json::Error) -> Self {
        RoomError::Storage(format!("json: {err}"))
    }
}

pub type Result<T> = std::result::Result<T, RoomError>;
