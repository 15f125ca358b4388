//! Hand-written protobuf types for the room journal.
//!
//! Uses prost derive macros for encode/decode without prost-build.
//! Field numbers are the wire contract; never renumber.

use prost::Message;

// ── Envelope ───────────────────────────────────────────────────

#[derive(Clone, PartialEq, Message)]
pub struct ProtoEventEnvelope {
    #[prost(uint64, tag = "1")]
    pub sequence: u64,
    #[prost(string, tag = "2")]
    pub room_id: String,
    #[prost(uint32, tag = "3")]
    pub turn: u32,
    #[prost(string, tag = "4")]
    pub phase: String,
    #[prost(int64, tag = "5")]
    pub timestamp_ms: i64,
    #[prost(message, optional, tag = "6")]
    pub event: Option<ProtoRoomEvent>,
}

#[derive(Clone, PartialEq, Message)]
pub struct ProtoRoomEvent {
    #[prost(oneof = "EventKind", tags = "1, 2, 3, 4, 5, 6, 7, 8")]
    pub kind: Option<EventKind>,
}

#[derive(Clone, PartialEq, prost::Oneof)]
pub enum EventKind {
    #[prost(message, tag = "1")]
    ParticipantJoined(ParticipantChange),
    #[prost(message, tag = "2")]
    ParticipantLeft(ParticipantChange),
    #[prost(message, tag = "3")]
    GameStarted(GameStarted),
    #[prost(message, tag = "4")]
    PhaseChanged(PhaseChanged),
    #[prost(message, tag = "5")]
    ParticipantSubmitted(ParticipantSubmitted),
    #[prost(message, tag = "6")]
    TurnResolved(TurnResolved),
    #[prost(message, tag = "7")]
    GameOver(GameOver),
    #[prost(message, tag = "8")]
    GameError(GameError),
}

// ── Event Types ────────────────────────────────────────────────

#[derive(Clone, PartialEq, Message)]
pub struct ParticipantChange {
    #[prost(string, tag = "1")]
    pub participant: String,
    #[prost(string, tag = "2")]
    pub role: String,
}

#[derive(Clone, PartialEq, Message)]
pub struct GameStarted {
    #[prost(string, tag = "1")]
    pub scenario_id: String,
    #[prost(uint32, tag = "2")]
    pub max_turns: u32,
}

#[derive(Clone, PartialEq, Message)]
pub struct PhaseChanged {
    #[prost(string, tag = "1")]
    pub from: String,
    #[prost(string, tag = "2")]
    pub to: String,
}

#[derive(Clone, PartialEq, Message)]
pub struct ParticipantSubmitted {
    #[prost(string, tag = "1")]
    pub role: String,
    #[prost(uint32, tag = "2")]
    pub action_count: u32,
}

/// The summary travels as JSON; it is the engine's own serde form.
#[derive(Clone, PartialEq, Message)]
pub struct TurnResolved {
    #[prost(uint32, tag = "1")]
    pub turn: u32,
    #[prost(string, tag = "2")]
    pub summary_json: String,
}

#[derive(Clone, PartialEq, Message)]
pub struct GameOver {
    /// Empty for a draw.
    #[prost(string, tag = "1")]
    pub winner: String,
    #[prost(string, tag = "2")]
    pub reason: String,
    #[prost(uint32, tag = "3")]
    pub decided_on_turn: u32,
    #[prost(int64, tag = "4")]
    pub architect_attainment: i64,
    #[prost(int64, tag = "5")]
    pub prospect_attainment: i64,
}

#[derive(Clone, PartialEq, Message)]
pub struct GameError {
    #[prost(string, tag = "1")]
    pub message: String,
}
