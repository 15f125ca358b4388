//! Room events and their delivery.
//!
//! Every state-machine transition publishes typed events. Each envelope
//! carries the room, a per-room sequence number, and the turn and phase it
//! refers to, so a client can drop stale or re-delivered events.
//! Delivery is behind `EventSink`; the transport is someone else's problem.

use std::sync::Mutex;

use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

use negotiation_engine::domain::{Outcome, Role};
use negotiation_engine::summary::TurnSummary;

use crate::room::{ParticipantId, Phase, RoomId};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum RoomEvent {
    ParticipantJoined {
        participant: ParticipantId,
        role: Role,
    },
    ParticipantLeft {
        participant: ParticipantId,
        role: Role,
    },
    GameStarted {
        scenario_id: String,
        max_turns: u32,
    },
    PhaseChanged {
        from: Phase,
        to: Phase,
    },
    /// Never carries the submitted actions.
    ParticipantSubmitted {
        role: Role,
        action_count: usize,
    },
    TurnResolved {
        summary: TurnSummary,
    },
    GameOver {
        outcome: Outcome,
    },
    /// The turn could not be resolved and was not applied.
    GameError {
        message: String,
    },
}

impl RoomEvent {
    pub fn name(&self) -> &'static str {
        match self {
            RoomEvent::ParticipantJoined { .. } => "participant-joined",
            RoomEvent::ParticipantLeft { .. } => "participant-left",
            RoomEvent::GameStarted { .. } => "game-started",
            RoomEvent::PhaseChanged { .. } => "phase-changed",
            RoomEvent::ParticipantSubmitted { .. } => "participant-submitted",
            RoomEvent::TurnResolved { .. } => "turn-resolved",
            RoomEvent::GameOver { .. } => "game-over",
            RoomEvent::GameError { .. } => "game-error",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventEnvelope {
    pub room_id: RoomId,
    /// Strictly increasing per room, starting at 1.
    pub sequence: u64,
    pub turn: u32,
    pub phase: Phase,
    pub timestamp_ms: i64,
    pub event: RoomEvent,
}

pub trait EventSink: Send + Sync {
    fn publish(&self, envelope: &EventEnvelope);
}

// ---------------------------------------------------------------------------
// Sinks
// ---------------------------------------------------------------------------

/// Fan-out over a tokio broadcast channel. Works without a running runtime.
pub struct BroadcastSink {
    sender: broadcast::Sender<EventEnvelope>,
}

impl BroadcastSink {
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self { sender }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<EventEnvelope> {
        self.sender.subscribe()
    }
}

impl EventSink for BroadcastSink {
    fn publish(&self, envelope: &EventEnvelope) {
        // No subscribers is fine; late joiners catch up via events_since.
        let _ = self.sender.send(envelope.clone());
    }
}

/// Records everything it is given.
#[derive(Default)]
pub struct MemorySink {
    events: Mutex<Vec<EventEnvelope>>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<EventEnvelope> {
        match self.events.lock() {
            Ok(events) => events.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    pub fn for_room(&self, room_id: &str) -> Vec<EventEnvelope> {
        self.events()
            .into_iter()
            .filter(|e| e.room_id == room_id)
            .collect()
    }
}

impl EventSink for MemorySink {
    fn publish(&self, envelope: &EventEnvelope) {
        match self.events.lock() {
            Ok(mut events) => events.push(envelope.clone()),
            Err(poisoned) => poisoned.into_inner().push(envelope.clone()),
        }
    }
}

pub struct NullSink;

impl EventSink for NullSink {
    fn publish(&self, _envelope: &EventEnvelope) {}
}

#[cfg(test)]
mod tests {
    use super::*;

    fn envelope(sequence: u64) -> EventEnvelope {
        EventEnvelope {
            room_id: "room-a".into(),
            sequence,
            turn: 1,
            phase: Phase::Planning,
            timestamp_ms: 0,
            event: RoomEvent::ParticipantSubmitted {
                role: Role::Prospect,
                action_count: 2,
            },
        }
    }

    #[test]
    fn test_event_json_is_tagged() {
        let v = serde_json::to_value(envelope(1)).unwrap();
        assert_eq!(v["event"]["type"], "participant-submitted");
        assert_eq!(v["event"]["role"], "prospect");
        assert_eq!(v["phase"], "planning");
        assert!(v["event"].get("actions").is_none());
    }

    #[test]
    fn test_broadcast_without_subscribers_then_with() {
        let sink = BroadcastSink::new(4);
        sink.publish(&envelope(1));
        let mut rx = sink.subscribe();
        sink.publish(&envelope(2));
        assert_eq!(rx.try_recv().unwrap().sequence, 2);
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn test_memory_sink_filters_by_room() {
        let sink = MemorySink::new();
        sink.publish(&envelope(1));
        let mut other = envelope(1);
        other.room_id = "room-b".into();
        sink.publish(&other);
        assert_eq!(sink.events().len(), 2);
        assert_eq!(sink.for_room("room-a").len(), 1);
    }
}
