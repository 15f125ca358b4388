//! Replay orchestrator — rebuild a match from its journal.
//!
//! The journal's `turn-resolved` records carry every summary, and each
//! summary names the actions it resolved. Feeding those back through the
//! engine from the scenario reproduces the match state. All domain logic
//! stays in the engine.

use tracing::warn;

use negotiation_engine::engine::MatchEngine;
use negotiation_engine::hashing::canonical_hash;
use negotiation_engine::resolver::Submissions;
use negotiation_engine::scenario::Scenario;
use negotiation_engine::summary::TurnSummary;

use crate::error::{Result, RoomError};
use crate::events::{EventEnvelope, RoomEvent};
use crate::room::{Phase, Room};

/// Resolved turns in journal order.
pub fn resolved_turns(envelopes: &[EventEnvelope]) -> Vec<TurnSummary> {
    envelopes
        .iter()
        .filter_map(|e| match &e.event {
            RoomEvent::TurnResolved { summary } => Some(summary.clone()),
            _ => None,
        })
        .collect()
}

/// Fresh match from `scenario`, then every resolved turn in order.
pub fn rebuild_match(scenario: &Scenario, turns: &[TurnSummary]) -> Result<MatchEngine> {
    let submissions: Vec<Submissions> = turns.iter().map(|t| t.submissions()).collect();
    MatchEngine::replay(scenario, &submissions).map_err(|e| RoomError::Resolution(format!("replay: {e}")))
}

/// Rebuild and return only the canonical hash.
pub fn rebuild_hash(scenario: &Scenario, turns: &[TurnSummary]) -> Result<String> {
    let engine = rebuild_match(scenario, turns)?;
    engine.hash().map_err(|e| RoomError::Storage(e.to_string()))
}

/// Compare a restored room with a replay of its journal. On a mismatch the
/// replayed match wins: the room takes its state and history, and its
/// phase follows the replayed outcome. Returns true when the room changed.
pub fn reconcile(room: &mut Room, envelopes: &[EventEnvelope]) -> Result<bool> {
    let turns = resolved_turns(envelopes);
    let engine = rebuild_match(&room.scenario, &turns)?;
    let replayed = engine.hash().map_err(|e| RoomError::Storage(e.to_string()))?;
    let stored = canonical_hash(&room.state).map_err(|e| RoomError::Storage(e.to_string()))?;
    if replayed == stored {
        return Ok(false);
    }

    warn!(
        room = %room.id,
        stored = %stored,
        replayed = %replayed,
        turns = turns.len(),
        "snapshot disagrees with journal, using replayed state"
    );
    room.state = engine.state().clone();
    room.history = engine.history().to_vec();
    room.submissions.clear();
    if room.state.is_over() {
        room.phase = Phase::Complete;
        room.planning_since_ms = None;
    } else if room.phase == Phase::Complete {
        room.phase = Phase::Planning;
    }
    if let Some(last) = envelopes.last() {
        room.last_sequence = room.last_sequence.max(last.sequence);
    }
    Ok(true)
}
