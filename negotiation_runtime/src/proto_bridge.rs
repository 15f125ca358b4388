//! Proto ↔ runtime conversion bridge.
//!
//! Converts between the protobuf journal records (proto_types.rs) and
//! `EventEnvelope`. Decoding is strict: an unknown role or phase string, or
//! a missing event body, is a storage error rather than a default.

use negotiation_engine::domain::{Outcome, Role};
use negotiation_engine::summary::TurnSummary;

use crate::error::{Result, RoomError};
use crate::events::{EventEnvelope, RoomEvent};
use crate::proto_types::*;
use crate::room::Phase;

fn parse_role(s: &str) -> Result<Role> {
    Role::RESOLUTION_ORDER
        .into_iter()
        .find(|r| r.as_str() == s)
        .ok_or_else(|| RoomError::Storage(format!("journal: unknown role {s:?}")))
}

fn parse_phase(s: &str) -> Result<Phase> {
    Phase::parse(s).ok_or_else(|| RoomError::Storage(format!("journal: unknown phase {s:?}")))
}

fn participant(participant: &str, role: Role) -> ParticipantChange {
    ParticipantChange {
        participant: participant.to_string(),
        role: role.as_str().to_string(),
    }
}

/// Convert an envelope to its journal record.
pub fn envelope_to_proto(envelope: &EventEnvelope) -> Result<ProtoEventEnvelope> {
    let kind = match &envelope.event {
        RoomEvent::ParticipantJoined { participant: p, role } => {
            EventKind::ParticipantJoined(participant(p, *role))
        }
        RoomEvent::ParticipantLeft { participant: p, role } => {
            EventKind::ParticipantLeft(participant(p, *role))
        }
        RoomEvent::GameStarted {
            scenario_id,
            max_turns,
        } => EventKind::GameStarted(GameStarted {
            scenario_id: scenario_id.clone(),
            max_turns: *max_turns,
        }),
        RoomEvent::PhaseChanged { from, to } => EventKind::PhaseChanged(PhaseChanged {
            from: from.as_str().to_string(),
            to: to.as_str().to_string(),
        }),
        RoomEvent::ParticipantSubmitted { role, action_count } => {
            EventKind::ParticipantSubmitted(ParticipantSubmitted {
                role: role.as_str().to_string(),
                action_count: u32::try_from(*action_count).unwrap_or(u32::MAX),
            })
        }
        RoomEvent::TurnResolved { summary } => EventKind::TurnResolved(TurnResolved {
            turn: summary.turn,
            summary_json: serde_json::to_string(summary)?,
        }),
        RoomEvent::GameOver { outcome } => EventKind::GameOver(GameOver {
            winner: outcome
                .winner
                .map(|r| r.as_str().to_string())
                .unwrap_or_default(),
            reason: outcome.reason.clone(),
            decided_on_turn: outcome.decided_on_turn,
            architect_attainment: outcome.architect_attainment,
            prospect_attainment: outcome.prospect_attainment,
        }),
        RoomEvent::GameError { message } => EventKind::GameError(GameError {
            message: message.clone(),
        }),
    };
    Ok(ProtoEventEnvelope {
        sequence: envelope.sequence,
        room_id: envelope.room_id.clone(),
        turn: envelope.turn,
        phase: envelope.phase.as_str().to_string(),
        timestamp_ms: envelope.timestamp_ms,
        event: Some(ProtoRoomEvent { kind: Some(kind) }),
    })
}

/// Convert a journal record back to an envelope.
pub fn proto_to_envelope(proto: &ProtoEventEnvelope) -> Result<EventEnvelope> {
    let kind = proto
        .event
        .as_ref()
        .and_then(|e| e.kind.as_ref())
        .ok_or_else(|| {
            RoomError::Storage(format!("journal: record {} has no event", proto.sequence))
        })?;

    let event = match kind {
        EventKind::ParticipantJoined(p) => RoomEvent::ParticipantJoined {
            participant: p.participant.clone(),
            role: parse_role(&p.role)?,
        },
        EventKind::ParticipantLeft(p) => RoomEvent::ParticipantLeft {
            participant: p.participant.clone(),
            role: parse_role(&p.role)?,
        },
        EventKind::GameStarted(g) => RoomEvent::GameStarted {
            scenario_id: g.scenario_id.clone(),
            max_turns: g.max_turns,
        },
        EventKind::PhaseChanged(c) => RoomEvent::PhaseChanged {
            from: parse_phase(&c.from)?,
            to: parse_phase(&c.to)?,
        },
        EventKind::ParticipantSubmitted(s) => RoomEvent::ParticipantSubmitted {
            role: parse_role(&s.role)?,
            action_count: s.action_count as usize,
        },
        EventKind::TurnResolved(t) => {
            let summary: TurnSummary = serde_json::from_str(&t.summary_json)?;
            if summary.turn != t.turn {
                return Err(RoomError::Storage(format!(
                    "journal: record {} claims turn {} but carries turn {}",
                    proto.sequence, t.turn, summary.turn
                )));
            }
            RoomEvent::TurnResolved { summary }
        }
        EventKind::GameOver(g) => RoomEvent::GameOver {
            outcome: Outcome {
                winner: if g.winner.is_empty() {
                    None
                } else {
                    Some(parse_role(&g.winner)?)
                },
                reason: g.reason.clone(),
                decided_on_turn: g.decided_on_turn,
                architect_attainment: g.architect_attainment,
                prospect_attainment: g.prospect_attainment,
            },
        },
        EventKind::GameError(e) => RoomEvent::GameError {
            message: e.message.clone(),
        },
    };

    Ok(EventEnvelope {
        room_id: proto.room_id.clone(),
        sequence: proto.sequence,
        turn: proto.turn,
        phase: parse_phase(&proto.phase)?,
        timestamp_ms: proto.timestamp_ms,
        event,
    })
}
