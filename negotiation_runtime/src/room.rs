//! Room state machine — one game's lifecycle.
//!
//!   waiting <-> ready -> planning -> resolving -> planning | complete
//!
//! The room is the persisted aggregate: scenario, participants, match state,
//! the current turn's submissions and the resolved history. It does no I/O
//! and never reads a clock; callers pass `now_ms`. Every transition records
//! its events in an outbox that `session` sequences, persists and publishes.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};
use tracing::{error, info, warn};

use negotiation_engine::catalog::{available_actions, validate_submission, ActionKind, PlannedAction};
use negotiation_engine::domain::{Counters, Obligation, Outcome, Role, TimelineEntry};
use negotiation_engine::graph::Estate;
use negotiation_engine::invariants::try_validate_invariants;
use negotiation_engine::metrics::Scorecards;
use negotiation_engine::resolver::{resolve_turn, Submissions};
use negotiation_engine::scenario::Scenario;
use negotiation_engine::state::MatchState;
use negotiation_engine::summary::TurnSummary;

use crate::error::{Result, RoomError};
use crate::events::RoomEvent;

pub type RoomId = String;
pub type ParticipantId = String;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Phase {
    /// Fewer than two participants.
    Waiting,
    /// Two participants, not started.
    Ready,
    Planning,
    /// System only. Never observed outside the room lock.
    Resolving,
    /// Terminal.
    Complete,
}

impl Phase {
    pub fn as_str(self) -> &'static str {
        match self {
            Phase::Waiting => "waiting",
            Phase::Ready => "ready",
            Phase::Planning => "planning",
            Phase::Resolving => "resolving",
            Phase::Complete => "complete",
        }
    }

    pub fn parse(s: &str) -> Option<Phase> {
        [
            Phase::Waiting,
            Phase::Ready,
            Phase::Planning,
            Phase::Resolving,
            Phase::Complete,
        ]
        .into_iter()
        .find(|p| p.as_str() == s)
    }
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Participant {
    pub id: ParticipantId,
    pub connected: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Submission {
    pub actions: Vec<PlannedAction>,
    pub submitted_at_ms: i64,
}

/// An event waiting for a sequence number.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingEvent {
    pub turn: u32,
    pub phase: Phase,
    pub event: RoomEvent,
}

/// Result of a resolution attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Resolution {
    /// Not both sides present, or not planning.
    Pending,
    Resolved(TurnSummary),
    /// Nothing applied; the room is back in planning.
    Failed(String),
}

/// Lobby line.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoomInfo {
    pub room_id: RoomId,
    pub code: String,
    pub scenario_id: String,
    pub phase: Phase,
    pub current_turn: u32,
    pub max_turns: u32,
    pub participants: usize,
}

/// Point-in-time view for one participant. Never includes the opponent's
/// planned actions.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoomView {
    pub room: RoomInfo,
    pub role: Role,
    /// Set once the game is complete.
    pub read_only: bool,
    pub estate: Estate,
    /// Edge density of the estate, fixed-point (SCALE = 100%).
    pub estate_density: i64,
    pub isolated_nodes: Vec<String>,
    pub turns_remaining: u32,
    pub counters: Counters,
    pub scorecards: Scorecards,
    pub my_planned_actions: Vec<PlannedAction>,
    pub opponent_submitted: bool,
    pub obligation: Option<Obligation>,
    pub available_actions: Vec<ActionKind>,
    pub last_summary: Option<TurnSummary>,
    pub timeline: Vec<TimelineEntry>,
    pub outcome: Option<Outcome>,
    pub last_error: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Room {
    pub id: RoomId,
    pub code: String,
    pub scenario: Scenario,
    pub phase: Phase,
    pub participants: BTreeMap<Role, Participant>,
    pub state: MatchState,
    /// Submissions for `state.current_turn`. Cleared by every resolution.
    pub submissions: BTreeMap<Role, Submission>,
    pub planning_since_ms: Option<i64>,
    pub history: Vec<TurnSummary>,
    pub last_error: Option<String>,
    /// Sequence of the last committed event.
    pub last_sequence: u64,
    #[serde(skip)]
    outbox: Vec<PendingEvent>,
}

impl Room {
    /// New room in `waiting`. The creator takes the Architect seat.
    pub fn new(id: RoomId, code: String, scenario: Scenario, creator: &str) -> Result<Self> {
        let state = MatchState::from_scenario(&scenario)
            .map_err(|e| RoomError::UnknownScenario(format!("{}: {e}", scenario.id)))?;
        let mut room = Self {
            id,
            code,
            scenario,
            phase: Phase::Waiting,
            participants: BTreeMap::new(),
            state,
            submissions: BTreeMap::new(),
            planning_since_ms: None,
            history: Vec::new(),
            last_error: None,
            last_sequence: 0,
            outbox: Vec::new(),
        };
        room.seat(Role::Architect, creator);
        Ok(room)
    }

    pub fn role_of(&self, participant: &str) -> Option<Role> {
        self.participants
            .iter()
            .find(|(_, p)| p.id == participant)
            .map(|(role, _)| *role)
    }

    fn require_role(&self, participant: &str) -> Result<Role> {
        self.role_of(participant)
            .ok_or_else(|| RoomError::NotParticipant(participant.to_string()))
    }

    pub fn is_complete(&self) -> bool {
        self.phase == Phase::Complete
    }

    // -- lifecycle --

    /// Join, or rejoin an existing seat. Rejoining a complete room changes
    /// nothing and yields the seat for a read-only view.
    pub fn join(&mut self, participant: &str) -> Result<Role> {
        if let Some(role) = self.role_of(participant) {
            if self.is_complete() {
                return Ok(role);
            }
            let reconnected = self
                .participants
                .get_mut(&role)
                .map(|seat| !std::mem::replace(&mut seat.connected, true))
                .unwrap_or(false);
            if reconnected {
                self.emit(RoomEvent::ParticipantJoined {
                    participant: participant.to_string(),
                    role,
                });
            }
            return Ok(role);
        }
        if self.is_complete() {
            return Err(RoomError::Complete);
        }
        let role = [Role::Architect, Role::Prospect]
            .into_iter()
            .find(|r| !self.participants.contains_key(r))
            .ok_or(RoomError::RoomFull)?;
        self.seat(role, participant);
        if self.participants.len() == 2 && self.phase == Phase::Waiting {
            self.set_phase(Phase::Ready);
        }
        Ok(role)
    }

    fn seat(&mut self, role: Role, participant: &str) {
        self.participants.insert(
            role,
            Participant {
                id: participant.to_string(),
                connected: true,
            },
        );
        info!(room = %self.id, role = %role, participant, "participant seated");
        self.emit(RoomEvent::ParticipantJoined {
            participant: participant.to_string(),
            role,
        });
    }

    /// Before the start the seat is freed. Afterwards it stays reserved and
    /// the game goes on; the participant may rejoin by code.
    pub fn leave(&mut self, participant: &str) -> Result<Role> {
        let role = self.require_role(participant)?;
        match self.phase {
            Phase::Complete => {}
            Phase::Waiting | Phase::Ready => {
                self.participants.remove(&role);
                self.emit(RoomEvent::ParticipantLeft {
                    participant: participant.to_string(),
                    role,
                });
                if self.phase == Phase::Ready {
                    self.set_phase(Phase::Waiting);
                }
            }
            Phase::Planning | Phase::Resolving => {
                let was_connected = self
                    .participants
                    .get_mut(&role)
                    .map(|seat| std::mem::replace(&mut seat.connected, false))
                    .unwrap_or(false);
                if was_connected {
                    self.emit(RoomEvent::ParticipantLeft {
                        participant: participant.to_string(),
                        role,
                    });
                }
            }
        }
        Ok(role)
    }

    pub fn start(&mut self, now_ms: i64) -> Result<()> {
        match self.phase {
            Phase::Ready => {}
            Phase::Complete => return Err(RoomError::Complete),
            other => return Err(RoomError::NotReady(other)),
        }
        self.emit(RoomEvent::GameStarted {
            scenario_id: self.state.scenario_id.clone(),
            max_turns: self.state.max_turns,
        });
        self.set_phase(Phase::Planning);
        self.planning_since_ms = Some(now_ms);
        Ok(())
    }

    // -- planning --

    /// Upsert `participant`'s list for the current turn. Returns false when
    /// it equals the stored list, in which case nothing happens.
    pub fn submit(&mut self, participant: &str, actions: Vec<PlannedAction>, now_ms: i64) -> Result<bool> {
        let role = self.require_role(participant)?;
        match self.phase {
            Phase::Planning => {}
            Phase::Complete => return Err(RoomError::Complete),
            other => {
                return Err(RoomError::WrongPhase {
                    operation: "submit",
                    phase: other,
                })
            }
        }
        if let Err(rejection) = validate_submission(&actions, role, &self.state) {
            warn!(room = %self.id, role = %role, %rejection, "submission rejected");
            return Err(rejection.into());
        }
        if self.submissions.get(&role).is_some_and(|s| s.actions == actions) {
            return Ok(false);
        }
        let action_count = actions.len();
        self.submissions.insert(
            role,
            Submission {
                actions,
                submitted_at_ms: now_ms,
            },
        );
        self.emit(RoomEvent::ParticipantSubmitted { role, action_count });
        Ok(true)
    }

    pub fn has_submitted(&self, role: Role) -> bool {
        self.submissions.contains_key(&role)
    }

    pub fn both_submitted(&self) -> bool {
        Role::RESOLUTION_ORDER.iter().all(|r| self.has_submitted(*r))
    }

    pub fn is_overdue(&self, now_ms: i64, timeout_ms: u64) -> bool {
        let timeout = i64::try_from(timeout_ms).unwrap_or(i64::MAX);
        self.phase == Phase::Planning
            && self
                .planning_since_ms
                .is_some_and(|since| now_ms.saturating_sub(since) >= timeout)
    }

    // -- resolution --

    /// Check-and-set: planning with both submissions present becomes
    /// resolving. Anything else leaves the room alone.
    fn begin_resolution(&mut self) -> Option<Submissions> {
        if self.phase != Phase::Planning || !self.both_submitted() {
            return None;
        }
        self.set_phase(Phase::Resolving);
        Some(
            self.submissions
                .iter()
                .map(|(role, s)| (*role, s.actions.clone()))
                .collect(),
        )
    }

    /// Resolve the current turn if both sides have submitted.
    pub fn try_resolve(&mut self, now_ms: i64) -> Resolution {
        let Some(submissions) = self.begin_resolution() else {
            return Resolution::Pending;
        };
        let turn = self.state.current_turn;
        match resolve_turn(&self.state, &submissions) {
            Ok((next, summary)) => {
                self.state = next;
                self.submissions.clear();
                self.last_error = None;
                self.history.push(summary.clone());
                info!(room = %self.id, turn, headline = %summary.headline, "turn resolved");
                self.emit_at(
                    turn,
                    RoomEvent::TurnResolved {
                        summary: summary.clone(),
                    },
                );
                match self.state.outcome.clone() {
                    Some(outcome) => {
                        self.planning_since_ms = None;
                        self.set_phase(Phase::Complete);
                        info!(room = %self.id, turn, reason = %outcome.reason, "game complete");
                        self.emit_at(turn, RoomEvent::GameOver { outcome });
                    }
                    None => {
                        self.set_phase(Phase::Planning);
                        self.planning_since_ms = Some(now_ms);
                    }
                }
                Resolution::Resolved(summary)
            }
            Err(e) => {
                let message = e.to_string();
                error!(room = %self.id, turn, error = %message, "resolution failed, turn not applied");
                self.submissions.clear();
                self.last_error = Some(message.clone());
                self.emit(RoomEvent::GameError {
                    message: message.clone(),
                });
                self.set_phase(Phase::Planning);
                self.planning_since_ms = Some(now_ms);
                Resolution::Failed(message)
            }
        }
    }

    /// Timeout policy: sides without a submission pass.
    pub fn resolve_with_passes(&mut self, now_ms: i64) -> Resolution {
        if self.phase != Phase::Planning {
            return Resolution::Pending;
        }
        for role in Role::RESOLUTION_ORDER {
            self.submissions.entry(role).or_insert_with(|| Submission {
                actions: Vec::new(),
                submitted_at_ms: now_ms,
            });
        }
        self.try_resolve(now_ms)
    }

    /// Normalize a room loaded from storage.
    pub fn recover(&mut self) -> Result<()> {
        if self.phase == Phase::Resolving {
            self.phase = Phase::Planning;
            self.submissions.clear();
        }
        self.state.recompute_scorecards();
        try_validate_invariants(&self.state).map_err(|e| RoomError::Storage(format!("restored room {}: {e}", self.id)))?;
        if self.state.is_over() && self.phase != Phase::Complete {
            return Err(RoomError::Storage(format!(
                "restored room {} has an outcome but is {}",
                self.id, self.phase
            )));
        }
        Ok(())
    }

    // -- views --

    pub fn info(&self) -> RoomInfo {
        RoomInfo {
            room_id: self.id.clone(),
            code: self.code.clone(),
            scenario_id: self.state.scenario_id.clone(),
            phase: self.phase,
            current_turn: self.state.current_turn,
            max_turns: self.state.max_turns,
            participants: self.participants.len(),
        }
    }

    pub fn view(&self, participant: &str) -> Result<RoomView> {
        let role = self.require_role(participant)?;
        let available = if self.phase == Phase::Planning {
            available_actions(role, &self.state, None)
        } else {
            Vec::new()
        };
        Ok(RoomView {
            room: self.info(),
            role,
            read_only: self.is_complete(),
            estate: self.state.estate.clone(),
            estate_density: self.state.estate.density(),
            isolated_nodes: self.state.estate.isolated_nodes(),
            turns_remaining: self.state.turns_remaining(),
            counters: self.state.counters.clone(),
            scorecards: self.state.scorecards.clone(),
            my_planned_actions: self
                .submissions
                .get(&role)
                .map(|s| s.actions.clone())
                .unwrap_or_default(),
            opponent_submitted: self.has_submitted(role.opponent()),
            obligation: self.state.obligations.get(&role).cloned(),
            available_actions: available,
            last_summary: self.history.last().cloned(),
            timeline: self.state.timeline.clone(),
            outcome: self.state.outcome.clone(),
            last_error: self.last_error.clone(),
        })
    }

    // -- outbox --

    fn set_phase(&mut self, to: Phase) {
        let from = self.phase;
        if from == to {
            return;
        }
        self.phase = to;
        info!(room = %self.id, %from, %to, "phase changed");
        self.emit(RoomEvent::PhaseChanged { from, to });
    }

    fn emit(&mut self, event: RoomEvent) {
        let turn = self.state.current_turn;
        self.emit_at(turn, event);
    }

    fn emit_at(&mut self, turn: u32, event: RoomEvent) {
        self.outbox.push(PendingEvent {
            turn,
            phase: self.phase,
            event,
        });
    }

    pub fn pending_events(&self) -> &[PendingEvent] {
        &self.outbox
    }

    pub(crate) fn take_pending(&mut self) -> Vec<PendingEvent> {
        std::mem::take(&mut self.outbox)
    }
}
