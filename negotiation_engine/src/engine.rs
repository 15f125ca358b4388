/// Negotiation Engine — Match Engine
///
/// Stateful wrapper over the pure resolver. Keeps the current state and
/// the summaries that produced it, so a match can be replayed from its
/// scenario and compared by hash.

use tracing::{debug, warn};

use crate::catalog::validate_submission;
use crate::domain::Role;
use crate::error::{EngineError, Result};
use crate::hashing::canonical_hash;
use crate::invariants::try_validate_invariants;
use crate::resolver::{resolve_turn, Submissions};
use crate::scenario::Scenario;
use crate::state::MatchState;
use crate::summary::TurnSummary;

pub struct MatchEngine {
    state: MatchState,
    history: Vec<TurnSummary>,
}

impl MatchEngine {
    pub fn new(scenario: &Scenario) -> Result<Self> {
        Ok(Self {
            state: MatchState::from_scenario(scenario)?,
            history: Vec::new(),
        })
    }

    pub fn state(&self) -> &MatchState {
        &self.state
    }

    pub fn history(&self) -> &[TurnSummary] {
        &self.history
    }

    /// Validate both submissions, then resolve the turn:
    ///   1. Game-over check
    ///   2. Per-role submission validation
    ///   3. Resolution on a clone
    ///   4. Invariants on the new state
    ///   5. Store and return the summary
    pub fn play_turn(&mut self, submissions: &Submissions) -> Result<&TurnSummary> {
        if self.state.is_over() {
            return Err(EngineError::GameOver);
        }
        for role in Role::RESOLUTION_ORDER {
            if let Some(actions) = submissions.get(&role) {
                if let Err(rejection) = validate_submission(actions, role, &self.state) {
                    warn!(role = %role, %rejection, "submission rejected");
                    return Err(rejection.into());
                }
            }
        }
        self.apply(submissions)
    }

    /// Resolve without submission validation. Used for replay, where the
    /// submissions were validated when first accepted.
    pub fn apply(&mut self, submissions: &Submissions) -> Result<&TurnSummary> {
        let (next, summary) = resolve_turn(&self.state, submissions)?;
        try_validate_invariants(&next).map_err(EngineError::Invariant)?;
        debug!(turn = summary.turn, "turn stored");
        self.state = next;
        self.history.push(summary);
        self.history
            .last()
            .ok_or_else(|| EngineError::Invariant("history is empty after push".into()))
    }

    /// Event-sourced reconstruction: fresh match, then every turn in order.
    pub fn replay(scenario: &Scenario, turns: &[Submissions]) -> Result<Self> {
        let mut engine = Self::new(scenario)?;
        for submissions in turns {
            engine.apply(submissions)?;
        }
        Ok(engine)
    }

    pub fn hash(&self) -> Result<String> {
        canonical_hash(&self.state)
    }
}
