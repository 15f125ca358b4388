/// Negotiation Engine — Match State Construction
///
/// `MatchState` is everything the resolver reads and writes for one game.
/// Built once from a scenario; afterwards only `resolver::resolve_turn`
/// produces new versions of it.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::domain::{Counters, Obligation, Outcome, Role, TimelineEntry, TimelineKind};
use crate::error::{EngineError, Result};
use crate::invariants::try_validate_invariants;
use crate::graph::Estate;
use crate::metrics::{aggregate, Scorecards};
use crate::scenario::{Objectives, Rules, Scenario};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct MatchState {
    pub scenario_id: String,
    /// Turn currently being planned. Starts at 1.
    pub current_turn: u32,
    pub max_turns: u32,
    pub actions_per_turn: usize,
    pub estate: Estate,
    pub counters: Counters,
    pub scorecards: Scorecards,
    pub objectives: Objectives,
    /// Written only by the resolver; read only by the validator.
    pub obligations: BTreeMap<Role, Obligation>,
    pub timeline: Vec<TimelineEntry>,
    pub outcome: Option<Outcome>,
    pub rules: Rules,
}

impl MatchState {
    /// Fresh match at turn 1 with scorecards derived from the scenario.
    pub fn from_scenario(scenario: &Scenario) -> Result<Self> {
        scenario.validate()?;
        let estate = Estate::new(scenario.nodes.clone(), scenario.edges.clone())?;
        let rules = scenario.rules()?;
        let scorecards = aggregate(&estate, &scenario.counters, &rules.scoring);
        let state = Self {
            scenario_id: scenario.id.clone(),
            current_turn: 1,
            max_turns: scenario.max_turns,
            actions_per_turn: scenario.actions_per_turn,
            estate,
            counters: scenario.counters.clone(),
            scorecards,
            objectives: scenario.objectives.clone(),
            obligations: BTreeMap::new(),
            timeline: vec![TimelineEntry {
                turn: 0,
                kind: TimelineKind::Milestone,
                title: "Evaluation begins".into(),
                description: scenario.title.clone(),
                role: None,
            }],
            outcome: None,
            rules,
        };
        try_validate_invariants(&state).map_err(|e| EngineError::Scenario(format!("{}: {e}", scenario.id)))?;
        Ok(state)
    }

    pub fn is_over(&self) -> bool {
        self.outcome.is_some()
    }

    pub fn turns_remaining(&self) -> u32 {
        if self.is_over() {
            return 0;
        }
        (self.max_turns + 1).saturating_sub(self.current_turn)
    }

    /// Rebuild scorecards from estate and counters.
    pub fn recompute_scorecards(&mut self) {
        self.scorecards = aggregate(&self.estate, &self.counters, &self.rules.scoring);
    }
}
