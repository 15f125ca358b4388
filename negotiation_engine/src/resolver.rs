/// Negotiation Engine — Turn Resolver
///
/// Applies both sides' planned actions for one turn in a fixed order:
///   1. negotiation-class actions (reactive side first)
///   2. deployment-class actions, re-validated against post-step-1 state
///   3. global-class actions from both sides, plus per-turn drift
///   4. block countdown
///   5. scorecard recomputation
///   6. forced-action obligations
///   7. termination
///   8. turn summary, turn advance
///
/// Works on a clone. Any `Err` leaves the caller's state untouched.
/// Role-agnostic: the catalog decides which step an action belongs to.

use std::collections::BTreeMap;

use tracing::debug;

use crate::catalog::{revalidate_deployment, satisfies, ActionClass, PlannedAction};
use crate::domain::{Role, TimelineEntry, TimelineKind};
use crate::error::{EngineError, Result};
use crate::invariants::try_validate_invariants;
use crate::state::MatchState;
use crate::summary::{self, ActionOutcome, ActionStatus, TurnSummary};
use crate::transitions::{apply_deltas, compute_deltas, drift_deltas, Delta, StepEffects};

/// Planned actions per role for one turn. A missing role is a pass.
pub type Submissions = BTreeMap<Role, Vec<PlannedAction>>;

const STEPS: [ActionClass; 3] = [
    ActionClass::Negotiation,
    ActionClass::Deployment,
    ActionClass::Global,
];

/// Resolve the current turn. Returns the next state and the summary.
pub fn resolve_turn(state: &MatchState, submissions: &Submissions) -> Result<(MatchState, TurnSummary)> {
    if state.outcome.is_some() {
        return Err(EngineError::GameOver);
    }
    for (role, actions) in submissions {
        if let Some(a) = actions.iter().find(|a| a.action.role() != *role) {
            return Err(EngineError::Invariant(format!(
                "{} submitted by {role} belongs to the {} catalog",
                a.action,
                a.action.role()
            )));
        }
    }

    let turn = state.current_turn;
    let mut next = state.clone();
    let mut outcomes: Vec<ActionOutcome> = Vec::new();
    let mut blocks_placed: Vec<String> = Vec::new();
    let mut blocks_cleared: Vec<String> = Vec::new();
    let mut imposed = BTreeMap::new();

    // -- steps 1-3 --
    for class in STEPS {
        let effects = run_step(&mut next, submissions, class, turn, &mut outcomes)?;
        blocks_placed.extend(effects.blocks_placed);
        blocks_cleared.extend(effects.blocks_lifted);
        imposed.extend(effects.obligations);
    }

    // -- step 4 --
    let expired = next.estate.decrement_blocks();
    debug!(turn, expired = expired.len(), "block countdown");
    blocks_cleared.extend(expired);
    blocks_cleared.sort();
    blocks_cleared.dedup();

    // -- step 5 --
    next.recompute_scorecards();

    // -- step 6 --
    for (role, obligation) in &state.obligations {
        let met = outcomes
            .iter()
            .any(|o| o.role == *role && o.applied() && satisfies(o.action.action, &obligation.requirement));
        if met {
            debug!(turn, role = %role, "obligation satisfied");
            next.obligations.remove(role);
        }
    }
    // One per role; the newest replaces an unmet one.
    for (role, obligation) in imposed {
        if let Some(old) = next.obligations.insert(role, obligation) {
            debug!(turn, role = %role, replaced = %old.requirement, "outstanding obligation replaced");
        }
    }

    // -- step 7 --
    let outcome = next.objectives.decide(&next.scorecards, turn, next.max_turns);
    if let Some(o) = &outcome {
        next.timeline.push(TimelineEntry {
            turn,
            kind: TimelineKind::Milestone,
            title: match o.winner {
                Some(role) => format!("{role} wins"),
                None => "Draw".into(),
            },
            description: o.reason.clone(),
            role: o.winner,
        });
        next.outcome = Some(o.clone());
    }

    // -- step 8 --
    next.current_turn = turn + 1;
    try_validate_invariants(&next).map_err(EngineError::Invariant)?;

    let summary = TurnSummary {
        turn,
        headline: summary::headline(turn, &outcomes, outcome.as_ref()),
        node_deltas: summary::node_deltas(&state.estate, &next.estate),
        scorecard_deltas: summary::scorecard_deltas(&state.scorecards, &next.scorecards),
        actions: outcomes,
        blocks_placed,
        blocks_cleared,
        obligations: next.obligations.clone(),
        outcome,
    };
    debug!(turn, headline = %summary.headline, "turn resolved");
    Ok((next, summary))
}

/// One resolver step. All deltas are computed against the state as it
/// stood when the step began, then applied together.
fn run_step(
    state: &mut MatchState,
    submissions: &Submissions,
    class: ActionClass,
    turn: u32,
    outcomes: &mut Vec<ActionOutcome>,
) -> Result<StepEffects> {
    let mut deltas: Vec<Delta> = Vec::new();
    let mut applied: Vec<(Role, &PlannedAction, Vec<String>)> = Vec::new();

    for role in Role::RESOLUTION_ORDER {
        let planned = submissions.get(&role).map(Vec::as_slice).unwrap_or(&[]);
        for action in planned.iter().filter(|a| a.action.class() == class) {
            if class == ActionClass::Deployment {
                if let Err(rejection) = revalidate_deployment(action, &state.estate) {
                    debug!(turn, role = %role, action = %action.action, %rejection, "deployment rejected");
                    state.counters.deployments_blocked += 1;
                    state.timeline.push(TimelineEntry {
                        turn,
                        kind: TimelineKind::Constraint,
                        title: format!("{} blocked", action.action.descriptor().title),
                        description: rejection.to_string(),
                        role: Some(role),
                    });
                    outcomes.push(ActionOutcome {
                        role,
                        action: action.clone(),
                        status: ActionStatus::Rejected { rejection },
                        effects: Vec::new(),
                    });
                    continue;
                }
            }
            let produced = compute_deltas(state, role, action)?;
            let narrative = produced.iter().map(Delta::describe).collect();
            deltas.extend(produced);
            applied.push((role, action, narrative));
        }
    }

    if class == ActionClass::Global {
        deltas.extend(drift_deltas(state));
    }
    debug!(turn, step = %class, deltas = deltas.len(), "applying step");
    let effects = apply_deltas(state, &deltas, turn)?;

    for (role, action, narrative) in applied {
        let descriptor = action.action.descriptor();
        let kind = if descriptor.class == ActionClass::Negotiation {
            TimelineKind::Constraint
        } else {
            TimelineKind::Action
        };
        let mut description: Vec<String> = narrative;
        if let Some(note) = action.note() {
            description.push(note.to_string());
        }
        state.timeline.push(TimelineEntry {
            turn,
            kind,
            title: descriptor.title.to_string(),
            description: description.join(". "),
            role: Some(role),
        });
        outcomes.push(ActionOutcome {
            role,
            action: action.clone(),
            status: ActionStatus::Applied,
            effects: description,
        });
    }
    Ok(effects)
}
