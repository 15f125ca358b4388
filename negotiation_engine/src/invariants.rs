/// Negotiation Engine — Invariant Checks
///
/// `try_validate_invariants` is what the resolver and snapshot restore
/// call. `validate_invariants` panics and is for tests and the harness.

use std::collections::BTreeSet;

use crate::arithmetic::is_valid_id;
use crate::domain::{CounterKey, Counters, NodeMetric};
use crate::metrics::aggregate;
use crate::state::MatchState;

const COUNTERS: [CounterKey; 7] = [
    CounterKey::Governance,
    CounterKey::Reliability,
    CounterKey::PoliticalCapital,
    CounterKey::SupportLoad,
    CounterKey::BusinessValue,
    CounterKey::Risk,
    CounterKey::Patience,
];

/// Run every check. Panics on the first failure.
pub fn validate_invariants(state: &MatchState) {
    if let Err(msg) = try_validate_invariants(state) {
        panic!("Invariant violation: {msg}");
    }
}

/// Run every check. Returns the first failure as a message.
pub fn try_validate_invariants(state: &MatchState) -> Result<(), String> {
    check_node_ids(state)?;
    check_node_bounds(state)?;
    check_block_flags(state)?;
    check_unique_deployments(state)?;
    check_edge_refs(state)?;
    check_counter_ranges(state)?;
    check_turn_counter(state)?;
    check_scorecards_derived(state)?;
    Ok(())
}

// ---------------------------------------------------------------------------
// Individual checks
// ---------------------------------------------------------------------------

fn check_node_ids(state: &MatchState) -> Result<(), String> {
    for node in state.estate.nodes() {
        if !is_valid_id(&node.id) {
            return Err(format!(
                "[node_id_format] node id {:?} must match [a-zA-Z0-9_-]+",
                node.id
            ));
        }
    }
    Ok(())
}

fn check_node_bounds(state: &MatchState) -> Result<(), String> {
    let bounds = state.rules.bounds;
    for node in state.estate.nodes() {
        for metric in [
            NodeMetric::Adoption,
            NodeMetric::Trust,
            NodeMetric::Latency,
            NodeMetric::Cost,
        ] {
            let (lo, hi) = bounds.range(metric);
            let v = node.metric(metric);
            if v < lo || v > hi {
                return Err(format!(
                    "[node_bounds] {}.{metric:?} = {v} outside [{lo}, {hi}]",
                    node.id
                ));
            }
        }
    }
    Ok(())
}

fn check_block_flags(state: &MatchState) -> Result<(), String> {
    for node in state.estate.nodes() {
        if node.blocked != (node.block_turns > 0) {
            return Err(format!(
                "[block_flag] {} has blocked={} with {} turn(s) remaining",
                node.id, node.blocked, node.block_turns
            ));
        }
    }
    Ok(())
}

fn check_unique_deployments(state: &MatchState) -> Result<(), String> {
    for node in state.estate.nodes() {
        let mut seen = BTreeSet::new();
        for d in &node.deployments {
            if !seen.insert(d.capability) {
                return Err(format!(
                    "[duplicate_deployment] {} carries {} twice",
                    node.id, d.capability
                ));
            }
        }
    }
    Ok(())
}

fn check_edge_refs(state: &MatchState) -> Result<(), String> {
    for edge in state.estate.edges() {
        for end in [&edge.a, &edge.b] {
            if state.estate.node(end).is_none() {
                return Err(format!(
                    "[edge_refs] edge {}-{} references unknown node {end:?}",
                    edge.a, edge.b
                ));
            }
        }
    }
    Ok(())
}

fn check_counter_ranges(state: &MatchState) -> Result<(), String> {
    for key in COUNTERS {
        let (lo, hi) = Counters::range(key);
        let v = state.counters.get(key);
        if v < lo || v > hi {
            return Err(format!("[counter_range] {key:?} = {v} outside [{lo}, {hi}]"));
        }
    }
    Ok(())
}

fn check_turn_counter(state: &MatchState) -> Result<(), String> {
    if state.current_turn == 0 {
        return Err("[turn_counter] current_turn must start at 1".into());
    }
    if state.outcome.is_none() && state.current_turn > state.max_turns {
        return Err(format!(
            "[turn_counter] turn {} is past max_turns {} with no outcome",
            state.current_turn, state.max_turns
        ));
    }
    Ok(())
}

fn check_scorecards_derived(state: &MatchState) -> Result<(), String> {
    let fresh = aggregate(&state.estate, &state.counters, &state.rules.scoring);
    if fresh != state.scorecards {
        return Err("[scorecards_derived] scorecards differ from estate and counters".into());
    }
    Ok(())
}
