/// Negotiation Engine — Effects & Deltas
///
/// Action effects are data (`EffectSpec`). Computing them is a pure
/// function of (state snapshot, acting role, planned action) -> `Vec<Delta>`;
/// nothing here reads another action's output. Deltas from one resolver
/// step are summed per key and applied in one pass, clamping once.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::arithmetic::mean;
use crate::catalog::PlannedAction;
use crate::domain::{
    AuthStrength, Capability, CounterKey, Deployment, EdgeStrength, MetricKey, NodeMetric,
    Obligation, Requirement, Role,
};
use crate::error::{EngineError, Result};
use crate::state::MatchState;

// ---------------------------------------------------------------------------
// Effect specification (scenario data)
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ObligedSide {
    Acting,
    Opponent,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "test", rename_all = "kebab-case", deny_unknown_fields)]
pub enum Condition {
    CounterBelow { counter: CounterKey, value: i64 },
    CounterAtLeast { counter: CounterKey, value: i64 },
}

impl Condition {
    fn holds(&self, state: &MatchState) -> bool {
        match self {
            Condition::CounterBelow { counter, value } => state.counters.get(*counter) < *value,
            Condition::CounterAtLeast { counter, value } => state.counters.get(*counter) >= *value,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "kebab-case", deny_unknown_fields)]
pub enum EffectSpec {
    /// Metric change on the target node.
    NodeMetric { metric: NodeMetric, amount: i64 },
    /// Metric change on every node.
    EstateMetric { metric: NodeMetric, amount: i64 },
    Counter { counter: CounterKey, amount: i64 },
    /// Deploy the action's capability on the target node.
    Deploy,
    Block { turns: u32 },
    Unblock,
    /// `max_turns = max(turn + min_remaining, max_turns - cut)`, never extended.
    Deadline { cut: u32, min_remaining: u32 },
    RaiseTarget { metric: MetricKey, amount: i64 },
    Oblige {
        side: ObligedSide,
        requirement: Requirement,
        reason: String,
    },
    When {
        condition: Condition,
        then: Vec<EffectSpec>,
        #[serde(default)]
        otherwise: Vec<EffectSpec>,
    },
}

// ---------------------------------------------------------------------------
// Deltas
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "kebab-case")]
pub enum Delta {
    Node {
        node: String,
        metric: NodeMetric,
        amount: i64,
    },
    Counter {
        counter: CounterKey,
        amount: i64,
    },
    Deploy {
        node: String,
        capability: Capability,
        auth: AuthStrength,
    },
    Block {
        node: String,
        turns: u32,
    },
    Unblock {
        node: String,
    },
    Deadline {
        max_turns: u32,
    },
    RaiseTarget {
        metric: MetricKey,
        amount: i64,
    },
    Oblige {
        role: Role,
        obligation: Obligation,
    },
}

impl Delta {
    /// One-line narrative for the turn summary.
    pub fn describe(&self) -> String {
        match self {
            Delta::Node {
                node,
                metric,
                amount,
            } => format!("{node} {metric:?} {amount:+}"),
            Delta::Counter { counter, amount } => format!("{counter:?} {amount:+}"),
            Delta::Deploy {
                node,
                capability,
                auth,
            } => format!("Deployed {capability} on {node} ({auth:?} auth)"),
            Delta::Block { node, turns } => format!("Blocked {node} for {turns} turn(s)"),
            Delta::Unblock { node } => format!("Lifted the block on {node}"),
            Delta::Deadline { max_turns } => format!("Deadline moved to turn {max_turns}"),
            Delta::RaiseTarget { metric, amount } => {
                format!("{} target {amount:+}", metric.label())
            }
            Delta::Oblige { role, obligation } => {
                format!("{role} must play {} next turn", obligation.requirement)
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Effect computation (pure)
// ---------------------------------------------------------------------------

/// Compute the deltas `action` produces against `state`.
pub fn compute_deltas(state: &MatchState, role: Role, action: &PlannedAction) -> Result<Vec<Delta>> {
    let mut out = Vec::new();
    if let Some(rules) = state.rules.actions.get(&action.action) {
        for spec in &rules.effects {
            compute_effect(spec, state, role, action, &mut out)?;
        }
    }
    Ok(out)
}

fn target_node<'a>(state: &MatchState, action: &'a PlannedAction) -> Result<&'a str> {
    let id = action.target.as_deref().ok_or_else(|| {
        EngineError::Invariant(format!("{} has a node effect but no target", action.action))
    })?;
    if state.estate.node(id).is_none() {
        return Err(EngineError::UnknownNode(id.to_string()));
    }
    Ok(id)
}

fn compute_effect(
    spec: &EffectSpec,
    state: &MatchState,
    role: Role,
    action: &PlannedAction,
    out: &mut Vec<Delta>,
) -> Result<()> {
    match spec {
        EffectSpec::NodeMetric { metric, amount } => out.push(Delta::Node {
            node: target_node(state, action)?.to_string(),
            metric: *metric,
            amount: *amount,
        }),
        EffectSpec::EstateMetric { metric, amount } => {
            out.extend(state.estate.node_ids().map(|id| Delta::Node {
                node: id.to_string(),
                metric: *metric,
                amount: *amount,
            }))
        }
        EffectSpec::Counter { counter, amount } => out.push(Delta::Counter {
            counter: *counter,
            amount: *amount,
        }),
        EffectSpec::Deploy => {
            let node = target_node(state, action)?;
            let capability = action.action.descriptor().deploys.ok_or_else(|| {
                EngineError::Invariant(format!("{} deploys no capability", action.action))
            })?;
            let auth = if state.counters.governance < state.rules.weak_auth_below {
                AuthStrength::Weak
            } else {
                AuthStrength::Strong
            };
            out.push(Delta::Deploy {
                node: node.to_string(),
                capability,
                auth,
            });
            let spill = state.rules.strong_edge_adoption;
            if spill != 0 {
                for neighbour in state.estate.neighbours(node, Some(EdgeStrength::Strong)) {
                    out.push(Delta::Node {
                        node: neighbour.to_string(),
                        metric: NodeMetric::Adoption,
                        amount: spill,
                    });
                }
            }
        }
        EffectSpec::Block { turns } => out.push(Delta::Block {
            node: target_node(state, action)?.to_string(),
            turns: *turns,
        }),
        EffectSpec::Unblock => out.push(Delta::Unblock {
            node: target_node(state, action)?.to_string(),
        }),
        EffectSpec::Deadline { cut, min_remaining } => {
            let floor = state.current_turn.saturating_add(*min_remaining);
            let max_turns = state
                .max_turns
                .saturating_sub(*cut)
                .max(floor)
                .min(state.max_turns);
            out.push(Delta::Deadline { max_turns });
        }
        EffectSpec::RaiseTarget { metric, amount } => out.push(Delta::RaiseTarget {
            metric: *metric,
            amount: *amount,
        }),
        EffectSpec::Oblige {
            side,
            requirement,
            reason,
        } => {
            let obliged = match side {
                ObligedSide::Acting => role,
                ObligedSide::Opponent => role.opponent(),
            };
            out.push(Delta::Oblige {
                role: obliged,
                obligation: Obligation {
                    requirement: requirement.clone(),
                    imposed_turn: state.current_turn,
                    reason: reason.clone(),
                },
            });
        }
        EffectSpec::When {
            condition,
            then,
            otherwise,
        } => {
            let branch = if condition.holds(state) { then } else { otherwise };
            for inner in branch {
                compute_effect(inner, state, role, action, out)?;
            }
        }
    }
    Ok(())
}

/// Per-turn drift, computed from the post-deployment snapshot.
pub fn drift_deltas(state: &MatchState) -> Vec<Delta> {
    let drift = &state.rules.drift;
    let mut out = Vec::new();
    let counter = |counter: CounterKey, amount: i64| Delta::Counter { counter, amount };

    for node in state.estate.nodes() {
        let latency = if node.has_capability(Capability::SimbaConnectors) {
            drift.simba_latency
        } else {
            drift.latency
        };
        let mut push = |metric: NodeMetric, amount: i64| {
            if amount != 0 {
                out.push(Delta::Node {
                    node: node.id.clone(),
                    metric,
                    amount,
                });
            }
        };
        push(NodeMetric::Latency, latency);
        if node.has_capability(Capability::LogiVdd) {
            push(NodeMetric::Adoption, drift.vdd_adoption);
        }
        if node.has_capability(Capability::ManagedDashboards) {
            push(NodeMetric::Trust, drift.dashboard_trust);
        }
        if state.counters.governance < drift.low_governance_below {
            push(NodeMetric::Trust, drift.low_governance_trust);
        }
    }

    let dashboards = state.estate.capability_count(Capability::ManagedDashboards) as i64;
    out.push(counter(
        CounterKey::Reliability,
        drift.reliability + drift.dashboard_reliability * dashboards,
    ));
    out.push(counter(CounterKey::PoliticalCapital, drift.political_capital));
    out.push(counter(CounterKey::Patience, drift.patience));
    let adoption = mean(state.estate.nodes().map(|n| n.adoption));
    if adoption > drift.value_growth_above_adoption {
        out.push(counter(CounterKey::BusinessValue, drift.value_growth));
    }
    if state.counters.governance > drift.risk_relief_above_governance {
        out.push(counter(CounterKey::Risk, drift.risk_relief));
    }
    out.retain(|d| !matches!(d, Delta::Counter { amount: 0, .. }));
    out
}

// ---------------------------------------------------------------------------
// Application
// ---------------------------------------------------------------------------

/// What a step changed beyond plain metric movement.
#[derive(Debug, Default)]
pub struct StepEffects {
    pub blocks_placed: Vec<String>,
    pub blocks_lifted: Vec<String>,
    pub obligations: BTreeMap<Role, Obligation>,
}

/// Apply one step's deltas to `state`. Amounts are summed per
/// (node, metric) and per counter, then clamped once.
pub fn apply_deltas(state: &mut MatchState, deltas: &[Delta], turn: u32) -> Result<StepEffects> {
    let mut node_sums: BTreeMap<(&str, NodeMetric), i64> = BTreeMap::new();
    let mut counter_sums: BTreeMap<CounterKey, i64> = BTreeMap::new();
    let mut blocks: BTreeMap<&str, u32> = BTreeMap::new();
    let mut deadline: Option<u32> = None;
    let mut raises: BTreeMap<MetricKey, i64> = BTreeMap::new();
    let mut effects = StepEffects::default();

    for delta in deltas {
        match delta {
            Delta::Node {
                node,
                metric,
                amount,
            } => {
                let sum = node_sums.entry((node.as_str(), *metric)).or_insert(0);
                *sum = sum.saturating_add(*amount);
            }
            Delta::Counter { counter, amount } => {
                let sum = counter_sums.entry(*counter).or_insert(0);
                *sum = sum.saturating_add(*amount);
            }
            Delta::Deploy {
                node,
                capability,
                auth,
            } => state.estate.apply_deployment(
                node,
                Deployment {
                    capability: *capability,
                    turn_deployed: turn,
                    auth: *auth,
                },
            )?,
            Delta::Block { node, turns } => {
                let t = blocks.entry(node.as_str()).or_insert(0);
                *t = (*t).max(*turns);
            }
            Delta::Unblock { node } => {
                if state.estate.clear_block(node)? {
                    effects.blocks_lifted.push(node.clone());
                }
            }
            Delta::Deadline { max_turns } => {
                deadline = Some(deadline.map_or(*max_turns, |d| d.min(*max_turns)));
            }
            Delta::RaiseTarget { metric, amount } => {
                *raises.entry(*metric).or_insert(0) += *amount;
            }
            Delta::Oblige { role, obligation } => {
                effects.obligations.insert(*role, obligation.clone());
            }
        }
    }

    let bounds = state.rules.bounds;
    for ((node, metric), amount) in node_sums {
        state
            .estate
            .adjust_metric(node, metric, amount, bounds.range(metric))?;
    }
    for (counter, amount) in counter_sums {
        state.counters.adjust(counter, amount);
    }
    for (node, turns) in blocks {
        state.estate.set_blocked(node, turns)?;
        effects.blocks_placed.push(node.to_string());
    }
    if let Some(max_turns) = deadline {
        state.max_turns = max_turns;
    }
    for (metric, amount) in raises {
        state.objectives.raise(metric, amount);
    }
    Ok(effects)
}
