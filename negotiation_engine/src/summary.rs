/// Negotiation Engine — Turn Summary
///
/// Human-readable record of one resolution: what each side tried, what
/// landed, and how the estate and scorecards moved. Broadcast verbatim.
/// Also the unit replay consumes, so it carries every submitted action.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::catalog::PlannedAction;
use crate::domain::{MetricKey, NodeMetric, Obligation, Outcome, Role};
use crate::error::Rejection;
use crate::graph::Estate;
use crate::metrics::Scorecards;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "kebab-case")]
pub enum ActionStatus {
    Applied,
    Rejected { rejection: Rejection },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActionOutcome {
    pub role: Role,
    pub action: PlannedAction,
    pub status: ActionStatus,
    pub effects: Vec<String>,
}

impl ActionOutcome {
    pub fn applied(&self) -> bool {
        matches!(self.status, ActionStatus::Applied)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodeDelta {
    pub node: String,
    pub metric: NodeMetric,
    pub before: i64,
    pub after: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScorecardDelta {
    pub metric: MetricKey,
    pub before: i64,
    pub after: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TurnSummary {
    pub turn: u32,
    pub headline: String,
    pub actions: Vec<ActionOutcome>,
    pub node_deltas: Vec<NodeDelta>,
    pub scorecard_deltas: Vec<ScorecardDelta>,
    pub blocks_placed: Vec<String>,
    pub blocks_cleared: Vec<String>,
    pub obligations: BTreeMap<Role, Obligation>,
    pub outcome: Option<Outcome>,
}

impl TurnSummary {
    /// The submissions this summary resolved, grouped by role.
    pub fn submissions(&self) -> BTreeMap<Role, Vec<PlannedAction>> {
        let mut out: BTreeMap<Role, Vec<PlannedAction>> = BTreeMap::new();
        for role in Role::RESOLUTION_ORDER {
            out.insert(role, Vec::new());
        }
        for a in &self.actions {
            out.entry(a.role).or_default().push(a.action.clone());
        }
        out
    }

    pub fn rejected(&self) -> impl Iterator<Item = &ActionOutcome> + '_ {
        self.actions.iter().filter(|a| !a.applied())
    }
}

const NODE_METRICS: [NodeMetric; 4] = [
    NodeMetric::Adoption,
    NodeMetric::Trust,
    NodeMetric::Latency,
    NodeMetric::Cost,
];

/// Every node metric that changed between two estates, in node id order.
pub fn node_deltas(before: &Estate, after: &Estate) -> Vec<NodeDelta> {
    let mut out = Vec::new();
    for node in after.nodes() {
        let Some(prev) = before.node(&node.id) else {
            continue;
        };
        for metric in NODE_METRICS {
            let (b, a) = (prev.metric(metric), node.metric(metric));
            if a != b {
                out.push(NodeDelta {
                    node: node.id.clone(),
                    metric,
                    before: b,
                    after: a,
                });
            }
        }
    }
    out
}

/// Every scorecard metric that changed, Architect card first.
pub fn scorecard_deltas(before: &Scorecards, after: &Scorecards) -> Vec<ScorecardDelta> {
    [Role::Architect, Role::Prospect]
        .iter()
        .flat_map(|role| Scorecards::metrics(*role).iter())
        .filter_map(|metric| {
            let (b, a) = (before.get(*metric), after.get(*metric));
            (a != b).then(|| ScorecardDelta {
                metric: *metric,
                before: b,
                after: a,
            })
        })
        .collect()
}

/// One-line headline for the turn.
pub fn headline(turn: u32, actions: &[ActionOutcome], outcome: Option<&Outcome>) -> String {
    if let Some(o) = outcome {
        return match o.winner {
            Some(role) => format!("Turn {turn}: {role} wins. {}", o.reason),
            None => format!("Turn {turn}: draw. {}", o.reason),
        };
    }
    let applied = actions.iter().filter(|a| a.applied()).count();
    let rejected = actions.len() - applied;
    match (applied, rejected) {
        (0, 0) => format!("Turn {turn}: both sides passed."),
        (n, 0) => format!("Turn {turn}: {n} action(s) resolved."),
        (n, r) => format!("Turn {turn}: {n} action(s) resolved, {r} rejected."),
    }
}
