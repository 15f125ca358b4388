/// Negotiation Engine — Scenario Configuration
///
/// Scenarios are JSON documents. Three ship compiled in; custom ones load
/// from disk. Everything numeric about a match (effect sizes, drift,
/// thresholds, tie-break inputs) comes from here, not from engine code.

use std::collections::BTreeMap;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::arithmetic::{capped_ratio, is_valid_id, PERCENT_MAX, SCALE};
use crate::catalog::ActionKind;
use crate::domain::{CounterKey, Counters, Edge, MetricBounds, MetricKey, Node, NodeMetric, Outcome, Role};
use crate::error::{EngineError, Result};
use crate::metrics::Scorecards;
use crate::transitions::EffectSpec;

const DEFAULT_ACTIONS: &str = include_str!("../scenarios/actions.json");

const BUILTIN_SCENARIOS: &[(&str, &str)] = &[
    ("speed-to-value", include_str!("../scenarios/speed-to-value.json")),
    ("governance-first", include_str!("../scenarios/governance-first.json")),
    ("scale-out", include_str!("../scenarios/scale-out.json")),
];

// ---------------------------------------------------------------------------
// Objectives
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Comparison {
    AtLeast,
    AtMost,
}

/// A threshold on one scorecard metric.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Target {
    pub metric: MetricKey,
    pub comparison: Comparison,
    pub value: i64,
}

impl Target {
    pub fn at_least(metric: MetricKey, value: i64) -> Self {
        Self {
            metric,
            comparison: Comparison::AtLeast,
            value,
        }
    }

    pub fn at_most(metric: MetricKey, value: i64) -> Self {
        Self {
            metric,
            comparison: Comparison::AtMost,
            value,
        }
    }

    pub fn met(&self, scorecards: &Scorecards) -> bool {
        let actual = scorecards.get(self.metric);
        match self.comparison {
            Comparison::AtLeast => actual >= self.value,
            Comparison::AtMost => actual <= self.value,
        }
    }

    /// Fixed-point attainment of this target, capped at 100%.
    pub fn attainment(&self, scorecards: &Scorecards) -> i64 {
        let actual = scorecards.get(self.metric);
        match self.comparison {
            Comparison::AtLeast => capped_ratio(actual, self.value),
            Comparison::AtMost if actual <= self.value => SCALE,
            Comparison::AtMost => capped_ratio(self.value, actual),
        }
    }
}

/// Ends the match immediately when every condition holds.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct InstantRule {
    pub all: Vec<Target>,
    pub winner: Option<Role>,
    pub reason: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Objectives {
    pub architect: Vec<Target>,
    pub prospect: Vec<Target>,
    #[serde(default)]
    pub instant: Vec<InstantRule>,
}

impl Default for Objectives {
    fn default() -> Self {
        Self {
            architect: vec![
                Target::at_least(MetricKey::Adoption, 75),
                Target::at_least(MetricKey::Trust, 75),
                Target::at_least(MetricKey::Governance, 70),
                Target::at_least(MetricKey::Reliability, 70),
                Target::at_most(MetricKey::Latency, 1200),
                Target::at_most(MetricKey::Cost, 120),
            ],
            prospect: vec![
                Target::at_least(MetricKey::BusinessValue, 70),
                Target::at_most(MetricKey::Risk, 30),
            ],
            instant: vec![
                InstantRule {
                    all: vec![Target::at_most(MetricKey::Patience, 10)],
                    winner: Some(Role::Prospect),
                    reason: "Prospect ran out of patience and terminated the evaluation.".into(),
                },
                InstantRule {
                    all: vec![Target::at_most(MetricKey::Trust, 15)],
                    winner: Some(Role::Prospect),
                    reason: "Trust collapsed. Stakeholders have lost faith in the platform.".into(),
                },
                InstantRule {
                    all: vec![Target::at_most(MetricKey::Reliability, 15)],
                    winner: Some(Role::Prospect),
                    reason: "Reliability crisis. Constant incidents made the platform unusable."
                        .into(),
                },
                InstantRule {
                    all: vec![
                        Target::at_least(MetricKey::Adoption, 90),
                        Target::at_least(MetricKey::Trust, 90),
                    ],
                    winner: Some(Role::Architect),
                    reason: "Platform adopted across the estate ahead of schedule.".into(),
                },
            ],
        }
    }
}

impl Objectives {
    pub fn targets(&self, role: Role) -> &[Target] {
        match role {
            Role::Architect => &self.architect,
            Role::Prospect => &self.prospect,
        }
    }

    /// Mean attainment over `role`'s targets. No targets = fully attained.
    pub fn attainment(&self, role: Role, scorecards: &Scorecards) -> i64 {
        let targets = self.targets(role);
        if targets.is_empty() {
            return SCALE;
        }
        let total: i64 = targets.iter().map(|t| t.attainment(scorecards)).sum();
        total / targets.len() as i64
    }

    pub fn unmet(&self, role: Role, scorecards: &Scorecards) -> Vec<MetricKey> {
        self.targets(role)
            .iter()
            .filter(|t| !t.met(scorecards))
            .map(|t| t.metric)
            .collect()
    }

    /// Shift the threshold of every target on `metric`. Percent-style
    /// thresholds stay within 0..=100; ceilings never drop below zero.
    pub(crate) fn raise(&mut self, metric: MetricKey, amount: i64) {
        let hi = if metric.is_percent() { PERCENT_MAX } else { i64::MAX };
        for target in self
            .architect
            .iter_mut()
            .chain(self.prospect.iter_mut())
            .filter(|t| t.metric == metric)
        {
            target.value = target.value.saturating_add(amount).max(0).min(hi);
        }
    }

    /// Termination check at the end of resolving `turn`.
    /// Instant rules first, in declaration order; then the turn limit.
    pub fn decide(&self, scorecards: &Scorecards, turn: u32, max_turns: u32) -> Option<Outcome> {
        let architect_attainment = self.attainment(Role::Architect, scorecards);
        let prospect_attainment = self.attainment(Role::Prospect, scorecards);

        if let Some(rule) = self
            .instant
            .iter()
            .find(|r| !r.all.is_empty() && r.all.iter().all(|t| t.met(scorecards)))
        {
            return Some(Outcome {
                winner: rule.winner,
                reason: rule.reason.clone(),
                decided_on_turn: turn,
                architect_attainment,
                prospect_attainment,
            });
        }

        if turn < max_turns {
            return None;
        }

        let winner = match architect_attainment.cmp(&prospect_attainment) {
            std::cmp::Ordering::Greater => Some(Role::Architect),
            std::cmp::Ordering::Less => Some(Role::Prospect),
            std::cmp::Ordering::Equal => None,
        };
        let mut reason = match winner {
            None => format!(
                "Turn limit reached with equal target attainment ({}%).",
                architect_attainment * 100 / SCALE
            ),
            Some(role) => {
                let (won, lost) = match role {
                    Role::Architect => (architect_attainment, prospect_attainment),
                    Role::Prospect => (prospect_attainment, architect_attainment),
                };
                format!(
                    "Turn limit reached; {role} leads on target attainment ({}% vs {}%).",
                    won * 100 / SCALE,
                    lost * 100 / SCALE
                )
            }
        };
        let missed = self.unmet(Role::Architect, scorecards);
        if !missed.is_empty() {
            let labels: Vec<&str> = missed.iter().map(|m| m.label()).collect();
            reason.push_str(&format!(" Failed to meet: {}.", labels.join(", ")));
        }

        Some(Outcome {
            winner,
            reason,
            decided_on_turn: turn,
            architect_attainment,
            prospect_attainment,
        })
    }
}

// ---------------------------------------------------------------------------
// Rules
// ---------------------------------------------------------------------------

/// Counter threshold an action needs before it may be planned.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Precondition {
    pub counter: CounterKey,
    pub at_least: i64,
}

/// Effect list and preconditions for one action type.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ActionRules {
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub requires: Vec<Precondition>,
    pub effects: Vec<EffectSpec>,
}

/// Per-turn drift applied in step 3 of every resolution.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct DriftRules {
    pub political_capital: i64,
    pub patience: i64,
    pub reliability: i64,
    /// Node latency creep; nodes with Simba connectors get `simba_latency` instead.
    pub latency: i64,
    pub simba_latency: i64,
    pub vdd_adoption: i64,
    pub dashboard_trust: i64,
    /// Reliability gained per node carrying dashboards.
    pub dashboard_reliability: i64,
    pub value_growth: i64,
    pub value_growth_above_adoption: i64,
    pub risk_relief: i64,
    pub risk_relief_above_governance: i64,
    /// Estate-wide trust change while governance is below the threshold.
    pub low_governance_trust: i64,
    pub low_governance_below: i64,
}

impl Default for DriftRules {
    fn default() -> Self {
        Self {
            political_capital: 3,
            patience: -2,
            reliability: -1,
            latency: 20,
            simba_latency: -30,
            vdd_adoption: 2,
            dashboard_trust: 1,
            dashboard_reliability: 2,
            value_growth: 2,
            value_growth_above_adoption: 50,
            risk_relief: -2,
            risk_relief_above_governance: 60,
            low_governance_trust: -1,
            low_governance_below: 50,
        }
    }
}

/// How the aggregator turns deployments into Prospect metrics.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ScoringRules {
    pub value_per_deployment: i64,
    pub risk_per_weak_deployment: i64,
}

impl Default for ScoringRules {
    fn default() -> Self {
        Self {
            value_per_deployment: 2,
            risk_per_weak_deployment: 5,
        }
    }
}

/// The fully merged rule set a match runs under.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Rules {
    pub bounds: MetricBounds,
    /// Deployments made while governance is below this get weak auth.
    pub weak_auth_below: i64,
    /// Adoption spill-over onto strong-edge neighbours of a new deployment.
    pub strong_edge_adoption: i64,
    pub drift: DriftRules,
    pub scoring: ScoringRules,
    pub actions: BTreeMap<ActionKind, ActionRules>,
}

/// The compiled-in default action effect table.
pub fn default_action_rules() -> Result<BTreeMap<ActionKind, ActionRules>> {
    serde_json::from_str(DEFAULT_ACTIONS).map_err(EngineError::from)
}

// ---------------------------------------------------------------------------
// Scenario
// ---------------------------------------------------------------------------

fn default_max_turns() -> u32 {
    12
}

fn default_actions_per_turn() -> usize {
    2
}

fn default_weak_auth_below() -> i64 {
    50
}

fn default_strong_edge_adoption() -> i64 {
    3
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Scenario {
    pub id: String,
    pub title: String,
    #[serde(default)]
    pub description: String,
    #[serde(default = "default_max_turns")]
    pub max_turns: u32,
    #[serde(default = "default_actions_per_turn")]
    pub actions_per_turn: usize,
    pub counters: Counters,
    pub nodes: Vec<Node>,
    #[serde(default)]
    pub edges: Vec<Edge>,
    #[serde(default)]
    pub objectives: Objectives,
    #[serde(default)]
    pub bounds: MetricBounds,
    #[serde(default = "default_weak_auth_below")]
    pub weak_auth_below: i64,
    #[serde(default = "default_strong_edge_adoption")]
    pub strong_edge_adoption: i64,
    #[serde(default)]
    pub drift: DriftRules,
    #[serde(default)]
    pub scoring: ScoringRules,
    /// Replaces entries of the default action table.
    #[serde(default)]
    pub action_overrides: BTreeMap<ActionKind, ActionRules>,
}

impl Scenario {
    pub fn from_json(text: &str) -> Result<Self> {
        let scenario: Scenario = serde_json::from_str(text)?;
        scenario.validate()?;
        Ok(scenario)
    }

    pub fn load_from_file(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)
            .map_err(|e| EngineError::Scenario(format!("{}: {e}", path.display())))?;
        Self::from_json(&text)
    }

    /// A compiled-in scenario by id.
    pub fn builtin(id: &str) -> Result<Self> {
        let (_, text) = BUILTIN_SCENARIOS
            .iter()
            .find(|(sid, _)| *sid == id)
            .ok_or_else(|| EngineError::Scenario(format!("unknown scenario {id:?}")))?;
        Self::from_json(text)
    }

    pub fn builtin_ids() -> impl Iterator<Item = &'static str> {
        BUILTIN_SCENARIOS.iter().map(|(id, _)| *id)
    }

    pub fn builtins() -> Result<Vec<Self>> {
        Self::builtin_ids().map(Self::builtin).collect()
    }

    /// Default action table merged with this scenario's overrides.
    pub fn rules(&self) -> Result<Rules> {
        let mut actions = default_action_rules()?;
        for (kind, rules) in &self.action_overrides {
            actions.insert(*kind, rules.clone());
        }
        Ok(Rules {
            bounds: self.bounds,
            weak_auth_below: self.weak_auth_below,
            strong_edge_adoption: self.strong_edge_adoption,
            drift: self.drift.clone(),
            scoring: self.scoring.clone(),
            actions,
        })
    }

    pub fn validate(&self) -> Result<()> {
        let fail = |msg: String| Err(EngineError::Scenario(format!("{}: {msg}", self.id)));
        if !is_valid_id(&self.id) {
            return fail("scenario id must match [a-zA-Z0-9_-]+".into());
        }
        if self.max_turns == 0 {
            return fail("max_turns must be at least 1".into());
        }
        if self.actions_per_turn == 0 {
            return fail("actions_per_turn must be at least 1".into());
        }
        if self.nodes.is_empty() {
            return fail("scenario has no nodes".into());
        }
        for node in &self.nodes {
            if node.blocked || node.block_turns > 0 || !node.deployments.is_empty() {
                return fail(format!("node {:?} must start unblocked and undeployed", node.id));
            }
            for metric in [
                NodeMetric::Adoption,
                NodeMetric::Trust,
                NodeMetric::Latency,
                NodeMetric::Cost,
            ] {
                let (lo, hi) = self.bounds.range(metric);
                let v = node.metric(metric);
                if v < lo || v > hi {
                    return fail(format!("node {:?} {metric:?} = {v} outside [{lo}, {hi}]", node.id));
                }
            }
        }
        for key in [
            CounterKey::Governance,
            CounterKey::Reliability,
            CounterKey::PoliticalCapital,
            CounterKey::SupportLoad,
            CounterKey::BusinessValue,
            CounterKey::Risk,
            CounterKey::Patience,
        ] {
            let (lo, hi) = Counters::range(key);
            let v = self.counters.get(key);
            if v < lo || v > hi {
                return fail(format!("counter {key:?} = {v} outside [{lo}, {hi}]"));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metrics::{ArchitectScorecard, ProspectScorecard};

    fn scorecards(adoption: i64, trust: i64, patience: i64) -> Scorecards {
        Scorecards {
            architect: ArchitectScorecard {
                adoption,
                trust,
                governance: 70,
                reliability: 70,
                latency: 1000,
                cost: 100,
                political_capital: 50,
                support_load: 40,
            },
            prospect: ProspectScorecard {
                business_value: 70,
                risk: 30,
                patience,
            },
        }
    }

    #[test]
    fn test_builtins_parse_and_validate() {
        let all = Scenario::builtins().unwrap();
        assert_eq!(all.len(), 3);
        for s in &all {
            s.rules().unwrap();
        }
    }

    #[test]
    fn test_default_action_table_covers_both_catalogs() {
        let table = default_action_rules().unwrap();
        for role in [Role::Architect, Role::Prospect] {
            for kind in crate::catalog::catalog(role) {
                assert!(table.contains_key(&kind), "missing {kind}");
            }
        }
    }

    #[test]
    fn test_out_of_range_node_metric_is_rejected() {
        let mut s = Scenario::builtin("speed-to-value").unwrap();
        s.nodes[0].adoption = 150;
        let err = s.validate().unwrap_err();
        assert!(matches!(&err, EngineError::Scenario(m) if m.contains("Adoption")), "{err}");

        let mut s = Scenario::builtin("speed-to-value").unwrap();
        s.nodes[0].latency = s.bounds.latency_floor - 1;
        assert!(matches!(s.validate(), Err(EngineError::Scenario(_))));
    }

    #[test]
    fn test_unknown_builtin_is_scenario_error() {
        assert!(matches!(
            Scenario::builtin("nope"),
            Err(EngineError::Scenario(_))
        ));
    }

    #[test]
    fn test_at_most_attainment() {
        let t = Target::at_most(MetricKey::Latency, 1200);
        let mut sc = scorecards(50, 50, 50);
        sc.architect.latency = 1000;
        assert_eq!(t.attainment(&sc), SCALE);
        sc.architect.latency = 2400;
        assert_eq!(t.attainment(&sc), 5_000);
    }

    #[test]
    fn test_instant_rule_precedes_turn_limit() {
        let o = Objectives::default();
        let d = o.decide(&scorecards(50, 50, 5), 12, 12).unwrap();
        assert_eq!(d.winner, Some(Role::Prospect));
        assert!(d.reason.contains("patience"));
    }

    #[test]
    fn test_no_decision_before_turn_limit() {
        let o = Objectives::default();
        assert!(o.decide(&scorecards(50, 50, 50), 5, 12).is_none());
    }

    #[test]
    fn test_exact_tie_is_a_draw() {
        let o = Objectives {
            architect: vec![Target::at_least(MetricKey::Adoption, 100)],
            prospect: vec![Target::at_least(MetricKey::Patience, 100)],
            instant: Vec::new(),
        };
        let d = o.decide(&scorecards(50, 50, 50), 12, 12).unwrap();
        assert_eq!(d.winner, None);
        assert_eq!(d.architect_attainment, d.prospect_attainment);
    }

    #[test]
    fn test_raise_clamps_percent_targets() {
        let mut o = Objectives::default();
        o.raise(MetricKey::Governance, 50);
        let gov = o.architect.iter().find(|t| t.metric == MetricKey::Governance).unwrap();
        assert_eq!(gov.value, 100);
        o.raise(MetricKey::Cost, 20);
        let cost = o.architect.iter().find(|t| t.metric == MetricKey::Cost).unwrap();
        assert_eq!(cost.value, 140);
    }
}
