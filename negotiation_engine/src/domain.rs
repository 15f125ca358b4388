/// Negotiation Engine — Core Domain Types
///
/// Pure data. No resolution logic.
/// All numeric values: i64 whole units (points, ms, £). No float.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::arithmetic::{clamp, PERCENT_MAX, PERCENT_MIN};

// ── Participants ──────────────────────────────────────────────────

/// The two fixed, asymmetric sides of a match.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Role {
    /// Proactive side: deploys capabilities and improves the estate.
    Architect,
    /// Reactive side: constrains, negotiates and judges value.
    Prospect,
}

impl Role {
    /// Resolution order inside a step: reactive side first.
    pub const RESOLUTION_ORDER: [Role; 2] = [Role::Prospect, Role::Architect];

    pub fn opponent(self) -> Role {
        match self {
            Role::Architect => Role::Prospect,
            Role::Prospect => Role::Architect,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Role::Architect => "architect",
            Role::Prospect => "prospect",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ── Estate ────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum NodeCategory {
    BusinessUnit,
    Application,
    DataPlatform,
    Domain,
}

impl fmt::Display for NodeCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            NodeCategory::BusinessUnit => "business-unit",
            NodeCategory::Application => "application",
            NodeCategory::DataPlatform => "data-platform",
            NodeCategory::Domain => "domain",
        };
        f.write_str(s)
    }
}

/// Deployable platform capability.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Capability {
    SimbaConnectors,
    LogiVdd,
    ManagedDashboards,
}

impl fmt::Display for Capability {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Capability::SimbaConnectors => "simba-connectors",
            Capability::LogiVdd => "logi-vdd",
            Capability::ManagedDashboards => "managed-dashboards",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum AuthStrength {
    Weak,
    Strong,
}

impl Default for AuthStrength {
    fn default() -> Self {
        AuthStrength::Strong
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Deployment {
    pub capability: Capability,
    pub turn_deployed: u32,
    pub auth: AuthStrength,
}

/// A business unit, application, data platform or domain on the estate map.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Node {
    pub id: String,
    pub name: String,
    pub category: NodeCategory,
    pub adoption: i64,      // 0..=100
    pub trust: i64,         // 0..=100
    pub latency: i64,       // ms, >= latency floor
    pub cost: i64,          // £ per turn, >= cost floor
    #[serde(default)]
    pub blocked: bool,
    #[serde(default)]
    pub block_turns: u32,   // blocked <=> block_turns > 0
    #[serde(default)]
    pub deployments: Vec<Deployment>,
}

impl Node {
    pub fn has_capability(&self, capability: Capability) -> bool {
        self.deployments.iter().any(|d| d.capability == capability)
    }

    pub fn metric(&self, metric: NodeMetric) -> i64 {
        match metric {
            NodeMetric::Adoption => self.adoption,
            NodeMetric::Trust => self.trust,
            NodeMetric::Latency => self.latency,
            NodeMetric::Cost => self.cost,
        }
    }

    pub(crate) fn metric_mut(&mut self, metric: NodeMetric) -> &mut i64 {
        match metric {
            NodeMetric::Adoption => &mut self.adoption,
            NodeMetric::Trust => &mut self.trust,
            NodeMetric::Latency => &mut self.latency,
            NodeMetric::Cost => &mut self.cost,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum EdgeStrength {
    Strong,
    Weak,
}

/// Undirected dependency between two nodes. Immutable for the match.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Edge {
    pub a: String,
    pub b: String,
    pub strength: EdgeStrength,
}

impl Edge {
    /// The node on the other end of this edge, if `node_id` is an endpoint.
    pub fn other(&self, node_id: &str) -> Option<&str> {
        if self.a == node_id {
            Some(&self.b)
        } else if self.b == node_id {
            Some(&self.a)
        } else {
            None
        }
    }
}

/// Per-node metric addressed by action effects.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum NodeMetric {
    Adoption,
    Trust,
    Latency,
    Cost,
}

/// Clamp ranges for node metrics. Latency and cost have a floor only.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct MetricBounds {
    pub latency_floor: i64,
    pub cost_floor: i64,
}

impl Default for MetricBounds {
    fn default() -> Self {
        Self {
            latency_floor: 200,
            cost_floor: 0,
        }
    }
}

impl MetricBounds {
    pub fn range(&self, metric: NodeMetric) -> (i64, i64) {
        match metric {
            NodeMetric::Adoption | NodeMetric::Trust => (PERCENT_MIN, PERCENT_MAX),
            NodeMetric::Latency => (self.latency_floor.max(0), i64::MAX),
            NodeMetric::Cost => (self.cost_floor.max(0), i64::MAX),
        }
    }
}

// ── Counters ──────────────────────────────────────────────────────

/// Raw, non-graph counter addressed by action effects.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum CounterKey {
    Governance,
    Reliability,
    PoliticalCapital,
    SupportLoad,
    BusinessValue,
    Risk,
    Patience,
}

/// Accumulated non-graph state read by the metrics aggregator.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Counters {
    pub governance: i64,
    pub reliability: i64,
    pub political_capital: i64,
    pub support_load: i64,
    pub business_value: i64,
    pub risk: i64,
    pub patience: i64,
    #[serde(default)]
    pub deployments_blocked: u32,
}

impl Default for Counters {
    fn default() -> Self {
        Self {
            governance: 40,
            reliability: 60,
            political_capital: 50,
            support_load: 40,
            business_value: 30,
            risk: 50,
            patience: 70,
            deployments_blocked: 0,
        }
    }
}

impl Counters {
    pub fn get(&self, key: CounterKey) -> i64 {
        match key {
            CounterKey::Governance => self.governance,
            CounterKey::Reliability => self.reliability,
            CounterKey::PoliticalCapital => self.political_capital,
            CounterKey::SupportLoad => self.support_load,
            CounterKey::BusinessValue => self.business_value,
            CounterKey::Risk => self.risk,
            CounterKey::Patience => self.patience,
        }
    }

    /// Add `delta` and clamp to the counter's range. Returns the applied change.
    pub fn adjust(&mut self, key: CounterKey, delta: i64) -> i64 {
        let (lo, hi) = Self::range(key);
        let slot = match key {
            CounterKey::Governance => &mut self.governance,
            CounterKey::Reliability => &mut self.reliability,
            CounterKey::PoliticalCapital => &mut self.political_capital,
            CounterKey::SupportLoad => &mut self.support_load,
            CounterKey::BusinessValue => &mut self.business_value,
            CounterKey::Risk => &mut self.risk,
            CounterKey::Patience => &mut self.patience,
        };
        let before = *slot;
        *slot = clamp(before.saturating_add(delta), lo, hi);
        *slot - before
    }

    pub fn range(key: CounterKey) -> (i64, i64) {
        match key {
            CounterKey::SupportLoad => (0, i64::MAX),
            _ => (PERCENT_MIN, PERCENT_MAX),
        }
    }
}

// ── Scorecard metrics ─────────────────────────────────────────────

/// Any metric that appears on one of the two scorecards.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum MetricKey {
    Adoption,
    Trust,
    Governance,
    Reliability,
    Latency,
    Cost,
    PoliticalCapital,
    SupportLoad,
    BusinessValue,
    Risk,
    Patience,
}

impl MetricKey {
    /// Which side's scorecard carries this metric.
    pub fn owner(self) -> Role {
        match self {
            MetricKey::BusinessValue | MetricKey::Risk | MetricKey::Patience => Role::Prospect,
            _ => Role::Architect,
        }
    }

    /// Bounded to 0..=100 on the scorecard.
    pub fn is_percent(self) -> bool {
        !matches!(
            self,
            MetricKey::Latency | MetricKey::Cost | MetricKey::SupportLoad
        )
    }

    pub fn label(self) -> &'static str {
        match self {
            MetricKey::Adoption => "Adoption",
            MetricKey::Trust => "Trust",
            MetricKey::Governance => "Governance",
            MetricKey::Reliability => "Reliability",
            MetricKey::Latency => "Latency",
            MetricKey::Cost => "Cost",
            MetricKey::PoliticalCapital => "Political capital",
            MetricKey::SupportLoad => "Support load",
            MetricKey::BusinessValue => "Business value",
            MetricKey::Risk => "Risk",
            MetricKey::Patience => "Patience",
        }
    }
}

// ── Obligations & history ─────────────────────────────────────────

/// What a forced action demands of the obliged side.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "kebab-case")]
pub enum Requirement {
    /// A specific action must appear in the side's list.
    Action { action: crate::catalog::ActionKind },
    /// Any action of the given class must appear and be applied.
    Class { class: crate::catalog::ActionClass },
}

impl fmt::Display for Requirement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Requirement::Action { action } => write!(f, "{action}"),
            Requirement::Class { class } => write!(f, "any {class} action"),
        }
    }
}

/// A forced-action obligation carried on the match state.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Obligation {
    pub requirement: Requirement,
    pub imposed_turn: u32,
    pub reason: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum TimelineKind {
    Action,
    Constraint,
    Milestone,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct TimelineEntry {
    pub turn: u32,
    pub kind: TimelineKind,
    pub title: String,
    pub description: String,
    pub role: Option<Role>,
}

/// Terminal result of a match. `winner == None` is a draw.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Outcome {
    pub winner: Option<Role>,
    pub reason: String,
    pub decided_on_turn: u32,
    /// Relative attainment per side, fixed-point (SCALE = 100%).
    pub architect_attainment: i64,
    pub prospect_attainment: i64,
}
