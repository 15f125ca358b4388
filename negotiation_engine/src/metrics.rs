/// Negotiation Engine — Metrics Aggregator
///
/// Scorecards are a pure function of (estate, counters, scoring rules).
/// Never adjusted in place; the resolver recomputes them once per turn.

use serde::{Deserialize, Serialize};

use crate::arithmetic::{clamp, mean, PERCENT_MAX, PERCENT_MIN};
use crate::domain::{AuthStrength, Counters, MetricKey, Role};
use crate::graph::Estate;
use crate::scenario::ScoringRules;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ArchitectScorecard {
    pub adoption: i64,
    pub trust: i64,
    pub governance: i64,
    pub reliability: i64,
    pub latency: i64,
    pub cost: i64,
    pub political_capital: i64,
    pub support_load: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ProspectScorecard {
    pub business_value: i64,
    pub risk: i64,
    pub patience: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Scorecards {
    pub architect: ArchitectScorecard,
    pub prospect: ProspectScorecard,
}

impl Scorecards {
    pub fn get(&self, metric: MetricKey) -> i64 {
        let a = &self.architect;
        let p = &self.prospect;
        match metric {
            MetricKey::Adoption => a.adoption,
            MetricKey::Trust => a.trust,
            MetricKey::Governance => a.governance,
            MetricKey::Reliability => a.reliability,
            MetricKey::Latency => a.latency,
            MetricKey::Cost => a.cost,
            MetricKey::PoliticalCapital => a.political_capital,
            MetricKey::SupportLoad => a.support_load,
            MetricKey::BusinessValue => p.business_value,
            MetricKey::Risk => p.risk,
            MetricKey::Patience => p.patience,
        }
    }

    /// Every metric on `role`'s card, in display order.
    pub fn metrics(role: Role) -> &'static [MetricKey] {
        match role {
            Role::Architect => &[
                MetricKey::Adoption,
                MetricKey::Trust,
                MetricKey::Governance,
                MetricKey::Reliability,
                MetricKey::Latency,
                MetricKey::Cost,
                MetricKey::PoliticalCapital,
                MetricKey::SupportLoad,
            ],
            Role::Prospect => &[
                MetricKey::BusinessValue,
                MetricKey::Risk,
                MetricKey::Patience,
            ],
        }
    }
}

fn percent(v: i64) -> i64 {
    clamp(v, PERCENT_MIN, PERCENT_MAX)
}

/// Recompute both scorecards from scratch.
pub fn aggregate(estate: &Estate, counters: &Counters, scoring: &ScoringRules) -> Scorecards {
    let deployments = estate.deployment_count() as i64;
    let weak = estate
        .nodes()
        .flat_map(|n| n.deployments.iter())
        .filter(|d| d.auth == AuthStrength::Weak)
        .count() as i64;

    Scorecards {
        architect: ArchitectScorecard {
            adoption: percent(mean(estate.nodes().map(|n| n.adoption))),
            trust: percent(mean(estate.nodes().map(|n| n.trust))),
            governance: percent(counters.governance),
            reliability: percent(counters.reliability),
            latency: mean(estate.nodes().map(|n| n.latency)).max(0),
            cost: estate
                .nodes()
                .fold(0i64, |acc, n| acc.saturating_add(n.cost))
                .max(0),
            political_capital: percent(counters.political_capital),
            support_load: counters.support_load.max(0),
        },
        prospect: ProspectScorecard {
            business_value: percent(
                counters
                    .business_value
                    .saturating_add(scoring.value_per_deployment.saturating_mul(deployments)),
            ),
            risk: percent(
                counters
                    .risk
                    .saturating_add(scoring.risk_per_weak_deployment.saturating_mul(weak)),
            ),
            patience: percent(counters.patience),
        },
    }
}
