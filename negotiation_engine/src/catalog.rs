/// Negotiation Engine — Action Catalog & Validator
///
/// The only role-aware module. Each side has its own action enum; the
/// role-tagged `ActionKind` dispatches to the matching descriptor so the
/// resolver only ever sees classes and targeting rules.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::domain::{Capability, Node, NodeCategory, Requirement, Role};
use crate::error::Rejection;
use crate::graph::Estate;
use crate::state::MatchState;

// ---------------------------------------------------------------------------
// Classification
// ---------------------------------------------------------------------------

/// Resolution class. Decides which resolver step applies the action.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ActionClass {
    /// Step 1: constraints and negotiation moves.
    Negotiation,
    /// Step 2: node deployments, re-validated against post-step-1 state.
    Deployment,
    /// Step 3: estate-wide and counter-only effects.
    Global,
}

impl fmt::Display for ActionClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ActionClass::Negotiation => "negotiation",
            ActionClass::Deployment => "deployment",
            ActionClass::Global => "global",
        };
        f.write_str(s)
    }
}

/// What an action may be aimed at.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Targeting {
    Global,
    /// Any node whose category is listed; empty list = any category.
    Node(&'static [NodeCategory]),
    /// A node that is currently blocked.
    BlockedNode,
}

/// Static description of one action type.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ActionDescriptor {
    pub kind: ActionKind,
    pub title: &'static str,
    pub class: ActionClass,
    pub targeting: Targeting,
    pub deploys: Option<Capability>,
}

/// Per-role action set.
pub trait RoleAction: Copy + Sized + 'static {
    const ROLE: Role;
    fn all() -> &'static [Self];
    fn name(self) -> &'static str;
    fn descriptor(self) -> ActionDescriptor;
}

// ---------------------------------------------------------------------------
// Architect
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum ArchitectAction {
    DeploySimba,
    DeployVdd,
    DeployDashboards,
    RunEnablement,
    AddGovernance,
    PerformanceTuning,
    IncidentResponse,
    PresentRoadmap,
    ExecutiveEscalation,
}

const CONNECTOR_HOSTS: &[NodeCategory] = &[NodeCategory::Application, NodeCategory::DataPlatform];
const BUSINESS_UNITS: &[NodeCategory] = &[NodeCategory::BusinessUnit];
const ANY_NODE: &[NodeCategory] = &[];

impl RoleAction for ArchitectAction {
    const ROLE: Role = Role::Architect;

    fn all() -> &'static [Self] {
        use ArchitectAction::*;
        &[
            DeploySimba,
            DeployVdd,
            DeployDashboards,
            RunEnablement,
            AddGovernance,
            PerformanceTuning,
            IncidentResponse,
            PresentRoadmap,
            ExecutiveEscalation,
        ]
    }

    fn name(self) -> &'static str {
        match self {
            ArchitectAction::DeploySimba => "deploy-simba",
            ArchitectAction::DeployVdd => "deploy-vdd",
            ArchitectAction::DeployDashboards => "deploy-dashboards",
            ArchitectAction::RunEnablement => "run-enablement",
            ArchitectAction::AddGovernance => "add-governance",
            ArchitectAction::PerformanceTuning => "performance-tuning",
            ArchitectAction::IncidentResponse => "incident-response",
            ArchitectAction::PresentRoadmap => "present-roadmap",
            ArchitectAction::ExecutiveEscalation => "executive-escalation",
        }
    }

    fn descriptor(self) -> ActionDescriptor {
        let kind = ActionKind::Architect(self);
        let (title, class, targeting, deploys) = match self {
            ArchitectAction::DeploySimba => (
                "Deploy Simba Connectors",
                ActionClass::Deployment,
                Targeting::Node(CONNECTOR_HOSTS),
                Some(Capability::SimbaConnectors),
            ),
            ArchitectAction::DeployVdd => (
                "Enable VDD Pilot",
                ActionClass::Deployment,
                Targeting::Node(BUSINESS_UNITS),
                Some(Capability::LogiVdd),
            ),
            ArchitectAction::DeployDashboards => (
                "Publish Managed Dashboards",
                ActionClass::Deployment,
                Targeting::Node(BUSINESS_UNITS),
                Some(Capability::ManagedDashboards),
            ),
            ArchitectAction::RunEnablement => {
                ("Run Enablement", ActionClass::Global, Targeting::Global, None)
            }
            ArchitectAction::AddGovernance => {
                ("Add Governance Policy", ActionClass::Global, Targeting::Global, None)
            }
            ArchitectAction::PerformanceTuning => {
                ("Performance Tuning", ActionClass::Global, Targeting::Global, None)
            }
            ArchitectAction::IncidentResponse => {
                ("Incident Response", ActionClass::Global, Targeting::Global, None)
            }
            ArchitectAction::PresentRoadmap => {
                ("Present Roadmap", ActionClass::Global, Targeting::Global, None)
            }
            ArchitectAction::ExecutiveEscalation => (
                "Executive Escalation",
                ActionClass::Global,
                Targeting::BlockedNode,
                None,
            ),
        };
        ActionDescriptor {
            kind,
            title,
            class,
            targeting,
            deploys,
        }
    }
}

// ---------------------------------------------------------------------------
// Prospect
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum ProspectAction {
    ImposeConstraint,
    DemandPoc,
    RequestSecurityReview,
    ThreatenAlternative,
    ApproveBudget,
    SetDeadline,
    ShareRequirements,
    AcknowledgeProgress,
}

impl RoleAction for ProspectAction {
    const ROLE: Role = Role::Prospect;

    fn all() -> &'static [Self] {
        use ProspectAction::*;
        &[
            ImposeConstraint,
            DemandPoc,
            RequestSecurityReview,
            ThreatenAlternative,
            ApproveBudget,
            SetDeadline,
            ShareRequirements,
            AcknowledgeProgress,
        ]
    }

    fn name(self) -> &'static str {
        match self {
            ProspectAction::ImposeConstraint => "impose-constraint",
            ProspectAction::DemandPoc => "demand-poc",
            ProspectAction::RequestSecurityReview => "request-security-review",
            ProspectAction::ThreatenAlternative => "threaten-alternative",
            ProspectAction::ApproveBudget => "approve-budget",
            ProspectAction::SetDeadline => "set-deadline",
            ProspectAction::ShareRequirements => "share-requirements",
            ProspectAction::AcknowledgeProgress => "acknowledge-progress",
        }
    }

    fn descriptor(self) -> ActionDescriptor {
        let kind = ActionKind::Prospect(self);
        let (title, targeting) = match self {
            ProspectAction::ImposeConstraint => ("Impose Constraint", Targeting::Node(ANY_NODE)),
            ProspectAction::DemandPoc => ("Demand Proof-of-Concept", Targeting::Global),
            ProspectAction::RequestSecurityReview => {
                ("Request Security Review", Targeting::Global)
            }
            ProspectAction::ThreatenAlternative => ("Threaten Alternative", Targeting::Global),
            ProspectAction::ApproveBudget => ("Approve Budget", Targeting::Global),
            ProspectAction::SetDeadline => ("Set Deadline", Targeting::Global),
            ProspectAction::ShareRequirements => ("Share Requirements", Targeting::Global),
            ProspectAction::AcknowledgeProgress => ("Acknowledge Progress", Targeting::Global),
        };
        ActionDescriptor {
            kind,
            title,
            class: ActionClass::Negotiation,
            targeting,
            deploys: None,
        }
    }
}

// ---------------------------------------------------------------------------
// Role-tagged action kind
// ---------------------------------------------------------------------------

/// An action type, tagged with the role whose catalog it belongs to.
/// Serialized as its kebab-case name (`"deploy-simba"`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum ActionKind {
    Architect(ArchitectAction),
    Prospect(ProspectAction),
}

impl ActionKind {
    pub fn role(self) -> Role {
        match self {
            ActionKind::Architect(_) => ArchitectAction::ROLE,
            ActionKind::Prospect(_) => ProspectAction::ROLE,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            ActionKind::Architect(a) => a.name(),
            ActionKind::Prospect(p) => p.name(),
        }
    }

    pub fn descriptor(self) -> ActionDescriptor {
        match self {
            ActionKind::Architect(a) => a.descriptor(),
            ActionKind::Prospect(p) => p.descriptor(),
        }
    }

    pub fn class(self) -> ActionClass {
        self.descriptor().class
    }
}

impl fmt::Display for ActionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ActionKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        ArchitectAction::all()
            .iter()
            .find(|a| a.name() == s)
            .map(|a| ActionKind::Architect(*a))
            .or_else(|| {
                ProspectAction::all()
                    .iter()
                    .find(|p| p.name() == s)
                    .map(|p| ActionKind::Prospect(*p))
            })
            .ok_or_else(|| format!("unknown action type {s:?}"))
    }
}

impl Serialize for ActionKind {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for ActionKind {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

/// Every action in `role`'s catalog, in catalog order.
pub fn catalog(role: Role) -> Vec<ActionKind> {
    match role {
        Role::Architect => ArchitectAction::all()
            .iter()
            .map(|a| ActionKind::Architect(*a))
            .collect(),
        Role::Prospect => ProspectAction::all()
            .iter()
            .map(|p| ActionKind::Prospect(*p))
            .collect(),
    }
}

// ---------------------------------------------------------------------------
// Planned actions
// ---------------------------------------------------------------------------

/// One move planned by a participant for the current turn.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PlannedAction {
    pub action: ActionKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target: Option<String>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub parameters: BTreeMap<String, serde_json::Value>,
}

impl PlannedAction {
    pub fn global(action: ActionKind) -> Self {
        Self {
            action,
            target: None,
            parameters: BTreeMap::new(),
        }
    }

    pub fn targeted(action: ActionKind, node_id: &str) -> Self {
        Self {
            action,
            target: Some(node_id.to_string()),
            parameters: BTreeMap::new(),
        }
    }

    /// Free-text note carried into the timeline, if the participant gave one.
    pub fn note(&self) -> Option<&str> {
        self.parameters.get("note").and_then(|v| v.as_str())
    }
}

// ---------------------------------------------------------------------------
// Validation
// ---------------------------------------------------------------------------

/// Validate a single planned action for `role` against current state.
pub fn validate(action: &PlannedAction, role: Role, state: &MatchState) -> Result<(), Rejection> {
    if state.outcome.is_some() {
        return Err(Rejection::MatchOver);
    }
    if action.action.role() != role {
        return Err(Rejection::NotInCatalog {
            action: action.action,
            role,
        });
    }
    let descriptor = action.action.descriptor();
    check_target(action, &descriptor, &state.estate)?;
    check_preconditions(action, state)
}

/// Validate a whole submission: per-action rules plus the per-turn cap,
/// duplicate detection and slots reserved by a pending obligation.
pub fn validate_submission(
    actions: &[PlannedAction],
    role: Role,
    state: &MatchState,
) -> Result<(), Rejection> {
    if state.outcome.is_some() {
        return Err(Rejection::MatchOver);
    }
    let cap = state.actions_per_turn;
    if actions.len() > cap {
        return Err(Rejection::TooManyActions {
            submitted: actions.len(),
            cap,
        });
    }

    let mut seen: BTreeSet<(ActionKind, Option<&str>)> = BTreeSet::new();
    for action in actions {
        validate(action, role, state)?;
        if !seen.insert((action.action, action.target.as_deref())) {
            return Err(Rejection::DuplicateAction {
                action: action.action,
            });
        }
    }

    if let Some(obligation) = state.obligations.get(&role) {
        let remaining = cap.saturating_sub(1);
        let requested = actions
            .iter()
            .filter(|a| !satisfies(a.action, &obligation.requirement))
            .count();
        if requested > remaining {
            return Err(Rejection::ActionsExhausted {
                remaining,
                requested,
                reserved_for: obligation.requirement.to_string(),
            });
        }
    }
    Ok(())
}

/// Deployment re-validation used by the resolver after step 1.
pub fn revalidate_deployment(action: &PlannedAction, estate: &Estate) -> Result<(), Rejection> {
    let descriptor = action.action.descriptor();
    check_target(action, &descriptor, estate).map(|_| ())
}

/// Whether `action` fulfils `requirement`.
pub fn satisfies(action: ActionKind, requirement: &Requirement) -> bool {
    match requirement {
        Requirement::Action { action: required } => action == *required,
        Requirement::Class { class } => action.class() == *class,
    }
}

/// Actions `role` could legally plan right now. With `node`, node-targeted
/// actions are checked against that node only; without it, a node-targeted
/// action is listed if any node accepts it.
pub fn available_actions(role: Role, state: &MatchState, node: Option<&str>) -> Vec<ActionKind> {
    if state.outcome.is_some() {
        return Vec::new();
    }
    catalog(role)
        .into_iter()
        .filter(|kind| {
            let descriptor = kind.descriptor();
            match descriptor.targeting {
                Targeting::Global => validate(&PlannedAction::global(*kind), role, state).is_ok(),
                _ => match node {
                    Some(id) => validate(&PlannedAction::targeted(*kind, id), role, state).is_ok(),
                    None => state
                        .estate
                        .nodes()
                        .any(|n| validate(&PlannedAction::targeted(*kind, &n.id), role, state).is_ok()),
                },
            }
        })
        .collect()
}

fn check_target<'a>(
    action: &PlannedAction,
    descriptor: &ActionDescriptor,
    estate: &'a Estate,
) -> Result<Option<&'a Node>, Rejection> {
    let kind = action.action;
    match (descriptor.targeting, action.target.as_deref()) {
        (Targeting::Global, None) => Ok(None),
        (Targeting::Global, Some(_)) => Err(Rejection::UnexpectedTarget { action: kind }),
        (_, None) => Err(Rejection::MissingTarget { action: kind }),
        (Targeting::Node(categories), Some(id)) => {
            let node = estate.node(id).ok_or_else(|| Rejection::UnknownNode {
                node: id.to_string(),
            })?;
            if !categories.is_empty() && !categories.contains(&node.category) {
                return Err(Rejection::WrongCategory {
                    action: kind,
                    node: node.id.clone(),
                    category: node.category,
                });
            }
            if descriptor.class == ActionClass::Deployment && node.blocked {
                return Err(Rejection::NodeBlocked {
                    node: node.id.clone(),
                    turns: node.block_turns,
                });
            }
            if let Some(capability) = descriptor.deploys {
                if node.has_capability(capability) {
                    return Err(Rejection::AlreadyDeployed {
                        node: node.id.clone(),
                        capability,
                    });
                }
            }
            Ok(Some(node))
        }
        (Targeting::BlockedNode, Some(id)) => {
            let node = estate.node(id).ok_or_else(|| Rejection::UnknownNode {
                node: id.to_string(),
            })?;
            if !node.blocked {
                return Err(Rejection::NodeNotBlocked {
                    node: node.id.clone(),
                });
            }
            Ok(Some(node))
        }
    }
}

fn check_preconditions(action: &PlannedAction, state: &MatchState) -> Result<(), Rejection> {
    let Some(rules) = state.rules.actions.get(&action.action) else {
        return Ok(());
    };
    for pre in &rules.requires {
        let actual = state.counters.get(pre.counter);
        if actual < pre.at_least {
            return Err(Rejection::Precondition {
                action: action.action,
                counter: pre.counter,
                required: pre.at_least,
                actual,
            });
        }
    }
    Ok(())
}
