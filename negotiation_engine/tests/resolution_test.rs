//! End-to-end resolution scenarios against the built-in scenarios.

use negotiation_engine::catalog::{
    available_actions, validate, validate_submission, ActionKind, ArchitectAction, PlannedAction,
    ProspectAction,
};
use negotiation_engine::domain::{Capability, Requirement, Role};
use negotiation_engine::engine::MatchEngine;
use negotiation_engine::error::{EngineError, Rejection};
use negotiation_engine::resolver::{resolve_turn, Submissions};
use negotiation_engine::scenario::{ActionRules, Scenario};

fn arch(a: ArchitectAction) -> ActionKind {
    ActionKind::Architect(a)
}

fn pros(p: ProspectAction) -> ActionKind {
    ActionKind::Prospect(p)
}

fn subs(architect: Vec<PlannedAction>, prospect: Vec<PlannedAction>) -> Submissions {
    let mut s = Submissions::new();
    s.insert(Role::Architect, architect);
    s.insert(Role::Prospect, prospect);
    s
}

fn simba_latency_effect(scenario: &Scenario) -> i64 {
    let rules = scenario.rules().unwrap();
    let table: &ActionRules = &rules.actions[&arch(ArchitectAction::DeploySimba)];
    let json = serde_json::to_value(&table.effects).unwrap();
    json.as_array()
        .unwrap()
        .iter()
        .find(|e| e["kind"] == "node-metric" && e["metric"] == "latency")
        .and_then(|e| e["amount"].as_i64())
        .unwrap()
}

#[test]
fn deploy_simba_lowers_node_latency() {
    let scenario = Scenario::builtin("speed-to-value").unwrap();
    let mut engine = MatchEngine::new(&scenario).unwrap();
    let before = engine.state().estate.node("crm").unwrap().latency;
    assert_eq!(before, 2000);

    let summary = engine
        .play_turn(&subs(
            vec![PlannedAction::targeted(arch(ArchitectAction::DeploySimba), "crm")],
            Vec::new(),
        ))
        .unwrap()
        .clone();

    let state = engine.state();
    let crm = state.estate.node("crm").unwrap();
    let effect = simba_latency_effect(&scenario);
    assert_eq!(crm.latency, before + effect + state.rules.drift.simba_latency);
    assert!(crm.latency <= 1850);
    assert!(crm.has_capability(Capability::SimbaConnectors));
    assert_eq!(state.current_turn, 2);
    assert!(state.estate.blocked_nodes().is_empty());
    assert!(summary.outcome.is_none());
    assert!(summary.node_deltas.iter().any(|d| d.node == "crm"));
}

#[test]
fn same_turn_block_defeats_deployment() {
    let scenario = Scenario::builtin("speed-to-value").unwrap();
    let mut engine = MatchEngine::new(&scenario).unwrap();
    engine.play_turn(&Submissions::new()).unwrap();
    engine.play_turn(&Submissions::new()).unwrap();
    assert_eq!(engine.state().current_turn, 3);

    let pre = engine.state().estate.node("sales").unwrap().clone();
    let summary = engine
        .play_turn(&subs(
            vec![PlannedAction::targeted(arch(ArchitectAction::DeployVdd), "sales")],
            vec![PlannedAction::targeted(pros(ProspectAction::ImposeConstraint), "sales")],
        ))
        .unwrap()
        .clone();

    let state = engine.state();
    let sales = state.estate.node("sales").unwrap();
    assert!(sales.blocked);
    assert_eq!(sales.deployments, pre.deployments);
    assert_eq!(sales.adoption, pre.adoption);
    assert_eq!(sales.latency, pre.latency + state.rules.drift.latency);

    let rejected: Vec<_> = summary.rejected().collect();
    assert_eq!(rejected.len(), 1);
    assert_eq!(rejected[0].role, Role::Architect);

    // A deployment on the blocked node is now refused at submission time.
    let retry = PlannedAction::targeted(arch(ArchitectAction::DeployDashboards), "sales");
    assert!(matches!(
        validate(&retry, Role::Architect, state),
        Err(Rejection::NodeBlocked { .. })
    ));
}

#[test]
fn block_versus_deploy_is_order_independent() {
    let scenario = Scenario::builtin("scale-out").unwrap();
    let engine = MatchEngine::new(&scenario).unwrap();
    let input = subs(
        vec![
            PlannedAction::global(arch(ArchitectAction::RunEnablement)),
            PlannedAction::targeted(arch(ArchitectAction::DeploySimba), "tms"),
        ],
        vec![PlannedAction::targeted(pros(ProspectAction::ImposeConstraint), "tms")],
    );
    let mut swapped = input.clone();
    if let Some(list) = swapped.get_mut(&Role::Architect) {
        list.reverse();
    }
    let (a, _) = resolve_turn(engine.state(), &input).unwrap();
    let (b, _) = resolve_turn(engine.state(), &swapped).unwrap();
    assert_eq!(a.estate, b.estate);
    assert!(a.estate.node("tms").unwrap().deployments.is_empty());
    for _ in 0..3 {
        let (again, _) = resolve_turn(engine.state(), &input).unwrap();
        assert_eq!(again, a);
    }
}

#[test]
fn twelve_turns_end_by_relative_attainment() {
    let scenario = Scenario::builtin("speed-to-value").unwrap();
    assert_eq!(scenario.max_turns, 12);
    let mut engine = MatchEngine::new(&scenario).unwrap();
    for turn in 1..=12 {
        assert!(!engine.state().is_over(), "ended early on turn {turn}");
        engine.play_turn(&Submissions::new()).unwrap();
    }
    let state = engine.state();
    let outcome = state.outcome.clone().unwrap();
    assert_eq!(outcome.decided_on_turn, 12);
    assert_eq!(state.current_turn, 13);
    assert!(outcome.reason.starts_with("Turn limit reached"));
    let expected = match outcome.architect_attainment.cmp(&outcome.prospect_attainment) {
        std::cmp::Ordering::Greater => Some(Role::Architect),
        std::cmp::Ordering::Less => Some(Role::Prospect),
        std::cmp::Ordering::Equal => None,
    };
    assert_eq!(outcome.winner, expected);

    let late = subs(vec![PlannedAction::global(arch(ArchitectAction::RunEnablement))], Vec::new());
    assert!(matches!(engine.play_turn(&late), Err(EngineError::GameOver)));
    assert_eq!(
        validate_submission(&late[&Role::Architect], Role::Architect, engine.state()),
        Err(Rejection::MatchOver)
    );
    assert!(available_actions(Role::Prospect, engine.state(), None).is_empty());
}

#[test]
fn patience_floor_ends_match_early() {
    let scenario = Scenario::builtin("speed-to-value").unwrap();
    let mut engine = MatchEngine::new(&scenario).unwrap();
    // patience 50: threats and demands cost 25 a turn, drift another 2
    engine
        .play_turn(&subs(
            Vec::new(),
            vec![
                PlannedAction::global(pros(ProspectAction::ThreatenAlternative)),
                PlannedAction::global(pros(ProspectAction::DemandPoc)),
            ],
        ))
        .unwrap();
    assert!(!engine.state().is_over());
    engine
        .play_turn(&subs(
            Vec::new(),
            vec![PlannedAction::global(pros(ProspectAction::ThreatenAlternative))],
        ))
        .unwrap();
    let outcome = engine.state().outcome.clone().unwrap();
    assert_eq!(outcome.winner, Some(Role::Prospect));
    assert_eq!(outcome.decided_on_turn, 2);
    assert!(outcome.reason.contains("patience"));
}

#[test]
fn obligation_reserves_a_slot() {
    let scenario = Scenario::builtin("speed-to-value").unwrap();
    let mut engine = MatchEngine::new(&scenario).unwrap();
    engine
        .play_turn(&subs(
            Vec::new(),
            vec![PlannedAction::global(pros(ProspectAction::DemandPoc))],
        ))
        .unwrap();
    assert!(engine.state().obligations.contains_key(&Role::Architect));

    let two_free = vec![
        PlannedAction::global(arch(ArchitectAction::RunEnablement)),
        PlannedAction::global(arch(ArchitectAction::AddGovernance)),
    ];
    assert!(matches!(
        validate_submission(&two_free, Role::Architect, engine.state()),
        Err(Rejection::ActionsExhausted { remaining: 1, requested: 2, .. })
    ));

    let with_deploy = vec![
        PlannedAction::global(arch(ArchitectAction::RunEnablement)),
        PlannedAction::targeted(arch(ArchitectAction::DeployDashboards), "finance"),
    ];
    engine.play_turn(&subs(with_deploy, Vec::new())).unwrap();
    assert!(engine.state().obligations.is_empty());
}

#[test]
fn newest_obligation_replaces_an_unmet_one() {
    let scenario = Scenario::builtin("speed-to-value").unwrap();
    let mut engine = MatchEngine::new(&scenario).unwrap();
    engine
        .play_turn(&subs(
            Vec::new(),
            vec![
                PlannedAction::global(pros(ProspectAction::DemandPoc)),
                PlannedAction::targeted(pros(ProspectAction::ImposeConstraint), "finance"),
            ],
        ))
        .unwrap();
    assert!(matches!(
        engine.state().obligations[&Role::Architect].requirement,
        Requirement::Class { .. }
    ));

    engine
        .play_turn(&subs(
            vec![PlannedAction::targeted(arch(ArchitectAction::ExecutiveEscalation), "finance")],
            Vec::new(),
        ))
        .unwrap();
    let obligation = &engine.state().obligations[&Role::Architect];
    assert_eq!(
        obligation.requirement,
        Requirement::Action {
            action: arch(ArchitectAction::PresentRoadmap)
        }
    );
    assert_eq!(obligation.imposed_turn, 2);
}

#[test]
fn escalation_needs_political_capital() {
    let mut scenario = Scenario::builtin("governance-first").unwrap();
    scenario.counters.political_capital = 10;
    let mut engine = MatchEngine::new(&scenario).unwrap();
    engine
        .play_turn(&subs(
            Vec::new(),
            vec![PlannedAction::targeted(pros(ProspectAction::ImposeConstraint), "claims")],
        ))
        .unwrap();
    let escalate = PlannedAction::targeted(arch(ArchitectAction::ExecutiveEscalation), "claims");
    assert!(matches!(
        validate(&escalate, Role::Architect, engine.state()),
        Err(Rejection::Precondition { required: 20, .. })
    ));
    let unblocked = PlannedAction::targeted(arch(ArchitectAction::ExecutiveEscalation), "party");
    assert!(validate(&unblocked, Role::Architect, engine.state()).is_err());
}

#[test]
fn catalog_rejections() {
    let scenario = Scenario::builtin("speed-to-value").unwrap();
    let engine = MatchEngine::new(&scenario).unwrap();
    let state = engine.state();

    let wrong_role = PlannedAction::global(pros(ProspectAction::DemandPoc));
    assert!(matches!(
        validate(&wrong_role, Role::Architect, state),
        Err(Rejection::NotInCatalog { .. })
    ));

    let wrong_category = PlannedAction::targeted(arch(ArchitectAction::DeploySimba), "sales");
    assert!(matches!(
        validate(&wrong_category, Role::Architect, state),
        Err(Rejection::WrongCategory { .. })
    ));

    let no_target = PlannedAction::global(arch(ArchitectAction::DeployVdd));
    assert!(matches!(
        validate(&no_target, Role::Architect, state),
        Err(Rejection::MissingTarget { .. })
    ));

    let stray_target = PlannedAction::targeted(arch(ArchitectAction::RunEnablement), "crm");
    assert!(matches!(
        validate(&stray_target, Role::Architect, state),
        Err(Rejection::UnexpectedTarget { .. })
    ));

    let ghost = PlannedAction::targeted(pros(ProspectAction::ImposeConstraint), "ghost");
    assert!(matches!(
        validate(&ghost, Role::Prospect, state),
        Err(Rejection::UnknownNode { .. })
    ));

    let three = vec![
        PlannedAction::global(pros(ProspectAction::ShareRequirements)),
        PlannedAction::global(pros(ProspectAction::ApproveBudget)),
        PlannedAction::global(pros(ProspectAction::SetDeadline)),
    ];
    assert!(matches!(
        validate_submission(&three, Role::Prospect, state),
        Err(Rejection::TooManyActions { submitted: 3, cap: 2 })
    ));

    let twice = vec![
        PlannedAction::global(pros(ProspectAction::ShareRequirements)),
        PlannedAction::global(pros(ProspectAction::ShareRequirements)),
    ];
    assert!(matches!(
        validate_submission(&twice, Role::Prospect, state),
        Err(Rejection::DuplicateAction { .. })
    ));
}
