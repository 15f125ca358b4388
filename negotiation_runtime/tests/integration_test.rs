//! Integration tests for negotiation_runtime.
//!
//! Persistent tests use temporary directories for isolation.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Barrier};

use negotiation_engine::catalog::{ActionKind, ArchitectAction, PlannedAction, ProspectAction};
use negotiation_engine::domain::Role;
use negotiation_engine::error::Rejection;
use negotiation_engine::scenario::Scenario;

use negotiation_runtime::clock::ManualClock;
use negotiation_runtime::config::RuntimeConfig;
use negotiation_runtime::error::RoomError;
use negotiation_runtime::events::{EventEnvelope, MemorySink, RoomEvent};
use negotiation_runtime::gateway::Gateway;
use negotiation_runtime::room::Phase;
use negotiation_runtime::snapshot;

const ARCHITECT: &str = "alice";
const PROSPECT: &str = "bob";

struct Harness {
    gateway: Gateway,
    sink: Arc<MemorySink>,
    clock: Arc<ManualClock>,
}

fn harness(config: RuntimeConfig) -> Harness {
    let sink = Arc::new(MemorySink::new());
    let clock = Arc::new(ManualClock::new(1_700_000_000_000));
    let gateway = Gateway::new(config, clock.clone(), sink.clone());
    Harness {
        gateway,
        sink,
        clock,
    }
}

fn reopen(config: RuntimeConfig) -> Harness {
    let sink = Arc::new(MemorySink::new());
    let clock = Arc::new(ManualClock::new(1_700_000_100_000));
    let gateway = Gateway::open(config, clock.clone(), sink.clone()).unwrap();
    Harness {
        gateway,
        sink,
        clock,
    }
}

/// Room with both seats filled, started, turn 1 planning.
fn started(g: &Gateway, scenario: &str) -> String {
    let created = g.create_room(scenario, ARCHITECT).unwrap();
    let joined = g.join_room(&created.code, PROSPECT).unwrap();
    assert_eq!(joined.role, Role::Prospect);
    g.start_game(&created.room_id).unwrap();
    created.room_id
}

fn pass_turn(g: &Gateway, room_id: &str) {
    g.submit_actions(room_id, ARCHITECT, Vec::new()).unwrap();
    let receipt = g.submit_actions(room_id, PROSPECT, Vec::new()).unwrap();
    assert!(receipt.resolved.is_some());
}

fn arch(a: ArchitectAction) -> ActionKind {
    ActionKind::Architect(a)
}

fn pros(p: ProspectAction) -> ActionKind {
    ActionKind::Prospect(p)
}

fn names(events: &[EventEnvelope]) -> Vec<&'static str> {
    events.iter().map(|e| e.event.name()).collect()
}

fn count(events: &[EventEnvelope], name: &str) -> usize {
    events.iter().filter(|e| e.event.name() == name).count()
}

fn room_dir(data: &Path, room_id: &str) -> PathBuf {
    data.join("rooms").join(room_id)
}

// ─────────────────────────────────────────────────────────────
// Lifecycle
// ─────────────────────────────────────────────────────────────

#[test]
fn deploy_simba_end_to_end() {
    let h = harness(RuntimeConfig::in_memory());
    let room_id = started(&h.gateway, "speed-to-value");
    let before = h
        .gateway
        .get_room_state(&room_id, ARCHITECT)
        .unwrap()
        .estate
        .node("crm")
        .unwrap()
        .latency;
    assert_eq!(before, 2000);

    let first = h
        .gateway
        .submit_actions(
            &room_id,
            ARCHITECT,
            vec![PlannedAction::targeted(arch(ArchitectAction::DeploySimba), "crm")],
        )
        .unwrap();
    assert_eq!(first.turn, 1);
    assert!(first.resolved.is_none());

    let second = h.gateway.submit_actions(&room_id, PROSPECT, Vec::new()).unwrap();
    let summary = second.resolved.unwrap();
    assert_eq!(summary.turn, 1);

    let view = h.gateway.get_room_state(&room_id, ARCHITECT).unwrap();
    assert_eq!(view.room.current_turn, 2);
    assert_eq!(view.room.phase, Phase::Planning);
    assert!(view.estate.node("crm").unwrap().latency <= 1850);
    assert!(view.estate.blocked_nodes().is_empty());
    assert!(view.my_planned_actions.is_empty());
    assert!(!view.opponent_submitted);
    assert_eq!(view.last_summary, Some(summary));

    let events = h.sink.for_room(&room_id);
    assert_eq!(count(&events, "turn-resolved"), 1);
    assert_eq!(count(&events, "game-started"), 1);
    let seqs: Vec<u64> = events.iter().map(|e| e.sequence).collect();
    assert_eq!(seqs, (1..=events.len() as u64).collect::<Vec<_>>());
}

#[test]
fn lifecycle_errors_are_synchronous() {
    let h = harness(RuntimeConfig::in_memory());
    let g = &h.gateway;
    let created = g.create_room("governance-first", ARCHITECT).unwrap();
    let room_id = created.room_id.as_str();

    assert!(matches!(g.start_game(room_id), Err(RoomError::NotReady(Phase::Waiting))));
    assert!(matches!(
        g.submit_actions(room_id, ARCHITECT, Vec::new()),
        Err(RoomError::WrongPhase { .. })
    ));

    g.join_room(&created.code, PROSPECT).unwrap();
    assert!(matches!(g.join_room(&created.code, "carol"), Err(RoomError::RoomFull)));
    g.leave_room(room_id, PROSPECT).unwrap();
    assert_eq!(g.list_rooms().unwrap()[0].phase, Phase::Waiting);
    g.join_room(&created.code, PROSPECT).unwrap();
    g.start_game(room_id).unwrap();
    assert!(matches!(g.start_game(room_id), Err(RoomError::NotReady(Phase::Planning))));

    assert!(matches!(
        g.submit_actions(room_id, "carol", Vec::new()),
        Err(RoomError::NotParticipant(_))
    ));
    let three = vec![
        PlannedAction::global(pros(ProspectAction::ShareRequirements)),
        PlannedAction::global(pros(ProspectAction::ApproveBudget)),
        PlannedAction::global(pros(ProspectAction::SetDeadline)),
    ];
    assert!(matches!(
        g.submit_actions(room_id, PROSPECT, three),
        Err(RoomError::Validation(Rejection::TooManyActions { .. }))
    ));
    let wrong_role = vec![PlannedAction::global(pros(ProspectAction::ShareRequirements))];
    assert!(matches!(
        g.submit_actions(room_id, ARCHITECT, wrong_role),
        Err(RoomError::Validation(Rejection::NotInCatalog { .. }))
    ));

    let view = g.get_room_state(room_id, PROSPECT).unwrap();
    assert!(view.my_planned_actions.is_empty());
    assert!(!view.opponent_submitted);
}

// ─────────────────────────────────────────────────────────────
// Submission semantics
// ─────────────────────────────────────────────────────────────

#[test]
fn resubmission_is_idempotent() {
    let h = harness(RuntimeConfig::in_memory());
    let twice = started(&h.gateway, "scale-out");
    let once = started(&h.gateway, "scale-out");
    let plan = vec![
        PlannedAction::global(arch(ArchitectAction::RunEnablement)),
        PlannedAction::targeted(arch(ArchitectAction::DeploySimba), "tms"),
    ];

    let a = h.gateway.submit_actions(&twice, ARCHITECT, plan.clone()).unwrap();
    let events_after_first = h.sink.for_room(&twice).len();
    let b = h.gateway.submit_actions(&twice, ARCHITECT, plan.clone()).unwrap();
    assert!(a.changed);
    assert!(!b.changed);
    assert_eq!(h.sink.for_room(&twice).len(), events_after_first);

    h.gateway.submit_actions(&once, ARCHITECT, plan).unwrap();
    h.gateway.submit_actions(&twice, PROSPECT, Vec::new()).unwrap();
    h.gateway.submit_actions(&once, PROSPECT, Vec::new()).unwrap();

    let x = h.gateway.get_room_state(&twice, ARCHITECT).unwrap();
    let y = h.gateway.get_room_state(&once, ARCHITECT).unwrap();
    assert_eq!(x.estate, y.estate);
    assert_eq!(x.counters, y.counters);
    assert_eq!(x.scorecards, y.scorecards);
}

#[test]
fn revised_submission_replaces_the_first() {
    let h = harness(RuntimeConfig::in_memory());
    let room_id = started(&h.gateway, "speed-to-value");
    h.gateway
        .submit_actions(
            &room_id,
            PROSPECT,
            vec![PlannedAction::global(pros(ProspectAction::ThreatenAlternative))],
        )
        .unwrap();
    let revised = vec![PlannedAction::global(pros(ProspectAction::ApproveBudget))];
    h.gateway.submit_actions(&room_id, PROSPECT, revised.clone()).unwrap();
    assert_eq!(
        h.gateway.get_room_state(&room_id, PROSPECT).unwrap().my_planned_actions,
        revised
    );

    let summary = h
        .gateway
        .submit_actions(&room_id, ARCHITECT, Vec::new())
        .unwrap()
        .resolved
        .unwrap();
    let resolved: Vec<ActionKind> = summary.actions.iter().map(|a| a.action.action).collect();
    assert_eq!(resolved, vec![pros(ProspectAction::ApproveBudget)]);
}

#[test]
fn one_side_alone_never_resolves() {
    let h = harness(RuntimeConfig::in_memory());
    let room_id = started(&h.gateway, "speed-to-value");
    for _ in 0..3 {
        let r = h.gateway.submit_actions(&room_id, ARCHITECT, Vec::new()).unwrap();
        assert!(r.resolved.is_none());
    }
    let view = h.gateway.get_room_state(&room_id, PROSPECT).unwrap();
    assert_eq!(view.room.current_turn, 1);
    assert_eq!(view.room.phase, Phase::Planning);
    assert!(view.opponent_submitted);
    assert_eq!(count(&h.sink.for_room(&room_id), "turn-resolved"), 0);
}

#[test]
fn near_simultaneous_submissions_resolve_once() {
    let h = harness(RuntimeConfig::in_memory());
    for _ in 0..16 {
        let room_id = started(&h.gateway, "scale-out");
        let barrier = Barrier::new(2);
        let (a, b) = std::thread::scope(|s| {
            let ta = s.spawn(|| {
                barrier.wait();
                h.gateway.submit_actions(&room_id, ARCHITECT, Vec::new())
            });
            let tb = s.spawn(|| {
                barrier.wait();
                h.gateway.submit_actions(&room_id, PROSPECT, Vec::new())
            });
            (ta.join().unwrap().unwrap(), tb.join().unwrap().unwrap())
        });
        assert_eq!(
            usize::from(a.resolved.is_some()) + usize::from(b.resolved.is_some()),
            1
        );
        let events = h.sink.for_room(&room_id);
        assert_eq!(count(&events, "turn-resolved"), 1);
        assert_eq!(
            h.gateway.get_room_state(&room_id, ARCHITECT).unwrap().room.current_turn,
            2
        );
    }
}

#[test]
fn same_turn_block_defeats_deployment() {
    let h = harness(RuntimeConfig::in_memory());
    let room_id = started(&h.gateway, "speed-to-value");
    pass_turn(&h.gateway, &room_id);
    pass_turn(&h.gateway, &room_id);

    let pre = h.gateway.get_room_state(&room_id, ARCHITECT).unwrap();
    assert_eq!(pre.room.current_turn, 3);
    let pre_sales = pre.estate.node("sales").unwrap().clone();

    h.gateway
        .submit_actions(
            &room_id,
            ARCHITECT,
            vec![PlannedAction::targeted(arch(ArchitectAction::DeployVdd), "sales")],
        )
        .unwrap();
    let summary = h
        .gateway
        .submit_actions(
            &room_id,
            PROSPECT,
            vec![PlannedAction::targeted(pros(ProspectAction::ImposeConstraint), "sales")],
        )
        .unwrap()
        .resolved
        .unwrap();

    let post = h.gateway.get_room_state(&room_id, ARCHITECT).unwrap();
    let sales = post.estate.node("sales").unwrap();
    assert!(sales.blocked);
    assert_eq!(sales.deployments, pre_sales.deployments);
    assert_eq!(sales.adoption, pre_sales.adoption);
    assert_eq!(summary.blocks_placed, vec!["sales".to_string()]);
    assert_eq!(summary.rejected().count(), 1);
    assert!(!post.available_actions.is_empty());
}

#[test]
fn twelve_turns_complete_the_room() {
    let h = harness(RuntimeConfig::in_memory());
    let room_id = started(&h.gateway, "speed-to-value");
    for _ in 0..12 {
        pass_turn(&h.gateway, &room_id);
    }

    let view = h.gateway.get_room_state(&room_id, ARCHITECT).unwrap();
    assert_eq!(view.room.phase, Phase::Complete);
    assert!(view.read_only);
    let outcome = view.outcome.unwrap();
    assert_eq!(outcome.decided_on_turn, 12);

    let events = h.sink.for_room(&room_id);
    assert_eq!(count(&events, "turn-resolved"), 12);
    assert_eq!(names(&events).last(), Some(&"game-over"));
    match &events.last().unwrap().event {
        RoomEvent::GameOver { outcome: o } => assert_eq!(o, &outcome),
        other => panic!("expected game-over, got {other:?}"),
    }

    assert!(matches!(
        h.gateway.submit_actions(&room_id, ARCHITECT, Vec::new()),
        Err(RoomError::Complete)
    ));

    let code = h.gateway.list_rooms().unwrap()[0].code.clone();
    let rejoin = h.gateway.join_room(&code, PROSPECT).unwrap();
    assert!(rejoin.read_only);
    assert_eq!(rejoin.role, Role::Prospect);
    assert!(matches!(h.gateway.join_room(&code, "carol"), Err(RoomError::Complete)));
    assert_eq!(h.sink.for_room(&room_id).len(), events.len());
}

#[test]
fn leaving_mid_game_keeps_the_room() {
    let h = harness(RuntimeConfig::in_memory());
    let room_id = started(&h.gateway, "speed-to-value");
    h.gateway.leave_room(&room_id, PROSPECT).unwrap();
    pass_turn(&h.gateway, &room_id);

    let code = h.gateway.list_rooms().unwrap()[0].code.clone();
    let back = h.gateway.join_room(&code, PROSPECT).unwrap();
    assert_eq!(back.role, Role::Prospect);
    assert_eq!(
        h.gateway.get_room_state(&room_id, PROSPECT).unwrap().room.current_turn,
        2
    );
}

// ─────────────────────────────────────────────────────────────
// Timeout policy
// ─────────────────────────────────────────────────────────────

#[test]
fn planning_timeout_resolves_with_passes() {
    let config = RuntimeConfig {
        planning_timeout_ms: Some(30_000),
        ..RuntimeConfig::in_memory()
    };
    let h = harness(config);
    let room_id = started(&h.gateway, "speed-to-value");
    h.gateway
        .submit_actions(
            &room_id,
            ARCHITECT,
            vec![PlannedAction::global(arch(ArchitectAction::AddGovernance))],
        )
        .unwrap();

    h.clock.advance(29_999);
    assert!(h.gateway.expire_overdue().unwrap().is_empty());

    h.clock.advance(1);
    assert_eq!(h.gateway.expire_overdue().unwrap(), vec![room_id.clone()]);

    let view = h.gateway.get_room_state(&room_id, PROSPECT).unwrap();
    assert_eq!(view.room.current_turn, 2);
    let summary = view.last_summary.unwrap();
    assert!(summary.actions.iter().all(|a| a.role == Role::Architect));

    // The clock restarted with the new planning phase.
    assert!(h.gateway.expire_overdue().unwrap().is_empty());
}

#[test]
fn no_timeout_policy_by_default() {
    let h = harness(RuntimeConfig::in_memory());
    let room_id = started(&h.gateway, "speed-to-value");
    h.clock.advance(86_400_000);
    assert!(h.gateway.expire_overdue().unwrap().is_empty());
    assert_eq!(
        h.gateway.get_room_state(&room_id, ARCHITECT).unwrap().room.current_turn,
        1
    );
}

// ─────────────────────────────────────────────────────────────
// Events
// ─────────────────────────────────────────────────────────────

#[test]
fn events_since_redelivers_the_tail() {
    let h = harness(RuntimeConfig::in_memory());
    let room_id = started(&h.gateway, "speed-to-value");
    pass_turn(&h.gateway, &room_id);

    let all = h.gateway.events_since(&room_id, 0).unwrap();
    assert_eq!(all, h.sink.for_room(&room_id));
    let tail = h.gateway.events_since(&room_id, 5).unwrap();
    assert_eq!(tail.first().map(|e| e.sequence), Some(6));
    assert_eq!(tail.len(), all.len() - 5);

    let resolved = all
        .iter()
        .find(|e| e.event.name() == "turn-resolved")
        .unwrap();
    assert_eq!(resolved.turn, 1);
    assert_eq!(resolved.phase, Phase::Resolving);
}

#[test]
fn submitted_event_hides_actions() {
    let h = harness(RuntimeConfig::in_memory());
    let room_id = started(&h.gateway, "speed-to-value");
    h.gateway
        .submit_actions(
            &room_id,
            PROSPECT,
            vec![PlannedAction::targeted(pros(ProspectAction::ImposeConstraint), "crm")],
        )
        .unwrap();
    let last = h.sink.for_room(&room_id).pop().unwrap();
    assert_eq!(
        last.event,
        RoomEvent::ParticipantSubmitted {
            role: Role::Prospect,
            action_count: 1
        }
    );
    let json = serde_json::to_string(&last).unwrap();
    assert!(!json.contains("impose-constraint"));
    assert!(!json.contains("crm"));
}

#[test]
fn broadcast_subscribers_receive_events() {
    let config = RuntimeConfig::in_memory();
    let sink = Arc::new(config.broadcast_sink());
    let mut rx = sink.subscribe();
    let g = Gateway::new(config, Arc::new(ManualClock::new(0)), sink.clone());
    let created = g.create_room("scale-out", ARCHITECT).unwrap();
    g.join_room(&created.code, PROSPECT).unwrap();

    let mut received = Vec::new();
    while let Ok(e) = rx.try_recv() {
        received.push(e);
    }
    assert_eq!(
        names(&received),
        vec!["participant-joined", "participant-joined", "phase-changed"]
    );
    assert!(received.iter().all(|e| e.room_id == created.room_id));
}

// ─────────────────────────────────────────────────────────────
// Persistence
// ─────────────────────────────────────────────────────────────

#[test]
fn restart_mid_game_restores_the_room() {
    let dir = tempfile::tempdir().unwrap();
    let config = RuntimeConfig::persistent(dir.path());
    let (room_id, before) = {
        let h = harness(config.clone());
        let room_id = started(&h.gateway, "speed-to-value");
        h.gateway
            .submit_actions(
                &room_id,
                ARCHITECT,
                vec![PlannedAction::targeted(arch(ArchitectAction::DeploySimba), "crm")],
            )
            .unwrap();
        h.gateway.submit_actions(&room_id, PROSPECT, Vec::new()).unwrap();
        h.gateway
            .submit_actions(
                &room_id,
                ARCHITECT,
                vec![PlannedAction::global(arch(ArchitectAction::RunEnablement))],
            )
            .unwrap();
        let view = h.gateway.get_room_state(&room_id, ARCHITECT).unwrap();
        (room_id, view)
    };

    let h = reopen(config);
    assert_eq!(h.gateway.list_rooms().unwrap().len(), 1);
    let after = h.gateway.get_room_state(&room_id, ARCHITECT).unwrap();
    assert_eq!(after, before);
    assert_eq!(after.room.current_turn, 2);
    assert_eq!(after.my_planned_actions.len(), 1);
    assert!(h.gateway.get_room_state(&room_id, PROSPECT).unwrap().opponent_submitted);

    let receipt = h.gateway.submit_actions(&room_id, PROSPECT, Vec::new()).unwrap();
    assert_eq!(receipt.resolved.unwrap().turn, 2);

    let journal = h.gateway.events_since(&room_id, 0).unwrap();
    let seqs: Vec<u64> = journal.iter().map(|e| e.sequence).collect();
    assert_eq!(seqs, (1..=journal.len() as u64).collect::<Vec<_>>());
    assert_eq!(count(&journal, "turn-resolved"), 2);
    assert!(h.sink.for_room(&room_id).iter().all(|e| e.sequence > 0));
}

#[test]
fn corrupt_journal_skips_only_that_room() {
    let dir = tempfile::tempdir().unwrap();
    let config = RuntimeConfig::persistent(dir.path());
    let (bad, good) = {
        let h = harness(config.clone());
        (started(&h.gateway, "speed-to-value"), started(&h.gateway, "scale-out"))
    };

    let journal = room_dir(dir.path(), &bad).join("journal.log");
    let mut bytes = fs::read(&journal).unwrap();
    bytes.extend_from_slice(&[0xff, 0xff]);
    fs::write(&journal, &bytes).unwrap();

    let h = reopen(config);
    let rooms = h.gateway.list_rooms().unwrap();
    assert_eq!(rooms.len(), 1);
    assert_eq!(rooms[0].room_id, good);
    assert!(matches!(
        h.gateway.get_room_state(&bad, ARCHITECT),
        Err(RoomError::UnknownRoom(_))
    ));
    assert_eq!(fs::read(&journal).unwrap(), bytes);
}

#[test]
fn journal_replay_wins_over_stale_snapshot() {
    let dir = tempfile::tempdir().unwrap();
    let config = RuntimeConfig::persistent(dir.path());
    let (room_id, live) = {
        let h = harness(config.clone());
        let room_id = started(&h.gateway, "governance-first");
        h.gateway
            .submit_actions(
                &room_id,
                ARCHITECT,
                vec![PlannedAction::global(arch(ArchitectAction::AddGovernance))],
            )
            .unwrap();
        h.gateway.submit_actions(&room_id, PROSPECT, Vec::new()).unwrap();
        let live = h.gateway.get_room_state(&room_id, ARCHITECT).unwrap();
        (room_id, live)
    };

    // Ruin the newest snapshot; restore falls back to one taken before the
    // turn resolved, and the journal brings it forward again.
    let snaps = room_dir(dir.path(), &room_id).join("snapshots");
    let newest = *snapshot::list_sequences(&snaps).unwrap().last().unwrap();
    fs::write(snaps.join(format!("snapshot_{:06}.json", newest)), "{}").unwrap();

    let h = reopen(config);
    let view = h.gateway.get_room_state(&room_id, ARCHITECT).unwrap();
    assert_eq!(view.room.current_turn, 2);
    assert_eq!(view.estate, live.estate);
    assert_eq!(view.counters, live.counters);
    assert_eq!(view.last_summary, live.last_summary);
    assert!(view.my_planned_actions.is_empty());

    pass_turn(&h.gateway, &room_id);
    let journal = h.gateway.events_since(&room_id, 0).unwrap();
    let seqs: Vec<u64> = journal.iter().map(|e| e.sequence).collect();
    assert_eq!(seqs, (1..=journal.len() as u64).collect::<Vec<_>>());
}

#[test]
fn custom_scenario_from_directory() {
    let dir = tempfile::tempdir().unwrap();
    let mut scenario = Scenario::builtin("scale-out").unwrap();
    scenario.id = "scale-out-short".into();
    scenario.max_turns = 2;
    fs::write(
        dir.path().join("scale-out-short.json"),
        serde_json::to_string_pretty(&scenario).unwrap(),
    )
    .unwrap();

    let config = RuntimeConfig {
        scenario_dir: Some(dir.path().to_path_buf()),
        ..RuntimeConfig::in_memory()
    };
    let h = harness(config);
    let room_id = started(&h.gateway, "scale-out-short");
    pass_turn(&h.gateway, &room_id);
    pass_turn(&h.gateway, &room_id);
    let info = h.gateway.list_rooms().unwrap().remove(0);
    assert_eq!(info.scenario_id, "scale-out-short");
    assert_eq!(info.phase, Phase::Complete);
}

#[test]
fn out_of_range_custom_scenario_is_refused() {
    let dir = tempfile::tempdir().unwrap();
    let mut scenario = Scenario::builtin("scale-out").unwrap();
    scenario.id = "scale-out-broken".into();
    scenario.nodes[0].adoption = 150;
    fs::write(
        dir.path().join("scale-out-broken.json"),
        serde_json::to_string_pretty(&scenario).unwrap(),
    )
    .unwrap();

    let config = RuntimeConfig {
        scenario_dir: Some(dir.path().to_path_buf()),
        ..RuntimeConfig::in_memory()
    };
    let h = harness(config);
    let err = h.gateway.create_room("scale-out-broken", ARCHITECT).unwrap_err();
    assert!(matches!(&err, RoomError::UnknownScenario(m) if m.contains("Adoption")), "{err}");
    assert!(h.gateway.list_rooms().unwrap().is_empty());
}
