/// Negotiation Engine — Determinism Harness
///
/// Plays a scripted match for every built-in scenario (plus any scenario
/// files given on the command line) twice, replays it from its turn
/// summaries, and compares canonical hashes across all three runs.

use std::path::Path;
use std::process::ExitCode;

use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use negotiation_engine::catalog::{available_actions, satisfies, ActionKind, PlannedAction, Targeting};
use negotiation_engine::domain::Role;
use negotiation_engine::engine::MatchEngine;
use negotiation_engine::error::{EngineError, Result};
use negotiation_engine::invariants::validate_invariants;
use negotiation_engine::resolver::Submissions;
use negotiation_engine::scenario::Scenario;
use negotiation_engine::state::MatchState;

/// Deterministic stand-in for a player: rotate through whatever is legal,
/// honouring any outstanding obligation first.
fn scripted_action(state: &MatchState, role: Role) -> Option<PlannedAction> {
    let options = available_actions(role, state, None);
    if options.is_empty() {
        return None;
    }
    let kind = state
        .obligations
        .get(&role)
        .and_then(|o| options.iter().copied().find(|k| satisfies(*k, &o.requirement)))
        .unwrap_or(options[state.current_turn as usize % options.len()]);
    Some(plan(state, role, kind))
}

fn plan(state: &MatchState, role: Role, kind: ActionKind) -> PlannedAction {
    if kind.descriptor().targeting == Targeting::Global {
        return PlannedAction::global(kind);
    }
    let target = state
        .estate
        .node_ids()
        .find(|id| available_actions(role, state, Some(id)).contains(&kind))
        .unwrap_or_default();
    PlannedAction::targeted(kind, target)
}

fn play(scenario: &Scenario) -> Result<MatchEngine> {
    let mut engine = MatchEngine::new(scenario)?;
    while !engine.state().is_over() {
        let mut submissions = Submissions::new();
        for role in Role::RESOLUTION_ORDER {
            let actions = scripted_action(engine.state(), role).into_iter().collect();
            submissions.insert(role, actions);
        }
        match engine.play_turn(&submissions) {
            Ok(_) => {}
            Err(EngineError::Rejected(rejection)) => {
                warn!(%rejection, "scripted submission rejected, passing instead");
                engine.play_turn(&Submissions::new())?;
            }
            Err(e) => return Err(e),
        }
        validate_invariants(engine.state());
    }
    Ok(engine)
}

fn check(scenario: &Scenario) -> Result<bool> {
    let run1 = play(scenario)?;
    let run2 = play(scenario)?;
    let turns: Vec<Submissions> = run1.history().iter().map(|s| s.submissions()).collect();
    let replayed = MatchEngine::replay(scenario, &turns)?;

    let (h1, h2, h3) = (run1.hash()?, run2.hash()?, replayed.hash()?);
    let state = run1.state();
    let outcome = state
        .outcome
        .as_ref()
        .map(|o| o.reason.clone())
        .unwrap_or_default();

    if h1 == h2 && h1 == h3 {
        println!(
            "[PASS] {}: turns={}, hash={}, {}",
            scenario.id,
            run1.history().len(),
            h1,
            outcome
        );
        Ok(true)
    } else {
        println!("[FAIL] {}:", scenario.id);
        if h1 != h2 {
            println!("  Determinism fail: run1={} run2={}", h1, h2);
        }
        if h1 != h3 {
            println!("  Replay mismatch: live={} replay={}", h1, h3);
        }
        Ok(false)
    }
}

fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let mut scenarios = match Scenario::builtins() {
        Ok(s) => s,
        Err(e) => {
            eprintln!("failed to load built-in scenarios: {e}");
            return ExitCode::FAILURE;
        }
    };
    for arg in std::env::args().skip(1) {
        match Scenario::load_from_file(Path::new(&arg)) {
            Ok(s) => scenarios.push(s),
            Err(e) => {
                eprintln!("{arg}: {e}");
                return ExitCode::FAILURE;
            }
        }
    }

    let total = scenarios.len();
    let mut passed = 0;
    for scenario in &scenarios {
        info!(scenario = %scenario.id, "playing scripted match");
        match check(scenario) {
            Ok(true) => passed += 1,
            Ok(false) => {}
            Err(e) => println!("[FAIL] {}: {e}", scenario.id),
        }
    }

    println!("\n===========================================");
    println!("Results: {}/{} passed", passed, total);
    if passed == total {
        println!("[OK] All determinism checks PASSED.");
        ExitCode::SUCCESS
    } else {
        println!("[FAIL] Some checks failed.");
        ExitCode::FAILURE
    }
}
