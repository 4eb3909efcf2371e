//! The headless tick loop.
//!
//! Runs a scenario to completion (outcome or tick budget), optionally
//! emitting one JSON line per tick for an external controller and ASCII
//! frames for human review.

use std::io::Write;

use serde::Serialize;

use skirmish_core::simulation::{Outcome, SimulationWorld, TickEvents};

use crate::ascii::render_ascii;
use crate::scenario::Scenario;

/// Runner configuration.
#[derive(Debug, Clone, Default)]
pub struct RunnerConfig {
    /// Emit a JSON summary line after every tick.
    pub emit_state: bool,
    /// Print an ASCII frame every N ticks.
    pub ascii_every: Option<u64>,
}

/// Summary of a finished run.
#[derive(Debug, Clone, Serialize)]
pub struct RunReport {
    /// Ticks actually simulated.
    pub ticks_run: u64,
    /// Terminal outcome, if one was reached.
    pub outcome: Option<String>,
    /// Live units at the end.
    pub units_alive: usize,
    /// Live HQs at the end.
    pub hqs_alive: usize,
    /// Final state hash, for determinism comparison.
    pub final_hash: u64,
}

#[derive(Serialize)]
struct TickLine {
    tick: u64,
    moves: usize,
    attacks: usize,
    deaths: usize,
    discoveries: usize,
}

#[derive(Serialize)]
struct UnitLine {
    id: u64,
    owner: u8,
    x: i32,
    y: i32,
}

fn outcome_label(outcome: Outcome) -> String {
    match outcome {
        Outcome::Victory(color) => format!("victory:{color:?}"),
        Outcome::Draw => "draw".to_string(),
    }
}

/// Run a scenario with the given config, writing output to `out`.
///
/// # Errors
///
/// Returns an IO error if writing output fails.
pub fn run<W: Write>(
    scenario: &Scenario,
    config: &RunnerConfig,
    out: &mut W,
) -> std::io::Result<RunReport> {
    let mut world = scenario.build();
    let mut ticks_run = 0;

    for _ in 0..scenario.ticks {
        let events = world.tick(scenario.dt_ms);
        ticks_run += 1;

        if config.emit_state {
            emit_tick(&world, &events, out)?;
        }
        if let Some(every) = config.ascii_every {
            if every > 0 && world.get_tick() % every == 0 {
                writeln!(out, "{}", render_ascii(&world))?;
            }
        }
        if events.outcome.is_some() {
            break;
        }
    }

    let report = RunReport {
        ticks_run,
        outcome: world.outcome().map(outcome_label),
        units_alive: world.units().len(),
        hqs_alive: world.hqs().len(),
        final_hash: world.state_hash(),
    };
    tracing::info!(
        ticks = report.ticks_run,
        outcome = report.outcome.as_deref().unwrap_or("none"),
        units = report.units_alive,
        "run finished"
    );
    Ok(report)
}

fn emit_tick<W: Write>(
    world: &SimulationWorld,
    events: &TickEvents,
    out: &mut W,
) -> std::io::Result<()> {
    let line = TickLine {
        tick: world.get_tick(),
        moves: events.moves.len(),
        attacks: events.attacks.len(),
        deaths: events.deaths.len(),
        discoveries: events.discoveries.len(),
    };
    writeln!(out, "{}", serde_json::to_string(&line)?)?;
    for id in world.units().sorted_ids() {
        if let Some(unit) = world.units().get(id) {
            let line = UnitLine {
                id: unit.id,
                owner: unit.owner,
                x: unit.pos.x,
                y: unit.pos.y,
            };
            writeln!(out, "{}", serde_json::to_string(&line)?)?;
        }
    }
    Ok(())
}

/// Run the scenario twice and verify both runs reach the same final hash.
///
/// # Errors
///
/// Returns an IO error if writing output fails.
pub fn verify<W: Write>(scenario: &Scenario, out: &mut W) -> std::io::Result<bool> {
    let quiet = RunnerConfig::default();
    let mut sink = std::io::sink();
    let first = run(scenario, &quiet, &mut sink)?;
    let second = run(scenario, &quiet, &mut sink)?;
    let matched = first.final_hash == second.final_hash;
    if matched {
        writeln!(out, "determinism OK: {:#018x}", first.final_hash)?;
    } else {
        writeln!(
            out,
            "DESYNC: {:#018x} != {:#018x}",
            first.final_hash, second.final_hash
        )?;
    }
    Ok(matched)
}
