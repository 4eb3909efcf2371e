//! Headless game runner for AI testing and CI verification.
//!
//! This crate owns everything the simulation core treats as an external
//! collaborator, plus the tooling to run games without a renderer:
//!
//! - **Map generation**: the procedural cave generator (cellular automaton
//!   plus region connection) that produces the opaque grid and HQ
//!   placements the core consumes.
//! - **Scenarios**: RON files describing seed, map size, players and
//!   starting squads.
//! - **Runner**: a fixed-timestep loop with JSON-line output, ASCII
//!   rendering and replay/determinism verification.
//!
//! # Example
//!
//! ```bash
//! # Run the default skirmish for 2000 ticks
//! cargo run -p skirmish_headless -- --ticks 2000
//!
//! # Run a scenario file and verify determinism
//! cargo run -p skirmish_headless -- --scenario scenarios/skirmish.ron --verify
//! ```

pub mod ascii;
pub mod mapgen;
pub mod runner;
pub mod scenario;

pub use ascii::render_ascii;
pub use mapgen::{generate_map, GeneratedMap, MapConfig};
pub use runner::{run, RunReport, RunnerConfig};
pub use scenario::{Scenario, ScenarioError, SquadSetup};
