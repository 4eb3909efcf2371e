//! # Skirmish Core
//!
//! Deterministic simulation core for the cave skirmish game.
//!
//! This crate contains **only** deterministic logic:
//! - No rendering
//! - No IO
//! - No system randomness (all randomness flows through a seeded [`rng::SimRng`])
//! - No floating-point math (fractional scores use fixed-point)
//!
//! Players own a headquarters and program autonomous units with short
//! numeric instruction sequences. Units then run continuously: exploring a
//! shared fog-of-war map, pathing to friendly or hostile headquarters, and
//! fighting with module-based damage. The surrounding UI (turn timers,
//! canvas rendering, input) lives outside this crate and talks to it
//! through [`simulation::SimulationWorld`].
//!
//! ## Crate Structure
//!
//! - [`grid`] - wall/floor grid and coordinate types
//! - [`hq`] - headquarters footprint, hit points and energy
//! - [`unit`] - units, modules, trails, the unit store
//! - [`knowledge`] - per-player shared fog-of-war memory
//! - [`program`] - numeric token parsing into an instruction AST
//! - [`movement`] - exploration and local approach planners
//! - [`pathfinding`] - A* to HQ perimeters, bridge search
//! - [`combat`] - target acquisition and module-targeted damage
//! - [`simulation`] - the tick loop that drives everything

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::all, clippy::pedantic)]

pub mod combat;
pub mod error;
pub mod grid;
pub mod hq;
pub mod knowledge;
pub mod math;
pub mod movement;
pub mod pathfinding;
pub mod program;
pub mod rng;
pub mod simulation;
pub mod unit;
pub mod world;

/// Re-export commonly used types
pub mod prelude {
    pub use crate::combat::{AttackKind, TargetRef};
    pub use crate::error::{GameError, Result};
    pub use crate::grid::{Cell, Grid};
    pub use crate::hq::{Hq, HqKey, PlayerColor, PlayerId};
    pub use crate::knowledge::KnowledgeMap;
    pub use crate::math::Fixed;
    pub use crate::program::{Action, Condition, Program};
    pub use crate::rng::SimRng;
    pub use crate::simulation::{Outcome, SimulationWorld, TickEvents};
    pub use crate::unit::{Module, ModuleKind, Unit, UnitId};
}
