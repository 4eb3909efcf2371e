//! Error types for the game simulation.
//!
//! Pathfinding failure is deliberately absent here: a missing route is
//! expected steady-state behavior on a partially explored map, so planners
//! return `Option` and callers degrade through their fallback tiers.

use thiserror::Error;

use crate::hq::PlayerColor;
use crate::unit::UnitId;

/// Result type alias using [`GameError`].
pub type Result<T> = std::result::Result<T, GameError>;

/// Top-level error type for all game simulation errors.
#[derive(Debug, Error)]
pub enum GameError {
    /// Invalid unit reference.
    #[error("Unit not found: {0}")]
    UnitNotFound(UnitId),

    /// No live headquarters for the given color.
    #[error("No headquarters for color {0:?}")]
    HqNotFound(PlayerColor),

    /// Not enough energy to create a unit.
    #[error("Insufficient energy: need {required}, have {available}")]
    InsufficientEnergy {
        /// Energy required by the requested loadout.
        required: u32,
        /// Energy currently stored in the headquarters.
        available: u32,
    },

    /// No free cell around the headquarters for a new unit to exit onto.
    #[error("No exit cell around headquarters {0:?}")]
    NoExitCell(PlayerColor),

    /// Rejected module selection for a new unit.
    #[error("Invalid loadout: {0}")]
    InvalidLoadout(String),

    /// The game has reached a terminal state; no further mutation allowed.
    #[error("Simulation halted: the game is over")]
    SimulationHalted,

    /// Invalid game state.
    #[error("Invalid game state: {0}")]
    InvalidState(String),
}
