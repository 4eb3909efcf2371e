//! Scenario loading and configuration.
//!
//! Scenarios define a headless game: map seed and dimensions, players,
//! and the starting squads with their loadouts and programs.

use std::path::Path;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use skirmish_core::hq::PlayerColor;
use skirmish_core::simulation::SimulationWorld;
use skirmish_core::unit::ModuleKind;

use crate::mapgen::{generate_map, MapConfig};

/// Error type for scenario operations.
#[derive(Error, Debug)]
pub enum ScenarioError {
    /// File not found.
    #[error("Scenario file not found: {0}")]
    FileNotFound(String),
    /// Failed to read file.
    #[error("Failed to read scenario file: {0}")]
    ReadError(#[from] std::io::Error),
    /// Failed to parse RON.
    #[error("Failed to parse scenario: {0}")]
    ParseError(#[from] ron::error::SpannedError),
}

/// Starting squad for one player.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SquadSetup {
    /// Owning color.
    pub color: PlayerColor,
    /// Number of units.
    pub count: usize,
    /// Module loadout of each unit.
    pub loadout: Vec<ModuleKind>,
    /// Program tokens assigned to each unit.
    pub program: Vec<i32>,
}

/// A complete scenario configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Scenario {
    /// Scenario name.
    pub name: String,
    /// Human-readable description.
    pub description: String,
    /// Random seed for map generation and the simulation.
    pub seed: u64,
    /// Map width in cells.
    pub cols: i32,
    /// Map height in cells.
    pub rows: i32,
    /// Number of players (2-4); HQs are placed for each.
    pub players: u8,
    /// Starting squads.
    pub squads: Vec<SquadSetup>,
    /// Tick budget.
    pub ticks: u64,
    /// Simulated milliseconds per tick.
    pub dt_ms: u64,
}

impl Default for Scenario {
    fn default() -> Self {
        Self {
            name: "Default Skirmish".to_string(),
            description: "Two programmed squads hunt each other's HQ".to_string(),
            seed: 12345,
            cols: 96,
            rows: 69,
            players: 2,
            squads: vec![
                SquadSetup {
                    color: PlayerColor::Blue,
                    count: 3,
                    loadout: vec![ModuleKind::Movement, ModuleKind::Attack],
                    program: vec![6, 11, 5, 12, 15, 2],
                },
                SquadSetup {
                    color: PlayerColor::Red,
                    count: 3,
                    loadout: vec![ModuleKind::Movement, ModuleKind::RangedAttack],
                    program: vec![6, 11, 5, 12, 15, 2],
                },
            ],
            ticks: 4000,
            dt_ms: 250,
        }
    }
}

impl Scenario {
    /// Load a scenario from a RON file.
    ///
    /// # Errors
    ///
    /// Returns a [`ScenarioError`] when the file is missing, unreadable or
    /// not valid RON.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, ScenarioError> {
        let path = path.as_ref();
        if !path.exists() {
            return Err(ScenarioError::FileNotFound(path.display().to_string()));
        }
        let contents = std::fs::read_to_string(path)?;
        let scenario: Scenario = ron::from_str(&contents)?;
        Ok(scenario)
    }

    /// Generate the map and build the initial world: HQs placed, squads
    /// spawned around them, programs assigned.
    #[must_use]
    pub fn build(&self) -> SimulationWorld {
        let config = MapConfig {
            cols: self.cols,
            rows: self.rows,
            players: self.players,
            seed: self.seed,
        };
        let map = generate_map(&config);
        let mut world = SimulationWorld::new(map.grid, map.hqs, self.players, self.seed);
        for squad in &self.squads {
            let ids = world
                .spawn_initial_units(squad.color, squad.count, &squad.loadout)
                .unwrap_or_default();
            for id in ids {
                // A squad with a malformed program still spawns; the
                // units just idle, as they would in a live game.
                let _ = world.assign_program(id, &squad.program);
            }
        }
        world
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_scenario_builds() {
        let world = Scenario::default().build();
        assert_eq!(world.hqs().len(), 2);
        assert_eq!(world.units().len(), 6);
    }

    #[test]
    fn test_ron_roundtrip() {
        let scenario = Scenario::default();
        let text = ron::to_string(&scenario).unwrap();
        let back: Scenario = ron::from_str(&text).unwrap();
        assert_eq!(back.name, scenario.name);
        assert_eq!(back.squads.len(), scenario.squads.len());
    }

    #[test]
    fn test_missing_file_reports_not_found() {
        let err = Scenario::load("no/such/file.ron").unwrap_err();
        assert!(matches!(err, ScenarioError::FileNotFound(_)));
    }
}
