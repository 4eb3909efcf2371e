//! Test fixtures and helpers.
//!
//! Hand-authored grids, standard unit loadouts and pre-wired worlds for
//! consistent testing across crates.

use fixed::types::I32F32;

use skirmish_core::grid::{Cell, Grid};
use skirmish_core::hq::{Hq, PlayerColor};
use skirmish_core::simulation::SimulationWorld;
use skirmish_core::unit::ModuleKind;

/// Create a fixed-point number from an integer.
#[must_use]
pub fn fixed(n: i32) -> I32F32 {
    I32F32::from_num(n)
}

/// Create a fixed-point number from a float (for tests only).
///
/// Note: In real simulation code, never use floats.
/// This is only for convenient test setup.
#[must_use]
pub fn fixed_f(n: f64) -> I32F32 {
    I32F32::from_num(n)
}

/// Scout loadout: one movement module.
#[must_use]
pub fn scout() -> Vec<ModuleKind> {
    vec![ModuleKind::Movement]
}

/// Brawler loadout: movement + melee.
#[must_use]
pub fn brawler() -> Vec<ModuleKind> {
    vec![ModuleKind::Movement, ModuleKind::Attack]
}

/// Gunner loadout: movement + ranged.
#[must_use]
pub fn gunner() -> Vec<ModuleKind> {
    vec![ModuleKind::Movement, ModuleKind::RangedAttack]
}

/// Tank loadout: slow but shielded melee.
#[must_use]
pub fn tank() -> Vec<ModuleKind> {
    vec![
        ModuleKind::Movement,
        ModuleKind::Shield,
        ModuleKind::Shield,
        ModuleKind::Attack,
    ]
}

/// A one-cell-wide horizontal corridor from `(1, 2)` to `(len, 2)` in an
/// otherwise solid grid.
#[must_use]
pub fn corridor_grid(len: i32) -> Grid {
    let cols = len + 2;
    let mut grid = Grid::open(cols, 5);
    for y in 1..4 {
        for x in 1..cols - 1 {
            if y != 2 {
                grid.set_wall(Cell::new(x, y), true);
            }
        }
    }
    grid
}

/// An open two-player world: HQs in opposite corners, nothing else.
#[must_use]
pub fn duel_world(cols: i32, rows: i32, seed: u64) -> SimulationWorld {
    let grid = Grid::open(cols, rows);
    let hqs = vec![
        Hq::new(Cell::new(8, 8), PlayerColor::Blue),
        Hq::new(Cell::new(cols - 9, rows - 9), PlayerColor::Red),
    ];
    SimulationWorld::new(grid, hqs, 2, seed)
}

/// A duel world with `count` starting units per side, all running the
/// given program.
#[must_use]
pub fn skirmish_world(seed: u64, count: usize, program: &[i32]) -> SimulationWorld {
    let mut world = duel_world(48, 40, seed);
    for color in [PlayerColor::Blue, PlayerColor::Red] {
        let ids = world
            .spawn_initial_units(color, count, &brawler())
            .expect("initial spawn");
        for id in ids {
            world.assign_program(id, program).expect("program");
        }
    }
    world
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_corridor_is_walkable_end_to_end() {
        let grid = corridor_grid(10);
        for x in 1..=10 {
            assert!(!grid.is_wall(Cell::new(x, 2)));
        }
        assert!(grid.is_wall(Cell::new(3, 1)));
        assert!(grid.is_wall(Cell::new(3, 3)));
    }

    #[test]
    fn test_duel_world_has_two_hqs() {
        let world = duel_world(48, 40, 1);
        assert_eq!(world.hqs().len(), 2);
    }

    #[test]
    fn test_skirmish_world_spawns_units() {
        let world = skirmish_world(1, 3, &[6]);
        assert_eq!(world.units().len(), 6);
    }
}
