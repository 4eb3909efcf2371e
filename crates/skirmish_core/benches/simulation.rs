//! Simulation benchmarks for skirmish_core.
//!
//! Run with: `cargo bench -p skirmish_core`

#![allow(missing_docs)]

use criterion::{black_box, criterion_group, criterion_main, Criterion};

use skirmish_core::grid::{Cell, Grid};
use skirmish_core::hq::{Hq, PlayerColor};
use skirmish_core::simulation::SimulationWorld;
use skirmish_core::unit::ModuleKind;

fn battle_world() -> SimulationWorld {
    let grid = Grid::open(96, 69);
    let hqs = vec![
        Hq::new(Cell::new(12, 12), PlayerColor::Blue),
        Hq::new(Cell::new(83, 56), PlayerColor::Red),
    ];
    let mut world = SimulationWorld::new(grid, hqs, 2, 42);
    for color in [PlayerColor::Blue, PlayerColor::Red] {
        let ids = world
            .spawn_initial_units(
                color,
                8,
                &[ModuleKind::Movement, ModuleKind::Attack, ModuleKind::Shield],
            )
            .unwrap();
        for id in ids {
            world.assign_program(id, &[6, 11, 5, 12, 15, 2]).unwrap();
        }
    }
    world
}

pub fn tick_benchmark(c: &mut Criterion) {
    c.bench_function("tick_16_units_open_map", |b| {
        let mut world = battle_world();
        b.iter(|| {
            black_box(world.tick(250));
        });
    });

    c.bench_function("tick_100_steps_fresh_world", |b| {
        b.iter(|| {
            let mut world = battle_world();
            for _ in 0..100 {
                world.tick(250);
            }
            black_box(world.state_hash())
        });
    });
}

criterion_group!(benches, tick_benchmark);
criterion_main!(benches);
