//! Procedural cave-map generation.
//!
//! Produces the wall/floor grid and HQ placements the simulation core
//! consumes as opaque inputs. The pipeline: random fill, five cellular
//! automaton passes, small-region cleanup, corner chambers, then thin
//! corridors until every floor region connects. Generation retries with an
//! adjusted wall density until the floor ratio looks like a cave rather
//! than a crawlspace or a ballroom.
//!
//! Fully seeded: the same config always yields the same map. Probabilities
//! are per-mille integers so no float ever enters the pipeline.

use serde::{Deserialize, Serialize};

use skirmish_core::grid::{Cell, Grid, DIRECTIONS};
use skirmish_core::hq::{Hq, PlayerColor, HQ_HALF_SPAN};
use skirmish_core::rng::SimRng;

/// Acceptable floor ratio window, per mille.
const FLOOR_RATIO_MIN_PM: u64 = 400;
const FLOOR_RATIO_MAX_PM: u64 = 620;

/// Wall-density adjustment step between attempts, per mille.
const WALL_CHANCE_STEP_PM: u64 = 40;

/// Map generation configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MapConfig {
    /// Grid width in cells.
    pub cols: i32,
    /// Grid height in cells.
    pub rows: i32,
    /// Number of players to place HQs for (2-4).
    pub players: u8,
    /// Random seed for deterministic generation.
    pub seed: u64,
}

impl Default for MapConfig {
    fn default() -> Self {
        Self {
            cols: 96,
            rows: 69,
            players: 2,
            seed: 12345,
        }
    }
}

impl MapConfig {
    /// Set the random seed.
    #[must_use]
    pub const fn with_seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }

    /// Set the player count.
    #[must_use]
    pub const fn with_players(mut self, players: u8) -> Self {
        self.players = players;
        self
    }
}

/// A generated map: the grid, the placed HQs and the chamber centers used
/// as spawn anchors.
#[derive(Debug, Clone)]
pub struct GeneratedMap {
    /// The wall/floor grid.
    pub grid: Grid,
    /// One HQ per player, carved clear.
    pub hqs: Vec<Hq>,
    /// Corner chamber centers.
    pub chambers: Vec<Cell>,
}

/// Generate a map with the given configuration.
#[must_use]
pub fn generate_map(config: &MapConfig) -> GeneratedMap {
    let mut rng = SimRng::new(config.seed);
    let mut wall_chance_pm: u64 = 500;
    let mut result = generate_once(config, wall_chance_pm, &mut rng);

    for _ in 0..10 {
        let ratio = floor_ratio_pm(&result.0);
        if (FLOOR_RATIO_MIN_PM..=FLOOR_RATIO_MAX_PM).contains(&ratio) {
            break;
        }
        if ratio > FLOOR_RATIO_MAX_PM {
            // too much floor: start denser
            wall_chance_pm = (wall_chance_pm + WALL_CHANCE_STEP_PM).min(650);
        } else {
            wall_chance_pm = wall_chance_pm.saturating_sub(WALL_CHANCE_STEP_PM).max(350);
        }
        result = generate_once(config, wall_chance_pm, &mut rng);
    }

    let (mut grid, chambers) = result;
    let hqs = place_hqs(&mut grid, &chambers, config);
    GeneratedMap {
        grid,
        hqs,
        chambers,
    }
}

fn generate_once(config: &MapConfig, wall_chance_pm: u64, rng: &mut SimRng) -> (Grid, Vec<Cell>) {
    let (cols, rows) = (config.cols, config.rows);

    // 1) Random fill, border always wall.
    let mut walls = vec![true; (cols as usize) * (rows as usize)];
    for y in 1..rows - 1 {
        for x in 1..cols - 1 {
            walls[(y * cols + x) as usize] = rng.next_u64() % 1000 < wall_chance_pm;
        }
    }
    let mut grid = Grid::from_walls(cols, rows, walls);

    // 2) Cellular smoothing, gentle enough to keep galleries open.
    for _ in 0..5 {
        grid = cellular_step(&grid);
    }

    // 3) Cleanup: drown tiny floor pockets, erode small wall lumps.
    remove_small_regions(&mut grid, false, 30);
    remove_small_regions(&mut grid, true, 50);

    // 4) Corner chambers for spawns.
    let chambers = corner_chambers(cols, rows);
    let radius = chamber_radius(cols, rows);
    for &c in &chambers {
        carve_disk(&mut grid, c, radius * 8 / 10);
    }

    // 5) Full connectivity via thin corridors.
    connect_all_regions(&mut grid, &chambers, rng);

    (grid, chambers)
}

fn cellular_step(grid: &Grid) -> Grid {
    let (cols, rows) = (grid.cols(), grid.rows());
    let mut walls = vec![true; (cols as usize) * (rows as usize)];
    for y in 1..rows - 1 {
        for x in 1..cols - 1 {
            let mut around = 0;
            for dy in -1..=1 {
                for dx in -1..=1 {
                    if dx == 0 && dy == 0 {
                        continue;
                    }
                    if grid.is_wall(Cell::new(x + dx, y + dy)) {
                        around += 1;
                    }
                }
            }
            walls[(y * cols + x) as usize] = around >= 5;
        }
    }
    Grid::from_walls(cols, rows, walls)
}

/// Flood-fill regions of one cell type and flip those below `min_size`.
fn remove_small_regions(grid: &mut Grid, walls: bool, min_size: usize) {
    let (cols, rows) = (grid.cols(), grid.rows());
    let mut visited = vec![false; (cols as usize) * (rows as usize)];
    for y in 1..rows - 1 {
        for x in 1..cols - 1 {
            let idx = (y * cols + x) as usize;
            if visited[idx] || grid.is_wall(Cell::new(x, y)) != walls {
                continue;
            }
            let mut cells = Vec::new();
            let mut stack = vec![Cell::new(x, y)];
            visited[idx] = true;
            while let Some(cur) = stack.pop() {
                cells.push(cur);
                for &dir in &DIRECTIONS {
                    let next = cur.step(dir);
                    if !grid.in_bounds(next) {
                        continue;
                    }
                    let nidx = (next.y * cols + next.x) as usize;
                    if !visited[nidx] && grid.is_wall(next) == walls {
                        visited[nidx] = true;
                        stack.push(next);
                    }
                }
            }
            if cells.len() < min_size {
                for c in cells {
                    grid.set_wall(c, !walls);
                }
            }
        }
    }
}

fn chamber_radius(cols: i32, rows: i32) -> i32 {
    (cols.min(rows) * 12 / 100).max(6)
}

fn corner_chambers(cols: i32, rows: i32) -> Vec<Cell> {
    let r = chamber_radius(cols, rows);
    let margin = r + 2;
    vec![
        Cell::new(margin, margin),
        Cell::new(cols - 1 - margin, margin),
        Cell::new(margin, rows - 1 - margin),
        Cell::new(cols - 1 - margin, rows - 1 - margin),
    ]
}

fn carve_disk(grid: &mut Grid, center: Cell, r: i32) {
    let (cols, rows) = (grid.cols(), grid.rows());
    let y0 = (center.y - r).max(1);
    let y1 = (center.y + r).min(rows - 2);
    let x0 = (center.x - r).max(1);
    let x1 = (center.x + r).min(cols - 2);
    for y in y0..=y1 {
        for x in x0..=x1 {
            let dx = x - center.x;
            let dy = y - center.y;
            if dx * dx + dy * dy <= r * r {
                grid.set_wall(Cell::new(x, y), false);
            }
        }
    }
}

#[derive(Debug)]
struct FloorRegion {
    cells: Vec<Cell>,
    centroid: Cell,
}

fn find_floor_regions(grid: &Grid) -> Vec<FloorRegion> {
    let (cols, rows) = (grid.cols(), grid.rows());
    let mut visited = vec![false; (cols as usize) * (rows as usize)];
    let mut regions = Vec::new();
    for y in 1..rows - 1 {
        for x in 1..cols - 1 {
            let idx = (y * cols + x) as usize;
            if visited[idx] || grid.is_wall(Cell::new(x, y)) {
                continue;
            }
            let mut cells = Vec::new();
            let mut stack = vec![Cell::new(x, y)];
            visited[idx] = true;
            while let Some(cur) = stack.pop() {
                cells.push(cur);
                for &dir in &DIRECTIONS {
                    let next = cur.step(dir);
                    if !grid.in_bounds(next) {
                        continue;
                    }
                    let nidx = (next.y * cols + next.x) as usize;
                    if !visited[nidx] && !grid.is_wall(next) {
                        visited[nidx] = true;
                        stack.push(next);
                    }
                }
            }
            let (sx, sy) = cells
                .iter()
                .fold((0i64, 0i64), |(ax, ay), c| (ax + i64::from(c.x), ay + i64::from(c.y)));
            let n = cells.len() as i64;
            let centroid = Cell::new((sx / n) as i32, (sy / n) as i32);
            regions.push(FloorRegion { cells, centroid });
        }
    }
    regions
}

/// Carve corridors until every floor region reaches the main one.
///
/// Corridors run between the closest *cell pair* of an unconnected region
/// and the connected mass, so each carve genuinely merges the two.
fn connect_all_regions(grid: &mut Grid, chambers: &[Cell], rng: &mut SimRng) {
    let regions = find_floor_regions(grid);
    if regions.len() <= 1 {
        return;
    }

    // The region holding the first chamber is the backbone; fall back to
    // the largest.
    let seed = chambers.first().copied();
    let mut main_index = regions
        .iter()
        .position(|r| seed.is_some_and(|s| r.cells.contains(&s)));
    if main_index.is_none() {
        main_index = regions
            .iter()
            .enumerate()
            .max_by_key(|(_, r)| r.cells.len())
            .map(|(i, _)| i);
    }
    let Some(main_index) = main_index else { return };

    let mut connected = vec![false; regions.len()];
    connected[main_index] = true;
    let mut connected_cells: Vec<Cell> = regions[main_index].cells.clone();
    let mut remaining = regions.len() - 1;

    while remaining > 0 {
        let mut best: Option<(usize, Cell, Cell, i64)> = None;
        for (i, region) in regions.iter().enumerate() {
            if connected[i] {
                continue;
            }
            for cell in &region.cells {
                for target in &connected_cells {
                    let dx = i64::from(target.x - cell.x);
                    let dy = i64::from(target.y - cell.y);
                    let d = dx * dx + dy * dy;
                    if best.map_or(true, |(_, _, _, b)| d < b) {
                        best = Some((i, *cell, *target, d));
                    }
                }
            }
        }
        let Some((index, from, to, _)) = best else { break };
        let thickness = 1 + (rng.next_u64() % 2) as i32;
        carve_corridor(grid, from, to, thickness);
        connected[index] = true;
        connected_cells.extend_from_slice(&regions[index].cells);
        remaining -= 1;
    }
}

fn carve_corridor(grid: &mut Grid, from: Cell, to: Cell, thickness: i32) {
    for cell in bresenham(from, to) {
        carve_disk(grid, cell, thickness);
    }
}

fn bresenham(from: Cell, to: Cell) -> Vec<Cell> {
    let mut points = Vec::new();
    let (mut x0, mut y0) = (from.x, from.y);
    let (x1, y1) = (to.x, to.y);
    let dx = (x1 - x0).abs();
    let sx = if x0 < x1 { 1 } else { -1 };
    let dy = -(y1 - y0).abs();
    let sy = if y0 < y1 { 1 } else { -1 };
    let mut err = dx + dy;
    loop {
        points.push(Cell::new(x0, y0));
        if x0 == x1 && y0 == y1 {
            break;
        }
        let e2 = 2 * err;
        if e2 >= dy {
            err += dy;
            x0 += sx;
        }
        if e2 <= dx {
            err += dx;
            y0 += sy;
        }
    }
    points
}

fn floor_ratio_pm(grid: &Grid) -> u64 {
    let (cols, rows) = (grid.cols(), grid.rows());
    let mut floors: u64 = 0;
    for y in 1..rows - 1 {
        for x in 1..cols - 1 {
            if !grid.is_wall(Cell::new(x, y)) {
                floors += 1;
            }
        }
    }
    floors * 1000 / ((rows as u64 - 2) * (cols as u64 - 2))
}

// ---------------------------------------------------------------------------
// HQ placement
// ---------------------------------------------------------------------------

fn place_hqs(grid: &mut Grid, chambers: &[Cell], config: &MapConfig) -> Vec<Hq> {
    let picks: &[usize] = match config.players {
        3 => &[0, 1, 2],
        4 => &[0, 1, 2, 3],
        _ => &[0, 3], // diagonal corners for a duel
    };
    let min_sep = grid.cols().min(grid.rows()) / 3;
    let mut placed: Vec<Cell> = Vec::new();
    let mut hqs = Vec::new();

    for (player, &pick) in picks.iter().enumerate() {
        let target = chambers.get(pick).copied().unwrap_or(Cell::new(2, 2));
        let center = find_open_center_near(grid, target, min_sep, &placed);
        ensure_open_hq_area(grid, center);
        placed.push(center);
        let color = PlayerColor::from_player(player as u8).expect("player count validated");
        hqs.push(Hq::new(center, color));
    }
    hqs
}

/// Spiral outward from the target until a clear footprint with enough
/// separation from already-placed HQs appears.
fn find_open_center_near(grid: &Grid, target: Cell, min_sep: i32, placed: &[Cell]) -> Cell {
    let (cols, rows) = (grid.cols(), grid.rows());
    let max_r = cols.max(rows) / 4;
    for r in 0..=max_r {
        for y in (target.y - r).max(1)..=(target.y + r).min(rows - 2) {
            for x in [(target.x - r).max(1), (target.x + r).min(cols - 2)] {
                let c = Cell::new(x, y);
                if is_clear_hq_area(grid, c) && far_from_others(c, placed, min_sep) {
                    return c;
                }
            }
        }
        for x in (target.x - r).max(1)..=(target.x + r).min(cols - 2) {
            for y in [(target.y - r).max(1), (target.y + r).min(rows - 2)] {
                let c = Cell::new(x, y);
                if is_clear_hq_area(grid, c) && far_from_others(c, placed, min_sep) {
                    return c;
                }
            }
        }
    }
    Cell::new(
        target.x.clamp(1, cols - 2),
        target.y.clamp(1, rows - 2),
    )
}

fn is_clear_hq_area(grid: &Grid, center: Cell) -> bool {
    for y in center.y - HQ_HALF_SPAN..=center.y + HQ_HALF_SPAN {
        for x in center.x - HQ_HALF_SPAN..=center.x + HQ_HALF_SPAN {
            let c = Cell::new(x, y);
            if !grid.in_bounds(c) || grid.is_wall(c) {
                return false;
            }
        }
    }
    true
}

fn ensure_open_hq_area(grid: &mut Grid, center: Cell) {
    for y in center.y - HQ_HALF_SPAN..=center.y + HQ_HALF_SPAN {
        for x in center.x - HQ_HALF_SPAN..=center.x + HQ_HALF_SPAN {
            let c = Cell::new(x, y);
            if grid.in_bounds(c) {
                grid.set_wall(c, false);
            }
        }
    }
}

fn far_from_others(c: Cell, placed: &[Cell], min_sep: i32) -> bool {
    placed.iter().all(|p| {
        let dx = i64::from(p.x - c.x);
        let dy = i64::from(p.y - c.y);
        dx * dx + dy * dy >= i64::from(min_sep) * i64::from(min_sep)
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn test_generation_is_deterministic() {
        let config = MapConfig::default().with_seed(42);
        let a = generate_map(&config);
        let b = generate_map(&config);
        for y in 0..a.grid.rows() {
            for x in 0..a.grid.cols() {
                let c = Cell::new(x, y);
                assert_eq!(a.grid.is_wall(c), b.grid.is_wall(c));
            }
        }
        assert_eq!(a.hqs, b.hqs);
    }

    #[test]
    fn test_different_seeds_differ() {
        let a = generate_map(&MapConfig::default().with_seed(1));
        let b = generate_map(&MapConfig::default().with_seed(2));
        let mut same = true;
        'outer: for y in 0..a.grid.rows() {
            for x in 0..a.grid.cols() {
                let c = Cell::new(x, y);
                if a.grid.is_wall(c) != b.grid.is_wall(c) {
                    same = false;
                    break 'outer;
                }
            }
        }
        assert!(!same);
    }

    #[test]
    fn test_border_stays_wall() {
        let map = generate_map(&MapConfig::default().with_seed(7));
        let g = &map.grid;
        for x in 0..g.cols() {
            assert!(g.is_wall(Cell::new(x, 0)));
            assert!(g.is_wall(Cell::new(x, g.rows() - 1)));
        }
        for y in 0..g.rows() {
            assert!(g.is_wall(Cell::new(0, y)));
            assert!(g.is_wall(Cell::new(g.cols() - 1, y)));
        }
    }

    #[test]
    fn test_floor_ratio_in_window() {
        for seed in [3, 17, 91] {
            let map = generate_map(&MapConfig::default().with_seed(seed));
            let pm = floor_ratio_pm(&map.grid);
            // The retry loop keeps the last attempt even when out of
            // window, but with a wide margin something is broken.
            assert!((300..=720).contains(&pm), "seed {seed}: ratio {pm}");
        }
    }

    #[test]
    fn test_floor_is_fully_connected() {
        let map = generate_map(&MapConfig::default().with_seed(42));
        let g = &map.grid;
        // Flood from any floor cell; every floor cell must be reached.
        let mut start = None;
        let mut floor_count = 0usize;
        for y in 1..g.rows() - 1 {
            for x in 1..g.cols() - 1 {
                if !g.is_wall(Cell::new(x, y)) {
                    floor_count += 1;
                    if start.is_none() {
                        start = Some(Cell::new(x, y));
                    }
                }
            }
        }
        let start = start.expect("map has floor");
        let mut seen = HashSet::new();
        let mut stack = vec![start];
        seen.insert(start);
        while let Some(cur) = stack.pop() {
            for &dir in &DIRECTIONS {
                let next = cur.step(dir);
                if g.in_bounds(next) && !g.is_wall(next) && seen.insert(next) {
                    stack.push(next);
                }
            }
        }
        assert_eq!(seen.len(), floor_count, "disconnected floor regions");
    }

    #[test]
    fn test_hq_count_and_clear_footprints() {
        for players in 2..=4u8 {
            let map = generate_map(&MapConfig::default().with_players(players).with_seed(11));
            assert_eq!(map.hqs.len(), players as usize);
            for hq in &map.hqs {
                for dy in -HQ_HALF_SPAN..=HQ_HALF_SPAN {
                    for dx in -HQ_HALF_SPAN..=HQ_HALF_SPAN {
                        let c = Cell::new(hq.center.x + dx, hq.center.y + dy);
                        assert!(!map.grid.is_wall(c), "wall inside HQ footprint");
                    }
                }
            }
        }
    }
}
