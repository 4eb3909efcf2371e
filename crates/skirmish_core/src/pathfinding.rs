//! A* pathfinding to HQ perimeters, plus the bridge search that reconnects
//! a lost unit with charted territory.
//!
//! Both A* variants target the *perimeter ring* around an HQ, never its
//! center: the footprint itself is permanently blocked. They return only
//! the first step of the route and are re-planned every tick. That is a
//! deliberate trade: re-planning is cheap on maps this size and reacts to
//! other units drifting into the way, where a cached path would go stale.
//!
//! Cells occupied by other units are transiently unpathable; they are
//! never recorded into the knowledge map.

use std::cmp::Ordering;
use std::collections::{BinaryHeap, HashMap, HashSet, VecDeque};

use crate::grid::{Cell, Dir, DIRECTIONS};
use crate::hq::{Hq, HQ_PERIM_RADIUS};
use crate::knowledge::KnowledgeMap;
use crate::unit::{Unit, UnitStore};
use crate::world::WorldView;

/// A node in the A* open set.
#[derive(Debug, Clone, Copy, Eq, PartialEq)]
struct AStarNode {
    cell: Cell,
    /// g + h under the 8-directional unit-cost metric.
    f_score: u32,
    /// Packed coordinates; equal f-scores pop in a fixed order.
    tie_breaker: u64,
}

impl Ord for AStarNode {
    fn cmp(&self, other: &Self) -> Ordering {
        // BinaryHeap is a max-heap; reverse for min-heap behavior.
        match other.f_score.cmp(&self.f_score) {
            Ordering::Equal => other.tie_breaker.cmp(&self.tie_breaker),
            ord => ord,
        }
    }
}

impl PartialOrd for AStarNode {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

#[inline]
fn tie_breaker(cell: Cell) -> u64 {
    ((cell.y as u32 as u64) << 32) | (cell.x as u32 as u64)
}

/// Distance lower bound from a cell to the perimeter square around `hq`.
#[inline]
fn perimeter_heuristic(cell: Cell, hq: &Hq) -> u32 {
    let dx = (cell.x - hq.center.x).abs();
    let dy = (cell.y - hq.center.y).abs();
    ((dx - HQ_PERIM_RADIUS).max(0) + (dy - HQ_PERIM_RADIUS).max(0)) as u32
}

/// A* from `start` to the perimeter of `hq` over the cells accepted by
/// `passable`. Returns the first step of the route, or `None` when no
/// route exists (callers fall back; this is not an error).
fn astar_step(start: Cell, hq: &Hq, passable: &dyn Fn(Cell) -> bool) -> Option<Dir> {
    if hq.at_perimeter(start) {
        return None;
    }

    let mut open: BinaryHeap<AStarNode> = BinaryHeap::new();
    let mut came_from: HashMap<Cell, Cell> = HashMap::new();
    let mut g_score: HashMap<Cell, u32> = HashMap::new();

    g_score.insert(start, 0);
    open.push(AStarNode {
        cell: start,
        f_score: perimeter_heuristic(start, hq),
        tie_breaker: tie_breaker(start),
    });

    while let Some(current) = open.pop() {
        if hq.at_perimeter(current.cell) {
            return Some(first_step(start, current.cell, &came_from));
        }

        let current_g = g_score.get(&current.cell).copied().unwrap_or(u32::MAX);

        for &dir in &DIRECTIONS {
            let next = current.cell.step(dir);
            if !passable(next) {
                continue;
            }
            let tentative = current_g + 1;
            let known = g_score.get(&next).copied().unwrap_or(u32::MAX);
            if tentative < known {
                came_from.insert(next, current.cell);
                g_score.insert(next, tentative);
                open.push(AStarNode {
                    cell: next,
                    f_score: tentative + perimeter_heuristic(next, hq),
                    tie_breaker: tie_breaker(next),
                });
            }
        }
    }

    None
}

/// Walk `came_from` back from `goal` and return the step leaving `start`.
fn first_step(start: Cell, goal: Cell, came_from: &HashMap<Cell, Cell>) -> Dir {
    let mut current = goal;
    while let Some(&prev) = came_from.get(&current) {
        if prev == start {
            break;
        }
        current = prev;
    }
    (current.x - start.x, current.y - start.y)
}

/// Shared-knowledge A* toward the owner's HQ perimeter.
///
/// Walkability is restricted to cells the player has actually observed
/// free. Returns `None` when the unit stands on uncharted ground or no
/// route exists inside known territory; the caller then bridges (see
/// [`bridge_step_to_known`]) or degrades to local approach.
#[must_use]
pub fn shared_step_to_hq(
    unit: &Unit,
    hq: &Hq,
    view: WorldView<'_>,
    units: &UnitStore,
    knowledge: &KnowledgeMap,
) -> Option<Dir> {
    if !knowledge.knows_free(unit.pos) {
        return None;
    }
    astar_step(unit.pos, hq, &|c| {
        view.is_walkable(c)
            && knowledge.knows_free(c)
            && !knowledge.knows_wall(c)
            && !units.occupied_by_other(c, unit.id)
    })
}

/// Global-knowledge A* toward a discovered enemy HQ perimeter.
///
/// Uses the true grid directly: once an HQ is discovered, the whole team
/// shares the route intel.
#[must_use]
pub fn global_step_to_hq(
    unit: &Unit,
    hq: &Hq,
    view: WorldView<'_>,
    units: &UnitStore,
) -> Option<Dir> {
    astar_step(unit.pos, hq, &|c| {
        view.is_walkable(c) && !units.occupied_by_other(c, unit.id)
    })
}

/// BFS over the true grid toward the nearest cell the player knows to be
/// free. Recovers units standing outside their charted territory.
#[must_use]
pub fn bridge_step_to_known(
    unit: &Unit,
    view: WorldView<'_>,
    units: &UnitStore,
    knowledge: &KnowledgeMap,
) -> Option<Dir> {
    let start = unit.pos;
    let mut queue: VecDeque<Cell> = VecDeque::new();
    let mut visited: HashSet<Cell> = HashSet::new();
    let mut came_from: HashMap<Cell, Cell> = HashMap::new();

    queue.push_back(start);
    visited.insert(start);

    while let Some(current) = queue.pop_front() {
        if current != start && knowledge.knows_free(current) {
            return Some(first_step(start, current, &came_from));
        }
        for &dir in &DIRECTIONS {
            let next = current.step(dir);
            if visited.contains(&next) {
                continue;
            }
            if !view.is_walkable(next) || units.occupied_by_other(next, unit.id) {
                continue;
            }
            visited.insert(next);
            came_from.insert(next, current);
            queue.push_back(next);
        }
    }

    None
}
