//! Local movement planning: exploration and target approach.
//!
//! Both planners are greedy single-step choosers over the 8 neighbor
//! cells, re-run every decision. They share a candidate discipline: cells
//! known to be walls are skipped outright, freshly observed walls are
//! recorded into the player's knowledge map as a side effect, and cells
//! occupied by other units are treated as transiently blocked (never
//! recorded as walls).

use crate::grid::{is_diagonal, reverse, Cell, Dir, DIRECTIONS};
use crate::knowledge::KnowledgeMap;
use crate::math::{ratio, Fixed};
use crate::rng::SimRng;
use crate::unit::{Unit, UnitStore};
use crate::world::WorldView;

fn jitter(rng: &mut SimRng) -> Fixed {
    // uniform in [0, 0.1)
    rng.next_fraction() * ratio(1, 10)
}

fn straight_bonus() -> Fixed {
    ratio(3, 20) // 0.15
}

fn unknown_bonus() -> Fixed {
    ratio(1, 4) // 0.25
}

fn reversal_penalty() -> Fixed {
    ratio(3, 5) // 0.6
}

/// Tie-break penalty toward orthogonal moves: 0.01 per step, scaled by
/// sqrt(2) for diagonals.
fn tie_penalty(dir: Dir) -> Fixed {
    if is_diagonal(dir) {
        ratio(14142, 1_000_000)
    } else {
        ratio(1, 100)
    }
}

/// Uniform pick among the candidates sharing the exact best (lowest) score.
fn pick_best(scored: &[(Dir, Fixed)], rng: &mut SimRng) -> Option<Dir> {
    let best = scored.iter().map(|&(_, s)| s).min()?;
    let ties: Vec<Dir> = scored
        .iter()
        .filter(|&&(_, s)| s == best)
        .map(|&(d, _)| d)
        .collect();
    Some(ties[rng.next_index(ties.len())])
}

/// Choose one exploration step: a visit-averse, self-avoiding random walk
/// over the player's knowledge map.
///
/// First pass forbids the recent trail and reversing the last step. A dead
/// end first tries a strict 180° reversal, then relaxes both restrictions
/// in a second pass. Returns `None` only when every neighbor is blocked.
pub fn explore_step(
    unit: &Unit,
    view: WorldView<'_>,
    units: &UnitStore,
    knowledge: &mut KnowledgeMap,
    rng: &mut SimRng,
) -> Option<Dir> {
    let mut scored = collect_explore(unit, view, units, knowledge, rng, false);
    if scored.is_empty() {
        if let Some(last) = unit.last_dir {
            let back = reverse(last);
            let next = unit.pos.step(back);
            if view.is_walkable(next) && !units.occupied_by_other(next, unit.id) {
                return Some(back);
            }
        }
        scored = collect_explore(unit, view, units, knowledge, rng, true);
    }
    pick_best(&scored, rng)
}

fn collect_explore(
    unit: &Unit,
    view: WorldView<'_>,
    units: &UnitStore,
    knowledge: &mut KnowledgeMap,
    rng: &mut SimRng,
    relaxed: bool,
) -> Vec<(Dir, Fixed)> {
    let mut scored = Vec::new();
    for &dir in &DIRECTIONS {
        if !relaxed && unit.last_dir.is_some_and(|last| dir == reverse(last)) {
            continue;
        }
        let next = unit.pos.step(dir);
        if !view.in_bounds(next) {
            continue;
        }
        if knowledge.knows_wall(next) {
            continue;
        }
        if !view.is_walkable(next) {
            knowledge.record_wall(next);
            continue;
        }
        if units.occupied_by_other(next, unit.id) {
            continue;
        }
        if !relaxed && unit.trail.contains(next) {
            continue;
        }
        let mut score = Fixed::from_num(knowledge.visits(next)) + jitter(rng);
        if unit.last_dir == Some(dir) {
            score -= straight_bonus();
        }
        scored.push((dir, score));
    }
    scored
}

/// Choose one step toward `target` through a four-tier fallback:
///
/// 1. strict Manhattan improvement, diagonal steps tie-broken against
///    orthogonal ones;
/// 2. distance-equal plateau moves, immediate reversal forbidden;
/// 3. an exploration-biased step (unknown cells mildly favored, reversal
///    heavily penalized);
/// 4. any unblocked neighbor, trail ignored.
///
/// With `within_known`, tiers 1 and 2 only accept cells the player has
/// charted free (once anything is charted); this is the discipline for
/// homing on the own HQ through remembered terrain. Chasing a *sighted*
/// target plans over any unblocked cell instead.
///
/// Each tier runs only when the previous produced no candidate, so a unit
/// with any open neighbor is never permanently stuck.
pub fn approach_step(
    unit: &Unit,
    target: Cell,
    within_known: bool,
    view: WorldView<'_>,
    units: &UnitStore,
    knowledge: &mut KnowledgeMap,
    rng: &mut SimRng,
) -> Option<Dir> {
    if unit.pos == target {
        return None;
    }
    let current = unit.pos.manhattan(target);

    // Tier 1: strict improvement.
    let mut best: Option<(Dir, Fixed)> = None;
    for &dir in &DIRECTIONS {
        let Some(next) = approach_candidate(unit, dir, view, units, knowledge) else {
            continue;
        };
        if unit.trail.contains(next) {
            continue;
        }
        if within_known && knowledge.has_any_free() && !knowledge.knows_free(next) {
            continue;
        }
        let dist = next.manhattan(target);
        if dist >= current {
            continue;
        }
        let score = Fixed::from_num(dist) + tie_penalty(dir);
        if best.map_or(true, |(_, b)| score < b) {
            best = Some((dir, score));
        }
    }
    if let Some((dir, _)) = best {
        return Some(dir);
    }

    // Tier 2: accept a plateau move, but never straight back.
    for &dir in &DIRECTIONS {
        if unit.last_dir.is_some_and(|last| dir == reverse(last)) {
            continue;
        }
        let Some(next) = approach_candidate(unit, dir, view, units, knowledge) else {
            continue;
        };
        if unit.trail.contains(next) {
            continue;
        }
        if within_known && knowledge.has_any_free() && !knowledge.knows_free(next) {
            continue;
        }
        if next.manhattan(target) == current {
            return Some(dir);
        }
    }

    // Tier 3: exploration-biased fallback.
    let mut scored = Vec::new();
    for &dir in &DIRECTIONS {
        let Some(next) = approach_candidate(unit, dir, view, units, knowledge) else {
            continue;
        };
        if unit.trail.contains(next) {
            continue;
        }
        let mut score = Fixed::from_num(knowledge.visits(next)) + jitter(rng);
        if knowledge.has_any_free() && !knowledge.knows_free(next) {
            score -= unknown_bonus();
        }
        if unit.last_dir.is_some_and(|last| dir == reverse(last)) {
            score += reversal_penalty();
        }
        if unit.last_dir == Some(dir) {
            score -= straight_bonus();
        }
        scored.push((dir, score));
    }
    if let Some(dir) = pick_best(&scored, rng) {
        return Some(dir);
    }

    // Tier 4: last resort, ignore the trail but still respect walls/units.
    for &dir in &DIRECTIONS {
        let next = unit.pos.step(dir);
        if view.is_walkable(next) && !units.occupied_by_other(next, unit.id) {
            return Some(dir);
        }
    }
    None
}

/// Shared base filter for approach candidates; records observed walls.
fn approach_candidate(
    unit: &Unit,
    dir: Dir,
    view: WorldView<'_>,
    units: &UnitStore,
    knowledge: &mut KnowledgeMap,
) -> Option<Cell> {
    let next = unit.pos.step(dir);
    if !view.in_bounds(next) {
        return None;
    }
    if knowledge.knows_wall(next) {
        return None;
    }
    if !view.is_walkable(next) {
        knowledge.record_wall(next);
        return None;
    }
    if units.occupied_by_other(next, unit.id) {
        return None;
    }
    Some(next)
}

/// Choose the neighbor maximizing Manhattan distance from `threat`.
///
/// Used by ranged-only units disengaging from melee contact. Ignores the
/// trail: getting away beats path hygiene.
pub fn flee_step(
    unit: &Unit,
    threat: Cell,
    view: WorldView<'_>,
    units: &UnitStore,
) -> Option<Dir> {
    let mut best: Option<(Dir, i32)> = None;
    for &dir in &DIRECTIONS {
        let next = unit.pos.step(dir);
        if !view.is_walkable(next) || units.occupied_by_other(next, unit.id) {
            continue;
        }
        let dist = next.manhattan(threat);
        if best.map_or(true, |(_, b)| dist > b) {
            best = Some((dir, dist));
        }
    }
    best.map(|(dir, _)| dir)
}
