//! Combat: target acquisition, damage computation and module-targeted
//! damage application.
//!
//! Damage scales with functioning weapon modules, shields discount and
//! soak incoming hits, and the remainder spills across the rest of the
//! unit in a randomized order. HQs take damage directly, with no shield
//! model.
//!
//! Distance conventions: unit-to-unit checks use Manhattan distance,
//! except melee adjacency and melee threat which use Chebyshev (a diagonal
//! neighbor is in contact in an 8-directional world). Checks against an HQ
//! measure the Chebyshev distance to its footprint edge.

use serde::{Deserialize, Serialize};

use crate::grid::Cell;
use crate::hq::{Hq, PlayerColor, PlayerId};
use crate::rng::SimRng;
use crate::unit::{ModuleKind, Unit, UnitId, UnitStore};

/// Manhattan radius of ranged weapons.
pub const RANGED_RADIUS: i32 = 6;

/// Chebyshev range of melee weapons against units.
pub const MELEE_RANGE: i32 = 1;

/// Chebyshev radius at which a ranged-only unit considers itself in melee
/// danger and disengages.
pub const MELEE_THREAT_RADIUS: i32 = 2;

/// Radius of the general enemy-detection condition.
pub const DETECT_RADIUS: i32 = 7;

/// Radius of the any-enemy-HQ detection condition.
pub const DETECT_HQ_ANY_RADIUS: i32 = 5;

/// Radius of the close-enemy-HQ detection condition.
pub const DETECT_HQ_CLOSE_RADIUS: i32 = 4;

/// Melee damage per functioning attack module.
pub const MELEE_DAMAGE_PER_MODULE: u32 = 30;

/// Ranged damage per functioning ranged module.
pub const RANGED_DAMAGE_PER_MODULE: u32 = 10;

/// Minimum milliseconds between attacks of one unit.
pub const ATTACK_COOLDOWN_MS: u64 = 1000;

/// How an attack was delivered. Drives which visual effect the renderer
/// plays on the damage tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AttackKind {
    /// Contact hit (explosion burst).
    Melee,
    /// Beam at range (continuous laser).
    Ranged,
}

/// Something a unit can attack.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TargetRef {
    /// An enemy unit.
    Unit(UnitId),
    /// An enemy headquarters, by owner color.
    Hq(PlayerColor),
}

/// A located enemy, with the distance used for its acquisition.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EnemySighting {
    /// What was sighted.
    pub target: TargetRef,
    /// Where it is (unit position or HQ center).
    pub cell: Cell,
    /// Acquisition distance (Manhattan for units, footprint-edge Chebyshev
    /// for HQs).
    pub dist: i32,
}

/// Melee damage output of a unit.
#[must_use]
pub fn melee_damage(unit: &Unit) -> u32 {
    unit.functioning(ModuleKind::Attack) * MELEE_DAMAGE_PER_MODULE
}

/// Ranged damage output of a unit.
#[must_use]
pub fn ranged_damage(unit: &Unit) -> u32 {
    unit.functioning(ModuleKind::RangedAttack) * RANGED_DAMAGE_PER_MODULE
}

/// Whether the unit's attack cooldown has elapsed at `now_ms`.
#[must_use]
pub fn cooldown_ready(unit: &Unit, now_ms: u64) -> bool {
    unit.last_attack_ms
        .map_or(true, |last| now_ms >= last + ATTACK_COOLDOWN_MS)
}

/// Apply `amount` damage to a unit's modules. Returns the damage actually
/// delivered (less than the post-shield amount only when the unit runs out
/// of module hit points).
///
/// Any functioning shield discounts the whole hit by 20% (floored). The
/// remainder drains functioning shields in a shuffled order, each soaking
/// up to its hit points before spilling to the next; whatever survives the
/// shields spills onto the other functioning modules in a second shuffle,
/// within the same hit.
pub fn damage_unit(unit: &mut Unit, amount: u32, rng: &mut SimRng) -> u32 {
    let discounted = if unit.has_functioning(ModuleKind::Shield) {
        amount * 4 / 5
    } else {
        amount
    };
    let mut remaining = discounted;

    let mut shields: Vec<usize> = module_indices(unit, |k| k == ModuleKind::Shield);
    rng.shuffle(&mut shields);
    for idx in shields {
        if remaining == 0 {
            break;
        }
        remaining -= unit.modules[idx].absorb(remaining);
    }

    let mut others: Vec<usize> = module_indices(unit, |k| k != ModuleKind::Shield);
    rng.shuffle(&mut others);
    for idx in others {
        if remaining == 0 {
            break;
        }
        remaining -= unit.modules[idx].absorb(remaining);
    }

    discounted - remaining
}

fn module_indices(unit: &Unit, pred: impl Fn(ModuleKind) -> bool) -> Vec<usize> {
    unit.modules
        .iter()
        .enumerate()
        .filter(|(_, m)| m.is_functioning() && pred(m.kind))
        .map(|(i, _)| i)
        .collect()
}

/// The nearest enemy unit or HQ, no radius limit. Units are scanned in id
/// order before HQs, and strict improvement keeps the first on ties, so
/// the result is deterministic.
#[must_use]
pub fn nearest_enemy(unit: &Unit, units: &UnitStore, hqs: &[Hq]) -> Option<EnemySighting> {
    let mut best: Option<EnemySighting> = None;
    for id in units.sorted_ids() {
        let Some(other) = units.get(id) else { continue };
        if other.owner == unit.owner {
            continue;
        }
        let dist = unit.pos.manhattan(other.pos);
        if best.map_or(true, |b| dist < b.dist) {
            best = Some(EnemySighting {
                target: TargetRef::Unit(id),
                cell: other.pos,
                dist,
            });
        }
    }
    for hq in hqs {
        if hq.owner() == unit.owner {
            continue;
        }
        let dist = hq.edge_distance(unit.pos);
        if best.map_or(true, |b| dist < b.dist) {
            best = Some(EnemySighting {
                target: TargetRef::Hq(hq.color),
                cell: hq.center,
                dist,
            });
        }
    }
    best
}

/// The nearest enemy within `radius` (for ranged acquisition and the
/// detection conditions).
#[must_use]
pub fn nearest_enemy_within(
    unit: &Unit,
    units: &UnitStore,
    hqs: &[Hq],
    radius: i32,
) -> Option<EnemySighting> {
    nearest_enemy(unit, units, hqs).filter(|s| s.dist <= radius)
}

/// Nearest hostile unit in melee contact range, by Chebyshev distance.
#[must_use]
pub fn melee_threat(unit: &Unit, units: &UnitStore) -> Option<Cell> {
    let mut best: Option<(Cell, i32)> = None;
    for id in units.sorted_ids() {
        let Some(other) = units.get(id) else { continue };
        if other.owner == unit.owner {
            continue;
        }
        let dist = unit.pos.chebyshev(other.pos);
        if dist <= MELEE_THREAT_RADIUS && best.map_or(true, |(_, b)| dist < b) {
            best = Some((other.pos, dist));
        }
    }
    best.map(|(cell, _)| cell)
}

/// Whether the sighted target is within the unit's melee reach.
#[must_use]
pub fn melee_in_range(unit: &Unit, sighting: &EnemySighting, units: &UnitStore, hqs: &[Hq]) -> bool {
    match sighting.target {
        TargetRef::Unit(id) => units
            .get(id)
            .is_some_and(|other| unit.pos.chebyshev(other.pos) <= MELEE_RANGE),
        TargetRef::Hq(color) => hqs
            .iter()
            .find(|h| h.color == color)
            .is_some_and(|h| h.at_perimeter(unit.pos)),
    }
}

/// Whether any enemy HQ lies within `radius` of the cell.
#[must_use]
pub fn enemy_hq_within(owner: PlayerId, pos: Cell, hqs: &[Hq], radius: i32) -> bool {
    hqs.iter()
        .any(|h| h.owner() != owner && h.edge_distance(pos) <= radius)
}

/// Whether the unit has a live target inside its own engagement range
/// (ranged radius if ranged-capable, otherwise melee contact). Used to
/// keep a conditional program's exploring preamble from dancing away from
/// a fight.
#[must_use]
pub fn is_engaged(unit: &Unit, units: &UnitStore, hqs: &[Hq]) -> bool {
    if unit.has_functioning(ModuleKind::RangedAttack) {
        return nearest_enemy_within(unit, units, hqs, RANGED_RADIUS).is_some();
    }
    if unit.has_functioning(ModuleKind::Attack) {
        let unit_contact = units.iter().any(|other| {
            other.owner != unit.owner && unit.pos.chebyshev(other.pos) <= MELEE_RANGE
        });
        return unit_contact
            || hqs
                .iter()
                .any(|h| h.owner() != unit.owner && h.at_perimeter(unit.pos));
    }
    false
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn unit_with(kinds: &[ModuleKind]) -> Unit {
        Unit::new(1, 0, Cell::new(5, 5), kinds)
    }

    #[test]
    fn test_damage_output_scales_with_modules() {
        let mut u = unit_with(&[
            ModuleKind::Attack,
            ModuleKind::Attack,
            ModuleKind::RangedAttack,
        ]);
        assert_eq!(melee_damage(&u), 60);
        assert_eq!(ranged_damage(&u), 10);
        u.modules[0].hp = 0;
        assert_eq!(melee_damage(&u), 30);
    }

    #[test]
    fn test_cooldown_gate() {
        let mut u = unit_with(&[ModuleKind::Attack]);
        assert!(cooldown_ready(&u, 0));
        u.last_attack_ms = Some(1000);
        assert!(!cooldown_ready(&u, 1500));
        assert!(cooldown_ready(&u, 2000));
    }

    #[test]
    fn test_shield_discount_exact() {
        // One shield, nothing else: 100 damage lands as exactly 80.
        let mut u = unit_with(&[ModuleKind::Shield]);
        let mut rng = SimRng::new(1);
        let delivered = damage_unit(&mut u, 100, &mut rng);
        assert_eq!(delivered, 80);
        assert_eq!(u.modules[0].hp, 20);
    }

    #[test]
    fn test_shield_overkill_reports_undelivered() {
        let mut u = unit_with(&[ModuleKind::Shield]);
        u.modules[0].hp = 50;
        let mut rng = SimRng::new(2);
        // 100 discounts to 80, but only 50 hp exist to absorb it.
        let delivered = damage_unit(&mut u, 100, &mut rng);
        assert_eq!(delivered, 50);
        assert!(u.is_destroyed());
    }

    #[test]
    fn test_no_shield_no_discount() {
        let mut u = unit_with(&[ModuleKind::Movement]);
        let mut rng = SimRng::new(3);
        let delivered = damage_unit(&mut u, 60, &mut rng);
        assert_eq!(delivered, 60);
        assert_eq!(u.modules[0].hp, 40);
    }

    #[test]
    fn test_spill_reaches_other_modules_in_same_hit() {
        // 300 damage -> 240 after discount; 100 shield hp cannot hold it,
        // the rest must land on the other modules in the same call.
        let mut u = unit_with(&[
            ModuleKind::Shield,
            ModuleKind::Movement,
            ModuleKind::Attack,
        ]);
        let mut rng = SimRng::new(4);
        let delivered = damage_unit(&mut u, 300, &mut rng);
        assert_eq!(delivered, 240);
        assert_eq!(u.modules[0].hp, 0);
        let non_shield_hp: u32 = u.modules[1].hp + u.modules[2].hp;
        assert_eq!(non_shield_hp, 200 - 140);
    }

    #[test]
    fn test_shields_drain_before_others() {
        let mut u = unit_with(&[ModuleKind::Shield, ModuleKind::Movement]);
        let mut rng = SimRng::new(5);
        // 50 -> 40 after discount, fully absorbed by the shield.
        damage_unit(&mut u, 50, &mut rng);
        assert_eq!(u.modules[0].hp, 60);
        assert_eq!(u.modules[1].hp, 100);
    }

    #[test]
    fn test_dead_shield_gives_no_discount() {
        let mut u = unit_with(&[ModuleKind::Shield, ModuleKind::Movement]);
        u.modules[0].hp = 0;
        let mut rng = SimRng::new(6);
        let delivered = damage_unit(&mut u, 50, &mut rng);
        assert_eq!(delivered, 50);
        assert_eq!(u.modules[1].hp, 50);
    }

    #[test]
    fn test_nearest_enemy_prefers_closest() {
        let mut units = UnitStore::new();
        let me = units.allocate_id();
        units.insert(Unit::new(me, 0, Cell::new(5, 5), &[ModuleKind::Attack]));
        let far = units.allocate_id();
        units.insert(Unit::new(far, 1, Cell::new(15, 5), &[ModuleKind::Attack]));
        let near = units.allocate_id();
        units.insert(Unit::new(near, 1, Cell::new(7, 5), &[ModuleKind::Attack]));
        let u = units.get(me).unwrap().clone();
        let sighting = nearest_enemy(&u, &units, &[]).unwrap();
        assert_eq!(sighting.target, TargetRef::Unit(near));
        assert_eq!(sighting.dist, 2);
    }

    #[test]
    fn test_nearest_enemy_sees_hq_by_edge_distance() {
        let mut units = UnitStore::new();
        let me = units.allocate_id();
        units.insert(Unit::new(me, 0, Cell::new(5, 5), &[ModuleKind::Attack]));
        let hqs = vec![Hq::new(Cell::new(12, 5), PlayerColor::Red)];
        let u = units.get(me).unwrap().clone();
        let sighting = nearest_enemy(&u, &units, &hqs).unwrap();
        assert_eq!(sighting.target, TargetRef::Hq(PlayerColor::Red));
        // center distance 7, minus half-span 3
        assert_eq!(sighting.dist, 4);
    }

    #[test]
    fn test_own_hq_is_not_a_target() {
        let mut units = UnitStore::new();
        let me = units.allocate_id();
        units.insert(Unit::new(me, 0, Cell::new(5, 5), &[ModuleKind::Attack]));
        let hqs = vec![Hq::new(Cell::new(12, 5), PlayerColor::Blue)];
        let u = units.get(me).unwrap().clone();
        assert!(nearest_enemy(&u, &units, &hqs).is_none());
    }

    #[test]
    fn test_melee_threat_diagonal_counts() {
        let mut units = UnitStore::new();
        let me = units.allocate_id();
        units.insert(Unit::new(me, 0, Cell::new(5, 5), &[ModuleKind::RangedAttack]));
        let foe = units.allocate_id();
        units.insert(Unit::new(foe, 1, Cell::new(7, 7), &[ModuleKind::Attack]));
        let u = units.get(me).unwrap().clone();
        assert_eq!(melee_threat(&u, &units), Some(Cell::new(7, 7)));
    }

    #[test]
    fn test_melee_in_range_against_hq_perimeter() {
        let mut units = UnitStore::new();
        let me = units.allocate_id();
        units.insert(Unit::new(me, 0, Cell::new(17, 10), &[ModuleKind::Attack]));
        let hqs = vec![Hq::new(Cell::new(12, 10), PlayerColor::Red)];
        let u = units.get(me).unwrap().clone();
        let sighting = nearest_enemy(&u, &units, &hqs).unwrap();
        assert!(melee_in_range(&u, &sighting, &units, &hqs));
        let mut far = u.clone();
        far.pos = Cell::new(18, 10);
        assert!(!melee_in_range(&far, &sighting, &units, &hqs));
    }

    proptest! {
        /// Damage conservation: hp lost equals min(post-shield damage,
        /// available hp), and no module goes negative.
        #[test]
        fn prop_damage_conserved(
            amount in 0u32..500,
            seed in 0u64..1000,
            loadout_bits in 1u8..16,
        ) {
            let mut kinds = Vec::new();
            if loadout_bits & 1 != 0 { kinds.push(ModuleKind::Movement); }
            if loadout_bits & 2 != 0 { kinds.push(ModuleKind::Shield); }
            if loadout_bits & 4 != 0 { kinds.push(ModuleKind::Attack); }
            if loadout_bits & 8 != 0 { kinds.push(ModuleKind::RangedAttack); }
            let mut u = unit_with(&kinds);
            let before: u32 = u.total_module_hp();
            let discounted = if u.has_functioning(ModuleKind::Shield) {
                amount * 4 / 5
            } else {
                amount
            };
            let mut rng = SimRng::new(seed);
            let delivered = damage_unit(&mut u, amount, &mut rng);
            let after: u32 = u.total_module_hp();
            prop_assert_eq!(before - after, delivered);
            prop_assert_eq!(delivered, discounted.min(before));
        }
    }
}
