//! The core simulation loop.
//!
//! [`SimulationWorld`] owns all game state and advances it with
//! [`tick`](SimulationWorld::tick). Every tick, each unit that is not
//! mid-step interprets its program and performs exactly one action. Units
//! are processed in sorted-id order (insertion order, since ids are
//! monotonic); when two units contend for a cell in the same tick, the
//! earlier one wins and the later one sees it occupied. That ordering bias
//! is part of the game's observable behavior, so the order must never
//! change.
//!
//! Simulation runs independently of whose turn it is: turn ownership only
//! gates *programming* in the surrounding UI, never execution.
//!
//! # Determinism
//!
//! - No floating-point math
//! - All randomness from the seeded [`SimRng`]
//! - Sorted-id iteration everywhere
//! - Integer millisecond clock advanced only by `tick`
//!
//! # Example
//!
//! ```
//! use skirmish_core::grid::{Cell, Grid};
//! use skirmish_core::hq::{Hq, PlayerColor};
//! use skirmish_core::simulation::SimulationWorld;
//! use skirmish_core::unit::ModuleKind;
//!
//! let grid = Grid::open(40, 40);
//! let hqs = vec![
//!     Hq::new(Cell::new(8, 8), PlayerColor::Blue),
//!     Hq::new(Cell::new(31, 31), PlayerColor::Red),
//! ];
//! let mut world = SimulationWorld::new(grid, hqs, 2, 12345);
//!
//! let scout = world.spawn_unit(PlayerColor::Blue, &[ModuleKind::Movement]).unwrap();
//! world.assign_program(scout, &[6]).unwrap(); // explore
//! let events = world.tick(250);
//! assert_eq!(events.moves.len(), 1);
//! ```

use std::collections::hash_map::DefaultHasher;
use std::collections::HashMap;
use std::hash::{Hash, Hasher};

use serde::{Deserialize, Serialize};

use crate::combat::{
    self, AttackKind, TargetRef, DETECT_HQ_ANY_RADIUS, DETECT_HQ_CLOSE_RADIUS, DETECT_RADIUS,
    RANGED_RADIUS,
};
use crate::error::{GameError, Result};
use crate::grid::{Cell, Grid};
use crate::hq::{Hq, HqKey, PlayerColor, PlayerId, HQ_HALF_SPAN};
use crate::knowledge::KnowledgeMap;
use crate::movement;
use crate::pathfinding;
use crate::program::{Action, Condition, Program, Routine, Token};
use crate::rng::SimRng;
use crate::unit::{ModuleKind, Tween, Unit, UnitId, UnitStore, MODULE_SLOTS};
use crate::world::WorldView;

/// Base energy cost of spawning a unit.
pub const SPAWN_BASE_COST: u32 = 50;

/// Additional energy cost per module in the loadout.
pub const SPAWN_MODULE_COST: u32 = 25;

/// A tween older than this is considered stuck and force-cleared.
pub const STUCK_TWEEN_MS: u64 = 10_000;

/// Terminal game state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Outcome {
    /// Exactly one HQ left standing.
    Victory(PlayerColor),
    /// No HQ left standing.
    Draw,
}

/// A unit started moving to an adjacent cell.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MoveEvent {
    /// The unit that moved.
    pub unit: UnitId,
    /// Vacated cell.
    pub from: Cell,
    /// Entered cell (the unit's new logical position).
    pub to: Cell,
    /// Tween duration for the renderer.
    pub duration_ms: u64,
}

/// A unit dealt damage. The visual effect (burst or beam) belongs on the
/// same tick as this event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AttackEvent {
    /// The attacking unit.
    pub attacker: UnitId,
    /// What was hit.
    pub target: TargetRef,
    /// Melee or ranged.
    pub kind: AttackKind,
    /// Damage rolled before shields and module absorption.
    pub damage: u32,
}

/// A player's units sighted an enemy HQ for the first time.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DiscoveryEvent {
    /// The discovering player.
    pub player: PlayerId,
    /// The HQ that entered their shared map.
    pub hq: HqKey,
}

/// Everything that happened during one tick, for the presentation layer.
#[derive(Debug, Clone, Default)]
pub struct TickEvents {
    /// Movement starts.
    pub moves: Vec<MoveEvent>,
    /// Damage events.
    pub attacks: Vec<AttackEvent>,
    /// First sightings of enemy HQs.
    pub discoveries: Vec<DiscoveryEvent>,
    /// Units removed this tick (destroyed, self-destructed or cascaded).
    pub deaths: Vec<UnitId>,
    /// HQs destroyed this tick.
    pub hqs_destroyed: Vec<PlayerColor>,
    /// Terminal state, if reached.
    pub outcome: Option<Outcome>,
}

/// The complete simulation state and its tick driver.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SimulationWorld {
    grid: Grid,
    hqs: Vec<Hq>,
    units: UnitStore,
    player_maps: Vec<KnowledgeMap>,
    programs: HashMap<UnitId, Program>,
    rng: SimRng,
    now_ms: u64,
    tick: u64,
    outcome: Option<Outcome>,
    /// Deaths and HQ losses from out-of-band commands (self-destruct, dev
    /// damage), reported on the next tick so effects still fire.
    pending_deaths: Vec<UnitId>,
    pending_hq_losses: Vec<PlayerColor>,
}

impl SimulationWorld {
    /// Create a world from an externally generated grid and HQ placements.
    ///
    /// # Panics
    ///
    /// Panics if an HQ belongs to a player index `>= players`.
    #[must_use]
    pub fn new(grid: Grid, hqs: Vec<Hq>, players: u8, seed: u64) -> Self {
        for hq in &hqs {
            assert!(
                hq.owner() < players,
                "HQ owner {} out of range for {} players",
                hq.owner(),
                players
            );
        }
        Self {
            grid,
            hqs,
            units: UnitStore::new(),
            player_maps: vec![KnowledgeMap::new(); players as usize],
            programs: HashMap::new(),
            rng: SimRng::new(seed),
            now_ms: 0,
            tick: 0,
            outcome: None,
            pending_deaths: Vec::new(),
            pending_hq_losses: Vec::new(),
        }
    }

    // ------------------------------------------------------------------
    // Queries
    // ------------------------------------------------------------------

    /// Current tick number.
    #[must_use]
    pub const fn get_tick(&self) -> u64 {
        self.tick
    }

    /// Simulation clock in milliseconds.
    #[must_use]
    pub const fn now_ms(&self) -> u64 {
        self.now_ms
    }

    /// Live units.
    #[must_use]
    pub fn units(&self) -> &UnitStore {
        &self.units
    }

    /// Live headquarters.
    #[must_use]
    pub fn hqs(&self) -> &[Hq] {
        &self.hqs
    }

    /// The grid.
    #[must_use]
    pub fn grid(&self) -> &Grid {
        &self.grid
    }

    /// A player's shared knowledge map.
    #[must_use]
    pub fn knowledge(&self, player: PlayerId) -> Option<&KnowledgeMap> {
        self.player_maps.get(player as usize)
    }

    /// The parsed program assigned to a unit, if any.
    #[must_use]
    pub fn program(&self, unit: UnitId) -> Option<&Program> {
        self.programs.get(&unit)
    }

    /// Terminal state, if the game is over.
    #[must_use]
    pub const fn outcome(&self) -> Option<Outcome> {
        self.outcome
    }

    // ------------------------------------------------------------------
    // Player commands
    // ------------------------------------------------------------------

    /// Spawn a unit at the first free cell ringing the HQ, paying
    /// `50 + 25 x modules` energy.
    ///
    /// Atomic: on any failure (insufficient energy, no exit cell) nothing
    /// is mutated: no unit created, no energy spent.
    ///
    /// # Errors
    ///
    /// [`GameError::SimulationHalted`], [`GameError::HqNotFound`],
    /// [`GameError::InvalidLoadout`], [`GameError::NoExitCell`] or
    /// [`GameError::InsufficientEnergy`].
    pub fn spawn_unit(&mut self, color: PlayerColor, loadout: &[ModuleKind]) -> Result<UnitId> {
        self.ensure_running()?;
        validate_loadout(loadout)?;
        let hq_idx = self
            .hqs
            .iter()
            .position(|h| h.color == color)
            .ok_or(GameError::HqNotFound(color))?;

        let cost = SPAWN_BASE_COST + SPAWN_MODULE_COST * loadout.len() as u32;
        let available = self.hqs[hq_idx].energy;
        let exit = self
            .find_exit_cell(&self.hqs[hq_idx])
            .ok_or(GameError::NoExitCell(color))?;
        if available < cost {
            return Err(GameError::InsufficientEnergy {
                required: cost,
                available,
            });
        }

        self.hqs[hq_idx].energy -= cost;
        let owner = color.player();
        let id = self.units.allocate_id();
        self.units.insert(Unit::new(id, owner, exit, loadout));
        self.player_maps[owner as usize].record_free(exit);
        tracing::debug!(unit = id, ?color, cost, "spawned unit");
        Ok(id)
    }

    /// Place a unit directly on a cell, paying nothing. The dev/debug
    /// spawn path; also used by scenario setup.
    ///
    /// # Errors
    ///
    /// Fails when the game is over, the loadout is invalid, the player
    /// index is unknown, or the cell is blocked or occupied.
    pub fn spawn_unit_at(
        &mut self,
        owner: PlayerId,
        cell: Cell,
        loadout: &[ModuleKind],
    ) -> Result<UnitId> {
        self.ensure_running()?;
        validate_loadout(loadout)?;
        if usize::from(owner) >= self.player_maps.len() {
            return Err(GameError::InvalidState(format!(
                "no player with index {owner}"
            )));
        }
        let view = WorldView {
            grid: &self.grid,
            hqs: &self.hqs,
        };
        if !view.is_walkable(cell) || self.units.occupied(cell) {
            return Err(GameError::InvalidState(format!(
                "cell ({}, {}) is blocked",
                cell.x, cell.y
            )));
        }
        let id = self.units.allocate_id();
        self.units.insert(Unit::new(id, owner, cell, loadout));
        self.player_maps[owner as usize].record_free(cell);
        Ok(id)
    }

    /// Spawn `count` starting units on random free cells around the HQ,
    /// paying nothing. Game-setup path.
    ///
    /// Returns the ids actually spawned (fewer than `count` if space runs
    /// out).
    ///
    /// # Errors
    ///
    /// Fails when the game is over, the loadout is invalid or the HQ does
    /// not exist.
    pub fn spawn_initial_units(
        &mut self,
        color: PlayerColor,
        count: usize,
        loadout: &[ModuleKind],
    ) -> Result<Vec<UnitId>> {
        self.ensure_running()?;
        validate_loadout(loadout)?;
        let hq = self
            .hqs
            .iter()
            .find(|h| h.color == color)
            .cloned()
            .ok_or(GameError::HqNotFound(color))?;
        let view = WorldView {
            grid: &self.grid,
            hqs: &self.hqs,
        };
        let reach = HQ_HALF_SPAN + 2;
        let mut candidates: Vec<Cell> = Vec::new();
        for dy in -reach..=reach {
            for dx in -reach..=reach {
                let c = Cell::new(hq.center.x + dx, hq.center.y + dy);
                if view.is_walkable(c) {
                    candidates.push(c);
                }
            }
        }
        let owner = color.player();
        let mut spawned = Vec::new();
        while spawned.len() < count && !candidates.is_empty() {
            let idx = self.rng.next_index(candidates.len());
            let cell = candidates.swap_remove(idx);
            if self.units.occupied(cell) {
                continue;
            }
            let id = self.units.allocate_id();
            self.units.insert(Unit::new(id, owner, cell, loadout));
            self.player_maps[owner as usize].record_free(cell);
            spawned.push(id);
        }
        Ok(spawned)
    }

    /// Assign a program to a unit, replacing any previous one.
    ///
    /// The `0 0` sentinel destroys the unit immediately instead: a player
    /// command, but identical in effect to in-tick destruction.
    ///
    /// # Errors
    ///
    /// [`GameError::SimulationHalted`] or [`GameError::UnitNotFound`].
    pub fn assign_program(&mut self, unit: UnitId, tokens: &[Token]) -> Result<()> {
        self.ensure_running()?;
        if !self.units.contains(unit) {
            return Err(GameError::UnitNotFound(unit));
        }
        match Program::parse(tokens) {
            Program::SelfDestruct => {
                self.units.remove(unit);
                self.programs.remove(&unit);
                self.pending_deaths.push(unit);
                tracing::info!(unit, "unit self-destructed");
            }
            program => {
                self.programs.insert(unit, program);
            }
        }
        Ok(())
    }

    /// Remove a unit's program; it idles until reprogrammed.
    pub fn clear_program(&mut self, unit: UnitId) {
        self.programs.remove(&unit);
    }

    /// Grant energy to an HQ (dev action, the only energy income in this
    /// version), clamped to its cap.
    ///
    /// # Errors
    ///
    /// [`GameError::HqNotFound`] when no live HQ has that color.
    pub fn add_energy(&mut self, color: PlayerColor, amount: u32) -> Result<()> {
        let hq = self
            .hqs
            .iter_mut()
            .find(|h| h.color == color)
            .ok_or(GameError::HqNotFound(color))?;
        hq.add_energy(amount);
        Ok(())
    }

    /// Damage an HQ directly (dev action). Destruction cascades exactly as
    /// it would from combat.
    ///
    /// # Errors
    ///
    /// [`GameError::HqNotFound`] when no live HQ has that color.
    pub fn damage_hq(&mut self, color: PlayerColor, amount: u32) -> Result<()> {
        let hq = self
            .hqs
            .iter_mut()
            .find(|h| h.color == color)
            .ok_or(GameError::HqNotFound(color))?;
        hq.apply_damage(amount);
        if hq.is_destroyed() {
            let dead = self.destroy_hq(color);
            self.pending_deaths.extend(dead);
            self.pending_hq_losses.push(color);
        }
        Ok(())
    }

    // ------------------------------------------------------------------
    // Tick
    // ------------------------------------------------------------------

    /// Advance the simulation by `dt_ms` milliseconds.
    ///
    /// Once a terminal outcome is reached, further calls are no-ops: the
    /// clock stops and the returned events only restate the outcome.
    pub fn tick(&mut self, dt_ms: u64) -> TickEvents {
        let mut events = TickEvents {
            outcome: self.outcome,
            ..TickEvents::default()
        };
        // Out-of-band casualties (self-destruct, dev damage) are reported
        // even on the tick that discovers the game is over.
        events.deaths.append(&mut self.pending_deaths);
        events.hqs_destroyed.append(&mut self.pending_hq_losses);
        if self.outcome.is_some() {
            return events;
        }
        self.now_ms += dt_ms;
        self.tick += 1;

        for id in self.units.sorted_ids() {
            if self.outcome.is_some() {
                break;
            }
            if !self.units.contains(id) {
                continue; // casualty earlier this tick
            }
            if self.suspended_in_tween(id) {
                continue;
            }
            self.scan_for_enemy_hqs(id, &mut events);
            let Some(&Program::Run(routine)) = self.programs.get(&id) else {
                continue;
            };
            self.run_routine(id, routine, &mut events);
        }

        self.sweep_destroyed(&mut events);
        events.outcome = self.outcome;

        #[cfg(debug_assertions)]
        {
            let hash = self.state_hash();
            tracing::debug!(tick = self.tick, state_hash = hash, "simulation state hash");
        }

        events
    }

    /// Whether the unit is mid-tween and must skip this tick. Force-clears
    /// tweens that have somehow been in flight for over ten seconds.
    fn suspended_in_tween(&mut self, id: UnitId) -> bool {
        let now = self.now_ms;
        let Some(unit) = self.units.get_mut(id) else {
            return false;
        };
        match unit.tween {
            Some(tween) if now < tween.end_ms => {
                if now.saturating_sub(tween.start_ms) > STUCK_TWEEN_MS {
                    tracing::warn!(unit = id, "clearing stuck movement tween");
                    unit.tween = None;
                    false
                } else {
                    true
                }
            }
            Some(_) => {
                unit.tween = None;
                false
            }
            None => false,
        }
    }

    /// Record any enemy HQ within sight into the owner's shared map.
    fn scan_for_enemy_hqs(&mut self, id: UnitId, events: &mut TickEvents) {
        let Some(unit) = self.units.get(id) else {
            return;
        };
        let (owner, pos) = (unit.owner, unit.pos);
        let sighted: Vec<HqKey> = self
            .hqs
            .iter()
            .filter(|h| h.owner() != owner && h.edge_distance(pos) <= DETECT_RADIUS)
            .map(Hq::key)
            .collect();
        let map = &mut self.player_maps[owner as usize];
        for key in sighted {
            if map.discover_hq(key) {
                tracing::info!(player = owner, ?key, "enemy HQ discovered");
                events.discoveries.push(DiscoveryEvent { player: owner, hq: key });
            }
        }
    }

    fn run_routine(&mut self, id: UnitId, routine: Routine, events: &mut TickEvents) {
        let action = match routine {
            Routine::Act(action) => Some(action),
            Routine::If {
                cond,
                then,
                else_,
                fallback,
            } => {
                if self.eval_condition(id, cond) {
                    Some(then)
                } else if else_.is_some() {
                    else_
                } else {
                    // Preamble fallback. An exploring preamble is
                    // suppressed while engaged so the unit doesn't wander
                    // out of its own fight between attacks.
                    match fallback {
                        Some(Action::Explore) if self.unit_is_engaged(id) => None,
                        other => other,
                    }
                }
            }
        };
        if let Some(action) = action {
            self.execute_action(id, action, events);
        }
    }

    fn eval_condition(&self, id: UnitId, cond: Condition) -> bool {
        let Some(unit) = self.units.get(id) else {
            return false;
        };
        match cond {
            Condition::EnemyNearby => {
                combat::nearest_enemy_within(unit, &self.units, &self.hqs, DETECT_RADIUS).is_some()
            }
            Condition::AnyEnemyHqNearby => {
                combat::enemy_hq_within(unit.owner, unit.pos, &self.hqs, DETECT_HQ_ANY_RADIUS)
            }
            Condition::EnemyHqClose => {
                combat::enemy_hq_within(unit.owner, unit.pos, &self.hqs, DETECT_HQ_CLOSE_RADIUS)
            }
        }
    }

    fn unit_is_engaged(&self, id: UnitId) -> bool {
        self.units
            .get(id)
            .is_some_and(|u| combat::is_engaged(u, &self.units, &self.hqs))
    }

    fn execute_action(&mut self, id: UnitId, action: Action, events: &mut TickEvents) {
        match action {
            Action::Explore => self.do_explore(id, events),
            Action::GoToOwnHq => self.do_goto_own_hq(id, events),
            Action::GoToEnemyHq => self.do_goto_enemy_hq(id, events),
            Action::Attack => self.do_attack(id, events),
        }
    }

    // ------------------------------------------------------------------
    // Actions
    // ------------------------------------------------------------------

    fn do_explore(&mut self, id: UnitId, events: &mut TickEvents) {
        let Some(unit) = self.units.get(id) else {
            return;
        };
        if !unit.can_move() {
            return;
        }
        let unit = unit.clone();
        let owner = usize::from(unit.owner);
        self.player_maps[owner].record_visit(unit.pos);
        let step = movement::explore_step(
            &unit,
            WorldView {
                grid: &self.grid,
                hqs: &self.hqs,
            },
            &self.units,
            &mut self.player_maps[owner],
            &mut self.rng,
        );
        if let Some(dir) = step {
            self.apply_move(id, dir, events);
        }
    }

    fn do_goto_own_hq(&mut self, id: UnitId, events: &mut TickEvents) {
        let Some(unit) = self.units.get(id) else {
            return;
        };
        if !unit.can_move() {
            return;
        }
        let unit = unit.clone();
        let Some(hq) = self.hqs.iter().find(|h| h.owner() == unit.owner).cloned() else {
            return;
        };
        if hq.at_perimeter(unit.pos) {
            return; // arrived
        }
        let owner = usize::from(unit.owner);
        let view = WorldView {
            grid: &self.grid,
            hqs: &self.hqs,
        };
        // Route through charted territory; a unit standing on uncharted
        // ground first bridges back to the known region. When the chart
        // holds no route at all, degrade to the local approach tiers.
        let mut step = if self.player_maps[owner].knows_free(unit.pos) {
            pathfinding::shared_step_to_hq(&unit, &hq, view, &self.units, &self.player_maps[owner])
        } else {
            pathfinding::bridge_step_to_known(&unit, view, &self.units, &self.player_maps[owner])
        };
        if step.is_none() {
            step = movement::approach_step(
                &unit,
                hq.center,
                true,
                view,
                &self.units,
                &mut self.player_maps[owner],
                &mut self.rng,
            );
        }
        if let Some(dir) = step {
            self.apply_move(id, dir, events);
        }
    }

    fn do_goto_enemy_hq(&mut self, id: UnitId, events: &mut TickEvents) {
        let Some(unit) = self.units.get(id) else {
            return;
        };
        if !unit.can_move() {
            return;
        }
        let unit = unit.clone();
        let owner = usize::from(unit.owner);
        let view = WorldView {
            grid: &self.grid,
            hqs: &self.hqs,
        };

        let mut discovered: Vec<Hq> = self
            .hqs
            .iter()
            .filter(|h| h.owner() != unit.owner && self.player_maps[owner].knows_hq(h.key()))
            .cloned()
            .collect();

        discovered.sort_by_key(|h| (h.edge_distance(unit.pos), h.owner()));
        let Some(hq) = discovered.into_iter().next() else {
            // Nothing discovered yet: head for the best uninformed guess,
            // the own HQ mirrored through the map center.
            let target = self.heuristic_enemy_guess(unit.owner);
            let step = movement::approach_step(
                &unit,
                target,
                false,
                view,
                &self.units,
                &mut self.player_maps[owner],
                &mut self.rng,
            );
            if let Some(dir) = step {
                self.apply_move(id, dir, events);
            }
            return;
        };

        if hq.at_perimeter(unit.pos) {
            return; // arrived
        }
        let mut step = pathfinding::global_step_to_hq(&unit, &hq, view, &self.units);
        if step.is_none() {
            step = movement::approach_step(
                &unit,
                hq.center,
                false,
                view,
                &self.units,
                &mut self.player_maps[owner],
                &mut self.rng,
            );
        }
        if let Some(dir) = step {
            self.apply_move(id, dir, events);
        }
    }

    fn do_attack(&mut self, id: UnitId, events: &mut TickEvents) {
        let Some(unit) = self.units.get(id) else {
            return;
        };
        let unit = unit.clone();
        // On cooldown the unit takes no action at all this tick.
        if !combat::cooldown_ready(&unit, self.now_ms) {
            return;
        }
        let ranged = unit.has_functioning(ModuleKind::RangedAttack);
        let melee = unit.has_functioning(ModuleKind::Attack);
        let owner = usize::from(unit.owner);
        let view = WorldView {
            grid: &self.grid,
            hqs: &self.hqs,
        };

        // Ranged-only units break contact before anything else.
        if ranged && !melee && unit.can_move() {
            if let Some(threat) = combat::melee_threat(&unit, &self.units) {
                if let Some(dir) = movement::flee_step(&unit, threat, view, &self.units) {
                    self.apply_move(id, dir, events);
                    return;
                }
            }
        }

        if ranged {
            if let Some(sighting) =
                combat::nearest_enemy_within(&unit, &self.units, &self.hqs, RANGED_RADIUS)
            {
                self.deliver_attack(
                    id,
                    sighting.target,
                    AttackKind::Ranged,
                    combat::ranged_damage(&unit),
                    events,
                );
                return;
            }
        }

        let nearest = combat::nearest_enemy(&unit, &self.units, &self.hqs);
        if melee {
            if let Some(sighting) = nearest {
                if combat::melee_in_range(&unit, &sighting, &self.units, &self.hqs) {
                    self.deliver_attack(
                        id,
                        sighting.target,
                        AttackKind::Melee,
                        combat::melee_damage(&unit),
                        events,
                    );
                    return;
                }
            }
        }

        // Nothing in range: pursue the nearest enemy, or fall back to
        // exploration when the map holds no enemy at all.
        if let Some(sighting) = nearest {
            if unit.can_move() {
                let step = movement::approach_step(
                    &unit,
                    sighting.cell,
                    false,
                    view,
                    &self.units,
                    &mut self.player_maps[owner],
                    &mut self.rng,
                );
                if let Some(dir) = step {
                    self.apply_move(id, dir, events);
                }
            }
        } else {
            self.do_explore(id, events);
        }
    }

    /// Start a one-cell move: set the tween, push the vacated cell onto
    /// the trail, commit the new position and chart it as known-free.
    fn apply_move(&mut self, id: UnitId, dir: crate::grid::Dir, events: &mut TickEvents) {
        let now = self.now_ms;
        let Some(unit) = self.units.get_mut(id) else {
            return;
        };
        let Some(duration) = unit.tile_duration_ms() else {
            return;
        };
        let from = unit.pos;
        let to = from.step(dir);
        unit.tween = Some(Tween {
            from,
            to,
            start_ms: now,
            end_ms: now + duration,
        });
        unit.trail.push(from);
        unit.pos = to;
        unit.last_dir = Some(dir);
        let owner = usize::from(unit.owner);
        self.player_maps[owner].record_free(to);
        events.moves.push(MoveEvent {
            unit: id,
            from,
            to,
            duration_ms: duration,
        });
    }

    /// Apply an attack to its target, start the cooldown and record the
    /// event. HQ destruction cascades immediately.
    fn deliver_attack(
        &mut self,
        attacker: UnitId,
        target: TargetRef,
        kind: AttackKind,
        damage: u32,
        events: &mut TickEvents,
    ) {
        match target {
            TargetRef::Unit(target_id) => {
                if let Some(victim) = self.units.get_mut(target_id) {
                    combat::damage_unit(victim, damage, &mut self.rng);
                }
            }
            TargetRef::Hq(color) => {
                let destroyed = match self.hqs.iter_mut().find(|h| h.color == color) {
                    Some(hq) => {
                        hq.apply_damage(damage);
                        hq.is_destroyed()
                    }
                    None => false,
                };
                if destroyed {
                    let dead = self.destroy_hq(color);
                    events.deaths.extend(dead);
                    events.hqs_destroyed.push(color);
                }
            }
        }
        if let Some(unit) = self.units.get_mut(attacker) {
            unit.last_attack_ms = Some(self.now_ms);
        }
        events.attacks.push(AttackEvent {
            attacker,
            target,
            kind,
            damage,
        });
    }

    /// Remove a destroyed HQ, unconditionally destroy every unit of its
    /// owner, and resolve victory or draw. Returns the cascaded unit ids.
    fn destroy_hq(&mut self, color: PlayerColor) -> Vec<UnitId> {
        let Some(idx) = self.hqs.iter().position(|h| h.color == color) else {
            return Vec::new();
        };
        let hq = self.hqs.remove(idx);
        let owner = hq.owner();
        tracing::info!(?color, "HQ destroyed");

        let dead = self.units.ids_owned_by(owner);
        for id in &dead {
            self.units.remove(*id);
            self.programs.remove(id);
        }

        if self.hqs.len() == 1 {
            self.outcome = Some(Outcome::Victory(self.hqs[0].color));
            tracing::info!(winner = ?self.hqs[0].color, "game over");
        } else if self.hqs.is_empty() {
            self.outcome = Some(Outcome::Draw);
            tracing::info!("game over: draw");
        }
        dead
    }

    /// Remove units whose modules are all dead.
    fn sweep_destroyed(&mut self, events: &mut TickEvents) {
        for id in self.units.sorted_ids() {
            if self.units.get(id).map_or(false, Unit::is_destroyed) {
                self.units.remove(id);
                self.programs.remove(&id);
                events.deaths.push(id);
            }
        }
    }

    // ------------------------------------------------------------------
    // Helpers
    // ------------------------------------------------------------------

    fn ensure_running(&self) -> Result<()> {
        if self.outcome.is_some() {
            return Err(GameError::SimulationHalted);
        }
        Ok(())
    }

    /// Where an enemy HQ probably is, before any has been discovered: the
    /// own HQ mirrored through the map center.
    fn heuristic_enemy_guess(&self, owner: PlayerId) -> Cell {
        match self.hqs.iter().find(|h| h.owner() == owner) {
            Some(hq) => Cell::new(
                self.grid.cols() - 1 - hq.center.x,
                self.grid.rows() - 1 - hq.center.y,
            ),
            None => Cell::new(self.grid.cols() / 2, self.grid.rows() / 2),
        }
    }

    /// First free, unoccupied cell on the rings just outside the HQ
    /// footprint, scanning outward.
    fn find_exit_cell(&self, hq: &Hq) -> Option<Cell> {
        let view = WorldView {
            grid: &self.grid,
            hqs: &self.hqs,
        };
        for r in (HQ_HALF_SPAN + 1)..=(HQ_HALF_SPAN + 4) {
            for dy in -r..=r {
                for dx in -r..=r {
                    if dx.abs().max(dy.abs()) != r {
                        continue;
                    }
                    let cell = Cell::new(hq.center.x + dx, hq.center.y + dy);
                    if view.is_walkable(cell) && !self.units.occupied(cell) {
                        return Some(cell);
                    }
                }
            }
        }
        None
    }

    // ------------------------------------------------------------------
    // Determinism tooling
    // ------------------------------------------------------------------

    /// Hash of the full simulation state. Two worlds fed identical inputs
    /// must produce identical hashes; the determinism harness and replay
    /// verification build on this.
    #[must_use]
    pub fn state_hash(&self) -> u64 {
        let mut hasher = DefaultHasher::new();
        self.tick.hash(&mut hasher);
        self.now_ms.hash(&mut hasher);

        let ids = self.units.sorted_ids();
        ids.len().hash(&mut hasher);
        for id in ids {
            if let Some(unit) = self.units.get(id) {
                unit.hash(&mut hasher);
            }
        }

        self.hqs.len().hash(&mut hasher);
        for hq in &self.hqs {
            hq.hash(&mut hasher);
        }

        for map in &self.player_maps {
            let mut walls: Vec<Cell> = map.wall_cells().copied().collect();
            walls.sort_unstable_by_key(|c| (c.y, c.x));
            walls.hash(&mut hasher);

            let mut free: Vec<Cell> = map.free_cells().copied().collect();
            free.sort_unstable_by_key(|c| (c.y, c.x));
            free.hash(&mut hasher);

            let mut visits: Vec<(Cell, u32)> =
                map.visit_counts().iter().map(|(c, n)| (*c, *n)).collect();
            visits.sort_unstable_by_key(|(c, _)| (c.y, c.x));
            visits.hash(&mut hasher);

            let mut hqs: Vec<HqKey> = map.discovered_hqs().copied().collect();
            hqs.sort_unstable_by_key(|k| (k.center.y, k.center.x));
            hqs.hash(&mut hasher);
        }

        hasher.finish()
    }

    /// Serialize the world for replay verification.
    ///
    /// # Errors
    ///
    /// Returns an error if serialization fails.
    pub fn serialize(&self) -> Result<Vec<u8>> {
        bincode::serialize(self)
            .map_err(|e| GameError::InvalidState(format!("Failed to serialize simulation: {e}")))
    }

    /// Restore a world from [`serialize`](Self::serialize) output.
    ///
    /// # Errors
    ///
    /// Returns an error if deserialization fails.
    pub fn deserialize(data: &[u8]) -> Result<Self> {
        bincode::deserialize(data)
            .map_err(|e| GameError::InvalidState(format!("Failed to deserialize simulation: {e}")))
    }
}

fn validate_loadout(loadout: &[ModuleKind]) -> Result<()> {
    if loadout.is_empty() {
        return Err(GameError::InvalidLoadout(
            "a unit needs at least one module".into(),
        ));
    }
    if loadout.len() > MODULE_SLOTS {
        return Err(GameError::InvalidLoadout(format!(
            "at most {MODULE_SLOTS} modules fit on a unit"
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::combat::ATTACK_COOLDOWN_MS;
    use crate::unit::BASE_TILE_MS;

    fn two_player_world() -> SimulationWorld {
        let grid = Grid::open(40, 40);
        let hqs = vec![
            Hq::new(Cell::new(8, 8), PlayerColor::Blue),
            Hq::new(Cell::new(31, 31), PlayerColor::Red),
        ];
        SimulationWorld::new(grid, hqs, 2, 12345)
    }

    #[test]
    fn test_tick_advances_clock() {
        let mut world = two_player_world();
        assert_eq!(world.get_tick(), 0);
        world.tick(250);
        assert_eq!(world.get_tick(), 1);
        assert_eq!(world.now_ms(), 250);
    }

    #[test]
    fn test_spawn_deducts_energy() {
        let mut world = two_player_world();
        let before = world.hqs()[0].energy;
        world
            .spawn_unit(PlayerColor::Blue, &[ModuleKind::Movement, ModuleKind::Attack])
            .unwrap();
        assert_eq!(world.hqs()[0].energy, before - SPAWN_BASE_COST - 2 * SPAWN_MODULE_COST);
        assert_eq!(world.units().len(), 1);
    }

    #[test]
    fn test_spawn_atomic_on_insufficient_energy() {
        let mut world = two_player_world();
        // Ten modules cost 300; drain below that first.
        let loadout = [ModuleKind::Movement; 10];
        world.spawn_unit(PlayerColor::Blue, &loadout).unwrap(); // 300 -> 0
        let err = world.spawn_unit(PlayerColor::Blue, &loadout).unwrap_err();
        assert!(matches!(
            err,
            GameError::InsufficientEnergy {
                required: 300,
                available: 0
            }
        ));
        assert_eq!(world.hqs()[0].energy, 0);
        assert_eq!(world.units().len(), 1);
    }

    #[test]
    fn test_spawn_exit_cell_rings_hq() {
        let mut world = two_player_world();
        let id = world
            .spawn_unit(PlayerColor::Blue, &[ModuleKind::Movement])
            .unwrap();
        let unit = world.units().get(id).unwrap();
        let hq = &world.hqs()[0];
        let d = unit.pos.chebyshev(hq.center);
        assert!(d > HQ_HALF_SPAN && d <= HQ_HALF_SPAN + 4);
    }

    #[test]
    fn test_empty_loadout_rejected() {
        let mut world = two_player_world();
        assert!(matches!(
            world.spawn_unit(PlayerColor::Blue, &[]),
            Err(GameError::InvalidLoadout(_))
        ));
    }

    #[test]
    fn test_explorer_moves_and_charts() {
        let mut world = two_player_world();
        let id = world
            .spawn_unit_at(0, Cell::new(20, 10), &[ModuleKind::Movement])
            .unwrap();
        world.assign_program(id, &[6]).unwrap();
        let start = world.units().get(id).unwrap().pos;
        let events = world.tick(250);
        assert_eq!(events.moves.len(), 1);
        let unit = world.units().get(id).unwrap();
        assert_ne!(unit.pos, start);
        assert!(world.knowledge(0).unwrap().knows_free(unit.pos));
        assert_eq!(world.knowledge(0).unwrap().visits(start), 1);
    }

    #[test]
    fn test_unit_suspends_during_tween() {
        let mut world = two_player_world();
        let id = world
            .spawn_unit_at(0, Cell::new(20, 10), &[ModuleKind::Movement])
            .unwrap();
        world.assign_program(id, &[6]).unwrap();
        world.tick(10); // moves, tween runs for BASE_TILE_MS
        let pos = world.units().get(id).unwrap().pos;
        let events = world.tick(10); // still tweening
        assert!(events.moves.is_empty());
        assert_eq!(world.units().get(id).unwrap().pos, pos);
        let events = world.tick(BASE_TILE_MS); // tween over
        assert_eq!(events.moves.len(), 1);
    }

    #[test]
    fn test_immobile_unit_never_moves() {
        let mut world = two_player_world();
        let id = world
            .spawn_unit_at(0, Cell::new(20, 10), &[ModuleKind::Attack])
            .unwrap();
        world.assign_program(id, &[6]).unwrap();
        for _ in 0..50 {
            world.tick(250);
        }
        assert_eq!(world.units().get(id).unwrap().pos, Cell::new(20, 10));
    }

    #[test]
    fn test_unprogrammed_unit_idles() {
        let mut world = two_player_world();
        let id = world
            .spawn_unit_at(0, Cell::new(20, 10), &[ModuleKind::Movement])
            .unwrap();
        for _ in 0..10 {
            let events = world.tick(250);
            assert!(events.moves.is_empty());
        }
        assert_eq!(world.units().get(id).unwrap().pos, Cell::new(20, 10));
    }

    #[test]
    fn test_malformed_program_idles() {
        let mut world = two_player_world();
        let id = world
            .spawn_unit_at(0, Cell::new(20, 10), &[ModuleKind::Movement])
            .unwrap();
        world.assign_program(id, &[42, 99, 1]).unwrap();
        let events = world.tick(250);
        assert!(events.moves.is_empty());
    }

    #[test]
    fn test_self_destruct_removes_unit_immediately() {
        let mut world = two_player_world();
        let id = world
            .spawn_unit_at(0, Cell::new(20, 10), &[ModuleKind::Movement])
            .unwrap();
        world.assign_program(id, &[0, 0]).unwrap();
        assert!(!world.units().contains(id));
        // The death is reported on the next tick for effect purposes.
        let events = world.tick(250);
        assert_eq!(events.deaths, vec![id]);
    }

    #[test]
    fn test_ranged_unit_hits_hq_for_ten() {
        let grid = Grid::open(40, 40);
        let hqs = vec![
            Hq::new(Cell::new(30, 5), PlayerColor::Blue),
            Hq::new(Cell::new(5, 10), PlayerColor::Red),
        ];
        let mut world = SimulationWorld::new(grid, hqs, 2, 1);
        let id = world
            .spawn_unit_at(0, Cell::new(5, 5), &[ModuleKind::RangedAttack])
            .unwrap();
        world.assign_program(id, &[2]).unwrap();
        let events = world.tick(100);
        assert_eq!(events.attacks.len(), 1);
        assert_eq!(events.attacks[0].kind, AttackKind::Ranged);
        assert_eq!(world.hqs()[1].hp, 990);
    }

    #[test]
    fn test_attack_cooldown_blocks_all_action() {
        let grid = Grid::open(40, 40);
        let hqs = vec![
            Hq::new(Cell::new(30, 5), PlayerColor::Blue),
            Hq::new(Cell::new(5, 10), PlayerColor::Red),
        ];
        let mut world = SimulationWorld::new(grid, hqs, 2, 1);
        let id = world
            .spawn_unit_at(0, Cell::new(5, 5), &[ModuleKind::RangedAttack, ModuleKind::Movement])
            .unwrap();
        world.assign_program(id, &[2]).unwrap();
        world.tick(100); // fires
        let events = world.tick(100); // 200ms < cooldown: frozen
        assert!(events.attacks.is_empty());
        assert!(events.moves.is_empty());
        let mut total = 200;
        while total < ATTACK_COOLDOWN_MS {
            world.tick(100);
            total += 100;
        }
        let events = world.tick(100);
        assert_eq!(events.attacks.len(), 1);
    }

    #[test]
    fn test_hq_destruction_cascades_and_declares_winner() {
        let mut world = two_player_world();
        let red_a = world
            .spawn_unit_at(1, Cell::new(20, 10), &[ModuleKind::Movement])
            .unwrap();
        let red_b = world
            .spawn_unit_at(1, Cell::new(22, 10), &[ModuleKind::Attack])
            .unwrap();
        let blue = world
            .spawn_unit_at(0, Cell::new(15, 15), &[ModuleKind::Movement])
            .unwrap();
        world.damage_hq(PlayerColor::Red, 1000).unwrap();
        assert!(!world.units().contains(red_a));
        assert!(!world.units().contains(red_b));
        assert!(world.units().contains(blue));
        assert_eq!(world.outcome(), Some(Outcome::Victory(PlayerColor::Blue)));
        let events = world.tick(250);
        assert!(events.deaths.contains(&red_a));
        assert!(events.deaths.contains(&red_b));
        assert_eq!(events.hqs_destroyed, vec![PlayerColor::Red]);
    }

    #[test]
    fn test_terminal_state_halts_ticks() {
        let mut world = two_player_world();
        world.damage_hq(PlayerColor::Red, 1000).unwrap();
        world.tick(250); // reports the cascade
        let now = world.now_ms();
        let tick = world.get_tick();
        let events = world.tick(250);
        assert_eq!(world.now_ms(), now);
        assert_eq!(world.get_tick(), tick);
        assert!(events.moves.is_empty());
        assert_eq!(events.outcome, Some(Outcome::Victory(PlayerColor::Blue)));
        assert!(matches!(
            world.spawn_unit(PlayerColor::Blue, &[ModuleKind::Movement]),
            Err(GameError::SimulationHalted)
        ));
    }

    #[test]
    fn test_enemy_hq_discovery_event_fires_once() {
        let mut world = two_player_world();
        let id = world
            .spawn_unit_at(0, Cell::new(26, 26), &[ModuleKind::Movement])
            .unwrap();
        world.assign_program(id, &[6]).unwrap();
        let events = world.tick(250);
        assert_eq!(events.discoveries.len(), 1);
        assert_eq!(events.discoveries[0].player, 0);
        assert_eq!(events.discoveries[0].hq.color, PlayerColor::Red);
        // Never re-announced.
        let events = world.tick(250);
        assert!(events.discoveries.is_empty());
    }

    #[test]
    fn test_conditional_attacks_when_enemy_near() {
        let mut world = two_player_world();
        let atk = world
            .spawn_unit_at(0, Cell::new(20, 10), &[ModuleKind::RangedAttack])
            .unwrap();
        let victim = world
            .spawn_unit_at(1, Cell::new(23, 10), &[ModuleKind::Movement])
            .unwrap();
        // explore IF enemy-nearby THEN attack
        world.assign_program(atk, &[6, 11, 5, 12, 15, 2]).unwrap();
        let events = world.tick(100);
        assert_eq!(events.attacks.len(), 1);
        assert_eq!(events.attacks[0].target, TargetRef::Unit(victim));
    }

    #[test]
    fn test_conditional_falls_back_to_preamble() {
        let mut world = two_player_world();
        let id = world
            .spawn_unit_at(0, Cell::new(20, 10), &[ModuleKind::Movement])
            .unwrap();
        world.assign_program(id, &[6, 11, 5, 12, 15, 2]).unwrap();
        // No enemy units and HQs are far: the condition fails, the
        // preamble explores.
        let events = world.tick(250);
        assert_eq!(events.moves.len(), 1);
    }

    #[test]
    fn test_determinism_same_seed_same_hash() {
        let build = || {
            let mut w = two_player_world();
            let a = w.spawn_unit(PlayerColor::Blue, &[ModuleKind::Movement]).unwrap();
            let b = w.spawn_unit(PlayerColor::Red, &[ModuleKind::Movement]).unwrap();
            w.assign_program(a, &[6]).unwrap();
            w.assign_program(b, &[6]).unwrap();
            for _ in 0..200 {
                w.tick(250);
            }
            w.state_hash()
        };
        assert_eq!(build(), build());
    }

    #[test]
    fn test_serialization_roundtrip() {
        let mut world = two_player_world();
        let id = world
            .spawn_unit(PlayerColor::Blue, &[ModuleKind::Movement])
            .unwrap();
        world.assign_program(id, &[6]).unwrap();
        for _ in 0..20 {
            world.tick(250);
        }
        let bytes = world.serialize().unwrap();
        let restored = SimulationWorld::deserialize(&bytes).unwrap();
        assert_eq!(world.state_hash(), restored.state_hash());
        // The restored world must keep simulating identically.
        let mut original = world;
        let mut copy = restored;
        for _ in 0..20 {
            original.tick(250);
            copy.tick(250);
        }
        assert_eq!(original.state_hash(), copy.state_hash());
    }

    #[test]
    fn test_initial_units_ring_hq() {
        let mut world = two_player_world();
        let ids = world
            .spawn_initial_units(PlayerColor::Blue, 3, &[ModuleKind::Movement])
            .unwrap();
        assert_eq!(ids.len(), 3);
        let hq_center = Cell::new(8, 8);
        for id in ids {
            let unit = world.units().get(id).unwrap();
            assert!(unit.pos.chebyshev(hq_center) <= HQ_HALF_SPAN + 2);
            assert!(unit.pos.chebyshev(hq_center) > HQ_HALF_SPAN);
        }
    }
}
