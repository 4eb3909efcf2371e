//! Per-player shared fog-of-war memory.
//!
//! Every unit a player owns reads and writes the same map: walls bumped
//! into by one scout steer every later unit. The map only ever grows; there
//! is no forgetting.

use std::collections::{HashMap, HashSet};

use serde::{Deserialize, Serialize};

use crate::grid::Cell;
use crate::hq::HqKey;

/// One player's accumulated knowledge of the map.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct KnowledgeMap {
    known_walls: HashSet<Cell>,
    known_free: HashSet<Cell>,
    visit_counts: HashMap<Cell, u32>,
    discovered_hqs: HashSet<HqKey>,
}

impl KnowledgeMap {
    /// Create an empty map.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a cell observed to be blocked.
    pub fn record_wall(&mut self, cell: Cell) {
        self.known_walls.insert(cell);
    }

    /// Record a cell observed to be free.
    pub fn record_free(&mut self, cell: Cell) {
        self.known_free.insert(cell);
    }

    /// Bump the visit count of a cell.
    pub fn record_visit(&mut self, cell: Cell) {
        *self.visit_counts.entry(cell).or_insert(0) += 1;
    }

    /// Whether the cell is known to be blocked.
    #[must_use]
    pub fn knows_wall(&self, cell: Cell) -> bool {
        self.known_walls.contains(&cell)
    }

    /// Whether the cell is known to be free.
    #[must_use]
    pub fn knows_free(&self, cell: Cell) -> bool {
        self.known_free.contains(&cell)
    }

    /// Whether anything has been recorded free yet. Approach planning only
    /// restricts itself to known territory once there is some.
    #[must_use]
    pub fn has_any_free(&self) -> bool {
        !self.known_free.is_empty()
    }

    /// Times the cell has been stood on by this player's units.
    #[must_use]
    pub fn visits(&self, cell: Cell) -> u32 {
        self.visit_counts.get(&cell).copied().unwrap_or(0)
    }

    /// Record an enemy HQ sighting. Returns `true` the first time.
    pub fn discover_hq(&mut self, key: HqKey) -> bool {
        self.discovered_hqs.insert(key)
    }

    /// Whether the HQ has been discovered.
    #[must_use]
    pub fn knows_hq(&self, key: HqKey) -> bool {
        self.discovered_hqs.contains(&key)
    }

    /// All discovered enemy HQs (iteration order is not deterministic;
    /// callers that care must sort).
    pub fn discovered_hqs(&self) -> impl Iterator<Item = &HqKey> {
        self.discovered_hqs.iter()
    }

    /// Known-free cells, for fog-of-war presentation.
    pub fn free_cells(&self) -> impl Iterator<Item = &Cell> {
        self.known_free.iter()
    }

    /// Known-wall cells, for fog-of-war presentation.
    pub fn wall_cells(&self) -> impl Iterator<Item = &Cell> {
        self.known_walls.iter()
    }

    /// Number of cells known free.
    #[must_use]
    pub fn free_count(&self) -> usize {
        self.known_free.len()
    }

    /// Number of cells known blocked.
    #[must_use]
    pub fn wall_count(&self) -> usize {
        self.known_walls.len()
    }

    /// Visit counts, for hashing and tooling.
    #[must_use]
    pub fn visit_counts(&self) -> &HashMap<Cell, u32> {
        &self.visit_counts
    }
}
