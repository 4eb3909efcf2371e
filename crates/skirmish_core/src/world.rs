//! Combined grid + HQ walkability queries.
//!
//! The map generator hands the simulation an opaque grid; HQ footprints are
//! stamped on top of it as permanently blocked. [`WorldView`] is the
//! read-only facade the planners consult.

use crate::grid::{Cell, Grid};
use crate::hq::{hq_cell_at, Hq};

/// Read-only view of static terrain: the grid plus live HQ footprints.
#[derive(Clone, Copy)]
pub struct WorldView<'a> {
    /// The wall/floor grid.
    pub grid: &'a Grid,
    /// Live headquarters.
    pub hqs: &'a [Hq],
}

impl WorldView<'_> {
    /// Whether the cell is inside the enterable interior.
    #[must_use]
    pub fn in_bounds(&self, cell: Cell) -> bool {
        self.grid.in_bounds(cell)
    }

    /// Whether any HQ footprint covers the cell.
    #[must_use]
    pub fn is_hq_cell(&self, cell: Cell) -> bool {
        hq_cell_at(self.hqs, cell)
    }

    /// Whether a unit may stand on the cell: in bounds, not wall, not HQ
    /// footprint. Occupancy by other units is a separate, transient check.
    #[must_use]
    pub fn is_walkable(&self, cell: Cell) -> bool {
        self.in_bounds(cell) && !self.grid.is_wall(cell) && !self.is_hq_cell(cell)
    }
}
