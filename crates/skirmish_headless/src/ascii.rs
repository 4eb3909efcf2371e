//! ASCII rendering of a simulation state for terminal review.
//!
//! Walls are `#`, floor is space, HQ footprints print the owner's letter
//! in uppercase, units in lowercase.

use skirmish_core::grid::Cell;
use skirmish_core::hq::PlayerColor;
use skirmish_core::simulation::SimulationWorld;

fn color_letter(color: PlayerColor) -> char {
    match color {
        PlayerColor::Blue => 'B',
        PlayerColor::Red => 'R',
        PlayerColor::Purple => 'P',
        PlayerColor::Green => 'G',
    }
}

/// Render the world as one string, rows separated by newlines.
#[must_use]
pub fn render_ascii(world: &SimulationWorld) -> String {
    let grid = world.grid();
    let mut out = String::with_capacity((grid.cols() as usize + 1) * grid.rows() as usize);

    for y in 0..grid.rows() {
        for x in 0..grid.cols() {
            let cell = Cell::new(x, y);
            let unit = world.units().iter().find(|u| u.pos == cell);
            let hq = world.hqs().iter().find(|h| h.contains(cell));
            let ch = if let Some(unit) = unit {
                PlayerColor::from_player(unit.owner)
                    .map_or('?', |c| color_letter(c).to_ascii_lowercase())
            } else if let Some(hq) = hq {
                color_letter(hq.color)
            } else if grid.is_wall(cell) {
                '#'
            } else {
                ' '
            };
            out.push(ch);
        }
        out.push('\n');
    }
    out
}
