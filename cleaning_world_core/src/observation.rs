use serde::{Deserialize, Serialize};

use crate::{
    geometry::{Coord, Orientation},
    grid::{Grid, Location},
};

/// The six cells an agent perceives, relative to its own facing.
///
/// A slot is `None` when the cell lies outside the grid (a wall).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Observation {
    pub center: Option<Location>,
    pub left: Option<Location>,
    pub right: Option<Location>,
    pub forward: Option<Location>,
    pub forward_left: Option<Location>,
    pub forward_right: Option<Location>,
}

impl Observation {
    /// Slots in a fixed order, labelled for minds that want to scan them.
    pub fn slots(&self) -> [(RelativeSlot, Option<&Location>); 6] {
        [
            (RelativeSlot::Center, self.center.as_ref()),
            (RelativeSlot::Left, self.left.as_ref()),
            (RelativeSlot::Right, self.right.as_ref()),
            (RelativeSlot::Forward, self.forward.as_ref()),
            (RelativeSlot::ForwardLeft, self.forward_left.as_ref()),
            (RelativeSlot::ForwardRight, self.forward_right.as_ref()),
        ]
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum RelativeSlot {
    Center,
    Left,
    Right,
    Forward,
    ForwardLeft,
    ForwardRight,
}

impl RelativeSlot {
    pub fn label(self) -> &'static str {
        match self {
            RelativeSlot::Center => "center",
            RelativeSlot::Left => "left",
            RelativeSlot::Right => "right",
            RelativeSlot::Forward => "forward",
            RelativeSlot::ForwardLeft => "forward-left",
            RelativeSlot::ForwardRight => "forward-right",
        }
    }
}

/// Builds the observation of an agent standing at `at` and facing `orientation`.
pub fn observe(grid: &Grid, at: Coord, orientation: Orientation) -> Observation {
    let forward = orientation.vector();
    let left = orientation.left().vector();
    let right = orientation.right().vector();
    let look = |c: Coord| grid.location(c).cloned();

    Observation {
        center: look(at),
        left: look(at + left),
        right: look(at + right),
        forward: look(at + forward),
        forward_left: look(at + forward + left),
        forward_right: look(at + forward + right),
    }
}
