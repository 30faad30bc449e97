use std::{fmt, str::FromStr};

use serde::{Deserialize, Serialize};

pub mod action;
pub mod geometry;
pub mod grid;
pub mod mind;
pub mod observation;
pub mod scenario;
pub mod tick;
pub mod world;

pub use action::{Action, ActionError, Content, Decision, MESSAGE_SIZE_LIMIT, Message};
pub use geometry::{Coord, Orientation, Turn};
pub use grid::{Agent, Dirt, Grid, GridError, Location};
pub use mind::Mind;
pub use observation::Observation;
pub use tick::{Diagnostic, Inboxes, TickError, TickReport, tick};
pub use world::World;

/// Colour of an agent or a dirt item.
///
/// `User` marks the drop-only actor role; it never cleans and never appears on dirt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Colour {
    White,
    Green,
    Orange,
    User,
}

impl Colour {
    /// Colours a dirt item may carry.
    pub const DIRT: [Colour; 2] = [Colour::Green, Colour::Orange];

    pub fn is_dirt_colour(self) -> bool {
        matches!(self, Colour::Green | Colour::Orange)
    }

    /// Whether an agent of this colour is able to remove dirt of colour `dirt`.
    pub fn cleans(self, dirt: Colour) -> bool {
        match self {
            Colour::White => dirt.is_dirt_colour(),
            Colour::Green => dirt == Colour::Green,
            Colour::Orange => dirt == Colour::Orange,
            Colour::User => false,
        }
    }
}

/// Error returned when parsing an entity id from its textual form.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("invalid {kind} id '{text}'")]
pub struct ParseIdError {
    kind: &'static str,
    text: String,
}

macro_rules! entity_id {
    ($(#[$meta:meta])* $name:ident, $prefix:literal, $kind:literal) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        pub struct $name(pub u64);

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, concat!($prefix, "-{}"), self.0)
            }
        }

        impl FromStr for $name {
            type Err = ParseIdError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                s.strip_prefix(concat!($prefix, "-"))
                    .and_then(|n| n.parse().ok())
                    .map($name)
                    .ok_or_else(|| ParseIdError {
                        kind: $kind,
                        text: s.to_string(),
                    })
            }
        }
    };
}

entity_id!(
    /// Unique identifier of an agent, shown as `A-<n>`. Ordered by mint sequence.
    AgentId,
    "A",
    "agent"
);
entity_id!(
    /// Unique identifier of a dirt item, shown as `D-<n>`.
    DirtId,
    "D",
    "dirt"
);
