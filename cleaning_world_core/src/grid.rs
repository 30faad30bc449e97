use std::{collections::BTreeSet, fmt};

use serde::{Deserialize, Serialize};

use crate::{
    AgentId, Colour, DirtId,
    geometry::{Coord, Orientation},
};

/// Which half of a location an operation addressed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Slot {
    Agent,
    Dirt,
}

impl fmt::Display for Slot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Slot::Agent => f.write_str("agent"),
            Slot::Dirt => f.write_str("dirt"),
        }
    }
}

/// Represents errors that can occur within the grid operations.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum GridError {
    #[error("Grid dimension must be positive and small enough to index, got {dim}")]
    InvalidDimension { dim: i32 },
    #[error("Coordinate {coord} is out of bounds for a {dim}x{dim} grid")]
    OutOfBounds { coord: Coord, dim: i32 },
    #[error("The {slot} slot at {coord} is already occupied")]
    SlotOccupied { coord: Coord, slot: Slot },
    #[error("Precondition violated: {0}")]
    PreconditionViolated(String),
    #[error("{colour:?} is not a valid dirt colour")]
    InvalidColour { colour: Colour },
    #[error("Corrupted grid: {0}")]
    CorruptedGrid(String),
}

/// A mobile entity. Its position is whichever location holds it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Agent {
    pub id: AgentId,
    pub colour: Colour,
    pub orientation: Orientation,
}

/// A static dirt item, removed wholesale by cleaning.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Dirt {
    pub id: DirtId,
    pub colour: Colour,
}

/// One cell of the grid. Holds at most one agent and at most one dirt.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Location {
    pub coord: Coord,
    pub agent: Option<Agent>,
    pub dirt: Option<Dirt>,
}

impl Location {
    fn empty(coord: Coord) -> Self {
        Location {
            coord,
            agent: None,
            dirt: None,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.agent.is_none() && self.dirt.is_none()
    }
}

/// Square grid of locations and the sole owner of entity placement.
///
/// Cells are stored in a flat vector using row-major order. Every coordinate in
/// `[0, dim) x [0, dim)` has exactly one location; outside that range lie walls.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Grid {
    dim: i32,
    cells: Vec<Location>,
    agents_minted: u64,
    dirts_minted: u64,
}

impl Grid {
    /// Creates an empty `dim` x `dim` grid.
    ///
    /// `dim * dim` must fit in an `i32` and the cells must be allocatable.
    pub fn new(dim: i32) -> Result<Self, GridError> {
        let count = cell_count(dim).ok_or(GridError::InvalidDimension { dim })?;
        let mut cells = Vec::new();
        cells
            .try_reserve_exact(count)
            .map_err(|_| GridError::InvalidDimension { dim })?;
        for y in 0..dim {
            for x in 0..dim {
                cells.push(Location::empty(Coord::new(x, y)));
            }
        }
        Ok(Grid {
            dim,
            cells,
            agents_minted: 0,
            dirts_minted: 0,
        })
    }

    /// Discards every agent and dirt and starts over at the new dimension.
    ///
    /// On error the grid is left untouched.
    pub fn reset(&mut self, dim: i32) -> Result<(), GridError> {
        *self = Grid::new(dim)?;
        Ok(())
    }

    /// Installs an externally supplied snapshot in place of the current state.
    ///
    /// Counters are raised past any id found in the snapshot so later mints stay unique.
    pub fn replace_all(&mut self, mut snapshot: Grid) -> Result<(), GridError> {
        snapshot.validate()?;
        for location in &snapshot.cells {
            if let Some(agent) = &location.agent {
                snapshot.agents_minted = snapshot.agents_minted.max(agent.id.0 + 1);
            }
            if let Some(dirt) = &location.dirt {
                snapshot.dirts_minted = snapshot.dirts_minted.max(dirt.id.0 + 1);
            }
        }
        *self = snapshot;
        Ok(())
    }

    /// Checks the structural invariants: one location per in-bounds coordinate in row-major
    /// order, and no agent or dirt id placed twice.
    pub fn validate(&self) -> Result<(), GridError> {
        let Some(expected) = cell_count(self.dim) else {
            return Err(GridError::CorruptedGrid(format!(
                "unusable dimension {}",
                self.dim
            )));
        };
        if self.cells.len() != expected {
            return Err(GridError::CorruptedGrid(format!(
                "expected {} cells for dimension {}, found {}",
                expected,
                self.dim,
                self.cells.len()
            )));
        }
        let mut agents = BTreeSet::new();
        let mut dirts = BTreeSet::new();
        for (index, location) in self.cells.iter().enumerate() {
            let coord = self.index_to_coord(index);
            if location.coord != coord {
                return Err(GridError::CorruptedGrid(format!(
                    "cell {} claims coordinate {} but sits at {}",
                    index, location.coord, coord
                )));
            }
            if let Some(agent) = &location.agent {
                if !agents.insert(agent.id) {
                    return Err(GridError::CorruptedGrid(format!(
                        "agent {} appears more than once",
                        agent.id
                    )));
                }
            }
            if let Some(dirt) = &location.dirt {
                if !dirts.insert(dirt.id) {
                    return Err(GridError::CorruptedGrid(format!(
                        "dirt {} appears more than once",
                        dirt.id
                    )));
                }
            }
        }
        Ok(())
    }

    /// Side length of the grid.
    #[inline]
    pub fn dim(&self) -> i32 {
        self.dim
    }

    #[inline]
    pub fn in_bounds(&self, coord: Coord) -> bool {
        coord.x >= 0 && coord.x < self.dim && coord.y >= 0 && coord.y < self.dim
    }

    #[inline]
    fn coord_to_index(&self, coord: Coord) -> Option<usize> {
        if self.in_bounds(coord) {
            Some(coord.y as usize * self.dim as usize + coord.x as usize)
        } else {
            None
        }
    }

    #[inline]
    fn index_to_coord(&self, index: usize) -> Coord {
        let dim = self.dim as usize;
        Coord::new((index % dim) as i32, (index / dim) as i32)
    }

    fn out_of_bounds(&self, coord: Coord) -> GridError {
        GridError::OutOfBounds {
            coord,
            dim: self.dim,
        }
    }

    /// Returns the location at `coord`, or `None` for a wall.
    pub fn location(&self, coord: Coord) -> Option<&Location> {
        let index = self.coord_to_index(coord)?;
        self.cells.get(index)
    }

    fn location_mut(&mut self, coord: Coord) -> Result<&mut Location, GridError> {
        let index = self
            .coord_to_index(coord)
            .ok_or_else(|| self.out_of_bounds(coord))?;
        self.cells
            .get_mut(index)
            .ok_or_else(|| GridError::CorruptedGrid(format!("missing cell for {}", coord)))
    }

    /// Returns an iterator over all locations in row-major order.
    pub fn locations(&self) -> impl Iterator<Item = &Location> {
        self.cells.iter()
    }

    pub fn agent_at(&self, coord: Coord) -> Option<&Agent> {
        self.location(coord).and_then(|l| l.agent.as_ref())
    }

    pub fn dirt_at(&self, coord: Coord) -> Option<&Dirt> {
        self.location(coord).and_then(|l| l.dirt.as_ref())
    }

    /// All placed agents with their coordinates, in ascending id order.
    pub fn agents(&self) -> Vec<(Coord, &Agent)> {
        let mut agents: Vec<(Coord, &Agent)> = self
            .cells
            .iter()
            .filter_map(|l| l.agent.as_ref().map(|a| (l.coord, a)))
            .collect();
        agents.sort_by_key(|(_, agent)| agent.id);
        agents
    }

    /// All placed dirt with their coordinates, in row-major order.
    pub fn dirts(&self) -> impl Iterator<Item = (Coord, &Dirt)> {
        self.cells
            .iter()
            .filter_map(|l| l.dirt.as_ref().map(|d| (l.coord, d)))
    }

    pub fn locate_agent(&self, id: AgentId) -> Option<Coord> {
        self.cells
            .iter()
            .find(|l| l.agent.as_ref().is_some_and(|a| a.id == id))
            .map(|l| l.coord)
    }

    pub fn locate_dirt(&self, id: DirtId) -> Option<Coord> {
        self.cells
            .iter()
            .find(|l| l.dirt.as_ref().is_some_and(|d| d.id == id))
            .map(|l| l.coord)
    }

    /// Fails if agent `id` already stands somewhere other than `coord`.
    fn check_agent_unplaced(&self, id: AgentId, coord: Coord) -> Result<(), GridError> {
        match self.locate_agent(id) {
            Some(existing) if existing != coord => Err(GridError::PreconditionViolated(format!(
                "agent {} is already placed at {}",
                id, existing
            ))),
            _ => Ok(()),
        }
    }

    fn check_dirt_unplaced(&self, id: DirtId, coord: Coord) -> Result<(), GridError> {
        match self.locate_dirt(id) {
            Some(existing) if existing != coord => Err(GridError::PreconditionViolated(format!(
                "dirt {} is already placed at {}",
                id, existing
            ))),
            _ => Ok(()),
        }
    }

    pub fn agent_count(&self) -> usize {
        self.cells.iter().filter(|l| l.agent.is_some()).count()
    }

    pub fn dirt_count(&self) -> usize {
        self.cells.iter().filter(|l| l.dirt.is_some()).count()
    }

    /// Total agents ever minted on this grid (never decreases until a reset).
    pub fn agents_minted(&self) -> u64 {
        self.agents_minted
    }

    pub fn dirts_minted(&self) -> u64 {
        self.dirts_minted
    }

    /// Creates a new agent with a fresh id. The agent is not placed.
    pub fn mint_agent(&mut self, colour: Colour, orientation: Orientation) -> Agent {
        let id = AgentId(self.agents_minted);
        self.agents_minted += 1;
        Agent {
            id,
            colour,
            orientation,
        }
    }

    /// Creates a new dirt with a fresh id. Only green and orange dirt exists.
    pub fn mint_dirt(&mut self, colour: Colour) -> Result<Dirt, GridError> {
        if !colour.is_dirt_colour() {
            return Err(GridError::InvalidColour { colour });
        }
        let id = DirtId(self.dirts_minted);
        self.dirts_minted += 1;
        Ok(Dirt { id, colour })
    }

    /// Puts `agent` into the empty agent slot at `coord`. The agent must not already be placed.
    pub fn place_agent(&mut self, coord: Coord, agent: Agent) -> Result<(), GridError> {
        self.check_agent_unplaced(agent.id, coord)?;
        let location = self.location_mut(coord)?;
        if location.agent.is_some() {
            return Err(GridError::SlotOccupied {
                coord,
                slot: Slot::Agent,
            });
        }
        location.agent = Some(agent);
        Ok(())
    }

    pub fn place_dirt(&mut self, coord: Coord, dirt: Dirt) -> Result<(), GridError> {
        self.check_dirt_unplaced(dirt.id, coord)?;
        let location = self.location_mut(coord)?;
        if location.dirt.is_some() {
            return Err(GridError::SlotOccupied {
                coord,
                slot: Slot::Dirt,
            });
        }
        location.dirt = Some(dirt);
        Ok(())
    }

    /// Overwrites the agent slot, returning whatever was there.
    ///
    /// The agent may already occupy `coord` but no other location.
    pub fn replace_agent(
        &mut self,
        coord: Coord,
        agent: Agent,
    ) -> Result<Option<Agent>, GridError> {
        self.check_agent_unplaced(agent.id, coord)?;
        let next = agent.id.0 + 1;
        let previous = self.location_mut(coord)?.agent.replace(agent);
        self.agents_minted = self.agents_minted.max(next);
        Ok(previous)
    }

    /// Overwrites the dirt slot, returning whatever was there.
    pub fn replace_dirt(&mut self, coord: Coord, dirt: Dirt) -> Result<Option<Dirt>, GridError> {
        if !dirt.colour.is_dirt_colour() {
            return Err(GridError::InvalidColour {
                colour: dirt.colour,
            });
        }
        self.check_dirt_unplaced(dirt.id, coord)?;
        let next = dirt.id.0 + 1;
        let previous = self.location_mut(coord)?.dirt.replace(dirt);
        self.dirts_minted = self.dirts_minted.max(next);
        Ok(previous)
    }

    /// Moves the agent at `from` to `to`. `to` must not hold an agent.
    pub fn move_agent(&mut self, from: Coord, to: Coord) -> Result<(), GridError> {
        if self.agent_at(to).is_some() {
            return Err(GridError::PreconditionViolated(format!(
                "destination {} already holds an agent",
                to
            )));
        }
        if !self.in_bounds(to) {
            return Err(self.out_of_bounds(to));
        }
        let agent = self.location_mut(from)?.agent.take().ok_or_else(|| {
            GridError::PreconditionViolated(format!("no agent at {}", from))
        })?;
        self.location_mut(to)?.agent = Some(agent);
        Ok(())
    }

    /// Rewrites the orientation of the agent at `coord`, keeping identity and colour.
    pub fn turn_agent(&mut self, coord: Coord, orientation: Orientation) -> Result<(), GridError> {
        let agent = self
            .location_mut(coord)?
            .agent
            .as_mut()
            .ok_or_else(|| GridError::PreconditionViolated(format!("no agent at {}", coord)))?;
        agent.orientation = orientation;
        Ok(())
    }

    /// Clears the agent slot. Removing from an empty slot is a no-op.
    pub fn remove_agent(&mut self, coord: Coord) -> Result<Option<Agent>, GridError> {
        Ok(self.location_mut(coord)?.agent.take())
    }

    /// Clears the dirt slot. Removing from an empty slot is a no-op.
    pub fn remove_dirt(&mut self, coord: Coord) -> Result<Option<Dirt>, GridError> {
        Ok(self.location_mut(coord)?.dirt.take())
    }

    /// Writes the agent slot with no checks at all, for building corrupted grids in tests.
    #[cfg(test)]
    pub(crate) fn force_agent(&mut self, coord: Coord, agent: Agent) {
        if let Ok(location) = self.location_mut(coord) {
            location.agent = Some(agent);
        }
    }
}

/// Number of cells in a `dim` x `dim` grid, if `dim` is positive and `dim * dim` fits an `i32`.
fn cell_count(dim: i32) -> Option<usize> {
    if dim <= 0 {
        return None;
    }
    dim.checked_mul(dim).map(|cells| cells as usize)
}
