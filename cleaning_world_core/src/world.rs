use crate::{
    AgentId, Colour,
    geometry::{Coord, Orientation},
    grid::{Agent, Grid, GridError, Slot},
    mind::Mind,
    tick::{Inboxes, Minds, TickError, TickReport, tick},
};

/// Manages the simulation: the grid, the minds driving its agents, and pending messages.
pub struct World {
    grid: Grid,
    minds: Minds,
    inboxes: Inboxes,
    ticks: u64,
}

impl World {
    /// Creates a new, empty world.
    pub fn new(dim: i32) -> Result<Self, GridError> {
        Ok(World {
            grid: Grid::new(dim)?,
            minds: Minds::new(),
            inboxes: Inboxes::new(),
            ticks: 0,
        })
    }

    pub fn grid(&self) -> &Grid {
        &self.grid
    }

    /// Messages that will be perceived on the next step.
    pub fn inboxes(&self) -> &Inboxes {
        &self.inboxes
    }

    /// Number of completed ticks since creation or the last reset.
    pub fn ticks(&self) -> u64 {
        self.ticks
    }

    pub fn has_mind(&self, id: AgentId) -> bool {
        self.minds.contains_key(&id)
    }

    /// Mints an agent, places it at `at` and binds `mind` to it.
    pub fn spawn_agent(
        &mut self,
        at: Coord,
        colour: Colour,
        orientation: Orientation,
        mind: Box<dyn Mind>,
    ) -> Result<AgentId, GridError> {
        if !self.grid.in_bounds(at) {
            return Err(GridError::OutOfBounds {
                coord: at,
                dim: self.grid.dim(),
            });
        }
        if self.grid.agent_at(at).is_some() {
            return Err(GridError::SlotOccupied {
                coord: at,
                slot: Slot::Agent,
            });
        }
        let agent = self.grid.mint_agent(colour, orientation);
        let id = agent.id;
        self.grid.place_agent(at, agent)?;
        self.minds.insert(id, mind);
        Ok(id)
    }

    /// Mints a dirt and places it at `at`.
    pub fn spawn_dirt(&mut self, at: Coord, colour: Colour) -> Result<(), GridError> {
        if !self.grid.in_bounds(at) {
            return Err(GridError::OutOfBounds {
                coord: at,
                dim: self.grid.dim(),
            });
        }
        if self.grid.dirt_at(at).is_some() {
            return Err(GridError::SlotOccupied {
                coord: at,
                slot: Slot::Dirt,
            });
        }
        let dirt = self.grid.mint_dirt(colour)?;
        self.grid.place_dirt(at, dirt)
    }

    /// Binds `mind` to `id`, returning the mind it replaces.
    pub fn bind_mind(&mut self, id: AgentId, mind: Box<dyn Mind>) -> Option<Box<dyn Mind>> {
        self.minds.insert(id, mind)
    }

    /// Removes the agent at `at` along with its mind and pending messages.
    pub fn remove_agent(&mut self, at: Coord) -> Result<Option<Agent>, GridError> {
        let removed = self.grid.remove_agent(at)?;
        if let Some(agent) = &removed {
            self.minds.remove(&agent.id);
            self.inboxes.remove(agent.id);
        }
        Ok(removed)
    }

    /// Starts over with an empty grid of the given dimension.
    pub fn reset(&mut self, dim: i32) -> Result<(), GridError> {
        self.grid.reset(dim)?;
        self.minds.clear();
        self.inboxes = Inboxes::new();
        self.ticks = 0;
        Ok(())
    }

    /// Installs an external grid snapshot. Minds of agents absent from it are dropped and
    /// pending messages are discarded.
    pub fn replace_grid(&mut self, snapshot: Grid) -> Result<(), GridError> {
        self.grid.replace_all(snapshot)?;
        let grid = &self.grid;
        self.minds.retain(|id, _| grid.locate_agent(*id).is_some());
        self.inboxes = Inboxes::new();
        Ok(())
    }

    /// Runs one tick. On error nothing has changed.
    pub fn step(&mut self) -> Result<TickReport, TickError> {
        let report = tick(&mut self.grid, &mut self.minds, self.inboxes.clone())?;
        self.inboxes = report.inboxes.clone();
        self.ticks += 1;
        tracing::debug!(tick = self.ticks, dirt = self.grid.dirt_count(), "world stepped");
        Ok(report)
    }
}
