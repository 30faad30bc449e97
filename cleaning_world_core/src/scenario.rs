use rand::{Rng, SeedableRng, rngs::StdRng, seq::SliceRandom};
use serde::{Deserialize, Serialize};

use crate::{
    Colour,
    geometry::{Coord, Orientation},
    grid::GridError,
    mind::{GreedyCleaner, Mind, RandomMind},
    world::World,
};

/// How many of each entity to scatter over a fresh grid.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScenarioConfig {
    pub dim: i32,
    pub white: usize,
    pub green: usize,
    pub orange: usize,
    /// Drop-only agents driven by a [`RandomMind`].
    pub users: usize,
    pub dirts: usize,
    pub seed: u64,
}

impl Default for ScenarioConfig {
    fn default() -> Self {
        ScenarioConfig {
            dim: 8,
            white: 1,
            green: 1,
            orange: 1,
            users: 1,
            dirts: 6,
            seed: 0,
        }
    }
}

impl ScenarioConfig {
    pub fn agent_count(&self) -> usize {
        self.white + self.green + self.orange + self.users
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ScenarioError {
    #[error(transparent)]
    Grid(#[from] GridError),
    #[error("Scenario asks for {requested} {what} but a {dim}x{dim} grid has only {cells} cells")]
    TooCrowded {
        what: &'static str,
        requested: usize,
        dim: i32,
        cells: usize,
    },
}

/// Builds a world from `config`, placing every entity on a distinct random cell.
///
/// The same config always yields the same world.
pub fn populate(config: &ScenarioConfig) -> Result<World, ScenarioError> {
    let mut world = World::new(config.dim)?;
    let cells = (config.dim as usize) * (config.dim as usize);
    for (what, requested) in [("agents", config.agent_count()), ("dirts", config.dirts)] {
        if requested > cells {
            return Err(ScenarioError::TooCrowded {
                what,
                requested,
                dim: config.dim,
                cells,
            });
        }
    }

    let mut rng = StdRng::seed_from_u64(config.seed);
    let mut coords: Vec<Coord> = (0..config.dim)
        .flat_map(|y| (0..config.dim).map(move |x| Coord::new(x, y)))
        .collect();

    let roles = [
        (Colour::White, config.white),
        (Colour::Green, config.green),
        (Colour::Orange, config.orange),
        (Colour::User, config.users),
    ];
    coords.shuffle(&mut rng);
    let mut free = coords.iter().copied();
    for (colour, count) in roles {
        for _ in 0..count {
            let Some(at) = free.next() else {
                break;
            };
            let orientation = Orientation::ALL[rng.random_range(0..Orientation::ALL.len())];
            let mind: Box<dyn Mind> = match colour {
                Colour::User => Box::new(RandomMind::new(colour, rng.random())),
                _ => Box::new(GreedyCleaner::new(colour)),
            };
            world.spawn_agent(at, colour, orientation, mind)?;
        }
    }

    coords.shuffle(&mut rng);
    for at in coords.into_iter().take(config.dirts) {
        let colour = Colour::DIRT[rng.random_range(0..Colour::DIRT.len())];
        world.spawn_dirt(at, colour)?;
    }

    tracing::info!(
        dim = config.dim,
        agents = world.grid().agent_count(),
        dirts = world.grid().dirt_count(),
        seed = config.seed,
        "scenario populated"
    );
    Ok(world)
}
