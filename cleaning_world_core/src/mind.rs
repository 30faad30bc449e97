use std::collections::BTreeSet;

use rand::{Rng, SeedableRng, rngs::StdRng};

use crate::{
    Colour, DirtId,
    action::{Action, Content, Decision, Message},
    geometry::{Coord, Turn},
    grid::Location,
    observation::{Observation, RelativeSlot},
};

/// Trait defining the decision making bound to one agent.
///
/// Each tick the executor first calls `revise` with what the agent perceives and the messages
/// sent to it during the previous tick, then asks for a `decide`.
pub trait Mind {
    /// Takes in this tick's observation and inbox.
    fn revise(&mut self, observation: &Observation, messages: &[Message]);

    /// Returns nothing, one action, or one physical action paired with one `Speak`.
    fn decide(&mut self) -> Decision;
}

fn colour_name(colour: Colour) -> &'static str {
    match colour {
        Colour::White => "white",
        Colour::Green => "green",
        Colour::Orange => "orange",
        Colour::User => "user",
    }
}

/// Picks actions uniformly at random from those its colour can use.
#[derive(Debug)]
pub struct RandomMind {
    colour: Colour,
    rng: StdRng,
    position: Option<Coord>,
}

impl RandomMind {
    pub fn new(colour: Colour, seed: u64) -> Self {
        Self {
            colour,
            rng: StdRng::seed_from_u64(seed),
            position: None,
        }
    }

    fn physical(&mut self) -> Action {
        let last = if self.colour == Colour::User {
            Action::Drop(Colour::DIRT[self.rng.random_range(0..Colour::DIRT.len())])
        } else {
            Action::Clean
        };
        match self.rng.random_range(0..5) {
            0 => Action::Move,
            1 => Action::Turn(Turn::Left),
            2 => Action::Turn(Turn::Right),
            3 => Action::Idle,
            _ => last,
        }
    }
}

impl Mind for RandomMind {
    fn revise(&mut self, observation: &Observation, _messages: &[Message]) {
        self.position = observation.center.as_ref().map(|l| l.coord);
    }

    fn decide(&mut self) -> Decision {
        let action = self.physical();
        match self.position {
            Some(at) if self.rng.random_bool(0.1) => Decision::pair(
                action,
                Action::broadcast(vec![
                    Content::from("at"),
                    Content::Int(at.x.into()),
                    Content::Int(at.y.into()),
                ]),
            ),
            _ => Decision::single(action),
        }
    }
}

/// A cleaner that heads for dirt it can remove and tells others about dirt it cannot.
///
/// Dirt that a peer has already announced is not announced again.
#[derive(Debug)]
pub struct GreedyCleaner {
    colour: Colour,
    observation: Option<Observation>,
    reported: BTreeSet<DirtId>,
    announced: BTreeSet<Coord>,
}

impl GreedyCleaner {
    pub fn new(colour: Colour) -> Self {
        Self {
            colour,
            observation: None,
            reported: BTreeSet::new(),
            announced: BTreeSet::new(),
        }
    }

    /// Remembers the coordinates carried by `["dirt", colour, slot, x, y]` reports.
    fn hear(&mut self, message: &Message) {
        let Content::Seq(items) = &message.content else {
            return;
        };
        if let [Content::Str(tag), _, _, Content::Int(x), Content::Int(y)] = items.as_slice() {
            if tag == "dirt" {
                if let (Ok(x), Ok(y)) = (i32::try_from(*x), i32::try_from(*y)) {
                    self.announced.insert(Coord::new(x, y));
                }
            }
        }
    }

    fn can_clean(&self, location: Option<&Location>) -> bool {
        location
            .and_then(|l| l.dirt.as_ref())
            .is_some_and(|d| self.colour.cleans(d.colour))
    }

    fn physical(&self, obs: &Observation) -> Action {
        let free = |l: Option<&Location>| l.is_some_and(|l| l.agent.is_none());

        if self.can_clean(obs.center.as_ref()) {
            return Action::Clean;
        }
        if self.can_clean(obs.forward.as_ref()) && free(obs.forward.as_ref()) {
            return Action::Move;
        }
        if self.can_clean(obs.forward_left.as_ref()) || self.can_clean(obs.left.as_ref()) {
            return Action::Turn(Turn::Left);
        }
        if self.can_clean(obs.forward_right.as_ref()) || self.can_clean(obs.right.as_ref()) {
            return Action::Turn(Turn::Right);
        }
        if free(obs.forward.as_ref()) {
            Action::Move
        } else {
            Action::Turn(Turn::Right)
        }
    }

    /// First dirt in view that this cleaner cannot remove and has not reported yet.
    fn unreported_dirt(&self, obs: &Observation) -> Option<(RelativeSlot, Coord, Colour, DirtId)> {
        obs.slots().into_iter().find_map(|(slot, location)| {
            let location = location?;
            let dirt = location.dirt.as_ref()?;
            if self.colour.cleans(dirt.colour)
                || self.reported.contains(&dirt.id)
                || self.announced.contains(&location.coord)
            {
                None
            } else {
                Some((slot, location.coord, dirt.colour, dirt.id))
            }
        })
    }
}

impl Mind for GreedyCleaner {
    fn revise(&mut self, observation: &Observation, messages: &[Message]) {
        for message in messages {
            self.hear(message);
        }
        self.observation = Some(observation.clone());
    }

    fn decide(&mut self) -> Decision {
        let Some(obs) = self.observation.take() else {
            return Decision::none();
        };
        let action = self.physical(&obs);

        match self.unreported_dirt(&obs) {
            Some((slot, at, colour, id)) => {
                self.reported.insert(id);
                Decision::pair(
                    action,
                    Action::broadcast(vec![
                        Content::from("dirt"),
                        Content::from(colour_name(colour)),
                        Content::from(slot.label()),
                        Content::Int(at.x.into()),
                        Content::Int(at.y.into()),
                    ]),
                )
            }
            None => Decision::single(action),
        }
    }
}
