use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};

use crate::{
    AgentId, Colour,
    action::{
        Action, ActionError, MESSAGE_SIZE_LIMIT, Message, Speech, ValidDecision, bound_content,
    },
    geometry::Coord,
    grid::{Agent, Grid, GridError},
    mind::Mind,
    observation::observe,
};

/// Mind bindings keyed by the agent they drive.
pub type Minds = BTreeMap<AgentId, Box<dyn Mind>>;

/// Messages waiting to be perceived, per recipient.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Inboxes(BTreeMap<AgentId, Vec<Message>>);

impl Inboxes {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, recipient: AgentId, message: Message) {
        self.0.entry(recipient).or_default().push(message);
    }

    pub fn messages_for(&self, recipient: AgentId) -> &[Message] {
        self.0.get(&recipient).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn remove(&mut self, recipient: AgentId) -> Vec<Message> {
        self.0.remove(&recipient).unwrap_or_default()
    }

    /// Total number of queued messages across all recipients.
    pub fn len(&self) -> usize {
        self.0.values().map(Vec::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn iter(&self) -> impl Iterator<Item = (AgentId, &Message)> {
        self.0
            .iter()
            .flat_map(|(id, messages)| messages.iter().map(move |m| (*id, m)))
    }
}

/// Why a physical action had no effect. These are attempts, not errors.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FailureReason {
    /// The move target lies outside the grid.
    Wall,
    /// Another agent holds the move target.
    Blocked,
    NoDirt,
    IncompatibleColour,
    NotACleaner,
    NotAUser,
    DirtPresent,
}

/// Represents the outcome of processing an agent's physical action.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ActionOutcome {
    Success,
    Failure(FailureReason),
}

#[derive(Debug, Clone, PartialEq)]
pub struct ActionRecord {
    pub agent: AgentId,
    pub action: Action,
    pub outcome: ActionOutcome,
}

/// Per-agent problems surfaced to the driver. None of them stop the tick.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Diagnostic {
    /// The agent's decision failed validation; it did nothing this tick.
    Rejected { agent: AgentId, error: ActionError },
    MessageTruncated {
        agent: AgentId,
        original_size: usize,
        bounded_size: usize,
    },
}

impl Diagnostic {
    pub fn agent(&self) -> AgentId {
        match self {
            Diagnostic::Rejected { agent, .. } | Diagnostic::MessageTruncated { agent, .. } => {
                *agent
            }
        }
    }
}

/// Everything a tick produced besides the grid mutations.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TickReport {
    /// Messages to deliver at the start of the next tick.
    pub inboxes: Inboxes,
    pub diagnostics: Vec<Diagnostic>,
    /// Physical actions in execution order.
    pub outcomes: Vec<ActionRecord>,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TickError {
    #[error(transparent)]
    Grid(#[from] GridError),
}

/// Advances the world by one tick.
///
/// Every agent perceives the grid as it stood at the start of the tick, then every agent
/// decides, then decisions run one agent at a time in ascending id order against the grid as
/// earlier agents left it. Speech is queued for the next tick.
pub fn tick(
    grid: &mut Grid,
    minds: &mut Minds,
    mut inboxes: Inboxes,
) -> Result<TickReport, TickError> {
    grid.validate()?;

    let roster: Vec<(Coord, Agent)> = grid
        .agents()
        .into_iter()
        .map(|(at, agent)| (at, agent.clone()))
        .collect();
    let live: BTreeSet<AgentId> = roster.iter().map(|(_, agent)| agent.id).collect();

    for (at, agent) in &roster {
        let messages = inboxes.remove(agent.id);
        match minds.get_mut(&agent.id) {
            Some(mind) => mind.revise(&observe(grid, *at, agent.orientation), &messages),
            None => tracing::debug!(agent = %agent.id, "no mind bound, skipping"),
        }
    }

    let mut report = TickReport::default();
    let mut decisions: Vec<(AgentId, ValidDecision)> = Vec::with_capacity(roster.len());
    for (_, agent) in &roster {
        let Some(mind) = minds.get_mut(&agent.id) else {
            continue;
        };
        match mind.decide().validate() {
            Ok(decision) => decisions.push((agent.id, decision)),
            Err(error) => {
                tracing::warn!(agent = %agent.id, %error, "decision rejected");
                report.diagnostics.push(Diagnostic::Rejected {
                    agent: agent.id,
                    error,
                });
            }
        }
    }

    for (id, decision) in decisions {
        if let Some(action) = decision.physical {
            let outcome = execute(grid, id, &action)?;
            report.outcomes.push(ActionRecord {
                agent: id,
                action,
                outcome,
            });
        }
        if let Some(speech) = decision.speech {
            queue_speech(id, speech, &live, &mut report);
        }
    }

    tracing::debug!(
        agents = roster.len(),
        actions = report.outcomes.len(),
        rejected = report
            .diagnostics
            .iter()
            .filter(|d| matches!(d, Diagnostic::Rejected { .. }))
            .count(),
        queued = report.inboxes.len(),
        "tick complete"
    );
    Ok(report)
}

fn queue_speech(
    sender: AgentId,
    speech: Speech,
    live: &BTreeSet<AgentId>,
    report: &mut TickReport,
) {
    let original_size = speech.content.size();
    let (content, truncated) = bound_content(speech.content, MESSAGE_SIZE_LIMIT);
    if truncated {
        let bounded_size = content.size();
        tracing::warn!(agent = %sender, original_size, bounded_size, "message truncated");
        report.diagnostics.push(Diagnostic::MessageTruncated {
            agent: sender,
            original_size,
            bounded_size,
        });
    }

    let recipients: Vec<AgentId> = if speech.recipients.is_empty() {
        live.iter().copied().filter(|id| *id != sender).collect()
    } else {
        speech
            .recipients
            .iter()
            .copied()
            .filter(|id| {
                let known = live.contains(id);
                if !known {
                    tracing::debug!(
                        agent = %sender,
                        recipient = %id,
                        "dropping message to absent agent"
                    );
                }
                known
            })
            .collect()
    };

    for recipient in recipients {
        report.inboxes.push(
            recipient,
            Message {
                sender,
                content: content.clone(),
            },
        );
    }
}

/// Applies one physical action for the agent `id` against the current grid.
fn execute(grid: &mut Grid, id: AgentId, action: &Action) -> Result<ActionOutcome, GridError> {
    let at = grid.locate_agent(id).ok_or_else(|| {
        GridError::PreconditionViolated(format!("agent {} is not on the grid", id))
    })?;
    let (colour, orientation) = match grid.agent_at(at) {
        Some(agent) => (agent.colour, agent.orientation),
        None => return Err(GridError::PreconditionViolated(format!("no agent at {}", at))),
    };

    let outcome = match action {
        Action::Move => {
            let target = at + orientation.vector();
            if !grid.in_bounds(target) {
                ActionOutcome::Failure(FailureReason::Wall)
            } else if grid.agent_at(target).is_some() {
                ActionOutcome::Failure(FailureReason::Blocked)
            } else {
                grid.move_agent(at, target)?;
                ActionOutcome::Success
            }
        }
        Action::Turn(turn) => {
            grid.turn_agent(at, orientation.turn(*turn))?;
            ActionOutcome::Success
        }
        Action::Clean => match grid.dirt_at(at).map(|d| d.colour) {
            _ if colour == Colour::User => ActionOutcome::Failure(FailureReason::NotACleaner),
            None => ActionOutcome::Failure(FailureReason::NoDirt),
            Some(dirt) if !colour.cleans(dirt) => {
                ActionOutcome::Failure(FailureReason::IncompatibleColour)
            }
            Some(_) => {
                grid.remove_dirt(at)?;
                ActionOutcome::Success
            }
        },
        Action::Drop(dirt_colour) => {
            if colour != Colour::User {
                ActionOutcome::Failure(FailureReason::NotAUser)
            } else if grid.dirt_at(at).is_some() {
                ActionOutcome::Failure(FailureReason::DirtPresent)
            } else {
                let dirt = grid.mint_dirt(*dirt_colour)?;
                grid.place_dirt(at, dirt)?;
                ActionOutcome::Success
            }
        }
        Action::Idle => ActionOutcome::Success,
        // Speech never reaches here; it is queued by `queue_speech`.
        Action::Speak { .. } => ActionOutcome::Success,
    };
    Ok(outcome)
}

#[cfg(test)]
mod tests {
    use std::{
        cell::{Cell, RefCell},
        collections::VecDeque,
        rc::Rc,
    };

    use super::*;
    use crate::{
        action::{Content, Decision},
        geometry::{Orientation, Turn},
        observation::Observation,
    };

    type Heard = Rc<RefCell<Vec<Vec<Message>>>>;

    /// Plays back fixed decisions and records what it perceived.
    struct Scripted {
        plan: VecDeque<Decision>,
        inbox: Heard,
    }

    impl Mind for Scripted {
        fn revise(&mut self, _observation: &Observation, messages: &[Message]) {
            self.inbox.borrow_mut().push(messages.to_vec());
        }

        fn decide(&mut self) -> Decision {
            self.plan.pop_front().unwrap_or_default()
        }
    }

    /// Counts how often it is consulted and always moves.
    struct Counting(Rc<Cell<usize>>);

    impl Mind for Counting {
        fn revise(&mut self, _observation: &Observation, _messages: &[Message]) {
            self.0.set(self.0.get() + 1);
        }

        fn decide(&mut self) -> Decision {
            self.0.set(self.0.get() + 1);
            Decision::single(Action::Move)
        }
    }

    fn spawn(
        grid: &mut Grid,
        minds: &mut Minds,
        at: Coord,
        colour: Colour,
        facing: Orientation,
        plan: Vec<Decision>,
    ) -> (AgentId, Heard) {
        let agent = grid.mint_agent(colour, facing);
        let id = agent.id;
        grid.place_agent(at, agent).unwrap();
        let heard: Heard = Rc::default();
        minds.insert(
            id,
            Box::new(Scripted {
                plan: plan.into(),
                inbox: heard.clone(),
            }),
        );
        (id, heard)
    }

    fn drop_dirt(grid: &mut Grid, at: Coord, colour: Colour) {
        let dirt = grid.mint_dirt(colour).unwrap();
        grid.place_dirt(at, dirt).unwrap();
    }

    fn one(action: Action) -> Vec<Decision> {
        vec![Decision::single(action)]
    }

    #[test]
    fn clean_follows_colour_compatibility() {
        let cases = [
            (Colour::White, Colour::Green, true),
            (Colour::White, Colour::Orange, true),
            (Colour::Green, Colour::Green, true),
            (Colour::Green, Colour::Orange, false),
            (Colour::Orange, Colour::Orange, true),
            (Colour::Orange, Colour::Green, false),
            (Colour::User, Colour::Green, false),
            (Colour::User, Colour::Orange, false),
        ];
        for (agent_colour, dirt_colour, cleaned) in cases {
            let mut grid = Grid::new(3).unwrap();
            let mut minds = Minds::new();
            let at = Coord::new(1, 1);
            drop_dirt(&mut grid, at, dirt_colour);
            let plan = one(Action::Clean);
            spawn(&mut grid, &mut minds, at, agent_colour, Orientation::North, plan);
            let report = tick(&mut grid, &mut minds, Inboxes::new()).unwrap();
            assert_eq!(
                grid.dirt_at(at).is_none(),
                cleaned,
                "{agent_colour:?} on {dirt_colour:?}"
            );
            assert_eq!(report.outcomes[0].outcome == ActionOutcome::Success, cleaned);
        }
    }

    #[test]
    fn clean_without_dirt_is_a_silent_no_op() {
        let mut grid = Grid::new(3).unwrap();
        let mut minds = Minds::new();
        spawn(
            &mut grid,
            &mut minds,
            Coord::new(0, 0),
            Colour::White,
            Orientation::North,
            one(Action::Clean),
        );
        let report = tick(&mut grid, &mut minds, Inboxes::new()).unwrap();
        assert!(report.diagnostics.is_empty());
        assert_eq!(
            report.outcomes[0].outcome,
            ActionOutcome::Failure(FailureReason::NoDirt)
        );
    }

    #[test]
    fn move_is_blocked_by_agents_and_walls_but_not_dirt() {
        let mut grid = Grid::new(3).unwrap();
        let mut minds = Minds::new();
        drop_dirt(&mut grid, Coord::new(1, 0), Colour::Green);
        let (walker, _) = spawn(
            &mut grid,
            &mut minds,
            Coord::new(0, 0),
            Colour::Green,
            Orientation::East,
            one(Action::Move),
        );
        let (waller, _) = spawn(
            &mut grid,
            &mut minds,
            Coord::new(2, 2),
            Colour::White,
            Orientation::South,
            one(Action::Move),
        );
        let (stuck, _) = spawn(
            &mut grid,
            &mut minds,
            Coord::new(2, 1),
            Colour::White,
            Orientation::South,
            one(Action::Move),
        );

        let report = tick(&mut grid, &mut minds, Inboxes::new()).unwrap();
        assert_eq!(grid.locate_agent(walker), Some(Coord::new(1, 0)));
        assert_eq!(grid.locate_agent(waller), Some(Coord::new(2, 2)));
        assert_eq!(grid.locate_agent(stuck), Some(Coord::new(2, 1)));
        let outcomes: Vec<ActionOutcome> = report.outcomes.iter().map(|r| r.outcome).collect();
        assert_eq!(
            outcomes,
            vec![
                ActionOutcome::Success,
                ActionOutcome::Failure(FailureReason::Wall),
                ActionOutcome::Failure(FailureReason::Blocked),
            ]
        );
    }

    #[test]
    fn lower_id_wins_a_contested_cell() {
        let mut grid = Grid::new(3).unwrap();
        let mut minds = Minds::new();
        let (first, _) = spawn(
            &mut grid,
            &mut minds,
            Coord::new(0, 1),
            Colour::White,
            Orientation::East,
            one(Action::Move),
        );
        let (second, _) = spawn(
            &mut grid,
            &mut minds,
            Coord::new(2, 1),
            Colour::White,
            Orientation::West,
            one(Action::Move),
        );
        tick(&mut grid, &mut minds, Inboxes::new()).unwrap();
        assert_eq!(grid.locate_agent(first), Some(Coord::new(1, 1)));
        assert_eq!(grid.locate_agent(second), Some(Coord::new(2, 1)));
    }

    #[test]
    fn later_agents_see_earlier_moves() {
        let mut grid = Grid::new(4).unwrap();
        let mut minds = Minds::new();
        let (leader, _) = spawn(
            &mut grid,
            &mut minds,
            Coord::new(1, 0),
            Colour::White,
            Orientation::East,
            one(Action::Move),
        );
        let (follower, _) = spawn(
            &mut grid,
            &mut minds,
            Coord::new(0, 0),
            Colour::White,
            Orientation::East,
            one(Action::Move),
        );
        tick(&mut grid, &mut minds, Inboxes::new()).unwrap();
        assert_eq!(grid.locate_agent(leader), Some(Coord::new(2, 0)));
        assert_eq!(grid.locate_agent(follower), Some(Coord::new(1, 0)));
    }

    #[test]
    fn turn_rotates_in_place() {
        let mut grid = Grid::new(3).unwrap();
        let mut minds = Minds::new();
        let (id, _) = spawn(
            &mut grid,
            &mut minds,
            Coord::new(1, 1),
            Colour::Orange,
            Orientation::North,
            one(Action::Turn(Turn::Left)),
        );
        tick(&mut grid, &mut minds, Inboxes::new()).unwrap();
        let agent = grid.agent_at(Coord::new(1, 1)).unwrap();
        assert_eq!(agent.id, id);
        assert_eq!(agent.orientation, Orientation::West);
    }

    #[test]
    fn drop_requires_user_colour() {
        let mut grid = Grid::new(3).unwrap();
        let mut minds = Minds::new();
        spawn(
            &mut grid,
            &mut minds,
            Coord::new(0, 0),
            Colour::White,
            Orientation::North,
            one(Action::Drop(Colour::Green)),
        );
        let report = tick(&mut grid, &mut minds, Inboxes::new()).unwrap();
        assert_eq!(grid.dirt_count(), 0);
        assert_eq!(
            report.outcomes[0].outcome,
            ActionOutcome::Failure(FailureReason::NotAUser)
        );
    }

    #[test]
    fn explicit_recipients_only_reach_live_agents() {
        let mut grid = Grid::new(3).unwrap();
        let mut minds = Minds::new();
        let ghost = AgentId(99);
        let north = Orientation::North;
        spawn(&mut grid, &mut minds, Coord::new(0, 0), Colour::White, north, vec![]);
        let (target, _) = spawn(
            &mut grid,
            &mut minds,
            Coord::new(1, 0),
            Colour::White,
            north,
            vec![],
        );
        spawn(&mut grid, &mut minds, Coord::new(2, 0), Colour::White, north, vec![]);
        let (speaker, _) = spawn(
            &mut grid,
            &mut minds,
            Coord::new(2, 2),
            Colour::User,
            north,
            one(Action::speak_to("psst", [target, ghost])),
        );

        let report = tick(&mut grid, &mut minds, Inboxes::new()).unwrap();
        assert_eq!(report.inboxes.len(), 1);
        assert_eq!(
            report.inboxes.messages_for(target),
            &[Message {
                sender: speaker,
                content: Content::from("psst")
            }]
        );
    }

    #[test]
    fn oversized_message_is_truncated_and_reported() {
        let mut grid = Grid::new(3).unwrap();
        let mut minds = Minds::new();
        let (listener, _) = spawn(
            &mut grid,
            &mut minds,
            Coord::new(0, 0),
            Colour::White,
            Orientation::North,
            vec![],
        );
        let (speaker, _) = spawn(
            &mut grid,
            &mut minds,
            Coord::new(1, 1),
            Colour::White,
            Orientation::North,
            one(Action::broadcast("z".repeat(300))),
        );
        let report = tick(&mut grid, &mut minds, Inboxes::new()).unwrap();
        assert_eq!(
            report.diagnostics,
            vec![Diagnostic::MessageTruncated {
                agent: speaker,
                original_size: 300,
                bounded_size: MESSAGE_SIZE_LIMIT,
            }]
        );
        let delivered = report.inboxes.messages_for(listener);
        assert!(delivered[0].content.size() <= MESSAGE_SIZE_LIMIT);
    }

    #[test]
    fn agents_without_minds_stay_put() {
        let mut grid = Grid::new(3).unwrap();
        let mut minds = Minds::new();
        let idle = grid.mint_agent(Colour::White, Orientation::East);
        grid.place_agent(Coord::new(0, 0), idle).unwrap();
        let report = tick(&mut grid, &mut minds, Inboxes::new()).unwrap();
        assert!(report.outcomes.is_empty());
        assert_eq!(grid.agent_count(), 1);
    }

    #[test]
    fn duplicated_agent_fails_the_tick_before_any_mind_runs() {
        let mut grid = Grid::new(4).unwrap();
        let agent = grid.mint_agent(Colour::White, Orientation::East);
        let id = agent.id;
        grid.place_agent(Coord::new(0, 0), agent.clone()).unwrap();
        grid.force_agent(Coord::new(0, 3), agent);
        let before = grid.clone();

        let calls = Rc::new(Cell::new(0));
        let mut minds = Minds::new();
        minds.insert(id, Box::new(Counting(calls.clone())));

        let result = tick(&mut grid, &mut minds, Inboxes::new());
        assert!(matches!(
            result,
            Err(TickError::Grid(GridError::CorruptedGrid(_)))
        ));
        assert_eq!(calls.get(), 0);
        assert_eq!(grid, before);
    }

    #[test]
    fn each_agent_is_consulted_once_per_tick() {
        let mut grid = Grid::new(4).unwrap();
        let agent = grid.mint_agent(Colour::White, Orientation::East);
        let id = agent.id;
        grid.place_agent(Coord::new(0, 0), agent).unwrap();

        let calls = Rc::new(Cell::new(0));
        let mut minds = Minds::new();
        minds.insert(id, Box::new(Counting(calls.clone())));

        tick(&mut grid, &mut minds, Inboxes::new()).unwrap();
        assert_eq!(calls.get(), 2);
        assert_eq!(grid.locate_agent(id), Some(Coord::new(1, 0)));
    }
}
