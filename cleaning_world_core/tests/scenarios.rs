use std::{cell::RefCell, collections::VecDeque, rc::Rc};

use cleaning_world_core::{
    Action, ActionError, AgentId, Colour, Content, Coord, Decision, Diagnostic, Grid, Inboxes,
    Message, Mind, Observation, Orientation, World,
    tick::{ActionOutcome, FailureReason, Minds},
};

type Log = Rc<RefCell<Vec<Vec<Message>>>>;

/// Plays back a fixed list of decisions, then idles.
struct Scripted {
    plan: VecDeque<Decision>,
    heard: Log,
}

impl Scripted {
    fn boxed(plan: Vec<Decision>) -> (Box<dyn Mind>, Log) {
        let heard = Log::default();
        let mind = Scripted {
            plan: plan.into(),
            heard: heard.clone(),
        };
        (Box::new(mind), heard)
    }
}

impl Mind for Scripted {
    fn revise(&mut self, _observation: &Observation, messages: &[Message]) {
        self.heard.borrow_mut().push(messages.to_vec());
    }

    fn decide(&mut self) -> Decision {
        self.plan.pop_front().unwrap_or_default()
    }
}

#[test]
fn orange_agent_moves_east() {
    let mut world = World::new(4).expect("world");
    let (mind, _) = Scripted::boxed(vec![Decision::single(Action::Move)]);
    let id = world
        .spawn_agent(Coord::new(0, 0), Colour::Orange, Orientation::East, mind)
        .expect("spawn");

    world.step().expect("step");

    let grid = world.grid();
    assert!(grid.agent_at(Coord::new(0, 0)).is_none());
    let moved = grid.agent_at(Coord::new(1, 0)).expect("agent moved");
    assert_eq!(moved.id, id);
    assert_eq!(moved.colour, Colour::Orange);
    assert_eq!(moved.orientation, Orientation::East);
}

#[test]
fn user_drops_dirt_once() {
    let mut world = World::new(4).expect("world");
    let (mind, _) = Scripted::boxed(vec![
        Decision::single(Action::Drop(Colour::Green)),
        Decision::single(Action::Drop(Colour::Orange)),
    ]);
    world
        .spawn_agent(Coord::new(1, 1), Colour::User, Orientation::North, mind)
        .expect("spawn");

    let first = world.step().expect("first step");
    assert_eq!(first.outcomes[0].outcome, ActionOutcome::Success);
    let dirt = world.grid().dirt_at(Coord::new(1, 1)).cloned().expect("dirt dropped");
    assert_eq!(dirt.colour, Colour::Green);
    assert_eq!(dirt.id.to_string(), "D-0");

    let second = world.step().expect("second step");
    assert_eq!(
        second.outcomes[0].outcome,
        ActionOutcome::Failure(FailureReason::DirtPresent)
    );
    assert_eq!(world.grid().dirt_at(Coord::new(1, 1)), Some(&dirt));
    assert_eq!(world.grid().dirts_minted(), 1);
}

#[test]
fn invalid_combination_only_affects_its_agent() {
    let mut world = World::new(4).expect("world");
    let (bad, _) = Scripted::boxed(vec![Decision::pair(Action::Move, Action::Move)]);
    let (good, _) = Scripted::boxed(vec![Decision::single(Action::Move)]);
    let bad_id = world
        .spawn_agent(Coord::new(0, 0), Colour::White, Orientation::East, bad)
        .expect("spawn bad");
    let good_id = world
        .spawn_agent(Coord::new(0, 2), Colour::Green, Orientation::East, good)
        .expect("spawn good");

    let report = world.step().expect("step");

    assert_eq!(report.diagnostics.len(), 1);
    assert_eq!(report.diagnostics[0].agent(), bad_id);
    assert!(matches!(
        report.diagnostics[0],
        Diagnostic::Rejected {
            error: ActionError::InvalidActionCombination(_),
            ..
        }
    ));
    assert_eq!(world.grid().locate_agent(bad_id), Some(Coord::new(0, 0)));
    assert_eq!(world.grid().locate_agent(good_id), Some(Coord::new(1, 2)));
}

#[test]
fn broadcast_reaches_everyone_else_next_tick() {
    let mut world = World::new(4).expect("world");
    let (speaker, speaker_log) = Scripted::boxed(vec![Decision::single(Action::broadcast(
        vec!["dirt", "here"],
    ))]);
    let speaker_id = world
        .spawn_agent(Coord::new(0, 0), Colour::White, Orientation::South, speaker)
        .expect("spawn speaker");

    let mut listeners = Vec::new();
    for x in 1..4 {
        let (mind, log) = Scripted::boxed(vec![]);
        world
            .spawn_agent(Coord::new(x, 3), Colour::Green, Orientation::North, mind)
            .expect("spawn listener");
        listeners.push(log);
    }

    world.step().expect("first step");
    for log in &listeners {
        assert_eq!(log.borrow().len(), 1);
        assert!(log.borrow()[0].is_empty(), "nothing is heard in the same tick");
    }

    world.step().expect("second step");
    let expected = Message {
        sender: speaker_id,
        content: Content::from(vec!["dirt", "here"]),
    };
    for log in &listeners {
        assert_eq!(log.borrow()[1], vec![expected.clone()]);
    }
    assert!(speaker_log.borrow().iter().all(Vec::is_empty));
}

#[test]
fn tick_on_a_bare_grid_with_external_minds() {
    let mut grid = Grid::new(3).expect("grid");
    let agent = grid.mint_agent(Colour::White, Orientation::West);
    let id = agent.id;
    grid.place_agent(Coord::new(2, 1), agent).expect("place");
    let mut minds = Minds::new();
    let (mind, _) = Scripted::boxed(vec![Decision::pair(
        Action::Idle,
        Action::speak_to("self", [id]),
    )]);
    minds.insert(id, mind);

    let report = cleaning_world_core::tick(&mut grid, &mut minds, Inboxes::new()).expect("tick");

    assert_eq!(report.outcomes.len(), 1);
    assert_eq!(report.inboxes.messages_for(id).len(), 1);
    assert_eq!(report.inboxes.messages_for(AgentId(42)).len(), 0);
}
