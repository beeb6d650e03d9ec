//! End-to-end episodes on small hand-built worlds.

use gridworld_core::{
    Position,
    preset::{Difficulty, Preset, load_layout_from_string},
    score::{RunStats, Scorer, StandardScorer},
    simulation::{EpisodeStatus, ExhaustReason, Simulation},
    strategy::{GreedyStrategy, MoveStrategy, MoveStrategyExt, PlanningStrategy},
    world::{GridInfo, GridWorld},
};

fn pos(x: usize, y: usize) -> Position {
    Position::new(x, y)
}

/// Always steps to the candidate closest to the goal.
struct Homing;

impl MoveStrategy for Homing {
    fn name(&self) -> &str {
        "homing"
    }

    fn decide_move(&mut self, candidates: &[Position], info: &GridInfo) -> Option<Position> {
        let goal = info.goal_position?;
        candidates
            .iter()
            .copied()
            .min_by_key(|c| c.manhattan_distance(&goal))
    }
}

/// Proposes a cell two steps away, which is never a candidate.
struct Jumper;

impl MoveStrategy for Jumper {
    fn name(&self) -> &str {
        "jumper"
    }

    fn decide_move(&mut self, _: &[Position], info: &GridInfo) -> Option<Position> {
        let agent = info.agent_position?;
        Some(pos(agent.x + 2, agent.y))
    }
}

#[test]
fn open_grid_victory_in_eight_steps() {
    let mut world = GridWorld::with_seed(5, 5, 0).unwrap();
    world.place_agent(Some(pos(0, 0))).unwrap();
    world.place_goal(Some(pos(4, 4))).unwrap();

    let mut sim = Simulation::new(world, 25).unwrap();
    let result = sim.run(&mut Homing);

    assert!(result.success);
    assert_eq!(result.status, EpisodeStatus::Victory);
    assert_eq!(result.steps_taken, 8);
    assert_eq!(result.path.len(), 8);
    assert_eq!(result.final_position, pos(4, 4));
    assert_eq!(result.total_items_available, 0);

    // baseline = max(5, 5) + 0 = 5; efficiency = 1 / (8 / 5)^1.5
    let efficiency = 1.0 / 1.6f64.powf(1.5);
    let expected = 30.0 + 40.0 * efficiency;
    assert!((result.score - expected).abs() < 1e-9);
    assert!((result.score - 49.76).abs() < 0.01);
}

#[test]
fn boxed_in_agent_is_exhausted_immediately() {
    let mut world = GridWorld::with_seed(3, 3, 0).unwrap();
    world.place_agent(Some(pos(1, 1))).unwrap();
    world.place_goal(Some(pos(2, 2))).unwrap();
    world.add_items(0, Some(&[pos(0, 0)]));
    let placed = world.add_obstacles(0, Some(&[pos(1, 0), pos(1, 2), pos(0, 1), pos(2, 1)]));
    assert_eq!(placed, 4);
    assert!(world.possible_moves().is_empty());

    let mut sim = Simulation::new(world, 10).unwrap();
    let result = sim.run(&mut GreedyStrategy::default());

    assert_eq!(
        result.status,
        EpisodeStatus::Exhausted(ExhaustReason::NoLegalMoves)
    );
    assert!(!result.success);
    assert_eq!(result.steps_taken, 0);
    assert!(result.path.is_empty());
    assert_eq!(result.score, 0.0);
}

#[test]
fn illegal_proposal_ends_episode_without_panicking() {
    let mut world = GridWorld::with_seed(5, 5, 0).unwrap();
    world.place_agent(Some(pos(0, 0))).unwrap();
    world.place_goal(Some(pos(4, 4))).unwrap();

    let mut sim = Simulation::new(world, 25).unwrap();
    let result = sim.run(&mut Jumper);

    assert_eq!(
        result.status,
        EpisodeStatus::Exhausted(ExhaustReason::IllegalMove(pos(2, 0)))
    );
    assert_eq!(result.steps_taken, 0);
    assert_eq!(result.final_position, pos(0, 0));
}

#[test]
fn fallback_rescues_a_malfunctioning_strategy() {
    let mut world = GridWorld::with_seed(5, 5, 0).unwrap();
    world.place_agent(Some(pos(0, 0))).unwrap();
    world.place_goal(Some(pos(4, 4))).unwrap();

    let mut sim = Simulation::new(world, 25).unwrap();
    let mut chain = Jumper.or_fallback(Homing);
    let result = sim.run(&mut chain);

    assert!(result.success);
    assert_eq!(result.steps_taken, 8);
}

#[test]
fn obstacle_on_agent_cell_is_skipped() {
    let mut world = GridWorld::with_seed(5, 5, 0).unwrap();
    world.place_agent(Some(pos(0, 0))).unwrap();
    world.place_goal(Some(pos(4, 4))).unwrap();

    let placed = world.add_obstacles(3, Some(&[pos(2, 2), pos(0, 0), pos(3, 1)]));

    assert_eq!(placed, 2);
    assert_eq!(world.obstacle_positions(), vec![pos(3, 1), pos(2, 2)]);
    assert!(!world.is_obstacle(pos(0, 0)));
    assert_eq!(world.agent().unwrap().position, pos(0, 0));
}

#[test]
fn collecting_every_item_earns_the_bonus() {
    let layout = load_layout_from_string(
        "ST IT IT\n\
         BL BL BL\n\
         BL BL GL\n",
    )
    .unwrap();
    let world = layout.build(Some(3)).unwrap();
    let mut sim = Simulation::new(world, 20).unwrap();
    let result = sim.run(&mut PlanningStrategy::new());

    assert!(result.success);
    assert_eq!(result.items_collected, 2);
    assert_eq!(result.total_items_available, 2);
    // (0,0) -> (1,0) -> (2,0) -> (2,1) -> (2,2); baseline 3 + 2 = 5
    assert_eq!(result.steps_taken, 4);
    assert!((result.score - 100.0).abs() < 1e-9);
}

#[test]
fn greedy_clears_the_easy_preset() {
    let preset = Preset::for_difficulty(Difficulty::Easy);
    let mut sim = preset.simulation(Some(9)).unwrap();
    let result = sim.run(&mut GreedyStrategy::new(9));

    assert!(result.steps_taken <= preset.max_steps);
    assert_eq!(result.total_items_available, 3);
    let expected = StandardScorer.score(&RunStats {
        success: result.success,
        steps_taken: result.steps_taken,
        items_collected: result.items_collected,
        total_items_available: 3,
        grid_width: 5,
        grid_height: 5,
    });
    assert!((result.score - expected).abs() < 1e-9);
}

#[test]
fn planner_beats_the_hard_preset() {
    let preset = Preset::for_difficulty(Difficulty::Hard);
    let mut sim = preset.simulation(Some(1)).unwrap();
    let mut strategy = PlanningStrategy::new().or_fallback(GreedyStrategy::new(1));
    let result = sim.run(&mut strategy);

    assert!(result.success, "status: {:?}", result.status);
    assert!(result.steps_taken <= 100);
}
