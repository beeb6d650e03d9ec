use std::{
    cmp::Ordering,
    collections::{BinaryHeap, HashMap, VecDeque},
};

use rand::{SeedableRng, rngs::StdRng, seq::IndexedRandom};
use tracing::debug;

use crate::{Direction, Position, world::GridInfo};

/// Trait defining how a move is chosen each turn.
///
/// Strategies receive the legal candidate moves and a value snapshot of the
/// world. They return one of the candidates, or `None` when they cannot decide.
pub trait MoveStrategy {
    /// Human-readable name used in logs and summaries.
    fn name(&self) -> &str;

    /// `&mut self` allows strategies to keep internal state (plans, RNGs, history).
    fn decide_move(&mut self, candidates: &[Position], info: &GridInfo) -> Option<Position>;

    /// Clears per-episode state before a new episode.
    fn reset(&mut self) {}
}

impl<S: MoveStrategy + ?Sized> MoveStrategy for Box<S> {
    fn name(&self) -> &str {
        (**self).name()
    }

    fn decide_move(&mut self, candidates: &[Position], info: &GridInfo) -> Option<Position> {
        (**self).decide_move(candidates, info)
    }

    fn reset(&mut self) {
        (**self).reset()
    }
}

/// Builder methods available on every strategy.
pub trait MoveStrategyExt: MoveStrategy + Sized {
    /// Consults `fallback` whenever `self` produces no usable move.
    fn or_fallback<F: MoveStrategy>(self, fallback: F) -> WithFallback<Self, F> {
        WithFallback::new(self, fallback)
    }
}

impl<S: MoveStrategy> MoveStrategyExt for S {}

/// Chains two strategies: the fallback answers when the primary returns
/// nothing or a move outside the candidates.
#[derive(Debug)]
pub struct WithFallback<P, F> {
    primary: P,
    fallback: F,
    name: String,
}

impl<P: MoveStrategy, F: MoveStrategy> WithFallback<P, F> {
    pub fn new(primary: P, fallback: F) -> Self {
        let name = format!("{} -> {}", primary.name(), fallback.name());
        Self {
            primary,
            fallback,
            name,
        }
    }
}

impl<P: MoveStrategy, F: MoveStrategy> MoveStrategy for WithFallback<P, F> {
    fn name(&self) -> &str {
        &self.name
    }

    fn decide_move(&mut self, candidates: &[Position], info: &GridInfo) -> Option<Position> {
        match self.primary.decide_move(candidates, info) {
            Some(choice) if candidates.contains(&choice) => Some(choice),
            other => {
                debug!(
                    primary = self.primary.name(),
                    fallback = self.fallback.name(),
                    proposed = ?other,
                    "falling back"
                );
                self.fallback.decide_move(candidates, info)
            }
        }
    }

    fn reset(&mut self) {
        self.primary.reset();
        self.fallback.reset();
    }
}

/// A strategy that picks a random candidate.
#[derive(Debug)]
pub struct RandomStrategy {
    rng: StdRng,
}

impl RandomStrategy {
    pub fn new(seed: u64) -> Self {
        Self {
            rng: StdRng::seed_from_u64(seed),
        }
    }
}

impl MoveStrategy for RandomStrategy {
    fn name(&self) -> &str {
        "random"
    }

    fn decide_move(&mut self, candidates: &[Position], _info: &GridInfo) -> Option<Position> {
        candidates.choose(&mut self.rng).copied()
    }
}

/// Rule-based baseline: grab an adjacent item if there is one, otherwise step
/// toward the goal.
#[derive(Debug)]
pub struct GreedyStrategy {
    rng: StdRng,
}

impl GreedyStrategy {
    pub fn new(seed: u64) -> Self {
        Self {
            rng: StdRng::seed_from_u64(seed),
        }
    }
}

impl Default for GreedyStrategy {
    fn default() -> Self {
        Self::new(0)
    }
}

impl MoveStrategy for GreedyStrategy {
    fn name(&self) -> &str {
        "greedy"
    }

    fn decide_move(&mut self, candidates: &[Position], info: &GridInfo) -> Option<Position> {
        let goal = match (info.agent_position, info.goal_position) {
            (Some(_), Some(goal)) => goal,
            _ => return candidates.choose(&mut self.rng).copied(),
        };

        if let Some(item) = candidates.iter().find(|&&c| info.has_item(c)) {
            return Some(*item);
        }

        // Ties keep the earliest candidate.
        candidates
            .iter()
            .copied()
            .min_by_key(|candidate| candidate.manhattan_distance(&goal))
    }
}

/// A planning strategy that walks A* paths to the nearest item, then to the goal.
#[derive(Debug, Default)]
pub struct PlanningStrategy {
    current_plan: VecDeque<Position>, // Queue of positions to visit
}

impl PlanningStrategy {
    pub fn new() -> Self {
        Self::default()
    }

    /// A* pathfinding implementation. The returned path includes `start`.
    fn a_star_path(start: Position, goal: Position, info: &GridInfo) -> Option<Vec<Position>> {
        // For priority queue
        #[derive(Clone, Eq, PartialEq)]
        struct PrioritizedItem {
            priority: usize,
            position: Position,
        }

        impl Ord for PrioritizedItem {
            fn cmp(&self, other: &Self) -> Ordering {
                // Reverse ordering for min-heap behavior
                other.priority.cmp(&self.priority)
            }
        }

        impl PartialOrd for PrioritizedItem {
            fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
                Some(self.cmp(other))
            }
        }

        let mut frontier = BinaryHeap::new();
        let mut came_from: HashMap<Position, Position> = HashMap::new();
        let mut cost_so_far: HashMap<Position, usize> = HashMap::new();

        frontier.push(PrioritizedItem {
            priority: 0,
            position: start,
        });
        cost_so_far.insert(start, 0);

        let mut goal_reached = false;

        while let Some(PrioritizedItem {
            position: current, ..
        }) = frontier.pop()
        {
            if current == goal {
                goal_reached = true;
                break;
            }

            let current_cost = cost_so_far.get(&current).copied().unwrap_or(usize::MAX);
            for neighbor in Self::walkable_neighbors(current, info) {
                let new_cost = current_cost.saturating_add(1);
                let improved = cost_so_far
                    .get(&neighbor)
                    .is_none_or(|&known| new_cost < known);

                if improved {
                    cost_so_far.insert(neighbor, new_cost);
                    frontier.push(PrioritizedItem {
                        priority: new_cost + neighbor.manhattan_distance(&goal),
                        position: neighbor,
                    });
                    came_from.insert(neighbor, current);
                }
            }
        }

        if !goal_reached {
            return None;
        }

        // Reconstruct path
        let mut path = vec![goal];
        let mut current = goal;
        while current != start {
            current = *came_from.get(&current)?;
            path.push(current);
        }

        path.reverse();
        Some(path)
    }

    fn walkable_neighbors(position: Position, info: &GridInfo) -> impl Iterator<Item = Position> {
        Direction::ALL
            .into_iter()
            .filter_map(move |direction| position.step(direction))
            .filter(move |&neighbor| info.in_bounds(neighbor) && !info.is_obstacle(neighbor))
    }

    /// Plans to the target with the shortest path. Ties go to the earlier target.
    fn plan_to_nearest(
        start: Position,
        targets: &[Position],
        info: &GridInfo,
    ) -> Option<Vec<Position>> {
        let mut best_plan: Option<Vec<Position>> = None;

        for target in targets {
            if let Some(plan) = Self::a_star_path(start, *target, info) {
                if best_plan.as_ref().is_none_or(|best| plan.len() < best.len()) {
                    best_plan = Some(plan);
                }
            }
        }

        best_plan
    }

    fn replan(&mut self, start: Position, info: &GridInfo) {
        self.current_plan.clear();

        // Items first; the goal once no item is reachable.
        let plan = Self::plan_to_nearest(start, &info.item_positions, info).or_else(|| {
            info.goal_position
                .and_then(|goal| Self::a_star_path(start, goal, info))
        });

        if let Some(plan) = plan {
            // Skip the first position (current position)
            self.current_plan.extend(plan.into_iter().skip(1));
        }
    }
}

impl MoveStrategy for PlanningStrategy {
    fn name(&self) -> &str {
        "planner"
    }

    fn decide_move(&mut self, candidates: &[Position], info: &GridInfo) -> Option<Position> {
        let start = info.agent_position?;

        // 1. Follow existing plan while it stays legal
        if let Some(next) = self.current_plan.front().copied() {
            if candidates.contains(&next) {
                self.current_plan.pop_front();
                return Some(next);
            }
        }

        // 2. Plan afresh toward the nearest item, else the goal
        self.replan(start, info);
        let next = self.current_plan.pop_front()?;
        candidates.contains(&next).then_some(next)
    }

    fn reset(&mut self) {
        self.current_plan.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pos(x: usize, y: usize) -> Position {
        Position::new(x, y)
    }

    fn info(
        agent: Position,
        goal: Position,
        items: Vec<Position>,
        obstacles: Vec<Position>,
    ) -> GridInfo {
        GridInfo {
            width: 5,
            height: 5,
            agent_position: Some(agent),
            goal_position: Some(goal),
            item_positions: items,
            obstacle_positions: obstacles,
            items_collected: 0,
            steps_taken: 0,
        }
    }

    struct Silent;

    impl MoveStrategy for Silent {
        fn name(&self) -> &str {
            "silent"
        }

        fn decide_move(&mut self, _: &[Position], _: &GridInfo) -> Option<Position> {
            None
        }
    }

    struct Rogue;

    impl MoveStrategy for Rogue {
        fn name(&self) -> &str {
            "rogue"
        }

        fn decide_move(&mut self, _: &[Position], _: &GridInfo) -> Option<Position> {
            Some(Position::new(99, 99))
        }
    }

    #[test]
    fn greedy_prefers_adjacent_items() {
        let view = info(pos(1, 1), pos(4, 4), vec![pos(1, 0)], vec![]);
        let candidates = [pos(1, 0), pos(1, 2), pos(0, 1), pos(2, 1)];
        assert_eq!(
            GreedyStrategy::default().decide_move(&candidates, &view),
            Some(pos(1, 0))
        );
    }

    #[test]
    fn greedy_heads_for_goal_and_keeps_first_tie() {
        let view = info(pos(1, 1), pos(4, 4), vec![], vec![]);
        let candidates = [pos(1, 0), pos(1, 2), pos(0, 1), pos(2, 1)];
        // (1, 2) and (2, 1) are equally close; the earlier one wins.
        assert_eq!(
            GreedyStrategy::default().decide_move(&candidates, &view),
            Some(pos(1, 2))
        );
    }

    #[test]
    fn greedy_returns_none_without_candidates() {
        let view = info(pos(1, 1), pos(4, 4), vec![], vec![]);
        assert_eq!(GreedyStrategy::default().decide_move(&[], &view), None);
    }

    #[test]
    fn greedy_picks_a_candidate_without_goal() {
        let mut view = info(pos(1, 1), pos(4, 4), vec![], vec![]);
        view.goal_position = None;
        let candidates = [pos(1, 0), pos(0, 1)];
        let choice = GreedyStrategy::new(11).decide_move(&candidates, &view);
        assert!(choice.is_some_and(|c| candidates.contains(&c)));
    }

    #[test]
    fn random_strategy_stays_within_candidates() {
        let view = info(pos(1, 1), pos(4, 4), vec![], vec![]);
        let candidates = [pos(1, 0), pos(0, 1)];
        let mut strategy = RandomStrategy::new(5);
        for _ in 0..20 {
            let choice = strategy.decide_move(&candidates, &view).unwrap();
            assert!(candidates.contains(&choice));
        }
    }

    #[test]
    fn planner_routes_around_walls() {
        // Wall across column 1 except the bottom row.
        let walls = vec![pos(1, 0), pos(1, 1), pos(1, 2), pos(1, 3)];
        let view = info(pos(0, 0), pos(2, 0), vec![], walls);
        let path = PlanningStrategy::a_star_path(pos(0, 0), pos(2, 0), &view).unwrap();
        assert_eq!(path.first(), Some(&pos(0, 0)));
        assert_eq!(path.last(), Some(&pos(2, 0)));
        assert_eq!(path.len(), 11);
        assert!(path.iter().all(|p| !view.is_obstacle(*p)));
    }

    #[test]
    fn planner_visits_nearest_item_first() {
        let view = info(pos(0, 0), pos(4, 0), vec![pos(0, 2)], vec![]);
        let mut planner = PlanningStrategy::new();
        let candidates = [pos(0, 1), pos(1, 0)];
        assert_eq!(planner.decide_move(&candidates, &view), Some(pos(0, 1)));
    }

    #[test]
    fn planner_gives_up_when_goal_is_walled_off() {
        let walls = vec![pos(3, 4), pos(4, 3)];
        let view = info(pos(0, 0), pos(4, 4), vec![], walls);
        let mut planner = PlanningStrategy::new();
        assert_eq!(planner.decide_move(&[pos(0, 1), pos(1, 0)], &view), None);
    }

    #[test]
    fn fallback_covers_silence_and_illegal_proposals() {
        let view = info(pos(1, 1), pos(4, 4), vec![], vec![]);
        let candidates = [pos(1, 0), pos(1, 2)];

        let mut chain = Silent.or_fallback(GreedyStrategy::default());
        assert_eq!(chain.name(), "silent -> greedy");
        assert_eq!(chain.decide_move(&candidates, &view), Some(pos(1, 2)));

        let mut chain = Rogue.or_fallback(Silent).or_fallback(GreedyStrategy::default());
        assert_eq!(chain.decide_move(&candidates, &view), Some(pos(1, 2)));
    }
}
