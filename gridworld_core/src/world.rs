use rand::{Rng, SeedableRng, rngs::StdRng};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::{
    Direction, Position,
    map::{Grid, GridError},
};

/// Random samples tried when placing the agent or the goal without an explicit position.
pub const PLACEMENT_ATTEMPTS: usize = 100;

/// Random samples tried per requested obstacle or item.
pub const ATTEMPTS_PER_ENTITY: usize = 10;

/// Represents the static type of a cell in the world grid.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum CellType {
    #[default]
    Floor,
    Obstacle,
}

/// Holds the state of the agent within the world.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AgentState {
    pub position: Position,
    pub items_collected: usize,
    pub steps_taken: usize,
    pub has_reached_goal: bool,
}

impl AgentState {
    fn new(position: Position) -> Self {
        AgentState {
            position,
            items_collected: 0,
            steps_taken: 0,
            has_reached_goal: false,
        }
    }
}

/// A read-only value snapshot of the world handed to move strategies.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GridInfo {
    pub width: usize,
    pub height: usize,
    pub agent_position: Option<Position>,
    pub goal_position: Option<Position>,
    pub item_positions: Vec<Position>,
    pub obstacle_positions: Vec<Position>,
    pub items_collected: usize,
    pub steps_taken: usize,
}

impl GridInfo {
    pub fn in_bounds(&self, position: Position) -> bool {
        position.x < self.width && position.y < self.height
    }

    pub fn is_obstacle(&self, position: Position) -> bool {
        self.obstacle_positions.contains(&position)
    }

    pub fn has_item(&self, position: Position) -> bool {
        self.item_positions.contains(&position)
    }
}

/// Side effects of a successful move.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MoveReport {
    pub collected_item: bool,
    pub reached_goal: bool,
}

/// Errors raised while setting up a world.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PlacementError {
    #[error("Grid dimensions must be non-zero, got {width}x{height}")]
    EmptyGrid { width: usize, height: usize },
    #[error("Position {0} is not available for placement")]
    Occupied(Position),
    #[error("No free cell found after {attempts} attempts")]
    NoFreeCell { attempts: usize },
    #[error(transparent)]
    Grid(#[from] GridError),
}

/// Reasons a requested move is refused.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum IllegalMove {
    #[error("No agent has been placed")]
    NoAgent,
    #[error("The goal has already been reached")]
    GoalReached,
    #[error("{to} is not a legal move from {from}")]
    Blocked { from: Position, to: Position },
}

/// Authoritative state of one episode.
#[derive(Debug, Clone)]
pub struct GridWorld {
    terrain: Grid<CellType>,
    items: Vec<Position>,
    agent: Option<AgentState>,
    goal: Option<Position>,
    rng: StdRng,
}

impl GridWorld {
    /// Creates an empty world whose random placement is seeded from the OS.
    pub fn new(width: usize, height: usize) -> Result<Self, PlacementError> {
        Self::with_rng(width, height, StdRng::from_os_rng())
    }

    /// Creates an empty world with reproducible random placement.
    pub fn with_seed(width: usize, height: usize, seed: u64) -> Result<Self, PlacementError> {
        Self::with_rng(width, height, StdRng::seed_from_u64(seed))
    }

    fn with_rng(width: usize, height: usize, rng: StdRng) -> Result<Self, PlacementError> {
        if width == 0 || height == 0 {
            return Err(PlacementError::EmptyGrid { width, height });
        }
        Ok(GridWorld {
            terrain: Grid::new(width, height)?,
            items: Vec::new(),
            agent: None,
            goal: None,
            rng,
        })
    }

    pub fn width(&self) -> usize {
        self.terrain.width()
    }

    pub fn height(&self) -> usize {
        self.terrain.height()
    }

    pub fn agent(&self) -> Option<&AgentState> {
        self.agent.as_ref()
    }

    pub fn goal(&self) -> Option<Position> {
        self.goal
    }

    /// Remaining items in placement order.
    pub fn items(&self) -> &[Position] {
        &self.items
    }

    pub fn is_victory(&self) -> bool {
        self.agent.as_ref().is_some_and(|a| a.has_reached_goal)
    }

    pub fn is_obstacle(&self, position: Position) -> bool {
        self.terrain.get(position) == Some(&CellType::Obstacle)
    }

    /// A cell is free when it is in bounds and not an obstacle.
    pub fn is_free(&self, position: Position) -> bool {
        self.terrain.get(position) == Some(&CellType::Floor)
    }

    /// Obstacle positions in row-major order.
    pub fn obstacle_positions(&self) -> Vec<Position> {
        self.terrain
            .enumerate()
            .filter_map(|(pos, cell)| (*cell == CellType::Obstacle).then_some(pos))
            .collect()
    }

    fn has_item(&self, position: Position) -> bool {
        self.items.contains(&position)
    }

    fn is_agent_at(&self, position: Position) -> bool {
        self.agent.as_ref().is_some_and(|a| a.position == position)
    }

    fn can_hold_agent(&self, position: Position) -> bool {
        self.is_free(position) && self.goal != Some(position) && !self.has_item(position)
    }

    fn can_hold_goal(&self, position: Position) -> bool {
        self.is_free(position) && !self.is_agent_at(position) && !self.has_item(position)
    }

    /// Listed items only keep off obstacles and the agent; they may share a
    /// cell with the goal or with each other.
    fn can_hold_item(&self, position: Position) -> bool {
        self.is_free(position) && !self.is_agent_at(position)
    }

    /// Obstacles and random items need a cell no other entity is using.
    fn is_vacant(&self, position: Position) -> bool {
        self.is_free(position)
            && !self.is_agent_at(position)
            && self.goal != Some(position)
            && !self.has_item(position)
    }

    fn random_cell(&mut self) -> Position {
        Position {
            x: self.rng.random_range(0..self.terrain.width()),
            y: self.rng.random_range(0..self.terrain.height()),
        }
    }

    fn sample_cell(&mut self, accept: fn(&Self, Position) -> bool) -> Option<Position> {
        (0..PLACEMENT_ATTEMPTS).find_map(|_| {
            let candidate = self.random_cell();
            accept(self, candidate).then_some(candidate)
        })
    }

    fn resolve_position(
        &mut self,
        position: Option<Position>,
        accept: fn(&Self, Position) -> bool,
    ) -> Result<Position, PlacementError> {
        match position {
            Some(pos) if accept(self, pos) => Ok(pos),
            Some(pos) => Err(PlacementError::Occupied(pos)),
            None => self.sample_cell(accept).ok_or(PlacementError::NoFreeCell {
                attempts: PLACEMENT_ATTEMPTS,
            }),
        }
    }

    /// Places the agent at `position`, or at a random free cell when `None`.
    /// Replaces any previously placed agent.
    pub fn place_agent(&mut self, position: Option<Position>) -> Result<(), PlacementError> {
        let position = self.resolve_position(position, Self::can_hold_agent)?;
        self.agent = Some(AgentState::new(position));
        debug!(%position, "placed agent");
        Ok(())
    }

    /// Places the goal at `position`, or at a random free cell when `None`.
    /// The goal never shares a cell with the agent.
    pub fn place_goal(&mut self, position: Option<Position>) -> Result<(), PlacementError> {
        let position = self.resolve_position(position, Self::can_hold_goal)?;
        self.goal = Some(position);
        debug!(%position, "placed goal");
        Ok(())
    }

    /// Adds obstacles at the given positions, or `count` random ones when
    /// `positions` is `None`. Positions that are not vacant are skipped.
    ///
    /// Returns the number of obstacles actually placed.
    pub fn add_obstacles(&mut self, count: usize, positions: Option<&[Position]>) -> usize {
        self.populate(count, positions, Self::is_vacant, |world, pos| {
            world.terrain[pos] = CellType::Obstacle;
        })
    }

    /// Adds items at the given positions, or `count` random ones when
    /// `positions` is `None`.
    ///
    /// Listed positions are skipped only when they are blocked or hold the
    /// agent; random items always land on vacant cells.
    ///
    /// Returns the number of items actually placed.
    pub fn add_items(&mut self, count: usize, positions: Option<&[Position]>) -> usize {
        self.populate(count, positions, Self::can_hold_item, |world, pos| {
            world.items.push(pos)
        })
    }

    /// Explicit positions are checked with `accept`, random ones with `is_vacant`.
    fn populate(
        &mut self,
        count: usize,
        positions: Option<&[Position]>,
        accept: fn(&Self, Position) -> bool,
        mut insert: impl FnMut(&mut Self, Position),
    ) -> usize {
        let mut placed = 0;
        match positions {
            Some(positions) => {
                for &pos in positions {
                    if accept(self, pos) {
                        insert(self, pos);
                        placed += 1;
                    } else {
                        debug!(position = %pos, "skipping occupied cell");
                    }
                }
            }
            None => {
                for _ in 0..count * ATTEMPTS_PER_ENTITY {
                    if placed >= count {
                        break;
                    }
                    let candidate = self.random_cell();
                    if self.is_vacant(candidate) {
                        insert(self, candidate);
                        placed += 1;
                    }
                }
                if placed < count {
                    debug!(requested = count, placed, "random placement ran out of attempts");
                }
            }
        }
        placed
    }

    /// Orthogonal neighbours of the agent that are in bounds and not obstacles,
    /// in up, down, left, right order.
    pub fn possible_moves(&self) -> Vec<Position> {
        let Some(agent) = &self.agent else {
            return Vec::new();
        };
        Direction::ALL
            .iter()
            .filter_map(|&direction| agent.position.step(direction))
            .filter(|&pos| self.is_free(pos))
            .collect()
    }

    /// Moves the agent to `target`, collecting an item and reaching the goal
    /// as side effects.
    pub fn move_agent(&mut self, target: Position) -> Result<MoveReport, IllegalMove> {
        let candidates = self.possible_moves();
        let agent = self.agent.as_mut().ok_or(IllegalMove::NoAgent)?;
        if agent.has_reached_goal {
            return Err(IllegalMove::GoalReached);
        }
        if !candidates.contains(&target) {
            return Err(IllegalMove::Blocked {
                from: agent.position,
                to: target,
            });
        }

        agent.position = target;
        agent.steps_taken += 1;

        let mut report = MoveReport::default();
        if let Some(index) = self.items.iter().position(|&pos| pos == target) {
            self.items.remove(index);
            agent.items_collected += 1;
            report.collected_item = true;
        }
        if self.goal == Some(target) {
            agent.has_reached_goal = true;
            report.reached_goal = true;
        }
        Ok(report)
    }

    pub fn grid_info(&self) -> GridInfo {
        GridInfo {
            width: self.width(),
            height: self.height(),
            agent_position: self.agent.as_ref().map(|a| a.position),
            goal_position: self.goal,
            item_positions: self.items.clone(),
            obstacle_positions: self.obstacle_positions(),
            items_collected: self.agent.as_ref().map_or(0, |a| a.items_collected),
            steps_taken: self.agent.as_ref().map_or(0, |a| a.steps_taken),
        }
    }
}
