use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::{
    Position,
    score::{RunStats, Scorer, StandardScorer},
    strategy::MoveStrategy,
    world::GridWorld,
};

/// Errors raised when a simulation is built on an incomplete world.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SimulationError {
    #[error("World has no agent; place one before running")]
    MissingAgent,
    #[error("World has no goal; place one before running")]
    MissingGoal,
}

/// Why an episode ended without reaching the goal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ExhaustReason {
    /// The step budget was used up.
    StepBudget,
    /// The agent is boxed in.
    NoLegalMoves,
    /// The strategy returned no move.
    NoDecision,
    /// The strategy proposed a move outside the candidates.
    IllegalMove(Position),
}

/// Lifecycle of an episode once the world is set up.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum EpisodeStatus {
    Running,
    Victory,
    Exhausted(ExhaustReason),
}

impl EpisodeStatus {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, EpisodeStatus::Running)
    }
}

/// Summary of a run, including its score.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunResult {
    pub success: bool,
    pub status: EpisodeStatus,
    pub steps_taken: usize,
    pub items_collected: usize,
    pub final_position: Position,
    /// Cells entered, in order. The start cell is not included.
    pub path: Vec<Position>,
    pub total_items_available: usize,
    pub score: f64,
}

/// Drives one episode of a [`GridWorld`] with a [`MoveStrategy`].
pub struct Simulation {
    world: GridWorld,
    max_steps: usize,
    scorer: Box<dyn Scorer>,
    total_items: usize,
    path: Vec<Position>,
    status: EpisodeStatus,
}

impl Simulation {
    /// Wraps a set-up world. Fails if the agent or goal is missing.
    pub fn new(world: GridWorld, max_steps: usize) -> Result<Self, SimulationError> {
        if world.agent().is_none() {
            return Err(SimulationError::MissingAgent);
        }
        if world.goal().is_none() {
            return Err(SimulationError::MissingGoal);
        }

        let status = if max_steps == 0 {
            EpisodeStatus::Exhausted(ExhaustReason::StepBudget)
        } else {
            EpisodeStatus::Running
        };

        Ok(Simulation {
            total_items: world.items().len(),
            world,
            max_steps,
            scorer: Box::new(StandardScorer),
            path: Vec::new(),
            status,
        })
    }

    /// Replaces the default [`StandardScorer`].
    pub fn with_scorer(mut self, scorer: impl Scorer + 'static) -> Self {
        self.scorer = Box::new(scorer);
        self
    }

    pub fn world(&self) -> &GridWorld {
        &self.world
    }

    pub fn status(&self) -> EpisodeStatus {
        self.status
    }

    pub fn max_steps(&self) -> usize {
        self.max_steps
    }

    pub fn path(&self) -> &[Position] {
        &self.path
    }

    pub fn total_items(&self) -> usize {
        self.total_items
    }

    /// Plays a single turn. Does nothing once the episode is over.
    pub fn step(&mut self, strategy: &mut dyn MoveStrategy) -> EpisodeStatus {
        if self.status.is_terminal() {
            return self.status;
        }

        let candidates = self.world.possible_moves();
        if candidates.is_empty() {
            info!("no legal moves left");
            return self.finish(EpisodeStatus::Exhausted(ExhaustReason::NoLegalMoves));
        }

        let snapshot = self.world.grid_info();
        let Some(target) = strategy.decide_move(&candidates, &snapshot) else {
            warn!(strategy = strategy.name(), "strategy returned no move");
            return self.finish(EpisodeStatus::Exhausted(ExhaustReason::NoDecision));
        };

        let report = match self.world.move_agent(target) {
            Ok(report) => report,
            Err(err) => {
                warn!(strategy = strategy.name(), error = %err, "illegal move, ending episode");
                return self.finish(EpisodeStatus::Exhausted(ExhaustReason::IllegalMove(target)));
            }
        };
        self.path.push(target);
        debug!(
            to = %target,
            collected = report.collected_item,
            steps = self.path.len(),
            "moved"
        );

        if report.reached_goal {
            return self.finish(EpisodeStatus::Victory);
        }
        if self.steps_taken() >= self.max_steps {
            return self.finish(EpisodeStatus::Exhausted(ExhaustReason::StepBudget));
        }
        self.status
    }

    /// Plays turns until the episode ends and returns the scored result.
    pub fn run(&mut self, strategy: &mut dyn MoveStrategy) -> RunResult {
        info!(
            strategy = strategy.name(),
            max_steps = self.max_steps,
            items = self.total_items,
            "starting episode"
        );
        while !self.step(strategy).is_terminal() {}
        self.result()
    }

    fn finish(&mut self, status: EpisodeStatus) -> EpisodeStatus {
        self.status = status;
        info!(
            status = ?status,
            steps = self.steps_taken(),
            items = self.items_collected(),
            "episode finished"
        );
        status
    }

    fn steps_taken(&self) -> usize {
        self.world.agent().map_or(0, |a| a.steps_taken)
    }

    fn items_collected(&self) -> usize {
        self.world.agent().map_or(0, |a| a.items_collected)
    }

    pub fn stats(&self) -> RunStats {
        RunStats {
            success: self.world.is_victory(),
            steps_taken: self.steps_taken(),
            items_collected: self.items_collected(),
            total_items_available: self.total_items,
            grid_width: self.world.width(),
            grid_height: self.world.height(),
        }
    }

    /// Scores the episode as it stands.
    pub fn result(&self) -> RunResult {
        let stats = self.stats();
        // `new` guarantees the agent exists.
        let final_position = self.world.agent().map(|a| a.position).unwrap_or_default();

        RunResult {
            success: stats.success,
            status: self.status,
            steps_taken: stats.steps_taken,
            items_collected: stats.items_collected,
            final_position,
            path: self.path.clone(),
            total_items_available: stats.total_items_available,
            score: self.scorer.score(&stats),
        }
    }
}
