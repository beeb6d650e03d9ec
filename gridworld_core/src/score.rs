//! Performance scoring for finished episodes.
//!
//! Scores are normalized to `[0, 100]`:
//! - 30 points for reaching the goal,
//! - up to 30 points for the fraction of items collected,
//! - up to 40 points for step efficiency (victories only),
//! - 10 points for collecting every item.

use serde::{Deserialize, Serialize};

pub const MAX_SCORE: f64 = 100.0;
const GOAL_POINTS: f64 = 30.0;
const ITEM_POINTS: f64 = 30.0;
const EFFICIENCY_POINTS: f64 = 40.0;
const ALL_ITEMS_BONUS: f64 = 10.0;
const EXCESS_STEP_EXPONENT: f64 = 1.5;

/// The statistics of a finished run that scoring depends on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunStats {
    pub success: bool,
    pub steps_taken: usize,
    pub items_collected: usize,
    pub total_items_available: usize,
    pub grid_width: usize,
    pub grid_height: usize,
}

impl RunStats {
    /// Reference step count: the longer grid side plus one step per item.
    pub fn baseline_steps(&self) -> usize {
        self.grid_width.max(self.grid_height) + self.total_items_available
    }
}

/// Maps run statistics to a single score.
pub trait Scorer {
    fn score(&self, stats: &RunStats) -> f64;
}

/// The reference scoring formula used to compare strategies.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct StandardScorer;

impl StandardScorer {
    /// Step efficiency in `[0, 1]`; 1.0 up to the baseline, then decaying
    /// with the excess ratio raised to 1.5.
    pub fn efficiency(stats: &RunStats) -> f64 {
        let baseline = stats.baseline_steps();
        if stats.steps_taken <= baseline {
            return 1.0;
        }
        let excess_ratio = stats.steps_taken as f64 / baseline as f64;
        (1.0 / excess_ratio.powf(EXCESS_STEP_EXPONENT)).max(0.0)
    }
}

impl Scorer for StandardScorer {
    fn score(&self, stats: &RunStats) -> f64 {
        let mut score = 0.0;

        if stats.success {
            score += GOAL_POINTS;
        }

        if stats.total_items_available > 0 {
            score += stats.items_collected as f64 / stats.total_items_available as f64 * ITEM_POINTS;
        }

        if stats.success && stats.steps_taken > 0 {
            score += Self::efficiency(stats) * EFFICIENCY_POINTS;
        }

        if stats.total_items_available > 0 && stats.items_collected == stats.total_items_available {
            score += ALL_ITEMS_BONUS;
        }

        score.clamp(0.0, MAX_SCORE)
    }
}

/// Adds a fixed bonus on top of another scorer when the goal was reached.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CompletionBonus<S> {
    inner: S,
    bonus: f64,
}

impl<S: Scorer> CompletionBonus<S> {
    pub fn new(inner: S, bonus: f64) -> Self {
        CompletionBonus { inner, bonus }
    }
}

impl<S: Scorer> Scorer for CompletionBonus<S> {
    fn score(&self, stats: &RunStats) -> f64 {
        let mut score = self.inner.score(stats);
        if stats.success {
            score += self.bonus;
        }
        score.clamp(0.0, MAX_SCORE)
    }
}

impl<S: Scorer + ?Sized> Scorer for Box<S> {
    fn score(&self, stats: &RunStats) -> f64 {
        (**self).score(stats)
    }
}
