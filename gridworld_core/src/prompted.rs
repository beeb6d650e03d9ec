//! Strategies backed by a remote reasoning service.
//!
//! The service is an opaque text-in/text-out endpoint. Failures never leave
//! this module: a failed query or an unusable reply yields no decision, and
//! callers chain a rule-based strategy behind it with
//! [`or_fallback`](crate::strategy::MoveStrategyExt::or_fallback).

use tracing::{debug, warn};

use crate::{Position, strategy::MoveStrategy, world::GridInfo};

/// Errors a reasoning service may report.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ServiceError {
    #[error("Reasoning service is unreachable: {0}")]
    Unreachable(String),
    #[error("Reasoning service returned an error: {0}")]
    Backend(String),
}

/// A text completion endpoint.
pub trait ReasoningService {
    fn query(&mut self, prompt: &str) -> Result<String, ServiceError>;

    fn is_available(&self) -> bool {
        true
    }
}

/// Formats the world state into a prompt and maps the reply back to a candidate.
#[derive(Debug)]
pub struct PromptedStrategy<S> {
    service: S,
    name: String,
}

impl<S: ReasoningService> PromptedStrategy<S> {
    pub fn new(name: impl Into<String>, service: S) -> Self {
        Self {
            service,
            name: name.into(),
        }
    }

    pub fn service(&self) -> &S {
        &self.service
    }

    /// Builds the state description sent to the service. Candidates are
    /// numbered from zero.
    pub fn build_prompt(candidates: &[Position], info: &GridInfo) -> String {
        let describe = |pos: Option<Position>| {
            pos.map_or_else(|| "unknown".to_string(), |p| p.to_string())
        };
        let moves: String = candidates
            .iter()
            .enumerate()
            .map(|(index, candidate)| format!("{index}. {candidate}\n"))
            .collect();

        format!(
            "Grid: {width}x{height}\n\
             Agent: {agent}\n\
             Goal: {goal}\n\
             Items: {items}\n\
             Obstacles: {obstacles}\n\
             Items collected: {collected}, steps taken: {steps}\n\
             Moves:\n\
             {moves}\
             Reply with the index of the best move.",
            width = info.width,
            height = info.height,
            agent = describe(info.agent_position),
            goal = describe(info.goal_position),
            items = join_positions(&info.item_positions),
            obstacles = join_positions(&info.obstacle_positions),
            collected = info.items_collected,
            steps = info.steps_taken,
        )
    }

    /// Extracts a candidate from a reply.
    ///
    /// A reply containing a coordinate pair is judged by that pair alone, so
    /// a pair outside the candidates yields `None`. Otherwise the whole reply
    /// must be a zero-based candidate index.
    pub fn parse_reply(reply: &str, candidates: &[Position]) -> Option<Position> {
        if let Some(choice) = parse_coordinates(reply) {
            return candidates.contains(&choice).then_some(choice);
        }
        let index: usize = reply.trim().trim_end_matches('.').parse().ok()?;
        candidates.get(index).copied()
    }
}

impl<S: ReasoningService> MoveStrategy for PromptedStrategy<S> {
    fn name(&self) -> &str {
        &self.name
    }

    fn decide_move(&mut self, candidates: &[Position], info: &GridInfo) -> Option<Position> {
        if candidates.is_empty() {
            return None;
        }
        if !self.service.is_available() {
            debug!(strategy = %self.name, "service unavailable, skipping");
            return None;
        }

        let prompt = Self::build_prompt(candidates, info);
        let reply = match self.service.query(&prompt) {
            Ok(reply) => reply,
            Err(err) => {
                warn!(strategy = %self.name, error = %err, "query failed");
                return None;
            }
        };

        let choice = Self::parse_reply(&reply, candidates);
        if choice.is_none() {
            warn!(strategy = %self.name, reply = %reply.trim(), "could not parse reply");
        }
        choice
    }
}

fn join_positions(positions: &[Position]) -> String {
    if positions.is_empty() {
        return "none".to_string();
    }
    positions
        .iter()
        .map(Position::to_string)
        .collect::<Vec<_>>()
        .join(", ")
}

/// Finds the first `(x, y)` pair in `text`.
fn parse_coordinates(text: &str) -> Option<Position> {
    let mut rest = text;
    while let Some(open) = rest.find('(') {
        let after = &rest[open + 1..];
        let Some(close) = after.find(')') else {
            return None;
        };
        let mut parts = after[..close].split(',').map(str::trim);
        if let (Some(x), Some(y), None) = (parts.next(), parts.next(), parts.next()) {
            if let (Ok(x), Ok(y)) = (x.parse(), y.parse()) {
                return Some(Position { x, y });
            }
        }
        rest = after;
    }
    None
}
