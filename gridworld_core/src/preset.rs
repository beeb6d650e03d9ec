use std::{fmt, str::FromStr};

use serde::{Deserialize, Serialize};

use crate::{
    Position,
    score::{CompletionBonus, Scorer, StandardScorer},
    simulation::{Simulation, SimulationError},
    world::{GridWorld, PlacementError},
};

/// A recipe for setting up a world.
///
/// `None` positions are sampled at random. Explicit obstacle and item lists
/// win over the random counts; listed cells that are already taken are dropped.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorldLayout {
    pub width: usize,
    pub height: usize,
    pub agent: Option<Position>,
    pub goal: Option<Position>,
    pub obstacles: Option<Vec<Position>>,
    pub items: Option<Vec<Position>>,
    pub random_obstacles: usize,
    pub random_items: usize,
}

impl WorldLayout {
    /// A fully random layout.
    pub fn random(width: usize, height: usize, obstacles: usize, items: usize) -> Self {
        WorldLayout {
            width,
            height,
            agent: None,
            goal: None,
            obstacles: None,
            items: None,
            random_obstacles: obstacles,
            random_items: items,
        }
    }

    /// Places agent, goal, obstacles, then items. Agent or goal placement
    /// failures abort the setup.
    pub fn build(&self, seed: Option<u64>) -> Result<GridWorld, PlacementError> {
        let mut world = match seed {
            Some(seed) => GridWorld::with_seed(self.width, self.height, seed)?,
            None => GridWorld::new(self.width, self.height)?,
        };

        world.place_agent(self.agent)?;
        world.place_goal(self.goal)?;
        world.add_obstacles(self.random_obstacles, self.obstacles.as_deref());
        world.add_items(self.random_items, self.items.as_deref());

        Ok(world)
    }
}

/// Errors from parsing a text map.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum MapError {
    #[error("Map string is empty")]
    Empty,
    #[error("Inconsistent width at row {row}: expected {expected}, found {found}")]
    RaggedRow {
        row: usize,
        expected: usize,
        found: usize,
    },
    #[error("Unknown map code '{code}' at position ({x}, {y})")]
    UnknownCode { code: String, x: usize, y: usize },
    #[error("Multiple '{0}' cells found")]
    Duplicate(&'static str),
    #[error("No '{0}' cell found")]
    Missing(&'static str),
}

/// Parses a whitespace-separated token map.
///
/// | Token | Meaning |
/// |-------|---------|
/// | `ST`  | agent start |
/// | `GL`  | goal |
/// | `WL`  | obstacle |
/// | `IT`  | item |
/// | `BL`  | blank floor |
pub fn load_layout_from_string(map_string: &str) -> Result<WorldLayout, MapError> {
    let lines: Vec<&str> = map_string
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .collect();
    if lines.is_empty() {
        return Err(MapError::Empty);
    }

    let width = lines[0].split_whitespace().count();
    let mut agent = None;
    let mut goal = None;
    let mut obstacles = Vec::new();
    let mut items = Vec::new();

    for (y, line) in lines.iter().enumerate() {
        let tokens: Vec<&str> = line.split_whitespace().collect();
        if tokens.len() != width {
            return Err(MapError::RaggedRow {
                row: y,
                expected: width,
                found: tokens.len(),
            });
        }

        for (x, token) in tokens.into_iter().enumerate() {
            let pos = Position { x, y };
            match token {
                "ST" => {
                    if agent.replace(pos).is_some() {
                        return Err(MapError::Duplicate("ST"));
                    }
                }
                "GL" => {
                    if goal.replace(pos).is_some() {
                        return Err(MapError::Duplicate("GL"));
                    }
                }
                "WL" => obstacles.push(pos),
                "IT" => items.push(pos),
                "BL" => {}
                unknown => {
                    return Err(MapError::UnknownCode {
                        code: unknown.to_string(),
                        x,
                        y,
                    });
                }
            }
        }
    }

    Ok(WorldLayout {
        width,
        height: lines.len(),
        agent: Some(agent.ok_or(MapError::Missing("ST"))?),
        goal: Some(goal.ok_or(MapError::Missing("GL"))?),
        obstacles: Some(obstacles),
        items: Some(items),
        random_obstacles: 0,
        random_items: 0,
    })
}

/// Built-in difficulty levels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Difficulty {
    Easy,
    Medium,
    Hard,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("Invalid difficulty: {0}. Must be 'easy', 'medium', or 'hard'")]
pub struct DifficultyParseError(String);

impl FromStr for Difficulty {
    type Err = DifficultyParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "easy" | "e" => Ok(Difficulty::Easy),
            "medium" | "m" => Ok(Difficulty::Medium),
            "hard" | "h" => Ok(Difficulty::Hard),
            _ => Err(DifficultyParseError(s.to_string())),
        }
    }
}

impl fmt::Display for Difficulty {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Difficulty::Easy => "easy",
            Difficulty::Medium => "medium",
            Difficulty::Hard => "hard",
        };
        f.write_str(name)
    }
}

/// A layout together with its step budget and scoring.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Preset {
    pub difficulty: Difficulty,
    pub layout: WorldLayout,
    pub max_steps: usize,
    pub completion_bonus: Option<f64>,
}

fn positions(cells: &[(usize, usize)]) -> Vec<Position> {
    cells.iter().copied().map(Position::from).collect()
}

impl Preset {
    pub fn for_difficulty(difficulty: Difficulty) -> Self {
        match difficulty {
            Difficulty::Easy => Preset {
                difficulty,
                layout: WorldLayout {
                    width: 5,
                    height: 5,
                    agent: Some(Position::new(0, 0)),
                    goal: Some(Position::new(4, 4)),
                    obstacles: Some(positions(&[(2, 1), (1, 3), (3, 2)])),
                    items: Some(positions(&[(3, 4), (1, 1), (0, 4)])),
                    random_obstacles: 0,
                    random_items: 0,
                },
                max_steps: 25,
                completion_bonus: None,
            },
            Difficulty::Medium => Preset {
                difficulty,
                layout: WorldLayout {
                    width: 8,
                    height: 8,
                    agent: Some(Position::new(0, 0)),
                    goal: Some(Position::new(7, 7)),
                    obstacles: Some(positions(&[
                        // Vertical barriers
                        (2, 1),
                        (2, 2),
                        (2, 3),
                        (5, 3),
                        (5, 4),
                        (5, 5),
                        // Horizontal barriers
                        (3, 5),
                        (4, 5),
                        (6, 5),
                        // Scattered
                        (1, 6),
                        (6, 1),
                        (4, 2),
                        (7, 3),
                    ])),
                    items: Some(positions(&[
                        (1, 1),
                        (3, 1),
                        (6, 2),
                        (3, 2),
                        (4, 4),
                        (7, 6),
                        (3, 7),
                    ])),
                    random_obstacles: 0,
                    random_items: 0,
                },
                max_steps: 60,
                completion_bonus: None,
            },
            Difficulty::Hard => Preset {
                difficulty,
                layout: WorldLayout {
                    width: 10,
                    height: 10,
                    agent: Some(Position::new(0, 0)),
                    goal: Some(Position::new(9, 9)),
                    obstacles: Some(positions(&[
                        // Vertical walls
                        (2, 1),
                        (2, 2),
                        (2, 3),
                        (5, 2),
                        (5, 3),
                        (5, 4),
                        (5, 5),
                        // Horizontal walls
                        (0, 6),
                        (1, 6),
                        (2, 6),
                        (6, 3),
                        (7, 3),
                        (8, 2),
                        (3, 8),
                        (4, 8),
                        (5, 8),
                        // Scattered
                        (1, 1),
                        (1, 3),
                        (8, 1),
                        (3, 1),
                        (6, 4),
                        (8, 5),
                        (9, 3),
                        (4, 2),
                        (6, 6),
                        (7, 7),
                    ])),
                    // (9, 3) doubles as an obstacle and is dropped on setup.
                    items: Some(positions(&[
                        (9, 0),
                        (8, 0),
                        (9, 2),
                        (2, 8),
                        (1, 9),
                        (3, 0),
                        (6, 0),
                        (9, 3),
                        (0, 2),
                        (4, 3),
                        (9, 1),
                        (3, 2),
                        (3, 5),
                        (6, 5),
                        (4, 9),
                        (0, 7),
                    ])),
                    random_obstacles: 0,
                    random_items: 0,
                },
                max_steps: 100,
                completion_bonus: Some(5.0),
            },
        }
    }

    pub fn scorer(&self) -> Box<dyn Scorer> {
        match self.completion_bonus {
            Some(bonus) => Box::new(CompletionBonus::new(StandardScorer, bonus)),
            None => Box::new(StandardScorer),
        }
    }

    /// Builds the world and wraps it in a simulation with this preset's
    /// budget and scorer.
    pub fn simulation(&self, seed: Option<u64>) -> Result<Simulation, SetupError> {
        let world = self.layout.build(seed)?;
        Ok(Simulation::new(world, self.max_steps)?.with_scorer(self.scorer()))
    }
}

/// Anything that can go wrong between a preset and a runnable simulation.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SetupError {
    #[error(transparent)]
    Placement(#[from] PlacementError),
    #[error(transparent)]
    Simulation(#[from] SimulationError),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_difficulty_names() {
        assert_eq!(" Hard ".parse::<Difficulty>(), Ok(Difficulty::Hard));
        assert_eq!("m".parse::<Difficulty>(), Ok(Difficulty::Medium));
        assert!("nightmare".parse::<Difficulty>().is_err());
        assert_eq!(Difficulty::Easy.to_string(), "easy");
    }

    #[test]
    fn presets_build_their_fixed_layouts() {
        let easy = Preset::for_difficulty(Difficulty::Easy).layout.build(Some(1)).unwrap();
        assert_eq!(easy.items().len(), 3);
        assert_eq!(easy.obstacle_positions().len(), 3);

        let hard = Preset::for_difficulty(Difficulty::Hard).layout.build(Some(1)).unwrap();
        assert!(hard.is_obstacle(Position::new(9, 3)));
        assert_eq!(hard.items().len(), 15);
        assert_eq!(hard.obstacle_positions().len(), 26);
    }

    #[test]
    fn hard_preset_adds_completion_bonus() {
        let preset = Preset::for_difficulty(Difficulty::Hard);
        assert_eq!(preset.max_steps, 100);
        let stats = crate::score::RunStats {
            success: true,
            steps_taken: 10,
            items_collected: 0,
            total_items_available: 0,
            grid_width: 10,
            grid_height: 10,
        };
        assert!((preset.scorer().score(&stats) - 75.0).abs() < 1e-9);
    }

    #[test]
    fn random_layout_respects_counts() {
        let world = WorldLayout::random(6, 6, 4, 3).build(Some(42)).unwrap();
        assert!(world.agent().is_some());
        assert!(world.goal().is_some());
        assert!(world.obstacle_positions().len() <= 4);
        assert!(world.items().len() <= 3);
    }

    #[test]
    fn loads_token_maps() {
        let layout = load_layout_from_string(
            "ST BL WL\n\
             IT WL BL\n\
             BL BL GL\n",
        )
        .unwrap();
        assert_eq!(layout.width, 3);
        assert_eq!(layout.height, 3);
        assert_eq!(layout.agent, Some(Position::new(0, 0)));
        assert_eq!(layout.goal, Some(Position::new(2, 2)));
        assert_eq!(
            layout.obstacles,
            Some(vec![Position::new(2, 0), Position::new(1, 1)])
        );
        assert_eq!(layout.items, Some(vec![Position::new(0, 1)]));
    }

    #[test]
    fn rejects_malformed_maps() {
        assert_eq!(load_layout_from_string("  \n"), Err(MapError::Empty));
        assert_eq!(
            load_layout_from_string("ST GL\nBL"),
            Err(MapError::RaggedRow {
                row: 1,
                expected: 2,
                found: 1
            })
        );
        assert_eq!(
            load_layout_from_string("ST GL XX"),
            Err(MapError::UnknownCode {
                code: "XX".into(),
                x: 2,
                y: 0
            })
        );
        assert_eq!(
            load_layout_from_string("ST ST GL"),
            Err(MapError::Duplicate("ST"))
        );
        assert_eq!(load_layout_from_string("ST BL"), Err(MapError::Missing("GL")));
    }
}
