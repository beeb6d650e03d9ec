use anyhow::{Context, Result};
use clap::{Parser, ValueEnum};
use gridworld_core::{
    Position,
    preset::{Difficulty, Preset, load_layout_from_string},
    simulation::{EpisodeStatus, ExhaustReason, RunResult, Simulation},
    strategy::{GreedyStrategy, MoveStrategy, MoveStrategyExt, PlanningStrategy, RandomStrategy},
};
use ratatui::{
    crossterm::{
        self,
        event::{self, DisableMouseCapture, EnableMouseCapture, Event, KeyCode},
        execute,
        terminal::{EnterAlternateScreen, LeaveAlternateScreen, disable_raw_mode, enable_raw_mode},
    },
    prelude::*,
    widgets::*,
};
use std::{
    collections::HashSet,
    fs::File,
    io::{self, Stdout},
    path::PathBuf,
    sync::Mutex,
    time::{Duration, Instant},
};
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
struct Args {
    /// Difficulty preset (easy, medium, hard)
    #[arg(short, long, default_value = "medium")]
    difficulty: Difficulty,

    /// Map file to load instead of the preset layout
    #[arg(short, long, value_name = "MAP_FILE")]
    map: Option<PathBuf>,

    /// Move strategy driving the agent
    #[arg(short, long, value_enum, default_value_t = StrategyKind::Greedy)]
    strategy: StrategyKind,

    /// Seed for random placement and random strategies
    #[arg(long)]
    seed: Option<u64>,

    /// Override the preset's step budget
    #[arg(long)]
    max_steps: Option<usize>,

    /// Milliseconds between turns in the live view
    #[arg(long, default_value_t = 250)]
    tick_ms: u64,

    /// Run the episode to completion without the live view
    #[arg(long)]
    headless: bool,

    /// Print the result as JSON (headless only)
    #[arg(long, requires = "headless")]
    json: bool,

    /// Write logs to this file
    #[arg(long, value_name = "LOG_FILE")]
    log_file: Option<PathBuf>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum StrategyKind {
    /// Adjacent items first, then straight for the goal
    Greedy,
    /// A* to the nearest item, then the goal; greedy when stuck
    Planner,
    /// Uniformly random legal moves
    Random,
}

impl StrategyKind {
    fn build(self, seed: u64) -> Box<dyn MoveStrategy> {
        match self {
            StrategyKind::Greedy => Box::new(GreedyStrategy::new(seed)),
            StrategyKind::Planner => {
                Box::new(PlanningStrategy::new().or_fallback(GreedyStrategy::new(seed)))
            }
            StrategyKind::Random => Box::new(RandomStrategy::new(seed)),
        }
    }
}

struct App {
    /// The episode being played.
    simulation: Simulation,
    /// The strategy choosing moves.
    strategy: Box<dyn MoveStrategy>,
    /// Where the layout came from, for the title bar.
    source: String,
    /// Flag to control the main loop.
    should_quit: bool,
}

impl App {
    /// Handles one step of the simulation.
    fn tick(&mut self) {
        if self.simulation.status().is_terminal() {
            return;
        }
        self.simulation.step(self.strategy.as_mut());
    }

    /// Sets the quit flag.
    fn quit(&mut self) {
        self.should_quit = true;
    }
}

fn main() -> Result<()> {
    // Parse command line arguments
    let args = Args::parse();
    init_tracing(&args)?;

    let (simulation, source) = build_simulation(&args)?;
    info!(
        %source,
        strategy = ?args.strategy,
        max_steps = simulation.max_steps(),
        "layout loaded"
    );
    let strategy = args.strategy.build(args.seed.unwrap_or(0));

    if args.headless {
        return run_headless(simulation, strategy, &source, args.json);
    }

    // Set up the terminal
    let mut terminal = setup_terminal()?;

    // Create the application state
    let mut app = App {
        simulation,
        strategy,
        source,
        should_quit: false,
    };

    // Run the main application loop
    let outcome = run_app(&mut terminal, &mut app, Duration::from_millis(args.tick_ms));

    // Restore the terminal state before reporting anything
    restore_terminal(&mut terminal)?;
    outcome?;

    print_summary(
        &app.source,
        app.strategy.name(),
        &app.simulation.result(),
        app.simulation.max_steps(),
    );
    Ok(())
}

/// Installs the log subscriber. The live view owns the terminal, so it only
/// logs when a file is given.
fn init_tracing(args: &Args) -> Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    match &args.log_file {
        Some(path) => {
            let file = File::create(path)
                .with_context(|| format!("Failed to create log file {}", path.display()))?;
            tracing_subscriber::fmt()
                .with_env_filter(filter)
                .with_ansi(false)
                .with_writer(Mutex::new(file))
                .init();
        }
        None if args.headless => {
            tracing_subscriber::fmt()
                .with_env_filter(filter)
                .with_writer(io::stderr)
                .init();
        }
        None => {}
    }
    Ok(())
}

/// Builds the episode from a map file if one is given, else from the preset.
fn build_simulation(args: &Args) -> Result<(Simulation, String)> {
    let mut preset = Preset::for_difficulty(args.difficulty);
    if let Some(max_steps) = args.max_steps {
        preset.max_steps = max_steps;
    }

    let Some(map_file) = &args.map else {
        let simulation = preset
            .simulation(args.seed)
            .with_context(|| format!("Failed to set up {} preset", args.difficulty))?;
        return Ok((simulation, format!("{} preset", args.difficulty)));
    };

    let file_string = std::fs::read_to_string(map_file)
        .with_context(|| format!("Failed to read map file {}", map_file.display()))?;
    let layout = load_layout_from_string(&file_string).context("Failed to parse map")?;
    let world = layout.build(args.seed).context("Failed to set up world")?;
    let simulation = Simulation::new(world, preset.max_steps)?;
    Ok((simulation, map_file.display().to_string()))
}

fn run_headless(
    mut simulation: Simulation,
    mut strategy: Box<dyn MoveStrategy>,
    source: &str,
    json: bool,
) -> Result<()> {
    let result = simulation.run(strategy.as_mut());
    if json {
        println!("{}", serde_json::to_string_pretty(&result)?);
    } else {
        print_summary(source, strategy.name(), &result, simulation.max_steps());
    }
    Ok(())
}

fn print_summary(source: &str, strategy: &str, result: &RunResult, max_steps: usize) {
    let (status, _) = describe_status(result.status);
    println!("Layout:   {source}");
    println!("Strategy: {strategy}");
    println!("Status:   {status}");
    println!("Steps:    {}/{}", result.steps_taken, max_steps);
    println!(
        "Items:    {}/{}",
        result.items_collected, result.total_items_available
    );
    println!("Final:    {}", result.final_position);
    println!("Score:    {:.1}/100.0", result.score);
}

fn describe_status(status: EpisodeStatus) -> (String, Color) {
    match status {
        EpisodeStatus::Running => ("Running".to_string(), Color::Yellow),
        EpisodeStatus::Victory => ("Victory! Goal reached".to_string(), Color::Green),
        EpisodeStatus::Exhausted(reason) => {
            let why = match reason {
                ExhaustReason::StepBudget => "step budget used up".to_string(),
                ExhaustReason::NoLegalMoves => "no legal moves".to_string(),
                ExhaustReason::NoDecision => "strategy gave no move".to_string(),
                ExhaustReason::IllegalMove(pos) => format!("illegal move to {pos}"),
            };
            (format!("Failed: {why}"), Color::Red)
        }
    }
}

/// Configures the terminal for TUI interaction.
fn setup_terminal() -> Result<Terminal<CrosstermBackend<Stdout>>> {
    let mut stdout = io::stdout();
    enable_raw_mode()?; // Put terminal in raw mode
    execute!(stdout, EnterAlternateScreen, EnableMouseCapture)?; // Use alternate screen and enable mouse capture
    let backend = CrosstermBackend::new(stdout);
    Terminal::new(backend).map_err(Into::into) // Map io::Error to anyhow::Error
}

/// Restores the terminal to its original state.
fn restore_terminal(terminal: &mut Terminal<CrosstermBackend<Stdout>>) -> Result<()> {
    disable_raw_mode()?;
    execute!(
        terminal.backend_mut(),
        LeaveAlternateScreen,
        DisableMouseCapture
    )?;
    terminal.show_cursor()?;
    Ok(())
}

/// Runs the main loop of the TUI application.
fn run_app(
    terminal: &mut Terminal<CrosstermBackend<Stdout>>,
    app: &mut App,
    tick_rate: Duration,
) -> Result<()> {
    let mut last_tick = Instant::now();

    loop {
        // Draw the UI
        terminal.draw(|f| ui(f, app))?;

        // Calculate timeout for event polling
        let timeout = tick_rate
            .checked_sub(last_tick.elapsed())
            .unwrap_or_else(|| Duration::from_secs(0));

        // Poll for events (keyboard, mouse, etc.)
        if crossterm::event::poll(timeout)? {
            if let Event::Key(key) = event::read()? {
                if let KeyCode::Char('q') | KeyCode::Esc = key.code {
                    app.quit();
                }
            }
        }

        // Update application state if enough time has passed
        if last_tick.elapsed() >= tick_rate {
            app.tick(); // Perform simulation step
            last_tick = Instant::now();
        }

        // Exit loop if requested
        if app.should_quit {
            break;
        }
    }
    Ok(())
}

/// Renders the user interface.
fn ui(frame: &mut Frame, app: &App) {
    let main_layout = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Percentage(70), // Area for the map
            Constraint::Percentage(20), // Area for episode stats
            Constraint::Percentage(10), // Area for status/help
        ])
        .split(frame.area());

    render_map(frame, main_layout[0], app);
    render_stats(frame, main_layout[1], app);

    let help = if app.simulation.status().is_terminal() {
        "Episode over. Press 'q' or 'Esc' to quit."
    } else {
        "Press 'q' or 'Esc' to quit."
    };
    let help_text = Paragraph::new(help)
        .alignment(Alignment::Center)
        .block(Block::default().borders(Borders::TOP));
    frame.render_widget(help_text, main_layout[2]);
}

/// Renders the episode statistics onto the frame.
fn render_stats(frame: &mut Frame, area: Rect, app: &App) {
    let simulation = &app.simulation;
    let result = simulation.result();
    let (status, status_color) = describe_status(result.status);

    let lines = vec![
        ListItem::from(Line::from(vec![
            Span::raw("Strategy: "),
            Span::styled(app.strategy.name().to_string(), Style::default().bold()),
        ])),
        ListItem::from(Line::from(vec![
            Span::raw("Status: "),
            Span::styled(status, Style::default().fg(status_color)),
        ])),
        ListItem::from(format!(
            "Steps: {}/{}  Items: {}/{}  Position: {}",
            result.steps_taken,
            simulation.max_steps(),
            result.items_collected,
            result.total_items_available,
            result.final_position
        )),
        ListItem::from(format!("Score: {:.1}/100.0", result.score)),
    ];

    let stats_widget =
        List::new(lines).block(Block::default().borders(Borders::ALL).title("Episode"));
    frame.render_widget(stats_widget, area);
}

/// Renders the world map onto the frame.
fn render_map(frame: &mut Frame, area: Rect, app: &App) {
    let world = app.simulation.world();
    let agent = world.agent().map(|a| a.position);
    let goal = world.goal();
    let items: HashSet<Position> = world.items().iter().copied().collect();
    let visited: HashSet<Position> = app.simulation.path().iter().copied().collect();

    let mut lines: Vec<Line> = Vec::with_capacity(world.height());

    for y in 0..world.height() {
        let mut spans: Vec<Span> = Vec::with_capacity(world.width());
        for x in 0..world.width() {
            let pos = Position { x, y };
            // Agent takes priority, then goal, items, obstacles and the trail
            let span = if agent == Some(pos) {
                Span::styled("@ ", Style::default().fg(Color::Red).bold())
            } else if goal == Some(pos) {
                Span::styled("G ", Style::default().fg(Color::Green).bold())
            } else if items.contains(&pos) {
                Span::styled("$ ", Style::default().fg(Color::Yellow))
            } else if world.is_obstacle(pos) {
                Span::styled("# ", Style::default().fg(Color::DarkGray))
            } else if visited.contains(&pos) {
                Span::styled(". ", Style::default().fg(Color::Blue))
            } else {
                Span::raw("  ")
            };
            spans.push(span);
        }
        lines.push(Line::from(spans));
    }

    let title = format!(
        "Grid World {}x{} ({})",
        world.width(),
        world.height(),
        app.source
    );
    let map_paragraph = Paragraph::new(lines)
        .block(Block::default().title(title).borders(Borders::ALL))
        .alignment(Alignment::Center);

    frame.render_widget(map_paragraph, area);
}
