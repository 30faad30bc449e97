use anyhow::{Context, Result};
use clap::Parser;
use cleaning_world_core::{
    Action, Colour, Diagnostic, Grid, Location, Orientation, TickReport, World,
    scenario::{ScenarioConfig, populate},
    tick::ActionOutcome,
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
    collections::VecDeque,
    fs::File,
    io::{self, Stdout},
    path::PathBuf,
    sync::Mutex,
    time::{Duration, Instant},
};
use tracing_subscriber::EnvFilter;

/// Lines kept in the on-screen event log.
const LOG_CAPACITY: usize = 200;

#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
struct Args {
    /// TOML scenario file; the flags below override its values
    #[arg(short, long, value_name = "CONFIG_FILE")]
    config: Option<PathBuf>,

    /// Side length of the grid
    #[arg(long)]
    dim: Option<i32>,

    /// Number of white cleaners
    #[arg(long)]
    white: Option<usize>,

    /// Number of green cleaners
    #[arg(long)]
    green: Option<usize>,

    /// Number of orange cleaners
    #[arg(long)]
    orange: Option<usize>,

    /// Number of dirt-dropping user agents
    #[arg(long)]
    users: Option<usize>,

    /// Number of dirt items placed at start
    #[arg(long)]
    dirts: Option<usize>,

    /// Seed for placement and for the random minds
    #[arg(long)]
    seed: Option<u64>,

    /// Run this many ticks without the terminal UI and print the final grid
    #[arg(long, value_name = "TICKS")]
    headless: Option<u64>,

    /// Write logs to this file
    #[arg(long, value_name = "LOG_FILE")]
    log_file: Option<PathBuf>,

    /// Milliseconds between ticks
    #[arg(long, default_value_t = 250)]
    tick_ms: u64,
}

impl Args {
    /// Reads the scenario file, if any, and applies flag overrides on top.
    fn scenario(&self) -> Result<ScenarioConfig> {
        let mut config = match &self.config {
            Some(path) => {
                let text = std::fs::read_to_string(path)
                    .with_context(|| format!("Failed to read config file {}", path.display()))?;
                toml::from_str(&text)
                    .with_context(|| format!("Failed to parse config file {}", path.display()))?
            }
            None => ScenarioConfig::default(),
        };
        if let Some(dim) = self.dim {
            config.dim = dim;
        }
        if let Some(white) = self.white {
            config.white = white;
        }
        if let Some(green) = self.green {
            config.green = green;
        }
        if let Some(orange) = self.orange {
            config.orange = orange;
        }
        if let Some(users) = self.users {
            config.users = users;
        }
        if let Some(dirts) = self.dirts {
            config.dirts = dirts;
        }
        if let Some(seed) = self.seed {
            config.seed = seed;
        }
        Ok(config)
    }
}

/// Installs the tracing subscriber. Without a log file the TUI stays silent so the
/// alternate screen is not overwritten; headless runs log to stderr.
fn init_logging(args: &Args) -> Result<()> {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("cleaning_world_core=info,cleaning_world_tui=info"));
    match (&args.log_file, args.headless) {
        (Some(path), _) => {
            let file = File::create(path)
                .with_context(|| format!("Failed to create log file {}", path.display()))?;
            tracing_subscriber::fmt()
                .with_env_filter(filter)
                .with_ansi(false)
                .with_writer(Mutex::new(file))
                .init();
        }
        (None, Some(_)) => {
            tracing_subscriber::fmt()
                .with_env_filter(filter)
                .with_writer(io::stderr)
                .init();
        }
        (None, None) => {}
    }
    Ok(())
}

struct App {
    /// Scenario the current world was generated from.
    config: ScenarioConfig,
    /// The core simulation world.
    world: World,
    /// Most recent events, newest last.
    log: VecDeque<String>,
    /// Flag to control the main loop.
    should_quit: bool,
    paused: bool,
    /// Set when a tick failed in a way the world cannot recover from.
    halted: Option<String>,
}

impl App {
    fn new(config: ScenarioConfig) -> Result<Self> {
        let world = populate(&config).context("Failed to build scenario")?;
        Ok(App {
            config,
            world,
            log: VecDeque::with_capacity(LOG_CAPACITY),
            should_quit: false,
            paused: false,
            halted: None,
        })
    }

    /// Handles one step of the simulation.
    fn tick(&mut self) {
        if self.halted.is_some() {
            return;
        }
        match self.world.step() {
            Ok(report) => self.record(&report),
            Err(error) => {
                tracing::error!(%error, "simulation halted");
                self.halted = Some(error.to_string());
            }
        }
    }

    fn record(&mut self, report: &TickReport) {
        let tick = self.world.ticks();
        for line in describe(report) {
            self.push_log(format!("[{}] {}", tick, line));
        }
    }

    fn push_log(&mut self, line: String) {
        if self.log.len() == LOG_CAPACITY {
            self.log.pop_front();
        }
        self.log.push_back(line);
    }

    /// Rebuilds the world from the next seed.
    fn regenerate(&mut self) -> Result<()> {
        self.config.seed = self.config.seed.wrapping_add(1);
        self.world = populate(&self.config).context("Failed to build scenario")?;
        self.halted = None;
        self.push_log(format!("regenerated with seed {}", self.config.seed));
        Ok(())
    }

    /// Sets the quit flag.
    fn quit(&mut self) {
        self.should_quit = true;
    }
}

/// Human-readable lines for the diagnostics, successful dirt changes and queued messages.
fn describe(report: &TickReport) -> Vec<String> {
    let mut lines = Vec::new();
    for diagnostic in &report.diagnostics {
        lines.push(match diagnostic {
            Diagnostic::Rejected { agent, error } => format!("{} rejected: {}", agent, error),
            Diagnostic::MessageTruncated {
                agent,
                original_size,
                bounded_size,
            } => format!(
                "{} message truncated from {} to {}",
                agent, original_size, bounded_size
            ),
        });
    }
    for record in &report.outcomes {
        let changed_dirt = matches!(record.action, Action::Clean | Action::Drop(_));
        if changed_dirt && record.outcome == ActionOutcome::Success {
            lines.push(format!("{} {:?}", record.agent, record.action));
        }
    }
    for (recipient, message) in report.inboxes.iter() {
        lines.push(format!("{} -> {}: {}", message.sender, recipient, message.content));
    }
    lines
}

fn main() -> Result<()> {
    // Parse command line arguments
    let args = Args::parse();
    init_logging(&args)?;
    let config = args.scenario()?;

    if let Some(ticks) = args.headless {
        return run_headless(config, ticks);
    }

    // Create the application state before touching the terminal so errors print cleanly
    let mut app = App::new(config)?;

    // Set up the terminal
    let mut terminal = setup_terminal()?;

    // Run the main application loop
    let result = run_app(&mut terminal, &mut app, Duration::from_millis(args.tick_ms));

    // Restore the terminal state
    restore_terminal(&mut terminal)?;

    result
}

/// Runs the simulation without a UI and prints the final state.
fn run_headless(config: ScenarioConfig, ticks: u64) -> Result<()> {
    let mut world = populate(&config).context("Failed to build scenario")?;
    for _ in 0..ticks {
        let report = world.step().context("Simulation halted")?;
        for line in describe(&report) {
            tracing::info!(tick = world.ticks(), "{}", line);
        }
    }
    let grid = world.grid();
    print!("{}", grid_text(grid));
    for (at, dirt) in grid.dirts() {
        println!("{} {:?} at {}", dirt.id, dirt.colour, at);
    }
    println!(
        "ticks: {}  agents: {}  dirt remaining: {}  dirt dropped: {}",
        world.ticks(),
        grid.agent_count(),
        dirt_summary(grid),
        (grid.dirts_minted() as usize).saturating_sub(config.dirts),
    );
    Ok(())
}

/// Remaining dirt split by colour, e.g. `3 (2 green, 1 orange)`.
fn dirt_summary(grid: &Grid) -> String {
    let green = grid
        .dirts()
        .filter(|(_, dirt)| dirt.colour == Colour::Green)
        .count();
    let orange = grid
        .dirts()
        .filter(|(_, dirt)| dirt.colour == Colour::Orange)
        .count();
    format!("{} ({} green, {} orange)", green + orange, green, orange)
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
                match key.code {
                    KeyCode::Char('q') | KeyCode::Esc => app.quit(),
                    KeyCode::Char(' ') => app.paused = !app.paused,
                    KeyCode::Char('n') if app.paused => app.tick(),
                    KeyCode::Char('r') => app.regenerate()?,
                    _ => {}
                }
            }
        }

        // Update application state if enough time has passed
        if last_tick.elapsed() >= tick_rate {
            if !app.paused {
                app.tick(); // Perform simulation step
            }
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
            Constraint::Percentage(65), // Area for the grid
            Constraint::Percentage(25), // Area for the event log
            Constraint::Percentage(10), // Area for status/help
        ])
        .split(frame.area());

    render_grid(frame, main_layout[0], app.world.grid());
    render_log(frame, main_layout[1], &app.log);

    let grid = app.world.grid();
    let state = match (&app.halted, app.paused) {
        (Some(reason), _) => format!("HALTED: {}", reason),
        (None, true) => "paused".to_string(),
        (None, false) => "running".to_string(),
    };
    let status = format!(
        "Tick {} | agents {} | dirt {} | {} | q quit, space pause, n step, r regenerate",
        app.world.ticks(),
        grid.agent_count(),
        dirt_summary(grid),
        state
    );
    let help_text = Paragraph::new(status)
        .alignment(Alignment::Center)
        .block(Block::default().borders(Borders::TOP));
    frame.render_widget(help_text, main_layout[2]);
}

fn render_log(frame: &mut Frame, area: Rect, log: &VecDeque<String>) {
    let visible = area.height.saturating_sub(2) as usize;
    let items: Vec<ListItem> = log
        .iter()
        .skip(log.len().saturating_sub(visible))
        .map(|line| ListItem::new(line.as_str()))
        .collect();
    let log_widget = List::new(items).block(Block::default().borders(Borders::ALL).title("Events"));
    frame.render_widget(log_widget, area);
}

fn colour_of(colour: Colour) -> Color {
    match colour {
        Colour::White => Color::White,
        Colour::Green => Color::Green,
        Colour::Orange => Color::Rgb(255, 140, 0),
        Colour::User => Color::Magenta,
    }
}

fn glyph(location: &Location) -> char {
    match (&location.agent, &location.dirt) {
        (Some(agent), _) => match agent.orientation {
            Orientation::North => '^',
            Orientation::East => '>',
            Orientation::South => 'v',
            Orientation::West => '<',
        },
        (None, Some(_)) => '*',
        (None, None) => '.',
    }
}

/// Plain-text rendering used by headless runs.
fn grid_text(grid: &Grid) -> String {
    let mut text = String::new();
    for (index, location) in grid.locations().enumerate() {
        text.push(glyph(location));
        if (index + 1) % grid.dim() as usize == 0 {
            text.push('\n');
        } else {
            text.push(' ');
        }
    }
    text
}

/// Renders the grid onto the frame. Agents standing on dirt get the dirt colour as background.
fn render_grid(frame: &mut Frame, area: Rect, grid: &Grid) {
    let dim = grid.dim() as usize;
    let mut lines: Vec<Line> = Vec::with_capacity(dim);
    let mut spans: Vec<Span> = Vec::with_capacity(dim * 2);

    for location in grid.locations() {
        let mut style = Style::default();
        match (&location.agent, &location.dirt) {
            (Some(agent), dirt) => {
                style = style.fg(colour_of(agent.colour)).bold();
                if let Some(dirt) = dirt {
                    style = style.bg(colour_of(dirt.colour));
                }
            }
            (None, Some(dirt)) => style = style.fg(colour_of(dirt.colour)),
            (None, None) => style = style.fg(Color::DarkGray),
        }
        spans.push(Span::styled(glyph(location).to_string(), style));
        spans.push(Span::raw(" "));

        if location.coord.x as usize + 1 == dim {
            lines.push(Line::from(std::mem::take(&mut spans)));
        }
    }

    let grid_paragraph = Paragraph::new(lines)
        .block(Block::default().title("Cleaning World").borders(Borders::ALL))
        .alignment(Alignment::Center);

    frame.render_widget(grid_paragraph, area);
}
