use std::{cmp, collections::HashMap, io, thread, time::Duration};

use anyhow::{anyhow, bail, Context, Result};
use chrono::{DateTime, Local, Utc};
use crossterm::{
    event::{self, Event, KeyCode, KeyEvent, KeyEventKind, KeyModifiers},
    execute,
    terminal::{disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen},
};
use gameslist_core::{
    import::import_workbook,
    library::GameEdit,
    models::{Feedback, Game, GameStatus, Rating, Stars, Tag},
    presence::{Presence, PresenceState},
    stats::{session_rating_summary, LibraryStats},
    store::{Store, StoreManager},
    timefmt::{format_hms, format_short, parse_hms},
    timer::TimerStatus,
    tracker::Tracker,
    updates::UpdateEvent,
};
use ratatui::{
    backend::CrosstermBackend,
    layout::{Alignment, Constraint, Direction, Layout, Rect},
    style::{Color, Modifier, Style},
    text::{Line, Span},
    widgets::{
        BarChart, Block, Borders, Clear, List, ListItem, ListState, Paragraph, Sparkline, Tabs,
        Wrap,
    },
    Frame, Terminal,
};
use tokio::{
    sync::mpsc,
    time::{self, MissedTickBehavior},
};
use tracing::{debug, error, info, warn};

use crate::block_font;

const INPUT_POLL: Duration = Duration::from_millis(100);
const MAX_INPUT_LEN: usize = 256;
const RECENT_SESSIONS: usize = 5;
const TIMELINE_DAYS: i64 = 30;

#[derive(Debug, Clone)]
struct Theme {
    primary_fg: Color,
    accent: Color,
    muted: Color,
    selection_bg: Color,
    success: Color,
    warning: Color,
    danger: Color,
}

impl Default for Theme {
    fn default() -> Self {
        Self {
            primary_fg: Color::White,
            accent: Color::Cyan,
            muted: Color::DarkGray,
            selection_bg: Color::DarkGray,
            success: Color::Green,
            warning: Color::Yellow,
            danger: Color::Red,
        }
    }
}

impl Theme {
    fn status_color(&self, status: GameStatus) -> Color {
        match status {
            GameStatus::Pending => self.muted,
            GameStatus::InProgress => self.warning,
            GameStatus::Completed => self.success,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Screen {
    Library,
    Timer,
    Stats,
    Help,
}

impl Screen {
    const ALL: [Screen; 4] = [Self::Library, Self::Timer, Self::Stats, Self::Help];

    fn title(self) -> &'static str {
        match self {
            Self::Library => "Library",
            Self::Timer => "Timer",
            Self::Stats => "Stats",
            Self::Help => "Help",
        }
    }
}

/// Every user action the UI understands.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Command {
    Quit,
    Back,
    Up,
    Down,
    PageUp,
    PageDown,
    Top,
    Bottom,
    ShowLibrary,
    ShowTimer,
    ShowStats,
    ShowHelp,
    Filter,
    AddGame,
    RemoveGame,
    CycleStatus,
    ToggleOwned,
    EditPlatform,
    StartSession,
    TogglePause,
    StopSession,
    ManualSession,
    RateGame,
    SessionNote,
    ToggleNotePrompt,
    Import,
    ToggleDiscord,
}

struct Binding {
    keys: &'static [KeyCode],
    label: &'static str,
    command: Command,
    help: &'static str,
}

const KEYMAP: &[Binding] = &[
    Binding { keys: &[KeyCode::Char('q')], label: "q", command: Command::Quit, help: "Quit (an active session is saved)" },
    Binding { keys: &[KeyCode::Esc], label: "Esc", command: Command::Back, help: "Back to library / clear filter" },
    Binding { keys: &[KeyCode::Up, KeyCode::Char('k')], label: "↑/k", command: Command::Up, help: "Previous game" },
    Binding { keys: &[KeyCode::Down, KeyCode::Char('j')], label: "↓/j", command: Command::Down, help: "Next game" },
    Binding { keys: &[KeyCode::PageUp], label: "PgUp", command: Command::PageUp, help: "Page up" },
    Binding { keys: &[KeyCode::PageDown], label: "PgDn", command: Command::PageDown, help: "Page down" },
    Binding { keys: &[KeyCode::Home, KeyCode::Char('g')], label: "g", command: Command::Top, help: "First game" },
    Binding { keys: &[KeyCode::End, KeyCode::Char('G')], label: "G", command: Command::Bottom, help: "Last game" },
    Binding { keys: &[KeyCode::Char('1')], label: "1", command: Command::ShowLibrary, help: "Library screen" },
    Binding { keys: &[KeyCode::Char('2')], label: "2", command: Command::ShowTimer, help: "Timer screen" },
    Binding { keys: &[KeyCode::Char('3')], label: "3", command: Command::ShowStats, help: "Statistics screen" },
    Binding { keys: &[KeyCode::Char('?'), KeyCode::F(1)], label: "?", command: Command::ShowHelp, help: "This help" },
    Binding { keys: &[KeyCode::Char('/')], label: "/", command: Command::Filter, help: "Filter by name or platform" },
    Binding { keys: &[KeyCode::Char('a')], label: "a", command: Command::AddGame, help: "Add a game" },
    Binding { keys: &[KeyCode::Char('x'), KeyCode::Delete], label: "x", command: Command::RemoveGame, help: "Remove the selected game" },
    Binding { keys: &[KeyCode::Char('s')], label: "s", command: Command::CycleStatus, help: "Cycle status" },
    Binding { keys: &[KeyCode::Char('o')], label: "o", command: Command::ToggleOwned, help: "Toggle owned" },
    Binding { keys: &[KeyCode::Char('p')], label: "p", command: Command::EditPlatform, help: "Edit platform" },
    Binding { keys: &[KeyCode::Enter], label: "Enter", command: Command::StartSession, help: "Start a session for the selected game" },
    Binding { keys: &[KeyCode::Char(' ')], label: "Space", command: Command::TogglePause, help: "Pause / resume the session" },
    Binding { keys: &[KeyCode::Char('e')], label: "e", command: Command::StopSession, help: "End and record the session" },
    Binding { keys: &[KeyCode::Char('m')], label: "m", command: Command::ManualSession, help: "Add a session by hand" },
    Binding { keys: &[KeyCode::Char('r')], label: "r", command: Command::RateGame, help: "Rate the selected game" },
    Binding { keys: &[KeyCode::Char('n')], label: "n", command: Command::SessionNote, help: "Feedback for the latest session" },
    Binding { keys: &[KeyCode::Char('N')], label: "N", command: Command::ToggleNotePrompt, help: "Ask for feedback after each session" },
    Binding { keys: &[KeyCode::Char('i')], label: "i", command: Command::Import, help: "Import a spreadsheet" },
    Binding { keys: &[KeyCode::Char('d')], label: "d", command: Command::ToggleDiscord, help: "Toggle Discord presence" },
];

fn command_for(key: &KeyEvent) -> Option<Command> {
    if key.modifiers == KeyModifiers::CONTROL && key.code == KeyCode::Char('c') {
        return Some(Command::Quit);
    }
    if !(key.modifiers.is_empty() || key.modifiers == KeyModifiers::SHIFT) {
        return None;
    }
    KEYMAP
        .iter()
        .find(|binding| binding.keys.contains(&key.code))
        .map(|binding| binding.command)
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum PromptKind {
    AddGame,
    Filter,
    Import,
    Platform { game: String },
    Rate { game: String },
    SessionNote { game: String, index: usize },
    ManualSession { game: String },
    ConfirmRemove { game: String },
}

impl PromptKind {
    fn title(&self) -> String {
        match self {
            Self::AddGame => "Add game".to_string(),
            Self::Filter => "Filter".to_string(),
            Self::Import => "Import spreadsheet".to_string(),
            Self::Platform { game } => format!("Platform - {game}"),
            Self::Rate { game } => format!("Rate - {game}"),
            Self::SessionNote { game, index } => format!("Session #{} - {game}", index + 1),
            Self::ManualSession { game } => format!("Manual session - {game}"),
            Self::ConfirmRemove { game } => format!("Remove - {game}"),
        }
    }

    fn instruction(&self) -> &'static str {
        match self {
            Self::AddGame => "Name of the new game",
            Self::Filter => "Show games whose name or platform contains",
            Self::Import => "Path to an .xlsx file with a Name header",
            Self::Platform { .. } => "Platform (empty clears it)",
            Self::Rate { .. } => "Stars 1-5, optional tags and comment: 4 Fun, Epic: comment",
            Self::SessionNote { .. } => "Notes, or a rating first: 4* Fun, Relaxing: notes",
            Self::ManualSession { .. } => "Duration played, HH:MM or HH:MM:SS, ending now",
            Self::ConfirmRemove { .. } => "Type yes to remove the game and its sessions",
        }
    }
}

#[derive(Debug, Clone)]
struct TextPrompt {
    kind: PromptKind,
    input: String,
    /// Cursor position in characters.
    cursor: usize,
}

impl TextPrompt {
    fn new(kind: PromptKind, initial: impl Into<String>) -> Self {
        let input: String = initial.into();
        let cursor = input.chars().count();
        Self {
            kind,
            input,
            cursor,
        }
    }

    fn len(&self) -> usize {
        self.input.chars().count()
    }

    fn byte_index(&self, cursor: usize) -> usize {
        self.input
            .char_indices()
            .nth(cursor)
            .map_or(self.input.len(), |(index, _)| index)
    }

    fn move_cursor(&mut self, delta: isize) {
        let next = self.cursor as isize + delta;
        self.cursor = next.clamp(0, self.len() as isize) as usize;
    }

    fn move_home(&mut self) {
        self.cursor = 0;
    }

    fn move_end(&mut self) {
        self.cursor = self.len();
    }

    fn insert(&mut self, ch: char) {
        if self.len() >= MAX_INPUT_LEN || ch.is_control() {
            return;
        }
        let index = self.byte_index(self.cursor);
        self.input.insert(index, ch);
        self.cursor += 1;
    }

    fn backspace(&mut self) {
        if self.cursor > 0 {
            self.cursor -= 1;
            let index = self.byte_index(self.cursor);
            self.input.remove(index);
        }
    }

    fn delete(&mut self) {
        if self.cursor < self.len() {
            let index = self.byte_index(self.cursor);
            self.input.remove(index);
        }
    }

    fn value(&self) -> String {
        self.input.trim().to_string()
    }
}

enum AppEvent {
    Input(Event),
    Tick,
    Update(UpdateEvent),
}

/// Terminal front end over a loaded library.
pub struct GamesListApp {
    store: Store,
    manager: StoreManager,
    tracker: Tracker,
    presence: Presence,
    state: UiState,
    screen: Screen,
    prompt: Option<TextPrompt>,
    theme: Theme,
    tick_rate: Duration,
    update_rx: Option<mpsc::Receiver<UpdateEvent>>,
    stats: Option<LibraryStats>,
}

impl GamesListApp {
    pub fn new(
        store: Store,
        manager: StoreManager,
        tracker: Tracker,
        presence: Presence,
        tick_rate: Duration,
    ) -> Self {
        Self {
            store,
            manager,
            tracker,
            presence,
            state: UiState::default(),
            screen: Screen::Library,
            prompt: None,
            theme: Theme::default(),
            tick_rate,
            update_rx: None,
            stats: None,
        }
    }

    pub fn attach_updates(&mut self, receiver: mpsc::Receiver<UpdateEvent>) {
        self.update_rx = Some(receiver);
    }

    pub async fn run(&mut self) -> Result<()> {
        self.refresh_visible(None);
        self.state.set_status(format!(
            "Loaded {} games from {}",
            self.store.games.len(),
            self.manager.path().display()
        ));

        let mut stdout = io::stdout();
        enable_raw_mode().context("failed to enter raw mode")?;
        execute!(stdout, EnterAlternateScreen).context("failed to enter alternate screen")?;
        let backend = CrosstermBackend::new(stdout);
        let mut terminal = Terminal::new(backend).context("failed to create terminal")?;
        terminal.hide_cursor()?;
        terminal.clear()?;

        let (event_tx, mut event_rx) = mpsc::channel::<Event>(128);
        spawn_input_thread(event_tx);

        let result = self.event_loop(&mut terminal, &mut event_rx).await;
        let restored = restore_terminal(&mut terminal);
        let finalized = self.shutdown();
        result.and(restored).and(finalized)
    }

    async fn event_loop(
        &mut self,
        terminal: &mut Terminal<CrosstermBackend<io::Stdout>>,
        event_rx: &mut mpsc::Receiver<Event>,
    ) -> Result<()> {
        let mut ticker = time::interval(self.tick_rate);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let mut update_rx = self.update_rx.take();

        loop {
            terminal.draw(|frame| self.draw(frame))?;
            if self.state.should_quit {
                break;
            }

            let mut updates_closed = false;
            let event = tokio::select! {
                maybe_input = event_rx.recv() => maybe_input.map(AppEvent::Input),
                _ = ticker.tick() => Some(AppEvent::Tick),
                maybe_update = next_update(&mut update_rx) => match maybe_update {
                    Some(update) => Some(AppEvent::Update(update)),
                    None => {
                        updates_closed = true;
                        Some(AppEvent::Tick)
                    }
                },
            };
            if updates_closed {
                update_rx = None;
            }
            if !self.process_app_event(event) {
                break;
            }
        }
        Ok(())
    }

    /// Finalize an active session and clear the presence before exit.
    fn shutdown(&mut self) -> Result<()> {
        let finished = finish_active_session(&mut self.tracker, &mut self.store, &self.manager);
        self.stats = None;
        self.presence.clear();
        match &finished {
            Ok(Some(game)) => info!(%game, "Saved the active session on exit"),
            Ok(None) => info!("Exited cleanly"),
            Err(err) => error!(error = %err, "Active session could not be saved on exit"),
        }
        finished.map(|_| ())
    }

    fn process_app_event(&mut self, maybe_event: Option<AppEvent>) -> bool {
        match maybe_event {
            Some(AppEvent::Input(Event::Key(key))) => {
                if key.kind == KeyEventKind::Release {
                    return true;
                }
                let result = if self.prompt.is_some() {
                    self.handle_prompt_key(key)
                } else if let Some(command) = command_for(&key) {
                    self.dispatch(command)
                } else {
                    Ok(())
                };
                if let Err(err) = result {
                    debug!(error = %err, "Command failed");
                    self.state.set_status(format!("Error: {err:#}"));
                }
                true
            }
            Some(AppEvent::Input(_)) => true,
            Some(AppEvent::Tick) => {
                self.handle_tick();
                true
            }
            Some(AppEvent::Update(update)) => {
                self.handle_update_event(update);
                true
            }
            None => false,
        }
    }

    fn handle_tick(&mut self) {
        let state = match self.tracker.active_game() {
            Some(game) => PresenceState::Playing {
                game: game.to_string(),
                elapsed: self.tracker.elapsed().unwrap_or_default(),
                paused: self.tracker.status() == TimerStatus::Paused,
            },
            None => PresenceState::Browsing {
                screen: self.screen.title().to_string(),
            },
        };
        self.presence.update(state);
    }

    fn handle_update_event(&mut self, event: UpdateEvent) {
        match event {
            UpdateEvent::Available { version, url } => {
                self.state
                    .set_status(format!("Version {version} is available: {url}"));
            }
            UpdateEvent::UpToDate => debug!("Running the latest release"),
            UpdateEvent::Failed(err) => warn!(error = %err, "Update check failed"),
        }
    }

    fn dispatch(&mut self, command: Command) -> Result<()> {
        match command {
            Command::Quit => self.state.should_quit = true,
            Command::Back => {
                if self.screen != Screen::Library {
                    self.screen = Screen::Library;
                } else if !self.state.filter.is_empty() {
                    self.state.filter.clear();
                    self.refresh_visible(None);
                    self.state.set_status("Filter cleared".to_string());
                }
            }
            Command::Up => self.state.move_cursor(-1),
            Command::Down => self.state.move_cursor(1),
            Command::PageUp => self.state.page_up(),
            Command::PageDown => self.state.page_down(),
            Command::Top => self.state.move_to(0),
            Command::Bottom => self.state.move_to_end(),
            Command::ShowLibrary => self.screen = Screen::Library,
            Command::ShowTimer => self.screen = Screen::Timer,
            Command::ShowStats => self.screen = Screen::Stats,
            Command::ShowHelp => self.screen = Screen::Help,
            Command::Filter => {
                self.prompt = Some(TextPrompt::new(PromptKind::Filter, self.state.filter.clone()));
            }
            Command::AddGame => self.prompt = Some(TextPrompt::new(PromptKind::AddGame, "")),
            Command::Import => self.prompt = Some(TextPrompt::new(PromptKind::Import, "")),
            Command::RemoveGame => {
                let game = self.selected_name()?;
                if self.tracker.active_game() == Some(game.as_str()) {
                    bail!("stop the session for {game} before removing it");
                }
                self.prompt = Some(TextPrompt::new(PromptKind::ConfirmRemove { game }, ""));
            }
            Command::CycleStatus => {
                let game = self.selected_game()?;
                let (name, next) = (game.name.clone(), game.status.next());
                self.store.set_status(&name, next)?;
                self.persist()?;
                self.state.set_status(format!("{name} is now {next}"));
            }
            Command::ToggleOwned => {
                let game = self.selected_game()?;
                let (name, owned) = (game.name.clone(), !game.owned);
                self.store.update_game(
                    &name,
                    GameEdit {
                        owned: Some(owned),
                        ..GameEdit::default()
                    },
                )?;
                self.persist()?;
                let label = if owned { "owned" } else { "not owned" };
                self.state.set_status(format!("{name} marked {label}"));
            }
            Command::EditPlatform => {
                let game = self.selected_game()?;
                let prompt = TextPrompt::new(
                    PromptKind::Platform {
                        game: game.name.clone(),
                    },
                    game.platform.clone(),
                );
                self.prompt = Some(prompt);
            }
            Command::StartSession => {
                let game = self.selected_name()?;
                self.tracker.start(&game)?;
                self.screen = Screen::Timer;
                self.state.set_status(format!("Tracking {game}"));
            }
            Command::TogglePause => {
                let status = self.tracker.toggle_pause()?;
                let label = if status == TimerStatus::Paused {
                    "Paused"
                } else {
                    "Resumed"
                };
                self.state.set_status(label.to_string());
            }
            Command::StopSession => self.stop_session()?,
            Command::ManualSession => {
                let game = self.selected_name()?;
                self.prompt = Some(TextPrompt::new(PromptKind::ManualSession { game }, ""));
            }
            Command::RateGame => {
                let game = self.selected_game()?;
                let initial = game.rating.as_ref().map(rating_input).unwrap_or_default();
                let prompt = TextPrompt::new(
                    PromptKind::Rate {
                        game: game.name.clone(),
                    },
                    initial,
                );
                self.prompt = Some(prompt);
            }
            Command::SessionNote => {
                let game = self.selected_game()?;
                let index = game
                    .sessions
                    .len()
                    .checked_sub(1)
                    .ok_or_else(|| anyhow!("{} has no sessions yet", game.name))?;
                let initial = game.sessions[index]
                    .feedback
                    .as_ref()
                    .map(feedback_input)
                    .unwrap_or_default();
                let prompt = TextPrompt::new(
                    PromptKind::SessionNote {
                        game: game.name.clone(),
                        index,
                    },
                    initial,
                );
                self.prompt = Some(prompt);
            }
            Command::ToggleNotePrompt => {
                let enabled = !self.store.preferences.notes_enabled;
                self.store.preferences.notes_enabled = enabled;
                self.persist()?;
                let label = if enabled { "on" } else { "off" };
                self.state
                    .set_status(format!("Feedback prompt after sessions {label}"));
            }
            Command::ToggleDiscord => {
                let enabled = !self.store.preferences.discord_enabled;
                self.store.preferences.discord_enabled = enabled;
                self.presence.set_enabled(enabled);
                self.persist()?;
                let label = if enabled { "on" } else { "off" };
                self.state.set_status(format!(
                    "Presence ({}) {label}",
                    self.presence.reporter_name()
                ));
            }
        }
        Ok(())
    }

    fn stop_session(&mut self) -> Result<()> {
        let finished = self.tracker.stop()?;
        let game = finished.game.clone();
        let elapsed = finished.session.elapsed();
        self.store.record_session(finished)?;
        self.persist()?;
        self.state
            .set_status(format!("Recorded {} for {game}", format_hms(elapsed)));
        self.screen = Screen::Library;

        if self.store.preferences.notes_enabled {
            if let Some(index) = self
                .store
                .game(&game)
                .and_then(|entry| entry.sessions.len().checked_sub(1))
            {
                self.prompt = Some(TextPrompt::new(PromptKind::SessionNote { game, index }, ""));
            }
        }
        Ok(())
    }

    fn handle_prompt_key(&mut self, key: KeyEvent) -> Result<()> {
        let Some(prompt) = self.prompt.as_mut() else {
            return Ok(());
        };
        match key.code {
            KeyCode::Esc => {
                self.prompt = None;
                self.state.set_status("Cancelled".to_string());
            }
            KeyCode::Enter => {
                if let Some(prompt) = self.prompt.take() {
                    self.submit_prompt(prompt)?;
                }
            }
            KeyCode::Left => prompt.move_cursor(-1),
            KeyCode::Right => prompt.move_cursor(1),
            KeyCode::Home => prompt.move_home(),
            KeyCode::End => prompt.move_end(),
            KeyCode::Backspace => prompt.backspace(),
            KeyCode::Delete => prompt.delete(),
            KeyCode::Char(ch) => {
                if key.modifiers.is_empty() || key.modifiers == KeyModifiers::SHIFT {
                    prompt.insert(ch);
                }
            }
            _ => {}
        }
        Ok(())
    }

    fn submit_prompt(&mut self, prompt: TextPrompt) -> Result<()> {
        let value = prompt.value();
        match prompt.kind {
            PromptKind::AddGame => {
                self.store.add_game(Game::new(value.clone()))?;
                self.persist()?;
                self.refresh_visible(Some(&value));
                self.state.set_status(format!("Added {value}"));
            }
            PromptKind::Filter => {
                self.state.filter = value;
                self.refresh_visible(None);
                self.state
                    .set_status(format!("{} games match", self.state.visible.len()));
            }
            PromptKind::Import => {
                if value.is_empty() {
                    bail!("no file given");
                }
                let games = import_workbook(&value)?;
                let report = self.store.merge_imported(games);
                self.persist()?;
                self.refresh_visible(None);
                let mut message = format!("Imported {} games", report.added);
                if !report.skipped.is_empty() {
                    message.push_str(&format!(", skipped {} already listed", report.skipped.len()));
                }
                self.state.set_status(message);
            }
            PromptKind::Platform { game } => {
                self.store.update_game(
                    &game,
                    GameEdit {
                        platform: Some(value),
                        ..GameEdit::default()
                    },
                )?;
                self.persist()?;
                self.state.set_status(format!("Updated platform of {game}"));
            }
            PromptKind::Rate { game } => {
                if value.is_empty() {
                    self.store.clear_game_rating(&game)?;
                    self.persist()?;
                    self.state.set_status(format!("Cleared rating of {game}"));
                } else {
                    let parsed = parse_rating(&value)?;
                    let stars = parsed
                        .stars
                        .ok_or_else(|| anyhow!("a rating starts with 1-5 stars"))?;
                    let rating = Rating::new(stars, parsed.tags, parsed.text);
                    self.store.rate_game(&game, rating)?;
                    self.persist()?;
                    self.state
                        .set_status(format!("Rated {game} {}", stars.glyphs()));
                }
            }
            PromptKind::SessionNote { game, index } => {
                let parsed = parse_feedback(&value)?;
                let previous = self
                    .store
                    .game(&game)
                    .and_then(|entry| entry.sessions.get(index))
                    .and_then(|session| session.feedback.as_ref());
                let feedback = session_feedback(parsed, previous);
                self.store.set_session_feedback(&game, index, feedback)?;
                self.persist()?;
                self.state.set_status(format!("Saved feedback for {game}"));
            }
            PromptKind::ManualSession { game } => {
                let duration = parse_hms(&value)
                    .filter(|duration| !duration.is_zero())
                    .ok_or_else(|| anyhow!("expected a duration like 01:30, got {value:?}"))?;
                let span = chrono::Duration::from_std(duration)?;
                self.store
                    .add_manual_session(&game, Utc::now() - span, duration)?;
                self.persist()?;
                self.state.set_status(format!(
                    "Added {} to {game}",
                    format_short(duration)
                ));
            }
            PromptKind::ConfirmRemove { game } => {
                if matches!(value.to_lowercase().as_str(), "y" | "yes") {
                    self.store.remove_game(&game)?;
                    self.persist()?;
                    self.refresh_visible(None);
                    self.state.set_status(format!("Removed {game}"));
                } else {
                    self.state.set_status("Kept the game".to_string());
                }
            }
        }
        Ok(())
    }

    fn persist(&mut self) -> Result<()> {
        self.stats = None;
        self.manager.save(&mut self.store).map_err(|err| {
            error!(error = %err, "Saving the library failed");
            anyhow::Error::new(err)
        })
    }

    fn selected_game(&self) -> Result<&Game> {
        self.state
            .selected()
            .and_then(|index| self.store.games.get(index))
            .ok_or_else(|| anyhow!("no game selected"))
    }

    fn selected_name(&self) -> Result<String> {
        self.selected_game().map(|game| game.name.clone())
    }

    /// Rebuild the filtered view, keeping `prefer` or the current game selected.
    fn refresh_visible(&mut self, prefer: Option<&str>) {
        let keep = prefer
            .map(str::to_string)
            .or_else(|| self.selected_game().ok().map(|game| game.name.clone()));
        let needle = self.state.filter.to_lowercase();
        let mut visible: Vec<usize> = self
            .store
            .games
            .iter()
            .enumerate()
            .filter(|(_, game)| game_matches(game, &needle))
            .map(|(index, _)| index)
            .collect();
        visible.sort_by_cached_key(|index| self.store.games[*index].name.to_lowercase());
        let cursor = keep.map(|name| Game::name_key(&name)).and_then(|key| {
            visible
                .iter()
                .position(|index| Game::name_key(&self.store.games[*index].name) == key)
        });
        self.state.set_visible(visible, cursor);
    }

    fn draw(&mut self, frame: &mut Frame) {
        let area = frame.size();
        let chunks = Layout::default()
            .direction(Direction::Vertical)
            .constraints([
                Constraint::Length(1),
                Constraint::Min(8),
                Constraint::Length(4),
            ])
            .split(area);

        self.render_tabs(frame, chunks[0]);
        match self.screen {
            Screen::Library => self.draw_library(frame, chunks[1]),
            Screen::Timer => self.draw_timer(frame, chunks[1]),
            Screen::Stats => self.draw_stats(frame, chunks[1]),
            Screen::Help => self.draw_help(frame, chunks[1]),
        }
        self.render_status(frame, chunks[2]);

        if let Some(prompt) = &self.prompt {
            self.render_prompt(frame, prompt);
        }
    }

    fn render_tabs(&self, frame: &mut Frame, area: Rect) {
        let selected = Screen::ALL
            .iter()
            .position(|screen| *screen == self.screen)
            .unwrap_or(0);
        let titles: Vec<String> = Screen::ALL
            .iter()
            .enumerate()
            .map(|(index, screen)| format!("{} {}", index + 1, screen.title()))
            .collect();
        let tabs = Tabs::new(titles)
            .select(selected)
            .style(Style::default().fg(self.theme.muted))
            .highlight_style(
                Style::default()
                    .fg(self.theme.accent)
                    .add_modifier(Modifier::BOLD),
            );
        frame.render_widget(tabs, area);
    }

    fn draw_library(&mut self, frame: &mut Frame, area: Rect) {
        let body = Layout::default()
            .direction(Direction::Horizontal)
            .constraints([Constraint::Percentage(45), Constraint::Percentage(55)])
            .split(area);
        self.render_game_list(frame, body[0]);
        self.render_game_details(frame, body[1]);
    }

    fn render_game_list(&mut self, frame: &mut Frame, area: Rect) {
        self.state.list_height = area.height.saturating_sub(2) as usize;
        self.state.clamp_cursor();
        self.state.ensure_cursor_visible();

        let mut list_state = ListState::default();
        let window = self.state.visible_window();
        if !window.is_empty() {
            let selected = self
                .state
                .cursor
                .saturating_sub(self.state.offset)
                .min(window.len().saturating_sub(1));
            list_state.select(Some(selected));
        }
        let active = self.tracker.active_game();
        let items: Vec<ListItem> = window
            .iter()
            .enumerate()
            .filter_map(|(idx, game_index)| {
                let game = self.store.games.get(*game_index)?;
                let is_selected = self.state.cursor == self.state.offset + idx;
                let marker = if is_selected {
                    Span::styled(
                        "▶ ",
                        Style::default()
                            .fg(self.theme.accent)
                            .add_modifier(Modifier::BOLD),
                    )
                } else {
                    Span::raw("  ")
                };
                let mut line = vec![
                    marker,
                    Span::styled(
                        format!("{} ", status_glyph(game.status)),
                        Style::default().fg(self.theme.status_color(game.status)),
                    ),
                    Span::styled(
                        game.name.clone(),
                        Style::default()
                            .fg(self.theme.primary_fg)
                            .add_modifier(Modifier::BOLD),
                    ),
                ];
                if !game.platform.is_empty() {
                    line.push(Span::styled(
                        format!(" · {}", game.platform),
                        Style::default().fg(self.theme.muted),
                    ));
                }
                if active == Some(game.name.as_str()) {
                    line.push(Span::styled(" ⏱", Style::default().fg(self.theme.success)));
                }
                Some(ListItem::new(Line::from(line)))
            })
            .collect();

        let title = if self.state.filter.is_empty() {
            format!("Games ({})", self.store.games.len())
        } else {
            format!(
                "Games ({}/{}) filter: {}",
                self.state.visible.len(),
                self.store.games.len(),
                self.state.filter
            )
        };
        let list = List::new(items)
            .block(Block::default().borders(Borders::ALL).title(title))
            .highlight_style(Style::default().bg(self.theme.selection_bg));
        frame.render_stateful_widget(list, area, &mut list_state);
    }

    fn render_game_details(&self, frame: &mut Frame, area: Rect) {
        let block = Block::default().borders(Borders::ALL).title("Details");
        let Ok(game) = self.selected_game() else {
            let empty = Paragraph::new(vec![
                Line::from("No games yet."),
                Line::from("Press a to add one or i to import a spreadsheet."),
            ])
            .block(block);
            frame.render_widget(empty, area);
            return;
        };

        let label = |text: &'static str| {
            Span::styled(format!("{text:<13}"), Style::default().fg(self.theme.muted))
        };
        let mut lines = vec![
            Line::from(Span::styled(
                game.name.clone(),
                Style::default()
                    .fg(self.theme.accent)
                    .add_modifier(Modifier::BOLD),
            )),
            Line::from(""),
            Line::from(vec![label("Platform"), Span::raw(or_dash(&game.platform))]),
            Line::from(vec![
                label("Released"),
                Span::raw(
                    game.release_date
                        .map_or_else(|| "-".to_string(), |date| date.to_string()),
                ),
            ]),
            Line::from(vec![
                label("Owned"),
                Span::raw(if game.owned { "yes" } else { "no" }),
            ]),
            Line::from(vec![
                label("Status"),
                Span::styled(
                    game.status.to_string(),
                    Style::default().fg(self.theme.status_color(game.status)),
                ),
            ]),
            Line::from(vec![
                label("Playtime"),
                Span::raw(format_hms(game.total_playtime())),
            ]),
            Line::from(vec![
                label("Sessions"),
                Span::raw(game.sessions.len().to_string()),
            ]),
            Line::from(vec![
                label("Last played"),
                Span::raw(game.last_played.map_or_else(|| "-".to_string(), local_label)),
            ]),
        ];

        let rating = game.rating.as_ref().map_or_else(
            || "-".to_string(),
            |rating| {
                let mut text = rating.stars.glyphs();
                if !rating.tags.is_empty() {
                    text.push_str(&format!("  {}", tag_list(&rating.tags)));
                }
                text
            },
        );
        lines.push(Line::from(vec![
            label("Rating"),
            Span::styled(rating, Style::default().fg(self.theme.warning)),
        ]));
        if let Some(comment) = game.rating.as_ref().and_then(|rating| rating.comment.as_ref()) {
            lines.push(Line::from(vec![label(""), Span::raw(comment.clone())]));
        }
        if let Some(summary) = session_rating_summary(game) {
            let mut text = format!(
                "{:.1}★ over {} sessions",
                summary.weighted_average, summary.rated_sessions
            );
            if !summary.top_tags.is_empty() {
                text.push_str(&format!("  {}", tag_list(&summary.top_tags)));
            }
            lines.push(Line::from(vec![label("Session avg"), Span::raw(text)]));
        }

        if !game.sessions.is_empty() {
            lines.push(Line::from(""));
            lines.push(Line::from(Span::styled(
                "Recent sessions",
                Style::default().add_modifier(Modifier::BOLD),
            )));
            for session in game.sessions.iter().rev().take(RECENT_SESSIONS) {
                let mut spans = vec![
                    Span::styled(
                        local_label(session.start),
                        Style::default().fg(self.theme.muted),
                    ),
                    Span::raw(format!("  {}", format_hms(session.elapsed()))),
                ];
                if session.manual {
                    spans.push(Span::styled(" manual", Style::default().fg(self.theme.muted)));
                }
                if let Some(stars) = session.stars() {
                    spans.push(Span::styled(
                        format!("  {}", stars.glyphs()),
                        Style::default().fg(self.theme.warning),
                    ));
                }
                if let Some(notes) = session
                    .feedback
                    .as_ref()
                    .and_then(|feedback| feedback.notes.as_ref())
                {
                    spans.push(Span::raw(format!("  {notes}")));
                }
                lines.push(Line::from(spans));
            }
        }

        let paragraph = Paragraph::new(lines)
            .block(block)
            .wrap(Wrap { trim: true });
        frame.render_widget(paragraph, area);
    }

    fn draw_timer(&self, frame: &mut Frame, area: Rect) {
        let block = Block::default().borders(Borders::ALL).title("Session");
        let inner = block.inner(area);
        frame.render_widget(block, area);

        let Some(game) = self.tracker.active_game() else {
            let idle = Paragraph::new(vec![
                Line::from("No active session."),
                Line::from("Select a game in the library and press Enter to start."),
            ])
            .alignment(Alignment::Center);
            frame.render_widget(idle, centered_rect(inner.width, 2, inner));
            return;
        };

        let elapsed = format_hms(self.tracker.elapsed().unwrap_or_default());
        let paused = self.tracker.status() == TimerStatus::Paused;
        let digits = block_font::render(&elapsed);
        let clock_color = if paused {
            self.theme.warning
        } else {
            self.theme.success
        };

        let mut lines = vec![
            Line::from(Span::styled(
                game.to_string(),
                Style::default()
                    .fg(self.theme.accent)
                    .add_modifier(Modifier::BOLD),
            )),
            Line::from(""),
        ];
        if (inner.width as usize) >= block_font::width(&elapsed) {
            lines.extend(
                digits
                    .into_iter()
                    .map(|row| Line::from(Span::styled(row, Style::default().fg(clock_color)))),
            );
        } else {
            lines.push(Line::from(Span::styled(
                elapsed,
                Style::default().fg(clock_color).add_modifier(Modifier::BOLD),
            )));
        }
        lines.push(Line::from(""));
        let (state_label, hint) = if paused {
            ("PAUSED", "Space resume · e end session")
        } else {
            ("RUNNING", "Space pause · e end session")
        };
        lines.push(Line::from(Span::styled(
            state_label,
            Style::default().fg(clock_color).add_modifier(Modifier::BOLD),
        )));
        lines.push(Line::from(Span::styled(
            hint,
            Style::default().fg(self.theme.muted),
        )));

        let height = lines.len() as u16;
        let paragraph = Paragraph::new(lines).alignment(Alignment::Center);
        frame.render_widget(paragraph, centered_rect(inner.width, height, inner));
    }

    fn draw_stats(&mut self, frame: &mut Frame, area: Rect) {
        if self.stats.is_none() {
            self.stats = Some(LibraryStats::compute(&self.store));
        }
        let Some(stats) = self.stats.as_ref() else {
            return;
        };

        let rows = Layout::default()
            .direction(Direction::Vertical)
            .constraints([
                Constraint::Length(10),
                Constraint::Length(7),
                Constraint::Min(6),
            ])
            .split(area);
        let top = Layout::default()
            .direction(Direction::Horizontal)
            .constraints([Constraint::Percentage(50), Constraint::Percentage(50)])
            .split(rows[0]);
        let bottom = Layout::default()
            .direction(Direction::Horizontal)
            .constraints([
                Constraint::Percentage(34),
                Constraint::Percentage(33),
                Constraint::Percentage(33),
            ])
            .split(rows[2]);

        Self::render_stats_summary(&self.theme, frame, top[0], stats);
        Self::render_status_chart(&self.theme, frame, top[1], stats);
        Self::render_timeline(&self.theme, frame, rows[1], stats);
        Self::render_rating_chart(&self.theme, frame, bottom[0], stats);
        Self::render_release_years(&self.theme, frame, bottom[1], stats);
        Self::render_top_played(&self.theme, frame, bottom[2], stats);
    }

    fn render_stats_summary(theme: &Theme, frame: &mut Frame, area: Rect, stats: &LibraryStats) {
        let row = |label: &str, value: String| {
            Line::from(vec![
                Span::styled(format!("{label:<18}"), Style::default().fg(theme.muted)),
                Span::raw(value),
            ])
        };
        let lines = vec![
            row("Games", stats.total_games.to_string()),
            row("Owned", stats.owned.to_string()),
            row("Completed", format!("{:.1}%", stats.completion_pct)),
            row("Total playtime", format_hms(stats.total_playtime)),
            row("Avg per game", format_short(stats.average_playtime)),
            row("Sessions", stats.session_count.to_string()),
            row("Avg session", format_short(stats.average_session)),
            row(
                "Most active day",
                stats.most_active_day.map_or_else(
                    || "-".to_string(),
                    |day| format!("{} ({} sessions)", day.date, day.sessions),
                ),
            ),
        ];
        let paragraph =
            Paragraph::new(lines).block(Block::default().borders(Borders::ALL).title("Overview"));
        frame.render_widget(paragraph, area);
    }

    fn render_status_chart(theme: &Theme, frame: &mut Frame, area: Rect, stats: &LibraryStats) {
        let labels: Vec<String> = GameStatus::ALL.iter().map(ToString::to_string).collect();
        let data: Vec<(&str, u64)> = GameStatus::ALL
            .iter()
            .zip(&labels)
            .map(|(status, label)| (label.as_str(), stats.status.get(*status) as u64))
            .collect();
        let chart = BarChart::default()
            .block(Block::default().borders(Borders::ALL).title("By status"))
            .data(data.as_slice())
            .bar_width(11)
            .bar_gap(2)
            .bar_style(Style::default().fg(theme.accent))
            .value_style(Style::default().fg(Color::Black).bg(theme.accent));
        frame.render_widget(chart, area);
    }

    fn render_timeline(theme: &Theme, frame: &mut Frame, area: Rect, stats: &LibraryStats) {
        let today = Local::now().date_naive();
        let minutes: HashMap<_, u64> = stats
            .daily
            .iter()
            .map(|day| (day.date, day.playtime.as_secs() / 60))
            .collect();
        let values: Vec<u64> = (0..TIMELINE_DAYS)
            .rev()
            .map(|offset| today - chrono::Duration::days(offset))
            .map(|date| minutes.get(&date).copied().unwrap_or(0))
            .collect();
        let title = format!(
            "Minutes played, last {TIMELINE_DAYS} days (max {})",
            values.iter().max().copied().unwrap_or(0)
        );
        let sparkline = Sparkline::default()
            .block(Block::default().borders(Borders::ALL).title(title))
            .data(&values)
            .style(Style::default().fg(theme.success));
        frame.render_widget(sparkline, area);
    }

    fn render_rating_chart(theme: &Theme, frame: &mut Frame, area: Rect, stats: &LibraryStats) {
        let labels = ["1★", "2★", "3★", "4★", "5★"];
        let data: Vec<(&str, u64)> = labels
            .iter()
            .enumerate()
            .map(|(index, label)| {
                let total = stats.game_ratings.0[index] + stats.session_ratings.0[index];
                (*label, total as u64)
            })
            .collect();
        let title = format!(
            "Ratings ({} games, {} sessions)",
            stats.game_ratings.total(),
            stats.session_ratings.total()
        );
        let chart = BarChart::default()
            .block(Block::default().borders(Borders::ALL).title(title))
            .data(data.as_slice())
            .bar_width(3)
            .bar_gap(1)
            .bar_style(Style::default().fg(theme.warning))
            .value_style(Style::default().fg(Color::Black).bg(theme.warning));
        frame.render_widget(chart, area);
    }

    fn render_release_years(theme: &Theme, frame: &mut Frame, area: Rect, stats: &LibraryStats) {
        let lines: Vec<Line> = stats
            .release_years
            .iter()
            .rev()
            .map(|year| {
                Line::from(vec![
                    Span::styled(format!("{:<8}", year.label()), Style::default().fg(theme.muted)),
                    Span::styled(
                        format!("{} done", year.completed),
                        Style::default().fg(theme.success),
                    ),
                    Span::raw(format!("  {} open", year.open)),
                ])
            })
            .collect();
        let paragraph = Paragraph::new(lines)
            .block(Block::default().borders(Borders::ALL).title("Release years"));
        frame.render_widget(paragraph, area);
    }

    fn render_top_played(theme: &Theme, frame: &mut Frame, area: Rect, stats: &LibraryStats) {
        let lines: Vec<Line> = stats
            .playtime_by_game
            .iter()
            .take(area.height.saturating_sub(2) as usize)
            .map(|(name, playtime)| {
                Line::from(vec![
                    Span::styled(
                        format!("{:>8} ", format_short(*playtime)),
                        Style::default().fg(theme.accent),
                    ),
                    Span::raw(name.clone()),
                ])
            })
            .collect();
        let paragraph = Paragraph::new(lines)
            .block(Block::default().borders(Borders::ALL).title("Most played"));
        frame.render_widget(paragraph, area);
    }

    fn draw_help(&self, frame: &mut Frame, area: Rect) {
        let lines: Vec<Line> = KEYMAP
            .iter()
            .map(|binding| {
                Line::from(vec![
                    Span::styled(
                        format!("{:>7}  ", binding.label),
                        Style::default()
                            .fg(self.theme.accent)
                            .add_modifier(Modifier::BOLD),
                    ),
                    Span::raw(binding.help),
                ])
            })
            .collect();
        let paragraph = Paragraph::new(lines)
            .block(Block::default().borders(Borders::ALL).title("Keys"))
            .wrap(Wrap { trim: false });
        frame.render_widget(paragraph, area);
    }

    fn render_prompt(&self, frame: &mut Frame, prompt: &TextPrompt) {
        let frame_area = frame.size();
        let mut width = cmp::min(72_u16, frame_area.width.saturating_sub(4));
        width = cmp::max(width, 24_u16);
        let height = 6_u16.min(frame_area.height.saturating_sub(2)).max(5_u16);
        let area = centered_rect(width, height, frame_area);

        frame.render_widget(Clear, area);

        let input_line = Line::from(vec![
            Span::styled("> ", Style::default().fg(self.theme.accent)),
            Span::raw(prompt.input.clone()),
        ]);
        let helper = Line::from(vec![
            Span::styled("Enter", Style::default().add_modifier(Modifier::BOLD)),
            Span::raw(" confirm  "),
            Span::styled("Esc", Style::default().add_modifier(Modifier::BOLD)),
            Span::raw(" cancel"),
        ]);
        let paragraph = Paragraph::new(vec![
            Line::from(Span::styled(
                prompt.kind.instruction(),
                Style::default().fg(self.theme.muted),
            )),
            input_line,
            Line::from(""),
            helper,
        ])
        .block(
            Block::default()
                .borders(Borders::ALL)
                .title(prompt.kind.title()),
        );
        frame.render_widget(paragraph, area);

        let cursor_x = (area.x + 3 + prompt.cursor as u16).min(area.x + area.width.saturating_sub(2));
        frame.set_cursor(cursor_x, area.y + 2);
    }

    fn render_status(&self, frame: &mut Frame, area: Rect) {
        let block = Block::default().borders(Borders::ALL).title("Status");
        let tracking = match self.tracker.active_game() {
            Some(game) => Span::styled(
                format!(
                    "{game} {} ({})",
                    format_hms(self.tracker.elapsed().unwrap_or_default()),
                    self.tracker.status()
                ),
                Style::default().fg(self.theme.success),
            ),
            None => Span::styled("idle", Style::default().fg(self.theme.muted)),
        };
        let on_off = |enabled: bool| if enabled { "on" } else { "off" };
        let status_style = if self.state.status.starts_with("Error") {
            Style::default().fg(self.theme.danger)
        } else {
            Style::default()
        };
        let secondary = Line::from(vec![
            Span::raw("Tracking: "),
            tracking,
            Span::styled(
                format!(
                    "  ·  Presence {}  ·  Feedback prompt {}  ·  ? help",
                    on_off(self.presence.is_enabled()),
                    on_off(self.store.preferences.notes_enabled)
                ),
                Style::default().fg(self.theme.muted),
            ),
        ]);
        let paragraph = Paragraph::new(vec![
            Line::from(Span::styled(self.state.status.clone(), status_style)),
            secondary,
        ])
        .block(block)
        .wrap(Wrap { trim: true });
        frame.render_widget(paragraph, area);
    }
}

/// Record a session still running at exit and persist the library. Returns
/// the game whose session was saved.
fn finish_active_session(
    tracker: &mut Tracker,
    store: &mut Store,
    manager: &StoreManager,
) -> Result<Option<String>> {
    let Some(finished) = tracker.shutdown() else {
        return Ok(None);
    };
    let game = finished.game.clone();
    store
        .record_session(finished)
        .with_context(|| format!("failed to record the active session for {game}"))?;
    manager
        .save(store)
        .with_context(|| format!("failed to save the library after recording {game}"))?;
    Ok(Some(game))
}

async fn next_update(receiver: &mut Option<mpsc::Receiver<UpdateEvent>>) -> Option<UpdateEvent> {
    match receiver {
        Some(receiver) => receiver.recv().await,
        None => std::future::pending().await,
    }
}

fn restore_terminal(terminal: &mut Terminal<CrosstermBackend<io::Stdout>>) -> Result<()> {
    disable_raw_mode().context("failed to disable raw mode")?;
    execute!(terminal.backend_mut(), LeaveAlternateScreen)
        .context("failed to leave alternate screen")?;
    terminal.show_cursor()?;
    Ok(())
}

fn spawn_input_thread(sender: mpsc::Sender<Event>) {
    thread::spawn(move || loop {
        match event::poll(INPUT_POLL) {
            Ok(true) => match event::read() {
                Ok(evt) => {
                    if sender.blocking_send(evt).is_err() {
                        break;
                    }
                }
                Err(_) => break,
            },
            Ok(false) => {
                if sender.is_closed() {
                    break;
                }
            }
            Err(_) => break,
        }
    });
}

struct UiState {
    /// Indices into the store's game list, in display order.
    visible: Vec<usize>,
    cursor: usize,
    offset: usize,
    list_height: usize,
    filter: String,
    status: String,
    should_quit: bool,
}

impl Default for UiState {
    fn default() -> Self {
        Self {
            visible: Vec::new(),
            cursor: 0,
            offset: 0,
            list_height: 1,
            filter: String::new(),
            status: "Ready".to_string(),
            should_quit: false,
        }
    }
}

impl UiState {
    fn set_visible(&mut self, visible: Vec<usize>, cursor: Option<usize>) {
        self.visible = visible;
        if let Some(cursor) = cursor {
            self.cursor = cursor;
        }
        self.clamp_cursor();
        self.ensure_cursor_visible();
    }

    fn selected(&self) -> Option<usize> {
        self.visible.get(self.cursor).copied()
    }

    fn move_cursor(&mut self, delta: isize) {
        if self.visible.is_empty() {
            return;
        }
        let max = self.visible.len() as isize - 1;
        self.cursor = (self.cursor as isize + delta).clamp(0, max) as usize;
        self.ensure_cursor_visible();
    }

    fn move_to(&mut self, index: usize) {
        self.cursor = index;
        self.clamp_cursor();
        self.ensure_cursor_visible();
    }

    fn move_to_end(&mut self) {
        self.move_to(self.visible.len().saturating_sub(1));
    }

    fn page_down(&mut self) {
        self.move_cursor(self.list_height.max(1) as isize);
    }

    fn page_up(&mut self) {
        self.move_cursor(-(self.list_height.max(1) as isize));
    }

    fn visible_window(&self) -> &[usize] {
        let end = cmp::min(self.offset + self.list_height.max(1), self.visible.len());
        &self.visible[self.offset.min(end)..end]
    }

    fn set_status(&mut self, message: String) {
        self.status = message;
    }

    fn clamp_cursor(&mut self) {
        if self.visible.is_empty() {
            self.cursor = 0;
            self.offset = 0;
        } else if self.cursor >= self.visible.len() {
            self.cursor = self.visible.len() - 1;
        }
    }

    fn ensure_cursor_visible(&mut self) {
        if self.visible.is_empty() || self.list_height == 0 {
            self.offset = 0;
            return;
        }
        if self.cursor < self.offset {
            self.offset = self.cursor;
        } else if self.cursor >= self.offset + self.list_height {
            self.offset = self.cursor + 1 - self.list_height;
        }
        let max_offset = self.visible.len().saturating_sub(self.list_height);
        self.offset = self.offset.min(max_offset);
    }
}

/// Parsed form of `stars [tag, tag...] [: text]`.
#[derive(Debug, Default, PartialEq)]
struct FeedbackInput {
    stars: Option<Stars>,
    tags: Vec<Tag>,
    text: Option<String>,
}

/// Parse a game rating. The star count is required and unknown tags are
/// rejected.
fn parse_rating(input: &str) -> Result<FeedbackInput> {
    let input = input.trim();
    let (head, text) = match input.split_once(':') {
        Some((head, text)) => (head, Some(text.trim())),
        None => (input, None),
    };
    let head = head.trim();
    let digits_end = head
        .find(|ch: char| !ch.is_ascii_digit())
        .unwrap_or(head.len());
    if digits_end == 0 {
        bail!("a rating starts with 1-5 stars");
    }
    let stars: u8 = head[..digits_end]
        .parse()
        .map_err(|_| anyhow!("invalid star count in {head:?}"))?;
    let stars = Stars::new(stars)?;

    let rest = head[digits_end..].trim_start_matches(['*', '★']);
    let mut tags = Vec::new();
    let mut unknown = Vec::new();
    for label in rest.split(',').map(str::trim).filter(|label| !label.is_empty()) {
        match Tag::from_label(label) {
            Some(tag) => tags.push(tag),
            None => unknown.push(label.to_string()),
        }
    }
    if !unknown.is_empty() {
        bail!("unknown tags: {}", unknown.join(", "));
    }

    Ok(FeedbackInput {
        stars: Some(stars),
        tags,
        text: text.filter(|text| !text.is_empty()).map(str::to_string),
    })
}

/// Parse session feedback: a rating as in [`parse_rating`], or plain notes.
///
/// A leading `N*` or `N★` always means a rating, so its errors surface. A bare
/// leading number only counts as one when the rest parses too; otherwise
/// ("2 bosses down") the whole input is notes.
fn parse_feedback(input: &str) -> Result<FeedbackInput> {
    let input = input.trim();
    let first = input
        .split(|ch: char| ch.is_whitespace() || ch == ',' || ch == ':')
        .next()
        .unwrap_or_default();
    let digits = first.trim_end_matches(['*', '★']);
    let is_count = !digits.is_empty() && digits.chars().all(|ch| ch.is_ascii_digit());

    if is_count && digits.len() < first.len() {
        return parse_rating(input);
    }
    if is_count {
        if let Ok(parsed) = parse_rating(input) {
            return Ok(parsed);
        }
    }
    Ok(FeedbackInput {
        text: (!input.is_empty()).then(|| input.to_string()),
        ..FeedbackInput::default()
    })
}

fn rating_input(rating: &Rating) -> String {
    let mut text = rating.stars.get().to_string();
    if !rating.tags.is_empty() {
        text.push(' ');
        text.push_str(&tag_list(&rating.tags));
    }
    if let Some(comment) = &rating.comment {
        text.push_str(": ");
        text.push_str(comment);
    }
    text
}

/// Editable text for session feedback. A rating's own comment is left out;
/// it is kept when the feedback is saved again.
fn feedback_input(feedback: &Feedback) -> String {
    let rating = feedback.rating.as_ref().map(|rating| {
        let mut text = format!("{}*", rating.stars.get());
        if !rating.tags.is_empty() {
            text.push(' ');
            text.push_str(&tag_list(&rating.tags));
        }
        text
    });
    match (rating, &feedback.notes) {
        (Some(rating), Some(notes)) => format!("{rating}: {notes}"),
        (Some(rating), None) => rating,
        (None, Some(notes)) => notes.clone(),
        (None, None) => String::new(),
    }
}

/// Build session feedback from prompt input, keeping the comment of an earlier
/// session rating.
fn session_feedback(input: FeedbackInput, previous: Option<&Feedback>) -> Feedback {
    let comment = previous
        .and_then(|feedback| feedback.rating.as_ref())
        .and_then(|rating| rating.comment.clone());
    Feedback {
        rating: input
            .stars
            .map(|stars| Rating::new(stars, input.tags, comment)),
        notes: input.text,
        recorded_at: Utc::now(),
    }
}

fn tag_list(tags: &[Tag]) -> String {
    tags.iter().map(|tag| tag.label()).collect::<Vec<_>>().join(", ")
}

fn status_glyph(status: GameStatus) -> &'static str {
    match status {
        GameStatus::Pending => "○",
        GameStatus::InProgress => "◐",
        GameStatus::Completed => "●",
    }
}

fn game_matches(game: &Game, needle: &str) -> bool {
    needle.is_empty()
        || game.name.to_lowercase().contains(needle)
        || game.platform.to_lowercase().contains(needle)
}

fn local_label(timestamp: DateTime<Utc>) -> String {
    timestamp
        .with_timezone(&Local)
        .format("%Y-%m-%d %H:%M")
        .to_string()
}

fn or_dash(value: &str) -> String {
    if value.trim().is_empty() {
        "-".to_string()
    } else {
        value.to_string()
    }
}

fn centered_rect(width: u16, height: u16, area: Rect) -> Rect {
    let width = width.min(area.width);
    let height = height.min(area.height);
    let x = area.x + (area.width.saturating_sub(width)) / 2;
    let y = area.y + (area.height.saturating_sub(height)) / 2;
    Rect::new(x, y, width, height)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn key(code: KeyCode) -> KeyEvent {
        KeyEvent::new(code, KeyModifiers::NONE)
    }

    #[test]
    fn key_table_has_no_conflicts() {
        let mut seen = Vec::new();
        for binding in KEYMAP {
            for code in binding.keys {
                assert!(!seen.contains(code), "{code:?} bound twice");
                seen.push(*code);
            }
        }
    }

    #[test]
    fn keys_map_to_commands() {
        assert_eq!(command_for(&key(KeyCode::Char('j'))), Some(Command::Down));
        assert_eq!(command_for(&key(KeyCode::Enter)), Some(Command::StartSession));
        assert_eq!(
            command_for(&KeyEvent::new(KeyCode::Char('N'), KeyModifiers::SHIFT)),
            Some(Command::ToggleNotePrompt)
        );
        assert_eq!(
            command_for(&KeyEvent::new(KeyCode::Char('c'), KeyModifiers::CONTROL)),
            Some(Command::Quit)
        );
        assert_eq!(
            command_for(&KeyEvent::new(KeyCode::Char('a'), KeyModifiers::ALT)),
            None
        );
        assert_eq!(command_for(&key(KeyCode::Char('z'))), None);
    }

    #[test]
    fn prompt_edits_multibyte_text() {
        let mut prompt = TextPrompt::new(PromptKind::AddGame, "Okami");
        prompt.move_cursor(-4);
        prompt.delete();
        prompt.insert('ō');
        assert_eq!(prompt.input, "Oōami");
        assert_eq!(prompt.cursor, 2);
        prompt.move_end();
        prompt.backspace();
        prompt.move_home();
        prompt.insert(' ');
        assert_eq!(prompt.value(), "Oōam");
    }

    #[test]
    fn feedback_input_parses_rating_tags_and_text() {
        let parsed = parse_feedback("4 Fun, epic: beat the final boss").unwrap();
        assert_eq!(parsed.stars.map(Stars::get), Some(4));
        assert_eq!(parsed.tags.len(), 2);
        assert_eq!(parsed.text.as_deref(), Some("beat the final boss"));

        let plain = parse_feedback("beat the boss: finally").unwrap();
        assert_eq!(plain.stars, None);
        assert_eq!(plain.text.as_deref(), Some("beat the boss: finally"));

        assert!(parse_feedback("6*").is_err());
        assert!(parse_feedback("3* Fun, Soggy").is_err());
        assert_eq!(parse_feedback("5*").unwrap().stars.map(Stars::get), Some(5));
    }

    #[test]
    fn notes_starting_with_a_number_stay_notes() {
        for notes in ["2 bosses down", "6 hours of grinding", "1999 vibes"] {
            let parsed = parse_feedback(notes).unwrap();
            assert_eq!(parsed.stars, None);
            assert_eq!(parsed.text.as_deref(), Some(notes));
        }
        let rated = parse_feedback("3: done").unwrap();
        assert_eq!(rated.stars.map(Stars::get), Some(3));
        assert_eq!(rated.text.as_deref(), Some("done"));

        assert!(parse_rating("2 bosses down").is_err());
        assert!(parse_rating("great game").is_err());
    }

    #[test]
    fn editing_session_feedback_keeps_rating_comment() {
        let previous = Feedback {
            rating: Some(Rating::new(
                Stars::new(4).unwrap(),
                vec![Tag::from_label("Fun").unwrap()],
                Some("tight combat".to_string()),
            )),
            notes: Some("beat Meg".to_string()),
            recorded_at: Utc::now(),
        };
        let shown = feedback_input(&previous);
        assert_eq!(shown, "4* Fun: beat Meg");

        let edited = session_feedback(parse_feedback(&shown).unwrap(), Some(&previous));
        let rating = edited.rating.unwrap();
        assert_eq!(rating.stars.get(), 4);
        assert_eq!(rating.comment.as_deref(), Some("tight combat"));
        assert_eq!(edited.notes.as_deref(), Some("beat Meg"));
    }

    #[test]
    fn rating_input_round_trips_through_parser() {
        let rating = Rating::new(
            Stars::new(3).unwrap(),
            vec![Tag::from_label("Relaxing").unwrap()],
            Some("cozy".to_string()),
        );
        let parsed = parse_feedback(&rating_input(&rating)).unwrap();
        assert_eq!(parsed.stars, Some(rating.stars));
        assert_eq!(parsed.tags, rating.tags);
        assert_eq!(parsed.text, rating.comment);
    }

    #[test]
    fn active_session_is_saved_at_exit() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let manager = StoreManager::new(dir.path().join("games.json"));
        let mut store = Store::default();
        store.add_game(Game::new("Hades"))?;

        let mut tracker = Tracker::new();
        tracker.start("Hades")?;
        tracker.toggle_pause()?;

        let saved = finish_active_session(&mut tracker, &mut store, &manager)?;
        assert_eq!(saved.as_deref(), Some("Hades"));
        assert!(tracker.active_game().is_none());
        assert_eq!(manager.load()?.game("Hades").map(|game| game.sessions.len()), Some(1));

        assert_eq!(finish_active_session(&mut tracker, &mut store, &manager)?, None);
        Ok(())
    }

    #[test]
    fn session_for_missing_game_reports_an_error_at_exit() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let manager = StoreManager::new(dir.path().join("games.json"));
        let mut store = Store::default();

        let mut tracker = Tracker::new();
        tracker.start("Removed")?;
        assert!(finish_active_session(&mut tracker, &mut store, &manager).is_err());
        assert!(!manager.path().exists());
        Ok(())
    }

    #[test]
    fn list_window_follows_cursor() {
        let mut state = UiState {
            list_height: 3,
            ..UiState::default()
        };
        state.set_visible((0..10).collect(), None);
        state.move_to(5);
        assert_eq!(state.visible_window(), &[3, 4, 5]);
        state.move_to_end();
        assert_eq!(state.selected(), Some(9));
        state.page_up();
        assert_eq!(state.cursor, 6);
        state.set_visible(vec![2, 4], None);
        assert_eq!(state.selected(), Some(4));
    }
}
