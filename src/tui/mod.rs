use anyhow::{Context, Result};
use chrono::Local;
use crossterm::{
    event::{self, Event as TermEvent, KeyCode, KeyEvent, KeyModifiers},
    execute,
    terminal::{EnterAlternateScreen, LeaveAlternateScreen, disable_raw_mode, enable_raw_mode},
};
use ratatui::{
    Frame, Terminal,
    backend::CrosstermBackend,
    layout::{Constraint, Direction, Layout, Rect},
    style::{Color, Modifier, Style},
    text::{Line, Span, Text},
    widgets::{Block, Borders, Clear, List, ListItem, ListState, Paragraph, Wrap},
};
use std::collections::HashMap;
use std::io;
use std::path::PathBuf;
use std::process::{Command, Stdio};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::runtime::Handle;
use tokio::sync::mpsc::{UnboundedReceiver, UnboundedSender};
use tracing::{debug, warn};

use crate::Review;
use crate::app::{Action, Dashboard, Effect, Event, StatusKind, StatusMessage};
use crate::bitbucket::PullRequestSource;
use crate::git::{self, GitRequest};
use crate::state::StateWriter;
use crate::view::{ViewEntry, time_ago};

/// Map a key press to a dashboard action.
///
/// While the help overlay is open any key closes it.
pub fn key_action(key: KeyEvent, help_open: bool) -> Option<Action> {
    if help_open {
        return Some(Action::ToggleHelp);
    }

    let action = match key.code {
        KeyCode::Char('c') if key.modifiers.contains(KeyModifiers::CONTROL) => Action::Quit,
        KeyCode::Char('q') | KeyCode::Esc => Action::Quit,
        KeyCode::Char('?') => Action::ToggleHelp,
        KeyCode::Char('j') | KeyCode::Down => Action::SelectNext,
        KeyCode::Char('k') | KeyCode::Up => Action::SelectPrev,
        KeyCode::Char('r') => Action::Refresh,
        KeyCode::Char('i') => Action::ToggleIgnore,
        KeyCode::Char('.') => Action::ToggleShowIgnored,
        KeyCode::Char('m') => Action::ToggleMineOnly,
        KeyCode::Char('d') => Action::DismissChanges,
        KeyCode::Char('u') => Action::CopyUrl,
        KeyCode::Char('b') => Action::CopyBranch,
        KeyCode::Char('c') => Action::Checkout,
        KeyCode::Char('P') => Action::PullAndSync,
        KeyCode::Enter => Action::OpenInBrowser,
        _ => return None,
    };
    Some(action)
}

/// Executes effects off the state owner and reports back through events.
pub struct EffectRunner {
    runtime: Handle,
    source: Arc<dyn PullRequestSource>,
    events: UnboundedSender<Event>,
    writer: Option<StateWriter>,
    local_repos: Arc<HashMap<String, PathBuf>>,
    clipboard: Option<arboard::Clipboard>,
}

impl EffectRunner {
    pub fn new(
        runtime: Handle,
        source: Arc<dyn PullRequestSource>,
        events: UnboundedSender<Event>,
        writer: Option<StateWriter>,
        local_repos: HashMap<String, PathBuf>,
    ) -> Self {
        Self {
            runtime,
            source,
            events,
            writer,
            local_repos: Arc::new(local_repos),
            clipboard: None,
        }
    }

    pub fn run(&mut self, effect: Effect) {
        match effect {
            Effect::Fetch => self.fetch(),
            Effect::Persist(state) => match &self.writer {
                Some(writer) => writer.save(state),
                None => debug!("persistence disabled, skipping save"),
            },
            Effect::CopyToClipboard(text) => self.copy(text),
            Effect::OpenBrowser(url) => self.open_browser(url),
            Effect::Git(request) => self.git(request),
        }
    }

    fn fetch(&self) {
        let source = Arc::clone(&self.source);
        let events = self.events.clone();
        self.runtime.spawn(async move {
            let result = source.fetch_open_pull_requests().await;
            let _ = events.send(Event::BatchLoaded(result));
        });
    }

    fn clipboard(&mut self) -> Result<&mut arboard::Clipboard, arboard::Error> {
        // Keep the handle: on X11 the contents vanish with their owner.
        let clipboard = match self.clipboard.take() {
            Some(clipboard) => clipboard,
            None => arboard::Clipboard::new()?,
        };
        Ok(self.clipboard.insert(clipboard))
    }

    fn copy(&mut self, text: String) {
        let result = self
            .clipboard()
            .and_then(|clipboard| clipboard.set_text(text.clone()));

        let message = match result {
            Ok(()) => StatusMessage::info(format!("Copied '{}'", text)),
            Err(e) => {
                warn!(error = %e, "clipboard unavailable");
                StatusMessage::error(format!("Could not copy: {}", e))
            }
        };
        let _ = self.events.send(Event::Status(message));
    }

    fn open_browser(&self, url: String) {
        let events = self.events.clone();
        self.runtime.spawn_blocking(move || {
            if let Err(e) = opener_command(&url)
                .stdout(Stdio::null())
                .stderr(Stdio::null())
                .status()
            {
                warn!(error = %e, %url, "failed to open browser");
                let _ = events.send(Event::Status(StatusMessage::error(format!(
                    "Could not open browser: {}",
                    e
                ))));
            }
        });
    }

    fn git(&self, request: GitRequest) {
        let events = self.events.clone();
        let local_repos = Arc::clone(&self.local_repos);
        let _ = events.send(Event::Status(StatusMessage::info(format!(
            "Running git in {}...",
            request.repo()
        ))));
        self.runtime.spawn_blocking(move || {
            let progress = events.clone();
            let on_step = move |output: &str| {
                let _ = progress.send(Event::Status(StatusMessage::success(output)));
            };
            let message = match git::execute(&local_repos, &request, on_step) {
                Ok(output) => StatusMessage::success(output),
                Err(e) => {
                    warn!(error = %e, ?request, "git operation failed");
                    StatusMessage::error(e.to_string())
                }
            };
            let _ = events.send(Event::Status(message));
        });
    }

    /// Stop the state writer after flushing pending saves.
    pub fn shutdown(self) {
        if let Some(writer) = self.writer {
            writer.shutdown();
        }
    }
}

fn opener_command(url: &str) -> Command {
    if cfg!(target_os = "macos") {
        let mut cmd = Command::new("open");
        cmd.arg(url);
        cmd
    } else if cfg!(target_os = "windows") {
        let mut cmd = Command::new("cmd");
        cmd.args(["/C", "start", "", url]);
        cmd
    } else {
        let mut cmd = Command::new("xdg-open");
        cmd.arg(url);
        cmd
    }
}

fn review_marker(review: Review) -> &'static str {
    match review {
        Review::Approved => " / ✅",
        Review::ChangesRequested => " / 👎",
        Review::None => "",
    }
}

/// First line of a row: bell and change tags, or a struck-out title when ignored.
fn title_line(entry: &ViewEntry) -> Line<'static> {
    if entry.ignored {
        return Line::from(Span::styled(
            entry.pr.title.clone(),
            Style::default().add_modifier(Modifier::DIM | Modifier::CROSSED_OUT),
        ));
    }
    if !entry.has_changes() {
        return Line::from(entry.pr.title.clone());
    }

    let tags: Vec<&str> = entry.changes.iter().map(|tag| tag.as_str()).collect();
    Line::from(vec![
        Span::raw(format!("🔔 {} [", entry.pr.title)),
        Span::styled(
            tags.join(", "),
            Style::default()
                .fg(Color::Yellow)
                .add_modifier(Modifier::BOLD),
        ),
        Span::raw("]"),
    ])
}

/// Second line of a row: author, age, comments and review summary.
fn description_line(entry: &ViewEntry, now: &chrono::DateTime<Local>) -> Line<'static> {
    let pr = &entry.pr;
    Line::from(vec![
        Span::styled(
            format!(
                "{} | {} | {} 💬 | {} | ",
                pr.author,
                time_ago(&pr.updated_on, now),
                pr.comments_count,
                pr.repo
            ),
            Style::default().fg(Color::Gray),
        ),
        Span::styled(pr.approved_count.to_string(), Style::default().fg(Color::Green)),
        Span::raw(" / "),
        Span::styled(
            pr.changes_requested_count.to_string(),
            Style::default().fg(Color::Yellow),
        ),
        Span::raw(review_marker(pr.my_review)),
    ])
}

fn list_title(dashboard: &Dashboard) -> String {
    let mut title = if dashboard.mine_only() {
        "My pull requests".to_string()
    } else {
        "Pull requests".to_string()
    };
    if dashboard.show_ignored() {
        title.push_str(" (showing ignored)");
    }
    if dashboard.is_loading() {
        title.push_str(" ⟳");
    }
    title
}

fn render(dashboard: &Dashboard, frame: &mut Frame) {
    let chunks = Layout::default()
        .direction(Direction::Vertical)
        .constraints([Constraint::Min(1), Constraint::Length(3)])
        .split(frame.area());

    let now = Local::now();
    let items: Vec<ListItem> = dashboard
        .entries()
        .iter()
        .map(|entry| {
            ListItem::new(Text::from(vec![
                title_line(entry),
                description_line(entry, &now),
            ]))
        })
        .collect();

    let list = List::new(items)
        .block(
            Block::default()
                .borders(Borders::ALL)
                .title(list_title(dashboard)),
        )
        .highlight_style(
            Style::default()
                .fg(Color::Yellow)
                .add_modifier(Modifier::BOLD),
        )
        .highlight_symbol("> ");

    let mut state = ListState::default().with_selected(dashboard.selected());
    frame.render_stateful_widget(list, chunks[0], &mut state);

    render_status_bar(dashboard, frame, chunks[1]);

    if dashboard.show_help() {
        render_help(frame);
    }
}

fn render_status_bar(dashboard: &Dashboard, frame: &mut Frame, area: Rect) {
    let paragraph = match dashboard.status() {
        Some(message) => {
            let color = match message.kind {
                StatusKind::Info => Color::Cyan,
                StatusKind::Success => Color::Green,
                StatusKind::Error => Color::Red,
            };
            Paragraph::new(message.text.clone()).style(Style::default().fg(color))
        }
        None => {
            let updated = match dashboard.last_loaded() {
                Some(at) => format!("updated {}", time_ago(&at, &Local::now())),
                None => "loading...".to_string(),
            };
            Paragraph::new(format!(
                "{} pull requests | {} | r: refresh  i: ignore  d: dismiss  Enter: open  ?: help  q: quit",
                dashboard.entries().len(),
                updated
            ))
        }
    };

    frame.render_widget(
        paragraph
            .block(Block::default().borders(Borders::ALL))
            .wrap(Wrap { trim: false }),
        area,
    );
}

fn render_help(frame: &mut Frame) {
    let help_text = [
        "Pull request dashboard - Keyboard Shortcuts",
        "",
        "Navigation:",
        "  j / Down      - Next pull request",
        "  k / Up        - Previous pull request",
        "",
        "Selected pull request:",
        "  Enter         - Open in web browser",
        "  d             - Dismiss bell",
        "  i             - Ignore until next update",
        "  u             - Copy url",
        "  b             - Copy branch",
        "  c             - Checkout locally",
        "  P             - Pull target branch and push",
        "",
        "List:",
        "  r             - Refresh",
        "  .             - Show ignored",
        "  m             - Show mine only",
        "",
        "Other:",
        "  ?             - Show this help",
        "  q / Esc       - Quit",
        "",
        "Press any key to close this help",
    ];

    let text = Text::from(help_text.iter().map(|&s| Line::from(s)).collect::<Vec<_>>());
    let paragraph = Paragraph::new(text)
        .block(Block::default().borders(Borders::ALL).title("Help"))
        .wrap(Wrap { trim: false });

    let area = centered_rect(60, 80, frame.area());
    frame.render_widget(Clear, area);
    frame.render_widget(paragraph, area);
}

/// Create a centered rectangle.
fn centered_rect(percent_x: u16, percent_y: u16, r: Rect) -> Rect {
    let popup_layout = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Percentage((100 - percent_y) / 2),
            Constraint::Percentage(percent_y),
            Constraint::Percentage((100 - percent_y) / 2),
        ])
        .split(r);

    Layout::default()
        .direction(Direction::Horizontal)
        .constraints([
            Constraint::Percentage((100 - percent_x) / 2),
            Constraint::Percentage(percent_x),
            Constraint::Percentage((100 - percent_x) / 2),
        ])
        .split(popup_layout[1])[1]
}

/// Setup the terminal for TUI rendering.
fn setup_terminal() -> Result<Terminal<CrosstermBackend<io::Stdout>>> {
    enable_raw_mode().context("Failed to enable raw mode")?;
    let mut stdout = io::stdout();
    execute!(stdout, EnterAlternateScreen).context("Failed to enter alternate screen")?;
    let backend = CrosstermBackend::new(stdout);
    Terminal::new(backend).context("Failed to create terminal")
}

/// Restore the terminal to its original state.
fn restore_terminal(terminal: &mut Terminal<CrosstermBackend<io::Stdout>>) -> Result<()> {
    disable_raw_mode().context("Failed to disable raw mode")?;
    execute!(terminal.backend_mut(), LeaveAlternateScreen)
        .context("Failed to leave alternate screen")?;
    terminal.show_cursor().context("Failed to show cursor")?;
    Ok(())
}

fn dispatch(dashboard: &mut Dashboard, runner: &mut EffectRunner, event: Event) {
    for effect in dashboard.handle(event, Instant::now()) {
        runner.run(effect);
    }
}

/// Run the interactive dashboard until the user quits.
///
/// Background completions arrive on `events`; every event, including key
/// presses and timer ticks, is handled on this thread.
pub fn run_tui(
    mut dashboard: Dashboard,
    mut runner: EffectRunner,
    mut events: UnboundedReceiver<Event>,
) -> Result<()> {
    // Setup panic hook to restore terminal
    let original_hook = std::panic::take_hook();
    std::panic::set_hook(Box::new(move |panic_info| {
        let _ = disable_raw_mode();
        let _ = execute!(io::stdout(), LeaveAlternateScreen);
        original_hook(panic_info);
    }));

    let mut terminal = setup_terminal()?;

    let result = (|| -> Result<()> {
        loop {
            while let Ok(event) = events.try_recv() {
                dispatch(&mut dashboard, &mut runner, event);
            }
            dispatch(&mut dashboard, &mut runner, Event::Tick);

            terminal
                .draw(|f| render(&dashboard, f))
                .context("Failed to draw frame")?;

            if dashboard.should_quit() {
                break;
            }

            if event::poll(Duration::from_millis(200)).context("Failed to poll events")?
                && let TermEvent::Key(key) = event::read().context("Failed to read event")?
                && key.kind == event::KeyEventKind::Press
                && let Some(action) = key_action(key, dashboard.show_help())
            {
                dispatch(&mut dashboard, &mut runner, Event::Action(action));
            }
        }
        Ok(())
    })();

    runner.shutdown();
    // Restore terminal in all cases
    restore_terminal(&mut terminal)?;

    result
}
