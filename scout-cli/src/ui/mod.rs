//! Interactive project browser
//!
//! Left: the registered projects and their watch state. Right: the selected
//! project's configuration or its compiler log, whichever pane the view
//! state says is shown. The loop pumps runner reports between frames, so
//! watchers keep streaming while the screen is idle.

mod theme;

use std::io;
use std::time::Duration;

use anyhow::Result;
use crossterm::{
    event::{self, Event as CEvent, KeyCode, KeyEvent, KeyEventKind, KeyModifiers},
    execute,
    terminal::{EnterAlternateScreen, LeaveAlternateScreen, disable_raw_mode, enable_raw_mode},
};
use ratatui::{
    Frame, Terminal,
    backend::CrosstermBackend,
    layout::{Constraint, Direction, Layout, Rect},
    text::{Line, Span},
    widgets::{Block, Borders, List, ListItem, ListState, Paragraph},
};

use scout_core::app::App;
use scout_core::event::{AppEvent, drain};
use scout_core::log::LogEntry;
use scout_core::project::{DirField, Environment, OutputStyle, ProjectKey, ProjectRecord};
use scout_core::view::Pane;

use theme::styles;

/// Idle time between frames when there is no input
const TICK: Duration = Duration::from_millis(50);

/// How long to wait for watchers to exit after quitting
const SHUTDOWN_GRACE: Duration = Duration::from_secs(3);

#[derive(Default)]
struct UiState {
    projects: Vec<ProjectRecord>,
    list_state: ListState,
    reload: bool,
    confirm_delete: bool,
    status: Option<String>,
    quit: bool,
}

impl UiState {
    fn selected_key(&self) -> Option<ProjectKey> {
        self.list_state
            .selected()
            .and_then(|i| self.projects.get(i))
            .map(|p| p.key.clone())
    }
}

fn setup_terminal() -> io::Result<Terminal<CrosstermBackend<io::Stdout>>> {
    enable_raw_mode()?;
    let mut stdout = io::stdout();
    execute!(stdout, EnterAlternateScreen)?;
    let backend = CrosstermBackend::new(stdout);
    Terminal::new(backend)
}

fn restore_terminal(mut terminal: Terminal<CrosstermBackend<io::Stdout>>) -> io::Result<()> {
    disable_raw_mode()?;
    execute!(terminal.backend_mut(), LeaveAlternateScreen)?;
    terminal.show_cursor()?;
    Ok(())
}

pub async fn run(app: &mut App) -> Result<()> {
    let mut terminal = setup_terminal()?;
    let result = ui_loop(&mut terminal, app).await;
    restore_terminal(terminal)?;
    shutdown(app).await;
    result
}

async fn ui_loop(
    terminal: &mut Terminal<CrosstermBackend<io::Stdout>>,
    app: &mut App,
) -> Result<()> {
    let mut events = app.bus().subscribe();
    let mut ui = UiState {
        reload: true,
        ..UiState::default()
    };

    loop {
        app.pump();
        if drain(&mut events)
            .iter()
            .any(|e| matches!(e, AppEvent::Changed))
        {
            ui.reload = true;
        }
        if ui.reload {
            ui.projects = app.projects().await?;
            ui.reload = false;
            sync_selection(app, &mut ui);
        }

        terminal.draw(|f| draw(f, app, &mut ui))?;

        // Non-blocking poll: sleeping on the runtime lets watcher output in.
        if !event::poll(Duration::ZERO)? {
            tokio::time::sleep(TICK).await;
            continue;
        }
        let CEvent::Key(key) = event::read()? else {
            continue;
        };
        if key.kind != KeyEventKind::Press {
            continue;
        }
        handle_key(app, &mut ui, key).await;
        if ui.quit {
            return Ok(());
        }
    }
}

/// Point the list at the view's selected project, selecting the first
/// project when the view has none.
fn sync_selection(app: &mut App, ui: &mut UiState) {
    let selected = app.current_view().selected;
    let index = selected.and_then(|key| ui.projects.iter().position(|p| p.key == key));
    match (index, ui.projects.first()) {
        (Some(i), _) => ui.list_state.select(Some(i)),
        (None, Some(first)) => {
            let key = first.key.clone();
            app.select_project(&key);
            ui.list_state.select(Some(0));
        }
        (None, None) => ui.list_state.select(None),
    }
}

fn move_selection(app: &mut App, ui: &mut UiState, down: bool) {
    if ui.projects.is_empty() {
        return;
    }
    let last = ui.projects.len() - 1;
    let current = ui.list_state.selected().unwrap_or(0);
    let next = if down {
        (current + 1).min(last)
    } else {
        current.saturating_sub(1)
    };
    ui.list_state.select(Some(next));
    let key = ui.projects[next].key.clone();
    app.select_project(&key);
}

fn next_environment(env: Environment) -> Environment {
    match env {
        Environment::Development => Environment::Production,
        Environment::Production => Environment::Development,
    }
}

fn next_output_style(style: OutputStyle) -> OutputStyle {
    match style {
        OutputStyle::Nested => OutputStyle::Expanded,
        OutputStyle::Expanded => OutputStyle::Compact,
        OutputStyle::Compact => OutputStyle::Compressed,
        OutputStyle::Compressed => OutputStyle::Nested,
    }
}

async fn handle_key(app: &mut App, ui: &mut UiState, key: KeyEvent) {
    ui.status = None;

    if ui.confirm_delete {
        ui.confirm_delete = false;
        if key.code == KeyCode::Char('y') {
            if let Some(selected) = ui.selected_key() {
                match app.delete_project(&selected).await {
                    Ok(()) => ui.reload = true,
                    Err(e) => ui.status = Some(e.to_string()),
                }
            }
        }
        return;
    }

    match (key.code, key.modifiers) {
        (KeyCode::Char('q'), _) | (KeyCode::Char('c'), KeyModifiers::CONTROL) => {
            ui.quit = true;
            return;
        }
        (KeyCode::Up, _) | (KeyCode::Char('k'), _) => {
            move_selection(app, ui, false);
            return;
        }
        (KeyCode::Down, _) | (KeyCode::Char('j'), _) => {
            move_selection(app, ui, true);
            return;
        }
        _ => {}
    }

    let Some(selected) = ui.selected_key() else {
        return;
    };
    let result = match key.code {
        KeyCode::Tab => {
            let pane = match app.pane_for(&selected) {
                Pane::Configuration => Pane::Log,
                Pane::Log => Pane::Configuration,
            };
            app.select_pane(&selected, pane);
            Ok(())
        }
        KeyCode::Char('c') => {
            app.select_pane(&selected, Pane::Configuration);
            Ok(())
        }
        KeyCode::Char('l') => {
            app.select_pane(&selected, Pane::Log);
            Ok(())
        }
        KeyCode::Char('s') | KeyCode::Enter => toggle_watch(app, &selected).await,
        KeyCode::Char('e') => {
            let env = app.project(&selected).await.map(|p| p.environment);
            match env {
                Ok(env) => app
                    .set_environment(&selected, next_environment(env))
                    .await
                    .map(|_| ui.reload = true),
                Err(e) => Err(e),
            }
        }
        KeyCode::Char('o') => {
            let style = app.project(&selected).await.map(|p| p.output_style);
            match style {
                Ok(style) => app
                    .set_output_style(&selected, next_output_style(style))
                    .await
                    .map(|_| ui.reload = true),
                Err(e) => Err(e),
            }
        }
        KeyCode::Char('x') | KeyCode::Delete => {
            ui.confirm_delete = true;
            Ok(())
        }
        _ => Ok(()),
    };
    if let Err(e) = result {
        ui.status = Some(e.to_string());
    }
}

async fn toggle_watch(app: &mut App, key: &ProjectKey) -> Result<(), scout_core::app::AppError> {
    if app.state(key).is_active() {
        app.stop_watching(key).await.map(|_| ())
    } else {
        app.start_watching(key).await?.into_result(key)
    }
}

/// Ask every watcher to stop and wait for the exits, forcing after a grace period
async fn shutdown(app: &mut App) {
    for key in app.active_keys() {
        if let Err(e) = app.stop_watching(&key).await {
            tracing::warn!(key = %key, error = %e, "stop on shutdown failed");
        }
    }
    let wait = async {
        while !app.active_keys().is_empty() {
            match app.next_runner_event().await {
                Some(event) => app.handle_runner_event(event),
                None => break,
            }
        }
    };
    if tokio::time::timeout(SHUTDOWN_GRACE, wait).await.is_err() {
        tracing::warn!("watchers did not exit in time");
        app.stop_all();
    }
}

fn draw(f: &mut Frame, app: &App, ui: &mut UiState) {
    let outer = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Length(1), // Top bar
            Constraint::Min(1),    // Main area
            Constraint::Length(1), // Footer
        ])
        .split(f.area());
    let main = Layout::default()
        .direction(Direction::Horizontal)
        .constraints([Constraint::Percentage(30), Constraint::Percentage(70)])
        .split(outer[1]);

    let watching = app.active_keys().len();
    let top_bar = Line::from(vec![
        Span::styled(" Scout ", styles::accent_bold()),
        Span::styled(format!("{} projects", ui.projects.len()), styles::text()),
        Span::raw("  "),
        Span::styled(format!("{} watching", watching), styles::success()),
        Span::raw("  "),
        Span::styled(format!("runner: {}", app.runner_name()), styles::text_muted()),
    ]);
    f.render_widget(Paragraph::new(top_bar), outer[0]);

    draw_projects(f, app, ui, main[0]);
    match ui.selected_key() {
        Some(key) => match app.pane_for(&key) {
            Pane::Configuration => draw_configuration(f, app, ui, &key, main[1]),
            Pane::Log => draw_log(f, app, main[1]),
        },
        None => {
            let hint = Paragraph::new(Line::styled(
                "No projects. Add one with `scout add <dir>`.",
                styles::text_dim(),
            ))
            .block(Block::default().borders(Borders::ALL).border_style(styles::border_subtle()));
            f.render_widget(hint, main[1]);
        }
    }

    f.render_widget(Paragraph::new(footer(ui)), outer[2]);
}

fn draw_projects(f: &mut Frame, app: &App, ui: &mut UiState, area: Rect) {
    let items: Vec<ListItem> = ui
        .projects
        .iter()
        .map(|p| {
            let state = app.state(&p.key);
            ListItem::new(Line::from(vec![
                Span::styled(styles::state_icon(state), styles::state(state)),
                Span::raw(" "),
                Span::styled(p.name.clone(), styles::text()),
            ]))
        })
        .collect();
    let list = List::new(items)
        .block(
            Block::default()
                .title("Projects")
                .borders(Borders::ALL)
                .border_style(styles::border_focused()),
        )
        .highlight_style(styles::selection())
        .highlight_symbol("▶ ");
    f.render_stateful_widget(list, area, &mut ui.list_state);
}

fn pane_title(active: Pane) -> Line<'static> {
    Line::from(vec![
        Span::styled(" Configuration ", styles::tab(active == Pane::Configuration)),
        Span::raw("│"),
        Span::styled(" Log ", styles::tab(active == Pane::Log)),
    ])
}

fn draw_configuration(f: &mut Frame, app: &App, ui: &UiState, key: &ProjectKey, area: Rect) {
    let Some(project) = ui.projects.iter().find(|p| &p.key == key) else {
        return;
    };
    let row = |label: &str, value: &str| {
        let value = if value.is_empty() {
            Span::styled("(default)", styles::text_muted())
        } else {
            Span::styled(value.to_string(), styles::text())
        };
        Line::from(vec![Span::styled(format!("{:<16}", label), styles::text_dim()), value])
    };

    let mut lines = vec![
        row("Name", &project.name),
        row("Directory", &project.project_dir),
    ];
    for field in DirField::ALL {
        lines.push(row(&format!("{} dir", field.label()), project.dir(field)));
    }
    lines.push(row("Environment", project.environment.as_str()));
    lines.push(row("Output style", project.output_style.as_str()));
    let state = app.state(key);
    lines.push(Line::from(vec![
        Span::styled(format!("{:<16}", "State"), styles::text_dim()),
        Span::styled(state.class(), styles::state(state)),
    ]));

    let block = Block::default()
        .title(pane_title(Pane::Configuration))
        .borders(Borders::ALL)
        .border_style(styles::border_subtle());
    f.render_widget(Paragraph::new(lines).block(block), area);
}

fn draw_log(f: &mut Frame, app: &App, area: Rect) {
    let entries = app.visible_log().unwrap_or_default();
    let lines = if entries.is_empty() {
        vec![Line::styled("No output yet. Press s to start watching.", styles::text_muted())]
    } else {
        log_lines(&entries)
    };

    // Follow the tail.
    let height = area.height.saturating_sub(2) as usize;
    let offset = lines.len().saturating_sub(height) as u16;

    let block = Block::default()
        .title(pane_title(Pane::Log))
        .borders(Borders::ALL)
        .border_style(styles::border_subtle());
    f.render_widget(Paragraph::new(lines).block(block).scroll((offset, 0)), area);
}

/// Styled lines from log entries; fragments may span or end lines
fn log_lines(entries: &[&LogEntry]) -> Vec<Line<'static>> {
    let mut lines = Vec::new();
    let mut current: Vec<Span<'static>> = Vec::new();
    for entry in entries {
        for fragment in &entry.fragments {
            let style = styles::fragment(fragment.color());
            let mut parts = fragment.text().split('\n').peekable();
            while let Some(part) = parts.next() {
                let part = part.trim_end_matches('\r');
                if !part.is_empty() {
                    current.push(Span::styled(part.to_string(), style));
                }
                if parts.peek().is_some() {
                    lines.push(Line::from(std::mem::take(&mut current)));
                }
            }
        }
    }
    if !current.is_empty() {
        lines.push(Line::from(current));
    }
    lines
}

fn footer(ui: &UiState) -> Line<'static> {
    if ui.confirm_delete {
        return Line::styled(" Remove this project? y to confirm, any other key to cancel", styles::error());
    }
    if let Some(status) = &ui.status {
        return Line::styled(format!(" {}", status), styles::error());
    }
    let mut spans = Vec::new();
    for (key, label) in [
        ("↑↓", "select"),
        ("tab", "pane"),
        ("s", "start/stop"),
        ("e", "environment"),
        ("o", "output style"),
        ("x", "remove"),
        ("q", "quit"),
    ] {
        spans.push(Span::styled(format!(" {} ", key), styles::key_hint()));
        spans.push(Span::styled(format!("{} ", label), styles::text_dim()));
    }
    Line::from(spans)
}
