//! Full-screen cluster repair dashboard.
//!
//! The terminal loop runs on a blocking thread; snapshots arrive from the
//! background aggregator through a `watch` channel and refresh-interval
//! changes travel back the same way.

use std::{io, sync::Arc, time::Duration};

use anyhow::Result;
use chrono::{DateTime, Utc};
use crossterm::{
    event::{self, Event, KeyCode, KeyEvent, KeyEventKind, KeyModifiers},
    execute,
    terminal::{EnterAlternateScreen, LeaveAlternateScreen, disable_raw_mode, enable_raw_mode},
};
use ratatui::{
    backend::{Backend, CrosstermBackend},
    layout::{Constraint, Direction, Layout},
    prelude::*,
    style::{Color, Modifier, Style},
    widgets::{Block, Borders, List, ListItem, Paragraph},
};
use repairlock_core::{
    ClusterSnapshot, Severity, Thresholds,
    cluster::{NodeRow, format_elapsed},
};
use tokio::sync::watch;

const MIN_INTERVAL: Duration = Duration::from_secs(1);
const INTERVAL_STEP: Duration = Duration::from_secs(1);
const TICK: Duration = Duration::from_millis(250);

/// Source of key events so tests can drive the dashboard without a tty.
pub(crate) trait EventSource {
    fn next(&mut self, timeout: Duration) -> Result<Option<Event>>;
}

struct CrosstermEventSource;

impl EventSource for CrosstermEventSource {
    fn next(&mut self, timeout: Duration) -> Result<Option<Event>> {
        if event::poll(timeout)? {
            Ok(Some(event::read()?))
        } else {
            Ok(None)
        }
    }
}

pub(crate) struct DashboardState {
    snapshots: watch::Receiver<Arc<ClusterSnapshot>>,
    interval_tx: watch::Sender<Duration>,
    thresholds: Thresholds,
}

impl DashboardState {
    pub(crate) fn new(
        snapshots: watch::Receiver<Arc<ClusterSnapshot>>,
        interval_tx: watch::Sender<Duration>,
        thresholds: Thresholds,
    ) -> Self {
        Self {
            snapshots,
            interval_tx,
            thresholds,
        }
    }

    fn interval(&self) -> Duration {
        *self.interval_tx.borrow()
    }
}

/// Takes over the terminal until the user quits.
pub fn run(
    snapshots: watch::Receiver<Arc<ClusterSnapshot>>,
    interval_tx: watch::Sender<Duration>,
    thresholds: Thresholds,
) -> Result<()> {
    let mut stdout = io::stdout();
    enable_raw_mode()?;
    execute!(stdout, EnterAlternateScreen)?;
    let backend = CrosstermBackend::new(stdout);
    let mut terminal = Terminal::new(backend)?;

    let mut state = DashboardState::new(snapshots, interval_tx, thresholds);
    let result = run_app(&mut terminal, &mut state, &mut CrosstermEventSource);

    disable_raw_mode()?;
    execute!(terminal.backend_mut(), LeaveAlternateScreen)?;
    terminal.show_cursor()?;
    result
}

pub(crate) fn run_app<B: Backend>(
    terminal: &mut Terminal<B>,
    state: &mut DashboardState,
    source: &mut dyn EventSource,
) -> Result<()> {
    loop {
        let snapshot = Arc::clone(&state.snapshots.borrow_and_update());
        let interval = state.interval();
        terminal.draw(|f| render(f, &snapshot, interval, state.thresholds, Utc::now()))?;

        if let Some(Event::Key(key)) = source.next(TICK)?
            && handle_key(key, &state.interval_tx)
        {
            return Ok(());
        }
    }
}

/// Applies one key press. Returns `true` when the dashboard should close.
fn handle_key(key: KeyEvent, interval_tx: &watch::Sender<Duration>) -> bool {
    if key.kind != KeyEventKind::Press {
        return false;
    }
    match key.code {
        KeyCode::Char('q') | KeyCode::Esc => true,
        KeyCode::Char('c') if key.modifiers.contains(KeyModifiers::CONTROL) => true,
        KeyCode::Char('+') => {
            interval_tx.send_modify(|interval| *interval += INTERVAL_STEP);
            false
        }
        KeyCode::Char('-') => {
            interval_tx.send_modify(|interval| {
                *interval = interval.saturating_sub(INTERVAL_STEP).max(MIN_INTERVAL);
            });
            false
        }
        _ => false,
    }
}

fn severity_color(severity: Severity) -> Color {
    match severity {
        Severity::Ok => Color::Green,
        Severity::Warning => Color::Yellow,
        Severity::Critical => Color::Red,
    }
}

fn row_line(row: &NodeRow, name_width: usize, status_width: usize) -> String {
    format!(
        "{:<name_width$}  {:<status_width$}  {}",
        row.nodename,
        row.status.label(),
        format_elapsed(row.elapsed),
    )
}

fn render(
    f: &mut Frame,
    snapshot: &ClusterSnapshot,
    interval: Duration,
    thresholds: Thresholds,
    now: DateTime<Utc>,
) {
    let areas = Layout::default()
        .direction(Direction::Vertical)
        .constraints([Constraint::Length(3), Constraint::Min(3)].as_ref())
        .split(f.size());

    let summary = format!(
        "Running: {:3}  Complete: {:3}  Refresh: {}s",
        snapshot.running(),
        snapshot.completed(),
        interval.as_secs()
    );
    let header = Paragraph::new(Line::from(vec![Span::styled(
        summary,
        Style::default().add_modifier(Modifier::BOLD),
    )]))
    .block(
        Block::default()
            .borders(Borders::ALL)
            .title(" repairlock  (+/- refresh, q quit) "),
    );
    f.render_widget(header, areas[0]);

    let rows = snapshot.rows(now, thresholds);
    let name_width = rows
        .iter()
        .map(|row| row.nodename.len())
        .chain(std::iter::once("Hostname".len()))
        .max()
        .unwrap_or_default();
    let status_width = rows
        .iter()
        .map(|row| row.status.label().len())
        .chain(std::iter::once("Status".len()))
        .max()
        .unwrap_or_default();

    let mut items = vec![ListItem::new(Line::from(vec![Span::styled(
        format!(
            "{:<name_width$}  {:<status_width$}  {}",
            "Hostname", "Status", "Time since last update"
        ),
        Style::default().fg(Color::Cyan).add_modifier(Modifier::BOLD),
    )]))];
    items.extend(rows.iter().map(|row| {
        ListItem::new(Line::from(vec![Span::styled(
            row_line(row, name_width, status_width),
            Style::default().fg(severity_color(row.severity)),
        )]))
    }));

    let list = List::new(items).block(Block::default().borders(Borders::ALL).title(" Nodes "));
    f.render_widget(list, areas[1]);
}
