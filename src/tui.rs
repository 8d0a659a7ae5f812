use std::io;
use std::ops::Range;
use std::time::{Duration, Instant};

use crossterm::{
    event::{self, Event, KeyCode, KeyEvent, KeyEventKind, KeyModifiers},
    execute,
    terminal::{EnterAlternateScreen, LeaveAlternateScreen, disable_raw_mode, enable_raw_mode},
};
use ratatui::{
    Frame, Terminal,
    backend::{Backend, CrosstermBackend},
    layout::{Constraint, Direction, Layout, Rect},
    style::{Color, Modifier, Style},
    text::{Line, Span},
    widgets::{Block, Borders, Paragraph, Wrap},
};

use crate::config::Settings;
use crate::error::RunError;
use crate::machine::Status;
use crate::observer::{Diagnostic, Observer, StepEvent};
use crate::scheduler::{Speed, Tick};
use crate::session::Session;
use crate::tape::ROW_WIDTH;
use crate::theme::{self, catppuccin::Mocha as P};
use crate::view::{self, CellFormat};
use crate::{debug, info};

/// Delays selectable with `+`/`-`, fastest first.
const SPEED_STEPS_MS: [u64; 9] = [1, 5, 10, 25, 50, 100, 200, 500, 1000];

/// Redraw interval while nothing is running.
const IDLE_POLL: Duration = Duration::from_millis(250);

/// What the running program has shown so far.
#[derive(Debug, Default)]
pub struct Screen {
    output: Vec<u8>,
    highlight: Option<Range<usize>>,
    last_step: Option<StepEvent>,
    message: Option<String>,
}

impl Screen {
    fn clear(&mut self) {
        *self = Screen::default();
    }
}

impl Observer for Screen {
    fn output(&mut self, byte: u8) {
        self.output.push(byte);
    }

    fn diagnostic(&mut self, diagnostic: &Diagnostic) {
        self.message = Some(diagnostic.to_string());
    }

    fn step(&mut self, event: &StepEvent) {
        self.highlight = Some(event.source.clone());
        self.last_step = Some(event.clone());
    }

    fn halted(&mut self, status: Status) {
        if status == Status::HaltedNormal {
            self.highlight = None;
            self.message = Some("program finished".to_string());
        }
    }
}

pub struct App {
    session: Session,
    screen: Screen,
    title: String,

    // pacing
    speed_index: usize,
    instant: bool,
    next_tick: Option<Instant>,

    // memory pane
    format: CellFormat,
    // None follows the data pointer
    tape_scroll: Option<usize>,
    // Grid rows on screen, refreshed on every draw
    tape_page: usize,

    show_help: bool,
}

impl App {
    pub fn new(settings: &Settings, source: &str, input: Vec<u8>, title: String) -> Self {
        let mut session = Session::new(settings.tape_size, settings.exec_config());
        session.set_source(source);
        session.set_input(input);

        // Closest selectable delay to the configured one
        let speed_index = SPEED_STEPS_MS
            .iter()
            .enumerate()
            .min_by_key(|(_, ms)| ms.abs_diff(settings.speed_ms))
            .map_or(4, |(i, _)| i);

        let mut app = Self {
            session,
            screen: Screen::default(),
            title,
            speed_index,
            instant: settings.instant || settings.speed_ms == 0,
            next_tick: None,
            format: CellFormat::Hex,
            tape_scroll: None,
            tape_page: 16,
            show_help: false,
        };
        if let Err(e) = app.session.check() {
            app.screen.message = Some(e.to_string());
        }
        app
    }

    /// Speed as currently selected. Read again before every tick.
    pub fn speed(&self) -> Speed {
        Speed::from_millis(SPEED_STEPS_MS[self.speed_index], self.instant)
    }

    fn speed_label(&self) -> String {
        match self.speed() {
            Speed::Instant => "instant".to_string(),
            Speed::Delay(d) => format!("{} ms", d.as_millis()),
        }
    }

    pub fn is_running(&self) -> bool {
        self.session.is_running()
    }

    /// Start, resume or pause a paced run.
    pub fn toggle_run(&mut self, now: Instant) {
        if self.session.is_running() {
            self.session.cancel();
            self.next_tick = None;
            self.screen.message = Some("paused".to_string());
            return;
        }
        let fresh = !self.session.can_resume();
        match self.session.resume_paced() {
            Ok(()) => {
                if fresh {
                    self.screen.clear();
                }
                self.screen.message = None;
                self.next_tick = Some(now);
                debug!("watch: run started (fresh={fresh})");
            }
            Err(e) => self.report(e),
        }
    }

    /// Execute a single highlighted step.
    pub fn step_once(&mut self) {
        if self.session.is_running() {
            self.screen.message = Some("pause the run before stepping".to_string());
            return;
        }
        if !self.session.can_resume() {
            self.screen.clear();
        }
        if let Err(e) = self.session.step(&mut self.screen) {
            self.report(e);
        }
    }

    /// Stop everything and clear the tape and output.
    pub fn reset(&mut self) {
        self.session.reset();
        self.screen.clear();
        self.next_tick = None;
        self.tape_scroll = None;
    }

    /// Run a tick if one is due.
    pub fn on_tick(&mut self, now: Instant) {
        let due = self.next_tick.is_some_and(|at| now >= at);
        if !due {
            return;
        }
        let speed = self.speed();
        match self.session.tick(&mut self.screen, speed) {
            Some(Tick::Continue(delay)) => self.next_tick = Some(now + delay),
            Some(Tick::Finished(status)) => {
                info!("watch: run finished with status {status}");
                self.next_tick = None;
            }
            None => self.next_tick = None,
        }
    }

    fn poll_timeout(&self, now: Instant) -> Duration {
        match self.next_tick {
            Some(at) => at.saturating_duration_since(now).min(IDLE_POLL),
            None => IDLE_POLL,
        }
    }

    fn faster(&mut self) {
        self.speed_index = self.speed_index.saturating_sub(1);
    }

    fn slower(&mut self) {
        self.speed_index = (self.speed_index + 1).min(SPEED_STEPS_MS.len() - 1);
    }

    fn report(&mut self, e: RunError) {
        self.screen.message = Some(e.to_string());
    }

    fn scroll_tape(&mut self, delta: isize) {
        let tape = self.session.tape();
        let rows = view::row_count(tape);
        let current = self.tape_scroll.unwrap_or_else(|| view::pointer_row(tape));
        let next = current.saturating_add_signed(delta).min(rows.saturating_sub(1));
        self.tape_scroll = Some(next);
    }
}

pub fn run(mut app: App) -> io::Result<()> {
    // terminal setup
    enable_raw_mode()?;
    let mut stdout = io::stdout();
    execute!(stdout, EnterAlternateScreen)?;
    let backend = CrosstermBackend::new(stdout);
    let mut terminal = Terminal::new(backend)?;
    terminal.clear()?;

    let res = run_app(&mut terminal, &mut app);

    // restore terminal
    disable_raw_mode()?;
    execute!(terminal.backend_mut(), LeaveAlternateScreen)?;
    terminal.show_cursor()?;

    res
}

fn run_app<B: Backend>(terminal: &mut Terminal<B>, app: &mut App) -> io::Result<()> {
    loop {
        let mut page = app.tape_page;
        terminal.draw(|f| {
            page = grid_rows_visible(f.area());
            ui(f, app)
        })?;
        app.tape_page = page;

        if event::poll(app.poll_timeout(Instant::now()))? {
            if let Event::Key(key) = event::read()? {
                if key.kind == KeyEventKind::Press && handle_key(app, key, Instant::now()) {
                    break;
                }
            }
        }

        app.on_tick(Instant::now());
    }
    Ok(())
}

/// Apply a key press. Returns true when the viewer should close.
pub fn handle_key(app: &mut App, key: KeyEvent, now: Instant) -> bool {
    if key.modifiers.contains(KeyModifiers::CONTROL) && key.code == KeyCode::Char('c') {
        return true;
    }
    if app.show_help {
        // Any key closes the overlay
        app.show_help = false;
        return false;
    }
    match key.code {
        KeyCode::Char('q') | KeyCode::Esc => return true,
        KeyCode::Char(' ') | KeyCode::Char('r') | KeyCode::F(5) => app.toggle_run(now),
        KeyCode::Char('s') | KeyCode::Char('n') | KeyCode::F(10) => app.step_once(),
        KeyCode::Char('x') | KeyCode::Backspace => app.reset(),
        KeyCode::Char('+') | KeyCode::Char('=') => app.faster(),
        KeyCode::Char('-') | KeyCode::Char('_') => app.slower(),
        KeyCode::Char('i') => app.instant = !app.instant,
        KeyCode::Char('f') => app.format = app.format.toggle(),
        KeyCode::Up => app.scroll_tape(-1),
        KeyCode::Down => app.scroll_tape(1),
        KeyCode::PageUp => app.scroll_tape(-(app.tape_page as isize)),
        KeyCode::PageDown => app.scroll_tape(app.tape_page as isize),
        KeyCode::Home => app.tape_scroll = None,
        KeyCode::Char('?') | KeyCode::F(1) => app.show_help = true,
        _ => {}
    }
    false
}

pub fn ui(f: &mut Frame, app: &App) {
    let size = f.area();

    // Root: vertical layout -> main area + status bar
    let root = Layout::default()
        .direction(Direction::Vertical)
        .constraints([Constraint::Min(1), Constraint::Length(1)])
        .split(size);

    // Main area: source and output on the left, memory on the right
    let cols = Layout::default()
        .direction(Direction::Horizontal)
        .constraints([Constraint::Min(20), Constraint::Length(grid_width())])
        .split(root[0]);

    let left_rows = Layout::default()
        .direction(Direction::Vertical)
        .constraints([Constraint::Min(3), Constraint::Length(8)])
        .split(cols[0]);

    draw_source(f, left_rows[0], app);
    draw_output(f, left_rows[1], app);
    draw_tape(f, cols[1], app);
    draw_status(f, root[1], app);

    if app.show_help {
        draw_help_overlay(f, size);
    }
}

// Memory pane height inside its borders, below which sits the status bar
fn grid_rows_visible(area: Rect) -> usize {
    (area.height.saturating_sub(1 + 2) as usize).max(1)
}

// Address column, 16 cells of up to 4 columns each, borders
fn grid_width() -> u16 {
    (6 + ROW_WIDTH * 5 + 2) as u16
}

fn draw_source(f: &mut Frame, area: Rect, app: &App) {
    let block = Block::default()
        .title(Span::styled(
            format!("Source - {}", app.title),
            Style::default().fg(Color::Cyan),
        ))
        .borders(Borders::ALL);
    let inner = block.inner(area);
    f.render_widget(block, area);

    let source = app.session.source();
    let lines = highlight_source(source, app.screen.highlight.as_ref());

    // Keep the highlighted line in view
    let focus_line = app
        .screen
        .highlight
        .as_ref()
        .map_or(0, |span| line_of_offset(source, span.start));
    let height = inner.height as usize;
    let scroll = focus_line.saturating_sub(height / 2);

    let paragraph = Paragraph::new(lines).scroll((scroll as u16, 0));
    f.render_widget(paragraph, inner);
}

/// Source lines with instruction colors and the executing span reversed.
pub fn highlight_source(source: &str, span: Option<&Range<usize>>) -> Vec<Line<'static>> {
    let mut lines = Vec::new();
    let mut spans: Vec<Span<'static>> = Vec::new();
    for (offset, ch) in source.chars().enumerate() {
        if ch == '\n' {
            lines.push(Line::from(std::mem::take(&mut spans)));
            continue;
        }
        let mut style = Style::default().fg(theme::to_ratatui(theme::instruction_color(ch)));
        if span.is_some_and(|r| r.contains(&offset)) {
            style = style
                .bg(theme::to_ratatui(P::YELLOW))
                .fg(Color::Black)
                .add_modifier(Modifier::BOLD);
        }
        spans.push(Span::styled(ch.to_string(), style));
    }
    if !spans.is_empty() || lines.is_empty() {
        lines.push(Line::from(spans));
    }
    lines
}

fn line_of_offset(source: &str, offset: usize) -> usize {
    source.chars().take(offset).filter(|&c| c == '\n').count()
}

fn draw_output(f: &mut Frame, area: Rect, app: &App) {
    let block = Block::default()
        .title(Span::styled("Output", Style::default().fg(Color::Gray)))
        .borders(Borders::ALL);
    let inner = block.inner(area);
    f.render_widget(block, area);

    let paragraph = if app.screen.output.is_empty() {
        Paragraph::new("<no output yet>")
    } else {
        Paragraph::new(view::bytes_to_escaped(&app.screen.output)).wrap(Wrap { trim: false })
    };
    f.render_widget(paragraph, inner);
}

fn draw_tape(f: &mut Frame, area: Rect, app: &App) {
    let block = Block::default()
        .title(Line::raw(format!("Memory ({})", app.format.label())))
        .borders(Borders::ALL)
        .border_style(Style::default().fg(Color::Gray));
    let inner = block.inner(area);
    f.render_widget(block, area);

    let tape = app.session.tape();
    let visible = inner.height as usize;
    let rows = view::row_count(tape);
    let first = match app.tape_scroll {
        Some(row) => row,
        // Keep the pointer's row roughly centered
        None => view::pointer_row(tape).saturating_sub(visible / 2),
    }
    .min(rows.saturating_sub(visible.max(1)));

    let mut lines = Vec::with_capacity(visible);
    for row in first..(first + visible).min(rows) {
        let base = row * ROW_WIDTH;
        let mut spans = vec![Span::styled(
            format!("{base:04X} "),
            Style::default().fg(theme::to_ratatui(P::SURFACE2)),
        )];
        for (i, &value) in tape.window(base, ROW_WIDTH).iter().enumerate() {
            let style = if base + i == tape.pointer() {
                Style::default()
                    .fg(Color::Black)
                    .bg(theme::to_ratatui(P::YELLOW))
                    .add_modifier(Modifier::BOLD)
            } else if value != 0 {
                Style::default().fg(theme::to_ratatui(P::TEXT))
            } else {
                Style::default().fg(theme::to_ratatui(P::SURFACE1))
            };
            spans.push(Span::raw(" "));
            spans.push(Span::styled(app.format.cell(value), style));
        }
        lines.push(Line::from(spans));
    }
    f.render_widget(Paragraph::new(lines), inner);
}

fn draw_status(f: &mut Frame, area: Rect, app: &App) {
    let (status, steps) = match app.session.interpreter() {
        Some(interp) => (interp.status(), interp.steps()),
        None => (Status::Ready, 0),
    };
    let run_state = if app.is_running() {
        "running".to_string()
    } else {
        status.to_string()
    };
    let tape = app.session.tape();
    let mut text = format!(
        " {run_state} | step {steps} | ptr {:04X} = {} | speed {} ",
        tape.pointer(),
        app.format.cell(tape.get()).trim(),
        app.speed_label()
    );
    if let Some(event) = &app.screen.last_step {
        let run = if event.run > 1 { format!("x{}", event.run) } else { String::new() };
        text.push_str(&format!("| last {}{run} at {} ", event.op, event.source.start));
    }
    if let Some(message) = &app.screen.message {
        text.push_str(&format!("| {message} "));
    }
    text.push_str("| ? help");

    let style = match status {
        Status::HaltedStepLimit | Status::HaltedError => Style::default().fg(theme::to_ratatui(P::RED)),
        _ => Style::default().fg(theme::to_ratatui(P::SUBTEXT0)),
    };
    f.render_widget(Paragraph::new(Line::from(Span::styled(text, style))), area);
}

fn draw_help_overlay(f: &mut Frame, area: Rect) {
    let block = Block::default().title("Help").borders(Borders::ALL);

    let w = area.width.saturating_sub(area.width / 4);
    let h = area.height.saturating_sub(area.height / 3);
    let x = area.x + (area.width - w) / 2;
    let y = area.y + (area.height - h) / 2;
    let rect = Rect { x, y, width: w, height: h };
    f.render_widget(ratatui::widgets::Clear, rect);
    f.render_widget(block, rect);

    let text = vec![
        Line::raw("Space/r/F5: Run or pause"),
        Line::raw("s/n/F10: Step once"),
        Line::raw("x/Backspace: Reset tape and output"),
        Line::raw("+/-: Faster or slower  i: Toggle instant"),
        Line::raw("f: Toggle hex/decimal cells"),
        Line::raw("Up/Down, PageUp/PageDown: Scroll memory  Home: Follow pointer"),
        Line::raw("?/F1: Toggle this help"),
        Line::raw("q/Esc/Ctrl+C: Quit"),
    ];
    let inner = Rect {
        x: rect.x + 2,
        y: rect.y + 1,
        width: rect.width.saturating_sub(4),
        height: rect.height.saturating_sub(2),
    };
    f.render_widget(Paragraph::new(text).wrap(Wrap { trim: false }), inner);
}
