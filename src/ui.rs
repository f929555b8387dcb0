use std::env;
use std::io::{self, Stdout};
use std::ops::Range;
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use anyhow::Result;
use crossbeam_channel::{unbounded, Receiver, Sender};
use crossterm::event::{self, Event, KeyCode, KeyEvent, KeyEventKind, KeyModifiers};
use crossterm::terminal::{
    disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen,
};
use crossterm::ExecutableCommand;
use ratatui::backend::{Backend, CrosstermBackend};
use ratatui::layout::{Alignment, Constraint, Direction, Layout, Rect};
use ratatui::style::{Color, Modifier, Style};
use ratatui::text::{Line, Span};
use ratatui::widgets::{Block, Borders, Padding, Paragraph};
use ratatui::{Frame, Terminal};
use semver::Version;

use crate::config::MenuEntry;
use crate::data::{CommentService, Dispatcher, Response, ThreadService};
use crate::pane::{Pane, PaneId, PaneManager, SplitOrientation};
use crate::refresh::Tick;
use crate::render::{LayoutLine, LineKind, TreeGlyphs};
use crate::session::{FetchRequest, Mode, Session};
use crate::update;

const SPINNER_FRAMES: [&str; 10] = ["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏"];
const SEPARATOR_RULE: &str = "────────────────────────";
const INPUT_CURSOR: &str = "▏";

/// Colours for one theme. `mono` keeps everything in the terminal's own
/// palette.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Palette {
    pub bg: Color,
    pub panel_bg: Color,
    pub selected_bg: Color,
    pub border_idle: Color,
    pub border_focused: Color,
    pub text_primary: Color,
    pub text_secondary: Color,
    pub accent: Color,
    pub error: Color,
    pub depth: [Color; 6],
}

impl Palette {
    pub const DEFAULT: Palette = Palette {
        bg: Color::Rgb(30, 30, 46),
        panel_bg: Color::Rgb(24, 24, 36),
        selected_bg: Color::Rgb(69, 71, 90),
        border_idle: Color::Rgb(49, 50, 68),
        border_focused: Color::Rgb(137, 180, 250),
        text_primary: Color::Rgb(205, 214, 244),
        text_secondary: Color::Rgb(166, 173, 200),
        accent: Color::Rgb(137, 180, 250),
        error: Color::Rgb(243, 139, 168),
        depth: [
            Color::Rgb(250, 179, 135),
            Color::Rgb(166, 227, 161),
            Color::Rgb(203, 166, 247),
            Color::Rgb(245, 194, 231),
            Color::Rgb(137, 220, 235),
            Color::Rgb(249, 226, 175),
        ],
    };

    pub const MONO: Palette = Palette {
        bg: Color::Reset,
        panel_bg: Color::Reset,
        selected_bg: Color::DarkGray,
        border_idle: Color::DarkGray,
        border_focused: Color::White,
        text_primary: Color::Reset,
        text_secondary: Color::Gray,
        accent: Color::White,
        error: Color::Red,
        depth: [Color::Gray; 6],
    };

    pub fn for_theme(name: &str) -> Palette {
        match name.trim().to_ascii_lowercase().as_str() {
            "mono" | "monochrome" => Palette::MONO,
            _ => Palette::DEFAULT,
        }
    }

    fn depth_color(&self, depth: usize) -> Color {
        self.depth[depth % self.depth.len()]
    }
}

struct Spinner {
    index: usize,
    last_tick: Instant,
}

impl Spinner {
    fn new() -> Self {
        Self {
            index: 0,
            last_tick: Instant::now(),
        }
    }

    fn frame(&self) -> &'static str {
        SPINNER_FRAMES[self.index % SPINNER_FRAMES.len()]
    }

    fn advance(&mut self) -> bool {
        let now = Instant::now();
        if now.duration_since(self.last_tick) >= Duration::from_millis(120) {
            self.index = (self.index + 1) % SPINNER_FRAMES.len();
            self.last_tick = now;
            true
        } else {
            false
        }
    }

    fn reset(&mut self) {
        self.index = 0;
        self.last_tick = Instant::now();
    }
}

#[derive(Clone)]
pub struct Options {
    pub menu: Arc<[MenuEntry]>,
    pub glyphs: TreeGlyphs,
    pub refresh_interval: Duration,
    pub palette: Palette,
    pub thread_service: Arc<dyn ThreadService>,
    pub comment_service: Arc<dyn CommentService>,
    pub check_updates: bool,
}

pub struct Model {
    panes: PaneManager,
    dispatcher: Dispatcher,
    palette: Palette,
    spinner: Spinner,
    needs_redraw: bool,
    response_rx: Receiver<Response>,
    tick_rx: Receiver<Tick>,
    update_tx: Sender<Result<Option<update::UpdateInfo>>>,
    update_rx: Receiver<Result<Option<update::UpdateInfo>>>,
    update_notice: Option<update::UpdateInfo>,
}

impl Model {
    pub fn new(opts: Options) -> Self {
        let (response_tx, response_rx) = unbounded();
        let (tick_tx, tick_rx) = unbounded();
        let (update_tx, update_rx) = unbounded();
        let mut model = Self {
            panes: PaneManager::new(opts.menu, opts.glyphs, opts.refresh_interval, tick_tx),
            dispatcher: Dispatcher::new(opts.thread_service, opts.comment_service, response_tx),
            palette: opts.palette,
            spinner: Spinner::new(),
            needs_redraw: true,
            response_rx,
            tick_rx,
            update_tx,
            update_rx,
            update_notice: None,
        };
        if opts.check_updates {
            model.queue_update_check();
        }
        model
    }

    fn queue_update_check(&mut self) {
        if cfg!(test) || env::var(update::SKIP_UPDATE_ENV).is_ok() {
            return;
        }
        let Ok(current) = Version::parse(crate::VERSION) else {
            return;
        };
        let tx = self.update_tx.clone();
        thread::spawn(move || {
            let _ = tx.send(update::check_for_update(&current));
        });
    }

    pub fn run(&mut self) -> Result<()> {
        let mut stdout = io::stdout();
        enable_raw_mode()?;
        stdout.execute(EnterAlternateScreen)?;
        let backend = CrosstermBackend::new(stdout);
        let mut terminal = Terminal::new(backend)?;
        terminal.clear()?;

        let result = self.event_loop(&mut terminal);

        disable_raw_mode()?;
        terminal.backend_mut().execute(LeaveAlternateScreen)?;
        terminal.show_cursor()?;

        result
    }

    fn event_loop(&mut self, terminal: &mut Terminal<CrosstermBackend<Stdout>>) -> Result<()> {
        let mut last_tick = Instant::now();
        let tick_rate = Duration::from_millis(120);

        loop {
            if self.poll_async() {
                self.mark_dirty();
            }

            if self.needs_redraw {
                self.redraw(terminal)?;
            }

            let timeout = tick_rate
                .checked_sub(last_tick.elapsed())
                .unwrap_or_else(|| Duration::from_millis(16));

            if event::poll(timeout)? {
                match event::read()? {
                    Event::Key(key) if key.kind == KeyEventKind::Press => {
                        if self.handle_key(key) {
                            break;
                        }
                    }
                    Event::Resize(_, _) => self.mark_dirty(),
                    _ => {}
                }
            }

            if self.poll_async() {
                self.mark_dirty();
            }

            if last_tick.elapsed() >= tick_rate {
                last_tick = Instant::now();
                if self.panes.is_loading() {
                    if self.spinner.advance() {
                        self.mark_dirty();
                    }
                } else {
                    self.spinner.reset();
                }
            }
        }

        tracing::info!("ui loop finished");
        Ok(())
    }

    fn redraw<B: Backend>(&mut self, terminal: &mut Terminal<B>) -> Result<()> {
        let size = terminal.size()?;
        self.sync_pane_sizes(size);
        terminal.draw(|frame| self.draw(frame))?;
        self.needs_redraw = false;
        Ok(())
    }

    fn mark_dirty(&mut self) {
        self.needs_redraw = true;
    }

    /// Returns true when the application should exit.
    fn handle_key(&mut self, key: KeyEvent) -> bool {
        if key.code == KeyCode::Char('c') && key.modifiers.contains(KeyModifiers::CONTROL) {
            return true;
        }
        if key.code == KeyCode::Char('q') && !self.panes.is_editing() {
            return true;
        }

        let outcome = self.panes.handle_key(key.code);
        self.dispatch_all(outcome.fetches);
        self.mark_dirty();
        false
    }

    fn dispatch_all(&self, fetches: Vec<(PaneId, FetchRequest)>) {
        for (pane, request) in fetches {
            self.dispatcher.dispatch(pane, request);
        }
    }

    fn poll_async(&mut self) -> bool {
        let mut changed = false;
        while let Ok(response) = self.response_rx.try_recv() {
            let fetches = self.panes.route_outcome(response.pane, response.outcome);
            self.dispatch_all(fetches);
            changed = true;
        }
        while let Ok(tick) = self.tick_rx.try_recv() {
            let fetches = self.panes.route_tick(&tick);
            changed |= !fetches.is_empty();
            self.dispatch_all(fetches);
        }
        while let Ok(result) = self.update_rx.try_recv() {
            match result {
                Ok(notice) => self.update_notice = notice,
                Err(err) => tracing::debug!(error = %format!("{err:#}"), "update check failed"),
            }
            changed = true;
        }
        changed
    }

    fn areas(&self, full: Rect) -> (Rect, Vec<Rect>, Rect) {
        let layout = Layout::default()
            .direction(Direction::Vertical)
            .constraints([
                Constraint::Length(1),
                Constraint::Min(0),
                Constraint::Length(1),
            ])
            .split(full);

        let panes = match self.panes.orientation() {
            None => vec![layout[1]],
            Some(orientation) => {
                let direction = match orientation {
                    SplitOrientation::Horizontal => Direction::Vertical,
                    SplitOrientation::Vertical => Direction::Horizontal,
                };
                Layout::default()
                    .direction(direction)
                    .constraints([Constraint::Percentage(50), Constraint::Percentage(50)])
                    .split(layout[1])
                    .to_vec()
            }
        };
        (layout[0], panes, layout[2])
    }

    fn sync_pane_sizes(&mut self, full: Rect) {
        let (_, areas, _) = self.areas(full);
        let ids: Vec<PaneId> = self.panes.panes().iter().map(Pane::id).collect();
        for (id, area) in ids.into_iter().zip(areas) {
            let inner = pane_block_frame().inner(area);
            if let Some(pane) = self.panes.pane_mut(id) {
                let session = pane.session_mut();
                let filter_rows = u16::from(session.shows_filter_line());
                session.resize(
                    inner.width as usize,
                    inner.height.saturating_sub(filter_rows) as usize,
                );
            }
        }
    }

    fn draw(&self, frame: &mut Frame<'_>) {
        let full = frame.size();
        frame.render_widget(Block::default().style(Style::default().bg(self.palette.bg)), full);
        let (header_area, pane_areas, footer_area) = self.areas(full);

        let header = Paragraph::new(self.header_text()).style(
            Style::default()
                .fg(self.palette.text_primary)
                .bg(self.palette.selected_bg)
                .add_modifier(Modifier::BOLD),
        );
        frame.render_widget(header, header_area);

        for (pane, area) in self.panes.panes().iter().zip(pane_areas) {
            self.draw_pane(frame, pane, area);
        }

        let (footer_text, footer_style) = self.footer();
        let footer = Paragraph::new(footer_text)
            .style(footer_style)
            .alignment(Alignment::Center);
        frame.render_widget(footer, footer_area);
    }

    fn pane_block(&self, pane: &Pane) -> Block<'static> {
        let focused = pane.is_focused() && self.panes.is_split();
        let border_style = if focused {
            Style::default().fg(self.palette.border_focused)
        } else {
            Style::default().fg(self.palette.border_idle)
        };
        let title_style = if focused {
            Style::default()
                .fg(self.palette.accent)
                .add_modifier(Modifier::BOLD)
        } else {
            Style::default().fg(self.palette.text_secondary)
        };
        pane_block_frame()
            .title(Span::styled(pane_title(pane.session()), title_style))
            .border_style(border_style)
            .style(Style::default().bg(self.palette.panel_bg))
    }

    fn draw_pane(&self, frame: &mut Frame<'_>, pane: &Pane, area: Rect) {
        let block = self.pane_block(pane);
        let inner = block.inner(area);
        frame.render_widget(block, area);

        let session = pane.session();
        let height = inner.height as usize;
        let lines = match session.mode() {
            Mode::Menu => self.menu_lines(session, height),
            Mode::ThreadList => self.thread_lines(session, height),
            Mode::UrlEntry => self.url_lines(session),
            Mode::CommentView => self.comment_view_lines(session),
        };
        frame.render_widget(Paragraph::new(lines), inner);
    }

    fn selectable_line(&self, text: String, selected: bool) -> Line<'static> {
        let style = if selected {
            Style::default()
                .fg(self.palette.text_primary)
                .bg(self.palette.selected_bg)
                .add_modifier(Modifier::BOLD)
        } else {
            Style::default().fg(self.palette.text_primary)
        };
        let marker = if selected { "> " } else { "  " };
        Line::from(Span::styled(format!("{marker}{text}"), style))
    }

    fn menu_lines(&self, session: &Session, height: usize) -> Vec<Line<'static>> {
        let menu = session.menu();
        let window = visible_window(session.menu_index(), menu.len(), height);
        menu[window.clone()]
            .iter()
            .zip(window)
            .map(|(entry, idx)| match entry {
                MenuEntry::Separator => Line::from(Span::styled(
                    format!("  {SEPARATOR_RULE}"),
                    Style::default().fg(self.palette.border_idle),
                )),
                entry => {
                    let selected = idx == session.menu_index();
                    let mut line = self.selectable_line(entry.title().to_string(), selected);
                    if !entry.description().is_empty() {
                        line.spans.push(Span::styled(
                            format!("  {}", entry.description()),
                            Style::default().fg(self.palette.text_secondary),
                        ));
                    }
                    line
                }
            })
            .collect()
    }

    fn thread_lines(&self, session: &Session, height: usize) -> Vec<Line<'static>> {
        let threads = session.threads();
        let window = visible_window(session.thread_index(), threads.len(), height);
        threads[window.clone()]
            .iter()
            .zip(window)
            .map(|(thread, idx)| {
                self.selectable_line(thread.title.clone(), idx == session.thread_index())
            })
            .collect()
    }

    fn url_lines(&self, session: &Session) -> Vec<Line<'static>> {
        vec![
            Line::from(Span::styled(
                "Paste a Reddit thread URL:",
                Style::default().fg(self.palette.text_secondary),
            )),
            Line::from(""),
            Line::from(vec![
                Span::styled("> ", Style::default().fg(self.palette.accent)),
                Span::styled(
                    session.url_input().to_string(),
                    Style::default().fg(self.palette.text_primary),
                ),
                Span::styled(INPUT_CURSOR, Style::default().fg(self.palette.accent)),
            ]),
        ]
    }

    fn comment_view_lines(&self, session: &Session) -> Vec<Line<'static>> {
        let mut lines = Vec::with_capacity(session.viewport().height() + 1);
        if session.shows_filter_line() {
            let mut spans = vec![
                Span::styled("/ ", Style::default().fg(self.palette.accent)),
                Span::styled(
                    session.filter().to_string(),
                    Style::default().fg(self.palette.text_primary),
                ),
            ];
            if session.filter_editing() {
                spans.push(Span::styled(
                    INPUT_CURSOR,
                    Style::default().fg(self.palette.accent),
                ));
            }
            lines.push(Line::from(spans));
        }

        if session.forest().is_empty() && !session.is_loading() {
            let message = if session.filter().is_empty() {
                "No comments yet"
            } else {
                "No comments match the filter"
            };
            lines.push(Line::from(Span::styled(
                message,
                Style::default()
                    .fg(self.palette.text_secondary)
                    .add_modifier(Modifier::ITALIC),
            )));
            return lines;
        }

        lines.extend(
            session
                .visible_lines()
                .iter()
                .map(|line| self.comment_line(line)),
        );
        lines
    }

    fn comment_line(&self, line: &LayoutLine) -> Line<'static> {
        let guide = Style::default().fg(self.palette.depth_color(line.depth));
        let text = match line.kind {
            LineKind::Header => Style::default()
                .fg(self.palette.accent)
                .add_modifier(Modifier::BOLD),
            LineKind::Body | LineKind::Spacer => Style::default().fg(self.palette.text_primary),
        };
        Line::from(vec![
            Span::styled(line.prefix.clone(), guide),
            Span::styled(line.text.clone(), text),
        ])
    }

    fn header_text(&self) -> String {
        let focused = self.panes.focused();
        let mut text = format!(" reddit-stream {}", crate::VERSION);
        if self.panes.is_split() {
            text.push_str(&format!(
                " · [{}] {}",
                self.panes.focused_index() + 1,
                pane_title(focused.session())
            ));
        } else if let Some(thread) = focused.session().thread() {
            text.push_str(&format!(" · {}", thread.title));
        }
        if let Some(notice) = &self.update_notice {
            text.push_str(&format!(" · Update available: v{} ({})", notice.version, notice.url));
        }
        text
    }

    fn footer(&self) -> (String, Style) {
        let session = self.panes.focused().session();
        let base = Style::default().bg(self.palette.panel_bg);
        if let Some(error) = session.error() {
            return (
                error.to_string(),
                base.fg(self.palette.error).add_modifier(Modifier::BOLD),
            );
        }
        if let Some(status) = session.status() {
            let text = if session.is_loading() {
                format!("{} {}", self.spinner.frame(), status)
            } else {
                status.to_string()
            };
            return (text, base.fg(self.palette.text_primary));
        }
        (
            footer_hint(session, self.panes.is_split()),
            base.fg(self.palette.text_secondary)
                .add_modifier(Modifier::ITALIC),
        )
    }
}

fn pane_block_frame() -> Block<'static> {
    Block::default()
        .borders(Borders::ALL)
        .padding(Padding::new(1, 1, 0, 0))
}

fn pane_title(session: &Session) -> String {
    match session.mode() {
        Mode::Menu => "Menu".to_string(),
        Mode::UrlEntry => "Enter Reddit URL".to_string(),
        Mode::ThreadList => session
            .current_entry()
            .map(|entry| entry.title().to_string())
            .unwrap_or_else(|| "Threads".to_string()),
        Mode::CommentView => {
            let title = session
                .thread()
                .map(|thread| thread.title.as_str())
                .filter(|title| !title.is_empty())
                .unwrap_or("Comments");
            let count = crate::tree::count(session.forest());
            let follow = if session.user_scrolled() {
                "paused"
            } else {
                "live"
            };
            format!("{title} ({count}, {follow})")
        }
    }
}

fn footer_hint(session: &Session, split: bool) -> String {
    let mut parts: Vec<&str> = match session.mode() {
        Mode::Menu => vec!["j/k move", "Enter select"],
        Mode::ThreadList => vec!["j/k move", "Enter open", "Backspace back"],
        Mode::UrlEntry => return "Enter load · Esc cancel".to_string(),
        Mode::CommentView if session.filter_editing() => {
            return "Type to filter · Enter apply · Esc clear".to_string();
        }
        Mode::CommentView => vec![
            "/ filter",
            "r refresh",
            "End follow",
            "Backspace threads",
            "Esc menu",
        ],
    };
    if split {
        parts.push("Tab focus");
        parts.push("x close split");
        if session.mode() == Mode::Menu {
            parts.push("Esc close split");
        }
    } else if session.mode() == Mode::CommentView {
        parts.push("h/v split");
    }
    parts.push("q quit");
    parts.join(" · ")
}

/// Rows of a list of `len` items to show so that `selected` stays visible.
fn visible_window(selected: usize, len: usize, height: usize) -> Range<usize> {
    if len == 0 || height == 0 {
        return 0..0;
    }
    let start = selected.saturating_add(1).saturating_sub(height);
    start..(start + height).min(len)
}
