use std::collections::BTreeMap;
use std::io::{self, Stdout};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use anyhow::Result;
use crossbeam_channel::{unbounded, Receiver, Sender};
use crossterm::event::{self, Event, KeyCode, KeyEventKind, MouseEvent, MouseEventKind};
use crossterm::event::{DisableMouseCapture, EnableMouseCapture};
use crossterm::terminal::{
    disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen,
};
use crossterm::ExecutableCommand;
use ratatui::backend::CrosstermBackend;
use ratatui::layout::{Alignment, Constraint, Direction, Layout, Rect};
use ratatui::style::{Color, Modifier, Style};
use ratatui::text::{Line, Span, Text};
use ratatui::widgets::{Block, Borders, Clear, Paragraph, Wrap};
use ratatui::{Frame, Terminal};

use crate::config::FeedConfig;
use crate::data::FeedService;
use crate::feed::FeedController;
use crate::model::{VideoEntry, SOUND_LABEL};
use crate::playback::{CellEvent, CellState, CellView, PlaybackHandle, VideoCell};
use crate::remix::{PromptOutcome, RemixDispatcher, RemixEvent, RemixPrompt};
use crate::visibility::ScrollTracker;

const COLOR_BG: Color = Color::Rgb(0, 0, 0);
const COLOR_PANEL_BG: Color = Color::Rgb(18, 18, 24);
const COLOR_TEXT_PRIMARY: Color = Color::Rgb(255, 255, 255);
const COLOR_TEXT_SECONDARY: Color = Color::Rgb(170, 170, 185);
const COLOR_ACCENT: Color = Color::Rgb(233, 67, 89);
const COLOR_REMIX: Color = Color::Rgb(160, 32, 240);
const COLOR_ERROR: Color = Color::Rgb(243, 139, 168);

const SPINNER_FRAMES: [&str; 10] = [
    "⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏",
];
const MOUSE_SCROLL_LINES: isize = 3;
const ICON_LIKES: &str = "♥";
const ICON_COMMENTS: &str = "💬";
const ICON_REMIX: &str = "✨";
const ICON_SHARE: &str = "↗";
const ICON_SOUND: &str = "♪";

/// Creates the playback handle for a newly mounted cell.
pub type Launcher<H> = Box<dyn FnMut(&VideoEntry) -> Result<H>>;

pub struct Options {
    pub status_message: String,
    pub feed_service: Arc<dyn FeedService>,
    pub remix: RemixDispatcher,
    pub feed: FeedConfig,
}

enum MountedCell<H: PlaybackHandle> {
    Live(VideoCell<H>),
    Broken(String),
}

impl<H: PlaybackHandle> MountedCell<H> {
    fn unmount(self) {
        if let MountedCell::Live(cell) = self {
            cell.unmount();
        }
    }
}

enum AsyncResponse {
    Feed {
        request_id: u64,
        result: Result<Vec<VideoEntry>>,
    },
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

pub struct Model<H: PlaybackHandle> {
    status_message: String,
    controller: FeedController<RemixDispatcher>,
    feed_service: Arc<dyn FeedService>,
    launcher: Launcher<H>,
    cells: BTreeMap<usize, MountedCell<H>>,
    tracker: ScrollTracker,
    mount_radius: usize,
    prompt: Option<RemixPrompt>,
    spinner: Spinner,
    needs_redraw: bool,
    response_tx: Sender<AsyncResponse>,
    response_rx: Receiver<AsyncResponse>,
    next_request_id: u64,
    pending_feed: Option<u64>,
}

impl<H: PlaybackHandle> Model<H> {
    pub fn new(options: Options, launcher: Launcher<H>) -> Self {
        let (response_tx, response_rx) = unbounded();
        let mut model = Self {
            status_message: options.status_message,
            controller: FeedController::new(options.remix),
            feed_service: options.feed_service,
            launcher,
            cells: BTreeMap::new(),
            tracker: ScrollTracker::new(options.feed.visible_fraction(), options.feed.settle_delay),
            mount_radius: options.feed.mount_radius,
            prompt: None,
            spinner: Spinner::new(),
            needs_redraw: true,
            response_tx,
            response_rx,
            next_request_id: 0,
            pending_feed: None,
        };
        model.reload_feed();
        model
    }

    pub fn run(&mut self) -> Result<()> {
        let mut stdout = io::stdout();
        enable_raw_mode()?;
        stdout.execute(EnterAlternateScreen)?;
        stdout.execute(EnableMouseCapture)?;
        let backend = CrosstermBackend::new(stdout);
        let mut terminal = Terminal::new(backend)?;
        terminal.clear()?;

        let result = self.event_loop(&mut terminal);
        self.unmount_all();

        disable_raw_mode()?;
        terminal.backend_mut().execute(DisableMouseCapture)?;
        terminal.backend_mut().execute(LeaveAlternateScreen)?;
        terminal.show_cursor()?;

        result
    }

    fn event_loop(&mut self, terminal: &mut Terminal<CrosstermBackend<Stdout>>) -> Result<()> {
        let mut last_tick = Instant::now();
        let tick_rate = Duration::from_millis(50);

        loop {
            if self.poll_async() {
                self.mark_dirty();
            }

            if self.needs_redraw {
                terminal.draw(|frame| self.draw(frame))?;
                self.needs_redraw = false;
            }

            let timeout = tick_rate
                .checked_sub(last_tick.elapsed())
                .unwrap_or_else(|| Duration::from_millis(16));

            if event::poll(timeout)? {
                match event::read()? {
                    Event::Key(key) if key.kind == KeyEventKind::Press => {
                        if self.handle_key(key.code) {
                            break;
                        }
                    }
                    Event::Mouse(mouse) => self.handle_mouse(mouse),
                    Event::Resize(..) => self.mark_dirty(),
                    _ => {}
                }
            }

            if last_tick.elapsed() >= tick_rate {
                last_tick = Instant::now();
                self.tick(last_tick);
            }
        }

        Ok(())
    }

    fn mark_dirty(&mut self) {
        self.needs_redraw = true;
    }

    fn is_loading(&self) -> bool {
        self.pending_feed.is_some()
    }

    fn tick(&mut self, now: Instant) {
        let count = self.controller.state().len();
        if let Some(visible) = self.tracker.poll_settled(count, now) {
            self.apply_visibility(&visible);
            if let Some(active) = self.controller.state().active_index() {
                self.tracker.snap_to_row(active, count);
            }
            self.mark_dirty();
        }

        if self.pump_cells() {
            self.mark_dirty();
        }

        if self.is_loading() {
            if self.spinner.advance() {
                self.mark_dirty();
            }
        } else {
            self.spinner.reset();
        }
    }

    fn reload_feed(&mut self) {
        self.next_request_id += 1;
        let request_id = self.next_request_id;
        self.pending_feed = Some(request_id);
        self.status_message = "Loading feed…".to_string();

        let service = self.feed_service.clone();
        let tx = self.response_tx.clone();
        thread::spawn(move || {
            let result = service.load_feed();
            let _ = tx.send(AsyncResponse::Feed { request_id, result });
        });
    }

    fn poll_async(&mut self) -> bool {
        let mut changed = false;
        while let Ok(message) = self.response_rx.try_recv() {
            self.handle_async_response(message);
            changed = true;
        }
        while let Some(event) = self.controller.remix_handler().try_event() {
            self.status_message = match event {
                RemixEvent::Submitted { video_id } => {
                    format!("Remix of video {video_id} submitted.")
                }
                RemixEvent::Failed(err) => err.to_string(),
            };
            changed = true;
        }
        changed
    }

    fn handle_async_response(&mut self, message: AsyncResponse) {
        match message {
            AsyncResponse::Feed { request_id, result } => {
                if self.pending_feed != Some(request_id) {
                    return;
                }
                self.pending_feed = None;
                match self.controller.complete_load(result) {
                    Ok(_) => {
                        self.unmount_all();
                        let count = self.controller.state().len();
                        self.tracker.snap_to_row(0, count);
                        self.status_message = if count == 0 {
                            "The feed is empty. Press r to reload.".to_string()
                        } else {
                            format!("Loaded {count} videos. j/k to scroll, x to remix.")
                        };
                        self.sync_cells();
                    }
                    Err(err) => {
                        self.status_message = format!("{err}. Press r to retry.");
                    }
                }
            }
        }
    }

    fn apply_visibility(&mut self, visible: &[usize]) {
        if self.controller.on_visibility_changed(visible).is_some() {
            self.sync_cells();
        }
    }

    /// Pages to `index`, as a snap scroll would.
    fn page_to(&mut self, index: usize) {
        let count = self.controller.state().len();
        if count == 0 {
            return;
        }
        let index = index.min(count - 1);
        self.tracker.snap_to_row(index, count);
        let visible = self.tracker.visible(count);
        if visible.is_empty() {
            self.apply_visibility(&[index]);
        } else {
            self.apply_visibility(&visible);
        }
    }

    /// Mounts cells around the active row, unmounts the rest, and hands every
    /// mounted cell its active flag.
    fn sync_cells(&mut self) {
        let state = self.controller.state();
        let Some(active) = state.active_index() else {
            self.unmount_all();
            return;
        };
        let first = active.saturating_sub(self.mount_radius);
        let last = (active + self.mount_radius).min(state.len() - 1);

        let stale: Vec<usize> = self
            .cells
            .keys()
            .copied()
            .filter(|idx| *idx < first || *idx > last)
            .collect();
        for idx in stale {
            if let Some(cell) = self.cells.remove(&idx) {
                cell.unmount();
            }
        }

        for idx in first..=last {
            if self.cells.contains_key(&idx) {
                continue;
            }
            let Some(entry) = self.controller.state().get(idx) else {
                continue;
            };
            let mounted = match (self.launcher)(entry) {
                Ok(handle) => MountedCell::Live(VideoCell::mount(entry, handle)),
                Err(err) => {
                    let message = format!("{err:#}");
                    tracing::warn!(entry_id = %entry.id, %message, "could not start player");
                    MountedCell::Broken(message)
                }
            };
            self.cells.insert(idx, mounted);
        }

        let mut events = Vec::new();
        for (idx, mounted) in self.cells.iter_mut() {
            if let MountedCell::Live(cell) = mounted {
                if let Some(event) = cell.set_active(*idx == active) {
                    events.push(event);
                }
            }
        }
        for event in events {
            self.report_cell_event(event);
        }
    }

    fn pump_cells(&mut self) -> bool {
        let mut events = Vec::new();
        for mounted in self.cells.values_mut() {
            if let MountedCell::Live(cell) = mounted {
                events.extend(cell.pump());
            }
        }
        let changed = !events.is_empty();
        for event in events {
            self.report_cell_event(event);
        }
        changed
    }

    fn report_cell_event(&mut self, event: CellEvent) {
        match event {
            CellEvent::Failed(err) => self.status_message = err.to_string(),
            CellEvent::Started | CellEvent::Stopped | CellEvent::Looped => {}
        }
    }

    fn unmount_all(&mut self) {
        for (_, cell) in std::mem::take(&mut self.cells) {
            cell.unmount();
        }
    }

    fn open_remix_prompt(&mut self) {
        let state = self.controller.state();
        let (Some(active), Some(entry)) = (state.active_index(), state.active_entry()) else {
            return;
        };
        let prompt = match self.cells.get(&active) {
            Some(MountedCell::Live(cell)) => cell.on_remix_tap(),
            _ => RemixPrompt::new(entry.id.clone()),
        };
        self.prompt = Some(prompt);
    }

    fn finish_remix_prompt(&mut self, submit: bool) {
        let Some(prompt) = self.prompt.take() else {
            return;
        };
        let entry_id = prompt.entry_id().to_string();
        let outcome = if submit {
            prompt.submit()
        } else {
            prompt.cancel()
        };
        let cancelled = outcome == PromptOutcome::Cancel;
        if self.controller.on_remix_requested(&entry_id, outcome) {
            self.status_message = format!("Remixing video {entry_id}…");
        } else if !cancelled {
            self.status_message = "Remix needs a prompt.".to_string();
        }
    }

    /// Returns `true` when the app should exit.
    fn handle_key(&mut self, code: KeyCode) -> bool {
        if self.prompt.is_some() {
            self.handle_prompt_key(code);
            self.mark_dirty();
            return false;
        }

        let active = self.controller.state().active_index().unwrap_or(0);
        match code {
            KeyCode::Char('q') | KeyCode::Esc => return true,
            KeyCode::Char('j') | KeyCode::Down | KeyCode::PageDown | KeyCode::Char(' ') => {
                self.page_to(active + 1)
            }
            KeyCode::Char('k') | KeyCode::Up | KeyCode::PageUp => {
                self.page_to(active.saturating_sub(1))
            }
            KeyCode::Char('g') | KeyCode::Home => self.page_to(0),
            KeyCode::Char('G') | KeyCode::End => self.page_to(usize::MAX),
            KeyCode::Char('r') => self.reload_feed(),
            KeyCode::Char('x') | KeyCode::Enter => self.open_remix_prompt(),
            _ => return false,
        }
        self.mark_dirty();
        false
    }

    fn handle_prompt_key(&mut self, code: KeyCode) {
        let Some(prompt) = self.prompt.as_mut() else {
            return;
        };
        match code {
            KeyCode::Enter => self.finish_remix_prompt(true),
            KeyCode::Esc => self.finish_remix_prompt(false),
            KeyCode::Backspace => prompt.backspace(),
            KeyCode::Char(ch) => prompt.push(ch),
            _ => {}
        }
    }

    fn handle_mouse(&mut self, mouse: MouseEvent) {
        if self.prompt.is_some() {
            return;
        }
        let delta = match mouse.kind {
            MouseEventKind::ScrollDown => MOUSE_SCROLL_LINES,
            MouseEventKind::ScrollUp => -MOUSE_SCROLL_LINES,
            _ => return,
        };
        let count = self.controller.state().len();
        self.tracker.scroll_by(delta, count, Instant::now());
        self.mark_dirty();
    }

    fn draw(&mut self, frame: &mut Frame<'_>) {
        let full = frame.size();
        frame.render_widget(Block::default().style(Style::default().bg(COLOR_BG)), full);

        let layout = Layout::default()
            .direction(Direction::Vertical)
            .constraints([
                Constraint::Length(1),
                Constraint::Min(0),
                Constraint::Length(1),
            ])
            .split(full);

        let status_text = if self.is_loading() {
            format!("{} {}", self.spinner.frame(), self.status_message)
        } else {
            self.status_message.clone()
        };
        let status_line = Paragraph::new(status_text).style(
            Style::default()
                .fg(COLOR_TEXT_PRIMARY)
                .bg(COLOR_PANEL_BG)
                .add_modifier(Modifier::BOLD),
        );
        frame.render_widget(status_line, layout[0]);

        self.draw_feed(frame, layout[1]);

        let footer = Paragraph::new(self.footer_text())
            .style(
                Style::default()
                    .fg(COLOR_TEXT_SECONDARY)
                    .bg(COLOR_PANEL_BG)
                    .add_modifier(Modifier::ITALIC),
            )
            .alignment(Alignment::Center);
        frame.render_widget(footer, layout[2]);

        if let Some(prompt) = &self.prompt {
            draw_prompt(frame, layout[1], prompt);
        }
    }

    fn draw_feed(&mut self, frame: &mut Frame<'_>, area: Rect) {
        let height = usize::from(area.height);
        self.tracker.set_geometry(height, height);
        let state = self.controller.state();
        if state.is_empty() || height == 0 {
            return;
        }

        let offset = self.tracker.offset();
        let view_end = offset + height;
        let first = offset / height;
        let last = ((view_end - 1) / height).min(state.len() - 1);

        for idx in first..=last {
            let Some(entry) = state.get(idx) else {
                continue;
            };
            let start = idx * height;
            let top = start.max(offset) - offset;
            let bottom = (start + height).min(view_end) - offset;
            if bottom <= top {
                continue;
            }
            let skip = offset.saturating_sub(start);
            let rect = Rect {
                x: area.x,
                y: area.y + top as u16,
                width: area.width,
                height: (bottom - top) as u16,
            };
            let status = match self.cells.get(&idx) {
                Some(MountedCell::Live(cell)) => CardStatus::Cell(cell.view()),
                Some(MountedCell::Broken(message)) => CardStatus::Broken(message.clone()),
                None => CardStatus::Unmounted,
            };
            let card = card_text(entry, &status, state.is_active(idx), height);
            let paragraph = Paragraph::new(card)
                .style(Style::default().bg(COLOR_BG).fg(COLOR_TEXT_PRIMARY))
                .scroll((skip as u16, 0));
            frame.render_widget(paragraph, rect);
        }
    }

    fn footer_text(&self) -> String {
        if self.prompt.is_some() {
            "Enter: Remix!  Esc: Cancel".to_string()
        } else {
            "j/k: scroll  x: remix  r: reload  q: quit".to_string()
        }
    }
}

impl<H: PlaybackHandle> Drop for Model<H> {
    fn drop(&mut self) {
        self.unmount_all();
    }
}

enum CardStatus {
    Cell(CellView),
    Broken(String),
    Unmounted,
}

fn status_span(status: &CardStatus) -> Span<'static> {
    match status {
        CardStatus::Cell(view) => {
            if let Some(failure) = &view.failure {
                Span::styled(format!("⚠ {failure}"), Style::default().fg(COLOR_ERROR))
            } else if view.state == CellState::Playing {
                Span::styled("▶ Playing", Style::default().fg(COLOR_ACCENT))
            } else if view.loading {
                Span::styled("… Loading", Style::default().fg(COLOR_TEXT_SECONDARY))
            } else {
                Span::styled("⏸ Paused", Style::default().fg(COLOR_TEXT_SECONDARY))
            }
        }
        CardStatus::Broken(message) => {
            Span::styled(format!("⚠ {message}"), Style::default().fg(COLOR_ERROR))
        }
        CardStatus::Unmounted => Span::raw(""),
    }
}

/// Lays out one full-height card: playback status on top, the action column
/// on the right, caption lines at the bottom.
fn card_text(
    entry: &VideoEntry,
    status: &CardStatus,
    active: bool,
    height: usize,
) -> Text<'static> {
    let label_style = Style::default()
        .fg(COLOR_TEXT_PRIMARY)
        .add_modifier(Modifier::BOLD);
    let actions = vec![
        Line::from(format!("{ICON_LIKES} {}", entry.display_likes())).alignment(Alignment::Right),
        Line::from(format!("{ICON_COMMENTS} {}", entry.display_comments()))
            .alignment(Alignment::Right),
        Line::from(Span::styled(
            format!("{ICON_REMIX} Remix"),
            Style::default().fg(COLOR_REMIX).add_modifier(Modifier::BOLD),
        ))
        .alignment(Alignment::Right),
        Line::from(format!("{ICON_SHARE} Share")).alignment(Alignment::Right),
    ];
    let captions = vec![
        Line::from(Span::styled(
            format!("@{}", entry.display_username()),
            label_style,
        )),
        Line::from(entry.display_description().to_string()),
        Line::from(Span::styled(
            format!("{ICON_SOUND} {SOUND_LABEL}"),
            Style::default().fg(COLOR_TEXT_SECONDARY),
        )),
    ];

    let marker = if active {
        Span::styled("● ", Style::default().fg(COLOR_ACCENT))
    } else {
        Span::raw("  ")
    };
    let mut lines = vec![Line::from(vec![marker, status_span(status)])];

    let body = actions.len() + 1 + captions.len();
    let filler = height.saturating_sub(lines.len() + body);
    let before_actions = filler / 2;
    lines.extend(std::iter::repeat(Line::default()).take(before_actions));
    lines.extend(actions);
    lines.push(Line::default());
    lines.extend(std::iter::repeat(Line::default()).take(filler - before_actions));
    lines.extend(captions);
    lines.truncate(height.max(1));
    Text::from(lines)
}

fn draw_prompt(frame: &mut Frame<'_>, area: Rect, prompt: &RemixPrompt) {
    let width = area.width.min(60);
    let height = area.height.min(7);
    let rect = Rect {
        x: area.x + (area.width.saturating_sub(width)) / 2,
        y: area.y + (area.height.saturating_sub(height)) / 2,
        width,
        height,
    };
    frame.render_widget(Clear, rect);
    let text = Text::from(vec![
        Line::from("Enter a prompt to transform this video:"),
        Line::default(),
        Line::from(vec![
            Span::styled("> ", Style::default().fg(COLOR_REMIX)),
            Span::raw(prompt.input().to_string()),
            Span::styled("▏", Style::default().fg(COLOR_TEXT_SECONDARY)),
        ]),
    ]);
    let block = Block::default()
        .title(format!(" AI Remix {ICON_REMIX} "))
        .borders(Borders::ALL)
        .border_style(Style::default().fg(COLOR_REMIX))
        .style(Style::default().bg(COLOR_PANEL_BG).fg(COLOR_TEXT_PRIMARY));
    frame.render_widget(
        Paragraph::new(text).block(block).wrap(Wrap { trim: false }),
        rect,
    );
}
