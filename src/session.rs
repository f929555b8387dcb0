//! One navigation session: menu, thread list, live comment view and URL
//! entry. The session never performs I/O itself; every key or fetch result
//! returns the [`Effect`]s its owner has to carry out.

use std::ops::Range;
use std::sync::Arc;

use anyhow::Result;
use crossterm::event::KeyCode;

use crate::config::MenuEntry;
use crate::reddit::{CommentRecord, CommentsSnapshot, Thread, ThreadQuery};
use crate::render::{self, LayoutLine, TreeGlyphs};
use crate::tree::{self, CommentNode};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    Menu,
    ThreadList,
    CommentView,
    UrlEntry,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FetchRequest {
    FindThreads {
        request_id: u64,
        query: ThreadQuery,
    },
    FetchComments {
        request_id: u64,
        permalink: String,
    },
    ResolveUrl {
        request_id: u64,
        input: String,
    },
}

impl FetchRequest {
    pub fn request_id(&self) -> u64 {
        match self {
            FetchRequest::FindThreads { request_id, .. }
            | FetchRequest::FetchComments { request_id, .. }
            | FetchRequest::ResolveUrl { request_id, .. } => *request_id,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Effect {
    Fetch(FetchRequest),
    StartRefresh,
    StopRefresh,
}

pub enum FetchOutcome {
    Threads {
        request_id: u64,
        result: Result<Vec<Thread>>,
    },
    Comments {
        request_id: u64,
        result: Result<CommentsSnapshot>,
    },
    Resolved {
        request_id: u64,
        result: Result<Thread>,
    },
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Viewport {
    offset: usize,
    height: usize,
    content_len: usize,
}

impl Viewport {
    pub fn offset(&self) -> usize {
        self.offset
    }

    pub fn height(&self) -> usize {
        self.height
    }

    pub fn content_len(&self) -> usize {
        self.content_len
    }

    pub fn max_offset(&self) -> usize {
        self.content_len.saturating_sub(self.height)
    }

    pub fn at_bottom(&self) -> bool {
        self.offset >= self.max_offset()
    }

    pub fn visible_range(&self) -> Range<usize> {
        let end = self.offset.saturating_add(self.height).min(self.content_len);
        self.offset.min(end)..end
    }

    pub fn scroll_up(&mut self, rows: usize) {
        self.offset = self.offset.saturating_sub(rows);
    }

    pub fn scroll_down(&mut self, rows: usize) {
        self.offset = self.offset.saturating_add(rows).min(self.max_offset());
    }

    pub fn goto_top(&mut self) {
        self.offset = 0;
    }

    pub fn goto_bottom(&mut self) {
        self.offset = self.max_offset();
    }

    pub fn set_height(&mut self, height: usize) {
        self.height = height;
        self.clamp();
    }

    pub fn set_content_len(&mut self, len: usize) {
        self.content_len = len;
        self.clamp();
    }

    fn reset(&mut self) {
        self.offset = 0;
        self.content_len = 0;
    }

    fn clamp(&mut self) {
        self.offset = self.offset.min(self.max_offset());
    }
}

struct PendingSearch {
    request_id: u64,
    entry_index: usize,
}

struct PendingComments {
    request_id: u64,
    thread_id: String,
}

pub struct Session {
    mode: Mode,
    menu: Arc<[MenuEntry]>,
    menu_index: usize,
    current_entry: Option<usize>,
    threads: Vec<Thread>,
    thread_index: usize,
    thread: Option<Thread>,
    records: Vec<CommentRecord>,
    forest: Vec<CommentNode>,
    lines: Vec<LayoutLine>,
    filter: String,
    filter_editing: bool,
    url_input: String,
    user_scrolled: bool,
    refresh_enabled: bool,
    viewport: Viewport,
    width: usize,
    glyphs: TreeGlyphs,
    error: Option<String>,
    status: Option<String>,
    next_request_id: u64,
    pending_search: Option<PendingSearch>,
    pending_comments: Option<PendingComments>,
    pending_url: Option<u64>,
}

impl Session {
    pub fn new(menu: Arc<[MenuEntry]>, glyphs: TreeGlyphs) -> Self {
        let menu_index = menu
            .iter()
            .position(MenuEntry::is_selectable)
            .unwrap_or(0);
        Self {
            mode: Mode::Menu,
            menu,
            menu_index,
            current_entry: None,
            threads: Vec::new(),
            thread_index: 0,
            thread: None,
            records: Vec::new(),
            forest: Vec::new(),
            lines: Vec::new(),
            filter: String::new(),
            filter_editing: false,
            url_input: String::new(),
            user_scrolled: false,
            refresh_enabled: false,
            viewport: Viewport::default(),
            width: 0,
            glyphs,
            error: None,
            status: None,
            next_request_id: 1,
            pending_search: None,
            pending_comments: None,
            pending_url: None,
        }
    }

    pub fn mode(&self) -> Mode {
        self.mode
    }

    pub fn menu(&self) -> &[MenuEntry] {
        &self.menu
    }

    pub fn menu_index(&self) -> usize {
        self.menu_index
    }

    pub fn current_entry(&self) -> Option<&MenuEntry> {
        self.current_entry.and_then(|idx| self.menu.get(idx))
    }

    pub fn threads(&self) -> &[Thread] {
        &self.threads
    }

    pub fn thread_index(&self) -> usize {
        self.thread_index
    }

    pub fn thread(&self) -> Option<&Thread> {
        self.thread.as_ref()
    }

    pub fn forest(&self) -> &[CommentNode] {
        &self.forest
    }

    pub fn lines(&self) -> &[LayoutLine] {
        &self.lines
    }

    pub fn visible_lines(&self) -> &[LayoutLine] {
        &self.lines[self.viewport.visible_range()]
    }

    pub fn viewport(&self) -> &Viewport {
        &self.viewport
    }

    pub fn filter(&self) -> &str {
        &self.filter
    }

    pub fn filter_editing(&self) -> bool {
        self.filter_editing
    }

    pub fn url_input(&self) -> &str {
        &self.url_input
    }

    pub fn user_scrolled(&self) -> bool {
        self.user_scrolled
    }

    pub fn error(&self) -> Option<&str> {
        self.error.as_deref()
    }

    pub fn status(&self) -> Option<&str> {
        self.status.as_deref()
    }

    pub fn fetch_in_flight(&self) -> bool {
        self.pending_comments.is_some()
    }

    pub fn is_loading(&self) -> bool {
        self.pending_comments.is_some()
            || self.pending_search.is_some()
            || self.pending_url.is_some()
    }

    /// True while keystrokes are text for an input field.
    pub fn is_editing(&self) -> bool {
        self.mode == Mode::UrlEntry || (self.mode == Mode::CommentView && self.filter_editing)
    }

    /// Whether the comment view reserves a row for the filter line.
    pub fn shows_filter_line(&self) -> bool {
        self.mode == Mode::CommentView && (self.filter_editing || !self.filter.is_empty())
    }

    pub fn resize(&mut self, width: usize, height: usize) {
        self.viewport.set_height(height);
        if width != self.width {
            self.width = width;
            self.relayout();
        }
        if !self.user_scrolled {
            self.viewport.goto_bottom();
        }
    }

    pub fn handle_key(&mut self, code: KeyCode) -> Vec<Effect> {
        match self.mode {
            Mode::Menu => self.handle_menu_key(code),
            Mode::ThreadList => self.handle_thread_list_key(code),
            Mode::CommentView => self.handle_comment_key(code),
            Mode::UrlEntry => self.handle_url_key(code),
        }
    }

    pub fn apply(&mut self, outcome: FetchOutcome) -> Vec<Effect> {
        match outcome {
            FetchOutcome::Threads { request_id, result } => {
                self.apply_threads(request_id, result);
                Vec::new()
            }
            FetchOutcome::Comments { request_id, result } => {
                self.apply_comments(request_id, result);
                Vec::new()
            }
            FetchOutcome::Resolved { request_id, result } => self.apply_resolved(request_id, result),
        }
    }

    /// Periodic refresh; a no-op unless a live comment view is idle.
    pub fn on_refresh_tick(&mut self) -> Vec<Effect> {
        if self.mode != Mode::CommentView || !self.refresh_enabled {
            return Vec::new();
        }
        self.fetch_comments().into_iter().collect()
    }

    /// Manual refresh; coalesced with any fetch already in flight.
    pub fn refresh(&mut self) -> Vec<Effect> {
        if self.mode != Mode::CommentView {
            return Vec::new();
        }
        match self.fetch_comments() {
            Some(effect) => {
                self.set_status("Refreshing...");
                vec![effect]
            }
            None => Vec::new(),
        }
    }

    pub fn jump_to_end(&mut self) {
        self.user_scrolled = false;
        self.viewport.goto_bottom();
    }

    fn handle_menu_key(&mut self, code: KeyCode) -> Vec<Effect> {
        match code {
            KeyCode::Up | KeyCode::Char('k') => self.move_menu(-1),
            KeyCode::Down | KeyCode::Char('j') => self.move_menu(1),
            KeyCode::Enter => return self.select_menu_entry(),
            _ => {}
        }
        Vec::new()
    }

    fn move_menu(&mut self, delta: isize) {
        let len = self.menu.len();
        if len == 0 {
            return;
        }
        let start = self.menu_index;
        let mut idx = start;
        loop {
            idx = (idx as isize + delta).rem_euclid(len as isize) as usize;
            if idx == start || self.menu[idx].is_selectable() {
                break;
            }
        }
        self.menu_index = idx;
    }

    fn select_menu_entry(&mut self) -> Vec<Effect> {
        let Some(entry) = self.menu.get(self.menu_index).cloned() else {
            return Vec::new();
        };
        match entry {
            MenuEntry::Separator => Vec::new(),
            MenuEntry::UrlEntry { .. } => {
                self.pending_search = None;
                self.url_input.clear();
                self.clear_messages();
                self.mode = Mode::UrlEntry;
                tracing::debug!("entering url entry");
                Vec::new()
            }
            MenuEntry::Search(search) => {
                if self.pending_search.is_some() {
                    return Vec::new();
                }
                let request_id = self.next_request_id();
                self.pending_search = Some(PendingSearch {
                    request_id,
                    entry_index: self.menu_index,
                });
                self.set_status(format!("Loading {}...", search.title));
                tracing::info!(entry = %search.title, request_id, "searching threads");
                vec![Effect::Fetch(FetchRequest::FindThreads {
                    request_id,
                    query: search.query(),
                })]
            }
        }
    }

    fn handle_thread_list_key(&mut self, code: KeyCode) -> Vec<Effect> {
        let len = self.threads.len();
        match code {
            KeyCode::Up | KeyCode::Char('k') if len > 0 => {
                self.thread_index = (self.thread_index + len - 1) % len;
            }
            KeyCode::Down | KeyCode::Char('j') if len > 0 => {
                self.thread_index = (self.thread_index + 1) % len;
            }
            KeyCode::Enter => {
                if let Some(thread) = self.threads.get(self.thread_index).cloned() {
                    return self.enter_thread(thread);
                }
            }
            KeyCode::Backspace | KeyCode::Esc => {
                self.mode = Mode::Menu;
                self.current_entry = None;
                self.clear_messages();
            }
            _ => {}
        }
        Vec::new()
    }

    fn handle_url_key(&mut self, code: KeyCode) -> Vec<Effect> {
        match code {
            KeyCode::Esc => {
                self.pending_url = None;
                self.url_input.clear();
                self.clear_messages();
                self.mode = Mode::Menu;
            }
            KeyCode::Enter => {
                if self.pending_url.is_some() {
                    return Vec::new();
                }
                let input = self.url_input.trim().to_string();
                if input.is_empty() {
                    self.clear_messages();
                    self.mode = Mode::Menu;
                    return Vec::new();
                }
                let request_id = self.next_request_id();
                self.pending_url = Some(request_id);
                self.set_status("Loading thread...");
                tracing::info!(%input, request_id, "resolving thread url");
                return vec![Effect::Fetch(FetchRequest::ResolveUrl { request_id, input })];
            }
            KeyCode::Backspace => {
                self.url_input.pop();
            }
            KeyCode::Char(ch) => self.url_input.push(ch),
            _ => {}
        }
        Vec::new()
    }

    fn handle_comment_key(&mut self, code: KeyCode) -> Vec<Effect> {
        if self.filter_editing {
            match code {
                KeyCode::Esc => {
                    self.close_filter();
                    return Vec::new();
                }
                KeyCode::Enter => {
                    if self.filter.trim().is_empty() {
                        self.close_filter();
                    } else {
                        self.filter_editing = false;
                    }
                    return Vec::new();
                }
                KeyCode::Backspace => {
                    self.filter.pop();
                    self.relayout();
                    return Vec::new();
                }
                KeyCode::Char(ch) => {
                    self.filter.push(ch);
                    self.relayout();
                    return Vec::new();
                }
                _ => {}
            }
        }

        let page = self.viewport.height().max(1);
        match code {
            KeyCode::Char('/') => {
                self.filter_editing = true;
            }
            KeyCode::Char('r') => return self.refresh(),
            KeyCode::End | KeyCode::Char('G') => self.jump_to_end(),
            KeyCode::Up | KeyCode::Char('k') => {
                self.viewport.scroll_up(1);
                self.user_scrolled = true;
            }
            KeyCode::Down | KeyCode::Char('j') => {
                self.viewport.scroll_down(1);
                self.user_scrolled = !self.viewport.at_bottom();
            }
            KeyCode::PageUp => {
                self.viewport.scroll_up(page);
                self.user_scrolled = true;
            }
            KeyCode::PageDown => {
                self.viewport.scroll_down(page);
                self.user_scrolled = !self.viewport.at_bottom();
            }
            KeyCode::Home | KeyCode::Char('g') => {
                self.viewport.goto_top();
                self.user_scrolled = true;
            }
            KeyCode::Backspace => {
                let target = if self.threads.is_empty() {
                    Mode::Menu
                } else {
                    Mode::ThreadList
                };
                return self.leave_comments(target);
            }
            KeyCode::Esc => {
                self.current_entry = None;
                return self.leave_comments(Mode::Menu);
            }
            _ => {}
        }
        Vec::new()
    }

    fn close_filter(&mut self) {
        self.filter_editing = false;
        if !self.filter.is_empty() {
            self.filter.clear();
            self.relayout();
        }
    }

    fn enter_thread(&mut self, thread: Thread) -> Vec<Effect> {
        tracing::info!(thread = %thread.id, title = %thread.title, "opening comment view");
        self.mode = Mode::CommentView;
        self.thread = Some(thread);
        self.records.clear();
        self.filter.clear();
        self.filter_editing = false;
        self.user_scrolled = false;
        self.refresh_enabled = true;
        self.pending_comments = None;
        self.viewport.reset();
        self.relayout();
        self.set_status("Loading comments...");

        let mut effects: Vec<Effect> = self.fetch_comments().into_iter().collect();
        effects.push(Effect::StartRefresh);
        effects
    }

    fn leave_comments(&mut self, target: Mode) -> Vec<Effect> {
        tracing::info!(
            thread = self.thread.as_ref().map(|t| t.id.as_str()).unwrap_or(""),
            ?target,
            "leaving comment view"
        );
        self.mode = target;
        self.thread = None;
        self.records.clear();
        self.filter.clear();
        self.filter_editing = false;
        self.user_scrolled = false;
        self.refresh_enabled = false;
        self.pending_comments = None;
        self.viewport.reset();
        self.relayout();
        self.clear_messages();
        vec![Effect::StopRefresh]
    }

    fn fetch_comments(&mut self) -> Option<Effect> {
        if self.pending_comments.is_some() {
            tracing::debug!("comment fetch already in flight; request coalesced");
            return None;
        }
        let thread = self.thread.as_ref()?;
        let permalink = thread.permalink.clone();
        let thread_id = thread.id.clone();
        let request_id = self.next_request_id();
        self.pending_comments = Some(PendingComments {
            request_id,
            thread_id,
        });
        Some(Effect::Fetch(FetchRequest::FetchComments {
            request_id,
            permalink,
        }))
    }

    fn apply_threads(&mut self, request_id: u64, result: Result<Vec<Thread>>) {
        let entry_index = match &self.pending_search {
            Some(pending) if pending.request_id == request_id && self.mode == Mode::Menu => {
                pending.entry_index
            }
            _ => {
                tracing::debug!(request_id, "discarding stale thread search result");
                return;
            }
        };
        self.pending_search = None;
        let title = self
            .menu
            .get(entry_index)
            .map(|entry| entry.title().to_string())
            .unwrap_or_default();

        match result {
            Ok(threads) if threads.is_empty() => {
                self.set_status(format!("No threads found for {title}"));
            }
            Ok(threads) => {
                tracing::info!(entry = %title, count = threads.len(), "threads loaded");
                self.threads = threads;
                self.thread_index = 0;
                self.current_entry = Some(entry_index);
                self.mode = Mode::ThreadList;
                self.clear_messages();
            }
            Err(err) => {
                tracing::warn!(error = %format!("{err:#}"), "thread search failed");
                self.set_error(format!("Error: {err:#}"));
            }
        }
    }

    fn apply_comments(&mut self, request_id: u64, result: Result<CommentsSnapshot>) {
        let current_thread = self.thread.as_ref().map(|t| t.id.as_str());
        let interested = matches!(
            &self.pending_comments,
            Some(pending) if pending.request_id == request_id
                && self.mode == Mode::CommentView
                && current_thread == Some(pending.thread_id.as_str())
        );
        if !interested {
            tracing::debug!(request_id, "discarding stale comment result");
            return;
        }
        self.pending_comments = None;

        match result {
            Ok(snapshot) => {
                tracing::debug!(request_id, count = snapshot.records.len(), "comments loaded");
                if let Some(thread) = self.thread.as_mut() {
                    if !snapshot.title.is_empty() {
                        thread.title = snapshot.title;
                    }
                }
                self.records = snapshot.records;
                self.relayout();
                if !self.user_scrolled {
                    self.viewport.goto_bottom();
                }
                self.clear_messages();
            }
            Err(err) => {
                tracing::warn!(request_id, error = %format!("{err:#}"), "comment fetch failed");
                self.set_error(format!("Error: {err:#}"));
            }
        }
    }

    fn apply_resolved(&mut self, request_id: u64, result: Result<Thread>) -> Vec<Effect> {
        if self.pending_url != Some(request_id) || self.mode != Mode::UrlEntry {
            tracing::debug!(request_id, "discarding stale url result");
            return Vec::new();
        }
        self.pending_url = None;
        match result {
            Ok(thread) => {
                self.url_input.clear();
                self.threads.clear();
                self.current_entry = None;
                self.enter_thread(thread)
            }
            Err(err) => {
                tracing::warn!(error = %format!("{err:#}"), "url resolution failed");
                self.mode = Mode::Menu;
                self.set_error(format!("Error: {err:#}"));
                Vec::new()
            }
        }
    }

    fn relayout(&mut self) {
        self.forest = tree::build(&self.records, &self.filter);
        self.lines = render::layout(&self.forest, self.width, self.glyphs);
        self.viewport.set_content_len(self.lines.len());
    }

    fn next_request_id(&mut self) -> u64 {
        let id = self.next_request_id;
        self.next_request_id = self.next_request_id.wrapping_add(1);
        id
    }

    fn set_status<S: Into<String>>(&mut self, message: S) {
        self.error = None;
        self.status = Some(message.into());
    }

    fn set_error<S: Into<String>>(&mut self, message: S) {
        self.status = None;
        self.error = Some(message.into());
    }

    fn clear_messages(&mut self) {
        self.error = None;
        self.status = None;
    }
}
