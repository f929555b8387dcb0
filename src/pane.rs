//! Single and split-screen hosting of sessions.
//!
//! Every pane owns its own [`Session`] and [`RefreshScheduler`]; the manager
//! only decides which pane receives keys and how many panes exist.

use std::sync::Arc;
use std::time::Duration;

use crossbeam_channel::Sender;
use crossterm::event::KeyCode;

use crate::config::MenuEntry;
use crate::refresh::{RefreshScheduler, Tick};
use crate::render::TreeGlyphs;
use crate::session::{Effect, FetchOutcome, FetchRequest, Mode, Session};

pub type PaneId = u64;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SplitOrientation {
    /// Panes stacked top and bottom.
    Horizontal,
    /// Panes side by side.
    Vertical,
}

pub struct Pane {
    id: PaneId,
    session: Session,
    scheduler: RefreshScheduler,
    focused: bool,
}

impl Pane {
    fn new(id: PaneId, session: Session, interval: Duration, ticks: Sender<Tick>) -> Self {
        Self {
            id,
            session,
            scheduler: RefreshScheduler::new(id, interval, ticks),
            focused: false,
        }
    }

    pub fn id(&self) -> PaneId {
        self.id
    }

    pub fn session(&self) -> &Session {
        &self.session
    }

    pub fn session_mut(&mut self) -> &mut Session {
        &mut self.session
    }

    pub fn is_focused(&self) -> bool {
        self.focused
    }

    pub fn is_refreshing(&self) -> bool {
        self.scheduler.is_running()
    }

    pub fn handle_key(&mut self, code: KeyCode) -> Vec<FetchRequest> {
        let effects = self.session.handle_key(code);
        self.run_effects(effects)
    }

    pub fn apply(&mut self, outcome: FetchOutcome) -> Vec<FetchRequest> {
        let effects = self.session.apply(outcome);
        self.run_effects(effects)
    }

    /// Ticks from a stopped or restarted scheduler are ignored.
    pub fn on_tick(&mut self, tick: &Tick) -> Vec<FetchRequest> {
        if !self.scheduler.is_current(tick) {
            tracing::trace!(pane = self.id, generation = tick.generation, "stale tick ignored");
            return Vec::new();
        }
        let effects = self.session.on_refresh_tick();
        self.run_effects(effects)
    }

    fn run_effects(&mut self, effects: Vec<Effect>) -> Vec<FetchRequest> {
        let mut fetches = Vec::new();
        for effect in effects {
            match effect {
                Effect::Fetch(request) => fetches.push(request),
                Effect::StartRefresh => self.scheduler.start(),
                Effect::StopRefresh => self.scheduler.stop(),
            }
        }
        fetches
    }

    fn shutdown(&mut self) {
        self.scheduler.stop();
    }
}

/// What the UI has to do after a key went through the manager.
#[derive(Debug, Default)]
pub struct KeyOutcome {
    pub fetches: Vec<(PaneId, FetchRequest)>,
    pub layout_changed: bool,
}

impl KeyOutcome {
    fn layout(changed: bool) -> Self {
        Self {
            fetches: Vec::new(),
            layout_changed: changed,
        }
    }
}

pub struct PaneManager {
    panes: Vec<Pane>,
    orientation: Option<SplitOrientation>,
    focused: usize,
    next_id: PaneId,
    menu: Arc<[MenuEntry]>,
    glyphs: TreeGlyphs,
    interval: Duration,
    ticks: Sender<Tick>,
}

impl PaneManager {
    pub fn new(
        menu: Arc<[MenuEntry]>,
        glyphs: TreeGlyphs,
        interval: Duration,
        ticks: Sender<Tick>,
    ) -> Self {
        let mut manager = Self {
            panes: Vec::with_capacity(2),
            orientation: None,
            focused: 0,
            next_id: 1,
            menu,
            glyphs,
            interval,
            ticks,
        };
        let pane = manager.new_pane();
        manager.panes.push(pane);
        manager.sync_focus();
        manager
    }

    pub fn panes(&self) -> &[Pane] {
        &self.panes
    }

    pub fn orientation(&self) -> Option<SplitOrientation> {
        self.orientation
    }

    pub fn is_split(&self) -> bool {
        self.orientation.is_some()
    }

    pub fn focused_index(&self) -> usize {
        self.focused
    }

    pub fn focused(&self) -> &Pane {
        &self.panes[self.focused]
    }

    pub fn focused_mut(&mut self) -> &mut Pane {
        &mut self.panes[self.focused]
    }

    pub fn pane_mut(&mut self, id: PaneId) -> Option<&mut Pane> {
        self.panes.iter_mut().find(|pane| pane.id == id)
    }

    /// Routes a key to the split controls or to the focused pane.
    pub fn handle_key(&mut self, code: KeyCode) -> KeyOutcome {
        let session = self.focused().session();
        let editing = session.is_editing();
        let mode = session.mode();

        if !editing {
            match code {
                KeyCode::Char('h') if !self.is_split() && mode == Mode::CommentView => {
                    return KeyOutcome::layout(self.split(SplitOrientation::Horizontal));
                }
                KeyCode::Char('v') if !self.is_split() && mode == Mode::CommentView => {
                    return KeyOutcome::layout(self.split(SplitOrientation::Vertical));
                }
                KeyCode::Tab if self.is_split() => {
                    self.focus_next();
                    return KeyOutcome::layout(true);
                }
                KeyCode::Char('x') if self.is_split() => {
                    return KeyOutcome::layout(self.close_split());
                }
                KeyCode::Esc if self.is_split() && mode == Mode::Menu => {
                    return KeyOutcome::layout(self.close_split());
                }
                _ => {}
            }
        }

        let pane = self.focused_mut();
        let id = pane.id;
        KeyOutcome {
            fetches: pane.handle_key(code).into_iter().map(|f| (id, f)).collect(),
            layout_changed: false,
        }
    }

    /// Enters split mode with a fresh, focused second pane.
    pub fn split(&mut self, orientation: SplitOrientation) -> bool {
        if self.is_split() {
            return false;
        }
        let pane = self.new_pane();
        tracing::info!(pane = pane.id, ?orientation, "entering split mode");
        self.panes.push(pane);
        self.orientation = Some(orientation);
        self.focused = self.panes.len() - 1;
        self.sync_focus();
        true
    }

    pub fn focus_next(&mut self) {
        if self.panes.len() < 2 {
            return;
        }
        self.focused = (self.focused + 1) % self.panes.len();
        self.sync_focus();
        tracing::debug!(pane = self.focused().id, "focus switched");
    }

    /// Leaves split mode. The non-focused pane is stopped and dropped; the
    /// focused pane carries on as the only session.
    pub fn close_split(&mut self) -> bool {
        if !self.is_split() {
            return false;
        }
        let keep = self.focused;
        for (idx, pane) in self.panes.iter_mut().enumerate() {
            if idx != keep {
                tracing::info!(pane = pane.id, "closing pane");
                pane.shutdown();
            }
        }
        let kept = self.panes.swap_remove(keep);
        self.panes.clear();
        self.panes.push(kept);
        self.orientation = None;
        self.focused = 0;
        self.sync_focus();
        true
    }

    pub fn route_tick(&mut self, tick: &Tick) -> Vec<(PaneId, FetchRequest)> {
        match self.pane_mut(tick.pane) {
            Some(pane) => {
                let id = pane.id;
                pane.on_tick(tick).into_iter().map(|f| (id, f)).collect()
            }
            None => {
                tracing::debug!(pane = tick.pane, "tick for closed pane dropped");
                Vec::new()
            }
        }
    }

    pub fn route_outcome(
        &mut self,
        pane_id: PaneId,
        outcome: FetchOutcome,
    ) -> Vec<(PaneId, FetchRequest)> {
        match self.pane_mut(pane_id) {
            Some(pane) => pane.apply(outcome).into_iter().map(|f| (pane_id, f)).collect(),
            None => {
                tracing::debug!(pane = pane_id, "fetch result for closed pane dropped");
                Vec::new()
            }
        }
    }

    pub fn is_editing(&self) -> bool {
        self.focused().session().is_editing()
    }

    pub fn is_loading(&self) -> bool {
        self.panes.iter().any(|pane| pane.session().is_loading())
    }

    fn new_pane(&mut self) -> Pane {
        let id = self.next_id;
        self.next_id += 1;
        let session = Session::new(Arc::clone(&self.menu), self.glyphs);
        Pane::new(id, session, self.interval, self.ticks.clone())
    }

    fn sync_focus(&mut self) {
        let focused = self.focused;
        for (idx, pane) in self.panes.iter_mut().enumerate() {
            pane.focused = idx == focused;
        }
    }
}

impl Drop for PaneManager {
    fn drop(&mut self) {
        for pane in &mut self.panes {
            pane.shutdown();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::default_menu;
    use crate::reddit::{CommentRecord, CommentsSnapshot, Thread};
    use crossbeam_channel::{unbounded, Receiver};

    fn manager() -> (PaneManager, Receiver<Tick>) {
        let (tx, rx) = unbounded();
        let manager = PaneManager::new(
            default_menu().into(),
            TreeGlyphs::ASCII,
            Duration::from_secs(3600),
            tx,
        );
        (manager, rx)
    }

    fn only_fetch(outcome: KeyOutcome) -> (PaneId, FetchRequest) {
        assert_eq!(outcome.fetches.len(), 1, "{:?}", outcome.fetches);
        outcome.fetches.into_iter().next().unwrap()
    }

    /// Opens a thread in the focused pane via URL entry and loads comments.
    fn open_comments(manager: &mut PaneManager, thread_id: &str) -> PaneId {
        manager.handle_key(KeyCode::Up);
        manager.handle_key(KeyCode::Enter);
        for ch in format!("/r/nfl/comments/{thread_id}/x").chars() {
            manager.handle_key(KeyCode::Char(ch));
        }
        let (pane, resolve) = only_fetch(manager.handle_key(KeyCode::Enter));
        let fetches = manager.route_outcome(
            pane,
            FetchOutcome::Resolved {
                request_id: resolve.request_id(),
                result: Ok(Thread {
                    id: thread_id.into(),
                    title: format!("Thread {thread_id}"),
                    permalink: format!("/r/nfl/comments/{thread_id}/x"),
                    kind: "url_input".into(),
                }),
            },
        );
        let (_, comments) = fetches.into_iter().next().unwrap();
        manager.route_outcome(
            pane,
            FetchOutcome::Comments {
                request_id: comments.request_id(),
                result: Ok(CommentsSnapshot {
                    records: vec![CommentRecord {
                        id: format!("{thread_id}-c1"),
                        author: "alice".into(),
                        body: "hello".into(),
                        created_utc: 0.0,
                        score: 1,
                        parent_id: String::new(),
                        order: 0,
                    }],
                    title: String::new(),
                }),
            },
        );
        pane
    }

    fn only_fetch_vec(fetches: Vec<(PaneId, FetchRequest)>) -> (PaneId, FetchRequest) {
        assert_eq!(fetches.len(), 1);
        fetches.into_iter().next().unwrap()
    }

    #[test]
    fn split_only_from_comment_view() {
        let (mut manager, _rx) = manager();
        assert!(!manager.handle_key(KeyCode::Char('v')).layout_changed);
        assert!(!manager.is_split());

        open_comments(&mut manager, "abc");
        assert!(manager.handle_key(KeyCode::Char('v')).layout_changed);
        assert_eq!(manager.orientation(), Some(SplitOrientation::Vertical));
        assert_eq!(manager.panes().len(), 2);
        assert_eq!(manager.focused_index(), 1);
        assert_eq!(manager.focused().session().mode(), Mode::Menu);
        assert_eq!(manager.panes()[0].session().mode(), Mode::CommentView);
        assert!(manager.panes()[0].is_refreshing());
        assert!(manager.panes()[1].is_focused());
        assert!(!manager.panes()[0].is_focused());
    }

    #[test]
    fn panes_keep_independent_state() {
        let (mut manager, _rx) = manager();
        let first = open_comments(&mut manager, "abc");
        manager.handle_key(KeyCode::Char('h'));
        let second = open_comments(&mut manager, "xyz");
        assert_ne!(first, second);

        let panes = manager.panes();
        assert_eq!(panes[0].session().thread().unwrap().id, "abc");
        assert_eq!(panes[1].session().thread().unwrap().id, "xyz");
        assert_eq!(panes[0].session().forest()[0].record.id, "abc-c1");
        assert_eq!(panes[1].session().forest()[0].record.id, "xyz-c1");
    }

    #[test]
    fn tab_moves_focus_and_keys_follow() {
        let (mut manager, _rx) = manager();
        open_comments(&mut manager, "abc");
        manager.handle_key(KeyCode::Char('v'));
        manager.handle_key(KeyCode::Tab);
        assert_eq!(manager.focused_index(), 0);
        let (pane, request) = only_fetch(manager.handle_key(KeyCode::Char('r')));
        assert_eq!(pane, manager.panes()[0].id());
        assert!(matches!(request, FetchRequest::FetchComments { .. }));
    }

    #[test]
    fn escape_in_menu_pane_closes_split_and_stops_other_scheduler() {
        let (mut manager, _rx) = manager();
        open_comments(&mut manager, "abc");
        manager.handle_key(KeyCode::Char('v'));
        let survivor = manager.focused().id();
        assert!(manager.handle_key(KeyCode::Esc).layout_changed);
        assert!(!manager.is_split());
        assert_eq!(manager.panes().len(), 1);
        assert_eq!(manager.focused().id(), survivor);
        assert_eq!(manager.focused().session().mode(), Mode::Menu);
    }

    #[test]
    fn close_promotes_focused_comment_view() {
        let (mut manager, _rx) = manager();
        let first = open_comments(&mut manager, "abc");
        manager.handle_key(KeyCode::Char('v'));
        manager.handle_key(KeyCode::Tab);
        assert!(manager.handle_key(KeyCode::Char('x')).layout_changed);
        assert_eq!(manager.focused().id(), first);
        assert!(manager.focused().is_refreshing());
        assert_eq!(manager.focused().session().thread().unwrap().id, "abc");
    }

    #[test]
    fn results_for_closed_pane_are_dropped() {
        let (mut manager, _rx) = manager();
        open_comments(&mut manager, "abc");
        manager.handle_key(KeyCode::Char('v'));
        let (closed, request) = only_fetch(manager.handle_key(KeyCode::Enter));
        manager.handle_key(KeyCode::Tab);
        manager.handle_key(KeyCode::Char('x'));

        let fetches = manager.route_outcome(
            closed,
            FetchOutcome::Threads {
                request_id: request.request_id(),
                result: Ok(Vec::new()),
            },
        );
        assert!(fetches.is_empty());
        let fetches = manager.route_tick(&Tick {
            pane: closed,
            generation: 1,
        });
        assert!(fetches.is_empty());
    }

    #[test]
    fn split_keys_are_text_while_filtering() {
        let (mut manager, _rx) = manager();
        open_comments(&mut manager, "abc");
        manager.handle_key(KeyCode::Char('/'));
        assert!(!manager.handle_key(KeyCode::Char('v')).layout_changed);
        assert!(!manager.is_split());
        assert_eq!(manager.focused().session().filter(), "v");
    }

    #[test]
    fn current_tick_triggers_refresh_for_its_pane() {
        let (mut manager, _rx) = manager();
        let pane = open_comments(&mut manager, "abc");
        let fetches = manager.route_tick(&Tick {
            pane,
            generation: 1,
        });
        let (target, request) = only_fetch_vec(fetches);
        assert_eq!(target, pane);
        assert!(matches!(request, FetchRequest::FetchComments { .. }));

        let stale = manager.route_tick(&Tick {
            pane,
            generation: 99,
        });
        assert!(stale.is_empty());
    }
}
