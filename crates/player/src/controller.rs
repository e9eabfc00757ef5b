use std::time::Instant;

use feed::{AccessTier, Comment, Feed, LikeId, LikeToggle, Slide, SlideId};
use jobs::{Debouncer, EventQueue};
use media_io::{EngineError, EngineFactory, MediaElement, PlayError};
use tracing::{debug, info};

use crate::arbiter::AutoplayArbiter;
use crate::attach::SourceAttachment;
use crate::chrome::SharedChrome;
use crate::comments::CommentsPanel;
use crate::config::{ConfigError, PlayerConfig};
use crate::progress::{IndicatorKey, ProgressController};
use crate::session::SessionState;
use crate::slides::SlideHandle;
use crate::viewport::{IntersectionEntry, IntersectionObserver, ObserverKind, ScrollContainer};
use crate::virtualizer::{MediaFactory, Virtualizer};

/// Notifications for the UI layer embedding the feed.
pub trait FeedHooks {
    fn slide_changed(&mut self, _index: usize, _slide: &Slide) {}
    fn like_state_changed(&mut self, _like_id: &LikeId, _liked: bool, _count: u64) {}
    fn comment_count_changed(&mut self, _like_id: &LikeId, _count: u64) {}
}

pub struct NoHooks;
impl FeedHooks for NoHooks {}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NavDirection {
    Next,
    Previous,
}

#[derive(Debug)]
pub enum Event {
    Gesture { now: Instant },
    Scroll { offset: f64, now: Instant },
    /// Timer tick; fires the scroll-settle debounce when due.
    Tick { now: Instant },
    Frame { now: Instant },
    /// Observer results delivered by a host that runs its own intersection observers.
    Intersections { kind: ObserverKind, entries: Vec<IntersectionEntry>, now: Instant },
    EngineModuleLoaded(Result<(), EngineError>),
    EngineError { slide: SlideId, fatal: bool },
    PlayRejected { handle: SlideHandle, error: PlayError },
    Playing { handle: SlideHandle },
    Paused { handle: SlideHandle },
    MetadataLoaded { handle: SlideHandle },
    VideoTapped { now: Instant },
    Navigate { direction: NavDirection, now: Instant },
    PointerDown { pointer: u32, x: f64, now: Instant },
    PointerMove { pointer: u32, x: f64 },
    PointerUp { pointer: u32 },
    PointerCancel { pointer: u32 },
    Key { key: IndicatorKey, now: Instant },
    LoginChanged { logged_in: bool, now: Instant },
    AccessChanged { slide: SlideId, access: AccessTier, now: Instant },
    LikeResolved { like_id: LikeId, result: LikeToggle },
    CommentsOpened { like_id: LikeId },
    CommentsLoaded { like_id: LikeId, result: Result<Vec<Comment>, String> },
    CommentPosted { like_id: LikeId, result: Result<u64, String> },
    FeedRefreshed(Feed),
    Resize { view_height: f64, now: Instant },
}

/// Owns every playback component and is the only place they are mutated.
pub struct FeedController<M: MediaElement, F: EngineFactory> {
    pub(crate) config: PlayerConfig,
    pub(crate) session: SessionState,
    pub(crate) feed: Feed,
    pub(crate) virt: Virtualizer<M>,
    pub(crate) container: ScrollContainer,
    pub(crate) prefetch: IntersectionObserver,
    pub(crate) active: IntersectionObserver,
    pub(crate) attach: SourceAttachment<F>,
    pub(crate) arbiter: AutoplayArbiter,
    pub(crate) progress: ProgressController,
    pub(crate) chrome: SharedChrome,
    pub(crate) settle: Debouncer,
    pub(crate) comments: CommentsPanel,
    pub(crate) hooks: Box<dyn FeedHooks>,
}

impl<M: MediaElement, F: EngineFactory> FeedController<M, F> {
    pub fn new<MF: MediaFactory<Media = M>>(
        config: PlayerConfig,
        feed: Feed,
        media: &mut MF,
        engines: F,
        view_height: f64,
        logged_in: bool,
    ) -> Result<Self, ConfigError> {
        let origin = config.origin()?;
        let virt = Virtualizer::render(&feed, media);
        let container = ScrollContainer::new(view_height, virt.len());
        let mut prefetch =
            IntersectionObserver::new(ObserverKind::Prefetch, config.effective_prefetch_margin(), config.prefetch_threshold);
        let mut active = IntersectionObserver::new(ObserverKind::Active, 0.0, config.active_threshold);
        for h in virt.canonical_handles() {
            prefetch.observe(h);
            active.observe(h);
        }
        Ok(Self {
            attach: SourceAttachment::new(engines, config.use_adaptive_stream, config.engine.clone(), origin),
            arbiter: AutoplayArbiter::new(config.grace_window()),
            progress: ProgressController::new(config.seek_step),
            settle: Debouncer::new(config.settle_delay()),
            session: SessionState::new(logged_in),
            chrome: SharedChrome::new(logged_in),
            comments: CommentsPanel::default(),
            hooks: Box::new(NoHooks),
            config,
            feed,
            virt,
            container,
            prefetch,
            active,
        })
    }

    pub fn with_hooks(mut self, hooks: Box<dyn FeedHooks>) -> Self {
        self.hooks = hooks;
        self
    }

    pub fn config(&self) -> &PlayerConfig { &self.config }
    pub fn session(&self) -> &SessionState { &self.session }
    pub fn feed(&self) -> &Feed { &self.feed }
    pub fn virtualizer(&self) -> &Virtualizer<M> { &self.virt }
    pub fn container(&self) -> &ScrollContainer { &self.container }
    pub fn chrome(&self) -> &SharedChrome { &self.chrome }
    pub fn chrome_mut(&mut self) -> &mut SharedChrome { &mut self.chrome }
    pub fn comments(&self) -> &CommentsPanel { &self.comments }
    pub fn comments_mut(&mut self) -> &mut CommentsPanel { &mut self.comments }
    pub fn attachment(&self) -> &SourceAttachment<F> { &self.attach }
    pub fn progress(&self) -> &ProgressController { &self.progress }

    pub fn active_handle(&self) -> Option<SlideHandle> {
        self.session.current_index.and_then(|i| self.virt.handle_of(i))
    }

    pub fn media(&self, handle: SlideHandle) -> Option<&M> { self.virt.get(handle).map(|r| &r.media) }
    pub fn media_mut(&mut self, handle: SlideHandle) -> Option<&mut M> { self.virt.get_mut(handle).map(|r| &mut r.media) }

    /// Lays out the feed on the first real slide and runs the initial observation.
    pub fn start(&mut self, now: Instant) {
        if let Some(offset) = self.virt.initial_offset(&self.container) {
            self.container.jump_silently(offset);
        }
        self.refresh_overlays();
        self.session.app_loaded = true;
        info!(slides = self.feed.len(), logged_in = self.session.logged_in, "feed started");
        self.observe(now);
    }

    /// Drains the queue, dispatching in arrival order. Returns the number of events handled.
    pub fn pump(&mut self, queue: &EventQueue<Event>) -> usize {
        let mut handled = 0;
        while let Some(event) = queue.pop() {
            self.dispatch(event);
            handled += 1;
        }
        handled
    }

    pub fn dispatch(&mut self, event: Event) {
        match event {
            Event::Gesture { now } => self.session.record_gesture(now),
            Event::Scroll { offset, now } => {
                self.container.scroll_to(offset);
                self.settle.poke(now);
                self.observe(now);
            }
            Event::Tick { now } => {
                if self.settle.fire_if_due(now) && self.virt.settle(&mut self.container).is_some() {
                    self.observe(now);
                }
            }
            Event::Frame { .. } => {
                self.container.on_frame();
                self.progress.on_frame(&self.virt, &self.session, &mut self.chrome.bottom.progress);
            }
            Event::Intersections { kind, entries, now } => self.handle_intersections(kind, &entries, now),
            Event::EngineModuleLoaded(result) => self.attach.on_module_loaded(result, &mut self.virt, &self.feed),
            Event::EngineError { slide, fatal } => self.attach.on_engine_error(&slide, fatal, &mut self.virt, &self.feed),
            Event::PlayRejected { handle, error } => self.play_rejected(handle, &error),
            Event::Playing { handle } => {
                if self.active_handle() == Some(handle) {
                    self.progress.start(handle, &self.session);
                }
            }
            Event::Paused { handle } => self.progress.stop(handle),
            Event::MetadataLoaded { handle } => {
                if self.chrome.owner() == Some(handle) {
                    self.chrome.bottom.progress.skeleton = false;
                }
            }
            Event::VideoTapped { now } => self.video_tapped(now),
            Event::Navigate { direction, now } => self.navigate(direction, now),
            Event::PointerDown { pointer, x, now } => self.pointer_down(pointer, x, now),
            Event::PointerMove { pointer, x } => {
                let Some(h) = self.active_handle() else { return };
                if let Some(r) = self.virt.get_mut(h) {
                    self.progress.pointer_move(pointer, x, &mut self.chrome.bottom.progress, &mut r.media);
                }
            }
            Event::PointerUp { pointer } | Event::PointerCancel { pointer } => self.pointer_release(pointer),
            Event::Key { key, now } => {
                self.key(key, now);
            }
            Event::LoginChanged { logged_in, now } => self.set_logged_in(logged_in, now),
            Event::AccessChanged { slide, access, now } => self.set_access(&slide, access, now),
            Event::LikeResolved { like_id, result } => self.like_resolved(&like_id, result),
            Event::CommentsOpened { like_id } => self.comments.open(like_id),
            Event::CommentsLoaded { like_id, result } => {
                self.comments.loaded(&like_id, result);
            }
            Event::CommentPosted { like_id, result } => self.comment_posted(&like_id, result),
            Event::FeedRefreshed(fresh) => self.feed_refreshed(&fresh),
            Event::Resize { view_height, now } => {
                self.container.resize(view_height);
                self.observe(now);
            }
        }
    }

    /// Keyboard input on the progress indicator. Returns true if default scrolling should be prevented.
    pub fn key(&mut self, key: IndicatorKey, now: Instant) -> bool {
        self.session.record_gesture(now);
        let Some(h) = self.active_handle() else { return false };
        let Some(r) = self.virt.get_mut(h) else { return false };
        self.progress.key(key, &mut self.chrome.bottom.progress, &mut r.media)
    }

    fn navigate(&mut self, direction: NavDirection, now: Instant) {
        self.session.record_gesture(now);
        let step = match direction {
            NavDirection::Next => self.container.view_height,
            NavDirection::Previous => -self.container.view_height,
        };
        let target = self.container.scroll_top + step;
        self.dispatch(Event::Scroll { offset: target, now });
    }

    fn video_tapped(&mut self, now: Instant) {
        self.session.record_gesture(now);
        if self.session.dragging_progress { return; }
        let Some(h) = self.active_handle() else { return };
        let Some(slide) = self.virt.get(h).and_then(|r| r.canonical_index()).and_then(|i| self.feed.get(i)) else { return };
        if !self.session.can_view(slide.access) {
            debug!(slide = %slide.id, "restricted slide tapped, showing login");
            self.chrome.login_panel_active = true;
            return;
        }
        let Some(r) = self.virt.get_mut(h) else { return };
        if r.media.is_paused() {
            let attempt = self.arbiter.direct_play(&mut self.session, &mut r.media);
            r.pause_icon_visible = !attempt.started();
            if attempt.started() {
                self.progress.start(h, &self.session);
            }
        } else {
            r.media.pause();
            r.pause_icon_visible = true;
            self.progress.stop(h);
        }
    }

    fn play_rejected(&mut self, handle: SlideHandle, error: &PlayError) {
        AutoplayArbiter::record_rejection(&mut self.session, error);
        if let Some(r) = self.virt.get_mut(handle) {
            r.media.pause();
            r.pause_icon_visible = true;
        }
        self.progress.stop(handle);
    }

    fn pointer_down(&mut self, pointer: u32, x: f64, now: Instant) {
        self.session.record_gesture(now);
        let Some(h) = self.active_handle() else { return };
        if let Some(r) = self.virt.get_mut(h) {
            self.progress.pointer_down(pointer, x, &mut self.session, &mut self.chrome.bottom.progress, &mut r.media);
        }
    }

    fn pointer_release(&mut self, pointer: u32) {
        let handle = self.active_handle();
        let paused = handle.and_then(|h| self.virt.get(h)).map_or(true, |r| r.media.is_paused());
        self.progress.pointer_release(pointer, handle, &mut self.session, &mut self.chrome.bottom.progress, paused);
    }

    fn like_resolved(&mut self, like_id: &LikeId, result: LikeToggle) {
        let Some(slide) = self.feed.by_like_id_mut(like_id) else {
            debug!(%like_id, "like result for unknown slide");
            return;
        };
        slide.counters.liked_by_viewer = result.liked();
        slide.counters.likes = result.count;
        self.chrome.set_like_state(like_id, result.liked() && self.session.logged_in, result.count);
        self.hooks.like_state_changed(like_id, result.liked(), result.count);
    }

    fn comment_posted(&mut self, like_id: &LikeId, result: Result<u64, String>) {
        let Some(count) = self.comments.comment_posted(like_id, result) else { return };
        if let Some(slide) = self.feed.by_like_id_mut(like_id) {
            slide.counters.comments = count;
        }
        self.chrome.set_comment_count(like_id, count);
        self.hooks.comment_count_changed(like_id, count);
    }

    fn feed_refreshed(&mut self, fresh: &Feed) {
        for like_id in self.feed.merge_refresh(fresh) {
            let Some(slide) = self.feed.by_like_id(&like_id) else { continue };
            let (liked, count) = (slide.counters.liked_by_viewer, slide.counters.likes);
            self.chrome.set_like_state(&like_id, liked && self.session.logged_in, count);
            self.hooks.like_state_changed(&like_id, liked, count);
        }
    }

    /// Evaluates both observers against the current scroll position. Promotion runs first so
    /// far-slide distances are measured from the slide the scroll landed on.
    pub(crate) fn observe(&mut self, now: Instant) {
        let active = self.active.evaluate(&self.container);
        self.handle_intersections(ObserverKind::Active, &active, now);
        let prefetch = self.prefetch.evaluate(&self.container);
        self.handle_intersections(ObserverKind::Prefetch, &prefetch, now);
    }

    pub(crate) fn refresh_overlays(&mut self) {
        for r in self.virt.iter_mut() {
            r.restricted_overlay = self.feed.get(r.kind.index()).is_some_and(|s| !self.session.can_view(s.access));
        }
    }
}
