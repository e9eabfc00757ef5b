use std::time::Instant;

use feed::{AccessTier, SlideId};
use media_io::{EngineFactory, MediaElement};
use tracing::{debug, info};

use crate::arbiter::PlayAttempt;
use crate::controller::FeedController;
use crate::slides::SlideHandle;
use crate::viewport::{IntersectionEntry, ObserverKind};

impl<M: MediaElement, F: EngineFactory> FeedController<M, F> {
    pub(crate) fn handle_intersections(&mut self, kind: ObserverKind, entries: &[IntersectionEntry], now: Instant) {
        match kind {
            ObserverKind::Prefetch => self.prefetch_entries(entries),
            ObserverKind::Active => {
                // The first slide crossing into dominance in a batch wins.
                let dominant = entries
                    .iter()
                    .filter(|e| e.is_intersecting)
                    .map(|e| e.target)
                    .find(|h| self.virt.get(*h).is_some_and(|r| !r.is_clone()));
                if let Some(handle) = dominant {
                    self.activate(handle, now);
                }
            }
        }
    }

    fn prefetch_entries(&mut self, entries: &[IntersectionEntry]) {
        for entry in entries {
            if entry.is_intersecting {
                self.attach.attach(entry.target, &mut self.virt, &self.feed, &self.session);
                continue;
            }
            if !self.config.unloads_far_slides() { continue; }
            let Some(index) = self.virt.get(entry.target).and_then(|r| r.canonical_index()) else { continue };
            let current = self.session.current_index.unwrap_or(0);
            if index.abs_diff(current) > self.config.far_distance {
                debug!(index, current, "unloading far slide");
                self.attach.detach(entry.target, &mut self.virt, &self.feed);
            }
        }
    }

    /// Promotes `handle` to the active slide. Re-activating the current index is a no-op.
    pub(crate) fn activate(&mut self, handle: SlideHandle, now: Instant) {
        let Some(index) = self.virt.get(handle).and_then(|r| r.canonical_index()) else { return };
        if self.session.current_index == Some(index) { return; }

        let token = self.session.advance_session();
        if let Some(prev) = self.active_handle() {
            if let Some(r) = self.virt.get_mut(prev) {
                r.media.pause();
                r.pause_icon_visible = false;
            }
            self.progress.stop(prev);
        }
        self.session.current_index = Some(index);

        let Some(slide) = self.feed.get(index) else { return };
        let has_metadata = self.virt.get(handle).is_some_and(|r| r.media.duration().is_some());
        self.chrome.attach_to(handle, slide, self.session.logged_in, has_metadata);
        info!(index, session = token.value(), "active slide changed");

        self.attach.attach(handle, &mut self.virt, &self.feed, &self.session);
        self.try_autoplay(handle, now);
        if let Some(slide) = self.feed.get(index) {
            self.hooks.slide_changed(index, slide);
        }
    }

    /// Guarded play of `handle`, unless it is restricted for this viewer or autoplay is known blocked.
    fn try_autoplay(&mut self, handle: SlideHandle, now: Instant) -> Option<PlayAttempt> {
        let index = self.virt.get(handle)?.canonical_index()?;
        let slide = self.feed.get(index)?;
        if !self.session.can_view(slide.access) {
            debug!(slide = %slide.id, "not playing restricted slide");
            return None;
        }
        let r = self.virt.get_mut(handle)?;
        if self.session.autoplay_blocked {
            r.pause_icon_visible = true;
            return None;
        }
        let attempt = self.arbiter.guarded_play(&mut self.session, &mut r.media, now);
        match attempt {
            PlayAttempt::Started => {
                r.pause_icon_visible = false;
                self.progress.start(handle, &self.session);
            }
            PlayAttempt::Blocked => r.pause_icon_visible = true,
            PlayAttempt::OutsideGestureWindow | PlayAttempt::Failed(_) => {}
        }
        Some(attempt)
    }

    pub fn set_logged_in(&mut self, logged_in: bool, now: Instant) {
        if self.session.logged_in == logged_in { return; }
        info!(logged_in, "login state changed");
        self.session.logged_in = logged_in;
        let owner = self.chrome.owner().and_then(|h| self.virt.get(h)).and_then(|r| r.canonical_index());
        self.chrome.apply_login_state(logged_in, owner.and_then(|i| self.feed.get(i)));
        self.refresh_overlays();
        self.reevaluate_active(now);
    }

    pub fn set_access(&mut self, id: &SlideId, access: AccessTier, now: Instant) {
        let Some(index) = self.feed.index_of_slide(id) else { return };
        let Some(slide) = self.feed.get_mut(index) else { return };
        if slide.access == access { return; }
        slide.access = access;
        debug!(slide = %id, ?access, "access tier changed");
        self.refresh_overlays();
        if self.session.current_index == Some(index) {
            self.reevaluate_active(now);
        }
    }

    /// Brings the active slide in line with the current login state and access tier.
    fn reevaluate_active(&mut self, now: Instant) {
        let Some(handle) = self.active_handle() else { return };
        let Some(slide) = self.session.current_index.and_then(|i| self.feed.get(i)) else { return };

        if !self.session.can_view(slide.access) {
            if let Some(r) = self.virt.get_mut(handle) {
                r.media.pause();
                r.media.set_current_time(0.0);
            }
            self.progress.stop(handle);
            self.chrome.bottom.progress.set_fraction(0.0);
            return;
        }

        let attached = self.virt.get(handle).is_some_and(|r| r.attached);
        if !attached {
            self.attach.attach(handle, &mut self.virt, &self.feed, &self.session);
        }
        let paused = self.virt.get(handle).map_or(false, |r| r.media.is_paused());
        if paused && self.session.app_loaded && !self.session.dragging_progress && !self.session.autoplay_blocked {
            self.try_autoplay(handle, now);
        }
    }
}
