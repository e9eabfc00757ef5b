use jobs::FrameScheduler;
use media_io::MediaElement;
use tracing::debug;

use crate::session::SessionState;
use crate::slides::SlideHandle;
use crate::virtualizer::Virtualizer;

/// The shared scrub bar in the bottom chrome.
#[derive(Debug, Clone, PartialEq)]
pub struct ProgressIndicator {
    /// Fill width, 0..=100.
    pub percent: f64,
    /// Accessible current value, whole percent.
    pub value_now: u32,
    /// Placeholder styling until the active video reports its metadata.
    pub skeleton: bool,
    pub left: f64,
    pub width: f64,
    captured: Option<u32>,
}

impl Default for ProgressIndicator {
    fn default() -> Self {
        Self { percent: 0.0, value_now: 0, skeleton: true, left: 0.0, width: 0.0, captured: None }
    }
}

impl ProgressIndicator {
    pub fn with_bounds(left: f64, width: f64) -> Self { Self { left, width, ..Self::default() } }

    pub fn set_fraction(&mut self, fraction: f64) {
        let f = if fraction.is_finite() { fraction.clamp(0.0, 1.0) } else { 0.0 };
        self.percent = f * 100.0;
        self.value_now = self.percent.round() as u32;
    }

    pub fn fraction(&self) -> f64 { self.percent / 100.0 }

    /// Proportional horizontal position of `x` within the bar.
    pub fn fraction_at(&self, x: f64) -> f64 {
        if self.width <= 0.0 { return 0.0; }
        ((x - self.left) / self.width).clamp(0.0, 1.0)
    }

    pub fn captured_pointer(&self) -> Option<u32> { self.captured }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IndicatorKey {
    ArrowLeft,
    ArrowRight,
    Home,
    End,
    Other,
}

/// Frame-driven progress loop for the active slide plus pointer and keyboard seeking.
#[derive(Debug)]
pub struct ProgressController {
    frames: FrameScheduler<SlideHandle>,
    seek_step: f64,
}

impl ProgressController {
    pub fn new(seek_step: f64) -> Self { Self { frames: FrameScheduler::default(), seek_step } }

    /// Starts (or restarts) the loop for `handle` under the current session.
    pub fn start(&mut self, handle: SlideHandle, session: &SessionState) {
        self.frames.cancel_owner(handle);
        self.frames.request(handle, session.session());
    }

    pub fn stop(&mut self, handle: SlideHandle) { self.frames.cancel_owner(handle); }
    pub fn is_running(&self, handle: SlideHandle) -> bool { self.frames.is_pending(handle) }

    /// Runs every frame callback that is due. Returns how many wrote to the indicator.
    pub fn on_frame<M: MediaElement>(
        &mut self,
        virt: &Virtualizer<M>,
        session: &SessionState,
        indicator: &mut ProgressIndicator,
    ) -> usize {
        let mut updated = 0;
        for req in self.frames.take_due() {
            if !session.is_current(req.token) {
                debug!(handle = req.owner.0, token = req.token.value(), "dropping stale progress frame");
                continue;
            }
            let Some(rendered) = virt.get(req.owner) else { continue };
            if rendered.media.is_paused() { continue; }
            if !session.dragging_progress && Self::update_ui(&rendered.media, indicator) {
                updated += 1;
            }
            self.frames.request(req.owner, req.token);
        }
        updated
    }

    fn update_ui(media: &dyn MediaElement, indicator: &mut ProgressIndicator) -> bool {
        match media.duration() {
            Some(d) if d > 0.0 => {
                indicator.set_fraction(media.current_time() / d);
                true
            }
            _ => false,
        }
    }

    fn seek(media: &mut dyn MediaElement, fraction: f64, indicator: &mut ProgressIndicator) {
        let Some(d) = media.duration().filter(|d| *d > 0.0) else { return };
        let t = fraction.clamp(0.0, 1.0) * d;
        media.set_current_time(t);
        indicator.set_fraction(t / d);
    }

    pub fn pointer_down(
        &mut self,
        pointer: u32,
        x: f64,
        session: &mut SessionState,
        indicator: &mut ProgressIndicator,
        media: &mut dyn MediaElement,
    ) {
        if indicator.captured.is_some() { return; }
        indicator.captured = Some(pointer);
        session.dragging_progress = true;
        Self::seek(media, indicator.fraction_at(x), indicator);
    }

    pub fn pointer_move(&mut self, pointer: u32, x: f64, indicator: &mut ProgressIndicator, media: &mut dyn MediaElement) {
        if indicator.captured == Some(pointer) {
            Self::seek(media, indicator.fraction_at(x), indicator);
        }
    }

    /// Pointer up or cancel. Resumes the loop for `handle` if its video is playing.
    pub fn pointer_release(
        &mut self,
        pointer: u32,
        handle: Option<SlideHandle>,
        session: &mut SessionState,
        indicator: &mut ProgressIndicator,
        media_paused: bool,
    ) {
        if indicator.captured != Some(pointer) { return; }
        indicator.captured = None;
        session.dragging_progress = false;
        if let Some(h) = handle.filter(|_| !media_paused) {
            self.start(h, session);
        }
    }

    /// Returns true when the key was consumed and default scrolling should be prevented.
    pub fn key(&mut self, key: IndicatorKey, indicator: &mut ProgressIndicator, media: &mut dyn MediaElement) -> bool {
        let Some(d) = media.duration().filter(|d| *d > 0.0) else { return false };
        let now = media.current_time() / d;
        let target = match key {
            IndicatorKey::ArrowLeft => now - self.seek_step,
            IndicatorKey::ArrowRight => now + self.seek_step,
            IndicatorKey::Home => 0.0,
            IndicatorKey::End => 1.0,
            IndicatorKey::Other => return false,
        };
        Self::seek(media, target, indicator);
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::slides::SlideKind;
    use crate::virtualizer::MediaFactory;
    use feed::{Feed, Slide};
    use media_io::headless::HeadlessMedia;
    use media_io::MediaSource;
    use serde_json::json;

    struct Factory;
    impl MediaFactory for Factory {
        type Media = HeadlessMedia;
        fn create(&mut self, slide: &Slide, _kind: SlideKind) -> HeadlessMedia {
            let mut m = HeadlessMedia::new(slide.id.0.clone(), 100.0);
            m.set_source(Some(MediaSource::mp4(slide.media.progressive_url.clone())));
            m.load();
            m
        }
    }

    fn virt() -> Virtualizer<HeadlessMedia> {
        let feed = Feed::from_value(json!([
            { "likeId": "1", "mp4Url": "/1.mp4" },
            { "likeId": "2", "mp4Url": "/2.mp4" },
        ]))
        .unwrap();
        Virtualizer::render(&feed, &mut Factory)
    }

    #[test]
    fn drag_to_half_seeks_and_frame_loop_does_not_override() {
        let mut v = virt();
        let h = v.handle_of(0).unwrap();
        let mut session = SessionState::new(false);
        let mut bar = ProgressIndicator::with_bounds(0.0, 200.0);
        let mut p = ProgressController::new(0.05);
        v.get_mut(h).unwrap().media.play().unwrap();
        p.start(h, &session);

        p.pointer_down(7, 100.0, &mut session, &mut bar, &mut v.get_mut(h).unwrap().media);
        assert_eq!(v.get(h).unwrap().media.current_time(), 50.0);
        assert_eq!(bar.percent, 50.0);
        assert!(session.dragging_progress);

        v.get_mut(h).unwrap().media.advance(10.0);
        assert_eq!(p.on_frame(&v, &session, &mut bar), 0);
        assert_eq!(bar.percent, 50.0);
        // Other pointers are ignored while one is captured.
        p.pointer_move(8, 200.0, &mut bar, &mut v.get_mut(h).unwrap().media);
        assert_eq!(bar.percent, 50.0);

        p.pointer_release(7, Some(h), &mut session, &mut bar, false);
        assert!(!session.dragging_progress);
        assert_eq!(p.on_frame(&v, &session, &mut bar), 1);
        assert_eq!(bar.value_now, 60);
    }

    #[test]
    fn stale_frames_do_not_touch_the_indicator() {
        let mut v = virt();
        let h = v.handle_of(1).unwrap();
        let mut session = SessionState::new(false);
        let mut bar = ProgressIndicator::default();
        let mut p = ProgressController::new(0.05);
        v.get_mut(h).unwrap().media.play().unwrap();
        v.get_mut(h).unwrap().media.advance(30.0);
        p.start(h, &session);
        session.advance_session();
        assert_eq!(p.on_frame(&v, &session, &mut bar), 0);
        assert_eq!(bar, ProgressIndicator::default());
        assert!(!p.is_running(h));
    }

    #[test]
    fn loop_ends_when_video_pauses() {
        let mut v = virt();
        let h = v.handle_of(0).unwrap();
        let session = SessionState::new(false);
        let mut bar = ProgressIndicator::default();
        let mut p = ProgressController::new(0.05);
        p.start(h, &session);
        assert_eq!(p.on_frame(&v, &session, &mut bar), 0);
        assert!(!p.is_running(h));
        v.get_mut(h).unwrap().media.play().unwrap();
        p.start(h, &session);
        assert_eq!(p.on_frame(&v, &session, &mut bar), 1);
        assert!(p.is_running(h));
    }

    #[test]
    fn keyboard_seeks_by_step_and_to_the_ends() {
        let mut v = virt();
        let media = &mut v.get_mut(SlideHandle(1)).unwrap().media;
        let mut bar = ProgressIndicator::default();
        let mut p = ProgressController::new(0.05);
        media.set_current_time(50.0);
        assert!(p.key(IndicatorKey::ArrowRight, &mut bar, media));
        assert!((media.current_time() - 55.0).abs() < 1e-9);
        assert!(p.key(IndicatorKey::ArrowLeft, &mut bar, media));
        assert!((media.current_time() - 50.0).abs() < 1e-9);
        assert!(p.key(IndicatorKey::End, &mut bar, media));
        assert_eq!(media.current_time(), 100.0);
        assert_eq!(bar.value_now, 100);
        assert!(p.key(IndicatorKey::Home, &mut bar, media));
        assert_eq!(media.current_time(), 0.0);
        assert!(!p.key(IndicatorKey::Other, &mut bar, media));
    }

    #[test]
    fn keys_pass_through_before_metadata() {
        let mut media = HeadlessMedia::new("bare", 100.0);
        let mut bar = ProgressIndicator::default();
        let mut p = ProgressController::new(0.05);
        assert!(media.duration().is_none());
        assert!(!p.key(IndicatorKey::ArrowRight, &mut bar, &mut media));
        assert!(!p.key(IndicatorKey::End, &mut bar, &mut media));
        assert_eq!(media.current_time(), 0.0);
        assert_eq!(bar, ProgressIndicator::default());
    }
}
