use std::time::{Duration, Instant};

use media_io::{MediaElement, PlayError};
use tracing::{debug, warn};

use crate::session::SessionState;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PlayAttempt {
    /// No gesture inside the grace window; `play()` was not called.
    OutsideGestureWindow,
    Started,
    Blocked,
    Failed(PlayError),
}

impl PlayAttempt {
    pub fn started(&self) -> bool { matches!(self, PlayAttempt::Started) }
}

/// Gatekeeper for every `play()` the engine issues.
#[derive(Debug, Clone)]
pub struct AutoplayArbiter {
    grace: Duration,
}

impl AutoplayArbiter {
    pub fn new(grace: Duration) -> Self { Self { grace } }

    /// Programmatic play: only attempted shortly after a real user gesture.
    pub fn guarded_play(&self, session: &mut SessionState, media: &mut dyn MediaElement, now: Instant) -> PlayAttempt {
        if !session.within_gesture_window(now, self.grace) {
            debug!("skipping play: no recent user gesture");
            return PlayAttempt::OutsideGestureWindow;
        }
        Self::invoke(session, media)
    }

    /// Play straight from a user gesture on the video; bypasses the grace window.
    pub fn direct_play(&self, session: &mut SessionState, media: &mut dyn MediaElement) -> PlayAttempt {
        let attempt = Self::invoke(session, media);
        if attempt.started() && session.autoplay_blocked {
            debug!("direct play succeeded, autoplay unblocked");
            session.autoplay_blocked = false;
        }
        attempt
    }

    /// Rejections that arrive after `play()` returned.
    pub fn record_rejection(session: &mut SessionState, error: &PlayError) {
        if matches!(error, PlayError::NotAllowed) {
            warn!("autoplay was blocked by the platform");
            session.autoplay_blocked = true;
        }
    }

    fn invoke(session: &mut SessionState, media: &mut dyn MediaElement) -> PlayAttempt {
        match media.play() {
            Ok(()) => PlayAttempt::Started,
            Err(PlayError::NotAllowed) => {
                Self::record_rejection(session, &PlayError::NotAllowed);
                media.pause();
                PlayAttempt::Blocked
            }
            Err(e) => {
                debug!("play failed: {e}");
                PlayAttempt::Failed(e)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use media_io::headless::{AutoplayPolicy, HeadlessMedia};
    use media_io::MediaSource;

    fn media() -> HeadlessMedia {
        let mut m = HeadlessMedia::new("v", 10.0);
        m.set_source(Some(MediaSource::mp4("/v.mp4")));
        m.load();
        m
    }

    #[test]
    fn stale_gesture_never_calls_play() {
        let arbiter = AutoplayArbiter::new(Duration::from_millis(1000));
        let mut s = SessionState::new(false);
        let t0 = Instant::now();
        let mut m = media();
        assert_eq!(arbiter.guarded_play(&mut s, &mut m, t0), PlayAttempt::OutsideGestureWindow);
        s.record_gesture(t0);
        assert_eq!(arbiter.guarded_play(&mut s, &mut m, t0 + Duration::from_millis(1001)), PlayAttempt::OutsideGestureWindow);
        assert_eq!(m.play_calls, 0);
        assert_eq!(arbiter.guarded_play(&mut s, &mut m, t0 + Duration::from_millis(500)), PlayAttempt::Started);
        assert_eq!(m.play_calls, 1);
    }

    #[test]
    fn not_allowed_sets_blocked_and_direct_play_clears_it() {
        let arbiter = AutoplayArbiter::new(Duration::from_millis(1000));
        let mut s = SessionState::new(false);
        let t0 = Instant::now();
        s.record_gesture(t0);
        let mut m = media();
        m.policy = AutoplayPolicy::Blocked;
        assert_eq!(arbiter.guarded_play(&mut s, &mut m, t0), PlayAttempt::Blocked);
        assert!(s.autoplay_blocked);
        assert!(m.is_paused());
        m.policy = AutoplayPolicy::Allowed;
        // Stays blocked until a direct play succeeds, however much time passes.
        assert!(s.autoplay_blocked);
        assert_eq!(arbiter.direct_play(&mut s, &mut m), PlayAttempt::Started);
        assert!(!s.autoplay_blocked);
    }
}
