use std::time::{Duration, Instant};

use feed::AccessTier;
use jobs::SessionToken;

/// Playback state shared by every component, owned by the controller.
#[derive(Debug, Clone, Default)]
pub struct SessionState {
    /// Canonical index of the active slide; `None` before the first promotion.
    pub current_index: Option<usize>,
    pub logged_in: bool,
    pub autoplay_blocked: bool,
    pub dragging_progress: bool,
    pub last_gesture: Option<Instant>,
    /// Set once the feed has been laid out; login changes before that never start playback.
    pub app_loaded: bool,
    active_session: SessionToken,
}

impl SessionState {
    pub fn new(logged_in: bool) -> Self { Self { logged_in, ..Self::default() } }

    pub fn session(&self) -> SessionToken { self.active_session }

    /// Invalidates every continuation captured under the previous token.
    pub fn advance_session(&mut self) -> SessionToken {
        self.active_session = self.active_session.next();
        self.active_session
    }

    pub fn is_current(&self, token: SessionToken) -> bool { token == self.active_session }

    pub fn record_gesture(&mut self, now: Instant) { self.last_gesture = Some(now); }

    pub fn within_gesture_window(&self, now: Instant, grace: Duration) -> bool {
        self.last_gesture.is_some_and(|g| now.saturating_duration_since(g) <= grace)
    }

    pub fn can_view(&self, access: AccessTier) -> bool { self.logged_in || !access.is_restricted() }
}
