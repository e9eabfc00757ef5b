use std::collections::HashMap;

use crate::slides::SlideHandle;

/// Vertical scroll container whose slides are each one viewport tall.
#[derive(Debug, Clone, PartialEq)]
pub struct ScrollContainer {
    pub view_height: f64,
    pub scroll_top: f64,
    /// Scroll-snap and transition styling. Off while a silent jump is in progress.
    pub transitions_enabled: bool,
    reenable_pending: bool,
    slide_count: usize,
}

impl ScrollContainer {
    pub fn new(view_height: f64, slide_count: usize) -> Self {
        Self { view_height, scroll_top: 0.0, transitions_enabled: true, reenable_pending: false, slide_count }
    }

    pub fn max_offset(&self) -> f64 { self.slide_count.saturating_sub(1) as f64 * self.view_height }

    pub fn offset_of(&self, handle: SlideHandle) -> f64 { handle.0 as f64 * self.view_height }

    /// Physical slide nearest the current offset.
    pub fn physical_index(&self) -> usize {
        if self.view_height <= 0.0 { return 0; }
        (self.scroll_top / self.view_height).round().max(0.0) as usize
    }

    pub fn scroll_to(&mut self, offset: f64) { self.scroll_top = offset.clamp(0.0, self.max_offset()); }

    /// Moves without animation; styling comes back on the next frame.
    pub fn jump_silently(&mut self, offset: f64) {
        self.transitions_enabled = false;
        self.scroll_to(offset);
        self.reenable_pending = true;
    }

    pub fn on_frame(&mut self) {
        if self.reenable_pending {
            self.reenable_pending = false;
            self.transitions_enabled = true;
        }
    }

    pub fn resize(&mut self, view_height: f64) {
        let physical = self.physical_index();
        self.view_height = view_height;
        self.scroll_top = physical as f64 * view_height;
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ObserverKind {
    /// Margin-expanded band driving source attach/detach.
    Prefetch,
    /// Near-full visibility driving active-slide promotion.
    Active,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct IntersectionEntry {
    pub target: SlideHandle,
    pub is_intersecting: bool,
    pub ratio: f64,
}

/// Reports threshold crossings of observed slides against the container, the way a
/// platform intersection observer does: every target once on first evaluation, then
/// only on change.
#[derive(Debug, Clone)]
pub struct IntersectionObserver {
    pub kind: ObserverKind,
    margin: f64,
    threshold: f64,
    targets: Vec<SlideHandle>,
    states: HashMap<SlideHandle, bool>,
}

impl IntersectionObserver {
    pub fn new(kind: ObserverKind, margin: f64, threshold: f64) -> Self {
        Self { kind, margin, threshold, targets: Vec::new(), states: HashMap::new() }
    }

    pub fn observe(&mut self, handle: SlideHandle) {
        if !self.targets.contains(&handle) { self.targets.push(handle); }
    }

    pub fn ratio(&self, handle: SlideHandle, container: &ScrollContainer) -> f64 {
        let h = container.view_height;
        if h <= 0.0 { return 0.0; }
        let top = container.offset_of(handle);
        let root_top = container.scroll_top - self.margin * h;
        let root_bottom = container.scroll_top + h + self.margin * h;
        let overlap = (top + h).min(root_bottom) - top.max(root_top);
        (overlap.max(0.0) / h).min(1.0)
    }

    pub fn evaluate(&mut self, container: &ScrollContainer) -> Vec<IntersectionEntry> {
        let mut out = Vec::new();
        for &target in &self.targets {
            let ratio = self.ratio(target, container);
            let is_intersecting = ratio > 0.0 && ratio >= self.threshold;
            if self.states.insert(target, is_intersecting) != Some(is_intersecting) {
                out.push(IntersectionEntry { target, is_intersecting, ratio });
            }
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn container(at: usize) -> ScrollContainer {
        let mut c = ScrollContainer::new(800.0, 7);
        c.scroll_to(at as f64 * 800.0);
        c
    }

    #[test]
    fn prefetch_band_spans_margin() {
        let mut obs = IntersectionObserver::new(ObserverKind::Prefetch, 1.5, 0.01);
        for p in 0..7 { obs.observe(SlideHandle(p)); }
        let entries = obs.evaluate(&container(3));
        let inside: Vec<usize> = entries.iter().filter(|e| e.is_intersecting).map(|e| e.target.0).collect();
        // Band covers [3 - 1.5, 4 + 1.5] viewports: slides 1 (half), 2, 3, 4, 5 (half).
        assert_eq!(inside, vec![1, 2, 3, 4, 5]);
        assert_eq!(entries.len(), 7);
        assert!(obs.evaluate(&container(3)).is_empty());
    }

    #[test]
    fn active_threshold_reports_crossings_only() {
        let mut obs = IntersectionObserver::new(ObserverKind::Active, 0.0, 0.75);
        for p in 0..7 { obs.observe(SlideHandle(p)); }
        obs.evaluate(&container(1));
        let mut c = container(1);
        c.scroll_to(800.0 * 1.5);
        let mid = obs.evaluate(&c);
        assert_eq!(mid, vec![IntersectionEntry { target: SlideHandle(1), is_intersecting: false, ratio: 0.5 }]);
        c.scroll_to(800.0 * 2.1);
        let entries = obs.evaluate(&c);
        assert_eq!(entries.len(), 1);
        assert!(entries[0].is_intersecting);
        assert_eq!(entries[0].target, SlideHandle(2));
    }

    #[test]
    fn silent_jump_restores_styling_next_frame() {
        let mut c = container(0);
        c.jump_silently(2400.0);
        assert!(!c.transitions_enabled);
        assert_eq!(c.physical_index(), 3);
        c.on_frame();
        assert!(c.transitions_enabled);
    }
}
