use feed::{Feed, Slide};
use media_io::MediaElement;
use tracing::debug;

use crate::slides::{RenderedSlide, SlideHandle, SlideKind};
use crate::viewport::ScrollContainer;

/// Builds one media element per rendered slide.
pub trait MediaFactory {
    type Media: MediaElement;

    fn create(&mut self, slide: &Slide, kind: SlideKind) -> Self::Media;
}

/// Registry of rendered slides laid out as
/// `[clone(last), slide 0, .., slide N-1, clone(first)]`.
#[derive(Debug)]
pub struct Virtualizer<M> {
    slides: Vec<RenderedSlide<M>>,
    canonical_len: usize,
}

impl<M: MediaElement> Virtualizer<M> {
    pub fn render<F: MediaFactory<Media = M>>(feed: &Feed, factory: &mut F) -> Self {
        let n = feed.len();
        let mut slides = Vec::with_capacity(if n == 0 { 0 } else { n + 2 });
        if let (Some(first), Some(last)) = (feed.get(0), feed.get(n.wrapping_sub(1))) {
            let mut push = |slide: &Slide, kind: SlideKind| {
                let handle = SlideHandle(slides.len());
                let media = factory.create(slide, kind);
                slides.push(RenderedSlide {
                    handle,
                    kind,
                    media,
                    attached: false,
                    pause_icon_visible: false,
                    restricted_overlay: false,
                });
            };
            push(last, SlideKind::BoundaryClone { of: n - 1 });
            for slide in feed.iter() {
                push(slide, SlideKind::Canonical { index: slide.index });
            }
            push(first, SlideKind::BoundaryClone { of: 0 });
        }
        debug!(canonical = n, rendered = slides.len(), "rendered slides");
        Self { slides, canonical_len: n }
    }
}

impl<M> Virtualizer<M> {
    pub fn len(&self) -> usize { self.slides.len() }
    pub fn is_empty(&self) -> bool { self.slides.is_empty() }
    pub fn canonical_len(&self) -> usize { self.canonical_len }

    pub fn iter(&self) -> impl Iterator<Item = &RenderedSlide<M>> { self.slides.iter() }
    pub fn iter_mut(&mut self) -> impl Iterator<Item = &mut RenderedSlide<M>> { self.slides.iter_mut() }

    pub fn get(&self, handle: SlideHandle) -> Option<&RenderedSlide<M>> { self.slides.get(handle.0) }
    pub fn get_mut(&mut self, handle: SlideHandle) -> Option<&mut RenderedSlide<M>> { self.slides.get_mut(handle.0) }

    pub fn handle_of(&self, index: usize) -> Option<SlideHandle> {
        (index < self.canonical_len).then_some(SlideHandle(index + 1))
    }

    pub fn canonical(&self, index: usize) -> Option<&RenderedSlide<M>> { self.handle_of(index).and_then(|h| self.get(h)) }

    pub fn canonical_mut(&mut self, index: usize) -> Option<&mut RenderedSlide<M>> {
        let h = self.handle_of(index)?;
        self.get_mut(h)
    }

    pub fn canonical_handles(&self) -> impl Iterator<Item = SlideHandle> {
        (1..=self.canonical_len).map(SlideHandle)
    }

    pub fn leading_clone(&self) -> Option<SlideHandle> { (self.canonical_len > 0).then_some(SlideHandle(0)) }
    pub fn trailing_clone(&self) -> Option<SlideHandle> {
        (self.canonical_len > 0).then_some(SlideHandle(self.canonical_len + 1))
    }

    /// Scroll offset of the first real slide, where a session starts.
    pub fn initial_offset(&self, container: &ScrollContainer) -> Option<f64> {
        self.handle_of(0).map(|h| container.offset_of(h))
    }

    /// Where to jump when the scroll settles at `physical`, if it is a boundary clone.
    pub fn resnap_target(&self, physical: usize) -> Option<SlideHandle> {
        if self.canonical_len == 0 { return None; }
        if physical == 0 {
            self.handle_of(self.canonical_len - 1)
        } else if physical == self.canonical_len + 1 {
            self.handle_of(0)
        } else {
            None
        }
    }

    /// Silently re-snaps off a boundary clone. Returns the slide jumped to.
    pub fn settle(&self, container: &mut ScrollContainer) -> Option<SlideHandle> {
        let target = self.resnap_target(container.physical_index())?;
        container.jump_silently(container.offset_of(target));
        debug!(to = target.0, "re-snapped off boundary clone");
        Some(target)
    }
}
