/// Physical position of a rendered element in the scroll container.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SlideHandle(pub usize);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SlideKind {
    /// Copy of canonical slide `of`, placed at a boundary for wraparound.
    BoundaryClone { of: usize },
    Canonical { index: usize },
}

impl SlideKind {
    pub fn index(self) -> usize {
        match self {
            SlideKind::BoundaryClone { of } => of,
            SlideKind::Canonical { index } => index,
        }
    }
}

#[derive(Debug)]
pub struct RenderedSlide<M> {
    pub handle: SlideHandle,
    pub kind: SlideKind,
    pub media: M,
    /// Set once a source (or a pending engine) has been assigned.
    pub attached: bool,
    pub pause_icon_visible: bool,
    pub restricted_overlay: bool,
}

impl<M> RenderedSlide<M> {
    pub fn is_clone(&self) -> bool { matches!(self.kind, SlideKind::BoundaryClone { .. }) }

    pub fn canonical_index(&self) -> Option<usize> {
        match self.kind {
            SlideKind::Canonical { index } => Some(index),
            SlideKind::BoundaryClone { .. } => None,
        }
    }
}
