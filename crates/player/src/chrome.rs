use feed::{format_count, LikeId, Slide};
use tracing::debug;

use crate::progress::ProgressIndicator;
use crate::slides::SlideHandle;

#[derive(Debug, Clone, Default, PartialEq)]
pub struct TopBar {
    pub logged_in: bool,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct LikeButton {
    pub like_id: Option<LikeId>,
    pub pressed: bool,
    pub count: u64,
    pub count_text: String,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct SideBar {
    pub avatar: String,
    pub like: LikeButton,
    pub comments_like_id: Option<LikeId>,
    pub comment_count: u64,
    pub comment_count_text: String,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct BottomBar {
    pub author: String,
    pub description: String,
    pub progress: ProgressIndicator,
}

/// The single set of overlay widgets, parented under exactly one rendered slide.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SharedChrome {
    pub top: TopBar,
    pub side: SideBar,
    pub bottom: BottomBar,
    pub login_panel_active: bool,
    pub logged_in_menu_active: bool,
    owner: Option<SlideHandle>,
}

impl SharedChrome {
    pub fn new(logged_in: bool) -> Self {
        let mut chrome = Self::default();
        chrome.top.logged_in = logged_in;
        chrome
    }

    pub fn owner(&self) -> Option<SlideHandle> { self.owner }

    /// Moves the chrome into `handle`'s placeholders. Returns false if it was already there.
    pub fn attach_to(&mut self, handle: SlideHandle, slide: &Slide, logged_in: bool, has_metadata: bool) -> bool {
        if self.owner == Some(handle) { return false; }
        self.side.avatar = slide.avatar.clone();
        self.bottom.author = slide.author.clone();
        self.bottom.description = slide.description.clone();
        self.side.like.like_id = Some(slide.like_id.clone());
        self.side.comments_like_id = Some(slide.like_id.clone());
        self.show_like(slide.counters.liked_by_viewer && logged_in, slide.counters.likes);
        self.show_comment_count(slide.counters.comments);
        self.bottom.progress.set_fraction(0.0);
        self.bottom.progress.skeleton = !has_metadata;
        self.owner = Some(handle);
        debug!(handle = handle.0, like_id = %slide.like_id, "chrome relocated");
        true
    }

    pub fn apply_login_state(&mut self, logged_in: bool, owner_slide: Option<&Slide>) {
        self.top.logged_in = logged_in;
        if logged_in {
            self.login_panel_active = false;
        } else {
            self.logged_in_menu_active = false;
        }
        if let Some(slide) = owner_slide {
            self.side.like.pressed = slide.counters.liked_by_viewer && logged_in;
        }
    }

    /// Applies a like result if it belongs to the slide currently showing the chrome.
    pub fn set_like_state(&mut self, like_id: &LikeId, liked: bool, count: u64) -> bool {
        if self.side.like.like_id.as_ref() != Some(like_id) { return false; }
        self.show_like(liked, count);
        true
    }

    pub fn set_comment_count(&mut self, like_id: &LikeId, count: u64) -> bool {
        if self.side.comments_like_id.as_ref() != Some(like_id) { return false; }
        self.show_comment_count(count);
        true
    }

    fn show_like(&mut self, pressed: bool, count: u64) {
        self.side.like.pressed = pressed;
        self.side.like.count = count;
        self.side.like.count_text = format_count(count);
    }

    fn show_comment_count(&mut self, count: u64) {
        self.side.comment_count = count;
        self.side.comment_count_text = format_count(count);
    }
}
