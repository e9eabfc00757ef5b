use feed::{Comment, LikeId};
use tracing::{debug, warn};

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum CommentsView {
    #[default]
    Closed,
    Loading,
    Ready,
    /// Inline error shown above the previous list.
    Failed(String),
}

/// State of the comments sheet for one post at a time.
#[derive(Debug, Clone, Default)]
pub struct CommentsPanel {
    post: Option<LikeId>,
    pub comments: Vec<Comment>,
    pub view: CommentsView,
    submitting: bool,
}

impl CommentsPanel {
    pub fn post(&self) -> Option<&LikeId> { self.post.as_ref() }
    pub fn is_open(&self) -> bool { self.post.is_some() }
    pub fn is_submitting(&self) -> bool { self.submitting }

    pub fn open(&mut self, post: LikeId) {
        if self.post.as_ref() != Some(&post) {
            self.comments.clear();
        }
        self.post = Some(post);
        self.view = CommentsView::Loading;
        self.submitting = false;
    }

    pub fn close(&mut self) {
        self.post = None;
        self.view = CommentsView::Closed;
        self.submitting = false;
    }

    /// Returns false when the result is for a post that is no longer open.
    pub fn loaded(&mut self, post: &LikeId, result: Result<Vec<Comment>, String>) -> bool {
        if self.post.as_ref() != Some(post) {
            debug!(%post, "ignoring comments for a closed post");
            return false;
        }
        match result {
            Ok(list) => {
                self.comments = list;
                self.view = CommentsView::Ready;
            }
            Err(e) => {
                warn!(%post, "loading comments failed: {e}");
                self.view = CommentsView::Failed(e);
            }
        }
        true
    }

    /// Validates a new comment. Returns the post and trimmed text to send.
    pub fn begin_submit(&mut self, text: &str) -> Option<(LikeId, String)> {
        let post = self.post.clone()?;
        let text = text.trim();
        if text.is_empty() || self.submitting { return None; }
        self.submitting = true;
        Some((post, text.to_string()))
    }

    /// Settles a submission. Returns the server's new comment count on success.
    pub fn comment_posted(&mut self, post: &LikeId, result: Result<u64, String>) -> Option<u64> {
        if self.post.as_ref() != Some(post) { return result.ok(); }
        self.submitting = false;
        match result {
            Ok(count) => {
                if self.view != CommentsView::Loading {
                    self.view = CommentsView::Ready;
                }
                Some(count)
            }
            Err(e) => {
                warn!(%post, "posting comment failed: {e}");
                self.view = CommentsView::Failed(e);
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};

    fn comment(id: u64) -> Comment {
        Comment {
            id,
            text: format!("c{id}"),
            author: "ana".into(),
            avatar: String::new(),
            timestamp: Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap(),
            is_own_comment: false,
        }
    }

    #[test]
    fn stale_results_are_ignored() {
        let mut p = CommentsPanel::default();
        p.open(LikeId::new("1"));
        p.open(LikeId::new("2"));
        assert!(!p.loaded(&LikeId::new("1"), Ok(vec![comment(1)])));
        assert!(p.comments.is_empty());
        assert!(p.loaded(&LikeId::new("2"), Ok(vec![comment(2)])));
        assert_eq!(p.view, CommentsView::Ready);
    }

    #[test]
    fn failure_keeps_the_previous_list() {
        let mut p = CommentsPanel::default();
        let post = LikeId::new("9");
        p.open(post.clone());
        p.loaded(&post, Ok(vec![comment(1), comment(2)]));
        p.open(post.clone());
        p.loaded(&post, Err("network down".into()));
        assert_eq!(p.comments.len(), 2);
        assert_eq!(p.view, CommentsView::Failed("network down".into()));
    }

    #[test]
    fn empty_or_concurrent_submissions_are_rejected() {
        let mut p = CommentsPanel::default();
        assert_eq!(p.begin_submit("hi"), None);
        let post = LikeId::new("3");
        p.open(post.clone());
        assert_eq!(p.begin_submit("   "), None);
        assert_eq!(p.begin_submit(" hi "), Some((post.clone(), "hi".to_string())));
        assert_eq!(p.begin_submit("again"), None);
        assert_eq!(p.comment_posted(&post, Ok(4)), Some(4));
        assert!(!p.is_submitting());
    }
}
