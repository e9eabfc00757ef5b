use crate::token::SessionToken;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FrameRequest<K> {
    pub owner: K,
    /// Session the request was scheduled under.
    pub token: SessionToken,
}

/// Next-frame callback registry. Every pending request runs on the next frame and
/// must re-request to keep a loop alive.
#[derive(Debug)]
pub struct FrameScheduler<K> {
    pending: Vec<FrameRequest<K>>,
}

impl<K> Default for FrameScheduler<K> {
    fn default() -> Self { Self { pending: Vec::new() } }
}

impl<K: Copy + PartialEq> FrameScheduler<K> {
    pub fn request(&mut self, owner: K, token: SessionToken) { self.pending.push(FrameRequest { owner, token }); }

    pub fn cancel_owner(&mut self, owner: K) { self.pending.retain(|r| r.owner != owner); }
    pub fn is_pending(&self, owner: K) -> bool { self.pending.iter().any(|r| r.owner == owner) }
    pub fn len(&self) -> usize { self.pending.len() }
    pub fn is_empty(&self) -> bool { self.pending.is_empty() }

    /// Hands out everything scheduled for this frame.
    pub fn take_due(&mut self) -> Vec<FrameRequest<K>> { std::mem::take(&mut self.pending) }
}
