use serde::{Deserialize, Serialize};

/// Monotonic session generation. A continuation captured under one token is stale
/// as soon as the counter moves past it.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct SessionToken(u64);

impl SessionToken {
    pub const fn new(value: u64) -> Self { Self(value) }
    pub fn value(self) -> u64 { self.0 }
    pub fn next(self) -> Self { Self(self.0 + 1) }
}
