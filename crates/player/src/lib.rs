mod arbiter;
mod attach;
mod chrome;
mod comments;
mod config;
mod controller;
mod progress;
mod scheduler;
mod session;
mod slides;
mod viewport;
mod virtualizer;

pub use arbiter::{AutoplayArbiter, PlayAttempt};
pub use attach::{AttachOutcome, SourceAttachment};
pub use chrome::{BottomBar, LikeButton, SharedChrome, SideBar, TopBar};
pub use comments::{CommentsPanel, CommentsView};
pub use config::{ConfigError, NetworkHints, PlayerConfig};
pub use controller::{Event, FeedController, FeedHooks, NavDirection, NoHooks};
pub use progress::{IndicatorKey, ProgressController, ProgressIndicator};
pub use session::SessionState;
pub use slides::{RenderedSlide, SlideHandle, SlideKind};
pub use viewport::{IntersectionEntry, IntersectionObserver, ObserverKind, ScrollContainer};
pub use virtualizer::{MediaFactory, Virtualizer};
