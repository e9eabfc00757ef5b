mod element;
mod engine;
pub mod headless;
mod origin;

pub use element::{MediaElement, MediaSource, PlayError, SourceType};
pub use engine::{EngineConfig, EngineError, EngineFactory, LoadStatus, StreamEngine};
pub use origin::PageOrigin;
pub use url::ParseError;
