use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::element::MediaElement;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum EngineError {
    #[error("engine module failed to load: {0}")]
    Load(String),
    #[error("adaptive streaming is not supported on this platform")]
    Unsupported,
    #[error("engine init failed: {0}")]
    Init(String),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Highest rendition (in lines) the bitrate ladder may pick. `None` leaves it uncapped.
    pub max_auto_level_capping: Option<u32>,
    pub max_buffer_length_secs: f64,
    pub start_level: Option<i32>,
}

impl Default for EngineConfig {
    fn default() -> Self { Self { max_auto_level_capping: None, max_buffer_length_secs: 30.0, start_level: None } }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LoadStatus {
    Ready,
    /// The host reports completion later through the controller's event queue.
    Pending,
    Failed(EngineError),
}

/// A client-side adaptive-stream player bound to one media element.
pub trait StreamEngine {
    fn load_source(&mut self, url: &str);
    fn attach_media(&mut self, media: &mut dyn MediaElement);
    fn destroy(&mut self);
}

/// Loads the engine module once and builds engine instances.
pub trait EngineFactory {
    type Engine: StreamEngine;

    fn begin_load(&mut self) -> LoadStatus;
    fn is_supported(&self) -> bool;
    fn create(&mut self, config: &EngineConfig) -> Result<Self::Engine, EngineError>;
}
