use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use media_io::{EngineConfig, PageOrigin, ParseError};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, info};

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("reading {path}: {source}")]
    Io { path: PathBuf, source: std::io::Error },
    #[error("parsing {path}: {source}")]
    Parse { path: PathBuf, source: serde_json::Error },
    #[error("invalid page origin: {0}")]
    Origin(#[from] ParseError),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PlayerConfig {
    pub use_adaptive_stream: bool,
    /// How long after a user gesture programmatic `play()` is still attempted.
    pub gesture_grace_ms: u64,
    pub unload_far_slides: bool,
    /// Slides further than this from the active index lose their source when they leave the prefetch band.
    pub far_distance: usize,
    /// Prefetch band, in viewport heights above and below the viewport.
    pub prefetch_margin: f64,
    pub prefetch_threshold: f64,
    pub active_threshold: f64,
    pub settle_delay_ms: u64,
    /// Keyboard seek step as a fraction of the duration.
    pub seek_step: f64,
    pub low_data_mode: bool,
    pub page_origin: Option<String>,
    pub engine: EngineConfig,
}

impl Default for PlayerConfig {
    fn default() -> Self {
        Self {
            use_adaptive_stream: true,
            gesture_grace_ms: 1500,
            unload_far_slides: true,
            far_distance: 3,
            prefetch_margin: 1.5,
            prefetch_threshold: 0.01,
            active_threshold: 0.75,
            settle_delay_ms: 50,
            seek_step: 0.05,
            low_data_mode: false,
            page_origin: None,
            engine: EngineConfig::default(),
        }
    }
}

/// What the platform reports about the connection.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NetworkHints {
    pub save_data: bool,
    pub effective_type: Option<String>,
}

impl PlayerConfig {
    pub fn default_path() -> Option<PathBuf> {
        dirs::config_dir().map(|d| d.join("tingtong").join("player.json"))
    }

    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let raw = fs::read_to_string(path).map_err(|source| ConfigError::Io { path: path.to_path_buf(), source })?;
        let cfg: Self = serde_json::from_str(&raw).map_err(|source| ConfigError::Parse { path: path.to_path_buf(), source })?;
        info!(path = %path.display(), "loaded player config");
        Ok(cfg)
    }

    /// An explicit path must load; the per-user file is used only when present.
    pub fn load_or_default(path: Option<&Path>) -> Result<Self, ConfigError> {
        if let Some(p) = path { return Self::load(p); }
        match Self::default_path() {
            Some(p) if p.exists() => Self::load(&p),
            _ => { debug!("no player config found, using defaults"); Ok(Self::default()) }
        }
    }

    pub fn apply_network_hints(&mut self, hints: &NetworkHints) {
        let kind = hints.effective_type.as_deref().unwrap_or("");
        if hints.save_data || kind.contains("2g") {
            self.low_data_mode = true;
        }
        if kind.contains("3g") {
            self.engine.max_auto_level_capping = Some(480);
        }
    }

    pub fn grace_window(&self) -> Duration { Duration::from_millis(self.gesture_grace_ms) }
    pub fn settle_delay(&self) -> Duration { Duration::from_millis(self.settle_delay_ms) }

    pub fn effective_prefetch_margin(&self) -> f64 {
        if self.low_data_mode { 0.0 } else { self.prefetch_margin }
    }

    pub fn unloads_far_slides(&self) -> bool { self.unload_far_slides || self.low_data_mode }

    pub fn origin(&self) -> Result<Option<PageOrigin>, ConfigError> {
        self.page_origin.as_deref().map(PageOrigin::parse).transpose().map_err(ConfigError::from)
    }
}
