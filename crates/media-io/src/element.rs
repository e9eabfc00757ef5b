use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SourceType {
    /// Progressive download (`video/mp4`).
    Mp4,
    /// Segmented adaptive stream played natively (`application/vnd.apple.mpegurl`).
    Hls,
    /// Media fed by an adaptive-stream engine instance.
    Engine,
}

impl SourceType {
    pub const HLS_MIME: &'static str = "application/vnd.apple.mpegurl";

    pub fn mime(self) -> &'static str {
        match self {
            SourceType::Mp4 => "video/mp4",
            SourceType::Hls => Self::HLS_MIME,
            SourceType::Engine => "",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MediaSource {
    pub url: String,
    pub kind: SourceType,
}

impl MediaSource {
    pub fn new(url: impl Into<String>, kind: SourceType) -> Self { Self { url: url.into(), kind } }
    pub fn mp4(url: impl Into<String>) -> Self { Self::new(url, SourceType::Mp4) }
}

/// Reasons the platform refuses to start playback.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PlayError {
    #[error("playback not allowed without a user gesture")]
    NotAllowed,
    #[error("play request was interrupted")]
    Aborted,
    #[error("no playable source")]
    NotSupported,
    #[error("{0}")]
    Other(String),
}

/// One video element as seen by the playback engine.
pub trait MediaElement {
    fn play(&mut self) -> Result<(), PlayError>;
    fn pause(&mut self);
    fn is_paused(&self) -> bool;
    fn current_time(&self) -> f64;
    fn set_current_time(&mut self, t: f64);
    /// `None` until metadata is known.
    fn duration(&self) -> Option<f64>;
    fn can_play_type(&self, mime: &str) -> bool;
    fn source(&self) -> Option<&MediaSource>;
    fn set_source(&mut self, source: Option<MediaSource>);
    /// Re-reads the current source, resetting playback state.
    fn load(&mut self);
}
