//! In-process media and engine implementations with no decoding behind them.
//!
//! `HeadlessMedia` keeps the observable state of a video element (source, paused flag,
//! clock, duration) and enforces a configurable autoplay policy, so the playback
//! controller can run without a browser.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use tracing::debug;

use crate::element::{MediaElement, MediaSource, PlayError, SourceType};
use crate::engine::{EngineConfig, EngineError, EngineFactory, LoadStatus, StreamEngine};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum AutoplayPolicy {
    #[default]
    Allowed,
    /// Every `play()` is refused with `NotAllowed`.
    Blocked,
}

#[derive(Debug, Clone)]
pub struct HeadlessMedia {
    pub label: String,
    source: Option<MediaSource>,
    paused: bool,
    current_time: f64,
    duration: Option<f64>,
    /// Duration reported once a source has been loaded.
    pub media_duration: f64,
    pub native_hls: bool,
    pub policy: AutoplayPolicy,
    pub load_count: u32,
    pub play_calls: u32,
}

impl HeadlessMedia {
    pub fn new(label: impl Into<String>, media_duration: f64) -> Self {
        Self {
            label: label.into(),
            source: None,
            paused: true,
            current_time: 0.0,
            duration: None,
            media_duration,
            native_hls: false,
            policy: AutoplayPolicy::Allowed,
            load_count: 0,
            play_calls: 0,
        }
    }

    /// Advances the playback clock by `dt` seconds; playback loops at the end.
    pub fn advance(&mut self, dt: f64) {
        let Some(duration) = self.duration else { return };
        if self.paused || duration <= 0.0 { return; }
        self.current_time += dt;
        if self.current_time >= duration { self.current_time %= duration; }
    }
}

impl MediaElement for HeadlessMedia {
    fn play(&mut self) -> Result<(), PlayError> {
        self.play_calls += 1;
        if self.policy == AutoplayPolicy::Blocked {
            return Err(PlayError::NotAllowed);
        }
        self.paused = false;
        Ok(())
    }

    fn pause(&mut self) { self.paused = true; }
    fn is_paused(&self) -> bool { self.paused }
    fn current_time(&self) -> f64 { self.current_time }

    fn set_current_time(&mut self, t: f64) {
        let max = self.duration.unwrap_or(0.0);
        self.current_time = t.clamp(0.0, max);
    }

    fn duration(&self) -> Option<f64> { self.duration }

    fn can_play_type(&self, mime: &str) -> bool {
        match mime {
            "video/mp4" => true,
            SourceType::HLS_MIME => self.native_hls,
            _ => false,
        }
    }

    fn source(&self) -> Option<&MediaSource> { self.source.as_ref() }
    fn set_source(&mut self, source: Option<MediaSource>) { self.source = source; }

    fn load(&mut self) {
        self.load_count += 1;
        self.current_time = 0.0;
        self.duration = self.source.as_ref().map(|_| self.media_duration);
    }
}

#[derive(Debug)]
pub struct HeadlessEngine {
    id: usize,
    url: Option<String>,
    live: Arc<AtomicUsize>,
    destroyed: bool,
}

impl HeadlessEngine {
    pub fn id(&self) -> usize { self.id }
    pub fn url(&self) -> Option<&str> { self.url.as_deref() }
}

impl StreamEngine for HeadlessEngine {
    fn load_source(&mut self, url: &str) { self.url = Some(url.to_string()); }

    fn attach_media(&mut self, media: &mut dyn MediaElement) {
        let url = self.url.clone().unwrap_or_default();
        media.set_source(Some(MediaSource::new(format!("engine://{}/{url}", self.id), SourceType::Engine)));
        media.load();
    }

    fn destroy(&mut self) {
        if !self.destroyed {
            self.destroyed = true;
            self.live.fetch_sub(1, Ordering::SeqCst);
            debug!(engine = self.id, "engine destroyed");
        }
    }
}

impl Drop for HeadlessEngine {
    fn drop(&mut self) { self.destroy(); }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ModuleLoad {
    Immediate,
    /// `begin_load` answers `Pending`; the caller delivers completion itself.
    Deferred,
    Fails,
}

#[derive(Debug, Clone)]
pub struct HeadlessEngineFactory {
    pub supported: bool,
    pub module: ModuleLoad,
    pub load_requests: usize,
    created: usize,
    live: Arc<AtomicUsize>,
}

impl HeadlessEngineFactory {
    pub fn new(module: ModuleLoad) -> Self {
        Self { supported: true, module, load_requests: 0, created: 0, live: Arc::new(AtomicUsize::new(0)) }
    }

    /// Engine instances created and not yet destroyed.
    pub fn live_engines(&self) -> usize { self.live.load(Ordering::SeqCst) }
    pub fn created(&self) -> usize { self.created }
}

impl EngineFactory for HeadlessEngineFactory {
    type Engine = HeadlessEngine;

    fn begin_load(&mut self) -> LoadStatus {
        self.load_requests += 1;
        match self.module {
            ModuleLoad::Immediate => LoadStatus::Ready,
            ModuleLoad::Deferred => LoadStatus::Pending,
            ModuleLoad::Fails => LoadStatus::Failed(EngineError::Load("module unreachable".into())),
        }
    }

    fn is_supported(&self) -> bool { self.supported }

    fn create(&mut self, _config: &EngineConfig) -> Result<HeadlessEngine, EngineError> {
        if !self.supported { return Err(EngineError::Unsupported); }
        self.created += 1;
        self.live.fetch_add(1, Ordering::SeqCst);
        Ok(HeadlessEngine { id: self.created, url: None, live: self.live.clone(), destroyed: false })
    }
}
