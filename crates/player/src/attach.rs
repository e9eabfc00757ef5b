use std::collections::HashMap;

use feed::{Feed, Slide, SlideId};
use media_io::{
    EngineConfig, EngineError, EngineFactory, LoadStatus, MediaElement, MediaSource, PageOrigin, SourceType, StreamEngine,
};
use tracing::{debug, info, warn};

use crate::session::SessionState;
use crate::slides::SlideHandle;
use crate::virtualizer::Virtualizer;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AttachOutcome {
    NotRendered,
    /// Boundary clones only ever show their poster.
    NotCanonical,
    AlreadyAttached,
    /// Restricted slide and anonymous viewer; retried when login state changes.
    Refused,
    Progressive,
    NativeStream,
    Engine,
    /// Waiting on the engine module; resolved by `on_module_loaded`.
    EnginePending,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ModuleState {
    Unloaded,
    Loading,
    Ready,
}

/// Decides per slide whether its element carries a real source and owns the
/// adaptive-stream engine instances, at most one per slide id.
pub struct SourceAttachment<E: EngineFactory> {
    factory: E,
    engines: HashMap<SlideId, E::Engine>,
    module: ModuleState,
    pending: Vec<SlideHandle>,
    origin: Option<PageOrigin>,
    use_adaptive: bool,
    engine_config: EngineConfig,
}

impl<E: EngineFactory> SourceAttachment<E> {
    pub fn new(factory: E, use_adaptive: bool, engine_config: EngineConfig, origin: Option<PageOrigin>) -> Self {
        Self {
            factory,
            engines: HashMap::new(),
            module: ModuleState::Unloaded,
            pending: Vec::new(),
            origin,
            use_adaptive,
            engine_config,
        }
    }

    pub fn factory(&self) -> &E { &self.factory }
    pub fn factory_mut(&mut self) -> &mut E { &mut self.factory }
    pub fn engine_count(&self) -> usize { self.engines.len() }
    pub fn has_engine(&self, id: &SlideId) -> bool { self.engines.contains_key(id) }
    pub fn pending(&self) -> &[SlideHandle] { &self.pending }

    fn resolve(&self, raw: &str) -> String {
        match &self.origin {
            Some(origin) => origin.normalize(raw),
            None => raw.to_string(),
        }
    }

    pub fn attach<M: MediaElement>(
        &mut self,
        handle: SlideHandle,
        virt: &mut Virtualizer<M>,
        feed: &Feed,
        session: &SessionState,
    ) -> AttachOutcome {
        let Some(rendered) = virt.get_mut(handle) else { return AttachOutcome::NotRendered };
        let Some(slide) = rendered.canonical_index().and_then(|i| feed.get(i)) else {
            return AttachOutcome::NotCanonical;
        };
        if rendered.attached {
            return AttachOutcome::AlreadyAttached;
        }
        if !session.can_view(slide.access) {
            debug!(slide = %slide.id, "attach refused: restricted slide");
            return AttachOutcome::Refused;
        }
        rendered.attached = true;
        let media = &mut rendered.media;

        let stream = slide.media.stream_url.as_deref().filter(|_| self.use_adaptive);
        let outcome = match stream {
            None => self.set_progressive(slide, media),
            Some(stream) if media.can_play_type(SourceType::HLS_MIME) => {
                media.set_source(Some(MediaSource::new(self.resolve(stream), SourceType::Hls)));
                media.load();
                AttachOutcome::NativeStream
            }
            Some(_) => match self.module {
                ModuleState::Ready => self.start_engine(slide, media),
                ModuleState::Loading => self.defer(handle),
                ModuleState::Unloaded => {
                    self.module = ModuleState::Loading;
                    match self.factory.begin_load() {
                        LoadStatus::Ready => {
                            self.module = ModuleState::Ready;
                            self.start_engine(slide, media)
                        }
                        LoadStatus::Pending => self.defer(handle),
                        LoadStatus::Failed(e) => {
                            warn!("engine module failed, using progressive source: {e}");
                            self.module = ModuleState::Unloaded;
                            self.set_progressive(slide, media)
                        }
                    }
                }
            },
        };
        debug!(slide = %slide.id, ?outcome, "attached");
        outcome
    }

    /// Returns whether the slide had been attached.
    pub fn detach<M: MediaElement>(&mut self, handle: SlideHandle, virt: &mut Virtualizer<M>, feed: &Feed) -> bool {
        let Some(rendered) = virt.get_mut(handle) else { return false };
        rendered.media.pause();
        if let Some(slide) = rendered.canonical_index().and_then(|i| feed.get(i)) {
            if let Some(mut engine) = self.engines.remove(&slide.id) {
                engine.destroy();
            }
        }
        self.pending.retain(|h| *h != handle);
        rendered.media.set_source(None);
        rendered.media.load();
        let was = std::mem::replace(&mut rendered.attached, false);
        if was {
            debug!(handle = handle.0, "detached");
        }
        was
    }

    pub fn on_module_loaded<M: MediaElement>(
        &mut self,
        result: Result<(), EngineError>,
        virt: &mut Virtualizer<M>,
        feed: &Feed,
    ) {
        let ok = match result {
            Ok(()) => {
                info!("engine module loaded");
                self.module = ModuleState::Ready;
                true
            }
            Err(e) => {
                warn!("engine module failed, using progressive sources: {e}");
                self.module = ModuleState::Unloaded;
                false
            }
        };
        for handle in std::mem::take(&mut self.pending) {
            let Some(rendered) = virt.get_mut(handle) else { continue };
            // Detached while the module was loading.
            if !rendered.attached { continue; }
            let Some(slide) = rendered.canonical_index().and_then(|i| feed.get(i)) else { continue };
            if ok {
                self.start_engine(slide, &mut rendered.media);
            } else {
                self.set_progressive(slide, &mut rendered.media);
            }
        }
    }

    /// Non-fatal errors are left to the engine; fatal ones fall back to the progressive source.
    pub fn on_engine_error<M: MediaElement>(
        &mut self,
        id: &SlideId,
        fatal: bool,
        virt: &mut Virtualizer<M>,
        feed: &Feed,
    ) {
        if !fatal {
            debug!(slide = %id, "ignoring non-fatal engine error");
            return;
        }
        let Some(mut engine) = self.engines.remove(id) else { return };
        engine.destroy();
        warn!(slide = %id, "fatal engine error, falling back to progressive source");
        let Some(index) = feed.index_of_slide(id) else { return };
        let (Some(slide), Some(rendered)) = (feed.get(index), virt.canonical_mut(index)) else { return };
        if rendered.attached {
            self.set_progressive(slide, &mut rendered.media);
        }
    }

    fn defer(&mut self, handle: SlideHandle) -> AttachOutcome {
        if !self.pending.contains(&handle) {
            self.pending.push(handle);
        }
        AttachOutcome::EnginePending
    }

    fn start_engine<M: MediaElement>(&mut self, slide: &Slide, media: &mut M) -> AttachOutcome {
        let Some(stream) = slide.media.stream_url.as_deref() else { return self.set_progressive(slide, media) };
        if !self.factory.is_supported() {
            return self.set_progressive(slide, media);
        }
        if let Some(mut old) = self.engines.remove(&slide.id) {
            old.destroy();
        }
        match self.factory.create(&self.engine_config) {
            Ok(mut engine) => {
                engine.load_source(&self.resolve(stream));
                engine.attach_media(media);
                self.engines.insert(slide.id.clone(), engine);
                AttachOutcome::Engine
            }
            Err(e) => {
                warn!(slide = %slide.id, "engine init failed: {e}");
                self.set_progressive(slide, media)
            }
        }
    }

    fn set_progressive<M: MediaElement>(&self, slide: &Slide, media: &mut M) -> AttachOutcome {
        media.set_source(Some(MediaSource::mp4(self.resolve(&slide.media.progressive_url))));
        media.load();
        AttachOutcome::Progressive
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::slides::SlideKind;
    use crate::virtualizer::MediaFactory;
    use media_io::headless::{HeadlessEngineFactory, HeadlessMedia, ModuleLoad};
    use serde_json::json;

    struct Factory { native_hls: bool }
    impl MediaFactory for Factory {
        type Media = HeadlessMedia;
        fn create(&mut self, slide: &Slide, _kind: SlideKind) -> HeadlessMedia {
            let mut m = HeadlessMedia::new(slide.id.0.clone(), 10.0);
            m.native_hls = self.native_hls;
            m
        }
    }

    fn setup(module: ModuleLoad, native_hls: bool) -> (SourceAttachment<HeadlessEngineFactory>, Virtualizer<HeadlessMedia>, Feed) {
        let feed = Feed::from_value(json!([
            { "id": "a", "likeId": "1", "mp4Url": "https://tt.example/a.mp4", "hlsUrl": "http://tt.example/a.m3u8", "access": "public" },
            { "id": "b", "likeId": "2", "mp4Url": "https://cdn.example/b.mp4", "access": "secret" },
            { "id": "c", "likeId": "3", "mp4Url": "https://cdn.example/c.mp4", "hlsUrl": "https://cdn.example/c.m3u8" },
        ]))
        .unwrap();
        let virt = Virtualizer::render(&feed, &mut Factory { native_hls });
        let origin = PageOrigin::parse("https://tt.example/").ok();
        let attach = SourceAttachment::new(HeadlessEngineFactory::new(module), true, EngineConfig::default(), origin);
        (attach, virt, feed)
    }

    fn source<'a>(virt: &'a Virtualizer<HeadlessMedia>, index: usize) -> Option<&'a MediaSource> {
        virt.canonical(index).unwrap().media.source()
    }

    #[test]
    fn attach_is_idempotent_and_never_leaks_engines() {
        let (mut a, mut virt, feed) = setup(ModuleLoad::Immediate, false);
        let s = SessionState::new(false);
        let h = virt.handle_of(0).unwrap();
        assert_eq!(a.attach(h, &mut virt, &feed, &s), AttachOutcome::Engine);
        assert_eq!(a.attach(h, &mut virt, &feed, &s), AttachOutcome::AlreadyAttached);
        assert_eq!(a.factory().live_engines(), 1);
        assert!(a.detach(h, &mut virt, &feed));
        assert_eq!(a.factory().live_engines(), 0);
        assert_eq!(source(&virt, 0), None);
        assert_eq!(a.attach(h, &mut virt, &feed, &s), AttachOutcome::Engine);
        assert_eq!(a.factory().live_engines(), 1);
        assert_eq!(a.engine_count(), 1);
    }

    #[test]
    fn restricted_slide_is_refused_until_login() {
        let (mut a, mut virt, feed) = setup(ModuleLoad::Immediate, false);
        let h = virt.handle_of(1).unwrap();
        assert_eq!(a.attach(h, &mut virt, &feed, &SessionState::new(false)), AttachOutcome::Refused);
        assert!(!virt.get(h).unwrap().attached);
        assert_eq!(a.attach(h, &mut virt, &feed, &SessionState::new(true)), AttachOutcome::Progressive);
        assert_eq!(source(&virt, 1), Some(&MediaSource::mp4("https://cdn.example/b.mp4")));
    }

    #[test]
    fn native_stream_support_skips_the_engine() {
        let (mut a, mut virt, feed) = setup(ModuleLoad::Immediate, true);
        let h = virt.handle_of(0).unwrap();
        assert_eq!(a.attach(h, &mut virt, &feed, &SessionState::new(false)), AttachOutcome::NativeStream);
        assert_eq!(source(&virt, 0), Some(&MediaSource::new("/a.m3u8", SourceType::Hls)));
        assert_eq!(a.factory().load_requests, 0);
    }

    #[test]
    fn pending_module_resolves_only_still_attached_slides() {
        let (mut a, mut virt, feed) = setup(ModuleLoad::Deferred, false);
        let s = SessionState::new(false);
        let first = virt.handle_of(0).unwrap();
        let third = virt.handle_of(2).unwrap();
        assert_eq!(a.attach(first, &mut virt, &feed, &s), AttachOutcome::EnginePending);
        assert_eq!(a.attach(third, &mut virt, &feed, &s), AttachOutcome::EnginePending);
        assert_eq!(a.factory().load_requests, 1);
        a.detach(third, &mut virt, &feed);
        a.on_module_loaded(Ok(()), &mut virt, &feed);
        assert!(a.has_engine(&SlideId("a".into())));
        assert!(!a.has_engine(&SlideId("c".into())));
        assert_eq!(source(&virt, 2), None);
    }

    #[test]
    fn module_failure_falls_back_and_allows_retry() {
        let (mut a, mut virt, feed) = setup(ModuleLoad::Deferred, false);
        let s = SessionState::new(false);
        let h = virt.handle_of(0).unwrap();
        a.attach(h, &mut virt, &feed, &s);
        a.on_module_loaded(Err(EngineError::Load("offline".into())), &mut virt, &feed);
        assert_eq!(source(&virt, 0), Some(&MediaSource::mp4("/a.mp4")));
        let third = virt.handle_of(2).unwrap();
        assert_eq!(a.attach(third, &mut virt, &feed, &s), AttachOutcome::EnginePending);
        assert_eq!(a.factory().load_requests, 2);
    }

    #[test]
    fn fatal_engine_error_destroys_and_falls_back() {
        let (mut a, mut virt, feed) = setup(ModuleLoad::Immediate, false);
        let h = virt.handle_of(2).unwrap();
        a.attach(h, &mut virt, &feed, &SessionState::new(false));
        let id = SlideId("c".into());
        a.on_engine_error(&id, false, &mut virt, &feed);
        assert!(a.has_engine(&id));
        a.on_engine_error(&id, true, &mut virt, &feed);
        assert!(!a.has_engine(&id));
        assert_eq!(a.factory().live_engines(), 0);
        assert_eq!(source(&virt, 2), Some(&MediaSource::mp4("https://cdn.example/c.mp4")));
    }

    #[test]
    fn clones_never_attach() {
        let (mut a, mut virt, feed) = setup(ModuleLoad::Immediate, false);
        let clone = virt.leading_clone().unwrap();
        assert_eq!(a.attach(clone, &mut virt, &feed, &SessionState::new(true)), AttachOutcome::NotCanonical);
    }
}
