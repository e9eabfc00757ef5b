use std::cell::RefCell;
use std::path::PathBuf;
use std::rc::Rc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use std::{fs, thread};

use anyhow::{anyhow, bail, Context, Result};
use feed::{Feed, LikeStatus, LikeToggle, Slide};
use jobs::{EventQueue, JobSpec, JobStatus, JobsHandle, JobsRuntime};
use media_io::headless::{AutoplayPolicy, HeadlessEngine, HeadlessEngineFactory, HeadlessMedia, ModuleLoad};
use media_io::{EngineConfig, EngineError, EngineFactory, LoadStatus, MediaElement};
use player::{Event, FeedController, FeedHooks, IndicatorKey, MediaFactory, NavDirection, PlayerConfig, SlideKind};
use serde::Serialize;
use tracing::{debug, info};

const FRAME: Duration = Duration::from_millis(16);
const CLIP_SECONDS: f64 = 15.0;

pub struct SimOptions {
    pub feed: PathBuf,
    pub script: PathBuf,
    pub view_height: f64,
    pub logged_in: bool,
    pub engine_latency: Duration,
    pub native_hls: bool,
    pub block_autoplay: bool,
    pub config: PlayerConfig,
}

struct SimMedia {
    native_hls: bool,
    block_autoplay: bool,
}

impl MediaFactory for SimMedia {
    type Media = HeadlessMedia;

    fn create(&mut self, slide: &Slide, kind: SlideKind) -> HeadlessMedia {
        let label = match kind {
            SlideKind::Canonical { .. } => slide.id.to_string(),
            SlideKind::BoundaryClone { .. } => format!("{}~clone", slide.id),
        };
        let mut media = HeadlessMedia::new(label, CLIP_SECONDS);
        media.native_hls = self.native_hls;
        if self.block_autoplay {
            media.policy = AutoplayPolicy::Blocked;
        }
        media
    }
}

/// Engine factory whose module load runs on a background worker.
struct WorkerEngines {
    inner: HeadlessEngineFactory,
    jobs: JobsHandle<()>,
    latency: Duration,
    in_flight: Arc<AtomicUsize>,
}

impl EngineFactory for WorkerEngines {
    type Engine = HeadlessEngine;

    fn begin_load(&mut self) -> LoadStatus {
        self.inner.begin_load();
        let latency = self.latency;
        let spec = JobSpec::new("engine-module", move || {
            thread::sleep(latency);
            Ok(())
        });
        match self.jobs.enqueue(spec) {
            Ok(id) => {
                debug!(job = %id, "engine module load queued");
                self.in_flight.fetch_add(1, Ordering::SeqCst);
                LoadStatus::Pending
            }
            Err(e) => LoadStatus::Failed(EngineError::Load(e.to_string())),
        }
    }

    fn is_supported(&self) -> bool { self.inner.is_supported() }

    fn create(&mut self, config: &EngineConfig) -> Result<HeadlessEngine, EngineError> { self.inner.create(config) }
}

#[derive(Default)]
struct Transitions(Rc<RefCell<Vec<usize>>>);

impl FeedHooks for Transitions {
    fn slide_changed(&mut self, index: usize, slide: &Slide) {
        info!(index, slide = %slide.id, "slide changed");
        self.0.borrow_mut().push(index);
    }
}

#[derive(Debug, Serialize)]
pub struct SlideSummary {
    pub index: usize,
    pub id: String,
    pub attached: bool,
    pub playing: bool,
    pub source: Option<String>,
    pub current_time: f64,
    pub restricted_overlay: bool,
    pub pause_icon: bool,
}

#[derive(Debug, Serialize)]
pub struct Summary {
    pub current_index: Option<usize>,
    pub session: u64,
    pub transitions: Vec<usize>,
    pub logged_in: bool,
    pub autoplay_blocked: bool,
    pub scroll_top: f64,
    pub chrome_owner: Option<usize>,
    pub like_count: String,
    pub like_pressed: bool,
    pub progress_percent: f64,
    pub live_engines: usize,
    pub slides: Vec<SlideSummary>,
}

type SimController = FeedController<HeadlessMedia, WorkerEngines>;

struct Sim {
    controller: SimController,
    queue: EventQueue<Event>,
    jobs: JobsHandle<()>,
    in_flight: Arc<AtomicUsize>,
    now: Instant,
}

impl Sim {
    fn post(&mut self, event: Event) {
        self.queue.push(event);
        self.controller.pump(&self.queue);
    }

    /// Moves completed module loads onto the event queue, waiting up to `block_for` if one is outstanding.
    fn drain_jobs(&mut self, block_for: Duration) {
        let deadline = Instant::now() + block_for;
        loop {
            let remaining = deadline.saturating_duration_since(Instant::now());
            let event = if self.in_flight.load(Ordering::SeqCst) > 0 && !remaining.is_zero() {
                self.jobs.rx_events.recv_timeout(remaining).ok()
            } else {
                self.jobs.rx_events.try_recv().ok()
            };
            let Some(event) = event else { break };
            let result = match event.status {
                JobStatus::Done(()) => Ok(()),
                JobStatus::Failed(e) => Err(EngineError::Load(e)),
                JobStatus::Canceled => Err(EngineError::Load("canceled".into())),
                JobStatus::Pending | JobStatus::Running => continue,
            };
            self.in_flight.fetch_sub(1, Ordering::SeqCst);
            self.queue.push(Event::EngineModuleLoaded(result));
        }
        self.controller.pump(&self.queue);
    }

    fn wait(&mut self, total: Duration) {
        let mut left = total;
        while !left.is_zero() {
            let dt = left.min(FRAME);
            left -= dt;
            self.now += dt;
            let active = self.controller.active_handle();
            if let Some(h) = active {
                if let Some(m) = self.controller.media_mut(h) {
                    m.advance(dt.as_secs_f64());
                }
            }
            self.drain_jobs(dt);
            // Headless media never fires its own metadata event.
            if let Some(h) = active.filter(|h| self.controller.media(*h).is_some_and(|m| m.duration().is_some())) {
                if self.controller.chrome().bottom.progress.skeleton {
                    self.post(Event::MetadataLoaded { handle: h });
                }
            }
            let now = self.now;
            self.post(Event::Tick { now });
            self.post(Event::Frame { now });
        }
    }

    fn like(&mut self, status: LikeStatus, count: u64) -> Result<()> {
        let index = self.controller.session().current_index.ok_or_else(|| anyhow!("no active slide"))?;
        let like_id = self.controller.feed().get(index).map(|s| s.like_id.clone()).ok_or_else(|| anyhow!("no slide {index}"))?;
        self.post(Event::LikeResolved { like_id, result: LikeToggle { status, count } });
        Ok(())
    }

    fn run_line(&mut self, line: &str) -> Result<()> {
        let mut words = line.split_whitespace();
        let Some(cmd) = words.next() else { return Ok(()) };
        let arg = words.next();
        let now = self.now;
        match cmd {
            "gesture" => self.post(Event::Gesture { now }),
            "next" => self.post(Event::Navigate { direction: NavDirection::Next, now }),
            "prev" => self.post(Event::Navigate { direction: NavDirection::Previous, now }),
            "scroll" => {
                let delta: f64 = arg.ok_or_else(|| anyhow!("scroll needs a pixel delta"))?.parse()?;
                let offset = self.controller.container().scroll_top + delta;
                self.post(Event::Scroll { offset, now });
            }
            "wait" => {
                let ms: u64 = arg.ok_or_else(|| anyhow!("wait needs milliseconds"))?.parse()?;
                self.wait(Duration::from_millis(ms));
            }
            "tap" => self.post(Event::VideoTapped { now }),
            "login" => self.post(Event::LoginChanged { logged_in: true, now }),
            "logout" => self.post(Event::LoginChanged { logged_in: false, now }),
            "drag" => {
                let fraction: f64 = arg.ok_or_else(|| anyhow!("drag needs a fraction"))?.parse()?;
                let bar = &self.controller.chrome().bottom.progress;
                let x = bar.left + fraction * bar.width;
                self.post(Event::PointerDown { pointer: 1, x, now });
                self.post(Event::PointerUp { pointer: 1 });
            }
            "key" => {
                let key = match arg {
                    Some("left") => IndicatorKey::ArrowLeft,
                    Some("right") => IndicatorKey::ArrowRight,
                    Some("home") => IndicatorKey::Home,
                    Some("end") => IndicatorKey::End,
                    other => bail!("unknown key {other:?}"),
                };
                self.post(Event::Key { key, now });
            }
            "like" => {
                let status = match arg {
                    Some("liked") => LikeStatus::Liked,
                    Some("unliked") => LikeStatus::Unliked,
                    other => bail!("unknown like status {other:?}"),
                };
                let count: u64 = words.next().ok_or_else(|| anyhow!("like needs a count"))?.parse()?;
                self.like(status, count)?;
            }
            other => bail!("unknown command {other:?}"),
        }
        Ok(())
    }

    fn summary(&self, transitions: Vec<usize>) -> Summary {
        let c = &self.controller;
        let slides = c
            .virtualizer()
            .iter()
            .filter_map(|r| {
                let index = r.canonical_index()?;
                Some(SlideSummary {
                    index,
                    id: r.media.label.clone(),
                    attached: r.attached,
                    playing: !r.media.is_paused(),
                    source: r.media.source().map(|s| s.url.clone()),
                    current_time: r.media.current_time(),
                    restricted_overlay: r.restricted_overlay,
                    pause_icon: r.pause_icon_visible,
                })
            })
            .collect();
        Summary {
            current_index: c.session().current_index,
            session: c.session().session().value(),
            transitions,
            logged_in: c.session().logged_in,
            autoplay_blocked: c.session().autoplay_blocked,
            scroll_top: c.container().scroll_top,
            chrome_owner: c.chrome().owner().map(|h| h.0),
            like_count: c.chrome().side.like.count_text.clone(),
            like_pressed: c.chrome().side.like.pressed,
            progress_percent: c.chrome().bottom.progress.percent,
            live_engines: c.attachment().factory().inner.live_engines(),
            slides,
        }
    }
}

pub fn run(opts: SimOptions) -> Result<Summary> {
    let payload = fs::read_to_string(&opts.feed).with_context(|| format!("reading {}", opts.feed.display()))?;
    let feed = Feed::from_json(&payload).context("decoding feed")?;
    let script = fs::read_to_string(&opts.script).with_context(|| format!("reading {}", opts.script.display()))?;
    info!(slides = feed.len(), "simulating");

    let jobs = JobsRuntime::<()>::start(1);
    let in_flight = Arc::new(AtomicUsize::new(0));
    let engines = WorkerEngines {
        inner: HeadlessEngineFactory::new(ModuleLoad::Deferred),
        jobs: jobs.clone(),
        latency: opts.engine_latency,
        in_flight: in_flight.clone(),
    };
    let transitions = Transitions::default();
    let seen = transitions.0.clone();
    let mut media = SimMedia { native_hls: opts.native_hls, block_autoplay: opts.block_autoplay };
    let mut controller =
        FeedController::new(opts.config, feed, &mut media, engines, opts.view_height, opts.logged_in)?
            .with_hooks(Box::new(transitions));
    {
        let bar = &mut controller.chrome_mut().bottom.progress;
        bar.left = 0.0;
        bar.width = 100.0;
    }

    let now = Instant::now();
    let mut sim = Sim { controller, queue: EventQueue::new(), jobs, in_flight, now };
    sim.controller.start(now);

    for (n, raw) in script.lines().enumerate() {
        let line = raw.trim();
        if line.is_empty() || line.starts_with('#') { continue; }
        sim.run_line(line).with_context(|| format!("script line {}: {line}", n + 1))?;
    }
    sim.drain_jobs(Duration::ZERO);
    let transitions = seen.borrow().clone();
    Ok(sim.summary(transitions))
}
