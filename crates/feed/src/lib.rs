use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;
use thiserror::Error;
use tracing::warn;

mod comment;
mod format;

pub use comment::{relative_age, Comment, RelativeAge};
pub use format::format_count;

#[derive(Debug, Error)]
pub enum FeedError {
    #[error("malformed slide: {0}")]
    MalformedSlide(String),
    #[error("payload is not a slide list")]
    NotAList,
    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SlideId(pub String);

/// Server-side post id used by the like and comment endpoints. Always carried as a numeric string.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct LikeId(pub String);

impl LikeId {
    pub fn new(id: impl Into<String>) -> Self { Self(id.into()) }
    pub fn as_str(&self) -> &str { &self.0 }
}

impl std::fmt::Display for LikeId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result { f.write_str(&self.0) }
}

impl std::fmt::Display for SlideId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result { f.write_str(&self.0) }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AccessTier {
    #[serde(rename = "public")]
    Public,
    #[serde(rename = "secret", alias = "restricted")]
    Restricted,
}

impl AccessTier {
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim() {
            "public" => Some(Self::Public),
            "secret" | "restricted" => Some(Self::Restricted),
            _ => None,
        }
    }

    pub fn is_restricted(self) -> bool { matches!(self, Self::Restricted) }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MediaLocations {
    pub stream_url: Option<String>,
    pub progressive_url: String,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SocialCounters {
    pub likes: u64,
    pub liked_by_viewer: bool,
    pub comments: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Slide {
    pub id: SlideId,
    pub like_id: LikeId,
    /// Position in the canonical (non-cloned) list.
    pub index: usize,
    pub author: String,
    pub description: String,
    pub media: MediaLocations,
    pub poster: Option<String>,
    pub avatar: String,
    pub access: AccessTier,
    pub counters: SocialCounters,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LikeStatus {
    Liked,
    Unliked,
}

/// Reply of the like toggle endpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct LikeToggle {
    pub status: LikeStatus,
    #[serde(deserialize_with = "count_from_any")]
    pub count: u64,
}

impl LikeToggle {
    pub fn liked(&self) -> bool { matches!(self.status, LikeStatus::Liked) }
}

/// One entry of the slide feed as the server sends it.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawSlide {
    id: Option<String>,
    #[serde(default, deserialize_with = "opt_string_from_any")]
    like_id: Option<String>,
    #[serde(default)]
    user: String,
    #[serde(default)]
    description: String,
    mp4_url: Option<String>,
    hls_url: Option<String>,
    poster: Option<String>,
    #[serde(default)]
    avatar: String,
    access: Option<String>,
    #[serde(default, deserialize_with = "count_from_any")]
    initial_likes: u64,
    #[serde(default)]
    is_liked: bool,
    #[serde(default, deserialize_with = "count_from_any")]
    initial_comments: u64,
}

impl RawSlide {
    fn into_slide(self, index: usize) -> Result<Slide, FeedError> {
        let like_id = non_empty(self.like_id).ok_or_else(|| FeedError::MalformedSlide("missing likeId".into()))?;
        let id = non_empty(self.id).unwrap_or_else(|| format!("slide-{like_id:0>3}"));
        let progressive_url = non_empty(self.mp4_url)
            .ok_or_else(|| FeedError::MalformedSlide(format!("slide {id} has no progressive url")))?;
        let access = match self.access.as_deref() {
            None => AccessTier::Public,
            Some(raw) => AccessTier::parse(raw)
                .ok_or_else(|| FeedError::MalformedSlide(format!("slide {id} has unknown access tier {raw:?}")))?,
        };
        Ok(Slide {
            id: SlideId(id),
            like_id: LikeId(like_id),
            index,
            author: self.user,
            description: self.description,
            media: MediaLocations { stream_url: non_empty(self.hls_url), progressive_url },
            poster: non_empty(self.poster),
            avatar: self.avatar,
            access,
            counters: SocialCounters {
                likes: self.initial_likes,
                liked_by_viewer: self.is_liked,
                comments: self.initial_comments,
            },
        })
    }
}

fn non_empty(s: Option<String>) -> Option<String> {
    s.map(|s| s.trim().to_string()).filter(|s| !s.is_empty())
}

fn opt_string_from_any<'de, D: Deserializer<'de>>(d: D) -> Result<Option<String>, D::Error> {
    Ok(match Value::deserialize(d)? {
        Value::String(s) => Some(s),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    })
}

pub(crate) fn count_from_any<'de, D: Deserializer<'de>>(d: D) -> Result<u64, D::Error> {
    Ok(match Value::deserialize(d)? {
        Value::Number(n) => n.as_u64().unwrap_or(0),
        Value::String(s) => s.trim().parse().unwrap_or(0),
        _ => 0,
    })
}

/// The ordered, canonical slide list for one session.
#[derive(Debug, Clone, Default)]
pub struct Feed {
    slides: Vec<Slide>,
}

impl Feed {
    pub fn new(slides: Vec<Slide>) -> Self {
        let mut feed = Self { slides };
        for (i, s) in feed.slides.iter_mut().enumerate() { s.index = i; }
        feed
    }

    /// Decodes the server's slide list. Entries that fail to decode are dropped, never partially kept.
    pub fn from_value(value: Value) -> Result<Self, FeedError> {
        let Value::Array(items) = value else { return Err(FeedError::NotAList) };
        let mut slides = Vec::with_capacity(items.len());
        for item in items {
            let decoded = serde_json::from_value::<RawSlide>(item)
                .map_err(FeedError::from)
                .and_then(|raw| raw.into_slide(slides.len()));
            match decoded {
                Ok(slide) => slides.push(slide),
                Err(e) => warn!("dropping slide: {e}"),
            }
        }
        Ok(Self { slides })
    }

    pub fn from_json(payload: &str) -> Result<Self, FeedError> {
        let value: Value = serde_json::from_str(payload)?;
        // Initial page payloads wrap the list as {"slides": [...]}.
        match value {
            Value::Object(mut obj) if obj.contains_key("slides") => {
                Self::from_value(obj.remove("slides").unwrap_or(Value::Null))
            }
            other => Self::from_value(other),
        }
    }

    pub fn len(&self) -> usize { self.slides.len() }
    pub fn is_empty(&self) -> bool { self.slides.is_empty() }
    pub fn get(&self, index: usize) -> Option<&Slide> { self.slides.get(index) }
    pub fn get_mut(&mut self, index: usize) -> Option<&mut Slide> { self.slides.get_mut(index) }
    pub fn iter(&self) -> impl Iterator<Item = &Slide> { self.slides.iter() }

    pub fn by_like_id(&self, like_id: &LikeId) -> Option<&Slide> {
        self.slides.iter().find(|s| &s.like_id == like_id)
    }

    pub fn by_like_id_mut(&mut self, like_id: &LikeId) -> Option<&mut Slide> {
        self.slides.iter_mut().find(|s| &s.like_id == like_id)
    }

    pub fn index_of_slide(&self, id: &SlideId) -> Option<usize> {
        self.slides.iter().position(|s| &s.id == id)
    }

    /// Copies like state from a re-fetched feed onto matching slides. Returns the like ids that changed.
    pub fn merge_refresh(&mut self, fresh: &Feed) -> Vec<LikeId> {
        let mut changed = Vec::new();
        for slide in self.slides.iter_mut() {
            let Some(update) = fresh.by_like_id(&slide.like_id) else { continue };
            let c = &mut slide.counters;
            if c.liked_by_viewer != update.counters.liked_by_viewer || c.likes != update.counters.likes {
                c.liked_by_viewer = update.counters.liked_by_viewer;
                c.likes = update.counters.likes;
                changed.push(slide.like_id.clone());
            }
        }
        changed
    }
}
