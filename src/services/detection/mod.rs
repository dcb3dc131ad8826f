// Detection Module
// Cost-bounded AI-content detection organized into specialized submodules:
// - cascade: cache, escalation decision, remote stage and calibration shared by all detectors
// - url_patterns: known generator-hosting URLs per content type
// - text / image / video / audio: one detector per content type
// - pipeline: routes a content item to its detector

pub mod audio;
pub mod cascade;
pub mod image;
pub mod pipeline;
pub mod text;
pub mod url_patterns;
pub mod video;

use crate::models::{ContentType, DetectionResult, PixelBuffer, QualityTier};
use crate::services::providers::RemoteClassifier;
use async_trait::async_trait;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

pub use audio::AudioDetector;
pub use cascade::{Cascade, CacheKey, Escalation, SharedCache};
pub use image::{pixel_synthetic_score, ImageDetector};
pub use pipeline::Pipeline;
pub use text::{text_heuristic_score, TextDetector};
pub use url_patterns::{host_matches, match_generator_url};
pub use video::{FrameSource, VideoDetector};

/// Fetches raw bytes of a resource the host cannot read directly.
/// `None` means "proceed without", never an error.
#[async_trait]
pub trait ByteFetcher: Send + Sync {
    async fn fetch_bytes(&self, url: &str) -> Option<Vec<u8>>;
}

/// Fetch with a bounded wait; a stalled fetcher counts as unavailable.
pub(crate) async fn fetch_with_timeout(fetcher: &dyn ByteFetcher, url: &str, timeout: Duration) -> Option<Vec<u8>> {
    match tokio::time::timeout(timeout, fetcher.fetch_bytes(url)).await {
        Ok(bytes) => bytes,
        Err(_) => {
            debug!("[FETCH] timed out after {:?}: {}", timeout, url);
            None
        }
    }
}

/// Per-call options. Remote and fetch strategies are supplied by the caller.
#[derive(Clone, Default)]
pub struct DetectorOptions {
    pub allow_remote: bool,
    pub tier: QualityTier,
    pub endpoint: Option<String>,
    pub api_key: Option<String>,
    pub remote: Option<Arc<dyn RemoteClassifier>>,
    pub fetcher: Option<Arc<dyn ByteFetcher>>,
}

impl DetectorOptions {
    pub fn allow_remote(mut self, allow: bool) -> Self {
        self.allow_remote = allow;
        self
    }

    pub fn tier(mut self, tier: QualityTier) -> Self {
        self.tier = tier;
        self
    }

    pub fn with_remote(mut self, remote: Arc<dyn RemoteClassifier>, endpoint: impl Into<String>) -> Self {
        self.remote = Some(remote);
        self.endpoint = Some(endpoint.into());
        self
    }

    pub fn api_key(mut self, key: impl Into<String>) -> Self {
        self.api_key = Some(key.into());
        self
    }

    pub fn with_fetcher(mut self, fetcher: Arc<dyn ByteFetcher>) -> Self {
        self.fetcher = Some(fetcher);
        self
    }
}

impl fmt::Debug for DetectorOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DetectorOptions")
            .field("allow_remote", &self.allow_remote)
            .field("tier", &self.tier)
            .field("endpoint", &self.endpoint)
            .field("api_key", &self.api_key.as_ref().map(|_| "<redacted>"))
            .field("remote", &self.remote.is_some())
            .field("fetcher", &self.fetcher.is_some())
            .finish()
    }
}

#[derive(Debug, Clone, Default)]
pub struct ImageContent {
    pub url: Option<String>,
    /// Decoded pixels when the host could read them.
    pub pixels: Option<PixelBuffer>,
    /// Encoded container bytes, used for metadata and as a pixel fallback.
    pub bytes: Option<Vec<u8>>,
}

#[derive(Clone, Default)]
pub struct VideoContent {
    pub url: Option<String>,
    pub frames: Option<Arc<dyn FrameSource>>,
}

impl fmt::Debug for VideoContent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("VideoContent")
            .field("url", &self.url)
            .field("frames", &self.frames.is_some())
            .finish()
    }
}

#[derive(Debug, Clone, Default)]
pub struct AudioContent {
    pub url: Option<String>,
}

/// One item of consumed content; the variant selects the detector.
#[derive(Debug, Clone)]
pub enum Content {
    Text(String),
    Image(ImageContent),
    Video(VideoContent),
    Audio(AudioContent),
}

impl Content {
    pub fn content_type(&self) -> ContentType {
        match self {
            Self::Text(_) => ContentType::Text,
            Self::Image(_) => ContentType::Image,
            Self::Video(_) => ContentType::Video,
            Self::Audio(_) => ContentType::Audio,
        }
    }
}

#[async_trait]
pub trait Detector: Send + Sync {
    type Input: ?Sized + Sync;

    fn content_type(&self) -> ContentType;

    async fn detect(&self, input: &Self::Input, options: &DetectorOptions) -> Arc<DetectionResult>;
}
