// Detection Pipeline
// Owns one detector per content type over a shared cascade and routes content
// items to them; the host-facing entry point

use crate::models::DetectionResult;
use crate::services::backends::SharedBackend;
use crate::services::config_store::CascadeConfig;
use crate::services::rate_limiter::TierRateLimiters;
use crate::services::result_cache::ResultCache;
use std::collections::HashSet;
use std::sync::{Arc, Mutex};
use tracing::debug;

use super::cascade::{Cascade, SharedCache};
use super::{AudioDetector, Content, Detector, DetectorOptions, ImageDetector, TextDetector, VideoDetector};

pub struct Pipeline {
    cascade: Cascade,
    text: TextDetector,
    image: ImageDetector,
    video: VideoDetector,
    audio: AudioDetector,
    in_flight: Mutex<HashSet<String>>,
}

/// Releases an element id when its detection finishes or is dropped.
struct InFlightGuard<'a> {
    set: &'a Mutex<HashSet<String>>,
    id: String,
}

impl Drop for InFlightGuard<'_> {
    fn drop(&mut self) {
        self.set
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .remove(&self.id);
    }
}

impl Pipeline {
    pub fn new(config: CascadeConfig, backend: Option<SharedBackend>) -> Self {
        let limits = &config.rate_limits;
        let limiters = Arc::new(TierRateLimiters::new(limits.low, limits.medium, limits.high));
        let cache: SharedCache = Arc::new(ResultCache::new(config.cache_capacity, config.cache_ttl()));
        let cascade = Cascade::new(Arc::new(config), cache, limiters);
        Self {
            text: TextDetector::new(cascade.clone()),
            image: ImageDetector::new(cascade.clone(), backend.clone()),
            video: VideoDetector::new(cascade.clone(), backend),
            audio: AudioDetector::new(cascade.clone()),
            cascade,
            in_flight: Mutex::new(HashSet::new()),
        }
    }

    pub fn cascade(&self) -> &Cascade {
        &self.cascade
    }

    pub fn limiters(&self) -> &TierRateLimiters {
        self.cascade.limiters()
    }

    pub async fn detect(&self, content: &Content, options: &DetectorOptions) -> Arc<DetectionResult> {
        match content {
            Content::Text(text) => self.text.detect(text.as_str(), options).await,
            Content::Image(image) => self.image.detect(image, options).await,
            Content::Video(video) => self.video.detect(video, options).await,
            Content::Audio(audio) => self.audio.detect(audio, options).await,
        }
    }

    /// Like [`detect`](Self::detect), but skips an element that is already being
    /// analyzed, so repeated scans of the same page element never overlap.
    pub async fn detect_guarded(
        &self,
        element_id: &str,
        content: &Content,
        options: &DetectorOptions,
    ) -> Option<Arc<DetectionResult>> {
        let _guard = {
            let mut set = self.in_flight.lock().unwrap_or_else(|e| e.into_inner());
            if !set.insert(element_id.to_string()) {
                debug!("[PIPELINE] {} already in flight", element_id);
                return None;
            }
            InFlightGuard {
                set: &self.in_flight,
                id: element_id.to_string(),
            }
        };
        Some(self.detect(content, options).await)
    }

    pub fn is_in_flight(&self, element_id: &str) -> bool {
        self.in_flight
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .contains(element_id)
    }
}
