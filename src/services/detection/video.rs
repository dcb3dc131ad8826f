// Video Detector
// Samples frames across the clip, scores them as stills and adds a temporal
// consistency signal before the usual escalation

use crate::models::{
    ContentType, DecisionStage, DetectionResult, PixelBuffer, RemotePayload, SubScores,
};
use crate::services::backends::{try_inference, SharedBackend};
use crate::services::config_store::TemporalConfig;
use crate::services::fingerprint::fingerprint_url;
use crate::services::pixels::{downsample, encode_png_data_url, extract_features, luminance_plane};
use async_trait::async_trait;
use std::sync::Arc;
use tracing::{debug, info};

use super::cascade::Cascade;
use super::image::pixel_synthetic_score;
use super::url_patterns::match_generator_url;
use super::{Detector, DetectorOptions, VideoContent};

/// Host-side access to a playing video.
#[async_trait]
pub trait FrameSource: Send + Sync {
    /// Duration in seconds, when known.
    fn duration(&self) -> Option<f64>;

    /// Frame at `t` seconds; `None` when seeking or reading pixels failed.
    async fn capture_frame(&self, t: f64) -> Option<PixelBuffer>;
}

/// Evenly spaced sample times that avoid the first and last instant.
pub fn sample_times(duration: f64, count: usize) -> Vec<f64> {
    if count == 0 || !duration.is_finite() || duration <= 0.0 {
        return Vec::new();
    }
    (0..count)
        .map(|i| duration * (i + 1) as f64 / (count + 1) as f64)
        .collect()
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TemporalSignal {
    /// Mean absolute luminance change between consecutive frames.
    pub mean_diff: f64,
    /// Spread of those changes.
    pub jitter: f64,
}

/// Frame-to-frame luminance statistics. Needs two or more frames of equal size.
pub fn temporal_signal(frames: &[PixelBuffer]) -> Option<TemporalSignal> {
    let planes: Vec<(usize, usize, Vec<f64>)> = frames
        .iter()
        .map(|f| (f.width, f.height, luminance_plane(f)))
        .collect();
    let diffs: Vec<f64> = planes
        .windows(2)
        .filter(|w| w[0].0 == w[1].0 && w[0].1 == w[1].1 && !w[0].2.is_empty())
        .map(|w| {
            let total: f64 = w[0].2.iter().zip(&w[1].2).map(|(a, b)| (a - b).abs()).sum();
            total / w[0].2.len() as f64
        })
        .collect();
    if diffs.is_empty() {
        return None;
    }
    let n = diffs.len() as f64;
    let mean_diff = diffs.iter().sum::<f64>() / n;
    let variance = diffs.iter().map(|d| (d - mean_diff).powi(2)).sum::<f64>() / n;
    Some(TemporalSignal {
        mean_diff,
        jitter: variance.sqrt(),
    })
}

/// Nudge added for generator-typical motion: near-static clips or erratic flicker.
pub fn temporal_nudge(signal: &TemporalSignal, config: &TemporalConfig) -> f64 {
    if signal.mean_diff < config.low_motion_threshold || signal.jitter > config.jitter_threshold {
        config.nudge
    } else {
        0.0
    }
}

pub struct VideoDetector {
    cascade: Cascade,
    backend: Option<SharedBackend>,
}

impl VideoDetector {
    pub fn new(cascade: Cascade, backend: Option<SharedBackend>) -> Self {
        Self { cascade, backend }
    }

    async fn capture_frames(&self, source: &dyn FrameSource, options: &DetectorOptions) -> Vec<PixelBuffer> {
        let config = self.cascade.config();
        let Some(duration) = source.duration() else {
            debug!("[VIDEO] duration unknown, no frames sampled");
            return Vec::new();
        };
        let max_dim = config.analysis_max_dim.get(options.tier);
        let mut frames = Vec::new();
        for t in sample_times(duration, config.video_frames.get(options.tier)) {
            match tokio::time::timeout(config.frame_timeout(), source.capture_frame(t)).await {
                Ok(Some(frame)) if !frame.is_empty() => frames.push(downsample(&frame, max_dim)),
                Ok(_) => debug!("[VIDEO] frame at {:.2}s unavailable", t),
                Err(_) => debug!("[VIDEO] frame at {:.2}s timed out", t),
            }
        }
        frames
    }

    async fn mean_model_score(&self, frames: &[PixelBuffer]) -> Option<f64> {
        let backend = self.backend.as_ref()?;
        let timeout = self.cascade.config().inference_timeout();
        let mut scores = Vec::with_capacity(frames.len());
        for frame in frames {
            let features = extract_features(frame);
            if let Some(p) = try_inference(backend.as_ref(), frame, &features, timeout).await {
                scores.push(p);
            }
        }
        if scores.is_empty() {
            None
        } else {
            Some(scores.iter().sum::<f64>() / scores.len() as f64)
        }
    }
}

#[async_trait]
impl Detector for VideoDetector {
    type Input = VideoContent;

    fn content_type(&self) -> ContentType {
        ContentType::Video
    }

    async fn detect(&self, content: &VideoContent, options: &DetectorOptions) -> Arc<DetectionResult> {
        let config = self.cascade.config();
        let key = content.url.as_deref().map(|u| (ContentType::Video, fingerprint_url(u)));
        if let Some(hit) = key.as_ref().and_then(|k| self.cascade.cached(k)) {
            return hit;
        }

        let finish = |result: DetectionResult| match key {
            Some(k) => self.cascade.store(k, result),
            None => Arc::new(result),
        };

        if let Some(generator) = content.url.as_deref().and_then(|u| match_generator_url(u, ContentType::Video)) {
            info!("[VIDEO] url pattern match: {}", generator);
            return finish(self.cascade.local_verdict(
                ContentType::Video,
                config.url_match_score,
                DecisionStage::UrlPattern,
                vec![format!("hosted on a {} domain", generator)],
            ));
        }

        let frames = match &content.frames {
            Some(source) => self.capture_frames(source.as_ref(), options).await,
            None => Vec::new(),
        };

        let mut sub = SubScores::default();
        let mut reasons = Vec::new();
        let mut stage = DecisionStage::LocalHeuristics;

        let mut local = if frames.is_empty() {
            reasons.push("no frames could be sampled".to_string());
            stage = DecisionStage::Unanalyzable;
            config.unanalyzable_score
        } else {
            frames
                .iter()
                .map(|f| pixel_synthetic_score(&extract_features(f), &config.pixel_weights))
                .sum::<f64>()
                / frames.len() as f64
        };

        if let Some(signal) = temporal_signal(&frames) {
            sub.temporal = Some(signal.mean_diff);
            let nudge = temporal_nudge(&signal, &config.temporal);
            if nudge > 0.0 {
                local = (local + nudge).min(1.0);
                reasons.push(format!(
                    "unnatural motion (mean change {:.2}, jitter {:.2})",
                    signal.mean_diff, signal.jitter
                ));
            }
        }

        if let Some(p) = self.mean_model_score(&frames).await {
            sub.model = Some(p);
            local = (1.0 - config.model_weight) * local + config.model_weight * p;
            stage = DecisionStage::OnDeviceModel;
            reasons.push(format!("on-device model {:.2} across frames", p));
        }
        sub.local = Some(local);

        let escalation = self
            .cascade
            .escalate(ContentType::Video, local, options, || RemotePayload {
                url: content.url.clone(),
                frames: frames.iter().filter_map(encode_png_data_url).collect(),
                ..Default::default()
            })
            .await;

        let result = self
            .cascade
            .calibrate(ContentType::Video, local, stage, escalation, sub, reasons);
        info!(
            "[VIDEO] frames={} local={:.3} final={:.3} source={:?} ai={}",
            frames.len(),
            local,
            result.score,
            result.source,
            result.is_ai_generated
        );
        finish(result)
    }
}
