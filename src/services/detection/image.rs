// Image Detector
// URL patterns, the photorealism gate, pixel statistics, camera metadata and
// provenance, then the optional on-device model and remote escalation

use crate::models::{
    ContentType, DecisionStage, DetectionResult, FeatureVector, PixelBuffer, ProvenancePresence,
    ProvenanceResult, QualityTier, RemotePayload, SubScores,
};
use crate::services::backends::{try_inference, SharedBackend};
use crate::services::config_store::PixelScoreWeights;
use crate::services::fingerprint::{fingerprint_encoded_pixels, fingerprint_url};
use crate::services::metadata::{camera_ai_score, parse_camera_metadata, scan_provenance};
use crate::services::pixels::{
    decode_data_url, decode_image_bytes, downsample, encode_png_data_url, extract_features, knee,
    PhotorealismFilter,
};
use async_trait::async_trait;
use std::borrow::Cow;
use std::sync::Arc;
use tracing::{debug, info};

use super::cascade::Cascade;
use super::url_patterns::match_generator_url;
use super::{fetch_with_timeout, Detector, DetectorOptions, ImageContent};

/// Likelihood that pixels were synthesized, from the statistics generators
/// get wrong: too smooth, no sensor noise floor, little high-frequency
/// energy, piecewise-flat regions and identical noise across channels.
pub fn pixel_synthetic_score(features: &FeatureVector, weights: &PixelScoreWeights) -> f64 {
    let smooth = knee(features.gradient_smoothness, 0.5, 0.95);
    let clean_floor = 1.0 - knee(features.noise_floor, 0.5, 4.0);
    let low_hf = 1.0 - knee(features.hf_energy_ratio, 0.05, 0.30);
    let flat = knee(features.laplacian_sparsity, 0.5, 0.95);
    let uniform = knee(features.channel_uniformity, 0.6, 0.95);
    let total = weights.smoothness + weights.noise_floor + weights.hf_energy + weights.laplacian + weights.channel_uniformity;
    if total <= 0.0 {
        return 0.0;
    }
    let score = weights.smoothness * smooth
        + weights.noise_floor * clean_floor
        + weights.hf_energy * low_hf
        + weights.laplacian * flat
        + weights.channel_uniformity * uniform;
    (score / total).clamp(0.0, 1.0)
}

fn is_data_url(url: &str) -> bool {
    url.trim_start().get(..5).is_some_and(|p| p.eq_ignore_ascii_case("data:"))
}

struct MetadataSignals {
    camera_score: f64,
    provenance: ProvenanceResult,
}

pub struct ImageDetector {
    cascade: Cascade,
    filter: PhotorealismFilter,
    backend: Option<SharedBackend>,
}

impl ImageDetector {
    pub fn new(cascade: Cascade, backend: Option<SharedBackend>) -> Self {
        let filter = PhotorealismFilter::new(cascade.config().photorealism);
        Self {
            cascade,
            filter,
            backend,
        }
    }

    async fn metadata_signals(
        &self,
        bytes: Option<&[u8]>,
        url: Option<&str>,
        options: &DetectorOptions,
    ) -> Option<MetadataSignals> {
        let bytes: Cow<'_, [u8]> = match (bytes, url, &options.fetcher) {
            (Some(bytes), _, _) => Cow::Borrowed(bytes),
            (None, Some(url), Some(fetcher)) => {
                Cow::Owned(fetch_with_timeout(fetcher.as_ref(), url, self.cascade.config().fetch_timeout()).await?)
            }
            _ => return None,
        };
        if bytes.is_empty() {
            return None;
        }
        let camera = parse_camera_metadata(&bytes);
        Some(MetadataSignals {
            camera_score: camera_ai_score(camera.as_ref()),
            provenance: scan_provenance(&bytes),
        })
    }

    async fn infer(&self, pixels: &PixelBuffer, features: &FeatureVector) -> Option<f64> {
        let backend = self.backend.as_ref()?;
        try_inference(backend.as_ref(), pixels, features, self.cascade.config().inference_timeout()).await
    }
}

#[async_trait]
impl Detector for ImageDetector {
    type Input = ImageContent;

    fn content_type(&self) -> ContentType {
        ContentType::Image
    }

    async fn detect(&self, content: &ImageContent, options: &DetectorOptions) -> Arc<DetectionResult> {
        let config = self.cascade.config();
        let tier = options.tier;

        // Inline images carry their bytes in the URL itself.
        let inline = content.url.as_deref().filter(|u| is_data_url(u));
        let embedded = match (&content.bytes, inline) {
            (None, Some(url)) => decode_data_url(url),
            _ => None,
        };
        let bytes = content.bytes.as_deref().or(embedded.as_deref());
        let fetch_url = content.url.as_deref().filter(|_| inline.is_none());

        let decoded;
        let pixels = match &content.pixels {
            Some(p) => Some(p),
            None => {
                decoded = bytes.and_then(decode_image_bytes);
                decoded.as_ref()
            }
        };
        let analysis = pixels
            .filter(|p| !p.is_empty())
            .map(|p| downsample(p, config.analysis_max_dim.get(tier)));
        let mut encoded: Option<String> = None;

        let key = match (&content.url, &analysis) {
            (Some(url), _) => Some((ContentType::Image, fingerprint_url(url))),
            (None, Some(buf)) => {
                encoded = encode_png_data_url(buf);
                encoded
                    .as_deref()
                    .map(|e| (ContentType::Image, fingerprint_encoded_pixels(e)))
            }
            (None, None) => None,
        };
        if let Some(hit) = key.as_ref().and_then(|k| self.cascade.cached(k)) {
            return hit;
        }

        if let Some(generator) = content.url.as_deref().and_then(|u| match_generator_url(u, ContentType::Image)) {
            let result = self.cascade.local_verdict(
                ContentType::Image,
                config.url_match_score,
                DecisionStage::UrlPattern,
                vec![format!("hosted on a {} domain", generator)],
            );
            info!("[IMAGE] url pattern match: {}", generator);
            return match key {
                Some(k) => self.cascade.store(k, result),
                None => Arc::new(result),
            };
        }

        let mut sub = SubScores::default();
        let mut reasons = Vec::new();
        let mut stage = DecisionStage::LocalHeuristics;

        let features = analysis.as_ref().map(extract_features);
        let mut model: Option<f64> = None;
        let mut model_ran = false;
        if let (Some(buf), Some(f), QualityTier::High) = (&analysis, &features, tier) {
            model = self.infer(buf, f).await;
            model_ran = true;
        }

        let gate = self.filter.evaluate_with_model(analysis.as_ref(), tier, model);
        sub.photorealism = Some(gate.score);
        if !gate.is_photorealistic {
            let mut result = self.cascade.local_verdict(
                ContentType::Image,
                0.0,
                DecisionStage::PhotorealismGate,
                vec![format!("not photorealistic (score {:.2})", gate.score)],
            );
            result.sub_scores.photorealism = Some(gate.score);
            debug!("[IMAGE] gate rejected score={:.3}", gate.score);
            return match key {
                Some(k) => self.cascade.store(k, result),
                None => Arc::new(result),
            };
        }

        let mut local = match &features {
            Some(f) => pixel_synthetic_score(f, &config.pixel_weights),
            None => {
                reasons.push("pixels unavailable".to_string());
                config.unanalyzable_score
            }
        };

        let metadata = self.metadata_signals(bytes, fetch_url, options).await;
        if features.is_none() && metadata.is_none() {
            stage = DecisionStage::Unanalyzable;
        }
        if let Some(meta) = metadata {
            sub.camera_metadata = Some(meta.camera_score);
            sub.provenance = Some(meta.provenance.score_adjustment);
            local = (1.0 - config.exif_weight) * local
                + config.exif_weight * meta.camera_score
                + config.provenance_weight * meta.provenance.score_adjustment;
            if meta.camera_score == 0.0 {
                reasons.push("camera hardware recorded in metadata".to_string());
            } else if meta.camera_score > 0.5 {
                reasons.push("metadata names generator software".to_string());
            }
            if meta.provenance.presence == ProvenancePresence::Present {
                reasons.push("content credentials manifest present".to_string());
            }
            local = local.clamp(0.0, 1.0);
        }

        if let (Some(buf), Some(f)) = (&analysis, &features) {
            if !model_ran {
                model = self.infer(buf, f).await;
            }
            if let Some(p) = model {
                sub.model = Some(p);
                local = (1.0 - config.model_weight) * local + config.model_weight * p;
                stage = DecisionStage::OnDeviceModel;
                reasons.push(format!("on-device model {:.2}", p));
            }
        }
        sub.local = Some(local);

        let escalation = self
            .cascade
            .escalate(ContentType::Image, local, options, || RemotePayload {
                url: fetch_url.map(str::to_string),
                image: encoded
                    .or_else(|| analysis.as_ref().and_then(encode_png_data_url))
                    .or_else(|| inline.map(str::to_string)),
                ..Default::default()
            })
            .await;

        let result = self
            .cascade
            .calibrate(ContentType::Image, local, stage, escalation, sub, reasons);
        info!(
            "[IMAGE] local={:.3} final={:.3} source={:?} ai={} tier={}",
            local,
            result.score,
            result.source,
            result.is_ai_generated,
            tier.as_str()
        );
        match key {
            Some(k) => self.cascade.store(k, result),
            None => Arc::new(result),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Confidence, ResultSource};
    use crate::services::backends::test_backends::FixedBackend;
    use crate::services::config_store::{CascadeConfig, CascadeProfile};
    use crate::services::detection::cascade::test_support::*;
    use crate::services::detection::ByteFetcher;
    use crate::services::metadata::container::test_files::jpeg_with_segments;
    use crate::services::metadata::exif::test_exif::TiffBuilder;
    use crate::services::pixels::features::test_images::{noise, solid};
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct CountingFetcher {
        bytes: Vec<u8>,
        calls: AtomicUsize,
    }

    #[async_trait]
    impl ByteFetcher for CountingFetcher {
        async fn fetch_bytes(&self, _url: &str) -> Option<Vec<u8>> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Some(self.bytes.clone())
        }
    }

    fn pixels_only(buf: PixelBuffer) -> ImageContent {
        ImageContent {
            pixels: Some(buf),
            ..Default::default()
        }
    }

    fn expected_pixel_score(buf: &PixelBuffer) -> f64 {
        pixel_synthetic_score(&extract_features(buf), &PixelScoreWeights::default())
    }

    #[tokio::test]
    async fn test_generator_url_without_pixels_is_flagged_locally() {
        let detector = ImageDetector::new(test_cascade(), None);
        let remote = MockRemote::returning(0.0);
        let content = ImageContent {
            url: Some("https://cdn.midjourney.com/5f1e/grid_0.png".to_string()),
            ..Default::default()
        };
        let result = detector.detect(&content, &remote_options(remote.clone())).await;
        assert!(result.is_ai_generated);
        assert_eq!(result.source, ResultSource::Local);
        assert_eq!(result.stage, DecisionStage::UrlPattern);
        assert!(result.score >= 0.7);
        assert_eq!(remote.calls(), 0);
    }

    #[tokio::test]
    async fn test_confident_backend_yields_high_confidence_verdict() {
        let backend = Arc::new(FixedBackend::new(0.95));
        let detector = ImageDetector::new(test_cascade(), Some(backend.clone()));
        let content = ImageContent {
            url: Some("https://photos.example.org/holiday/beach.jpg".to_string()),
            pixels: Some(noise(64, 64, 21)),
            bytes: None,
        };
        let result = detector.detect(&content, &DetectorOptions::default()).await;
        assert!(result.is_ai_generated);
        assert_eq!(result.confidence, Confidence::High);
        assert_eq!(result.stage, DecisionStage::OnDeviceModel);
        assert_eq!(result.sub_scores.model, Some(0.95));
        assert_eq!(backend.calls(), 1);
    }

    #[tokio::test]
    async fn test_high_tier_runs_backend_once() {
        let backend = Arc::new(FixedBackend::new(0.95));
        let detector = ImageDetector::new(test_cascade(), Some(backend.clone()));
        let options = DetectorOptions::default().tier(QualityTier::High);
        let result = detector.detect(&pixels_only(noise(48, 48, 4)), &options).await;
        assert!(result.is_ai_generated);
        assert_eq!(backend.calls(), 1);
    }

    #[tokio::test]
    async fn test_flat_graphic_stops_at_gate() {
        let backend = Arc::new(FixedBackend::new(0.99));
        let detector = ImageDetector::new(test_cascade(), Some(backend.clone()));
        let result = detector
            .detect(&pixels_only(solid(32, 32, [20, 120, 220])), &DetectorOptions::default())
            .await;
        assert!(!result.is_ai_generated);
        assert_eq!(result.stage, DecisionStage::PhotorealismGate);
        assert_eq!(backend.calls(), 0);
    }

    #[tokio::test]
    async fn test_camera_metadata_lowers_score() {
        let img = noise(64, 64, 9);
        let pixel = expected_pixel_score(&img);
        let detector = ImageDetector::new(test_cascade(), None);
        let content = ImageContent {
            url: None,
            pixels: Some(img),
            bytes: Some(TiffBuilder::default().build_jpeg()),
        };
        let result = detector.detect(&content, &DetectorOptions::default()).await;
        assert_eq!(result.sub_scores.camera_metadata, Some(0.0));
        assert_eq!(result.sub_scores.provenance, Some(0.0));
        assert!((result.score - 0.85 * pixel).abs() < 1e-9);
    }

    #[tokio::test]
    async fn test_provenance_manifest_applies_adjustment() {
        let img = noise(64, 64, 10);
        let pixel = expected_pixel_score(&img);
        let mut manifest = b"\0\0\0\x20jumb\0\0\0\x18jumd".to_vec();
        manifest.extend_from_slice(b"c2pa");
        let detector = ImageDetector::new(test_cascade(), None);
        let content = ImageContent {
            url: None,
            pixels: Some(img),
            bytes: Some(jpeg_with_segments(&[(0xEB, manifest)])),
        };
        let result = detector.detect(&content, &DetectorOptions::default()).await;
        assert_eq!(result.sub_scores.provenance, Some(-0.30));
        let expected = (0.85 * pixel + 0.15 * 0.25 - 0.15).clamp(0.0, 1.0);
        assert!((result.score - expected).abs() < 1e-9);
    }

    #[tokio::test]
    async fn test_fetcher_supplies_metadata_bytes() {
        let fetcher = Arc::new(CountingFetcher {
            bytes: TiffBuilder::default().build_jpeg(),
            calls: AtomicUsize::new(0),
        });
        let detector = ImageDetector::new(test_cascade(), None);
        let content = ImageContent {
            url: Some("https://photos.example.org/a.jpg".to_string()),
            pixels: Some(noise(32, 32, 3)),
            bytes: None,
        };
        let options = DetectorOptions::default().with_fetcher(fetcher.clone());
        let result = detector.detect(&content, &options).await;
        assert_eq!(fetcher.calls.load(Ordering::SeqCst), 1);
        assert_eq!(result.sub_scores.camera_metadata, Some(0.0));
    }

    #[tokio::test]
    async fn test_rejected_remote_keeps_local_score_and_tokens() {
        let config = CascadeConfig::builder()
            .profile(ContentType::Image, CascadeProfile::new(0.0, 1.0, 0.3, 0.35))
            .build();
        let cascade = cascade_with(config);
        let detector = ImageDetector::new(cascade.clone(), None);
        let remote = MockRemote::rejecting();
        let options = remote_options(remote.clone());
        let img = noise(64, 64, 12);
        let pixel = expected_pixel_score(&img);
        let before = cascade.limiters().for_tier(options.tier).available();

        let result = detector.detect(&pixels_only(img), &options).await;
        assert_eq!(remote.calls(), 1);
        assert!((result.score - pixel).abs() < 1e-12);
        assert_eq!(result.source, ResultSource::Local);
        assert_eq!(cascade.limiters().for_tier(options.tier).available(), before);
    }

    #[tokio::test]
    async fn test_remote_payload_carries_encoded_pixels() {
        let config = CascadeConfig::builder()
            .profile(ContentType::Image, CascadeProfile::new(0.0, 1.0, 0.3, 0.35))
            .build();
        let detector = ImageDetector::new(cascade_with(config), None);
        let remote = MockRemote::returning(0.8);
        let result = detector
            .detect(&pixels_only(noise(16, 16, 2)), &remote_options(remote.clone()))
            .await;
        assert_eq!(result.source, ResultSource::Remote);
        let request = remote.last_request.lock().unwrap().clone().unwrap();
        assert!(request.payload.image.unwrap().starts_with("data:image/png;base64,"));
        assert!(request.payload.url.is_none());
    }

    #[tokio::test]
    async fn test_repeat_detection_hits_cache() {
        let backend = Arc::new(FixedBackend::new(0.5));
        let detector = ImageDetector::new(test_cascade(), Some(backend.clone()));
        let content = pixels_only(noise(32, 32, 7));
        let first = detector.detect(&content, &DetectorOptions::default()).await;
        let second = detector.detect(&content, &DetectorOptions::default()).await;
        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(backend.calls(), 1);
    }

    #[tokio::test]
    async fn test_blocked_pixels_are_not_flagged() {
        let detector = ImageDetector::new(test_cascade(), None);
        let content = ImageContent {
            url: Some("https://photos.example.org/family.jpg".to_string()),
            ..Default::default()
        };
        let result = detector.detect(&content, &DetectorOptions::default()).await;
        assert!(!result.is_ai_generated);
        assert_eq!(result.confidence, Confidence::Low);
        assert_eq!(result.stage, DecisionStage::Unanalyzable);
        assert!(result.explanations.iter().any(|e| e == "pixels unavailable"));

        let empty = detector.detect(&ImageContent::default(), &DetectorOptions::default()).await;
        assert!(!empty.is_ai_generated);
        assert_eq!(empty.stage, DecisionStage::Unanalyzable);
    }

    #[tokio::test]
    async fn test_blocked_pixels_still_escalate() {
        let detector = ImageDetector::new(test_cascade(), None);
        let remote = MockRemote::returning(0.95);
        let content = ImageContent {
            url: Some("https://photos.example.org/blocked.jpg".to_string()),
            ..Default::default()
        };
        let result = detector.detect(&content, &remote_options(remote.clone())).await;
        assert_eq!(remote.calls(), 1);
        assert!(result.is_ai_generated);
        assert_eq!(result.stage, DecisionStage::Remote);
        assert_eq!(result.sub_scores.local, Some(0.25));
    }

    #[tokio::test]
    async fn test_data_url_is_decoded_in_place() {
        let img = noise(24, 24, 31);
        let data_url = encode_png_data_url(&img).unwrap();
        let fetcher = Arc::new(CountingFetcher {
            bytes: Vec::new(),
            calls: AtomicUsize::new(0),
        });
        let detector = ImageDetector::new(test_cascade(), None);
        let content = ImageContent {
            url: Some(data_url),
            ..Default::default()
        };
        let options = DetectorOptions::default().with_fetcher(fetcher.clone());
        let result = detector.detect(&content, &options).await;
        assert_eq!(fetcher.calls.load(Ordering::SeqCst), 0);
        assert_eq!(result.stage, DecisionStage::LocalHeuristics);
        assert!(result.sub_scores.provenance.is_some());
        let pixel = expected_pixel_score(&img);
        assert!((result.score - (0.85 * pixel + 0.15 * 0.25)).abs() < 1e-9);
    }
}
