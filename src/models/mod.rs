// SynthGuard Data Models
// Result, request and signal types shared by every stage of the cascade

use serde::{Deserialize, Serialize};

// ============ Content & Tier Tags ============

#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ContentType {
    Image,
    Video,
    Text,
    Audio,
}

impl ContentType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Image => "image",
            Self::Video => "video",
            Self::Text => "text",
            Self::Audio => "audio",
        }
    }

    pub fn parse(val: &str) -> Option<Self> {
        match val.trim().to_ascii_lowercase().as_str() {
            "image" | "img" => Some(Self::Image),
            "video" => Some(Self::Video),
            "text" => Some(Self::Text),
            "audio" => Some(Self::Audio),
            _ => None,
        }
    }
}

/// Analysis resolution and remote-call budget selector.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum QualityTier {
    Low,
    #[default]
    Medium,
    High,
}

impl QualityTier {
    /// Unknown values fall back to medium.
    pub fn parse(val: &str) -> Self {
        match val.trim().to_ascii_lowercase().as_str() {
            "low" => Self::Low,
            "high" => Self::High,
            _ => Self::Medium,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Low => "low",
            Self::Medium => "medium",
            Self::High => "high",
        }
    }
}

// ============ Detection Result ============

pub const HIGH_CONFIDENCE_CUT: f64 = 0.65;
pub const MEDIUM_CONFIDENCE_CUT: f64 = 0.35;

#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Confidence {
    Low,
    Medium,
    High,
}

impl Confidence {
    pub fn from_score(score: f64) -> Self {
        if score >= HIGH_CONFIDENCE_CUT {
            Self::High
        } else if score >= MEDIUM_CONFIDENCE_CUT {
            Self::Medium
        } else {
            Self::Low
        }
    }
}

#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResultSource {
    Local,
    Remote,
}

/// Which step of the cascade produced the final verdict.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DecisionStage {
    TooShort,
    /// Nothing could be read from the content; only the remote stage may flag it.
    Unanalyzable,
    UrlPattern,
    PhotorealismGate,
    LocalHeuristics,
    OnDeviceModel,
    Remote,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubScores {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub local: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub photorealism: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub camera_metadata: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub provenance: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub model: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub temporal: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub remote: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DetectionResult {
    pub content_type: ContentType,
    pub is_ai_generated: bool,
    pub confidence: Confidence,
    /// Always within [0, 1].
    pub score: f64,
    pub source: ResultSource,
    pub stage: DecisionStage,
    #[serde(default)]
    pub sub_scores: SubScores,
    #[serde(default)]
    pub explanations: Vec<String>,
}

impl DetectionResult {
    /// Build a result from a raw score. The score is clamped and the
    /// confidence bucket derived from it; `threshold` sets the verdict.
    pub fn new(
        content_type: ContentType,
        score: f64,
        threshold: f64,
        source: ResultSource,
        stage: DecisionStage,
    ) -> Self {
        let score = if score.is_finite() { score.clamp(0.0, 1.0) } else { 0.0 };
        Self {
            content_type,
            is_ai_generated: score >= threshold,
            confidence: Confidence::from_score(score),
            score,
            source,
            stage,
            sub_scores: SubScores::default(),
            explanations: Vec::new(),
        }
    }

    pub fn with_sub_scores(mut self, sub_scores: SubScores) -> Self {
        self.sub_scores = sub_scores;
        self
    }

    pub fn with_explanations(mut self, explanations: Vec<String>) -> Self {
        self.explanations = explanations;
        self
    }
}

// ============ Pixels & Image Signals ============

/// Row-major RGBA8 pixel buffer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PixelBuffer {
    pub width: usize,
    pub height: usize,
    pub data: Vec<u8>,
}

impl PixelBuffer {
    /// Returns `None` when the data length does not match `width * height * 4`.
    pub fn new(width: usize, height: usize, data: Vec<u8>) -> Option<Self> {
        if width.checked_mul(height)?.checked_mul(4)? != data.len() {
            return None;
        }
        Some(Self { width, height, data })
    }

    pub fn pixel_count(&self) -> usize {
        self.width * self.height
    }

    pub fn is_empty(&self) -> bool {
        self.pixel_count() == 0
    }

    #[inline]
    pub fn rgba(&self, x: usize, y: usize) -> [u8; 4] {
        let i = (y * self.width + x) * 4;
        [self.data[i], self.data[i + 1], self.data[i + 2], self.data[i + 3]]
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PhotorealismResult {
    pub is_photorealistic: bool,
    pub score: f64,
    pub tier: QualityTier,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CameraMetadata {
    pub make: Option<String>,
    pub model: Option<String>,
    pub software: Option<String>,
    pub lens_model: Option<String>,
    /// Seconds.
    pub exposure_time: Option<f64>,
    pub f_number: Option<f64>,
    pub iso: Option<u32>,
    pub has_gps: bool,
}

impl CameraMetadata {
    pub fn has_camera_hardware(&self) -> bool {
        self.make.is_some() || self.model.is_some()
    }
}

#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProvenancePresence {
    Present,
    Absent,
    Unknown,
}

#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ContainerFormat {
    Jpeg,
    Png,
    Webp,
    Other,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProvenanceResult {
    pub presence: ProvenancePresence,
    pub format: Option<ContainerFormat>,
    /// Never positive: a manifest is evidence of authenticity, its absence is neutral.
    pub score_adjustment: f64,
}

/// Named pixel statistics handed to on-device backends next to the raw buffer.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FeatureVector {
    /// Normalized to [0, 1] by log2(32).
    pub channel_entropy: f64,
    pub unique_colors: usize,
    pub edge_complexity: f64,
    pub block_variance: f64,
    pub saturation_variance: f64,
    pub gradient_smoothness: f64,
    pub noise_floor: f64,
    pub hf_energy_ratio: f64,
    pub laplacian_sparsity: f64,
    pub channel_uniformity: f64,
}

// ============ Remote Classification ============

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RemotePayload {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
    /// Data URL of an encoded image.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub image: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub frames: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RemoteVerdict {
    pub score: f64,
    pub label: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_confidence_cut_points() {
        assert_eq!(Confidence::from_score(0.65), Confidence::High);
        assert_eq!(Confidence::from_score(0.6499), Confidence::Medium);
        assert_eq!(Confidence::from_score(0.35), Confidence::Medium);
        assert_eq!(Confidence::from_score(0.3499), Confidence::Low);
        assert_eq!(Confidence::from_score(0.0), Confidence::Low);
    }

    #[test]
    fn test_result_score_is_clamped() {
        let high = DetectionResult::new(
            ContentType::Image,
            1.7,
            0.5,
            ResultSource::Local,
            DecisionStage::LocalHeuristics,
        );
        assert_eq!(high.score, 1.0);
        assert_eq!(high.confidence, Confidence::High);

        let nan = DetectionResult::new(
            ContentType::Text,
            f64::NAN,
            0.5,
            ResultSource::Local,
            DecisionStage::LocalHeuristics,
        );
        assert_eq!(nan.score, 0.0);
        assert!(!nan.is_ai_generated);
    }

    #[test]
    fn test_pixel_buffer_rejects_bad_length() {
        assert!(PixelBuffer::new(2, 2, vec![0; 16]).is_some());
        assert!(PixelBuffer::new(2, 2, vec![0; 15]).is_none());
    }

    #[test]
    fn test_tier_parse_defaults_to_medium() {
        assert_eq!(QualityTier::parse("HIGH"), QualityTier::High);
        assert_eq!(QualityTier::parse("bogus"), QualityTier::Medium);
    }

    #[test]
    fn test_payload_serialization_skips_empty_fields() {
        let payload = RemotePayload {
            url: Some("https://example.com/a.png".to_string()),
            ..Default::default()
        };
        let json = serde_json::to_value(&payload).unwrap();
        assert_eq!(json, serde_json::json!({"url": "https://example.com/a.png"}));
    }
}
