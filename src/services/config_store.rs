// Configuration Storage Service
// Cascade calibration with named defaults, plus config file read/write and version backup

use crate::models::{ContentType, QualityTier};
use crate::services::pixels::PhotorealismConfig;
use crate::services::rate_limiter::BucketLimits;
use crate::services::result_cache::{DEFAULT_CACHE_CAPACITY, DEFAULT_CACHE_TTL};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

// ============ Named Defaults ============

pub const DEFAULT_LOCAL_WEIGHT: f64 = 0.3;
pub const DEFAULT_REMOTE_WEIGHT: f64 = 0.7;
pub const DEFAULT_MODEL_WEIGHT: f64 = 0.7;
pub const DEFAULT_EXIF_WEIGHT: f64 = 0.15;
pub const DEFAULT_PROVENANCE_WEIGHT: f64 = 0.5;
pub const DEFAULT_URL_MATCH_SCORE: f64 = 0.9;
pub const DEFAULT_UNANALYZABLE_SCORE: f64 = 0.25;
pub const DEFAULT_AUDIO_UNMATCHED_SCORE: f64 = 0.3;
pub const DEFAULT_MIN_TEXT_CHARS: usize = 80;
pub const DEFAULT_FRAME_TIMEOUT_MS: u64 = 3_000;
pub const DEFAULT_FETCH_TIMEOUT_MS: u64 = 5_000;
pub const DEFAULT_INFERENCE_TIMEOUT_MS: u64 = 10_000;
pub const DEFAULT_REMOTE_TIMEOUT_MS: u64 = 20_000;
pub const DEFAULT_REMOTE_TOKEN_COST: u32 = 1;
pub const DEFAULT_LOW_MOTION_THRESHOLD: f64 = 1.5;
pub const DEFAULT_MOTION_JITTER_THRESHOLD: f64 = 4.0;
pub const DEFAULT_TEMPORAL_NUDGE: f64 = 0.15;

const BACKUPS_TO_KEEP: usize = 10;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("config I/O failed: {0}")]
    Io(#[from] std::io::Error),
    #[error("config parse failed: {0}")]
    Parse(#[from] serde_json::Error),
}

// ============ Cascade Calibration ============

/// Per-content-type escalation band and verdict thresholds.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CascadeProfile {
    /// Exclusive lower edge of the inconclusive band.
    pub band_low: f64,
    /// Exclusive upper edge of the inconclusive band.
    pub band_high: f64,
    /// Verdict threshold when no remote backend corroborated the score.
    pub local_threshold: f64,
    pub remote_threshold: f64,
}

impl CascadeProfile {
    pub const fn new(band_low: f64, band_high: f64, local_threshold: f64, remote_threshold: f64) -> Self {
        Self {
            band_low,
            band_high,
            local_threshold,
            remote_threshold,
        }
    }

    pub fn default_for(content_type: ContentType) -> Self {
        match content_type {
            ContentType::Image => Self::new(0.20, 0.70, 0.30, 0.35),
            ContentType::Video => Self::new(0.20, 0.70, 0.30, 0.35),
            ContentType::Text => Self::new(0.25, 0.65, 0.50, 0.50),
            ContentType::Audio => Self::new(0.15, 0.75, 0.50, 0.50),
        }
    }

    pub fn is_inconclusive(&self, score: f64) -> bool {
        score > self.band_low && score < self.band_high
    }
}

/// One value per quality tier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PerTier<T> {
    pub low: T,
    pub medium: T,
    pub high: T,
}

impl<T: Copy> PerTier<T> {
    pub fn get(&self, tier: QualityTier) -> T {
        match tier {
            QualityTier::Low => self.low,
            QualityTier::Medium => self.medium,
            QualityTier::High => self.high,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TemporalConfig {
    /// Mean frame-to-frame luminance delta below which motion is suspiciously low.
    pub low_motion_threshold: f64,
    /// Standard deviation of consecutive deltas above which motion is erratic.
    pub jitter_threshold: f64,
    /// Score added when either condition holds.
    pub nudge: f64,
}

impl Default for TemporalConfig {
    fn default() -> Self {
        Self {
            low_motion_threshold: DEFAULT_LOW_MOTION_THRESHOLD,
            jitter_threshold: DEFAULT_MOTION_JITTER_THRESHOLD,
            nudge: DEFAULT_TEMPORAL_NUDGE,
        }
    }
}

/// Weights of the pixel statistics in the synthetic-image score. Each term is
/// knee-mapped so that "looks generated" reads high.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PixelScoreWeights {
    pub smoothness: f64,
    pub noise_floor: f64,
    pub hf_energy: f64,
    pub laplacian: f64,
    pub channel_uniformity: f64,
}

impl Default for PixelScoreWeights {
    fn default() -> Self {
        Self {
            smoothness: 0.25,
            noise_floor: 0.20,
            hf_energy: 0.20,
            laplacian: 0.15,
            channel_uniformity: 0.20,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct CascadeConfig {
    pub cache_capacity: usize,
    pub cache_ttl_secs: u64,
    pub rate_limits: PerTier<BucketLimits>,
    pub image: CascadeProfile,
    pub video: CascadeProfile,
    pub text: CascadeProfile,
    pub audio: CascadeProfile,
    pub local_weight: f64,
    pub remote_weight: f64,
    /// Weight of the on-device model against the local score.
    pub model_weight: f64,
    /// Weight of the camera-metadata score in the image local score.
    pub exif_weight: f64,
    /// Multiplier applied to the provenance adjustment.
    pub provenance_weight: f64,
    pub url_match_score: f64,
    /// Local score for content with nothing to analyze. It sits inside the
    /// escalation bands and is never flagged without the remote stage.
    pub unanalyzable_score: f64,
    /// Local score for audio that matches no generator signal.
    pub audio_unmatched_score: f64,
    pub pixel_weights: PixelScoreWeights,
    pub min_text_chars: usize,
    pub analysis_max_dim: PerTier<usize>,
    pub video_frames: PerTier<usize>,
    pub frame_timeout_ms: u64,
    pub fetch_timeout_ms: u64,
    pub inference_timeout_ms: u64,
    pub remote_timeout_ms: u64,
    pub remote_token_cost: u32,
    pub temporal: TemporalConfig,
    pub photorealism: PhotorealismConfig,
}

impl Default for CascadeConfig {
    fn default() -> Self {
        Self {
            cache_capacity: DEFAULT_CACHE_CAPACITY,
            cache_ttl_secs: DEFAULT_CACHE_TTL.as_secs(),
            rate_limits: PerTier {
                low: BucketLimits::for_tier(QualityTier::Low),
                medium: BucketLimits::for_tier(QualityTier::Medium),
                high: BucketLimits::for_tier(QualityTier::High),
            },
            image: CascadeProfile::default_for(ContentType::Image),
            video: CascadeProfile::default_for(ContentType::Video),
            text: CascadeProfile::default_for(ContentType::Text),
            audio: CascadeProfile::default_for(ContentType::Audio),
            local_weight: DEFAULT_LOCAL_WEIGHT,
            remote_weight: DEFAULT_REMOTE_WEIGHT,
            model_weight: DEFAULT_MODEL_WEIGHT,
            exif_weight: DEFAULT_EXIF_WEIGHT,
            provenance_weight: DEFAULT_PROVENANCE_WEIGHT,
            url_match_score: DEFAULT_URL_MATCH_SCORE,
            unanalyzable_score: DEFAULT_UNANALYZABLE_SCORE,
            audio_unmatched_score: DEFAULT_AUDIO_UNMATCHED_SCORE,
            pixel_weights: PixelScoreWeights::default(),
            min_text_chars: DEFAULT_MIN_TEXT_CHARS,
            analysis_max_dim: PerTier {
                low: 128,
                medium: 256,
                high: 512,
            },
            video_frames: PerTier {
                low: 3,
                medium: 5,
                high: 8,
            },
            frame_timeout_ms: DEFAULT_FRAME_TIMEOUT_MS,
            fetch_timeout_ms: DEFAULT_FETCH_TIMEOUT_MS,
            inference_timeout_ms: DEFAULT_INFERENCE_TIMEOUT_MS,
            remote_timeout_ms: DEFAULT_REMOTE_TIMEOUT_MS,
            remote_token_cost: DEFAULT_REMOTE_TOKEN_COST,
            temporal: TemporalConfig::default(),
            photorealism: PhotorealismConfig::default(),
        }
    }
}

impl CascadeConfig {
    pub fn builder() -> CascadeConfigBuilder {
        CascadeConfigBuilder::default()
    }

    pub fn profile(&self, content_type: ContentType) -> &CascadeProfile {
        match content_type {
            ContentType::Image => &self.image,
            ContentType::Video => &self.video,
            ContentType::Text => &self.text,
            ContentType::Audio => &self.audio,
        }
    }

    pub fn cache_ttl(&self) -> Duration {
        Duration::from_secs(self.cache_ttl_secs)
    }

    pub fn frame_timeout(&self) -> Duration {
        Duration::from_millis(self.frame_timeout_ms)
    }

    pub fn fetch_timeout(&self) -> Duration {
        Duration::from_millis(self.fetch_timeout_ms)
    }

    pub fn inference_timeout(&self) -> Duration {
        Duration::from_millis(self.inference_timeout_ms)
    }

    pub fn remote_timeout(&self) -> Duration {
        Duration::from_millis(self.remote_timeout_ms)
    }
}

/// Field-by-field overrides on top of [`CascadeConfig::default`].
#[derive(Debug, Clone, Default)]
pub struct CascadeConfigBuilder {
    config: CascadeConfig,
}

impl CascadeConfigBuilder {
    pub fn cache(mut self, capacity: usize, ttl: Duration) -> Self {
        self.config.cache_capacity = capacity;
        self.config.cache_ttl_secs = ttl.as_secs();
        self
    }

    pub fn rate_limit(mut self, tier: QualityTier, limits: BucketLimits) -> Self {
        match tier {
            QualityTier::Low => self.config.rate_limits.low = limits,
            QualityTier::Medium => self.config.rate_limits.medium = limits,
            QualityTier::High => self.config.rate_limits.high = limits,
        }
        self
    }

    pub fn profile(mut self, content_type: ContentType, profile: CascadeProfile) -> Self {
        match content_type {
            ContentType::Image => self.config.image = profile,
            ContentType::Video => self.config.video = profile,
            ContentType::Text => self.config.text = profile,
            ContentType::Audio => self.config.audio = profile,
        }
        self
    }

    pub fn remote_blend(mut self, local_weight: f64, remote_weight: f64) -> Self {
        self.config.local_weight = local_weight;
        self.config.remote_weight = remote_weight;
        self
    }

    pub fn model_weight(mut self, weight: f64) -> Self {
        self.config.model_weight = weight;
        self
    }

    pub fn metadata_weights(mut self, exif_weight: f64, provenance_weight: f64) -> Self {
        self.config.exif_weight = exif_weight;
        self.config.provenance_weight = provenance_weight;
        self
    }

    pub fn url_match_score(mut self, score: f64) -> Self {
        self.config.url_match_score = score;
        self
    }

    pub fn fallback_scores(mut self, unanalyzable: f64, audio_unmatched: f64) -> Self {
        self.config.unanalyzable_score = unanalyzable;
        self.config.audio_unmatched_score = audio_unmatched;
        self
    }

    pub fn pixel_weights(mut self, weights: PixelScoreWeights) -> Self {
        self.config.pixel_weights = weights;
        self
    }

    pub fn min_text_chars(mut self, chars: usize) -> Self {
        self.config.min_text_chars = chars;
        self
    }

    pub fn analysis_max_dim(mut self, dims: PerTier<usize>) -> Self {
        self.config.analysis_max_dim = dims;
        self
    }

    pub fn video_frames(mut self, frames: PerTier<usize>) -> Self {
        self.config.video_frames = frames;
        self
    }

    pub fn frame_timeout(mut self, timeout: Duration) -> Self {
        self.config.frame_timeout_ms = timeout.as_millis() as u64;
        self
    }

    pub fn fetch_timeout(mut self, timeout: Duration) -> Self {
        self.config.fetch_timeout_ms = timeout.as_millis() as u64;
        self
    }

    pub fn inference_timeout(mut self, timeout: Duration) -> Self {
        self.config.inference_timeout_ms = timeout.as_millis() as u64;
        self
    }

    pub fn remote_timeout(mut self, timeout: Duration) -> Self {
        self.config.remote_timeout_ms = timeout.as_millis() as u64;
        self
    }

    pub fn temporal(mut self, temporal: TemporalConfig) -> Self {
        self.config.temporal = temporal;
        self
    }

    pub fn photorealism(mut self, photorealism: PhotorealismConfig) -> Self {
        self.config.photorealism = photorealism;
        self
    }

    pub fn build(self) -> CascadeConfig {
        self.config
    }
}

// ============ Persisted Settings ============

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct AppConfig {
    #[serde(default)]
    pub version: String,
    #[serde(default)]
    pub default_tier: QualityTier,
    #[serde(default)]
    pub remote: RemoteConfig,
    pub proxy: Option<ProxyConfig>,
    #[serde(default)]
    pub api_keys: HashMap<String, String>,
    #[serde(default)]
    pub cascade: CascadeConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct RemoteConfig {
    #[serde(default)]
    pub enabled: bool,
    pub endpoint: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct ProxyConfig {
    pub enabled: bool,
    pub http: Option<String>,
    pub https: Option<String>,
}

impl ProxyConfig {
    pub fn url(&self) -> Option<&str> {
        if !self.enabled {
            return None;
        }
        self.https.as_deref().or(self.http.as_deref())
    }
}

pub struct ConfigStore {
    config_dir: PathBuf,
    config_file: PathBuf,
}

impl ConfigStore {
    pub fn new(config_dir: PathBuf) -> Self {
        let config_file = config_dir.join("config.json");
        Self { config_dir, config_file }
    }

    /// Get default config directory
    pub fn default_config_dir() -> Option<PathBuf> {
        dirs::config_dir().map(|p| p.join("synthguard"))
    }

    pub fn config_file(&self) -> &Path {
        &self.config_file
    }

    /// Load configuration from file; a missing file yields defaults
    pub fn load(&self) -> Result<AppConfig, ConfigError> {
        if !self.config_file.exists() {
            return Ok(AppConfig::default());
        }
        let content = fs::read_to_string(&self.config_file)?;
        Ok(serde_json::from_str(&content)?)
    }

    /// Save configuration to file, backing up the previous version
    pub fn save(&self, config: &AppConfig) -> Result<(), ConfigError> {
        fs::create_dir_all(&self.config_dir)?;

        if self.config_file.exists() {
            self.create_backup()?;
        }

        let content = serde_json::to_string_pretty(config)?;
        fs::write(&self.config_file, content)?;
        Ok(())
    }

    fn create_backup(&self) -> Result<(), ConfigError> {
        let backup_dir = self.config_dir.join("backups");
        fs::create_dir_all(&backup_dir)?;

        let timestamp = chrono::Utc::now().format("%Y%m%d_%H%M%S_%3f");
        let backup_file = backup_dir.join(format!("config_{}.json", timestamp));
        fs::copy(&self.config_file, &backup_file)?;

        self.cleanup_old_backups(&backup_dir, BACKUPS_TO_KEEP)
    }

    /// Remove old backups, keeping only the most recent N
    fn cleanup_old_backups(&self, backup_dir: &Path, keep: usize) -> Result<(), ConfigError> {
        let mut entries: Vec<_> = fs::read_dir(backup_dir)?
            .filter_map(|e| e.ok())
            .filter(|e| e.path().extension().is_some_and(|ext| ext == "json"))
            .collect();

        if entries.len() <= keep {
            return Ok(());
        }

        // File names carry the timestamp, so name order is age order.
        entries.sort_by_key(|e| e.file_name());

        for entry in entries.iter().take(entries.len() - keep) {
            let _ = fs::remove_file(entry.path());
        }

        Ok(())
    }

    pub fn get_api_key(&self, vendor: &str) -> Result<Option<String>, ConfigError> {
        let config = self.load()?;
        Ok(config.api_keys.get(vendor).cloned())
    }

    pub fn set_api_key(&self, vendor: &str, key: &str) -> Result<(), ConfigError> {
        let mut config = self.load()?;
        config.api_keys.insert(vendor.to_string(), key.to_string());
        self.save(&config)
    }

    pub fn delete_api_key(&self, vendor: &str) -> Result<(), ConfigError> {
        let mut config = self.load()?;
        config.api_keys.remove(vendor);
        self.save(&config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_profiles_match_content_types() {
        let config = CascadeConfig::default();
        assert_eq!(config.profile(ContentType::Text).band_low, 0.25);
        assert_eq!(config.profile(ContentType::Audio).band_high, 0.75);
        assert!(config.image.local_threshold < config.image.remote_threshold);
    }

    #[test]
    fn test_band_is_exclusive() {
        let profile = CascadeProfile::new(0.2, 0.7, 0.3, 0.35);
        assert!(!profile.is_inconclusive(0.2));
        assert!(profile.is_inconclusive(0.2001));
        assert!(!profile.is_inconclusive(0.7));
    }

    #[test]
    fn test_builder_overrides_only_named_fields() {
        let config = CascadeConfig::builder()
            .remote_blend(0.5, 0.5)
            .rate_limit(QualityTier::Low, BucketLimits::new(1, 1000))
            .build();
        assert_eq!(config.local_weight, 0.5);
        assert_eq!(config.rate_limits.low.max_tokens, 1);
        assert_eq!(config.rate_limits.high, BucketLimits::for_tier(QualityTier::High));
        assert_eq!(config.model_weight, DEFAULT_MODEL_WEIGHT);
    }

    #[test]
    fn test_partial_cascade_json_keeps_defaults() {
        let parsed: AppConfig =
            serde_json::from_str(r#"{"cascade": {"urlMatchScore": 0.8}, "proxy": null}"#).unwrap();
        assert_eq!(parsed.cascade.url_match_score, 0.8);
        assert_eq!(parsed.cascade.min_text_chars, DEFAULT_MIN_TEXT_CHARS);
        assert_eq!(parsed.default_tier, QualityTier::Medium);
    }

    #[test]
    fn test_store_roundtrip_and_api_keys() {
        let dir = tempfile::tempdir().unwrap();
        let store = ConfigStore::new(dir.path().to_path_buf());
        assert!(store.get_api_key("hive").unwrap().is_none());

        store.set_api_key("hive", "abc").unwrap();
        assert_eq!(store.get_api_key("hive").unwrap().as_deref(), Some("abc"));

        store.delete_api_key("hive").unwrap();
        assert!(store.get_api_key("hive").unwrap().is_none());
        assert!(dir.path().join("backups").exists());
    }

    #[test]
    fn test_backups_are_pruned() {
        let dir = tempfile::tempdir().unwrap();
        let store = ConfigStore::new(dir.path().to_path_buf());
        for i in 0..15 {
            store.set_api_key("generic", &format!("key{}", i)).unwrap();
        }
        let backups = fs::read_dir(dir.path().join("backups")).unwrap().count();
        assert!(backups <= BACKUPS_TO_KEEP);
    }

    #[test]
    fn test_corrupt_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("config.json"), "{not json").unwrap();
        let store = ConfigStore::new(dir.path().to_path_buf());
        assert!(matches!(store.load(), Err(ConfigError::Parse(_))));
    }
}
