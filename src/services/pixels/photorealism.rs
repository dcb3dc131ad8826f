// Photorealism Pre-filter
// Decides from pixel statistics alone whether an image looks photographic
// enough to be worth AI-generation analysis. Icons, cartoons and diagrams
// should fail the gate; the bar is deliberately low so real photos rarely do.

use crate::models::{PhotorealismResult, PixelBuffer, QualityTier};
use serde::{Deserialize, Serialize};

use super::features::{
    block_variance, channel_entropy_bits, edge_complexity, saturation_variance, unique_color_count,
};

/// Clamped linear map of `value` from `[lo, hi]` onto `[0, 1]`.
#[inline]
pub fn knee(value: f64, lo: f64, hi: f64) -> f64 {
    if hi <= lo {
        return if value >= hi { 1.0 } else { 0.0 };
    }
    ((value - lo) / (hi - lo)).clamp(0.0, 1.0)
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PhotorealismKnees {
    pub colors: (f64, f64),
    pub entropy_bits: (f64, f64),
    pub edge: (f64, f64),
    pub block_noise: (f64, f64),
    pub saturation_variance: (f64, f64),
}

impl Default for PhotorealismKnees {
    fn default() -> Self {
        Self {
            colors: (50.0, 400.0),
            entropy_bits: (2.0, 4.5),
            edge: (2.0, 20.0),
            block_noise: (5.0, 150.0),
            saturation_variance: (0.005, 0.05),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PhotorealismConfig {
    pub knees: PhotorealismKnees,
    /// Minimum score for the gate to pass.
    pub gate: f64,
    /// Score reported when pixels cannot be read.
    pub unavailable_score: f64,
    /// Weight of the medium-tier score in the high tier; the backend gets the rest.
    pub high_tier_heuristic_weight: f64,
}

impl Default for PhotorealismConfig {
    fn default() -> Self {
        Self {
            knees: PhotorealismKnees::default(),
            gate: 0.20,
            unavailable_score: 0.5,
            high_tier_heuristic_weight: 0.3,
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct PhotorealismFilter {
    config: PhotorealismConfig,
}

impl PhotorealismFilter {
    pub fn new(config: PhotorealismConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &PhotorealismConfig {
        &self.config
    }

    /// color 0.4, entropy 0.4, edge 0.2
    pub fn low_tier_score(&self, buf: &PixelBuffer) -> f64 {
        let k = &self.config.knees;
        let color = knee(unique_color_count(buf) as f64, k.colors.0, k.colors.1);
        let entropy = knee(channel_entropy_bits(buf), k.entropy_bits.0, k.entropy_bits.1);
        let edge = knee(edge_complexity(buf), k.edge.0, k.edge.1);
        0.4 * color + 0.4 * entropy + 0.2 * edge
    }

    /// low tier 0.7, block noise 0.15, saturation variance 0.15
    pub fn medium_tier_score(&self, buf: &PixelBuffer) -> f64 {
        let k = &self.config.knees;
        let block = knee(block_variance(buf), k.block_noise.0, k.block_noise.1);
        let saturation = knee(
            saturation_variance(buf),
            k.saturation_variance.0,
            k.saturation_variance.1,
        );
        0.7 * self.low_tier_score(buf) + 0.15 * block + 0.15 * saturation
    }

    fn finish(&self, score: f64, tier: QualityTier) -> PhotorealismResult {
        let score = score.clamp(0.0, 1.0);
        PhotorealismResult {
            is_photorealistic: score >= self.config.gate,
            score,
            tier,
        }
    }

    /// Gate result when pixel access was blocked: never drop content silently.
    pub fn unavailable(&self, tier: QualityTier) -> PhotorealismResult {
        PhotorealismResult {
            is_photorealistic: true,
            score: self.config.unavailable_score,
            tier,
        }
    }

    /// Synchronous tiers only; high falls back to medium.
    pub fn evaluate_local(&self, buf: Option<&PixelBuffer>, tier: QualityTier) -> PhotorealismResult {
        let Some(buf) = buf.filter(|b| !b.is_empty()) else {
            return self.unavailable(tier);
        };
        let score = match tier {
            QualityTier::Low => self.low_tier_score(buf),
            QualityTier::Medium | QualityTier::High => self.medium_tier_score(buf),
        };
        self.finish(score, tier)
    }

    /// Evaluation with an already-computed model probability. The high tier
    /// blends it in when present; other tiers ignore it.
    pub fn evaluate_with_model(
        &self,
        buf: Option<&PixelBuffer>,
        tier: QualityTier,
        model: Option<f64>,
    ) -> PhotorealismResult {
        let Some(pixels) = buf.filter(|b| !b.is_empty()) else {
            return self.unavailable(tier);
        };
        if tier != QualityTier::High {
            return self.evaluate_local(Some(pixels), tier);
        }
        let medium = self.medium_tier_score(pixels);
        let score = match model {
            Some(p) => {
                let w = self.config.high_tier_heuristic_weight;
                w * medium + (1.0 - w) * p
            }
            None => medium,
        };
        self.finish(score, tier)
    }
}
