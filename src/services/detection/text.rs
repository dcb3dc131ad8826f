// Text Detector
// Stylometric heuristics scored in logit space with soft (sigmoid) thresholds,
// escalated to the remote classifier when inconclusive

use crate::models::{ContentType, DecisionStage, DetectionResult, RemotePayload, ResultSource, SubScores};
use crate::services::fingerprint::fingerprint_text;
use crate::services::text_processor::{compute_text_statistics, TextStatistics};
use async_trait::async_trait;
use std::sync::Arc;
use tracing::info;

use super::cascade::Cascade;
use super::{Detector, DetectorOptions};

const BIAS: f64 = -0.5;
const BURSTINESS_WEIGHT: f64 = 1.5;
const TTR_WEIGHT: f64 = 0.5;
const FILLER_WEIGHT: f64 = 2.0;
const OPENER_WEIGHT: f64 = 0.8;
const REPEAT_WEIGHT: f64 = 0.6;
/// Type-token ratio drifts with length; below this it says nothing.
const TTR_MIN_WORDS: usize = 60;

/// Soft "less than": near 1 well below `center`, near 0 well above; `k` sets the width.
#[inline]
fn sigmoid(x: f64, center: f64, k: f64) -> f64 {
    1.0 / (1.0 + ((x - center) / k).exp())
}

#[inline]
fn sigmoid_inv(x: f64, center: f64, k: f64) -> f64 {
    1.0 - sigmoid(x, center, k)
}

#[inline]
fn from_logit(logit: f64) -> f64 {
    1.0 / (1.0 + (-logit).exp())
}

/// Local AI-likelihood of a text from its statistics, with the reasons that moved it.
pub fn text_heuristic_score(stats: &TextStatistics) -> (f64, Vec<String>) {
    let mut logit = BIAS;
    let mut reasons = Vec::new();

    if let Some(b) = stats.burstiness {
        // Two-sided: uniform sentence lengths point to a model, varied ones to a person.
        let s = sigmoid(b, 0.35, 0.08);
        logit += BURSTINESS_WEIGHT * (2.0 * s - 1.0);
        if s > 0.7 {
            reasons.push(format!("uniform sentence lengths (burstiness {:.2})", b));
        } else if s < 0.3 {
            reasons.push(format!("varied sentence lengths (burstiness {:.2})", b));
        }
    }

    if stats.word_count >= TTR_MIN_WORDS {
        let s = sigmoid(stats.ttr, 0.5, 0.06);
        logit += TTR_WEIGHT * (2.0 * s - 1.0);
        if s > 0.7 {
            reasons.push(format!("low lexical variety (TTR {:.2})", stats.ttr));
        }
    }

    let filler = sigmoid_inv(stats.filler_density, 1.0, 0.35);
    logit += FILLER_WEIGHT * filler;
    if stats.filler_hits > 0 && filler > 0.5 {
        reasons.push(format!("{} stock filler phrase(s)", stats.filler_hits));
    }

    if let Some(u) = stats.opener_uniformity {
        let s = sigmoid_inv(u, 0.4, 0.1);
        logit += OPENER_WEIGHT * s;
        if s > 0.5 {
            reasons.push("paragraphs open with stock transitions".to_string());
        }
    }

    let repeat = sigmoid_inv(stats.ngram_repeat_rate, 0.08, 0.03);
    logit += REPEAT_WEIGHT * repeat;
    if repeat > 0.5 {
        reasons.push("repeated phrasing".to_string());
    }

    (from_logit(logit), reasons)
}

pub struct TextDetector {
    cascade: Cascade,
}

impl TextDetector {
    pub fn new(cascade: Cascade) -> Self {
        Self { cascade }
    }
}

#[async_trait]
impl Detector for TextDetector {
    type Input = str;

    fn content_type(&self) -> ContentType {
        ContentType::Text
    }

    async fn detect(&self, text: &str, options: &DetectorOptions) -> Arc<DetectionResult> {
        let text = text.trim();
        let min_chars = self.cascade.config().min_text_chars;
        if text.chars().count() < min_chars {
            return Arc::new(
                DetectionResult::new(ContentType::Text, 0.0, 1.0, ResultSource::Local, DecisionStage::TooShort)
                    .with_explanations(vec![format!("fewer than {} characters", min_chars)]),
            );
        }

        let key = (ContentType::Text, fingerprint_text(text));
        if let Some(hit) = self.cascade.cached(&key) {
            return hit;
        }

        let stats = compute_text_statistics(text);
        let (local, reasons) = text_heuristic_score(&stats);

        let escalation = self
            .cascade
            .escalate(ContentType::Text, local, options, || RemotePayload {
                text: Some(text.to_string()),
                ..Default::default()
            })
            .await;

        let result = self.cascade.calibrate(
            ContentType::Text,
            local,
            DecisionStage::LocalHeuristics,
            escalation,
            SubScores {
                local: Some(local),
                ..Default::default()
            },
            reasons,
        );
        info!(
            "[TEXT] words={} local={:.3} final={:.3} source={:?} ai={}",
            stats.word_count, local, result.score, result.source, result.is_ai_generated
        );
        self.cascade.store(key, result)
    }
}
