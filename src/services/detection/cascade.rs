// Cascade Policy
// Shared cache lookups, the escalation decision, the rate-limited remote stage
// and calibration of the final score into a verdict

use crate::models::{
    ContentType, DecisionStage, DetectionResult, RemotePayload, RemoteVerdict, ResultSource, SubScores,
};
use crate::services::config_store::{CascadeConfig, CascadeProfile};
use crate::services::providers::RemoteRequest;
use crate::services::rate_limiter::TierRateLimiters;
use crate::services::result_cache::ResultCache;
use std::sync::Arc;
use tracing::{debug, info, warn};

use super::DetectorOptions;

/// Cache key: the fingerprint alone would let a text and a URL collide across detectors.
pub type CacheKey = (ContentType, u32);
pub type SharedCache = Arc<ResultCache<CacheKey, Arc<DetectionResult>>>;

/// Outcome of the escalation decision and, when taken, the remote call.
#[derive(Debug, Clone, PartialEq)]
pub enum Escalation {
    /// Score was outside the inconclusive band.
    NotNeeded,
    Disallowed,
    NoStrategy,
    RateLimited,
    /// Remote call failed; the token was refunded.
    Failed,
    Completed(RemoteVerdict),
}

/// Local verdict threshold. Unanalyzable content never clears it.
fn local_threshold(profile: &CascadeProfile, stage: DecisionStage) -> f64 {
    match stage {
        DecisionStage::Unanalyzable => f64::INFINITY,
        _ => profile.local_threshold,
    }
}

/// State and policy shared by every detector.
#[derive(Clone)]
pub struct Cascade {
    config: Arc<CascadeConfig>,
    cache: SharedCache,
    limiters: Arc<TierRateLimiters>,
}

impl Cascade {
    pub fn new(config: Arc<CascadeConfig>, cache: SharedCache, limiters: Arc<TierRateLimiters>) -> Self {
        Self {
            config,
            cache,
            limiters,
        }
    }

    pub fn config(&self) -> &CascadeConfig {
        &self.config
    }

    pub fn limiters(&self) -> &TierRateLimiters {
        &self.limiters
    }

    pub fn cached(&self, key: &CacheKey) -> Option<Arc<DetectionResult>> {
        let hit = self.cache.get(key);
        if hit.is_some() {
            debug!("[CASCADE] cache hit {}:{:08x}", key.0.as_str(), key.1);
        }
        hit
    }

    pub fn store(&self, key: CacheKey, result: DetectionResult) -> Arc<DetectionResult> {
        let result = Arc::new(result);
        self.cache.set(key, Arc::clone(&result));
        result
    }

    /// Decide whether to escalate and, if so, run the remote stage.
    /// `payload` is only built once a token has been taken.
    pub async fn escalate<F>(
        &self,
        content_type: ContentType,
        score: f64,
        options: &DetectorOptions,
        payload: F,
    ) -> Escalation
    where
        F: FnOnce() -> RemotePayload + Send,
    {
        let profile = self.config.profile(content_type);
        if !profile.is_inconclusive(score) {
            return Escalation::NotNeeded;
        }
        if !options.allow_remote {
            return Escalation::Disallowed;
        }
        let Some(remote) = options.remote.as_ref() else {
            return Escalation::NoStrategy;
        };

        let cost = self.config.remote_token_cost;
        let bucket = self.limiters.for_tier(options.tier);
        if !bucket.try_consume(cost) {
            info!(
                "[CASCADE] {} escalation skipped: {} budget exhausted",
                content_type.as_str(),
                options.tier.as_str()
            );
            return Escalation::RateLimited;
        }

        let request = RemoteRequest {
            endpoint: options.endpoint.clone().unwrap_or_default(),
            api_key: options.api_key.clone(),
            content_type,
            payload: payload(),
        };

        let timeout = self.config.remote_timeout();
        match tokio::time::timeout(timeout, remote.classify(request)).await {
            Ok(Ok(verdict)) if verdict.score.is_finite() && (0.0..=1.0).contains(&verdict.score) => {
                debug!(
                    "[CASCADE] {} remote score={:.3} label={}",
                    content_type.as_str(),
                    verdict.score,
                    verdict.label
                );
                Escalation::Completed(verdict)
            }
            Ok(Ok(verdict)) => {
                warn!("[CASCADE] remote returned out-of-range score {}", verdict.score);
                bucket.return_tokens(cost);
                Escalation::Failed
            }
            Ok(Err(e)) => {
                warn!("[CASCADE] {} remote call failed: {}", content_type.as_str(), e);
                bucket.return_tokens(cost);
                Escalation::Failed
            }
            Err(_) => {
                warn!("[CASCADE] {} remote call timed out after {:?}", content_type.as_str(), timeout);
                bucket.return_tokens(cost);
                Escalation::Failed
            }
        }
    }

    pub fn blend_remote(&self, local: f64, remote: f64) -> f64 {
        self.config.local_weight * local + self.config.remote_weight * remote
    }

    /// Fold the escalation outcome into the local score and calibrate.
    pub fn calibrate(
        &self,
        content_type: ContentType,
        local_score: f64,
        local_stage: DecisionStage,
        escalation: Escalation,
        mut sub_scores: SubScores,
        mut explanations: Vec<String>,
    ) -> DetectionResult {
        let profile: &CascadeProfile = self.config.profile(content_type);
        let (score, source, stage, threshold) = match escalation {
            Escalation::Completed(verdict) => {
                sub_scores.remote = Some(verdict.score);
                explanations.push(format!("remote classifier: {} ({:.2})", verdict.label, verdict.score));
                (
                    self.blend_remote(local_score, verdict.score),
                    ResultSource::Remote,
                    DecisionStage::Remote,
                    profile.remote_threshold,
                )
            }
            other => {
                if other == Escalation::Failed {
                    explanations.push("remote classifier unavailable, kept local score".to_string());
                }
                (
                    local_score,
                    ResultSource::Local,
                    local_stage,
                    local_threshold(profile, local_stage),
                )
            }
        };
        if sub_scores.local.is_none() {
            sub_scores.local = Some(local_score);
        }
        DetectionResult::new(content_type, score, threshold, source, stage)
            .with_sub_scores(sub_scores)
            .with_explanations(explanations)
    }

    /// A result decided at the local stage with no escalation.
    pub fn local_verdict(
        &self,
        content_type: ContentType,
        score: f64,
        stage: DecisionStage,
        explanations: Vec<String>,
    ) -> DetectionResult {
        let threshold = local_threshold(self.config.profile(content_type), stage);
        DetectionResult::new(content_type, score, threshold, ResultSource::Local, stage)
            .with_sub_scores(SubScores {
                local: Some(score),
                ..Default::default()
            })
            .with_explanations(explanations)
    }
}


#[cfg(test)]
mod tests {
    use super::test_support::*;
    use super::*;
    use crate::models::{Confidence, QualityTier};

    fn url_payload() -> RemotePayload {
        RemotePayload {
            url: Some("https://example.com/a".to_string()),
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn test_escalates_only_inside_band() {
        let cascade = test_cascade();
        let remote = MockRemote::returning(0.9);
        let options = remote_options(remote.clone());

        // Image band is (0.2, 0.7), edges excluded.
        for score in [0.1, 0.2, 0.7, 0.95] {
            let outcome = cascade.escalate(ContentType::Image, score, &options, url_payload).await;
            assert_eq!(outcome, Escalation::NotNeeded);
        }
        assert_eq!(remote.calls(), 0);

        let outcome = cascade.escalate(ContentType::Image, 0.5, &options, url_payload).await;
        assert!(matches!(outcome, Escalation::Completed(_)));
        assert_eq!(remote.calls(), 1);
    }

    #[tokio::test]
    async fn test_requires_permission_and_strategy() {
        let cascade = test_cascade();
        let remote = MockRemote::returning(0.9);

        let forbidden = DetectorOptions::default().with_remote(remote.clone(), "https://x.test");
        let outcome = cascade.escalate(ContentType::Text, 0.5, &forbidden, url_payload).await;
        assert_eq!(outcome, Escalation::Disallowed);

        let no_strategy = DetectorOptions::default().allow_remote(true);
        let outcome = cascade.escalate(ContentType::Text, 0.5, &no_strategy, url_payload).await;
        assert_eq!(outcome, Escalation::NoStrategy);

        assert_eq!(remote.calls(), 0);
    }

    #[tokio::test]
    async fn test_exhausted_budget_skips_remote() {
        let cascade = single_token_cascade();
        let remote = MockRemote::returning(0.9);
        let options = remote_options(remote.clone());

        assert!(matches!(
            cascade.escalate(ContentType::Audio, 0.5, &options, url_payload).await,
            Escalation::Completed(_)
        ));
        assert_eq!(
            cascade.escalate(ContentType::Audio, 0.5, &options, url_payload).await,
            Escalation::RateLimited
        );
        assert_eq!(remote.calls(), 1);
    }

    #[tokio::test]
    async fn test_failed_remote_refunds_token() {
        let cascade = test_cascade();
        let remote = MockRemote::rejecting();
        let options = remote_options(remote.clone());
        let bucket = cascade.limiters().for_tier(QualityTier::Medium);
        let before = bucket.available();

        let outcome = cascade.escalate(ContentType::Video, 0.4, &options, url_payload).await;
        assert_eq!(outcome, Escalation::Failed);
        assert_eq!(remote.calls(), 1);
        assert_eq!(bucket.available(), before);

        let result = cascade.calibrate(
            ContentType::Video,
            0.4,
            DecisionStage::LocalHeuristics,
            outcome,
            SubScores::default(),
            Vec::new(),
        );
        assert_eq!(result.score, 0.4);
        assert_eq!(result.source, ResultSource::Local);
    }

    #[tokio::test]
    async fn test_remote_blend_weights() {
        let cascade = test_cascade();
        let remote = MockRemote::returning(1.0);
        let options = remote_options(remote.clone());
        let outcome = cascade.escalate(ContentType::Image, 0.5, &options, url_payload).await;
        let result = cascade.calibrate(
            ContentType::Image,
            0.5,
            DecisionStage::LocalHeuristics,
            outcome,
            SubScores::default(),
            Vec::new(),
        );
        assert!((result.score - 0.85).abs() < 1e-12);
        assert_eq!(result.source, ResultSource::Remote);
        assert_eq!(result.stage, DecisionStage::Remote);
        assert_eq!(result.confidence, Confidence::High);
        assert_eq!(result.sub_scores.remote, Some(1.0));

        let request = remote.last_request.lock().unwrap().clone().unwrap();
        assert_eq!(request.endpoint, "https://classifier.test/v1");
        assert_eq!(request.content_type, ContentType::Image);
    }

    #[test]
    fn test_local_threshold_differs_from_remote() {
        let cascade = test_cascade();
        let local = cascade.calibrate(
            ContentType::Image,
            0.32,
            DecisionStage::LocalHeuristics,
            Escalation::NotNeeded,
            SubScores::default(),
            Vec::new(),
        );
        assert!(local.is_ai_generated);
        let remote = cascade.calibrate(
            ContentType::Image,
            0.32,
            DecisionStage::LocalHeuristics,
            Escalation::Completed(RemoteVerdict {
                score: 0.32,
                label: "x".to_string(),
            }),
            SubScores::default(),
            Vec::new(),
        );
        assert!(!remote.is_ai_generated);
    }

    #[test]
    fn test_unanalyzable_never_flags_locally() {
        let cascade = test_cascade();
        let local = cascade.local_verdict(ContentType::Image, 0.95, DecisionStage::Unanalyzable, Vec::new());
        assert!(!local.is_ai_generated);
        let rate_limited = cascade.calibrate(
            ContentType::Audio,
            1.0,
            DecisionStage::Unanalyzable,
            Escalation::RateLimited,
            SubScores::default(),
            Vec::new(),
        );
        assert!(!rate_limited.is_ai_generated);
        assert_eq!(rate_limited.stage, DecisionStage::Unanalyzable);

        let corroborated = cascade.calibrate(
            ContentType::Image,
            0.25,
            DecisionStage::Unanalyzable,
            Escalation::Completed(RemoteVerdict {
                score: 0.95,
                label: "ai".to_string(),
            }),
            SubScores::default(),
            Vec::new(),
        );
        assert!(corroborated.is_ai_generated);
        assert_eq!(corroborated.stage, DecisionStage::Remote);
    }

    #[test]
    fn test_store_returns_same_object_on_hit() {
        let cascade = test_cascade();
        let key = (ContentType::Text, 42);
        let stored = cascade.store(
            key,
            cascade.local_verdict(ContentType::Text, 0.7, DecisionStage::LocalHeuristics, Vec::new()),
        );
        let hit = cascade.cached(&key).unwrap();
        assert!(Arc::ptr_eq(&stored, &hit));
        assert!(cascade.cached(&(ContentType::Image, 42)).is_none());
    }
}
