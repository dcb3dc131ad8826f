// Audio Detector
// No acoustic model: generator URLs and generator tags in the file header,
// otherwise a low prior that the remote stage can refine

use crate::models::{ContentType, DecisionStage, DetectionResult, RemotePayload, SubScores};
use crate::services::fingerprint::fingerprint_url;
use async_trait::async_trait;
use std::sync::Arc;
use tracing::info;

use super::cascade::Cascade;
use super::url_patterns::match_generator_url;
use super::{fetch_with_timeout, AudioContent, Detector, DetectorOptions};

/// Tags written into ID3/RIFF/MP4 metadata by generation services.
const GENERATOR_TAGS: &[(&str, &str)] = &[
    ("suno", "suno"),
    ("udio", "udio"),
    ("elevenlabs", "elevenlabs"),
    ("eleven labs", "elevenlabs"),
    ("aiva", "aiva"),
    ("mubert", "mubert"),
];

const HEADER_SCAN_LIMIT: usize = 64 * 1024;

/// Generator named in the metadata head of an audio file.
/// Tags only count as whole words, so "studio" never reads as "udio".
pub fn generator_tag(bytes: &[u8]) -> Option<&'static str> {
    let head = &bytes[..bytes.len().min(HEADER_SCAN_LIMIT)];
    let lowered: Vec<u8> = head.iter().map(u8::to_ascii_lowercase).collect();
    GENERATOR_TAGS
        .iter()
        .find(|(tag, _)| contains_word(&lowered, tag.as_bytes()))
        .map(|(_, generator)| *generator)
}

fn contains_word(haystack: &[u8], word: &[u8]) -> bool {
    if word.is_empty() {
        return false;
    }
    haystack.windows(word.len()).enumerate().any(|(i, w)| {
        w == word
            && (i == 0 || !haystack[i - 1].is_ascii_alphanumeric())
            && haystack
                .get(i + word.len())
                .map_or(true, |b| !b.is_ascii_alphanumeric())
    })
}

pub struct AudioDetector {
    cascade: Cascade,
}

impl AudioDetector {
    pub fn new(cascade: Cascade) -> Self {
        Self { cascade }
    }
}

#[async_trait]
impl Detector for AudioDetector {
    type Input = AudioContent;

    fn content_type(&self) -> ContentType {
        ContentType::Audio
    }

    async fn detect(&self, content: &AudioContent, options: &DetectorOptions) -> Arc<DetectionResult> {
        let config = self.cascade.config();
        let Some(url) = content.url.as_deref() else {
            return Arc::new(self.cascade.local_verdict(
                ContentType::Audio,
                config.unanalyzable_score,
                DecisionStage::Unanalyzable,
                vec!["no source to analyze".to_string()],
            ));
        };

        let key = (ContentType::Audio, fingerprint_url(url));
        if let Some(hit) = self.cascade.cached(&key) {
            return hit;
        }

        if let Some(generator) = match_generator_url(url, ContentType::Audio) {
            info!("[AUDIO] url pattern match: {}", generator);
            let result = self.cascade.local_verdict(
                ContentType::Audio,
                config.url_match_score,
                DecisionStage::UrlPattern,
                vec![format!("hosted on a {} domain", generator)],
            );
            return self.cascade.store(key, result);
        }

        let tagged = match &options.fetcher {
            Some(fetcher) => fetch_with_timeout(fetcher.as_ref(), url, config.fetch_timeout())
                .await
                .and_then(|bytes| generator_tag(&bytes)),
            None => None,
        };
        if let Some(generator) = tagged {
            info!("[AUDIO] generator tag in header: {}", generator);
            let result = self.cascade.local_verdict(
                ContentType::Audio,
                config.url_match_score,
                DecisionStage::LocalHeuristics,
                vec![format!("file metadata names {}", generator)],
            );
            return self.cascade.store(key, result);
        }

        let local = config.audio_unmatched_score;
        let escalation = self
            .cascade
            .escalate(ContentType::Audio, local, options, || RemotePayload {
                url: Some(url.to_string()),
                ..Default::default()
            })
            .await;
        let result = self.cascade.calibrate(
            ContentType::Audio,
            local,
            DecisionStage::LocalHeuristics,
            escalation,
            SubScores {
                local: Some(local),
                ..Default::default()
            },
            vec!["no generator signature found".to_string()],
        );
        info!(
            "[AUDIO] final={:.3} source={:?} ai={}",
            result.score, result.source, result.is_ai_generated
        );
        self.cascade.store(key, result)
    }
}
