// Generator URL Patterns
// Hosts (and path fragments on shared storage hosts) that only serve generated media

use crate::models::ContentType;
use reqwest::Url;

#[derive(Debug, Clone, Copy)]
pub struct GeneratorPattern {
    pub generator: &'static str,
    /// Matches the host itself or any subdomain.
    pub host: &'static str,
    pub path_fragment: Option<&'static str>,
}

const fn host(generator: &'static str, host: &'static str) -> GeneratorPattern {
    GeneratorPattern {
        generator,
        host,
        path_fragment: None,
    }
}

const fn hosted_path(generator: &'static str, host: &'static str, fragment: &'static str) -> GeneratorPattern {
    GeneratorPattern {
        generator,
        host,
        path_fragment: Some(fragment),
    }
}

pub const IMAGE_PATTERNS: &[GeneratorPattern] = &[
    host("midjourney", "cdn.midjourney.com"),
    host("midjourney", "mj-gallery.com"),
    host("dall-e", "oaidalleapiprodscus.blob.core.windows.net"),
    host("dall-e", "dalleprodsec.blob.core.windows.net"),
    host("lexica", "lexica.art"),
    host("civitai", "image.civitai.com"),
    host("civitai", "imagecache.civitai.com"),
    host("nightcafe", "images.nightcafe.studio"),
    host("leonardo", "cdn.leonardo.ai"),
    host("ideogram", "ideogram.ai"),
    host("stable-diffusion", "dreamstudio.ai"),
    host("craiyon", "img.craiyon.com"),
    hosted_path("firefly", "firefly.adobe.com", "/generate"),
];

pub const VIDEO_PATTERNS: &[GeneratorPattern] = &[
    host("sora", "sora.com"),
    host("sora", "videos.openai.com"),
    hosted_path("sora", "cdn.openai.com", "/sora"),
    host("runway", "runwayml.com"),
    host("runway", "runway.team"),
    host("pika", "pika.art"),
    host("luma", "lumalabs.ai"),
    host("luma", "cdn-luma.com"),
    host("kling", "klingai.com"),
    host("haiper", "haiper.ai"),
];

pub const AUDIO_PATTERNS: &[GeneratorPattern] = &[
    host("suno", "suno.com"),
    host("suno", "suno.ai"),
    host("udio", "udio.com"),
    hosted_path("udio", "storage.googleapis.com", "/udio-artifacts"),
    host("elevenlabs", "elevenlabs.io"),
    hosted_path("elevenlabs", "storage.googleapis.com", "/eleven-public"),
];

pub fn patterns_for(content_type: ContentType) -> &'static [GeneratorPattern] {
    match content_type {
        ContentType::Image => IMAGE_PATTERNS,
        ContentType::Video => VIDEO_PATTERNS,
        ContentType::Audio => AUDIO_PATTERNS,
        ContentType::Text => &[],
    }
}

/// True when `host` is `domain` or one of its subdomains. Both sides must be lowercase.
pub fn host_matches(host: &str, domain: &str) -> bool {
    host == domain
        || (host.len() > domain.len()
            && host.ends_with(domain)
            && host.as_bytes()[host.len() - domain.len() - 1] == b'.')
}

/// Generator name for a URL on a known generator host.
/// Data URLs and unparseable input never match.
pub fn match_generator_url(url: &str, content_type: ContentType) -> Option<&'static str> {
    let parsed = Url::parse(url.trim()).ok()?;
    if !matches!(parsed.scheme(), "http" | "https") {
        return None;
    }
    let host = parsed.host_str()?.to_ascii_lowercase();
    let path = parsed.path();
    patterns_for(content_type)
        .iter()
        .find(|p| host_matches(&host, p.host) && p.path_fragment.map_or(true, |frag| path.starts_with(frag)))
        .map(|p| p.generator)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_host_matches_on_label_boundaries() {
        assert!(host_matches("thehive.ai", "thehive.ai"));
        assert!(host_matches("api.thehive.ai", "thehive.ai"));
        assert!(!host_matches("notthehive.ai", "thehive.ai"));
        assert!(!host_matches("thehive.ai.example.net", "thehive.ai"));
        assert!(!host_matches("ai", "thehive.ai"));
        assert!(!host_matches("", "thehive.ai"));
    }

    #[test]
    fn test_known_image_hosts_match() {
        assert_eq!(
            match_generator_url("https://cdn.midjourney.com/abc/0_0.png", ContentType::Image),
            Some("midjourney")
        );
        assert_eq!(
            match_generator_url("https://www.lexica.art/prompt/123", ContentType::Image),
            Some("lexica")
        );
    }

    #[test]
    fn test_lookalike_and_unrelated_hosts_do_not_match() {
        assert_eq!(match_generator_url("https://notlexica.art/x.png", ContentType::Image), None);
        assert_eq!(match_generator_url("https://images.example.com/cat.jpg", ContentType::Image), None);
        assert_eq!(match_generator_url("data:image/png;base64,AAAA", ContentType::Image), None);
        assert_eq!(match_generator_url("not a url", ContentType::Image), None);
    }

    #[test]
    fn test_patterns_are_per_content_type() {
        assert_eq!(match_generator_url("https://suno.com/song/1", ContentType::Audio), Some("suno"));
        assert_eq!(match_generator_url("https://suno.com/song/1", ContentType::Image), None);
        assert_eq!(match_generator_url("https://cdn.midjourney.com/a.png", ContentType::Text), None);
    }

    #[test]
    fn test_shared_storage_hosts_need_path_fragment() {
        assert_eq!(
            match_generator_url("https://storage.googleapis.com/udio-artifacts/x.mp3", ContentType::Audio),
            Some("udio")
        );
        assert_eq!(
            match_generator_url("https://storage.googleapis.com/podcasts/x.mp3", ContentType::Audio),
            None
        );
    }
}
