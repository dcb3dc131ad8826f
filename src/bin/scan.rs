use anyhow::{anyhow, bail, Context, Result};
use async_trait::async_trait;
use std::path::Path;
use std::sync::Arc;
use synthguard_lib::services::{
    api_key_for_endpoint, ConfigStore, HttpByteFetcher, HttpRemoteClassifier, RemoteClassifier,
};
use synthguard_lib::{
    AudioContent, ByteFetcher, Content, ContentType, DetectorOptions, ImageContent, Pipeline, QualityTier,
    VideoContent,
};
use tracing::info;

const USAGE: &str = "Usage:\n  scan <file|url|data-url> [--type image|text|video|audio] [--tier low|medium|high] [--remote <endpoint>] [--json]\n\nNotes:\n  - The content type is guessed from the file extension unless --type is given.\n  - Without --remote, the endpoint from the config file is used when remote checks are enabled.\n  - Set SYNTHGUARD_DISABLE_FILE_LOG=1 to keep logs on the console only.";

/// Local paths are read from disk; everything else goes over HTTP.
struct CliFetcher {
    http: HttpByteFetcher,
}

#[async_trait]
impl ByteFetcher for CliFetcher {
    async fn fetch_bytes(&self, url: &str) -> Option<Vec<u8>> {
        if is_remote(url) {
            self.http.fetch_bytes(url).await
        } else {
            tokio::fs::read(url).await.ok()
        }
    }
}

fn is_remote(target: &str) -> bool {
    target.starts_with("http://") || target.starts_with("https://")
}

fn parse_arg_value(args: &[String], key: &str) -> Option<String> {
    args.iter()
        .position(|a| a == key)
        .and_then(|i| args.get(i + 1))
        .cloned()
}

fn has_flag(args: &[String], key: &str) -> bool {
    args.iter().any(|a| a == key)
}

fn is_data_url(target: &str) -> bool {
    target.starts_with("data:")
}

fn guess_content_type(target: &str) -> Option<ContentType> {
    if let Some(mime) = target.strip_prefix("data:") {
        return mime.starts_with("image/").then_some(ContentType::Image);
    }
    let path = target.split(['?', '#']).next().unwrap_or(target);
    let ext = Path::new(path).extension()?.to_str()?.to_ascii_lowercase();
    match ext.as_str() {
        "png" | "jpg" | "jpeg" | "webp" | "gif" | "bmp" => Some(ContentType::Image),
        "mp4" | "webm" | "mov" | "mkv" | "avi" => Some(ContentType::Video),
        "mp3" | "wav" | "m4a" | "ogg" | "flac" | "aac" => Some(ContentType::Audio),
        "txt" | "md" | "text" => Some(ContentType::Text),
        _ => None,
    }
}

async fn build_content(target: &str, content_type: ContentType, fetcher: &CliFetcher) -> Result<Content> {
    let remote = is_remote(target);
    let url = remote.then(|| target.to_string());
    let content = match content_type {
        ContentType::Text => {
            let bytes = fetcher
                .fetch_bytes(target)
                .await
                .ok_or_else(|| anyhow!("could not read {}", target))?;
            Content::Text(String::from_utf8_lossy(&bytes).into_owned())
        }
        // The image detector decodes inline images itself.
        ContentType::Image if is_data_url(target) => Content::Image(ImageContent {
            url: Some(target.to_string()),
            ..Default::default()
        }),
        ContentType::Image => {
            let bytes = fetcher.fetch_bytes(target).await;
            if bytes.is_none() && !remote {
                bail!("could not read {}", target);
            }
            Content::Image(ImageContent {
                url,
                pixels: None,
                bytes,
            })
        }
        // Frame capture needs a decoder host; the CLI scores video by URL only.
        ContentType::Video => Content::Video(VideoContent { url, frames: None }),
        ContentType::Audio => Content::Audio(AudioContent {
            url: Some(target.to_string()),
        }),
    };
    Ok(content)
}

#[tokio::main]
async fn main() -> Result<()> {
    let args: Vec<String> = std::env::args().collect();
    if args.len() < 2 || has_flag(&args, "--help") {
        eprintln!("{}", USAGE);
        return Ok(());
    }
    synthguard_lib::init_logging();

    let target = args[1].clone();
    let content_type = match parse_arg_value(&args, "--type") {
        Some(t) => ContentType::parse(&t).ok_or_else(|| anyhow!("unknown content type: {}", t))?,
        None => guess_content_type(&target)
            .ok_or_else(|| anyhow!("cannot guess the content type of {}; pass --type", target))?,
    };

    let store = ConfigStore::default_config_dir().map(ConfigStore::new);
    let config = match &store {
        Some(store) => store
            .load()
            .with_context(|| format!("loading {}", store.config_file().display()))?,
        None => Default::default(),
    };

    let tier = parse_arg_value(&args, "--tier")
        .map(|t| QualityTier::parse(&t))
        .unwrap_or(config.default_tier);
    let endpoint = parse_arg_value(&args, "--remote").or_else(|| {
        config
            .remote
            .endpoint
            .clone()
            .filter(|_| config.remote.enabled)
    });

    let fetcher = Arc::new(CliFetcher {
        http: HttpByteFetcher::default(),
    });
    let mut options = DetectorOptions::default()
        .tier(tier)
        .with_fetcher(fetcher.clone());
    if let Some(endpoint) = endpoint {
        let classifier: Arc<dyn RemoteClassifier> = match config.proxy.as_ref().and_then(|p| p.url()) {
            Some(proxy) => Arc::new(HttpRemoteClassifier::with_proxy(proxy)?),
            None => Arc::new(HttpRemoteClassifier::new()),
        };
        if let Some(key) = api_key_for_endpoint(&endpoint, content_type) {
            options = options.api_key(key);
        }
        info!("[SCAN] remote escalation via {}", endpoint);
        options = options.with_remote(classifier, endpoint).allow_remote(true);
    }

    let content = build_content(&target, content_type, &fetcher).await?;
    let pipeline = Pipeline::new(config.cascade, None);
    let result = pipeline.detect(&content, &options).await;

    if has_flag(&args, "--json") {
        println!("{}", serde_json::to_string_pretty(result.as_ref())?);
        return Ok(());
    }

    println!("Target: {}", target);
    println!("Type: {}", content_type.as_str());
    println!("Tier: {}", tier.as_str());
    println!(
        "Verdict: {} (score {:.3}, {:?} confidence)",
        if result.is_ai_generated { "AI-generated" } else { "not flagged" },
        result.score,
        result.confidence
    );
    println!("Decided by: {:?} ({:?})", result.stage, result.source);
    for reason in &result.explanations {
        println!("  - {}", reason);
    }
    Ok(())
}
