// Remote Classifier Service
// Maps the cascade's generic (content type, payload) request onto a vendor
// wire format, posts it, and reads back a (score, label) verdict

use crate::models::{ContentType, RemotePayload, RemoteVerdict};
use crate::services::detection::{host_matches, ByteFetcher};
use async_trait::async_trait;
use reqwest::{Client, Url};
use serde_json::{json, Value};
use std::env;
use std::time::{Duration, Instant};
use thiserror::Error;
use tracing::{debug, info, warn};

pub const DEFAULT_REMOTE_TIMEOUT: Duration = Duration::from_secs(20);

const HIVE_HOST: &str = "thehive.ai";
const SIGHTENGINE_HOST: &str = "sightengine.com";

#[derive(Error, Debug)]
pub enum ProviderError {
    #[error("HTTP request failed: {0}")]
    HttpError(#[from] reqwest::Error),
    #[error("API error: {status} - {message}")]
    ApiError { status: u16, message: String },
    #[error("Missing score in response")]
    MissingContent,
    #[error("Score out of range: {0}")]
    InvalidScore(f64),
    #[error("JSON parse error: {0}")]
    JsonError(String),
    #[error("Invalid endpoint: {0}")]
    InvalidEndpoint(String),
    #[error("API key not configured")]
    MissingApiKey,
}

/// One remote classification call, fully resolved.
#[derive(Debug, Clone)]
pub struct RemoteRequest {
    pub endpoint: String,
    pub api_key: Option<String>,
    pub content_type: ContentType,
    pub payload: RemotePayload,
}

#[async_trait]
pub trait RemoteClassifier: Send + Sync {
    async fn classify(&self, request: RemoteRequest) -> Result<RemoteVerdict, ProviderError>;
}

// ============ Vendor Adapters ============

pub trait RemoteAdapter: Send + Sync {
    fn name(&self) -> &'static str;

    fn supports(&self, content_type: ContentType) -> bool;

    fn build_body(&self, request: &RemoteRequest) -> Value;

    fn auth_headers(&self, api_key: &str) -> Vec<(&'static str, String)>;

    fn parse_response(&self, body: &Value) -> Result<RemoteVerdict, ProviderError>;
}

fn checked_score(score: f64) -> Result<f64, ProviderError> {
    if score.is_finite() && (0.0..=1.0).contains(&score) {
        Ok(score)
    } else {
        Err(ProviderError::InvalidScore(score))
    }
}

fn default_label(score: f64) -> String {
    let label = if score >= 0.5 { "ai_generated" } else { "human" };
    label.to_string()
}

/// Body of a data URL, or the input unchanged if it has no header.
fn strip_data_url(data: &str) -> &str {
    data.split_once(";base64,").map(|(_, b)| b).unwrap_or(data)
}

/// `POST {contentType, text?, image?, url?, frames?}` → `{score, label}`.
pub struct GenericJsonAdapter;

impl RemoteAdapter for GenericJsonAdapter {
    fn name(&self) -> &'static str {
        "generic"
    }

    fn supports(&self, _content_type: ContentType) -> bool {
        true
    }

    fn build_body(&self, request: &RemoteRequest) -> Value {
        let mut body = serde_json::to_value(&request.payload).unwrap_or_else(|_| json!({}));
        if let Value::Object(map) = &mut body {
            map.insert("contentType".to_string(), json!(request.content_type.as_str()));
        }
        body
    }

    fn auth_headers(&self, api_key: &str) -> Vec<(&'static str, String)> {
        vec![("Authorization", format!("Bearer {}", api_key))]
    }

    fn parse_response(&self, body: &Value) -> Result<RemoteVerdict, ProviderError> {
        let score = body["score"].as_f64().ok_or(ProviderError::MissingContent)?;
        let score = checked_score(score)?;
        let label = body["label"]
            .as_str()
            .map(|s| s.to_string())
            .unwrap_or_else(|| default_label(score));
        Ok(RemoteVerdict { score, label })
    }
}

/// Hive-style: `{media_url | media_base64 | text_data}` →
/// `status[0].response.output[0].classes[{class, score}]`.
pub struct HiveAdapter;

impl RemoteAdapter for HiveAdapter {
    fn name(&self) -> &'static str {
        "hive"
    }

    fn supports(&self, _content_type: ContentType) -> bool {
        true
    }

    fn build_body(&self, request: &RemoteRequest) -> Value {
        let p = &request.payload;
        if request.content_type == ContentType::Text {
            return json!({ "text_data": p.text.clone().unwrap_or_default() });
        }
        if let Some(url) = &p.url {
            return json!({ "media_url": url });
        }
        let media = p.image.as_deref().or_else(|| p.frames.first().map(|s| s.as_str()));
        json!({ "media_base64": media.map(strip_data_url).unwrap_or_default() })
    }

    fn auth_headers(&self, api_key: &str) -> Vec<(&'static str, String)> {
        vec![("Authorization", format!("Token {}", api_key))]
    }

    fn parse_response(&self, body: &Value) -> Result<RemoteVerdict, ProviderError> {
        let classes = body["status"][0]["response"]["output"][0]["classes"]
            .as_array()
            .ok_or(ProviderError::MissingContent)?;
        let score = classes
            .iter()
            .find(|c| c["class"].as_str() == Some("ai_generated"))
            .and_then(|c| c["score"].as_f64())
            .ok_or(ProviderError::MissingContent)?;
        let score = checked_score(score)?;
        // The strongest non-verdict class names the likely generator.
        let label = classes
            .iter()
            .filter_map(|c| Some((c["class"].as_str()?, c["score"].as_f64()?)))
            .filter(|(name, _)| !matches!(*name, "ai_generated" | "not_ai_generated" | "none"))
            .max_by(|a, b| a.1.total_cmp(&b.1))
            .filter(|(_, s)| *s >= 0.5)
            .map(|(name, _)| name.to_string())
            .unwrap_or_else(|| default_label(score));
        Ok(RemoteVerdict { score, label })
    }
}

/// Sightengine-style: `{models: "genai", url | media}` → `type.ai_generated`.
/// The credential is `api_user:api_secret`.
pub struct SightengineAdapter;

impl RemoteAdapter for SightengineAdapter {
    fn name(&self) -> &'static str {
        "sightengine"
    }

    fn supports(&self, content_type: ContentType) -> bool {
        matches!(content_type, ContentType::Image | ContentType::Video)
    }

    fn build_body(&self, request: &RemoteRequest) -> Value {
        let p = &request.payload;
        let mut body = json!({ "models": "genai" });
        if let Some(url) = &p.url {
            body["url"] = json!(url);
        } else if let Some(media) = p.image.as_deref().or_else(|| p.frames.first().map(|s| s.as_str())) {
            body["media"] = json!(strip_data_url(media));
        }
        body
    }

    fn auth_headers(&self, api_key: &str) -> Vec<(&'static str, String)> {
        match api_key.split_once(':') {
            Some((user, secret)) => vec![("api_user", user.to_string()), ("api_secret", secret.to_string())],
            None => vec![("api_secret", api_key.to_string())],
        }
    }

    fn parse_response(&self, body: &Value) -> Result<RemoteVerdict, ProviderError> {
        if body["status"].as_str() == Some("failure") {
            let message = body["error"]["message"].as_str().unwrap_or("request failed").to_string();
            return Err(ProviderError::ApiError { status: 200, message });
        }
        let score = body["type"]["ai_generated"]
            .as_f64()
            .ok_or(ProviderError::MissingContent)?;
        let score = checked_score(score)?;
        Ok(RemoteVerdict {
            score,
            label: default_label(score),
        })
    }
}

/// Pick an adapter by endpoint host. Unknown hosts, unparseable endpoints and
/// content types a vendor cannot take all get the generic JSON adapter.
pub fn adapter_for_endpoint(endpoint: &str, content_type: ContentType) -> Box<dyn RemoteAdapter> {
    let host = Url::parse(endpoint)
        .ok()
        .and_then(|u| u.host_str().map(|h| h.to_ascii_lowercase()))
        .unwrap_or_default();
    let vendor: Option<Box<dyn RemoteAdapter>> = if host_matches(&host, HIVE_HOST) {
        Some(Box::new(HiveAdapter))
    } else if host_matches(&host, SIGHTENGINE_HOST) {
        Some(Box::new(SightengineAdapter))
    } else {
        None
    };
    match vendor {
        Some(adapter) if adapter.supports(content_type) => adapter,
        _ => Box::new(GenericJsonAdapter),
    }
}

// ============ HTTP Client ============

pub struct HttpRemoteClassifier {
    client: Client,
}

impl Default for HttpRemoteClassifier {
    fn default() -> Self {
        Self::new()
    }
}

impl HttpRemoteClassifier {
    pub fn new() -> Self {
        let client = Client::builder()
            .timeout(DEFAULT_REMOTE_TIMEOUT)
            .build()
            .unwrap_or_default();
        Self { client }
    }

    pub fn with_proxy(proxy_url: &str) -> Result<Self, ProviderError> {
        let proxy = reqwest::Proxy::all(proxy_url)?;
        let client = Client::builder()
            .timeout(DEFAULT_REMOTE_TIMEOUT)
            .proxy(proxy)
            .build()?;
        Ok(Self { client })
    }
}

#[async_trait]
impl RemoteClassifier for HttpRemoteClassifier {
    async fn classify(&self, request: RemoteRequest) -> Result<RemoteVerdict, ProviderError> {
        if Url::parse(&request.endpoint).is_err() {
            return Err(ProviderError::InvalidEndpoint(request.endpoint));
        }
        let adapter = adapter_for_endpoint(&request.endpoint, request.content_type);
        let body = adapter.build_body(&request);

        let mut builder = self
            .client
            .post(&request.endpoint)
            .header("Content-Type", "application/json")
            .json(&body);
        if let Some(key) = request.api_key.as_deref().filter(|k| !k.is_empty()) {
            for (name, value) in adapter.auth_headers(key) {
                builder = builder.header(name, value);
            }
        }

        let start = Instant::now();
        let response = builder.send().await?;
        let latency_ms = start.elapsed().as_millis() as i64;
        let status = response.status();

        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ProviderError::ApiError {
                status: status.as_u16(),
                message: body,
            });
        }

        let data: Value = response
            .json()
            .await
            .map_err(|e| ProviderError::JsonError(e.to_string()))?;
        debug!("[REMOTE] {} response: {}", adapter.name(), data);

        let verdict = adapter.parse_response(&data)?;
        info!(
            "[REMOTE] {} classified {} score={:.3} label={} latency={}ms",
            adapter.name(),
            request.content_type.as_str(),
            verdict.score,
            verdict.label,
            latency_ms
        );
        Ok(verdict)
    }
}

// ============ Byte Fetcher ============

/// Byte fetcher over plain HTTP GET; any failure reads as "unavailable".
pub struct HttpByteFetcher {
    client: Client,
    max_bytes: usize,
}

impl HttpByteFetcher {
    pub fn new(client: Client, max_bytes: usize) -> Self {
        Self { client, max_bytes }
    }
}

impl Default for HttpByteFetcher {
    fn default() -> Self {
        Self::new(Client::new(), 32 * 1024 * 1024)
    }
}

#[async_trait]
impl ByteFetcher for HttpByteFetcher {
    async fn fetch_bytes(&self, url: &str) -> Option<Vec<u8>> {
        let response = match self.client.get(url).send().await {
            Ok(r) if r.status().is_success() => r,
            Ok(r) => {
                warn!("[FETCH] {} returned {}", url, r.status());
                return None;
            }
            Err(e) => {
                warn!("[FETCH] {} failed: {}", url, e);
                return None;
            }
        };
        if response.content_length().is_some_and(|len| len as usize > self.max_bytes) {
            warn!("[FETCH] {} exceeds {} bytes", url, self.max_bytes);
            return None;
        }
        let bytes = response.bytes().await.ok()?;
        (bytes.len() <= self.max_bytes).then(|| bytes.to_vec())
    }
}

/// Get API key from environment or config file
pub fn get_api_key(vendor: &str) -> Option<String> {
    let env_keys = match vendor {
        "hive" => vec!["HIVE_API_KEY", "SYNTHGUARD_HIVE_API_KEY"],
        "sightengine" => vec!["SIGHTENGINE_API_KEY", "SYNTHGUARD_SIGHTENGINE_API_KEY"],
        _ => vec!["SYNTHGUARD_API_KEY"],
    };

    for key in env_keys {
        if let Ok(val) = env::var(key) {
            let v = val.trim();
            if !v.is_empty() {
                return Some(v.to_string());
            }
        }
    }

    if let Some(config_dir) = super::ConfigStore::default_config_dir() {
        let store = super::ConfigStore::new(config_dir);
        if let Ok(Some(key)) = store.get_api_key(vendor) {
            return Some(key);
        }
    }

    None
}

/// Credential lookup keyed by the adapter an endpoint would use.
pub fn api_key_for_endpoint(endpoint: &str, content_type: ContentType) -> Option<String> {
    get_api_key(adapter_for_endpoint(endpoint, content_type).name())
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn image_request(endpoint: &str) -> RemoteRequest {
        RemoteRequest {
            endpoint: endpoint.to_string(),
            api_key: Some("secret".to_string()),
            content_type: ContentType::Image,
            payload: RemotePayload {
                url: Some("https://example.com/cat.jpg".to_string()),
                ..Default::default()
            },
        }
    }

    #[test]
    fn test_adapter_selection_by_host() {
        assert_eq!(adapter_for_endpoint("https://api.thehive.ai/api/v2/task/sync", ContentType::Image).name(), "hive");
        assert_eq!(adapter_for_endpoint("https://api.sightengine.com/1.0/check.json", ContentType::Image).name(), "sightengine");
        assert_eq!(adapter_for_endpoint("https://detector.internal/classify", ContentType::Image).name(), "generic");
        assert_eq!(adapter_for_endpoint("not a url", ContentType::Image).name(), "generic");
        // Look-alike hosts do not match.
        assert_eq!(adapter_for_endpoint("https://notthehive.ai/x", ContentType::Image).name(), "generic");
        assert_eq!(adapter_for_endpoint("https://thehive.ai.example.net/x", ContentType::Image).name(), "generic");
        assert_eq!(adapter_for_endpoint("https://API.SightEngine.com/1.0/check.json", ContentType::Image).name(), "sightengine");
    }

    #[test]
    fn test_text_falls_back_to_generic_for_image_only_vendor() {
        let adapter = adapter_for_endpoint("https://api.sightengine.com/1.0/check.json", ContentType::Text);
        assert_eq!(adapter.name(), "generic");
    }

    #[test]
    fn test_generic_body_carries_content_type() {
        let body = GenericJsonAdapter.build_body(&image_request("https://x.test"));
        assert_eq!(body["contentType"], "image");
        assert_eq!(body["url"], "https://example.com/cat.jpg");
        assert!(body.get("text").is_none());
    }

    #[test]
    fn test_generic_parse_requires_score() {
        let verdict = GenericJsonAdapter
            .parse_response(&json!({"score": 0.8, "label": "synthetic"}))
            .unwrap();
        assert_eq!(verdict.score, 0.8);
        assert_eq!(verdict.label, "synthetic");
        assert!(GenericJsonAdapter.parse_response(&json!({"label": "x"})).is_err());
        assert!(matches!(
            GenericJsonAdapter.parse_response(&json!({"score": 3.0})),
            Err(ProviderError::InvalidScore(_))
        ));
    }

    #[test]
    fn test_hive_response_parsing() {
        let body = json!({
            "status": [{"response": {"output": [{"classes": [
                {"class": "ai_generated", "score": 0.97},
                {"class": "not_ai_generated", "score": 0.03},
                {"class": "midjourney", "score": 0.91},
                {"class": "dalle", "score": 0.02}
            ]}]}}]
        });
        let verdict = HiveAdapter.parse_response(&body).unwrap();
        assert_eq!(verdict.score, 0.97);
        assert_eq!(verdict.label, "midjourney");
    }

    #[test]
    fn test_hive_body_strips_data_url_header() {
        let mut request = image_request("https://api.thehive.ai/x");
        request.payload.url = None;
        request.payload.image = Some("data:image/png;base64,QUJD".to_string());
        assert_eq!(HiveAdapter.build_body(&request), json!({"media_base64": "QUJD"}));
    }

    #[test]
    fn test_sightengine_parsing_and_auth() {
        let verdict = SightengineAdapter
            .parse_response(&json!({"status": "success", "type": {"ai_generated": 0.12}}))
            .unwrap();
        assert_eq!(verdict.score, 0.12);
        assert_eq!(verdict.label, "human");

        let failure = json!({"status": "failure", "error": {"message": "bad credentials"}});
        assert!(matches!(
            SightengineAdapter.parse_response(&failure),
            Err(ProviderError::ApiError { .. })
        ));

        let headers = SightengineAdapter.auth_headers("user1:sec2");
        assert_eq!(headers, vec![("api_user", "user1".to_string()), ("api_secret", "sec2".to_string())]);
    }

    #[tokio::test]
    async fn test_http_classifier_generic_roundtrip() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/classify"))
            .and(header("Authorization", "Bearer secret"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"score": 0.42, "label": "uncertain"})))
            .expect(1)
            .mount(&server)
            .await;

        let classifier = HttpRemoteClassifier::new();
        let verdict = classifier
            .classify(image_request(&format!("{}/classify", server.uri())))
            .await
            .unwrap();
        assert_eq!(verdict.score, 0.42);
        assert_eq!(verdict.label, "uncertain");
    }

    #[tokio::test]
    async fn test_http_classifier_non_2xx_is_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(503).set_body_string("overloaded"))
            .mount(&server)
            .await;

        let err = HttpRemoteClassifier::new()
            .classify(image_request(&server.uri()))
            .await
            .unwrap_err();
        match err {
            ProviderError::ApiError { status, message } => {
                assert_eq!(status, 503);
                assert_eq!(message, "overloaded");
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[tokio::test]
    async fn test_http_classifier_rejects_bad_endpoint() {
        let err = HttpRemoteClassifier::new()
            .classify(image_request("::nope::"))
            .await
            .unwrap_err();
        assert!(matches!(err, ProviderError::InvalidEndpoint(_)));
    }

    #[tokio::test]
    async fn test_byte_fetcher_reads_body_and_swallows_errors() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/photo.jpg"))
            .respond_with(ResponseTemplate::new(200).set_body_bytes(vec![0xFF, 0xD8, 0xFF, 0xD9]))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/missing.jpg"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;

        let fetcher = HttpByteFetcher::default();
        let bytes = fetcher.fetch_bytes(&format!("{}/photo.jpg", server.uri())).await;
        assert_eq!(bytes, Some(vec![0xFF, 0xD8, 0xFF, 0xD9]));
        assert!(fetcher.fetch_bytes(&format!("{}/missing.jpg", server.uri())).await.is_none());

        let small = HttpByteFetcher::new(Client::new(), 2);
        assert!(small.fetch_bytes(&format!("{}/photo.jpg", server.uri())).await.is_none());
    }
}
