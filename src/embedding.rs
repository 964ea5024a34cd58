//! Embedding providers and the profile registry.
//!
//! Concrete [`EmbeddingProvider`] implementations:
//! - **[`OllamaProvider`]**: calls a local Ollama instance's `/api/embed` endpoint.
//! - **[`OpenAIProvider`]**: calls the OpenAI embeddings API.
//! - **[`NoopProvider`]**: returns zero vectors without any network access;
//!   for offline runs and tests.
//!
//! # Provider Selection
//!
//! A [`ProviderRegistry`] maps provider kinds (`"ollama"`, `"openai"`,
//! `"noop"`) to factories. A configured profile names a kind plus model,
//! dims and url; [`ProviderRegistry::create`] turns it into a provider:
//!
//! ```rust
//! # use docsync::config::ProfileConfig;
//! # use docsync::embedding::ProviderRegistry;
//! let registry = ProviderRegistry::with_builtins();
//! let profile = ProfileConfig::new("noop", None, Some(8));
//! let provider = registry.create(&profile).unwrap();
//! assert_eq!(provider.dims(), 8);
//! ```
//!
//! # Retry Strategy
//!
//! The HTTP providers use exponential backoff for transient errors:
//! - HTTP 429 (rate limited) and 5xx (server error) → retry
//! - HTTP 4xx (client error, not 429) → fail immediately
//! - Network errors → retry
//! - Backoff: 1s, 2s, 4s, 8s, 16s, 32s (capped at 2^5)

use anyhow::{bail, Result};
use async_trait::async_trait;
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

pub use docsync_core::embedding::EmbeddingProvider;

use crate::config::ProfileConfig;
use crate::error::SyncError;

const DEFAULT_OLLAMA_URL: &str = "http://localhost:11434";
const DEFAULT_OPENAI_URL: &str = "https://api.openai.com";
const DEFAULT_NOOP_DIMS: usize = 384;

/// Builds a provider from a profile.
pub type ProviderFactory = Box<dyn Fn(&ProfileConfig) -> Result<Arc<dyn EmbeddingProvider>> + Send + Sync>;

/// Named provider factories.
pub struct ProviderRegistry {
    factories: BTreeMap<String, ProviderFactory>,
}

impl ProviderRegistry {
    /// An empty registry.
    pub fn new() -> Self {
        Self {
            factories: BTreeMap::new(),
        }
    }

    /// Registry with `ollama`, `openai` and `noop` registered.
    pub fn with_builtins() -> Self {
        let mut registry = Self::new();
        registry.register("ollama", |p| Ok(Arc::new(OllamaProvider::new(p)?)));
        registry.register("openai", |p| Ok(Arc::new(OpenAIProvider::new(p)?)));
        registry.register("noop", |p| Ok(Arc::new(NoopProvider::new(p))));
        registry
    }

    /// Register (or replace) the factory for a provider kind.
    pub fn register<F>(&mut self, kind: &str, factory: F)
    where
        F: Fn(&ProfileConfig) -> Result<Arc<dyn EmbeddingProvider>> + Send + Sync + 'static,
    {
        self.factories.insert(kind.to_string(), Box::new(factory));
    }

    pub fn kinds(&self) -> Vec<&str> {
        self.factories.keys().map(String::as_str).collect()
    }

    /// Instantiate the provider a profile describes.
    pub fn create(&self, profile: &ProfileConfig) -> Result<Arc<dyn EmbeddingProvider>, SyncError> {
        let factory = self.factories.get(&profile.provider).ok_or_else(|| {
            SyncError::Config(format!(
                "Unknown embedding provider: '{}'. Must be one of: {}",
                profile.provider,
                self.kinds().join(", ")
            ))
        })?;
        factory(profile).map_err(|e| SyncError::Config(format!("{:#}", e)))
    }
}

impl Default for ProviderRegistry {
    fn default() -> Self {
        Self::with_builtins()
    }
}

// ============ Noop Provider ============

/// Returns an all-zero vector for every input.
pub struct NoopProvider {
    dims: usize,
}

impl NoopProvider {
    pub fn new(profile: &ProfileConfig) -> Self {
        Self {
            dims: profile.dims.unwrap_or(DEFAULT_NOOP_DIMS),
        }
    }

    pub fn with_dims(dims: usize) -> Self {
        Self { dims }
    }
}

#[async_trait]
impl EmbeddingProvider for NoopProvider {
    fn model_name(&self) -> &str {
        "noop"
    }
    fn dims(&self) -> usize {
        self.dims
    }
    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        Ok(texts.iter().map(|_| vec![0.0; self.dims]).collect())
    }
}

// ============ Shared HTTP plumbing ============

struct HttpSettings {
    model: String,
    dims: usize,
    url: String,
    max_retries: u32,
    client: reqwest::Client,
}

impl HttpSettings {
    fn from_profile(profile: &ProfileConfig, kind: &str, default_url: &str) -> Result<Self> {
        let model = profile
            .model
            .clone()
            .ok_or_else(|| anyhow::anyhow!("model required for {} provider", kind))?;
        let dims = profile
            .dims
            .ok_or_else(|| anyhow::anyhow!("dims required for {} provider", kind))?;
        let url = profile
            .url
            .as_deref()
            .unwrap_or(default_url)
            .trim_end_matches('/')
            .to_string();
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(profile.timeout_secs))
            .build()?;

        Ok(Self {
            model,
            dims,
            url,
            max_retries: profile.max_retries,
            client,
        })
    }
}

/// POST `body` to `url`, retrying 429/5xx and network errors with
/// exponential backoff. Returns the parsed JSON of the first success.
async fn post_json_with_retry(
    settings: &HttpSettings,
    url: &str,
    bearer: Option<&str>,
    body: &serde_json::Value,
    label: &str,
) -> Result<serde_json::Value> {
    let mut last_err = None;

    for attempt in 0..=settings.max_retries {
        if attempt > 0 {
            // Exponential backoff: 1s, 2s, 4s, 8s, ...
            let delay = Duration::from_secs(1 << (attempt - 1).min(5));
            tracing::debug!(attempt, delay_secs = delay.as_secs(), "{} embedding retry", label);
            tokio::time::sleep(delay).await;
        }

        let mut request = settings
            .client
            .post(url)
            .header("Content-Type", "application/json")
            .json(body);
        if let Some(token) = bearer {
            request = request.header("Authorization", format!("Bearer {}", token));
        }

        match request.send().await {
            Ok(response) => {
                let status = response.status();

                if status.is_success() {
                    return Ok(response.json().await?);
                }

                // Rate limited or server error: retry
                if status.as_u16() == 429 || status.is_server_error() {
                    let body_text = response.text().await.unwrap_or_default();
                    last_err = Some(anyhow::anyhow!(
                        "{} API error {}: {}",
                        label,
                        status,
                        body_text
                    ));
                    continue;
                }

                let body_text = response.text().await.unwrap_or_default();
                bail!("{} API error {}: {}", label, status, body_text);
            }
            Err(e) => {
                last_err = Some(anyhow::anyhow!(
                    "{} connection error ({}): {}",
                    label,
                    url,
                    e
                ));
                continue;
            }
        }
    }

    Err(last_err.unwrap_or_else(|| anyhow::anyhow!("{} embedding failed after retries", label)))
}

fn json_vector(value: &serde_json::Value, what: &str) -> Result<Vec<f32>> {
    Ok(value
        .as_array()
        .ok_or_else(|| anyhow::anyhow!("Invalid {} response: embedding is not an array", what))?
        .iter()
        .map(|v| v.as_f64().unwrap_or(0.0) as f32)
        .collect())
}

// ============ Ollama Provider ============

/// Embedding provider using a local Ollama instance.
///
/// Calls `POST /api/embed` on the profile's url (default
/// `http://localhost:11434`). The model must already be pulled, e.g.
/// `ollama pull nomic-embed-text`.
pub struct OllamaProvider {
    settings: HttpSettings,
}

impl OllamaProvider {
    pub fn new(profile: &ProfileConfig) -> Result<Self> {
        Ok(Self {
            settings: HttpSettings::from_profile(profile, "ollama", DEFAULT_OLLAMA_URL)?,
        })
    }
}

#[async_trait]
impl EmbeddingProvider for OllamaProvider {
    fn model_name(&self) -> &str {
        &self.settings.model
    }
    fn dims(&self) -> usize {
        self.settings.dims
    }
    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        let body = serde_json::json!({
            "model": self.settings.model,
            "input": texts,
        });
        let url = format!("{}/api/embed", self.settings.url);
        let json = post_json_with_retry(&self.settings, &url, None, &body, "Ollama").await?;
        parse_ollama_response(&json)
    }
}

fn parse_ollama_response(json: &serde_json::Value) -> Result<Vec<Vec<f32>>> {
    let embeddings = json
        .get("embeddings")
        .and_then(|e| e.as_array())
        .ok_or_else(|| anyhow::anyhow!("Invalid Ollama response: missing embeddings array"))?;

    embeddings
        .iter()
        .map(|e| json_vector(e, "Ollama"))
        .collect()
}

// ============ OpenAI Provider ============

/// Embedding provider using the OpenAI API.
///
/// Calls `POST /v1/embeddings`. Requires the `OPENAI_API_KEY` environment
/// variable at construction time.
pub struct OpenAIProvider {
    settings: HttpSettings,
    api_key: String,
}

impl OpenAIProvider {
    pub fn new(profile: &ProfileConfig) -> Result<Self> {
        let settings = HttpSettings::from_profile(profile, "openai", DEFAULT_OPENAI_URL)?;
        let api_key = std::env::var("OPENAI_API_KEY")
            .map_err(|_| anyhow::anyhow!("OPENAI_API_KEY environment variable not set"))?;
        Ok(Self { settings, api_key })
    }
}

#[async_trait]
impl EmbeddingProvider for OpenAIProvider {
    fn model_name(&self) -> &str {
        &self.settings.model
    }
    fn dims(&self) -> usize {
        self.settings.dims
    }
    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        let body = serde_json::json!({
            "model": self.settings.model,
            "input": texts,
        });
        let url = format!("{}/v1/embeddings", self.settings.url);
        let json =
            post_json_with_retry(&self.settings, &url, Some(&self.api_key), &body, "OpenAI")
                .await?;
        parse_openai_response(&json)
    }
}

/// Extract `data[].embedding`, ordered by each item's `index`.
fn parse_openai_response(json: &serde_json::Value) -> Result<Vec<Vec<f32>>> {
    let data = json
        .get("data")
        .and_then(|d| d.as_array())
        .ok_or_else(|| anyhow::anyhow!("Invalid OpenAI response: missing data array"))?;

    let mut indexed = Vec::with_capacity(data.len());
    for (pos, item) in data.iter().enumerate() {
        let index = item
            .get("index")
            .and_then(|i| i.as_u64())
            .map(|i| i as usize)
            .unwrap_or(pos);
        let embedding = item
            .get("embedding")
            .ok_or_else(|| anyhow::anyhow!("Invalid OpenAI response: missing embedding"))?;
        indexed.push((index, json_vector(embedding, "OpenAI")?));
    }
    indexed.sort_by_key(|(i, _)| *i);

    Ok(indexed.into_iter().map(|(_, v)| v).collect())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_noop_returns_zero_vectors() {
        let provider = NoopProvider::with_dims(4);
        let out = provider
            .embed(&["a".to_string(), "b".to_string()])
            .await
            .unwrap();
        assert_eq!(out, vec![vec![0.0; 4], vec![0.0; 4]]);
    }

    #[test]
    fn test_noop_default_dims() {
        let provider = NoopProvider::new(&ProfileConfig::new("noop", None, None));
        assert_eq!(provider.dims(), DEFAULT_NOOP_DIMS);
    }

    #[test]
    fn test_registry_unknown_kind_is_config_error() {
        let registry = ProviderRegistry::with_builtins();
        let result = registry.create(&ProfileConfig::new("cohere", Some("m"), Some(8)));
        match result {
            Err(SyncError::Config(msg)) => assert!(msg.contains("cohere")),
            _ => panic!("expected config error"),
        }
    }

    #[test]
    fn test_registry_custom_factory() {
        let mut registry = ProviderRegistry::new();
        registry.register("fixed", |_| Ok(Arc::new(NoopProvider::with_dims(3))));
        let provider = registry
            .create(&ProfileConfig::new("fixed", None, None))
            .unwrap();
        assert_eq!(provider.dims(), 3);
        assert_eq!(registry.kinds(), vec!["fixed"]);
    }

    #[test]
    fn test_ollama_requires_model_and_dims() {
        let registry = ProviderRegistry::with_builtins();
        assert!(registry
            .create(&ProfileConfig::new("ollama", None, Some(768)))
            .is_err());
        assert!(registry
            .create(&ProfileConfig::new("ollama", Some("nomic-embed-text"), None))
            .is_err());
        let provider = registry
            .create(&ProfileConfig::new("ollama", Some("nomic-embed-text"), Some(768)))
            .unwrap();
        assert_eq!(provider.model_name(), "nomic-embed-text");
    }

    #[test]
    fn test_parse_ollama_response() {
        let json = serde_json::json!({ "embeddings": [[0.1, 0.2], [0.3, 0.4]] });
        let out = parse_ollama_response(&json).unwrap();
        assert_eq!(out.len(), 2);
        assert!((out[1][0] - 0.3).abs() < 1e-6);

        assert!(parse_ollama_response(&serde_json::json!({})).is_err());
    }

    #[test]
    fn test_parse_openai_response_orders_by_index() {
        let json = serde_json::json!({
            "data": [
                { "index": 1, "embedding": [2.0] },
                { "index": 0, "embedding": [1.0] }
            ]
        });
        let out = parse_openai_response(&json).unwrap();
        assert_eq!(out, vec![vec![1.0], vec![2.0]]);
    }
}
