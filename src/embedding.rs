//! Embedding providers.
//!
//! Concrete [`Embedder`] implementations:
//! - **[`OllamaEmbedder`]**: calls a local Ollama instance's `/api/embed` endpoint.
//! - **[`OpenAIEmbedder`]**: calls the OpenAI embeddings API.
//! - **`LocalEmbedder`**: runs models in-process via fastembed (feature
//!   `local-models`); no network calls after the model download.
//!
//! Use [`create_embedder`] to build the configured provider. The same
//! provider must be used for ingestion and queries.

use anyhow::{anyhow, bail, Context, Result};
use async_trait::async_trait;
use std::sync::Arc;

use notes_rag_core::embedding::Embedder;

use crate::config::EmbeddingConfig;
use crate::http;

const DEFAULT_OLLAMA_URL: &str = "http://localhost:11434";
const DEFAULT_OPENAI_URL: &str = "https://api.openai.com";

// ============ Ollama ============

/// Embedder backed by Ollama's `POST /api/embed`.
///
/// Requires Ollama to be running with the model pulled
/// (e.g. `ollama pull hf.co/CompendiumLabs/bge-base-en-v1.5-gguf`).
pub struct OllamaEmbedder {
    client: reqwest::Client,
    model: String,
    dims: usize,
    url: String,
    max_retries: u32,
}

impl OllamaEmbedder {
    pub fn new(config: &EmbeddingConfig) -> Result<Self> {
        Ok(Self {
            client: http::client(config.timeout_secs)?,
            model: config.model.clone(),
            dims: config.dims.unwrap_or(0),
            url: config
                .url
                .clone()
                .unwrap_or_else(|| DEFAULT_OLLAMA_URL.to_string()),
            max_retries: config.max_retries,
        })
    }
}

#[async_trait]
impl Embedder for OllamaEmbedder {
    fn model_name(&self) -> &str {
        &self.model
    }

    fn dims(&self) -> usize {
        self.dims
    }

    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }
        let body = serde_json::json!({
            "model": self.model,
            "input": texts,
        });
        let endpoint = http::endpoint(&self.url, "/api/embed");

        let response = http::send_with_retry(
            || self.client.post(&endpoint).json(&body),
            self.max_retries,
            "Ollama",
        )
        .await
        .with_context(|| format!("is Ollama running at {}?", self.url))?;

        let json: serde_json::Value = response.json().await?;
        let vectors = parse_ollama_response(&json)?;
        check_count(&vectors, texts.len(), "Ollama")?;
        Ok(vectors)
    }
}

fn parse_ollama_response(json: &serde_json::Value) -> Result<Vec<Vec<f32>>> {
    let embeddings = json
        .get("embeddings")
        .and_then(|e| e.as_array())
        .ok_or_else(|| anyhow!("Invalid Ollama response: missing embeddings array"))?;

    embeddings
        .iter()
        .map(|embedding| {
            embedding
                .as_array()
                .ok_or_else(|| anyhow!("Invalid Ollama response: embedding is not an array"))
                .and_then(|values| to_f32(values, "Ollama"))
        })
        .collect()
}

// ============ OpenAI ============

/// Embedder backed by `POST /v1/embeddings`.
///
/// Requires the `OPENAI_API_KEY` environment variable. `embedding.url`
/// overrides the API base for compatible servers.
pub struct OpenAIEmbedder {
    client: reqwest::Client,
    model: String,
    dims: usize,
    url: String,
    api_key: String,
    max_retries: u32,
}

impl OpenAIEmbedder {
    pub fn new(config: &EmbeddingConfig) -> Result<Self> {
        let api_key = std::env::var("OPENAI_API_KEY")
            .map_err(|_| anyhow!("OPENAI_API_KEY environment variable not set"))?;
        Ok(Self {
            client: http::client(config.timeout_secs)?,
            model: config.model.clone(),
            dims: config.dims.unwrap_or(0),
            url: config
                .url
                .clone()
                .unwrap_or_else(|| DEFAULT_OPENAI_URL.to_string()),
            api_key,
            max_retries: config.max_retries,
        })
    }
}

#[async_trait]
impl Embedder for OpenAIEmbedder {
    fn model_name(&self) -> &str {
        &self.model
    }

    fn dims(&self) -> usize {
        self.dims
    }

    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }
        let body = serde_json::json!({
            "model": self.model,
            "input": texts,
        });
        let endpoint = http::endpoint(&self.url, "/v1/embeddings");

        let response = http::send_with_retry(
            || {
                self.client
                    .post(&endpoint)
                    .bearer_auth(&self.api_key)
                    .json(&body)
            },
            self.max_retries,
            "OpenAI",
        )
        .await?;

        let json: serde_json::Value = response.json().await?;
        let vectors = parse_openai_response(&json)?;
        check_count(&vectors, texts.len(), "OpenAI")?;
        Ok(vectors)
    }
}

/// Extract `data[].embedding`, ordered by `data[].index` when present.
fn parse_openai_response(json: &serde_json::Value) -> Result<Vec<Vec<f32>>> {
    let data = json
        .get("data")
        .and_then(|d| d.as_array())
        .ok_or_else(|| anyhow!("Invalid OpenAI response: missing data array"))?;

    let mut indexed = Vec::with_capacity(data.len());
    for (position, item) in data.iter().enumerate() {
        let embedding = item
            .get("embedding")
            .and_then(|e| e.as_array())
            .ok_or_else(|| anyhow!("Invalid OpenAI response: missing embedding"))?;
        let index = item
            .get("index")
            .and_then(|i| i.as_u64())
            .map(|i| i as usize)
            .unwrap_or(position);
        indexed.push((index, to_f32(embedding, "OpenAI")?));
    }

    indexed.sort_by_key(|(index, _)| *index);
    Ok(indexed.into_iter().map(|(_, v)| v).collect())
}

// ============ Local (fastembed) ============

/// In-process embedder. The model is downloaded on first use from
/// Hugging Face, cached, and loaded once at construction.
#[cfg(feature = "local-models")]
pub struct LocalEmbedder {
    model: Arc<std::sync::Mutex<fastembed::TextEmbedding>>,
    model_name: String,
    dims: usize,
    batch_size: usize,
}

#[cfg(feature = "local-models")]
impl LocalEmbedder {
    /// Load (downloading on first use) the configured model on the
    /// blocking pool.
    pub async fn load(config: &EmbeddingConfig) -> Result<Self> {
        let (fastembed_model, default_dims) = config_to_fastembed_model(&config.model)?;
        tracing::info!(model = %config.model, "loading local embedding model");
        let model = tokio::task::spawn_blocking(move || {
            fastembed::TextEmbedding::try_new(
                fastembed::InitOptions::new(fastembed_model).with_show_download_progress(true),
            )
            .map_err(|e| anyhow!("Failed to initialize local embedding model: {}", e))
        })
        .await??;

        Ok(Self {
            model: Arc::new(std::sync::Mutex::new(model)),
            model_name: config.model.clone(),
            dims: config.dims.unwrap_or(default_dims),
            batch_size: config.batch_size,
        })
    }
}

#[cfg(feature = "local-models")]
#[async_trait]
impl Embedder for LocalEmbedder {
    fn model_name(&self) -> &str {
        &self.model_name
    }

    fn dims(&self) -> usize {
        self.dims
    }

    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }
        let model = Arc::clone(&self.model);
        let texts = texts.to_vec();
        let batch_size = self.batch_size;

        tokio::task::spawn_blocking(move || {
            let mut model = model
                .lock()
                .map_err(|_| anyhow!("local embedding model lock poisoned"))?;
            model
                .embed(texts, Some(batch_size))
                .map_err(|e| anyhow!("Local embedding failed: {}", e))
        })
        .await?
    }
}

/// Map a configured model name to a fastembed model and its dims.
#[cfg(feature = "local-models")]
fn config_to_fastembed_model(name: &str) -> Result<(fastembed::EmbeddingModel, usize)> {
    use fastembed::EmbeddingModel;

    // The Ollama GGUF build of bge-base is the same model.
    if name.contains("bge-base-en-v1.5") {
        return Ok((EmbeddingModel::BGEBaseENV15, 768));
    }
    match name {
        "all-minilm-l6-v2" => Ok((EmbeddingModel::AllMiniLML6V2, 384)),
        "bge-small-en-v1.5" => Ok((EmbeddingModel::BGESmallENV15, 384)),
        "bge-large-en-v1.5" => Ok((EmbeddingModel::BGELargeENV15, 1024)),
        "nomic-embed-text-v1.5" => Ok((EmbeddingModel::NomicEmbedTextV15, 768)),
        "multilingual-e5-small" => Ok((EmbeddingModel::MultilingualE5Small, 384)),
        "multilingual-e5-base" => Ok((EmbeddingModel::MultilingualE5Base, 768)),
        other => bail!(
            "Unknown local embedding model: '{}'. Supported models: \
             all-minilm-l6-v2, bge-small-en-v1.5, bge-base-en-v1.5, bge-large-en-v1.5, \
             nomic-embed-text-v1.5, multilingual-e5-small, multilingual-e5-base",
            other
        ),
    }
}

// ============ Construction ============

/// Build the configured [`Embedder`].
///
/// | Config Value | Provider |
/// |-------------|----------|
/// | `"ollama"` | [`OllamaEmbedder`] |
/// | `"openai"` | [`OpenAIEmbedder`] |
/// | `"local"` | `LocalEmbedder` (feature `local-models`) |
pub async fn create_embedder(config: &EmbeddingConfig) -> Result<Arc<dyn Embedder>> {
    match config.provider.as_str() {
        "ollama" => Ok(Arc::new(OllamaEmbedder::new(config)?)),
        "openai" => Ok(Arc::new(OpenAIEmbedder::new(config)?)),
        #[cfg(feature = "local-models")]
        "local" => Ok(Arc::new(LocalEmbedder::load(config).await?)),
        #[cfg(not(feature = "local-models"))]
        "local" => bail!("Local embedding provider requires --features local-models"),
        other => bail!("Unknown embedding provider: {}", other),
    }
}

fn to_f32(values: &[serde_json::Value], service: &str) -> Result<Vec<f32>> {
    values
        .iter()
        .enumerate()
        .map(|(i, v)| {
            v.as_f64().map(|x| x as f32).ok_or_else(|| {
                anyhow!(
                    "Invalid {} response: non-numeric embedding value at {}",
                    service,
                    i
                )
            })
        })
        .collect()
}

fn check_count(vectors: &[Vec<f32>], expected: usize, service: &str) -> Result<()> {
    if vectors.len() != expected {
        bail!(
            "{} returned {} embeddings for {} inputs",
            service,
            vectors.len(),
            expected
        );
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_ollama_response() {
        let json = serde_json::json!({
            "model": "m",
            "embeddings": [[0.1, 0.2], [0.3, 0.4]]
        });
        let vectors = parse_ollama_response(&json).unwrap();
        assert_eq!(vectors.len(), 2);
        assert!((vectors[1][0] - 0.3).abs() < 1e-6);
    }

    #[test]
    fn test_parse_ollama_rejects_missing_field() {
        let json = serde_json::json!({ "error": "model not found" });
        assert!(parse_ollama_response(&json).is_err());
    }

    #[test]
    fn test_parse_rejects_non_numeric_values() {
        let json = serde_json::json!({ "embeddings": [[0.5, "NaN", null]] });
        let err = parse_ollama_response(&json).unwrap_err();
        assert!(err
            .to_string()
            .contains("Invalid Ollama response: non-numeric embedding value at 1"));

        let json = serde_json::json!({
            "data": [{ "index": 0, "embedding": [0.1, null] }]
        });
        let err = parse_openai_response(&json).unwrap_err();
        assert!(err.to_string().contains("non-numeric embedding value at 1"));
    }

    #[test]
    fn test_parse_openai_orders_by_index() {
        let json = serde_json::json!({
            "data": [
                { "index": 1, "embedding": [2.0] },
                { "index": 0, "embedding": [1.0] }
            ]
        });
        let vectors = parse_openai_response(&json).unwrap();
        assert_eq!(vectors, vec![vec![1.0], vec![2.0]]);
    }

    #[test]
    fn test_check_count() {
        assert!(check_count(&[vec![1.0]], 1, "X").is_ok());
        let err = check_count(&[], 2, "X").unwrap_err();
        assert!(err.to_string().contains("0 embeddings for 2 inputs"));
    }

    #[tokio::test]
    async fn test_create_unknown_provider() {
        let config = EmbeddingConfig {
            provider: "magic".to_string(),
            ..EmbeddingConfig::default()
        };
        assert!(create_embedder(&config).await.is_err());
    }

    #[cfg(feature = "local-models")]
    #[tokio::test]
    async fn test_load_unknown_local_model() {
        let config = EmbeddingConfig {
            provider: "local".to_string(),
            model: "not-a-model".to_string(),
            ..EmbeddingConfig::default()
        };
        let err = create_embedder(&config).await.err().unwrap();
        assert!(err.to_string().contains("Unknown local embedding model"));
    }

    #[cfg(not(feature = "local-models"))]
    #[tokio::test]
    async fn test_local_provider_needs_feature() {
        let config = EmbeddingConfig {
            provider: "local".to_string(),
            ..EmbeddingConfig::default()
        };
        let err = create_embedder(&config).await.err().unwrap();
        assert!(err.to_string().contains("--features local-models"));
    }

    #[tokio::test]
    async fn test_ollama_unreachable_names_url() {
        let config = EmbeddingConfig {
            url: Some("http://127.0.0.1:9".to_string()),
            timeout_secs: 2,
            ..EmbeddingConfig::default()
        };
        let embedder = OllamaEmbedder::new(&config).unwrap();
        let err = embedder.embed(&["hello".to_string()]).await.unwrap_err();
        assert!(format!("{:#}", err).contains("127.0.0.1:9"));
    }
}
