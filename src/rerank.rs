//! Reranker providers.
//!
//! - **`LocalReranker`**: fastembed cross-encoder (feature `local-models`).
//! - **[`HttpReranker`]**: any server exposing a `POST /rerank` endpoint
//!   that takes `{model, query, documents}` and answers
//!   `{results: [{index, relevance_score}]}` (text-embeddings-inference,
//!   Infinity, Jina-compatible APIs).
//!
//! Both backends return results sorted by relevance; they are put back in
//! input order before being handed to the pipeline.

use anyhow::{anyhow, bail, Result};
use async_trait::async_trait;
use std::sync::Arc;

use notes_rag_core::rerank::{scores_in_input_order, Reranker};

use crate::config::RerankerConfig;
use crate::http;

// ============ HTTP ============

pub struct HttpReranker {
    client: reqwest::Client,
    model: String,
    url: String,
}

impl HttpReranker {
    pub fn new(config: &RerankerConfig) -> Result<Self> {
        let url = config
            .url
            .clone()
            .ok_or_else(|| anyhow!("reranker.url required for http provider"))?;
        Ok(Self {
            client: http::client(config.timeout_secs)?,
            model: config.model.clone(),
            url,
        })
    }
}

#[async_trait]
impl Reranker for HttpReranker {
    fn model_name(&self) -> &str {
        &self.model
    }

    async fn score(&self, query: &str, candidates: &[String]) -> Result<Vec<f32>> {
        if candidates.is_empty() {
            return Ok(Vec::new());
        }
        let body = serde_json::json!({
            "model": self.model,
            "query": query,
            "documents": candidates,
        });
        let endpoint = http::endpoint(&self.url, "/rerank");

        let response = http::send_with_retry(
            || self.client.post(&endpoint).json(&body),
            0,
            "Reranker",
        )
        .await?;

        let json: serde_json::Value = response.json().await?;
        parse_rerank_response(&json, candidates.len())
    }
}

/// Parse `results[] {index, relevance_score}` back into input order.
fn parse_rerank_response(json: &serde_json::Value, expected: usize) -> Result<Vec<f32>> {
    let results = json
        .get("results")
        .and_then(|r| r.as_array())
        .ok_or_else(|| anyhow!("Invalid rerank response: missing results array"))?;

    let mut indexed = Vec::with_capacity(results.len());
    for item in results {
        let index = item
            .get("index")
            .and_then(|i| i.as_u64())
            .ok_or_else(|| anyhow!("Invalid rerank response: missing index"))?;
        let score = item
            .get("relevance_score")
            .or_else(|| item.get("score"))
            .and_then(|s| s.as_f64())
            .ok_or_else(|| anyhow!("Invalid rerank response: missing relevance_score"))?;
        indexed.push((index as usize, score as f32));
    }

    scores_in_input_order(indexed, expected).ok_or_else(|| {
        anyhow!(
            "Invalid rerank response: expected one score for each of {} documents",
            expected
        )
    })
}

// ============ Local (fastembed) ============

/// In-process cross-encoder. Loading the model and scoring both run on
/// the blocking pool.
#[cfg(feature = "local-models")]
pub struct LocalReranker {
    model: Arc<std::sync::Mutex<fastembed::TextRerank>>,
    model_name: String,
}

#[cfg(feature = "local-models")]
impl LocalReranker {
    pub async fn load(config: &RerankerConfig) -> Result<Self> {
        let reranker_model = config_to_fastembed_reranker(&config.model)?;
        tracing::info!(model = %config.model, "loading reranker model");
        let model = tokio::task::spawn_blocking(move || {
            fastembed::TextRerank::try_new(
                fastembed::RerankInitOptions::new(reranker_model)
                    .with_show_download_progress(true),
            )
            .map_err(|e| anyhow!("Failed to initialize reranker model: {}", e))
        })
        .await??;

        Ok(Self {
            model: Arc::new(std::sync::Mutex::new(model)),
            model_name: config.model.clone(),
        })
    }
}

#[cfg(feature = "local-models")]
#[async_trait]
impl Reranker for LocalReranker {
    fn model_name(&self) -> &str {
        &self.model_name
    }

    async fn score(&self, query: &str, candidates: &[String]) -> Result<Vec<f32>> {
        if candidates.is_empty() {
            return Ok(Vec::new());
        }
        let model = Arc::clone(&self.model);
        let query = query.to_string();
        let documents = candidates.to_vec();
        let expected = documents.len();

        let results = tokio::task::spawn_blocking(move || {
            let mut model = model
                .lock()
                .map_err(|_| anyhow!("reranker model lock poisoned"))?;
            model
                .rerank(query, documents, false, None)
                .map_err(|e| anyhow!("Local reranking failed: {}", e))
        })
        .await??;

        scores_in_input_order(results.into_iter().map(|r| (r.index, r.score)), expected)
            .ok_or_else(|| anyhow!("reranker returned an incomplete score set"))
    }
}

#[cfg(feature = "local-models")]
fn config_to_fastembed_reranker(name: &str) -> Result<fastembed::RerankerModel> {
    use fastembed::RerankerModel;

    match name {
        "bge-reranker-base" | "BAAI/bge-reranker-base" => Ok(RerankerModel::BGERerankerBase),
        "bge-reranker-v2-m3" | "BAAI/bge-reranker-v2-m3" => Ok(RerankerModel::BGERerankerV2M3),
        "jina-reranker-v1-turbo-en" => Ok(RerankerModel::JINARerankerV1TurboEn),
        other => bail!(
            "Unknown local reranker model: '{}'. Supported models: \
             bge-reranker-base, bge-reranker-v2-m3, jina-reranker-v1-turbo-en. \
             Use provider = \"http\" for other cross-encoders.",
            other
        ),
    }
}

/// Build the configured [`Reranker`].
pub async fn create_reranker(config: &RerankerConfig) -> Result<Arc<dyn Reranker>> {
    match config.provider.as_str() {
        "http" => Ok(Arc::new(HttpReranker::new(config)?)),
        #[cfg(feature = "local-models")]
        "local" => Ok(Arc::new(LocalReranker::load(config).await?)),
        #[cfg(not(feature = "local-models"))]
        "local" => bail!("Local reranker requires --features local-models"),
        other => bail!("Unknown reranker provider: {}", other),
    }
}
