//! TOML configuration.
//!
//! Every section carries defaults, so a file holding only `[db] path`
//! and `[dataset] path` is a valid configuration. [`load_config`] parses
//! and validates in one step; nothing downstream re-checks ranges.

use anyhow::{bail, Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};

use notes_rag_core::chunk::BoundaryDepths;
use notes_rag_core::embedding::DistanceMetric;
use notes_rag_core::retrieve::RetrievalParams;

use crate::prompt::INSTRUCTION_PROMPT;

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    pub db: DbConfig,
    #[serde(default)]
    pub collection: CollectionConfig,
    pub dataset: DatasetConfig,
    #[serde(default)]
    pub chunking: ChunkingConfig,
    #[serde(default)]
    pub retrieval: RetrievalConfig,
    #[serde(default)]
    pub embedding: EmbeddingConfig,
    #[serde(default)]
    pub reranker: RerankerConfig,
    #[serde(default)]
    pub generation: GenerationConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct DbConfig {
    pub path: PathBuf,
}

#[derive(Debug, Deserialize, Clone)]
pub struct CollectionConfig {
    #[serde(default = "default_collection_name")]
    pub name: String,
    #[serde(default)]
    pub distance: DistanceMetric,
}

impl Default for CollectionConfig {
    fn default() -> Self {
        Self {
            name: default_collection_name(),
            distance: DistanceMetric::default(),
        }
    }
}

fn default_collection_name() -> String {
    "my_presentation_docs".to_string()
}

#[derive(Debug, Deserialize, Clone)]
pub struct DatasetConfig {
    /// A single notes file, or a directory walked with the globs below.
    pub path: PathBuf,
    #[serde(default = "default_include_globs")]
    pub include_globs: Vec<String>,
    #[serde(default)]
    pub exclude_globs: Vec<String>,
    #[serde(default)]
    pub follow_symlinks: bool,
}

fn default_include_globs() -> Vec<String> {
    vec!["**/*.md".to_string(), "**/*.txt".to_string()]
}

#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum ChunkStrategy {
    /// Header-aware markdown chunks.
    #[default]
    Headers,
    /// One chunk per non-empty line.
    Lines,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ChunkingConfig {
    #[serde(default)]
    pub strategy: ChunkStrategy,
    #[serde(default = "default_boundary_depths")]
    pub boundary_depths: Vec<usize>,
}

impl Default for ChunkingConfig {
    fn default() -> Self {
        Self {
            strategy: ChunkStrategy::default(),
            boundary_depths: default_boundary_depths(),
        }
    }
}

fn default_boundary_depths() -> Vec<usize> {
    vec![1, 2, 3]
}

impl ChunkingConfig {
    pub fn depths(&self) -> Result<BoundaryDepths> {
        let depths = BoundaryDepths::new(self.boundary_depths.iter().copied());
        depths
            .validate()
            .map_err(|e| anyhow::anyhow!("chunking.boundary_depths: {}", e))?;
        Ok(depths)
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct RetrievalConfig {
    #[serde(default = "default_candidate_pool_size")]
    pub candidate_pool_size: usize,
    #[serde(default = "default_top_n")]
    pub top_n: usize,
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            candidate_pool_size: default_candidate_pool_size(),
            top_n: default_top_n(),
        }
    }
}

fn default_candidate_pool_size() -> usize {
    10
}
fn default_top_n() -> usize {
    3
}

impl RetrievalConfig {
    pub fn params(&self) -> Result<RetrievalParams> {
        RetrievalParams::new(self.candidate_pool_size, self.top_n)
            .map_err(|e| anyhow::anyhow!("retrieval: {}", e))
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct EmbeddingConfig {
    #[serde(default = "default_embedding_provider")]
    pub provider: String,
    #[serde(default = "default_embedding_model")]
    pub model: String,
    #[serde(default)]
    pub dims: Option<usize>,
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
    #[serde(default)]
    pub max_retries: u32,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            provider: default_embedding_provider(),
            model: default_embedding_model(),
            dims: None,
            url: None,
            batch_size: default_batch_size(),
            max_retries: 0,
            timeout_secs: default_timeout_secs(),
        }
    }
}

fn default_embedding_provider() -> String {
    "ollama".to_string()
}
fn default_embedding_model() -> String {
    "hf.co/CompendiumLabs/bge-base-en-v1.5-gguf".to_string()
}
fn default_batch_size() -> usize {
    64
}
fn default_timeout_secs() -> u64 {
    30
}

#[derive(Debug, Deserialize, Clone)]
pub struct RerankerConfig {
    #[serde(default = "default_reranker_provider")]
    pub provider: String,
    #[serde(default = "default_reranker_model")]
    pub model: String,
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for RerankerConfig {
    fn default() -> Self {
        Self {
            provider: default_reranker_provider(),
            model: default_reranker_model(),
            url: None,
            timeout_secs: default_timeout_secs(),
        }
    }
}

fn default_reranker_provider() -> String {
    "local".to_string()
}
fn default_reranker_model() -> String {
    "bge-reranker-base".to_string()
}

#[derive(Debug, Deserialize, Clone)]
pub struct GenerationConfig {
    #[serde(default = "default_generation_provider")]
    pub provider: String,
    #[serde(default = "default_generation_model")]
    pub model: String,
    #[serde(default)]
    pub url: Option<String>,
    /// Longest wait for the next bytes of a streamed answer. The answer
    /// as a whole may take longer.
    #[serde(default = "default_generation_timeout_secs")]
    pub timeout_secs: u64,
    #[serde(default)]
    pub prompt_template: Option<String>,
}

impl Default for GenerationConfig {
    fn default() -> Self {
        Self {
            provider: default_generation_provider(),
            model: default_generation_model(),
            url: None,
            timeout_secs: default_generation_timeout_secs(),
            prompt_template: None,
        }
    }
}

fn default_generation_provider() -> String {
    "ollama".to_string()
}
fn default_generation_model() -> String {
    "Mistral-7B-Instruct-v0.2-Q4_K_M:latest".to_string()
}
fn default_generation_timeout_secs() -> u64 {
    300
}

impl GenerationConfig {
    /// The configured prompt template, or the built-in one.
    pub fn template(&self) -> &str {
        self.prompt_template.as_deref().unwrap_or(INSTRUCTION_PROMPT)
    }
}

pub fn load_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;

    let config: Config = toml::from_str(&content).with_context(|| "Failed to parse config file")?;
    validate(&config)?;
    Ok(config)
}

pub fn validate(config: &Config) -> Result<()> {
    if config.collection.name.trim().is_empty() {
        bail!("collection.name must not be empty");
    }

    config.chunking.depths()?;
    config.retrieval.params()?;

    match config.embedding.provider.as_str() {
        "ollama" | "openai" | "local" => {}
        other => bail!(
            "Unknown embedding provider: '{}'. Must be ollama, openai, or local.",
            other
        ),
    }
    if config.embedding.batch_size == 0 {
        bail!("embedding.batch_size must be > 0");
    }
    if config.embedding.dims == Some(0) {
        bail!("embedding.dims must be > 0 when set");
    }

    match config.reranker.provider.as_str() {
        "local" => {}
        "http" => {
            if config.reranker.url.is_none() {
                bail!("reranker.url must be specified when provider is 'http'");
            }
        }
        other => bail!(
            "Unknown reranker provider: '{}'. Must be local or http.",
            other
        ),
    }

    match config.generation.provider.as_str() {
        "ollama" | "openai" => {}
        other => bail!(
            "Unknown generation provider: '{}'. Must be ollama or openai.",
            other
        ),
    }
    if config.generation.timeout_secs == 0 {
        bail!("generation.timeout_secs must be > 0");
    }
    let template = config.generation.template();
    for placeholder in ["{retrieved_chunks}", "{user_query}"] {
        if !template.contains(placeholder) {
            bail!(
                "generation.prompt_template must contain the {} placeholder",
                placeholder
            );
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(toml_src: &str) -> Result<Config> {
        let config: Config = toml::from_str(toml_src)?;
        validate(&config)?;
        Ok(config)
    }

    const MINIMAL: &str = r#"
[db]
path = "./data/rag.sqlite"

[dataset]
path = "./notes"
"#;

    #[test]
    fn test_minimal_config_gets_defaults() {
        let config = parse(MINIMAL).unwrap();
        assert_eq!(config.collection.name, "my_presentation_docs");
        assert_eq!(config.collection.distance, DistanceMetric::Cosine);
        assert_eq!(config.chunking.strategy, ChunkStrategy::Headers);
        assert_eq!(config.chunking.boundary_depths, vec![1, 2, 3]);
        assert_eq!(config.retrieval.candidate_pool_size, 10);
        assert_eq!(config.retrieval.top_n, 3);
        assert_eq!(config.embedding.provider, "ollama");
        assert_eq!(config.embedding.max_retries, 0);
        assert_eq!(config.reranker.model, "bge-reranker-base");
        assert_eq!(
            config.generation.model,
            "Mistral-7B-Instruct-v0.2-Q4_K_M:latest"
        );
        assert_eq!(config.generation.template(), INSTRUCTION_PROMPT);
    }

    #[test]
    fn test_pool_smaller_than_top_n_rejected() {
        let src = format!("{}\n[retrieval]\ncandidate_pool_size = 2\ntop_n = 3\n", MINIMAL);
        let err = parse(&src).unwrap_err();
        assert!(format!("{:#}", err).contains("candidate_pool_size"));
    }

    #[test]
    fn test_zero_top_n_rejected() {
        let src = format!("{}\n[retrieval]\ntop_n = 0\n", MINIMAL);
        assert!(parse(&src).is_err());
    }

    #[test]
    fn test_boundary_depth_out_of_range_rejected() {
        let src = format!("{}\n[chunking]\nboundary_depths = [1, 7]\n", MINIMAL);
        let err = parse(&src).unwrap_err();
        assert!(format!("{:#}", err).contains("boundary_depths"));
    }

    #[test]
    fn test_unknown_providers_rejected() {
        let src = format!("{}\n[embedding]\nprovider = \"magic\"\n", MINIMAL);
        assert!(parse(&src).is_err());
        let src = format!("{}\n[reranker]\nprovider = \"http\"\n", MINIMAL);
        assert!(parse(&src).is_err());
        let src = format!("{}\n[generation]\nprovider = \"carrier-pigeon\"\n", MINIMAL);
        assert!(parse(&src).is_err());
    }

    #[test]
    fn test_distance_and_strategy_parse() {
        let src = format!(
            "{}\n[collection]\nname = \"n\"\ndistance = \"ip\"\n\n[chunking]\nstrategy = \"lines\"\n",
            MINIMAL
        );
        let config = parse(&src).unwrap();
        assert_eq!(config.collection.distance, DistanceMetric::InnerProduct);
        assert_eq!(config.chunking.strategy, ChunkStrategy::Lines);
    }

    #[test]
    fn test_template_without_placeholders_rejected() {
        let src = format!(
            "{}\n[generation]\nprompt_template = \"Answer: {{user_query}}\"\n",
            MINIMAL
        );
        let err = parse(&src).unwrap_err();
        assert!(err.to_string().contains("{retrieved_chunks}"));
    }

    #[test]
    fn test_zero_generation_timeout_rejected() {
        let src = format!("{}\n[generation]\ntimeout_secs = 0\n", MINIMAL);
        let err = parse(&src).unwrap_err();
        assert!(err.to_string().contains("generation.timeout_secs"));
    }
}
