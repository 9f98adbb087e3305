//! Embedding capability trait, distance metrics, and vector utilities.
//!
//! Concrete embedders (Ollama, OpenAI, fastembed) live in the `notes-rag`
//! app crate. The same embedder must be used for ingestion and for
//! queries: distances are only meaningful within one embedding space.

use std::fmt;
use std::str::FromStr;

use anyhow::{anyhow, bail, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// Turns text into vectors.
#[async_trait]
pub trait Embedder: Send + Sync {
    /// Returns the model identifier (e.g. `"bge-base-en-v1.5"`).
    fn model_name(&self) -> &str;

    /// Returns the vector dimensionality, or `0` when not known up front.
    fn dims(&self) -> usize;

    /// Embed a batch of texts. Returns one vector per input, in input order.
    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>>;

    /// Embed a single text.
    async fn embed_one(&self, text: &str) -> Result<Vec<f32>> {
        let mut vectors = self.embed(&[text.to_string()]).await?;
        if vectors.len() != 1 {
            bail!(
                "embedder '{}' returned {} vectors for 1 input",
                self.model_name(),
                vectors.len()
            );
        }
        vectors
            .pop()
            .ok_or_else(|| anyhow!("Empty embedding response"))
    }
}

/// Distance metric of a collection, fixed when the collection is created.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DistanceMetric {
    /// `1 − cos(a, b)`, in `[0, 2]`.
    #[default]
    Cosine,
    /// Squared euclidean distance.
    L2,
    /// `1 − a·b`.
    #[serde(rename = "ip")]
    InnerProduct,
}

impl DistanceMetric {
    pub fn distance(&self, a: &[f32], b: &[f32]) -> f64 {
        match self {
            DistanceMetric::Cosine => 1.0 - cosine_similarity(a, b) as f64,
            DistanceMetric::L2 => {
                if a.len() != b.len() {
                    return f64::INFINITY;
                }
                a.iter()
                    .zip(b.iter())
                    .map(|(x, y)| {
                        let d = (*x - *y) as f64;
                        d * d
                    })
                    .sum()
            }
            DistanceMetric::InnerProduct => {
                if a.len() != b.len() {
                    return f64::INFINITY;
                }
                let dot: f64 = a
                    .iter()
                    .zip(b.iter())
                    .map(|(x, y)| (*x as f64) * (*y as f64))
                    .sum();
                1.0 - dot
            }
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            DistanceMetric::Cosine => "cosine",
            DistanceMetric::L2 => "l2",
            DistanceMetric::InnerProduct => "ip",
        }
    }
}

impl FromStr for DistanceMetric {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "cosine" => Ok(DistanceMetric::Cosine),
            "l2" => Ok(DistanceMetric::L2),
            "ip" => Ok(DistanceMetric::InnerProduct),
            other => bail!(
                "Unknown distance metric: '{}'. Must be cosine, l2, or ip.",
                other
            ),
        }
    }
}

impl fmt::Display for DistanceMetric {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Stage-1 diagnostic similarity: `1 − distance`.
///
/// Only meaningful as a bounded value for cosine collections.
pub fn distance_to_similarity(distance: f64) -> f64 {
    1.0 - distance
}

/// Encode a float vector as a BLOB (little-endian f32 bytes).
///
/// # Example
///
/// ```rust
/// use notes_rag_core::embedding::{vec_to_blob, blob_to_vec};
///
/// let v = vec![1.0f32, -2.5, 3.125];
/// let blob = vec_to_blob(&v);
/// assert_eq!(blob.len(), 12);
/// assert_eq!(blob_to_vec(&blob), v);
/// ```
pub fn vec_to_blob(vec: &[f32]) -> Vec<u8> {
    let mut bytes = Vec::with_capacity(vec.len() * 4);
    for &v in vec {
        bytes.extend_from_slice(&v.to_le_bytes());
    }
    bytes
}

/// Decode a BLOB back into a float vector.
pub fn blob_to_vec(blob: &[u8]) -> Vec<f32> {
    blob.chunks_exact(4)
        .map(|chunk| f32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]))
        .collect()
}

/// Compute cosine similarity between two embedding vectors.
///
/// Returns a value in `[-1.0, 1.0]`, or `0.0` for empty vectors or
/// vectors of different lengths.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }

    let mut dot = 0.0f32;
    let mut norm_a = 0.0f32;
    let mut norm_b = 0.0f32;

    for (x, y) in a.iter().zip(b.iter()) {
        dot += x * y;
        norm_a += x * x;
        norm_b += y * y;
    }

    let denom = norm_a.sqrt() * norm_b.sqrt();
    if denom < f32::EPSILON {
        return 0.0;
    }

    dot / denom
}
