//! In-memory [`VectorIndex`] for tests and WASM targets.
//!
//! Records live in a `Vec` behind `std::sync::RwLock`. Search is
//! brute force over every stored vector.

use std::sync::RwLock;

use anyhow::{anyhow, bail, Result};
use async_trait::async_trait;

use crate::embedding::DistanceMetric;

use super::{nearest, CollectionInfo, Neighbor, VectorIndex};

struct StoredRecord {
    id: String,
    content: String,
    vector: Vec<f32>,
}

/// In-memory collection.
pub struct InMemoryIndex {
    info: CollectionInfo,
    records: RwLock<Vec<StoredRecord>>,
}

impl InMemoryIndex {
    pub fn new(name: &str, distance: DistanceMetric) -> Self {
        Self {
            info: CollectionInfo {
                name: name.to_string(),
                distance,
                embedding_model: String::new(),
                dims: 0,
                created_at: chrono::Utc::now().timestamp(),
            },
            records: RwLock::new(Vec::new()),
        }
    }

    /// Build a collection from `(id, content, embedding)` triples.
    pub fn from_records<I, S>(name: &str, distance: DistanceMetric, records: I) -> Self
    where
        I: IntoIterator<Item = (S, S, Vec<f32>)>,
        S: Into<String>,
    {
        let index = Self::new(name, distance);
        if let Ok(mut guard) = index.records.write() {
            for (id, content, vector) in records {
                guard.push(StoredRecord {
                    id: id.into(),
                    content: content.into(),
                    vector,
                });
            }
        }
        index
    }
}

#[async_trait]
impl VectorIndex for InMemoryIndex {
    fn collection(&self) -> &CollectionInfo {
        &self.info
    }

    async fn upsert(&self, id: &str, content: &str, embedding: &[f32]) -> Result<()> {
        if embedding.is_empty() {
            bail!("refusing to store an empty embedding for record '{}'", id);
        }
        let mut records = self
            .records
            .write()
            .map_err(|_| anyhow!("in-memory index lock poisoned"))?;
        match records.iter_mut().find(|r| r.id == id) {
            Some(existing) => {
                existing.content = content.to_string();
                existing.vector = embedding.to_vec();
            }
            None => records.push(StoredRecord {
                id: id.to_string(),
                content: content.to_string(),
                vector: embedding.to_vec(),
            }),
        }
        Ok(())
    }

    async fn query_similar(&self, embedding: &[f32], k: usize) -> Result<Vec<Neighbor>> {
        if k == 0 {
            return Ok(Vec::new());
        }
        let records = self
            .records
            .read()
            .map_err(|_| anyhow!("in-memory index lock poisoned"))?;
        let scored: Vec<Neighbor> = records
            .iter()
            .map(|r| Neighbor {
                id: r.id.clone(),
                content: r.content.clone(),
                distance: self.info.distance.distance(embedding, &r.vector),
            })
            .collect();
        Ok(nearest(scored, k))
    }

    async fn count(&self) -> Result<usize> {
        let records = self
            .records
            .read()
            .map_err(|_| anyhow!("in-memory index lock poisoned"))?;
        Ok(records.len())
    }
}
