//! SQLite-backed [`VectorIndex`].
//!
//! One row in `collections` per collection and one row in `records`
//! per chunk. Embeddings are stored as little-endian `f32` BLOBs and
//! searched by brute force under the collection's metric.

use anyhow::{anyhow, bail, Result};
use async_trait::async_trait;
use sqlx::{Row, SqlitePool};
use tracing::{debug, info};

use notes_rag_core::chunk::content_hash;
use notes_rag_core::embedding::{blob_to_vec, vec_to_blob, DistanceMetric};
use notes_rag_core::store::{nearest, CollectionInfo, Neighbor, VectorIndex};
use notes_rag_core::RetrievalError;

/// A handle on one existing collection.
pub struct SqliteIndex {
    pool: SqlitePool,
    info: CollectionInfo,
}

impl SqliteIndex {
    /// Open an existing collection.
    ///
    /// Fails with [`RetrievalError::MissingCollection`] when no collection
    /// has this name and with [`RetrievalError::DistanceMismatch`] when it
    /// was created under a different metric. Both can be recovered with
    /// `err.downcast_ref::<RetrievalError>()`.
    pub async fn open(pool: SqlitePool, name: &str, distance: DistanceMetric) -> Result<Self> {
        let info = lookup(&pool, name)
            .await?
            .ok_or_else(|| RetrievalError::MissingCollection {
                name: name.to_string(),
            })?;
        if info.distance != distance {
            return Err(RetrievalError::DistanceMismatch {
                name: name.to_string(),
                configured: distance,
                stored: info.distance,
            }
            .into());
        }
        info!(collection = name, distance = %info.distance, "opened collection");
        Ok(Self { pool, info })
    }

    /// Create an empty collection `name`, replacing any collection of
    /// that name and all of its records.
    pub async fn create(
        pool: SqlitePool,
        name: &str,
        distance: DistanceMetric,
        embedding_model: &str,
        dims: usize,
    ) -> Result<Self> {
        Self::replace_all(pool, name, distance, embedding_model, dims, &[], &[]).await
    }

    /// Replace collection `name` with exactly `chunks`, stored under ids
    /// `"0"`, `"1"`, … in order.
    ///
    /// Deleting the old collection and writing the new one happen in one
    /// transaction. On any error nothing is committed and the previous
    /// collection is left as it was.
    pub async fn replace_all(
        pool: SqlitePool,
        name: &str,
        distance: DistanceMetric,
        embedding_model: &str,
        dims: usize,
        chunks: &[String],
        vectors: &[Vec<f32>],
    ) -> Result<Self> {
        if chunks.len() != vectors.len() {
            bail!(
                "{} chunks but {} embeddings; refusing to store a partial collection",
                chunks.len(),
                vectors.len()
            );
        }
        let info = CollectionInfo {
            name: name.to_string(),
            distance,
            embedding_model: embedding_model.to_string(),
            dims,
            created_at: chrono::Utc::now().timestamp(),
        };

        let mut tx = pool.begin().await?;

        let removed = sqlx::query("DELETE FROM records WHERE collection = ?")
            .bind(name)
            .execute(&mut *tx)
            .await?
            .rows_affected();
        sqlx::query("DELETE FROM collections WHERE name = ?")
            .bind(name)
            .execute(&mut *tx)
            .await?;
        sqlx::query(
            "INSERT INTO collections (name, distance, embedding_model, dims, created_at) VALUES (?, ?, ?, ?, ?)",
        )
        .bind(name)
        .bind(distance.as_str())
        .bind(embedding_model)
        .bind(dims as i64)
        .bind(info.created_at)
        .execute(&mut *tx)
        .await?;

        for (seq, (content, embedding)) in chunks.iter().zip(vectors).enumerate() {
            let id = seq.to_string();
            check_embedding(&info, &id, embedding)?;
            sqlx::query(
                "INSERT INTO records (collection, id, content, embedding, hash, seq) VALUES (?, ?, ?, ?, ?, ?)",
            )
            .bind(name)
            .bind(&id)
            .bind(content)
            .bind(vec_to_blob(embedding))
            .bind(content_hash(content))
            .bind(seq as i64)
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;
        info!(
            collection = name,
            removed,
            stored = chunks.len(),
            "replaced collection"
        );

        Ok(Self { pool, info })
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }
}

fn check_embedding(info: &CollectionInfo, id: &str, embedding: &[f32]) -> Result<()> {
    if embedding.is_empty() {
        bail!("refusing to store an empty embedding for record '{}'", id);
    }
    if info.dims > 0 && embedding.len() != info.dims {
        bail!(
            "embedding for record '{}' has {} dims, collection '{}' expects {}",
            id,
            embedding.len(),
            info.name,
            info.dims
        );
    }
    Ok(())
}

/// Metadata of collection `name`, if it exists.
pub async fn lookup(pool: &SqlitePool, name: &str) -> Result<Option<CollectionInfo>> {
    let row = sqlx::query(
        "SELECT name, distance, embedding_model, dims, created_at FROM collections WHERE name = ?",
    )
    .bind(name)
    .fetch_optional(pool)
    .await?;

    let row = match row {
        Some(row) => row,
        None => return Ok(None),
    };

    let distance: String = row.get("distance");
    let dims: i64 = row.get("dims");
    Ok(Some(CollectionInfo {
        name: row.get("name"),
        distance: distance.parse()?,
        embedding_model: row.get("embedding_model"),
        dims: dims.max(0) as usize,
        created_at: row.get("created_at"),
    }))
}

#[async_trait]
impl VectorIndex for SqliteIndex {
    fn collection(&self) -> &CollectionInfo {
        &self.info
    }

    async fn upsert(&self, id: &str, content: &str, embedding: &[f32]) -> Result<()> {
        check_embedding(&self.info, id, embedding)?;

        sqlx::query(
            r#"
            INSERT INTO records (collection, id, content, embedding, hash, seq)
            VALUES (?, ?, ?, ?, ?,
                    (SELECT COALESCE(MAX(seq) + 1, 0) FROM records WHERE collection = ?))
            ON CONFLICT(collection, id) DO UPDATE SET
                content = excluded.content,
                embedding = excluded.embedding,
                hash = excluded.hash
            "#,
        )
        .bind(&self.info.name)
        .bind(id)
        .bind(content)
        .bind(vec_to_blob(embedding))
        .bind(content_hash(content))
        .bind(&self.info.name)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn query_similar(&self, embedding: &[f32], k: usize) -> Result<Vec<Neighbor>> {
        if k == 0 {
            return Ok(Vec::new());
        }
        if embedding.is_empty() {
            return Err(anyhow!("query embedding is empty"));
        }

        let rows = sqlx::query(
            "SELECT id, content, embedding FROM records WHERE collection = ? ORDER BY seq ASC",
        )
        .bind(&self.info.name)
        .fetch_all(&self.pool)
        .await?;

        let metric = self.info.distance;
        let scored: Vec<Neighbor> = rows
            .iter()
            .map(|row| {
                let blob: Vec<u8> = row.get("embedding");
                Neighbor {
                    id: row.get("id"),
                    content: row.get("content"),
                    distance: metric.distance(embedding, &blob_to_vec(&blob)),
                }
            })
            .collect();

        debug!(scanned = scored.len(), k, "brute-force scan");
        Ok(nearest(scored, k))
    }

    async fn count(&self) -> Result<usize> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM records WHERE collection = ?")
            .bind(&self.info.name)
            .fetch_one(&self.pool)
            .await?;
        Ok(count.max(0) as usize)
    }
}
