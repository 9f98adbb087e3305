//! Ingestion pipeline orchestration.
//!
//! Coordinates the flow: dataset → segmentation → embedding → storage.
//! Every chunk is embedded before the collection is touched, and the
//! collection is then replaced in a single transaction, so a failed run
//! leaves the previous collection intact.

use anyhow::{bail, Result};
use tracing::info;

use notes_rag_core::chunk::{chunk_by_headers, chunk_lines};
use notes_rag_core::embedding::Embedder;
use notes_rag_core::store::VectorIndex;

use crate::config::{ChunkStrategy, Config};
use crate::db;
use crate::embedding::create_embedder;
use crate::migrate;
use crate::progress::{IngestProgressEvent, IngestProgressReporter};
use crate::sources::{load_dataset, NoteDocument};
use crate::sqlite_index::{self, SqliteIndex};

/// Split every document into chunk texts, in document order.
pub fn segment(config: &Config, documents: &[NoteDocument]) -> Result<Vec<String>> {
    match config.chunking.strategy {
        ChunkStrategy::Lines => Ok(documents
            .iter()
            .flat_map(|doc| chunk_lines(&doc.body))
            .collect()),
        ChunkStrategy::Headers => {
            let depths = config.chunking.depths()?;
            Ok(documents
                .iter()
                .flat_map(|doc| chunk_by_headers(&doc.body, &depths))
                .map(|chunk| chunk.content)
                .collect())
        }
    }
}

/// Embed `chunks` in batches of `batch_size`, reporting progress.
pub async fn embed_chunks(
    embedder: &dyn Embedder,
    chunks: &[String],
    batch_size: usize,
    collection: &str,
    progress: &dyn IngestProgressReporter,
) -> Result<Vec<Vec<f32>>> {
    let total = chunks.len() as u64;
    let mut vectors = Vec::with_capacity(chunks.len());

    for batch in chunks.chunks(batch_size.max(1)) {
        let embedded = embedder.embed(batch).await?;
        if embedded.len() != batch.len() {
            bail!(
                "embedder '{}' returned {} vectors for {} chunks",
                embedder.model_name(),
                embedded.len(),
                batch.len()
            );
        }
        vectors.extend(embedded);
        progress.report(IngestProgressEvent::Embedding {
            collection: collection.to_string(),
            n: vectors.len() as u64,
            total,
        });
    }

    if let Some(first) = vectors.first() {
        let dims = first.len();
        if dims == 0 || vectors.iter().any(|v| v.len() != dims) {
            bail!(
                "embedder '{}' returned inconsistent embedding dimensions",
                embedder.model_name()
            );
        }
    }
    Ok(vectors)
}

/// Upsert chunks with sequential ids `"0"`, `"1"`, … Returns the count.
pub async fn store_chunks(
    index: &dyn VectorIndex,
    chunks: &[String],
    vectors: &[Vec<f32>],
) -> Result<usize> {
    if chunks.len() != vectors.len() {
        bail!(
            "{} chunks but {} embeddings; refusing to store a partial collection",
            chunks.len(),
            vectors.len()
        );
    }
    for (n, (content, embedding)) in chunks.iter().zip(vectors).enumerate() {
        index.upsert(&n.to_string(), content, embedding).await?;
    }
    Ok(chunks.len())
}

pub async fn run_ingest(
    config: &Config,
    rebuild: bool,
    dry_run: bool,
    progress: &dyn IngestProgressReporter,
) -> Result<()> {
    let collection = &config.collection.name;
    progress.report(IngestProgressEvent::Scanning {
        collection: collection.clone(),
    });

    let documents = load_dataset(&config.dataset)?;
    let chunks = segment(config, &documents)?;
    if chunks.is_empty() {
        bail!(
            "No valid documents found in dataset at {}",
            config.dataset.path.display()
        );
    }

    if dry_run {
        println!("ingest {} (dry-run)", collection);
        println!("  documents found: {}", documents.len());
        println!("  chunks: {}", chunks.len());
        return Ok(());
    }

    let pool = db::connect(config).await?;
    migrate::run_migrations(&pool).await?;

    if !rebuild {
        if let Some(existing) = sqlite_index::lookup(&pool, collection).await? {
            let index =
                SqliteIndex::open(pool.clone(), collection, existing.distance).await?;
            let count = index.count().await?;
            if count > 0 {
                println!(
                    "Collection '{}' already contains {} chunks. Skipping ingestion.",
                    collection, count
                );
                println!("To re-ingest data, run `rag ingest --rebuild`.");
                pool.close().await;
                return Ok(());
            }
        }
    }

    let embedder = create_embedder(&config.embedding).await?;
    info!(
        documents = documents.len(),
        chunks = chunks.len(),
        model = embedder.model_name(),
        "embedding dataset"
    );
    let vectors = embed_chunks(
        embedder.as_ref(),
        &chunks,
        config.embedding.batch_size,
        collection,
        progress,
    )
    .await?;
    let dims = vectors.first().map(Vec::len).unwrap_or(0);

    SqliteIndex::replace_all(
        pool.clone(),
        collection,
        config.collection.distance,
        embedder.model_name(),
        dims,
        &chunks,
        &vectors,
    )
    .await?;
    let stored = chunks.len();
    info!(collection = %collection, stored, dims, "ingestion complete");

    println!("ingest {}", collection);
    println!("  documents: {}", documents.len());
    println!("  chunks written: {}", stored);
    println!("  model: {} ({} dims)", embedder.model_name(), dims);
    println!("  database: {}", config.db.path.display());
    println!("ok");

    pool.close().await;
    Ok(())
}
