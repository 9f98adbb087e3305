//! Collection statistics.
//!
//! `rag stats` gives a quick summary of what's indexed: which collection,
//! under which metric and embedding model, and how many chunks.

use anyhow::Result;
use sqlx::Row;

use notes_rag_core::store::VectorIndex;

use crate::config::Config;
use crate::db;
use crate::migrate;
use crate::sqlite_index::SqliteIndex;

pub async fn run_stats(config: &Config) -> Result<()> {
    let pool = db::connect(config).await?;
    migrate::run_migrations(&pool).await?;

    let db_size = std::fs::metadata(&config.db.path)
        .map(|m| m.len())
        .unwrap_or(0);

    println!("Notes RAG: Database Stats");
    println!("=========================");
    println!();
    println!("  Database:    {}", config.db.path.display());
    println!("  Size:        {}", format_bytes(db_size));
    println!();

    let index = SqliteIndex::open(pool.clone(), &config.collection.name, config.collection.distance)
        .await?;
    let info = index.collection();
    println!("  Collection:  {}", info.name);
    println!("  Distance:    {}", info.distance);
    println!("  Model:       {}", info.embedding_model);
    println!("  Dims:        {}", info.dims);
    println!("  Chunks:      {}", index.count().await?);
    println!("  Created:     {}", format_ts_relative(info.created_at));

    let others = sqlx::query("SELECT name FROM collections WHERE name != ? ORDER BY name")
        .bind(&info.name)
        .fetch_all(&pool)
        .await?;
    if !others.is_empty() {
        let names: Vec<String> = others.iter().map(|row| row.get("name")).collect();
        println!();
        println!("  Other collections: {}", names.join(", "));
    }
    println!();

    pool.close().await;
    Ok(())
}

/// Format a byte count as a human-readable string.
fn format_bytes(bytes: u64) -> String {
    if bytes < 1024 {
        format!("{} B", bytes)
    } else if bytes < 1024 * 1024 {
        format!("{:.1} KB", bytes as f64 / 1024.0)
    } else if bytes < 1024 * 1024 * 1024 {
        format!("{:.1} MB", bytes as f64 / (1024.0 * 1024.0))
    } else {
        format!("{:.2} GB", bytes as f64 / (1024.0 * 1024.0 * 1024.0))
    }
}

/// Format a Unix timestamp as a relative time string (e.g. "3 hours ago").
fn format_ts_relative(ts: i64) -> String {
    let delta = chrono::Utc::now().timestamp() - ts;
    if delta < 0 {
        return format_ts_iso(ts);
    }
    if delta < 60 {
        "just now".to_string()
    } else if delta < 3600 {
        let mins = delta / 60;
        format!("{} min{} ago", mins, if mins == 1 { "" } else { "s" })
    } else if delta < 86400 {
        let hours = delta / 3600;
        format!("{} hour{} ago", hours, if hours == 1 { "" } else { "s" })
    } else if delta < 86400 * 30 {
        let days = delta / 86400;
        format!("{} day{} ago", days, if days == 1 { "" } else { "s" })
    } else {
        format_ts_iso(ts)
    }
}

fn format_ts_iso(ts: i64) -> String {
    chrono::DateTime::from_timestamp(ts, 0)
        .map(|dt| dt.format("%Y-%m-%d %H:%M").to_string())
        .unwrap_or_else(|| ts.to_string())
}
