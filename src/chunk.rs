//! `rag chunk`: run the header chunker on one file and print the result.

use anyhow::{Context, Result};
use std::path::Path;

use notes_rag_core::chunk::{chunk_by_headers, BoundaryDepths, Chunk};

pub fn run_chunk(path: &Path, depths: &BoundaryDepths, json: bool) -> Result<()> {
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read {}", path.display()))?;
    let chunks = chunk_by_headers(&text, depths);

    if json {
        println!("{}", serde_json::to_string_pretty(&chunks)?);
        return Ok(());
    }

    println!(
        "{}: {} chunks (boundary depths {})",
        path.display(),
        chunks.len(),
        depths
    );
    println!();
    for (i, chunk) in chunks.iter().enumerate() {
        print_chunk(i, chunk);
    }
    Ok(())
}

fn print_chunk(i: usize, chunk: &Chunk) {
    let path = if chunk.headers.is_empty() {
        "(no headers)".to_string()
    } else {
        chunk.headers.breadcrumb()
    };
    println!("--- Chunk {} ---", i + 1);
    println!("Headers: {}", path);
    if !chunk.metadata.tags.is_empty() {
        let tags: Vec<&str> = chunk.metadata.tags.iter().map(String::as_str).collect();
        println!("Tags: {}", tags.join(", "));
    }
    if !chunk.metadata.urls.is_empty() {
        println!("URLs: {}", chunk.metadata.urls.len());
    }
    if !chunk.metadata.internal_links.is_empty() {
        let links: Vec<&str> = chunk
            .metadata
            .internal_links
            .iter()
            .map(String::as_str)
            .collect();
        println!("Links: {}", links.join(", "));
    }
    println!("{}", chunk.content);
    println!();
}
