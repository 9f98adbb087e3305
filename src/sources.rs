//! Dataset loading.
//!
//! The dataset is either a single notes file or a directory of notes
//! (e.g. an Obsidian vault) walked recursively and filtered by glob.
//! Documents come back sorted by relative path so that ingestion ids are
//! stable across runs.

use anyhow::{bail, Context, Result};
use globset::{Glob, GlobSet, GlobSetBuilder};
use std::path::Path;
use tracing::{debug, warn};
use walkdir::WalkDir;

use crate::config::DatasetConfig;

/// One source file of the dataset.
#[derive(Debug, Clone, PartialEq)]
pub struct NoteDocument {
    /// Path relative to the dataset root (the file name for single-file datasets).
    pub path: String,
    pub body: String,
}

pub fn load_dataset(config: &DatasetConfig) -> Result<Vec<NoteDocument>> {
    let root = &config.path;
    if !root.exists() {
        bail!("Dataset file not found at {}", root.display());
    }

    if root.is_file() {
        let body = std::fs::read_to_string(root)
            .with_context(|| format!("Failed to read dataset file: {}", root.display()))?;
        let name = root
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_default();
        return Ok(vec![NoteDocument { path: name, body }]);
    }

    scan_directory(root, config)
}

fn scan_directory(root: &Path, config: &DatasetConfig) -> Result<Vec<NoteDocument>> {
    let include_set = build_globset(&config.include_globs)?;

    let mut default_excludes = vec![
        "**/.git/**".to_string(),
        "**/.obsidian/**".to_string(),
        "**/.trash/**".to_string(),
    ];
    default_excludes.extend(config.exclude_globs.clone());
    let exclude_set = build_globset(&default_excludes)?;

    let mut documents = Vec::new();

    let walker = WalkDir::new(root).follow_links(config.follow_symlinks);
    for entry in walker {
        let entry = entry?;
        if !entry.file_type().is_file() {
            continue;
        }

        let path = entry.path();
        let relative = path.strip_prefix(root).unwrap_or(path);
        let rel_str = relative.to_string_lossy().replace('\\', "/");

        if exclude_set.is_match(&rel_str) || !include_set.is_match(&rel_str) {
            continue;
        }

        match std::fs::read_to_string(path) {
            Ok(body) => documents.push(NoteDocument {
                path: rel_str,
                body,
            }),
            Err(e) => warn!(path = %path.display(), error = %e, "skipping unreadable file"),
        }
    }

    documents.sort_by(|a, b| a.path.cmp(&b.path));
    debug!(root = %root.display(), documents = documents.len(), "scanned dataset");
    Ok(documents)
}

fn build_globset(patterns: &[String]) -> Result<GlobSet> {
    let mut builder = GlobSetBuilder::new();
    for pattern in patterns {
        builder.add(Glob::new(pattern).with_context(|| format!("Invalid glob: '{}'", pattern))?);
    }
    Ok(builder.build()?)
}
