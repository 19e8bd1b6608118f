//! Offline base-index builder and index inspection (`nyay index ...`).
//!
//! `build` walks the corpus directory, keeps files matching
//! `index.include_globs`, chunks them at the base chunk size, embeds the
//! chunks and writes the index atomically to `index.base_path`.

use anyhow::{bail, Context, Result};
use globset::{Glob, GlobSet, GlobSetBuilder};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

use crate::config::Config;
use crate::embedding::{self, EmbeddingProvider};
use crate::index::{IndexKind, IndexProvider, VectorIndex};

/// Read every matching document under `root` as `(relative path, text)`,
/// sorted by path. Blank files are skipped.
pub fn scan_corpus(root: &Path, include_globs: &[String]) -> Result<Vec<(String, String)>> {
    if !root.exists() {
        bail!("Source directory does not exist: {}", root.display());
    }

    let include_set = build_globset(include_globs)?;
    let exclude_set = build_globset(&["**/.*".to_string(), "**/.*/**".to_string()])?;

    let mut documents = Vec::new();
    for entry in WalkDir::new(root) {
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

        let text = match std::fs::read_to_string(path) {
            Ok(text) => text,
            Err(e) => {
                tracing::warn!(file = %rel_str, error = %e, "skipping unreadable file");
                continue;
            }
        };
        if text.trim().is_empty() {
            tracing::debug!(file = %rel_str, "skipping blank file");
            continue;
        }
        documents.push((rel_str, text));
    }

    documents.sort_by(|a, b| a.0.cmp(&b.0));
    Ok(documents)
}

fn build_globset(patterns: &[String]) -> Result<GlobSet> {
    let mut builder = GlobSetBuilder::new();
    for pattern in patterns {
        builder.add(Glob::new(pattern)?);
    }
    Ok(builder.build()?)
}

/// Build a base index from the corpus at `source_dir`.
pub async fn build_base_index(
    config: &Config,
    provider: &dyn EmbeddingProvider,
    source_dir: &Path,
) -> Result<VectorIndex> {
    let documents = scan_corpus(source_dir, &config.index.include_globs)?;
    if documents.is_empty() {
        bail!(
            "No documents matching {:?} found in {}",
            config.index.include_globs,
            source_dir.display()
        );
    }

    tracing::info!(documents = documents.len(), "building base index");
    VectorIndex::build(
        IndexKind::Base,
        provider,
        &documents,
        config.chunking.base_chunk_chars,
        config.chunking.base_overlap_chars,
        config.embedding.batch_size,
    )
    .await
}

/// `nyay index build`
pub async fn run_index_build(config: &Config, source: Option<PathBuf>, force: bool) -> Result<()> {
    if !config.embedding.is_enabled() {
        bail!("Embedding provider is disabled. Set [embedding] provider in config.");
    }

    let target = &config.index.base_path;
    if target.exists() && !force {
        bail!(
            "Base index already exists at {}. Pass --force to rebuild it.",
            target.display()
        );
    }

    let source_dir = source.unwrap_or_else(|| config.index.source_dir.clone());
    let provider = embedding::create_provider(&config.embedding)?;
    let index = build_base_index(config, provider.as_ref(), &source_dir).await?;

    if let Some(parent) = target.parent() {
        tokio::fs::create_dir_all(parent)
            .await
            .with_context(|| format!("Failed to create {}", parent.display()))?;
    }
    index.save(target).await?;

    let files = count_by_source(&index).len();
    println!("index build");
    println!("  source:  {}", source_dir.display());
    println!("  files:   {}", files);
    println!("  chunks:  {}", index.len());
    println!("  model:   {} ({} dims)", index.model(), index.dims());
    println!("  written: {}", target.display());
    Ok(())
}

/// `nyay index stats`
pub async fn run_index_stats(config: &Config, uploaded: Option<String>) -> Result<()> {
    let (path, kind) = match &uploaded {
        Some(session) => {
            crate::session::validate_session_id(session)?;
            let provider = IndexProvider::new(config, std::sync::Arc::new(embedding::DisabledProvider));
            (provider.uploaded_path(session), IndexKind::Uploaded)
        }
        None => (config.index.base_path.clone(), IndexKind::Base),
    };

    let Some(index) = VectorIndex::load(&path, kind).await? else {
        bail!("No {} index at {}", kind.as_str(), path.display());
    };
    let size = std::fs::metadata(&path).map(|m| m.len()).unwrap_or(0);

    println!("NyaySetu {} index", kind.as_str());
    println!("================================");
    println!();
    println!("  File:    {}", path.display());
    println!("  Size:    {}", format_bytes(size));
    println!("  Model:   {} ({} dims)", index.model(), index.dims());
    println!("  Chunks:  {}", index.len());

    let by_source = count_by_source(&index);
    if !by_source.is_empty() {
        println!();
        println!("  {:<40} {:>8}", "SOURCE", "CHUNKS");
        println!("  {}", "-".repeat(49));
        for (source, count) in &by_source {
            println!("  {:<40} {:>8}", source, count);
        }
    }
    println!();
    Ok(())
}

fn count_by_source(index: &VectorIndex) -> BTreeMap<&str, usize> {
    let mut counts = BTreeMap::new();
    for chunk in index.chunks() {
        *counts.entry(chunk.source.as_str()).or_insert(0) += 1;
    }
    counts
}

fn format_bytes(bytes: u64) -> String {
    if bytes < 1024 {
        format!("{} B", bytes)
    } else if bytes < 1024 * 1024 {
        format!("{:.1} KB", bytes as f64 / 1024.0)
    } else {
        format!("{:.1} MB", bytes as f64 / (1024.0 * 1024.0))
    }
}
