//! Vector index provider.
//!
//! A [`VectorIndex`] is an immutable, in-memory collection of embedded chunks
//! searched by brute-force squared-L2 distance. Two kinds exist:
//!
//! - **base**: built offline by `nyay index build`, persisted at
//!   `index.base_path`, loaded at most once per process and shared read-only.
//! - **uploaded**: rebuilt from a single upload and owned by one session.
//!   Persisted at `<index.uploads_dir>/<session>.sqlite`; each rebuild fully
//!   replaces the previous file via write-to-temp + rename.
//!
//! [`IndexProvider`] owns construction, persistence and search. Search never
//! fails: embedding errors are logged and produce an empty result.

use anyhow::{Context, Result};
use sqlx::Row;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::OnceCell;

use crate::chunk::chunk_text;
use crate::config::Config;
use crate::db;
use crate::embedding::{self, EmbeddingProvider};
use crate::migrate;
use crate::models::{IndexedChunk, RetrievedChunk};
use crate::session::RequestScope;

/// Source identifier attached to chunks of an uploaded document.
pub const UPLOADED_SOURCE: &str = "uploaded";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IndexKind {
    Base,
    Uploaded,
}

impl IndexKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            IndexKind::Base => "base",
            IndexKind::Uploaded => "uploaded",
        }
    }
}

/// An immutable, similarity-searchable set of embedded chunks.
#[derive(Debug)]
pub struct VectorIndex {
    kind: IndexKind,
    model: String,
    dims: usize,
    chunks: Vec<IndexedChunk>,
}

impl VectorIndex {
    pub fn new(kind: IndexKind, model: &str, dims: usize, chunks: Vec<IndexedChunk>) -> Self {
        Self {
            kind,
            model: model.to_string(),
            dims,
            chunks,
        }
    }

    pub fn kind(&self) -> IndexKind {
        self.kind
    }
    pub fn model(&self) -> &str {
        &self.model
    }
    pub fn dims(&self) -> usize {
        self.dims
    }
    pub fn chunks(&self) -> &[IndexedChunk] {
        &self.chunks
    }
    pub fn len(&self) -> usize {
        self.chunks.len()
    }
    pub fn is_empty(&self) -> bool {
        self.chunks.is_empty()
    }

    /// The `k` closest chunks to `query_vec`, ascending by distance.
    ///
    /// With a `threshold`, only chunks strictly below it are kept.
    pub fn nearest(
        &self,
        query_vec: &[f32],
        k: usize,
        threshold: Option<f32>,
    ) -> Vec<RetrievedChunk> {
        let mut scored: Vec<(f32, &IndexedChunk)> = self
            .chunks
            .iter()
            .map(|c| (embedding::squared_l2_distance(query_vec, &c.embedding), c))
            .filter(|(d, _)| d.is_finite())
            .filter(|(d, _)| threshold.map_or(true, |t| *d < t))
            .collect();

        scored.sort_by(|a, b| {
            a.0.partial_cmp(&b.0)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then(a.1.source.cmp(&b.1.source))
                .then(a.1.chunk_index.cmp(&b.1.chunk_index))
        });
        scored.truncate(k);

        scored
            .into_iter()
            .map(|(distance, c)| RetrievedChunk {
                text: c.text.clone(),
                source: c.source.clone(),
                distance,
            })
            .collect()
    }

    /// Chunk and embed `(source, text)` documents into a new index.
    pub async fn build(
        kind: IndexKind,
        provider: &dyn EmbeddingProvider,
        documents: &[(String, String)],
        chunk_chars: usize,
        overlap_chars: usize,
        batch_size: usize,
    ) -> Result<Self> {
        let mut pending = Vec::new();
        for (source, text) in documents {
            for chunk in chunk_text(text, chunk_chars, overlap_chars) {
                pending.push((source.clone(), chunk));
            }
        }

        let texts: Vec<String> = pending.iter().map(|(_, c)| c.text.clone()).collect();
        let vectors = embedding::embed_batched(provider, &texts, batch_size).await?;

        let chunks = pending
            .into_iter()
            .zip(vectors)
            .map(|((source, chunk), embedding)| IndexedChunk {
                id: chunk.id,
                chunk_index: chunk.chunk_index,
                source,
                text: chunk.text,
                hash: chunk.hash,
                embedding,
            })
            .collect();

        Ok(Self::new(kind, provider.model_name(), provider.dims(), chunks))
    }

    /// Persist to `path`, atomically replacing whatever was there.
    pub async fn save(&self, path: &Path) -> Result<()> {
        let tmp = temp_path_for(path);
        if let Err(e) = self.write_file(&tmp).await {
            let _ = tokio::fs::remove_file(&tmp).await;
            return Err(e);
        }
        tokio::fs::rename(&tmp, path)
            .await
            .with_context(|| format!("Failed to move index into place at {}", path.display()))?;
        Ok(())
    }

    async fn write_file(&self, path: &Path) -> Result<()> {
        let pool = db::connect(path, true).await?;
        migrate::run_migrations(&pool).await?;

        let mut tx = pool.begin().await?;
        let built_at = chrono::Utc::now().to_rfc3339();
        let dims = self.dims.to_string();
        let meta = [
            ("schema_version", migrate::SCHEMA_VERSION),
            ("kind", self.kind.as_str()),
            ("model", self.model.as_str()),
            ("dims", dims.as_str()),
            ("built_at", built_at.as_str()),
        ];
        for (key, value) in meta {
            sqlx::query("INSERT OR REPLACE INTO index_meta (key, value) VALUES (?, ?)")
                .bind(key)
                .bind(value)
                .execute(&mut *tx)
                .await?;
        }

        for c in &self.chunks {
            sqlx::query(
                "INSERT INTO chunks (id, chunk_index, source, text, hash, embedding) \
                 VALUES (?, ?, ?, ?, ?, ?)",
            )
            .bind(&c.id)
            .bind(c.chunk_index)
            .bind(&c.source)
            .bind(&c.text)
            .bind(&c.hash)
            .bind(embedding::vec_to_blob(&c.embedding))
            .execute(&mut *tx)
            .await?;
        }
        tx.commit().await?;
        pool.close().await;
        Ok(())
    }

    /// Load a persisted index. `Ok(None)` when nothing exists at `path`.
    pub async fn load(path: &Path, kind: IndexKind) -> Result<Option<Self>> {
        if !path.exists() {
            return Ok(None);
        }

        let pool = db::connect(path, false).await?;

        let meta_rows = sqlx::query("SELECT key, value FROM index_meta")
            .fetch_all(&pool)
            .await
            .with_context(|| format!("{} is not an index file", path.display()))?;
        let mut model = String::new();
        let mut dims = 0usize;
        for row in &meta_rows {
            let key: String = row.get("key");
            let value: String = row.get("value");
            match key.as_str() {
                "model" => model = value,
                "dims" => {
                    dims = value.parse().with_context(|| {
                        format!("{} has a corrupt dims value {:?}", path.display(), value)
                    })?
                }
                _ => {}
            }
        }

        let rows = sqlx::query(
            "SELECT id, chunk_index, source, text, hash, embedding FROM chunks \
             ORDER BY source, chunk_index",
        )
        .fetch_all(&pool)
        .await?;

        let chunks = rows
            .iter()
            .map(|row| {
                let blob: Vec<u8> = row.get("embedding");
                IndexedChunk {
                    id: row.get("id"),
                    chunk_index: row.get("chunk_index"),
                    source: row.get("source"),
                    text: row.get("text"),
                    hash: row.get("hash"),
                    embedding: embedding::blob_to_vec(&blob),
                }
            })
            .collect();

        pool.close().await;
        Ok(Some(Self::new(kind, &model, dims, chunks)))
    }
}

/// Where a session's uploaded index lives under `uploads_dir`.
pub fn session_index_path(uploads_dir: &Path, session_id: &str) -> PathBuf {
    uploads_dir.join(format!("{}.sqlite", session_id))
}

/// Delete an index file; a file that is already gone is not an error.
async fn remove_index_file(path: &Path) {
    match tokio::fs::remove_file(path).await {
        Ok(()) => tracing::debug!(path = %path.display(), "index file removed"),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
        Err(e) => tracing::warn!(path = %path.display(), error = %e, "failed to remove index file"),
    }
}

fn temp_path_for(path: &Path) -> PathBuf {
    let file_name = path
        .file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_else(|| "index".to_string());
    path.with_file_name(format!(".{}.tmp-{}", file_name, uuid::Uuid::new_v4()))
}

/// Owns the base index and builds, loads and searches uploaded ones.
pub struct IndexProvider {
    embedder: Arc<dyn EmbeddingProvider>,
    base_path: PathBuf,
    uploads_dir: PathBuf,
    upload_chunk_chars: usize,
    upload_overlap_chars: usize,
    batch_size: usize,
    base: OnceCell<Option<Arc<VectorIndex>>>,
}

impl IndexProvider {
    pub fn new(config: &Config, embedder: Arc<dyn EmbeddingProvider>) -> Self {
        Self {
            embedder,
            base_path: config.index.base_path.clone(),
            uploads_dir: config.index.uploads_dir.clone(),
            upload_chunk_chars: config.chunking.upload_chunk_chars,
            upload_overlap_chars: config.chunking.upload_overlap_chars,
            batch_size: config.embedding.batch_size,
            base: OnceCell::new(),
        }
    }

    /// Use an already-built base index instead of reading `base_path`.
    pub fn with_base(self, base: Option<Arc<VectorIndex>>) -> Self {
        Self {
            base: OnceCell::new_with(Some(base)),
            ..self
        }
    }

    pub fn embedder(&self) -> &Arc<dyn EmbeddingProvider> {
        &self.embedder
    }

    /// The base index, loaded on first call and memoized for the process.
    ///
    /// A missing file is not an error; an unreadable one is logged and
    /// treated as absent.
    pub async fn base(&self) -> Option<Arc<VectorIndex>> {
        self.base
            .get_or_init(|| async {
                match VectorIndex::load(&self.base_path, IndexKind::Base).await {
                    Ok(Some(index)) => {
                        tracing::info!(
                            path = %self.base_path.display(),
                            chunks = index.len(),
                            model = index.model(),
                            "base index loaded"
                        );
                        self.warn_on_model_mismatch(&index);
                        Some(Arc::new(index))
                    }
                    Ok(None) => {
                        tracing::warn!(
                            path = %self.base_path.display(),
                            "no base index found; answers will rely on glossary and uploads"
                        );
                        None
                    }
                    Err(e) => {
                        tracing::error!(error = %e, "failed to load base index");
                        None
                    }
                }
            })
            .await
            .clone()
    }

    fn warn_on_model_mismatch(&self, index: &VectorIndex) {
        if index.model() != self.embedder.model_name() || index.dims() != self.embedder.dims() {
            tracing::warn!(
                index_model = index.model(),
                index_dims = index.dims(),
                embedder_model = self.embedder.model_name(),
                embedder_dims = self.embedder.dims(),
                "index was built with a different embedding model; search results may be empty"
            );
        }
    }

    pub fn uploaded_path(&self, session_id: &str) -> PathBuf {
        session_index_path(&self.uploads_dir, session_id)
    }

    /// The uploaded index for this request's session, reading the session's
    /// persisted file the first time the session is seen.
    pub async fn uploaded(&self, scope: &mut RequestScope) -> Option<Arc<VectorIndex>> {
        if !scope.is_loaded() {
            let loaded = match scope.session_id() {
                Some(id) => {
                    let path = self.uploaded_path(id);
                    match VectorIndex::load(&path, IndexKind::Uploaded).await {
                        Ok(index) => index.map(Arc::new),
                        Err(e) => {
                            tracing::warn!(session = id, error = %e, "failed to load uploaded index");
                            None
                        }
                    }
                }
                None => None,
            };
            scope.set_uploaded(loaded);
        }
        scope.uploaded()
    }

    /// Replace the session's uploaded index with one built from `text`.
    ///
    /// Blank text is a no-op returning `Ok(None)` and leaves the previous
    /// index in place. Otherwise the previous index is always gone afterwards:
    /// if building or persisting the new one fails, the session is left with
    /// no uploaded index and its file is removed. Persistent sessions get the
    /// new index written to disk before it becomes visible.
    pub async fn rebuild_uploaded(
        &self,
        scope: &mut RequestScope,
        text: &str,
    ) -> Result<Option<Arc<VectorIndex>>> {
        if text.trim().is_empty() {
            return Ok(None);
        }

        match self.build_uploaded(scope.session_id(), text).await {
            Ok(Some(index)) => {
                let index = Arc::new(index);
                scope.set_uploaded(Some(index.clone()));
                Ok(Some(index))
            }
            Ok(None) => {
                self.discard_uploaded(scope).await;
                Ok(None)
            }
            Err(e) => {
                self.discard_uploaded(scope).await;
                Err(e)
            }
        }
    }

    async fn build_uploaded(
        &self,
        session_id: Option<&str>,
        text: &str,
    ) -> Result<Option<VectorIndex>> {
        let documents = vec![(UPLOADED_SOURCE.to_string(), text.to_string())];
        let index = VectorIndex::build(
            IndexKind::Uploaded,
            self.embedder.as_ref(),
            &documents,
            self.upload_chunk_chars,
            self.upload_overlap_chars,
            self.batch_size,
        )
        .await?;

        if index.is_empty() {
            return Ok(None);
        }

        if let Some(id) = session_id {
            let path = self.uploaded_path(id);
            tokio::fs::create_dir_all(&self.uploads_dir).await?;
            index.save(&path).await?;
            tracing::debug!(session = id, chunks = index.len(), "uploaded index persisted");
        }
        Ok(Some(index))
    }

    /// Drop the session's uploaded index, in memory and on disk.
    pub async fn discard_uploaded(&self, scope: &mut RequestScope) {
        scope.set_uploaded(None);
        if let Some(id) = scope.session_id() {
            remove_index_file(&self.uploaded_path(id)).await;
        }
    }

    /// Up to `k` nearest chunks; empty on any embedding failure.
    pub async fn search(
        &self,
        index: &VectorIndex,
        query: &str,
        k: usize,
        threshold: Option<f32>,
    ) -> Vec<RetrievedChunk> {
        if index.is_empty() {
            return Vec::new();
        }
        match embedding::embed_query(self.embedder.as_ref(), query).await {
            Ok(query_vec) => index.nearest(&query_vec, k, threshold),
            Err(e) => {
                tracing::warn!(
                    index = index.kind().as_str(),
                    error = %e,
                    "similarity search failed; continuing without it"
                );
                Vec::new()
            }
        }
    }
}
