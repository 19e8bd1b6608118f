//! Per-session ownership of uploaded indexes.
//!
//! Each session id maps to one [`UploadSlot`] behind an async mutex. A
//! request takes the lock for its whole lifetime via [`RequestScope`], so
//! rebuild-then-search within a session is serialized and two sessions never
//! see each other's uploads.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};

use crate::error::InputError;
use crate::index::{session_index_path, VectorIndex};

const MAX_SESSION_ID_LEN: usize = 64;
const DEFAULT_IDLE: Duration = Duration::from_secs(3600);

/// The uploaded index currently associated with a session.
#[derive(Default)]
pub struct UploadSlot {
    /// Whether the slot has been hydrated from disk yet.
    loaded: bool,
    index: Option<Arc<VectorIndex>>,
}

struct SessionEntry {
    slot: Arc<AsyncMutex<UploadSlot>>,
    last_used: Instant,
}

impl SessionEntry {
    /// Only the registry holds the slot, so no request is using it.
    fn is_idle(&self) -> bool {
        Arc::strong_count(&self.slot) == 1
    }
}

/// Session id → slot map shared by all requests.
///
/// A session not opened for `idle` is dropped on a later [`open`]
/// together with its uploaded index file.
///
/// [`open`]: SessionRegistry::open
pub struct SessionRegistry {
    slots: Mutex<HashMap<String, SessionEntry>>,
    idle: Duration,
    uploads_dir: Option<PathBuf>,
}

impl Default for SessionRegistry {
    fn default() -> Self {
        Self {
            slots: Mutex::new(HashMap::new()),
            idle: DEFAULT_IDLE,
            uploads_dir: None,
        }
    }
}

impl SessionRegistry {
    /// A registry that forgets idle sessions but owns no files.
    pub fn new() -> Self {
        Self::default()
    }

    /// A registry that also deletes `<uploads_dir>/<session>.sqlite` when a
    /// session expires.
    pub fn with_expiry(idle: Duration, uploads_dir: impl Into<PathBuf>) -> Self {
        Self {
            idle,
            uploads_dir: Some(uploads_dir.into()),
            ..Self::default()
        }
    }

    /// Open the scope for one request.
    ///
    /// - With a session id: the session's shared slot, locked.
    /// - Without one but with an upload: a new session is minted so the
    ///   caller can ask follow-up questions against the same document.
    /// - Without either: a one-shot scope with no uploaded index.
    pub async fn open(
        &self,
        session_id: Option<&str>,
        has_upload: bool,
    ) -> Result<RequestScope, InputError> {
        let id = match session_id.map(str::trim).filter(|s| !s.is_empty()) {
            Some(id) => {
                validate_session_id(id)?;
                id.to_string()
            }
            None if has_upload => uuid::Uuid::new_v4().to_string(),
            None => return Ok(RequestScope::ephemeral()),
        };

        let slot = {
            let mut slots = self.slots.lock().unwrap_or_else(|p| p.into_inner());
            self.expire_idle(&mut slots);
            let entry = slots.entry(id.clone()).or_insert_with(|| SessionEntry {
                slot: Arc::default(),
                last_used: Instant::now(),
            });
            entry.last_used = Instant::now();
            entry.slot.clone()
        };

        Ok(RequestScope {
            session_id: Some(id),
            guard: slot.lock_owned().await,
        })
    }

    /// Drop every unused session idle for longer than `self.idle`.
    ///
    /// Files are removed while the map is locked so a request reopening the
    /// same id cannot write a new index that this sweep then deletes.
    fn expire_idle(&self, slots: &mut HashMap<String, SessionEntry>) {
        let expired: Vec<String> = slots
            .iter()
            .filter(|(_, entry)| entry.is_idle() && entry.last_used.elapsed() >= self.idle)
            .map(|(id, _)| id.clone())
            .collect();

        for id in expired {
            slots.remove(&id);
            if let Some(dir) = &self.uploads_dir {
                let path = session_index_path(dir, &id);
                match std::fs::remove_file(&path) {
                    Ok(()) => {}
                    Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                    Err(e) => {
                        tracing::warn!(session = %id, error = %e, "failed to delete expired session index")
                    }
                }
            }
            tracing::debug!(session = %id, "idle session expired");
        }
    }

    /// Delete session index files left by an earlier process that have not
    /// been touched for longer than the idle period. Returns how many were
    /// removed.
    pub async fn prune_stale_files(&self) -> usize {
        let Some(dir) = &self.uploads_dir else {
            return 0;
        };
        let mut entries = match tokio::fs::read_dir(dir).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return 0,
            Err(e) => {
                tracing::warn!(dir = %dir.display(), error = %e, "failed to scan uploads directory");
                return 0;
            }
        };

        let mut removed = 0;
        while let Ok(Some(entry)) = entries.next_entry().await {
            let path = entry.path();
            let Some(id) = path
                .file_name()
                .and_then(|n| n.to_str())
                .and_then(|n| n.strip_suffix(".sqlite"))
            else {
                continue;
            };
            if validate_session_id(id).is_err() || self.is_tracked(id) {
                continue;
            }
            let stale = entry
                .metadata()
                .await
                .and_then(|m| m.modified())
                .ok()
                .and_then(|modified| modified.elapsed().ok())
                .is_some_and(|age| age >= self.idle);
            if stale && tokio::fs::remove_file(&path).await.is_ok() {
                removed += 1;
            }
        }
        removed
    }

    fn is_tracked(&self, id: &str) -> bool {
        self.slots
            .lock()
            .map(|s| s.contains_key(id))
            .unwrap_or(false)
    }

    pub fn len(&self) -> usize {
        self.slots.lock().map(|s| s.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Session ids become file names, so only `[A-Za-z0-9_-]` is accepted.
pub fn validate_session_id(id: &str) -> Result<(), InputError> {
    let ok = !id.is_empty()
        && id.len() <= MAX_SESSION_ID_LEN
        && id
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_');
    if ok {
        Ok(())
    } else {
        Err(InputError::InvalidSessionId(id.to_string()))
    }
}

/// The state one request carries through the pipeline: its session and an
/// exclusive hold on that session's uploaded index.
pub struct RequestScope {
    session_id: Option<String>,
    guard: OwnedMutexGuard<UploadSlot>,
}

impl RequestScope {
    /// A scope with no session and nothing uploaded. Uploads into it live
    /// only for the request.
    pub fn ephemeral() -> Self {
        Self::fresh(None)
    }

    /// A scope for `session_id` that is not tracked by any registry. Used by
    /// the CLI, where one process serves one question.
    pub fn detached(session_id: &str) -> Self {
        Self::fresh(Some(session_id.to_string()))
    }

    fn fresh(session_id: Option<String>) -> Self {
        let slot = Arc::new(AsyncMutex::new(UploadSlot {
            loaded: session_id.is_none(),
            index: None,
        }));
        let guard = slot
            .try_lock_owned()
            .unwrap_or_else(|_| unreachable!("a fresh mutex is never contended"));
        Self { session_id, guard }
    }

    pub fn session_id(&self) -> Option<&str> {
        self.session_id.as_deref()
    }

    pub fn is_loaded(&self) -> bool {
        self.guard.loaded
    }

    pub fn uploaded(&self) -> Option<Arc<VectorIndex>> {
        self.guard.index.clone()
    }

    pub fn set_uploaded(&mut self, index: Option<Arc<VectorIndex>>) {
        self.guard.loaded = true;
        self.guard.index = index;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::index::IndexKind;
    use std::time::Duration;

    fn empty_index() -> Arc<VectorIndex> {
        Arc::new(VectorIndex::new(IndexKind::Uploaded, "m", 2, vec![]))
    }

    #[tokio::test]
    async fn test_no_session_no_upload_is_ephemeral() {
        let registry = SessionRegistry::new();
        let scope = registry.open(None, false).await.unwrap();
        assert!(scope.session_id().is_none());
        assert!(scope.is_loaded());
        assert!(registry.is_empty());
    }

    #[tokio::test]
    async fn test_upload_without_session_mints_one() {
        let registry = SessionRegistry::new();
        let scope = registry.open(None, true).await.unwrap();
        assert!(scope.session_id().is_some());
        assert_eq!(registry.len(), 1);
    }

    #[tokio::test]
    async fn test_sessions_are_isolated() {
        let registry = SessionRegistry::new();
        {
            let mut a = registry.open(Some("alice"), true).await.unwrap();
            a.set_uploaded(Some(empty_index()));
        }
        let b = registry.open(Some("bob"), false).await.unwrap();
        assert!(b.uploaded().is_none());

        let a = registry.open(Some("alice"), false).await.unwrap();
        assert!(a.uploaded().is_some());
    }

    #[tokio::test]
    async fn test_same_session_requests_are_serialized() {
        let registry = Arc::new(SessionRegistry::new());
        let first = registry.open(Some("s"), false).await.unwrap();

        let r = registry.clone();
        let waiter = tokio::spawn(async move { r.open(Some("s"), false).await.map(|_| ()) });

        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(!waiter.is_finished());

        drop(first);
        waiter.await.unwrap().unwrap();
    }

    #[tokio::test]
    async fn test_idle_one_shot_sessions_expire_with_their_files() {
        let dir = tempfile::tempdir().unwrap();
        let registry = SessionRegistry::with_expiry(Duration::ZERO, dir.path());

        for _ in 0..25 {
            let scope = registry.open(None, true).await.unwrap();
            let id = scope.session_id().unwrap().to_string();
            std::fs::write(session_index_path(dir.path(), &id), b"index").unwrap();
        }

        // Each open swept the sessions released before it.
        assert_eq!(registry.len(), 1);
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 1);
    }

    #[tokio::test]
    async fn test_sessions_in_use_never_expire() {
        let dir = tempfile::tempdir().unwrap();
        let registry = SessionRegistry::with_expiry(Duration::ZERO, dir.path());

        let mut held = registry.open(Some("held"), true).await.unwrap();
        held.set_uploaded(Some(empty_index()));
        std::fs::write(session_index_path(dir.path(), "held"), b"index").unwrap();

        let _other = registry.open(Some("other"), false).await.unwrap();
        assert_eq!(registry.len(), 2);
        assert!(held.uploaded().is_some());
        assert!(session_index_path(dir.path(), "held").exists());
    }

    #[tokio::test]
    async fn test_recent_sessions_survive_a_sweep() {
        let dir = tempfile::tempdir().unwrap();
        let registry = SessionRegistry::with_expiry(Duration::from_secs(3600), dir.path());
        drop(registry.open(Some("a"), true).await.unwrap());
        drop(registry.open(Some("b"), true).await.unwrap());
        assert_eq!(registry.len(), 2);
    }

    #[tokio::test]
    async fn test_prune_stale_files_skips_tracked_sessions() {
        let dir = tempfile::tempdir().unwrap();
        let registry = SessionRegistry::with_expiry(Duration::ZERO, dir.path());
        let _live = registry.open(Some("live"), true).await.unwrap();

        std::fs::write(session_index_path(dir.path(), "live"), b"index").unwrap();
        std::fs::write(session_index_path(dir.path(), "old"), b"index").unwrap();
        std::fs::write(dir.path().join("notes.txt"), b"keep").unwrap();

        assert_eq!(registry.prune_stale_files().await, 1);
        assert!(session_index_path(dir.path(), "live").exists());
        assert!(!session_index_path(dir.path(), "old").exists());
        assert!(dir.path().join("notes.txt").exists());
    }

    #[test]
    fn test_session_id_validation() {
        assert!(validate_session_id("abc-123_X").is_ok());
        assert!(validate_session_id("../etc/passwd").is_err());
        assert!(validate_session_id(&"a".repeat(65)).is_err());
    }

    #[tokio::test]
    async fn test_invalid_session_id_rejected() {
        let registry = SessionRegistry::new();
        let err = registry.open(Some("a/b"), false).await.err().unwrap();
        assert!(matches!(err, InputError::InvalidSessionId(_)));
    }
}
