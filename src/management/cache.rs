use std::{
    collections::HashMap,
    path::{Path, PathBuf},
    sync::Arc,
    time::{Duration, Instant},
};

use async_trait::async_trait;
use chrono::Utc;
use futures::StreamExt;
use serde::{Deserialize, Serialize, de::DeserializeOwned};
use thiserror::Error;
use tokio::sync::RwLock;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};
use uuid::Uuid;

/// Cache keys shared by the service.
pub mod keys {
    use crate::types::CountRange;

    pub const TOKEN: &str = "spotify_token";
    pub const USER_TRACKS: &str = "userTracks";
    pub const TRACK_SUMMARY: &str = "track_summary";
    pub const PLAYLIST_TRACKS_PREFIX: &str = "tracksPlaylist";

    /// `track_summary` when unfiltered, `track_summary_{min}_{max}` otherwise.
    pub fn track_summary(range: CountRange) -> String {
        if range.is_unbounded() {
            TRACK_SUMMARY.to_string()
        } else {
            format!("{}_{}_{}", TRACK_SUMMARY, range.min, range.max)
        }
    }

    pub fn playlist_tracks(playlist_id: &str) -> String {
        format!("{}{}", PLAYLIST_TRACKS_PREFIX, playlist_id)
    }
}

pub const TOKEN_TTL: Duration = Duration::from_secs(24 * 60 * 60);
pub const DATA_TTL: Duration = Duration::from_secs(5 * 60);

#[derive(Error, Debug)]
pub enum CacheError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serde(#[from] serde_json::Error),

    #[error("Cache call cancelled")]
    Cancelled,
}

/// Keyed string storage with per-entry TTL.
#[async_trait]
pub trait CacheBackend: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<String>, CacheError>;
    async fn set(&self, key: &str, value: String, ttl: Duration) -> Result<(), CacheError>;
    async fn delete(&self, key: &str) -> Result<(), CacheError>;
    async fn delete_prefix(&self, prefix: &str) -> Result<(), CacheError>;
    async fn clear(&self) -> Result<(), CacheError>;

    /// `false` for backends that discard every write.
    fn retains_values(&self) -> bool {
        true
    }
}

/// Backend used when no cache is configured: reads miss, writes vanish.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopCache;

#[async_trait]
impl CacheBackend for NoopCache {
    async fn get(&self, _key: &str) -> Result<Option<String>, CacheError> {
        Ok(None)
    }

    async fn set(&self, _key: &str, _value: String, _ttl: Duration) -> Result<(), CacheError> {
        Ok(())
    }

    async fn delete(&self, _key: &str) -> Result<(), CacheError> {
        Ok(())
    }

    async fn delete_prefix(&self, _prefix: &str) -> Result<(), CacheError> {
        Ok(())
    }

    async fn clear(&self) -> Result<(), CacheError> {
        Ok(())
    }

    fn retains_values(&self) -> bool {
        false
    }
}

struct MemoryEntry {
    value: String,
    expires_at: Instant,
}

/// Process-local backend. Expired entries are dropped lazily.
#[derive(Default)]
pub struct MemoryCache {
    entries: RwLock<HashMap<String, MemoryEntry>>,
}

impl MemoryCache {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl CacheBackend for MemoryCache {
    async fn get(&self, key: &str) -> Result<Option<String>, CacheError> {
        let entries = self.entries.read().await;
        Ok(entries
            .get(key)
            .filter(|entry| entry.expires_at > Instant::now())
            .map(|entry| entry.value.clone()))
    }

    async fn set(&self, key: &str, value: String, ttl: Duration) -> Result<(), CacheError> {
        let now = Instant::now();
        let mut entries = self.entries.write().await;
        entries.retain(|_, entry| entry.expires_at > now);
        entries.insert(
            key.to_string(),
            MemoryEntry {
                value,
                expires_at: now + ttl,
            },
        );
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<(), CacheError> {
        self.entries.write().await.remove(key);
        Ok(())
    }

    async fn delete_prefix(&self, prefix: &str) -> Result<(), CacheError> {
        self.entries
            .write()
            .await
            .retain(|key, _| !key.starts_with(prefix));
        Ok(())
    }

    async fn clear(&self) -> Result<(), CacheError> {
        self.entries.write().await.clear();
        Ok(())
    }
}

#[derive(Debug, Serialize, Deserialize)]
struct FileEntry {
    key: String,
    value: String,
    expires_at_ms: i64,
}

/// One JSON file per key under a directory. Survives restarts.
///
/// Writers stage into a uniquely named temp file and rename it over the
/// entry, so concurrent writers of one key never share a temp file and
/// readers only ever see a complete entry.
pub struct FileCache {
    dir: PathBuf,
}

impl FileCache {
    pub async fn open(dir: impl Into<PathBuf>) -> Result<Self, CacheError> {
        let dir = dir.into();
        async_fs::create_dir_all(&dir).await?;
        Ok(Self { dir })
    }

    fn file_name(key: &str) -> String {
        let safe: String = key
            .chars()
            .map(|c| {
                if c.is_ascii_alphanumeric() || c == '_' || c == '-' {
                    c
                } else {
                    '_'
                }
            })
            .collect();
        format!("{}.json", safe)
    }

    fn path_for(&self, key: &str) -> PathBuf {
        self.dir.join(Self::file_name(key))
    }

    /// Removes every entry file whose name starts with `prefix`.
    async fn remove_matching(&self, prefix: &str) -> Result<(), CacheError> {
        let mut entries = async_fs::read_dir(&self.dir).await?;
        while let Some(entry) = entries.next().await {
            let entry = entry?;
            let name = entry.file_name();
            let Some(name) = name.to_str() else {
                continue;
            };
            if name.ends_with(".json") && name.starts_with(prefix) {
                remove_if_exists(&entry.path()).await?;
            }
        }
        Ok(())
    }
}

async fn remove_if_exists(path: &Path) -> Result<(), CacheError> {
    match async_fs::remove_file(path).await {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(e.into()),
    }
}

#[async_trait]
impl CacheBackend for FileCache {
    async fn get(&self, key: &str) -> Result<Option<String>, CacheError> {
        let path = self.path_for(key);
        let content = match async_fs::read_to_string(&path).await {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };

        let entry: FileEntry = serde_json::from_str(&content)?;
        if entry.key != key {
            return Ok(None);
        }
        if entry.expires_at_ms <= Utc::now().timestamp_millis() {
            remove_if_exists(&path).await?;
            return Ok(None);
        }
        Ok(Some(entry.value))
    }

    async fn set(&self, key: &str, value: String, ttl: Duration) -> Result<(), CacheError> {
        let entry = FileEntry {
            key: key.to_string(),
            value,
            expires_at_ms: Utc::now().timestamp_millis() + ttl.as_millis() as i64,
        };
        let path = self.path_for(key);
        let tmp = path.with_extension(format!("json.{}.tmp", Uuid::new_v4().simple()));
        async_fs::write(&tmp, serde_json::to_vec(&entry)?).await?;
        if let Err(e) = async_fs::rename(&tmp, &path).await {
            remove_if_exists(&tmp).await?;
            return Err(e.into());
        }
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<(), CacheError> {
        remove_if_exists(&self.path_for(key)).await
    }

    async fn delete_prefix(&self, prefix: &str) -> Result<(), CacheError> {
        let prefix = Self::file_name(prefix);
        let prefix = prefix.trim_end_matches(".json");
        self.remove_matching(prefix).await
    }

    async fn clear(&self) -> Result<(), CacheError> {
        self.remove_matching("").await
    }
}

/// Typed front of a [`CacheBackend`] with the service's namespaces.
///
/// Values are stored as JSON. Every call races the caller's cancellation
/// token; invalidation is best-effort and only logs failures.
#[derive(Clone)]
pub struct CacheStore {
    backend: Arc<dyn CacheBackend>,
}

impl CacheStore {
    pub fn new(backend: Arc<dyn CacheBackend>) -> Self {
        Self { backend }
    }

    pub fn disabled() -> Self {
        Self::new(Arc::new(NoopCache))
    }

    pub fn memory() -> Self {
        Self::new(Arc::new(MemoryCache::new()))
    }

    /// Whether values written here can be read back.
    pub fn retains_values(&self) -> bool {
        self.backend.retains_values()
    }

    pub async fn get<T: DeserializeOwned>(
        &self,
        key: &str,
        cancel: &CancellationToken,
    ) -> Result<Option<T>, CacheError> {
        let raw = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(CacheError::Cancelled),
            raw = self.backend.get(key) => raw?,
        };
        match raw {
            Some(raw) => Ok(Some(serde_json::from_str(&raw)?)),
            None => Ok(None),
        }
    }

    pub async fn set<T: Serialize + Sync>(
        &self,
        key: &str,
        value: &T,
        ttl: Duration,
        cancel: &CancellationToken,
    ) -> Result<(), CacheError> {
        let raw = serde_json::to_string(value)?;
        guarded(cancel, self.backend.set(key, raw, ttl)).await
    }

    /// Writes `value` and logs instead of failing.
    pub async fn set_best_effort<T: Serialize + Sync>(
        &self,
        key: &str,
        value: &T,
        ttl: Duration,
        cancel: &CancellationToken,
    ) {
        if let Err(e) = self.set(key, value, ttl, cancel).await {
            warn!(key, error = %e, "cache write failed");
        }
    }

    pub async fn delete(&self, key: &str, cancel: &CancellationToken) -> Result<(), CacheError> {
        guarded(cancel, self.backend.delete(key)).await
    }

    /// Drops `userTracks` and every `track_summary*` entry.
    pub async fn invalidate_user_data(&self, cancel: &CancellationToken) {
        if let Err(e) = guarded(cancel, self.backend.delete(keys::USER_TRACKS)).await {
            warn!(error = %e, "failed to invalidate saved tracks");
        }
        if let Err(e) = guarded(cancel, self.backend.delete_prefix(keys::TRACK_SUMMARY)).await {
            warn!(error = %e, "failed to invalidate track summaries");
        }
        debug!("user data invalidated");
    }

    /// Drops `tracksPlaylist{id}`.
    pub async fn invalidate_playlist(&self, playlist_id: &str, cancel: &CancellationToken) {
        let key = keys::playlist_tracks(playlist_id);
        if let Err(e) = guarded(cancel, self.backend.delete(&key)).await {
            warn!(playlist_id, error = %e, "failed to invalidate playlist tracks");
        }
        debug!(playlist_id, "playlist invalidated");
    }

    /// Drops everything, the session token included.
    pub async fn reset(&self, cancel: &CancellationToken) {
        if let Err(e) = guarded(cancel, self.backend.clear()).await {
            warn!(error = %e, "failed to reset cache");
        }
    }
}

async fn guarded<F>(cancel: &CancellationToken, op: F) -> Result<(), CacheError>
where
    F: Future<Output = Result<(), CacheError>>,
{
    tokio::select! {
        biased;
        _ = cancel.cancelled() => Err(CacheError::Cancelled),
        res = op => res,
    }
}
