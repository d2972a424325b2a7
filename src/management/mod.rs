mod auth;
mod backup;
mod cache;

pub use auth::{REFRESH_MARGIN_SECS, TokenManager};
pub use backup::{BackupError, BackupStore, MemoryBackup, NoopBackup, SqliteBackup};
pub use cache::{
    CacheBackend, CacheError, CacheStore, DATA_TTL, FileCache, MemoryCache, NoopCache, TOKEN_TTL,
    keys,
};
