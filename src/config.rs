//! Configuration management for the tunetrim service.
//!
//! Values come from environment variables, optionally seeded from `.env` files.
//! The lookup order is:
//! 1. Environment variables (highest priority)
//! 2. `.env` in the working directory
//! 3. `.env` in the local data directory (`<data_local_dir>/tunetrim/.env`)
//! 4. Application defaults (where applicable)
//!
//! Only the Spotify application credentials are mandatory. Cache and backup
//! backends are optional; without them the service runs against no-op
//! backends and says so at startup.

use std::{env, path::PathBuf};

use thiserror::Error;

/// Default Spotify Web API base URL.
pub const SPOTIFY_API_URL: &str = "https://api.spotify.com/v1";
/// Default Spotify authorize endpoint.
pub const SPOTIFY_AUTH_URL: &str = "https://accounts.spotify.com/authorize";
/// Default Spotify token endpoint.
pub const SPOTIFY_TOKEN_URL: &str = "https://accounts.spotify.com/api/token";

pub const DEFAULT_FRONTEND_URL: &str = "http://localhost:4200";
pub const DEFAULT_SERVER_ADDRESS: &str = "127.0.0.1:8080";

#[derive(Error, Debug, PartialEq, Eq)]
pub enum ConfigError {
    #[error("{0} must be set")]
    Missing(&'static str),

    #[error("{var} is invalid: {reason}")]
    Invalid { var: &'static str, reason: String },
}

/// Spotify application credentials and endpoints.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SpotifySettings {
    pub client_id: String,
    pub client_secret: String,
    pub redirect_uri: String,
    pub api_url: String,
    pub auth_url: String,
    pub token_url: String,
}

/// Which cache backend to run against.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CacheSettings {
    /// Nothing is stored; every read misses.
    Disabled,
    Memory,
    File(PathBuf),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    pub spotify: SpotifySettings,
    pub frontend_url: String,
    pub server_addr: String,
    pub cache: CacheSettings,
    /// SQLite URL of the backup database, if backups are enabled.
    pub backup_database_url: Option<String>,
}

/// Loads `.env` files into the process environment.
///
/// Missing files are not an error; variables already present in the
/// environment are never overwritten.
///
/// # Returns
///
/// The paths that were loaded, in load order.
pub async fn load_env() -> Result<Vec<PathBuf>, String> {
    let mut loaded = Vec::new();

    if let Ok(path) = dotenv::dotenv() {
        loaded.push(path);
    }

    let path = data_dir().join(".env");
    if let Some(parent) = path.parent() {
        async_fs::create_dir_all(parent)
            .await
            .map_err(|e| e.to_string())?;
    }
    if async_fs::metadata(&path).await.is_ok() {
        dotenv::from_path(&path).map_err(|e| e.to_string())?;
        loaded.push(path);
    }

    Ok(loaded)
}

/// `<data_local_dir>/tunetrim`, falling back to the working directory.
pub fn data_dir() -> PathBuf {
    let mut path = dirs::data_local_dir().unwrap_or_else(|| PathBuf::from("."));
    path.push("tunetrim");
    path
}

impl Config {
    /// Reads the configuration from the process environment.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Reads the configuration through `lookup`; empty values count as unset.
    ///
    /// # Example
    ///
    /// ```ignore
    /// let vars = HashMap::from([("CLIENT_ID", "id"), ("CLIENT_SECRET", "s"), ("REDIRECT_URI", "http://x")]);
    /// let config = Config::from_lookup(|k| vars.get(k).map(|v| v.to_string()))?;
    /// ```
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());
        let require = |key: &'static str| get(key).ok_or(ConfigError::Missing(key));

        let redirect_uri = get("REDIRECT_URL")
            .or_else(|| get("REDIRECT_URI"))
            .ok_or(ConfigError::Missing("REDIRECT_URL"))?;

        let spotify = SpotifySettings {
            client_id: require("CLIENT_ID")?,
            client_secret: require("CLIENT_SECRET")?,
            redirect_uri,
            api_url: get("SPOTIFY_API_URL").unwrap_or_else(|| SPOTIFY_API_URL.to_string()),
            auth_url: get("SPOTIFY_AUTH_URL").unwrap_or_else(|| SPOTIFY_AUTH_URL.to_string()),
            token_url: get("SPOTIFY_TOKEN_URL").unwrap_or_else(|| SPOTIFY_TOKEN_URL.to_string()),
        };

        let cache = match get("CACHE_BACKEND").map(|v| v.to_ascii_lowercase()).as_deref() {
            None | Some("none") => CacheSettings::Disabled,
            Some("memory") => CacheSettings::Memory,
            Some("file") => CacheSettings::File(
                get("CACHE_DIR")
                    .map(PathBuf::from)
                    .unwrap_or_else(|| data_dir().join("cache")),
            ),
            Some(other) => {
                return Err(ConfigError::Invalid {
                    var: "CACHE_BACKEND",
                    reason: format!("unknown backend '{}', expected memory or file", other),
                });
            }
        };

        Ok(Self {
            spotify,
            frontend_url: get("FRONTEND_URL")
                .unwrap_or_else(|| DEFAULT_FRONTEND_URL.to_string())
                .trim_end_matches('/')
                .to_string(),
            server_addr: get("SERVER_ADDRESS").unwrap_or_else(|| DEFAULT_SERVER_ADDRESS.to_string()),
            cache,
            backup_database_url: get("BACKUP_DATABASE_URL"),
        })
    }

    /// Where the browser is sent after the OAuth callback.
    pub fn frontend_callback_url(&self) -> String {
        format!("{}/callback", self.frontend_url)
    }
}
