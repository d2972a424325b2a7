//! # API Module
//!
//! HTTP surface of the service, built on [Axum](https://docs.rs/axum).
//!
//! ## Endpoints
//!
//! ### Authentication (public)
//!
//! - `GET /auth/login` - redirects to the provider's authorize page (PKCE + state)
//! - `GET /auth/callback` - completes the login and redirects to the frontend
//! - `GET /auth/logout` - forgets the session token
//! - `GET /auth/is-auth` - profile of the logged-in user, or `UNAUTHORIZED`
//!
//! ### Library (session required)
//!
//! - `GET /track/summary?min&max` - per-artist counts, most saved first
//! - `GET /track/by-artist/{id}` - saved tracks of one artist
//! - `DELETE /track/by-artist/{id}` - remove an artist from the library
//! - `DELETE /track/by-range?min&max` - remove every artist within a count range
//! - `DELETE /track/{id}` - remove one track, backing it up first
//!
//! ### Playlists (session required)
//!
//! - `GET /playlist/list`
//! - `GET /playlist/tracks?id`
//! - `DELETE /playlist/delete-tracks?id`
//! - `DELETE /playlist/delete-tracks-and-library?id`
//!
//! ### Monitoring
//!
//! - `GET /health`
//!
//! ## Request pipeline
//!
//! ```text
//! TraceLayer → request_context → render_timeout → TimeoutLayer → bind_session
//!     → invalidate_after_mutation → handler
//! ```
//!
//! Every body is wrapped in the envelope of [`response::Envelope`]. Handlers return
//! [`crate::error::Error`] on failure; its `IntoResponse` impl picks the status code.

use std::{collections::HashMap, sync::Arc};

use tokio::sync::Mutex;

use crate::{
    config::Config,
    management::{BackupStore, CacheStore, TokenManager},
    spotify::SpotifyConnector,
    types::PkceToken,
};

pub mod auth;
mod health;
pub mod middleware;
pub mod playlist;
pub mod response;
pub mod track;

pub use health::health;

/// Shared application state handed to every handler and middleware.
///
/// Only process-wide handles live here. The per-session upstream handle is
/// bound per request by [`middleware::bind_session`].
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub connector: Arc<dyn SpotifyConnector>,
    pub cache: CacheStore,
    pub tokens: TokenManager,
    pub backup: Arc<dyn BackupStore>,
    /// Logins waiting for their callback, keyed by OAuth `state`.
    pub pending_logins: Arc<Mutex<HashMap<String, PkceToken>>>,
}

impl AppState {
    pub fn new(
        config: Config,
        connector: Arc<dyn SpotifyConnector>,
        cache: CacheStore,
        backup: Arc<dyn BackupStore>,
    ) -> Self {
        Self {
            config: Arc::new(config),
            connector,
            tokens: TokenManager::new(cache.clone()),
            cache,
            backup,
            pending_logins: Arc::default(),
        }
    }
}
