//! # Spotify Integration Module
//!
//! Typed contract to the Spotify Web API and its OAuth 2.0 authorization-code flow.
//! Everything above this module talks to the provider through two traits:
//!
//! - [`SpotifyConnector`] - process-wide: builds the authorize URL, exchanges and
//!   refreshes tokens, and hands out fresh [`SpotifyApi`] handles.
//! - [`SpotifyApi`] - per-session: one handle bound to one [`Token`] through
//!   [`SpotifyApi::set_token`]; handles are never shared across sessions.
//!
//! ## Architecture
//!
//! ```text
//! Session Binder / Use cases (library)
//!          ↓
//! SpotifyConnector ──hands out──▶ SpotifyApi (token bound)
//!          ↓                          ↓
//!   auth::WebApiConnector      client::WebApiClient
//!          ↓                          ↓
//!            HTTP Layer (reqwest, JSON)
//!                      ↓
//!               Spotify Web API
//! ```
//!
//! ## Provider limits
//!
//! The page limits below are the provider maxima for each endpoint. Read methods
//! never request more than the limit; destructive methods reject a batch above
//! the limit with [`SpotifyError::BatchTooLarge`] instead of splitting it, so the
//! caller decides how work is sliced (see `library::curation`).
//!
//! ## Cancellation
//!
//! Every call that reaches the network takes a [`CancellationToken`]. A call that
//! observes cancellation before its response arrives returns
//! [`SpotifyError::Cancelled`]. Nothing is retried at this layer.

use async_trait::async_trait;
use thiserror::Error;
use tokio_util::sync::CancellationToken;

use crate::{
    library::aggregator,
    types::{ArtistRef, Page, PlaylistSummary, PlaylistTrack, SavedTrack, Token, UserHandle},
};

pub mod auth;
pub mod client;
pub mod types;

pub use auth::WebApiConnector;
pub use client::WebApiClient;

/// Page size for `GET /me/tracks`.
pub const SAVED_TRACKS_PAGE_LIMIT: u32 = 50;
/// Page size for `GET /me/playlists`.
pub const PLAYLISTS_PAGE_LIMIT: u32 = 50;
/// Page size for `GET /playlists/{id}/tracks`.
pub const PLAYLIST_TRACKS_PAGE_LIMIT: u32 = 100;
/// Maximum ids per `DELETE /me/tracks`.
pub const SAVED_TRACKS_DELETE_LIMIT: usize = 50;
/// Maximum uris per `DELETE /playlists/{id}/tracks`.
pub const PLAYLIST_TRACKS_DELETE_LIMIT: usize = 100;

/// Scopes requested at login.
pub const SCOPES: &[&str] = &[
    "user-read-private",
    "user-read-email",
    "user-library-read",
    "user-library-modify",
    "playlist-read-private",
    "playlist-read-collaborative",
    "playlist-modify-public",
    "playlist-modify-private",
];

#[derive(Error, Debug)]
pub enum SpotifyError {
    #[error("Spotify rejected the access token")]
    Unauthorized,

    #[error("Spotify resource not found: {0}")]
    NotFound(String),

    #[error("Spotify API error (status {status}): {message}")]
    Api { status: u16, message: String },

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Request cancelled")]
    Cancelled,

    #[error("Batch of {len} exceeds the provider limit of {limit}")]
    BatchTooLarge { limit: usize, len: usize },

    #[error("Invalid request URL: {0}")]
    InvalidUrl(String),

    #[error("OAuth exchange failed: {0}")]
    OAuth(String),
}

pub type Result<T> = std::result::Result<T, SpotifyError>;

/// Per-session handle to the provider.
#[async_trait]
pub trait SpotifyApi: Send + Sync {
    /// Rebinds the handle used by subsequent calls.
    fn set_token(&mut self, token: Token);

    async fn current_user(&self, cancel: &CancellationToken) -> Result<UserHandle>;

    /// One page of the saved library, at most `limit` items starting at `offset`.
    async fn saved_tracks(
        &self,
        limit: u32,
        offset: u32,
        cancel: &CancellationToken,
    ) -> Result<Page<SavedTrack>>;

    /// The whole saved library in provider order.
    async fn all_saved_tracks(&self, cancel: &CancellationToken) -> Result<Vec<SavedTrack>> {
        aggregator::collect_all(SAVED_TRACKS_PAGE_LIMIT, |limit, offset| {
            self.saved_tracks(limit, offset, cancel)
        })
        .await
    }

    async fn track(&self, track_id: &str, cancel: &CancellationToken) -> Result<SavedTrack>;

    /// Removes up to [`SAVED_TRACKS_DELETE_LIMIT`] tracks from the saved library.
    async fn delete_saved_tracks(&self, ids: &[String], cancel: &CancellationToken)
    -> Result<()>;

    async fn playlist_summaries(&self, cancel: &CancellationToken)
    -> Result<Vec<PlaylistSummary>>;

    async fn playlist_tracks(
        &self,
        playlist_id: &str,
        limit: u32,
        offset: u32,
        cancel: &CancellationToken,
    ) -> Result<Page<PlaylistTrack>>;

    async fn all_playlist_tracks(
        &self,
        playlist_id: &str,
        cancel: &CancellationToken,
    ) -> Result<Vec<PlaylistTrack>> {
        aggregator::collect_all(PLAYLIST_TRACKS_PAGE_LIMIT, |limit, offset| {
            self.playlist_tracks(playlist_id, limit, offset, cancel)
        })
        .await
    }

    /// Removes up to [`PLAYLIST_TRACKS_DELETE_LIMIT`] tracks from a playlist.
    async fn delete_playlist_tracks(
        &self,
        playlist_id: &str,
        ids: &[String],
        cancel: &CancellationToken,
    ) -> Result<()>;

    async fn artist(&self, artist_id: &str, cancel: &CancellationToken) -> Result<ArtistRef>;
}

/// Process-wide entry point to the provider.
#[async_trait]
pub trait SpotifyConnector: Send + Sync {
    /// URL the browser is sent to by `/auth/login`.
    fn authorize_url(&self, state: &str, code_challenge: &str) -> String;

    async fn exchange_code(&self, code: &str, code_verifier: &str) -> Result<Token>;

    async fn refresh_token(&self, token: &Token) -> Result<Token>;

    /// A fresh, unbound handle. Call [`SpotifyApi::set_token`] before use.
    fn handle(&self) -> Box<dyn SpotifyApi>;
}
