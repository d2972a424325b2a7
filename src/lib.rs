//! Saved-library curation service for Spotify.
//!
//! This library backs the `tunetrim` HTTP service: it summarizes a user's
//! saved tracks per artist and removes tracks in bulk (by artist, by count
//! range, or through a playlist), backing them up before they go.
//!
//! # Modules
//!
//! - `api` - HTTP handlers, middleware and the response envelope
//! - `config` - Configuration management and environment variables
//! - `error` - Core error kinds shared by every use case
//! - `library` - Aggregation, summary and curation use cases
//! - `management` - Cache, backup and session token stores
//! - `server` - Router assembly and the serve loop
//! - `spotify` - Spotify Web API client implementation
//! - `types` - Data structures and type definitions
//! - `utils` - Utility functions and helpers
//!
//! # Example
//!
//! ```ignore
//! use tunetrim::{config, server};
//!
//! #[tokio::main]
//! async fn main() -> tunetrim::Res<()> {
//!     config::load_env().await?;
//!     let config = config::Config::from_env()?;
//!     // Build AppState, then server::run(...)
//!     Ok(())
//! }
//! ```

pub mod api;
pub mod config;
pub mod error;
pub mod library;
pub mod management;
pub mod server;
pub mod spotify;
pub mod types;
pub mod utils;

/// A convenient Result type alias for startup and wiring code.
///
/// Uses a boxed dynamic error so configuration, IO and database errors can
/// all be propagated with `?` from `main`.
///
/// # Example
///
/// ```ignore
/// use tunetrim::Res;
///
/// async fn fetch_data() -> Res<String> {
///     Ok("data".to_string())
/// }
/// ```
pub type Res<T> = std::result::Result<T, Box<dyn std::error::Error + Send + Sync>>;
