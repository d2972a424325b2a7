#![allow(dead_code)]

use std::{
    collections::{HashMap, HashSet},
    sync::{
        Arc, Mutex,
        atomic::{AtomicBool, Ordering},
    },
    time::Duration,
};

use async_trait::async_trait;
use axum::{
    Router,
    body::{Body, to_bytes},
    http::{Request, Response, header},
};
use chrono::Utc;
use serde_json::Value;
use tokio_util::sync::CancellationToken;
use tower::ServiceExt;

use tunetrim::{
    api::AppState,
    config::Config,
    management::{
        BackupError, BackupStore, CacheBackend, CacheError, CacheStore, MemoryBackup, MemoryCache,
    },
    server,
    spotify::{self, SpotifyApi, SpotifyConnector, SpotifyError},
    types::{
        AlbumRef, ArtistRef, BackupRow, Image, Page, PlaylistSummary, PlaylistTrack, SavedTrack,
        Token, TrackArtist, UserHandle,
    },
};

/// One upstream call as seen by the fake provider.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Call {
    CurrentUser,
    SavedTracks { limit: u32, offset: u32 },
    Track(String),
    DeleteSaved(Vec<String>),
    PlaylistSummaries,
    PlaylistTracks { id: String, limit: u32, offset: u32 },
    DeletePlaylist { id: String, ids: Vec<String> },
    Artist(String),
}

/// In-memory provider shared by every handle the fake connector hands out.
#[derive(Default)]
pub struct Upstream {
    pub library: Mutex<Vec<SavedTrack>>,
    pub playlists: Mutex<HashMap<String, Vec<SavedTrack>>>,
    pub failing_artists: Mutex<HashSet<String>>,
    pub calls: Mutex<Vec<Call>>,
    pub refreshes: Mutex<usize>,
    /// Makes saved-track reads hang until the request is dropped.
    pub stall_reads: AtomicBool,
}

impl Upstream {
    pub fn with_library(tracks: Vec<SavedTrack>) -> Arc<Self> {
        let upstream = Self::default();
        *upstream.library.lock().unwrap() = tracks;
        Arc::new(upstream)
    }

    pub fn calls(&self) -> Vec<Call> {
        self.calls.lock().unwrap().clone()
    }

    pub fn clear_calls(&self) {
        self.calls.lock().unwrap().clear();
    }

    pub fn saved_deletes(&self) -> Vec<Vec<String>> {
        self.calls()
            .into_iter()
            .filter_map(|call| match call {
                Call::DeleteSaved(ids) => Some(ids),
                _ => None,
            })
            .collect()
    }

    pub fn saved_track_reads(&self) -> usize {
        self.calls()
            .iter()
            .filter(|call| matches!(call, Call::SavedTracks { .. }))
            .count()
    }

    fn record(&self, call: Call) {
        self.calls.lock().unwrap().push(call);
    }
}

pub struct FakeApi {
    upstream: Arc<Upstream>,
    token: Option<Token>,
}

impl FakeApi {
    fn authorize(&self) -> spotify::Result<()> {
        match &self.token {
            Some(token) if !token.access_token.is_empty() => Ok(()),
            _ => Err(SpotifyError::Unauthorized),
        }
    }
}

fn page_of<T: Clone>(items: &[T], limit: u32, offset: u32) -> Page<T> {
    let start = (offset as usize).min(items.len());
    let end = (start + limit as usize).min(items.len());
    Page::new(items[start..end].to_vec())
}

#[async_trait]
impl SpotifyApi for FakeApi {
    fn set_token(&mut self, token: Token) {
        self.token = Some(token);
    }

    async fn current_user(&self, _cancel: &CancellationToken) -> spotify::Result<UserHandle> {
        self.authorize()?;
        self.upstream.record(Call::CurrentUser);
        Ok(UserHandle {
            id: "user-1".to_string(),
            display_name: "Test User".to_string(),
            email: "user@example.com".to_string(),
            image_url: Some("https://img.test/user".to_string()),
        })
    }

    async fn saved_tracks(
        &self,
        limit: u32,
        offset: u32,
        _cancel: &CancellationToken,
    ) -> spotify::Result<Page<SavedTrack>> {
        self.authorize()?;
        if self.upstream.stall_reads.load(Ordering::SeqCst) {
            tokio::time::sleep(Duration::from_secs(3600)).await;
        }
        self.upstream.record(Call::SavedTracks { limit, offset });
        let library = self.upstream.library.lock().unwrap();
        Ok(page_of(&library, limit, offset))
    }

    async fn track(&self, track_id: &str, _cancel: &CancellationToken) -> spotify::Result<SavedTrack> {
        self.authorize()?;
        self.upstream.record(Call::Track(track_id.to_string()));
        self.upstream
            .library
            .lock()
            .unwrap()
            .iter()
            .find(|t| t.id == track_id)
            .cloned()
            .ok_or_else(|| SpotifyError::NotFound("track".to_string()))
    }

    async fn delete_saved_tracks(
        &self,
        ids: &[String],
        _cancel: &CancellationToken,
    ) -> spotify::Result<()> {
        self.authorize()?;
        assert!(ids.len() <= spotify::SAVED_TRACKS_DELETE_LIMIT);
        self.upstream.record(Call::DeleteSaved(ids.to_vec()));
        self.upstream
            .library
            .lock()
            .unwrap()
            .retain(|t| !ids.contains(&t.id));
        Ok(())
    }

    async fn playlist_summaries(
        &self,
        _cancel: &CancellationToken,
    ) -> spotify::Result<Vec<PlaylistSummary>> {
        self.authorize()?;
        self.upstream.record(Call::PlaylistSummaries);
        let mut ids: Vec<String> = self.upstream.playlists.lock().unwrap().keys().cloned().collect();
        ids.sort();
        Ok(ids
            .into_iter()
            .map(|id| PlaylistSummary {
                name: format!("Playlist {}", id),
                images: images_for(&id),
                id,
            })
            .collect())
    }

    async fn playlist_tracks(
        &self,
        playlist_id: &str,
        limit: u32,
        offset: u32,
        _cancel: &CancellationToken,
    ) -> spotify::Result<Page<PlaylistTrack>> {
        self.authorize()?;
        self.upstream.record(Call::PlaylistTracks {
            id: playlist_id.to_string(),
            limit,
            offset,
        });
        let playlists = self.upstream.playlists.lock().unwrap();
        let tracks = playlists
            .get(playlist_id)
            .ok_or_else(|| SpotifyError::NotFound("playlist".to_string()))?;
        let page = page_of(tracks, limit, offset);
        Ok(Page::new(
            page.items
                .into_iter()
                .map(|track| PlaylistTrack {
                    playlist_id: playlist_id.to_string(),
                    track,
                })
                .collect(),
        ))
    }

    async fn delete_playlist_tracks(
        &self,
        playlist_id: &str,
        ids: &[String],
        _cancel: &CancellationToken,
    ) -> spotify::Result<()> {
        self.authorize()?;
        assert!(ids.len() <= spotify::PLAYLIST_TRACKS_DELETE_LIMIT);
        self.upstream.record(Call::DeletePlaylist {
            id: playlist_id.to_string(),
            ids: ids.to_vec(),
        });
        if let Some(tracks) = self.upstream.playlists.lock().unwrap().get_mut(playlist_id) {
            tracks.retain(|t| !ids.contains(&t.id));
        }
        Ok(())
    }

    async fn artist(&self, artist_id: &str, _cancel: &CancellationToken) -> spotify::Result<ArtistRef> {
        self.authorize()?;
        self.upstream.record(Call::Artist(artist_id.to_string()));
        if self.upstream.failing_artists.lock().unwrap().contains(artist_id) {
            return Err(SpotifyError::Api {
                status: 500,
                message: "artist lookup failed".to_string(),
            });
        }
        Ok(ArtistRef {
            id: artist_id.to_string(),
            name: format!("Artist {}", artist_id),
            images: images_for(artist_id),
        })
    }
}

/// Provider images, largest first.
pub fn images_for(id: &str) -> Vec<Image> {
    [640, 300, 64]
        .into_iter()
        .map(|w| Image {
            url: format!("https://img.test/{}/{}", id, w),
            width: Some(w),
            height: Some(w),
        })
        .collect()
}

pub struct FakeConnector {
    pub upstream: Arc<Upstream>,
}

#[async_trait]
impl SpotifyConnector for FakeConnector {
    fn authorize_url(&self, state: &str, code_challenge: &str) -> String {
        format!(
            "https://accounts.test/authorize?state={}&code_challenge={}",
            state, code_challenge
        )
    }

    async fn exchange_code(&self, code: &str, code_verifier: &str) -> spotify::Result<Token> {
        if code == "bad" || code_verifier.len() != 128 {
            return Err(SpotifyError::OAuth("invalid_grant".to_string()));
        }
        Ok(token())
    }

    async fn refresh_token(&self, old: &Token) -> spotify::Result<Token> {
        *self.upstream.refreshes.lock().unwrap() += 1;
        Ok(Token {
            access_token: "refreshed".to_string(),
            obtained_at: Utc::now().timestamp() as u64,
            expires_in: 3600,
            ..old.clone()
        })
    }

    fn handle(&self) -> Box<dyn SpotifyApi> {
        Box::new(FakeApi {
            upstream: self.upstream.clone(),
            token: None,
        })
    }
}

pub fn token() -> Token {
    Token {
        access_token: "access".to_string(),
        refresh_token: "refresh".to_string(),
        scope: "user-library-read".to_string(),
        expires_in: 3600,
        obtained_at: Utc::now().timestamp() as u64,
    }
}

pub fn track(id: &str, artist_id: &str) -> SavedTrack {
    SavedTrack {
        id: id.to_string(),
        name: format!("Track {}", id),
        uri: format!("spotify:track:{}", id),
        artists: vec![TrackArtist {
            id: artist_id.to_string(),
            name: format!("Artist {}", artist_id),
        }],
        album: AlbumRef {
            id: format!("album-{}", id),
            name: format!("Album {}", id),
            images: images_for(&format!("album-{}", id)),
        },
        duration_ms: 180_000,
        external_url: format!("https://open.spotify.com/track/{}", id),
    }
}

/// `[A1,A2,A3,B1,B2,C1]` by artists `1,1,1,2,2,3`.
pub fn sample_library() -> Vec<SavedTrack> {
    vec![
        track("A1", "1"),
        track("A2", "1"),
        track("A3", "1"),
        track("B1", "2"),
        track("B2", "2"),
        track("C1", "3"),
    ]
}

pub fn test_config() -> Config {
    let vars: HashMap<&str, &str> = HashMap::from([
        ("CLIENT_ID", "client"),
        ("CLIENT_SECRET", "secret"),
        ("REDIRECT_URL", "http://127.0.0.1:8080/auth/callback"),
        ("FRONTEND_URL", "http://frontend.test"),
    ]);
    Config::from_lookup(|key| vars.get(key).map(|v| v.to_string())).unwrap()
}

/// Memory backend whose writes can be switched to fail.
#[derive(Default)]
pub struct FlakyCache {
    inner: MemoryCache,
    pub fail_writes: AtomicBool,
}

#[async_trait]
impl CacheBackend for FlakyCache {
    async fn get(&self, key: &str) -> Result<Option<String>, CacheError> {
        self.inner.get(key).await
    }

    async fn set(&self, key: &str, value: String, ttl: Duration) -> Result<(), CacheError> {
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(CacheError::Io(std::io::Error::other("cache is read-only")));
        }
        self.inner.set(key, value, ttl).await
    }

    async fn delete(&self, key: &str) -> Result<(), CacheError> {
        self.inner.delete(key).await
    }

    async fn delete_prefix(&self, prefix: &str) -> Result<(), CacheError> {
        self.inner.delete_prefix(prefix).await
    }

    async fn clear(&self) -> Result<(), CacheError> {
        self.inner.clear().await
    }
}

pub struct FailingBackup;

#[async_trait]
impl BackupStore for FailingBackup {
    async fn insert_if_absent(
        &self,
        _rows: &[BackupRow],
        _cancel: &CancellationToken,
    ) -> Result<u64, BackupError> {
        Err(BackupError::Unavailable("backup database is down".to_string()))
    }

    async fn count(&self, _cancel: &CancellationToken) -> Result<u64, BackupError> {
        Err(BackupError::Unavailable("backup database is down".to_string()))
    }
}

pub struct TestApp {
    pub router: Router,
    pub state: AppState,
    pub upstream: Arc<Upstream>,
    pub backup: Arc<MemoryBackup>,
}

impl TestApp {
    pub fn new(upstream: Arc<Upstream>) -> Self {
        Self::with_cache(upstream, CacheStore::memory())
    }

    pub fn with_cache(upstream: Arc<Upstream>, cache: CacheStore) -> Self {
        let backup = Arc::new(MemoryBackup::new());
        let state = AppState::new(
            test_config(),
            Arc::new(FakeConnector {
                upstream: upstream.clone(),
            }),
            cache,
            backup.clone(),
        );
        Self {
            router: server::router(state.clone()),
            state,
            upstream,
            backup,
        }
    }

    pub fn with_backup(upstream: Arc<Upstream>, backup: Arc<dyn BackupStore>) -> Self {
        let mut app = Self::new(upstream);
        app.state.backup = backup;
        app.router = server::router(app.state.clone());
        app
    }

    /// Stores a valid session token, as a completed login would.
    pub async fn login(&self) {
        self.state
            .tokens
            .persist(&token(), &CancellationToken::new())
            .await
            .unwrap();
    }

    /// Hits `/auth/login` and returns the `state` it handed to the provider.
    pub async fn start_login(&self) -> String {
        let response = self.request("GET", "/auth/login").await;
        let location = response.headers()[header::LOCATION]
            .to_str()
            .unwrap()
            .to_string();
        location
            .split(['?', '&'])
            .find_map(|pair| pair.strip_prefix("state="))
            .unwrap()
            .to_string()
    }

    /// Runs the browser side of a login and returns the final redirect target.
    pub async fn login_through_callback(&self) -> String {
        let state = self.start_login().await;
        let response = self
            .request("GET", &format!("/auth/callback?code=good&state={}", state))
            .await;
        response.headers()[header::LOCATION]
            .to_str()
            .unwrap()
            .to_string()
    }

    pub async fn request(&self, method: &str, uri: &str) -> Response<Body> {
        self.router
            .clone()
            .oneshot(
                Request::builder()
                    .method(method)
                    .uri(uri)
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap()
    }

    pub async fn cached<T: serde::de::DeserializeOwned>(&self, key: &str) -> Option<T> {
        self.state
            .cache
            .get(key, &CancellationToken::new())
            .await
            .unwrap()
    }
}

pub async fn json_body(response: Response<Body>) -> Value {
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    serde_json::from_slice(&bytes).unwrap()
}
