use async_trait::async_trait;
use reqwest::{Client, RequestBuilder, Response, StatusCode, Url};
use serde::de::DeserializeOwned;
use tokio_util::sync::CancellationToken;
use tracing::{debug, instrument, warn};

use crate::{
    library::aggregator,
    spotify::{
        PLAYLIST_TRACKS_DELETE_LIMIT, PLAYLISTS_PAGE_LIMIT, Result, SAVED_TRACKS_DELETE_LIMIT,
        SpotifyApi, SpotifyError,
        types::{
            ArtistObject, Paging, PlaylistItem, PlaylistObject, RemovePlaylistTracksRequest,
            SavedTrackItem, TrackObject, TrackUri, UserObject,
        },
    },
    types::{ArtistRef, Page, PlaylistSummary, PlaylistTrack, SavedTrack, Token, UserHandle},
};

/// Spotify Web API handle bound to a single session token.
///
/// The underlying `reqwest::Client` is a shared connection pool, so handing
/// out one `WebApiClient` per request is cheap.
#[derive(Clone)]
pub struct WebApiClient {
    http: Client,
    api_url: String,
    token: Option<Token>,
}

impl WebApiClient {
    /// Creates an unbound handle; requests fail with `Unauthorized` until
    /// [`SpotifyApi::set_token`] is called.
    ///
    /// # Arguments
    ///
    /// * `http` - Shared `reqwest::Client` used for every call
    /// * `api_url` - Web API base URL, normally [`crate::config::SPOTIFY_API_URL`]; a trailing
    ///   slash is ignored
    ///
    /// # Example
    ///
    /// ```
    /// let mut api = WebApiClient::new(Client::new(), "https://api.spotify.com/v1");
    /// api.set_token(token);
    /// let user = api.current_user(&CancellationToken::new()).await?;
    /// ```
    pub fn new(http: Client, api_url: impl Into<String>) -> Self {
        Self {
            http,
            api_url: api_url.into().trim_end_matches('/').to_string(),
            token: None,
        }
    }

    /// Builds `{api_url}/{segments...}` with each segment percent-encoded.
    fn endpoint(&self, segments: &[&str]) -> Result<Url> {
        let mut url =
            Url::parse(&self.api_url).map_err(|e| SpotifyError::InvalidUrl(e.to_string()))?;
        url.path_segments_mut()
            .map_err(|_| SpotifyError::InvalidUrl(self.api_url.clone()))?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }

    /// Sends an authorized request, racing it against `cancel`.
    async fn send(
        &self,
        request: RequestBuilder,
        what: &str,
        cancel: &CancellationToken,
    ) -> Result<Response> {
        let token = self.token.as_ref().ok_or(SpotifyError::Unauthorized)?;
        let request = request.bearer_auth(&token.access_token);

        let response = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(SpotifyError::Cancelled),
            response = request.send() => response?,
        };

        check_status(response, what).await
    }

    async fn get_json<T: DeserializeOwned>(
        &self,
        request: RequestBuilder,
        what: &str,
        cancel: &CancellationToken,
    ) -> Result<T> {
        let response = self.send(request, what, cancel).await?;
        tokio::select! {
            biased;
            _ = cancel.cancelled() => Err(SpotifyError::Cancelled),
            body = response.json::<T>() => Ok(body?),
        }
    }
}

async fn check_status(response: Response, what: &str) -> Result<Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let body = response.text().await.unwrap_or_default();
    warn!(status = status.as_u16(), body = %body, "spotify request for {} failed", what);

    match status {
        StatusCode::UNAUTHORIZED => Err(SpotifyError::Unauthorized),
        StatusCode::NOT_FOUND => Err(SpotifyError::NotFound(what.to_string())),
        _ => Err(SpotifyError::Api {
            status: status.as_u16(),
            message: body,
        }),
    }
}

#[async_trait]
impl SpotifyApi for WebApiClient {
    fn set_token(&mut self, token: Token) {
        self.token = Some(token);
    }

    #[instrument(skip_all)]
    async fn current_user(&self, cancel: &CancellationToken) -> Result<UserHandle> {
        let url = self.endpoint(&["me"])?;
        let user: UserObject = self.get_json(self.http.get(url), "user", cancel).await?;
        Ok(user.into())
    }

    #[instrument(skip(self, cancel))]
    async fn saved_tracks(
        &self,
        limit: u32,
        offset: u32,
        cancel: &CancellationToken,
    ) -> Result<Page<SavedTrack>> {
        let url = self.endpoint(&["me", "tracks"])?;
        let request = self
            .http
            .get(url)
            .query(&[("limit", limit), ("offset", offset)]);
        let page: Paging<SavedTrackItem> = self.get_json(request, "saved tracks", cancel).await?;

        let received = page.items.len();
        debug!(received, total = ?page.total, "saved tracks page");
        let tracks = page
            .items
            .into_iter()
            .filter_map(|item| item.track.into_saved_track())
            .collect();
        Ok(Page::with_received(tracks, received))
    }

    #[instrument(skip(self, cancel))]
    async fn track(&self, track_id: &str, cancel: &CancellationToken) -> Result<SavedTrack> {
        let url = self.endpoint(&["tracks", track_id])?;
        let track: TrackObject = self.get_json(self.http.get(url), "track", cancel).await?;
        track
            .into_saved_track()
            .ok_or_else(|| SpotifyError::NotFound("track".to_string()))
    }

    #[instrument(skip(self, ids, cancel), fields(count = ids.len()))]
    async fn delete_saved_tracks(&self, ids: &[String], cancel: &CancellationToken) -> Result<()> {
        if ids.len() > SAVED_TRACKS_DELETE_LIMIT {
            return Err(SpotifyError::BatchTooLarge {
                limit: SAVED_TRACKS_DELETE_LIMIT,
                len: ids.len(),
            });
        }
        if ids.is_empty() {
            return Ok(());
        }

        let url = self.endpoint(&["me", "tracks"])?;
        let request = self.http.delete(url).query(&[("ids", ids.join(","))]);
        self.send(request, "saved tracks", cancel).await?;
        Ok(())
    }

    #[instrument(skip_all)]
    async fn playlist_summaries(
        &self,
        cancel: &CancellationToken,
    ) -> Result<Vec<PlaylistSummary>> {
        let url = self.endpoint(&["me", "playlists"])?;
        aggregator::collect_all(PLAYLISTS_PAGE_LIMIT, |limit, offset| {
            let request = self
                .http
                .get(url.clone())
                .query(&[("limit", limit), ("offset", offset)]);
            async move {
                let page: Paging<PlaylistObject> =
                    self.get_json(request, "playlists", cancel).await?;
                Ok::<_, SpotifyError>(Page::new(
                    page.items.into_iter().map(PlaylistSummary::from).collect(),
                ))
            }
        })
        .await
    }

    #[instrument(skip(self, cancel))]
    async fn playlist_tracks(
        &self,
        playlist_id: &str,
        limit: u32,
        offset: u32,
        cancel: &CancellationToken,
    ) -> Result<Page<PlaylistTrack>> {
        let url = self.endpoint(&["playlists", playlist_id, "tracks"])?;
        let request = self
            .http
            .get(url)
            .query(&[("limit", limit), ("offset", offset)]);
        let page: Paging<PlaylistItem> = self.get_json(request, "playlist", cancel).await?;

        let received = page.items.len();
        let tracks: Vec<PlaylistTrack> = page
            .items
            .into_iter()
            .filter_map(|item| item.into_playlist_track(playlist_id))
            .collect();
        if tracks.len() < received {
            debug!(skipped = received - tracks.len(), "skipped unplayable playlist items");
        }
        Ok(Page::with_received(tracks, received))
    }

    #[instrument(skip(self, ids, cancel), fields(count = ids.len()))]
    async fn delete_playlist_tracks(
        &self,
        playlist_id: &str,
        ids: &[String],
        cancel: &CancellationToken,
    ) -> Result<()> {
        if ids.len() > PLAYLIST_TRACKS_DELETE_LIMIT {
            return Err(SpotifyError::BatchTooLarge {
                limit: PLAYLIST_TRACKS_DELETE_LIMIT,
                len: ids.len(),
            });
        }
        if ids.is_empty() {
            return Ok(());
        }

        let url = self.endpoint(&["playlists", playlist_id, "tracks"])?;
        let body = RemovePlaylistTracksRequest {
            tracks: ids
                .iter()
                .map(|id| TrackUri {
                    uri: format!("spotify:track:{}", id),
                })
                .collect(),
        };
        self.send(self.http.delete(url).json(&body), "playlist", cancel)
            .await?;
        Ok(())
    }

    #[instrument(skip(self, cancel))]
    async fn artist(&self, artist_id: &str, cancel: &CancellationToken) -> Result<ArtistRef> {
        let url = self.endpoint(&["artists", artist_id])?;
        let artist: ArtistObject = self.get_json(self.http.get(url), "artist", cancel).await?;
        Ok(artist.into())
    }
}
