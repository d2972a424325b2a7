//! Wire shapes of the Spotify Web API responses this service reads.
//!
//! Only the fields the service uses are declared; serde ignores the rest.

use serde::{Deserialize, Serialize};

use crate::types::{
    AlbumRef, ArtistRef, Image, PlaylistSummary, PlaylistTrack, SavedTrack, TrackArtist,
    UserHandle,
};

#[derive(Debug, Clone, Deserialize)]
pub struct Paging<T> {
    pub items: Vec<T>,
    #[serde(default)]
    pub total: Option<u32>,
    #[serde(default)]
    pub next: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SavedTrackItem {
    pub track: TrackObject,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PlaylistItem {
    #[serde(default)]
    pub track: Option<TrackObject>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct TrackObject {
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub uri: String,
    #[serde(rename = "type", default)]
    pub kind: Option<String>,
    #[serde(default)]
    pub artists: Vec<SimplifiedArtist>,
    #[serde(default)]
    pub album: AlbumObject,
    #[serde(default)]
    pub duration_ms: u64,
    #[serde(default)]
    pub external_urls: ExternalUrls,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SimplifiedArtist {
    #[serde(default)]
    pub id: Option<String>,
    pub name: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct AlbumObject {
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub images: Option<Vec<Image>>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ExternalUrls {
    #[serde(default)]
    pub spotify: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PlaylistObject {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub images: Option<Vec<Image>>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ArtistObject {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub images: Option<Vec<Image>>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct UserObject {
    pub id: String,
    #[serde(default)]
    pub display_name: Option<String>,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub images: Option<Vec<Image>>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct TokenResponse {
    pub access_token: String,
    #[serde(default)]
    pub scope: Option<String>,
    pub expires_in: u64,
    #[serde(default)]
    pub refresh_token: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct RemovePlaylistTracksRequest {
    pub tracks: Vec<TrackUri>,
}

#[derive(Debug, Clone, Serialize)]
pub struct TrackUri {
    pub uri: String,
}

impl TrackObject {
    /// Converts to the domain type. Episodes and items without an id (local
    /// files, removed tracks) yield `None`.
    pub fn into_saved_track(self) -> Option<SavedTrack> {
        if matches!(self.kind.as_deref(), Some(kind) if kind != "track") {
            return None;
        }
        let id = self.id.filter(|id| !id.is_empty())?;
        let uri = if self.uri.is_empty() {
            format!("spotify:track:{}", id)
        } else {
            self.uri
        };

        Some(SavedTrack {
            id,
            name: self.name,
            uri,
            artists: self
                .artists
                .into_iter()
                .map(|a| TrackArtist {
                    id: a.id.unwrap_or_default(),
                    name: a.name,
                })
                .collect(),
            album: AlbumRef {
                id: self.album.id.unwrap_or_default(),
                name: self.album.name,
                images: self.album.images.unwrap_or_default(),
            },
            duration_ms: self.duration_ms,
            external_url: self.external_urls.spotify.unwrap_or_default(),
        })
    }
}

impl PlaylistItem {
    pub fn into_playlist_track(self, playlist_id: &str) -> Option<PlaylistTrack> {
        self.track
            .and_then(TrackObject::into_saved_track)
            .map(|track| PlaylistTrack {
                playlist_id: playlist_id.to_string(),
                track,
            })
    }
}

impl From<PlaylistObject> for PlaylistSummary {
    fn from(p: PlaylistObject) -> Self {
        Self {
            id: p.id,
            name: p.name,
            images: p.images.unwrap_or_default(),
        }
    }
}

impl From<ArtistObject> for ArtistRef {
    fn from(a: ArtistObject) -> Self {
        Self {
            id: a.id,
            name: a.name,
            images: a.images.unwrap_or_default(),
        }
    }
}

impl From<UserObject> for UserHandle {
    fn from(u: UserObject) -> Self {
        let image_url = u
            .images
            .and_then(|images| images.into_iter().next())
            .map(|image| image.url);
        Self {
            display_name: u.display_name.unwrap_or_else(|| u.id.clone()),
            id: u.id,
            email: u.email.unwrap_or_default(),
            image_url,
        }
    }
}
