use serde::{Deserialize, Serialize};

/// OAuth credential pair for one session.
///
/// `obtained_at` and `expires_in` are seconds; together they give the absolute
/// expiry returned by [`Token::expires_at`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Token {
    pub access_token: String,
    pub refresh_token: String,
    pub scope: String,
    pub expires_in: u64,
    pub obtained_at: u64,
}

impl Token {
    pub fn expires_at(&self) -> u64 {
        self.obtained_at + self.expires_in
    }
}

/// Verifier kept between `/auth/login` and `/auth/callback`.
#[derive(Debug, Clone)]
pub struct PkceToken {
    pub code_verifier: String,
    pub created_at: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Image {
    pub url: String,
    pub width: Option<u32>,
    pub height: Option<u32>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserHandle {
    pub id: String,
    pub display_name: String,
    pub email: String,
    pub image_url: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrackArtist {
    pub id: String,
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AlbumRef {
    pub id: String,
    pub name: String,
    pub images: Vec<Image>,
}

/// A track from the saved library or a playlist.
///
/// Only the first entry of `artists` is treated as canonical; see
/// [`SavedTrack::primary_artist`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SavedTrack {
    pub id: String,
    pub name: String,
    pub uri: String,
    pub artists: Vec<TrackArtist>,
    pub album: AlbumRef,
    pub duration_ms: u64,
    pub external_url: String,
}

impl SavedTrack {
    pub fn primary_artist(&self) -> Option<&TrackArtist> {
        self.artists.first()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlaylistTrack {
    pub playlist_id: String,
    pub track: SavedTrack,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlaylistSummary {
    pub id: String,
    pub name: String,
    pub images: Vec<Image>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArtistRef {
    pub id: String,
    pub name: String,
    pub images: Vec<Image>,
}

/// Per-artist count of saved tracks. Derived on demand, cached, never persisted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArtistSummary {
    pub id: String,
    pub name: String,
    pub count: u32,
    pub image_url: String,
}

/// Row written to the backup table before a destructive flow.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BackupRow {
    pub id: String,
    pub name: String,
    pub artist: String,
    pub album: String,
    pub uri: String,
    pub url: String,
}

impl From<&SavedTrack> for BackupRow {
    fn from(track: &SavedTrack) -> Self {
        Self {
            id: track.id.clone(),
            name: track.name.clone(),
            artist: track
                .primary_artist()
                .map(|a| a.name.clone())
                .unwrap_or_default(),
            album: track.album.name.clone(),
            uri: track.uri.clone(),
            url: track.external_url.clone(),
        }
    }
}

/// Inclusive `[min, max]` filter on artist counts where `0` means unbounded.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct CountRange {
    pub min: u32,
    pub max: u32,
}

impl CountRange {
    pub fn new(min: u32, max: u32) -> Self {
        Self { min, max }
    }

    pub fn is_unbounded(&self) -> bool {
        self.min == 0 && self.max == 0
    }

    pub fn contains(&self, count: u32) -> bool {
        (self.min == 0 || count >= self.min) && (self.max == 0 || count <= self.max)
    }
}

/// One page fetched from a paginated endpoint.
///
/// `received` is the number of raw items the provider returned, which can be
/// larger than `items.len()` when unplayable entries were skipped. End of
/// stream is judged on `received`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Page<T> {
    pub items: Vec<T>,
    pub received: usize,
}

impl<T> Page<T> {
    pub fn new(items: Vec<T>) -> Self {
        let received = items.len();
        Self { items, received }
    }

    pub fn with_received(items: Vec<T>, received: usize) -> Self {
        Self { items, received }
    }
}

/// Outcome of a destructive flow.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct DeletionReport {
    pub deleted: usize,
}
