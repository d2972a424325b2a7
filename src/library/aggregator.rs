use std::future::Future;

use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::{
    management::{CacheStore, DATA_TTL, keys},
    spotify::{self, SpotifyApi},
    types::{Page, PlaylistTrack, SavedTrack},
};

/// Drains a paginated endpoint.
///
/// `fetch_page(limit, offset)` is called with `offset` growing by `limit`
/// until a page reports fewer than `limit` raw items. Errors propagate as-is;
/// nothing is retried.
///
/// # Example
///
/// ```ignore
/// let tracks = collect_all(50, |limit, offset| api.saved_tracks(limit, offset, &cancel)).await?;
/// ```
pub async fn collect_all<T, E, F, Fut>(limit: u32, mut fetch_page: F) -> Result<Vec<T>, E>
where
    F: FnMut(u32, u32) -> Fut,
    Fut: Future<Output = Result<Page<T>, E>>,
{
    let mut items = Vec::new();
    let mut offset = 0;

    loop {
        let page = fetch_page(limit, offset).await?;
        let received = page.received;
        items.extend(page.items);

        if received == 0 || received < limit as usize {
            break;
        }
        offset += limit;
    }

    Ok(items)
}

/// Saved library through the `userTracks` cache entry.
pub async fn load_saved_tracks(
    api: &dyn SpotifyApi,
    cache: &CacheStore,
    cancel: &CancellationToken,
) -> spotify::Result<Vec<SavedTrack>> {
    read_through(cache, keys::USER_TRACKS, cancel, || api.all_saved_tracks(cancel)).await
}

/// Playlist contents through the `tracksPlaylist{id}` cache entry.
pub async fn load_playlist_tracks(
    api: &dyn SpotifyApi,
    cache: &CacheStore,
    playlist_id: &str,
    cancel: &CancellationToken,
) -> spotify::Result<Vec<PlaylistTrack>> {
    let key = keys::playlist_tracks(playlist_id);
    read_through(cache, &key, cancel, || {
        api.all_playlist_tracks(playlist_id, cancel)
    })
    .await
}

async fn read_through<T, F, Fut>(
    cache: &CacheStore,
    key: &str,
    cancel: &CancellationToken,
    fetch: F,
) -> spotify::Result<Vec<T>>
where
    T: serde::Serialize + serde::de::DeserializeOwned + Sync,
    F: FnOnce() -> Fut,
    Fut: Future<Output = spotify::Result<Vec<T>>>,
{
    match cache.get::<Vec<T>>(key, cancel).await {
        Ok(Some(cached)) if !cached.is_empty() => {
            debug!(key, count = cached.len(), "cache hit");
            return Ok(cached);
        }
        Ok(_) => {}
        Err(e) => debug!(key, error = %e, "cache read failed, falling back to upstream"),
    }

    let fresh = fetch().await?;
    cache.set_best_effort(key, &fresh, DATA_TTL, cancel).await;
    Ok(fresh)
}
