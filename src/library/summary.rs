use std::collections::HashMap;

use futures::{StreamExt, stream};
use tokio_util::sync::CancellationToken;
use tracing::{debug, instrument, warn};

use crate::{
    error::Result,
    library::aggregator,
    management::{CacheStore, DATA_TTL, keys},
    spotify::SpotifyApi,
    types::{ArtistSummary, CountRange, SavedTrack},
    utils::select_image,
};

/// Artist lookups in flight at once while enriching a summary.
const ENRICH_CONCURRENCY: usize = 4;

/// Per-artist track counts of the saved library, most saved first.
///
/// Served from `track_summary[_{min}_{max}]` when cached. Otherwise the
/// library is folded by primary artist, filtered by `range`, enriched with
/// artist images and cached. Artists with equal counts keep the order in
/// which they first appear in the library.
#[instrument(skip(api, cache, cancel))]
pub async fn summarize(
    api: &dyn SpotifyApi,
    cache: &CacheStore,
    range: CountRange,
    cancel: &CancellationToken,
) -> Result<Vec<ArtistSummary>> {
    let key = keys::track_summary(range);
    match cache.get::<Vec<ArtistSummary>>(&key, cancel).await {
        Ok(Some(cached)) => {
            debug!(key, "summary cache hit");
            return Ok(cached);
        }
        Ok(None) => {}
        Err(e) => debug!(key, error = %e, "summary cache read failed"),
    }

    let tracks = aggregator::load_saved_tracks(api, cache, cancel).await?;
    let counted: Vec<ArtistSummary> = fold_by_artist(&tracks)
        .into_iter()
        .filter(|entry| range.contains(entry.count))
        .collect();

    let mut summaries = enrich(api, counted, cancel).await;
    summaries.sort_by(|a, b| b.count.cmp(&a.count));

    cache.set_best_effort(&key, &summaries, DATA_TTL, cancel).await;
    Ok(summaries)
}

/// Counts tracks per primary artist in first-seen order.
pub fn fold_by_artist(tracks: &[SavedTrack]) -> Vec<ArtistSummary> {
    let mut index: HashMap<&str, usize> = HashMap::new();
    let mut entries: Vec<ArtistSummary> = Vec::new();

    for artist in tracks.iter().filter_map(SavedTrack::primary_artist) {
        match index.get(artist.id.as_str()) {
            Some(&pos) => entries[pos].count += 1,
            None => {
                index.insert(artist.id.as_str(), entries.len());
                entries.push(ArtistSummary {
                    id: artist.id.clone(),
                    name: artist.name.clone(),
                    count: 1,
                    image_url: String::new(),
                });
            }
        }
    }

    entries
}

async fn enrich(
    api: &dyn SpotifyApi,
    entries: Vec<ArtistSummary>,
    cancel: &CancellationToken,
) -> Vec<ArtistSummary> {
    stream::iter(entries)
        .map(|mut entry| async move {
            if entry.id.is_empty() {
                return entry;
            }
            match api.artist(&entry.id, cancel).await {
                Ok(artist) => entry.image_url = select_image(&artist.images),
                Err(e) => warn!(artist_id = %entry.id, error = %e, "artist enrichment failed"),
            }
            entry
        })
        .buffered(ENRICH_CONCURRENCY)
        .collect()
        .await
}
