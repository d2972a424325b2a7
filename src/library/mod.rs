//! Use cases over the saved library: aggregation, the per-artist summary and
//! the destructive curation flows.

pub mod aggregator;
pub mod curation;
pub mod summary;

use crate::types::SavedTrack;

/// Tracks whose primary artist is `artist_id`, in source order.
pub fn tracks_by_artist(artist_id: &str, source: &[SavedTrack]) -> Vec<SavedTrack> {
    source
        .iter()
        .filter(|track| is_by_artist(track, artist_id))
        .cloned()
        .collect()
}

/// Ids of the tracks whose primary artist is `artist_id`, in source order.
pub fn track_ids_by_artist(artist_id: &str, source: &[SavedTrack]) -> Vec<String> {
    source
        .iter()
        .filter(|track| is_by_artist(track, artist_id))
        .map(|track| track.id.clone())
        .collect()
}

fn is_by_artist(track: &SavedTrack, artist_id: &str) -> bool {
    track
        .primary_artist()
        .is_some_and(|artist| artist.id == artist_id)
}


#[cfg(test)]
mod tests {
    use super::{fixtures::track, *};

    #[test]
    fn test_filters_match_primary_artist_only() {
        let source = vec![
            track("a1", &[("1", "A")]),
            track("b1", &[("2", "B"), ("1", "A")]),
            track("a2", &[("1", "A")]),
            track("x", &[]),
        ];

        assert_eq!(track_ids_by_artist("1", &source), vec!["a1", "a2"]);
        assert_eq!(track_ids_by_artist("2", &source), vec!["b1"]);
        assert!(track_ids_by_artist("3", &source).is_empty());

        let tracks = tracks_by_artist("1", &source);
        assert_eq!(tracks.len(), 2);
        assert_eq!(tracks[1].id, "a2");
    }
}
