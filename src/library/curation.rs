//! Destructive flows over the saved library and playlists.
//!
//! Every flow follows the same shape: read, optionally back up, delete in
//! provider-sized batches, invalidate. A failed batch aborts the flow; batches
//! already issued are not rolled back. Backups and invalidation are
//! best-effort and never fail a flow.

use tokio_util::sync::CancellationToken;
use tracing::{info, instrument, warn};

use crate::{
    error::Result,
    library::{aggregator, summary, track_ids_by_artist},
    management::{BackupStore, CacheStore},
    spotify::{
        PLAYLIST_TRACKS_DELETE_LIMIT, SAVED_TRACKS_DELETE_LIMIT, SpotifyApi, SpotifyError,
    },
    types::{BackupRow, CountRange, DeletionReport, SavedTrack},
};

/// Which stores a playlist purge touches.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlaylistPurge {
    /// Remove the tracks from the playlist only.
    PlaylistOnly,
    /// Also remove them from the saved library, backing them up first.
    WithLibrary,
}

/// Runs the curation flows for one session.
pub struct Curator<'a> {
    api: &'a dyn SpotifyApi,
    cache: &'a CacheStore,
    backup: &'a dyn BackupStore,
}

impl<'a> Curator<'a> {
    pub fn new(api: &'a dyn SpotifyApi, cache: &'a CacheStore, backup: &'a dyn BackupStore) -> Self {
        Self { api, cache, backup }
    }

    /// Removes one track from the saved library after backing it up.
    #[instrument(skip(self, cancel))]
    pub async fn delete_track(
        &self,
        track_id: &str,
        cancel: &CancellationToken,
    ) -> Result<DeletionReport> {
        let track = self.api.track(track_id, cancel).await?;
        self.write_backup(std::slice::from_ref(&track), cancel).await;

        let mut report = DeletionReport::default();
        self.delete_saved(&[track_id.to_string()], &mut report, cancel)
            .await?;
        self.cache.invalidate_user_data(cancel).await;

        info!(track_id, "track removed from library");
        Ok(report)
    }

    /// Removes every saved track whose primary artist is `artist_id`.
    #[instrument(skip(self, cancel))]
    pub async fn delete_by_artist(
        &self,
        artist_id: &str,
        cancel: &CancellationToken,
    ) -> Result<DeletionReport> {
        let library = aggregator::load_saved_tracks(self.api, self.cache, cancel).await?;

        let mut report = DeletionReport::default();
        let result = self
            .purge_artist(artist_id, &library, &mut report, cancel)
            .await;
        if report.deleted > 0 {
            self.cache.invalidate_user_data(cancel).await;
        }
        result?;

        info!(artist_id, deleted = report.deleted, "artist removed from library");
        Ok(report)
    }

    /// Removes the tracks of every artist whose count falls inside `range`.
    ///
    /// Stops at the first failing artist. Artists purged before the failure
    /// stay purged and the cache is still invalidated.
    #[instrument(skip(self, cancel))]
    pub async fn delete_by_range(
        &self,
        range: CountRange,
        cancel: &CancellationToken,
    ) -> Result<DeletionReport> {
        let artists = summary::summarize(self.api, self.cache, range, cancel).await?;
        let library = aggregator::load_saved_tracks(self.api, self.cache, cancel).await?;

        let mut report = DeletionReport::default();
        for artist in &artists {
            let result = self
                .purge_artist(&artist.id, &library, &mut report, cancel)
                .await;
            if let Err(e) = result {
                warn!(artist_id = %artist.id, deleted = report.deleted, error = %e, "range delete aborted");
                if report.deleted > 0 {
                    self.cache.invalidate_user_data(cancel).await;
                }
                return Err(e);
            }
        }

        if report.deleted > 0 {
            self.cache.invalidate_user_data(cancel).await;
        }
        info!(artists = artists.len(), deleted = report.deleted, "range removed from library");
        Ok(report)
    }

    /// Empties a playlist, optionally removing its tracks from the library too.
    #[instrument(skip(self, cancel))]
    pub async fn delete_playlist_tracks(
        &self,
        playlist_id: &str,
        purge: PlaylistPurge,
        cancel: &CancellationToken,
    ) -> Result<DeletionReport> {
        let entries =
            aggregator::load_playlist_tracks(self.api, self.cache, playlist_id, cancel).await?;
        if entries.is_empty() {
            return Ok(DeletionReport::default());
        }

        let tracks: Vec<SavedTrack> = entries.into_iter().map(|entry| entry.track).collect();
        if purge == PlaylistPurge::WithLibrary {
            self.write_backup(&tracks, cancel).await;
        }
        let ids: Vec<String> = tracks.into_iter().map(|track| track.id).collect();

        let mut report = DeletionReport::default();
        let result = self
            .delete_from_playlist(playlist_id, &ids, &mut report, cancel)
            .await;
        let result = match (result, purge) {
            (Ok(()), PlaylistPurge::WithLibrary) => {
                let mut library = DeletionReport::default();
                self.delete_saved(&ids, &mut library, cancel).await
            }
            (result, _) => result,
        };

        if report.deleted > 0 {
            self.cache.invalidate_playlist(playlist_id, cancel).await;
            if purge == PlaylistPurge::WithLibrary {
                self.cache.invalidate_user_data(cancel).await;
            }
        }
        result?;

        info!(playlist_id, deleted = report.deleted, ?purge, "playlist emptied");
        Ok(report)
    }

    async fn purge_artist(
        &self,
        artist_id: &str,
        library: &[SavedTrack],
        report: &mut DeletionReport,
        cancel: &CancellationToken,
    ) -> Result<()> {
        let ids = track_ids_by_artist(artist_id, library);
        if ids.is_empty() {
            return Ok(());
        }
        self.delete_saved(&ids, report, cancel).await
    }

    async fn delete_saved(
        &self,
        ids: &[String],
        report: &mut DeletionReport,
        cancel: &CancellationToken,
    ) -> Result<()> {
        for batch in ids.chunks(SAVED_TRACKS_DELETE_LIMIT) {
            if cancel.is_cancelled() {
                return Err(SpotifyError::Cancelled.into());
            }
            self.api.delete_saved_tracks(batch, cancel).await?;
            report.deleted += batch.len();
        }
        Ok(())
    }

    async fn delete_from_playlist(
        &self,
        playlist_id: &str,
        ids: &[String],
        report: &mut DeletionReport,
        cancel: &CancellationToken,
    ) -> Result<()> {
        for batch in ids.chunks(PLAYLIST_TRACKS_DELETE_LIMIT) {
            if cancel.is_cancelled() {
                return Err(SpotifyError::Cancelled.into());
            }
            self.api
                .delete_playlist_tracks(playlist_id, batch, cancel)
                .await?;
            report.deleted += batch.len();
        }
        Ok(())
    }

    async fn write_backup(&self, tracks: &[SavedTrack], cancel: &CancellationToken) {
        let rows: Vec<BackupRow> = tracks.iter().map(BackupRow::from).collect();
        match self.backup.insert_if_absent(&rows, cancel).await {
            Ok(written) => info!(requested = rows.len(), written, "tracks backed up"),
            Err(e) => warn!(error = %e, "backup write failed, continuing"),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::{Arc, Mutex};

    use async_trait::async_trait;
    use mockall::mock;

    use super::*;
    use crate::{
        error::Error,
        library::fixtures::track,
        management::{DATA_TTL, MemoryBackup, keys},
        spotify,
        types::{ArtistRef, Page, PlaylistSummary, PlaylistTrack, Token, UserHandle},
    };

    mock! {
        pub Api {}

        #[async_trait]
        impl SpotifyApi for Api {
            fn set_token(&mut self, token: Token);
            async fn current_user(&self, cancel: &CancellationToken) -> spotify::Result<UserHandle>;
            async fn saved_tracks(&self, limit: u32, offset: u32, cancel: &CancellationToken) -> spotify::Result<Page<SavedTrack>>;
            async fn all_saved_tracks(&self, cancel: &CancellationToken) -> spotify::Result<Vec<SavedTrack>>;
            async fn track(&self, track_id: &str, cancel: &CancellationToken) -> spotify::Result<SavedTrack>;
            async fn delete_saved_tracks(&self, ids: &[String], cancel: &CancellationToken) -> spotify::Result<()>;
            async fn playlist_summaries(&self, cancel: &CancellationToken) -> spotify::Result<Vec<PlaylistSummary>>;
            async fn playlist_tracks(&self, playlist_id: &str, limit: u32, offset: u32, cancel: &CancellationToken) -> spotify::Result<Page<PlaylistTrack>>;
            async fn all_playlist_tracks(&self, playlist_id: &str, cancel: &CancellationToken) -> spotify::Result<Vec<PlaylistTrack>>;
            async fn delete_playlist_tracks(&self, playlist_id: &str, ids: &[String], cancel: &CancellationToken) -> spotify::Result<()>;
            async fn artist(&self, artist_id: &str, cancel: &CancellationToken) -> spotify::Result<ArtistRef>;
        }
    }

    type Calls = Arc<Mutex<Vec<Vec<String>>>>;

    fn library_of(artist: &str, n: usize) -> Vec<SavedTrack> {
        (0..n)
            .map(|i| track(&format!("{}-{}", artist, i), &[(artist, artist)]))
            .collect()
    }

    fn record_saved_deletes(api: &mut MockApi) -> Calls {
        let calls: Calls = Arc::default();
        let sink = calls.clone();
        api.expect_delete_saved_tracks().returning(move |ids, _| {
            sink.lock().unwrap().push(ids.to_vec());
            Ok(())
        });
        calls
    }

    fn sizes(calls: &Calls) -> Vec<usize> {
        calls.lock().unwrap().iter().map(Vec::len).collect()
    }

    fn playlist_of(playlist_id: &str, tracks: &[SavedTrack]) -> Vec<PlaylistTrack> {
        tracks
            .iter()
            .cloned()
            .map(|track| PlaylistTrack {
                playlist_id: playlist_id.to_string(),
                track,
            })
            .collect()
    }

    const STALE_RANGE: CountRange = CountRange { min: 5, max: 9 };

    /// Fills every namespace a flow can touch with pre-mutation values.
    async fn seed(cache: &CacheStore, library: &[SavedTrack], playlist: &[PlaylistTrack]) {
        let cancel = CancellationToken::new();
        cache
            .set(keys::USER_TRACKS, &library, DATA_TTL, &cancel)
            .await
            .unwrap();
        cache
            .set(keys::TRACK_SUMMARY, &vec!["stale"], DATA_TTL, &cancel)
            .await
            .unwrap();
        cache
            .set(&keys::track_summary(STALE_RANGE), &vec!["stale"], DATA_TTL, &cancel)
            .await
            .unwrap();
        cache
            .set(&keys::playlist_tracks("P"), &playlist, DATA_TTL, &cancel)
            .await
            .unwrap();
    }

    async fn is_cached(cache: &CacheStore, key: &str) -> bool {
        cache
            .get::<serde_json::Value>(key, &CancellationToken::new())
            .await
            .unwrap()
            .is_some()
    }

    async fn assert_user_data_dropped(cache: &CacheStore) {
        assert!(!is_cached(cache, keys::USER_TRACKS).await);
        assert!(!is_cached(cache, keys::TRACK_SUMMARY).await);
        assert!(!is_cached(cache, &keys::track_summary(STALE_RANGE)).await);
    }

    #[tokio::test]
    async fn test_delete_by_artist_batches_at_fifty() {
        let mut api = MockApi::new();
        let library = library_of("x", 137);
        let expected: Vec<String> = library.iter().map(|t| t.id.clone()).collect();
        api.expect_all_saved_tracks()
            .times(1)
            .returning(move |_| Ok(library.clone()));
        let calls = record_saved_deletes(&mut api);

        let cache = CacheStore::memory();
        let backup = MemoryBackup::new();
        let report = Curator::new(&api, &cache, &backup)
            .delete_by_artist("x", &CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(report.deleted, 137);
        assert_eq!(sizes(&calls), vec![50, 50, 37]);
        assert_eq!(calls.lock().unwrap().concat(), expected);
    }

    #[tokio::test]
    async fn test_delete_by_artist_without_matches_skips_upstream() {
        let mut api = MockApi::new();
        api.expect_all_saved_tracks()
            .returning(|_| Ok(library_of("a", 3)));
        api.expect_delete_saved_tracks().never();

        let cache = CacheStore::memory();
        let backup = MemoryBackup::new();
        let report = Curator::new(&api, &cache, &backup)
            .delete_by_artist("b", &CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(report.deleted, 0);
    }

    #[tokio::test]
    async fn test_failed_batch_aborts_remaining_batches() {
        let mut api = MockApi::new();
        api.expect_all_saved_tracks()
            .returning(|_| Ok(library_of("x", 120)));
        let mut seq = mockall::Sequence::new();
        api.expect_delete_saved_tracks()
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_, _| Ok(()));
        api.expect_delete_saved_tracks()
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_, _| {
                Err(SpotifyError::Api {
                    status: 502,
                    message: "bad gateway".into(),
                })
            });

        let cache = CacheStore::memory();
        let cancel = CancellationToken::new();
        let backup = MemoryBackup::new();

        let err = Curator::new(&api, &cache, &backup)
            .delete_by_artist("x", &cancel)
            .await
            .unwrap_err();

        assert!(matches!(err, Error::UpstreamFailure(_)));
        // First batch went through, so the library cache is stale.
        assert_eq!(
            cache
                .get::<Vec<SavedTrack>>(keys::USER_TRACKS, &cancel)
                .await
                .unwrap(),
            None
        );
    }

    #[tokio::test]
    async fn test_cancelled_flow_issues_no_batch() {
        let mut api = MockApi::new();
        api.expect_all_saved_tracks()
            .returning(|_| Ok(library_of("x", 10)));
        api.expect_delete_saved_tracks().never();

        let cache = CacheStore::disabled();
        let backup = MemoryBackup::new();
        let cancel = CancellationToken::new();
        cancel.cancel();

        let err = Curator::new(&api, &cache, &backup)
            .delete_by_artist("x", &cancel)
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Internal(_)));
    }

    #[tokio::test]
    async fn test_delete_track_backs_up_then_deletes() {
        let mut api = MockApi::new();
        api.expect_track()
            .withf(|id, _| id == "t1")
            .returning(|id, _| Ok(track(id, &[("1", "A")])));
        let calls = record_saved_deletes(&mut api);

        let cache = CacheStore::memory();
        let backup = MemoryBackup::new();
        Curator::new(&api, &cache, &backup)
            .delete_track("t1", &CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(*calls.lock().unwrap(), vec![vec!["t1".to_string()]]);
        let rows = backup.rows();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].artist, "A");
    }

    #[tokio::test]
    async fn test_delete_track_not_found_deletes_nothing() {
        let mut api = MockApi::new();
        api.expect_track()
            .returning(|id, _| Err(SpotifyError::NotFound(format!("track {}", id))));
        api.expect_delete_saved_tracks().never();

        let cache = CacheStore::memory();
        let backup = MemoryBackup::new();
        let err = Curator::new(&api, &cache, &backup)
            .delete_track("nope", &CancellationToken::new())
            .await
            .unwrap_err();
        assert!(matches!(err, Error::NotFound(_)));
        assert_eq!(backup.count(&CancellationToken::new()).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_delete_by_range_purges_each_artist_in_summary_order() {
        let mut api = MockApi::new();
        let mut library = library_of("a", 3);
        library.extend(library_of("b", 2));
        library.extend(library_of("c", 1));
        api.expect_all_saved_tracks()
            .times(1)
            .returning(move |_| Ok(library.clone()));
        api.expect_artist().returning(|id, _| {
            Ok(ArtistRef {
                id: id.to_string(),
                name: id.to_string(),
                images: vec![],
            })
        });
        let calls = record_saved_deletes(&mut api);

        let cache = CacheStore::memory();
        let backup = MemoryBackup::new();
        let report = Curator::new(&api, &cache, &backup)
            .delete_by_range(CountRange::new(2, 0), &CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(report.deleted, 5);
        assert_eq!(
            *calls.lock().unwrap(),
            vec![
                vec!["a-0".to_string(), "a-1".to_string(), "a-2".to_string()],
                vec!["b-0".to_string(), "b-1".to_string()],
            ]
        );
    }

    #[tokio::test]
    async fn test_playlist_purge_with_library() {
        let mut api = MockApi::new();
        let entries: Vec<PlaylistTrack> = library_of("p", 250)
            .into_iter()
            .map(|track| PlaylistTrack {
                playlist_id: "P".to_string(),
                track,
            })
            .collect();
        api.expect_all_playlist_tracks()
            .withf(|id, _| id == "P")
            .returning(move |_, _| Ok(entries.clone()));
        let playlist_calls: Calls = Arc::default();
        let sink = playlist_calls.clone();
        api.expect_delete_playlist_tracks()
            .withf(|id, _, _| id == "P")
            .returning(move |_, ids, _| {
                sink.lock().unwrap().push(ids.to_vec());
                Ok(())
            });
        let saved_calls = record_saved_deletes(&mut api);

        let cache = CacheStore::memory();
        let backup = MemoryBackup::new();
        let report = Curator::new(&api, &cache, &backup)
            .delete_playlist_tracks("P", PlaylistPurge::WithLibrary, &CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(report.deleted, 250);
        assert_eq!(sizes(&playlist_calls), vec![100, 100, 50]);
        assert_eq!(sizes(&saved_calls), vec![50; 5]);
        assert_eq!(backup.count(&CancellationToken::new()).await.unwrap(), 250);
    }

    #[tokio::test]
    async fn test_playlist_only_purge_leaves_library_alone() {
        let mut api = MockApi::new();
        api.expect_all_playlist_tracks().returning(|id, _| {
            Ok(vec![PlaylistTrack {
                playlist_id: id.to_string(),
                track: track("t1", &[("1", "A")]),
            }])
        });
        api.expect_delete_playlist_tracks()
            .times(1)
            .returning(|_, _, _| Ok(()));
        api.expect_delete_saved_tracks().never();

        let cache = CacheStore::memory();
        let backup = MemoryBackup::new();
        Curator::new(&api, &cache, &backup)
            .delete_playlist_tracks("P", PlaylistPurge::PlaylistOnly, &CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(backup.count(&CancellationToken::new()).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_empty_playlist_is_a_noop() {
        let mut api = MockApi::new();
        api.expect_all_playlist_tracks()
            .returning(|_, _| Ok(vec![]));
        api.expect_delete_playlist_tracks().never();

        let cache = CacheStore::memory();
        let backup = MemoryBackup::new();
        let report = Curator::new(&api, &cache, &backup)
            .delete_playlist_tracks("P", PlaylistPurge::WithLibrary, &CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(report.deleted, 0);
    }

    #[tokio::test]
    async fn test_delete_track_drops_user_data() {
        let library = library_of("a", 2);
        let mut api = MockApi::new();
        api.expect_track()
            .returning(|id, _| Ok(track(id, &[("a", "a")])));
        record_saved_deletes(&mut api);

        let cache = CacheStore::memory();
        seed(&cache, &library, &playlist_of("P", &library)).await;
        let backup = MemoryBackup::new();
        Curator::new(&api, &cache, &backup)
            .delete_track("a-0", &CancellationToken::new())
            .await
            .unwrap();

        assert_user_data_dropped(&cache).await;
        assert!(is_cached(&cache, &keys::playlist_tracks("P")).await);
    }

    #[tokio::test]
    async fn test_delete_by_artist_drops_user_data() {
        let library = library_of("a", 3);
        let mut api = MockApi::new();
        // Served from the seeded entry.
        api.expect_all_saved_tracks().never();
        let calls = record_saved_deletes(&mut api);

        let cache = CacheStore::memory();
        seed(&cache, &library, &playlist_of("P", &library)).await;
        let backup = MemoryBackup::new();
        Curator::new(&api, &cache, &backup)
            .delete_by_artist("a", &CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(sizes(&calls), vec![3]);
        assert_user_data_dropped(&cache).await;
        assert!(is_cached(&cache, &keys::playlist_tracks("P")).await);
    }

    #[tokio::test]
    async fn test_delete_by_range_drops_user_data() {
        let mut library = library_of("a", 3);
        library.extend(library_of("b", 1));
        let mut api = MockApi::new();
        api.expect_all_saved_tracks().never();
        api.expect_artist().returning(|id, _| {
            Ok(ArtistRef {
                id: id.to_string(),
                name: id.to_string(),
                images: vec![],
            })
        });
        let calls = record_saved_deletes(&mut api);

        let cache = CacheStore::memory();
        seed(&cache, &library, &playlist_of("P", &library)).await;
        let backup = MemoryBackup::new();
        let range = CountRange::new(2, 0);
        Curator::new(&api, &cache, &backup)
            .delete_by_range(range, &CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(sizes(&calls), vec![3]);
        assert_user_data_dropped(&cache).await;
        // The summary computed during the flow is stale too.
        assert!(!is_cached(&cache, &keys::track_summary(range)).await);
        assert!(is_cached(&cache, &keys::playlist_tracks("P")).await);
    }

    #[tokio::test]
    async fn test_playlist_only_purge_drops_playlist_entry() {
        let library = library_of("a", 3);
        let mut api = MockApi::new();
        api.expect_all_playlist_tracks().never();
        api.expect_delete_playlist_tracks()
            .times(1)
            .returning(|_, _, _| Ok(()));

        let cache = CacheStore::memory();
        seed(&cache, &library, &playlist_of("P", &library)).await;
        let backup = MemoryBackup::new();
        Curator::new(&api, &cache, &backup)
            .delete_playlist_tracks("P", PlaylistPurge::PlaylistOnly, &CancellationToken::new())
            .await
            .unwrap();

        assert!(!is_cached(&cache, &keys::playlist_tracks("P")).await);
        assert!(is_cached(&cache, keys::USER_TRACKS).await);
    }

    #[tokio::test]
    async fn test_playlist_purge_with_library_drops_both() {
        let library = library_of("a", 3);
        let mut api = MockApi::new();
        api.expect_all_playlist_tracks().never();
        api.expect_delete_playlist_tracks()
            .times(1)
            .returning(|_, _, _| Ok(()));
        let calls = record_saved_deletes(&mut api);

        let cache = CacheStore::memory();
        seed(&cache, &library, &playlist_of("P", &library)).await;
        let backup = MemoryBackup::new();
        Curator::new(&api, &cache, &backup)
            .delete_playlist_tracks("P", PlaylistPurge::WithLibrary, &CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(sizes(&calls), vec![3]);
        assert!(!is_cached(&cache, &keys::playlist_tracks("P")).await);
        assert_user_data_dropped(&cache).await;
    }
}
