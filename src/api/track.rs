use axum::extract::{Path, Query, State};
use serde::{Deserialize, Serialize};

use crate::{
    api::{
        AppState,
        middleware::{RequestContext, Session},
        response::{ApiResponse, MessageBody},
    },
    error::{Error, Result},
    library::{aggregator, curation::Curator, summary, tracks_by_artist},
    types::{ArtistSummary, SavedTrack},
    utils,
};

#[derive(Debug, Default, Deserialize)]
pub struct RangeParams {
    pub min: Option<String>,
    pub max: Option<String>,
}

/// Track as returned to API clients.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TrackResponse {
    pub id: String,
    pub name: String,
    pub artist: String,
    pub album: String,
    pub duration_ms: u64,
    pub image_url: String,
    pub url: String,
}

impl From<&SavedTrack> for TrackResponse {
    fn from(track: &SavedTrack) -> Self {
        Self {
            id: track.id.clone(),
            name: track.name.clone(),
            artist: track
                .primary_artist()
                .map(|a| a.name.clone())
                .unwrap_or_default(),
            album: track.album.name.clone(),
            duration_ms: track.duration_ms,
            image_url: utils::select_image(&track.album.images),
            url: track.external_url.clone(),
        }
    }
}

pub async fn summary(
    State(state): State<AppState>,
    Session(api): Session,
    ctx: RequestContext,
    Query(params): Query<RangeParams>,
) -> Result<ApiResponse<Vec<ArtistSummary>>> {
    let range = utils::parse_count_range(params.min.as_deref(), params.max.as_deref())?;
    let summaries = summary::summarize(api.as_ref(), &state.cache, range, &ctx.cancel).await?;
    Ok(ApiResponse(summaries))
}

pub async fn by_artist(
    State(state): State<AppState>,
    Session(api): Session,
    ctx: RequestContext,
    Path(artist_id): Path<String>,
) -> Result<ApiResponse<Vec<TrackResponse>>> {
    let library = aggregator::load_saved_tracks(api.as_ref(), &state.cache, &ctx.cancel).await?;
    let tracks = tracks_by_artist(&artist_id, &library)
        .iter()
        .map(TrackResponse::from)
        .collect();
    Ok(ApiResponse(tracks))
}

pub async fn delete_by_artist(
    State(state): State<AppState>,
    Session(api): Session,
    ctx: RequestContext,
    Path(artist_id): Path<String>,
) -> Result<ApiResponse<MessageBody>> {
    let report = Curator::new(api.as_ref(), &state.cache, state.backup.as_ref())
        .delete_by_artist(&artist_id, &ctx.cancel)
        .await?;
    Ok(ApiResponse::message(format!(
        "Removed {} tracks by artist {}",
        report.deleted, artist_id
    )))
}

pub async fn delete_by_range(
    State(state): State<AppState>,
    Session(api): Session,
    ctx: RequestContext,
    Query(params): Query<RangeParams>,
) -> Result<ApiResponse<MessageBody>> {
    let given = |v: &Option<String>| v.as_deref().is_some_and(|v| !v.trim().is_empty());
    if !given(&params.min) && !given(&params.max) {
        return Err(Error::ValidationFailed(
            "at least one of min or max is required".to_string(),
        ));
    }
    let range = utils::parse_count_range(params.min.as_deref(), params.max.as_deref())?;
    if range.is_unbounded() {
        return Err(Error::ValidationFailed(
            "min and max cannot both be 0".to_string(),
        ));
    }

    let report = Curator::new(api.as_ref(), &state.cache, state.backup.as_ref())
        .delete_by_range(range, &ctx.cancel)
        .await?;
    Ok(ApiResponse::message(format!(
        "Removed {} tracks",
        report.deleted
    )))
}

pub async fn delete_track(
    State(state): State<AppState>,
    Session(api): Session,
    ctx: RequestContext,
    Path(track_id): Path<String>,
) -> Result<ApiResponse<MessageBody>> {
    Curator::new(api.as_ref(), &state.cache, state.backup.as_ref())
        .delete_track(&track_id, &ctx.cancel)
        .await?;
    Ok(ApiResponse::message(format!("Removed track {}", track_id)))
}
