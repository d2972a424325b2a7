use axum::extract::{Query, State};
use serde::{Deserialize, Serialize};

use crate::{
    api::{
        AppState,
        middleware::{RequestContext, Session},
        response::{ApiResponse, MessageBody},
        track::TrackResponse,
    },
    error::{Error, Result},
    library::{
        aggregator,
        curation::{Curator, PlaylistPurge},
    },
    types::PlaylistSummary,
    utils,
};

#[derive(Debug, Default, Deserialize)]
pub struct PlaylistParams {
    pub id: Option<String>,
}

impl PlaylistParams {
    fn require_id(self) -> Result<String> {
        self.id
            .map(|id| id.trim().to_string())
            .filter(|id| !id.is_empty())
            .ok_or_else(|| Error::ValidationFailed("id is required".to_string()))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PlaylistResponse {
    pub id: String,
    pub name: String,
    pub image_url: String,
}

impl From<PlaylistSummary> for PlaylistResponse {
    fn from(playlist: PlaylistSummary) -> Self {
        Self {
            image_url: utils::select_image(&playlist.images),
            id: playlist.id,
            name: playlist.name,
        }
    }
}

pub async fn list(
    Session(api): Session,
    ctx: RequestContext,
) -> Result<ApiResponse<Vec<PlaylistResponse>>> {
    let playlists = api.playlist_summaries(&ctx.cancel).await?;
    Ok(ApiResponse(
        playlists.into_iter().map(PlaylistResponse::from).collect(),
    ))
}

pub async fn tracks(
    State(state): State<AppState>,
    Session(api): Session,
    ctx: RequestContext,
    Query(params): Query<PlaylistParams>,
) -> Result<ApiResponse<Vec<TrackResponse>>> {
    let playlist_id = params.require_id()?;
    let entries =
        aggregator::load_playlist_tracks(api.as_ref(), &state.cache, &playlist_id, &ctx.cancel)
            .await?;
    Ok(ApiResponse(
        entries
            .iter()
            .map(|entry| TrackResponse::from(&entry.track))
            .collect(),
    ))
}

pub async fn delete_tracks(
    state: State<AppState>,
    session: Session,
    ctx: RequestContext,
    Query(params): Query<PlaylistParams>,
) -> Result<ApiResponse<MessageBody>> {
    purge(state, session, ctx, params, PlaylistPurge::PlaylistOnly).await
}

pub async fn delete_tracks_and_library(
    state: State<AppState>,
    session: Session,
    ctx: RequestContext,
    Query(params): Query<PlaylistParams>,
) -> Result<ApiResponse<MessageBody>> {
    purge(state, session, ctx, params, PlaylistPurge::WithLibrary).await
}

async fn purge(
    State(state): State<AppState>,
    Session(api): Session,
    ctx: RequestContext,
    params: PlaylistParams,
    mode: PlaylistPurge,
) -> Result<ApiResponse<MessageBody>> {
    let playlist_id = params.require_id()?;
    let report = Curator::new(api.as_ref(), &state.cache, state.backup.as_ref())
        .delete_playlist_tracks(&playlist_id, mode, &ctx.cancel)
        .await?;

    let message = match mode {
        PlaylistPurge::PlaylistOnly => {
            format!("Removed {} tracks from playlist {}", report.deleted, playlist_id)
        }
        PlaylistPurge::WithLibrary => format!(
            "Removed {} tracks from playlist {} and the library",
            report.deleted, playlist_id
        ),
    };
    Ok(ApiResponse::message(message))
}
