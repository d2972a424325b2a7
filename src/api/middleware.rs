use std::{collections::HashMap, sync::Arc};

use axum::{
    extract::{FromRequestParts, Query, Request, State},
    http::{HeaderName, HeaderValue, Method, StatusCode, request::Parts},
    middleware::Next,
    response::{IntoResponse, Response},
};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::{
    api::{AppState, response::REQUEST_ID},
    error::Error,
    spotify::SpotifyApi,
};

pub const REQUEST_ID_HEADER: HeaderName = HeaderName::from_static("x-request-id");

/// Path that never gets a session bound.
pub const LOGIN_PATH: &str = "/auth/login";

/// Per-request cancellation. Cancelled once the request future is dropped,
/// which is what happens when the client goes away.
#[derive(Clone, Debug, Default)]
pub struct RequestContext {
    pub cancel: CancellationToken,
}

impl<S: Send + Sync> FromRequestParts<S> for RequestContext {
    type Rejection = std::convert::Infallible;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        Ok(parts
            .extensions
            .get::<RequestContext>()
            .cloned()
            .unwrap_or_default())
    }
}

/// Upstream handle bound to the caller's token.
///
/// Extracting it is the auth guard: requests without a bound session are
/// rejected with `UNAUTHORIZED` before the handler runs.
#[derive(Clone)]
pub struct Session(pub Arc<dyn SpotifyApi>);

impl<S: Send + Sync> FromRequestParts<S> for Session {
    type Rejection = Error;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts
            .extensions
            .get::<Session>()
            .cloned()
            .ok_or(Error::Unauthenticated)
    }
}

/// Assigns the request id and the cancellation token.
pub async fn request_context(mut request: Request, next: Next) -> Response {
    let request_id = Uuid::new_v4().to_string();
    let cancel = CancellationToken::new();
    let _guard = cancel.clone().drop_guard();
    request.extensions_mut().insert(RequestContext { cancel });

    let mut response = REQUEST_ID.scope(request_id.clone(), next.run(request)).await;
    if let Ok(value) = HeaderValue::from_str(&request_id) {
        response.headers_mut().insert(REQUEST_ID_HEADER, value);
    }
    response
}

/// Renders a request that ran out of time through the error envelope.
///
/// Sits directly outside the timeout layer, whose own 408 carries no body.
pub async fn render_timeout(request: Request, next: Next) -> Response {
    let response = next.run(request).await;
    if response.status() == StatusCode::REQUEST_TIMEOUT {
        return Error::Internal("request timed out".to_string()).into_response();
    }
    response
}

/// Attaches a [`Session`] when a usable token is cached. Never fails the request.
pub async fn bind_session(
    State(state): State<AppState>,
    mut request: Request,
    next: Next,
) -> Response {
    if request.uri().path() != LOGIN_PATH {
        let cancel = request
            .extensions()
            .get::<RequestContext>()
            .map(|ctx| ctx.cancel.clone())
            .unwrap_or_default();

        if let Some(token) = state
            .tokens
            .get_valid_token(state.connector.as_ref(), &cancel)
            .await
        {
            let mut api = state.connector.handle();
            api.set_token(token);
            request.extensions_mut().insert(Session(Arc::from(api)));
        }
    }

    next.run(request).await
}

/// Cache namespaces dropped after a successful mutation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Invalidation {
    UserData,
    Playlist { id: String, user_data: bool },
    Reset,
}

/// Maps a mutated path (and its `id` query parameter) to what must be dropped.
pub fn classify(path: &str, playlist_id: Option<&str>) -> Invalidation {
    if path.starts_with("/track/") {
        return Invalidation::UserData;
    }
    if path.starts_with("/playlist/") {
        if let Some(id) = playlist_id.filter(|id| !id.is_empty()) {
            return Invalidation::Playlist {
                id: id.to_string(),
                user_data: path.contains("library") || path.contains("all"),
            };
        }
    }
    Invalidation::Reset
}

fn is_mutating(method: &Method) -> bool {
    matches!(
        *method,
        Method::POST | Method::PUT | Method::PATCH | Method::DELETE
    )
}

/// Drops the affected cache namespaces after any 2xx mutation.
pub async fn invalidate_after_mutation(
    State(state): State<AppState>,
    request: Request,
    next: Next,
) -> Response {
    let mutating = is_mutating(request.method());
    let cancel = request
        .extensions()
        .get::<RequestContext>()
        .map(|ctx| ctx.cancel.clone())
        .unwrap_or_default();
    let path = request.uri().path().to_string();
    let playlist_id = Query::<HashMap<String, String>>::try_from_uri(request.uri())
        .ok()
        .and_then(|Query(mut params)| params.remove("id"));

    let response = next.run(request).await;
    if !mutating || !response.status().is_success() {
        return response;
    }

    let action = classify(&path, playlist_id.as_deref());
    debug!(path, ?action, "invalidating after mutation");
    match action {
        Invalidation::UserData => state.cache.invalidate_user_data(&cancel).await,
        Invalidation::Playlist { id, user_data } => {
            state.cache.invalidate_playlist(&id, &cancel).await;
            if user_data {
                state.cache.invalidate_user_data(&cancel).await;
            }
        }
        Invalidation::Reset => {
            state.cache.reset(&cancel).await;
            if let Err(e) = state.tokens.clear(&cancel).await {
                warn!(error = %e, "failed to drop session token on reset");
            }
        }
    }
    response
}
