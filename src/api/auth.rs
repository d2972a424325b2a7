use axum::{
    extract::{Query, State},
    http::{StatusCode, header},
    response::{IntoResponse, Response},
};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::{
    api::{
        AppState,
        middleware::{RequestContext, Session},
        response::{ApiResponse, MessageBody},
    },
    error::Result,
    types::{PkceToken, UserHandle},
    utils,
};

/// Seconds a login may wait for its callback.
const PENDING_LOGIN_TTL_SECS: u64 = 10 * 60;

#[derive(Debug, Deserialize)]
pub struct CallbackParams {
    pub code: Option<String>,
    pub state: Option<String>,
    pub error: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct AuthStatus {
    pub user: UserProfile,
}

#[derive(Debug, Serialize)]
pub struct UserProfile {
    pub spotify_id: String,
    pub display_name: String,
    pub email: String,
    pub profile_image: Option<String>,
}

impl From<UserHandle> for UserProfile {
    fn from(user: UserHandle) -> Self {
        Self {
            spotify_id: user.id,
            display_name: user.display_name,
            email: user.email,
            profile_image: user.image_url,
        }
    }
}

fn found(location: &str) -> Response {
    (StatusCode::FOUND, [(header::LOCATION, location.to_string())]).into_response()
}

/// Starts the authorization-code flow.
///
/// Generates the PKCE verifier and an opaque `state`, remembers both until
/// the callback, and redirects the browser to the provider.
pub async fn login(State(state): State<AppState>) -> Response {
    let verifier = utils::generate_code_verifier();
    let challenge = utils::generate_code_challenge(&verifier);
    let login_state = utils::generate_state();
    let now = Utc::now().timestamp() as u64;

    {
        let mut pending = state.pending_logins.lock().await;
        pending.retain(|_, login| login.created_at + PENDING_LOGIN_TTL_SECS > now);
        pending.insert(
            login_state.clone(),
            PkceToken {
                code_verifier: verifier,
                created_at: now,
            },
        );
    }

    found(&state.connector.authorize_url(&login_state, &challenge))
}

/// Completes the login and sends the browser back to the frontend.
///
/// Failures never render an error page; the frontend receives
/// `?error=<reason>` instead.
pub async fn callback(
    State(state): State<AppState>,
    ctx: RequestContext,
    Query(params): Query<CallbackParams>,
) -> Response {
    let target = state.config.frontend_callback_url();
    let fail = |reason: &str| found(&format!("{}?error={}", target, reason));

    if let Some(reason) = params.error.as_deref() {
        warn!(reason, "provider denied authorization");
        return fail("access_denied");
    }
    let Some(code) = params.code.filter(|c| !c.is_empty()) else {
        return fail("missing_code");
    };

    let pending = match params.state {
        Some(key) => state.pending_logins.lock().await.remove(&key),
        None => None,
    };
    let Some(pending) = pending else {
        warn!("callback with unknown or missing state");
        return fail("invalid_state");
    };

    let token = match state
        .connector
        .exchange_code(&code, &pending.code_verifier)
        .await
    {
        Ok(token) => token,
        Err(e) => {
            warn!(error = %e, "token exchange failed");
            return fail("exchange_failed");
        }
    };

    if let Err(e) = state.tokens.persist(&token, &ctx.cancel).await {
        warn!(error = %e, "failed to store session token");
        return fail("session_unavailable");
    }
    state.cache.invalidate_user_data(&ctx.cancel).await;

    info!("login completed");
    found(&target)
}

pub async fn logout(
    State(state): State<AppState>,
    ctx: RequestContext,
) -> ApiResponse<MessageBody> {
    if let Err(e) = state.tokens.clear(&ctx.cancel).await {
        warn!(error = %e, "failed to delete session token");
    }
    state.cache.invalidate_user_data(&ctx.cancel).await;
    ApiResponse::message("Logged out")
}

pub async fn is_auth(
    Session(api): Session,
    ctx: RequestContext,
) -> Result<ApiResponse<AuthStatus>> {
    let user = api.current_user(&ctx.cancel).await?;
    Ok(ApiResponse(AuthStatus { user: user.into() }))
}
