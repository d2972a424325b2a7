use std::{future::IntoFuture, net::SocketAddr, str::FromStr, time::Duration};

use axum::{
    Router, middleware,
    routing::{delete, get},
};
use tokio::{net::TcpListener, signal};
use tower_http::{timeout::TimeoutLayer, trace::TraceLayer};
use tracing::{info, warn};

use crate::{
    Res,
    api::{self, AppState, auth, playlist, track},
};

/// Longest a single request may run.
pub const REQUEST_TIMEOUT: Duration = Duration::from_secs(15);
/// How long in-flight requests get to finish once shutdown starts.
pub const SHUTDOWN_GRACE: Duration = Duration::from_secs(5);

/// Builds the full router with its middleware stack.
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(api::health))
        .route("/auth/login", get(auth::login))
        .route("/auth/callback", get(auth::callback))
        .route("/auth/logout", get(auth::logout))
        .route("/auth/is-auth", get(auth::is_auth))
        .route("/track/summary", get(track::summary))
        .route(
            "/track/by-artist/{id}",
            get(track::by_artist).delete(track::delete_by_artist),
        )
        .route("/track/by-range", delete(track::delete_by_range))
        .route("/track/{id}", delete(track::delete_track))
        .route("/playlist/list", get(playlist::list))
        .route("/playlist/tracks", get(playlist::tracks))
        .route("/playlist/delete-tracks", delete(playlist::delete_tracks))
        .route(
            "/playlist/delete-tracks-and-library",
            delete(playlist::delete_tracks_and_library),
        )
        .layer(middleware::from_fn_with_state(
            state.clone(),
            api::middleware::invalidate_after_mutation,
        ))
        .layer(middleware::from_fn_with_state(
            state.clone(),
            api::middleware::bind_session,
        ))
        .layer(TimeoutLayer::new(REQUEST_TIMEOUT))
        .layer(middleware::from_fn(api::middleware::render_timeout))
        .layer(middleware::from_fn(api::middleware::request_context))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Serves `state` on `addr` until Ctrl-C or SIGTERM.
pub async fn run(addr: &str, state: AppState) -> Res<()> {
    let addr = SocketAddr::from_str(addr)?;
    let listener = TcpListener::bind(addr).await?;
    info!(%addr, "listening");

    let (shutdown_tx, shutdown_rx) = tokio::sync::watch::channel(false);
    let server = axum::serve(listener, router(state)).with_graceful_shutdown(async move {
        shutdown_signal().await;
        let _ = shutdown_tx.send(true);
    });

    let mut drain = shutdown_rx;
    let grace = async move {
        if drain.wait_for(|stopping| *stopping).await.is_ok() {
            tokio::time::sleep(SHUTDOWN_GRACE).await;
        } else {
            std::future::pending::<()>().await;
        }
    };

    tokio::select! {
        result = server.into_future() => result?,
        _ = grace => warn!(grace = ?SHUTDOWN_GRACE, "in-flight requests did not drain in time"),
    }

    info!("server stopped");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            warn!(error = %e, "failed to listen for Ctrl-C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                warn!(error = %e, "failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("received Ctrl-C, shutting down"),
        _ = terminate => info!("received SIGTERM, shutting down"),
    }
}
