use std::{net::SocketAddr, sync::Arc, time::Duration};

use axum::{
    extract::State,
    http::StatusCode,
    routing::get,
    Json, Router,
};
use presentation::PresentationDirectory;
use shared::error::{ApiError, ErrorCode};
use storage::Storage;
use tokio::task::JoinHandle;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

mod app_state;
mod config;
mod region;
mod ws;

use app_state::AppState;
use config::{load_settings, normalize_database_url, Settings};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let settings = load_settings();
    let database_url = normalize_database_url(&settings.database_url);
    let storage = Storage::new(&database_url).await.map_err(|error| {
        error!(
            %database_url,
            %error,
            "failed to open SQLite database; verify parent directory exists and permissions are correct"
        );
        error
    })?;

    let directory = Arc::new(PresentationDirectory::with_queue_capacity(
        settings.session_queue_capacity,
    ));
    let _reaper = spawn_idle_reaper(Arc::clone(&directory), &settings);

    let state = AppState {
        directory,
        storage,
        region_code: settings.region_code.clone(),
        max_frame_bytes: settings.max_frame_bytes,
    };
    let app = build_router(Arc::new(state));

    let addr: SocketAddr = settings.server_bind.parse()?;
    info!(%addr, region = %settings.region_code, "server listening");
    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;
    Ok(())
}

fn build_router(state: Arc<AppState>) -> Router {
    let regions = Router::new()
        .route("/user-region", get(region::user_region))
        .route("/:presentation_id/storage-region", get(region::storage_region))
        .layer(CorsLayer::permissive());

    Router::new()
        .route("/healthz", get(healthz))
        .route("/:presentation_id/presenter/connect", get(ws::presenter_connect))
        .route("/:presentation_id/voter/connect", get(ws::voter_connect))
        .merge(regions)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

async fn healthz(
    State(state): State<Arc<AppState>>,
) -> Result<&'static str, (StatusCode, Json<ApiError>)> {
    state.storage.health_check().await.map_err(|e| {
        (
            StatusCode::SERVICE_UNAVAILABLE,
            Json(ApiError::new(ErrorCode::Unavailable, e.to_string())),
        )
    })?;
    Ok("ok")
}

/// Periodically drops presentations nobody has used for the idle window.
fn spawn_idle_reaper(
    directory: Arc<PresentationDirectory>,
    settings: &Settings,
) -> Option<JoinHandle<()>> {
    if settings.idle_reap_seconds == 0 {
        info!("idle presentation reaping disabled");
        return None;
    }
    let max_idle = Duration::from_secs(settings.idle_reap_seconds);
    let period = Duration::from_secs(settings.reap_interval_seconds.max(1));

    Some(tokio::spawn(async move {
        let mut ticker = tokio::time::interval(period);
        loop {
            ticker.tick().await;
            let reaped = directory.reap_idle(max_idle).await;
            for presentation_id in reaped {
                info!(%presentation_id, "presentation evicted after idling");
            }
        }
    }))
}

#[cfg(test)]
#[path = "tests/main_tests.rs"]
mod tests;
