use std::sync::Arc;

use async_trait::async_trait;
use axum::{
    extract::{Path, State},
    http::{HeaderMap, StatusCode},
    Json,
};
use presentation::RegionStore;
use shared::{
    domain::PresentationId,
    error::{ApiError, ErrorCode},
    protocol::{StorageRegion, UserRegion},
};
use storage::Storage;
use tracing::{debug, error};

use crate::app_state::AppState;

const CITY_HEADER: &str = "cf-ipcity";
const COUNTRY_HEADER: &str = "cf-ipcountry";
const UNKNOWN: &str = "unknown";

/// Region persistence for presentation actors, kept in SQLite.
pub(crate) struct SqliteRegions<'a>(pub(crate) &'a Storage);

#[async_trait]
impl<'a> RegionStore for SqliteRegions<'a> {
    async fn load_colo(&self, presentation_id: &PresentationId) -> anyhow::Result<Option<String>> {
        Ok(self.0.load_region(presentation_id).await?.map(|region| region.colo))
    }

    async fn save_colo_if_absent(
        &self,
        presentation_id: &PresentationId,
        colo: &str,
    ) -> anyhow::Result<String> {
        let stored = self.0.store_region_if_absent(presentation_id, colo).await?;
        debug!(%presentation_id, colo = %stored, "cached storage region");
        Ok(stored)
    }
}

/// Where the caller appears to be, as reported by the edge in front of us.
pub(crate) async fn user_region(headers: HeaderMap) -> Json<UserRegion> {
    Json(UserRegion {
        city: header_or_unknown(&headers, CITY_HEADER),
        country: header_or_unknown(&headers, COUNTRY_HEADER),
    })
}

pub(crate) async fn storage_region(
    State(state): State<Arc<AppState>>,
    Path(presentation_id): Path<String>,
) -> Result<Json<StorageRegion>, (StatusCode, Json<ApiError>)> {
    let presentation_id = PresentationId(presentation_id);
    let actor = state.directory.resolve(&presentation_id).await;
    let colo = actor
        .storage_region(&SqliteRegions(&state.storage), &state.region_code)
        .await
        .map_err(|e| {
            error!(%presentation_id, error = %e, "failed to resolve storage region");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(ApiError::new(ErrorCode::Internal, e.to_string())),
            )
        })?;
    Ok(Json(StorageRegion { colo }))
}

fn header_or_unknown(headers: &HeaderMap, name: &str) -> String {
    headers
        .get(name)
        .and_then(|value| value.to_str().ok())
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .unwrap_or(UNKNOWN)
        .to_string()
}
