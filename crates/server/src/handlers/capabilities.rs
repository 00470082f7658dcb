//! Health and capability discovery endpoints.

use crate::error::ApiResult;
use crate::state::AppState;
use axum::Json;
use axum::extract::State;
use mapvault_core::config::DedupScope;
use mapvault_core::{MAX_ZOOM, TilesetFormat};
use serde::Serialize;

/// Health check response.
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub version: &'static str,
}

/// GET /health
pub async fn health_check(State(state): State<AppState>) -> ApiResult<Json<HealthResponse>> {
    state.metadata.health_check().await?;

    Ok(Json(HealthResponse {
        status: "ok",
        version: env!("CARGO_PKG_VERSION"),
    }))
}

/// Capabilities response.
#[derive(Debug, Serialize)]
pub struct CapabilitiesResponse {
    /// API version.
    pub api_version: &'static str,
    /// Tile encodings accepted for tilesets.
    pub formats: Vec<&'static str>,
    /// Archive formats accepted by the import endpoint.
    pub archive_formats: Vec<&'static str>,
    /// Highest addressable zoom level.
    pub max_zoom: u8,
    /// How identical tile bytes are shared.
    pub dedup_scope: DedupScope,
    /// Whether cached tiles are refreshed in the background when served.
    pub revalidate_on_hit: bool,
}

/// GET /v1/capabilities
pub async fn get_capabilities(
    State(state): State<AppState>,
) -> ApiResult<Json<CapabilitiesResponse>> {
    Ok(Json(CapabilitiesResponse {
        api_version: "v1",
        formats: [
            TilesetFormat::Png,
            TilesetFormat::Jpg,
            TilesetFormat::Webp,
            TilesetFormat::Pbf,
        ]
        .iter()
        .map(|f| f.as_str())
        .collect(),
        archive_formats: vec!["mbtiles"],
        max_zoom: MAX_ZOOM,
        dedup_scope: state.config.storage.dedup_scope,
        revalidate_on_hit: state.config.upstream.revalidate_on_hit,
    }))
}
