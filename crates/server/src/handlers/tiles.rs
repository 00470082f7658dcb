//! Tile serving endpoint.

use crate::error::{ApiError, ApiResult};
use crate::metrics;
use crate::state::AppState;
use axum::body::Body;
use axum::extract::{Path, State};
use axum::http::{HeaderValue, StatusCode, header};
use axum::response::Response;
use mapvault_core::TileCoord;

/// Parse `{z}/{x}/{y}` path segments. `y` may carry a file extension.
fn parse_coord(z: &str, x: &str, y: &str) -> ApiResult<TileCoord> {
    let y = y.split_once('.').map_or(y, |(row, _)| row);
    let bad = |what: &str, raw: &str| ApiError::BadRequest(format!("invalid {what}: {raw}"));
    let zoom = z.parse::<u8>().map_err(|_| bad("zoom", z))?;
    let column = x.parse::<u32>().map_err(|_| bad("column", x))?;
    let row = y.parse::<u32>().map_err(|_| bad("row", y))?;
    Ok(TileCoord::new(zoom, column, row)?)
}

/// GET /tilesets/{tileset_id}/{z}/{x}/{y}
pub async fn get_tile(
    State(state): State<AppState>,
    Path((tileset_id, z, x, y)): Path<(String, String, String, String)>,
) -> ApiResult<Response> {
    let coord = parse_coord(&z, &x, &y)?;
    let tile = state.tiles.get_tile(&tileset_id, coord).await?;

    metrics::TILE_BYTES_SERVED.inc_by(tile.data.len() as u64);

    let mut builder = Response::builder()
        .status(StatusCode::OK)
        .header(header::CONTENT_TYPE, tile.content.content_type);
    if let Some(encoding) = tile.content.content_encoding {
        builder = builder.header(header::CONTENT_ENCODING, encoding);
    }
    if let Some(etag) = tile.etag.as_deref()
        && let Ok(value) = HeaderValue::from_str(etag)
    {
        builder = builder.header(header::ETAG, value);
    }

    builder
        .body(Body::from(tile.data))
        .map_err(|e| ApiError::Internal(format!("failed to build tile response: {e}")))
}
