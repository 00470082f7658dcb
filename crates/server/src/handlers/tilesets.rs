//! Tileset CRUD endpoints.

use super::common::parse_json;
use crate::catalog::{self, request_base_url};
use crate::content;
use crate::error::{ApiError, ApiResult};
use crate::state::AppState;
use axum::Json;
use axum::extract::{Path, State};
use axum::http::{HeaderMap, StatusCode};
use bytes::Bytes;
use mapvault_core::{TileJson, derive_tileset_id, tileset_id_for};
use serde_json::Value;
use time::OffsetDateTime;

/// POST /tilesets
///
/// Registers an upstream-backed tileset and its default style. The id is
/// derived from the document, so posting the same source twice conflicts.
pub async fn create_tileset(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> ApiResult<(StatusCode, Json<Value>)> {
    let tilejson: TileJson = parse_json(&body)?;
    if tilejson.tiles.is_empty() {
        return Err(ApiError::BadRequest(
            "tileset needs at least one tile URL".to_string(),
        ));
    }
    let tileset_id = derive_tileset_id(&tilejson)?;
    let base_url = request_base_url(&state.config.server, &headers);

    let row = catalog::tileset_row(&tileset_id, &tilejson, OffsetDateTime::now_utc())?;
    state.metadata.create_tileset(&row).await?;
    let style_id =
        catalog::save_generated_style(state.metadata.as_ref(), &row, &tilejson, &base_url).await?;

    tracing::info!(
        tileset_id = %tileset_id,
        style_id = %style_id,
        format = %row.format,
        "Tileset created"
    );

    Ok((
        StatusCode::CREATED,
        Json(catalog::public_tilejson(&row, &base_url)?),
    ))
}

/// GET /tilesets
pub async fn list_tilesets(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> ApiResult<Json<Vec<Value>>> {
    let base_url = request_base_url(&state.config.server, &headers);
    let rows = state.metadata.list_tilesets().await?;
    let docs = rows
        .iter()
        .map(|row| catalog::public_tilejson(row, &base_url))
        .collect::<ApiResult<Vec<_>>>()?;
    Ok(Json(docs))
}

/// GET /tilesets/{tileset_id}
pub async fn get_tileset(
    State(state): State<AppState>,
    Path(tileset_id): Path<String>,
    headers: HeaderMap,
) -> ApiResult<Json<Value>> {
    let row = state
        .metadata
        .get_tileset(&tileset_id)
        .await?
        .ok_or_else(|| ApiError::NotFound(format!("tileset {tileset_id}")))?;
    let base_url = request_base_url(&state.config.server, &headers);
    Ok(Json(catalog::public_tilejson(&row, &base_url)?))
}

/// PUT /tilesets/{tileset_id}
///
/// Replaces the stored document. A body `id` must name this tileset, either
/// as the id itself or as the identity it was derived from.
pub async fn update_tileset(
    State(state): State<AppState>,
    Path(tileset_id): Path<String>,
    headers: HeaderMap,
    body: Bytes,
) -> ApiResult<Json<Value>> {
    let mut tilejson: TileJson = parse_json(&body)?;

    if let Some(body_id) = tilejson.id.as_deref().filter(|id| !id.is_empty())
        && body_id != tileset_id
        && tileset_id_for(body_id) != tileset_id
    {
        return Err(ApiError::MismatchedId {
            path: tileset_id,
            body: body_id.to_string(),
        });
    }

    let existing = state
        .metadata
        .get_tileset(&tileset_id)
        .await?
        .ok_or_else(|| ApiError::NotFound(format!("tileset {tileset_id}")))?;

    // Keep the identity the id was derived from.
    tilejson.id = catalog::stored_tilejson(&existing)?.id;

    let mut row = catalog::tileset_row(&tileset_id, &tilejson, OffsetDateTime::now_utc())?;
    row.created_at = existing.created_at;
    state.metadata.update_tileset(&row).await?;

    let base_url = request_base_url(&state.config.server, &headers);
    catalog::save_generated_style(state.metadata.as_ref(), &row, &tilejson, &base_url).await?;

    tracing::info!(tileset_id = %tileset_id, "Tileset updated");
    Ok(Json(catalog::public_tilejson(&row, &base_url)?))
}

/// DELETE /tilesets/{tileset_id}
///
/// Removes the tileset and its tile mappings. Tile data no longer referenced
/// by any tileset is reclaimed in the background.
pub async fn delete_tileset(
    State(state): State<AppState>,
    Path(tileset_id): Path<String>,
) -> ApiResult<StatusCode> {
    let tiles = state.metadata.delete_tileset(&tileset_id).await?;
    tracing::info!(tileset_id = %tileset_id, tiles, "Tileset deleted");

    content::spawn_reclaim(
        state.metadata.clone(),
        state.config.import.reclaim_batch_size,
    );
    Ok(StatusCode::NO_CONTENT)
}
