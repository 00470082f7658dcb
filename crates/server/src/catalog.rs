//! Tileset documents and generated styles.

use crate::error::{ApiError, ApiResult};
use axum::http::HeaderMap;
use axum::http::header::HOST;
use mapvault_core::config::ServerConfig;
use mapvault_core::style::{generate_style, tile_url_template};
use mapvault_core::{TileJson, TilesetFormat};
use mapvault_metadata::models::{StyleRow, TilesetRow};
use mapvault_metadata::{MetadataResult, MetadataStore};
use time::OffsetDateTime;
use uuid::Uuid;

/// Base URL clients use to reach this server.
///
/// The configured public URL wins; otherwise the request's `Host` header.
pub fn request_base_url(config: &ServerConfig, headers: &HeaderMap) -> String {
    if let Some(url) = &config.public_base_url {
        return url.trim_end_matches('/').to_string();
    }
    let host = headers
        .get(HOST)
        .and_then(|v| v.to_str().ok())
        .filter(|h| !h.is_empty())
        .unwrap_or("localhost");
    format!("http://{host}")
}

/// Build the stored row for a tileset description.
///
/// The declared tile URLs become the upstream templates.
pub fn tileset_row(
    tileset_id: &str,
    tilejson: &TileJson,
    now: OffsetDateTime,
) -> ApiResult<TilesetRow> {
    let format = tilejson.resolve_format()?;
    let upstream_tile_urls = if tilejson.tiles.is_empty() {
        None
    } else {
        Some(
            serde_json::to_string(&tilejson.tiles)
                .map_err(|e| ApiError::Internal(e.to_string()))?,
        )
    };
    let tilejson_text =
        serde_json::to_string(tilejson).map_err(|e| ApiError::Internal(e.to_string()))?;

    Ok(TilesetRow {
        tileset_id: tileset_id.to_string(),
        name: tilejson.display_name(tileset_id),
        format: format.as_str().to_string(),
        tilejson: tilejson_text,
        upstream_tile_urls,
        created_at: now,
        updated_at: now,
    })
}

/// Decode the stored TileJSON of a tileset.
pub fn stored_tilejson(row: &TilesetRow) -> ApiResult<TileJson> {
    serde_json::from_str(&row.tilejson).map_err(|e| {
        ApiError::Internal(format!(
            "stored tilejson for {} is corrupt: {e}",
            row.tileset_id
        ))
    })
}

/// TileJSON as served to clients: `tiles` points back at this server.
pub fn public_tilejson(row: &TilesetRow, base_url: &str) -> ApiResult<serde_json::Value> {
    let mut doc = stored_tilejson(row)?;
    doc.id = Some(row.tileset_id.clone());
    doc.name = Some(row.name.clone());
    doc.tiles = vec![tile_url_template(base_url, &row.tileset_id)];
    // Served tiles always use XYZ rows regardless of the origin's scheme.
    doc.scheme = Default::default();
    if doc.format.is_none() {
        doc.format = TilesetFormat::parse(&row.format).ok();
    }
    serde_json::to_value(&doc).map_err(|e| ApiError::Internal(e.to_string()))
}

/// Create or replace the generated style for a tileset.
pub async fn save_generated_style(
    metadata: &dyn MetadataStore,
    row: &TilesetRow,
    tilejson: &TileJson,
    base_url: &str,
) -> MetadataResult<Uuid> {
    let format = TilesetFormat::parse(&row.format)?;
    let style = generate_style(
        &row.name,
        &row.tileset_id,
        format,
        tilejson.first_vector_layer(),
        base_url,
    );
    let now = OffsetDateTime::now_utc();
    metadata
        .upsert_tileset_style(&StyleRow {
            style_id: Uuid::new_v4(),
            name: row.name.clone(),
            tileset_id: Some(row.tileset_id.clone()),
            style_json: style.to_string(),
            created_at: now,
            updated_at: now,
        })
        .await
}
