//! Style endpoints.

use super::common::parse_uuid;
use crate::error::{ApiError, ApiResult};
use crate::state::AppState;
use axum::Json;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use serde::Serialize;
use serde_json::Value;
use time::OffsetDateTime;
use uuid::Uuid;

/// Style listing entry.
#[derive(Debug, Serialize)]
pub struct StyleSummary {
    pub id: Uuid,
    pub name: String,
    pub tileset_id: Option<String>,
    /// Bytes of tile data stored for the style's tileset.
    pub bytes_stored: u64,
    #[serde(with = "time::serde::rfc3339")]
    pub created: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339")]
    pub updated: OffsetDateTime,
}

/// GET /styles
pub async fn list_styles(State(state): State<AppState>) -> ApiResult<Json<Vec<StyleSummary>>> {
    let rows = state.metadata.list_styles().await?;
    Ok(Json(
        rows.into_iter()
            .map(|row| StyleSummary {
                id: row.style_id,
                name: row.name,
                tileset_id: row.tileset_id,
                bytes_stored: row.bytes_stored.max(0) as u64,
                created: row.created_at,
                updated: row.updated_at,
            })
            .collect(),
    ))
}

/// GET /styles/{style_id}
///
/// Returns the style document itself.
pub async fn get_style(
    State(state): State<AppState>,
    Path(style_id): Path<String>,
) -> ApiResult<Json<Value>> {
    let id = parse_uuid(&style_id, "style")?;
    let row = state
        .metadata
        .get_style(id)
        .await?
        .ok_or_else(|| ApiError::NotFound(format!("style {style_id}")))?;
    let doc = serde_json::from_str(&row.style_json)
        .map_err(|e| ApiError::Internal(format!("stored style {id} is corrupt: {e}")))?;
    Ok(Json(doc))
}

/// DELETE /styles/{style_id}
pub async fn delete_style(
    State(state): State<AppState>,
    Path(style_id): Path<String>,
) -> ApiResult<StatusCode> {
    let id = parse_uuid(&style_id, "style")?;
    state.metadata.delete_style(id).await?;
    tracing::info!(style_id = %id, "Style deleted");
    Ok(StatusCode::NO_CONTENT)
}
