//! Archive import endpoints.

use super::common::{parse_json, parse_uuid};
use crate::catalog::{self, request_base_url};
use crate::error::{ApiError, ApiResult};
use crate::state::AppState;
use axum::Json;
use axum::extract::{Path, State};
use axum::http::{HeaderMap, StatusCode};
use axum::response::sse::{Event, KeepAlive, Sse};
use bytes::Bytes;
use futures::{Stream, StreamExt};
use mapvault_core::{ImportId, ImportRecord};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::convert::Infallible;
use std::path::PathBuf;

/// Most recent imports returned by the listing.
const IMPORT_LIST_LIMIT: u32 = 100;

/// Import request body.
#[derive(Debug, Deserialize)]
pub struct ImportRequest {
    /// Archive path on the server's filesystem.
    #[serde(alias = "filePath")]
    pub file_path: PathBuf,
}

/// Import submission response.
#[derive(Debug, Serialize)]
pub struct ImportResponse {
    pub import: ImportRecord,
    pub tileset: Value,
}

/// POST /tilesets/import
///
/// Validates the archive and returns once the job is running. Poll
/// `/imports/{id}` or follow `/imports/progress/{id}` for the outcome.
pub async fn import_tileset(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> ApiResult<(StatusCode, Json<ImportResponse>)> {
    let req: ImportRequest = parse_json(&body)?;
    let base_url = request_base_url(&state.config.server, &headers);

    let submitted = state.imports.submit(&req.file_path, base_url.clone()).await?;

    Ok((
        StatusCode::ACCEPTED,
        Json(ImportResponse {
            tileset: catalog::public_tilejson(&submitted.tileset, &base_url)?,
            import: submitted.import,
        }),
    ))
}

/// GET /imports
pub async fn list_imports(State(state): State<AppState>) -> ApiResult<Json<Vec<ImportRecord>>> {
    let rows = state.metadata.list_imports(IMPORT_LIST_LIMIT).await?;
    let records = rows
        .into_iter()
        .map(ImportRecord::try_from)
        .collect::<Result<Vec<_>, _>>()?;
    Ok(Json(records))
}

/// GET /imports/{import_id}
pub async fn get_import(
    State(state): State<AppState>,
    Path(import_id): Path<String>,
) -> ApiResult<Json<ImportRecord>> {
    let id = parse_uuid(&import_id, "import")?;
    let row = state
        .metadata
        .get_import(id)
        .await?
        .ok_or_else(|| ApiError::NotFound(format!("import {import_id}")))?;
    Ok(Json(ImportRecord::try_from(row)?))
}

/// GET /imports/progress/{import_id}
///
/// Server-sent `progress` events carrying the import record. The stream ends
/// after the terminal snapshot.
pub async fn import_progress(
    State(state): State<AppState>,
    Path(import_id): Path<String>,
) -> ApiResult<Sse<impl Stream<Item = Result<Event, Infallible>>>> {
    let id = ImportId::from_uuid(parse_uuid(&import_id, "import")?);
    let snapshots = state.progress.snapshots(state.metadata.clone(), id).await?;

    let events = snapshots.filter_map(|record| async move {
        match Event::default().event("progress").json_data(&record) {
            Ok(event) => Some(Ok(event)),
            Err(e) => {
                tracing::warn!(import_id = %record.id, error = %e, "Failed to encode progress event");
                None
            }
        }
    });

    Ok(Sse::new(events).keep_alive(KeepAlive::default()))
}
