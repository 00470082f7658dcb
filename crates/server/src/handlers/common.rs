//! Helpers shared by handlers.

use crate::error::{ApiError, ApiResult};
use bytes::Bytes;
use serde::de::DeserializeOwned;
use uuid::Uuid;

/// Decode a JSON request body, reporting failures as `bad_request`.
pub(crate) fn parse_json<T: DeserializeOwned>(body: &Bytes) -> ApiResult<T> {
    serde_json::from_slice(body).map_err(|e| ApiError::BadRequest(format!("invalid JSON: {e}")))
}

/// Parse a UUID path segment.
pub(crate) fn parse_uuid(raw: &str, what: &str) -> ApiResult<Uuid> {
    Uuid::parse_str(raw).map_err(|_| ApiError::BadRequest(format!("invalid {what} id: {raw}")))
}
