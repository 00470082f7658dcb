//! API error types.

use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use mapvault_archive::ArchiveError;
use serde::Serialize;

/// API error response.
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    /// Error code for programmatic handling.
    pub code: String,
    /// Human-readable error message.
    pub message: String,
}

/// API error type.
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("not found: {0}")]
    NotFound(String),

    #[error("already exists: {0}")]
    AlreadyExists(String),

    #[error("bad request: {0}")]
    BadRequest(String),

    #[error("id mismatch: path has {path}, body has {body}")]
    MismatchedId { path: String, body: String },

    #[error("unsupported format: {0}")]
    UnsupportedFormat(String),

    #[error("import target missing: {0}")]
    ImportTargetMissing(String),

    #[error("invalid archive metadata: {0}")]
    InvalidArchiveMetadata(String),

    #[error("archive unreadable: {0}")]
    ArchiveUnreadable(String),

    #[error("internal error: {0}")]
    Internal(String),

    #[error("metadata error: {0}")]
    Metadata(#[from] mapvault_metadata::MetadataError),

    #[error("core error: {0}")]
    Core(#[from] mapvault_core::Error),
}

impl ApiError {
    /// Get the error code for this error.
    pub fn code(&self) -> &'static str {
        match self {
            Self::NotFound(_) => "not_found",
            Self::AlreadyExists(_) => "already_exists",
            Self::BadRequest(_) => "bad_request",
            Self::MismatchedId { .. } => "mismatched_id",
            Self::UnsupportedFormat(_) => "unsupported_format",
            Self::ImportTargetMissing(_) => "import_target_missing",
            Self::InvalidArchiveMetadata(_) => "invalid_archive_metadata",
            Self::ArchiveUnreadable(_) => "archive_unreadable",
            Self::Internal(_) => "internal_error",
            Self::Metadata(e) => match e {
                mapvault_metadata::MetadataError::NotFound(_) => "not_found",
                mapvault_metadata::MetadataError::AlreadyExists(_) => "already_exists",
                _ => "metadata_error",
            },
            Self::Core(e) => match e {
                mapvault_core::Error::UnsupportedFormat(_) => "unsupported_format",
                _ => "bad_request",
            },
        }
    }

    /// Get the HTTP status code for this error.
    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::NotFound(_) => StatusCode::NOT_FOUND,
            Self::AlreadyExists(_) => StatusCode::CONFLICT,
            Self::BadRequest(_)
            | Self::MismatchedId { .. }
            | Self::UnsupportedFormat(_)
            | Self::ImportTargetMissing(_)
            | Self::InvalidArchiveMetadata(_)
            | Self::ArchiveUnreadable(_) => StatusCode::BAD_REQUEST,
            Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
            Self::Metadata(e) => match e {
                mapvault_metadata::MetadataError::NotFound(_) => StatusCode::NOT_FOUND,
                mapvault_metadata::MetadataError::AlreadyExists(_) => StatusCode::CONFLICT,
                _ => StatusCode::INTERNAL_SERVER_ERROR,
            },
            Self::Core(_) => StatusCode::BAD_REQUEST,
        }
    }
}

impl From<ArchiveError> for ApiError {
    fn from(err: ArchiveError) -> Self {
        match err {
            ArchiveError::Missing(path) => Self::ImportTargetMissing(path.display().to_string()),
            ArchiveError::InvalidMetadata(msg) => Self::InvalidArchiveMetadata(msg),
            ArchiveError::Unreadable(msg) => Self::ArchiveUnreadable(msg),
            ArchiveError::UnsupportedFormat(msg) => Self::UnsupportedFormat(msg),
            ArchiveError::Database(e) => Self::ArchiveUnreadable(e.to_string()),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        if status.is_server_error() {
            tracing::error!(code = self.code(), error = %self, "Request failed");
        }
        let body = ErrorResponse {
            code: self.code().to_string(),
            message: self.to_string(),
        };
        (status, Json(body)).into_response()
    }
}

/// Result type for API handlers.
pub type ApiResult<T> = std::result::Result<T, ApiError>;
