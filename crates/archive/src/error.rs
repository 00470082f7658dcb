//! Archive error types.

use std::path::PathBuf;
use thiserror::Error;

/// Errors raised while opening or reading a tile archive.
#[derive(Debug, Error)]
pub enum ArchiveError {
    #[error("archive not found: {}", .0.display())]
    Missing(PathBuf),

    #[error("invalid archive metadata: {0}")]
    InvalidMetadata(String),

    #[error("archive unreadable: {0}")]
    Unreadable(String),

    #[error("unsupported tile format: {0}")]
    UnsupportedFormat(String),

    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
}

/// Result type for archive operations.
pub type ArchiveResult<T> = std::result::Result<T, ArchiveError>;
