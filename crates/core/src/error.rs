//! Error types for the core domain.

use thiserror::Error;

/// Core domain error type.
#[derive(Debug, Error)]
pub enum Error {
    #[error("invalid tile coordinate: {0}")]
    InvalidCoordinate(String),

    #[error("unsupported format: {0}")]
    UnsupportedFormat(String),

    #[error("invalid tileset: {0}")]
    InvalidTileset(String),

    #[error("invalid import transition: {from} -> {to}")]
    InvalidTransition { from: String, to: String },

    #[error("invalid import record: {0}")]
    InvalidImportRecord(String),
}

/// Result type alias for core operations.
pub type Result<T> = std::result::Result<T, Error>;
