//! Style repository.

use crate::error::MetadataResult;
use crate::models::{StyleRow, StyleSummaryRow};
use async_trait::async_trait;
use uuid::Uuid;

/// Repository for style operations.
#[async_trait]
pub trait StyleRepo: Send + Sync {
    /// Create a style.
    async fn create_style(&self, style: &StyleRow) -> MetadataResult<()>;

    /// Store the generated style for `style.tileset_id`, replacing any previous one.
    /// Returns the id of the stored style (the existing id on replace).
    async fn upsert_tileset_style(&self, style: &StyleRow) -> MetadataResult<Uuid>;

    /// Get a style by id.
    async fn get_style(&self, style_id: Uuid) -> MetadataResult<Option<StyleRow>>;

    /// List styles with the bytes stored by their tilesets.
    async fn list_styles(&self) -> MetadataResult<Vec<StyleSummaryRow>>;

    /// Delete a style.
    async fn delete_style(&self, style_id: Uuid) -> MetadataResult<()>;
}
