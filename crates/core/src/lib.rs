//! Core domain types and shared logic for the mapvault tile cache.
//!
//! This crate defines the canonical data model used across all other crates:
//! - Tile coordinates and quadkey addressing
//! - Content hashes for deduplicated tile data
//! - Tileset descriptions (TileJSON) and deterministic tileset ids
//! - Upstream URL templates
//! - Import job records and their state machine
//! - Generated style documents

pub mod config;
pub mod content;
pub mod coord;
pub mod error;
pub mod hash;
pub mod import;
pub mod style;
pub mod template;
pub mod tileset;

pub use content::TileContent;
pub use coord::{MAX_ZOOM, TileCoord};
pub use error::{Error, Result};
pub use hash::ContentHash;
pub use import::{ImportFailure, ImportId, ImportRecord, ImportState};
pub use tileset::{TileJson, TileScheme, TilesetFormat, derive_tileset_id, tileset_id_for};

/// Tile size in pixels advertised for raster sources.
pub const RASTER_TILE_SIZE: u32 = 256;

/// Version of the style specification emitted by generated styles.
pub const STYLE_SPEC_VERSION: u8 = 8;
