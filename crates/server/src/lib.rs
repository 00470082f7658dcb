//! HTTP server for the mapvault tile cache.
//!
//! This crate provides the serving and ingest plane:
//! - Tile reads with stale-while-revalidate against upstream origins
//! - Tileset and style management
//! - MBTiles imports with live progress
//! - Startup reconciliation of interrupted imports

pub mod bootstrap;
pub mod catalog;
pub mod content;
pub mod error;
pub mod handlers;
pub mod import;
pub mod metrics;
pub mod progress;
pub mod routes;
pub mod state;
pub mod tile_cache;
pub mod upstream;

pub use error::ApiError;
pub use routes::create_router;
pub use state::AppState;
