//! Repository traits for metadata operations.

pub mod imports;
pub mod styles;
pub mod tiles;
pub mod tilesets;

pub use imports::ImportRepo;
pub use styles::StyleRepo;
pub use tiles::{TileRepo, TileWrite, TileWriteOutcome};
pub use tilesets::TilesetRepo;
