//! HTTP request handlers.

pub mod capabilities;
mod common;
pub mod imports;
pub mod styles;
pub mod tiles;
pub mod tilesets;

pub use capabilities::*;
pub use imports::*;
pub use styles::*;
pub use tiles::*;
pub use tilesets::*;
