//! Archive backends.

pub mod mbtiles;
