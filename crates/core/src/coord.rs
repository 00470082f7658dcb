//! Tile coordinates and quadkey addressing.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Deepest zoom level accepted by the cache.
pub const MAX_ZOOM: u8 = 30;

/// A tile coordinate in the XYZ scheme (row 0 at the top).
#[derive(Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TileCoord {
    pub zoom: u8,
    pub x: u32,
    pub y: u32,
}

impl TileCoord {
    /// Create a coordinate, rejecting anything outside `0 <= x, y < 2^zoom`.
    pub fn new(zoom: u8, x: u32, y: u32) -> crate::Result<Self> {
        if zoom > MAX_ZOOM {
            return Err(crate::Error::InvalidCoordinate(format!(
                "zoom {zoom} exceeds maximum {MAX_ZOOM}"
            )));
        }
        let dim = 1u64 << zoom;
        if u64::from(x) >= dim || u64::from(y) >= dim {
            return Err(crate::Error::InvalidCoordinate(format!(
                "{x}/{y} out of range for zoom {zoom}"
            )));
        }
        Ok(Self { zoom, x, y })
    }

    /// Row index in the TMS scheme (row 0 at the bottom).
    ///
    /// The flip is its own inverse, so this also converts TMS rows back to XYZ.
    pub fn flipped_y(&self) -> u32 {
        ((1u64 << self.zoom) - 1 - u64::from(self.y)) as u32
    }

    /// Encode as a Bing-style quadkey.
    ///
    /// The key has exactly `zoom` digits, each `0..=3`, interleaving one bit of
    /// `x` (low bit of the digit) and one bit of `y` (high bit), most significant
    /// first. Keys sort in Z-order within a zoom and never collide across zooms
    /// because their lengths differ.
    pub fn quad_key(&self) -> String {
        let mut key = String::with_capacity(self.zoom as usize);
        for level in (1..=self.zoom).rev() {
            let mask = 1u32 << (level - 1);
            let mut digit = b'0';
            if self.x & mask != 0 {
                digit += 1;
            }
            if self.y & mask != 0 {
                digit += 2;
            }
            key.push(digit as char);
        }
        key
    }

    /// Decode a quadkey produced by [`TileCoord::quad_key`].
    pub fn from_quad_key(key: &str) -> crate::Result<Self> {
        if key.len() > MAX_ZOOM as usize {
            return Err(crate::Error::InvalidCoordinate(format!(
                "quadkey longer than {MAX_ZOOM} digits"
            )));
        }
        let zoom = key.len() as u8;
        let (mut x, mut y) = (0u32, 0u32);
        for (i, ch) in key.chars().enumerate() {
            let mask = 1u32 << (zoom as usize - 1 - i);
            match ch {
                '0' => {}
                '1' => x |= mask,
                '2' => y |= mask,
                '3' => {
                    x |= mask;
                    y |= mask;
                }
                other => {
                    return Err(crate::Error::InvalidCoordinate(format!(
                        "invalid quadkey digit '{other}'"
                    )));
                }
            }
        }
        Ok(Self { zoom, x, y })
    }
}

impl fmt::Debug for TileCoord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "TileCoord({}/{}/{})", self.zoom, self.x, self.y)
    }
}

impl fmt::Display for TileCoord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}/{}", self.zoom, self.x, self.y)
    }
}
