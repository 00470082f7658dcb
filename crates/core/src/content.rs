//! Tile content kind inferred from magic bytes.

/// Response metadata for a stored tile.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct TileContent {
    pub content_type: &'static str,
    pub content_encoding: Option<&'static str>,
}

impl TileContent {
    /// Sniff the content kind from the first bytes of `data`.
    ///
    /// Anything that is not a known image signature is treated as a vector
    /// tile; a gzip header marks it as compressed.
    pub fn sniff(data: &[u8]) -> Self {
        let content_type = match data {
            [0x89, b'P', b'N', b'G', ..] => "image/png",
            [0xFF, 0xD8, 0xFF, ..] => "image/jpeg",
            [b'R', b'I', b'F', b'F', _, _, _, _, b'W', b'E', b'B', b'P', ..] => "image/webp",
            [b'G', b'I', b'F', b'8', ..] => "image/gif",
            _ => "application/x-protobuf",
        };
        let content_encoding = match data {
            [0x1F, 0x8B, ..] => Some("gzip"),
            [0x78, 0x9C, ..] => Some("deflate"),
            _ => None,
        };
        Self {
            content_type,
            content_encoding,
        }
    }
}
