//! Tileset descriptions and deterministic tileset ids.

use crate::hash::ContentHash;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Number of digest bytes kept in a tileset id (32 hex chars).
const TILESET_ID_BYTES: usize = 16;

/// Encoding of the tiles in a tileset.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TilesetFormat {
    Png,
    #[serde(alias = "jpeg")]
    Jpg,
    Webp,
    /// Mapbox vector tiles.
    Pbf,
}

impl TilesetFormat {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Png => "png",
            Self::Jpg => "jpg",
            Self::Webp => "webp",
            Self::Pbf => "pbf",
        }
    }

    /// Parse a format name as found in archive metadata or tile URLs.
    pub fn parse(s: &str) -> crate::Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "png" => Ok(Self::Png),
            "jpg" | "jpeg" => Ok(Self::Jpg),
            "webp" => Ok(Self::Webp),
            "pbf" | "mvt" => Ok(Self::Pbf),
            other => Err(crate::Error::UnsupportedFormat(format!(
                "'{other}' (expected one of png, jpg, webp, pbf)"
            ))),
        }
    }

    pub fn is_raster(&self) -> bool {
        !matches!(self, Self::Pbf)
    }
}

impl fmt::Display for TilesetFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Row ordering of the upstream tile grid.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TileScheme {
    #[default]
    Xyz,
    /// Row 0 at the bottom; `{y}` in templates is flipped.
    Tms,
}

fn default_tilejson_version() -> String {
    "2.2.0".to_string()
}

/// A TileJSON document describing a tile source.
///
/// Fields this crate does not interpret are preserved in `extra`.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct TileJson {
    #[serde(default = "default_tilejson_version")]
    pub tilejson: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub attribution: Option<String>,
    #[serde(default)]
    pub scheme: TileScheme,
    #[serde(default)]
    pub tiles: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub minzoom: Option<u8>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub maxzoom: Option<u8>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bounds: Option<Vec<f64>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub center: Option<Vec<f64>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub format: Option<TilesetFormat>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub vector_layers: Option<serde_json::Value>,
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

impl TileJson {
    /// Minimal document with no upstream, used for archive imports.
    pub fn new(name: impl Into<String>, format: TilesetFormat) -> Self {
        Self {
            tilejson: default_tilejson_version(),
            id: None,
            name: Some(name.into()),
            description: None,
            attribution: None,
            scheme: TileScheme::Xyz,
            tiles: Vec::new(),
            minzoom: None,
            maxzoom: None,
            bounds: None,
            center: None,
            format: Some(format),
            vector_layers: None,
            extra: serde_json::Map::new(),
        }
    }

    /// Resolve the tile encoding.
    ///
    /// An explicit `format` wins, then the presence of `vector_layers`, then the
    /// extension of the first tile URL. Raster sources with no hint are PNG.
    pub fn resolve_format(&self) -> crate::Result<TilesetFormat> {
        if let Some(format) = self.format {
            return Ok(format);
        }
        if self.vector_layers.is_some() {
            return Ok(TilesetFormat::Pbf);
        }
        match self.tiles.first().and_then(|url| url_extension(url)) {
            Some(ext) => TilesetFormat::parse(ext).or(Ok(TilesetFormat::Png)),
            None => Ok(TilesetFormat::Png),
        }
    }

    /// Id of the first declared vector layer, if any.
    pub fn first_vector_layer(&self) -> Option<&str> {
        self.vector_layers
            .as_ref()?
            .as_array()?
            .first()?
            .get("id")?
            .as_str()
    }

    /// Display name, falling back to the id.
    pub fn display_name(&self, tileset_id: &str) -> String {
        self.name
            .clone()
            .filter(|n| !n.is_empty())
            .unwrap_or_else(|| tileset_id.to_string())
    }
}

/// Extension of the path component of a tile URL template, lowercased.
fn url_extension(url: &str) -> Option<&str> {
    let path = url.split(['?', '#']).next()?;
    let last = path.rsplit('/').next()?;
    let (_, ext) = last.rsplit_once('.')?;
    // "@2x.png" style retina suffixes keep the real extension after the dot.
    Some(ext).filter(|e| !e.is_empty() && e.chars().all(|c| c.is_ascii_alphanumeric()))
}

/// Hash an identity string into a tileset id.
pub fn tileset_id_for(identity: &str) -> String {
    ContentHash::compute(identity.as_bytes()).to_short_hex(TILESET_ID_BYTES)
}

/// Derive the stable id for a tileset description.
///
/// The identity is the explicit `id` when present, otherwise the
/// lexicographically smallest tile URL, so declaration order never changes
/// the result.
pub fn derive_tileset_id(tilejson: &TileJson) -> crate::Result<String> {
    if let Some(id) = tilejson.id.as_deref().filter(|id| !id.is_empty()) {
        return Ok(tileset_id_for(id));
    }
    tilejson
        .tiles
        .iter()
        .min()
        .map(|url| tileset_id_for(url))
        .ok_or_else(|| {
            crate::Error::InvalidTileset("tileset needs an id or at least one tile URL".to_string())
        })
}
