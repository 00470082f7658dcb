//! Generated style documents for imported and registered tilesets.

use crate::tileset::TilesetFormat;
use crate::{RASTER_TILE_SIZE, STYLE_SPEC_VERSION};
use serde_json::{Value, json};

/// URL clients use to fetch a tileset's TileJSON from this server.
pub fn tileset_url(base_url: &str, tileset_id: &str) -> String {
    format!("{}/tilesets/{tileset_id}", base_url.trim_end_matches('/'))
}

/// Tile URL template clients use to fetch tiles from this server.
pub fn tile_url_template(base_url: &str, tileset_id: &str) -> String {
    format!("{}/{{z}}/{{x}}/{{y}}", tileset_url(base_url, tileset_id))
}

/// Build a minimal style with one source for the tileset and one layer.
///
/// Raster tilesets get a `raster` layer. Vector tilesets get a `line` layer
/// drawing `vector_layer`, or the first layer name the caller knows about.
pub fn generate_style(
    name: &str,
    tileset_id: &str,
    format: TilesetFormat,
    vector_layer: Option<&str>,
    base_url: &str,
) -> Value {
    let url = tileset_url(base_url, tileset_id);
    if format.is_raster() {
        json!({
            "version": STYLE_SPEC_VERSION,
            "name": name,
            "sources": {
                "raster-source": {
                    "type": "raster",
                    "url": url,
                    "tileSize": RASTER_TILE_SIZE,
                }
            },
            "layers": [
                {
                    "id": "raster-layer",
                    "type": "raster",
                    "source": "raster-source",
                }
            ],
        })
    } else {
        let mut layer = json!({
            "id": "vector-layer",
            "type": "line",
            "source": "vector-source",
        });
        if let Some(source_layer) = vector_layer {
            layer["source-layer"] = Value::String(source_layer.to_string());
        }
        json!({
            "version": STYLE_SPEC_VERSION,
            "name": name,
            "sources": {
                "vector-source": {
                    "type": "vector",
                    "url": url,
                }
            },
            "layers": [layer],
        })
    }
}
