//! Upstream tile URL templates.

use crate::coord::TileCoord;
use crate::tileset::TileScheme;

/// Pick the mirror for a coordinate.
///
/// The choice depends only on the coordinate so repeated requests for one tile
/// always hit the same upstream host.
pub fn select_template<'a>(templates: &'a [String], coord: &TileCoord) -> Option<&'a str> {
    if templates.is_empty() {
        return None;
    }
    let index = (u64::from(coord.x) + u64::from(coord.y)) % templates.len() as u64;
    templates.get(index as usize).map(String::as_str)
}

/// Substitute a coordinate into a template.
///
/// Supported placeholders: `{z}`, `{x}`, `{y}`, `{-y}` and `{quadkey}`.
/// With [`TileScheme::Tms`] the `{y}` placeholder receives the flipped row.
pub fn interpolate(template: &str, coord: &TileCoord, scheme: TileScheme) -> String {
    let y = match scheme {
        TileScheme::Xyz => coord.y,
        TileScheme::Tms => coord.flipped_y(),
    };
    template
        .replace("{z}", &coord.zoom.to_string())
        .replace("{x}", &coord.x.to_string())
        .replace("{-y}", &coord.flipped_y().to_string())
        .replace("{y}", &y.to_string())
        .replace("{quadkey}", &coord.quad_key())
}

/// Resolve the upstream URL for a coordinate, if the tileset has any templates.
pub fn upstream_url(templates: &[String], scheme: TileScheme, coord: &TileCoord) -> Option<String> {
    select_template(templates, coord).map(|t| interpolate(t, coord, scheme))
}
