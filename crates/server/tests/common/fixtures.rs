//! Test fixtures for generating tile data and archives.

use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use std::path::Path;

/// Generate a small PNG-looking payload that is unique per seed.
#[allow(dead_code)]
pub fn png_tile(seed: u64) -> Vec<u8> {
    let mut data = vec![0x89, b'P', b'N', b'G', 0x0D, 0x0A, 0x1A, 0x0A];
    data.extend_from_slice(&seed.to_le_bytes());
    data
}

/// A gzip-framed payload, as vector tiles are usually stored.
#[allow(dead_code)]
pub fn gzipped_vector_tile(seed: u64) -> Vec<u8> {
    let mut data = vec![0x1F, 0x8B, 0x08, 0x00];
    data.extend_from_slice(&seed.to_le_bytes());
    data
}

/// Metadata rows for a valid raster archive.
#[allow(dead_code)]
pub fn raster_metadata(name: &str) -> Vec<(String, String)> {
    vec![
        ("name".to_string(), name.to_string()),
        ("format".to_string(), "png".to_string()),
        ("bounds".to_string(), "-180,-85.0511,180,85.0511".to_string()),
    ]
}

/// Metadata rows for a valid vector archive with one `roads` layer.
#[allow(dead_code)]
pub fn vector_metadata(name: &str) -> Vec<(String, String)> {
    vec![
        ("name".to_string(), name.to_string()),
        ("format".to_string(), "pbf".to_string()),
        ("bounds".to_string(), "-10,-10,10,10".to_string()),
        (
            "json".to_string(),
            r#"{"vector_layers":[{"id":"roads","fields":{}}]}"#.to_string(),
        ),
    ]
}

/// Every tile of zooms `0..=max_zoom` as `(z, x, tms_row, data)`.
#[allow(dead_code)]
pub fn pyramid(max_zoom: u8) -> Vec<(u8, u32, u32, Vec<u8>)> {
    let mut tiles = Vec::new();
    let mut seed = 0;
    for z in 0..=max_zoom {
        let n = 1u32 << z;
        for x in 0..n {
            for row in 0..n {
                seed += 1;
                tiles.push((z, x, row, png_tile(seed)));
            }
        }
    }
    tiles
}

/// Write an MBTiles file. Tile rows are given in the archive's TMS order.
#[allow(dead_code)]
pub async fn write_mbtiles(
    path: &Path,
    metadata: &[(String, String)],
    tiles: &[(u8, u32, u32, Vec<u8>)],
) {
    let opts = SqliteConnectOptions::new()
        .filename(path)
        .create_if_missing(true);
    let pool = SqlitePoolOptions::new()
        .max_connections(1)
        .connect_with(opts)
        .await
        .unwrap();

    sqlx::query(
        r#"
        CREATE TABLE metadata (name TEXT, value TEXT);
        CREATE TABLE tiles (zoom_level INTEGER, tile_column INTEGER, tile_row INTEGER, tile_data BLOB);
        "#,
    )
    .execute(&pool)
    .await
    .unwrap();

    for (name, value) in metadata {
        sqlx::query("INSERT INTO metadata (name, value) VALUES (?, ?)")
            .bind(name)
            .bind(value)
            .execute(&pool)
            .await
            .unwrap();
    }
    for (z, x, row, data) in tiles {
        sqlx::query(
            "INSERT INTO tiles (zoom_level, tile_column, tile_row, tile_data) VALUES (?, ?, ?, ?)",
        )
        .bind(i64::from(*z))
        .bind(i64::from(*x))
        .bind(i64::from(*row))
        .bind(data.as_slice())
        .execute(&pool)
        .await
        .unwrap();
    }
    pool.close().await;
}
