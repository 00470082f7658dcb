//! Shared helpers for archive tests.

use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use std::path::Path;

/// Write an MBTiles file with the given metadata rows and `(z, x, tms_row, data)` tiles.
pub async fn write_mbtiles(path: &Path, metadata: &[(&str, &str)], tiles: &[(u8, u32, u32, Vec<u8>)]) {
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
        CREATE UNIQUE INDEX tile_index ON tiles (zoom_level, tile_column, tile_row);
        "#,
    )
    .execute(&pool)
    .await
    .unwrap();

    for (name, value) in metadata {
        sqlx::query("INSERT INTO metadata (name, value) VALUES (?, ?)")
            .bind(*name)
            .bind(*value)
            .execute(&pool)
            .await
            .unwrap();
    }
    for (z, x, row, data) in tiles {
        sqlx::query("INSERT INTO tiles (zoom_level, tile_column, tile_row, tile_data) VALUES (?, ?, ?, ?)")
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

/// Metadata for a small raster archive.
pub fn raster_metadata() -> Vec<(&'static str, &'static str)> {
    vec![
        ("name", "Test Raster"),
        ("format", "png"),
        ("bounds", "-180,-85.0511,180,85.0511"),
    ]
}

/// Every tile of zooms `0..=max_zoom`, each payload unique.
pub fn full_pyramid(max_zoom: u8) -> Vec<(u8, u32, u32, Vec<u8>)> {
    let mut tiles = Vec::new();
    for z in 0..=max_zoom {
        let n = 1u32 << z;
        for x in 0..n {
            for row in 0..n {
                tiles.push((z, x, row, format!("tile-{z}-{x}-{row}").into_bytes()));
            }
        }
    }
    tiles
}
