// MBTiles reader tests against small on-disk fixtures

mod common;

use common::{full_pyramid, raster_metadata, write_mbtiles};
use mapvault_archive::{ArchiveError, TileArchive, open};
use std::collections::HashSet;
use tempfile::TempDir;

#[tokio::test]
async fn test_batches_cover_every_tile_once() {
    let temp = TempDir::new().unwrap();
    let path = temp.path().join("pyramid.mbtiles");
    let tiles = full_pyramid(2);
    write_mbtiles(&path, &raster_metadata(), &tiles).await;

    let archive = open(&path).await.unwrap();
    let totals = archive.totals().await.unwrap();
    assert_eq!(totals.tiles, 21);
    let expected_bytes: u64 = tiles.iter().map(|t| t.3.len() as u64).sum();
    assert_eq!(totals.bytes, expected_bytes);

    let mut seen = HashSet::new();
    let mut cursor = None;
    let mut batches = 0;
    loop {
        let batch = archive.read_batch(cursor, 4).await.unwrap();
        batches += 1;
        for tile in &batch.tiles {
            assert!(seen.insert(tile.coord), "duplicate {}", tile.coord);
        }
        match batch.next {
            Some(next) => cursor = Some(next),
            None => break,
        }
    }
    assert_eq!(seen.len(), 21);
    assert!(batches >= 6);
    archive.close().await;
}

#[tokio::test]
async fn test_rows_are_flipped_to_xyz() {
    let temp = TempDir::new().unwrap();
    let path = temp.path().join("one.mbtiles");
    // TMS row 0 at zoom 1 is the bottom row, XYZ y = 1.
    write_mbtiles(&path, &raster_metadata(), &[(1, 0, 0, b"bottom-left".to_vec())]).await;

    let archive = open(&path).await.unwrap();
    let batch = archive.read_batch(None, 10).await.unwrap();
    assert_eq!(batch.tiles.len(), 1);
    let tile = &batch.tiles[0];
    assert_eq!((tile.coord.zoom, tile.coord.x, tile.coord.y), (1, 0, 1));
    assert_eq!(tile.data, b"bottom-left");
    assert!(batch.next.is_none());
}

#[tokio::test]
async fn test_identity_defaults_to_canonical_path() {
    let temp = TempDir::new().unwrap();
    let path = temp.path().join("plain.mbtiles");
    write_mbtiles(&path, &raster_metadata(), &[]).await;

    let archive = open(&path).await.unwrap();
    let canonical = path.canonicalize().unwrap();
    assert_eq!(
        archive.metadata().identity,
        format!("mbtiles://{}", canonical.display())
    );
    assert_eq!(archive.totals().await.unwrap().tiles, 0);
}

#[tokio::test]
async fn test_zoom_range_falls_back_to_tiles() {
    let temp = TempDir::new().unwrap();
    let path = temp.path().join("zooms.mbtiles");
    write_mbtiles(&path, &raster_metadata(), &full_pyramid(3)).await;

    let archive = open(&path).await.unwrap();
    let tilejson = &archive.metadata().tilejson;
    assert_eq!(tilejson.minzoom, Some(0));
    assert_eq!(tilejson.maxzoom, Some(3));
}

#[tokio::test]
async fn test_missing_tiles_table_is_unreadable() {
    let temp = TempDir::new().unwrap();
    let path = temp.path().join("notiles.mbtiles");
    write_mbtiles(&path, &raster_metadata(), &[]).await;

    let pool = sqlx::SqlitePool::connect(&format!("sqlite:{}", path.display()))
        .await
        .unwrap();
    sqlx::query("DROP TABLE tiles").execute(&pool).await.unwrap();
    pool.close().await;

    let err = open(&path).await.err().unwrap();
    assert!(matches!(err, ArchiveError::Unreadable(_)), "{err:?}");
}

#[tokio::test]
async fn test_missing_name_is_invalid_metadata() {
    let temp = TempDir::new().unwrap();
    let path = temp.path().join("noname.mbtiles");
    write_mbtiles(&path, &[("format", "png"), ("bounds", "0,0,1,1")], &[]).await;

    let err = open(&path).await.err().unwrap();
    assert!(matches!(err, ArchiveError::InvalidMetadata(_)), "{err:?}");
}
