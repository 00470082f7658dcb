//! Integration tests for archive imports.

mod common;

use axum::http::StatusCode;
use common::TestServer;
use common::fixtures::{gzipped_vector_tile, pyramid, raster_metadata, vector_metadata, write_mbtiles};
use serde_json::{Value, json};

/// Find the generated style for a tileset and return its document.
async fn style_for(server: &TestServer, tileset_id: &str) -> (Value, Value) {
    let (status, styles) = server.json("GET", "/styles", None).await;
    assert_eq!(status, StatusCode::OK);
    let summary = styles
        .as_array()
        .unwrap()
        .iter()
        .find(|s| s["tileset_id"] == tileset_id)
        .cloned()
        .expect("no generated style for tileset");
    let style_id = summary["id"].as_str().unwrap();
    let (status, style) = server.json("GET", &format!("/styles/{style_id}"), None).await;
    assert_eq!(status, StatusCode::OK);
    (summary, style)
}

#[tokio::test]
async fn raster_import_runs_to_completion() {
    let server = TestServer::new().await;
    let path = server.path("world.mbtiles");
    let tiles = pyramid(2);
    write_mbtiles(&path, &raster_metadata("World"), &tiles).await;

    let submitted = server.import(&path).await;
    assert_eq!(submitted["import"]["state"], "active");
    assert_eq!(submitted["import"]["total_resources"], 21);
    assert_eq!(submitted["tileset"]["name"], "World");
    let tileset_id = submitted["tileset"]["id"].as_str().unwrap().to_string();
    assert_eq!(submitted["import"]["tileset_id"], tileset_id.as_str());

    let import_id = submitted["import"]["id"].as_str().unwrap();
    let record = server.wait_for_import(import_id).await;
    assert_eq!(record["state"], "complete");
    assert!(record["error"].is_null());
    assert_eq!(record["imported_resources"], 21);
    assert_eq!(record["total_resources"], 21);
    assert_eq!(record["imported_bytes"], record["total_bytes"]);
    assert!(record["finished"].is_string());

    assert_eq!(server.metadata().count_tiles(&tileset_id).await.unwrap(), 21);

    // XYZ row 0 at zoom 1 is TMS row 1 in the archive.
    let expected = &tiles
        .iter()
        .find(|(z, x, row, _)| (*z, *x, *row) == (1, 0, 1))
        .unwrap()
        .3;
    let (status, body) = server
        .send("GET", &format!("/tilesets/{tileset_id}/1/0/0"), None)
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(&body, expected);

    let (summary, style) = style_for(&server, &tileset_id).await;
    let stored: usize = tiles.iter().map(|t| t.3.len()).sum();
    assert_eq!(summary["bytes_stored"], stored as u64);
    let sources = style["sources"].as_object().unwrap();
    assert_eq!(sources.len(), 1);
    assert_eq!(sources["raster-source"]["type"], "raster");
    assert_eq!(
        sources["raster-source"]["url"],
        format!("http://localhost/tilesets/{tileset_id}")
    );
    assert_eq!(style["layers"][0]["type"], "raster");
}

#[tokio::test]
async fn reimport_reuses_tileset_with_new_import() {
    let server = TestServer::new().await;
    let path = server.path("world.mbtiles");
    write_mbtiles(&path, &raster_metadata("World"), &pyramid(1)).await;

    let first = server.import(&path).await;
    server
        .wait_for_import(first["import"]["id"].as_str().unwrap())
        .await;
    let second = server.import(&path).await;
    let record = server
        .wait_for_import(second["import"]["id"].as_str().unwrap())
        .await;
    assert_eq!(record["state"], "complete");

    assert_eq!(first["tileset"]["id"], second["tileset"]["id"]);
    assert_ne!(first["import"]["id"], second["import"]["id"]);

    let tileset_id = first["tileset"]["id"].as_str().unwrap();
    assert_eq!(server.metadata().count_tiles(tileset_id).await.unwrap(), 5);

    let (_, styles) = server.json("GET", "/styles", None).await;
    assert_eq!(styles.as_array().unwrap().len(), 1);

    let (_, imports) = server.json("GET", "/imports", None).await;
    assert_eq!(imports.as_array().unwrap().len(), 2);
}

#[tokio::test]
async fn archive_id_row_is_the_identity() {
    let server = TestServer::new().await;
    let mut metadata = raster_metadata("Named");
    metadata.push(("id".to_string(), "natural-earth".to_string()));
    let a = server.path("a.mbtiles");
    let b = server.path("b.mbtiles");
    write_mbtiles(&a, &metadata, &pyramid(0)).await;
    write_mbtiles(&b, &metadata, &pyramid(0)).await;

    let first = server.import(&a).await;
    let second = server.import(&b).await;
    assert_eq!(
        first["tileset"]["id"],
        mapvault_core::tileset_id_for("natural-earth")
    );
    assert_eq!(first["tileset"]["id"], second["tileset"]["id"]);
}

#[tokio::test]
async fn vector_import_generates_line_style() {
    let server = TestServer::new().await;
    let path = server.path("roads.mbtiles");
    let tiles: Vec<_> = (0..4u32)
        .map(|i| (1u8, i / 2, i % 2, gzipped_vector_tile(u64::from(i))))
        .collect();
    write_mbtiles(&path, &vector_metadata("Roads"), &tiles).await;

    let submitted = server.import(&path).await;
    assert_eq!(submitted["tileset"]["format"], "pbf");
    let record = server
        .wait_for_import(submitted["import"]["id"].as_str().unwrap())
        .await;
    assert_eq!(record["state"], "complete");

    let tileset_id = submitted["tileset"]["id"].as_str().unwrap();
    let (_, style) = style_for(&server, tileset_id).await;
    assert_eq!(style["sources"]["vector-source"]["type"], "vector");
    let layer = &style["layers"][0];
    assert_eq!(layer["type"], "line");
    assert_eq!(layer["source-layer"], "roads");

    let response = server
        .request("GET", &format!("/tilesets/{tileset_id}/1/0/0"), None)
        .await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(
        response.headers().get("content-encoding").unwrap(),
        "gzip"
    );
}

#[tokio::test]
async fn invalid_archives_are_rejected_without_records() {
    let server = TestServer::new().await;

    let no_bounds = server.path("no-bounds.mbtiles");
    write_mbtiles(
        &no_bounds,
        &[
            ("name".to_string(), "Broken".to_string()),
            ("format".to_string(), "png".to_string()),
        ],
        &pyramid(0),
    )
    .await;
    let bad_format = server.path("tiff.mbtiles");
    write_mbtiles(
        &bad_format,
        &[
            ("name".to_string(), "Tiff".to_string()),
            ("format".to_string(), "tiff".to_string()),
            ("bounds".to_string(), "-1,-1,1,1".to_string()),
        ],
        &pyramid(0),
    )
    .await;
    let garbage = server.path("garbage.mbtiles");
    std::fs::write(&garbage, b"definitely not sqlite").unwrap();
    let missing = server.path("missing.mbtiles");

    let cases = [
        (no_bounds, "invalid_archive_metadata"),
        (bad_format, "unsupported_format"),
        (garbage, "archive_unreadable"),
        (missing, "import_target_missing"),
    ];
    for (path, code) in cases {
        let (status, body) = server
            .json("POST", "/tilesets/import", Some(json!({ "file_path": path })))
            .await;
        assert_eq!(status, StatusCode::BAD_REQUEST, "{}", path.display());
        assert_eq!(body["code"], code, "{}", path.display());
    }

    let (_, imports) = server.json("GET", "/imports", None).await;
    assert_eq!(imports, json!([]));
    let (_, tilesets) = server.json("GET", "/tilesets", None).await;
    assert_eq!(tilesets, json!([]));
}

#[tokio::test]
async fn camel_case_file_path_is_accepted() {
    let server = TestServer::new().await;
    let path = server.path("alias.mbtiles");
    write_mbtiles(&path, &raster_metadata("Alias"), &pyramid(0)).await;

    let (status, body) = server
        .json("POST", "/tilesets/import", Some(json!({ "filePath": path })))
        .await;
    assert_eq!(status, StatusCode::ACCEPTED, "{body}");
}

#[tokio::test]
async fn progress_stream_ends_with_terminal_snapshot() {
    let server = TestServer::new().await;
    let path = server.path("world.mbtiles");
    write_mbtiles(&path, &raster_metadata("World"), &pyramid(2)).await;

    let submitted = server.import(&path).await;
    let import_id = submitted["import"]["id"].as_str().unwrap();

    // The stream closes on its own once the job finishes.
    let (status, body) = server
        .send("GET", &format!("/imports/progress/{import_id}"), None)
        .await;
    assert_eq!(status, StatusCode::OK);

    let text = String::from_utf8(body).unwrap();
    let snapshots: Vec<Value> = text
        .lines()
        .filter_map(|line| line.strip_prefix("data:"))
        .map(|data| serde_json::from_str(data.trim()).unwrap())
        .collect();
    assert!(text.contains("event: progress"));
    let last = snapshots.last().expect("no progress events");
    assert_eq!(last["state"], "complete");
    assert_eq!(last["imported_resources"], 21);
    assert!(snapshots.iter().all(|s| s["id"] == import_id));

    // A late subscriber gets the terminal snapshot once.
    let (_, body) = server
        .send("GET", &format!("/imports/progress/{import_id}"), None)
        .await;
    let text = String::from_utf8(body).unwrap();
    assert_eq!(text.matches("event: progress").count(), 1);
    assert!(text.contains("\"state\":\"complete\""));
}

#[tokio::test]
async fn unknown_imports_are_not_found() {
    let server = TestServer::new().await;
    let id = uuid::Uuid::new_v4();

    let (status, body) = server.json("GET", &format!("/imports/{id}"), None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["code"], "not_found");

    let (status, _) = server
        .json("GET", &format!("/imports/progress/{id}"), None)
        .await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (status, body) = server.json("GET", "/imports/not-a-uuid", None).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["code"], "bad_request");
}

/// True when a generated style exists for the tileset.
async fn has_style(server: &TestServer, tileset_id: &str) -> bool {
    let (_, styles) = server.json("GET", "/styles", None).await;
    styles
        .as_array()
        .unwrap()
        .iter()
        .any(|s| s["tileset_id"] == tileset_id)
}

#[tokio::test]
async fn unreadable_row_fails_import_and_keeps_earlier_batches() {
    let server = TestServer::with_config(|c| c.import.batch_size = 5).await;
    let path = server.path("damaged.mbtiles");
    let mut tiles = pyramid(2);
    // Row 99 does not exist at zoom 3; it sorts after every other row.
    tiles.push((3, 0, 99, gzipped_vector_tile(99)));
    write_mbtiles(&path, &raster_metadata("Damaged"), &tiles).await;

    let submitted = server.import(&path).await;
    let tileset_id = submitted["tileset"]["id"].as_str().unwrap().to_string();
    let import_id = submitted["import"]["id"].as_str().unwrap();

    let record = server.wait_for_import(import_id).await;
    assert_eq!(record["state"], "error");
    assert_eq!(record["error"], "unknown");
    assert!(record["finished"].is_string());
    assert_eq!(record["total_resources"], 22);
    // Four full batches made it in before the fifth failed to decode.
    assert_eq!(record["imported_resources"], 20);
    assert_eq!(server.metadata().count_tiles(&tileset_id).await.unwrap(), 20);

    let (status, _) = server.send("GET", &format!("/tilesets/{tileset_id}/0/0/0"), None).await;
    assert_eq!(status, StatusCode::OK);
    assert!(!has_style(&server, &tileset_id).await);
}

#[tokio::test]
async fn import_over_budget_ends_in_timeout() {
    let server = TestServer::with_config(|c| {
        c.import.timeout_secs = 0.001;
        c.import.batch_size = 1;
    })
    .await;
    let path = server.path("large.mbtiles");
    let tiles = pyramid(4);
    write_mbtiles(&path, &raster_metadata("Large"), &tiles).await;

    let submitted = server.import(&path).await;
    let tileset_id = submitted["tileset"]["id"].as_str().unwrap().to_string();
    let import_id = submitted["import"]["id"].as_str().unwrap();

    let record = server.wait_for_import(import_id).await;
    assert_eq!(record["state"], "error");
    assert_eq!(record["error"], "timeout");
    assert!(record["finished"].is_string());
    let imported = record["imported_resources"].as_u64().unwrap();
    assert!(imported < tiles.len() as u64, "import finished inside 1ms");
    // Whatever was written before the deadline stays.
    assert!(server.metadata().count_tiles(&tileset_id).await.unwrap() >= imported);
    assert!(!has_style(&server, &tileset_id).await);
}

#[tokio::test]
async fn failed_write_mid_batch_still_counts_committed_tiles() {
    let server = TestServer::with_config(|c| c.import.batch_size = 10).await;
    let path = server.path("world.mbtiles");
    let tiles = pyramid(1);
    write_mbtiles(&path, &raster_metadata("World"), &tiles).await;

    // Archive order is "", "2", "0", "3", "1"; the fourth write fails.
    server
        .execute_sql(
            "CREATE TRIGGER reject_quadkey_3 BEFORE INSERT ON tiles \
             WHEN NEW.quad_key = '3' \
             BEGIN SELECT RAISE(ABORT, 'disk full'); END",
        )
        .await;

    let submitted = server.import(&path).await;
    let tileset_id = submitted["tileset"]["id"].as_str().unwrap().to_string();
    let import_id = submitted["import"]["id"].as_str().unwrap();

    let record = server.wait_for_import(import_id).await;
    assert_eq!(record["state"], "error");
    assert_eq!(record["error"], "unknown");
    assert_eq!(record["imported_resources"], 3);
    let written: usize = tiles.iter().take(3).map(|t| t.3.len()).sum();
    assert_eq!(record["imported_bytes"], written as u64);
    assert_eq!(server.metadata().count_tiles(&tileset_id).await.unwrap(), 3);
}
