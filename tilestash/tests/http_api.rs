//! HTTP API tests against the full router, without a listening socket.

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use axum::body::Body;
use axum::http::{header, Method, Request, StatusCode};
use axum::Router;
use http_body_util::BodyExt;
use serde_json::{json, Value};
use tempfile::TempDir;
use tilestash::archive::{ArchiveCatalog, MbTilesWriter, TileRow};
use tilestash::convert::{ConverterRegistry, MbTilesConverter};
use tilestash::coord::TileCoord;
use tilestash::http::{router, AppState};
use tilestash::import::{ImportConfig, ImportOrchestrator};
use tilestash::normalize::Normalizer;
use tilestash::sniff::Protocol;
use tilestash::store::{MemoryRecordStore, RecordStore};
use tower::ServiceExt;

const BOUNDARY: &str = "tilestash-test-boundary";
const TILE_BYTES: &[u8] = b"\x89PNG\r\n\x1a\ntile";

struct TestApp {
    temp: TempDir,
    router: Router,
}

impl TestApp {
    fn new() -> Self {
        let temp = TempDir::new().unwrap();
        let root = temp.path();

        let converters = ConverterRegistry::new()
            .with(Protocol::MbTiles, Arc::new(MbTilesConverter::new()));
        let orchestrator = ImportOrchestrator::builder(
            Arc::new(MemoryRecordStore::new()) as Arc<dyn RecordStore>,
            ArchiveCatalog::new(root.join("tilesets")),
        )
        .normalizer(Normalizer::new(root.join("staging")))
        .converters(converters)
        .config(ImportConfig {
            retries: 0,
            timeout: Duration::from_secs(10),
            progress_interval: Duration::from_millis(10),
        })
        .build();
        let state = AppState::new(orchestrator, root.join("uploads"));

        Self {
            router: router(state, 1024 * 1024),
            temp,
        }
    }

    async fn send(&self, request: Request<Body>) -> (StatusCode, Vec<u8>) {
        let response = self.router.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let body = response.into_body().collect().await.unwrap().to_bytes();
        (status, body.to_vec())
    }

    async fn send_json(&self, request: Request<Body>) -> (StatusCode, Value) {
        let (status, body) = self.send(request).await;
        let value = if body.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&body).unwrap()
        };
        (status, value)
    }

    async fn get_json(&self, uri: &str) -> (StatusCode, Value) {
        self.send_json(
            Request::get(uri)
                .header(header::HOST, "tiles.test:3000")
                .body(Body::empty())
                .unwrap(),
        )
        .await
    }

    async fn upload(&self, uri: &str, filename: &str, bytes: &[u8]) -> (StatusCode, Value) {
        self.send_json(multipart_request(uri, filename, bytes)).await
    }

    /// Polls a tileset until its import has finished.
    async fn wait_complete(&self, uri: &str) -> Value {
        for _ in 0..200 {
            let (status, body) = self.get_json(uri).await;
            assert_eq!(status, StatusCode::OK, "{}", body);
            if body["complete"] == true {
                return body;
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
        panic!("import of {} did not finish", uri);
    }

    fn mbtiles_bytes(&self, name: &str) -> Vec<u8> {
        let path = self.temp.path().join(format!("{}.mbtiles", name));
        write_archive(&path, name);
        std::fs::read(path).unwrap()
    }
}

fn write_archive(path: &Path, name: &str) {
    let mut writer = MbTilesWriter::create(path).unwrap();
    writer.put_metadata("name", name).unwrap();
    writer.put_metadata("format", "png").unwrap();
    writer.put_metadata("maxzoom", "2").unwrap();
    let rows = [
        TileRow::from_xyz(TileCoord::new(0, 0, 0), TILE_BYTES.to_vec()).unwrap(),
        TileRow::from_xyz(TileCoord::new(2, 1, 0), TILE_BYTES.to_vec()).unwrap(),
        TileRow::from_xyz(TileCoord::new(2, 1, 1), TILE_BYTES.to_vec()).unwrap(),
    ];
    writer.put_tiles(&rows).unwrap();
    writer.finish().unwrap();
}

fn multipart_request(uri: &str, filename: &str, bytes: &[u8]) -> Request<Body> {
    let mut body = Vec::new();
    body.extend_from_slice(format!("--{}\r\n", BOUNDARY).as_bytes());
    body.extend_from_slice(
        format!(
            "Content-Disposition: form-data; name=\"file\"; filename=\"{}\"\r\n",
            filename
        )
        .as_bytes(),
    );
    body.extend_from_slice(b"Content-Type: application/octet-stream\r\n\r\n");
    body.extend_from_slice(bytes);
    body.extend_from_slice(format!("\r\n--{}--\r\n", BOUNDARY).as_bytes());

    Request::post(uri)
        .header(
            header::CONTENT_TYPE,
            format!("multipart/form-data; boundary={}", BOUNDARY),
        )
        .body(Body::from(body))
        .unwrap()
}

#[tokio::test]
async fn test_upload_then_serve_tiles() {
    let app = TestApp::new();
    let bytes = app.mbtiles_bytes("Roads");

    let (status, accepted) = app.upload("/acme/tilesets", "roads.mbtiles", &bytes).await;
    assert_eq!(status, StatusCode::OK, "{}", accepted);
    assert_eq!(accepted["owner"], "acme");
    assert_eq!(accepted["complete"], false);
    assert_eq!(accepted["name"], "Roads");
    let id = accepted["tilesetId"].as_str().unwrap().to_string();

    let tileset_uri = format!("/acme/tilesets/{}", id);
    let done = app.wait_complete(&tileset_uri).await;
    assert_eq!(done["progress"], 100);
    assert!(done.get("error").is_none());
    assert_eq!(done["scheme"], "xyz");
    assert_eq!(done["maxzoom"], 2);
    assert_eq!(
        done["tiles"][0],
        format!("http://tiles.test:3000{}/{{z}}/{{x}}/{{y}}.png", tileset_uri)
    );

    let (status, tile) = app
        .send(
            Request::get(format!("{}/2/1/1.png", tileset_uri))
                .body(Body::empty())
                .unwrap(),
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(tile, TILE_BYTES);

    let response = app
        .router
        .clone()
        .oneshot(
            Request::get(format!("{}/2/1/0", tileset_uri))
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.headers()[header::CONTENT_TYPE], "image/png");
    assert!(response.headers().contains_key(header::ETAG));

    let (status, _) = app
        .send(
            Request::get(format!("{}/2/3/3.png", tileset_uri))
                .body(Body::empty())
                .unwrap(),
        )
        .await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (status, listed) = app.get_json("/acme/tilesets").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(listed.as_array().unwrap().len(), 1);
}

#[tokio::test]
async fn test_tile_segments_outside_grid_are_not_found() {
    let app = TestApp::new();
    let bytes = app.mbtiles_bytes("Roads");
    let (_, accepted) = app.upload("/acme/tilesets", "roads.mbtiles", &bytes).await;
    let uri = format!("/acme/tilesets/{}", accepted["tilesetId"].as_str().unwrap());
    app.wait_complete(&uri).await;

    for (tile, expected) in [
        ("0/0/0.png", StatusCode::OK),
        ("zoom/x/y.png", StatusCode::OK),
        ("-1/0/0.png", StatusCode::NOT_FOUND),
        ("0/-1/0.png", StatusCode::NOT_FOUND),
        ("0/0/-1.png", StatusCode::NOT_FOUND),
    ] {
        let request = Request::get(format!("{}/{}", uri, tile))
            .body(Body::empty())
            .unwrap();
        let (status, _) = app.send(request).await;
        assert_eq!(status, expected, "{}", tile);
    }
}

#[tokio::test]
async fn test_reimport_into_existing_tileset() {
    let app = TestApp::new();
    let first = app.mbtiles_bytes("First");
    let (_, accepted) = app.upload("/acme/tilesets", "first.mbtiles", &first).await;
    let uri = format!("/acme/tilesets/{}", accepted["tilesetId"].as_str().unwrap());
    app.wait_complete(&uri).await;

    let second = app.mbtiles_bytes("Second");
    let (status, replaced) = app.upload(&uri, "second.mbtiles", &second).await;
    assert_eq!(status, StatusCode::OK, "{}", replaced);
    assert_eq!(replaced["attempt"], 2);
    assert_eq!(replaced["name"], "First", "existing name is kept");

    let done = app.wait_complete(&uri).await;
    assert_eq!(done["attempt"], 2);
    assert!(done.get("error").is_none());
}

#[tokio::test]
async fn test_reimport_into_missing_tileset_is_not_found() {
    let app = TestApp::new();
    let bytes = app.mbtiles_bytes("Roads");

    let (status, body) = app.upload("/acme/tilesets/nope", "roads.mbtiles", &bytes).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert!(body["message"].as_str().unwrap().contains("not found"));
}

#[tokio::test]
async fn test_unknown_tileset_and_tile_are_not_found() {
    let app = TestApp::new();

    let (status, body) = app.get_json("/acme/tilesets/missing").await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert!(body["message"].is_string());

    let (status, _) = app
        .send(
            Request::get("/acme/tilesets/missing/0/0/0.png")
                .body(Body::empty())
                .unwrap(),
        )
        .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_unsupported_upload_is_rejected() {
    let app = TestApp::new();

    let (status, body) = app
        .upload("/acme/tilesets", "dump.gz", &[0x1f, 0x8b, 0x08, 0x00, 0x00, 0x00])
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["message"].as_str().unwrap().contains("serialtiles"));

    let (_, listed) = app.get_json("/acme/tilesets").await;
    assert_eq!(listed, json!([]));
}

#[tokio::test]
async fn test_upload_without_file_is_rejected() {
    let app = TestApp::new();
    let body = format!(
        "--{b}\r\nContent-Disposition: form-data; name=\"note\"\r\n\r\nhello\r\n--{b}--\r\n",
        b = BOUNDARY
    );
    let request = Request::post("/acme/tilesets")
        .header(
            header::CONTENT_TYPE,
            format!("multipart/form-data; boundary={}", BOUNDARY),
        )
        .body(Body::from(body))
        .unwrap();

    let (status, body) = app.send_json(request).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["message"], "request contains no file");
}

#[tokio::test]
async fn test_patch_updates_name_and_description() {
    let app = TestApp::new();
    let bytes = app.mbtiles_bytes("Roads");
    let (_, accepted) = app.upload("/acme/tilesets", "roads.mbtiles", &bytes).await;
    let uri = format!("/acme/tilesets/{}", accepted["tilesetId"].as_str().unwrap());
    app.wait_complete(&uri).await;

    let request = Request::builder()
        .method(Method::PATCH)
        .uri(&uri)
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(
            json!({ "name": "Main roads", "description": "Primary network", "progress": 5 })
                .to_string(),
        ))
        .unwrap();
    let (status, patched) = app.send_json(request).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(patched["name"], "Main roads");
    assert_eq!(patched["description"], "Primary network");
    assert_eq!(patched["progress"], 100, "import fields are not client-writable");

    let (_, fetched) = app.get_json(&uri).await;
    assert_eq!(fetched["name"], "Main roads");
}

#[tokio::test]
async fn test_delete_removes_record_and_tiles() {
    let app = TestApp::new();
    let bytes = app.mbtiles_bytes("Roads");
    let (_, accepted) = app.upload("/acme/tilesets", "roads.mbtiles", &bytes).await;
    let uri = format!("/acme/tilesets/{}", accepted["tilesetId"].as_str().unwrap());
    app.wait_complete(&uri).await;

    let (status, _) = app
        .send(
            Request::builder()
                .method(Method::DELETE)
                .uri(&uri)
                .body(Body::empty())
                .unwrap(),
        )
        .await;
    assert_eq!(status, StatusCode::NO_CONTENT);

    let (status, _) = app.get_json(&uri).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    let (status, _) = app
        .send(
            Request::get(format!("{}/2/1/1.png", uri))
                .body(Body::empty())
                .unwrap(),
        )
        .await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (status, _) = app
        .send(
            Request::builder()
                .method(Method::DELETE)
                .uri(&uri)
                .body(Body::empty())
                .unwrap(),
        )
        .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_health_reports_import_counts() {
    let app = TestApp::new();
    let bytes = app.mbtiles_bytes("Roads");
    let (_, accepted) = app.upload("/acme/tilesets", "roads.mbtiles", &bytes).await;
    let uri = format!("/acme/tilesets/{}", accepted["tilesetId"].as_str().unwrap());
    app.wait_complete(&uri).await;

    // The terminal write lands before the registry entry is retired.
    let mut health = Value::Null;
    for _ in 0..50 {
        let (status, body) = app.get_json("/health").await;
        assert_eq!(status, StatusCode::OK);
        health = body;
        if health["imports"]["completed_imports"] == 1 {
            break;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    assert_eq!(health["status"], "ok");
    assert_eq!(health["imports"]["completed_imports"], 1);
    assert_eq!(health["imports"]["active_imports"], 0);
}
