//! Server test utilities.

use axum::body::Body;
use axum::http::{Request, StatusCode};
use mapvault_core::config::{AppConfig, MetadataConfig};
use mapvault_metadata::{MetadataStore, SqliteStore};
use mapvault_server::{AppState, create_router};
use serde_json::Value;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tempfile::TempDir;
use tower::ServiceExt;

/// A test server wrapper with all dependencies.
/// Note: #[allow(dead_code)] because each test file compiles common/ separately.
#[allow(dead_code)]
pub struct TestServer {
    pub router: axum::Router,
    pub state: AppState,
    temp_dir: TempDir,
}

#[allow(dead_code)]
impl TestServer {
    /// Create a new test server backed by a temporary database.
    pub async fn new() -> Self {
        Self::with_config(|_| {}).await
    }

    /// Create a test server with custom config modifications.
    pub async fn with_config<F>(modifier: F) -> Self
    where
        F: FnOnce(&mut AppConfig),
    {
        let temp_dir = tempfile::tempdir().expect("Failed to create temp directory");

        let db_path = temp_dir.path().join("metadata.db");
        let metadata: Arc<dyn MetadataStore> = Arc::new(
            SqliteStore::new(&db_path, None)
                .await
                .expect("Failed to create metadata store"),
        );

        let mut config = AppConfig::for_testing();
        config.metadata = MetadataConfig::Sqlite {
            path: db_path,
            query_timeout_secs: None,
        };
        modifier(&mut config);

        let state = AppState::new(config, metadata).expect("Failed to build app state");
        let router = create_router(state.clone());

        Self {
            router,
            state,
            temp_dir,
        }
    }

    /// Get access to the underlying metadata.
    pub fn metadata(&self) -> Arc<dyn MetadataStore> {
        self.state.metadata.clone()
    }

    /// A path inside the server's temporary directory.
    pub fn path(&self, name: &str) -> PathBuf {
        self.temp_dir.path().join(name)
    }

    /// Run raw SQL against the server's database from a separate connection.
    pub async fn execute_sql(&self, sql: &str) {
        let opts = SqliteConnectOptions::new()
            .filename(self.path("metadata.db"))
            .busy_timeout(std::time::Duration::from_secs(5));
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect_with(opts)
            .await
            .expect("Failed to open test database");
        sqlx::query(sql)
            .execute(&pool)
            .await
            .expect("Failed to execute test SQL");
        pool.close().await;
    }

    /// Send a request with an optional JSON body and decode the JSON reply.
    pub async fn json(&self, method: &str, uri: &str, body: Option<Value>) -> (StatusCode, Value) {
        let (status, bytes) = self.send(method, uri, body).await;
        let json = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap_or(Value::Null)
        };
        (status, json)
    }

    /// Send a request and return the raw reply.
    pub async fn send(&self, method: &str, uri: &str, body: Option<Value>) -> (StatusCode, Vec<u8>) {
        let response = self.request(method, uri, body).await;
        let status = response.status();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        (status, bytes.to_vec())
    }

    /// Send a request and return the full response.
    pub async fn request(
        &self,
        method: &str,
        uri: &str,
        body: Option<Value>,
    ) -> axum::response::Response {
        let mut builder = Request::builder().method(method).uri(uri);
        let body = match body {
            Some(v) => {
                builder = builder.header("Content-Type", "application/json");
                Body::from(serde_json::to_vec(&v).unwrap())
            }
            None => Body::empty(),
        };
        self.router
            .clone()
            .oneshot(builder.body(body).unwrap())
            .await
            .unwrap()
    }

    /// Submit an archive for import, returning the 202 body.
    pub async fn import(&self, path: &Path) -> Value {
        let (status, body) = self
            .json(
                "POST",
                "/tilesets/import",
                Some(serde_json::json!({ "file_path": path })),
            )
            .await;
        assert_eq!(status, StatusCode::ACCEPTED, "import rejected: {body}");
        body
    }

    /// Poll an import until it leaves `active`.
    pub async fn wait_for_import(&self, import_id: &str) -> Value {
        let deadline = tokio::time::Instant::now() + std::time::Duration::from_secs(10);
        loop {
            let (status, body) = self.json("GET", &format!("/imports/{import_id}"), None).await;
            assert_eq!(status, StatusCode::OK);
            if body["state"] != "active" {
                return body;
            }
            if tokio::time::Instant::now() > deadline {
                panic!("import {import_id} did not finish in time: {body}");
            }
            tokio::time::sleep(std::time::Duration::from_millis(20)).await;
        }
    }
}
