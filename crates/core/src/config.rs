//! Configuration types shared across crates.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// Server configuration.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Bind address (e.g., "0.0.0.0:8080").
    #[serde(default = "default_bind")]
    pub bind: String,
    /// Public base URL written into generated styles and tileset documents.
    /// When unset, the base URL is derived from the request's Host header.
    #[serde(default)]
    pub public_base_url: Option<String>,
    /// Enable the /metrics endpoint for Prometheus scraping (default: true).
    #[serde(default = "default_metrics_enabled")]
    pub metrics_enabled: bool,
}

fn default_bind() -> String {
    "0.0.0.0:8080".to_string()
}

fn default_metrics_enabled() -> bool {
    true
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: default_bind(),
            public_base_url: None,
            metrics_enabled: default_metrics_enabled(),
        }
    }
}

impl ServerConfig {
    pub fn validate(&self) -> Result<(), String> {
        if let Some(url) = &self.public_base_url
            && !(url.starts_with("http://") || url.starts_with("https://"))
        {
            return Err(format!(
                "server.public_base_url must be an http(s) URL, got '{url}'"
            ));
        }
        Ok(())
    }
}

/// Metadata store configuration.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum MetadataConfig {
    /// SQLite database file holding tilesets, tiles, imports and styles.
    Sqlite {
        /// Database file path.
        path: PathBuf,
        /// Longest a query waits for the database connection, in seconds.
        #[serde(default = "default_sqlite_query_timeout_secs")]
        query_timeout_secs: Option<u64>,
    },
}

fn default_sqlite_query_timeout_secs() -> Option<u64> {
    Some(600)
}

impl Default for MetadataConfig {
    fn default() -> Self {
        Self::Sqlite {
            path: PathBuf::from("./data/mapvault.db"),
            query_timeout_secs: default_sqlite_query_timeout_secs(),
        }
    }
}

/// How widely identical tile bytes are shared.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DedupScope {
    /// One copy per tileset; identical bytes in two tilesets are stored twice.
    #[default]
    Tileset,
    /// One copy across the whole store.
    Global,
}

impl DedupScope {
    /// Scope key stored alongside tile data for a tileset.
    pub fn scope_key<'a>(&self, tileset_id: &'a str) -> &'a str {
        match self {
            Self::Tileset => tileset_id,
            Self::Global => "global",
        }
    }
}

/// Tile storage configuration.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct StorageConfig {
    /// Deduplication scope for tile data (default: per tileset).
    #[serde(default)]
    pub dedup_scope: DedupScope,
}

/// Upstream origin configuration.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct UpstreamConfig {
    /// Per-request timeout in seconds.
    #[serde(default = "default_upstream_timeout_secs")]
    pub timeout_secs: u64,
    /// User-Agent header sent to origins.
    #[serde(default = "default_user_agent")]
    pub user_agent: String,
    /// Retries for 5xx responses. Transport failures are never retried.
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    /// Linear backoff step between retries, in milliseconds.
    #[serde(default = "default_retry_backoff_ms")]
    pub retry_backoff_ms: u64,
    /// Refresh cached tiles in the background when they are served.
    #[serde(default = "default_revalidate_on_hit")]
    pub revalidate_on_hit: bool,
}

fn default_upstream_timeout_secs() -> u64 {
    30
}

fn default_user_agent() -> String {
    format!("mapvault/{}", env!("CARGO_PKG_VERSION"))
}

fn default_max_retries() -> u32 {
    2
}

fn default_retry_backoff_ms() -> u64 {
    100
}

fn default_revalidate_on_hit() -> bool {
    true
}

impl Default for UpstreamConfig {
    fn default() -> Self {
        Self {
            timeout_secs: default_upstream_timeout_secs(),
            user_agent: default_user_agent(),
            max_retries: default_max_retries(),
            retry_backoff_ms: default_retry_backoff_ms(),
            revalidate_on_hit: default_revalidate_on_hit(),
        }
    }
}

impl UpstreamConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    pub fn validate(&self) -> Result<(), String> {
        if self.timeout_secs == 0 {
            return Err("upstream.timeout_secs must be greater than 0".to_string());
        }
        Ok(())
    }
}

/// Archive import configuration.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ImportConfig {
    /// Overall time budget for one import job, in seconds. Fractions allowed.
    #[serde(default = "default_import_timeout_secs")]
    pub timeout_secs: f64,
    /// Tiles read per batch; progress is persisted once per batch.
    #[serde(default = "default_import_batch_size")]
    pub batch_size: u32,
    /// Rows removed per pass when reclaiming unreferenced tile data.
    #[serde(default = "default_reclaim_batch_size")]
    pub reclaim_batch_size: u32,
}

fn default_import_timeout_secs() -> f64 {
    3600.0
}

fn default_import_batch_size() -> u32 {
    500
}

fn default_reclaim_batch_size() -> u32 {
    1000
}

impl Default for ImportConfig {
    fn default() -> Self {
        Self {
            timeout_secs: default_import_timeout_secs(),
            batch_size: default_import_batch_size(),
            reclaim_batch_size: default_reclaim_batch_size(),
        }
    }
}

impl ImportConfig {
    pub fn timeout(&self) -> Duration {
        Duration::try_from_secs_f64(self.timeout_secs).unwrap_or(Duration::MAX)
    }

    pub fn validate(&self) -> Result<(), String> {
        match Duration::try_from_secs_f64(self.timeout_secs) {
            Ok(budget) if !budget.is_zero() => {}
            _ => {
                return Err(format!(
                    "import.timeout_secs must be a positive number of seconds, got {}",
                    self.timeout_secs
                ));
            }
        }
        if self.batch_size == 0 {
            return Err("import.batch_size must be greater than 0".to_string());
        }
        if self.reclaim_batch_size == 0 {
            return Err("import.reclaim_batch_size must be greater than 0".to_string());
        }
        Ok(())
    }
}

/// Complete application configuration.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub metadata: MetadataConfig,
    #[serde(default)]
    pub storage: StorageConfig,
    #[serde(default)]
    pub upstream: UpstreamConfig,
    #[serde(default)]
    pub import: ImportConfig,
}

impl AppConfig {
    /// Create a test configuration with sensible defaults.
    ///
    /// **For testing only.** Short upstream timeouts and no retry backoff keep
    /// failing-origin tests fast.
    pub fn for_testing() -> Self {
        Self {
            upstream: UpstreamConfig {
                timeout_secs: 5,
                retry_backoff_ms: 0,
                ..UpstreamConfig::default()
            },
            import: ImportConfig {
                batch_size: 2,
                ..ImportConfig::default()
            },
            ..Self::default()
        }
    }

    /// Validate every section.
    pub fn validate(&self) -> Result<(), String> {
        self.server.validate()?;
        self.upstream.validate()?;
        self.import.validate()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_config_uses_defaults() {
        let config: AppConfig = serde_json::from_str("{}").unwrap();
        assert_eq!(config.server.bind, "0.0.0.0:8080");
        assert!(config.server.metrics_enabled);
        assert_eq!(config.import.batch_size, 500);
        assert_eq!(config.storage.dedup_scope, DedupScope::Tileset);
        assert!(config.upstream.revalidate_on_hit);
        config.validate().unwrap();
    }

    #[test]
    fn test_partial_sections() {
        let json = r#"{"import": {"timeout_secs": 60}, "storage": {"dedup_scope": "global"}}"#;
        let config: AppConfig = serde_json::from_str(json).unwrap();
        assert_eq!(config.import.timeout(), Duration::from_secs(60));
        assert_eq!(config.import.batch_size, 500);
        assert_eq!(config.storage.dedup_scope, DedupScope::Global);
    }

    #[test]
    fn test_metadata_config_tagged() {
        let json = r#"{"type": "sqlite", "path": "/tmp/x.db"}"#;
        let config: MetadataConfig = serde_json::from_str(json).unwrap();
        match config {
            MetadataConfig::Sqlite {
                path,
                query_timeout_secs,
            } => {
                assert_eq!(path, PathBuf::from("/tmp/x.db"));
                assert_eq!(query_timeout_secs, Some(600));
            }
        }
    }

    #[test]
    fn test_import_budget_accepts_fractions() {
        let json = r#"{"import": {"timeout_secs": 0.25}}"#;
        let config: AppConfig = serde_json::from_str(json).unwrap();
        assert_eq!(config.import.timeout(), Duration::from_millis(250));
        config.validate().unwrap();

        for bad in [0.0, -1.0, f64::NAN, f64::INFINITY] {
            let mut config = AppConfig::for_testing();
            config.import.timeout_secs = bad;
            assert!(config.validate().is_err(), "accepted {bad}");
        }
    }

    #[test]
    fn test_validate_rejects_zero_batch() {
        let mut config = AppConfig::for_testing();
        config.import.batch_size = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_rejects_non_http_base_url() {
        let mut config = AppConfig::for_testing();
        config.server.public_base_url = Some("ftp://example.com".to_string());
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_dedup_scope_key() {
        assert_eq!(DedupScope::Tileset.scope_key("abc"), "abc");
        assert_eq!(DedupScope::Global.scope_key("abc"), "global");
    }
}
