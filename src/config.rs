//! Configuration types for batchzip

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::{Error, Result};

/// HTTP server bind configuration
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct HttpServerConfig {
    /// Address to bind (default: "0.0.0.0")
    #[serde(default = "default_addr")]
    pub addr: String,

    /// Port to bind (default: 8080)
    #[serde(default = "default_port")]
    pub port: u16,
}

impl HttpServerConfig {
    /// The `addr:port` string the listener binds to
    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.addr, self.port)
    }
}

impl Default for HttpServerConfig {
    fn default() -> Self {
        Self {
            addr: default_addr(),
            port: default_port(),
        }
    }
}

/// Download worker pool configuration
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct WorkerPoolConfig {
    /// Number of concurrent download workers (default: 3)
    ///
    /// This is also the cap on concurrent outbound HTTP requests: each
    /// worker holds at most one fetch in flight.
    #[serde(default = "default_num_workers")]
    pub num_workers: usize,

    /// MIME types accepted into archives (default: common image types)
    ///
    /// Compared against the media type parsed from the response
    /// Content-Type header, case-insensitively.
    #[serde(default = "default_allowed_types")]
    pub allowed_types: Vec<String>,

    /// Maximum accepted Content-Length in bytes (default: 10 MiB)
    ///
    /// Enforced from the HEAD response before any body transfer starts.
    #[serde(default = "default_max_file_size")]
    pub max_file_size: u64,

    /// Per-request HTTP timeout, in seconds (default: 30)
    ///
    /// Shared by the HEAD and GET of every fetch; there is no per-URL retry.
    #[serde(default = "default_timeout", with = "duration_serde")]
    pub timeout: Duration,
}

impl Default for WorkerPoolConfig {
    fn default() -> Self {
        Self {
            num_workers: default_num_workers(),
            allowed_types: default_allowed_types(),
            max_file_size: default_max_file_size(),
            timeout: default_timeout(),
        }
    }
}

/// Archive builder configuration
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ZipperConfig {
    /// Directory finalized archives are written to (default: "./archives")
    ///
    /// Created on startup (mode 0775) if missing.
    #[serde(default = "default_archive_path")]
    pub archive_path: PathBuf,

    /// Maximum number of links accepted per submission (default: 0 = unlimited)
    ///
    /// The number of downloads a task waits for is always derived from the
    /// accepted link list; this knob only bounds how long that list may be.
    #[serde(default)]
    pub max_files: usize,
}

impl Default for ZipperConfig {
    fn default() -> Self {
        Self {
            archive_path: default_archive_path(),
            max_files: 0,
        }
    }
}

/// Logging configuration
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct LoggerConfig {
    /// Project name attached to log output (default: "batchzip")
    #[serde(default = "default_project")]
    pub project: String,

    /// Default log level directive, overridable via RUST_LOG (default: "info")
    #[serde(default = "default_level")]
    pub level: String,

    /// Output format: "text" or "json" (default: "text")
    #[serde(default = "default_format")]
    pub format: String,
}

impl Default for LoggerConfig {
    fn default() -> Self {
        Self {
            project: default_project(),
            level: default_level(),
            format: default_format(),
        }
    }
}

/// Main configuration for the batchzip service
///
/// Loaded from a YAML file; every section and field has a default, so an
/// empty document is a valid configuration.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct Config {
    /// HTTP server settings
    #[serde(default)]
    pub http_server: HttpServerConfig,

    /// Download worker pool settings
    #[serde(default)]
    pub worker_pool: WorkerPoolConfig,

    /// Archive builder settings
    #[serde(default)]
    pub zipper: ZipperConfig,

    /// Logging settings
    #[serde(default)]
    pub logger: LoggerConfig,
}

impl Config {
    /// Load and validate a configuration from a YAML file
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path)?;
        let config: Config = serde_yaml::from_str(&raw).map_err(|e| Error::Config {
            message: format!("failed to parse {}: {}", path.display(), e),
            key: None,
        })?;
        config.validate()?;
        Ok(config)
    }

    /// Check invariants that serde defaults alone cannot express
    pub fn validate(&self) -> Result<()> {
        if self.worker_pool.num_workers == 0 {
            return Err(Error::Config {
                message: "num_workers must be at least 1".to_string(),
                key: Some("worker_pool.num_workers".to_string()),
            });
        }
        if self.worker_pool.max_file_size == 0 {
            return Err(Error::Config {
                message: "max_file_size must be greater than 0".to_string(),
                key: Some("worker_pool.max_file_size".to_string()),
            });
        }
        if self.worker_pool.timeout.is_zero() {
            return Err(Error::Config {
                message: "timeout must be greater than 0".to_string(),
                key: Some("worker_pool.timeout".to_string()),
            });
        }
        if self.worker_pool.allowed_types.is_empty() {
            return Err(Error::Config {
                message: "allowed_types must not be empty".to_string(),
                key: Some("worker_pool.allowed_types".to_string()),
            });
        }
        if self.zipper.archive_path.as_os_str().is_empty() {
            return Err(Error::Config {
                message: "archive_path must not be empty".to_string(),
                key: Some("zipper.archive_path".to_string()),
            });
        }
        Ok(())
    }
}

fn default_addr() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    8080
}

fn default_num_workers() -> usize {
    3
}

fn default_allowed_types() -> Vec<String> {
    vec![
        "image/png".to_string(),
        "image/jpeg".to_string(),
        "image/gif".to_string(),
        "application/pdf".to_string(),
    ]
}

fn default_max_file_size() -> u64 {
    10 * 1024 * 1024
}

fn default_timeout() -> Duration {
    Duration::from_secs(30)
}

fn default_archive_path() -> PathBuf {
    PathBuf::from("./archives")
}

fn default_project() -> String {
    "batchzip".to_string()
}

fn default_level() -> String {
    "info".to_string()
}

fn default_format() -> String {
    "text".to_string()
}

/// Serde support for Duration as seconds
mod duration_serde {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_u64(duration.as_secs())
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let secs = u64::deserialize(deserializer)?;
        Ok(Duration::from_secs(secs))
    }
}

// unwrap/expect are acceptable in tests for concise failure-on-error assertions
#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_document_yields_defaults() {
        let config: Config = serde_yaml::from_str("{}").unwrap();
        assert_eq!(config.http_server.bind_address(), "0.0.0.0:8080");
        assert_eq!(config.worker_pool.num_workers, 3);
        assert_eq!(config.worker_pool.max_file_size, 10 * 1024 * 1024);
        assert_eq!(config.worker_pool.timeout, Duration::from_secs(30));
        assert_eq!(config.zipper.archive_path, PathBuf::from("./archives"));
        assert_eq!(config.zipper.max_files, 0);
        assert_eq!(config.logger.level, "info");
        config.validate().unwrap();
    }

    #[test]
    fn full_document_parses() {
        let yaml = r#"
http_server:
  addr: 127.0.0.1
  port: 9090
worker_pool:
  num_workers: 5
  allowed_types:
    - image/png
    - text/plain
  max_file_size: 1048576
  timeout: 10
zipper:
  archive_path: /tmp/zips
  max_files: 3
logger:
  project: zipsvc
  level: debug
  format: json
"#;
        let config: Config = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(config.http_server.bind_address(), "127.0.0.1:9090");
        assert_eq!(config.worker_pool.num_workers, 5);
        assert_eq!(config.worker_pool.allowed_types.len(), 2);
        assert_eq!(config.worker_pool.timeout, Duration::from_secs(10));
        assert_eq!(config.zipper.archive_path, PathBuf::from("/tmp/zips"));
        assert_eq!(config.zipper.max_files, 3);
        assert_eq!(config.logger.format, "json");
        config.validate().unwrap();
    }

    #[test]
    fn timeout_serializes_as_seconds() {
        let config = WorkerPoolConfig {
            timeout: Duration::from_secs(42),
            ..Default::default()
        };
        let yaml = serde_yaml::to_string(&config).unwrap();
        assert!(yaml.contains("timeout: 42"));
    }

    #[test]
    fn zero_workers_is_rejected() {
        let config = Config {
            worker_pool: WorkerPoolConfig {
                num_workers: 0,
                ..Default::default()
            },
            ..Default::default()
        };
        let err = config.validate().unwrap_err();
        assert!(matches!(err, Error::Config { key: Some(ref k), .. } if k == "worker_pool.num_workers"));
    }

    #[test]
    fn empty_allow_list_is_rejected() {
        let config = Config {
            worker_pool: WorkerPoolConfig {
                allowed_types: vec![],
                ..Default::default()
            },
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn from_file_reports_missing_file() {
        let err = Config::from_file("/nonexistent/config.yaml").unwrap_err();
        assert!(matches!(err, Error::Io(_)));
    }
}
