//! Configuration System
//!
//! Layered daemon configuration: built-in defaults, the global file, an
//! explicit file and `REFLECT__` environment variables, merged in that order.
//! The loaded value is threaded explicitly through every constructor.

use crate::logging::LoggingConfig;
use crate::registry::Registry;
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

mod facade;
mod merge;
mod sources;

pub use facade::ConfigLoader;
pub use sources::global_file::global_config_path;

pub(crate) const DEFAULT_LISTEN_ADDR: &str = "127.0.0.1:7340";

/// Application data directory ($XDG_DATA_HOME/reflect on Linux)
pub fn data_dir() -> PathBuf {
    directories::ProjectDirs::from("", "", "reflect")
        .map(|dirs| dirs.data_dir().to_path_buf())
        .unwrap_or_else(|| PathBuf::from(".reflect"))
}

pub(crate) fn default_store_path() -> PathBuf {
    data_dir().join("store")
}

/// Root configuration structure
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ReflectConfig {
    #[serde(default)]
    pub daemon: DaemonConfig,

    #[serde(default)]
    pub storage: StorageConfig,

    /// Strategy codes used when a command omits them
    #[serde(default)]
    pub defaults: DefaultsConfig,

    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Daemon runtime settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DaemonConfig {
    /// Relay listen address
    #[serde(default = "default_listen_addr")]
    pub listen_addr: String,

    /// Minimum time between drive mount polls
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,

    /// Monitor wake-up period when no filesystem event arrives
    #[serde(default = "default_heartbeat_ms")]
    pub heartbeat_ms: u64,

    /// Bound of the executor's command queue
    #[serde(default = "default_queue_capacity")]
    pub queue_capacity: usize,
}

fn default_listen_addr() -> String {
    DEFAULT_LISTEN_ADDR.to_string()
}

fn default_poll_interval_ms() -> u64 {
    2000
}

fn default_heartbeat_ms() -> u64 {
    500
}

fn default_queue_capacity() -> usize {
    256
}

impl Default for DaemonConfig {
    fn default() -> Self {
        Self {
            listen_addr: default_listen_addr(),
            poll_interval_ms: default_poll_interval_ms(),
            heartbeat_ms: default_heartbeat_ms(),
            queue_capacity: default_queue_capacity(),
        }
    }
}

impl DaemonConfig {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn heartbeat(&self) -> Duration {
        Duration::from_millis(self.heartbeat_ms)
    }

    pub fn validate(&self) -> Result<(), String> {
        self.listen_addr
            .parse::<SocketAddr>()
            .map_err(|e| format!("Invalid listen address {:?}: {}", self.listen_addr, e))?;
        if self.poll_interval_ms == 0 {
            return Err("Poll interval must be positive".to_string());
        }
        if self.heartbeat_ms == 0 {
            return Err("Heartbeat must be positive".to_string());
        }
        if self.queue_capacity == 0 {
            return Err("Queue capacity must be positive".to_string());
        }
        Ok(())
    }
}

/// Metadata store backend
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StorageBackend {
    Sled,
    Flat,
}

/// Metadata store location
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    #[serde(default = "default_backend")]
    pub backend: StorageBackend,

    /// Sled directory or flat file path
    #[serde(default = "default_store_path")]
    pub path: PathBuf,
}

fn default_backend() -> StorageBackend {
    StorageBackend::Sled
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            backend: default_backend(),
            path: default_store_path(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DefaultsConfig {
    #[serde(default = "default_reflector")]
    pub reflector: String,

    #[serde(default = "default_change_map")]
    pub change_map: String,
}

fn default_reflector() -> String {
    "diff".to_string()
}

fn default_change_map() -> String {
    "blake3".to_string()
}

impl Default for DefaultsConfig {
    fn default() -> Self {
        Self {
            reflector: default_reflector(),
            change_map: default_change_map(),
        }
    }
}

/// Configuration validation errors
#[derive(Debug, Clone)]
pub enum ValidationError {
    Daemon(String),
    Storage(String),
    Defaults(String),
}

impl std::fmt::Display for ValidationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ValidationError::Daemon(msg) => write!(f, "Daemon: {}", msg),
            ValidationError::Storage(msg) => write!(f, "Storage: {}", msg),
            ValidationError::Defaults(msg) => write!(f, "Defaults: {}", msg),
        }
    }
}

impl std::error::Error for ValidationError {}

impl ReflectConfig {
    /// Validate the entire configuration against the strategies in `registry`
    pub fn validate(&self, registry: &Registry) -> Result<(), Vec<ValidationError>> {
        let mut errors = Vec::new();

        if let Err(e) = self.daemon.validate() {
            errors.push(ValidationError::Daemon(e));
        }

        if self.storage.path.as_os_str().is_empty() {
            errors.push(ValidationError::Storage("Store path cannot be empty".to_string()));
        }

        if registry.reflector(&self.defaults.reflector).is_err() {
            errors.push(ValidationError::Defaults(format!(
                "Unknown reflector code '{}'",
                self.defaults.reflector
            )));
        }
        if registry.change_map(&self.defaults.change_map).is_err() {
            errors.push(ValidationError::Defaults(format!(
                "Unknown change map code '{}'",
                self.defaults.change_map
            )));
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;
    use tempfile::TempDir;

    // Serializes tests that touch process-wide environment variables
    static ENV_MUTEX: Mutex<()> = Mutex::new(());

    #[test]
    fn test_default_config() {
        let config = ConfigLoader::default();
        assert_eq!(config.daemon.listen_addr, "127.0.0.1:7340");
        assert_eq!(config.daemon.queue_capacity, 256);
        assert_eq!(config.storage.backend, StorageBackend::Sled);
        assert_eq!(config.defaults.reflector, "diff");
        assert!(config.validate(&Registry::default()).is_ok());
    }

    #[test]
    fn test_config_validation() {
        let mut config = ReflectConfig::default();
        config.daemon.listen_addr = "not an address".to_string();
        config.daemon.heartbeat_ms = 0;
        config.defaults.change_map = "md5".to_string();

        let errors = config.validate(&Registry::default()).unwrap_err();
        assert_eq!(errors.len(), 2);
        assert!(errors[0].to_string().starts_with("Daemon:"));
        assert!(errors[1].to_string().contains("md5"));
    }

    #[test]
    fn test_load_from_toml_file() {
        let temp_dir = TempDir::new().unwrap();
        let config_file = temp_dir.path().join("reflect.toml");
        std::fs::write(
            &config_file,
            r#"
[daemon]
listen_addr = "0.0.0.0:9000"
heartbeat_ms = 100

[storage]
backend = "flat"
path = "/var/lib/reflect/backups.db"

[defaults]
change_map = "sha256"
"#,
        )
        .unwrap();

        let config = ConfigLoader::load_from_file(&config_file).unwrap();
        assert_eq!(config.daemon.listen_addr, "0.0.0.0:9000");
        assert_eq!(config.daemon.heartbeat_ms, 100);
        assert_eq!(config.daemon.poll_interval_ms, 2000);
        assert_eq!(config.storage.backend, StorageBackend::Flat);
        assert_eq!(config.storage.path, PathBuf::from("/var/lib/reflect/backups.db"));
        assert_eq!(config.defaults.change_map, "sha256");
        assert_eq!(config.defaults.reflector, "diff");
    }

    #[test]
    fn test_load_missing_explicit_file() {
        let temp_dir = TempDir::new().unwrap();
        let result = ConfigLoader::load_from_file(&temp_dir.path().join("absent.toml"));
        assert!(result.is_err());
    }

    #[test]
    fn test_global_file_then_environment() {
        let _guard = ENV_MUTEX.lock().unwrap_or_else(|e| e.into_inner());
        let temp_dir = TempDir::new().unwrap();
        let original_xdg = std::env::var("XDG_CONFIG_HOME").ok();

        let global_dir = temp_dir.path().join("reflect");
        std::fs::create_dir_all(&global_dir).unwrap();
        std::fs::write(
            global_dir.join("config.toml"),
            "[daemon]\nqueue_capacity = 8\npoll_interval_ms = 50\n",
        )
        .unwrap();
        std::env::set_var("XDG_CONFIG_HOME", temp_dir.path());
        std::env::set_var("REFLECT__DAEMON__POLL_INTERVAL_MS", "75");

        let result = ConfigLoader::load(None);

        std::env::remove_var("REFLECT__DAEMON__POLL_INTERVAL_MS");
        match original_xdg {
            Some(xdg) => std::env::set_var("XDG_CONFIG_HOME", xdg),
            None => std::env::remove_var("XDG_CONFIG_HOME"),
        }

        let config = result.unwrap();
        assert_eq!(config.daemon.queue_capacity, 8);
        assert_eq!(config.daemon.poll_interval_ms, 75);
    }

    #[test]
    fn test_global_config_path_prefers_xdg() {
        let _guard = ENV_MUTEX.lock().unwrap_or_else(|e| e.into_inner());
        let original_xdg = std::env::var("XDG_CONFIG_HOME").ok();

        std::env::set_var("XDG_CONFIG_HOME", "/tmp/xdg-test");
        let path = global_config_path();

        match original_xdg {
            Some(xdg) => std::env::set_var("XDG_CONFIG_HOME", xdg),
            None => std::env::remove_var("XDG_CONFIG_HOME"),
        }
        assert_eq!(path, Some(PathBuf::from("/tmp/xdg-test/reflect/config.toml")));
    }
}
