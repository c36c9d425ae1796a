//! Merge rules: defaults, override order, conflict handling.

use crate::config::{default_store_path, DEFAULT_LISTEN_ADDR};
use config::Config;
use config::ConfigBuilder;
use config::ConfigError;

/// Create a Config builder with merge policy defaults applied.
///
/// Later sources override earlier ones key by key: defaults, global file,
/// explicit file, environment.
pub fn builder_with_defaults() -> Result<ConfigBuilder<config::builder::DefaultState>, ConfigError>
{
    Config::builder()
        .set_default("daemon.listen_addr", DEFAULT_LISTEN_ADDR)?
        .set_default("daemon.poll_interval_ms", 2000)?
        .set_default("daemon.heartbeat_ms", 500)?
        .set_default("daemon.queue_capacity", 256)?
        .set_default("storage.backend", "sled")?
        .set_default(
            "storage.path",
            default_store_path().to_string_lossy().to_string(),
        )?
        .set_default("defaults.reflector", "diff")?
        .set_default("defaults.change_map", "blake3")
}
