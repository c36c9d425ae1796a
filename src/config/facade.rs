//! Configuration loading facade

use crate::config::merge::merge_policy;
use crate::config::sources::{environment, explicit_file, global_file};
use crate::config::ReflectConfig;
use crate::error::ApiError;
use std::path::Path;
use tracing::debug;

/// Loads [`ReflectConfig`] from its layered sources
pub struct ConfigLoader;

impl ConfigLoader {
    /// Built-in defaults only
    #[allow(clippy::should_implement_trait)]
    pub fn default() -> ReflectConfig {
        ReflectConfig::default()
    }

    /// Defaults, then the global file, then `explicit` (if given), then the environment
    pub fn load(explicit: Option<&Path>) -> Result<ReflectConfig, ApiError> {
        let mut builder = merge_policy::builder_with_defaults()?;
        builder = global_file::add_to_builder(builder)?;
        if let Some(path) = explicit {
            debug!(config_path = %path.display(), "Loading explicit configuration file");
            builder = explicit_file::add_to_builder(builder, path)?;
        }
        builder = environment::add_to_builder(builder);
        let config: ReflectConfig = builder.build()?.try_deserialize()?;
        Ok(config)
    }

    /// Defaults overlaid with a single file; no global file, no environment
    pub fn load_from_file(path: &Path) -> Result<ReflectConfig, ApiError> {
        let builder = explicit_file::add_to_builder(merge_policy::builder_with_defaults()?, path)?;
        let config: ReflectConfig = builder.build()?.try_deserialize()?;
        Ok(config)
    }
}
