//! Configuration Loader
//!
//! Layers, in increasing precedence:
//! 1. built-in defaults
//! 2. the base TOML file (`config/insights.toml` unless a path is given)
//! 3. the environment overlay next to it (`insights.<env>.toml`)
//! 4. `INSIGHTS__SECTION__FIELD` environment variables

use super::error::{ConfigResult, ConfigurationError};
use super::InsightsConfig;
use config::{Config, Environment, File, FileFormat};
use std::path::{Path, PathBuf};
use tracing::debug;

/// Default location of the base configuration file
pub const DEFAULT_CONFIG_PATH: &str = "config/insights.toml";

/// Load and validate configuration for `environment`.
///
/// An explicitly supplied `path` must exist; the default path and every
/// environment overlay are optional.
pub fn load_config(path: Option<&Path>, environment: &str) -> ConfigResult<InsightsConfig> {
    let (base_path, required) = match path {
        Some(p) => (p.to_path_buf(), true),
        None => (PathBuf::from(DEFAULT_CONFIG_PATH), false),
    };

    if required && !base_path.is_file() {
        return Err(ConfigurationError::config_file_not_found(vec![base_path]));
    }

    let overlay_path = environment_overlay_path(&base_path, environment);

    debug!(
        base = %base_path.display(),
        overlay = %overlay_path.display(),
        environment = %environment,
        "Loading insights configuration"
    );

    let defaults = Config::try_from(&InsightsConfig::default())
        .map_err(|e| ConfigurationError::invalid_source("defaults", e))?;

    let settings = Config::builder()
        .add_source(defaults)
        .add_source(
            File::from(base_path.clone())
                .format(FileFormat::Toml)
                .required(required),
        )
        .add_source(
            File::from(overlay_path)
                .format(FileFormat::Toml)
                .required(false),
        )
        .add_source(
            Environment::with_prefix("INSIGHTS")
                .separator("__")
                .try_parsing(true),
        )
        .build()
        .map_err(|e| ConfigurationError::invalid_source(base_path.display().to_string(), e))?;

    let config: InsightsConfig = settings
        .try_deserialize()
        .map_err(ConfigurationError::deserialization_error)?;

    config.validate()?;

    crate::log_pipeline!(
        info,
        "config_loaded",
        environment = %environment,
        ttl_seconds = config.cache.ttl_seconds,
        max_entries = config.cache.max_entries,
        schema_version = config.cache.schema_version,
        "⚙️ Configuration loaded successfully"
    );

    Ok(config)
}

/// `config/insights.toml` + `test` → `config/insights.test.toml`
fn environment_overlay_path(base: &Path, environment: &str) -> PathBuf {
    let stem = base
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or("insights");
    base.with_file_name(format!("{stem}.{environment}.toml"))
}
