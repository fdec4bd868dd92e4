//! TOML configuration for the `tapedeck` binary.
//!
//! The document has the same sections as [`td_core::config::Config`]; every
//! key is optional.
//!
//! ```toml
//! [buffer]
//! allocation_length = 65536
//!
//! [seek]
//! minimum_search_range = 4096
//!
//! [loading]
//! max_buffer_us = 30000000
//! ```

pub use td_core::config::{BufferConfig, Config, LoadingConfig, SeekConfig};

use anyhow::{Context, Result};
use std::path::Path;

/// Locations searched when no path is given, in order.
pub const DEFAULT_PATHS: [&str; 2] = ["./tapedeck.toml", "/etc/tapedeck/config.toml"];

/// Load configuration from a TOML file
pub fn load_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {:?}", path))?;

    let config: Config = toml::from_str(&content)
        .with_context(|| format!("Failed to parse config file: {:?}", path))?;

    validate_config(&config)?;

    Ok(config)
}

/// Load config from default locations or return default config
pub fn load_config_or_default(custom_path: Option<&Path>) -> Result<Config> {
    if let Some(path) = custom_path {
        return load_config(path);
    }

    for path_str in DEFAULT_PATHS {
        let path = Path::new(path_str);
        if path.exists() {
            return load_config(path);
        }
    }

    Ok(Config::default())
}

/// Reject settings the engine cannot run with; log the merely odd ones.
pub fn validate_config(config: &Config) -> Result<()> {
    if config.buffer.allocation_length == 0 {
        anyhow::bail!("buffer.allocation_length cannot be 0");
    }
    if config.loading.read_steps_per_continue == 0 {
        anyhow::bail!("loading.read_steps_per_continue cannot be 0");
    }
    if config.loading.max_buffer_us <= 0 {
        anyhow::bail!("loading.max_buffer_us must be positive");
    }

    for warning in config.validate() {
        tracing::warn!("{}", warning);
    }

    Ok(())
}

/// Render `config` as TOML, as `check-config` prints it.
pub fn to_toml(config: &Config) -> Result<String> {
    toml::to_string_pretty(config).context("Failed to serialize config")
}
