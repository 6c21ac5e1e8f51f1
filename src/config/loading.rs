//! Configuration loading functionality.
//!
//! Resolves the config path (default XDG location or `--config` override),
//! creates a default file when none exists, parses, validates and applies
//! defaults.

use anyhow::{Context, Result};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::OnceLock;

use super::Config;
use super::validation::validate_config;
use crate::common::constants::*;
use crate::common::utils::private_path;

/// Global configuration directory, set once at startup
static CONFIG_DIR: OnceLock<Option<PathBuf>> = OnceLock::new();

/// Set the configuration directory for the current process.
/// This can only be called once, typically at startup.
pub fn set_config_dir(dir: Option<String>) -> Result<()> {
    CONFIG_DIR
        .set(dir.map(PathBuf::from))
        .map_err(|_| anyhow::anyhow!("Configuration directory already set"))
}

/// Get the custom configuration directory if one was set.
/// Returns None if using the default directory.
pub fn get_custom_config_dir() -> Option<PathBuf> {
    CONFIG_DIR.get().and_then(|d| d.clone())
}

/// Path of `nightshade.toml` for this process.
pub fn get_config_path() -> Result<PathBuf> {
    if let Some(custom_dir) = get_custom_config_dir() {
        return Ok(custom_dir.join("nightshade.toml"));
    }
    let config_dir = dirs::config_dir().context("Could not determine config directory")?;
    Ok(config_dir.join("nightshade").join("nightshade.toml"))
}

/// Load configuration using automatic path detection.
///
/// Creates a default configuration file if none exists.
pub fn load() -> Result<Config> {
    let config_path = get_config_path()?;

    if !config_path.exists() {
        super::builder::create_default_config(&config_path)
            .context("Failed to create default config during load")?;
    }

    load_from_path(&config_path).with_context(|| {
        format!(
            "Failed to load configuration from {}",
            private_path(&config_path)
        )
    })
}

/// Load configuration from a specific path.
///
/// Unlike [`load`], a missing file is an error here.
pub fn load_from_path(path: &Path) -> Result<Config> {
    if !path.exists() {
        anyhow::bail!(
            "Configuration file not found at {}",
            private_path(path)
        );
    }

    let content = fs::read_to_string(path)
        .with_context(|| format!("Failed to read config from {}", private_path(path)))?;

    parse_config(&content)
        .with_context(|| format!("Invalid configuration in {}", private_path(path)))
}

/// Parse, validate and complete a configuration from TOML text.
pub fn parse_config(content: &str) -> Result<Config> {
    let mut config: Config = toml::from_str(content).context("Failed to parse config")?;

    validate_config(&config)?;
    apply_defaults(&mut config);

    Ok(config)
}

/// Fill every unset field from the defaults in `common::constants`.
fn apply_defaults(config: &mut Config) {
    if config.backend.is_none() {
        config.backend = Some(DEFAULT_BACKEND);
    }
    if config.schedule.is_none() {
        config.schedule = Some(DEFAULT_SCHEDULE.to_string());
    }
    if config.circadian_enabled.is_none() {
        config.circadian_enabled = Some(DEFAULT_CIRCADIAN_ENABLED);
    }
    if config.bedtime.is_none() {
        config.bedtime = Some(DEFAULT_BEDTIME.to_string());
    }

    if config.daylight_temp.is_none() {
        config.daylight_temp = Some(DEFAULT_DAYLIGHT_TEMP);
    }
    if config.evening_temp.is_none() {
        config.evening_temp = Some(DEFAULT_EVENING_TEMP);
    }
    if config.deep_night_temp.is_none() {
        config.deep_night_temp = Some(DEFAULT_DEEP_NIGHT_TEMP);
    }

    if config.evening_lead_minutes.is_none() {
        config.evening_lead_minutes = Some(DEFAULT_EVENING_LEAD_MINUTES);
    }
    if config.deep_night_lead_minutes.is_none() {
        config.deep_night_lead_minutes = Some(DEFAULT_DEEP_NIGHT_LEAD_MINUTES);
    }

    if config.update_interval.is_none() {
        config.update_interval = Some(DEFAULT_UPDATE_INTERVAL);
    }
    if config.media_apps.is_none() {
        config.media_apps = Some(
            DEFAULT_MEDIA_APPS
                .iter()
                .map(|app| app.to_string())
                .collect(),
        );
    }
}
