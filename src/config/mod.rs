//! Configuration module for the search gateway
//!
//! Handles loading and validating settings from YAML files and environment variables.

mod settings;

pub use settings::*;

use anyhow::{bail, Result};
use std::path::{Path, PathBuf};
use tracing::info;

/// Environment variable naming an explicit settings file
pub const SETTINGS_PATH_ENV: &str = "SEARCH_GATEWAY_SETTINGS";

/// Default places searched for a settings file, in order
pub fn default_paths() -> Vec<PathBuf> {
    let mut paths = vec![
        PathBuf::from("settings.yml"),
        PathBuf::from("config/settings.yml"),
    ];
    if let Some(dir) = dirs::config_dir() {
        paths.push(dir.join("search-gateway/settings.yml"));
    }
    paths
}

/// Load settings from an explicit path, the environment, or the default
/// locations, then apply environment overrides and validate.
pub fn load(explicit: Option<&Path>) -> Result<Settings> {
    let from_env = std::env::var(SETTINGS_PATH_ENV)
        .ok()
        .filter(|p| !p.trim().is_empty());
    let mut settings = match resolve_path(explicit, from_env)? {
        Some(path) => {
            info!("Loading settings from: {}", path.display());
            Settings::from_file(&path)?
        }
        None => {
            info!("No settings file found, using defaults");
            Settings::default()
        }
    };
    settings.merge_env()?;
    settings.validate()?;
    Ok(settings)
}

/// An explicit path, from the command line or the environment, must exist;
/// the default locations are only probed.
fn resolve_path(explicit: Option<&Path>, from_env: Option<String>) -> Result<Option<PathBuf>> {
    if let Some(path) = explicit {
        return Ok(Some(path.to_path_buf()));
    }
    if let Some(path) = from_env {
        let path = PathBuf::from(path);
        if !path.exists() {
            bail!("{SETTINGS_PATH_ENV} names {}, which does not exist", path.display());
        }
        return Ok(Some(path));
    }
    Ok(default_paths().into_iter().find(|p| p.exists()))
}
