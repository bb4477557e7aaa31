use figment::providers::{Env, Format, Toml};
use figment::Figment;

use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

use crate::error::ConfigError;
use crate::gateway::TransferMode;
use crate::panel::PanelRole;

pub const ENV_PREFIX: &str = "FILECANVAS_";

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(default)]
pub struct Settings {
    /// Start with every connection drawn, dashed where clipped.
    pub show_all_connections: bool,
    /// Mode preselected in the top bar.
    pub default_mode: TransferMode,
    pub panel_width: f32,
    pub panel_height: f32,
    /// List dot-files in panels.
    pub show_hidden: bool,
    /// `tracing` filter used when `RUST_LOG` is unset.
    pub log_level: String,
    /// Panels opened at startup.
    pub initial_panels: Vec<PanelSeed>,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            show_all_connections: false,
            default_mode: TransferMode::Copy,
            panel_width: 320.0,
            panel_height: 420.0,
            show_hidden: false,
            log_level: String::from("info"),
            initial_panels: Vec::new(),
        }
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Default)]
#[serde(default)]
pub struct PanelSeed {
    pub path: String,
    pub role: PanelRole,
    pub x: f32,
    pub y: f32,
}

/// Directory holding `settings.toml`, created on first use.
pub fn config_dir() -> Result<PathBuf, ConfigError> {
    let dirs = ProjectDirs::from("", "", "filecanvas").ok_or(ConfigError::NoConfigDir)?;
    let dir = dirs.config_dir().to_path_buf();
    fs::create_dir_all(&dir)?;
    Ok(dir)
}

pub fn settings_path() -> Result<PathBuf, ConfigError> {
    Ok(config_dir()?.join("settings.toml"))
}

/// Defaults, then the settings file if present, then `FILECANVAS_*`
/// environment variables.
pub fn load_from(path: &Path) -> Result<Settings, ConfigError> {
    Figment::new()
        .merge(Toml::file(path))
        .merge(Env::prefixed(ENV_PREFIX))
        .extract()
        .map_err(|e| ConfigError::Load(Box::new(e)))
}

pub fn load_settings() -> Result<Settings, ConfigError> {
    load_from(&settings_path()?)
}
