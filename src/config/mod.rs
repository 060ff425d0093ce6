use std::path::{Path, PathBuf};

use serde::Deserialize;

use crate::geometry::{DEFAULT_HANDLE_THRESHOLD, DEFAULT_MIN_SIZE};
use crate::input::DEFAULT_STOP_HOTKEY;
use crate::storage::{DEFAULT_IMAGE_TEMPLATE, DEFAULT_VIDEO_TEMPLATE};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum ConfigPathError {
    MissingHomeDirectory,
}

const APP_DIR: &str = "rscrot";
const APP_CONFIG_FILE: &str = "config.json";
pub(crate) const DEFAULT_SELECTION_DELAY_MS: u64 = 250;
const DEFAULT_OVERLAY_OPACITY: f64 = 0.4;

/// Settings from `config.json`; command-line flags override them.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub selection_delay_ms: u64,
    pub image_template: String,
    pub video_template: String,
    pub min_selection_size: u32,
    pub handle_threshold: u32,
    pub stop_hotkey: String,
    pub overlay_opacity: f64,
    pub adjustable: bool,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            selection_delay_ms: DEFAULT_SELECTION_DELAY_MS,
            image_template: DEFAULT_IMAGE_TEMPLATE.to_string(),
            video_template: DEFAULT_VIDEO_TEMPLATE.to_string(),
            min_selection_size: DEFAULT_MIN_SIZE,
            handle_threshold: DEFAULT_HANDLE_THRESHOLD,
            stop_hotkey: DEFAULT_STOP_HOTKEY.to_string(),
            overlay_opacity: DEFAULT_OVERLAY_OPACITY,
            adjustable: false,
        }
    }
}

pub fn load_app_config() -> AppConfig {
    let (xdg_config_home, home) = config_env_dirs();
    load_app_config_with(xdg_config_home.as_deref(), home.as_deref())
}

fn load_app_config_with(xdg_config_home: Option<&Path>, home: Option<&Path>) -> AppConfig {
    let path = match app_config_path(APP_DIR, APP_CONFIG_FILE, xdg_config_home, home) {
        Ok(p) => p,
        Err(_) => return AppConfig::default(),
    };
    if !path.exists() {
        return AppConfig::default();
    }
    match std::fs::read_to_string(&path) {
        Ok(contents) => serde_json::from_str(&contents).unwrap_or_else(|err| {
            tracing::warn!(?err, ?path, "failed to parse config.json; using defaults");
            AppConfig::default()
        }),
        Err(err) => {
            tracing::warn!(?err, ?path, "failed to read config.json; using defaults");
            AppConfig::default()
        }
    }
}

pub(crate) fn config_env_dirs() -> (Option<PathBuf>, Option<PathBuf>) {
    (
        std::env::var_os("XDG_CONFIG_HOME").map(PathBuf::from),
        std::env::var_os("HOME").map(PathBuf::from),
    )
}

pub(crate) fn app_config_path(
    app_dir: &str,
    file_name: &str,
    xdg_config_home: Option<&Path>,
    home: Option<&Path>,
) -> Result<PathBuf, ConfigPathError> {
    let mut path = config_root(xdg_config_home, home)?;
    path.push(app_dir);
    path.push(file_name);
    Ok(path)
}

fn config_root(
    xdg_config_home: Option<&Path>,
    home: Option<&Path>,
) -> Result<PathBuf, ConfigPathError> {
    if let Some(xdg) = xdg_config_home.filter(|path| !path.as_os_str().is_empty()) {
        return Ok(xdg.to_path_buf());
    }

    let home = home.ok_or(ConfigPathError::MissingHomeDirectory)?;
    Ok(home.join(".config"))
}
