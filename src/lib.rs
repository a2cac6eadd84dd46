pub mod contract;
pub mod nodes;
pub mod settings_layer;

use std::path::PathBuf;

pub const APP_ROOT_ENV: &str = "SAVE_IMAGE_EXTRA_APP_ROOT";

/// App root for settings lookup and relative output directories:
/// `SAVE_IMAGE_EXTRA_APP_ROOT` when set, else the working directory.
pub fn default_app_root() -> PathBuf {
    std::env::var_os(APP_ROOT_ENV)
        .filter(|v| !v.is_empty())
        .map(PathBuf::from)
        .or_else(|| std::env::current_dir().ok())
        .unwrap_or_else(|| PathBuf::from("."))
}
