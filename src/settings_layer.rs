use std::fs;
use std::path::{Path, PathBuf};

use serde_json::Value;
use thiserror::Error;

use crate::nodes::save_image_extra::png_encode::{DEFAULT_COMPRESS_LEVEL, MAX_COMPRESS_LEVEL};

pub const DEFAULT_OUTPUT_DIR: &str = "output";

/// Effective configuration for the save node and the flags the host threads
/// into each call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SaveImageSettings {
    pub output_dir: PathBuf,
    pub prefix_append: String,
    pub compress_level: u8,
    pub disable_metadata: bool,
}

impl Default for SaveImageSettings {
    fn default() -> Self {
        Self {
            output_dir: PathBuf::from(DEFAULT_OUTPUT_DIR),
            prefix_append: String::new(),
            compress_level: DEFAULT_COMPRESS_LEVEL,
            disable_metadata: false,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct SaveImageSettingsOverlay {
    pub output_dir: Option<String>,
    pub prefix_append: Option<String>,
    pub compress_level: Option<u8>,
    pub disable_metadata: Option<bool>,
}

impl SaveImageSettingsOverlay {
    pub fn is_empty(&self) -> bool {
        self.output_dir.is_none()
            && self.prefix_append.is_none()
            && self.compress_level.is_none()
            && self.disable_metadata.is_none()
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum SettingsLayerError {
    #[error("failed to read save image settings '{path}': {message}")]
    ReadFile { path: String, message: String },
    #[error("failed to parse save image settings JSON '{path}': {message}")]
    ParseJson { path: String, message: String },
    #[error("failed to parse save image settings TOML '{path}': {message}")]
    ParseToml { path: String, message: String },
    #[error("save image settings root must be an object")]
    RootMustBeObject,
    #[error("save image settings field '{field}' has invalid type")]
    InvalidFieldType { field: String },
    #[error("save image settings field 'compress_level' must be between 0 and {max}, got {value}")]
    CompressLevelOutOfRange { value: i64, max: u8 },
}

pub fn load_app_save_image_settings(
    app_root: &Path,
    explicit_path: Option<&str>,
) -> Result<SaveImageSettingsOverlay, SettingsLayerError> {
    if let Some(path) = explicit_path
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(PathBuf::from)
        .map(|p| if p.is_absolute() { p } else { app_root.join(p) })
    {
        return load_optional_overlay_by_extension(path.as_path());
    }

    let toml_path = app_root.join("config/saveimage.settings.toml");
    if toml_path.exists() {
        return load_optional_overlay_from_toml_path(toml_path.as_path());
    }
    load_optional_overlay_from_json_path(app_root.join("config/saveimage.settings.json").as_path())
}

pub fn merge_save_image_settings_overlays(
    file: &SaveImageSettingsOverlay,
    overrides: &SaveImageSettingsOverlay,
) -> SaveImageSettingsOverlay {
    SaveImageSettingsOverlay {
        output_dir: overrides
            .output_dir
            .clone()
            .or_else(|| file.output_dir.clone()),
        prefix_append: overrides
            .prefix_append
            .clone()
            .or_else(|| file.prefix_append.clone()),
        compress_level: overrides.compress_level.or(file.compress_level),
        disable_metadata: overrides.disable_metadata.or(file.disable_metadata),
    }
}

/// Applies an overlay on top of the defaults. A relative `output_dir` is
/// anchored at `app_root`.
pub fn resolve_save_image_settings(
    app_root: &Path,
    overlay: &SaveImageSettingsOverlay,
) -> SaveImageSettings {
    let defaults = SaveImageSettings::default();
    let output_dir = overlay
        .output_dir
        .as_deref()
        .map(PathBuf::from)
        .unwrap_or(defaults.output_dir);
    SaveImageSettings {
        output_dir: if output_dir.is_absolute() {
            output_dir
        } else {
            app_root.join(output_dir)
        },
        prefix_append: overlay
            .prefix_append
            .clone()
            .unwrap_or(defaults.prefix_append),
        compress_level: overlay.compress_level.unwrap_or(defaults.compress_level),
        disable_metadata: overlay.disable_metadata.unwrap_or(defaults.disable_metadata),
    }
}

pub fn parse_save_image_settings_overlay_json(
    value: &Value,
) -> Result<SaveImageSettingsOverlay, SettingsLayerError> {
    let root = value
        .as_object()
        .ok_or(SettingsLayerError::RootMustBeObject)?;
    let section = root
        .get("save_image")
        .unwrap_or(value)
        .as_object()
        .ok_or(SettingsLayerError::RootMustBeObject)?;

    let mut out = SaveImageSettingsOverlay::default();
    if let Some(v) = section.get("output_dir") {
        out.output_dir = Some(parse_non_empty_string(v, "output_dir")?);
    }
    if let Some(v) = section.get("prefix_append") {
        // Empty is a valid suffix.
        out.prefix_append = Some(
            v.as_str()
                .map(str::to_string)
                .ok_or_else(|| invalid_field("prefix_append"))?,
        );
    }
    if let Some(v) = section.get("compress_level") {
        out.compress_level = Some(parse_compress_level(v)?);
    }
    if let Some(v) = section.get("disable_metadata") {
        out.disable_metadata = Some(v.as_bool().ok_or_else(|| invalid_field("disable_metadata"))?);
    }
    Ok(out)
}

fn load_optional_overlay_by_extension(
    path: &Path,
) -> Result<SaveImageSettingsOverlay, SettingsLayerError> {
    match path
        .extension()
        .and_then(|v| v.to_str())
        .map(|v| v.to_ascii_lowercase())
    {
        Some(ext) if ext == "toml" => load_optional_overlay_from_toml_path(path),
        _ => load_optional_overlay_from_json_path(path),
    }
}

fn load_optional_overlay_from_json_path(
    path: &Path,
) -> Result<SaveImageSettingsOverlay, SettingsLayerError> {
    if !path.exists() {
        return Ok(SaveImageSettingsOverlay::default());
    }
    let raw = read_settings_file(path)?;
    let parsed = serde_json::from_str::<Value>(raw.as_str()).map_err(|error| {
        SettingsLayerError::ParseJson {
            path: path.display().to_string(),
            message: error.to_string(),
        }
    })?;
    parse_save_image_settings_overlay_json(&parsed)
}

fn load_optional_overlay_from_toml_path(
    path: &Path,
) -> Result<SaveImageSettingsOverlay, SettingsLayerError> {
    if !path.exists() {
        return Ok(SaveImageSettingsOverlay::default());
    }
    let raw = read_settings_file(path)?;
    let parsed = toml::from_str::<toml::Value>(raw.as_str()).map_err(|error| {
        SettingsLayerError::ParseToml {
            path: path.display().to_string(),
            message: error.to_string(),
        }
    })?;
    let json_value =
        serde_json::to_value(parsed).map_err(|error| SettingsLayerError::ParseToml {
            path: path.display().to_string(),
            message: error.to_string(),
        })?;
    parse_save_image_settings_overlay_json(&json_value)
}

fn read_settings_file(path: &Path) -> Result<String, SettingsLayerError> {
    fs::read_to_string(path).map_err(|error| SettingsLayerError::ReadFile {
        path: path.display().to_string(),
        message: error.to_string(),
    })
}

fn invalid_field(field: &str) -> SettingsLayerError {
    SettingsLayerError::InvalidFieldType {
        field: field.to_string(),
    }
}

fn parse_non_empty_string(value: &Value, field: &str) -> Result<String, SettingsLayerError> {
    let parsed = value
        .as_str()
        .map(str::trim)
        .ok_or_else(|| invalid_field(field))?;
    if parsed.is_empty() {
        return Err(invalid_field(field));
    }
    Ok(parsed.to_string())
}

fn parse_compress_level(value: &Value) -> Result<u8, SettingsLayerError> {
    let level = value
        .as_i64()
        .ok_or_else(|| invalid_field("compress_level"))?;
    u8::try_from(level)
        .ok()
        .filter(|v| *v <= MAX_COMPRESS_LEVEL)
        .ok_or(SettingsLayerError::CompressLevelOutOfRange {
            value: level,
            max: MAX_COMPRESS_LEVEL,
        })
}
