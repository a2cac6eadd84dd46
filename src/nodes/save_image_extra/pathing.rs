use std::fs;
use std::path::{Component, Path, PathBuf};

use chrono::{Datelike, Local, NaiveDateTime, Timelike};
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SaveImagePath {
    pub full_output_folder: PathBuf,
    pub filename: String,
    pub counter: u64,
    pub subfolder: String,
    pub filename_prefix: String,
}

#[derive(Debug, Error)]
pub enum SavePathError {
    #[error("saving image outside the output folder is not allowed: '{full_output_folder}' is not under '{output_dir}'")]
    OutsideOutputDir {
        full_output_folder: String,
        output_dir: String,
    },
    #[error("failed to resolve current directory: {0}")]
    CurrentDir(#[source] std::io::Error),
    #[error("failed to create output folder '{path}': {message}")]
    CreateFolder { path: String, message: String },
    #[error("failed to list output folder '{path}': {message}")]
    ListFolder { path: String, message: String },
}

/// Resolves where a batch lands: folder, base filename, first counter value
/// and the subfolder reported back to the host UI.
pub trait SaveImagePathResolver: Send + Sync + 'static {
    fn resolve(
        &self,
        filename_prefix: &str,
        output_dir: &Path,
        image_width: u32,
        image_height: u32,
    ) -> Result<SaveImagePath, SavePathError>;
}

/// Filesystem resolver: expands size/date tokens, keeps the result inside the
/// output directory and continues numbering after the highest existing counter.
#[derive(Debug, Default, Clone)]
pub struct OutputFolderPathResolver;

impl SaveImagePathResolver for OutputFolderPathResolver {
    fn resolve(
        &self,
        filename_prefix: &str,
        output_dir: &Path,
        image_width: u32,
        image_height: u32,
    ) -> Result<SaveImagePath, SavePathError> {
        resolve_save_image_path(
            filename_prefix,
            output_dir,
            image_width,
            image_height,
            Local::now().naive_local(),
        )
    }
}

pub fn resolve_save_image_path(
    filename_prefix: &str,
    output_dir: &Path,
    image_width: u32,
    image_height: u32,
    now: NaiveDateTime,
) -> Result<SaveImagePath, SavePathError> {
    let filename_prefix = if filename_prefix.contains('%') {
        compute_prefix_vars(filename_prefix, image_width, image_height, now)
    } else {
        filename_prefix.to_string()
    };

    let normalized = normalize_lexically(Path::new(filename_prefix.as_str()));
    let filename = normalized
        .file_name()
        .map(|v| v.to_string_lossy().into_owned())
        .unwrap_or_else(|| String::from("."));
    let subfolder = normalized
        .parent()
        .map(|v| v.to_string_lossy().into_owned())
        .unwrap_or_default();

    let full_output_folder = if subfolder.is_empty() {
        output_dir.to_path_buf()
    } else {
        output_dir.join(subfolder.as_str())
    };
    let output_abs = absolutize(output_dir)?;
    let folder_abs = absolutize(full_output_folder.as_path())?;
    if !folder_abs.starts_with(output_abs.as_path()) {
        return Err(SavePathError::OutsideOutputDir {
            full_output_folder: folder_abs.display().to_string(),
            output_dir: output_abs.display().to_string(),
        });
    }

    let counter = next_counter(full_output_folder.as_path(), filename.as_str())?;
    tracing::debug!(
        folder = %full_output_folder.display(),
        filename = filename.as_str(),
        subfolder = subfolder.as_str(),
        counter,
        "resolved save image path"
    );

    Ok(SaveImagePath {
        full_output_folder,
        filename,
        counter,
        subfolder,
        filename_prefix,
    })
}

pub fn compute_prefix_vars(
    input: &str,
    image_width: u32,
    image_height: u32,
    now: NaiveDateTime,
) -> String {
    input
        .replace("%width%", image_width.to_string().as_str())
        .replace("%height%", image_height.to_string().as_str())
        .replace("%year%", now.year().to_string().as_str())
        .replace("%month%", format!("{:02}", now.month()).as_str())
        .replace("%day%", format!("{:02}", now.day()).as_str())
        .replace("%hour%", format!("{:02}", now.hour()).as_str())
        .replace("%minute%", format!("{:02}", now.minute()).as_str())
        .replace("%second%", format!("{:02}", now.second()).as_str())
}

fn next_counter(folder: &Path, filename: &str) -> Result<u64, SavePathError> {
    let entries = match fs::read_dir(folder) {
        Ok(entries) => entries,
        Err(error) if error.kind() == std::io::ErrorKind::NotFound => {
            fs::create_dir_all(folder).map_err(|error| SavePathError::CreateFolder {
                path: folder.display().to_string(),
                message: error.to_string(),
            })?;
            return Ok(1);
        }
        Err(error) => {
            return Err(SavePathError::ListFolder {
                path: folder.display().to_string(),
                message: error.to_string(),
            });
        }
    };

    let mut highest = None::<u64>;
    for entry in entries {
        let entry = entry.map_err(|error| SavePathError::ListFolder {
            path: folder.display().to_string(),
            message: error.to_string(),
        })?;
        let name = entry.file_name().to_string_lossy().into_owned();
        if let Some(digits) = counter_in_entry_name(name.as_str(), filename) {
            highest = Some(highest.map_or(digits, |current| current.max(digits)));
        }
    }
    Ok(highest.map_or(1, |value| value.saturating_add(1)))
}

/// Counter of an existing `<filename>_<digits>...` entry. Entries that share
/// the base name but carry no leading digits count as zero.
fn counter_in_entry_name(entry_name: &str, filename: &str) -> Option<u64> {
    let split_at = entry_name
        .char_indices()
        .nth(filename.chars().count())
        .map(|(idx, _)| idx)?;
    let (base, rest) = entry_name.split_at(split_at);
    if !same_file_name(base, filename) {
        return None;
    }
    let rest = rest.strip_prefix('_')?;
    let digits: String = rest.chars().take_while(char::is_ascii_digit).collect();
    Some(digits.parse::<u64>().unwrap_or(0))
}

fn same_file_name(a: &str, b: &str) -> bool {
    if cfg!(windows) {
        a.to_lowercase() == b.to_lowercase()
    } else {
        a == b
    }
}

fn absolutize(path: &Path) -> Result<PathBuf, SavePathError> {
    if path.is_absolute() {
        return Ok(normalize_lexically(path));
    }
    let cwd = std::env::current_dir().map_err(SavePathError::CurrentDir)?;
    Ok(normalize_lexically(cwd.join(path).as_path()))
}

pub(crate) fn normalize_lexically(path: &Path) -> PathBuf {
    let mut out = PathBuf::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                let ends_with_normal =
                    matches!(out.components().next_back(), Some(Component::Normal(_)));
                if ends_with_normal {
                    out.pop();
                } else if !out.has_root() {
                    out.push("..");
                }
            }
            other => out.push(other.as_os_str()),
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use pretty_assertions::assert_eq;
    use std::time::{SystemTime, UNIX_EPOCH};

    fn temp_output_dir() -> PathBuf {
        let stamp = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .expect("time should be monotonic")
            .as_nanos();
        let root = std::env::temp_dir().join(format!("save_image_extra_pathing_{stamp}"));
        fs::create_dir_all(root.as_path()).expect("temp output dir");
        root
    }

    fn fixed_now() -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2024, 3, 7)
            .and_then(|d| d.and_hms_opt(9, 5, 2))
            .expect("valid fixed timestamp")
    }

    #[test]
    fn expands_size_and_date_tokens() {
        let expanded = compute_prefix_vars(
            "%year%-%month%-%day%/%hour%%minute%%second%_%width%x%height%_%Node.seed%",
            1024,
            768,
            fixed_now(),
        );
        assert_eq!(expanded, "2024-03-07/090502_1024x768_%Node.seed%");
    }

    #[test]
    fn plain_prefix_starts_at_one_in_empty_folder() {
        let root = temp_output_dir();
        let path = resolve_save_image_path("ComfyUI", root.as_path(), 64, 64, fixed_now())
            .expect("path should resolve");

        assert_eq!(path.full_output_folder, root);
        assert_eq!(path.filename, "ComfyUI");
        assert_eq!(path.subfolder, "");
        assert_eq!(path.filename_prefix, "ComfyUI");
        assert_eq!(path.counter, 1);

        let _ = fs::remove_dir_all(root);
    }

    #[test]
    fn subfolder_is_created_and_reported() {
        let root = temp_output_dir();
        let path = resolve_save_image_path("renders/./day/shot", root.as_path(), 8, 8, fixed_now())
            .expect("path should resolve");

        assert_eq!(path.subfolder, "renders/day");
        assert_eq!(path.filename, "shot");
        assert_eq!(path.filename_prefix, "renders/./day/shot");
        assert!(root.join("renders/day").is_dir());
        assert_eq!(path.counter, 1);

        let _ = fs::remove_dir_all(root);
    }

    #[test]
    fn continues_after_highest_existing_counter() {
        let root = temp_output_dir();
        for name in [
            "ComfyUI_00003.png",
            "ComfyUI_00011_.png",
            "ComfyUI_00007.png",
            "ComfyUIX_00099.png",
            "Other_00050.png",
        ] {
            fs::write(root.join(name), b"png").expect("seed file");
        }

        let path = resolve_save_image_path("ComfyUI", root.as_path(), 8, 8, fixed_now())
            .expect("path should resolve");
        assert_eq!(path.counter, 12);

        let _ = fs::remove_dir_all(root);
    }

    #[test]
    fn counter_saturates_at_largest_value() {
        let root = temp_output_dir();
        fs::write(root.join(format!("ComfyUI_{}.png", u64::MAX)), b"png").expect("seed file");
        fs::write(root.join("ComfyUI_99999999999999999999999.png"), b"png").expect("seed file");

        let path = resolve_save_image_path("ComfyUI", root.as_path(), 8, 8, fixed_now())
            .expect("path should resolve");
        assert_eq!(path.counter, u64::MAX);

        let _ = fs::remove_dir_all(root);
    }

    #[test]
    fn rejects_prefix_that_escapes_output_dir() {
        let root = temp_output_dir();
        let err = resolve_save_image_path("../outside/img", root.as_path(), 8, 8, fixed_now())
            .expect_err("escaping prefix should fail");
        assert!(matches!(err, SavePathError::OutsideOutputDir { .. }));

        let _ = fs::remove_dir_all(root);
    }

    #[test]
    fn counter_parsing_matches_base_name_exactly() {
        assert_eq!(counter_in_entry_name("shot_00042.png", "shot"), Some(42));
        assert_eq!(counter_in_entry_name("shot_00042_.png", "shot"), Some(42));
        assert_eq!(counter_in_entry_name("shot_final.png", "shot"), Some(0));
        assert_eq!(counter_in_entry_name("shot-00042.png", "shot"), None);
        assert_eq!(counter_in_entry_name("shots_00042.png", "shot"), None);
        assert_eq!(counter_in_entry_name("sho", "shot"), None);
    }

    #[test]
    fn normalizes_parent_components_lexically() {
        assert_eq!(
            normalize_lexically(Path::new("a/b/../c/./d")),
            PathBuf::from("a/c/d")
        );
        assert_eq!(normalize_lexically(Path::new("../x")), PathBuf::from("../x"));
        assert_eq!(normalize_lexically(Path::new("/../x")), PathBuf::from("/x"));
    }
}
