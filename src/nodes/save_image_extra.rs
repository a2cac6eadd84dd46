pub mod metadata;
pub mod pathing;
pub mod png_encode;

use std::path::{Path, PathBuf};
use std::sync::Arc;

use image::Rgb32FImage;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use thiserror::Error;

use crate::settings_layer::SaveImageSettings;
use metadata::{build_png_text_metadata, PngTextMetadata};
use pathing::{OutputFolderPathResolver, SaveImagePathResolver, SavePathError};
use png_encode::{save_png, tensor_to_rgb8, PngEncodeError};

pub const DEFAULT_FILENAME_PREFIX: &str = "ComfyUI";
pub const BATCH_NUM_TOKEN: &str = "%batch_num%";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputKind {
    Output,
}

impl OutputKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Output => "output",
        }
    }
}

#[derive(Debug, Clone)]
pub struct SaveImagesRequest {
    pub images: Vec<Rgb32FImage>,
    pub filename_prefix: String,
    pub extradata: String,
}

impl SaveImagesRequest {
    pub fn new(images: Vec<Rgb32FImage>) -> Self {
        Self {
            images,
            filename_prefix: String::from(DEFAULT_FILENAME_PREFIX),
            extradata: String::new(),
        }
    }
}

/// Values the host injects alongside the wired inputs.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct HostContext {
    /// Accepted for the node contract; not embedded into the PNG.
    pub prompt: Option<Value>,
    pub extra_pnginfo: Option<Map<String, Value>>,
    pub disable_metadata: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SavedImage {
    pub filename: String,
    pub subfolder: String,
    #[serde(rename = "type")]
    pub kind: OutputKind,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SaveImagesUi {
    pub images: Vec<SavedImage>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SaveImagesResult {
    pub ui: SaveImagesUi,
}

#[derive(Debug, Error)]
pub enum SaveImageError {
    #[error("save image batch is empty")]
    EmptyBatch,
    #[error("save path resolution failed: {0}")]
    Path(#[from] SavePathError),
    #[error("failed to write '{file}': {source}")]
    Encode {
        file: String,
        #[source]
        source: PngEncodeError,
    },
}

/// Writes image batches as PNG files with text metadata. Configuration is
/// fixed at construction.
#[derive(Clone)]
pub struct SaveImageExtra {
    output_dir: PathBuf,
    kind: OutputKind,
    prefix_append: String,
    compress_level: u8,
    resolver: Arc<dyn SaveImagePathResolver>,
}

impl std::fmt::Debug for SaveImageExtra {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SaveImageExtra")
            .field("output_dir", &self.output_dir)
            .field("kind", &self.kind)
            .field("prefix_append", &self.prefix_append)
            .field("compress_level", &self.compress_level)
            .finish_non_exhaustive()
    }
}

impl SaveImageExtra {
    pub fn new(settings: &SaveImageSettings) -> Self {
        Self {
            output_dir: settings.output_dir.clone(),
            kind: OutputKind::Output,
            prefix_append: settings.prefix_append.clone(),
            compress_level: settings.compress_level,
            resolver: Arc::new(OutputFolderPathResolver),
        }
    }

    pub fn with_resolver(mut self, resolver: Arc<dyn SaveImagePathResolver>) -> Self {
        self.resolver = resolver;
        self
    }

    pub fn output_dir(&self) -> &Path {
        self.output_dir.as_path()
    }

    pub fn kind(&self) -> OutputKind {
        self.kind
    }

    pub fn compress_level(&self) -> u8 {
        self.compress_level
    }

    pub fn save_images(
        &self,
        request: &SaveImagesRequest,
        host: &HostContext,
    ) -> Result<SaveImagesResult, SaveImageError> {
        let Some(first) = request.images.first() else {
            return Err(SaveImageError::EmptyBatch);
        };

        let filename_prefix = format!("{}{}", request.filename_prefix, self.prefix_append);
        let resolved = self.resolver.resolve(
            filename_prefix.as_str(),
            self.output_dir.as_path(),
            first.width(),
            first.height(),
        )?;

        let metadata = self.build_metadata(request.extradata.as_str(), host);
        if host.prompt.is_some() {
            tracing::trace!("prompt hidden input received; not embedded");
        }

        let mut counter = resolved.counter;
        let mut images = Vec::with_capacity(request.images.len());
        for (batch_number, tensor) in request.images.iter().enumerate() {
            let pixels = tensor_to_rgb8(tensor);
            let file = output_file_name(resolved.filename.as_str(), batch_number, counter);
            let path = resolved.full_output_folder.join(file.as_str());

            save_png(path.as_path(), &pixels, metadata.as_ref(), self.compress_level).map_err(
                |source| SaveImageError::Encode {
                    file: path.display().to_string(),
                    source,
                },
            )?;
            tracing::debug!(file = %path.display(), batch_number, "saved image");

            images.push(SavedImage {
                filename: file,
                subfolder: resolved.subfolder.clone(),
                kind: self.kind,
            });
            counter = counter.saturating_add(1);
        }

        tracing::info!(
            count = images.len(),
            folder = %resolved.full_output_folder.display(),
            metadata_entries = metadata.as_ref().map_or(0, PngTextMetadata::len),
            "saved image batch"
        );
        Ok(SaveImagesResult {
            ui: SaveImagesUi { images },
        })
    }

    fn build_metadata(&self, extradata: &str, host: &HostContext) -> Option<PngTextMetadata> {
        if host.disable_metadata {
            return None;
        }
        Some(build_png_text_metadata(
            host.extra_pnginfo.as_ref(),
            extradata,
        ))
    }
}

/// `<filename with batch index>_<counter:05>.png`
pub fn output_file_name(filename: &str, batch_number: usize, counter: u64) -> String {
    let with_batch = filename.replace(BATCH_NUM_TOKEN, batch_number.to_string().as_str());
    format!("{with_batch}_{counter:05}.png")
}
