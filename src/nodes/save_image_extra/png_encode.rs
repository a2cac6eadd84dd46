use std::fs;
use std::io::Write;
use std::path::Path;

use image::{Rgb, Rgb32FImage, RgbImage};
use thiserror::Error;

use super::metadata::PngTextMetadata;

pub const DEFAULT_COMPRESS_LEVEL: u8 = 4;
pub const MAX_COMPRESS_LEVEL: u8 = 9;
pub const MAX_KEYWORD_LEN: usize = 79;

#[derive(Debug, Error)]
pub enum PngEncodeError {
    #[error("failed to write image file '{path}': {message}")]
    WriteFile { path: String, message: String },
    #[error("failed to add PNG text chunk '{key}': {source}")]
    TextChunk {
        key: String,
        #[source]
        source: png::EncodingError,
    },
    #[error("PNG encoding failed: {0}")]
    Encoding(#[source] png::EncodingError),
}

/// Scales a `[0, 1]` float sample to 8 bits: clip to `[0, 255]`, then truncate.
pub fn sample_to_u8(value: f32) -> u8 {
    let scaled = value * 255.0;
    if scaled.is_nan() {
        return 0;
    }
    scaled.clamp(0.0, 255.0) as u8
}

pub fn tensor_to_rgb8(image: &Rgb32FImage) -> RgbImage {
    RgbImage::from_fn(image.width(), image.height(), |x, y| {
        let Rgb([r, g, b]) = *image.get_pixel(x, y);
        Rgb([sample_to_u8(r), sample_to_u8(g), sample_to_u8(b)])
    })
}

pub fn compression_for_level(level: u8) -> png::Compression {
    match level {
        0..=3 => png::Compression::Fast,
        4..=6 => png::Compression::Default,
        _ => png::Compression::Best,
    }
}

/// Text that fits Latin-1 goes into `tEXt`; anything else into an
/// uncompressed UTF-8 `iTXt` chunk.
pub fn fits_latin1(text: &str) -> bool {
    text.chars().all(|ch| u32::from(ch) <= 0xFF)
}

/// PNG text keywords are 1 to 79 bytes of Latin-1 without NUL.
pub fn is_valid_keyword(key: &str) -> bool {
    !key.is_empty()
        && key.len() <= MAX_KEYWORD_LEN
        && key.chars().all(|ch| ch != '\0' && u32::from(ch) <= 0xFF)
}

pub fn encode_png<W: Write>(
    writer: W,
    image: &RgbImage,
    metadata: Option<&PngTextMetadata>,
    compress_level: u8,
) -> Result<(), PngEncodeError> {
    let mut encoder = png::Encoder::new(writer, image.width(), image.height());
    encoder.set_color(png::ColorType::Rgb);
    encoder.set_depth(png::BitDepth::Eight);
    encoder.set_compression(compression_for_level(compress_level));

    if let Some(metadata) = metadata {
        for entry in metadata.entries() {
            let added = if fits_latin1(entry.text.as_str()) {
                encoder.add_text_chunk(entry.key.clone(), entry.text.clone())
            } else {
                encoder.add_itxt_chunk(entry.key.clone(), entry.text.clone())
            };
            added.map_err(|source| PngEncodeError::TextChunk {
                key: entry.key.clone(),
                source,
            })?;
        }
    }

    let mut png_writer = encoder.write_header().map_err(PngEncodeError::Encoding)?;
    png_writer
        .write_image_data(image.as_raw())
        .map_err(PngEncodeError::Encoding)?;
    png_writer.finish().map_err(PngEncodeError::Encoding)
}

pub fn save_png(
    path: &Path,
    image: &RgbImage,
    metadata: Option<&PngTextMetadata>,
    compress_level: u8,
) -> Result<(), PngEncodeError> {
    // Encoded in memory so a failed encode never leaves a partial file behind.
    let mut bytes = Vec::with_capacity(image.as_raw().len() / 2 + 1024);
    encode_png(&mut bytes, image, metadata, compress_level)?;
    fs::write(path, bytes.as_slice()).map_err(|error| PngEncodeError::WriteFile {
        path: path.display().to_string(),
        message: error.to_string(),
    })
}
