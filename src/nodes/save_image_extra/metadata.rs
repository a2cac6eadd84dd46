use serde::Serialize;
use serde_json::{Map, Value};

use super::png_encode::{is_valid_keyword, MAX_KEYWORD_LEN};
use crate::nodes::json_text::value_to_host_json;

/// Key used when the extra-data string is not a JSON object.
pub const RAW_EXTRADATA_KEY: &str = "extradata";

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PngTextEntry {
    pub key: String,
    pub text: String,
}

/// Ordered text entries written as one PNG text chunk each. Entries are kept
/// in insertion order; duplicate keys are written as separate chunks.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct PngTextMetadata {
    entries: Vec<PngTextEntry>,
}

impl PngTextMetadata {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_text(&mut self, key: impl Into<String>, text: impl Into<String>) {
        self.entries.push(PngTextEntry {
            key: key.into(),
            text: text.into(),
        });
    }

    pub fn entries(&self) -> &[PngTextEntry] {
        self.entries.as_slice()
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.entries
            .iter()
            .find(|entry| entry.key == key)
            .map(|entry| entry.text.as_str())
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// How the extra-data string ended up in the metadata.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExtraDataDisposition {
    Blank,
    ObjectFields(usize),
    RawNonObject,
    RawInvalidJson,
}

pub fn build_png_text_metadata(
    extra_pnginfo: Option<&Map<String, Value>>,
    extradata: &str,
) -> PngTextMetadata {
    let mut metadata = PngTextMetadata::new();
    if let Some(info) = extra_pnginfo {
        for (key, value) in info {
            if !is_valid_keyword(key.as_str()) {
                warn_skipped_key(key.as_str(), "extra_pnginfo");
                continue;
            }
            metadata.add_text(key.as_str(), value_to_host_json(value, true));
        }
    }
    let disposition = append_extradata(&mut metadata, extradata);
    match disposition {
        ExtraDataDisposition::RawInvalidJson => {
            tracing::warn!(
                chars = extradata.chars().count(),
                "extra data is not valid JSON; stored under '{RAW_EXTRADATA_KEY}'"
            );
        }
        ExtraDataDisposition::RawNonObject => {
            tracing::debug!("extra data JSON is not an object; stored under '{RAW_EXTRADATA_KEY}'");
        }
        ExtraDataDisposition::Blank | ExtraDataDisposition::ObjectFields(_) => {}
    }
    metadata
}

pub fn append_extradata(metadata: &mut PngTextMetadata, extradata: &str) -> ExtraDataDisposition {
    if extradata.trim().is_empty() {
        return ExtraDataDisposition::Blank;
    }
    match serde_json::from_str::<Value>(extradata) {
        Ok(Value::Object(fields)) => {
            let mut count = 0;
            for (key, value) in fields {
                if !is_valid_keyword(key.as_str()) {
                    warn_skipped_key(key.as_str(), "extra data");
                    continue;
                }
                let text = match value {
                    Value::String(text) => text,
                    other => value_to_host_json(&other, false),
                };
                metadata.add_text(key, text);
                count += 1;
            }
            ExtraDataDisposition::ObjectFields(count)
        }
        Ok(_) => {
            metadata.add_text(RAW_EXTRADATA_KEY, extradata);
            ExtraDataDisposition::RawNonObject
        }
        Err(_) => {
            metadata.add_text(RAW_EXTRADATA_KEY, extradata);
            ExtraDataDisposition::RawInvalidJson
        }
    }
}

fn warn_skipped_key(key: &str, source: &str) {
    tracing::warn!(
        key_bytes = key.len(),
        "{source} key is not a PNG text keyword (1 to {MAX_KEYWORD_LEN} Latin-1 bytes); entry skipped"
    );
}
