use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::json_text::to_host_json_string;

/// Optional generation parameters wired into the combine node. Field order is
/// the key order of the combined JSON object.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CombineExtraDataInput {
    #[serde(default, skip_serializing_if = "model_name_absent")]
    pub model_name: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub prompt: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub seed: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub steps: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cfg: Option<f64>,
}

impl CombineExtraDataInput {
    pub fn present_keys(&self) -> Vec<&'static str> {
        let mut keys = Vec::with_capacity(5);
        if !model_name_absent(&self.model_name) {
            keys.push("model_name");
        }
        if self.prompt.is_some() {
            keys.push("prompt");
        }
        if self.seed.is_some() {
            keys.push("seed");
        }
        if self.steps.is_some() {
            keys.push("steps");
        }
        if self.cfg.is_some() {
            keys.push("cfg");
        }
        keys
    }
}

// A wired `*` input can still carry null, which counts as unset.
fn model_name_absent(value: &Option<Value>) -> bool {
    matches!(value, None | Some(Value::Null))
}

/// Encodes the present parameters as one JSON object string. Absent
/// parameters are left out entirely; non-ASCII text is kept as is.
pub fn combine_extra_data(input: &CombineExtraDataInput) -> String {
    match to_host_json_string(input, false) {
        Ok(text) => text,
        Err(error) => {
            // Not expected: every field type here serializes into an in-memory buffer.
            tracing::error!(%error, "combine extra data serialization failed");
            String::from("{}")
        }
    }
}
