pub mod combine_extra_data;
pub mod json_text;
pub mod save_image_extra;

use serde_json::json;

use crate::contract::{InputOptions, InputSection, InputSpec, IoType, NodeSchema};

pub const COMBINE_EXTRA_DATA_CLASS: &str = "CombineExtraDataNode";
pub const SAVE_IMAGE_EXTRA_CLASS: &str = "SaveImageExtraNode";

const FILENAME_PREFIX_TOOLTIP: &str = "The prefix for the file to save. This may include formatting information such as %date:yyyy-MM-dd% or %Empty Latent Image.width% to include values from nodes.";

pub fn combine_extra_data_schema() -> NodeSchema {
    let optional = |name: &str, io_type: IoType, options: InputOptions| {
        InputSpec::new(InputSection::Optional, name, io_type, options)
    };
    NodeSchema {
        class_type: String::from(COMBINE_EXTRA_DATA_CLASS),
        display_name: String::from("Combine Extra Data"),
        description: String::from("Combine parameters into a JSON string"),
        category: String::from("image"),
        function: String::from("combine"),
        output_node: false,
        return_types: vec![IoType::String],
        search_aliases: Vec::new(),
        inputs: vec![
            optional("model_name", IoType::Any, InputOptions::default()),
            optional("prompt", IoType::String, InputOptions::force_input()),
            optional("seed", IoType::Int, InputOptions::force_input()),
            optional("steps", IoType::Int, InputOptions::force_input()),
            optional("cfg", IoType::Float, InputOptions::force_input()),
        ],
    }
}

pub fn save_image_extra_schema() -> NodeSchema {
    NodeSchema {
        class_type: String::from(SAVE_IMAGE_EXTRA_CLASS),
        display_name: String::from("Save Image Extra"),
        description: String::from(
            "Saves the input images with PNG metadata to your ComfyUI output directory",
        ),
        category: String::from("image"),
        function: String::from("save_images"),
        output_node: true,
        return_types: Vec::new(),
        search_aliases: [
            "save",
            "save image",
            "export image",
            "output image",
            "write image",
            "download",
        ]
        .into_iter()
        .map(String::from)
        .collect(),
        inputs: vec![
            InputSpec::new(
                InputSection::Required,
                "images",
                IoType::Image,
                InputOptions {
                    tooltip: Some(String::from("The images to save.")),
                    ..InputOptions::default()
                },
            ),
            InputSpec::new(
                InputSection::Required,
                "filename_prefix",
                IoType::String,
                InputOptions {
                    default: Some(json!(save_image_extra::DEFAULT_FILENAME_PREFIX)),
                    tooltip: Some(String::from(FILENAME_PREFIX_TOOLTIP)),
                    force_input: false,
                },
            ),
            InputSpec::new(
                InputSection::Required,
                "extradata",
                IoType::String,
                InputOptions::force_input(),
            ),
            InputSpec::hidden("prompt", IoType::Prompt),
            InputSpec::hidden("extra_pnginfo", IoType::ExtraPngInfo),
        ],
    }
}

/// Every node this crate registers with the host, in registration order.
pub fn node_catalog() -> Vec<NodeSchema> {
    vec![combine_extra_data_schema(), save_image_extra_schema()]
}

pub fn display_name_for(class_type: &str) -> Option<String> {
    node_catalog()
        .into_iter()
        .find(|schema| schema.class_type == class_type)
        .map(|schema| schema.display_name)
}
