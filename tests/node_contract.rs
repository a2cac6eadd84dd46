use pretty_assertions::assert_eq;
use serde_json::json;

use save_image_extra::contract::object_info;
use save_image_extra::nodes::{
    node_catalog, COMBINE_EXTRA_DATA_CLASS, SAVE_IMAGE_EXTRA_CLASS,
};

#[test]
fn catalog_registers_both_nodes_in_order() {
    let classes: Vec<String> = node_catalog()
        .into_iter()
        .map(|schema| schema.class_type)
        .collect();
    assert_eq!(
        classes,
        vec![
            String::from(COMBINE_EXTRA_DATA_CLASS),
            String::from(SAVE_IMAGE_EXTRA_CLASS)
        ]
    );
}

#[test]
fn combine_node_object_info_matches_host_shape() {
    let info = object_info(&node_catalog());
    assert_eq!(
        info[COMBINE_EXTRA_DATA_CLASS],
        json!({
            "input": {
                "optional": {
                    "model_name": ["*", {}],
                    "prompt": ["STRING", {"forceInput": true}],
                    "seed": ["INT", {"forceInput": true}],
                    "steps": ["INT", {"forceInput": true}],
                    "cfg": ["FLOAT", {"forceInput": true}]
                }
            },
            "output": ["STRING"],
            "name": "CombineExtraDataNode",
            "display_name": "Combine Extra Data",
            "description": "Combine parameters into a JSON string",
            "category": "image",
            "function": "combine",
            "output_node": false,
            "search_aliases": []
        })
    );
}

#[test]
fn save_node_is_an_output_node_with_hidden_host_inputs() {
    let info = object_info(&node_catalog());
    let save = &info[SAVE_IMAGE_EXTRA_CLASS];

    assert_eq!(save["output_node"], json!(true));
    assert_eq!(save["output"], json!([]));
    assert_eq!(save["function"], json!("save_images"));
    assert_eq!(
        save["input"]["hidden"],
        json!({"prompt": "PROMPT", "extra_pnginfo": "EXTRA_PNGINFO"})
    );
    assert_eq!(
        save["input"]["required"]["filename_prefix"][1]["default"],
        json!("ComfyUI")
    );
    assert_eq!(
        save["input"]["required"]["extradata"],
        json!(["STRING", {"forceInput": true}])
    );
    assert_eq!(
        save["input"]["required"]["images"],
        json!(["IMAGE", {"tooltip": "The images to save."}])
    );
    assert!(save["search_aliases"]
        .as_array()
        .expect("aliases should be an array")
        .contains(&json!("save image")));
}
