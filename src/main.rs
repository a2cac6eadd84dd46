use std::fs;
use std::path::PathBuf;

use save_image_extra::contract::object_info;
use save_image_extra::default_app_root;
use save_image_extra::nodes::combine_extra_data::{combine_extra_data, CombineExtraDataInput};
use save_image_extra::nodes::node_catalog;
use save_image_extra::nodes::save_image_extra::png_encode::MAX_COMPRESS_LEVEL;
use save_image_extra::nodes::save_image_extra::{
    HostContext, SaveImageExtra, SaveImagesRequest, DEFAULT_FILENAME_PREFIX,
};
use save_image_extra::settings_layer::{
    load_app_save_image_settings, merge_save_image_settings_overlays,
    resolve_save_image_settings, SaveImageSettingsOverlay,
};
use serde_json::{Map, Value};
use tracing::level_filters::LevelFilter;
use tracing_subscriber::EnvFilter;

type CliResult<T> = Result<T, Box<dyn std::error::Error>>;

fn main() -> CliResult<()> {
    init_tracing();

    let cli_args = std::env::args().skip(1).collect::<Vec<_>>();
    let rest = cli_args.iter().skip(1).cloned().collect::<Vec<_>>();
    match cli_args.first().map(String::as_str) {
        Some("combine") => run_combine_cli(rest),
        Some("save") => run_save_cli(rest),
        Some("schema") => run_schema_cli(rest),
        Some("-h" | "--help") | None => {
            print_usage();
            Ok(())
        }
        Some(unknown) => Err(std::io::Error::other(format!(
            "Unknown command: {unknown}\n\nUse --help for usage."
        ))
        .into()),
    }
}

fn init_tracing() {
    let env_filter = EnvFilter::builder()
        .with_default_directive(LevelFilter::INFO.into())
        .from_env_lossy();

    let _ = tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_writer(std::io::stderr)
        .try_init();
}

fn wants_help(args: &[String]) -> bool {
    args.iter()
        .any(|arg| matches!(arg.as_str(), "-h" | "--help"))
}

fn unknown_argument(unknown: &str) -> Box<dyn std::error::Error> {
    std::io::Error::other(format!(
        "Unknown argument: {unknown}\n\nUse --help for usage."
    ))
    .into()
}

fn parse_combine_cli_args(args: &[String]) -> CliResult<CombineExtraDataInput> {
    let mut input = CombineExtraDataInput::default();
    let mut i = 0usize;
    while i < args.len() {
        let flag = args[i].as_str();
        let needs_value = |idx: usize| -> CliResult<String> {
            let Some(value) = args.get(idx + 1) else {
                return Err(std::io::Error::other(format!("Missing value for {flag}")).into());
            };
            Ok(value.clone())
        };

        match flag {
            "--model-name" => {
                let raw = needs_value(i)?;
                // JSON when it parses, plain text otherwise.
                input.model_name =
                    Some(serde_json::from_str::<Value>(raw.as_str()).unwrap_or(Value::String(raw)));
                i += 2;
            }
            "--prompt" => {
                input.prompt = Some(needs_value(i)?);
                i += 2;
            }
            "--seed" => {
                input.seed = Some(needs_value(i)?.trim().parse::<i64>()?);
                i += 2;
            }
            "--steps" => {
                input.steps = Some(needs_value(i)?.trim().parse::<i64>()?);
                i += 2;
            }
            "--cfg" => {
                input.cfg = Some(needs_value(i)?.trim().parse::<f64>()?);
                i += 2;
            }
            unknown => return Err(unknown_argument(unknown)),
        }
    }
    Ok(input)
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
struct SaveCliArgs {
    inputs: Vec<PathBuf>,
    filename_prefix: Option<String>,
    extradata: String,
    extra_pnginfo_path: Option<PathBuf>,
    app_root: Option<PathBuf>,
    settings_path: Option<String>,
    overrides: SaveImageSettingsOverlay,
}

fn parse_save_cli_args(args: &[String]) -> CliResult<SaveCliArgs> {
    let mut parsed = SaveCliArgs::default();
    let mut i = 0usize;
    while i < args.len() {
        let flag = args[i].as_str();
        let needs_value = |idx: usize| -> CliResult<String> {
            let Some(value) = args.get(idx + 1) else {
                return Err(std::io::Error::other(format!("Missing value for {flag}")).into());
            };
            Ok(value.clone())
        };

        match flag {
            "--input" => {
                parsed.inputs.push(PathBuf::from(needs_value(i)?));
                i += 2;
            }
            "--filename-prefix" => {
                parsed.filename_prefix = Some(needs_value(i)?);
                i += 2;
            }
            "--extradata" => {
                parsed.extradata = needs_value(i)?;
                i += 2;
            }
            "--extra-pnginfo" => {
                parsed.extra_pnginfo_path = Some(PathBuf::from(needs_value(i)?));
                i += 2;
            }
            "--app-root" => {
                parsed.app_root = Some(PathBuf::from(needs_value(i)?));
                i += 2;
            }
            "--settings" => {
                parsed.settings_path = Some(needs_value(i)?);
                i += 2;
            }
            "--output-dir" => {
                parsed.overrides.output_dir = Some(needs_value(i)?);
                i += 2;
            }
            "--compress-level" => {
                let level = needs_value(i)?.trim().parse::<u8>()?;
                if level > MAX_COMPRESS_LEVEL {
                    return Err(std::io::Error::other(format!(
                        "--compress-level must be between 0 and {MAX_COMPRESS_LEVEL}"
                    ))
                    .into());
                }
                parsed.overrides.compress_level = Some(level);
                i += 2;
            }
            "--disable-metadata" => {
                parsed.overrides.disable_metadata = Some(true);
                i += 1;
            }
            unknown => return Err(unknown_argument(unknown)),
        }
    }

    if parsed.inputs.is_empty() {
        return Err(std::io::Error::other("Missing required --input").into());
    }
    Ok(parsed)
}

fn run_combine_cli(args: Vec<String>) -> CliResult<()> {
    if wants_help(args.as_slice()) {
        print_combine_usage();
        return Ok(());
    }
    let input = parse_combine_cli_args(args.as_slice())?;
    println!("{}", combine_extra_data(&input));
    Ok(())
}

fn run_save_cli(args: Vec<String>) -> CliResult<()> {
    if wants_help(args.as_slice()) {
        print_save_usage();
        return Ok(());
    }
    let parsed = parse_save_cli_args(args.as_slice())?;

    let app_root = parsed.app_root.clone().unwrap_or_else(default_app_root);
    let file_overlay =
        load_app_save_image_settings(app_root.as_path(), parsed.settings_path.as_deref())?;
    let settings = resolve_save_image_settings(
        app_root.as_path(),
        &merge_save_image_settings_overlays(&file_overlay, &parsed.overrides),
    );

    let mut images = Vec::with_capacity(parsed.inputs.len());
    for path in &parsed.inputs {
        let image = image::open(path)
            .map_err(|e| std::io::Error::other(format!("open '{}': {e}", path.display())))?;
        images.push(image.to_rgb32f());
    }

    let extra_pnginfo = match parsed.extra_pnginfo_path.as_deref() {
        Some(path) => {
            let raw = fs::read_to_string(path)?;
            Some(serde_json::from_str::<Map<String, Value>>(raw.as_str())?)
        }
        None => None,
    };

    let node = SaveImageExtra::new(&settings);
    let result = node.save_images(
        &SaveImagesRequest {
            images,
            filename_prefix: parsed
                .filename_prefix
                .unwrap_or_else(|| String::from(DEFAULT_FILENAME_PREFIX)),
            extradata: parsed.extradata,
        },
        &HostContext {
            prompt: None,
            extra_pnginfo,
            disable_metadata: settings.disable_metadata,
        },
    )?;
    println!("{}", serde_json::to_string_pretty(&result)?);
    Ok(())
}

fn run_schema_cli(args: Vec<String>) -> CliResult<()> {
    if wants_help(args.as_slice()) {
        print_schema_usage();
        return Ok(());
    }
    if let Some(unknown) = args.first() {
        return Err(unknown_argument(unknown.as_str()));
    }
    let catalog = node_catalog();
    for schema in &catalog {
        schema.validate()?;
    }
    println!("{}", serde_json::to_string_pretty(&object_info(catalog.as_slice()))?);
    Ok(())
}

fn print_usage() {
    eprintln!(concat!(
        "Usage:\n",
        "  save-image-extra combine [options]   combine generation parameters into JSON\n",
        "  save-image-extra save --input PATH [options]   write PNGs with text metadata\n",
        "  save-image-extra schema   print node definitions\n\n",
        "Use <command> --help for command options.\n"
    ));
}

fn print_combine_usage() {
    eprintln!(concat!(
        "Usage:\n",
        "  save-image-extra combine [--model-name VALUE] [--prompt TEXT] [--seed N] ",
        "[--steps N] [--cfg FLOAT]\n\n",
        "  --model-name accepts JSON; anything that does not parse is taken as text\n"
    ));
}

fn print_save_usage() {
    eprintln!(concat!(
        "Usage:\n",
        "  save-image-extra save --input PATH [--input PATH ...] [--filename-prefix PREFIX] ",
        "[--extradata TEXT] [--extra-pnginfo JSON_FILE] [--app-root PATH] [--settings PATH] ",
        "[--output-dir PATH] [--compress-level 0-9] [--disable-metadata]\n\n",
        "Defaults:\n",
        "  --app-root defaults to $SAVE_IMAGE_EXTRA_APP_ROOT or the working directory\n",
        "  settings default: config/saveimage.settings.toml (fallback: config/saveimage.settings.json)\n",
        "  --filename-prefix defaults to ComfyUI\n"
    ));
}

fn print_schema_usage() {
    eprintln!(concat!("Usage:\n", "  save-image-extra schema\n"));
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn args(values: &[&str]) -> Vec<String> {
        values.iter().map(|v| v.to_string()).collect()
    }

    #[test]
    fn parse_combine_accepts_all_parameters() {
        let parsed = parse_combine_cli_args(&args(&[
            "--model-name",
            "sd15.ckpt",
            "--prompt",
            "harbor at dawn",
            "--seed",
            "99",
            "--steps",
            "25",
            "--cfg",
            "6.5",
        ]))
        .expect("parse should succeed");

        assert_eq!(parsed.model_name, Some(json!("sd15.ckpt")));
        assert_eq!(parsed.prompt.as_deref(), Some("harbor at dawn"));
        assert_eq!(parsed.seed, Some(99));
        assert_eq!(parsed.steps, Some(25));
        assert_eq!(parsed.cfg, Some(6.5));
    }

    #[test]
    fn parse_combine_reads_json_model_name() {
        let parsed = parse_combine_cli_args(&args(&["--model-name", r#"{"id": 3}"#]))
            .expect("parse should succeed");
        assert_eq!(parsed.model_name, Some(json!({"id": 3})));
    }

    #[test]
    fn parse_combine_rejects_bad_numbers_and_unknown_flags() {
        assert!(parse_combine_cli_args(&args(&["--seed", "abc"])).is_err());
        let err = parse_combine_cli_args(&args(&["--sampler", "euler"]))
            .expect_err("unknown flag should fail");
        assert!(err.to_string().contains("--sampler"));
        let err = parse_combine_cli_args(&args(&["--steps"])).expect_err("value required");
        assert!(err.to_string().contains("Missing value for --steps"));
    }

    #[test]
    fn parse_save_requires_input() {
        let err = parse_save_cli_args(&[]).expect_err("input should be required");
        assert!(err.to_string().contains("--input"));
    }

    #[test]
    fn parse_save_collects_inputs_and_overrides() {
        let parsed = parse_save_cli_args(&args(&[
            "--input",
            "a.png",
            "--input",
            "b.png",
            "--filename-prefix",
            "renders/%batch_num%",
            "--extradata",
            r#"{"seed": 1}"#,
            "--output-dir",
            "/tmp/out",
            "--compress-level",
            "9",
            "--disable-metadata",
        ]))
        .expect("parse should succeed");

        assert_eq!(
            parsed.inputs,
            vec![PathBuf::from("a.png"), PathBuf::from("b.png")]
        );
        assert_eq!(parsed.filename_prefix.as_deref(), Some("renders/%batch_num%"));
        assert_eq!(parsed.extradata, r#"{"seed": 1}"#);
        assert_eq!(parsed.overrides.output_dir.as_deref(), Some("/tmp/out"));
        assert_eq!(parsed.overrides.compress_level, Some(9));
        assert_eq!(parsed.overrides.disable_metadata, Some(true));
    }

    #[test]
    fn parse_save_rejects_out_of_range_compress_level() {
        let err = parse_save_cli_args(&args(&["--input", "a.png", "--compress-level", "12"]))
            .expect_err("level above 9 should fail");
        assert!(err.to_string().contains("between 0 and 9"));
    }
}
