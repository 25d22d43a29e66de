use std::fs;
use std::path::PathBuf;

use anyhow::{bail, Context, Result};
use clap::Parser;
use tracing::info;
use tracing_subscriber::EnvFilter;

use prompt_seg_rs::config::{Algorithm, ModelSize};
use prompt_seg_rs::prompt::{self, PromptKind, PromptSpec};
use prompt_seg_rs::segmentation;

/// Promptable SAM/SAM2 segmentation runner.
#[derive(Parser)]
#[command(name = "segment", version, about, long_about = None)]
struct Args {
    /// Input image path
    #[arg(long)]
    image: PathBuf,

    /// Where to save the resulting PNG
    #[arg(long)]
    output: PathBuf,

    #[arg(long, value_enum, default_value_t = Algorithm::Sam2)]
    algorithm: Algorithm,

    #[arg(long, value_enum, default_value_t = ModelSize::Base)]
    model_size: ModelSize,

    #[arg(long, value_enum, default_value_t = PromptKind::Point)]
    prompt_type: PromptKind,

    /// Base64-encoded JSON array of [x, y] points
    #[arg(long)]
    points_b64: Option<String>,

    /// Base64-encoded JSON array of 0/1 labels, one per point
    #[arg(long)]
    labels_b64: Option<String>,

    /// Base64-encoded JSON array [x1, y1, x2, y2]
    #[arg(long)]
    bbox_b64: Option<String>,
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let args = Args::parse();

    let image_bytes = fs::read(&args.image)
        .with_context(|| format!("Failed to read image: {}", args.image.display()))?;

    let points = prompt::decode_b64_json("points", args.points_b64.as_deref())?;
    let labels = prompt::decode_b64_json("labels", args.labels_b64.as_deref())?;
    let bbox = prompt::decode_b64_json("bbox", args.bbox_b64.as_deref())?;

    if args.prompt_type == PromptKind::Box && bbox.is_none() {
        bail!("box prompts require --bbox-b64");
    }

    let spec = PromptSpec {
        kind: args.prompt_type,
        points,
        labels,
        bbox,
    };

    let png = segmentation::run(args.algorithm, args.model_size, &image_bytes, &spec)?;

    if let Some(parent) = args.output.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create output directory: {}", parent.display()))?;
    }
    fs::write(&args.output, png)
        .with_context(|| format!("Failed to write result: {}", args.output.display()))?;

    info!(
        algorithm = %args.algorithm,
        model_size = %args.model_size,
        prompt_type = %args.prompt_type,
        output = %args.output.display(),
        "segmentation finished"
    );
    Ok(())
}
