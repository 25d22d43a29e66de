use std::fs;
use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use tracing::info;
use tracing_subscriber::EnvFilter;

use prompt_seg_rs::filters::{self, FilterMode};

/// Grayscale preprocessing runner.
#[derive(Parser)]
#[command(name = "preprocess", version, about, long_about = None)]
struct Args {
    /// Input image path
    #[arg(long)]
    image: PathBuf,

    /// Output image path; the format follows the extension
    #[arg(long)]
    output: PathBuf,

    /// Filter applied after grayscale conversion
    #[arg(long, value_enum, default_value_t = FilterMode::Standard)]
    mode: FilterMode,
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let args = Args::parse();

    let image = image::open(&args.image)
        .with_context(|| format!("Failed to open image: {}", args.image.display()))?;

    let processed = filters::apply_mode(&image, args.mode);

    if let Some(parent) = args.output.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create output directory: {}", parent.display()))?;
    }
    processed
        .save(&args.output)
        .with_context(|| format!("Failed to save image: {}", args.output.display()))?;

    info!(mode = %args.mode, output = %args.output.display(), "preprocessing finished");
    Ok(())
}
