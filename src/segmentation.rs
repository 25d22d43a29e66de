use std::io::Cursor;

use image::{GrayImage, ImageFormat, Luma, Rgb, RgbImage};

use crate::config::{Algorithm, ModelSize};
use crate::errors::{PromptSegError, Result};
use crate::model;
use crate::prompt::PromptSpec;
use crate::traits::{MaskImage, PromptableModel};

/// Score above which a pixel counts as foreground.
pub const MASK_THRESHOLD: f32 = 0.5;

/// Resolve the cached model for `(algorithm, size)` and segment `image_bytes`
/// with it.
pub fn run(
    algorithm: Algorithm,
    size: ModelSize,
    image_bytes: &[u8],
    prompt: &PromptSpec,
) -> Result<Vec<u8>> {
    let model = model::cached_model(algorithm, size)?;
    segment_image(model.as_ref(), image_bytes, prompt)
}

/// Run one inference against `model` and turn its mask into a cropped,
/// background-blacked PNG.
pub fn segment_image<M: PromptableModel>(
    model: &M,
    image_bytes: &[u8],
    prompt: &PromptSpec,
) -> Result<Vec<u8>> {
    let decoded = image::load_from_memory(image_bytes).map_err(|e| PromptSegError::Image {
        operation: "decoding input image".to_string(),
        source: Box::new(e),
    })?;
    let rgb = decoded.to_rgb8();
    let (width, height) = rgb.dimensions();

    let prompt = prompt.resolve(width, height)?;
    let scores = model
        .predict(&rgb, &prompt)?
        .ok_or(PromptSegError::EmptyResult)?;
    if scores.dimensions() != rgb.dimensions() {
        return Err(PromptSegError::Image {
            operation: "applying mask".to_string(),
            source: format!(
                "mask dimensions {:?} do not match image dimensions {:?}",
                scores.dimensions(),
                rgb.dimensions()
            )
            .into(),
        });
    }

    let mask = threshold_mask(&scores, MASK_THRESHOLD);
    let blacked = black_out_background(&rgb, &mask);
    let result = match mask_bounds(&mask) {
        Some([x, y, w, h]) => image::imageops::crop_imm(&blacked, x, y, w, h).to_image(),
        // An all-background mask leaves the full blacked image.
        None => blacked,
    };

    encode_png(&result)
}

fn threshold_mask(scores: &MaskImage, threshold: f32) -> GrayImage {
    let mut mask = GrayImage::new(scores.width(), scores.height());
    for (x, y, px) in mask.enumerate_pixels_mut() {
        *px = Luma([if scores.get_pixel(x, y)[0] > threshold {
            255
        } else {
            0
        }]);
    }
    mask
}

fn black_out_background(image: &RgbImage, mask: &GrayImage) -> RgbImage {
    let mut out = image.clone();
    for (x, y, px) in out.enumerate_pixels_mut() {
        if mask.get_pixel(x, y)[0] == 0 {
            *px = Rgb([0, 0, 0]);
        }
    }
    out
}

/// Tight `[x, y, w, h]` rectangle around the foreground, `None` when the
/// mask is empty.
fn mask_bounds(mask: &GrayImage) -> Option<[u32; 4]> {
    let mut bounds: Option<[u32; 4]> = None;
    for (x, y, px) in mask.enumerate_pixels() {
        if px[0] != 0 {
            match &mut bounds {
                Some([x0, y0, x1, y1]) => {
                    *x0 = (*x0).min(x);
                    *y0 = (*y0).min(y);
                    *x1 = (*x1).max(x);
                    *y1 = (*y1).max(y);
                }
                None => bounds = Some([x, y, x, y]),
            }
        }
    }
    bounds.map(|[x0, y0, x1, y1]| [x0, y0, x1 - x0 + 1, y1 - y0 + 1])
}

fn encode_png(image: &RgbImage) -> Result<Vec<u8>> {
    let mut buffer = Cursor::new(Vec::new());
    image
        .write_to(&mut buffer, ImageFormat::Png)
        .map_err(|e| PromptSegError::Image {
            operation: "encoding result as PNG".to_string(),
            source: Box::new(e),
        })?;
    Ok(buffer.into_inner())
}
