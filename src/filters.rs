use std::fmt;
use std::str::FromStr;

use clap::ValueEnum;
use image::{DynamicImage, GrayImage, Luma, Rgb, RgbImage, Rgba, RgbaImage};
use imageproc::filter::gaussian_blur_f32;

use crate::errors::{PromptSegError, Result};

/// Relative multiplier of the average per-bin count at which tile histograms
/// are clipped.
pub const CLAHE_CLIP_LIMIT: f64 = 2.0;
pub const CLAHE_TILE_GRID: usize = 8;

pub const ADAPTIVE_BLOCK_SIZE: u32 = 11;
pub const ADAPTIVE_OFFSET: f32 = 2.0;

pub const BLUR_KERNEL_SIZE: u32 = 5;

/// Grayscale filter applied by the preprocessing runner.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum FilterMode {
    /// Grayscale conversion only.
    Standard,
    /// Contrast-limited adaptive histogram equalization.
    Clahe,
    /// Adaptive Gaussian thresholding, binary output.
    Adaptive,
    /// Gaussian blur.
    Gaussian,
}

impl fmt::Display for FilterMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Standard => "standard",
            Self::Clahe => "clahe",
            Self::Adaptive => "adaptive",
            Self::Gaussian => "gaussian",
        })
    }
}

impl FromStr for FilterMode {
    type Err = PromptSegError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "standard" => Ok(Self::Standard),
            "clahe" => Ok(Self::Clahe),
            "adaptive" => Ok(Self::Adaptive),
            "gaussian" => Ok(Self::Gaussian),
            _ => Err(PromptSegError::InvalidArgument {
                arg: "mode",
                value: s.to_string(),
            }),
        }
    }
}

/// Run the selected filter over the grayscale plane of `image` and re-expand
/// the result to three channels. An alpha channel is split off before
/// filtering and reattached unchanged afterwards.
pub fn apply_mode(image: &DynamicImage, mode: FilterMode) -> DynamicImage {
    let (rgb, alpha) = split_alpha(image);
    let gray = DynamicImage::ImageRgb8(rgb).to_luma8();

    let filtered = match mode {
        FilterMode::Standard => gray,
        FilterMode::Clahe => clahe(&gray, CLAHE_CLIP_LIMIT, CLAHE_TILE_GRID),
        FilterMode::Adaptive => adaptive_threshold(&gray, ADAPTIVE_BLOCK_SIZE, ADAPTIVE_OFFSET),
        FilterMode::Gaussian => gaussian_blur_f32(&gray, sigma_for_kernel(BLUR_KERNEL_SIZE)),
    };

    expand_channels(&filtered, alpha)
}

fn split_alpha(image: &DynamicImage) -> (RgbImage, Option<GrayImage>) {
    if !image.color().has_alpha() {
        return (image.to_rgb8(), None);
    }

    let rgba = image.to_rgba8();
    let mut rgb = RgbImage::new(rgba.width(), rgba.height());
    let mut alpha = GrayImage::new(rgba.width(), rgba.height());
    for (x, y, px) in rgba.enumerate_pixels() {
        let Rgba([r, g, b, a]) = *px;
        rgb.put_pixel(x, y, Rgb([r, g, b]));
        alpha.put_pixel(x, y, Luma([a]));
    }
    (rgb, Some(alpha))
}

fn expand_channels(gray: &GrayImage, alpha: Option<GrayImage>) -> DynamicImage {
    match alpha {
        Some(alpha) => {
            let mut out = RgbaImage::new(gray.width(), gray.height());
            for (x, y, px) in out.enumerate_pixels_mut() {
                let v = gray.get_pixel(x, y)[0];
                let a = alpha.get_pixel(x, y)[0];
                *px = Rgba([v, v, v, a]);
            }
            DynamicImage::ImageRgba8(out)
        }
        None => {
            let mut out = RgbImage::new(gray.width(), gray.height());
            for (x, y, px) in out.enumerate_pixels_mut() {
                let v = gray.get_pixel(x, y)[0];
                *px = Rgb([v, v, v]);
            }
            DynamicImage::ImageRgb8(out)
        }
    }
}

/// Contrast-limited adaptive histogram equalization over a `grid` x `grid`
/// tiling. Per-tile histograms are clipped at `clip_limit` times the average
/// bin count, the excess redistributed uniformly, and each output pixel
/// sampled by bilinear interpolation between the four neighboring tile CDFs.
pub fn clahe(gray: &GrayImage, clip_limit: f64, grid: usize) -> GrayImage {
    const BINS: usize = 256;

    let (width, height) = gray.dimensions();
    let (cols, rows) = (width as usize, height as usize);
    if cols == 0 || rows == 0 || grid == 0 {
        return gray.clone();
    }

    let tile_w = cols.div_ceil(grid);
    let tile_h = rows.div_ceil(grid);

    let mut cdfs = vec![vec![0.0f64; BINS]; grid * grid];
    for ty in 0..grid {
        let r0 = ty * tile_h;
        let r1 = ((ty + 1) * tile_h).min(rows);
        for tx in 0..grid {
            let c0 = tx * tile_w;
            let c1 = ((tx + 1) * tile_w).min(cols);

            let mut hist = [0u32; BINS];
            for r in r0..r1 {
                for c in c0..c1 {
                    hist[gray.get_pixel(c as u32, r as u32)[0] as usize] += 1;
                }
            }

            let tile_pixels = ((r1.saturating_sub(r0)) * (c1.saturating_sub(c0))) as f64;
            let clip_threshold = (clip_limit * tile_pixels / BINS as f64).max(1.0);
            let mut clipped = [0.0f64; BINS];
            let mut excess = 0.0;
            for (slot, &count) in clipped.iter_mut().zip(hist.iter()) {
                let count = f64::from(count);
                if count > clip_threshold {
                    excess += count - clip_threshold;
                    *slot = clip_threshold;
                } else {
                    *slot = count;
                }
            }
            let add_per_bin = excess / BINS as f64;
            for slot in &mut clipped {
                *slot += add_per_bin;
            }

            let total: f64 = clipped.iter().sum::<f64>().max(1.0);
            let cdf = &mut cdfs[ty * grid + tx];
            let mut acc = 0.0;
            for (slot, &count) in cdf.iter_mut().zip(clipped.iter()) {
                acc += count;
                *slot = acc / total;
            }
        }
    }

    let mut out = GrayImage::new(width, height);
    for (x, y, px) in out.enumerate_pixels_mut() {
        let rf = f64::from(y) / tile_h as f64 - 0.5;
        let cf = f64::from(x) / tile_w as f64 - 0.5;
        let ty = rf.floor() as isize;
        let tx = cf.floor() as isize;
        let dy = rf - ty as f64;
        let dx = cf - tx as f64;

        let ty0 = ty.clamp(0, grid as isize - 1) as usize;
        let tx0 = tx.clamp(0, grid as isize - 1) as usize;
        let ty1 = (ty + 1).clamp(0, grid as isize - 1) as usize;
        let tx1 = (tx + 1).clamp(0, grid as isize - 1) as usize;

        let bin = gray.get_pixel(x, y)[0] as usize;
        let top = cdfs[ty0 * grid + tx0][bin] * (1.0 - dx) + cdfs[ty0 * grid + tx1][bin] * dx;
        let bottom = cdfs[ty1 * grid + tx0][bin] * (1.0 - dx) + cdfs[ty1 * grid + tx1][bin] * dx;
        let value = (top * (1.0 - dy) + bottom * dy).clamp(0.0, 1.0);
        *px = Luma([(value * 255.0).round() as u8]);
    }
    out
}

/// Adaptive thresholding against a Gaussian-weighted local mean: a pixel
/// becomes white when it exceeds the blurred neighborhood value minus
/// `offset`.
pub fn adaptive_threshold(gray: &GrayImage, block_size: u32, offset: f32) -> GrayImage {
    let local_mean = gaussian_blur_f32(gray, sigma_for_kernel(block_size));

    let mut out = GrayImage::new(gray.width(), gray.height());
    for (x, y, px) in out.enumerate_pixels_mut() {
        let value = f32::from(gray.get_pixel(x, y)[0]);
        let threshold = f32::from(local_mean.get_pixel(x, y)[0]) - offset;
        *px = Luma([if value > threshold { 255 } else { 0 }]);
    }
    out
}

// Standard kernel-width to sigma rule, so block sizes keep their usual meaning.
fn sigma_for_kernel(kernel_size: u32) -> f32 {
    0.3 * ((kernel_size as f32 - 1.0) * 0.5 - 1.0) + 0.8
}

#[cfg(test)]
mod tests {
    use super::*;

    fn gradient_rgb(width: u32, height: u32) -> DynamicImage {
        let mut img = RgbImage::new(width, height);
        for (x, y, px) in img.enumerate_pixels_mut() {
            let v = ((x + y) % 256) as u8;
            *px = Rgb([v, v / 2, 255 - v]);
        }
        DynamicImage::ImageRgb8(img)
    }

    #[test]
    fn unknown_mode_is_rejected_by_name() {
        let err = "sobel".parse::<FilterMode>().unwrap_err();
        assert!(err.to_string().contains("sobel"));
    }

    #[test]
    fn rgb_input_yields_three_channels() {
        let img = gradient_rgb(64, 48);
        for mode in [
            FilterMode::Standard,
            FilterMode::Clahe,
            FilterMode::Adaptive,
            FilterMode::Gaussian,
        ] {
            let out = apply_mode(&img, mode);
            assert_eq!(out.color().channel_count(), 3, "mode {mode}");
            assert_eq!(out.width(), 64);
            assert_eq!(out.height(), 48);
        }
    }

    #[test]
    fn alpha_is_preserved_unchanged() {
        let mut img = RgbaImage::new(32, 32);
        for (x, y, px) in img.enumerate_pixels_mut() {
            *px = Rgba([(x * 8) as u8, (y * 8) as u8, 128, (x * 4 + y) as u8]);
        }
        let out = apply_mode(&DynamicImage::ImageRgba8(img.clone()), FilterMode::Clahe);
        assert_eq!(out.color().channel_count(), 4);

        let out = out.to_rgba8();
        for (x, y, px) in img.enumerate_pixels() {
            assert_eq!(out.get_pixel(x, y)[3], px[3]);
        }
    }

    #[test]
    fn clahe_differs_from_standard_on_nonuniform_input() {
        let img = gradient_rgb(128, 128);
        let plain = apply_mode(&img, FilterMode::Standard).to_rgb8();
        let equalized = apply_mode(&img, FilterMode::Clahe).to_rgb8();
        assert!(plain.pixels().zip(equalized.pixels()).any(|(a, b)| a != b));
    }

    #[test]
    fn clahe_keeps_uniform_input_dimensions() {
        let img = DynamicImage::ImageRgb8(RgbImage::from_pixel(50, 30, Rgb([90, 90, 90])));
        let out = apply_mode(&img, FilterMode::Clahe);
        assert_eq!((out.width(), out.height()), (50, 30));
    }

    #[test]
    fn adaptive_output_is_binary() {
        let img = gradient_rgb(64, 64);
        let out = apply_mode(&img, FilterMode::Adaptive).to_rgb8();
        assert!(out.pixels().all(|px| px[0] == 0 || px[0] == 255));
    }

    #[test]
    fn gaussian_smooths_without_resizing() {
        let img = gradient_rgb(40, 20);
        let out = apply_mode(&img, FilterMode::Gaussian);
        assert_eq!((out.width(), out.height()), (40, 20));
    }
}
