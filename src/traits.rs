use image::{ImageBuffer, Luma, RgbImage};

use crate::errors::Result;
use crate::prompt::Prompt;

/// Mask scores, one `f32` in `[0, 1]` per source pixel.
pub type MaskImage = ImageBuffer<Luma<f32>, Vec<f32>>;

/// Promptable mask predictor.
///
/// The executor depends on this abstraction rather than the ONNX-backed
/// model directly, so tests can run the full pipeline against a mock.
pub trait PromptableModel: Send + Sync {
    /// Predict mask scores at the resolution of `image` for a validated
    /// prompt. `None` means the model yielded nothing for this prompt.
    fn predict(&self, image: &RgbImage, prompt: &Prompt) -> Result<Option<MaskImage>>;
}
