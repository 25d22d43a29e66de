use image::{Luma, RgbImage};
use parking_lot::Mutex;

use crate::errors::Result;
use crate::prompt::Prompt;
use crate::traits::{MaskImage, PromptableModel};

/// Mock predictor for tests. Scores a fixed rectangle at 1.0 (everything
/// else 0.0), or yields nothing at all, and records every prompt it saw.
#[derive(Debug, Default)]
pub struct MockPromptModel {
    region: Option<[u32; 4]>,
    recorded: Mutex<Vec<Prompt>>,
}

impl MockPromptModel {
    /// Responds with a `[x, y, w, h]` rectangle of foreground scores.
    pub fn with_region(x: u32, y: u32, w: u32, h: u32) -> Self {
        Self {
            region: Some([x, y, w, h]),
            recorded: Mutex::new(Vec::new()),
        }
    }

    /// Responds with `None`, as a model that found nothing would.
    pub fn without_result() -> Self {
        Self::default()
    }

    pub fn recorded_prompts(&self) -> Vec<Prompt> {
        self.recorded.lock().clone()
    }
}

impl PromptableModel for MockPromptModel {
    fn predict(&self, image: &RgbImage, prompt: &Prompt) -> Result<Option<MaskImage>> {
        self.recorded.lock().push(prompt.clone());

        let Some([rx, ry, rw, rh]) = self.region else {
            return Ok(None);
        };

        let (width, height) = image.dimensions();
        let mut scores = MaskImage::from_pixel(width, height, Luma([0.0]));
        for y in ry..(ry + rh).min(height) {
            for x in rx..(rx + rw).min(width) {
                scores.put_pixel(x, y, Luma([1.0]));
            }
        }
        Ok(Some(scores))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn region_mock_scores_inside_and_outside() {
        let mock = MockPromptModel::with_region(2, 2, 3, 3);
        let image = RgbImage::from_pixel(8, 8, image::Rgb([10, 20, 30]));
        let prompt = Prompt::Points {
            points: vec![[3.0, 3.0]],
            labels: vec![1],
        };

        let scores = mock.predict(&image, &prompt).unwrap().unwrap();
        assert_eq!(scores.get_pixel(3, 3)[0], 1.0);
        assert_eq!(scores.get_pixel(0, 0)[0], 0.0);
        assert_eq!(mock.recorded_prompts(), vec![prompt]);
    }

    #[test]
    fn empty_mock_yields_nothing() {
        let mock = MockPromptModel::without_result();
        let image = RgbImage::new(4, 4);
        let prompt = Prompt::Points {
            points: vec![[1.0, 1.0]],
            labels: vec![1],
        };
        assert!(mock.predict(&image, &prompt).unwrap().is_none());
    }
}
