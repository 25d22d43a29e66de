use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;

use image::{imageops, imageops::FilterType, RgbImage};
use ndarray::prelude::*;
use nshare::AsNdarray3;
use once_cell::sync::Lazy;
use ort::value::TensorRef;
use ort::{
    execution_providers::{CUDAExecutionProvider, TensorRTExecutionProvider},
    session::{builder::SessionBuilder, Session},
};
use parking_lot::Mutex;
use tracing::debug;

use crate::config::{self, Algorithm, ModelSize};
use crate::errors::{PromptSegError, Result};
use crate::prompt::Prompt;
use crate::traits::{MaskImage, PromptableModel};

/// Normalization constants the SAM image encoders expect.
pub const IMAGE_MEAN: [f32; 3] = [0.485, 0.456, 0.406];
pub const IMAGE_STD: [f32; 3] = [0.229, 0.224, 0.225];

/// Fallback when the export declares a dynamic spatial dimension.
pub const DEFAULT_INPUT_SIZE: u32 = 1024;

/// A SAM/SAM2 export loaded into an ONNX Runtime session.
///
/// The graph takes `image` `[1,3,S,S]`, `point_coords` `[1,N,2]` and
/// `point_labels` `[1,N]`, and yields `masks` `[1,M,S,S]` sigmoid scores
/// with `iou_predictions` `[1,M]`. `run` needs `&mut Session`, hence the
/// mutex; each process still serves exactly one request on one thread.
pub struct SamModel {
    input_size: u32,
    session: Mutex<Session>,
}

impl SamModel {
    pub fn load(weights: &Path) -> Result<Self> {
        let builder =
            SessionBuilder::new().map_err(|e| PromptSegError::Unavailable(e.to_string()))?;
        Self::from_builder(builder, weights)
    }

    pub fn from_builder(builder: SessionBuilder, weights: &Path) -> Result<Self> {
        let session = builder
            .with_execution_providers([
                TensorRTExecutionProvider::default().build(),
                CUDAExecutionProvider::default().build(),
            ])
            .map_err(|e| PromptSegError::Model {
                operation: "execution provider registration".to_string(),
                source: Box::new(e),
            })?
            .with_memory_pattern(true)
            .map_err(|e| PromptSegError::Model {
                operation: "memory pattern configuration".to_string(),
                source: Box::new(e),
            })?
            .commit_from_file(weights)
            .map_err(|e| PromptSegError::Model {
                operation: format!("loading weights from {}", weights.display()),
                source: Box::new(e),
            })?;

        let input_size = session.inputs[0]
            .input_type
            .tensor_shape()
            .and_then(|shape| shape.get(2).copied())
            .filter(|&dim| dim > 0)
            .map_or(DEFAULT_INPUT_SIZE, |dim| dim as u32);

        debug!(input_size, weights = %weights.display(), "session ready");
        Ok(Self {
            input_size,
            session: Mutex::new(session),
        })
    }

    pub const fn input_size(&self) -> u32 {
        self.input_size
    }
}

impl PromptableModel for SamModel {
    fn predict(&self, image: &RgbImage, prompt: &Prompt) -> Result<Option<MaskImage>> {
        let (width, height) = image.dimensions();
        let (tensor, scaled) = image_tensor(image, self.input_size);
        let scale = self.input_size as f32 / width.max(height) as f32;
        let (coords, labels) = encode_prompt(prompt, scale);

        let mut session = self.session.lock();
        let outputs = session.run(ort::inputs![
            "image" => TensorRef::from_array_view(&tensor)?,
            "point_coords" => TensorRef::from_array_view(&coords)?,
            "point_labels" => TensorRef::from_array_view(&labels)?,
        ])?;

        let Some(value) = outputs.get("masks") else {
            return Ok(None);
        };
        let masks = value
            .try_extract_array::<f32>()?
            .into_dimensionality::<Ix4>()?;
        let candidates = masks.shape()[1];
        if candidates == 0 {
            return Ok(None);
        }

        let best = outputs
            .get("iou_predictions")
            .and_then(|v| v.try_extract_array::<f32>().ok())
            .and_then(|scores| {
                scores
                    .iter()
                    .enumerate()
                    .max_by(|a, b| a.1.total_cmp(b.1))
                    .map(|(i, _)| i)
            })
            .unwrap_or(0)
            .min(candidates - 1);

        let mask = masks.slice(s![0, best, .., ..]);
        Ok(Some(postprocess_mask(
            mask,
            self.input_size,
            scaled,
            width,
            height,
        )))
    }
}

/// Resize the longest side to `input_size` (keeping aspect), pad the bottom
/// and right with zeros, and normalize into a `[1,3,S,S]` tensor.
pub fn image_tensor(image: &RgbImage, input_size: u32) -> (Array4<f32>, (u32, u32)) {
    let (width, height) = image.dimensions();
    let scale = input_size as f32 / width.max(height) as f32;
    let scaled_w = ((width as f32 * scale).round() as u32).clamp(1, input_size);
    let scaled_h = ((height as f32 * scale).round() as u32).clamp(1, input_size);
    let resized = imageops::resize(image, scaled_w, scaled_h, FilterType::Lanczos3);

    let mut tensor = Array4::<f32>::zeros((
        1,
        3,
        input_size as usize,
        input_size as usize,
    ));
    for ((c, y, x), &v) in resized.as_ndarray3().indexed_iter() {
        tensor[[0, c, y, x]] = (f32::from(v) / 255.0 - IMAGE_MEAN[c]) / IMAGE_STD[c];
    }
    (tensor, (scaled_w, scaled_h))
}

/// Scale prompt coordinates into model space. A box rides in as its two
/// corners, labelled 2 and 3.
pub fn encode_prompt(prompt: &Prompt, scale: f32) -> (Array3<f32>, Array2<f32>) {
    match prompt {
        Prompt::Points { points, labels } => {
            let mut coords = Array3::<f32>::zeros((1, points.len(), 2));
            let mut label_row = Array2::<f32>::zeros((1, points.len()));
            for (i, (point, &label)) in points.iter().zip(labels.iter()).enumerate() {
                coords[[0, i, 0]] = point[0] * scale;
                coords[[0, i, 1]] = point[1] * scale;
                label_row[[0, i]] = f32::from(label);
            }
            (coords, label_row)
        }
        Prompt::Box {
            x_min,
            y_min,
            x_max,
            y_max,
        } => {
            let mut coords = Array3::<f32>::zeros((1, 2, 2));
            coords[[0, 0, 0]] = x_min * scale;
            coords[[0, 0, 1]] = y_min * scale;
            coords[[0, 1, 0]] = x_max * scale;
            coords[[0, 1, 1]] = y_max * scale;
            (coords, arr2(&[[2.0_f32, 3.0]]))
        }
    }
}

/// Drop the padded border from a square model-space mask and resize the
/// remainder back to the source resolution.
pub fn postprocess_mask(
    mask: ArrayView2<'_, f32>,
    input_size: u32,
    scaled: (u32, u32),
    width: u32,
    height: u32,
) -> MaskImage {
    let (mask_h, mask_w) = (mask.shape()[0] as u32, mask.shape()[1] as u32);
    let data = mask.to_owned().into_raw_vec_and_offset().0;
    let buffer = MaskImage::from_raw(mask_w, mask_h, data).unwrap();

    // The export may emit masks at another resolution than its input.
    let valid_w = ((u64::from(scaled.0) * u64::from(mask_w)) / u64::from(input_size)).max(1) as u32;
    let valid_h = ((u64::from(scaled.1) * u64::from(mask_h)) / u64::from(input_size)).max(1) as u32;
    let valid = imageops::crop_imm(&buffer, 0, 0, valid_w.min(mask_w), valid_h.min(mask_h)).to_image();

    imageops::resize(&valid, width, height, FilterType::Lanczos3)
}

pub type ModelKey = (Algorithm, ModelSize);

/// Process-wide keyed cache: create on first use, live until process exit,
/// no eviction.
pub struct ModelCache<T> {
    entries: Mutex<HashMap<ModelKey, Arc<T>>>,
}

impl<T> ModelCache<T> {
    pub fn new() -> Self {
        Self {
            entries: Mutex::new(HashMap::new()),
        }
    }

    /// Return the cached instance for `key`, or run `load` and retain its
    /// result. Failed loads leave the cache untouched.
    pub fn get_or_load<F>(&self, key: ModelKey, load: F) -> Result<Arc<T>>
    where
        F: FnOnce() -> Result<T>,
    {
        let mut entries = self.entries.lock();
        if let Some(cached) = entries.get(&key) {
            return Ok(Arc::clone(cached));
        }
        let loaded = Arc::new(load()?);
        entries.insert(key, Arc::clone(&loaded));
        Ok(loaded)
    }
}

impl<T> Default for ModelCache<T> {
    fn default() -> Self {
        Self::new()
    }
}

static SAM_MODELS: Lazy<ModelCache<SamModel>> = Lazy::new(ModelCache::new);

/// Resolve and load the model for `(algorithm, size)`, reusing a previously
/// loaded instance when one exists. The session builder is constructed
/// before weight resolution so an unavailable runtime surfaces first.
pub fn cached_model(algorithm: Algorithm, size: ModelSize) -> Result<Arc<SamModel>> {
    SAM_MODELS.get_or_load((algorithm, size), || {
        let builder =
            SessionBuilder::new().map_err(|e| PromptSegError::Unavailable(e.to_string()))?;
        let weights = config::weights_path(algorithm, size)?;
        debug!(%algorithm, %size, weights = %weights.display(), "loading segmentation model");
        SamModel::from_builder(builder, &weights)
    })
}
