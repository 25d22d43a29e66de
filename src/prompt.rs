use std::fmt;
use std::str::FromStr;

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use clap::ValueEnum;
use serde::de::DeserializeOwned;

use crate::errors::{PromptSegError, Result};

/// Which of the decoded prompt payloads drives the request.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, ValueEnum)]
pub enum PromptKind {
    #[default]
    Point,
    Box,
}

impl fmt::Display for PromptKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Point => "point",
            Self::Box => "box",
        })
    }
}

impl FromStr for PromptKind {
    type Err = PromptSegError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "point" => Ok(Self::Point),
            "box" => Ok(Self::Box),
            _ => Err(PromptSegError::InvalidArgument {
                arg: "prompt-type",
                value: s.to_string(),
            }),
        }
    }
}

/// Decode an optional base64 string carrying a JSON value. Absence and the
/// empty string both decode to `None`; anything malformed is a decode error
/// naming the field.
pub fn decode_b64_json<T: DeserializeOwned>(
    field: &'static str,
    value: Option<&str>,
) -> Result<Option<T>> {
    let Some(raw) = value else {
        return Ok(None);
    };
    if raw.is_empty() {
        return Ok(None);
    }

    let bytes = BASE64.decode(raw).map_err(|e| PromptSegError::Decode {
        field,
        source: Box::new(e),
    })?;
    let decoded = serde_json::from_slice(&bytes).map_err(|e| PromptSegError::Decode {
        field,
        source: Box::new(e),
    })?;
    Ok(Some(decoded))
}

/// Raw prompt parameters as decoded from the command line, before they have
/// been checked against the image they apply to.
#[derive(Debug, Clone, Default)]
pub struct PromptSpec {
    pub kind: PromptKind,
    pub points: Option<Vec<Vec<f64>>>,
    pub labels: Option<Vec<i64>>,
    pub bbox: Option<Vec<f64>>,
}

impl PromptSpec {
    pub fn point(points: Vec<Vec<f64>>, labels: Option<Vec<i64>>) -> Self {
        Self {
            kind: PromptKind::Point,
            points: Some(points),
            labels,
            bbox: None,
        }
    }

    pub fn bounding_box(bbox: Vec<f64>) -> Self {
        Self {
            kind: PromptKind::Box,
            points: None,
            labels: None,
            bbox: Some(bbox),
        }
    }

    /// Validate the active payload against the image dimensions and produce
    /// the prompt that is actually handed to the model.
    pub fn resolve(&self, width: u32, height: u32) -> Result<Prompt> {
        match self.kind {
            PromptKind::Box => {
                let bbox = self.bbox.as_deref().ok_or(PromptSegError::Validation {
                    field: "bbox",
                    reason: "box prompts require a bounding box".to_string(),
                })?;
                Prompt::validate_box(bbox, width, height)
            }
            PromptKind::Point => Prompt::validate_points(
                self.points.as_deref().unwrap_or(&[]),
                self.labels.as_deref(),
                width,
                height,
            ),
        }
    }
}

/// A validated prompt, clamped into the bounds of its image.
#[derive(Debug, Clone, PartialEq)]
pub enum Prompt {
    Points {
        points: Vec<[f32; 2]>,
        labels: Vec<u8>,
    },
    Box {
        x_min: f32,
        y_min: f32,
        x_max: f32,
        y_max: f32,
    },
}

impl Prompt {
    /// Clamp both x and both y coordinates into the image independently,
    /// reorder so min <= max, and reject boxes thinner than one pixel.
    pub fn validate_box(bbox: &[f64], width: u32, height: u32) -> Result<Self> {
        if bbox.len() != 4 {
            return Err(PromptSegError::Validation {
                field: "bbox",
                reason: format!("expected 4 values [x1, y1, x2, y2], got {}", bbox.len()),
            });
        }

        let max_x = f64::from(width.saturating_sub(1));
        let max_y = f64::from(height.saturating_sub(1));
        let x1 = bbox[0].clamp(0.0, max_x);
        let y1 = bbox[1].clamp(0.0, max_y);
        let x2 = bbox[2].clamp(0.0, max_x);
        let y2 = bbox[3].clamp(0.0, max_y);

        let (x_min, x_max) = if x1 <= x2 { (x1, x2) } else { (x2, x1) };
        let (y_min, y_max) = if y1 <= y2 { (y1, y2) } else { (y2, y1) };

        if x_max - x_min < 1.0 || y_max - y_min < 1.0 {
            return Err(PromptSegError::Validation {
                field: "bbox",
                reason: "bounding box is smaller than one pixel after clamping".to_string(),
            });
        }

        Ok(Self::Box {
            x_min: x_min as f32,
            y_min: y_min as f32,
            x_max: x_max as f32,
            y_max: y_max as f32,
        })
    }

    /// Require at least one `[x, y]` point; labels default to foreground and
    /// are coerced into {0, 1}, and their count must match the points.
    pub fn validate_points(
        points: &[Vec<f64>],
        labels: Option<&[i64]>,
        width: u32,
        height: u32,
    ) -> Result<Self> {
        if points.is_empty() {
            return Err(PromptSegError::Validation {
                field: "points",
                reason: "at least one point is required".to_string(),
            });
        }
        if let Some(bad) = points.iter().find(|p| p.len() != 2) {
            return Err(PromptSegError::Validation {
                field: "points",
                reason: format!("every point must be [x, y], got {} values", bad.len()),
            });
        }

        let labels = match labels {
            Some(labels) if labels.len() != points.len() => {
                return Err(PromptSegError::Validation {
                    field: "labels",
                    reason: format!(
                        "label count {} does not match point count {}",
                        labels.len(),
                        points.len()
                    ),
                });
            }
            Some(labels) => labels.iter().map(|&v| v.clamp(0, 1) as u8).collect(),
            None => vec![1u8; points.len()],
        };

        let max_x = f64::from(width.saturating_sub(1));
        let max_y = f64::from(height.saturating_sub(1));
        let points = points
            .iter()
            .map(|p| [p[0].clamp(0.0, max_x) as f32, p[1].clamp(0.0, max_y) as f32])
            .collect();

        Ok(Self::Points { points, labels })
    }
}
