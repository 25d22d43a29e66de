use std::path::PathBuf;
use thiserror::Error;

/// Structured error type covering every failure surface of the two runners.
///
/// Each variant carries the context of its error domain so callers never have
/// to parse message strings. Every failure is fatal to the invoking process;
/// the process exit status is the only machine-readable code.
#[derive(Error, Debug)]
pub enum PromptSegError {
    #[error("Configuration error: {message}")]
    Configuration { message: String },

    #[error("Filesystem error: {operation} failed for {path:?}")]
    FileSystem {
        path: PathBuf,
        operation: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Invalid argument: {arg}={value}")]
    InvalidArgument { arg: &'static str, value: String },

    #[error("Failed to decode {field} payload")]
    Decode {
        field: &'static str,
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    #[error("Validation error: {field} {reason}")]
    Validation { field: &'static str, reason: String },

    #[error("Image error: {operation} failed")]
    Image {
        operation: String,
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    #[error("Model error: {operation} failed")]
    Model {
        operation: String,
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    #[error("Model serving runtime unavailable: {0}")]
    Unavailable(String),

    #[error("Segmentation produced no result")]
    EmptyResult,
}

pub type Result<T> = std::result::Result<T, PromptSegError>;

/// I/O errors without richer context fall back here; code that knows the
/// path and operation constructs `FileSystem` directly.
impl From<std::io::Error> for PromptSegError {
    fn from(err: std::io::Error) -> Self {
        Self::FileSystem {
            path: PathBuf::from("unknown"),
            operation: "unknown".to_string(),
            source: err,
        }
    }
}

impl From<image::ImageError> for PromptSegError {
    fn from(err: image::ImageError) -> Self {
        Self::Image {
            operation: "image processing".to_string(),
            source: Box::new(err),
        }
    }
}

impl From<ort::Error> for PromptSegError {
    fn from(err: ort::Error) -> Self {
        Self::Model {
            operation: "ort operation".to_string(),
            source: Box::new(err),
        }
    }
}

/// Shape errors only occur during tensor work inside inference, so they are
/// model errors rather than a separate category.
impl From<ndarray::ShapeError> for PromptSegError {
    fn from(err: ndarray::ShapeError) -> Self {
        Self::Model {
            operation: "tensor shape conversion".to_string(),
            source: Box::new(err),
        }
    }
}
