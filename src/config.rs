use std::env;
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

use clap::ValueEnum;

use crate::errors::{PromptSegError, Result};

/// Segmentation model family. Both are consumed as opaque ONNX exports.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, ValueEnum)]
pub enum Algorithm {
    Sam,
    Sam2,
}

impl Algorithm {
    pub const fn env_prefix(self) -> &'static str {
        match self {
            Self::Sam => "SAM",
            Self::Sam2 => "SAM2",
        }
    }

    const fn default_stem(self) -> &'static str {
        match self {
            Self::Sam => "sam",
            Self::Sam2 => "sam2",
        }
    }
}

impl fmt::Display for Algorithm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Sam => "sam",
            Self::Sam2 => "sam2",
        })
    }
}

impl FromStr for Algorithm {
    type Err = PromptSegError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "sam" => Ok(Self::Sam),
            "sam2" => Ok(Self::Sam2),
            _ => Err(PromptSegError::Configuration {
                message: format!("unsupported segmentation algorithm: {s}"),
            }),
        }
    }
}

/// Checkpoint size tier of a model family.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, ValueEnum)]
pub enum ModelSize {
    Tiny,
    Small,
    Base,
    Large,
}

impl ModelSize {
    pub const fn env_infix(self) -> &'static str {
        match self {
            Self::Tiny => "TINY",
            Self::Small => "SMALL",
            Self::Base => "BASE",
            Self::Large => "LARGE",
        }
    }

    const fn file_suffix(self) -> &'static str {
        match self {
            Self::Tiny => "t",
            Self::Small => "s",
            Self::Base => "b",
            Self::Large => "l",
        }
    }
}

impl fmt::Display for ModelSize {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Tiny => "tiny",
            Self::Small => "small",
            Self::Base => "base",
            Self::Large => "large",
        })
    }
}

impl FromStr for ModelSize {
    type Err = PromptSegError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "tiny" => Ok(Self::Tiny),
            "small" => Ok(Self::Small),
            "base" => Ok(Self::Base),
            "large" => Ok(Self::Large),
            _ => Err(PromptSegError::Configuration {
                message: format!("unsupported model size: {s}"),
            }),
        }
    }
}

/// Resolve the weights file for an (algorithm, size) pair.
///
/// Each pair reads `<ALGO>_MODEL_<SIZE>_PATH`; the base size consults
/// `<ALGO>_MODEL_PATH` first, an empty value there falling through to the
/// size-specific variable. Unset variables resolve to the conventional
/// filename next to the working directory (`sam_b.onnx`, `sam2_t.onnx`, ...).
/// A variable set to the empty string is a configuration error, not a file
/// lookup.
pub fn weights_path(algorithm: Algorithm, size: ModelSize) -> Result<PathBuf> {
    let prefix = algorithm.env_prefix();
    let sized_var = format!("{}_MODEL_{}_PATH", prefix, size.env_infix());

    let configured = if size == ModelSize::Base {
        nonempty_env(&format!("{prefix}_MODEL_PATH")).or_else(|| env::var(&sized_var).ok())
    } else {
        env::var(&sized_var).ok()
    };

    let path = configured
        .unwrap_or_else(|| format!("{}_{}.onnx", algorithm.default_stem(), size.file_suffix()));

    if path.is_empty() {
        return Err(PromptSegError::Configuration {
            message: format!("weights path not configured for {algorithm}:{size}"),
        });
    }

    Ok(PathBuf::from(path))
}

fn nonempty_env(name: &str) -> Option<String> {
    env::var(name).ok().filter(|v| !v.is_empty())
}
