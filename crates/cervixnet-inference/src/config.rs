//! Configuration for model provisioning and input preprocessing

use cervixnet_core::{Error, Result};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Default download location of the exported network
pub const DEFAULT_MODEL_URL: &str =
    "https://huggingface.co/VedantJainnnn/cervixnet121/resolve/main/final_cervix_model_optimized.onnx";

/// Default local filename of the model artifact
pub const DEFAULT_MODEL_PATH: &str = "final_cervix_model_optimized.onnx";

/// Files smaller than this are treated as truncated downloads
pub const DEFAULT_MIN_BYTES: u64 = 1024 * 1024;

/// Side length of the square network input
pub const INPUT_SIZE: u32 = 288;

/// Model configuration (for YAML/config files)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelSettings {
    /// Where the artifact comes from
    #[serde(default)]
    pub source: ModelSourceSpec,

    /// Local path the artifact is downloaded to
    #[serde(default = "default_local_path")]
    pub local_path: PathBuf,

    /// Minimum size of a local file before it is trusted
    #[serde(default = "default_min_bytes")]
    pub min_bytes: u64,

    /// Number of concurrent inference workers (one session each)
    #[serde(default = "default_workers")]
    pub workers: usize,

    /// Intra-op threads per session; derived from the CPU count when unset
    #[serde(default)]
    pub intra_threads: Option<usize>,

    /// Tensor layout expected by the network
    #[serde(default)]
    pub layout: InputLayout,

    /// Pixel normalization expected by the network
    #[serde(default)]
    pub preprocessing: Preprocessing,
}

/// Model source specification (for config files)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ModelSourceSpec {
    /// Plain HTTP(S) download
    Url { url: String },

    /// Hugging Face Hub
    HuggingFace {
        repo_id: String,
        filename: String,
        revision: Option<String>,
    },

    /// Local file, never downloaded
    Local { path: PathBuf },
}

impl Default for ModelSourceSpec {
    fn default() -> Self {
        Self::Url {
            url: DEFAULT_MODEL_URL.to_string(),
        }
    }
}

/// Memory layout of the input tensor
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum InputLayout {
    /// `[1, H, W, 3]`, the Keras default
    #[default]
    Nhwc,
    /// `[1, 3, H, W]`
    Nchw,
}

/// Pixel normalization modes of the Keras application models
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Preprocessing {
    /// Scale to [0, 1], then ImageNet mean/std per channel (DenseNet)
    #[default]
    Torch,
    /// Scale to [-1, 1]
    Tf,
    /// BGR order, ImageNet mean subtracted, no scaling
    Caffe,
}

impl Default for ModelSettings {
    fn default() -> Self {
        Self {
            source: ModelSourceSpec::default(),
            local_path: default_local_path(),
            min_bytes: default_min_bytes(),
            workers: default_workers(),
            intra_threads: None,
            layout: InputLayout::default(),
            preprocessing: Preprocessing::default(),
        }
    }
}

impl ModelSettings {
    /// Point the source at a download URL
    pub fn with_url(mut self, url: impl Into<String>) -> Self {
        self.source = ModelSourceSpec::Url { url: url.into() };
        self
    }

    /// Set the local artifact path
    pub fn with_local_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.local_path = path.into();
        self
    }

    /// Set the worker count
    pub fn with_workers(mut self, workers: usize) -> Self {
        self.workers = workers;
        self
    }

    /// Intra-op threads per session
    pub fn resolved_intra_threads(&self) -> usize {
        self.intra_threads
            .unwrap_or_else(|| num_cpus::get() / self.workers.max(1))
            .max(1)
    }

    pub fn validate(&self) -> Result<()> {
        if self.workers == 0 {
            return Err(Error::config("model.workers must be at least 1"));
        }
        if let ModelSourceSpec::Url { url } = &self.source {
            if !(url.starts_with("http://") || url.starts_with("https://")) {
                return Err(Error::config(format!("model URL must be http(s): {}", url)));
            }
        }
        Ok(())
    }
}

fn default_local_path() -> PathBuf {
    PathBuf::from(DEFAULT_MODEL_PATH)
}

fn default_min_bytes() -> u64 {
    DEFAULT_MIN_BYTES
}

fn default_workers() -> usize {
    2
}
