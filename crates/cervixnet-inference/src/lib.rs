//! CervixNet Inference
//!
//! Everything between the uploaded bytes and the scalar score:
//! - Provisioning: fetch the model artifact once and load it
//! - Normalization: decode, resize to 288x288, scale pixels for the network
//! - Inference: run the forward pass on a bounded blocking worker pool
//!
//! The loaded model lives behind a [`ModelHandle`] whose state moves
//! `Unloaded -> Loading -> {Ready, Failed}`.

pub mod config;
pub mod model;
pub mod normalize;
#[cfg(feature = "onnx")]
pub mod onnx;
pub mod provision;
pub mod service;
pub mod state;

pub use config::{
    InputLayout, ModelSettings, ModelSourceSpec, Preprocessing, DEFAULT_MIN_BYTES,
    DEFAULT_MODEL_PATH, DEFAULT_MODEL_URL, INPUT_SIZE,
};
pub use model::ScoringModel;
pub use normalize::{normalize, NormalizeOptions};
#[cfg(feature = "onnx")]
pub use onnx::{OnnxModel, SessionOptions};
pub use provision::{provision, Provisioner};
pub use service::InferenceService;
pub use state::{ModelHandle, ModelStatus};

