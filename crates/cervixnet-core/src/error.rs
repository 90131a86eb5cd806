//! Error types for CervixNet

/// Result type alias using CervixNet's Error type
pub type Result<T> = std::result::Result<T, Error>;

/// Core error type for CervixNet operations
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// The model was never loaded, is still loading, or failed to load
    #[error("Model not loaded")]
    ModelUnavailable,

    /// Uploaded bytes could not be decoded as an image
    #[error("Invalid image: {0}")]
    InvalidImage(String),

    /// The forward pass failed or produced an unusable score
    #[error("Prediction failed: {0}")]
    InferenceFailure(String),

    /// Request body exceeded the configured upload limit
    #[error("File too large: the limit is {limit} bytes")]
    PayloadTooLarge { limit: usize },

    /// Missing field, empty upload, or malformed payload
    #[error("{0}")]
    BadRequest(String),

    /// Fetching the model artifact failed
    #[error("provisioning error: {0}")]
    Provisioning(String),

    /// Configuration errors
    #[error("configuration error: {0}")]
    Config(String),

    /// Filesystem errors
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    /// Create a new invalid image error
    pub fn invalid_image(msg: impl Into<String>) -> Self {
        Self::InvalidImage(msg.into())
    }

    /// Create a new inference failure
    pub fn inference(msg: impl Into<String>) -> Self {
        Self::InferenceFailure(msg.into())
    }

    /// Create a new bad request error
    pub fn bad_request(msg: impl Into<String>) -> Self {
        Self::BadRequest(msg.into())
    }

    /// Create a new provisioning error
    pub fn provisioning(msg: impl Into<String>) -> Self {
        Self::Provisioning(msg.into())
    }

    /// Create a new configuration error
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// Short, stable name of the variant, used as a metrics label
    pub fn kind(&self) -> &'static str {
        match self {
            Self::ModelUnavailable => "model_unavailable",
            Self::InvalidImage(_) => "invalid_image",
            Self::InferenceFailure(_) => "inference_failure",
            Self::PayloadTooLarge { .. } => "payload_too_large",
            Self::BadRequest(_) => "bad_request",
            Self::Provisioning(_) => "provisioning",
            Self::Config(_) => "config",
            Self::Io(_) => "io",
        }
    }
}
