//! CervixNet Server
//!
//! HTTP front end for the cervix image classifier: multipart and base64
//! batch prediction, health and Prometheus metrics.

pub mod config;
pub mod error;
pub mod routes;
pub mod state;

pub use config::{ConfigOverrides, ServerConfig};
pub use error::ApiError;
pub use routes::create_router;
pub use state::AppState;
