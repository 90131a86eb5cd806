//! Mapping of service errors onto HTTP responses

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use cervixnet_core::Error;
use serde_json::json;
use tracing::{error, warn};

/// Error returned by request handlers
#[derive(Debug)]
pub struct ApiError(pub Error);

impl ApiError {
    pub fn status(&self) -> StatusCode {
        status_for(&self.0)
    }
}

impl From<Error> for ApiError {
    fn from(err: Error) -> Self {
        ApiError(err)
    }
}

/// HTTP status for a service error
pub fn status_for(err: &Error) -> StatusCode {
    match err {
        Error::ModelUnavailable => StatusCode::SERVICE_UNAVAILABLE,
        Error::InvalidImage(_) | Error::BadRequest(_) => StatusCode::BAD_REQUEST,
        Error::PayloadTooLarge { .. } => StatusCode::PAYLOAD_TOO_LARGE,
        Error::InferenceFailure(_)
        | Error::Provisioning(_)
        | Error::Config(_)
        | Error::Io(_) => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        metrics::counter!("cervixnet_errors_total", "kind" => self.0.kind()).increment(1);

        if status.is_server_error() {
            error!("Request failed: {}", self.0);
        } else {
            warn!("Request rejected: {}", self.0);
        }

        let body = json!({ "error": self.0.to_string() });
        (status, Json(body)).into_response()
    }
}
