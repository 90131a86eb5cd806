//! HTTP routes and handlers

use axum::{
    extract::{
        multipart::{Multipart, MultipartRejection},
        rejection::JsonRejection,
        DefaultBodyLimit, State,
    },
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use base64::{engine::general_purpose::STANDARD as BASE64, Engine as _};
use bytes::Bytes;
use cervixnet_core::{round4, Error, Prediction};
use serde::{Deserialize, Serialize};
use serde_json::json;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::{debug, info};

use crate::error::ApiError;
use crate::state::AppState;

/// Multipart field names accepted for the uploaded image
const UPLOAD_FIELDS: [&str; 2] = ["file", "image"];

pub fn create_router(state: AppState) -> Router {
    let body_limit = state.config.max_upload_bytes;
    let allow_any_origin = state.config.cors_allow_any_origin;

    let mut router = Router::new()
        .route("/", get(index))
        .route("/health", get(health_check))
        .route("/metrics", get(metrics))
        .route("/predict", post(predict))
        .route("/predict-batch", post(predict_batch))
        .fallback(fallback)
        .layer(DefaultBodyLimit::max(body_limit));

    if allow_any_origin {
        router = router.layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        );
    }

    router.layer(TraceLayer::new_for_http()).with_state(state)
}

async fn index(State(state): State<AppState>) -> Json<serde_json::Value> {
    metrics::counter!("cervixnet_requests_total", "endpoint" => "index").increment(1);

    Json(json!({
        "service": "CervixNet Cervical Cancer Detection API",
        "version": env!("CARGO_PKG_VERSION"),
        "model_loaded": state.service.is_loaded(),
        "endpoints": {
            "/": "Service information",
            "/health": "Health check",
            "/metrics": "Prometheus metrics",
            "/predict": "POST multipart image (field 'file' or 'image')",
            "/predict-batch": "POST JSON {\"images\": [base64, ...]}",
        },
    }))
}

async fn health_check(State(state): State<AppState>) -> Json<serde_json::Value> {
    metrics::counter!("cervixnet_requests_total", "endpoint" => "health").increment(1);

    Json(json!({
        "status": "ok",
        "model_loaded": state.service.is_loaded(),
        "model_state": state.service.status(),
        "threshold": round4(state.service.policy().threshold),
    }))
}

async fn metrics(State(state): State<AppState>) -> Response {
    (
        [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
        state.metrics_handle.render(),
    )
        .into_response()
}

/// Prediction for a single upload
#[derive(Debug, Serialize)]
struct PredictResponse {
    #[serde(flatten)]
    prediction: Prediction,
    #[serde(skip_serializing_if = "Option::is_none")]
    filename: Option<String>,
}

/// An uploaded image pulled out of a multipart body
struct Upload {
    filename: Option<String>,
    data: Bytes,
}

async fn predict(
    State(state): State<AppState>,
    multipart: Result<Multipart, MultipartRejection>,
) -> Result<Json<PredictResponse>, ApiError> {
    metrics::counter!("cervixnet_requests_total", "endpoint" => "predict").increment(1);

    // Model availability comes before any look at the body
    state.service.ensure_ready()?;

    let limit = state.config.max_upload_bytes;
    let mut multipart = multipart
        .map_err(|rejection| multipart_error(rejection.status(), rejection.body_text(), limit))?;
    let upload = read_upload(&mut multipart, limit).await?;
    debug!(
        "Received upload {:?} ({} bytes)",
        upload.filename,
        upload.data.len()
    );

    let prediction = state.service.predict(upload.data).await?;
    record_prediction(&prediction);

    Ok(Json(PredictResponse {
        prediction,
        filename: upload.filename,
    }))
}

/// Take the first `file` or `image` field, skipping anything else
async fn read_upload(multipart: &mut Multipart, limit: usize) -> Result<Upload, Error> {
    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| multipart_error(e.status(), e.body_text(), limit))?
    {
        let accepted = field
            .name()
            .is_some_and(|name| UPLOAD_FIELDS.contains(&name));
        if !accepted {
            continue;
        }

        let filename = field.file_name().map(str::to_string);
        if filename.as_deref() == Some("") {
            return Err(Error::bad_request("No file selected"));
        }

        let data = field
            .bytes()
            .await
            .map_err(|e| multipart_error(e.status(), e.body_text(), limit))?;

        return Ok(Upload { filename, data });
    }

    Err(Error::bad_request("No image provided"))
}

/// Body-limit hits become `PayloadTooLarge`, anything else a bad request
fn multipart_error(status: StatusCode, detail: String, limit: usize) -> Error {
    if status == StatusCode::PAYLOAD_TOO_LARGE {
        Error::PayloadTooLarge { limit }
    } else {
        Error::bad_request(format!("Invalid multipart request: {}", detail))
    }
}

#[derive(Debug, Deserialize)]
struct BatchRequest {
    /// Entries are checked one by one so a bad element fails only itself
    #[serde(default)]
    images: Vec<serde_json::Value>,
}

#[derive(Debug, Serialize)]
struct BatchResponse {
    predictions: Vec<BatchEntry>,
}

/// One batch result: a prediction, or the error for that entry alone
#[derive(Debug, Serialize)]
#[serde(untagged)]
enum BatchEntry {
    Prediction(Prediction),
    Error { error: String },
}

async fn predict_batch(
    State(state): State<AppState>,
    payload: Result<Json<BatchRequest>, JsonRejection>,
) -> Result<Json<BatchResponse>, ApiError> {
    metrics::counter!("cervixnet_requests_total", "endpoint" => "predict_batch").increment(1);

    state.service.ensure_ready()?;

    let Json(request) = payload.map_err(|rejection| {
        if rejection.status() == StatusCode::PAYLOAD_TOO_LARGE {
            Error::PayloadTooLarge {
                limit: state.config.max_upload_bytes,
            }
        } else {
            Error::bad_request(format!("Invalid JSON request: {}", rejection.body_text()))
        }
    })?;
    if request.images.is_empty() {
        return Err(Error::bad_request("No images provided").into());
    }

    info!("Batch prediction for {} images", request.images.len());

    let service = &state.service;
    let predictions = futures::future::join_all(request.images.iter().map(|entry| async move {
        let decoded = match entry.as_str() {
            Some(encoded) => decode_image(encoded),
            None => Err(Error::bad_request("image must be a base64 string")),
        };
        let outcome = match decoded {
            Ok(bytes) => service.predict(bytes).await,
            Err(e) => Err(e),
        };

        match outcome {
            Ok(prediction) => {
                record_prediction(&prediction);
                BatchEntry::Prediction(prediction)
            }
            Err(e) => {
                metrics::counter!("cervixnet_errors_total", "kind" => e.kind()).increment(1);
                debug!("Batch entry failed: {}", e);
                BatchEntry::Error {
                    error: e.to_string(),
                }
            }
        }
    }))
    .await;

    Ok(Json(BatchResponse { predictions }))
}

/// Decode a base64 image, dropping any `data:<mime>;base64,` prefix.
/// Line breaks from wrapped encoders are ignored.
fn decode_image(encoded: &str) -> Result<Bytes, Error> {
    let payload: String = strip_data_url(encoded.trim())
        .chars()
        .filter(|c| !c.is_ascii_whitespace())
        .collect();
    BASE64
        .decode(payload)
        .map(Bytes::from)
        .map_err(|e| Error::invalid_image(format!("invalid base64 data: {}", e)))
}

fn strip_data_url(encoded: &str) -> &str {
    if encoded.starts_with("data:") {
        if let Some((_, data)) = encoded.split_once(',') {
            return data;
        }
    }
    encoded
}

fn record_prediction(prediction: &Prediction) {
    metrics::counter!("cervixnet_predictions_total", "label" => prediction.label.as_str())
        .increment(1);
}

async fn fallback() -> Response {
    (StatusCode::NOT_FOUND, Json(json!({ "error": "Not found" }))).into_response()
}
