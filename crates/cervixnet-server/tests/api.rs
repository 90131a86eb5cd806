//! Router tests against a mock model

use axum::{
    body::Body,
    http::{header, Request, StatusCode},
    Router,
};
use base64::{engine::general_purpose::STANDARD as BASE64, Engine as _};
use cervixnet_core::{Error, Result};
use cervixnet_inference::{InferenceService, ModelHandle, ScoringModel};
use cervixnet_server::{create_router, AppState, ServerConfig};
use image::{ImageFormat, Rgb, RgbImage};
use metrics_exporter_prometheus::PrometheusBuilder;
use ndarray::Array4;
use serde_json::Value;
use std::io::Cursor;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use tower::ServiceExt;

const BOUNDARY: &str = "cervixnet-test-boundary";

struct FixedModel {
    score: f32,
    calls: AtomicU32,
}

impl FixedModel {
    fn new(score: f32) -> Arc<Self> {
        Arc::new(Self {
            score,
            calls: AtomicU32::new(0),
        })
    }

    fn calls(&self) -> u32 {
        self.calls.load(Ordering::Relaxed)
    }
}

impl ScoringModel for FixedModel {
    fn score(&self, _input: &Array4<f32>) -> Result<f32> {
        self.calls.fetch_add(1, Ordering::Relaxed);
        Ok(self.score)
    }

    fn name(&self) -> &str {
        "fixed"
    }
}

fn app_with_handle(handle: ModelHandle) -> Router {
    app_with_config(handle, ServerConfig::default())
}

fn app_with_config(handle: ModelHandle, config: ServerConfig) -> Router {
    let service = InferenceService::new(Arc::new(handle), config.classification, &config.model);
    let metrics_handle = PrometheusBuilder::new().build_recorder().handle();
    create_router(AppState::new(config, service, metrics_handle))
}

fn ready_app(model: Arc<FixedModel>) -> Router {
    app_with_handle(ModelHandle::ready(model))
}

fn png_bytes() -> Vec<u8> {
    let img = RgbImage::from_pixel(40, 30, Rgb([180, 90, 120]));
    let mut buf = Cursor::new(Vec::new());
    img.write_to(&mut buf, ImageFormat::Png).unwrap();
    buf.into_inner()
}

fn multipart_body(field: &str, filename: Option<&str>, data: &[u8]) -> Vec<u8> {
    let mut body = Vec::new();
    body.extend_from_slice(format!("--{}\r\n", BOUNDARY).as_bytes());
    match filename {
        Some(name) => body.extend_from_slice(
            format!(
                "Content-Disposition: form-data; name=\"{}\"; filename=\"{}\"\r\n",
                field, name
            )
            .as_bytes(),
        ),
        None => body.extend_from_slice(
            format!("Content-Disposition: form-data; name=\"{}\"\r\n", field).as_bytes(),
        ),
    }
    body.extend_from_slice(b"Content-Type: application/octet-stream\r\n\r\n");
    body.extend_from_slice(data);
    body.extend_from_slice(format!("\r\n--{}--\r\n", BOUNDARY).as_bytes());
    body
}

fn predict_request(field: &str, filename: Option<&str>, data: &[u8]) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri("/predict")
        .header(
            header::CONTENT_TYPE,
            format!("multipart/form-data; boundary={}", BOUNDARY),
        )
        .body(Body::from(multipart_body(field, filename, data)))
        .unwrap()
}

fn batch_request(images: &[String]) -> Request<Body> {
    let body = serde_json::json!({ "images": images });
    Request::builder()
        .method("POST")
        .uri("/predict-batch")
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

fn get(uri: &str) -> Request<Body> {
    Request::builder().uri(uri).body(Body::empty()).unwrap()
}

async fn send(app: Router, request: Request<Body>) -> (StatusCode, Value) {
    let response = app.oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let json = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
    (status, json)
}

#[tokio::test]
async fn test_health_when_ready() {
    let (status, body) = send(ready_app(FixedModel::new(0.5)), get("/health")).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "ok");
    assert_eq!(body["model_loaded"], true);
    assert_eq!(body["model_state"], "ready");
    assert_eq!(body["threshold"], 0.55);
}

#[tokio::test]
async fn test_health_before_load() {
    let (status, body) = send(app_with_handle(ModelHandle::new()), get("/health")).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["model_loaded"], false);
    assert_eq!(body["model_state"], "unloaded");
}

#[tokio::test]
async fn test_health_after_failed_load() {
    let handle = ModelHandle::new();
    handle.begin_loading().unwrap();
    handle.complete(Err(Error::provisioning("download failed")));

    let (_, body) = send(app_with_handle(handle), get("/health")).await;

    assert_eq!(body["model_loaded"], false);
    assert_eq!(body["model_state"], "failed");
}

#[tokio::test]
async fn test_predict_abnormal() {
    let model = FixedModel::new(0.73);
    let app = ready_app(model.clone());

    let (status, body) = send(app, predict_request("file", Some("cervix.png"), &png_bytes())).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["prediction"], "Abnormal");
    assert_eq!(body["class"], "abnormal");
    assert_eq!(body["score"], 0.73);
    assert_eq!(body["confidence"], 0.73);
    assert_eq!(body["threshold"], 0.55);
    assert_eq!(body["filename"], "cervix.png");
    assert!(body["timestamp"].as_str().unwrap().ends_with('Z'));
    assert_eq!(model.calls(), 1);
}

#[tokio::test]
async fn test_predict_normal_with_image_field() {
    let app = ready_app(FixedModel::new(0.2));

    let (status, body) = send(app, predict_request("image", Some("scan.png"), &png_bytes())).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["prediction"], "Normal");
    assert_eq!(body["class"], "normal");
    assert_eq!(body["confidence"], 0.8);
}

#[tokio::test]
async fn test_predict_without_filename_omits_it() {
    let app = ready_app(FixedModel::new(0.6));

    let (status, body) = send(app, predict_request("file", None, &png_bytes())).await;

    assert_eq!(status, StatusCode::OK);
    assert!(body.get("filename").is_none());
}

#[tokio::test]
async fn test_predict_rejects_non_image() {
    let model = FixedModel::new(0.9);
    let app = ready_app(model.clone());

    let (status, body) = send(
        app,
        predict_request("file", Some("notes.txt"), b"definitely not an image"),
    )
    .await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["error"].as_str().unwrap().starts_with("Invalid image"));
    assert_eq!(model.calls(), 0);
}

#[tokio::test]
async fn test_predict_rejects_empty_upload() {
    let model = FixedModel::new(0.9);
    let app = ready_app(model.clone());

    let (status, body) = send(app, predict_request("file", Some("empty.png"), b"")).await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "Empty file");
    assert_eq!(model.calls(), 0);
}

#[tokio::test]
async fn test_predict_requires_image_field() {
    let app = ready_app(FixedModel::new(0.9));

    let (status, body) = send(app, predict_request("attachment", Some("a.png"), &png_bytes())).await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "No image provided");
}

#[tokio::test]
async fn test_predict_rejects_empty_filename() {
    let app = ready_app(FixedModel::new(0.9));

    let (status, body) = send(app, predict_request("file", Some(""), &png_bytes())).await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "No file selected");
}

#[tokio::test]
async fn test_predict_without_model_ignores_input() {
    // Valid image
    let (status, body) = send(
        app_with_handle(ModelHandle::new()),
        predict_request("file", Some("cervix.png"), &png_bytes()),
    )
    .await;
    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(body["error"], "Model not loaded");

    // Not even multipart
    let garbage = Request::builder()
        .method("POST")
        .uri("/predict")
        .body(Body::from("garbage"))
        .unwrap();
    let (status, body) = send(app_with_handle(ModelHandle::new()), garbage).await;
    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(body["error"], "Model not loaded");
}

#[tokio::test]
async fn test_batch_preserves_order_around_bad_entry() {
    let model = FixedModel::new(0.7);
    let app = ready_app(model.clone());
    let encoded = BASE64.encode(png_bytes());

    let images = vec![
        encoded.clone(),
        "%%% not base64 %%%".to_string(),
        format!("data:image/png;base64,{}", encoded),
    ];
    let (status, body) = send(app, batch_request(&images)).await;

    assert_eq!(status, StatusCode::OK);
    let predictions = body["predictions"].as_array().unwrap();
    assert_eq!(predictions.len(), 3);
    assert_eq!(predictions[0]["prediction"], "Abnormal");
    assert!(predictions[1]["error"].as_str().unwrap().starts_with("Invalid image"));
    assert!(predictions[1].get("prediction").is_none());
    assert_eq!(predictions[2]["prediction"], "Abnormal");
    assert_eq!(model.calls(), 2);
}

#[tokio::test]
async fn test_batch_entry_with_undecodable_image() {
    let app = ready_app(FixedModel::new(0.1));
    let images = vec![BASE64.encode(b"plain text"), BASE64.encode(png_bytes())];

    let (status, body) = send(app, batch_request(&images)).await;

    assert_eq!(status, StatusCode::OK);
    let predictions = body["predictions"].as_array().unwrap();
    assert!(predictions[0]["error"].is_string());
    assert_eq!(predictions[1]["prediction"], "Normal");
}

#[tokio::test]
async fn test_batch_requires_images() {
    let (status, body) = send(ready_app(FixedModel::new(0.5)), batch_request(&[])).await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "No images provided");
}

#[tokio::test]
async fn test_batch_without_model() {
    let images = vec![BASE64.encode(png_bytes())];
    let (status, body) = send(app_with_handle(ModelHandle::new()), batch_request(&images)).await;

    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(body["error"], "Model not loaded");
}

#[tokio::test]
async fn test_index_lists_endpoints() {
    let (status, body) = send(ready_app(FixedModel::new(0.5)), get("/")).await;

    assert_eq!(status, StatusCode::OK);
    assert!(body["service"].as_str().unwrap().contains("CervixNet"));
    assert_eq!(body["model_loaded"], true);
    assert!(body["endpoints"].get("/predict").is_some());
    assert!(body["endpoints"].get("/predict-batch").is_some());
}

#[tokio::test]
async fn test_metrics_endpoint() {
    let app = ready_app(FixedModel::new(0.5));
    let response = app.oneshot(get("/metrics")).await.unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let content_type = response.headers()[header::CONTENT_TYPE].to_str().unwrap();
    assert!(content_type.starts_with("text/plain"));
}

#[tokio::test]
async fn test_unknown_route() {
    let (status, body) = send(ready_app(FixedModel::new(0.5)), get("/v1/unknown")).await;

    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["error"], "Not found");
}

#[tokio::test]
async fn test_predict_rejects_upload_over_limit() {
    let model = FixedModel::new(0.9);
    let config = ServerConfig {
        max_upload_bytes: 1024,
        ..ServerConfig::default()
    };
    let app = app_with_config(ModelHandle::ready(model.clone()), config);

    let (status, body) = send(app, predict_request("file", Some("big.png"), &[0u8; 4096])).await;

    assert_eq!(status, StatusCode::PAYLOAD_TOO_LARGE);
    assert!(body["error"].as_str().unwrap().starts_with("File too large"));
    assert_eq!(model.calls(), 0);
}

#[tokio::test]
async fn test_predict_accepts_upload_under_limit() {
    let image = png_bytes();
    let config = ServerConfig {
        max_upload_bytes: image.len() + 1024,
        ..ServerConfig::default()
    };
    let app = app_with_config(ModelHandle::ready(FixedModel::new(0.9)), config);

    let (status, _) = send(app, predict_request("file", Some("cervix.png"), &image)).await;

    assert_eq!(status, StatusCode::OK);
}

#[tokio::test]
async fn test_batch_rejects_body_over_limit() {
    let config = ServerConfig {
        max_upload_bytes: 1024,
        ..ServerConfig::default()
    };
    let app = app_with_config(ModelHandle::ready(FixedModel::new(0.9)), config);

    let images = vec![BASE64.encode(vec![0u8; 4096])];
    let (status, body) = send(app, batch_request(&images)).await;

    assert_eq!(status, StatusCode::PAYLOAD_TOO_LARGE);
    assert!(body["error"].as_str().unwrap().starts_with("File too large"));
}

#[tokio::test]
async fn test_batch_accepts_line_wrapped_base64() {
    let model = FixedModel::new(0.7);
    let app = ready_app(model.clone());

    let encoded = BASE64.encode(png_bytes());
    let wrapped = encoded
        .as_bytes()
        .chunks(76)
        .map(|line| std::str::from_utf8(line).unwrap())
        .collect::<Vec<_>>()
        .join("\n");
    assert!(wrapped.contains('\n'));

    let images = vec![wrapped.clone(), format!("data:image/png;base64,{}", wrapped)];
    let (status, body) = send(app, batch_request(&images)).await;

    assert_eq!(status, StatusCode::OK);
    let predictions = body["predictions"].as_array().unwrap();
    assert_eq!(predictions[0]["prediction"], "Abnormal");
    assert_eq!(predictions[1]["prediction"], "Abnormal");
    assert_eq!(model.calls(), 2);
}

#[tokio::test]
async fn test_batch_non_string_entry_fails_alone() {
    let model = FixedModel::new(0.7);
    let app = ready_app(model.clone());

    let body = serde_json::json!({ "images": [BASE64.encode(png_bytes()), 42, null] });
    let request = Request::builder()
        .method("POST")
        .uri("/predict-batch")
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(body.to_string()))
        .unwrap();
    let (status, body) = send(app, request).await;

    assert_eq!(status, StatusCode::OK);
    let predictions = body["predictions"].as_array().unwrap();
    assert_eq!(predictions.len(), 3);
    assert_eq!(predictions[0]["prediction"], "Abnormal");
    assert_eq!(predictions[1]["error"], "image must be a base64 string");
    assert_eq!(predictions[2]["error"], "image must be a base64 string");
    assert_eq!(model.calls(), 1);
}
