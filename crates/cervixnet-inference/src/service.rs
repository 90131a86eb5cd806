//! Inference request pipeline: normalize, score, threshold

use bytes::Bytes;
use cervixnet_core::{Error, Prediction, Result, ThresholdPolicy};
use chrono::Utc;
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::Semaphore;
use tracing::{debug, info};

use crate::config::ModelSettings;
use crate::normalize::{normalize, NormalizeOptions};
use crate::state::{ModelHandle, ModelStatus};

/// Runs predictions against the shared model handle.
///
/// Decoding and the forward pass run on tokio's blocking pool, at most
/// `workers` at a time, so they never hold up the async reactor.
#[derive(Clone)]
pub struct InferenceService {
    handle: Arc<ModelHandle>,
    policy: ThresholdPolicy,
    normalize: NormalizeOptions,
    permits: Arc<Semaphore>,
}

impl InferenceService {
    pub fn new(handle: Arc<ModelHandle>, policy: ThresholdPolicy, settings: &ModelSettings) -> Self {
        let normalize = NormalizeOptions {
            layout: settings.layout,
            preprocessing: settings.preprocessing,
            ..Default::default()
        };

        Self {
            handle,
            policy,
            normalize,
            permits: Arc::new(Semaphore::new(settings.workers.max(1))),
        }
    }

    pub fn policy(&self) -> &ThresholdPolicy {
        &self.policy
    }

    pub fn status(&self) -> ModelStatus {
        self.handle.status()
    }

    pub fn is_loaded(&self) -> bool {
        self.handle.is_loaded()
    }

    /// Fail fast when no model is loaded
    pub fn ensure_ready(&self) -> Result<()> {
        self.handle.model().map(|_| ())
    }

    /// Classify one image.
    ///
    /// Model availability is checked before the input is looked at, and
    /// empty input is rejected before it reaches the normalizer.
    pub async fn predict(&self, image: Bytes) -> Result<Prediction> {
        let model = self.handle.model()?;

        if image.is_empty() {
            return Err(Error::bad_request("Empty file"));
        }

        let permit = self
            .permits
            .clone()
            .acquire_owned()
            .await
            .map_err(|e| Error::inference(e.to_string()))?;

        let options = self.normalize;
        let started = Instant::now();
        let score = tokio::task::spawn_blocking(move || {
            let _permit = permit;
            let input = normalize(&image, &options)?;
            model.score(&input)
        })
        .await
        .map_err(|e| Error::inference(format!("inference task failed: {}", e)))??;

        let elapsed = started.elapsed();
        metrics::histogram!("cervixnet_inference_latency_us").record(elapsed.as_micros() as f64);

        let score = f64::from(score);
        if !score.is_finite() || !(0.0..=1.0).contains(&score) {
            return Err(Error::inference(format!(
                "model output {} is outside [0, 1]",
                score
            )));
        }

        let prediction = self.policy.classify(score, Utc::now());
        info!(
            "Prediction: {}, Score: {:.4}",
            prediction.label, prediction.score
        );
        debug!("Inference took {:?}", elapsed);

        Ok(prediction)
    }
}
