//! ONNX Runtime backed scoring model

use cervixnet_core::{Error, Result};
use ndarray::Array4;
use ort::session::{builder::GraphOptimizationLevel, Session};
use ort::value::Tensor;
use parking_lot::Mutex;
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use tracing::{debug, info};

use crate::config::ModelSettings;
use crate::model::ScoringModel;

/// Session options for [`OnnxModel::load`]
#[derive(Debug, Clone, Copy)]
pub struct SessionOptions {
    /// Number of independent sessions
    pub workers: usize,

    /// Intra-op threads per session
    pub intra_threads: usize,
}

impl SessionOptions {
    pub fn from_settings(settings: &ModelSettings) -> Self {
        Self {
            workers: settings.workers.max(1),
            intra_threads: settings.resolved_intra_threads(),
        }
    }
}

/// A network exported to ONNX, with one session per worker.
///
/// `Session::run` needs exclusive access, so each session sits behind its
/// own mutex and a call takes whichever one is free.
pub struct OnnxModel {
    sessions: Vec<Mutex<Session>>,
    next: AtomicUsize,
    name: String,
}

impl OnnxModel {
    /// Load the graph at `path` once per worker, fully optimized for inference
    pub fn load(path: impl AsRef<Path>, options: SessionOptions) -> Result<Self> {
        let path = path.as_ref();
        if !path.exists() {
            return Err(Error::provisioning(format!("Model file not found: {:?}", path)));
        }

        let mut sessions = Vec::with_capacity(options.workers);
        for _ in 0..options.workers.max(1) {
            let session = build_session(path, options.intra_threads)
                .map_err(|e| Error::provisioning(format!("Failed to load ONNX model: {}", e)))?;
            sessions.push(Mutex::new(session));
        }

        let name = path
            .file_stem()
            .and_then(|s| s.to_str())
            .unwrap_or("unknown")
            .to_string();

        info!(
            "Loaded ONNX model '{}' with {} session(s), {} intra-op thread(s) each",
            name,
            sessions.len(),
            options.intra_threads
        );

        Ok(Self {
            sessions,
            next: AtomicUsize::new(0),
            name,
        })
    }

    fn run(session: &mut Session, input: &Array4<f32>) -> Result<f32> {
        let shape = input.shape();
        let dims = [shape[0], shape[1], shape[2], shape[3]];
        let data = input.iter().copied().collect::<Vec<f32>>();

        let tensor = Tensor::from_array((dims, data))
            .map_err(|e| Error::inference(format!("Failed to build input tensor: {}", e)))?;

        let outputs = session
            .run(ort::inputs![tensor])
            .map_err(|e| Error::inference(e.to_string()))?;

        let (_, scores) = outputs[0]
            .try_extract_tensor::<f32>()
            .map_err(|e| Error::inference(format!("Unexpected output tensor: {}", e)))?;

        scores
            .first()
            .copied()
            .ok_or_else(|| Error::inference("model returned an empty output"))
    }
}

fn build_session(path: &Path, intra_threads: usize) -> ort::Result<Session> {
    Session::builder()?
        .with_optimization_level(GraphOptimizationLevel::Level3)?
        .with_intra_threads(intra_threads)?
        .commit_from_file(path)
}

impl ScoringModel for OnnxModel {
    fn score(&self, input: &Array4<f32>) -> Result<f32> {
        for slot in &self.sessions {
            if let Some(mut session) = slot.try_lock() {
                return Self::run(&mut session, input);
            }
        }

        // Every session is busy; wait on one in round-robin order
        let index = self.next.fetch_add(1, Ordering::Relaxed) % self.sessions.len();
        debug!("All sessions busy, waiting on session {}", index);
        let mut session = self.sessions[index].lock();
        Self::run(&mut session, input)
    }

    fn name(&self) -> &str {
        &self.name
    }
}
