//! Process-wide model availability
//!
//! The handle moves `Unloaded -> Loading -> {Ready, Failed}` exactly once.
//! There is no way back to `Loading`.

use cervixnet_core::{Error, Result};
use parking_lot::RwLock;
use serde::Serialize;
use std::fmt;
use std::sync::Arc;
use tracing::{error, info, warn};

use crate::model::ScoringModel;

/// Observable load status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ModelStatus {
    Unloaded,
    Loading,
    Ready,
    Failed,
}

impl fmt::Display for ModelStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Unloaded => "unloaded",
            Self::Loading => "loading",
            Self::Ready => "ready",
            Self::Failed => "failed",
        };
        f.write_str(s)
    }
}

enum ModelState {
    Unloaded,
    Loading,
    Ready(Arc<dyn ScoringModel>),
    Failed(String),
}

/// Shared, read-mostly handle to the loaded model
pub struct ModelHandle {
    state: RwLock<ModelState>,
}

impl ModelHandle {
    /// A handle with nothing loaded yet
    pub fn new() -> Self {
        Self {
            state: RwLock::new(ModelState::Unloaded),
        }
    }

    /// A handle that is already `Ready`
    pub fn ready(model: Arc<dyn ScoringModel>) -> Self {
        Self {
            state: RwLock::new(ModelState::Ready(model)),
        }
    }

    /// `Unloaded -> Loading`. Fails from any other state.
    pub fn begin_loading(&self) -> Result<()> {
        let mut state = self.state.write();
        match *state {
            ModelState::Unloaded => {
                *state = ModelState::Loading;
                Ok(())
            }
            _ => Err(Error::provisioning(format!(
                "model load already attempted (state: {})",
                status_of(&state)
            ))),
        }
    }

    /// `Loading -> Ready | Failed`. Ignored from any other state.
    pub fn complete(&self, outcome: Result<Arc<dyn ScoringModel>>) {
        let mut state = self.state.write();
        if !matches!(*state, ModelState::Loading) {
            warn!(
                "Ignoring model load result in state {}",
                status_of(&state)
            );
            return;
        }

        *state = match outcome {
            Ok(model) => {
                info!("Model '{}' ready", model.name());
                ModelState::Ready(model)
            }
            Err(e) => {
                error!("Model unavailable: {}", e);
                ModelState::Failed(e.to_string())
            }
        };
    }

    /// The loaded model, or `ModelUnavailable`
    pub fn model(&self) -> Result<Arc<dyn ScoringModel>> {
        match &*self.state.read() {
            ModelState::Ready(model) => Ok(model.clone()),
            _ => Err(Error::ModelUnavailable),
        }
    }

    pub fn status(&self) -> ModelStatus {
        status_of(&self.state.read())
    }

    pub fn is_loaded(&self) -> bool {
        self.status() == ModelStatus::Ready
    }

    /// Failure reason, if loading failed
    pub fn failure(&self) -> Option<String> {
        match &*self.state.read() {
            ModelState::Failed(reason) => Some(reason.clone()),
            _ => None,
        }
    }
}

impl Default for ModelHandle {
    fn default() -> Self {
        Self::new()
    }
}

fn status_of(state: &ModelState) -> ModelStatus {
    match state {
        ModelState::Unloaded => ModelStatus::Unloaded,
        ModelState::Loading => ModelStatus::Loading,
        ModelState::Ready(_) => ModelStatus::Ready,
        ModelState::Failed(_) => ModelStatus::Failed,
    }
}
