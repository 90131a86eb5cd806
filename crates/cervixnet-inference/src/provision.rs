//! Model artifact provisioning
//!
//! Makes sure a usable local copy of the artifact exists, downloading it at
//! most once, then loads it into the shared [`ModelHandle`]. Nothing here
//! retries: a failure leaves the handle `Failed` and the service keeps
//! serving.

use cervixnet_core::{Error, Result};
use futures::StreamExt;
use hf_hub::{api::sync::Api, Repo, RepoType};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::io::AsyncWriteExt;
use tracing::{debug, info, warn};

use crate::config::{ModelSettings, ModelSourceSpec};
use crate::model::ScoringModel;
use crate::state::ModelHandle;

/// Resolves model artifacts to local files
pub struct Provisioner {
    settings: ModelSettings,
    http_client: reqwest::Client,
}

impl Provisioner {
    pub fn new(settings: ModelSettings) -> Result<Self> {
        let http_client = reqwest::Client::builder()
            .connect_timeout(Duration::from_secs(30))
            .build()
            .map_err(|e| Error::provisioning(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self {
            settings,
            http_client,
        })
    }

    /// Return the path of a local artifact, fetching it if needed
    pub async fn ensure_artifact(&self) -> Result<PathBuf> {
        match &self.settings.source {
            ModelSourceSpec::Url { url } => {
                let local = &self.settings.local_path;
                if is_usable(local, self.settings.min_bytes).await {
                    info!("Using cached model at {}", local.display());
                    return Ok(local.clone());
                }
                self.download(url, local).await?;
                Ok(local.clone())
            }
            ModelSourceSpec::HuggingFace {
                repo_id,
                filename,
                revision,
            } => {
                let repo_id = repo_id.clone();
                let filename = filename.clone();
                let revision = revision.clone().unwrap_or_else(|| "main".to_string());
                tokio::task::spawn_blocking(move || {
                    fetch_from_hub(&repo_id, &revision, &filename)
                })
                .await
                .map_err(|e| Error::provisioning(format!("Hub download task failed: {}", e)))?
            }
            ModelSourceSpec::Local { path } => {
                if !path.exists() {
                    return Err(Error::provisioning(format!(
                        "Model path does not exist: {}",
                        path.display()
                    )));
                }
                Ok(path.clone())
            }
        }
    }

    /// Stream `url` into `<local>.part`, then move it over `local`
    async fn download(&self, url: &str, local: &Path) -> Result<()> {
        info!("Downloading model from {}", url);
        let started = Instant::now();

        let response = self
            .http_client
            .get(url)
            .send()
            .await
            .and_then(|r| r.error_for_status())
            .map_err(|e| Error::provisioning(format!("Failed to download model: {}", e)))?;

        if let Some(parent) = local.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent).await?;
        }

        let partial = partial_path(local);
        let written = match write_body(response, &partial).await {
            Ok(written) => written,
            Err(e) => {
                if let Err(cleanup) = tokio::fs::remove_file(&partial).await {
                    if cleanup.kind() != std::io::ErrorKind::NotFound {
                        warn!("Failed to remove {}: {}", partial.display(), cleanup);
                    }
                }
                return Err(e);
            }
        };

        if written < self.settings.min_bytes {
            warn!(
                "Downloaded model is only {} bytes (expected at least {})",
                written, self.settings.min_bytes
            );
        }

        tokio::fs::rename(&partial, local).await?;
        metrics::counter!("cervixnet_model_downloads_total").increment(1);
        info!(
            "Model downloaded to {} ({} bytes in {:.1}s)",
            local.display(),
            written,
            started.elapsed().as_secs_f64()
        );
        Ok(())
    }
}

/// Fetch the artifact, load it with `loader` on the blocking pool, and record
/// the outcome in `handle`. Never returns an error.
pub async fn provision<F>(handle: Arc<ModelHandle>, settings: ModelSettings, loader: F)
where
    F: FnOnce(PathBuf) -> Result<Arc<dyn ScoringModel>> + Send + 'static,
{
    if let Err(e) = handle.begin_loading() {
        warn!("Skipping provisioning: {}", e);
        return;
    }

    let outcome: Result<Arc<dyn ScoringModel>> = async {
        let provisioner = Provisioner::new(settings)?;
        let path = provisioner.ensure_artifact().await?;
        debug!("Loading model from {}", path.display());
        tokio::task::spawn_blocking(move || loader(path))
            .await
            .map_err(|e| Error::provisioning(format!("Model load task failed: {}", e)))?
    }
    .await;

    handle.complete(outcome);
}

/// Stream the response body into `path`, returning the byte count
async fn write_body(response: reqwest::Response, path: &Path) -> Result<u64> {
    let mut file = tokio::fs::File::create(path).await?;
    let mut stream = response.bytes_stream();
    let mut written: u64 = 0;

    while let Some(chunk) = stream.next().await {
        let chunk =
            chunk.map_err(|e| Error::provisioning(format!("Model download interrupted: {}", e)))?;
        file.write_all(&chunk).await?;
        written += chunk.len() as u64;
    }
    file.flush().await?;
    Ok(written)
}

async fn is_usable(path: &Path, min_bytes: u64) -> bool {
    match tokio::fs::metadata(path).await {
        Ok(meta) if meta.is_file() && meta.len() >= min_bytes => true,
        Ok(meta) => {
            warn!(
                "Cached model at {} looks truncated ({} bytes), downloading again",
                path.display(),
                meta.len()
            );
            false
        }
        Err(_) => false,
    }
}

fn partial_path(local: &Path) -> PathBuf {
    let mut name = local.as_os_str().to_owned();
    name.push(".part");
    PathBuf::from(name)
}

fn fetch_from_hub(repo_id: &str, revision: &str, filename: &str) -> Result<PathBuf> {
    info!("Resolving model from Hugging Face: {} @ {}", repo_id, revision);

    let api = Api::new()
        .map_err(|e| Error::provisioning(format!("Failed to initialize HF API: {}", e)))?;

    let repo = api.repo(Repo::with_revision(
        repo_id.to_string(),
        RepoType::Model,
        revision.to_string(),
    ));

    repo.get(filename)
        .map_err(|e| Error::provisioning(format!("Failed to download model from HF: {}", e)))
}
