//! CervixNet Server
//!
//! Serves the CervixNet cervix image classifier over HTTP. The model
//! artifact is fetched and loaded in the background while the server
//! already answers health checks.

use anyhow::Result;
use clap::Parser;
use metrics_exporter_prometheus::PrometheusHandle;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::signal;
use tracing::{info, warn};

use cervixnet_inference::{
    provision, InferenceService, ModelHandle, OnnxModel, ScoringModel, SessionOptions,
};
use cervixnet_server::{create_router, AppState, ConfigOverrides, ServerConfig};

#[derive(Parser, Debug)]
#[command(name = "cervixnet-server")]
#[command(about = "CervixNet cervix image classification server", long_about = None)]
struct Cli {
    /// Configuration file path
    #[arg(short, long, default_value = "config.yaml")]
    config: PathBuf,

    /// Listen address
    #[arg(short = 'l', long, env = "CERVIXNET_LISTEN")]
    listen: Option<String>,

    /// Listen port
    #[arg(short = 'P', long, env = "PORT")]
    port: Option<u16>,

    /// URL of the model artifact
    #[arg(long, env = "MODEL_URL")]
    model_url: Option<String>,

    /// Where the model artifact is cached on disk
    #[arg(long, env = "CERVIXNET_MODEL_PATH")]
    model_path: Option<PathBuf>,

    /// Decision threshold in [0, 1]
    #[arg(short, long, env = "PREDICTION_THRESHOLD")]
    threshold: Option<f64>,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,
}

impl Cli {
    fn overrides(&self) -> ConfigOverrides {
        ConfigOverrides {
            listen: self.listen.clone(),
            port: self.port,
            model_url: self.model_url.clone(),
            model_path: self.model_path.clone(),
            threshold: self.threshold,
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize tracing
    init_tracing(cli.verbose);

    info!("Starting CervixNet server");

    // Load configuration
    let config = ServerConfig::load(&cli.config, &cli.overrides())?;
    info!("Configuration loaded successfully");
    info!("Model source: {:?}", config.model.source);
    info!("Model path: {}", config.model.local_path.display());
    info!(
        "Threshold: {} ({:?})",
        config.classification.threshold, config.classification.comparison
    );

    // Initialize metrics
    let metrics_handle = init_metrics()?;

    let handle = Arc::new(ModelHandle::new());
    let service = InferenceService::new(
        handle.clone(),
        config.classification,
        &config.model,
    );

    let addr: SocketAddr = format!("{}:{}", config.listen, config.port).parse()?;
    let settings = config.model.clone();
    let state = AppState::new(config, service, metrics_handle);
    let app = create_router(state);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!("Listening on http://{}", addr);

    // Load the model in the background; predictions answer 503 until it is ready
    let session_options = SessionOptions::from_settings(&settings);
    tokio::spawn(provision(handle, settings, move |path| {
        let model = OnnxModel::load(path, session_options)?;
        Ok(Arc::new(model) as Arc<dyn ScoringModel>)
    }));

    let shutdown = async {
        shutdown_signal().await;
        warn!("Shutdown signal received, stopping server...");
    };

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown)
        .await?;

    info!("Server shutdown complete");
    Ok(())
}

/// Listen for shutdown signals (SIGTERM, SIGINT)
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            warn!("Failed to install Ctrl+C handler: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                warn!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}

/// Initialize tracing/logging
fn init_tracing(verbose: bool) {
    use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

    let filter = if verbose {
        EnvFilter::new("cervixnet=debug,tower_http=debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("cervixnet=info"))
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer())
        .init();
}

/// Initialize metrics exporter and return handle for rendering
fn init_metrics() -> Result<PrometheusHandle> {
    use metrics_exporter_prometheus::PrometheusBuilder;

    let builder = PrometheusBuilder::new();
    let handle = builder
        .install_recorder()
        .map_err(|e| anyhow::anyhow!("Failed to install metrics: {}", e))?;

    metrics::describe_counter!(
        "cervixnet_requests_total",
        "Total number of requests by endpoint"
    );
    metrics::describe_counter!(
        "cervixnet_predictions_total",
        "Total number of predictions by label"
    );
    metrics::describe_counter!("cervixnet_errors_total", "Total number of errors by kind");
    metrics::describe_counter!(
        "cervixnet_model_downloads_total",
        "Completed model artifact downloads"
    );
    metrics::describe_histogram!(
        "cervixnet_inference_latency_us",
        metrics::Unit::Microseconds,
        "Normalization plus forward pass latency in microseconds"
    );

    info!("Metrics exporter initialized");
    Ok(handle)
}
