//! Server configuration

use anyhow::Context;
use cervixnet_core::ThresholdPolicy;
use cervixnet_inference::ModelSettings;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Listen address
    #[serde(default = "default_listen")]
    pub listen: String,

    /// Listen port
    #[serde(default = "default_port")]
    pub port: u16,

    /// Largest accepted request body, in bytes
    #[serde(default = "default_max_upload_bytes")]
    pub max_upload_bytes: usize,

    /// Allow cross-origin requests from any origin
    #[serde(default = "default_true")]
    pub cors_allow_any_origin: bool,

    /// Model provisioning and preprocessing
    #[serde(default)]
    pub model: ModelSettings,

    /// Threshold, comparison, and confidence convention
    #[serde(default)]
    pub classification: ThresholdPolicy,
}

/// Values that take precedence over the configuration file, usually from
/// CLI flags or their environment variables
#[derive(Debug, Clone, Default)]
pub struct ConfigOverrides {
    pub listen: Option<String>,
    pub port: Option<u16>,
    pub model_url: Option<String>,
    pub model_path: Option<PathBuf>,
    pub threshold: Option<f64>,
}

impl ServerConfig {
    /// Load configuration from file and apply overrides
    pub fn load(config_path: impl AsRef<Path>, overrides: &ConfigOverrides) -> anyhow::Result<Self> {
        let config_path = config_path.as_ref();

        // Try to load from file, or use defaults
        let mut config = if config_path.exists() {
            let content = std::fs::read_to_string(config_path)
                .with_context(|| format!("Failed to read {}", config_path.display()))?;
            Self::from_yaml(&content)
                .with_context(|| format!("Failed to parse {}", config_path.display()))?
        } else {
            Self::default()
        };

        config.apply(overrides);
        config.validate()?;
        Ok(config)
    }

    /// Load from YAML string
    pub fn from_yaml(yaml: &str) -> Result<Self, serde_yaml::Error> {
        serde_yaml::from_str(yaml)
    }

    /// Apply overrides in place
    pub fn apply(&mut self, overrides: &ConfigOverrides) {
        if let Some(listen) = &overrides.listen {
            self.listen = listen.clone();
        }
        if let Some(port) = overrides.port {
            self.port = port;
        }
        if let Some(url) = &overrides.model_url {
            self.model = self.model.clone().with_url(url.clone());
        }
        if let Some(path) = &overrides.model_path {
            self.model.local_path = path.clone();
        }
        if let Some(threshold) = overrides.threshold {
            self.classification.threshold = threshold;
        }
    }

    pub fn validate(&self) -> anyhow::Result<()> {
        self.classification.validate()?;
        self.model.validate()?;
        if self.max_upload_bytes == 0 {
            anyhow::bail!("configuration error: max_upload_bytes must be positive");
        }
        Ok(())
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            listen: default_listen(),
            port: default_port(),
            max_upload_bytes: default_max_upload_bytes(),
            cors_allow_any_origin: true,
            model: ModelSettings::default(),
            classification: ThresholdPolicy::default(),
        }
    }
}

fn default_listen() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    5000
}

fn default_max_upload_bytes() -> usize {
    16 * 1024 * 1024
}

fn default_true() -> bool {
    true
}
