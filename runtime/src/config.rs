use std::{env, path::PathBuf, time::Duration};

use anyhow::{Context, Result};
use serde::Deserialize;
use tokio::fs;
use tracing::info;

use crate::proxy::ApiKey;

const DEFAULT_CONFIG_PATH: &str = "config/app.yaml";

/// Environment variable holding the provider credential.
pub const API_KEY_VAR: &str = "LANDING_AI_API_KEY";

#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    pub server: ServerConfig,
    pub working_dir: PathBuf,
    #[serde(default)]
    pub workspace: Option<String>,
    #[serde(default)]
    pub provider: ProviderConfig,
    #[serde(default)]
    pub ingest: IngestConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ProviderConfig {
    pub base_url: String,
    pub connect_timeout_secs: u64,
    pub request_timeout_secs: u64,
}

impl Default for ProviderConfig {
    fn default() -> Self {
        Self {
            base_url: "https://api.va.landing.ai".to_string(),
            connect_timeout_secs: 5,
            request_timeout_secs: 600,
        }
    }
}

/// Knobs for the ingestion orchestrator. The deadline bounds each parse call so
/// one hung upload cannot stall the rest of a batch.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct IngestConfig {
    pub parse_deadline_secs: u64,
    pub max_parallel_files: usize,
    pub parse_model: Option<String>,
    pub split: Option<String>,
}

impl Default for IngestConfig {
    fn default() -> Self {
        Self {
            parse_deadline_secs: 300,
            max_parallel_files: 4,
            parse_model: None,
            split: None,
        }
    }
}

impl IngestConfig {
    pub fn parse_deadline(&self) -> Duration {
        Duration::from_secs(self.parse_deadline_secs.max(1))
    }

    pub fn max_parallel(&self) -> usize {
        self.max_parallel_files.max(1)
    }
}

impl AppConfig {
    pub fn from_yaml(contents: &str) -> Result<Self> {
        serde_yaml::from_str(contents).context("invalid application config")
    }

    /// `WORKSPACE` from the environment wins over the config file.
    pub fn effective_workspace(&self) -> Option<String> {
        env::var("WORKSPACE")
            .ok()
            .or_else(|| self.workspace.clone())
            .map(|value| value.trim().to_string())
            .filter(|value| !value.is_empty())
    }
}

pub async fn load_config() -> Result<AppConfig> {
    let path = config_path();
    let contents = fs::read_to_string(&path)
        .await
        .with_context(|| format!("Failed to read config file at {}", path.display()))?;
    let config = AppConfig::from_yaml(&contents)
        .with_context(|| format!("Failed to parse config file at {}", path.display()))?;
    info!(path = %path.display(), "Configuration loaded from disk");
    Ok(config)
}

pub fn config_path() -> PathBuf {
    env::var("APP_CONFIG_PATH")
        .map(PathBuf::from)
        .unwrap_or_else(|_| PathBuf::from(DEFAULT_CONFIG_PATH))
}

/// Resolved once at startup; blank values count as missing.
pub fn provider_api_key() -> Option<ApiKey> {
    ApiKey::new(env::var(API_KEY_VAR).ok())
}
