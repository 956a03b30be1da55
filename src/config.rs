use serde::Deserialize;
use std::path::PathBuf;
use std::time::Duration;
use uuid::Uuid;

use crate::error::{AppError, Result};

#[derive(Debug, Deserialize, Clone)]
pub struct AppConfig {
    pub execution: ExecutionConfig,
    pub hub: HubConfig,
    pub extraction: ExtractionConfig,
    #[serde(default)]
    pub delivery: DeliveryConfig,
    #[serde(default)]
    pub workspace: WorkspaceConfig,
}

/// Identifies the execution this process drives.
#[derive(Debug, Deserialize, Clone)]
pub struct ExecutionConfig {
    pub agent_id: Uuid,
    pub agent_execution_id: Uuid,
    pub workspace_id: Uuid,
}

#[derive(Deserialize, Clone)]
pub struct HubConfig {
    pub endpoint: String,
    pub token: String,
    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,
    #[serde(default = "default_poll_interval")]
    pub poll_interval_secs: u64,
    #[serde(default)]
    pub wait_timeout_secs: Option<u64>,
}

// Manual Debug impl to avoid leaking the access token
impl std::fmt::Debug for HubConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HubConfig")
            .field("endpoint", &self.endpoint)
            .field("token", &"[REDACTED]")
            .field("request_timeout_secs", &self.request_timeout_secs)
            .field("poll_interval_secs", &self.poll_interval_secs)
            .field("wait_timeout_secs", &self.wait_timeout_secs)
            .finish()
    }
}

#[derive(Deserialize, Clone)]
pub struct ExtractionConfig {
    pub endpoint: String,
    pub api_key: String,
    #[serde(default = "default_model")]
    pub model: String,
    /// Azure-style `api-version` query parameter, when the endpoint needs one.
    #[serde(default)]
    pub api_version: Option<String>,
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,
    #[serde(default = "default_extraction_timeout")]
    pub request_timeout_secs: u64,
}

// Manual Debug impl to avoid leaking the API key
impl std::fmt::Debug for ExtractionConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ExtractionConfig")
            .field("endpoint", &self.endpoint)
            .field("api_key", &"[REDACTED]")
            .field("model", &self.model)
            .field("api_version", &self.api_version)
            .field("max_tokens", &self.max_tokens)
            .field("request_timeout_secs", &self.request_timeout_secs)
            .finish()
    }
}

#[derive(Deserialize, Clone)]
pub struct DeliveryConfig {
    #[serde(default = "default_webhook_timeout")]
    pub webhook_timeout_secs: u64,
    /// Dispatch destinations concurrently instead of one after another.
    #[serde(default)]
    pub concurrent: bool,
    #[serde(default)]
    pub signing_secret: Option<String>,
}

impl Default for DeliveryConfig {
    fn default() -> Self {
        Self {
            webhook_timeout_secs: default_webhook_timeout(),
            concurrent: false,
            signing_secret: None,
        }
    }
}

// Manual Debug impl to avoid leaking the signing secret
impl std::fmt::Debug for DeliveryConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DeliveryConfig")
            .field("webhook_timeout_secs", &self.webhook_timeout_secs)
            .field("concurrent", &self.concurrent)
            .field(
                "signing_secret",
                &self.signing_secret.as_ref().map(|_| "[REDACTED]"),
            )
            .finish()
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct WorkspaceConfig {
    #[serde(default = "default_workspace_dir")]
    pub base_dir: PathBuf,
}

impl Default for WorkspaceConfig {
    fn default() -> Self {
        Self {
            base_dir: default_workspace_dir(),
        }
    }
}

fn default_request_timeout() -> u64 {
    30
}

fn default_poll_interval() -> u64 {
    5
}

fn default_model() -> String {
    "gpt-4o".to_string()
}

fn default_max_tokens() -> u32 {
    4096
}

// Model calls over several documents routinely take over a minute.
fn default_extraction_timeout() -> u64 {
    300
}

fn default_webhook_timeout() -> u64 {
    30
}

fn default_workspace_dir() -> PathBuf {
    std::env::temp_dir()
}

impl HubConfig {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval_secs.max(1))
    }

    pub fn wait_timeout(&self) -> Option<Duration> {
        self.wait_timeout_secs.map(Duration::from_secs)
    }
}

impl ExtractionConfig {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}

impl DeliveryConfig {
    pub fn webhook_timeout(&self) -> Duration {
        Duration::from_secs(self.webhook_timeout_secs)
    }
}

impl AppConfig {
    pub fn load(config_path: Option<&str>) -> Result<Self> {
        let mut builder = config::Config::builder();

        // Load from file if specified
        if let Some(path) = config_path {
            builder = builder.add_source(config::File::with_name(path));
        } else {
            builder = builder.add_source(config::File::with_name("courier").required(false));
        }

        // Environment variable overrides with COURIER__ prefix
        builder = builder.add_source(
            config::Environment::with_prefix("COURIER")
                .separator("__")
                .try_parsing(true),
        );

        let config: AppConfig = builder.build()?.try_deserialize()?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<()> {
        if self.hub.token.trim().is_empty() {
            return Err(AppError::Config("hub.token must not be empty".to_string()));
        }
        if !self.hub.endpoint.starts_with("http://") && !self.hub.endpoint.starts_with("https://")
        {
            return Err(AppError::Config(format!(
                "hub.endpoint must be an http(s) URL, got: {}",
                self.hub.endpoint
            )));
        }
        Ok(())
    }
}
