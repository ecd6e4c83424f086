use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing_subscriber::EnvFilter;

use crate::pipeline::upload::UploadPolicy;

/// Application-level constants
pub const APP_NAME: &str = "Health Risk Profiler";
pub const APP_VERSION: &str = env!("CARGO_PKG_VERSION");

const ENV_OLLAMA_URL: &str = "HEALTH_PROFILER_OLLAMA_URL";
const ENV_TEXT_MODEL: &str = "HEALTH_PROFILER_TEXT_MODEL";
const ENV_VISION_MODEL: &str = "HEALTH_PROFILER_VISION_MODEL";
const ENV_TIMEOUT_SECS: &str = "HEALTH_PROFILER_TIMEOUT_SECS";
const ENV_MAX_FILE_SIZE: &str = "MAX_FILE_SIZE";

/// Log filter used when `RUST_LOG` is not set.
pub fn default_log_filter() -> &'static str {
    "info,health_risk_profiler=debug"
}

/// Install the fmt subscriber for the embedding process.
///
/// Safe to call more than once; later calls are ignored.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(default_log_filter())),
        )
        .try_init();
}

/// Connection settings for the local Ollama server backing both collaborators.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OllamaSettings {
    pub base_url: String,
    pub text_model: String,
    pub vision_model: String,
    /// Per-request HTTP timeout enforced by the client itself.
    pub http_timeout_secs: u64,
}

impl Default for OllamaSettings {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:11434".into(),
            text_model: "medgemma:4b".into(),
            vision_model: "medgemma:4b".into(),
            http_timeout_secs: 300,
        }
    }
}

/// Pipeline configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct PipelineConfig {
    pub ollama: OllamaSettings,
    /// Upper bound on any single collaborator call. `None` means unbounded:
    /// the pipeline then relies on the collaborators' own timeouts.
    pub collaborator_timeout_secs: Option<u64>,
    pub upload: UploadPolicy,
}

impl PipelineConfig {
    pub fn collaborator_timeout(&self) -> Option<Duration> {
        self.collaborator_timeout_secs.map(Duration::from_secs)
    }

    /// Build from process environment variables, falling back to defaults.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build from an arbitrary key lookup. Unparseable numbers keep the default.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let mut config = Self::default();

        if let Some(url) = lookup(ENV_OLLAMA_URL) {
            config.ollama.base_url = url.trim_end_matches('/').to_string();
        }
        if let Some(model) = lookup(ENV_TEXT_MODEL) {
            config.ollama.text_model = model;
        }
        if let Some(model) = lookup(ENV_VISION_MODEL) {
            config.ollama.vision_model = model;
        }
        if let Some(raw) = lookup(ENV_TIMEOUT_SECS) {
            match raw.trim().parse::<u64>() {
                Ok(0) => config.collaborator_timeout_secs = None,
                Ok(secs) => config.collaborator_timeout_secs = Some(secs),
                Err(_) => tracing::warn!(value = %raw, "Ignoring invalid {ENV_TIMEOUT_SECS}"),
            }
        }
        if let Some(raw) = lookup(ENV_MAX_FILE_SIZE) {
            match raw.trim().parse::<u64>() {
                Ok(bytes) => config.upload.max_bytes = bytes,
                Err(_) => tracing::warn!(value = %raw, "Ignoring invalid {ENV_MAX_FILE_SIZE}"),
            }
        }

        config
    }
}
