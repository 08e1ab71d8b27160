use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use figment::providers::{Env, Serialized};
use figment::Figment;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::pipeline::consensus::ReportSettings;
use crate::pipeline::structuring::{LlmError, OllamaClient, OpenAiClient, StructuredClient};

/// Application-level constants
pub const APP_NAME: &str = "Concord";
pub const APP_VERSION: &str = env!("CARGO_PKG_VERSION");

const ENV_PREFIX: &str = "CONCORD_";

const DEFAULT_BIND_ADDR: ([u8; 4], u16) = ([127, 0, 0, 1], 8700);
const DEFAULT_OLLAMA_URL: &str = "http://localhost:11434";
const DEFAULT_OLLAMA_MODEL: &str = "llama3.1:8b";
const DEFAULT_OPENAI_URL: &str = "https://api.openai.com/v1";
const DEFAULT_OPENAI_MODEL: &str = "gpt-4o";
const DEFAULT_LLM_TIMEOUT_SECS: u64 = 120;
const DEFAULT_JOB_DEADLINE_SECS: u64 = 600;
const DEFAULT_EXTRACTION_CONCURRENCY: usize = 4;

/// Get the application data directory
/// ~/Concord/ on all platforms, falling back to the working directory.
pub fn app_data_dir() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(APP_NAME)
}

/// Default database location.
pub fn default_db_path() -> PathBuf {
    app_data_dir().join("concord.db")
}

/// Log filter used when `RUST_LOG` is unset.
pub fn default_log_filter() -> &'static str {
    "concord=info,tower_http=warn"
}

#[derive(Error, Debug)]
pub enum ConfigError {
    /// Figment extraction or merge error.
    #[error("Configuration error: {0}")]
    Figment(#[from] figment::Error),

    #[error("Invalid value for {key}: {value:?} ({reason})")]
    Invalid {
        key: String,
        value: String,
        reason: String,
    },

    #[error("LLM client setup failed: {0}")]
    Client(#[from] LlmError),
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LlmProvider {
    #[default]
    Ollama,
    /// Also accepts `azure`; Azure deployments speak the same protocol.
    #[serde(alias = "azure")]
    OpenAi,
}

impl LlmProvider {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Ollama => "ollama",
            Self::OpenAi => "openai",
        }
    }
}

#[derive(Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct LlmConfig {
    pub provider: LlmProvider,
    /// Falls back to the provider's public endpoint when unset.
    pub base_url: Option<String>,
    pub model: Option<String>,
    pub api_key: Option<String>,
    /// Set for Azure OpenAI deployments.
    pub api_version: Option<String>,
    pub timeout_secs: u64,
}

impl LlmConfig {
    pub fn base_url(&self) -> &str {
        self.base_url.as_deref().unwrap_or(match self.provider {
            LlmProvider::Ollama => DEFAULT_OLLAMA_URL,
            LlmProvider::OpenAi => DEFAULT_OPENAI_URL,
        })
    }

    pub fn model(&self) -> &str {
        self.model.as_deref().unwrap_or(match self.provider {
            LlmProvider::Ollama => DEFAULT_OLLAMA_MODEL,
            LlmProvider::OpenAi => DEFAULT_OPENAI_MODEL,
        })
    }
}

impl std::fmt::Debug for LlmConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LlmConfig")
            .field("provider", &self.provider)
            .field("base_url", &self.base_url)
            .field("model", &self.model)
            .field("api_key", &self.api_key.as_ref().map(|_| "<redacted>"))
            .field("api_version", &self.api_version)
            .field("timeout_secs", &self.timeout_secs)
            .finish()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub db_path: PathBuf,
    pub bind_addr: SocketAddr,
    pub read_only: bool,
    pub reject_concurrent_reports: bool,
    pub job_deadline_secs: u64,
    pub extraction_concurrency: usize,
    pub llm: LlmConfig,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            db_path: default_db_path(),
            bind_addr: SocketAddr::from(DEFAULT_BIND_ADDR),
            read_only: false,
            reject_concurrent_reports: true,
            job_deadline_secs: DEFAULT_JOB_DEADLINE_SECS,
            extraction_concurrency: DEFAULT_EXTRACTION_CONCURRENCY,
            llm: LlmConfig {
                timeout_secs: DEFAULT_LLM_TIMEOUT_SECS,
                ..LlmConfig::default()
            },
        }
    }
}

impl AppConfig {
    /// Load defaults overridden by `CONCORD_*` environment variables.
    pub fn load() -> Result<Self, ConfigError> {
        let config: Self = Self::figment().extract()?;
        config.validated()
    }

    /// Build the figment provider chain.
    ///
    /// `CONCORD_LLM_MODEL` maps to `llm.model`; every other key is top level.
    pub fn figment() -> Figment {
        Figment::from(Serialized::defaults(Self::default())).merge(
            Env::prefixed(ENV_PREFIX).map(|key| {
                let key = key.as_str().to_ascii_lowercase();
                match key.strip_prefix("llm_") {
                    Some(field) => format!("llm.{field}").into(),
                    None => key.into(),
                }
            }),
        )
    }

    fn validated(mut self) -> Result<Self, ConfigError> {
        ensure_positive("JOB_DEADLINE_SECS", self.job_deadline_secs)?;
        ensure_positive("EXTRACTION_CONCURRENCY", self.extraction_concurrency as u64)?;
        ensure_positive("LLM_TIMEOUT_SECS", self.llm.timeout_secs)?;

        // An exported-but-empty variable counts as unset.
        for field in [
            &mut self.llm.base_url,
            &mut self.llm.model,
            &mut self.llm.api_key,
            &mut self.llm.api_version,
        ] {
            if field.as_deref().is_some_and(|v| v.trim().is_empty()) {
                *field = None;
            }
        }
        Ok(self)
    }

    /// Policy handed to the report service.
    pub fn report_settings(&self) -> ReportSettings {
        ReportSettings {
            read_only: self.read_only,
            reject_concurrent: self.reject_concurrent_reports,
            job_deadline: Duration::from_secs(self.job_deadline_secs),
            concurrency: self.extraction_concurrency,
        }
    }

    /// Build the structured-output client for the configured provider.
    pub fn build_client(&self) -> Result<Arc<dyn StructuredClient>, ConfigError> {
        let llm = &self.llm;
        let client: Arc<dyn StructuredClient> = match llm.provider {
            LlmProvider::Ollama => Arc::new(OllamaClient::new(llm.base_url(), llm.model(), llm.timeout_secs)?),
            LlmProvider::OpenAi => Arc::new(OpenAiClient::new(
                llm.base_url(),
                llm.model(),
                llm.api_key.as_deref(),
                llm.api_version.as_deref(),
                llm.timeout_secs,
            )?),
        };
        Ok(client)
    }
}

fn ensure_positive(key: &str, value: u64) -> Result<(), ConfigError> {
    if value == 0 {
        return Err(ConfigError::Invalid {
            key: format!("{ENV_PREFIX}{key}"),
            value: value.to_string(),
            reason: "must be positive".into(),
        });
    }
    Ok(())
}
