use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;
use tracing::{info, warn};
use url::Url;

use crate::core::agents::AgentBlueprint;
use crate::core::orchestrator::{OrchestratorConfig, RetryThreadMode};
use crate::core::report::ReportFormat;
use crate::core::retry::{DEFAULT_MAX_ATTEMPTS, RetryPolicy};

pub const ENDPOINT_VARS: [&str; 2] = ["AZURE_AI_FOUNDRY_PROJECT_ENDPOINT", "PROJECT_ENDPOINT"];
const CREDENTIAL_VARS: [&str; 3] = ["AZURE_TENANT_ID", "AZURE_CLIENT_ID", "AZURE_CLIENT_SECRET"];
const BLUEPRINT_VARS: [&str; 3] = [
    "MODEL_DEPLOYMENT_NAME",
    "DEEP_RESEARCH_MODEL_DEPLOYMENT_NAME",
    "BING_RESOURCE_NAME",
];

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing required environment variables: {}", .0.join(", "))]
    Missing(Vec<&'static str>),
    #[error("invalid value for {key}: {reason}")]
    Invalid { key: &'static str, reason: String },
    #[error("failed to read {}: {source}", .path.display())]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("invalid config file: {0}")]
    Parse(#[from] toml::de::Error),
}

/// Tuning knobs from the optional TOML file. Every section may be omitted.
#[derive(Debug, Clone, Deserialize, Default, PartialEq, Eq)]
pub struct FileConfig {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub query: QueryConfig,
    #[serde(default)]
    pub research: ResearchConfig,
    #[serde(default)]
    pub retry: RetryConfig,
}

#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
}

#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
pub struct QueryConfig {
    #[serde(default = "default_query_poll_ms")]
    pub poll_interval_ms: u64,
    #[serde(default = "default_query_timeout_secs")]
    pub timeout_secs: u64,
}

#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
pub struct ResearchConfig {
    #[serde(default = "default_research_poll_secs")]
    pub poll_interval_secs: u64,
    /// Overall cap across retry attempts; unset means each attempt only has its own timeout.
    #[serde(default)]
    pub max_total_secs: Option<u64>,
}

#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
pub struct RetryConfig {
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    #[serde(default = "default_thread_mode")]
    pub thread_mode: RetryThreadMode,
}

fn default_host() -> String {
    "127.0.0.1".to_string()
}
fn default_port() -> u16 {
    8000
}
fn default_query_poll_ms() -> u64 {
    1000
}
fn default_query_timeout_secs() -> u64 {
    300
}
fn default_research_poll_secs() -> u64 {
    10
}
fn default_max_attempts() -> u32 {
    DEFAULT_MAX_ATTEMPTS
}
fn default_thread_mode() -> RetryThreadMode {
    RetryThreadMode::Fresh
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
        }
    }
}

impl Default for QueryConfig {
    fn default() -> Self {
        Self {
            poll_interval_ms: default_query_poll_ms(),
            timeout_secs: default_query_timeout_secs(),
        }
    }
}

impl Default for ResearchConfig {
    fn default() -> Self {
        Self {
            poll_interval_secs: default_research_poll_secs(),
            max_total_secs: None,
        }
    }
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            thread_mode: default_thread_mode(),
        }
    }
}

impl FileConfig {
    pub async fn load(path: &Path) -> Result<Self, ConfigError> {
        let content =
            tokio::fs::read_to_string(path)
                .await
                .map_err(|source| ConfigError::Read {
                    path: path.to_path_buf(),
                    source,
                })?;
        let config = Self::parse(&content)?;
        info!(
            "Loaded config from {}: server={}:{}, retry.max_attempts={}",
            path.display(),
            config.server.host,
            config.server.port,
            config.retry.max_attempts
        );
        Ok(config)
    }

    pub fn parse(content: &str) -> Result<Self, ConfigError> {
        let config: FileConfig = toml::from_str(content)?;
        if config.query.poll_interval_ms == 0 {
            return Err(ConfigError::Invalid {
                key: "query.poll_interval_ms",
                reason: "must be greater than zero".to_string(),
            });
        }
        if config.research.poll_interval_secs == 0 {
            return Err(ConfigError::Invalid {
                key: "research.poll_interval_secs",
                reason: "must be greater than zero".to_string(),
            });
        }
        Ok(config)
    }
}

/// Connection settings for the Foundry project.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FoundrySettings {
    pub endpoint: Url,
    pub tenant_id: String,
    pub client_id: String,
    pub client_secret: String,
}

#[derive(Debug, Clone)]
pub struct RelayConfig {
    foundry: Option<FoundrySettings>,
    missing_foundry: Vec<&'static str>,
    /// `AZURE_AI_FOUNDRY_AGENT_ID`: the Bing-grounded search agent.
    pub search_agent_id: Option<String>,
    /// `AGENT_ID`: a pre-provisioned research agent.
    pub research_agent_id: Option<String>,
    pub blueprint: Option<AgentBlueprint>,
    pub file: FileConfig,
}

impl RelayConfig {
    /// Process environment (after `.env`) plus the optional TOML file.
    pub async fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        load_dotenv();
        let file = match path {
            Some(path) => FileConfig::load(path).await?,
            None => FileConfig::default(),
        };
        Self::from_lookup(
            |key| std::env::var(key).ok().filter(|v| !v.trim().is_empty()),
            file,
        )
    }

    pub fn from_lookup<F>(lookup: F, file: FileConfig) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut missing = Vec::new();

        let endpoint = ENDPOINT_VARS.iter().find_map(|key| lookup(key));
        if endpoint.is_none() {
            missing.push(ENDPOINT_VARS[0]);
        }
        let endpoint = endpoint
            .map(|raw| {
                Url::parse(&raw).map_err(|e| ConfigError::Invalid {
                    key: ENDPOINT_VARS[0],
                    reason: e.to_string(),
                })
            })
            .transpose()?;

        let [tenant_id, client_id, client_secret] = CREDENTIAL_VARS.map(|key| {
            let value = lookup(key);
            if value.is_none() {
                missing.push(key);
            }
            value
        });

        let foundry = match (endpoint, tenant_id, client_id, client_secret) {
            (Some(endpoint), Some(tenant_id), Some(client_id), Some(client_secret)) => {
                Some(FoundrySettings {
                    endpoint,
                    tenant_id,
                    client_id,
                    client_secret,
                })
            }
            _ => None,
        };

        let blueprint = match BLUEPRINT_VARS.map(|key| lookup(key)) {
            [Some(model), Some(deep_research_model), Some(bing_connection_name)] => {
                Some(AgentBlueprint {
                    model,
                    deep_research_model,
                    bing_connection_name,
                })
            }
            _ => None,
        };

        Ok(Self {
            foundry,
            missing_foundry: missing,
            search_agent_id: lookup("AZURE_AI_FOUNDRY_AGENT_ID"),
            research_agent_id: lookup("AGENT_ID"),
            blueprint,
            file,
        })
    }

    pub fn require_foundry(&self) -> Result<&FoundrySettings, ConfigError> {
        self.foundry
            .as_ref()
            .ok_or_else(|| ConfigError::Missing(self.missing_foundry.clone()))
    }

    pub fn require_search_agent(&self) -> Result<&str, ConfigError> {
        self.search_agent_id
            .as_deref()
            .ok_or(ConfigError::Missing(vec!["AZURE_AI_FOUNDRY_AGENT_ID"]))
    }

    /// Variables still needed before a research agent can be resolved.
    pub fn missing_research_vars(&self) -> Vec<&'static str> {
        if self.research_agent_id.is_some() || self.blueprint.is_some() {
            Vec::new()
        } else {
            BLUEPRINT_VARS.to_vec()
        }
    }

    pub fn query_orchestration(&self) -> OrchestratorConfig {
        OrchestratorConfig {
            poll_interval: Duration::from_millis(self.file.query.poll_interval_ms),
            timeout: Duration::from_secs(self.file.query.timeout_secs),
            max_total_duration: None,
            retry: RetryPolicy::new(self.file.retry.max_attempts),
            retry_thread_mode: self.file.retry.thread_mode,
            report_format: ReportFormat::Answer,
        }
    }

    pub fn research_orchestration(&self) -> OrchestratorConfig {
        OrchestratorConfig {
            poll_interval: Duration::from_secs(self.file.research.poll_interval_secs),
            max_total_duration: self.file.research.max_total_secs.map(Duration::from_secs),
            retry: RetryPolicy::new(self.file.retry.max_attempts),
            ..OrchestratorConfig::research()
        }
    }
}

/// Load the nearest `.env` walking up from the working directory.
pub fn load_dotenv() {
    let cwd = match std::env::current_dir() {
        Ok(dir) => dir,
        Err(e) => {
            warn!("Could not determine current directory for .env lookup: {}", e);
            return;
        }
    };

    let mut current = cwd;
    loop {
        let candidate = current.join(".env");
        if candidate.exists() {
            match dotenvy::from_path(&candidate) {
                Ok(_) => info!("Loaded environment from {}", candidate.display()),
                Err(e) => warn!("Failed to load {}: {}", candidate.display(), e),
            }
            return;
        }
        if !current.pop() {
            break;
        }
    }
}
