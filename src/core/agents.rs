//! Agent lookup and the process-wide default research agent.

use std::collections::HashMap;
use std::sync::Arc;

use serde_json::json;
use tokio::sync::{Mutex, OnceCell};
use tracing::{error, info};

use crate::core::agent_service::{AgentDefinition, AgentInfo, AgentService, ServiceError};

pub const DEFAULT_AGENT_PREFIX: &str = "DeepResearch-MCP";
const RESEARCH_AGENT_INSTRUCTIONS: &str = "You are an intelligent research assistant. Always follow the specific instructions provided in each conversation.";
const LISTING_HEADER: &str = "## Available Azure AI Foundry Agents";
const NO_AGENTS: &str = "No agents found in the Azure AI Foundry Agent Service.";

#[derive(Debug, thiserror::Error)]
pub enum AgentError {
    #[error("Agent not found or inaccessible: {0}")]
    NotFound(String),
    #[error("no default agent configured: set AGENT_ID or the agent blueprint variables")]
    NotConfigured,
    #[error("Failed to create agent: {0}")]
    Setup(ServiceError),
    #[error(transparent)]
    Service(#[from] ServiceError),
}

/// Looks agents up by id, remembering every successful lookup.
pub struct AgentDirectory {
    service: Arc<dyn AgentService>,
    cache: Mutex<HashMap<String, AgentInfo>>,
}

impl AgentDirectory {
    pub fn new(service: Arc<dyn AgentService>) -> Self {
        Self {
            service,
            cache: Mutex::new(HashMap::new()),
        }
    }

    pub async fn get(&self, agent_id: &str) -> Result<AgentInfo, AgentError> {
        if let Some(info) = self.cache.lock().await.get(agent_id) {
            return Ok(info.clone());
        }

        let info = self.service.get_agent(agent_id).await.map_err(|e| {
            error!("Agent retrieval failed - ID: {}, Error: {}", agent_id, e);
            AgentError::NotFound(agent_id.to_string())
        })?;
        self.cache
            .lock()
            .await
            .insert(agent_id.to_string(), info.clone());
        Ok(info)
    }

    pub async fn list(&self) -> Result<Vec<AgentInfo>, AgentError> {
        Ok(self.service.list_agents().await?)
    }
}

pub fn render_listing(agents: &[AgentInfo]) -> String {
    if agents.is_empty() {
        return NO_AGENTS.to_string();
    }
    let mut out = format!("{}\n\n", LISTING_HEADER);
    for agent in agents {
        let name = agent.name.as_deref().unwrap_or("(unnamed)");
        let description = agent
            .description
            .as_deref()
            .filter(|d| !d.trim().is_empty())
            .unwrap_or("No description available");
        out.push_str(&format!(
            "- **{}**: `{}`\n  - Description: {}\n\n",
            name, agent.id, description
        ));
    }
    out
}

/// What to create when no default agent id is configured.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AgentBlueprint {
    pub model: String,
    pub deep_research_model: String,
    pub bing_connection_name: String,
}

impl AgentBlueprint {
    pub fn definition(&self, name: String, bing_connection_id: &str) -> AgentDefinition {
        AgentDefinition {
            name,
            model: self.model.clone(),
            instructions: RESEARCH_AGENT_INSTRUCTIONS.to_string(),
            tools: vec![json!({
                "type": "deep_research",
                "deep_research": {
                    "deep_research_model": self.deep_research_model,
                    "deep_research_bing_grounding_connections": [
                        { "connection_id": bing_connection_id }
                    ]
                }
            })],
        }
    }
}

fn timestamped_name() -> String {
    format!(
        "{}-{}",
        DEFAULT_AGENT_PREFIX,
        chrono::Local::now().format("%Y%m%d_%H%M%S")
    )
}

/// The research agent shared by every request in this process.
///
/// Resolved once: either the configured id or a freshly created agent.
/// Concurrent first callers share one creation; a failed creation is retried
/// by the next caller.
pub struct DefaultAgent {
    service: Arc<dyn AgentService>,
    configured: Option<String>,
    blueprint: Option<AgentBlueprint>,
    resolved: OnceCell<String>,
}

impl DefaultAgent {
    pub fn new(
        service: Arc<dyn AgentService>,
        configured: Option<String>,
        blueprint: Option<AgentBlueprint>,
    ) -> Self {
        Self {
            service,
            configured,
            blueprint,
            resolved: OnceCell::new(),
        }
    }

    pub async fn id(&self) -> Result<String, AgentError> {
        let id = self
            .resolved
            .get_or_try_init(|| async {
                if let Some(id) = &self.configured {
                    info!("Using existing agent: {}", id);
                    return Ok(id.clone());
                }
                let blueprint = self.blueprint.as_ref().ok_or(AgentError::NotConfigured)?;
                self.create(blueprint).await
            })
            .await?;
        Ok(id.clone())
    }

    async fn create(&self, blueprint: &AgentBlueprint) -> Result<String, AgentError> {
        let connection_id = self
            .service
            .connection_id(&blueprint.bing_connection_name)
            .await
            .map_err(AgentError::Setup)?;
        let name = timestamped_name();
        let agent = self
            .service
            .create_agent(&blueprint.definition(name.clone(), &connection_id))
            .await
            .map_err(AgentError::Setup)?;
        info!("Created new agent: {} (ID: {})", name, agent.id);
        Ok(agent.id)
    }
}
