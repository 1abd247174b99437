//! The relay's tool operations, shared by the HTTP API and the CLI.

use std::sync::Arc;

use tracing::{error, info};

use crate::core::agent_service::credential::ClientSecretCredential;
use crate::core::agent_service::{AgentInfo, AgentService, FoundryClient};
use crate::core::agents::{AgentDirectory, AgentError, DefaultAgent, render_listing};
use crate::core::config::{ConfigError, RelayConfig};
use crate::core::conversation::ConversationRegistry;
use crate::core::orchestrator::{
    OrchestratorConfig, RunContext, RunOrchestrator, RunReport, RunRequest, RunState,
};
use crate::core::report::NO_RESEARCH_RESULT;
use crate::core::research::{ResearchParams, ResearchRequest, ResearchRequestError};

const SEARCH_NOT_CONFIGURED: &str = "Bing Search service is not initialized. Check AZURE_AI_FOUNDRY_PROJECT_ENDPOINT and AZURE_AI_FOUNDRY_AGENT_ID environment variables.";

pub struct RelayTools {
    directory: AgentDirectory,
    default_agent: DefaultAgent,
    search_agent_id: Option<String>,
    query: RunOrchestrator,
    research: RunOrchestrator,
}

impl RelayTools {
    pub fn new(
        service: Arc<dyn AgentService>,
        search_agent_id: Option<String>,
        default_agent: DefaultAgent,
        query: OrchestratorConfig,
        research: OrchestratorConfig,
    ) -> Self {
        let conversations = Arc::new(ConversationRegistry::new(service.clone()));
        Self {
            directory: AgentDirectory::new(service.clone()),
            default_agent,
            search_agent_id,
            query: RunOrchestrator::new(service.clone(), conversations.clone(), query),
            research: RunOrchestrator::new(service, conversations, research),
        }
    }

    pub fn with_service(service: Arc<dyn AgentService>, config: &RelayConfig) -> Self {
        let default_agent = DefaultAgent::new(
            service.clone(),
            config.research_agent_id.clone(),
            config.blueprint.clone(),
        );
        Self::new(
            service,
            config.search_agent_id.clone(),
            default_agent,
            config.query_orchestration(),
            config.research_orchestration(),
        )
    }

    /// Tools backed by the Foundry project described by `config`.
    pub fn from_config(config: &RelayConfig) -> Result<Self, ConfigError> {
        let foundry = config.require_foundry()?;
        let credential = Arc::new(ClientSecretCredential::new(
            foundry.tenant_id.clone(),
            foundry.client_id.clone(),
            foundry.client_secret.clone(),
        ));
        let client = FoundryClient::new(foundry.endpoint.as_str(), credential);
        Ok(Self::with_service(Arc::new(client), config))
    }

    pub async fn list_agents(&self) -> Result<Vec<AgentInfo>, AgentError> {
        self.directory.list().await
    }

    pub async fn list_agents_markdown(&self) -> String {
        match self.list_agents().await {
            Ok(agents) => render_listing(&agents),
            Err(e) => {
                error!("Error listing agents: {}", e);
                format!("Error listing agents: {}", e)
            }
        }
    }

    pub async fn connect_agent(&self, agent_id: &str, query: &str, ctx: &RunContext) -> RunReport {
        if let Err(e) = self.directory.get(agent_id).await {
            return RunReport::failed(e.to_string());
        }
        self.query
            .execute(&RunRequest::new(agent_id, query), ctx)
            .await
    }

    pub async fn bing_search(&self, query: &str, ctx: &RunContext) -> RunReport {
        let Some(agent_id) = self.search_agent_id.as_deref() else {
            return RunReport::failed(SEARCH_NOT_CONFIGURED);
        };
        self.query
            .execute(&RunRequest::new(agent_id, query), ctx)
            .await
    }

    /// Validation problems are returned before any remote call is made.
    pub async fn deep_research(
        &self,
        params: &ResearchParams,
        ctx: &RunContext,
    ) -> Result<RunReport, ResearchRequestError> {
        let request = ResearchRequest::validate(params)?;

        let agent_id = match self.default_agent.id().await {
            Ok(id) => id,
            Err(e) => {
                error!("Research failed: {}", e);
                return Ok(RunReport::failed(format!("Research failed: {}", e)));
            }
        };

        ctx.note("Starting research...");
        info!(
            "Research started: {} (conversation: {})",
            request.topic, request.conversation_id
        );

        let run = RunRequest::new(agent_id, request.instruction())
            .in_conversation(request.conversation_id.clone())
            .with_timeout(request.timeout);
        let report = self.research.execute(&run, ctx).await;
        info!("Research completed with status: {}", report.outcome.as_str());

        let report = match report.outcome {
            RunState::Succeeded => {
                if report.result != NO_RESEARCH_RESULT {
                    ctx.note("Research completed successfully!");
                }
                report
            }
            RunState::TimedOut => report.reworded(format!(
                "Research request timed out after {} seconds. Please try a shorter timeout.",
                request.timeout.as_secs()
            )),
            _ => report,
        };
        Ok(report)
    }
}
