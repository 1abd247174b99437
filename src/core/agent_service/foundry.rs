use std::sync::Arc;

use async_trait::async_trait;
use reqwest::{Client, RequestBuilder};
use serde::Deserialize;
use serde::de::DeserializeOwned;
use serde_json::{Map, Value, json};
use tracing::debug;

use super::credential::ClientSecretCredential;
use super::{
    AgentDefinition, AgentInfo, AgentMessage, AgentService, Citation, MessageRole, RemoteRun,
    RemoteRunStatus, RunError, ServiceError,
};

pub const DEFAULT_API_VERSION: &str = "v1";
const SERVICE_NAME: &str = "Foundry";
/// How far back to look for the latest agent message.
const MESSAGE_SCAN_LIMIT: u32 = 20;

// ── Wire types ──

#[derive(Deserialize)]
struct IdObject {
    id: String,
}

#[derive(Deserialize)]
struct RunObject {
    id: String,
    thread_id: String,
    status: RemoteRunStatus,
    #[serde(default)]
    last_error: Option<LastErrorWire>,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum LastErrorWire {
    Object {
        #[serde(default)]
        code: Option<String>,
        #[serde(default)]
        message: Option<String>,
        #[serde(flatten)]
        extra: Map<String, Value>,
    },
    Text(String),
}

impl From<LastErrorWire> for RunError {
    fn from(wire: LastErrorWire) -> Self {
        match wire {
            LastErrorWire::Object {
                code,
                message,
                extra,
            } if extra.is_empty() => RunError::Structured {
                code: code.unwrap_or_default(),
                message: message.unwrap_or_default(),
            },
            LastErrorWire::Object {
                code,
                message,
                mut extra,
            } => {
                let code = code.unwrap_or_default();
                let message = message.unwrap_or_default();
                extra.insert("code".to_string(), Value::String(code.clone()));
                extra.insert("message".to_string(), Value::String(message.clone()));
                RunError::Detailed {
                    code,
                    message,
                    raw: Value::Object(extra).to_string(),
                }
            }
            LastErrorWire::Text(text) => RunError::Text(text),
        }
    }
}

impl From<RunObject> for RemoteRun {
    fn from(run: RunObject) -> Self {
        RemoteRun {
            id: run.id,
            thread_id: run.thread_id,
            status: run.status,
            last_error: run.last_error.map(RunError::from),
        }
    }
}

#[derive(Deserialize)]
struct ListResponse<T> {
    data: Vec<T>,
}

#[derive(Deserialize)]
struct MessageObject {
    id: String,
    role: String,
    #[serde(default)]
    content: Vec<ContentPart>,
}

#[derive(Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum ContentPart {
    Text { text: TextContent },
    #[serde(other)]
    Other,
}

#[derive(Deserialize)]
struct TextContent {
    value: String,
    #[serde(default)]
    annotations: Vec<Annotation>,
}

#[derive(Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum Annotation {
    UrlCitation { url_citation: UrlCitationWire },
    #[serde(other)]
    Other,
}

#[derive(Deserialize)]
struct UrlCitationWire {
    url: String,
    #[serde(default)]
    title: Option<String>,
}

impl MessageObject {
    fn is_agent(&self) -> bool {
        self.role == "assistant" || self.role == "agent"
    }

    fn into_agent_message(self) -> AgentMessage {
        let mut text_segments = Vec::new();
        let mut citations = Vec::new();
        for part in self.content {
            if let ContentPart::Text { text } = part {
                for annotation in text.annotations {
                    if let Annotation::UrlCitation { url_citation } = annotation {
                        citations.push(Citation::new(
                            url_citation.title.unwrap_or_default(),
                            url_citation.url,
                        ));
                    }
                }
                text_segments.push(text.value);
            }
        }
        AgentMessage {
            id: self.id,
            role: MessageRole::Agent,
            text_segments,
            citations,
        }
    }
}

#[derive(Deserialize)]
struct AgentObject {
    id: String,
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    description: Option<String>,
    #[serde(default)]
    model: Option<String>,
    #[serde(default)]
    created_at: Option<i64>,
    #[serde(default)]
    tools: Vec<Value>,
}

impl From<AgentObject> for AgentInfo {
    fn from(agent: AgentObject) -> Self {
        AgentInfo {
            id: agent.id,
            name: agent.name,
            description: agent.description,
            model: agent.model,
            created_at: agent.created_at,
            tools_count: agent.tools.len(),
        }
    }
}

// ── Client ──

/// REST client for a Foundry project's agents endpoint.
pub struct FoundryClient {
    endpoint: String,
    api_version: String,
    user_agent: String,
    credential: Arc<ClientSecretCredential>,
    client: Client,
}

impl FoundryClient {
    pub fn new(endpoint: impl Into<String>, credential: Arc<ClientSecretCredential>) -> Self {
        Self {
            endpoint: endpoint.into().trim_end_matches('/').to_string(),
            api_version: DEFAULT_API_VERSION.to_string(),
            user_agent: concat!("foundry-relay/", env!("CARGO_PKG_VERSION")).to_string(),
            credential,
            client: Client::new(),
        }
    }

    pub fn with_api_version(mut self, api_version: impl Into<String>) -> Self {
        self.api_version = api_version.into();
        self
    }

    pub fn with_user_agent(mut self, user_agent: impl Into<String>) -> Self {
        self.user_agent = user_agent.into();
        self
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{}", self.endpoint, path.trim_start_matches('/'))
    }

    async fn send<T: DeserializeOwned>(&self, request: RequestBuilder) -> Result<T, ServiceError> {
        let token = self.credential.token().await?;
        let res = request
            .query(&[("api-version", self.api_version.as_str())])
            .bearer_auth(token)
            .header(reqwest::header::USER_AGENT, &self.user_agent)
            .send()
            .await?;

        let status = res.status();
        if !status.is_success() {
            return Err(ServiceError::Http {
                service: SERVICE_NAME,
                status: status.as_u16(),
                body: res.text().await.unwrap_or_default(),
            });
        }
        let body = res.text().await?;
        serde_json::from_str(&body).map_err(|e| ServiceError::Decode(format!("{}: {}", e, body)))
    }
}

#[async_trait]
impl AgentService for FoundryClient {
    async fn create_thread(&self) -> Result<String, ServiceError> {
        let thread: IdObject = self
            .send(self.client.post(self.url("threads")).json(&json!({})))
            .await?;
        debug!("Created thread {}", thread.id);
        Ok(thread.id)
    }

    async fn post_message(&self, thread_id: &str, text: &str) -> Result<(), ServiceError> {
        let body = json!({ "role": "user", "content": text });
        let _: IdObject = self
            .send(
                self.client
                    .post(self.url(&format!("threads/{}/messages", thread_id)))
                    .json(&body),
            )
            .await?;
        Ok(())
    }

    async fn create_run(&self, thread_id: &str, agent_id: &str) -> Result<RemoteRun, ServiceError> {
        let body = json!({ "assistant_id": agent_id });
        let run: RunObject = self
            .send(
                self.client
                    .post(self.url(&format!("threads/{}/runs", thread_id)))
                    .json(&body),
            )
            .await?;
        Ok(run.into())
    }

    async fn get_run(&self, thread_id: &str, run_id: &str) -> Result<RemoteRun, ServiceError> {
        let run: RunObject = self
            .send(
                self.client
                    .get(self.url(&format!("threads/{}/runs/{}", thread_id, run_id))),
            )
            .await?;
        Ok(run.into())
    }

    async fn last_agent_message(
        &self,
        thread_id: &str,
    ) -> Result<Option<AgentMessage>, ServiceError> {
        let limit = MESSAGE_SCAN_LIMIT.to_string();
        let page: ListResponse<MessageObject> = self
            .send(
                self.client
                    .get(self.url(&format!("threads/{}/messages", thread_id)))
                    .query(&[("order", "desc"), ("limit", limit.as_str())]),
            )
            .await?;
        Ok(page
            .data
            .into_iter()
            .find(MessageObject::is_agent)
            .map(MessageObject::into_agent_message))
    }

    async fn get_agent(&self, agent_id: &str) -> Result<AgentInfo, ServiceError> {
        let agent: AgentObject = self
            .send(self.client.get(self.url(&format!("assistants/{}", agent_id))))
            .await?;
        Ok(agent.into())
    }

    async fn list_agents(&self) -> Result<Vec<AgentInfo>, ServiceError> {
        let page: ListResponse<AgentObject> =
            self.send(self.client.get(self.url("assistants"))).await?;
        Ok(page.data.into_iter().map(AgentInfo::from).collect())
    }

    async fn connection_id(&self, name: &str) -> Result<String, ServiceError> {
        let connection: IdObject = self
            .send(self.client.get(self.url(&format!("connections/{}", name))))
            .await?;
        Ok(connection.id)
    }

    async fn create_agent(&self, definition: &AgentDefinition) -> Result<AgentInfo, ServiceError> {
        let agent: AgentObject = self
            .send(self.client.post(self.url("assistants")).json(definition))
            .await?;
        Ok(agent.into())
    }
}
