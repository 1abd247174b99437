//! Boundary with the remote agent service.
//!
//! The orchestration core only talks to [`AgentService`]; [`FoundryClient`]
//! is the production implementation over the Foundry Agents REST API.

pub mod credential;
mod foundry;
#[cfg(test)]
pub(crate) mod mock;

use std::fmt;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

pub use foundry::{DEFAULT_API_VERSION, FoundryClient};

#[derive(Debug, thiserror::Error)]
pub enum ServiceError {
    #[error("{service} API error ({status}): {body}")]
    Http {
        service: &'static str,
        status: u16,
        body: String,
    },
    #[error("transport error: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("unexpected response: {0}")]
    Decode(String),
    #[error("authentication failed: {0}")]
    Auth(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MessageRole {
    User,
    Agent,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Citation {
    pub title: String,
    pub url: String,
}

impl Citation {
    pub fn new(title: impl Into<String>, url: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            url: url.into(),
        }
    }

    /// Title to show for this citation; untitled sources fall back to the URL.
    pub fn label(&self) -> &str {
        if self.title.trim().is_empty() {
            &self.url
        } else {
            &self.title
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AgentMessage {
    pub id: String,
    pub role: MessageRole,
    pub text_segments: Vec<String>,
    pub citations: Vec<Citation>,
}

/// Run status exactly as the remote service reports it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RemoteRunStatus {
    Queued,
    InProgress,
    RequiresAction,
    Cancelling,
    Cancelled,
    Failed,
    Completed,
    Succeeded,
    Expired,
    Incomplete,
    #[serde(other)]
    Unknown,
}

impl RemoteRunStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            RemoteRunStatus::Queued => "queued",
            RemoteRunStatus::InProgress => "in_progress",
            RemoteRunStatus::RequiresAction => "requires_action",
            RemoteRunStatus::Cancelling => "cancelling",
            RemoteRunStatus::Cancelled => "cancelled",
            RemoteRunStatus::Failed => "failed",
            RemoteRunStatus::Completed => "completed",
            RemoteRunStatus::Succeeded => "succeeded",
            RemoteRunStatus::Expired => "expired",
            RemoteRunStatus::Incomplete => "incomplete",
            RemoteRunStatus::Unknown => "unknown",
        }
    }
}

/// Failure payload attached to a failed run.
///
/// The service reports either a `{code, message}` object or a bare string.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunError {
    Structured { code: String, message: String },
    /// An error object with fields beyond `code` and `message`. `raw` is the
    /// whole object as JSON.
    Detailed {
        code: String,
        message: String,
        raw: String,
    },
    Text(String),
}

impl RunError {
    /// Everything the service said about the failure, for pattern matching.
    pub fn full_text(&self) -> String {
        match self {
            RunError::Structured { code, message } => format!("{} {}", code, message),
            RunError::Detailed { raw, .. } => raw.clone(),
            RunError::Text(text) => text.clone(),
        }
    }
}

impl fmt::Display for RunError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RunError::Structured { code, message } | RunError::Detailed { code, message, .. }
                if code.is_empty() =>
            {
                write!(f, "{}", message)
            }
            RunError::Structured { code, message } | RunError::Detailed { code, message, .. } => {
                write!(f, "{}: {}", code, message)
            }
            RunError::Text(text) => write!(f, "{}", text),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteRun {
    pub id: String,
    pub thread_id: String,
    pub status: RemoteRunStatus,
    pub last_error: Option<RunError>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AgentInfo {
    pub id: String,
    pub name: Option<String>,
    pub description: Option<String>,
    pub model: Option<String>,
    pub created_at: Option<i64>,
    pub tools_count: usize,
}

/// Payload for creating a new agent on the service.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AgentDefinition {
    pub name: String,
    pub model: String,
    pub instructions: String,
    pub tools: Vec<serde_json::Value>,
}

#[async_trait]
pub trait AgentService: Send + Sync {
    async fn create_thread(&self) -> Result<String, ServiceError>;

    /// Append a user-authored message to the thread.
    async fn post_message(&self, thread_id: &str, text: &str) -> Result<(), ServiceError>;

    async fn create_run(&self, thread_id: &str, agent_id: &str) -> Result<RemoteRun, ServiceError>;

    async fn get_run(&self, thread_id: &str, run_id: &str) -> Result<RemoteRun, ServiceError>;

    /// Most recent agent-authored message on the thread, if any.
    async fn last_agent_message(&self, thread_id: &str)
    -> Result<Option<AgentMessage>, ServiceError>;

    async fn get_agent(&self, agent_id: &str) -> Result<AgentInfo, ServiceError>;

    async fn list_agents(&self) -> Result<Vec<AgentInfo>, ServiceError>;

    /// Resolve a project connection (e.g. the Bing grounding resource) to its id.
    async fn connection_id(&self, name: &str) -> Result<String, ServiceError>;

    async fn create_agent(&self, definition: &AgentDefinition) -> Result<AgentInfo, ServiceError>;
}
