use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::core::agent_service::{RemoteRun, RemoteRunStatus, RunError};
use crate::core::report::{Report, ReportFormat};
use crate::core::retry::RetryPolicy;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunState {
    Queued,
    Running,
    Succeeded,
    Failed,
    TimedOut,
    Canceled,
}

impl RunState {
    pub fn as_str(self) -> &'static str {
        match self {
            RunState::Queued => "queued",
            RunState::Running => "running",
            RunState::Succeeded => "succeeded",
            RunState::Failed => "failed",
            RunState::TimedOut => "timed_out",
            RunState::Canceled => "canceled",
        }
    }

    pub fn from_remote(status: RemoteRunStatus) -> Self {
        match status {
            RemoteRunStatus::Queued => RunState::Queued,
            RemoteRunStatus::InProgress
            | RemoteRunStatus::RequiresAction
            | RemoteRunStatus::Cancelling => RunState::Running,
            RemoteRunStatus::Completed | RemoteRunStatus::Succeeded => RunState::Succeeded,
            RemoteRunStatus::Failed
            | RemoteRunStatus::Cancelled
            | RemoteRunStatus::Expired
            | RemoteRunStatus::Incomplete
            | RemoteRunStatus::Unknown => RunState::Failed,
        }
    }

    pub fn is_terminal(self) -> bool {
        !matches!(self, RunState::Queued | RunState::Running)
    }
}

/// How a retry attempt is placed after a transient failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RetryThreadMode {
    /// New thread with the instruction posted again.
    Fresh,
    /// New run on the thread that already holds the instruction.
    Reuse,
}

#[derive(Debug, Clone)]
pub struct OrchestratorConfig {
    pub poll_interval: Duration,
    /// Budget for a single attempt; each retry gets the full budget again.
    pub timeout: Duration,
    /// Optional outer cap: no new attempt starts once this much time has passed.
    pub max_total_duration: Option<Duration>,
    pub retry: RetryPolicy,
    pub retry_thread_mode: RetryThreadMode,
    pub report_format: ReportFormat,
}

impl OrchestratorConfig {
    /// Short agent queries: 1 s cadence, fresh thread per retry.
    pub fn quick_query() -> Self {
        Self {
            poll_interval: Duration::from_secs(1),
            timeout: Duration::from_secs(300),
            max_total_duration: None,
            retry: RetryPolicy::default(),
            retry_thread_mode: RetryThreadMode::Fresh,
            report_format: ReportFormat::Answer,
        }
    }

    /// Long research runs on a conversation thread: 10 s cadence.
    pub fn research() -> Self {
        Self {
            poll_interval: Duration::from_secs(10),
            timeout: Duration::from_secs(1800),
            max_total_duration: None,
            retry: RetryPolicy::default(),
            retry_thread_mode: RetryThreadMode::Reuse,
            report_format: ReportFormat::Research,
        }
    }
}

/// One remote run attempt as tracked by the orchestrator.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Run {
    pub id: String,
    pub thread_id: String,
    pub state: RunState,
    pub last_error: Option<RunError>,
}

impl Run {
    pub fn from_remote(remote: RemoteRun) -> Self {
        let mut run = Run {
            id: remote.id.clone(),
            thread_id: remote.thread_id.clone(),
            state: RunState::Queued,
            last_error: None,
        };
        run.refresh(remote);
        run
    }

    /// Apply a polled snapshot. Failed runs always carry an error.
    pub fn refresh(&mut self, remote: RemoteRun) {
        let next = RunState::from_remote(remote.status);
        if next == RunState::Failed {
            self.last_error = Some(remote.last_error.unwrap_or_else(|| {
                RunError::Text(format!("run ended with status {}", remote.status.as_str()))
            }));
        } else {
            self.last_error = remote.last_error;
        }
        self.advance(next);
    }

    pub fn advance(&mut self, to: RunState) {
        if super::can_transition(self.state, to) {
            self.state = to;
        } else {
            tracing::warn!(
                "Ignoring run {} transition {} -> {}",
                self.id,
                self.state.as_str(),
                to.as_str()
            );
        }
    }
}

#[derive(Debug, Clone)]
pub struct RunRequest {
    pub agent_id: String,
    pub instruction: String,
    /// When set, the run goes to this conversation's persistent thread.
    pub conversation_id: Option<String>,
    /// Overrides the configured per-attempt timeout.
    pub timeout: Option<Duration>,
}

impl RunRequest {
    pub fn new(agent_id: impl Into<String>, instruction: impl Into<String>) -> Self {
        Self {
            agent_id: agent_id.into(),
            instruction: instruction.into(),
            conversation_id: None,
            timeout: None,
        }
    }

    pub fn in_conversation(mut self, conversation_id: impl Into<String>) -> Self {
        self.conversation_id = Some(conversation_id.into());
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }
}

/// Out-of-band notifications delivered before the final [`RunReport`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum RunEvent {
    Note {
        text: String,
    },
    Started {
        thread_id: String,
        run_id: String,
    },
    Progress {
        message_id: String,
        text: String,
    },
    Retrying {
        attempt: u32,
        max_attempts: u32,
        error: String,
    },
    /// The orchestrator stopped watching a run that may still be executing remotely.
    Abandoned {
        thread_id: String,
        run_id: String,
        reason: RunState,
    },
}

/// Event sink and cancellation signal for one orchestration call.
#[derive(Clone, Default)]
pub struct RunContext {
    events: Option<mpsc::UnboundedSender<RunEvent>>,
    cancel: CancellationToken,
}

impl RunContext {
    pub fn new(events: mpsc::UnboundedSender<RunEvent>, cancel: CancellationToken) -> Self {
        Self {
            events: Some(events),
            cancel,
        }
    }

    pub fn with_events(events: mpsc::UnboundedSender<RunEvent>) -> Self {
        Self::new(events, CancellationToken::new())
    }

    pub fn cancel_token(&self) -> &CancellationToken {
        &self.cancel
    }

    pub fn emit(&self, event: RunEvent) {
        if let Some(tx) = &self.events {
            let _ = tx.send(event); // receiver may have gone away
        }
    }

    pub fn note(&self, text: impl Into<String>) {
        self.emit(RunEvent::Note { text: text.into() });
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunReport {
    pub success: bool,
    pub outcome: RunState,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub thread_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub run_id: Option<String>,
    pub result: String,
    #[serde(default)]
    pub citations: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default)]
    pub retries: u32,
}

impl RunReport {
    pub fn succeeded(run: &Run, report: Report, retries: u32) -> Self {
        Self {
            success: true,
            outcome: RunState::Succeeded,
            thread_id: Some(run.thread_id.clone()),
            run_id: Some(run.id.clone()),
            result: report.text,
            citations: report.citations,
            error: None,
            retries,
        }
    }

    pub fn unsuccessful(outcome: RunState, error: impl Into<String>) -> Self {
        let error = error.into();
        Self {
            success: false,
            outcome,
            thread_id: None,
            run_id: None,
            result: format!("Error: {}", error),
            citations: Vec::new(),
            error: Some(error),
            retries: 0,
        }
    }

    pub fn failed(error: impl Into<String>) -> Self {
        Self::unsuccessful(RunState::Failed, error)
    }

    pub fn on_thread(mut self, thread_id: &str) -> Self {
        self.thread_id = Some(thread_id.to_string());
        self
    }

    pub fn for_run(mut self, run: &Run) -> Self {
        self.thread_id = Some(run.thread_id.clone());
        self.run_id = Some(run.id.clone());
        self
    }

    /// Replace the failure message, keeping outcome and run identity.
    pub fn reworded(mut self, error: impl Into<String>) -> Self {
        let error = error.into();
        self.result = format!("Error: {}", error);
        self.error = Some(error);
        self
    }

    pub fn after_retries(mut self, retries: u32) -> Self {
        self.retries = retries;
        self
    }
}
