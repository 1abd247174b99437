//! Scripted in-memory [`AgentService`] for unit tests.

use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;

use async_trait::async_trait;

use super::{
    AgentDefinition, AgentInfo, AgentMessage, AgentService, Citation, MessageRole, RemoteRun,
    RemoteRunStatus, RunError, ServiceError,
};

/// One observable status of a scripted run; `publish` lands on the thread
/// when the step is reported.
#[derive(Debug, Clone)]
pub struct Step {
    pub status: RemoteRunStatus,
    pub error: Option<RunError>,
    pub publish: Option<AgentMessage>,
}

impl Step {
    pub fn status(status: RemoteRunStatus) -> Self {
        Self {
            status,
            error: None,
            publish: None,
        }
    }

    pub fn failed(error: RunError) -> Self {
        Self {
            status: RemoteRunStatus::Failed,
            error: Some(error),
            publish: None,
        }
    }

    pub fn publishing(mut self, message: AgentMessage) -> Self {
        self.publish = Some(message);
        self
    }
}

pub fn agent_message(id: &str, text: &str, citations: &[(&str, &str)]) -> AgentMessage {
    AgentMessage {
        id: id.to_string(),
        role: MessageRole::Agent,
        text_segments: vec![text.to_string()],
        citations: citations
            .iter()
            .map(|(title, url)| Citation::new(*title, *url))
            .collect(),
    }
}

pub fn bing_ast_error() -> RunError {
    RunError::Structured {
        code: "tool_server_error".to_string(),
        message: "bing_grounding_server_error: failed to build BingGroundingRequestParam: \
                  expected str, got ast.Name object"
            .to_string(),
    }
}

#[derive(Default)]
struct State {
    threads: usize,
    posted: Vec<(String, String)>,
    run_scripts: VecDeque<Vec<Step>>,
    runs: HashMap<String, (String, VecDeque<Step>)>,
    created_runs: Vec<(String, String)>,
    messages: HashMap<String, Vec<AgentMessage>>,
    failing_message_reads: usize,
    failing_thread_creations: Vec<usize>,
    failing_polls: HashMap<String, usize>,
    message_reads: usize,
    agents: HashMap<String, AgentInfo>,
    agent_lookups: usize,
    created_agents: Vec<AgentDefinition>,
    connections: HashMap<String, String>,
}

#[derive(Default)]
pub struct ScriptedService {
    state: Mutex<State>,
}

impl ScriptedService {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue the status sequence for the next created run. The last step
    /// repeats once the script is exhausted.
    pub fn script_run(&self, steps: Vec<Step>) -> &Self {
        self.state.lock().unwrap().run_scripts.push_back(steps);
        self
    }

    pub fn fail_message_reads(&self, count: usize) -> &Self {
        self.state.lock().unwrap().failing_message_reads = count;
        self
    }

    /// Make the `nth` (1-based) `create_thread` call fail with a transport-like error.
    pub fn fail_thread_creation(&self, nth: usize) -> &Self {
        self.state.lock().unwrap().failing_thread_creations.push(nth);
        self
    }

    /// The first `count` polls of `run_id` fail without consuming its script.
    pub fn fail_polls(&self, run_id: &str, count: usize) -> &Self {
        self.state
            .lock()
            .unwrap()
            .failing_polls
            .insert(run_id.to_string(), count);
        self
    }

    pub fn with_agent(&self, id: &str, name: &str) -> &Self {
        self.state.lock().unwrap().agents.insert(
            id.to_string(),
            AgentInfo {
                id: id.to_string(),
                name: Some(name.to_string()),
                description: None,
                model: Some("gpt-4o".to_string()),
                created_at: Some(1_700_000_000),
                tools_count: 1,
            },
        );
        self
    }

    pub fn with_connection(&self, name: &str, id: &str) -> &Self {
        self.state
            .lock()
            .unwrap()
            .connections
            .insert(name.to_string(), id.to_string());
        self
    }

    pub fn threads_created(&self) -> usize {
        self.state.lock().unwrap().threads
    }

    pub fn runs_created(&self) -> Vec<(String, String)> {
        self.state.lock().unwrap().created_runs.clone()
    }

    pub fn posted_messages(&self) -> Vec<(String, String)> {
        self.state.lock().unwrap().posted.clone()
    }

    pub fn message_reads(&self) -> usize {
        self.state.lock().unwrap().message_reads
    }

    pub fn agent_lookups(&self) -> usize {
        self.state.lock().unwrap().agent_lookups
    }

    pub fn created_agents(&self) -> Vec<AgentDefinition> {
        self.state.lock().unwrap().created_agents.clone()
    }

    pub fn publish(&self, thread_id: &str, message: AgentMessage) {
        self.state
            .lock()
            .unwrap()
            .messages
            .entry(thread_id.to_string())
            .or_default()
            .push(message);
    }

    fn report(state: &mut State, run_id: &str, step: Step) -> Result<RemoteRun, ServiceError> {
        let thread_id = state
            .runs
            .get(run_id)
            .map(|(thread, _)| thread.clone())
            .ok_or_else(|| ServiceError::Decode(format!("unknown run {}", run_id)))?;
        if let Some(message) = step.publish {
            state
                .messages
                .entry(thread_id.clone())
                .or_default()
                .push(message);
        }
        Ok(RemoteRun {
            id: run_id.to_string(),
            thread_id,
            status: step.status,
            last_error: step.error,
        })
    }
}

#[async_trait]
impl AgentService for ScriptedService {
    async fn create_thread(&self) -> Result<String, ServiceError> {
        let mut state = self.state.lock().unwrap();
        state.threads += 1;
        if state.failing_thread_creations.contains(&state.threads) {
            return Err(ServiceError::Decode("connection reset".to_string()));
        }
        Ok(format!("thread_{}", state.threads))
    }

    async fn post_message(&self, thread_id: &str, text: &str) -> Result<(), ServiceError> {
        self.state
            .lock()
            .unwrap()
            .posted
            .push((thread_id.to_string(), text.to_string()));
        Ok(())
    }

    async fn create_run(&self, thread_id: &str, agent_id: &str) -> Result<RemoteRun, ServiceError> {
        let mut state = self.state.lock().unwrap();
        let steps = state
            .run_scripts
            .pop_front()
            .unwrap_or_else(|| vec![Step::status(RemoteRunStatus::Completed)]);
        state
            .created_runs
            .push((thread_id.to_string(), agent_id.to_string()));
        let run_id = format!("run_{}", state.created_runs.len());
        state
            .runs
            .insert(run_id.clone(), (thread_id.to_string(), steps.into()));
        Ok(RemoteRun {
            id: run_id,
            thread_id: thread_id.to_string(),
            status: RemoteRunStatus::Queued,
            last_error: None,
        })
    }

    async fn get_run(&self, _thread_id: &str, run_id: &str) -> Result<RemoteRun, ServiceError> {
        let mut state = self.state.lock().unwrap();
        if let Some(remaining) = state.failing_polls.get_mut(run_id)
            && *remaining > 0
        {
            *remaining -= 1;
            return Err(ServiceError::Http {
                service: "mock",
                status: 502,
                body: "bad gateway".to_string(),
            });
        }
        let step = {
            let (_, steps) = state
                .runs
                .get_mut(run_id)
                .ok_or_else(|| ServiceError::Decode(format!("unknown run {}", run_id)))?;
            if steps.len() > 1 {
                steps.pop_front()
            } else {
                let current = steps.front().cloned();
                // the final step repeats, but publishes only once
                if let Some(front) = steps.front_mut() {
                    front.publish = None;
                }
                current
            }
        };
        let step = step.unwrap_or_else(|| Step::status(RemoteRunStatus::Completed));
        Self::report(&mut state, run_id, step)
    }

    async fn last_agent_message(
        &self,
        thread_id: &str,
    ) -> Result<Option<AgentMessage>, ServiceError> {
        let mut state = self.state.lock().unwrap();
        state.message_reads += 1;
        if state.failing_message_reads > 0 {
            state.failing_message_reads -= 1;
            return Err(ServiceError::Http {
                service: "mock",
                status: 503,
                body: "temporarily unavailable".to_string(),
            });
        }
        Ok(state
            .messages
            .get(thread_id)
            .and_then(|messages| messages.last().cloned()))
    }

    async fn get_agent(&self, agent_id: &str) -> Result<AgentInfo, ServiceError> {
        let mut state = self.state.lock().unwrap();
        state.agent_lookups += 1;
        state
            .agents
            .get(agent_id)
            .cloned()
            .ok_or_else(|| ServiceError::Http {
                service: "mock",
                status: 404,
                body: format!("no assistant found with id '{}'", agent_id),
            })
    }

    async fn list_agents(&self) -> Result<Vec<AgentInfo>, ServiceError> {
        let state = self.state.lock().unwrap();
        let mut agents: Vec<AgentInfo> = state.agents.values().cloned().collect();
        agents.sort_by(|a, b| a.id.cmp(&b.id));
        Ok(agents)
    }

    async fn connection_id(&self, name: &str) -> Result<String, ServiceError> {
        self.state
            .lock()
            .unwrap()
            .connections
            .get(name)
            .cloned()
            .ok_or_else(|| ServiceError::Http {
                service: "mock",
                status: 404,
                body: format!("connection '{}' not found", name),
            })
    }

    async fn create_agent(&self, definition: &AgentDefinition) -> Result<AgentInfo, ServiceError> {
        let mut state = self.state.lock().unwrap();
        state.created_agents.push(definition.clone());
        let info = AgentInfo {
            id: format!("asst_{}", state.created_agents.len()),
            name: Some(definition.name.clone()),
            description: None,
            model: Some(definition.model.clone()),
            created_at: None,
            tools_count: definition.tools.len(),
        };
        state.agents.insert(info.id.clone(), info.clone());
        Ok(info)
    }
}
