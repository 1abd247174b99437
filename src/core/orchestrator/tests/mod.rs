
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;

use super::{OrchestratorConfig, RetryThreadMode, RunEvent, RunOrchestrator};
use crate::core::agent_service::mock::ScriptedService;
use crate::core::conversation::ConversationRegistry;

fn orchestrator(service: &Arc<ScriptedService>, config: OrchestratorConfig) -> RunOrchestrator {
    let registry = Arc::new(ConversationRegistry::new(service.clone()));
    RunOrchestrator::new(service.clone(), registry, config)
}

fn fast_config(mode: RetryThreadMode) -> OrchestratorConfig {
    OrchestratorConfig {
        poll_interval: Duration::from_millis(10),
        timeout: Duration::from_secs(30),
        retry_thread_mode: mode,
        ..OrchestratorConfig::quick_query()
    }
}

fn drain(rx: &mut mpsc::UnboundedReceiver<RunEvent>) -> Vec<RunEvent> {
    let mut events = Vec::new();
    while let Ok(event) = rx.try_recv() {
        events.push(event);
    }
    events
}
