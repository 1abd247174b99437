mod executor;
pub mod types;

pub use executor::RunOrchestrator;
pub use types::{
    OrchestratorConfig, RetryThreadMode, Run, RunContext, RunEvent, RunReport, RunRequest,
    RunState,
};

pub fn can_transition(from: RunState, to: RunState) -> bool {
    if from == to {
        return !from.is_terminal();
    }
    match from {
        RunState::Queued => matches!(
            to,
            RunState::Running
                | RunState::Succeeded
                | RunState::Failed
                | RunState::TimedOut
                | RunState::Canceled
        ),
        RunState::Running => matches!(
            to,
            RunState::Succeeded | RunState::Failed | RunState::TimedOut | RunState::Canceled
        ),
        RunState::Succeeded | RunState::Failed | RunState::TimedOut | RunState::Canceled => false,
    }
}

#[cfg(test)]
mod tests;
