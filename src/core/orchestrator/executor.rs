use std::sync::Arc;
use std::time::Duration;

use tokio::time::Instant;
use tracing::{debug, error, info, warn};

use super::types::{
    OrchestratorConfig, RetryThreadMode, Run, RunContext, RunEvent, RunReport, RunRequest,
    RunState,
};
use crate::core::agent_service::{AgentService, RunError, ServiceError};
use crate::core::conversation::ConversationRegistry;
use crate::core::progress::ProgressReporter;
use crate::core::report;

/// Shortest pause between polls.
const MIN_PAUSE: Duration = Duration::from_millis(1);

/// Drives one instruction through submit, poll, retry and result assembly.
#[derive(Clone)]
pub struct RunOrchestrator {
    service: Arc<dyn AgentService>,
    conversations: Arc<ConversationRegistry>,
    progress: ProgressReporter,
    config: OrchestratorConfig,
}

impl RunOrchestrator {
    pub fn new(
        service: Arc<dyn AgentService>,
        conversations: Arc<ConversationRegistry>,
        config: OrchestratorConfig,
    ) -> Self {
        Self {
            progress: ProgressReporter::new(service.clone()),
            service,
            conversations,
            config,
        }
    }

    pub fn config(&self) -> &OrchestratorConfig {
        &self.config
    }

    /// Run `request` to a terminal outcome. Remote failures never escape as
    /// errors; they are folded into an unsuccessful [`RunReport`].
    pub async fn execute(&self, request: &RunRequest, ctx: &RunContext) -> RunReport {
        let started = Instant::now();
        let timeout = request.timeout.unwrap_or(self.config.timeout);

        let thread_id = match self.open_thread(request).await {
            Ok(thread_id) => thread_id,
            Err(e) => {
                error!("Failed to open thread for agent {}: {}", request.agent_id, e);
                return RunReport::failed(format!("Failed to open thread: {}", e));
            }
        };

        // Earlier answers on a conversation thread are not progress for this request.
        let mut watermark = match request.conversation_id {
            Some(_) => self.prime_watermark(&thread_id).await,
            None => None,
        };

        let mut run = match self
            .submit(&thread_id, &request.agent_id, &request.instruction)
            .await
        {
            Ok(run) => run,
            Err(e) => {
                error!("Failed to submit instruction on thread {}: {}", thread_id, e);
                return RunReport::failed(format!("Failed to submit instruction: {}", e))
                    .on_thread(&thread_id);
            }
        };
        let mut retries = 0u32;
        // Most recent transient run failure; what the caller sees if retries run dry.
        let mut last_failure: Option<String> = None;

        loop {
            info!(
                "Started run {} on thread {} for agent {} (attempt {})",
                run.id,
                run.thread_id,
                request.agent_id,
                retries + 1
            );
            ctx.emit(RunEvent::Started {
                thread_id: run.thread_id.clone(),
                run_id: run.id.clone(),
            });

            let attempt_started = Instant::now();
            if let Err(e) = self.drive(&mut run, timeout, &mut watermark, ctx).await {
                error!("Polling run {} failed: {}", run.id, e);
                let Some(failure) = last_failure.clone() else {
                    return RunReport::failed(format!("Failed to poll run: {}", e))
                        .for_run(&run)
                        .after_retries(retries);
                };
                // A retry attempt that breaks on the service side uses up that attempt.
                let next = self
                    .next_attempt(
                        request,
                        &run,
                        &mut retries,
                        &mut watermark,
                        started,
                        ctx,
                        e.to_string(),
                    )
                    .await;
                match next {
                    Some(next) => {
                        run = next;
                        continue;
                    }
                    None => {
                        return RunReport::failed(failure)
                            .for_run(&run)
                            .after_retries(retries);
                    }
                }
            }

            match run.state {
                RunState::Succeeded => {
                    info!("Run {} completed", run.id);
                    let in_conversation = request.conversation_id.is_some();
                    return self
                        .finalize(&run, in_conversation, &mut watermark, ctx, retries)
                        .await;
                }
                RunState::TimedOut => {
                    self.abandon(&run, ctx);
                    return RunReport::unsuccessful(
                        RunState::TimedOut,
                        format!(
                            "Run timed out after {} seconds",
                            attempt_started.elapsed().as_secs()
                        ),
                    )
                    .for_run(&run)
                    .after_retries(retries);
                }
                RunState::Canceled => {
                    self.abandon(&run, ctx);
                    return RunReport::unsuccessful(RunState::Canceled, "Run canceled by caller")
                        .for_run(&run)
                        .after_retries(retries);
                }
                RunState::Failed => {
                    let failure = run
                        .last_error
                        .clone()
                        .unwrap_or_else(|| RunError::Text("unknown error".to_string()));
                    let message = format!("Agent run failed: {}", failure);

                    if !self.config.retry.should_retry(&failure, retries) {
                        warn!("Run {} failed: {}", run.id, failure);
                        return RunReport::failed(message)
                            .for_run(&run)
                            .after_retries(retries);
                    }

                    last_failure = Some(message.clone());
                    let next = self
                        .next_attempt(
                            request,
                            &run,
                            &mut retries,
                            &mut watermark,
                            started,
                            ctx,
                            failure.to_string(),
                        )
                        .await;
                    match next {
                        Some(next) => run = next,
                        None => {
                            return RunReport::failed(message)
                                .for_run(&run)
                                .after_retries(retries);
                        }
                    }
                }
                RunState::Queued | RunState::Running => {
                    return RunReport::failed(format!(
                        "Run {} stopped in state {}",
                        run.id,
                        run.state.as_str()
                    ))
                    .for_run(&run)
                    .after_retries(retries);
                }
            }
        }
    }

    /// Start the attempt that follows a transient failure of `failed`.
    ///
    /// A service error while starting it counts as a used attempt and the next
    /// one is tried. `None` once the attempts or the overall budget are spent.
    #[allow(clippy::too_many_arguments)]
    async fn next_attempt(
        &self,
        request: &RunRequest,
        failed: &Run,
        retries: &mut u32,
        watermark: &mut Option<String>,
        started: Instant,
        ctx: &RunContext,
        mut reason: String,
    ) -> Option<Run> {
        let max_attempts = self.config.retry.max_attempts;
        // A conversation keeps its thread across retries.
        let fresh = self.config.retry_thread_mode == RetryThreadMode::Fresh
            && request.conversation_id.is_none();

        loop {
            if *retries >= max_attempts {
                warn!(
                    "Run {} still failing after {} retries, giving up",
                    failed.id, retries
                );
                return None;
            }
            if let Some(cap) = self.config.max_total_duration
                && started.elapsed() >= cap
            {
                warn!(
                    "Run {} failed transiently but the {}s overall budget is spent",
                    failed.id,
                    cap.as_secs()
                );
                return None;
            }

            *retries += 1;
            warn!(
                "Transient failure on run {}, retrying ({}/{}): {}",
                failed.id, retries, max_attempts, reason
            );
            ctx.emit(RunEvent::Retrying {
                attempt: *retries,
                max_attempts,
                error: reason.clone(),
            });

            let next = if fresh {
                *watermark = None;
                self.resubmit(request).await
            } else {
                self.start_run(&failed.thread_id, &request.agent_id).await
            };
            match next {
                Ok(run) => return Some(run),
                Err(e) => {
                    error!("Retry {} for run {} could not start: {}", retries, failed.id, e);
                    reason = e.to_string();
                }
            }
        }
    }

    /// Post `instruction` to the thread and start a run of `agent_id` on it.
    pub async fn submit(
        &self,
        thread_id: &str,
        agent_id: &str,
        instruction: &str,
    ) -> Result<Run, ServiceError> {
        self.service.post_message(thread_id, instruction).await?;
        self.start_run(thread_id, agent_id).await
    }

    /// Refresh a live run from the service. Terminal runs are left untouched.
    pub async fn poll(&self, run: &mut Run) -> Result<(), ServiceError> {
        if run.state.is_terminal() {
            return Ok(());
        }
        let remote = self.service.get_run(&run.thread_id, &run.id).await?;
        run.refresh(remote);
        Ok(())
    }

    /// Poll until the run is terminal, the per-attempt timeout elapses or the
    /// caller cancels. Progress is checked before every pause.
    async fn drive(
        &self,
        run: &mut Run,
        timeout: Duration,
        watermark: &mut Option<String>,
        ctx: &RunContext,
    ) -> Result<(), ServiceError> {
        let started = Instant::now();
        while !run.state.is_terminal() {
            let elapsed = started.elapsed();
            if elapsed > timeout {
                self.check_progress(&run.thread_id, watermark, ctx).await;
                run.advance(RunState::TimedOut);
                break;
            }

            self.check_progress(&run.thread_id, watermark, ctx).await;

            // Never zero, so a loop sitting exactly on the deadline still moves past it.
            let pause = self
                .config
                .poll_interval
                .min(timeout - elapsed)
                .max(MIN_PAUSE);
            tokio::select! {
                biased;
                _ = ctx.cancel_token().cancelled() => {
                    info!("Run {} canceled by caller", run.id);
                    run.advance(RunState::Canceled);
                    break;
                }
                _ = tokio::time::sleep(pause) => {}
            }

            self.poll(run).await?;
        }
        Ok(())
    }

    async fn finalize(
        &self,
        run: &Run,
        in_conversation: bool,
        watermark: &mut Option<String>,
        ctx: &RunContext,
        retries: u32,
    ) -> RunReport {
        self.check_progress(&run.thread_id, watermark, ctx).await;

        match self.service.last_agent_message(&run.thread_id).await {
            Ok(message) => {
                if in_conversation && let Some(message) = &message {
                    self.conversations
                        .remember_answer(&run.thread_id, &message.id)
                        .await;
                }
                let assembled = report::assemble(message.as_ref(), self.config.report_format);
                RunReport::succeeded(run, assembled, retries)
            }
            Err(e) => {
                error!("Failed to read the answer of run {}: {}", run.id, e);
                RunReport::failed(format!("Failed to read agent response: {}", e))
                    .for_run(run)
                    .after_retries(retries)
            }
        }
    }

    async fn check_progress(
        &self,
        thread_id: &str,
        watermark: &mut Option<String>,
        ctx: &RunContext,
    ) {
        if let Some(update) = self.progress.diff(thread_id, watermark.as_deref()).await {
            ctx.emit(RunEvent::Progress {
                message_id: update.message_id.clone(),
                text: update.text,
            });
            *watermark = Some(update.message_id);
        }
    }

    fn abandon(&self, run: &Run, ctx: &RunContext) {
        warn!(
            "Stopped watching run {} on thread {} ({}); it may still be executing remotely",
            run.id,
            run.thread_id,
            run.state.as_str()
        );
        ctx.emit(RunEvent::Abandoned {
            thread_id: run.thread_id.clone(),
            run_id: run.id.clone(),
            reason: run.state,
        });
    }

    async fn open_thread(&self, request: &RunRequest) -> Result<String, ServiceError> {
        match &request.conversation_id {
            Some(conversation_id) => self.conversations.resolve_thread(conversation_id).await,
            None => self.service.create_thread().await,
        }
    }

    async fn start_run(&self, thread_id: &str, agent_id: &str) -> Result<Run, ServiceError> {
        let remote = self.service.create_run(thread_id, agent_id).await?;
        Ok(Run::from_remote(remote))
    }

    /// Fresh thread carrying the instruction again, with a new run on it.
    async fn resubmit(&self, request: &RunRequest) -> Result<Run, ServiceError> {
        let thread_id = self.service.create_thread().await?;
        self.submit(&thread_id, &request.agent_id, &request.instruction)
            .await
    }

    /// Newest agent message already on a conversation thread. When the read
    /// fails, the last answer this process delivered on the thread stands in.
    async fn prime_watermark(&self, thread_id: &str) -> Option<String> {
        match self.service.last_agent_message(thread_id).await {
            Ok(message) => message.map(|m| m.id),
            Err(e) => {
                debug!("Could not read latest message on thread {}: {}", thread_id, e);
                self.conversations.last_answer(thread_id).await
            }
        }
    }
}
