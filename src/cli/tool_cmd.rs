use std::future::Future;

use anyhow::{Result, bail};
use console::style;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use super::AskArgs;
use crate::core::orchestrator::{RunContext, RunEvent, RunReport};
use crate::core::research::ResearchParams;
use crate::core::terminal::{print_info, print_success, print_warn};
use crate::core::tools::RelayTools;

pub(super) async fn run_agents(tools: &RelayTools) -> Result<()> {
    println!("{}", tools.list_agents_markdown().await);
    Ok(())
}

pub(super) async fn run_ask(tools: &RelayTools, args: &AskArgs) -> Result<()> {
    let report = watch(|ctx| async move { tools.connect_agent(&args.agent, &args.query, &ctx).await }).await;
    finish(report)
}

pub(super) async fn run_search(tools: &RelayTools, query: &str) -> Result<()> {
    let report = watch(|ctx| async move { tools.bing_search(query, &ctx).await }).await;
    finish(report)
}

pub(super) async fn run_research(tools: &RelayTools, params: &ResearchParams) -> Result<()> {
    let report = watch(|ctx| async move { tools.deep_research(params, &ctx).await }).await?;
    finish(report)
}

/// Run `op` with events printed to stderr; Ctrl+C cancels the run.
async fn watch<F, Fut, T>(op: F) -> T
where
    F: FnOnce(RunContext) -> Fut,
    Fut: Future<Output = T>,
{
    let (tx, mut rx) = mpsc::unbounded_channel();
    let cancel = CancellationToken::new();
    let ctx = RunContext::new(tx, cancel.clone());

    let printer = tokio::spawn(async move {
        while let Some(event) = rx.recv().await {
            print_event(&event);
        }
    });

    let interrupt = cancel.clone();
    let ctrl_c = tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            print_warn("Interrupted, canceling run...");
            interrupt.cancel();
        }
    });

    let out = op(ctx).await;
    ctrl_c.abort();
    // All senders are gone once `op` returns, so the printer drains and exits.
    let _ = printer.await;
    out
}

fn print_event(event: &RunEvent) {
    match event {
        RunEvent::Note { text } => print_info(text),
        RunEvent::Started { thread_id, run_id } => {
            eprintln!(
                "  {} run {} on {}",
                style("started").dim(),
                style(run_id).cyan(),
                style(thread_id).cyan()
            );
        }
        RunEvent::Progress { text, .. } => {
            eprintln!("{}\n", style(text).dim());
        }
        RunEvent::Retrying {
            attempt,
            max_attempts,
            error,
        } => print_warn(&format!("Retry {}/{}: {}", attempt, max_attempts, error)),
        RunEvent::Abandoned { run_id, reason, .. } => print_warn(&format!(
            "Stopped watching run {} ({}); it may still finish remotely.",
            run_id,
            reason.as_str()
        )),
    }
}

fn finish(report: RunReport) -> Result<()> {
    println!("{}", report.result);
    if !report.success {
        bail!(
            "{}",
            report
                .error
                .unwrap_or_else(|| format!("run ended with status {}", report.outcome.as_str()))
        );
    }
    if report.retries > 0 {
        print_success(&format!("Done after {} retries.", report.retries));
    } else {
        print_success("Done.");
    }
    Ok(())
}
