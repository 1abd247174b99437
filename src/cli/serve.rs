use std::sync::Arc;

use anyhow::Result;
use tokio::sync::broadcast;

use crate::core::config::RelayConfig;
use crate::core::terminal::{GuideSection, print_goodbye, print_link, print_warn};
use crate::core::tools::RelayTools;
use crate::interfaces::web::ApiServer;

pub(super) async fn run_serve(
    config: &RelayConfig,
    host: String,
    port: u16,
    log_tx: broadcast::Sender<String>,
) -> Result<()> {
    let tools = RelayTools::from_config(config)?;

    let missing = config.missing_research_vars();
    if !missing.is_empty() {
        print_warn(&format!(
            "deep_research disabled until these are set: {}",
            missing.join(", ")
        ));
    }

    let search = config
        .search_agent_id
        .as_deref()
        .unwrap_or("not configured");
    let retry = &config.file.retry;
    GuideSection::new("Relay")
        .status("Search agent", search)
        .status(
            "Query polling",
            &format!(
                "every {}ms, {}s timeout",
                config.file.query.poll_interval_ms, config.file.query.timeout_secs
            ),
        )
        .status(
            "Research polling",
            &format!("every {}s", config.file.research.poll_interval_secs),
        )
        .status(
            "Retries",
            &format!("up to {} ({:?} thread)", retry.max_attempts, retry.thread_mode),
        )
        .print();
    print_link("API", &format!("http://{}:{}/api/health", host, port));

    ApiServer::new(Arc::new(tools), log_tx, host, port).run().await?;
    print_goodbye();
    Ok(())
}
