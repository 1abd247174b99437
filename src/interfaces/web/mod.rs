mod handlers;
mod router;

use std::convert::Infallible;
use std::sync::Arc;

use anyhow::{Context, Result};
use axum::{
    extract::State,
    response::sse::{Event, Sse},
};
use tokio::sync::broadcast;
use tokio_stream::Stream;
use tokio_stream::StreamExt;
use tokio_stream::wrappers::BroadcastStream;
use tracing::info;

use crate::core::tools::RelayTools;

pub use router::build_api_router;

pub struct ApiServer {
    tools: Arc<RelayTools>,
    log_tx: broadcast::Sender<String>,
    host: String,
    port: u16,
}

#[derive(Clone)]
pub struct AppState {
    pub(crate) tools: Arc<RelayTools>,
    pub(crate) log_tx: broadcast::Sender<String>,
    pub(crate) port: u16,
}

impl AppState {
    pub fn new(tools: Arc<RelayTools>, log_tx: broadcast::Sender<String>, port: u16) -> Self {
        Self {
            tools,
            log_tx,
            port,
        }
    }
}

impl ApiServer {
    pub fn new(
        tools: Arc<RelayTools>,
        log_tx: broadcast::Sender<String>,
        host: String,
        port: u16,
    ) -> Self {
        Self {
            tools,
            log_tx,
            host,
            port,
        }
    }

    /// Serve until Ctrl+C.
    pub async fn run(self) -> Result<()> {
        let addr = format!("{}:{}", self.host, self.port);
        let state = AppState::new(self.tools, self.log_tx, self.port);
        let app = router::build_api_router(state);

        let listener = tokio::net::TcpListener::bind(&addr)
            .await
            .with_context(|| format!("failed to bind {}", addr))?;
        info!("API Server running at http://{addr}");
        axum::serve(listener, app)
            .with_graceful_shutdown(async {
                let _ = tokio::signal::ctrl_c().await;
                info!("API Server shutting down...");
            })
            .await?;
        Ok(())
    }
}

// --- SSE Logs (used by router) ---

async fn sse_logs_endpoint(
    State(state): State<AppState>,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    let receiver = state.log_tx.subscribe();
    let stream = BroadcastStream::new(receiver).map(|msg| match msg {
        Ok(log) => Ok(Event::default().data(log)),
        Err(_) => Ok(Event::default().data("Log stream lagged")),
    });

    Sse::new(stream)
}
