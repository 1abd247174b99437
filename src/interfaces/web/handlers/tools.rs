use axum::{
    Json,
    extract::State,
    http::StatusCode,
    response::IntoResponse,
    response::sse::{Event, Sse},
};
use serde::Serialize;
use std::convert::Infallible;
use tokio::sync::mpsc;
use tokio_stream::StreamExt;
use tokio_util::sync::CancellationToken;
use tracing::info;

use super::super::AppState;
use crate::core::orchestrator::{RunContext, RunEvent};
use crate::core::research::{ResearchParams, ResearchRequest};

#[derive(serde::Deserialize)]
pub struct ConnectAgentRequest {
    agent_id: String,
    query: String,
}

#[derive(serde::Deserialize)]
pub struct SearchRequest {
    query: String,
}

fn bad_request(error: String) -> axum::response::Response {
    (
        StatusCode::BAD_REQUEST,
        Json(serde_json::json!({ "success": false, "error": error })),
    )
        .into_response()
}

pub async fn connect_agent_endpoint(
    State(state): State<AppState>,
    Json(payload): Json<ConnectAgentRequest>,
) -> axum::response::Response {
    if payload.agent_id.trim().is_empty() || payload.query.trim().is_empty() {
        return bad_request("'agent_id' and 'query' are required".to_string());
    }
    info!("connect_agent: agent={}", payload.agent_id);
    let report = state
        .tools
        .connect_agent(&payload.agent_id, &payload.query, &RunContext::default())
        .await;
    Json(report).into_response()
}

pub async fn bing_search_endpoint(
    State(state): State<AppState>,
    Json(payload): Json<SearchRequest>,
) -> axum::response::Response {
    if payload.query.trim().is_empty() {
        return bad_request("'query' is required".to_string());
    }
    let report = state
        .tools
        .bing_search(&payload.query, &RunContext::default())
        .await;
    Json(report).into_response()
}

fn sse_event(name: &str, value: &impl Serialize) -> Option<Event> {
    Event::default().event(name).json_data(value).ok()
}

fn progress_event(event: &RunEvent) -> Option<Event> {
    sse_event("progress", event)
}

/// Streams `progress` events while the research runs, then one `result` event.
/// A client that disconnects cancels the run.
pub async fn deep_research_endpoint(
    State(state): State<AppState>,
    Json(params): Json<ResearchParams>,
) -> axum::response::Response {
    if let Err(e) = ResearchRequest::validate(&params) {
        return bad_request(e.to_string());
    }

    let (tx, rx) = mpsc::channel::<Event>(32);
    let tools = state.tools.clone();

    tokio::spawn(async move {
        let (event_tx, mut event_rx) = mpsc::unbounded_channel::<RunEvent>();
        let cancel = CancellationToken::new();
        let ctx = RunContext::new(event_tx, cancel.clone());

        let research = tools.deep_research(&params, &ctx);
        tokio::pin!(research);

        let outcome = loop {
            tokio::select! {
                outcome = &mut research => break outcome,
                Some(event) = event_rx.recv() => {
                    if let Some(sse) = progress_event(&event)
                        && tx.send(sse).await.is_err()
                    {
                        cancel.cancel();
                    }
                }
                _ = tx.closed(), if !cancel.is_cancelled() => {
                    info!("Research client disconnected, canceling run");
                    cancel.cancel();
                }
            }
        };

        while let Ok(event) = event_rx.try_recv() {
            if let Some(sse) = progress_event(&event) {
                let _ = tx.send(sse).await;
            }
        }

        let result = match outcome {
            Ok(report) => sse_event("result", &report),
            Err(e) => sse_event(
                "result",
                &serde_json::json!({ "success": false, "error": e.to_string() }),
            ),
        };
        if let Some(result) = result {
            let _ = tx.send(result).await;
        }
    });

    let stream = tokio_stream::wrappers::ReceiverStream::new(rx).map(Ok::<_, Infallible>);
    Sse::new(stream).into_response()
}
