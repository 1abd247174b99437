use axum::{
    Router,
    body::Body,
    http::{HeaderValue, Method, Request, header},
    middleware,
    middleware::Next,
    routing::{get, post},
};
use tower_http::cors::CorsLayer;

use super::AppState;
use super::handlers::{agents, tools};

fn build_localhost_cors(port: u16) -> CorsLayer {
    let origins: Vec<HeaderValue> = [
        format!("http://127.0.0.1:{}", port),
        format!("http://localhost:{}", port),
    ]
    .iter()
    .filter_map(|o| o.parse().ok())
    .collect();

    CorsLayer::new()
        .allow_origin(origins)
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers(tower_http::cors::Any)
}

pub fn build_api_router(state: AppState) -> Router {
    Router::new()
        .route("/api/health", get(agents::health_endpoint))
        .route("/api/agents", get(agents::get_agents))
        .route(
            "/api/tools/connect_agent",
            post(tools::connect_agent_endpoint),
        )
        .route("/api/tools/bing_search", post(tools::bing_search_endpoint))
        .route(
            "/api/tools/deep_research",
            post(tools::deep_research_endpoint),
        )
        .route("/api/logs", get(super::sse_logs_endpoint))
        .layer(middleware::from_fn(security_headers))
        .layer(build_localhost_cors(state.port))
        .with_state(state)
}

async fn security_headers(req: Request<Body>, next: Next) -> axum::response::Response {
    let mut response = next.run(req).await;
    let headers = response.headers_mut();
    headers.insert(
        header::X_CONTENT_TYPE_OPTIONS,
        HeaderValue::from_static("nosniff"),
    );
    headers.insert(header::X_FRAME_OPTIONS, HeaderValue::from_static("DENY"));
    response
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::agent_service::RemoteRunStatus;
    use crate::core::agent_service::mock::{ScriptedService, Step, agent_message};
    use crate::core::agents::{AgentBlueprint, DefaultAgent};
    use crate::core::orchestrator::OrchestratorConfig;
    use crate::core::tools::RelayTools;
    use axum::http::StatusCode;
    use std::sync::Arc;
    use std::time::Duration;
    use tower::util::ServiceExt;

    fn state_with(service: &Arc<ScriptedService>) -> AppState {
        let quick = OrchestratorConfig {
            poll_interval: Duration::from_millis(5),
            ..OrchestratorConfig::quick_query()
        };
        let research = OrchestratorConfig {
            poll_interval: Duration::from_millis(5),
            ..OrchestratorConfig::research()
        };
        let default_agent = DefaultAgent::new(
            service.clone(),
            None,
            Some(AgentBlueprint {
                model: "gpt-4o".to_string(),
                deep_research_model: "o3-deep-research".to_string(),
                bing_connection_name: "bing".to_string(),
            }),
        );
        let tools = RelayTools::new(
            service.clone(),
            Some("asst_bing".to_string()),
            default_agent,
            quick,
            research,
        );
        let (log_tx, _) = tokio::sync::broadcast::channel(16);
        AppState::new(Arc::new(tools), log_tx, 8000)
    }

    async fn send(
        app: Router,
        method: Method,
        path: &str,
        body: Option<serde_json::Value>,
    ) -> (StatusCode, String) {
        let body = match body {
            Some(json) => Body::from(serde_json::to_string(&json).unwrap()),
            None => Body::empty(),
        };
        let req = Request::builder()
            .method(method)
            .uri(path)
            .header("content-type", "application/json")
            .body(body)
            .unwrap();
        let resp = app.oneshot(req).await.unwrap();
        let status = resp.status();
        let bytes = axum::body::to_bytes(resp.into_body(), 1024 * 1024)
            .await
            .unwrap();
        (status, String::from_utf8_lossy(&bytes).to_string())
    }

    async fn json_request(
        app: Router,
        method: Method,
        path: &str,
        body: Option<serde_json::Value>,
    ) -> (StatusCode, serde_json::Value) {
        let (status, text) = send(app, method, path, body).await;
        let json = serde_json::from_str(&text).unwrap_or(serde_json::json!({}));
        (status, json)
    }

    #[tokio::test]
    async fn health_reports_ok_with_security_headers() {
        let service = Arc::new(ScriptedService::new());
        let app = build_api_router(state_with(&service));

        let req = Request::builder()
            .uri("/api/health")
            .body(Body::empty())
            .unwrap();
        let resp = app.oneshot(req).await.unwrap();

        assert_eq!(resp.status(), StatusCode::OK);
        assert_eq!(
            resp.headers().get("x-content-type-options").unwrap(),
            "nosniff"
        );
        assert_eq!(resp.headers().get("x-frame-options").unwrap(), "DENY");
    }

    #[tokio::test]
    async fn get_agents_returns_listing_and_json() {
        let service = Arc::new(ScriptedService::new());
        service.with_agent("asst_1", "Search");
        let app = build_api_router(state_with(&service));

        let (status, json) = json_request(app, Method::GET, "/api/agents", None).await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(json["success"], true);
        assert_eq!(json["agents"][0]["id"], "asst_1");
        assert!(
            json["markdown"]
                .as_str()
                .unwrap()
                .starts_with("## Available Azure AI Foundry Agents")
        );
    }

    #[tokio::test]
    async fn connect_agent_returns_run_report() {
        let service = Arc::new(ScriptedService::new());
        service.with_agent("asst_1", "Helper").script_run(vec![
            Step::status(RemoteRunStatus::Completed).publishing(agent_message("msg_1", "pong", &[])),
        ]);
        let app = build_api_router(state_with(&service));

        let (status, json) = json_request(
            app,
            Method::POST,
            "/api/tools/connect_agent",
            Some(serde_json::json!({ "agent_id": "asst_1", "query": "ping" })),
        )
        .await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(json["success"], true);
        assert_eq!(json["result"], "pong");
        assert_eq!(json["outcome"], "succeeded");
        assert_eq!(json["thread_id"], "thread_1");
    }

    #[tokio::test]
    async fn bing_search_rejects_empty_query() {
        let service = Arc::new(ScriptedService::new());
        let app = build_api_router(state_with(&service));

        let (status, json) = json_request(
            app,
            Method::POST,
            "/api/tools/bing_search",
            Some(serde_json::json!({ "query": "  " })),
        )
        .await;

        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(json["success"], false);
        assert_eq!(service.threads_created(), 0);
    }

    #[tokio::test]
    async fn deep_research_rejects_invalid_input_before_streaming() {
        let service = Arc::new(ScriptedService::new());
        let app = build_api_router(state_with(&service));

        let (status, json) = json_request(
            app,
            Method::POST,
            "/api/tools/deep_research",
            Some(serde_json::json!({ "topic": "AI", "conversation_id": "conv-1" })),
        )
        .await;

        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(
            json["error"],
            "Error: 'topic' parameter is required and must be at least 5 characters long."
        );
    }

    #[tokio::test]
    async fn deep_research_streams_progress_then_result() {
        let service = Arc::new(ScriptedService::new());
        service.with_connection("bing", "conn-1").script_run(vec![
            Step::status(RemoteRunStatus::InProgress),
            Step::status(RemoteRunStatus::Completed)
                .publishing(agent_message("msg_1", "Final report", &[])),
        ]);
        let app = build_api_router(state_with(&service));

        let (status, body) = send(
            app,
            Method::POST,
            "/api/tools/deep_research",
            Some(serde_json::json!({
                "topic": "Rust async runtimes",
                "conversation_id": "conv-1",
                "language": "en"
            })),
        )
        .await;

        assert_eq!(status, StatusCode::OK);
        let progress_at = body.find("event: progress").expect("progress event");
        let result_at = body.find("event: result").expect("result event");
        assert!(progress_at < result_at);
        assert!(body.contains("Starting research..."));
        assert!(body.contains("Final report"));
    }
}
