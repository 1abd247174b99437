use std::sync::Arc;

use tracing::debug;

use crate::core::agent_service::{AgentMessage, AgentService};
use crate::core::report::unique_citations;

const UPDATE_HEADER: &str = "[Agent update]";
const NO_TEXT_PLACEHOLDER: &str = "(no textual content)";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notification {
    pub message_id: String,
    pub text: String,
}

/// Detects agent output that appeared since the caller's watermark.
#[derive(Clone)]
pub struct ProgressReporter {
    service: Arc<dyn AgentService>,
}

impl ProgressReporter {
    pub fn new(service: Arc<dyn AgentService>) -> Self {
        Self { service }
    }

    /// Notification for the latest agent message if it differs from
    /// `last_seen`. Read failures are logged and reported as "nothing new".
    pub async fn diff(&self, thread_id: &str, last_seen: Option<&str>) -> Option<Notification> {
        let message = match self.service.last_agent_message(thread_id).await {
            Ok(message) => message?,
            Err(e) => {
                debug!("Skip latest-message fetch for {} (transient): {}", thread_id, e);
                return None;
            }
        };

        if last_seen == Some(message.id.as_str()) {
            return None;
        }

        Some(Notification {
            text: render(&message),
            message_id: message.id,
        })
    }
}

pub fn render(message: &AgentMessage) -> String {
    let body = message.text_segments.join("\n");
    let summary = match body.trim() {
        "" => NO_TEXT_PLACEHOLDER,
        trimmed => trimmed,
    };

    let mut lines = vec![UPDATE_HEADER.to_string(), summary.to_string()];
    for citation in unique_citations(&message.citations) {
        lines.push(format!("Reference: {} - {}", citation.label(), citation.url));
    }
    lines.join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::agent_service::mock::{ScriptedService, agent_message};

    #[tokio::test]
    async fn no_message_means_no_notification() {
        let service = Arc::new(ScriptedService::new());
        let reporter = ProgressReporter::new(service);
        assert_eq!(reporter.diff("thread_1", None).await, None);
    }

    #[tokio::test]
    async fn second_diff_without_new_message_is_silent() {
        let service = Arc::new(ScriptedService::new());
        service.publish("thread_1", agent_message("msg_1", "working on it", &[]));
        let reporter = ProgressReporter::new(service.clone());

        let first = reporter.diff("thread_1", None).await.expect("first update");
        assert_eq!(first.message_id, "msg_1");
        assert_eq!(first.text, "[Agent update]\nworking on it");

        let second = reporter.diff("thread_1", Some(&first.message_id)).await;
        assert_eq!(second, None);

        service.publish("thread_1", agent_message("msg_2", "done", &[]));
        let third = reporter.diff("thread_1", Some(&first.message_id)).await;
        assert_eq!(third.map(|n| n.message_id), Some("msg_2".to_string()));
    }

    #[test]
    fn citations_are_deduplicated_by_url_in_first_seen_order() {
        let msg = agent_message(
            "msg_1",
            "summary",
            &[("A", "https://u1"), ("B", "https://u1"), ("C", "https://u2")],
        );
        let text = render(&msg);
        let references: Vec<&str> = text
            .lines()
            .filter(|l| l.starts_with("Reference: "))
            .collect();
        assert_eq!(
            references,
            vec!["Reference: A - https://u1", "Reference: C - https://u2"]
        );
    }

    #[test]
    fn empty_text_renders_placeholder() {
        let msg = agent_message("msg_1", "  \n ", &[]);
        assert_eq!(render(&msg), "[Agent update]\n(no textual content)");
    }

    #[tokio::test]
    async fn read_errors_are_swallowed() {
        let service = Arc::new(ScriptedService::new());
        service.publish("thread_1", agent_message("msg_1", "hello", &[]));
        service.fail_message_reads(1);
        let reporter = ProgressReporter::new(service.clone());

        assert_eq!(reporter.diff("thread_1", None).await, None);
        assert!(reporter.diff("thread_1", None).await.is_some());
        assert_eq!(service.message_reads(), 2);
    }
}
