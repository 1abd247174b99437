//! Final-result assembly from the last agent message of a run.

use std::collections::HashSet;

use serde::{Deserialize, Serialize};

use crate::core::agent_service::{AgentMessage, Citation};

pub const NO_RESULT: &str = "No result available";
pub const NO_RESEARCH_RESULT: &str = "No research results available";
const NO_RESEARCH_CONTENT: &str = "No research content generated";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReportFormat {
    /// Short answers: segments verbatim, `## Sources` list.
    Answer,
    /// Research reports: trimmed segments separated by blank lines, `## References` list.
    Research,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Report {
    pub text: String,
    pub citations: Vec<String>,
}

/// Citations in first-seen order, keeping one per URL.
pub(crate) fn unique_citations(citations: &[Citation]) -> Vec<&Citation> {
    let mut seen = HashSet::new();
    citations
        .iter()
        .filter(|c| seen.insert(c.url.as_str()))
        .collect()
}

pub fn render_markdown_link(citation: &Citation) -> String {
    format!("[{}]({})", citation.label(), citation.url)
}

pub fn assemble(message: Option<&AgentMessage>, format: ReportFormat) -> Report {
    let Some(message) = message else {
        let sentinel = match format {
            ReportFormat::Answer => NO_RESULT,
            ReportFormat::Research => NO_RESEARCH_RESULT,
        };
        return Report {
            text: sentinel.to_string(),
            citations: Vec::new(),
        };
    };

    let citations: Vec<String> = unique_citations(&message.citations)
        .into_iter()
        .map(render_markdown_link)
        .collect();

    let text = match format {
        ReportFormat::Answer => {
            let mut text = String::new();
            for segment in &message.text_segments {
                text.push_str(segment);
                text.push('\n');
            }
            if !citations.is_empty() {
                text.push_str("\n\n## Sources\n");
                for citation in &citations {
                    text.push_str(&format!("- {}\n", citation));
                }
            }
            text.trim().to_string()
        }
        ReportFormat::Research => {
            let parts: Vec<&str> = message
                .text_segments
                .iter()
                .map(|s| s.trim())
                .filter(|s| !s.is_empty())
                .collect();
            let mut text = if parts.is_empty() {
                NO_RESEARCH_CONTENT.to_string()
            } else {
                parts.join("\n\n")
            };
            if !citations.is_empty() {
                text.push_str("\n\n## References\n");
                for citation in &citations {
                    text.push_str(&format!("- {}\n", citation));
                }
            }
            text
        }
    };

    Report { text, citations }
}
