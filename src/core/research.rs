//! Deep-research request validation and instruction text.

use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Serialize};

pub const DEFAULT_LANGUAGE: &str = "zh";
pub const MIN_TIMEOUT_SECS: u64 = 1800;
pub const MAX_TIMEOUT_SECS: u64 = 3600;
const MIN_TOPIC_CHARS: usize = 5;
const MIN_CONVERSATION_CHARS: usize = 3;

pub const LANGUAGES: [(&str, &str); 7] = [
    ("en", "English"),
    ("zh", "Chinese"),
    ("es", "Spanish"),
    ("fr", "French"),
    ("de", "German"),
    ("ja", "Japanese"),
    ("ko", "Korean"),
];

pub fn language_name(code: &str) -> Option<&'static str> {
    LANGUAGES
        .iter()
        .find(|(c, _)| *c == code)
        .map(|(_, name)| *name)
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ResearchRequestError {
    #[error("Error: 'topic' parameter is required and must be at least 5 characters long.")]
    TopicTooShort,
    #[error(
        "Error: 'research_scope' must be one of: 'overview', 'brief', 'detailed', 'focused', 'comprehensive'"
    )]
    UnknownScope(String),
    #[error("Error: 'conversation_id' parameter is required and must be at least 3 characters long.")]
    ConversationIdTooShort,
    #[error("Error: Unsupported language '{0}'. Supported: en, zh, es, fr, de, ja, ko")]
    UnsupportedLanguage(String),
    #[error("Error: 'timeout_seconds' must be between 1800 and 3600, got {0}")]
    TimeoutOutOfRange(u64),
}

/// How much detail the report should carry.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResearchScope {
    #[default]
    Overview,
    Brief,
    Detailed,
    Focused,
    Comprehensive,
}

impl ResearchScope {
    pub fn as_str(self) -> &'static str {
        match self {
            ResearchScope::Overview => "overview",
            ResearchScope::Brief => "brief",
            ResearchScope::Detailed => "detailed",
            ResearchScope::Focused => "focused",
            ResearchScope::Comprehensive => "comprehensive",
        }
    }

    fn guidance(self) -> &'static str {
        match self {
            ResearchScope::Overview => {
                "provide a concise and well-structured summary of all main points within the user's clarified focus area. Background and main context only, no deep analysis."
            }
            ResearchScope::Brief => {
                "deliver a brief analysis with structured explanations and relevant examples or data, only within the boundaries specified in the clarification step."
            }
            ResearchScope::Detailed => {
                "conduct an in-depth analysis with detailed examination of all relevant factors"
            }
            ResearchScope::Focused => {
                "conduct an in-depth analysis focused exclusively on the clarified aspects. Use comparative evidence, expert commentary, or data as relevant."
            }
            ResearchScope::Comprehensive => {
                "deliver an exhaustive, comprehensive research report covering all relevant aspects, controversies, theories, data, and perspectives—strictly within the boundaries clarified with the user, without extending to unrelated areas."
            }
        }
    }
}

impl fmt::Display for ResearchScope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ResearchScope {
    type Err = ResearchRequestError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "overview" => Ok(ResearchScope::Overview),
            "brief" => Ok(ResearchScope::Brief),
            "detailed" => Ok(ResearchScope::Detailed),
            "focused" => Ok(ResearchScope::Focused),
            "comprehensive" => Ok(ResearchScope::Comprehensive),
            other => Err(ResearchRequestError::UnknownScope(other.to_string())),
        }
    }
}

/// Raw research parameters as received from a caller.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResearchParams {
    pub topic: String,
    pub conversation_id: String,
    #[serde(default)]
    pub language: Option<String>,
    #[serde(default)]
    pub research_scope: Option<String>,
    #[serde(default)]
    pub interactive: Option<bool>,
    #[serde(default)]
    pub timeout_seconds: Option<u64>,
}

impl ResearchParams {
    pub fn new(topic: impl Into<String>, conversation_id: impl Into<String>) -> Self {
        Self {
            topic: topic.into(),
            conversation_id: conversation_id.into(),
            language: None,
            research_scope: None,
            interactive: None,
            timeout_seconds: None,
        }
    }
}

/// A research request that passed validation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResearchRequest {
    pub topic: String,
    pub conversation_id: String,
    pub language: &'static str,
    pub scope: ResearchScope,
    pub interactive: bool,
    pub timeout: Duration,
}

impl ResearchRequest {
    /// Checks run in a fixed order so the first problem reported is stable.
    pub fn validate(params: &ResearchParams) -> Result<Self, ResearchRequestError> {
        let topic = params.topic.trim();
        if topic.chars().count() < MIN_TOPIC_CHARS {
            return Err(ResearchRequestError::TopicTooShort);
        }

        let scope = match params.research_scope.as_deref() {
            Some(raw) => raw.parse()?,
            None => ResearchScope::default(),
        };

        let conversation_id = params.conversation_id.trim();
        if conversation_id.chars().count() < MIN_CONVERSATION_CHARS {
            return Err(ResearchRequestError::ConversationIdTooShort);
        }

        let language = params.language.as_deref().unwrap_or(DEFAULT_LANGUAGE);
        let language = LANGUAGES
            .iter()
            .map(|(code, _)| *code)
            .find(|code| *code == language)
            .ok_or_else(|| ResearchRequestError::UnsupportedLanguage(language.to_string()))?;

        let timeout_secs = params.timeout_seconds.unwrap_or(MIN_TIMEOUT_SECS);
        if !(MIN_TIMEOUT_SECS..=MAX_TIMEOUT_SECS).contains(&timeout_secs) {
            return Err(ResearchRequestError::TimeoutOutOfRange(timeout_secs));
        }

        Ok(Self {
            topic: topic.to_string(),
            conversation_id: conversation_id.to_string(),
            language,
            scope,
            interactive: params.interactive.unwrap_or(true),
            timeout: Duration::from_secs(timeout_secs),
        })
    }

    pub fn instruction(&self) -> String {
        let scope_line = format!("But, please make sure to {}", self.scope.guidance());
        let language_line = format!(
            "Please respond in {} language",
            language_name(self.language).unwrap_or("English")
        );

        let mut text = String::from("\nResearch Guidelines: \n");
        text.push_str("- Your research process consists of the following steps:\n");
        text.push_str("    - Receive Topic: When the user submits a research topic or question, carefully review the input.\n");
        if self.interactive {
            text.push_str("    - Clarification(Mandatory): Analyze the topic and ask clarifying questions.\n");
            text.push_str("    - Initiate Research: Once the topic is sufficiently clarified, begin collecting relevant information.\n");
        } else {
            text.push_str("    - Initiate Research: Collecting relevant information to research the topic.\n");
        }
        text.push_str("    - Report Generation: Organize your findings and generate a structured research report according to the requested scope and detail level.\n");

        if self.interactive {
            text.push_str(&format!("- Now you have the research topic: {}.\n", self.topic));
            text.push_str("- Before conducting research:\n");
            text.push_str("    - Analyze the topic and ask clarifying questions.\n");
            text.push_str("    - Ask maximum 5 essential questions that will significantly improve research quality, the questions should be concise and purposeful.\n");
            text.push_str(&format!(
                "- Once you have clarity, immediately begin your research. {}\n",
                scope_line
            ));
        } else {
            text.push_str(&format!(
                "- Once you have the research topic: {}, immediately begin your research. {}\n",
                self.topic, scope_line
            ));
        }

        let minutes = if self.interactive { 10 } else { 15 };
        text.push_str("- During collecting information for your report:\n");
        text.push_str("    - Always prioritize using connected online resources(such as bing) to obtain the most up-to-date and relevant data.\n");
        text.push_str("    - Focus only on materials that directly support the user’s clarified needs, do not pursue tangential topics or try to cover every possible aspect.\n");
        text.push_str("    - After gathering external information, quickly evaluate whether the collected information sufficiently covers the core scope—if so, stop further searching and proceed with report generation.\n");
        text.push_str("    - Prioritize relevance and recency over exhaustiveness in your search and selection of materials.\n");
        text.push_str("- When generating the report, always:\n");
        text.push_str("    - Structure your findings using clear sections with headings (e.g., Key Facts, Recommendations, Useful Links).\n");
        text.push_str("    - Where possible, provide links to authoritative, up-to-date online sources that support your findings.\n");
        text.push_str("    - Present information in a focused, actionable style. Be direct; avoid unnecessary filler or verbose background.\n");
        text.push_str("    - Unless the selected research scope requires exhaustive detail, keep the report succinct and practical. For \"overview\", or \"brief\" scopes, aim for 2-5 screenfuls or less, and avoid deep technical detail unless explicitly requested.\n");
        text.push_str(&format!(
            "    - For \"detailed\", \"focused\", or \"comprehensive\" scopes, expand analysis and detail as needed to match the chosen depth, even if that means a longer report or inclusion of necessary technical information. But always aim to finish the complete process within {} minutes.\n",
            minutes
        ));
        text.push_str("    - Always prioritize clarity, readability, and practical value for the user.\n");
        text.push_str(&format!("- {}.", language_line));
        text
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn params() -> ResearchParams {
        ResearchParams::new("Rust async runtimes", "conv-1")
    }

    #[test]
    fn defaults_follow_the_tool_contract() {
        let request = ResearchRequest::validate(&params()).unwrap();
        assert_eq!(request.language, "zh");
        assert_eq!(request.scope, ResearchScope::Overview);
        assert!(request.interactive);
        assert_eq!(request.timeout, Duration::from_secs(1800));
    }

    #[test]
    fn short_topic_is_rejected() {
        let mut p = params();
        p.topic = " abc ".to_string();
        assert_eq!(
            ResearchRequest::validate(&p),
            Err(ResearchRequestError::TopicTooShort)
        );
    }

    #[test]
    fn short_conversation_id_is_rejected() {
        let mut p = params();
        p.conversation_id = "ab".to_string();
        let err = ResearchRequest::validate(&p).unwrap_err();
        assert_eq!(
            err.to_string(),
            "Error: 'conversation_id' parameter is required and must be at least 3 characters long."
        );
    }

    #[test]
    fn unknown_scope_and_language_are_rejected() {
        let mut p = params();
        p.research_scope = Some("exhaustive".to_string());
        assert!(matches!(
            ResearchRequest::validate(&p),
            Err(ResearchRequestError::UnknownScope(_))
        ));

        let mut p = params();
        p.language = Some("pt".to_string());
        let err = ResearchRequest::validate(&p).unwrap_err();
        assert_eq!(
            err.to_string(),
            "Error: Unsupported language 'pt'. Supported: en, zh, es, fr, de, ja, ko"
        );
    }

    #[test]
    fn timeout_must_stay_within_bounds() {
        for (secs, ok) in [(1799, false), (1800, true), (3600, true), (3601, false)] {
            let mut p = params();
            p.timeout_seconds = Some(secs);
            assert_eq!(ResearchRequest::validate(&p).is_ok(), ok, "{}", secs);
        }
    }

    #[test]
    fn interactive_instruction_asks_for_clarification() {
        let mut p = params();
        p.language = Some("en".to_string());
        p.research_scope = Some("detailed".to_string());
        let text = ResearchRequest::validate(&p).unwrap().instruction();

        assert!(text.contains("Clarification(Mandatory)"));
        assert!(text.contains("- Now you have the research topic: Rust async runtimes."));
        assert!(text.contains(
            "But, please make sure to conduct an in-depth analysis with detailed examination"
        ));
        assert!(text.contains("within 10 minutes"));
        assert!(text.ends_with("- Please respond in English language."));
    }

    #[test]
    fn non_interactive_instruction_starts_immediately() {
        let mut p = params();
        p.interactive = Some(false);
        let text = ResearchRequest::validate(&p).unwrap().instruction();

        assert!(!text.contains("Clarification"));
        assert!(text.contains(
            "- Once you have the research topic: Rust async runtimes, immediately begin your research."
        ));
        assert!(text.contains("within 15 minutes"));
        assert!(text.ends_with("- Please respond in Chinese language."));
    }

    #[test]
    fn instruction_keeps_the_exact_guideline_wording() {
        let mut p = params();
        p.research_scope = Some("comprehensive".to_string());
        let text = ResearchRequest::validate(&p).unwrap().instruction();

        assert!(text.contains("data, and perspectives—strictly within the boundaries"));
        assert!(text.contains("directly support the user’s clarified needs"));
        assert!(text.contains("sufficiently covers the core scope—if so, stop further searching"));
    }
}
