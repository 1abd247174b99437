use serde::{Deserialize, Serialize};

use crate::core::agent_service::RunError;

pub const DEFAULT_MAX_ATTEMPTS: u32 = 5;

/// Fragments that together identify the Bing grounding tool's request
/// serialization defect. All of them must be present.
const BING_GROUNDING_SIGNATURE: [&str; 4] = [
    "tool_server_error",
    "bing_grounding_server_error",
    "BingGroundingRequestParam",
    "ast.Name object",
];

/// Decides whether a failed run should be resubmitted.
///
/// Only the known transient signature is retried; every other failure is
/// surfaced as-is.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RetryPolicy {
    pub max_attempts: u32,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: DEFAULT_MAX_ATTEMPTS,
        }
    }
}

impl RetryPolicy {
    pub fn new(max_attempts: u32) -> Self {
        Self { max_attempts }
    }

    pub fn is_transient(error: &RunError) -> bool {
        let rendered = error.full_text();
        BING_GROUNDING_SIGNATURE
            .iter()
            .all(|fragment| rendered.contains(fragment))
    }

    /// `attempt_count` is the number of retries already made for this request.
    pub fn should_retry(&self, error: &RunError, attempt_count: u32) -> bool {
        attempt_count < self.max_attempts && Self::is_transient(error)
    }
}
