use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::{Mutex, OnceCell};
use tracing::info;

use crate::core::agent_service::{AgentService, ServiceError};

/// Maps caller-chosen conversation ids to remote threads for the lifetime of
/// the process. The first thread created for a conversation is kept forever.
pub struct ConversationRegistry {
    service: Arc<dyn AgentService>,
    threads: Mutex<HashMap<String, Arc<OnceCell<String>>>>,
    /// Last agent message delivered as a final answer, per thread.
    answers: Mutex<HashMap<String, String>>,
}

impl ConversationRegistry {
    pub fn new(service: Arc<dyn AgentService>) -> Self {
        Self {
            service,
            threads: Mutex::new(HashMap::new()),
            answers: Mutex::new(HashMap::new()),
        }
    }

    /// Thread for `conversation_id`, created on first use.
    ///
    /// Concurrent first calls for the same id wait on a shared slot, so only
    /// one thread is ever created. A failed creation leaves the slot empty.
    pub async fn resolve_thread(&self, conversation_id: &str) -> Result<String, ServiceError> {
        let slot = {
            let mut threads = self.threads.lock().await;
            threads
                .entry(conversation_id.to_string())
                .or_default()
                .clone()
        };

        let thread_id = slot
            .get_or_try_init(|| async {
                let thread_id = self.service.create_thread().await?;
                info!(
                    "Created thread {} for conversation {}",
                    thread_id, conversation_id
                );
                Ok::<_, ServiceError>(thread_id)
            })
            .await?;
        Ok(thread_id.clone())
    }

    pub async fn cached_thread(&self, conversation_id: &str) -> Option<String> {
        let threads = self.threads.lock().await;
        threads
            .get(conversation_id)
            .and_then(|slot| slot.get().cloned())
    }

    pub async fn remember_answer(&self, thread_id: &str, message_id: &str) {
        self.answers
            .lock()
            .await
            .insert(thread_id.to_string(), message_id.to_string());
    }

    pub async fn last_answer(&self, thread_id: &str) -> Option<String> {
        self.answers.lock().await.get(thread_id).cloned()
    }
}
