use std::sync::Arc;

use tokio::runtime::Handle;
use tracing::{error, info, warn};

use crate::repositories::chat_repository::ChatRepository;

#[cfg(test)]
use mockall::automock;

/// Told when a match reaches a terminal status. Implementations must return
/// without waiting on the work they start.
#[cfg_attr(test, automock)]
pub trait CleanupJob: Send + Sync {
    fn match_terminated(&self, match_id: &str);
}

/// Deletes the chat channel of a finished match in a background task.
/// Failures are logged and otherwise ignored.
pub struct ChatCleanupJob {
    chats: Arc<dyn ChatRepository>,
}

impl ChatCleanupJob {
    pub fn new(chats: Arc<dyn ChatRepository>) -> Self {
        ChatCleanupJob { chats }
    }
}

impl CleanupJob for ChatCleanupJob {
    fn match_terminated(&self, match_id: &str) {
        let Ok(runtime) = Handle::try_current() else {
            warn!(
                "No runtime to clean up chat for match {}; leaving it in place",
                match_id
            );
            return;
        };

        let chats = Arc::clone(&self.chats);
        let match_id = match_id.to_string();
        runtime.spawn(async move {
            match chats.delete_channel(&match_id).await {
                Ok(deleted) => info!("Cleaned up {} chat items of match {}", deleted, match_id),
                Err(e) => error!("Failed to clean up chat of match {}: {}", match_id, e),
            }
        });
    }
}

/// Cleanup that does nothing, for deployments where an external job sweeps
/// finished matches.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopCleanupJob;

impl CleanupJob for NoopCleanupJob {
    fn match_terminated(&self, _match_id: &str) {}
}
