use std::collections::HashSet;
use std::sync::Arc;

use tracing::{debug, error, warn};

use crate::models::chat::ChatMessage;
use crate::models::match_record::Match;
use crate::repositories::chat_repository::ChatRepository;
use crate::repositories::errors::chat_repository_errors::ChatRepositoryError;
use crate::repositories::errors::match_repository_errors::MatchRepositoryError;
use crate::repositories::match_repository::MatchRepository;
use crate::services::errors::chat_service_errors::ChatServiceError;
use crate::services::live_sync::{LiveSync, Subscription};
use crate::services::retry::RetryPolicy;

/// Messages delivered when a subscription starts.
pub const CHAT_HISTORY_LIMIT: usize = 200;
pub const MAX_MESSAGE_LEN: usize = 1000;

#[derive(Clone)]
pub struct ChatService {
    matches: Arc<dyn MatchRepository>,
    chats: Arc<dyn ChatRepository>,
    live_sync: Arc<LiveSync>,
    read_retry: RetryPolicy,
}

impl ChatService {
    pub fn new(
        matches: Arc<dyn MatchRepository>,
        chats: Arc<dyn ChatRepository>,
        live_sync: Arc<LiveSync>,
    ) -> Self {
        ChatService {
            matches,
            chats,
            live_sync,
            read_retry: RetryPolicy::default(),
        }
    }

    pub fn with_read_retry(mut self, policy: RetryPolicy) -> Self {
        self.read_retry = policy;
        self
    }

    pub async fn append(
        &self,
        match_id: &str,
        sender_identity: &str,
        text: &str,
    ) -> Result<ChatMessage, ChatServiceError> {
        let text = validate_text(text)?;

        let record = self.participant_match(match_id, sender_identity).await?;
        if record.status.is_terminal() {
            return Err(ChatServiceError::MatchNotActive(record.status));
        }
        let sender_handle = record
            .player_index(sender_identity)
            .map(|index| record.players[index].display_handle.clone())
            .unwrap_or_default();

        let message = ChatMessage::new(match_id, sender_identity, &sender_handle, text);
        match self.chats.append_message(&message).await {
            Ok(()) => {}
            Err(ChatRepositoryError::ChannelClosed) => {
                // the match ended between the status check and the write
                let current = self.participant_match(match_id, sender_identity).await?;
                if current.status.is_terminal() {
                    return Err(ChatServiceError::MatchNotActive(current.status));
                }
                error!("Chat channel of open match {} is missing", match_id);
                return Err(ChatRepositoryError::ChannelClosed.into());
            }
            Err(e) => {
                error!("Failed to store chat message for match {}: {}", match_id, e);
                return Err(e.into());
            }
        }

        self.live_sync.publish_chat(&message);
        Ok(message)
    }

    /// Backlog of up to [`CHAT_HISTORY_LIMIT`] messages oldest first, then
    /// every message appended afterwards.
    pub async fn subscribe(
        &self,
        match_id: &str,
        caller_identity: &str,
    ) -> Result<Subscription<ChatMessage>, ChatServiceError> {
        let listener = self.live_sync.listen_chat(match_id);
        self.participant_match(match_id, caller_identity).await?;

        let backlog = self
            .read_retry
            .run("read chat backlog", ChatRepositoryError::is_transient, || {
                self.chats.recent_messages(match_id, CHAT_HISTORY_LIMIT)
            })
            .await
            .map_err(|e| {
                error!("Failed to read chat of match {}: {}", match_id, e);
                ChatServiceError::from(e)
            })?;

        debug!(
            "{} subscribed to chat of match {} ({} backlog messages)",
            caller_identity,
            match_id,
            backlog.len()
        );
        Ok(Subscription::spawn(move |sender| async move {
            let mut listener = listener;
            // messages stored after the listener was registered show up twice
            let mut in_backlog: HashSet<String> =
                backlog.iter().map(|m| m.message_id.clone()).collect();

            for message in backlog {
                if sender.send(message).await.is_err() {
                    return;
                }
            }

            while let Some(message) = listener.recv().await {
                if in_backlog.remove(&message.message_id) {
                    continue;
                }
                if sender.send(message).await.is_err() {
                    break;
                }
            }
        }))
    }

    async fn participant_match(
        &self,
        match_id: &str,
        identity: &str,
    ) -> Result<Match, ChatServiceError> {
        let record = self
            .read_retry
            .run("get match", MatchRepositoryError::is_transient, || {
                self.matches.get_match(match_id)
            })
            .await
            .map_err(|e| {
                error!("Failed to read match {}: {}", match_id, e);
                ChatServiceError::from(e)
            })?
            .ok_or_else(|| ChatServiceError::MatchNotFound(match_id.to_string()))?;

        if !record.is_participant(identity) {
            warn!(
                "Rejected chat access to match {} by non-participant {}",
                match_id, identity
            );
            return Err(ChatServiceError::NotAParticipant);
        }
        Ok(record)
    }
}

fn validate_text(text: &str) -> Result<&str, ChatServiceError> {
    let text = text.trim();
    if text.is_empty() {
        return Err(ChatServiceError::InvalidMessage(
            "message is empty".to_string(),
        ));
    }
    if text.chars().count() > MAX_MESSAGE_LEN {
        return Err(ChatServiceError::InvalidMessage(format!(
            "message is longer than {} characters",
            MAX_MESSAGE_LEN
        )));
    }
    Ok(text)
}
