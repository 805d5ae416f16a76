use std::collections::HashMap;

use async_trait::async_trait;
use aws_sdk_dynamodb::operation::transact_write_items::TransactWriteItemsError;
use aws_sdk_dynamodb::types::{
    AttributeValue, ConditionCheck, DeleteRequest, Put, ReturnValue, TransactWriteItem,
    WriteRequest,
};
use aws_sdk_dynamodb::Client;
use chrono::SecondsFormat;
use parking_lot::Mutex;
use serde_dynamo::{from_item, to_item};
use tracing::{debug, info, warn};

use crate::models::chat::{most_recent, ChatMessage};
use crate::repositories::errors::chat_repository_errors::ChatRepositoryError;

#[cfg(test)]
use mockall::automock;

/// Sort key of the item marking an open channel; sorts before every message.
const CHANNEL_MARKER: &str = "#channel";
/// Message sort keys start with a timestamp, so they are all >= this bound.
const FIRST_MESSAGE_KEY: &str = "0";
/// Most delete requests DynamoDB takes in one `BatchWriteItem` call.
const BATCH_WRITE_LIMIT: usize = 25;
/// Rounds spent resubmitting unprocessed deletes before giving up.
const BATCH_WRITE_ROUNDS: usize = 5;

#[cfg_attr(test, automock)]
#[async_trait]
pub trait ChatRepository: Send + Sync {
    async fn create_channel(&self, match_id: &str) -> Result<(), ChatRepositoryError>;

    /// Stores a message in an open channel; `ChannelClosed` once it was deleted.
    async fn append_message(&self, message: &ChatMessage) -> Result<(), ChatRepositoryError>;

    /// The `limit` most recent messages, oldest first.
    async fn recent_messages(
        &self,
        match_id: &str,
        limit: usize,
    ) -> Result<Vec<ChatMessage>, ChatRepositoryError>;

    /// Removes the channel and all of its messages, returning how many items went.
    async fn delete_channel(&self, match_id: &str) -> Result<usize, ChatRepositoryError>;
}

/// Messages share the match id as partition key; the sort key is
/// `<created_at>#<message_id>`, which gives the channel order directly.
pub struct DynamoDbChatRepository {
    pub client: Client,
    pub table_name: String,
}

impl DynamoDbChatRepository {
    pub fn new(client: Client, table_name: &str) -> Self {
        Self {
            client,
            table_name: table_name.to_string(),
        }
    }

    pub fn sort_key(message: &ChatMessage) -> String {
        format!(
            "{}#{}",
            message
                .created_at
                .to_rfc3339_opts(SecondsFormat::Micros, true),
            message.message_id
        )
    }
}

#[async_trait]
impl ChatRepository for DynamoDbChatRepository {
    async fn create_channel(&self, match_id: &str) -> Result<(), ChatRepositoryError> {
        self.client
            .put_item()
            .table_name(&self.table_name)
            .item("match_id", AttributeValue::S(match_id.to_string()))
            .item("sort_key", AttributeValue::S(CHANNEL_MARKER.to_string()))
            .send()
            .await
            .map_err(|e| ChatRepositoryError::DynamoDb(e.to_string()))?;

        debug!("Created chat channel for match {}", match_id);
        Ok(())
    }

    async fn append_message(&self, message: &ChatMessage) -> Result<(), ChatRepositoryError> {
        let mut item: HashMap<String, AttributeValue> =
            to_item(message).map_err(|e| ChatRepositoryError::Serialization(e.to_string()))?;
        item.insert(
            "sort_key".to_string(),
            AttributeValue::S(Self::sort_key(message)),
        );

        let marker_check = ConditionCheck::builder()
            .table_name(&self.table_name)
            .key("match_id", AttributeValue::S(message.match_id.clone()))
            .key("sort_key", AttributeValue::S(CHANNEL_MARKER.to_string()))
            .condition_expression("attribute_exists(sort_key)")
            .build()
            .map_err(|e| ChatRepositoryError::Serialization(e.to_string()))?;
        let put = Put::builder()
            .table_name(&self.table_name)
            .set_item(Some(item))
            .build()
            .map_err(|e| ChatRepositoryError::Serialization(e.to_string()))?;

        let result = self
            .client
            .transact_write_items()
            .transact_items(TransactWriteItem::builder().condition_check(marker_check).build())
            .transact_items(TransactWriteItem::builder().put(put).build())
            .send()
            .await;

        match result {
            Ok(_) => Ok(()),
            Err(e) => {
                if let Some(TransactWriteItemsError::TransactionCanceledException(cancelled)) =
                    e.as_service_error()
                {
                    let marker_missing = cancelled
                        .cancellation_reasons()
                        .iter()
                        .any(|reason| reason.code() == Some("ConditionalCheckFailed"));
                    if marker_missing {
                        debug!(
                            "Dropped chat message for closed channel {}",
                            message.match_id
                        );
                        return Err(ChatRepositoryError::ChannelClosed);
                    }
                }
                Err(ChatRepositoryError::DynamoDb(e.to_string()))
            }
        }
    }

    async fn recent_messages(
        &self,
        match_id: &str,
        limit: usize,
    ) -> Result<Vec<ChatMessage>, ChatRepositoryError> {
        let output = self
            .client
            .query()
            .table_name(&self.table_name)
            .key_condition_expression("match_id = :match_id AND sort_key >= :first")
            .expression_attribute_values(":match_id", AttributeValue::S(match_id.to_string()))
            .expression_attribute_values(":first", AttributeValue::S(FIRST_MESSAGE_KEY.to_string()))
            .scan_index_forward(false)
            .limit(limit.min(i32::MAX as usize) as i32)
            .send()
            .await
            .map_err(|e| ChatRepositoryError::DynamoDb(e.to_string()))?;

        let mut messages = Vec::new();
        for item in output.items.unwrap_or_default() {
            let message: ChatMessage =
                from_item(item).map_err(|e| ChatRepositoryError::Serialization(e.to_string()))?;
            messages.push(message);
        }

        Ok(most_recent(messages, limit))
    }

    /// The marker goes first so that appends racing the cleanup fail instead
    /// of landing after the message query below.
    async fn delete_channel(&self, match_id: &str) -> Result<usize, ChatRepositoryError> {
        let marker = self
            .client
            .delete_item()
            .table_name(&self.table_name)
            .key("match_id", AttributeValue::S(match_id.to_string()))
            .key("sort_key", AttributeValue::S(CHANNEL_MARKER.to_string()))
            .return_values(ReturnValue::AllOld)
            .send()
            .await
            .map_err(|e| ChatRepositoryError::DynamoDb(e.to_string()))?;
        let mut deleted = usize::from(marker.attributes.is_some());

        let mut keys = Vec::new();
        let mut start_key = None;
        loop {
            let output = self
                .client
                .query()
                .table_name(&self.table_name)
                .key_condition_expression("match_id = :match_id")
                .expression_attribute_values(
                    ":match_id",
                    AttributeValue::S(match_id.to_string()),
                )
                .projection_expression("match_id, sort_key")
                .consistent_read(true)
                .set_exclusive_start_key(start_key)
                .send()
                .await
                .map_err(|e| ChatRepositoryError::DynamoDb(e.to_string()))?;

            keys.extend(output.items.unwrap_or_default());

            start_key = output.last_evaluated_key;
            if start_key.is_none() {
                break;
            }
        }

        for chunk in keys.chunks(BATCH_WRITE_LIMIT) {
            self.delete_batch(chunk).await?;
            deleted += chunk.len();
        }

        info!("Deleted {} chat items for match {}", deleted, match_id);
        Ok(deleted)
    }
}

impl DynamoDbChatRepository {
    async fn delete_batch(
        &self,
        keys: &[HashMap<String, AttributeValue>],
    ) -> Result<(), ChatRepositoryError> {
        let requests = keys
            .iter()
            .map(|key| {
                DeleteRequest::builder()
                    .set_key(Some(key.clone()))
                    .build()
                    .map(|delete| WriteRequest::builder().delete_request(delete).build())
                    .map_err(|e| ChatRepositoryError::Serialization(e.to_string()))
            })
            .collect::<Result<Vec<_>, _>>()?;

        let mut pending = HashMap::from([(self.table_name.clone(), requests)]);
        for _ in 0..BATCH_WRITE_ROUNDS {
            let output = self
                .client
                .batch_write_item()
                .set_request_items(Some(pending))
                .send()
                .await
                .map_err(|e| ChatRepositoryError::DynamoDb(e.to_string()))?;

            pending = output.unprocessed_items.unwrap_or_default();
            pending.retain(|_, requests| !requests.is_empty());
            if pending.is_empty() {
                return Ok(());
            }
            warn!(
                "Resubmitting {} unprocessed chat deletes",
                pending.values().map(Vec::len).sum::<usize>()
            );
        }

        Err(ChatRepositoryError::DynamoDb(
            "chat deletes left unprocessed".to_string(),
        ))
    }
}

#[derive(Default)]
pub struct InMemoryChatRepository {
    channels: Mutex<HashMap<String, Vec<ChatMessage>>>,
}

impl InMemoryChatRepository {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn has_channel(&self, match_id: &str) -> bool {
        self.channels.lock().contains_key(match_id)
    }
}

#[async_trait]
impl ChatRepository for InMemoryChatRepository {
    async fn create_channel(&self, match_id: &str) -> Result<(), ChatRepositoryError> {
        self.channels.lock().entry(match_id.to_string()).or_default();
        Ok(())
    }

    async fn append_message(&self, message: &ChatMessage) -> Result<(), ChatRepositoryError> {
        let mut channels = self.channels.lock();
        let channel = channels
            .get_mut(&message.match_id)
            .ok_or(ChatRepositoryError::ChannelClosed)?;
        channel.push(message.clone());
        Ok(())
    }

    async fn recent_messages(
        &self,
        match_id: &str,
        limit: usize,
    ) -> Result<Vec<ChatMessage>, ChatRepositoryError> {
        let messages = self
            .channels
            .lock()
            .get(match_id)
            .cloned()
            .unwrap_or_default();
        Ok(most_recent(messages, limit))
    }

    async fn delete_channel(&self, match_id: &str) -> Result<usize, ChatRepositoryError> {
        Ok(self
            .channels
            .lock()
            .remove(match_id)
            .map_or(0, |messages| messages.len() + 1))
    }
}
