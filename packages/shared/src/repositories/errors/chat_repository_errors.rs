#[derive(Debug, thiserror::Error)]
pub enum ChatRepositoryError {
    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("DynamoDB error: {0}")]
    DynamoDb(String),

    /// The channel was deleted, or never opened.
    #[error("Chat channel is closed")]
    ChannelClosed,
}

impl ChatRepositoryError {
    pub fn is_transient(&self) -> bool {
        matches!(self, ChatRepositoryError::DynamoDb(_))
    }
}
