#[derive(Debug, thiserror::Error)]
pub enum MatchRepositoryError {
    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("DynamoDB error: {0}")]
    DynamoDb(String),

    /// The guarded write found the document in a different state than expected.
    #[error("Write condition failed")]
    ConditionFailed,

    #[error("Match not found")]
    NotFound,
}

impl MatchRepositoryError {
    /// Transport failures are the only ones worth retrying for reads.
    pub fn is_transient(&self) -> bool {
        matches!(self, MatchRepositoryError::DynamoDb(_))
    }
}
