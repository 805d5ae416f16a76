#[derive(Debug, thiserror::Error)]
pub enum IdentityDirectoryError {
    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("DynamoDB error: {0}")]
    DynamoDb(String),
}
