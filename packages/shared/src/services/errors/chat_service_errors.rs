use crate::models::match_record::MatchStatus;
use crate::repositories::errors::chat_repository_errors::ChatRepositoryError;
use crate::repositories::errors::match_repository_errors::MatchRepositoryError;

#[derive(Debug, thiserror::Error)]
pub enum ChatServiceError {
    #[error("Caller is not a participant of this match")]
    NotAParticipant,

    #[error("Match not found: {0}")]
    MatchNotFound(String),

    #[error("Match is {0}")]
    MatchNotActive(MatchStatus),

    #[error("Invalid message: {0}")]
    InvalidMessage(String),

    #[error("Chat repository error: {0}")]
    Repository(#[from] ChatRepositoryError),

    #[error("Match repository error: {0}")]
    Match(#[from] MatchRepositoryError),
}
