use crate::codecs::CodecError;
use crate::models::match_record::MatchStatus;
use crate::repositories::errors::chat_repository_errors::ChatRepositoryError;
use crate::repositories::errors::identity_directory_errors::IdentityDirectoryError;
use crate::repositories::errors::match_repository_errors::MatchRepositoryError;

#[derive(Debug, thiserror::Error)]
pub enum MatchServiceError {
    #[error("Unknown game type: {0}")]
    UnknownGameType(String),

    #[error("Invalid players: {0}")]
    InvalidPlayers(String),

    #[error("Caller is not a participant of this match")]
    NotAParticipant,

    #[error("It is not the caller's turn")]
    NotYourTurn,

    /// The match moved on since the caller last read it; refresh and resubmit.
    #[error("Stale turn: expected turn counter {expected} is no longer current")]
    StaleTurn { expected: u64 },

    #[error("Match not found: {0}")]
    MatchNotFound(String),

    #[error("Match is {0}")]
    MatchNotActive(MatchStatus),

    #[error("Invalid field updates: {0}")]
    InvalidFieldUpdates(String),

    #[error("Match reached its limit of {0} turns")]
    TurnLimitReached(u64),

    #[error("Codec error: {0}")]
    Codec(CodecError),

    #[error("Repository error: {0}")]
    Repository(#[from] MatchRepositoryError),

    #[error("Chat repository error: {0}")]
    Chat(#[from] ChatRepositoryError),

    #[error("Identity directory error: {0}")]
    Directory(#[from] IdentityDirectoryError),
}

impl From<CodecError> for MatchServiceError {
    fn from(err: CodecError) -> Self {
        match err {
            CodecError::UnknownGameType(game_type) => MatchServiceError::UnknownGameType(game_type),
            other => MatchServiceError::Codec(other),
        }
    }
}
