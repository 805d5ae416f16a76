#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CodecError {
    #[error("unknown game type: {0}")]
    UnknownGameType(String),

    #[error("game type registered twice: {0}")]
    DuplicateGameType(String),

    #[error("expected game types are not registered: {}", .0.join(", "))]
    MissingGameTypes(Vec<String>),

    #[error("invalid {game_type} state: {reason}")]
    InvalidState { game_type: String, reason: String },
}

impl CodecError {
    pub fn invalid_state(game_type: &str, reason: impl std::fmt::Display) -> Self {
        CodecError::InvalidState {
            game_type: game_type.to_string(),
            reason: reason.to_string(),
        }
    }
}
