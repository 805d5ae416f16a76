use crate::repositories::errors::identity_directory_errors::IdentityDirectoryError;
use crate::repositories::errors::match_repository_errors::MatchRepositoryError;
use crate::services::errors::match_service_errors::MatchServiceError;

#[derive(Debug, thiserror::Error)]
pub enum LobbyServiceError {
    #[error("Invalid players: {0}")]
    InvalidPlayers(String),

    #[error(transparent)]
    Match(#[from] MatchServiceError),

    #[error("Repository error: {0}")]
    Repository(#[from] MatchRepositoryError),

    #[error("Identity directory error: {0}")]
    Directory(#[from] IdentityDirectoryError),
}
