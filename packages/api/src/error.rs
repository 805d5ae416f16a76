use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use shared::codecs::CodecError;
use shared::services::errors::{
    chat_service_errors::ChatServiceError, lobby_service_errors::LobbyServiceError,
    match_service_errors::MatchServiceError,
};

#[derive(Debug)]
pub enum ApiError {
    MatchService(MatchServiceError),
    ChatService(ChatServiceError),
    LobbyService(LobbyServiceError),
    Unauthorized(String),
}

#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
}

impl std::fmt::Display for ApiError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ApiError::MatchService(err) => write!(f, "{}", err),
            ApiError::ChatService(err) => write!(f, "{}", err),
            ApiError::LobbyService(err) => write!(f, "{}", err),
            ApiError::Unauthorized(reason) => write!(f, "Unauthorized: {}", reason),
        }
    }
}

impl From<MatchServiceError> for ApiError {
    fn from(error: MatchServiceError) -> Self {
        ApiError::MatchService(error)
    }
}

impl From<ChatServiceError> for ApiError {
    fn from(error: ChatServiceError) -> Self {
        ApiError::ChatService(error)
    }
}

impl From<LobbyServiceError> for ApiError {
    fn from(error: LobbyServiceError) -> Self {
        ApiError::LobbyService(error)
    }
}

fn match_status(error: &MatchServiceError) -> StatusCode {
    match error {
        MatchServiceError::UnknownGameType(_)
        | MatchServiceError::InvalidPlayers(_)
        | MatchServiceError::InvalidFieldUpdates(_)
        | MatchServiceError::Codec(CodecError::InvalidState { .. }) => StatusCode::BAD_REQUEST,
        MatchServiceError::NotAParticipant => StatusCode::FORBIDDEN,
        MatchServiceError::MatchNotFound(_) => StatusCode::NOT_FOUND,
        MatchServiceError::NotYourTurn
        | MatchServiceError::StaleTurn { .. }
        | MatchServiceError::MatchNotActive(_)
        | MatchServiceError::TurnLimitReached(_) => StatusCode::CONFLICT,
        MatchServiceError::Codec(_)
        | MatchServiceError::Repository(_)
        | MatchServiceError::Chat(_)
        | MatchServiceError::Directory(_) => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::MatchService(error) => match_status(error),

            ApiError::ChatService(ChatServiceError::InvalidMessage(_)) => StatusCode::BAD_REQUEST,
            ApiError::ChatService(ChatServiceError::NotAParticipant) => StatusCode::FORBIDDEN,
            ApiError::ChatService(ChatServiceError::MatchNotFound(_)) => StatusCode::NOT_FOUND,
            ApiError::ChatService(ChatServiceError::MatchNotActive(_)) => StatusCode::CONFLICT,
            ApiError::ChatService(
                ChatServiceError::Repository(_) | ChatServiceError::Match(_),
            ) => StatusCode::INTERNAL_SERVER_ERROR,

            ApiError::LobbyService(LobbyServiceError::InvalidPlayers(_)) => {
                StatusCode::BAD_REQUEST
            }
            ApiError::LobbyService(LobbyServiceError::Match(error)) => match_status(error),
            ApiError::LobbyService(
                LobbyServiceError::Repository(_) | LobbyServiceError::Directory(_),
            ) => StatusCode::INTERNAL_SERVER_ERROR,

            ApiError::Unauthorized(_) => StatusCode::UNAUTHORIZED,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        let error = if status.is_server_error() {
            "internal server error".to_string()
        } else {
            self.to_string()
        };

        (status, Json(ErrorResponse { error })).into_response()
    }
}
