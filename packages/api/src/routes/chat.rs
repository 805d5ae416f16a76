use axum::{
    extract::{Path, State},
    http::StatusCode,
    routing::post,
    Json, Router,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::{error::ApiError, middleware::auth::AuthenticatedUser, state::AppState};

#[derive(Debug, Deserialize)]
pub struct SendMessageRequest {
    pub text: String,
}

#[derive(Debug, Serialize)]
pub struct SendMessageResponse {
    pub message_id: String,
    pub created_at: DateTime<Utc>,
}

pub fn routes() -> Router<AppState> {
    Router::new().route("/matches/{match_id}/chat", post(send_message))
}

async fn send_message(
    State(state): State<AppState>,
    authenticated_user: AuthenticatedUser,
    Path(match_id): Path<String>,
    Json(payload): Json<SendMessageRequest>,
) -> Result<(StatusCode, Json<SendMessageResponse>), ApiError> {
    let message = state
        .chat_service
        .append(&match_id, &authenticated_user.identity, &payload.text)
        .await?;

    debug!(
        "{} sent message {} in match {}",
        authenticated_user.identity, message.message_id, match_id
    );
    Ok((
        StatusCode::CREATED,
        Json(SendMessageResponse {
            message_id: message.message_id,
            created_at: message.created_at,
        }),
    ))
}
