use axum::{
    extract::{Path, State},
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use shared::models::{Match, MatchFieldUpdates, MatchStatus, MatchSummary, MatchView};
use shared::services::lobby_service::Challenge;
use tracing::debug;

use crate::{error::ApiError, middleware::auth::AuthenticatedUser, state::AppState};

#[derive(Debug, Deserialize)]
pub struct CreateMatchRequest {
    pub game_type: String,
    pub opponent_handle: String,
    /// Set when the opponent already accepted out of band.
    #[serde(default)]
    pub opponent_identity: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct CreateMatchResponse {
    pub match_id: String,
}

#[derive(Debug, Deserialize)]
pub struct MoveRequest {
    pub expected_turn_counter: u64,
    pub state: Value,
    #[serde(default)]
    pub updates: MatchFieldUpdates,
}

/// Outcome of a committed write; the full view follows on the live stream.
#[derive(Debug, Serialize)]
pub struct CommitResponse {
    pub match_id: String,
    pub status: MatchStatus,
    pub turn_counter: u64,
    pub current_player_index: usize,
    pub winner_index: Option<usize>,
}

impl From<&Match> for CommitResponse {
    fn from(record: &Match) -> Self {
        CommitResponse {
            match_id: record.match_id.clone(),
            status: record.status,
            turn_counter: record.turn_counter,
            current_player_index: record.current_player_index,
            winner_index: record.winner_index,
        }
    }
}

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/matches", post(create_match).get(list_matches))
        .route("/matches/{match_id}", get(get_match))
        .route("/matches/{match_id}/join", post(join_match))
        .route("/matches/{match_id}/moves", post(apply_move))
        .route("/matches/{match_id}/forfeit", post(forfeit))
}

async fn create_match(
    State(state): State<AppState>,
    authenticated_user: AuthenticatedUser,
    Json(payload): Json<CreateMatchRequest>,
) -> Result<(StatusCode, Json<CreateMatchResponse>), ApiError> {
    let challenge = Challenge {
        game_type: payload.game_type,
        creator_identity: authenticated_user.identity,
        creator_handle: authenticated_user.handle,
        opponent_identity: payload.opponent_identity,
        opponent_handle: payload.opponent_handle,
    };
    let match_id = state.lobby_service.challenge(&challenge).await?;

    Ok((StatusCode::CREATED, Json(CreateMatchResponse { match_id })))
}

async fn list_matches(
    State(state): State<AppState>,
    authenticated_user: AuthenticatedUser,
) -> Result<Json<Vec<MatchSummary>>, ApiError> {
    let summaries = state
        .lobby_service
        .list_open_matches(&authenticated_user.identity)
        .await?;
    Ok(Json(summaries))
}

async fn get_match(
    State(state): State<AppState>,
    authenticated_user: AuthenticatedUser,
    Path(match_id): Path<String>,
) -> Result<Json<MatchView>, ApiError> {
    let view = state
        .match_service
        .get_match(&match_id, &authenticated_user.identity)
        .await?;
    Ok(Json(view))
}

async fn join_match(
    State(state): State<AppState>,
    authenticated_user: AuthenticatedUser,
    Path(match_id): Path<String>,
) -> Result<Json<MatchView>, ApiError> {
    state
        .match_service
        .join_match(
            &match_id,
            &authenticated_user.identity,
            &authenticated_user.handle,
        )
        .await?;

    let view = state
        .match_service
        .get_match(&match_id, &authenticated_user.identity)
        .await?;
    Ok(Json(view))
}

async fn apply_move(
    State(state): State<AppState>,
    authenticated_user: AuthenticatedUser,
    Path(match_id): Path<String>,
    Json(payload): Json<MoveRequest>,
) -> Result<Json<CommitResponse>, ApiError> {
    let committed = state
        .match_service
        .apply_move(
            &match_id,
            &authenticated_user.identity,
            payload.expected_turn_counter,
            &payload.state,
            &payload.updates,
        )
        .await?;

    debug!(
        "{} moved in match {}, now at turn {}",
        authenticated_user.identity, match_id, committed.turn_counter
    );
    Ok(Json(CommitResponse::from(&committed)))
}

async fn forfeit(
    State(state): State<AppState>,
    authenticated_user: AuthenticatedUser,
    Path(match_id): Path<String>,
) -> Result<Json<CommitResponse>, ApiError> {
    let committed = state
        .match_service
        .forfeit(&match_id, &authenticated_user.identity)
        .await?;
    Ok(Json(CommitResponse::from(&committed)))
}
