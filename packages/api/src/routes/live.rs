use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        Path, State,
    },
    response::Response,
    routing::get,
    Router,
};
use serde::Serialize;
use shared::models::{ChatMessage, MatchView};
use shared::services::live_sync::Subscription;
use tracing::{debug, error};

use crate::{error::ApiError, middleware::auth::AuthenticatedUser, state::AppState};

/// One frame pushed to a live client.
#[derive(Debug, Serialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum LiveFrame {
    Match(MatchView),
    Chat(ChatMessage),
}

pub fn routes() -> Router<AppState> {
    Router::new().route("/matches/{match_id}/live", get(live))
}

/// Both subscriptions are opened before the upgrade so that authorization
/// failures come back as ordinary HTTP errors.
async fn live(
    State(state): State<AppState>,
    authenticated_user: AuthenticatedUser,
    Path(match_id): Path<String>,
    ws: WebSocketUpgrade,
) -> Result<Response, ApiError> {
    let matches = state
        .match_service
        .subscribe_match(&match_id, &authenticated_user.identity)
        .await?;
    let chat = state
        .chat_service
        .subscribe(&match_id, &authenticated_user.identity)
        .await?;

    debug!(
        "{} opened live connection for match {}",
        authenticated_user.identity, match_id
    );
    Ok(ws.on_upgrade(move |socket| forward(socket, matches, chat, match_id)))
}

async fn send_frame(socket: &mut WebSocket, frame: &LiveFrame) -> bool {
    let text = match serde_json::to_string(frame) {
        Ok(text) => text,
        Err(e) => {
            error!("Failed to serialize live frame: {}", e);
            return true;
        }
    };
    socket.send(Message::Text(text.into())).await.is_ok()
}

async fn forward(
    mut socket: WebSocket,
    mut matches: Subscription<MatchView>,
    mut chat: Subscription<ChatMessage>,
    match_id: String,
) {
    let mut match_open = true;
    let mut chat_open = true;

    while match_open || chat_open {
        let delivered = tokio::select! {
            view = matches.next(), if match_open => match view {
                Some(view) => send_frame(&mut socket, &LiveFrame::Match(view)).await,
                None => {
                    match_open = false;
                    true
                }
            },
            message = chat.next(), if chat_open => match message {
                Some(message) => send_frame(&mut socket, &LiveFrame::Chat(message)).await,
                None => {
                    chat_open = false;
                    true
                }
            },
            incoming = socket.recv() => match incoming {
                Some(Ok(Message::Close(_))) | Some(Err(_)) | None => false,
                Some(Ok(_)) => true,
            },
        };
        if !delivered {
            break;
        }
    }

    debug!("Live connection for match {} closed", match_id);
    matches.cancel().await;
    chat.cancel().await;
}
