pub mod chat;
pub mod health;
pub mod live;
pub mod matches;

use axum::{routing::get, Router};

use crate::state::AppState;

pub fn app(app_state: AppState) -> Router {
    Router::new()
        .route("/health", get(health::health_check))
        .merge(matches::routes())
        .merge(chat::routes())
        .merge(live::routes())
        .with_state(app_state)
}
