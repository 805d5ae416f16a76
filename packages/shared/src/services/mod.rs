pub mod chat_service;
pub mod cleanup;
pub mod errors;
pub mod live_sync;
pub mod lobby_service;
pub mod match_service;
pub mod retry;
