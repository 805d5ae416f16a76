pub mod chat_service_errors;
pub mod lobby_service_errors;
pub mod match_service_errors;
