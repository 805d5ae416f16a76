pub mod chat_repository_errors;
pub mod identity_directory_errors;
pub mod match_repository_errors;
