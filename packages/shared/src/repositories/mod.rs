pub mod chat_repository;
pub mod errors;
pub mod identity_directory;
pub mod match_repository;
