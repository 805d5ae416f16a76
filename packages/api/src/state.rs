use std::sync::Arc;

use shared::codecs::{CodecError, CodecRegistry};
use shared::config::{Config, StoreBackend};
use shared::repositories::chat_repository::{
    ChatRepository, DynamoDbChatRepository, InMemoryChatRepository,
};
use shared::repositories::identity_directory::{
    DynamoDbIdentityDirectory, IdentityDirectory, InMemoryIdentityDirectory,
};
use shared::repositories::match_repository::{
    DynamoDbMatchRepository, InMemoryMatchRepository, MatchRepository,
};
use shared::services::chat_service::ChatService;
use shared::services::cleanup::ChatCleanupJob;
use shared::services::live_sync::LiveSync;
use shared::services::lobby_service::LobbyService;
use shared::services::match_service::MatchService;
use tracing::info;

use crate::middleware::auth::TokenVerifier;

/// Game types every deployment must be able to serve.
pub const REQUIRED_GAME_TYPES: &[&str] = &["senet", "chess"];

#[derive(Clone)]
pub struct AppState {
    pub match_service: Arc<MatchService>,
    pub chat_service: Arc<ChatService>,
    pub lobby_service: Arc<LobbyService>,
    pub codecs: Arc<CodecRegistry>,
    pub tokens: Arc<TokenVerifier>,
}

/// The store handles a deployment runs against.
pub struct Stores {
    pub matches: Arc<dyn MatchRepository>,
    pub chats: Arc<dyn ChatRepository>,
    pub directory: Arc<dyn IdentityDirectory>,
}

impl Stores {
    pub async fn for_config(config: &Config) -> Self {
        match (&config.backend, &config.tables) {
            (StoreBackend::DynamoDb, Some(tables)) => {
                let aws_config = aws_config::load_from_env().await;
                let client = aws_sdk_dynamodb::Client::new(&aws_config);
                info!(
                    "Using DynamoDB tables {}, {}, {}",
                    tables.matches, tables.chat, tables.users
                );
                Stores {
                    matches: Arc::new(DynamoDbMatchRepository::new(client.clone(), &tables.matches)),
                    chats: Arc::new(DynamoDbChatRepository::new(client.clone(), &tables.chat)),
                    directory: Arc::new(DynamoDbIdentityDirectory::new(client, &tables.users)),
                }
            }
            _ => {
                info!("Using in-memory stores");
                Stores::in_memory(InMemoryIdentityDirectory::new())
            }
        }
    }

    pub fn in_memory(directory: InMemoryIdentityDirectory) -> Self {
        Stores {
            matches: Arc::new(InMemoryMatchRepository::new()),
            chats: Arc::new(InMemoryChatRepository::new()),
            directory: Arc::new(directory),
        }
    }
}

impl AppState {
    pub fn assemble(
        stores: Stores,
        jwt_secret: &str,
        max_turns_per_match: u64,
    ) -> Result<Self, CodecError> {
        let codecs = Arc::new(CodecRegistry::with_builtin_games()?);
        codecs.self_check(REQUIRED_GAME_TYPES)?;

        let live_sync = Arc::new(LiveSync::new());
        let cleanup = Arc::new(ChatCleanupJob::new(stores.chats.clone()));

        let match_service = MatchService::new(
            stores.matches.clone(),
            stores.chats.clone(),
            stores.directory.clone(),
            codecs.clone(),
            live_sync.clone(),
            cleanup,
        )
        .with_max_turns(max_turns_per_match);
        let chat_service = ChatService::new(stores.matches.clone(), stores.chats, live_sync);
        let lobby_service =
            LobbyService::new(stores.matches, stores.directory, match_service.clone());

        Ok(AppState {
            match_service: Arc::new(match_service),
            chat_service: Arc::new(chat_service),
            lobby_service: Arc::new(lobby_service),
            codecs,
            tokens: Arc::new(TokenVerifier::new(jwt_secret)),
        })
    }
}
