use std::sync::Arc;

use tracing::{error, info};

use crate::models::match_record::{MatchSummary, Player};
use crate::repositories::errors::match_repository_errors::MatchRepositoryError;
use crate::repositories::identity_directory::IdentityDirectory;
use crate::repositories::match_repository::MatchRepository;
use crate::services::errors::lobby_service_errors::LobbyServiceError;
use crate::services::match_service::MatchService;
use crate::services::retry::RetryPolicy;

/// A challenge from the creator to an opponent.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Challenge {
    pub game_type: String,
    pub creator_identity: String,
    pub creator_handle: String,
    /// Known when the opponent already accepted; otherwise looked up by handle.
    pub opponent_identity: Option<String>,
    pub opponent_handle: String,
}

#[derive(Clone)]
pub struct LobbyService {
    matches: Arc<dyn MatchRepository>,
    directory: Arc<dyn IdentityDirectory>,
    match_service: MatchService,
    list_retry: RetryPolicy,
}

impl LobbyService {
    pub fn new(
        matches: Arc<dyn MatchRepository>,
        directory: Arc<dyn IdentityDirectory>,
        match_service: MatchService,
    ) -> Self {
        LobbyService {
            matches,
            directory,
            match_service,
            list_retry: RetryPolicy::default(),
        }
    }

    pub fn with_list_retry(mut self, policy: RetryPolicy) -> Self {
        self.list_retry = policy;
        self
    }

    /// Waiting and active matches of the player, most recently updated first.
    pub async fn list_open_matches(
        &self,
        identity: &str,
    ) -> Result<Vec<MatchSummary>, LobbyServiceError> {
        let mut matches = self
            .list_retry
            .run("list open matches", MatchRepositoryError::is_transient, || {
                self.matches.list_open_matches_for_player(identity)
            })
            .await
            .map_err(|e| {
                error!("Failed to list matches of {}: {}", identity, e);
                LobbyServiceError::from(e)
            })?;

        matches.retain(|record| record.status.is_open() && record.is_participant(identity));
        matches.sort_by(|a, b| {
            b.updated_at
                .cmp(&a.updated_at)
                .then_with(|| a.match_id.cmp(&b.match_id))
        });

        Ok(matches
            .iter()
            .map(|record| record.summary_for(identity))
            .collect())
    }

    /// Creates the match for a challenge and returns its id. The match is
    /// active when the opponent's identity is known and waits otherwise.
    pub async fn challenge(&self, challenge: &Challenge) -> Result<String, LobbyServiceError> {
        let creator_handle = challenge.creator_handle.trim();
        let opponent_handle = challenge.opponent_handle.trim();
        if creator_handle.is_empty() || opponent_handle.is_empty() {
            return Err(LobbyServiceError::InvalidPlayers(
                "both players need a handle".to_string(),
            ));
        }
        if creator_handle.eq_ignore_ascii_case(opponent_handle) {
            return Err(LobbyServiceError::InvalidPlayers(
                "players cannot challenge themselves".to_string(),
            ));
        }

        let opponent_identity = match &challenge.opponent_identity {
            Some(identity) => Some(identity.clone()),
            None => self.directory.resolve_handle(opponent_handle).await.map_err(|e| {
                error!("Failed to resolve handle {}: {}", opponent_handle, e);
                LobbyServiceError::from(e)
            })?,
        };
        if opponent_identity.as_deref() == Some(challenge.creator_identity.as_str()) {
            return Err(LobbyServiceError::InvalidPlayers(
                "players cannot challenge themselves".to_string(),
            ));
        }

        let opponent = match &opponent_identity {
            Some(identity) => Player::bound(identity, opponent_handle),
            None => Player::invited(opponent_handle),
        };
        let record = self
            .match_service
            .create_match_with_players(
                &challenge.game_type,
                [
                    Player::bound(&challenge.creator_identity, creator_handle),
                    opponent,
                ],
            )
            .await?;

        info!(
            "{} challenged {} to {} ({})",
            creator_handle, opponent_handle, record.game_type, record.status
        );
        Ok(record.match_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codecs::CodecRegistry;
    use crate::models::match_record::{Match, MatchStatus};
    use crate::repositories::chat_repository::InMemoryChatRepository;
    use crate::repositories::identity_directory::InMemoryIdentityDirectory;
    use crate::repositories::match_repository::{InMemoryMatchRepository, MockMatchRepository};
    use crate::services::cleanup::NoopCleanupJob;
    use crate::services::errors::match_service_errors::MatchServiceError;
    use crate::services::live_sync::LiveSync;
    use chrono::{Duration, Utc};
    use serde_json::Value;
    use std::time::Duration as StdDuration;

    fn lobby_over(matches: Arc<dyn MatchRepository>) -> LobbyService {
        let directory: Arc<dyn IdentityDirectory> = Arc::new(
            InMemoryIdentityDirectory::new()
                .with_player("A", "alice")
                .with_player("B", "bob"),
        );
        let match_service = MatchService::new(
            matches.clone(),
            Arc::new(InMemoryChatRepository::new()),
            directory.clone(),
            Arc::new(CodecRegistry::with_builtin_games().unwrap()),
            Arc::new(LiveSync::new()),
            Arc::new(NoopCleanupJob),
        );
        LobbyService::new(matches, directory, match_service)
    }

    fn challenge(opponent_identity: Option<&str>, opponent_handle: &str) -> Challenge {
        Challenge {
            game_type: "senet".to_string(),
            creator_identity: "A".to_string(),
            creator_handle: "alice".to_string(),
            opponent_identity: opponent_identity.map(str::to_string),
            opponent_handle: opponent_handle.to_string(),
        }
    }

    #[tokio::test]
    async fn test_challenge_known_handle_starts_active_match() {
        let matches = Arc::new(InMemoryMatchRepository::new());
        let lobby = lobby_over(matches.clone());

        let match_id = lobby.challenge(&challenge(None, "Bob")).await.unwrap();

        let record = matches.get_match(&match_id).await.unwrap().unwrap();
        assert_eq!(record.status, MatchStatus::Active);
        assert!(record.players[1].is("B"));
    }

    #[tokio::test]
    async fn test_challenge_unknown_handle_waits() {
        let matches = Arc::new(InMemoryMatchRepository::new());
        let lobby = lobby_over(matches.clone());

        let match_id = lobby.challenge(&challenge(None, "newcomer")).await.unwrap();

        let record = matches.get_match(&match_id).await.unwrap().unwrap();
        assert_eq!(record.status, MatchStatus::Waiting);
        assert_eq!(record.players[1], Player::invited("newcomer"));
        assert_eq!(record.participants, vec!["A".to_string()]);
    }

    #[tokio::test]
    async fn test_challenge_rejects_self_and_unknown_games() {
        let matches = Arc::new(InMemoryMatchRepository::new());
        let lobby = lobby_over(matches.clone());

        let by_handle = lobby.challenge(&challenge(None, "ALICE")).await;
        let by_identity = lobby.challenge(&challenge(Some("A"), "ally")).await;
        let mut unknown_game = challenge(Some("B"), "bob");
        unknown_game.game_type = "checkers-9000".to_string();
        let unknown_game = lobby.challenge(&unknown_game).await;

        assert!(matches!(by_handle, Err(LobbyServiceError::InvalidPlayers(_))));
        assert!(matches!(by_identity, Err(LobbyServiceError::InvalidPlayers(_))));
        assert!(matches!(
            unknown_game,
            Err(LobbyServiceError::Match(MatchServiceError::UnknownGameType(_)))
        ));
        assert!(matches.is_empty());
    }

    #[tokio::test]
    async fn test_list_open_matches_newest_first() {
        let matches = Arc::new(InMemoryMatchRepository::new());
        let lobby = lobby_over(matches.clone());
        let now = Utc::now();
        let players = || [Player::bound("A", "alice"), Player::bound("B", "bob")];

        let mut older = Match::new("senet", players(), Value::Null);
        older.updated_at = now - Duration::minutes(5);
        let mut newer = Match::new("chess", players(), Value::Null);
        newer.updated_at = now;
        let mut finished = Match::new("senet", players(), Value::Null);
        finished.status = MatchStatus::Completed;
        finished.winner_index = Some(1);
        for record in [&older, &newer, &finished] {
            matches.create_match(record).await.unwrap();
        }

        let listed = lobby.list_open_matches("B").await.unwrap();

        let ids: Vec<&str> = listed.iter().map(|s| s.match_id.as_str()).collect();
        assert_eq!(ids, vec![newer.match_id.as_str(), older.match_id.as_str()]);
        assert_eq!(listed[0].my_player_index, 1);
        assert!(!listed[0].is_my_turn);
    }

    #[tokio::test(start_paused = true)]
    async fn test_list_open_matches_retries_transient_failures() {
        let mut matches = MockMatchRepository::new();
        let mut seq = mockall::Sequence::new();
        matches
            .expect_list_open_matches_for_player()
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_| Err(MatchRepositoryError::DynamoDb("throttled".to_string())));
        matches
            .expect_list_open_matches_for_player()
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_| Ok(vec![]));
        let lobby = lobby_over(Arc::new(matches));

        let listed = lobby.list_open_matches("A").await.unwrap();

        assert!(listed.is_empty());
    }

    #[tokio::test]
    async fn test_list_open_matches_surfaces_persistent_failure() {
        let mut matches = MockMatchRepository::new();
        matches
            .expect_list_open_matches_for_player()
            .times(1)
            .returning(|_| Err(MatchRepositoryError::Serialization("bad item".to_string())));
        let lobby = lobby_over(Arc::new(matches)).with_list_retry(RetryPolicy {
            max_attempts: 3,
            base: StdDuration::from_millis(1),
            max: StdDuration::from_millis(2),
        });

        let result = lobby.list_open_matches("A").await;

        assert!(matches!(
            result,
            Err(LobbyServiceError::Repository(
                MatchRepositoryError::Serialization(_)
            ))
        ));
    }
}
