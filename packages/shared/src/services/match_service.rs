use std::sync::Arc;

use chrono::Utc;
use serde_json::Value;
use tracing::{debug, error, info, warn};

use crate::codecs::{CodecRegistry, ErasedCodec};
use crate::models::match_record::{participants_of, Match, MatchFieldUpdates, MatchStatus, Player};
use crate::models::view::MatchView;
use crate::repositories::chat_repository::ChatRepository;
use crate::repositories::errors::match_repository_errors::MatchRepositoryError;
use crate::repositories::identity_directory::IdentityDirectory;
use crate::repositories::match_repository::{MatchPatch, MatchRepository, WriteCondition};
use crate::services::cleanup::CleanupJob;
use crate::services::errors::match_service_errors::MatchServiceError;
use crate::services::live_sync::{LiveSync, Subscription};
use crate::services::retry::RetryPolicy;

pub const DEFAULT_MAX_TURNS_PER_MATCH: u64 = 10_000;

/// Owns every write to a match document.
///
/// Moves are guarded by the turn counter the caller last saw: a move either
/// lands on exactly that counter or fails with `StaleTurn`. Nothing here
/// retries a move; the caller refreshes and decides again.
#[derive(Clone)]
pub struct MatchService {
    matches: Arc<dyn MatchRepository>,
    chats: Arc<dyn ChatRepository>,
    directory: Arc<dyn IdentityDirectory>,
    codecs: Arc<CodecRegistry>,
    live_sync: Arc<LiveSync>,
    cleanup: Arc<dyn CleanupJob>,
    max_turns: u64,
    read_retry: RetryPolicy,
}

impl MatchService {
    pub fn new(
        matches: Arc<dyn MatchRepository>,
        chats: Arc<dyn ChatRepository>,
        directory: Arc<dyn IdentityDirectory>,
        codecs: Arc<CodecRegistry>,
        live_sync: Arc<LiveSync>,
        cleanup: Arc<dyn CleanupJob>,
    ) -> Self {
        MatchService {
            matches,
            chats,
            directory,
            codecs,
            live_sync,
            cleanup,
            max_turns: DEFAULT_MAX_TURNS_PER_MATCH,
            read_retry: RetryPolicy::default(),
        }
    }

    pub fn with_max_turns(mut self, max_turns: u64) -> Self {
        self.max_turns = max_turns;
        self
    }

    pub fn with_read_retry(mut self, policy: RetryPolicy) -> Self {
        self.read_retry = policy;
        self
    }

    /// Creates an active match between two known identities.
    pub async fn create_match(
        &self,
        game_type: &str,
        player_0: &str,
        player_1: &str,
    ) -> Result<Match, MatchServiceError> {
        self.codecs.lookup(game_type)?;
        if player_0 == player_1 {
            return Err(MatchServiceError::InvalidPlayers(
                "a match needs two different players".to_string(),
            ));
        }

        let handle_0 = self.resolve_display_handle(player_0).await?;
        let handle_1 = self.resolve_display_handle(player_1).await?;

        self.create_match_with_players(
            game_type,
            [
                Player::bound(player_0, &handle_0),
                Player::bound(player_1, &handle_1),
            ],
        )
        .await
    }

    /// Creates a match from prepared seats. The first seat must be bound; an
    /// unbound second seat makes the match wait for someone to join it.
    pub async fn create_match_with_players(
        &self,
        game_type: &str,
        players: [Player; 2],
    ) -> Result<Match, MatchServiceError> {
        let codec = self.codecs.lookup(game_type)?;
        validate_seats(&players)?;

        let initial_state = codec.initial_blob()?;
        let record = Match::new(game_type, players, initial_state);

        // chat only accepts messages into an open channel, so it exists first
        self.chats
            .create_channel(&record.match_id)
            .await
            .map_err(|e| {
                error!(
                    "Could not open chat channel for match {}: {}",
                    record.match_id, e
                );
                MatchServiceError::Chat(e)
            })?;

        if let Err(e) = self.matches.create_match(&record).await {
            if let Err(cleanup) = self.chats.delete_channel(&record.match_id).await {
                warn!(
                    "Left chat channel of unwritten match {}: {}",
                    record.match_id, cleanup
                );
            }
            return Err(store_failure(e));
        }

        info!(
            "Created {} match {} ({})",
            record.game_type, record.match_id, record.status
        );
        self.live_sync.publish_match(&record);
        Ok(record)
    }

    /// Commits one move on top of `expected_turn_counter`.
    pub async fn apply_move(
        &self,
        match_id: &str,
        caller_identity: &str,
        expected_turn_counter: u64,
        new_state: &Value,
        updates: &MatchFieldUpdates,
    ) -> Result<Match, MatchServiceError> {
        updates
            .validate()
            .map_err(MatchServiceError::InvalidFieldUpdates)?;

        let record = self.fetch(match_id).await?;
        if record.turn_counter != expected_turn_counter {
            debug!(
                "Stale move on match {}: expected {}, stored {}",
                match_id, expected_turn_counter, record.turn_counter
            );
            return Err(MatchServiceError::StaleTurn {
                expected: expected_turn_counter,
            });
        }
        if !record.is_turn_of(caller_identity) {
            if !record.is_participant(caller_identity) {
                warn!(
                    "Rejected move on match {} by non-participant {}",
                    match_id, caller_identity
                );
            }
            return Err(MatchServiceError::NotYourTurn);
        }
        if expected_turn_counter >= self.max_turns {
            return Err(MatchServiceError::TurnLimitReached(self.max_turns));
        }

        let codec = self.codecs.lookup(&record.game_type)?;
        let blob = codec.encode_value(new_state)?;

        let now = Utc::now();
        let mut patch = MatchPatch::touching(now);
        patch.game_state = Some(blob);
        patch.turn_counter = Some(expected_turn_counter + 1);
        patch.last_move_by = Some(caller_identity.to_string());
        patch.last_move_at = Some(now);
        patch.current_player_index = updates.current_player_index;
        patch.status = updates.status;
        patch.winner_index = updates.winner_index;
        if updates.completes_match() {
            patch.completed_at = Some(now);
        }

        let condition = WriteCondition::TurnCounter {
            expected: expected_turn_counter,
        };
        let committed = match self.matches.update_match(match_id, &patch, &condition).await {
            Ok(committed) => committed,
            Err(MatchRepositoryError::ConditionFailed) => {
                debug!(
                    "Lost the race for turn {} of match {}",
                    expected_turn_counter, match_id
                );
                return Err(MatchServiceError::StaleTurn {
                    expected: expected_turn_counter,
                });
            }
            Err(e) => return Err(store_failure(e)),
        };

        debug!(
            "Match {} advanced to turn {}",
            match_id, committed.turn_counter
        );
        self.after_commit(record.status, &committed);
        Ok(committed)
    }

    /// Ends an active match in favour of the other player.
    pub async fn forfeit(
        &self,
        match_id: &str,
        caller_identity: &str,
    ) -> Result<Match, MatchServiceError> {
        let record = self.fetch(match_id).await?;
        let Some(index) = record.player_index(caller_identity) else {
            warn!(
                "Rejected forfeit on match {} by non-participant {}",
                match_id, caller_identity
            );
            return Err(MatchServiceError::NotAParticipant);
        };
        if record.status != MatchStatus::Active {
            return Err(MatchServiceError::MatchNotActive(record.status));
        }

        let now = Utc::now();
        let mut patch = MatchPatch::touching(now);
        patch.status = Some(MatchStatus::Forfeited);
        patch.winner_index = Some(1 - index);
        patch.completed_at = Some(now);

        let committed = self
            .update_if_status(match_id, &patch, MatchStatus::Active)
            .await?;

        info!(
            "Player {} forfeited match {}",
            caller_identity, match_id
        );
        self.after_commit(record.status, &committed);
        Ok(committed)
    }

    /// Takes the open seat of a waiting match, which starts it.
    pub async fn join_match(
        &self,
        match_id: &str,
        caller_identity: &str,
        caller_handle: &str,
    ) -> Result<Match, MatchServiceError> {
        let record = self.fetch(match_id).await?;
        if record.status != MatchStatus::Waiting {
            return Err(MatchServiceError::MatchNotActive(record.status));
        }
        if record.is_participant(caller_identity) {
            return Err(MatchServiceError::InvalidPlayers(
                "caller is already seated in this match".to_string(),
            ));
        }

        let Some(seat) = record.players.iter().position(|p| !p.is_bound()) else {
            return Err(MatchServiceError::MatchNotActive(record.status));
        };
        let invited = &record.players[seat].display_handle;
        if !invited.is_empty() && !invited.eq_ignore_ascii_case(caller_handle) {
            warn!(
                "{} tried to join match {} reserved for {}",
                caller_identity, match_id, invited
            );
            return Err(MatchServiceError::NotAParticipant);
        }

        let mut players = record.players.clone();
        players[seat] = Player::bound(caller_identity, caller_handle);

        let mut patch = MatchPatch::touching(Utc::now());
        patch.participants = Some(participants_of(&players));
        patch.players = Some(players);
        patch.status = Some(MatchStatus::Active);
        patch.current_player_index = Some(0);
        patch.turn_counter = Some(0);

        let committed = self
            .update_if_status(match_id, &patch, MatchStatus::Waiting)
            .await?;

        info!("{} joined match {}", caller_identity, match_id);
        self.after_commit(record.status, &committed);
        Ok(committed)
    }

    pub async fn get_match(
        &self,
        match_id: &str,
        caller_identity: &str,
    ) -> Result<MatchView, MatchServiceError> {
        let record = self.fetch_with_retry(match_id).await?;
        if !record.is_participant(caller_identity) {
            warn!(
                "Rejected read of match {} by non-participant {}",
                match_id, caller_identity
            );
            return Err(MatchServiceError::NotAParticipant);
        }
        let codec = self.codecs.lookup(&record.game_type)?;
        let decoded = codec.decode_value(&record.game_state)?;
        Ok(MatchView::project(&record, caller_identity, decoded))
    }

    /// Streams the caller's view of the match: the current snapshot first,
    /// then one view per committed change. The stream ends after a terminal
    /// snapshot.
    pub async fn subscribe_match(
        &self,
        match_id: &str,
        caller_identity: &str,
    ) -> Result<Subscription<MatchView>, MatchServiceError> {
        // listen before reading so no commit falls between the two
        let listener = self.live_sync.listen_match(match_id);

        let record = self.fetch_with_retry(match_id).await?;
        if !record.is_participant(caller_identity) {
            warn!(
                "Rejected subscription to match {} by non-participant {}",
                match_id, caller_identity
            );
            return Err(MatchServiceError::NotAParticipant);
        }
        let codec = self.codecs.lookup(&record.game_type)?;
        let initial = MatchView::project(
            &record,
            caller_identity,
            codec.decode_value(&record.game_state)?,
        );
        let caller = caller_identity.to_string();

        debug!("{} subscribed to match {}", caller, match_id);
        Ok(Subscription::spawn(move |sender| async move {
            let mut listener = listener;
            let mut last_seen = (record.turn_counter, record.updated_at);
            if sender.send(initial).await.is_err() || record.status.is_terminal() {
                return;
            }

            while let Some(update) = listener.recv().await {
                let version = (update.turn_counter, update.updated_at);
                if version <= last_seen {
                    continue;
                }
                last_seen = version;

                let view = match project(codec.as_ref(), &update, &caller) {
                    Ok(view) => view,
                    Err(e) => {
                        error!(
                            "Skipping undecodable update of match {}: {}",
                            update.match_id, e
                        );
                        continue;
                    }
                };
                if sender.send(view).await.is_err() || update.status.is_terminal() {
                    break;
                }
            }
        }))
    }

    async fn resolve_display_handle(&self, identity: &str) -> Result<String, MatchServiceError> {
        self.directory
            .display_handle(identity)
            .await
            .map_err(|e| {
                error!("Identity directory lookup for {} failed: {}", identity, e);
                MatchServiceError::from(e)
            })?
            .ok_or_else(|| MatchServiceError::InvalidPlayers(format!("unknown player {}", identity)))
    }

    async fn fetch(&self, match_id: &str) -> Result<Match, MatchServiceError> {
        self.matches
            .get_match(match_id)
            .await
            .map_err(store_failure)?
            .ok_or_else(|| MatchServiceError::MatchNotFound(match_id.to_string()))
    }

    async fn fetch_with_retry(&self, match_id: &str) -> Result<Match, MatchServiceError> {
        self.read_retry
            .run("get match", MatchRepositoryError::is_transient, || {
                self.matches.get_match(match_id)
            })
            .await
            .map_err(store_failure)?
            .ok_or_else(|| MatchServiceError::MatchNotFound(match_id.to_string()))
    }

    /// Status-guarded write; a failed guard reports the status found instead.
    async fn update_if_status(
        &self,
        match_id: &str,
        patch: &MatchPatch,
        expected: MatchStatus,
    ) -> Result<Match, MatchServiceError> {
        match self
            .matches
            .update_match(match_id, patch, &WriteCondition::Status(expected))
            .await
        {
            Ok(committed) => Ok(committed),
            Err(MatchRepositoryError::ConditionFailed) => {
                let current = self.fetch(match_id).await?;
                Err(MatchServiceError::MatchNotActive(current.status))
            }
            Err(e) => Err(store_failure(e)),
        }
    }

    fn after_commit(&self, previous: MatchStatus, committed: &Match) {
        self.live_sync.publish_match(committed);
        if !previous.is_terminal() && committed.status.is_terminal() {
            info!(
                "Match {} ended as {} (winner {:?})",
                committed.match_id, committed.status, committed.winner_index
            );
            self.cleanup.match_terminated(&committed.match_id);
        }
    }
}

fn project(
    codec: &dyn ErasedCodec,
    record: &Match,
    caller_identity: &str,
) -> Result<MatchView, MatchServiceError> {
    let decoded = codec.decode_value(&record.game_state)?;
    Ok(MatchView::project(record, caller_identity, decoded))
}

fn validate_seats(players: &[Player; 2]) -> Result<(), MatchServiceError> {
    if !players[0].is_bound() {
        return Err(MatchServiceError::InvalidPlayers(
            "the creating player must be known".to_string(),
        ));
    }
    for player in players.iter().filter(|p| p.is_bound()) {
        if player.display_handle.trim().is_empty() {
            return Err(MatchServiceError::InvalidPlayers(
                "a seated player needs a display handle".to_string(),
            ));
        }
    }
    if players[1].is_bound() && players[0].identity == players[1].identity {
        return Err(MatchServiceError::InvalidPlayers(
            "a match needs two different players".to_string(),
        ));
    }
    Ok(())
}

fn store_failure(err: MatchRepositoryError) -> MatchServiceError {
    error!("Match store failure: {}", err);
    MatchServiceError::Repository(err)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codecs::senet::{SenetMove, SenetState};
    use crate::repositories::chat_repository::{InMemoryChatRepository, MockChatRepository};
    use crate::repositories::errors::chat_repository_errors::ChatRepositoryError;
    use crate::repositories::identity_directory::InMemoryIdentityDirectory;
    use crate::repositories::match_repository::{InMemoryMatchRepository, MockMatchRepository};
    use crate::services::cleanup::MockCleanupJob;
    use serde_json::json;

    struct Fixture {
        service: MatchService,
        matches: Arc<InMemoryMatchRepository>,
    }

    fn fixture_with(cleanup: MockCleanupJob) -> Fixture {
        let matches = Arc::new(InMemoryMatchRepository::new());
        let directory = InMemoryIdentityDirectory::new()
            .with_player("A", "alice")
            .with_player("B", "bob")
            .with_player("C", "carol");
        let service = MatchService::new(
            matches.clone(),
            Arc::new(InMemoryChatRepository::new()),
            Arc::new(directory),
            Arc::new(CodecRegistry::with_builtin_games().unwrap()),
            Arc::new(LiveSync::new()),
            Arc::new(cleanup),
        );
        Fixture { service, matches }
    }

    fn fixture() -> Fixture {
        let mut cleanup = MockCleanupJob::new();
        cleanup.expect_match_terminated().never();
        fixture_with(cleanup)
    }

    fn state_after(record: &Match, throw: u8) -> Value {
        let mut state: SenetState = serde_json::from_value(
            CodecRegistry::with_builtin_games()
                .unwrap()
                .lookup("senet")
                .unwrap()
                .decode_value(&record.game_state)
                .unwrap(),
        )
        .unwrap();
        state.last_throw = Some(throw);
        state.moves.push(SenetMove {
            player: record.current_player_index as u8,
            from: 0,
            to: throw,
            throw,
        });
        serde_json::to_value(state).unwrap()
    }

    #[tokio::test]
    async fn test_create_match_resolves_handles() {
        let f = fixture();

        let record = f.service.create_match("senet", "A", "B").await.unwrap();

        assert_eq!(record.status, MatchStatus::Active);
        assert_eq!(record.players[0].display_handle, "alice");
        assert_eq!(record.players[1].display_handle, "bob");
        assert_eq!(record.turn_counter, 0);
        assert_eq!(f.matches.len(), 1);
    }

    #[tokio::test]
    async fn test_create_match_rejects_unknown_or_repeated_players() {
        let f = fixture();

        let same = f.service.create_match("senet", "A", "A").await;
        let unknown = f.service.create_match("senet", "A", "Z").await;

        assert!(matches!(same, Err(MatchServiceError::InvalidPlayers(_))));
        assert!(matches!(unknown, Err(MatchServiceError::InvalidPlayers(_))));
        assert!(f.matches.is_empty());
    }

    #[tokio::test]
    async fn test_apply_move_by_waiting_player_changes_nothing() {
        let f = fixture();
        let record = f.service.create_match("senet", "A", "B").await.unwrap();

        let result = f
            .service
            .apply_move(
                &record.match_id,
                "B",
                0,
                &state_after(&record, 3),
                &MatchFieldUpdates::pass_turn_to(0),
            )
            .await;

        assert!(matches!(result, Err(MatchServiceError::NotYourTurn)));
        let stored = f.matches.get_match(&record.match_id).await.unwrap().unwrap();
        assert_eq!(stored, record);
    }

    #[tokio::test]
    async fn test_apply_move_by_stranger_is_not_their_turn() {
        let f = fixture();
        let record = f.service.create_match("senet", "A", "B").await.unwrap();

        let result = f
            .service
            .apply_move(
                &record.match_id,
                "C",
                0,
                &state_after(&record, 3),
                &MatchFieldUpdates::default(),
            )
            .await;
        assert!(matches!(result, Err(MatchServiceError::NotYourTurn)));

        let stale = f
            .service
            .apply_move(
                &record.match_id,
                "C",
                7,
                &state_after(&record, 3),
                &MatchFieldUpdates::default(),
            )
            .await;
        assert!(matches!(
            stale,
            Err(MatchServiceError::StaleTurn { expected: 7 })
        ));

        let stored = f.matches.get_match(&record.match_id).await.unwrap().unwrap();
        assert_eq!(stored.turn_counter, 0);
    }

    #[tokio::test]
    async fn test_apply_move_rejects_invalid_field_updates() {
        let f = fixture();
        let record = f.service.create_match("senet", "A", "B").await.unwrap();
        let updates = MatchFieldUpdates {
            status: Some(MatchStatus::Completed),
            ..Default::default()
        };

        let result = f
            .service
            .apply_move(&record.match_id, "A", 0, &state_after(&record, 3), &updates)
            .await;

        assert!(matches!(
            result,
            Err(MatchServiceError::InvalidFieldUpdates(_))
        ));
    }

    #[tokio::test]
    async fn test_apply_move_rejects_state_of_wrong_shape() {
        let f = fixture();
        let record = f.service.create_match("senet", "A", "B").await.unwrap();

        let result = f
            .service
            .apply_move(
                &record.match_id,
                "A",
                0,
                &json!({ "board": "not a list" }),
                &MatchFieldUpdates::pass_turn_to(1),
            )
            .await;

        assert!(matches!(result, Err(MatchServiceError::Codec(_))));
    }

    #[tokio::test]
    async fn test_apply_move_stops_at_turn_limit() {
        let f = fixture();
        let service = f.service.clone().with_max_turns(1);
        let record = service.create_match("senet", "A", "B").await.unwrap();

        let first = service
            .apply_move(
                &record.match_id,
                "A",
                0,
                &state_after(&record, 2),
                &MatchFieldUpdates::pass_turn_to(1),
            )
            .await
            .unwrap();
        let second = service
            .apply_move(
                &record.match_id,
                "B",
                1,
                &state_after(&first, 4),
                &MatchFieldUpdates::pass_turn_to(0),
            )
            .await;

        assert!(matches!(
            second,
            Err(MatchServiceError::TurnLimitReached(1))
        ));
    }

    #[tokio::test]
    async fn test_lost_write_race_reports_stale_turn() {
        let record = Match::new(
            "senet",
            [Player::bound("A", "alice"), Player::bound("B", "bob")],
            Value::Null,
        );
        let stored = record.clone();
        let mut matches = MockMatchRepository::new();
        matches
            .expect_get_match()
            .returning(move |_| Ok(Some(stored.clone())));
        matches
            .expect_update_match()
            .times(1)
            .returning(|_, _, _| Err(MatchRepositoryError::ConditionFailed));
        let mut cleanup = MockCleanupJob::new();
        cleanup.expect_match_terminated().never();
        let service = MatchService::new(
            Arc::new(matches),
            Arc::new(InMemoryChatRepository::new()),
            Arc::new(InMemoryIdentityDirectory::new()),
            Arc::new(CodecRegistry::with_builtin_games().unwrap()),
            Arc::new(LiveSync::new()),
            Arc::new(cleanup),
        );

        let result = service
            .apply_move(
                &record.match_id,
                "A",
                0,
                &state_after(&record, 1),
                &MatchFieldUpdates::pass_turn_to(1),
            )
            .await;

        assert!(matches!(
            result,
            Err(MatchServiceError::StaleTurn { expected: 0 })
        ));
    }

    #[tokio::test]
    async fn test_store_failure_is_not_reported_as_stale() {
        let mut matches = MockMatchRepository::new();
        matches
            .expect_get_match()
            .returning(|_| Err(MatchRepositoryError::DynamoDb("timeout".to_string())));
        let service = MatchService::new(
            Arc::new(matches),
            Arc::new(InMemoryChatRepository::new()),
            Arc::new(InMemoryIdentityDirectory::new()),
            Arc::new(CodecRegistry::with_builtin_games().unwrap()),
            Arc::new(LiveSync::new()),
            Arc::new(MockCleanupJob::new()),
        );

        let result = service
            .apply_move("m-1", "A", 0, &Value::Null, &MatchFieldUpdates::default())
            .await;

        assert!(matches!(
            result,
            Err(MatchServiceError::Repository(MatchRepositoryError::DynamoDb(_)))
        ));
    }

    #[tokio::test]
    async fn test_completing_move_signals_cleanup_once() {
        let mut cleanup = MockCleanupJob::new();
        cleanup.expect_match_terminated().times(1).return_const(());
        let f = fixture_with(cleanup);
        let record = f.service.create_match("senet", "A", "B").await.unwrap();

        let committed = f
            .service
            .apply_move(
                &record.match_id,
                "A",
                0,
                &state_after(&record, 5),
                &MatchFieldUpdates::completed(0),
            )
            .await
            .unwrap();

        assert_eq!(committed.status, MatchStatus::Completed);
        assert_eq!(committed.winner_index, Some(0));
        assert!(committed.completed_at.is_some());

        let again = f.service.forfeit(&record.match_id, "B").await;
        assert!(matches!(
            again,
            Err(MatchServiceError::MatchNotActive(MatchStatus::Completed))
        ));
    }

    #[tokio::test]
    async fn test_forfeit_hands_win_to_opponent() {
        let mut cleanup = MockCleanupJob::new();
        cleanup
            .expect_match_terminated()
            .withf(|match_id| !match_id.is_empty())
            .times(1)
            .return_const(());
        let f = fixture_with(cleanup);
        let record = f.service.create_match("senet", "A", "B").await.unwrap();

        let forfeited = f.service.forfeit(&record.match_id, "B").await.unwrap();

        assert_eq!(forfeited.status, MatchStatus::Forfeited);
        assert_eq!(forfeited.winner_index, Some(0));
        assert_eq!(forfeited.turn_counter, 0);
    }

    #[tokio::test]
    async fn test_join_binds_invited_seat_and_starts_match() {
        let f = fixture();
        let record = f
            .service
            .create_match_with_players(
                "chess",
                [Player::bound("A", "alice"), Player::invited("Bob")],
            )
            .await
            .unwrap();
        assert_eq!(record.status, MatchStatus::Waiting);

        let early = f
            .service
            .apply_move(
                &record.match_id,
                "A",
                0,
                &json!({ "fen": crate::codecs::chess::START_FEN }),
                &MatchFieldUpdates::pass_turn_to(1),
            )
            .await;
        assert!(matches!(early, Err(MatchServiceError::NotYourTurn)));

        let intruder = f.service.join_match(&record.match_id, "C", "carol").await;
        assert!(matches!(intruder, Err(MatchServiceError::NotAParticipant)));

        let joined = f
            .service
            .join_match(&record.match_id, "B", "bob")
            .await
            .unwrap();

        assert_eq!(joined.status, MatchStatus::Active);
        assert_eq!(joined.players[1], Player::bound("B", "bob"));
        assert_eq!(joined.participants, vec!["A".to_string(), "B".to_string()]);

        let twice = f.service.join_match(&record.match_id, "C", "carol").await;
        assert!(matches!(
            twice,
            Err(MatchServiceError::MatchNotActive(MatchStatus::Active))
        ));
    }

    #[tokio::test]
    async fn test_get_match_projects_for_caller() {
        let f = fixture();
        let record = f.service.create_match("senet", "A", "B").await.unwrap();

        let for_a = f.service.get_match(&record.match_id, "A").await.unwrap();
        let for_b = f.service.get_match(&record.match_id, "B").await.unwrap();
        let stranger = f.service.get_match(&record.match_id, "C").await;

        assert!(for_a.is_my_turn);
        assert_eq!(for_b.my_player_index, 1);
        assert!(!for_b.is_my_turn);
        assert!(for_a.state_as::<SenetState>().is_ok());
        assert!(matches!(stranger, Err(MatchServiceError::NotAParticipant)));
        assert!(matches!(
            f.service.get_match("missing", "A").await,
            Err(MatchServiceError::MatchNotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_subscription_delivers_snapshot_then_moves() {
        let f = fixture();
        let record = f.service.create_match("senet", "A", "B").await.unwrap();
        let mut subscription = f
            .service
            .subscribe_match(&record.match_id, "B")
            .await
            .unwrap();

        let first = subscription.next().await.unwrap();
        assert_eq!(first.turn_counter, 0);
        assert!(!first.is_my_turn);

        f.service
            .apply_move(
                &record.match_id,
                "A",
                0,
                &state_after(&record, 3),
                &MatchFieldUpdates::pass_turn_to(1),
            )
            .await
            .unwrap();

        let second = subscription.next().await.unwrap();
        assert_eq!(second.turn_counter, 1);
        assert!(second.is_my_turn);
        let state: SenetState = second.state_as().unwrap();
        assert_eq!(state.last_throw, Some(3));

        subscription.cancel().await;
    }

    #[tokio::test]
    async fn test_create_fails_without_chat_channel() {
        let matches = Arc::new(InMemoryMatchRepository::new());
        let mut chats = MockChatRepository::new();
        chats
            .expect_create_channel()
            .times(1)
            .returning(|_| Err(ChatRepositoryError::DynamoDb("throttled".to_string())));
        let service = MatchService::new(
            matches.clone(),
            Arc::new(chats),
            Arc::new(
                InMemoryIdentityDirectory::new()
                    .with_player("A", "alice")
                    .with_player("B", "bob"),
            ),
            Arc::new(CodecRegistry::with_builtin_games().unwrap()),
            Arc::new(LiveSync::new()),
            Arc::new(MockCleanupJob::new()),
        );

        let result = service.create_match("senet", "A", "B").await;

        assert!(matches!(result, Err(MatchServiceError::Chat(_))));
        assert!(matches.is_empty());
    }

    #[tokio::test]
    async fn test_failed_match_write_closes_the_new_channel() {
        let mut matches = MockMatchRepository::new();
        matches
            .expect_create_match()
            .times(1)
            .returning(|_| Err(MatchRepositoryError::DynamoDb("timeout".to_string())));
        let mut chats = MockChatRepository::new();
        chats.expect_create_channel().times(1).returning(|_| Ok(()));
        chats.expect_delete_channel().times(1).returning(|_| Ok(1));
        let service = MatchService::new(
            Arc::new(matches),
            Arc::new(chats),
            Arc::new(
                InMemoryIdentityDirectory::new()
                    .with_player("A", "alice")
                    .with_player("B", "bob"),
            ),
            Arc::new(CodecRegistry::with_builtin_games().unwrap()),
            Arc::new(LiveSync::new()),
            Arc::new(MockCleanupJob::new()),
        );

        let result = service.create_match("senet", "A", "B").await;

        assert!(matches!(
            result,
            Err(MatchServiceError::Repository(MatchRepositoryError::DynamoDb(_)))
        ));
    }
}
