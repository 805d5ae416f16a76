use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MatchStatus {
    Waiting,
    Active,
    Completed,
    Forfeited,
}

impl MatchStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            MatchStatus::Waiting => "waiting",
            MatchStatus::Active => "active",
            MatchStatus::Completed => "completed",
            MatchStatus::Forfeited => "forfeited",
        }
    }

    /// Completed and forfeited matches accept no further moves.
    pub fn is_terminal(self) -> bool {
        matches!(self, MatchStatus::Completed | MatchStatus::Forfeited)
    }

    /// Waiting and active matches show up in a player's lobby.
    pub fn is_open(self) -> bool {
        !self.is_terminal()
    }
}

impl std::fmt::Display for MatchStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One seat of a match. The second seat of a waiting match carries the
/// invited handle and no identity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Player {
    #[serde(default)]
    pub identity: Option<String>,
    #[serde(default)]
    pub display_handle: String,
}

impl Player {
    pub fn bound(identity: &str, display_handle: &str) -> Self {
        Player {
            identity: Some(identity.to_string()),
            display_handle: display_handle.to_string(),
        }
    }

    pub fn invited(display_handle: &str) -> Self {
        Player {
            identity: None,
            display_handle: display_handle.to_string(),
        }
    }

    pub fn is_bound(&self) -> bool {
        self.identity.is_some()
    }

    pub fn is(&self, identity: &str) -> bool {
        self.identity.as_deref() == Some(identity)
    }
}

/// The persisted match document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Match {
    pub match_id: String,
    pub game_type: String,
    pub players: [Player; 2],
    /// Bound identities, kept alongside `players` for the per-player listing.
    #[serde(default)]
    pub participants: Vec<String>,
    pub status: MatchStatus,
    #[serde(default)]
    pub current_player_index: usize,
    #[serde(default)]
    pub turn_counter: u64,
    #[serde(default)]
    pub game_state: Value,
    #[serde(default)]
    pub winner_index: Option<usize>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    #[serde(default)]
    pub completed_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub last_move_by: Option<String>,
    #[serde(default)]
    pub last_move_at: Option<DateTime<Utc>>,
}

impl Match {
    pub fn new(game_type: &str, players: [Player; 2], initial_state: Value) -> Self {
        let now = Utc::now();
        let status = if players.iter().all(Player::is_bound) {
            MatchStatus::Active
        } else {
            MatchStatus::Waiting
        };
        let participants = participants_of(&players);

        Match {
            match_id: Uuid::new_v4().to_string(),
            game_type: game_type.to_string(),
            players,
            participants,
            status,
            current_player_index: 0,
            turn_counter: 0,
            game_state: initial_state,
            winner_index: None,
            created_at: now,
            updated_at: now,
            completed_at: None,
            last_move_by: None,
            last_move_at: None,
        }
    }

    pub fn player_index(&self, identity: &str) -> Option<usize> {
        self.players.iter().position(|player| player.is(identity))
    }

    pub fn is_participant(&self, identity: &str) -> bool {
        self.player_index(identity).is_some()
    }

    pub fn current_player(&self) -> &Player {
        &self.players[self.current_player_index.min(1)]
    }

    pub fn is_turn_of(&self, identity: &str) -> bool {
        self.status == MatchStatus::Active && self.current_player().is(identity)
    }

    pub fn summary_for(&self, identity: &str) -> MatchSummary {
        let my_player_index = self.player_index(identity);
        MatchSummary {
            match_id: self.match_id.clone(),
            game_type: self.game_type.clone(),
            status: self.status,
            player_handles: [
                self.players[0].display_handle.clone(),
                self.players[1].display_handle.clone(),
            ],
            my_player_index: my_player_index.map_or(-1, |index| index as i32),
            is_my_turn: self.is_turn_of(identity),
            turn_counter: self.turn_counter,
            updated_at: self.updated_at,
        }
    }
}

pub fn participants_of(players: &[Player; 2]) -> Vec<String> {
    players
        .iter()
        .filter_map(|player| player.identity.clone())
        .collect()
}

/// Lobby listing row; derived from a [`Match`], never stored.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MatchSummary {
    pub match_id: String,
    pub game_type: String,
    pub status: MatchStatus,
    pub player_handles: [String; 2],
    pub my_player_index: i32,
    pub is_my_turn: bool,
    pub turn_counter: u64,
    pub updated_at: DateTime<Utc>,
}

/// Fields a rules engine may flip in the same write as a move.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MatchFieldUpdates {
    #[serde(default)]
    pub current_player_index: Option<usize>,
    #[serde(default)]
    pub status: Option<MatchStatus>,
    #[serde(default)]
    pub winner_index: Option<usize>,
}

impl MatchFieldUpdates {
    pub fn pass_turn_to(player_index: usize) -> Self {
        MatchFieldUpdates {
            current_player_index: Some(player_index),
            ..Default::default()
        }
    }

    pub fn completed(winner_index: usize) -> Self {
        MatchFieldUpdates {
            status: Some(MatchStatus::Completed),
            winner_index: Some(winner_index),
            ..Default::default()
        }
    }

    pub fn validate(&self) -> Result<(), String> {
        if let Some(index) = self.current_player_index {
            if index > 1 {
                return Err(format!("current_player_index {} is out of range", index));
            }
        }
        if let Some(index) = self.winner_index {
            if index > 1 {
                return Err(format!("winner_index {} is out of range", index));
            }
        }
        match (self.status, self.winner_index) {
            (Some(MatchStatus::Waiting), _) | (Some(MatchStatus::Forfeited), _) => Err(
                "status may only be set to active or completed by a move".to_string(),
            ),
            (Some(MatchStatus::Completed), None) => {
                Err("a completed match requires a winner_index".to_string())
            }
            (Some(MatchStatus::Active), Some(_)) | (None, Some(_)) => {
                Err("winner_index may only be set together with completed".to_string())
            }
            _ => Ok(()),
        }
    }

    pub fn completes_match(&self) -> bool {
        self.status == Some(MatchStatus::Completed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;
    use serde_json::json;

    fn alice_and_bob() -> [Player; 2] {
        [Player::bound("A", "alice"), Player::bound("B", "bob")]
    }

    #[test]
    fn test_new_match_with_both_players_is_active() {
        let record = Match::new("senet", alice_and_bob(), json!({}));

        assert_eq!(record.status, MatchStatus::Active);
        assert_eq!(record.current_player_index, 0);
        assert_eq!(record.turn_counter, 0);
        assert!(record.winner_index.is_none());
        assert_eq!(record.participants, vec!["A".to_string(), "B".to_string()]);
        assert_eq!(record.created_at, record.updated_at);
    }

    #[test]
    fn test_new_match_with_unbound_seat_is_waiting() {
        let record = Match::new(
            "senet",
            [Player::bound("A", "alice"), Player::invited("bob")],
            json!({}),
        );

        assert_eq!(record.status, MatchStatus::Waiting);
        assert_eq!(record.participants, vec!["A".to_string()]);
        assert_eq!(record.player_index("B"), None);
    }

    #[test]
    fn test_match_ids_are_unique() {
        let first = Match::new("senet", alice_and_bob(), json!({}));
        let second = Match::new("senet", alice_and_bob(), json!({}));

        assert_ne!(first.match_id, second.match_id);
    }

    #[test]
    fn test_turn_ownership() {
        let mut record = Match::new("senet", alice_and_bob(), json!({}));

        assert!(record.is_turn_of("A"));
        assert!(!record.is_turn_of("B"));

        record.current_player_index = 1;
        assert!(record.is_turn_of("B"));

        record.status = MatchStatus::Completed;
        assert!(!record.is_turn_of("B"));
    }

    #[test]
    fn test_summary_for_stranger() {
        let record = Match::new("senet", alice_and_bob(), json!({}));
        let summary = record.summary_for("mallory");

        assert_eq!(summary.my_player_index, -1);
        assert!(!summary.is_my_turn);
        assert_eq!(summary.player_handles, ["alice".to_string(), "bob".to_string()]);
    }

    #[test]
    fn test_status_serializes_lowercase() {
        assert_eq!(
            serde_json::to_string(&MatchStatus::Forfeited).unwrap(),
            "\"forfeited\""
        );
        let status: MatchStatus = serde_json::from_str("\"waiting\"").unwrap();
        assert_eq!(status, MatchStatus::Waiting);
    }

    #[test]
    fn test_older_documents_deserialize_with_defaults() {
        let document = json!({
            "match_id": "m-1",
            "game_type": "senet",
            "players": [
                {"identity": "A", "display_handle": "alice"},
                {"identity": "B", "display_handle": "bob"}
            ],
            "status": "active",
            "created_at": "2024-01-01T00:00:00Z",
            "updated_at": "2024-01-01T00:00:00Z"
        });

        let record: Match = serde_json::from_value(document).unwrap();

        assert_eq!(record.turn_counter, 0);
        assert_eq!(record.current_player_index, 0);
        assert!(record.participants.is_empty());
        assert_eq!(record.game_state, Value::Null);
        assert!(record.last_move_by.is_none());
    }

    #[rstest]
    #[case(MatchFieldUpdates::default(), true)]
    #[case(MatchFieldUpdates::pass_turn_to(1), true)]
    #[case(MatchFieldUpdates::completed(0), true)]
    #[case(MatchFieldUpdates::pass_turn_to(2), false)]
    #[case(MatchFieldUpdates::completed(3), false)]
    #[case(MatchFieldUpdates { status: Some(MatchStatus::Completed), ..Default::default() }, false)]
    #[case(MatchFieldUpdates { winner_index: Some(1), ..Default::default() }, false)]
    #[case(MatchFieldUpdates { status: Some(MatchStatus::Forfeited), winner_index: Some(1), ..Default::default() }, false)]
    #[case(MatchFieldUpdates { status: Some(MatchStatus::Waiting), ..Default::default() }, false)]
    fn test_field_update_validation(#[case] updates: MatchFieldUpdates, #[case] valid: bool) {
        assert_eq!(updates.validate().is_ok(), valid);
    }
}
