use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::models::match_record::{Match, MatchFieldUpdates, MatchStatus};

/// What one participant sees of a match on every update.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MatchView {
    pub match_id: String,
    pub game_type: String,
    /// Index of the caller in `players`, -1 when the caller is not seated.
    pub my_player_index: i32,
    pub is_my_turn: bool,
    pub status: MatchStatus,
    pub current_player_index: usize,
    pub winner_index: Option<usize>,
    pub turn_counter: u64,
    pub player_handles: [String; 2],
    pub decoded_game_state: Value,
    pub updated_at: DateTime<Utc>,
}

impl MatchView {
    pub fn project(record: &Match, caller_identity: &str, decoded_game_state: Value) -> Self {
        let my_player_index = record
            .player_index(caller_identity)
            .map_or(-1, |index| index as i32);

        MatchView {
            match_id: record.match_id.clone(),
            game_type: record.game_type.clone(),
            my_player_index,
            is_my_turn: record.status == MatchStatus::Active
                && my_player_index == record.current_player_index as i32,
            status: record.status,
            current_player_index: record.current_player_index,
            winner_index: record.winner_index,
            turn_counter: record.turn_counter,
            player_handles: [
                record.players[0].display_handle.clone(),
                record.players[1].display_handle.clone(),
            ],
            decoded_game_state,
            updated_at: record.updated_at,
        }
    }

    pub fn state_as<T: DeserializeOwned>(&self) -> Result<T, serde_json::Error> {
        serde_json::from_value(self.decoded_game_state.clone())
    }
}

/// Client-side holder for a projection that may run ahead of the server.
///
/// A pending view is never committed truth: the next authoritative snapshot
/// overwrites it, and a rejected move rolls it back.
#[derive(Debug, Clone, PartialEq)]
pub enum LocalView {
    Confirmed(MatchView),
    Pending {
        confirmed: MatchView,
        optimistic: MatchView,
    },
}

impl LocalView {
    pub fn new(snapshot: MatchView) -> Self {
        LocalView::Confirmed(snapshot)
    }

    /// The view to render.
    pub fn current(&self) -> &MatchView {
        match self {
            LocalView::Confirmed(view) => view,
            LocalView::Pending { optimistic, .. } => optimistic,
        }
    }

    pub fn confirmed(&self) -> &MatchView {
        match self {
            LocalView::Confirmed(view) => view,
            LocalView::Pending { confirmed, .. } => confirmed,
        }
    }

    pub fn is_pending(&self) -> bool {
        matches!(self, LocalView::Pending { .. })
    }

    /// Shows a submitted move before the server accepts it.
    pub fn apply_optimistic(&mut self, new_state: Value, updates: &MatchFieldUpdates) {
        let confirmed = self.confirmed().clone();
        let mut optimistic = confirmed.clone();

        optimistic.decoded_game_state = new_state;
        optimistic.turn_counter = confirmed.turn_counter + 1;
        if let Some(index) = updates.current_player_index {
            optimistic.current_player_index = index;
        }
        if let Some(status) = updates.status {
            optimistic.status = status;
        }
        if updates.winner_index.is_some() {
            optimistic.winner_index = updates.winner_index;
        }
        optimistic.is_my_turn = optimistic.status == MatchStatus::Active
            && optimistic.my_player_index == optimistic.current_player_index as i32;

        *self = LocalView::Pending {
            confirmed,
            optimistic,
        };
    }

    /// Overwrites local state with an authoritative snapshot. Snapshots older
    /// than the confirmed one are ignored.
    pub fn reconcile(&mut self, snapshot: MatchView) {
        if snapshot.turn_counter < self.confirmed().turn_counter {
            return;
        }
        *self = LocalView::Confirmed(snapshot);
    }

    pub fn rollback(&mut self) {
        if let LocalView::Pending { confirmed, .. } = self {
            *self = LocalView::Confirmed(confirmed.clone());
        }
    }
}
