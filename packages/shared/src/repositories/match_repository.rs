use std::collections::HashMap;

use async_trait::async_trait;
use aws_sdk_dynamodb::error::SdkError;
use aws_sdk_dynamodb::types::{AttributeValue, ReturnValue};
use aws_sdk_dynamodb::Client;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::Serialize;
use serde_dynamo::{from_item, to_attribute_value, to_item};
use serde_json::Value;
use tracing::debug;

use crate::models::match_record::{Match, MatchStatus, Player};
use crate::repositories::errors::match_repository_errors::MatchRepositoryError;

#[cfg(test)]
use mockall::automock;

/// Precondition checked atomically with a match write.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteCondition {
    /// The stored turn counter still equals `expected` and the match is active.
    TurnCounter { expected: u64 },
    /// The stored status still equals the given one.
    Status(MatchStatus),
}

impl WriteCondition {
    pub fn holds_for(&self, record: &Match) -> bool {
        match self {
            WriteCondition::TurnCounter { expected } => {
                record.turn_counter == *expected && record.status == MatchStatus::Active
            }
            WriteCondition::Status(status) => record.status == *status,
        }
    }
}

/// The set of fields one write assigns. Absent fields are left untouched.
#[derive(Debug, Clone, PartialEq)]
pub struct MatchPatch {
    pub players: Option<[Player; 2]>,
    pub participants: Option<Vec<String>>,
    pub status: Option<MatchStatus>,
    pub current_player_index: Option<usize>,
    pub turn_counter: Option<u64>,
    pub game_state: Option<Value>,
    pub winner_index: Option<usize>,
    pub completed_at: Option<DateTime<Utc>>,
    pub last_move_by: Option<String>,
    pub last_move_at: Option<DateTime<Utc>>,
    pub updated_at: DateTime<Utc>,
}

impl MatchPatch {
    pub fn touching(updated_at: DateTime<Utc>) -> Self {
        MatchPatch {
            players: None,
            participants: None,
            status: None,
            current_player_index: None,
            turn_counter: None,
            game_state: None,
            winner_index: None,
            completed_at: None,
            last_move_by: None,
            last_move_at: None,
            updated_at,
        }
    }

    pub fn apply_to(&self, record: &mut Match) {
        if let Some(players) = &self.players {
            record.players = players.clone();
        }
        if let Some(participants) = &self.participants {
            record.participants = participants.clone();
        }
        if let Some(status) = self.status {
            record.status = status;
        }
        if let Some(index) = self.current_player_index {
            record.current_player_index = index;
        }
        if let Some(turn_counter) = self.turn_counter {
            record.turn_counter = turn_counter;
        }
        if let Some(game_state) = &self.game_state {
            record.game_state = game_state.clone();
        }
        if self.winner_index.is_some() {
            record.winner_index = self.winner_index;
        }
        if self.completed_at.is_some() {
            record.completed_at = self.completed_at;
        }
        if let Some(last_move_by) = &self.last_move_by {
            record.last_move_by = Some(last_move_by.clone());
        }
        if self.last_move_at.is_some() {
            record.last_move_at = self.last_move_at;
        }
        record.updated_at = self.updated_at;
    }
}

#[cfg_attr(test, automock)]
#[async_trait]
pub trait MatchRepository: Send + Sync {
    /// Writes a new match; fails with `ConditionFailed` if the id is taken.
    async fn create_match(&self, record: &Match) -> Result<(), MatchRepositoryError>;

    async fn get_match(&self, match_id: &str) -> Result<Option<Match>, MatchRepositoryError>;

    /// Applies `patch` only if `condition` holds, returning the new document.
    async fn update_match(
        &self,
        match_id: &str,
        patch: &MatchPatch,
        condition: &WriteCondition,
    ) -> Result<Match, MatchRepositoryError>;

    /// Waiting or active matches the player is seated in, in no particular order.
    async fn list_open_matches_for_player(
        &self,
        player_id: &str,
    ) -> Result<Vec<Match>, MatchRepositoryError>;
}

/// Bound seats are copied into sparse `seat_N` attributes, each the partition
/// key of its own index, since a GSI cannot key on list elements.
const SEAT_INDEXES: [(&str, &str); 2] = [
    ("seat_0", "GSI_MatchesBySeat0"),
    ("seat_1", "GSI_MatchesBySeat1"),
];

pub struct DynamoDbMatchRepository {
    pub client: Client,
    pub table_name: String,
}

impl DynamoDbMatchRepository {
    pub fn new(client: Client, table_name: &str) -> Self {
        Self {
            client,
            table_name: table_name.to_string(),
        }
    }
}

fn attribute<T: Serialize>(value: T) -> Result<AttributeValue, MatchRepositoryError> {
    to_attribute_value(value).map_err(|e| MatchRepositoryError::Serialization(e.to_string()))
}

fn seat_attributes(players: &[Player; 2]) -> Vec<(&'static str, AttributeValue)> {
    players
        .iter()
        .zip(SEAT_INDEXES)
        .filter_map(|(player, (seat, _))| {
            player
                .identity
                .as_ref()
                .map(|identity| (seat, AttributeValue::S(identity.clone())))
        })
        .collect()
}

/// Field name and stored value for every assignment in the patch.
fn patch_assignments(
    patch: &MatchPatch,
) -> Result<Vec<(&'static str, AttributeValue)>, MatchRepositoryError> {
    let mut assignments = Vec::new();
    if let Some(players) = &patch.players {
        assignments.push(("players", attribute(players)?));
        assignments.extend(seat_attributes(players));
    }
    if let Some(participants) = &patch.participants {
        assignments.push(("participants", attribute(participants)?));
    }
    if let Some(status) = patch.status {
        assignments.push(("status", attribute(status)?));
    }
    if let Some(index) = patch.current_player_index {
        assignments.push(("current_player_index", attribute(index)?));
    }
    if let Some(turn_counter) = patch.turn_counter {
        assignments.push(("turn_counter", attribute(turn_counter)?));
    }
    if let Some(game_state) = &patch.game_state {
        assignments.push(("game_state", attribute(game_state)?));
    }
    if let Some(index) = patch.winner_index {
        assignments.push(("winner_index", attribute(index)?));
    }
    if let Some(completed_at) = patch.completed_at {
        assignments.push(("completed_at", attribute(completed_at)?));
    }
    if let Some(last_move_by) = &patch.last_move_by {
        assignments.push(("last_move_by", attribute(last_move_by)?));
    }
    if let Some(last_move_at) = patch.last_move_at {
        assignments.push(("last_move_at", attribute(last_move_at)?));
    }
    assignments.push(("updated_at", attribute(patch.updated_at)?));
    Ok(assignments)
}

#[async_trait]
impl MatchRepository for DynamoDbMatchRepository {
    async fn create_match(&self, record: &Match) -> Result<(), MatchRepositoryError> {
        let mut item: HashMap<String, AttributeValue> =
            to_item(record).map_err(|e| MatchRepositoryError::Serialization(e.to_string()))?;
        for (seat, identity) in seat_attributes(&record.players) {
            item.insert(seat.to_string(), identity);
        }

        let result = self
            .client
            .put_item()
            .table_name(&self.table_name)
            .set_item(Some(item))
            .condition_expression("attribute_not_exists(match_id)")
            .send()
            .await;

        match result {
            Ok(_) => Ok(()),
            Err(e) => {
                if let SdkError::ServiceError(service_err) = &e {
                    if service_err.err().is_conditional_check_failed_exception() {
                        return Err(MatchRepositoryError::ConditionFailed);
                    }
                }
                Err(MatchRepositoryError::DynamoDb(e.to_string()))
            }
        }
    }

    async fn get_match(&self, match_id: &str) -> Result<Option<Match>, MatchRepositoryError> {
        let result = self
            .client
            .get_item()
            .table_name(&self.table_name)
            .key("match_id", AttributeValue::S(match_id.to_string()))
            .consistent_read(true)
            .send()
            .await
            .map_err(|e| MatchRepositoryError::DynamoDb(e.to_string()))?;

        match result.item {
            Some(item) => {
                let record: Match = from_item(item)
                    .map_err(|e| MatchRepositoryError::Serialization(e.to_string()))?;
                Ok(Some(record))
            }
            None => Ok(None),
        }
    }

    async fn update_match(
        &self,
        match_id: &str,
        patch: &MatchPatch,
        condition: &WriteCondition,
    ) -> Result<Match, MatchRepositoryError> {
        let mut request = self
            .client
            .update_item()
            .table_name(&self.table_name)
            .key("match_id", AttributeValue::S(match_id.to_string()))
            .return_values(ReturnValue::AllNew);

        let mut set_clauses = Vec::new();
        for (field, value) in patch_assignments(patch)? {
            set_clauses.push(format!("#{field} = :{field}"));
            request = request
                .expression_attribute_names(format!("#{field}"), field)
                .expression_attribute_values(format!(":{field}"), value);
        }

        let condition_expression = match condition {
            WriteCondition::TurnCounter { expected } => {
                request = request
                    .expression_attribute_names("#turn_counter", "turn_counter")
                    .expression_attribute_names("#status", "status")
                    .expression_attribute_values(
                        ":expected_turn",
                        AttributeValue::N(expected.to_string()),
                    )
                    .expression_attribute_values(
                        ":expected_status",
                        AttributeValue::S(MatchStatus::Active.as_str().to_string()),
                    );
                "attribute_exists(match_id) AND #turn_counter = :expected_turn AND #status = :expected_status"
            }
            WriteCondition::Status(status) => {
                request = request
                    .expression_attribute_names("#status", "status")
                    .expression_attribute_values(
                        ":expected_status",
                        AttributeValue::S(status.as_str().to_string()),
                    );
                "attribute_exists(match_id) AND #status = :expected_status"
            }
        };

        debug!(
            "Updating match {} with condition {:?}: SET {}",
            match_id,
            condition,
            set_clauses.join(", ")
        );

        let result = request
            .update_expression(format!("SET {}", set_clauses.join(", ")))
            .condition_expression(condition_expression)
            .send()
            .await;

        let output = match result {
            Ok(output) => output,
            Err(e) => {
                if let SdkError::ServiceError(service_err) = &e {
                    if service_err.err().is_conditional_check_failed_exception() {
                        return Err(MatchRepositoryError::ConditionFailed);
                    }
                }
                return Err(MatchRepositoryError::DynamoDb(e.to_string()));
            }
        };

        let item = output.attributes.ok_or(MatchRepositoryError::NotFound)?;
        from_item(item).map_err(|e| MatchRepositoryError::Serialization(e.to_string()))
    }

    async fn list_open_matches_for_player(
        &self,
        player_id: &str,
    ) -> Result<Vec<Match>, MatchRepositoryError> {
        let mut matches = Vec::new();
        for (seat, index_name) in SEAT_INDEXES {
            matches.extend(self.query_seat_index(seat, index_name, player_id).await?);
        }
        Ok(matches)
    }
}

impl DynamoDbMatchRepository {
    async fn query_seat_index(
        &self,
        seat: &str,
        index_name: &str,
        player_id: &str,
    ) -> Result<Vec<Match>, MatchRepositoryError> {
        let mut matches = Vec::new();
        let mut start_key = None;

        loop {
            let output = self
                .client
                .query()
                .table_name(&self.table_name)
                .index_name(index_name)
                .key_condition_expression("#seat = :player")
                .filter_expression("#status = :waiting OR #status = :active")
                .expression_attribute_names("#seat", seat)
                .expression_attribute_names("#status", "status")
                .expression_attribute_values(":player", AttributeValue::S(player_id.to_string()))
                .expression_attribute_values(
                    ":waiting",
                    AttributeValue::S(MatchStatus::Waiting.as_str().to_string()),
                )
                .expression_attribute_values(
                    ":active",
                    AttributeValue::S(MatchStatus::Active.as_str().to_string()),
                )
                .set_exclusive_start_key(start_key)
                .send()
                .await
                .map_err(|e| MatchRepositoryError::DynamoDb(e.to_string()))?;

            for item in output.items.unwrap_or_default() {
                let record: Match = from_item(item)
                    .map_err(|e| MatchRepositoryError::Serialization(e.to_string()))?;
                matches.push(record);
            }

            start_key = output.last_evaluated_key;
            if start_key.is_none() {
                break;
            }
        }

        debug!(
            "Found {} open matches for {} on {}",
            matches.len(),
            player_id,
            index_name
        );
        Ok(matches)
    }
}

/// Process-local store. The condition check and the write happen under one lock.
#[derive(Default)]
pub struct InMemoryMatchRepository {
    matches: Mutex<HashMap<String, Match>>,
}

impl InMemoryMatchRepository {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.matches.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.matches.lock().is_empty()
    }
}

#[async_trait]
impl MatchRepository for InMemoryMatchRepository {
    async fn create_match(&self, record: &Match) -> Result<(), MatchRepositoryError> {
        let mut matches = self.matches.lock();
        if matches.contains_key(&record.match_id) {
            return Err(MatchRepositoryError::ConditionFailed);
        }
        matches.insert(record.match_id.clone(), record.clone());
        Ok(())
    }

    async fn get_match(&self, match_id: &str) -> Result<Option<Match>, MatchRepositoryError> {
        Ok(self.matches.lock().get(match_id).cloned())
    }

    async fn update_match(
        &self,
        match_id: &str,
        patch: &MatchPatch,
        condition: &WriteCondition,
    ) -> Result<Match, MatchRepositoryError> {
        let mut matches = self.matches.lock();
        let record = matches
            .get_mut(match_id)
            .ok_or(MatchRepositoryError::ConditionFailed)?;

        if !condition.holds_for(record) {
            return Err(MatchRepositoryError::ConditionFailed);
        }
        patch.apply_to(record);
        Ok(record.clone())
    }

    async fn list_open_matches_for_player(
        &self,
        player_id: &str,
    ) -> Result<Vec<Match>, MatchRepositoryError> {
        Ok(self
            .matches
            .lock()
            .values()
            .filter(|record| record.status.is_open() && record.is_participant(player_id))
            .cloned()
            .collect())
    }
}
