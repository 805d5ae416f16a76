use std::str::FromStr;

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use super::{keep_recent, CodecError, GameCodec};

pub const GAME_TYPE: &str = "chess";
pub const START_FEN: &str = "rnbqkbnr/pppppppp/8/8/8/8/PPPPPPPP/RNBQKBNR w KQkq - 0 1";
pub const HISTORY_LIMIT: usize = 50;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ChessState {
    pub fen: String,
    pub move_history: Vec<String>,
}

impl Default for ChessState {
    fn default() -> Self {
        ChessState {
            fen: START_FEN.to_string(),
            move_history: Vec::new(),
        }
    }
}

#[derive(Debug, Default, Deserialize)]
struct ChessBlob {
    #[serde(default)]
    fen: Option<String>,
    #[serde(default)]
    history: Option<Vec<String>>,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct ChessCodec;

impl ChessCodec {
    fn validate_fen(fen: &str) -> Result<(), CodecError> {
        ::chess::Board::from_str(fen)
            .map(|_| ())
            .map_err(|e| CodecError::invalid_state(GAME_TYPE, format!("invalid FEN: {}", e)))
    }
}

impl GameCodec for ChessCodec {
    type State = ChessState;

    fn game_type(&self) -> &'static str {
        GAME_TYPE
    }

    fn initial_state(&self) -> ChessState {
        ChessState::default()
    }

    fn encode(&self, state: &ChessState) -> Result<Value, CodecError> {
        Self::validate_fen(&state.fen)?;
        Ok(json!({
            "fen": state.fen,
            "history": keep_recent(&state.move_history, HISTORY_LIMIT),
        }))
    }

    fn decode(&self, blob: &Value) -> Result<ChessState, CodecError> {
        if blob.is_null() {
            return Ok(self.initial_state());
        }
        let stored: ChessBlob = serde_json::from_value(blob.clone())
            .map_err(|e| CodecError::invalid_state(GAME_TYPE, e))?;

        let fen = stored.fen.unwrap_or_else(|| START_FEN.to_string());
        Self::validate_fen(&fen)?;

        Ok(ChessState {
            fen,
            move_history: stored.history.unwrap_or_default(),
        })
    }
}
