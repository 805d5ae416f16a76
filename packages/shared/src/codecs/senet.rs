use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use super::{keep_recent, CodecError, GameCodec};

pub const GAME_TYPE: &str = "senet";
pub const BOARD_SQUARES: usize = 30;
pub const PAWNS_PER_PLAYER: usize = 5;
/// The stored move log keeps only this many entries.
pub const MOVE_LOG_LIMIT: usize = 50;

const EMPTY_SQUARE: char = '.';

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SenetMove {
    pub player: u8,
    pub from: u8,
    pub to: u8,
    pub throw: u8,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SenetState {
    /// One entry per square; `Some(player_index)` when a pawn stands there.
    pub board: Vec<Option<u8>>,
    pub last_throw: Option<u8>,
    pub borne_off: [u8; 2],
    pub moves: Vec<SenetMove>,
}

impl Default for SenetState {
    /// Pawns alternate across the first ten squares, player 0 first.
    fn default() -> Self {
        let mut board = vec![None; BOARD_SQUARES];
        for (square, slot) in board.iter_mut().enumerate().take(PAWNS_PER_PLAYER * 2) {
            *slot = Some((square % 2) as u8);
        }
        SenetState {
            board,
            last_throw: None,
            borne_off: [0, 0],
            moves: Vec::new(),
        }
    }
}

/// Stored shape: the board as a 30-character string (`0`, `1` or `.`), the
/// move log as `[player, from, to, throw]` tuples.
#[derive(Debug, Default, Deserialize)]
struct SenetBlob {
    #[serde(default)]
    board: Option<String>,
    #[serde(default)]
    throw: Option<u8>,
    #[serde(default)]
    off: Option<[u8; 2]>,
    #[serde(default)]
    log: Option<Vec<[u8; 4]>>,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct SenetCodec;

impl SenetCodec {
    fn invalid(reason: impl std::fmt::Display) -> CodecError {
        CodecError::invalid_state(GAME_TYPE, reason)
    }

    fn encode_board(board: &[Option<u8>]) -> Result<String, CodecError> {
        if board.len() != BOARD_SQUARES {
            return Err(Self::invalid(format!(
                "board has {} squares, expected {}",
                board.len(),
                BOARD_SQUARES
            )));
        }
        board
            .iter()
            .map(|square| match square {
                None => Ok(EMPTY_SQUARE),
                Some(0) => Ok('0'),
                Some(1) => Ok('1'),
                Some(other) => Err(Self::invalid(format!("unknown player {}", other))),
            })
            .collect()
    }

    fn decode_board(encoded: &str) -> Result<Vec<Option<u8>>, CodecError> {
        if encoded.chars().count() > BOARD_SQUARES {
            return Err(Self::invalid("board string is longer than the board"));
        }
        let mut board = encoded
            .chars()
            .map(|square| match square {
                EMPTY_SQUARE => Ok(None),
                '0' => Ok(Some(0)),
                '1' => Ok(Some(1)),
                other => Err(Self::invalid(format!("unknown square marker {:?}", other))),
            })
            .collect::<Result<Vec<_>, _>>()?;
        board.resize(BOARD_SQUARES, None);
        Ok(board)
    }
}

impl GameCodec for SenetCodec {
    type State = SenetState;

    fn game_type(&self) -> &'static str {
        GAME_TYPE
    }

    fn initial_state(&self) -> SenetState {
        SenetState::default()
    }

    fn encode(&self, state: &SenetState) -> Result<Value, CodecError> {
        let board = Self::encode_board(&state.board)?;
        let log: Vec<[u8; 4]> = keep_recent(&state.moves, MOVE_LOG_LIMIT)
            .iter()
            .map(|m| [m.player, m.from, m.to, m.throw])
            .collect();

        Ok(json!({
            "board": board,
            "throw": state.last_throw,
            "off": state.borne_off,
            "log": log,
        }))
    }

    fn decode(&self, blob: &Value) -> Result<SenetState, CodecError> {
        if blob.is_null() {
            return Ok(self.initial_state());
        }
        let stored: SenetBlob = serde_json::from_value(blob.clone()).map_err(Self::invalid)?;
        let initial = self.initial_state();

        let board = match stored.board {
            Some(encoded) => Self::decode_board(&encoded)?,
            None => initial.board,
        };
        let moves = stored
            .log
            .unwrap_or_default()
            .into_iter()
            .map(|[player, from, to, throw]| SenetMove {
                player,
                from,
                to,
                throw,
            })
            .collect();

        Ok(SenetState {
            board,
            last_throw: stored.throw,
            borne_off: stored.off.unwrap_or([0, 0]),
            moves,
        })
    }
}
