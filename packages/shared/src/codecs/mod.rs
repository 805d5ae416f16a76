//! Per-game state codecs.
//!
//! Each game type converts its in-memory state to a storage-safe blob made
//! only of maps, arrays and scalars, and back. The [`CodecRegistry`] is filled
//! once at startup and shared read-only afterwards.

pub mod chess;
pub mod errors;
pub mod senet;

use std::collections::HashMap;
use std::sync::Arc;

use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use tracing::info;

pub use self::chess::ChessCodec;
pub use self::errors::CodecError;
pub use self::senet::SenetCodec;

/// Pure conversion between one game's domain state and its stored blob.
///
/// `decode` must accept documents written by older and newer versions of the
/// codec, filling missing or null fields with defaults.
pub trait GameCodec: Send + Sync + 'static {
    type State: Serialize + DeserializeOwned + Send + Sync;

    fn game_type(&self) -> &'static str;

    fn initial_state(&self) -> Self::State;

    fn encode(&self, state: &Self::State) -> Result<Value, CodecError>;

    fn decode(&self, blob: &Value) -> Result<Self::State, CodecError>;
}

/// Object-safe view of a [`GameCodec`] working on JSON-shaped domain states,
/// so the coordinator never needs to know a game's state type.
pub trait ErasedCodec: Send + Sync {
    fn game_type(&self) -> &'static str;

    fn initial_blob(&self) -> Result<Value, CodecError>;

    fn encode_value(&self, domain_state: &Value) -> Result<Value, CodecError>;

    fn decode_value(&self, blob: &Value) -> Result<Value, CodecError>;
}

impl<C: GameCodec> ErasedCodec for C {
    fn game_type(&self) -> &'static str {
        GameCodec::game_type(self)
    }

    fn initial_blob(&self) -> Result<Value, CodecError> {
        self.encode(&self.initial_state())
    }

    fn encode_value(&self, domain_state: &Value) -> Result<Value, CodecError> {
        let state: C::State = serde_json::from_value(domain_state.clone())
            .map_err(|e| CodecError::invalid_state(GameCodec::game_type(self), e))?;
        self.encode(&state)
    }

    fn decode_value(&self, blob: &Value) -> Result<Value, CodecError> {
        let state = self.decode(blob)?;
        serde_json::to_value(state)
            .map_err(|e| CodecError::invalid_state(GameCodec::game_type(self), e))
    }
}

#[derive(Default)]
pub struct CodecRegistry {
    codecs: HashMap<&'static str, Arc<dyn ErasedCodec>>,
}

impl CodecRegistry {
    pub fn new() -> Self {
        CodecRegistry::default()
    }

    /// Registry with every game this crate ships a codec for.
    pub fn with_builtin_games() -> Result<Self, CodecError> {
        let mut registry = CodecRegistry::new();
        registry.register(SenetCodec)?;
        registry.register(ChessCodec)?;
        Ok(registry)
    }

    pub fn register<C: GameCodec>(&mut self, codec: C) -> Result<(), CodecError> {
        let game_type = GameCodec::game_type(&codec);
        if self.codecs.contains_key(game_type) {
            return Err(CodecError::DuplicateGameType(game_type.to_string()));
        }
        self.codecs.insert(game_type, Arc::new(codec));
        Ok(())
    }

    pub fn lookup(&self, game_type: &str) -> Result<Arc<dyn ErasedCodec>, CodecError> {
        self.codecs
            .get(game_type)
            .cloned()
            .ok_or_else(|| CodecError::UnknownGameType(game_type.to_string()))
    }

    pub fn game_types(&self) -> Vec<&'static str> {
        let mut game_types: Vec<&'static str> = self.codecs.keys().copied().collect();
        game_types.sort_unstable();
        game_types
    }

    /// Startup check that every game type the deployment expects has a codec.
    pub fn self_check(&self, expected: &[&str]) -> Result<(), CodecError> {
        let missing: Vec<String> = expected
            .iter()
            .filter(|game_type| !self.codecs.contains_key(**game_type))
            .map(|game_type| game_type.to_string())
            .collect();

        if !missing.is_empty() {
            return Err(CodecError::MissingGameTypes(missing));
        }

        info!("Registered game types: {}", self.game_types().join(", "));
        Ok(())
    }
}

/// Keeps the last `limit` entries of an append-only log.
pub(crate) fn keep_recent<T: Clone>(entries: &[T], limit: usize) -> Vec<T> {
    entries[entries.len().saturating_sub(limit)..].to_vec()
}
