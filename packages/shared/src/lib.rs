//! Turn-based two-player match synchronization.
//!
//! Matches are single documents guarded by a turn counter. Services in
//! [`services`] own every write; [`codecs`] convert per-game state to the
//! stored shape; [`repositories`] hide the store behind traits with DynamoDB
//! and in-memory implementations.

pub mod codecs;
pub mod config;
pub mod models;
pub mod repositories;
pub mod services;
