use std::env;
use std::str::FromStr;

use tracing::Level;

use crate::services::match_service::DEFAULT_MAX_TURNS_PER_MATCH;

pub const DEFAULT_BIND_ADDR: &str = "0.0.0.0:3000";

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConfigError {
    #[error("{0} environment variable must be set")]
    Missing(&'static str),

    #[error("{name} has an invalid value {value:?}")]
    Invalid { name: &'static str, value: String },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreBackend {
    DynamoDb,
    Memory,
}

impl FromStr for StoreBackend {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.to_ascii_lowercase().as_str() {
            "dynamodb" => Ok(StoreBackend::DynamoDb),
            "memory" => Ok(StoreBackend::Memory),
            other => Err(other.to_string()),
        }
    }
}

/// Table names used by the DynamoDB backend.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Tables {
    pub matches: String,
    pub chat: String,
    pub users: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    pub backend: StoreBackend,
    /// Present only for the DynamoDB backend.
    pub tables: Option<Tables>,
    pub jwt_secret: String,
    pub max_turns_per_match: u64,
    pub bind_addr: String,
    pub log_level: Level,
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        Config::from_lookup(|name| env::var(name).ok())
    }

    /// Builds the configuration from any variable source.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let required = |name: &'static str| {
            lookup(name)
                .filter(|value| !value.trim().is_empty())
                .ok_or(ConfigError::Missing(name))
        };

        let backend = parse_or(&lookup, "STORE_BACKEND", StoreBackend::Memory)?;
        let tables = match backend {
            StoreBackend::DynamoDb => Some(Tables {
                matches: required("MATCHES_TABLE")?,
                chat: required("CHAT_TABLE")?,
                users: required("USERS_TABLE")?,
            }),
            StoreBackend::Memory => None,
        };

        Ok(Config {
            backend,
            tables,
            jwt_secret: required("JWT_SECRET")?,
            max_turns_per_match: parse_or(
                &lookup,
                "MAX_TURNS_PER_MATCH",
                DEFAULT_MAX_TURNS_PER_MATCH,
            )?,
            bind_addr: lookup("BIND_ADDR").unwrap_or_else(|| DEFAULT_BIND_ADDR.to_string()),
            log_level: parse_or(&lookup, "LOG_LEVEL", Level::INFO)?,
        })
    }
}

fn parse_or<T: FromStr>(
    lookup: &impl Fn(&str) -> Option<String>,
    name: &'static str,
    default: T,
) -> Result<T, ConfigError> {
    match lookup(name) {
        None => Ok(default),
        Some(value) => value
            .trim()
            .parse()
            .map_err(|_| ConfigError::Invalid { name, value }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup_from(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |name: &str| vars.get(name).cloned()
    }

    #[test]
    fn test_memory_backend_defaults() {
        let config = Config::from_lookup(lookup_from(&[("JWT_SECRET", "secret")])).unwrap();

        assert_eq!(config.backend, StoreBackend::Memory);
        assert_eq!(config.tables, None);
        assert_eq!(config.max_turns_per_match, 10_000);
        assert_eq!(config.bind_addr, DEFAULT_BIND_ADDR);
        assert_eq!(config.log_level, Level::INFO);
    }

    #[test]
    fn test_dynamodb_backend_requires_tables() {
        let result = Config::from_lookup(lookup_from(&[
            ("JWT_SECRET", "secret"),
            ("STORE_BACKEND", "dynamodb"),
            ("MATCHES_TABLE", "matches"),
        ]));

        assert_eq!(result, Err(ConfigError::Missing("CHAT_TABLE")));
    }

    #[test]
    fn test_dynamodb_backend_with_all_tables() {
        let config = Config::from_lookup(lookup_from(&[
            ("JWT_SECRET", "secret"),
            ("STORE_BACKEND", "DynamoDB"),
            ("MATCHES_TABLE", "matches"),
            ("CHAT_TABLE", "chat"),
            ("USERS_TABLE", "users"),
            ("MAX_TURNS_PER_MATCH", "500"),
            ("LOG_LEVEL", "debug"),
        ]))
        .unwrap();

        assert_eq!(config.backend, StoreBackend::DynamoDb);
        assert_eq!(config.tables.unwrap().users, "users");
        assert_eq!(config.max_turns_per_match, 500);
        assert_eq!(config.log_level, Level::DEBUG);
    }

    #[test]
    fn test_missing_secret_and_bad_numbers() {
        assert_eq!(
            Config::from_lookup(lookup_from(&[])),
            Err(ConfigError::Missing("JWT_SECRET"))
        );
        assert_eq!(
            Config::from_lookup(lookup_from(&[
                ("JWT_SECRET", "secret"),
                ("MAX_TURNS_PER_MATCH", "lots"),
            ])),
            Err(ConfigError::Invalid {
                name: "MAX_TURNS_PER_MATCH",
                value: "lots".to_string()
            })
        );
    }
}
