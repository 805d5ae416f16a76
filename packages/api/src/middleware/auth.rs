use axum::{extract::FromRequestParts, http::request::Parts};
use jsonwebtoken::errors::ErrorKind;
use jsonwebtoken::{decode, Algorithm, DecodingKey, Validation};
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::{error::ApiError, state::AppState};

/// Claims issued by the identity provider: `sub` is the verified identity,
/// `handle` the public display handle.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Claims {
    pub sub: String,
    pub handle: String,
    pub exp: u64,
    #[serde(default)]
    pub iat: u64,
}

pub struct TokenVerifier {
    decoding_key: DecodingKey,
    validation: Validation,
}

impl TokenVerifier {
    pub fn new(secret: &str) -> Self {
        TokenVerifier {
            decoding_key: DecodingKey::from_secret(secret.as_bytes()),
            validation: Validation::new(Algorithm::HS256),
        }
    }

    pub fn verify(&self, token: &str) -> Result<Claims, ApiError> {
        match decode::<Claims>(token, &self.decoding_key, &self.validation) {
            Ok(data) if data.claims.sub.is_empty() => {
                Err(ApiError::Unauthorized("token has no subject".to_string()))
            }
            Ok(data) => Ok(data.claims),
            Err(err) => match err.kind() {
                ErrorKind::ExpiredSignature => {
                    Err(ApiError::Unauthorized("token expired".to_string()))
                }
                _ => Err(ApiError::Unauthorized("invalid token".to_string())),
            },
        }
    }
}

#[derive(Debug, Clone)]
pub struct AuthenticatedUser {
    pub identity: String,
    pub handle: String,
}

/// Browsers cannot set headers on a WebSocket handshake, so the token may
/// also arrive as `?access_token=`.
fn bearer_token(parts: &Parts) -> Option<&str> {
    if let Some(header) = parts.headers.get("Authorization") {
        return header.to_str().ok()?.strip_prefix("Bearer ");
    }
    parts
        .uri
        .query()?
        .split('&')
        .find_map(|pair| pair.strip_prefix("access_token="))
}

impl FromRequestParts<AppState> for AuthenticatedUser {
    type Rejection = ApiError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let token = bearer_token(parts)
            .ok_or_else(|| ApiError::Unauthorized("missing bearer token".to_string()))?;

        let claims = state.tokens.verify(token).map_err(|e| {
            warn!("Rejected request to {}: {}", parts.uri.path(), e);
            e
        })?;

        Ok(AuthenticatedUser {
            identity: claims.sub,
            handle: claims.handle,
        })
    }
}

#[cfg(test)]
pub fn issue_token(secret: &str, identity: &str, handle: &str, ttl_secs: i64) -> String {
    use jsonwebtoken::{encode, get_current_timestamp, EncodingKey, Header};

    let now = get_current_timestamp();
    let claims = Claims {
        sub: identity.to_string(),
        handle: handle.to_string(),
        exp: now.saturating_add_signed(ttl_secs),
        iat: now,
    };
    encode(
        &Header::new(Algorithm::HS256),
        &claims,
        &EncodingKey::from_secret(secret.as_bytes()),
    )
    .unwrap()
}
