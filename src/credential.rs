//! The single persisted credential and the raw token-endpoint payload it is built from.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

/// A set of tokens returned from the token endpoint after code exchange or refresh.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct TokenSet {
    pub access_token: String,
    pub refresh_token: Option<String>,
    pub expires_in: Option<i64>,
    pub scope: Option<String>,
    pub token_type: Option<String>,
    pub user_id: Option<String>,
}

/// The OAuth credential this process authenticates with.
///
/// Exactly one exists system-wide. `scope`, `token_type` and `user_id` are
/// carried for audit only; nothing here branches on them.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Credential {
    pub access_token: String,
    pub refresh_token: String,
    pub expires_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub scope: Option<String>,
    #[serde(default)]
    pub token_type: Option<String>,
    #[serde(default)]
    pub user_id: Option<String>,
}

/// Why a token response cannot become a `Credential`.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TokenSetError {
    #[error("token response has no refresh_token")]
    MissingRefreshToken,

    #[error("expires_in={0} is out of range")]
    ExpiryOutOfRange(i64),
}

impl Credential {
    /// Build a credential from a token response received at `now`.
    ///
    /// `previous` is the credential being refreshed, if any. Fields the
    /// provider omits on refresh are carried over from it.
    pub fn from_token_set(
        tokens: TokenSet,
        previous: Option<&Credential>,
        now: DateTime<Utc>,
    ) -> Result<Self, TokenSetError> {
        let refresh_token = tokens
            .refresh_token
            .filter(|rt| !rt.is_empty())
            .or_else(|| previous.map(|p| p.refresh_token.clone()))
            .ok_or(TokenSetError::MissingRefreshToken)?;

        let expires_at = match tokens.expires_in.filter(|secs| *secs > 0) {
            Some(secs) => Some(
                Duration::try_seconds(secs)
                    .and_then(|lifetime| now.checked_add_signed(lifetime))
                    .ok_or(TokenSetError::ExpiryOutOfRange(secs))?,
            ),
            None => None,
        };

        Ok(Self {
            access_token: tokens.access_token,
            refresh_token,
            expires_at,
            scope: tokens.scope.or_else(|| previous.and_then(|p| p.scope.clone())),
            token_type: tokens
                .token_type
                .or_else(|| previous.and_then(|p| p.token_type.clone())),
            user_id: tokens
                .user_id
                .or_else(|| previous.and_then(|p| p.user_id.clone())),
        })
    }

    /// Strict comparison against the stored instant, no skew margin.
    /// A credential without an expiry is never considered expired.
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        match self.expires_at {
            // valid iff now < expires_at
            Some(expires_at) => now >= expires_at,
            None => false,
        }
    }

    pub fn is_expired(&self) -> bool {
        self.is_expired_at(Utc::now())
    }
}
