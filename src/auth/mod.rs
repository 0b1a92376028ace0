mod google;
mod provider;

pub use google::{GoogleIdentity, clear_tokens as clear_google_tokens};
pub use provider::{CredentialProvider, CredentialSettings};

#[cfg(test)]
pub(crate) use provider::test_helpers;

use crate::error::Result;
use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

/// Lifetime assumed for every issued token.
pub const TOKEN_LIFETIME_SECS: i64 = 3600;

/// The host identity system that actually issues bearer tokens.
#[async_trait]
pub trait IdentityProvider: Send + Sync {
    /// Obtain a token. Only interactive calls may prompt the user.
    async fn acquire_token(&self, interactive: bool) -> Result<String>;

    /// Obtain a token that is newer than any cached one.
    async fn refresh_token(&self) -> Result<String> {
        self.acquire_token(false).await
    }

    /// Tell the host the token must no longer be used.
    async fn invalidate_token(&self, token: &str) -> Result<()>;
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Credential {
    pub token: String,
    pub acquired_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    pub interactive: bool,
}

impl Credential {
    pub fn issued(token: String, interactive: bool) -> Self {
        let acquired_at = Utc::now();
        Self {
            token,
            acquired_at,
            expires_at: acquired_at + Duration::seconds(TOKEN_LIFETIME_SECS),
            interactive,
        }
    }

    pub fn is_expired(&self) -> bool {
        self.expires_at <= Utc::now()
    }

    /// Whether less than `window` of lifetime remains.
    pub fn expires_within(&self, window: Duration) -> bool {
        self.expires_at - Utc::now() < window
    }
}

const MIN_TOKEN_LEN: usize = 20;

/// Structural token check. Never touches the network.
pub fn is_valid_token(token: &str) -> bool {
    token.len() >= MIN_TOKEN_LEN
        && token
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || "-._~+/=".contains(c))
}
