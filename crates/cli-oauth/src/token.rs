use serde::{Deserialize, Serialize};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

/// Seconds before the real expiry at which a token is already treated as expired
const EXPIRY_LEEWAY_SECS: u64 = 60;

/// OAuth 2.0 token information
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Token {
    /// Access token for API requests
    pub access_token: String,
    /// Refresh token for getting new access tokens
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub refresh_token: Option<String>,
    /// Token type (usually "Bearer")
    #[serde(default = "default_token_type")]
    pub token_type: String,
    /// Expiry time as Unix timestamp (seconds since epoch)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expires_at: Option<u64>,
}

fn default_token_type() -> String {
    "Bearer".to_string()
}

pub(crate) fn unix_now() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}

impl Token {
    /// Check if the token is expired or will expire soon (within 60 seconds).
    /// A token without an expiry never expires.
    pub fn is_expired(&self) -> bool {
        match self.expires_at {
            Some(expires_at) => unix_now() + EXPIRY_LEEWAY_SECS >= expires_at,
            None => false,
        }
    }

    /// Either still valid, or refreshable without asking the user again
    pub fn is_usable(&self) -> bool {
        !self.access_token.is_empty() && (!self.is_expired() || self.refresh_token.is_some())
    }

    /// Remaining lifetime, `None` when the token has no expiry
    pub fn expires_in(&self) -> Option<Duration> {
        self.expires_at
            .map(|at| Duration::from_secs(at.saturating_sub(unix_now())))
    }
}
