use std::fmt;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

/// The bootstrap credentials could not be turned into an [`AuthorizationConfig`].
///
/// [`AuthorizationConfig`]: crate::AuthorizationConfig
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read credentials file '{}': {source}", .path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse credentials file '{}': {source}", .path.display())]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
    #[error("credentials file '{}' has neither an \"installed\" nor a \"web\" section", .path.display())]
    MissingClient { path: PathBuf },
    #[error("client_id is empty")]
    EmptyClientId,
}

/// Failures of the on-disk token cache.
#[derive(Debug, Error)]
pub enum TokenStoreError {
    #[error("no cached token at '{}'", .path.display())]
    NotFound { path: PathBuf },
    #[error("token cache I/O error at '{}': {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("token cache at '{}' is corrupt: {source}", .path.display())]
    Corrupt {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
    #[error("could not determine the user's home directory")]
    NoHomeDir,
}

impl TokenStoreError {
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }
}

#[derive(Debug, Error)]
pub enum ListenerError {
    #[error("failed to bind callback listener on {addr}: {source}")]
    Bind {
        addr: SocketAddr,
        #[source]
        source: std::io::Error,
    },
}

#[derive(Debug, Error)]
pub enum BrowserError {
    #[error("opening a browser is not supported here")]
    Unsupported,
    #[error("failed to open browser: {0}")]
    Launch(#[from] opener::OpenError),
}

/// Anything that stops an authorization code from becoming a token.
#[derive(Debug, Error)]
pub enum ExchangeError {
    #[error("authorization server returned an error: {0}")]
    Denied(String),
    #[error("no authorization code was received")]
    EmptyCode,
    #[error("state parameter mismatch, the redirect does not belong to this login")]
    StateMismatch,
    #[error("token request failed: {0}")]
    Request(#[from] reqwest::Error),
    #[error("token endpoint rejected the request (status {status}): {body}")]
    Rejected {
        status: reqwest::StatusCode,
        body: String,
    },
    #[error("malformed token response: {0}")]
    MalformedResponse(String),
    #[error("no refresh token available")]
    NoRefreshToken,
}

/// States of the authorization flow, used to report where a failure happened.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlowStage {
    Bootstrap,
    CheckingCache,
    AwaitingUserConsent,
    ExchangingCode,
    Authenticated,
}

impl fmt::Display for FlowStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Bootstrap => "bootstrap",
            Self::CheckingCache => "checking cache",
            Self::AwaitingUserConsent => "awaiting user consent",
            Self::ExchangingCode => "exchanging code",
            Self::Authenticated => "authenticated",
        };
        f.write_str(name)
    }
}

/// Fatal outcome of an [`AuthorizationFlow`](crate::AuthorizationFlow) run.
#[derive(Debug, Error)]
pub enum FlowError {
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),
    #[error(transparent)]
    Bind(#[from] ListenerError),
    #[error("code exchange failed: {0}")]
    Exchange(#[from] ExchangeError),
    #[error("timed out after {0:?} waiting for the authorization redirect")]
    Timeout(Duration),
    #[error("interrupted by the user")]
    Interrupted(FlowStage),
    #[error("failed to read the authorization code: {0}")]
    Prompt(#[source] std::io::Error),
    #[error("callback listener stopped before delivering a code")]
    ListenerClosed,
}

impl FlowError {
    pub fn stage(&self) -> FlowStage {
        match self {
            Self::Config(_) => FlowStage::Bootstrap,
            Self::Interrupted(stage) => *stage,
            Self::Bind(_)
            | Self::Timeout(_)
            | Self::Prompt(_)
            | Self::ListenerClosed => FlowStage::AwaitingUserConsent,
            Self::Exchange(_) => FlowStage::ExchangingCode,
        }
    }
}
