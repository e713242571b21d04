use std::sync::Arc;

use tokio::sync::Mutex;
use tracing::{info, warn};

use crate::config::AuthorizationConfig;
use crate::error::ExchangeError;
use crate::exchange;
use crate::store::TokenStore;
use crate::token::Token;

/// Authenticated handle given to API clients.
///
/// Carries the token together with the configuration needed to refresh it.
/// Refreshed tokens are written back to the store on a best-effort basis.
#[derive(Debug, Clone)]
pub struct AuthorizedClient {
    config: Arc<AuthorizationConfig>,
    store: TokenStore,
    http: reqwest::Client,
    token: Arc<Mutex<Token>>,
}

impl AuthorizedClient {
    pub fn new(
        config: AuthorizationConfig,
        store: TokenStore,
        http: reqwest::Client,
        token: Token,
    ) -> Self {
        Self {
            config: Arc::new(config),
            store,
            http,
            token: Arc::new(Mutex::new(token)),
        }
    }

    pub fn config(&self) -> &AuthorizationConfig {
        &self.config
    }

    pub fn store(&self) -> &TokenStore {
        &self.store
    }

    /// Snapshot of the current token
    pub async fn token(&self) -> Token {
        self.token.lock().await.clone()
    }

    /// Get valid access token, refreshing if necessary
    pub async fn access_token(&self) -> Result<String, ExchangeError> {
        let mut token = self.token.lock().await;
        if token.is_expired() {
            info!("access token expired, refreshing");
            *token = self.refresh_locked(&token).await?;
        }
        Ok(token.access_token.clone())
    }

    /// Refresh unconditionally
    pub async fn refresh(&self) -> Result<Token, ExchangeError> {
        let mut token = self.token.lock().await;
        *token = self.refresh_locked(&token).await?;
        Ok(token.clone())
    }

    /// Request builder carrying `Authorization: Bearer <access token>`
    pub async fn request(
        &self,
        method: reqwest::Method,
        url: impl reqwest::IntoUrl,
    ) -> Result<reqwest::RequestBuilder, ExchangeError> {
        let access_token = self.access_token().await?;
        Ok(self.http.request(method, url).bearer_auth(access_token))
    }

    async fn refresh_locked(&self, current: &Token) -> Result<Token, ExchangeError> {
        let refreshed = exchange::refresh_token(&self.http, &self.config, current).await?;
        if let Err(e) = self.store.save(&refreshed) {
            warn!(error = %e, "failed to persist refreshed token");
        }
        Ok(refreshed)
    }
}
