use std::time::Duration;

use serde::Deserialize;
use tracing::{debug, info, warn};

use crate::config::AuthorizationConfig;
use crate::error::ExchangeError;
use crate::listener::AuthorizationResponse;
use crate::token::{Token, unix_now};

/// Upper bound on a single token endpoint request
pub const TOKEN_REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// HTTP client used for token requests unless the caller supplies one
pub fn default_http_client() -> reqwest::Client {
    reqwest::Client::builder()
        .timeout(TOKEN_REQUEST_TIMEOUT)
        .build()
        .unwrap_or_else(|e| {
            warn!(error = %e, "failed to build HTTP client, token requests have no timeout");
            reqwest::Client::new()
        })
}

/// State of one outstanding authorization request.
///
/// Lives for a single flow run; the redirect must echo `state` back and the
/// token request must present `verifier` and the same `redirect_uri`.
#[derive(Debug, Clone)]
pub struct PendingExchange {
    pub state: String,
    pub verifier: String,
    pub redirect_uri: String,
}

impl PendingExchange {
    pub fn new(redirect_uri: impl Into<String>) -> Self {
        Self {
            state: generate_state(),
            verifier: generate_pkce_verifier(),
            redirect_uri: redirect_uri.into(),
        }
    }

    /// Consent page URL for this request
    pub fn authorization_url(&self, config: &AuthorizationConfig) -> String {
        let separator = if config.auth_url.contains('?') { '&' } else { '?' };
        format!(
            "{}{}\
            client_id={}&\
            redirect_uri={}&\
            response_type=code&\
            scope={}&\
            state={}&\
            code_challenge={}&\
            code_challenge_method=S256&\
            access_type=offline&\
            prompt=consent",
            config.auth_url,
            separator,
            urlencoding::encode(&config.client_id),
            urlencoding::encode(&self.redirect_uri),
            urlencoding::encode(&config.scope_param()),
            urlencoding::encode(&self.state),
            urlencoding::encode(&pkce_challenge(&self.verifier)),
        )
    }

    /// Check a redirect against this request and pull out the code.
    ///
    /// With `require_state` a missing state is rejected as well as a wrong one.
    pub fn accept(
        &self,
        response: AuthorizationResponse,
        require_state: bool,
    ) -> Result<String, ExchangeError> {
        if let Some(error) = response.error {
            return Err(ExchangeError::Denied(error));
        }
        if response.code.trim().is_empty() {
            return Err(ExchangeError::EmptyCode);
        }
        match response.state {
            Some(state) if state != self.state => return Err(ExchangeError::StateMismatch),
            None if require_state => return Err(ExchangeError::StateMismatch),
            _ => {}
        }
        Ok(response.code.trim().to_string())
    }
}

/// Generate a PKCE verifier (64 alphanumeric characters)
pub fn generate_pkce_verifier() -> String {
    use rand::Rng;
    use rand::distributions::Alphanumeric;

    rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(64)
        .map(char::from)
        .collect()
}

/// base64url(SHA256(verifier))
pub fn pkce_challenge(verifier: &str) -> String {
    use base64::Engine;
    use base64::engine::general_purpose::URL_SAFE_NO_PAD;
    use sha2::{Digest, Sha256};

    let mut hasher = Sha256::new();
    hasher.update(verifier.as_bytes());
    URL_SAFE_NO_PAD.encode(hasher.finalize())
}

fn generate_state() -> String {
    use base64::Engine;
    use base64::engine::general_purpose::URL_SAFE_NO_PAD;
    use rand::RngCore;

    let mut bytes = [0u8; 32];
    rand::thread_rng().fill_bytes(&mut bytes);
    URL_SAFE_NO_PAD.encode(bytes)
}

#[derive(Deserialize)]
struct TokenResponse {
    #[serde(default)]
    access_token: String,
    refresh_token: Option<String>,
    token_type: Option<String>,
    expires_in: Option<u64>,
}

impl TokenResponse {
    fn into_token(self, previous_refresh: Option<String>) -> Result<Token, ExchangeError> {
        if self.access_token.is_empty() {
            return Err(ExchangeError::MalformedResponse(
                "missing access_token".to_string(),
            ));
        }
        Ok(Token {
            access_token: self.access_token,
            refresh_token: self.refresh_token.or(previous_refresh),
            token_type: self.token_type.unwrap_or_else(|| "Bearer".to_string()),
            expires_at: self.expires_in.map(|secs| unix_now().saturating_add(secs)),
        })
    }
}

async fn post_token_request(
    http: &reqwest::Client,
    config: &AuthorizationConfig,
    params: &[(&str, &str)],
) -> Result<TokenResponse, ExchangeError> {
    let response = http.post(&config.token_url).form(params).send().await?;

    if !response.status().is_success() {
        let status = response.status();
        let body = response.text().await.unwrap_or_default();
        return Err(ExchangeError::Rejected { status, body });
    }

    let body = response.text().await?;
    serde_json::from_str(&body).map_err(|e| ExchangeError::MalformedResponse(e.to_string()))
}

/// Exchange authorization code for tokens
pub async fn exchange_code(
    http: &reqwest::Client,
    config: &AuthorizationConfig,
    code: &str,
    pending: &PendingExchange,
) -> Result<Token, ExchangeError> {
    if code.is_empty() {
        return Err(ExchangeError::EmptyCode);
    }
    debug!(token_url = %config.token_url, "exchanging authorization code");

    let params = [
        ("client_id", config.client_id.as_str()),
        ("client_secret", config.client_secret.as_str()),
        ("code", code),
        ("code_verifier", pending.verifier.as_str()),
        ("grant_type", "authorization_code"),
        ("redirect_uri", pending.redirect_uri.as_str()),
    ];
    let token = post_token_request(http, config, &params)
        .await?
        .into_token(None)?;

    info!(
        has_refresh_token = token.refresh_token.is_some(),
        expires_at = token.expires_at,
        "obtained OAuth token"
    );
    Ok(token)
}

/// Refresh the access token using the refresh token
pub async fn refresh_token(
    http: &reqwest::Client,
    config: &AuthorizationConfig,
    token: &Token,
) -> Result<Token, ExchangeError> {
    let refresh = token
        .refresh_token
        .as_deref()
        .ok_or(ExchangeError::NoRefreshToken)?;
    debug!(token_url = %config.token_url, "refreshing OAuth token");

    let params = [
        ("client_id", config.client_id.as_str()),
        ("client_secret", config.client_secret.as_str()),
        ("refresh_token", refresh),
        ("grant_type", "refresh_token"),
    ];
    let refreshed = post_token_request(http, config, &params)
        .await?
        .into_token(Some(refresh.to_string()))?;

    info!(expires_at = refreshed.expires_at, "OAuth token refreshed");
    Ok(refreshed)
}
