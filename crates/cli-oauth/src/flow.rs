use std::sync::Arc;
use std::time::Duration;

use tokio::sync::oneshot;
use tracing::{debug, info, instrument, warn};

use crate::browser::{BrowserLauncher, SystemBrowser};
use crate::client::AuthorizedClient;
use crate::config::{AuthorizationConfig, DEFAULT_CALLBACK_PORT};
use crate::error::{FlowError, FlowStage};
use crate::exchange::{self, PendingExchange};
use crate::listener::{AuthorizationResponse, CallbackListener};
use crate::prompt::{self, CodePrompt, StdinPrompt};
use crate::store::TokenStore;
use crate::token::Token;

/// How the user hands the authorization code back to us
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ConsentMode {
    /// Loopback listener catches the redirect
    #[default]
    LocalRedirect,
    /// User pastes the code (or redirected URL) on the terminal
    Manual,
}

#[derive(Debug, Clone)]
pub struct FlowOptions {
    pub mode: ConsentMode,
    pub callback_port: u16,
    /// Switch to manual entry when the callback port cannot be bound
    pub manual_fallback: bool,
    /// Upper bound on waiting for the redirect; `None` waits forever
    pub callback_timeout: Option<Duration>,
}

impl Default for FlowOptions {
    fn default() -> Self {
        Self {
            mode: ConsentMode::LocalRedirect,
            callback_port: DEFAULT_CALLBACK_PORT,
            manual_fallback: true,
            callback_timeout: None,
        }
    }
}

/// Obtains a usable token: from the cache if possible, otherwise through an
/// interactive authorization-code grant.
///
/// The flow is scope-agnostic; downstream operations pick their scopes on
/// the [`AuthorizationConfig`] and consume the returned [`AuthorizedClient`].
pub struct AuthorizationFlow {
    config: AuthorizationConfig,
    store: TokenStore,
    options: FlowOptions,
    browser: Arc<dyn BrowserLauncher>,
    prompt: Arc<dyn CodePrompt>,
    http: reqwest::Client,
}

impl AuthorizationFlow {
    pub fn new(config: AuthorizationConfig, store: TokenStore) -> Self {
        Self {
            config,
            store,
            options: FlowOptions::default(),
            browser: Arc::new(SystemBrowser),
            prompt: Arc::new(StdinPrompt),
            http: exchange::default_http_client(),
        }
    }

    pub fn with_options(mut self, options: FlowOptions) -> Self {
        self.options = options;
        self
    }

    pub fn with_browser(mut self, browser: impl BrowserLauncher + 'static) -> Self {
        self.browser = Arc::new(browser);
        self
    }

    pub fn with_prompt(mut self, prompt: impl CodePrompt + 'static) -> Self {
        self.prompt = Arc::new(prompt);
        self
    }

    pub fn with_http_client(mut self, http: reqwest::Client) -> Self {
        self.http = http;
        self
    }

    /// Run the flow to completion
    #[instrument(skip_all, fields(token_path = %self.store.path().display()))]
    pub async fn run(&self) -> Result<AuthorizedClient, FlowError> {
        self.config.validate()?;

        debug!(stage = %FlowStage::CheckingCache, "authorization flow started");
        if let Some(token) = self.check_cache() {
            return Ok(self.authenticated(token));
        }

        debug!(stage = %FlowStage::AwaitingUserConsent, mode = ?self.options.mode, "requesting user consent");
        let (code, pending) = self.obtain_code().await?;

        debug!(stage = %FlowStage::ExchangingCode, "received authorization code");
        let exchanged = async {
            exchange::exchange_code(&self.http, &self.config, &code, &pending)
                .await
                .map_err(FlowError::from)
        };
        let token = until_interrupted(FlowStage::ExchangingCode, exchanged).await?;

        debug!(stage = %FlowStage::Authenticated, "token exchange complete");
        match self.store.save(&token) {
            Ok(()) => info!(path = %self.store.path().display(), "saved OAuth token"),
            Err(e) => warn!(error = %e, "failed to cache OAuth token, continuing with in-memory token"),
        }
        Ok(self.authenticated(token))
    }

    fn authenticated(&self, token: Token) -> AuthorizedClient {
        AuthorizedClient::new(
            self.config.clone(),
            self.store.clone(),
            self.http.clone(),
            token,
        )
    }

    /// The cache is advisory: anything but a usable token means "log in again"
    fn check_cache(&self) -> Option<Token> {
        match self.store.load() {
            Ok(token) if token.is_usable() => {
                info!(expired = token.is_expired(), "using cached OAuth token");
                Some(token)
            }
            Ok(_) => {
                warn!("cached token is expired and has no refresh token");
                None
            }
            Err(e) if e.is_not_found() => {
                info!("no cached OAuth token");
                None
            }
            Err(e) => {
                warn!(error = %e, "ignoring unreadable token cache");
                None
            }
        }
    }

    async fn obtain_code(&self) -> Result<(String, PendingExchange), FlowError> {
        if self.options.mode == ConsentMode::LocalRedirect {
            match CallbackListener::start(self.options.callback_port).await {
                Ok((listener, code_rx)) => return self.code_via_redirect(listener, code_rx).await,
                Err(e) if self.options.manual_fallback => {
                    warn!(error = %e, "falling back to manual code entry");
                }
                Err(e) => return Err(e.into()),
            }
        }
        self.code_via_prompt().await
    }

    async fn code_via_redirect(
        &self,
        listener: CallbackListener,
        mut code_rx: oneshot::Receiver<AuthorizationResponse>,
    ) -> Result<(String, PendingExchange), FlowError> {
        let pending = PendingExchange::new(listener.redirect_uri());
        let auth_url = pending.authorization_url(&self.config);

        eprintln!("\n=================================================");
        eprintln!("OAuth 2.0 Authorization Required");
        eprintln!("=================================================");
        eprintln!("\nPlease visit the following URL to authorize the application:\n");
        eprintln!("{}\n", auth_url);
        eprintln!("Waiting for authorization...");
        eprintln!("=================================================\n");

        if let Err(e) = self.browser.open(&auth_url) {
            warn!(error = %e, "could not open a browser, visit the URL manually");
        }

        let limit = self.options.callback_timeout;
        let deadline = async {
            match limit {
                Some(limit) => tokio::time::sleep(limit).await,
                None => std::future::pending::<()>().await,
            }
        };

        let received = tokio::select! {
            received = &mut code_rx => received.map_err(|_| FlowError::ListenerClosed),
            _ = deadline => Err(FlowError::Timeout(limit.unwrap_or_default())),
            Ok(()) = tokio::signal::ctrl_c() => {
                Err(FlowError::Interrupted(FlowStage::AwaitingUserConsent))
            }
        };
        listener.close().await;

        let code = pending.accept(received?, true)?;
        Ok((code, pending))
    }

    async fn code_via_prompt(&self) -> Result<(String, PendingExchange), FlowError> {
        let pending = PendingExchange::new(self.config.redirect_uri.clone());
        let auth_url = pending.authorization_url(&self.config);

        let reader = Arc::clone(&self.prompt);
        let read = async move {
            match tokio::task::spawn_blocking(move || reader.read_code(&auth_url)).await {
                Ok(line) => line.map_err(FlowError::Prompt),
                Err(e) => Err(FlowError::Prompt(std::io::Error::other(e))),
            }
        };
        let input = until_interrupted(FlowStage::AwaitingUserConsent, read).await?;
        let code = pending.accept(prompt::parse_pasted(&input), false)?;
        Ok((code, pending))
    }
}

/// Run `work` unless Ctrl+C arrives first
async fn until_interrupted<T>(
    stage: FlowStage,
    work: impl Future<Output = Result<T, FlowError>>,
) -> Result<T, FlowError> {
    tokio::select! {
        result = work => result,
        Ok(()) = tokio::signal::ctrl_c() => {
            warn!(%stage, "interrupted");
            Err(FlowError::Interrupted(stage))
        }
    }
}
