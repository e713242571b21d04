//! OAuth 2.0 authorization-code login for command-line tools.
//!
//! [`AuthorizationFlow`] reuses a cached token when one is usable. Otherwise
//! it opens the consent page, catches the redirect on a loopback
//! [`CallbackListener`] (or lets the user paste the code), exchanges the code
//! at the token endpoint and caches the result in a [`TokenStore`]. The
//! returned [`AuthorizedClient`] keeps the token fresh for API calls.

pub mod browser;
pub mod client;
pub mod config;
pub mod error;
pub mod exchange;
pub mod flow;
pub mod listener;
pub mod prompt;
pub mod store;
pub mod token;

pub use browser::{BrowserLauncher, NoBrowser, SystemBrowser};
pub use client::AuthorizedClient;
pub use config::{AuthorizationConfig, DEFAULT_CALLBACK_PORT, scopes};
pub use error::{
    BrowserError, ConfigError, ExchangeError, FlowError, FlowStage, ListenerError,
    TokenStoreError,
};
pub use exchange::PendingExchange;
pub use flow::{AuthorizationFlow, ConsentMode, FlowOptions};
pub use listener::{AuthorizationResponse, CallbackListener};
pub use prompt::{CodePrompt, StdinPrompt};
pub use store::TokenStore;
pub use token::Token;
