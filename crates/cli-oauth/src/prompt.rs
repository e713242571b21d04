use std::io::{BufRead, Write};

use url::Url;

use crate::listener::AuthorizationResponse;

/// Source of a hand-copied authorization code
pub trait CodePrompt: Send + Sync {
    /// Show `auth_url` to the user and return what they paste back
    fn read_code(&self, auth_url: &str) -> std::io::Result<String>;
}

/// Prints the consent URL to stderr and reads one line from stdin
#[derive(Debug, Default, Clone, Copy)]
pub struct StdinPrompt;

impl CodePrompt for StdinPrompt {
    fn read_code(&self, auth_url: &str) -> std::io::Result<String> {
        let mut stderr = std::io::stderr().lock();
        writeln!(
            stderr,
            "\nGo to the following link in your browser. After completing the \
            authorization flow, paste the authorization code (or the full URL \
            you were redirected to) below:\n\n{}\n",
            auth_url
        )?;
        write!(stderr, "Authorization code: ")?;
        stderr.flush()?;

        let mut line = String::new();
        std::io::stdin().lock().read_line(&mut line)?;
        Ok(line)
    }
}

/// Interpret pasted input: either a bare code or the redirected URL.
pub fn parse_pasted(input: &str) -> AuthorizationResponse {
    let input = input.trim();
    if let Ok(url) = Url::parse(input) {
        if let Some(query) = url.query() {
            return AuthorizationResponse::from_query(query);
        }
    }
    AuthorizationResponse {
        code: input.to_string(),
        ..Default::default()
    }
}
