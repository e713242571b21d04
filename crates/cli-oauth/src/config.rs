use std::path::Path;

use serde::Deserialize;

use crate::error::ConfigError;

/// Default port of the loopback redirect listener
pub const DEFAULT_CALLBACK_PORT: u16 = 8090;

pub const GOOGLE_AUTH_URL: &str = "https://accounts.google.com/o/oauth2/v2/auth";
pub const GOOGLE_TOKEN_URL: &str = "https://oauth2.googleapis.com/token";

/// Well-known YouTube Data API scopes.
pub mod scopes {
    pub const YOUTUBE_READONLY: &str = "https://www.googleapis.com/auth/youtube.readonly";
    pub const YOUTUBE_UPLOAD: &str = "https://www.googleapis.com/auth/youtube.upload";
    pub const YOUTUBE_FORCE_SSL: &str = "https://www.googleapis.com/auth/youtube.force-ssl";

    /// Resolve a short preset name (`readonly`, `upload`, `manage`) to its scope URL.
    /// Anything else is passed through unchanged.
    pub fn resolve(name: &str) -> String {
        match name {
            "readonly" => YOUTUBE_READONLY.to_string(),
            "upload" => YOUTUBE_UPLOAD.to_string(),
            "manage" | "force-ssl" => YOUTUBE_FORCE_SSL.to_string(),
            other => other.to_string(),
        }
    }
}

/// Redirect URI pointing at the loopback listener on `port`
pub fn loopback_redirect_uri(port: u16) -> String {
    format!("http://localhost:{}", port)
}

/// OAuth client configuration
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthorizationConfig {
    /// OAuth client ID
    pub client_id: String,
    /// OAuth client secret
    pub client_secret: String,
    /// Authorization (consent) endpoint
    pub auth_url: String,
    /// Token endpoint
    pub token_url: String,
    /// Requested scopes
    pub scopes: Vec<String>,
    /// Redirect URI used when the code is pasted back by hand
    pub redirect_uri: String,
}

/// Client credentials file as downloaded from the Google Cloud console
#[derive(Deserialize)]
struct CredentialsFile {
    installed: Option<ClientSecret>,
    web: Option<ClientSecret>,
}

#[derive(Deserialize)]
struct ClientSecret {
    client_id: String,
    #[serde(default)]
    client_secret: String,
    auth_uri: Option<String>,
    token_uri: Option<String>,
    #[serde(default)]
    redirect_uris: Vec<String>,
}

impl AuthorizationConfig {
    /// Create new configuration with YouTube defaults
    pub fn new(client_id: String, client_secret: String) -> Self {
        Self {
            client_id,
            client_secret,
            auth_url: GOOGLE_AUTH_URL.to_string(),
            token_url: GOOGLE_TOKEN_URL.to_string(),
            scopes: vec![scopes::YOUTUBE_READONLY.to_string()],
            redirect_uri: loopback_redirect_uri(DEFAULT_CALLBACK_PORT),
        }
    }

    /// Load configuration from a client credentials JSON file
    pub fn from_credentials_file(
        path: impl AsRef<Path>,
        scopes: Vec<String>,
    ) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        let file: CredentialsFile =
            serde_json::from_str(&content).map_err(|source| ConfigError::Parse {
                path: path.to_path_buf(),
                source,
            })?;
        let secret = file
            .installed
            .or(file.web)
            .ok_or_else(|| ConfigError::MissingClient {
                path: path.to_path_buf(),
            })?;

        let mut config = Self::new(secret.client_id, secret.client_secret);
        if let Some(auth_uri) = secret.auth_uri {
            config.auth_url = auth_uri;
        }
        if let Some(token_uri) = secret.token_uri {
            config.token_url = token_uri;
        }
        if let Some(redirect_uri) = secret.redirect_uris.into_iter().next() {
            config.redirect_uri = redirect_uri;
        }
        if !scopes.is_empty() {
            config.scopes = scopes;
        }
        config.validate()?;
        Ok(config)
    }

    pub fn with_scopes(mut self, scopes: Vec<String>) -> Self {
        self.scopes = scopes;
        self
    }

    pub fn with_endpoints(mut self, auth_url: impl Into<String>, token_url: impl Into<String>) -> Self {
        self.auth_url = auth_url.into();
        self.token_url = token_url.into();
        self
    }

    pub fn with_redirect_uri(mut self, redirect_uri: impl Into<String>) -> Self {
        self.redirect_uri = redirect_uri.into();
        self
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.client_id.trim().is_empty() {
            return Err(ConfigError::EmptyClientId);
        }
        Ok(())
    }

    /// Scopes joined the way the `scope` parameter expects them
    pub fn scope_param(&self) -> String {
        self.scopes.join(" ")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn write(dir: &tempfile::TempDir, content: &str) -> std::path::PathBuf {
        let path = dir.path().join("client_credentials.json");
        std::fs::write(&path, content).unwrap();
        path
    }

    #[test]
    fn test_installed_credentials() {
        let dir = tempfile::tempdir().unwrap();
        let path = write(
            &dir,
            r#"{"installed":{"client_id":"id.apps","client_secret":"s3cret",
                "auth_uri":"https://auth.example/auth","token_uri":"https://auth.example/token",
                "redirect_uris":["http://localhost"]}}"#,
        );

        let config = AuthorizationConfig::from_credentials_file(&path, vec![]).unwrap();
        assert_eq!(config.client_id, "id.apps");
        assert_eq!(config.client_secret, "s3cret");
        assert_eq!(config.auth_url, "https://auth.example/auth");
        assert_eq!(config.token_url, "https://auth.example/token");
        assert_eq!(config.redirect_uri, "http://localhost");
        assert_eq!(config.scopes, vec![scopes::YOUTUBE_READONLY.to_string()]);
    }

    #[test]
    fn test_web_credentials_use_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = write(&dir, r#"{"web":{"client_id":"web.apps"}}"#);

        let config = AuthorizationConfig::from_credentials_file(
            &path,
            vec![scopes::YOUTUBE_UPLOAD.to_string()],
        )
        .unwrap();
        assert_eq!(config.auth_url, GOOGLE_AUTH_URL);
        assert_eq!(config.token_url, GOOGLE_TOKEN_URL);
        assert_eq!(config.redirect_uri, "http://localhost:8090");
        assert_eq!(config.scope_param(), scopes::YOUTUBE_UPLOAD);
    }

    #[test]
    fn test_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let err = AuthorizationConfig::from_credentials_file(dir.path().join("nope.json"), vec![])
            .unwrap_err();
        assert!(matches!(err, ConfigError::Read { .. }));
    }

    #[test]
    fn test_malformed_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = write(&dir, "{not json");
        let err = AuthorizationConfig::from_credentials_file(&path, vec![]).unwrap_err();
        assert!(matches!(err, ConfigError::Parse { .. }));

        let path = write(&dir, r#"{"other":{}}"#);
        let err = AuthorizationConfig::from_credentials_file(&path, vec![]).unwrap_err();
        assert!(matches!(err, ConfigError::MissingClient { .. }));

        let path = write(&dir, r#"{"installed":{"client_id":"  "}}"#);
        let err = AuthorizationConfig::from_credentials_file(&path, vec![]).unwrap_err();
        assert!(matches!(err, ConfigError::EmptyClientId));
    }

    #[test]
    fn test_scope_presets() {
        assert_eq!(scopes::resolve("upload"), scopes::YOUTUBE_UPLOAD);
        assert_eq!(scopes::resolve("manage"), scopes::YOUTUBE_FORCE_SSL);
        assert_eq!(scopes::resolve("https://x/y"), "https://x/y");

        let config = AuthorizationConfig::new("id".into(), "secret".into()).with_scopes(vec![
            scopes::YOUTUBE_READONLY.to_string(),
            scopes::YOUTUBE_UPLOAD.to_string(),
        ]);
        assert_eq!(
            config.scope_param(),
            format!("{} {}", scopes::YOUTUBE_READONLY, scopes::YOUTUBE_UPLOAD)
        );
    }
}
