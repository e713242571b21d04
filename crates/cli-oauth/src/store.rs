use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use tempfile::NamedTempFile;
use tracing::debug;

use crate::error::TokenStoreError;
use crate::token::Token;

/// File-backed cache for a single [`Token`].
///
/// The default location is `<home>/.<app>/<app>-token.json`. Writes go to a
/// sibling temporary file that is renamed over the target, so readers see
/// either the previous token or the new one.
#[derive(Debug, Clone)]
pub struct TokenStore {
    path: PathBuf,
}

impl TokenStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Store under the current user's home directory
    pub fn for_app(app_name: &str) -> Result<Self, TokenStoreError> {
        let home = directories::UserDirs::new()
            .map(|dirs| dirs.home_dir().to_path_buf())
            .ok_or(TokenStoreError::NoHomeDir)?;
        Ok(Self::new(default_token_path(&home, app_name)))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Load token from the cache file
    pub fn load(&self) -> Result<Token, TokenStoreError> {
        let content = match fs::read_to_string(&self.path) {
            Ok(content) => content,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
                return Err(TokenStoreError::NotFound {
                    path: self.path.clone(),
                });
            }
            Err(source) => {
                return Err(TokenStoreError::Io {
                    path: self.path.clone(),
                    source,
                });
            }
        };
        serde_json::from_str(&content).map_err(|source| TokenStoreError::Corrupt {
            path: self.path.clone(),
            source,
        })
    }

    /// Save token, replacing whatever was cached before
    pub fn save(&self, token: &Token) -> Result<(), TokenStoreError> {
        let dir = match self.path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent,
            _ => Path::new("."),
        };
        self.ensure_dir(dir)?;

        let content = serde_json::to_string_pretty(token).map_err(|source| {
            TokenStoreError::Corrupt {
                path: self.path.clone(),
                source,
            }
        })?;

        // NamedTempFile is created with mode 0600 on Unix
        let mut file = NamedTempFile::new_in(dir).map_err(|e| self.io_error(e))?;
        file.write_all(content.as_bytes())
            .and_then(|_| file.as_file().sync_all())
            .map_err(|e| self.io_error(e))?;
        file.persist(&self.path)
            .map_err(|e| self.io_error(e.error))?;

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            fs::set_permissions(&self.path, fs::Permissions::from_mode(0o600))
                .map_err(|e| self.io_error(e))?;
        }

        debug!(path = %self.path.display(), "token cached");
        Ok(())
    }

    /// Remove the cache file. Returns whether a file was removed.
    pub fn clear(&self) -> Result<bool, TokenStoreError> {
        match fs::remove_file(&self.path) {
            Ok(()) => Ok(true),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(false),
            Err(source) => Err(TokenStoreError::Io {
                path: self.path.clone(),
                source,
            }),
        }
    }

    /// Create the cache directory (owner-only) if it does not exist yet
    fn ensure_dir(&self, dir: &Path) -> Result<(), TokenStoreError> {
        let mut builder = fs::DirBuilder::new();
        builder.recursive(true);
        #[cfg(unix)]
        {
            use std::os::unix::fs::DirBuilderExt;
            builder.mode(0o700);
        }
        builder.create(dir).map_err(|source| TokenStoreError::Io {
            path: dir.to_path_buf(),
            source,
        })
    }

    fn io_error(&self, source: std::io::Error) -> TokenStoreError {
        TokenStoreError::Io {
            path: self.path.clone(),
            source,
        }
    }
}

/// `<home>/.<app>/<app>-token.json`
pub fn default_token_path(home: &Path, app_name: &str) -> PathBuf {
    home.join(format!(".{}", app_name))
        .join(format!("{}-token.json", app_name))
}
