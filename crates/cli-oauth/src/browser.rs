use crate::error::BrowserError;

/// Something that can show the consent page to the user
pub trait BrowserLauncher: Send + Sync {
    fn open(&self, url: &str) -> Result<(), BrowserError>;
}

/// Opens URLs with the platform's default handler
/// (`xdg-open`, `open`, or the Windows shell).
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemBrowser;

impl BrowserLauncher for SystemBrowser {
    fn open(&self, url: &str) -> Result<(), BrowserError> {
        opener::open(url)?;
        Ok(())
    }
}

/// For headless hosts: never opens anything, the URL is only printed.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoBrowser;

impl BrowserLauncher for NoBrowser {
    fn open(&self, _url: &str) -> Result<(), BrowserError> {
        Err(BrowserError::Unsupported)
    }
}
