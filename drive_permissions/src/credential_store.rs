//! On-disk cache for the user's OAuth credential.

use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::error::{DriveError, Result};

/// Directory under `$HOME` holding cached credentials.
pub const CREDENTIAL_DIR: &str = ".credentials";

/// File name of the cached credential.
pub const CREDENTIAL_FILE: &str = "drive-file-permissions.json";

/// Everything needed to reuse or refresh an authorization without asking the
/// user again.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoredCredential {
    pub client_id: String,
    #[serde(default)]
    pub client_secret: Option<String>,
    #[serde(default)]
    pub refresh_token: Option<String>,
    pub token_uri: String,
    pub access_token: String,
    /// Expiry of `access_token`, in seconds since the Unix epoch.
    pub token_expiry: u64,
}

/// JSON file holding a single [`StoredCredential`].
#[derive(Debug, Clone)]
pub struct CredentialStore {
    path: PathBuf,
}

impl CredentialStore {
    pub fn new<P: Into<PathBuf>>(path: P) -> Self {
        Self { path: path.into() }
    }

    /// `~/.credentials/drive-file-permissions.json`
    pub fn default_path() -> Result<PathBuf> {
        let home = dirs::home_dir().ok_or(DriveError::HomeDirectoryNotFound)?;
        Ok(home.join(CREDENTIAL_DIR).join(CREDENTIAL_FILE))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Create the directory containing the cache file if it is missing.
    pub fn ensure_dir(&self) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() && !parent.exists() {
                debug!(dir = %parent.display(), "Creating credential directory");
                fs::create_dir_all(parent)?;
            }
        }
        Ok(())
    }

    /// Load the cached credential.
    ///
    /// A missing file yields `None`. So does a file that cannot be parsed,
    /// which makes the caller fall back to a fresh consent flow.
    pub fn load(&self) -> Result<Option<StoredCredential>> {
        let content = match fs::read_to_string(&self.path) {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };

        match serde_json::from_str(&content) {
            Ok(credential) => Ok(Some(credential)),
            Err(e) => {
                warn!(path = %self.path.display(), error = %e, "Ignoring unreadable credential cache");
                Ok(None)
            }
        }
    }

    /// Write the credential, readable only by the current user on Unix.
    pub fn save(&self, credential: &StoredCredential) -> Result<()> {
        self.ensure_dir()?;
        let json = serde_json::to_string_pretty(credential)?;

        let mut options = fs::OpenOptions::new();
        options.write(true).create(true).truncate(true);
        #[cfg(unix)]
        {
            use std::os::unix::fs::OpenOptionsExt;
            options.mode(0o600);
        }

        let mut file = options.open(&self.path)?;
        file.write_all(json.as_bytes())?;
        file.flush()?;
        Ok(())
    }
}
