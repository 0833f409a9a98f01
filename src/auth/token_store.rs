use anyhow::{Context, Result};
use log::warn;
use serde::{Deserialize, Serialize};
use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::Path;

use crate::auth::Credentials;

/// Tokens reported as expiring within this many seconds are treated as expired.
pub const EXPIRY_SKEW_SECS: i64 = 60;

/// Contents of the cached token file (default `~/.config/mail_triage/token.json`).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoredToken {
    pub access_token: String,
    #[serde(default)]
    pub refresh_token: Option<String>,
    #[serde(default)]
    pub expires_at_epoch: Option<i64>, // epoch seconds
    #[serde(default)]
    pub scopes: Vec<String>,
}

impl StoredToken {
    pub fn covers(&self, scope: &str) -> bool {
        self.scopes.iter().any(|s| s == scope)
    }

    /// A token without a known expiry is never fresh.
    pub fn is_fresh(&self, now_epoch: i64) -> bool {
        self.expires_at_epoch
            .is_some_and(|exp| now_epoch + EXPIRY_SKEW_SECS < exp)
    }

    pub fn credentials(&self) -> Credentials {
        Credentials {
            access_token: self.access_token.clone(),
            expires_at_epoch: self.expires_at_epoch,
        }
    }
}

/// Load the token file if present. An unreadable file is treated as absent
/// so the caller can re-authorize and overwrite it.
pub fn load_token(path: &Path) -> Result<Option<StoredToken>> {
    if !path.exists() {
        return Ok(None);
    }
    let s = fs::read_to_string(path)
        .with_context(|| format!("reading token file {}", path.display()))?;
    match serde_json::from_str::<StoredToken>(&s) {
        Ok(t) => Ok(Some(t)),
        Err(e) => {
            warn!("ignoring malformed token file {}: {e}", path.display());
            Ok(None)
        }
    }
}

pub fn save_token(path: &Path, token: &StoredToken) -> Result<()> {
    if let Some(dir) = path.parent()
        && !dir.as_os_str().is_empty()
    {
        fs::create_dir_all(dir)?;
    }
    let s = serde_json::to_string_pretty(token)?;

    let mut options = OpenOptions::new();
    options.write(true).create(true).truncate(true);
    #[cfg(unix)]
    {
        use std::os::unix::fs::OpenOptionsExt;
        options.mode(0o600);
    }
    let mut file = options
        .open(path)
        .with_context(|| format!("opening token file {}", path.display()))?;

    // mode() only applies on creation; an older file keeps its bits otherwise
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        file.set_permissions(fs::Permissions::from_mode(0o600))?;
    }

    file.write_all(s.as_bytes())
        .with_context(|| format!("writing token file {}", path.display()))?;
    Ok(())
}
