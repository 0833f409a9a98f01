use anyhow::{Context, Result};
use log::{info, warn};
use std::path::PathBuf;
use std::time::{SystemTime, UNIX_EPOCH};

use crate::auth::client_secret::load_client_secret;
use crate::auth::token_store::{self, StoredToken};
use crate::auth::{CredentialProvider, Credentials, GMAIL_READONLY_SCOPE, oauth};
use crate::config::{Config, resolve_client_secret_path, resolve_token_path};

/// Assumed lifetime when the provider omits `expires_in`.
const DEFAULT_EXPIRES_IN: u64 = 3500;

/// Token-file backed credentials: cached token, then refresh, then browser.
#[derive(Clone)]
pub struct TokenManager {
    pub client_secret_path: PathBuf,
    pub token_path: PathBuf,
    pub scope: String,
}

impl TokenManager {
    pub fn new(client_secret_path: PathBuf, token_path: PathBuf) -> Self {
        Self {
            client_secret_path,
            token_path,
            scope: GMAIL_READONLY_SCOPE.to_string(),
        }
    }

    pub fn from_config(cfg: &Config) -> Result<Self> {
        Ok(Self::new(
            resolve_client_secret_path(cfg)?,
            resolve_token_path(cfg)?,
        ))
    }

    fn load_cached(&self) -> Result<Option<StoredToken>> {
        let cached = token_store::load_token(&self.token_path)?;
        Ok(cached.filter(|t| {
            let ok = t.covers(&self.scope);
            if !ok {
                warn!(
                    "token file {} was issued for other scopes; re-authorizing",
                    self.token_path.display()
                );
            }
            ok
        }))
    }
}

impl CredentialProvider for TokenManager {
    fn obtain_valid_credentials(&self) -> Result<Credentials> {
        let now = SystemTime::now().duration_since(UNIX_EPOCH)?.as_secs() as i64;

        // 1) cached & not expired
        let cached = self.load_cached()?;
        if let Some(t) = &cached
            && t.is_fresh(now)
        {
            info!("Using cached access token from {}", self.token_path.display());
            return Ok(t.credentials());
        }

        let secret = load_client_secret(&self.client_secret_path)?;
        let old_refresh = cached.and_then(|t| t.refresh_token);

        // 2) refresh if possible, 3) otherwise interactive PKCE
        let (tokens, kept_refresh) = match old_refresh {
            Some(rt) => match oauth::refresh_access_token(&secret, &rt) {
                Ok(t) => {
                    info!("Refreshed access token");
                    (t, Some(rt))
                }
                Err(e) => {
                    warn!("Refresh failed: {e}, falling back to interactive auth");
                    (oauth::perform_pkce_flow(&secret, &self.scope)?, None)
                }
            },
            None => {
                info!("No usable cached token; running interactive PKCE auth flow");
                (oauth::perform_pkce_flow(&secret, &self.scope)?, None)
            }
        };

        let expires_in = tokens.expires_in.unwrap_or(DEFAULT_EXPIRES_IN);
        let stored = StoredToken {
            access_token: tokens.access_token,
            // refresh responses usually omit a new refresh token
            refresh_token: tokens.refresh_token.or(kept_refresh),
            expires_at_epoch: Some(now + expires_in as i64),
            scopes: vec![self.scope.clone()],
        };
        token_store::save_token(&self.token_path, &stored)
            .context("saving credentials for the next run")?;

        Ok(stored.credentials())
    }
}
