pub mod client_secret;
pub mod oauth;
pub mod token_manager;
pub mod token_store;

use std::fmt;

use anyhow::Result;

/// Read-only access is all the pipeline needs.
pub const GMAIL_READONLY_SCOPE: &str = "https://www.googleapis.com/auth/gmail.readonly";

/// A bearer token that was valid when it was handed out.
#[derive(Clone)]
pub struct Credentials {
    pub access_token: String,
    pub expires_at_epoch: Option<i64>,
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("access_token", &"<redacted>")
            .field("expires_at_epoch", &self.expires_at_epoch)
            .finish()
    }
}

/// Anything that can hand the pipeline a usable access token. Interactive
/// prompts and token caching live behind this seam.
pub trait CredentialProvider {
    fn obtain_valid_credentials(&self) -> Result<Credentials>;
}
