use anyhow::{Context, Result, anyhow};
use serde::Deserialize;
use std::fs;
use std::path::Path;

const GOOGLE_AUTH_URI: &str = "https://accounts.google.com/o/oauth2/v2/auth";
const GOOGLE_TOKEN_URI: &str = "https://oauth2.googleapis.com/token";

/// OAuth client registration, as downloaded from the Google Cloud console.
#[derive(Debug, Clone, Deserialize)]
pub struct ClientSecret {
    pub client_id: String,
    #[serde(default)]
    pub client_secret: Option<String>,
    #[serde(default = "default_auth_uri")]
    pub auth_uri: String,
    #[serde(default = "default_token_uri")]
    pub token_uri: String,
}

fn default_auth_uri() -> String {
    GOOGLE_AUTH_URI.to_string()
}

fn default_token_uri() -> String {
    GOOGLE_TOKEN_URI.to_string()
}

#[derive(Deserialize)]
struct ClientSecretFile {
    installed: Option<ClientSecret>,
    web: Option<ClientSecret>,
}

pub fn parse_client_secret(s: &str) -> Result<ClientSecret> {
    let file: ClientSecretFile = serde_json::from_str(s)?;
    file.installed
        .or(file.web)
        .ok_or_else(|| anyhow!("client secret file has neither an \"installed\" nor a \"web\" entry"))
}

/// Load the client secret file. A missing `client_secret` inside it may be
/// supplied through `OAUTH_CLIENT_SECRET`.
pub fn load_client_secret(path: &Path) -> Result<ClientSecret> {
    let s = fs::read_to_string(path)
        .with_context(|| format!("reading OAuth client secret file {}", path.display()))?;
    let mut secret = parse_client_secret(&s)
        .with_context(|| format!("parsing OAuth client secret file {}", path.display()))?;
    if secret.client_secret.is_none() {
        secret.client_secret = std::env::var("OAUTH_CLIENT_SECRET").ok();
    }
    Ok(secret)
}
