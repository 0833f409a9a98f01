use anyhow::{Context, Result};
use log::info;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

use crate::mail::gmail::MAX_PAGE_SIZE;

#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(default)]
pub struct Config {
    /// Google OAuth client file; defaults to `credentials.json` in the config dir.
    pub client_secret_path: Option<String>,
    /// Cached token; defaults to `token.json` in the config dir.
    pub token_path: Option<String>,
    pub user_id: String,
    /// Gmail search expression applied to the listing.
    pub query: Option<String>,
    pub page_size: u32,
    /// Who "me" is in the classification instructions.
    pub owner_name: String,
    pub classifier: ClassifierConfig,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(default)]
pub struct ClassifierConfig {
    pub enabled: bool,
    pub base_url: String,
    pub model: String,
    /// Environment variable holding the API key.
    pub api_key_env: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            client_secret_path: None,
            token_path: None,
            user_id: "me".to_string(),
            query: None,
            page_size: MAX_PAGE_SIZE,
            owner_name: "me".to_string(),
            classifier: ClassifierConfig::default(),
        }
    }
}

impl Default for ClassifierConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            base_url: "https://openrouter.ai/api/v1".to_string(),
            model: "google/gemini-2.0-flash-exp:free".to_string(),
            api_key_env: "GEMINI_API_KEY".to_string(),
        }
    }
}

fn config_dir() -> Result<PathBuf> {
    Ok(dirs::config_dir()
        .ok_or_else(|| anyhow::anyhow!("no config dir available"))?
        .join("mail_triage"))
}

pub fn config_path() -> Result<PathBuf> {
    let mut p = config_dir()?;
    fs::create_dir_all(&p)?;
    p.push("config.toml");
    Ok(p)
}

pub fn load_config() -> Result<Config> {
    load_config_from(&config_path()?)
}

/// Read the config at `path`. A missing file is replaced by a template with
/// the defaults, which are then used for this run.
pub fn load_config_from(path: &Path) -> Result<Config> {
    if !path.exists() {
        let tom = toml::to_string_pretty(&Config::default())?;
        fs::write(path, tom)
            .with_context(|| format!("writing template config {}", path.display()))?;
        info!("Created template config at {}", path.display());
        return Ok(Config::default());
    }
    let s = fs::read_to_string(path)?;
    let cfg: Config =
        toml::from_str(&s).with_context(|| format!("parsing config {}", path.display()))?;
    Ok(cfg)
}

pub fn resolve_client_secret_path(cfg: &Config) -> Result<PathBuf> {
    match &cfg.client_secret_path {
        Some(p) => Ok(PathBuf::from(p)),
        None => Ok(config_dir()?.join("credentials.json")),
    }
}

pub fn resolve_token_path(cfg: &Config) -> Result<PathBuf> {
    match &cfg.token_path {
        Some(p) => Ok(PathBuf::from(p)),
        None => Ok(config_dir()?.join("token.json")),
    }
}
