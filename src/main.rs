use anyhow::{Result, anyhow};
use log::{debug, warn};

use mail_triage::auth::CredentialProvider;
use mail_triage::auth::token_manager::TokenManager;
use mail_triage::classify::{Classifier, build_prompt, parse_actions};
use mail_triage::config::load_config;
use mail_triage::mail::gmail::GmailClient;
use mail_triage::pipeline::collect_texts;

fn main() -> Result<()> {
    env_logger::init();

    if let Err(e) = dotenvy::dotenv() {
        debug!("no .env loaded: {e}");
    }

    let cfg = load_config().map_err(|e| anyhow!("Configuration error: {e:#}"))?;

    let credentials = TokenManager::from_config(&cfg)?.obtain_valid_credentials()?;

    let gmail = GmailClient::new(credentials.access_token, cfg.user_id.clone())
        .with_query(cfg.query.clone())
        .with_page_size(cfg.page_size);
    let (texts, report) = collect_texts(&gmail)?;

    println!(
        "{} unique texts from {} messages ({} parts skipped)",
        texts.len(),
        report.messages,
        report.skipped.len()
    );

    if texts.is_empty() {
        println!("Nothing to classify.");
        return Ok(());
    }

    if !cfg.classifier.enabled {
        for text in texts.iter() {
            println!("\n{text}");
        }
        return Ok(());
    }

    let classifier = Classifier::from_config(&cfg.classifier)?;
    let prompt = build_prompt(&cfg.owner_name, texts.as_slice());
    let payload = classifier.classify(&prompt)?;

    match parse_actions(&payload) {
        Ok(emails) => println!("{}", serde_json::to_string_pretty(&emails)?),
        Err(e) => {
            warn!("{e:#}; printing the raw answer");
            println!("{payload}");
        }
    }

    Ok(())
}
