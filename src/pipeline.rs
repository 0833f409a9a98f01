use anyhow::Result;

use crate::mail::fetcher::{MailApi, fetch_messages};
use crate::normalize::{NormalizeReport, NormalizedTexts, normalize_all};

/// Fetch the mailbox and reduce it to deduplicated, cleaned text.
/// Provider errors abort; per-part decode failures only show up in the report.
pub fn collect_texts(api: &dyn MailApi) -> Result<(NormalizedTexts, NormalizeReport)> {
    let messages = fetch_messages(api)?;
    Ok(normalize_all(&messages))
}
