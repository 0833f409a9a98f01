use anyhow::{Context, Result};
use log::{debug, info};

use crate::domain::email::{Message, MessagePage, MessageRef};

/// The two mailbox calls the pipeline needs.
pub trait MailApi {
    fn list_messages(&self, page_token: Option<&str>) -> Result<MessagePage>;
    fn get_message(&self, id: &str) -> Result<Message>;
}

/// Walk `messages.list` until a page comes back without a next-page token.
pub fn fetch_message_refs(api: &dyn MailApi) -> Result<Vec<MessageRef>> {
    let mut refs = Vec::new();
    let mut page_token: Option<String> = None;
    let mut page_number = 0u32;

    loop {
        let page = api
            .list_messages(page_token.as_deref())
            .with_context(|| format!("listing messages (page {})", page_number + 1))?;
        page_number += 1;
        debug!("page {}: {} message ids", page_number, page.messages.len());

        // the last page carries messages too
        refs.extend(page.messages);

        page_token = page.next_page_token.filter(|t| !t.is_empty());
        if page_token.is_none() {
            break;
        }
    }

    info!("listed {} messages over {} pages", refs.len(), page_number);
    Ok(refs)
}

/// List the whole mailbox, then fetch every message in full.
pub fn fetch_messages(api: &dyn MailApi) -> Result<Vec<Message>> {
    let refs = fetch_message_refs(api)?;
    let mut messages = Vec::with_capacity(refs.len());

    for r in &refs {
        let msg = api
            .get_message(&r.id)
            .with_context(|| format!("fetching message {}", r.id))?;
        messages.push(msg);
    }

    info!("fetched {} messages", messages.len());
    Ok(messages)
}
