use anyhow::{Context, Result, anyhow};
use log::debug;
use reqwest::blocking::{Client, Response};
use serde::de::DeserializeOwned;

use crate::domain::email::{Message, MessagePage};
use crate::mail::fetcher::MailApi;

pub const GMAIL_API_BASE: &str = "https://gmail.googleapis.com/gmail/v1";

/// Largest page `messages.list` will return.
pub const MAX_PAGE_SIZE: u32 = 500;

/// Gmail REST v1 client authorized with a bearer access token.
pub struct GmailClient {
    http: Client,
    base_url: String,
    user_id: String,
    access_token: String,
    query: Option<String>,
    page_size: u32,
}

impl GmailClient {
    pub fn new(access_token: impl Into<String>, user_id: impl Into<String>) -> Self {
        Self {
            http: Client::new(),
            base_url: GMAIL_API_BASE.to_string(),
            user_id: user_id.into(),
            access_token: access_token.into(),
            query: None,
            page_size: MAX_PAGE_SIZE,
        }
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    /// Gmail search expression, e.g. `newer_than:7d`.
    pub fn with_query(mut self, query: Option<String>) -> Self {
        self.query = query.filter(|q| !q.trim().is_empty());
        self
    }

    pub fn with_page_size(mut self, page_size: u32) -> Self {
        self.page_size = page_size.clamp(1, MAX_PAGE_SIZE);
        self
    }

    fn messages_url(&self) -> String {
        format!(
            "{}/users/{}/messages",
            self.base_url.trim_end_matches('/'),
            self.user_id
        )
    }
}

impl MailApi for GmailClient {
    fn list_messages(&self, page_token: Option<&str>) -> Result<MessagePage> {
        let mut params: Vec<(&str, String)> = vec![("maxResults", self.page_size.to_string())];
        if let Some(q) = &self.query {
            params.push(("q", q.clone()));
        }
        if let Some(token) = page_token {
            params.push(("pageToken", token.to_string()));
        }

        debug!("GET {} {:?}", self.messages_url(), page_token);
        let resp = self
            .http
            .get(self.messages_url())
            .bearer_auth(&self.access_token)
            .query(&params)
            .send()
            .context("messages.list request failed")?;
        read_json(resp, "messages.list")
    }

    fn get_message(&self, id: &str) -> Result<Message> {
        let url = format!("{}/{}", self.messages_url(), id);
        let resp = self
            .http
            .get(&url)
            .bearer_auth(&self.access_token)
            .query(&[("format", "full")])
            .send()
            .context("messages.get request failed")?;
        read_json(resp, "messages.get")
    }
}

fn read_json<T: DeserializeOwned>(resp: Response, op: &str) -> Result<T> {
    let status = resp.status();
    if !status.is_success() {
        let body = resp.text().unwrap_or_default();
        return Err(anyhow!("gmail {op} returned {status}: {body}"));
    }
    resp.json::<T>()
        .with_context(|| format!("decoding gmail {op} response"))
}
