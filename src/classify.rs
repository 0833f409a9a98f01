//! Single chat-completion call that labels each email with a next action.

use anyhow::{Context, Result, anyhow};
use log::{debug, info};
use reqwest::blocking::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::config::ClassifierConfig;

const REQUEST_TIMEOUT: Duration = Duration::from_secs(120);

const PREAMBLE: &str = "Here are the messages. The next message is indicated clearly each time.";

/// Separates consecutive emails inside the prompt payload.
pub const MESSAGE_DELIMITER: &str = "\n\nTHIS IS NOW THE NEXT MESSAGE.\n";

const INSTRUCTIONS: &str = r#"
For each email in the email data:
    Extract the timestamp of the email if possible.
    Write a short summary of the email's content under "summary".

    Start with the next action "Do Nothing".

    If the email comes from someone other than me ({owner}) and I have not replied yet, then
        set the next action to "Respond".

    If the email is from me and the other person has not replied within a few days, or it contains
    follow-up words such as "reminder" or "due", then
        set the next action to "Follow Up".

    If the email is important but asks for no direct action and needs no reply, then
        set the next action to "Flag for Review".

    Record each email as an object with the keys "sender_email", "sender_name", "timestamp",
    "subject", "summary" and "next_action".

Answer with the list of these objects as a JSON array.
"#;

/// Instructions plus the joined email texts, sent as two text segments.
#[derive(Debug, Clone)]
pub struct ClassifierPrompt {
    pub instructions: String,
    pub messages: String,
}

pub fn build_prompt(owner: &str, texts: &[String]) -> ClassifierPrompt {
    ClassifierPrompt {
        instructions: INSTRUCTIONS.replace("{owner}", owner),
        messages: format!("{PREAMBLE}\n\n{}", texts.join(MESSAGE_DELIMITER)),
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum NextAction {
    #[serde(rename = "Do Nothing", alias = "do nothing", alias = "DoNothing")]
    DoNothing,
    #[serde(alias = "respond")]
    Respond,
    #[serde(rename = "Follow Up", alias = "follow up", alias = "FollowUp")]
    FollowUp,
    #[serde(rename = "Flag for Review", alias = "flag for review", alias = "FlagForReview")]
    FlagForReview,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClassifiedEmail {
    #[serde(default, alias = "senderEmail", alias = "sender's email")]
    pub sender_email: Option<String>,
    #[serde(default, alias = "senderName", alias = "sender's name")]
    pub sender_name: Option<String>,
    #[serde(default)]
    pub timestamp: Option<String>,
    #[serde(default)]
    pub subject: Option<String>,
    #[serde(default)]
    pub summary: Option<String>,
    #[serde(alias = "nextAction", alias = "next action")]
    pub next_action: NextAction,
}

/// Parse the classifier payload. Models drift, so callers should fall back
/// to the raw text when this fails.
pub fn parse_actions(payload: &str) -> Result<Vec<ClassifiedEmail>> {
    serde_json::from_str(payload).context("classifier output is not a JSON array of emails")
}

/// Remove a markdown code fence around the answer, if there is one.
/// Text without a fence is returned whole (trimmed).
pub fn strip_code_fence(text: &str) -> &str {
    let trimmed = text.trim();
    let Some(open) = trimmed.find("```") else {
        return trimmed;
    };
    let after_open = &trimmed[open + 3..];

    let body = match after_open.find('\n') {
        Some(nl) if is_lang_tag(&after_open[..nl]) => &after_open[nl + 1..],
        _ => strip_inline_tag(after_open),
    };

    match body.find("```") {
        Some(close) => body[..close].trim(),
        // unterminated: the model was cut off mid-answer
        None => body.trim(),
    }
}

/// "```json [1]```" puts the tag on the same line as the payload.
fn strip_inline_tag(s: &str) -> &str {
    match s.split_once(char::is_whitespace) {
        Some((tag, rest)) if !tag.is_empty() && is_lang_tag(tag) => rest,
        _ => s,
    }
}

fn is_lang_tag(s: &str) -> bool {
    s.trim()
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '+' | '_' | '.'))
}

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
}

#[derive(Serialize)]
struct ChatMessage<'a> {
    role: &'static str,
    content: Vec<ContentPart<'a>>,
}

#[derive(Serialize)]
struct ContentPart<'a> {
    #[serde(rename = "type")]
    kind: &'static str,
    text: &'a str,
}

#[derive(Deserialize)]
struct ChatResponse {
    #[serde(default)]
    choices: Vec<ChatChoice>,
}

#[derive(Deserialize)]
struct ChatChoice {
    message: ChatResponseMessage,
}

#[derive(Deserialize)]
struct ChatResponseMessage {
    #[serde(default)]
    content: Option<String>,
}

/// OpenAI-compatible chat-completions endpoint (OpenRouter by default).
pub struct Classifier {
    http: Client,
    base_url: String,
    model: String,
    api_key: String,
}

impl Classifier {
    pub fn new(
        base_url: impl Into<String>,
        model: impl Into<String>,
        api_key: impl Into<String>,
    ) -> Result<Self> {
        let http = Client::builder().timeout(REQUEST_TIMEOUT).build()?;
        Ok(Self {
            http,
            base_url: base_url.into(),
            model: model.into(),
            api_key: api_key.into(),
        })
    }

    pub fn from_config(cfg: &ClassifierConfig) -> Result<Self> {
        let api_key = std::env::var(&cfg.api_key_env)
            .with_context(|| format!("{} is not set", cfg.api_key_env))?;
        Self::new(cfg.base_url.clone(), cfg.model.clone(), api_key)
    }

    /// Raw model answer, untouched.
    pub fn complete(&self, prompt: &ClassifierPrompt) -> Result<String> {
        let request = ChatRequest {
            model: &self.model,
            messages: vec![ChatMessage {
                role: "user",
                content: vec![
                    ContentPart {
                        kind: "text",
                        text: &prompt.instructions,
                    },
                    ContentPart {
                        kind: "text",
                        text: &prompt.messages,
                    },
                ],
            }],
        };

        let url = format!("{}/chat/completions", self.base_url.trim_end_matches('/'));
        debug!(
            "POST {url} model={} payload={} chars",
            self.model,
            prompt.messages.len()
        );

        let resp = self
            .http
            .post(&url)
            .bearer_auth(&self.api_key)
            .header("X-Title", "mail_triage")
            .json(&request)
            .send()
            .context("chat completion request failed")?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().unwrap_or_default();
            return Err(anyhow!("chat completion returned {status}: {body}"));
        }

        let body: ChatResponse = resp.json().context("decoding chat completion response")?;
        let content = body
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .ok_or_else(|| anyhow!("chat completion returned no content"))?;
        info!("classifier answered with {} chars", content.len());
        Ok(content)
    }

    /// The model's answer with any surrounding code fence removed.
    pub fn classify(&self, prompt: &ClassifierPrompt) -> Result<String> {
        let raw = self.complete(prompt)?;
        Ok(strip_code_fence(&raw).to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mockito::Matcher;

    #[test]
    fn prompt_joins_texts_in_order() {
        let texts = vec!["first email".to_string(), "second email".to_string()];
        let prompt = build_prompt("Jack Fan", &texts);

        assert!(prompt.instructions.contains("me (Jack Fan)"));
        assert!(prompt.instructions.contains("\"Flag for Review\""));
        assert!(prompt.messages.starts_with(PREAMBLE));
        assert!(
            prompt
                .messages
                .ends_with("first email\n\nTHIS IS NOW THE NEXT MESSAGE.\nsecond email")
        );
    }

    #[test]
    fn fence_with_json_tag() {
        let raw = "```json\n[{\"next_action\": \"Respond\"}]\n```\n";
        assert_eq!(strip_code_fence(raw), "[{\"next_action\": \"Respond\"}]");
    }

    #[test]
    fn fence_without_tag_and_surrounding_prose() {
        let raw = "Here you go:\n```\n[1, 2]\n```\nLet me know!";
        assert_eq!(strip_code_fence(raw), "[1, 2]");
    }

    #[test]
    fn no_fence_returns_everything() {
        assert_eq!(strip_code_fence("  [\"a\"]  "), "[\"a\"]");
        // the fixed 7/4 offset trim would have eaten real data here
        assert_eq!(strip_code_fence("[{\"x\":1}]"), "[{\"x\":1}]");
    }

    #[test]
    fn single_line_fence_with_tag() {
        let raw = "```json [{\"next_action\": \"Respond\"}]```";
        assert_eq!(strip_code_fence(raw), "[{\"next_action\": \"Respond\"}]");
        assert_eq!(
            parse_actions(strip_code_fence(raw)).unwrap()[0].next_action,
            NextAction::Respond
        );
        assert_eq!(strip_code_fence("```[1, 2]```"), "[1, 2]");
    }

    #[test]
    fn unterminated_fence() {
        assert_eq!(strip_code_fence("```json\n[{\"x\":1}"), "[{\"x\":1}");
    }

    #[test]
    fn parses_classified_emails() {
        let payload = r#"[
            {"sender_email": "ann@example.com", "sender_name": "Ann", "timestamp": "2024-12-01T10:00:00Z",
             "subject": "Lunch?", "summary": "Asks about lunch", "next_action": "Respond"},
            {"senderEmail": "news@example.com", "subject": "Weekly digest", "nextAction": "Do Nothing",
             "timestamp": null}
        ]"#;
        let emails = parse_actions(payload).unwrap();
        assert_eq!(emails.len(), 2);
        assert_eq!(emails[0].next_action, NextAction::Respond);
        assert_eq!(emails[1].sender_email.as_deref(), Some("news@example.com"));
        assert_eq!(emails[1].next_action, NextAction::DoNothing);
        assert!(emails[1].timestamp.is_none());
    }

    #[test]
    fn unknown_action_fails_to_parse() {
        assert!(parse_actions(r#"[{"next_action": "Archive"}]"#).is_err());
    }

    #[test]
    fn classify_posts_both_segments_and_strips_fence() {
        let mut server = mockito::Server::new();
        let mock = server
            .mock("POST", "/api/v1/chat/completions")
            .match_header("authorization", "Bearer sk-test")
            .match_body(Matcher::AllOf(vec![
                Matcher::PartialJson(serde_json::json!({"model": "test/model"})),
                Matcher::Regex(r#""role":"user""#.into()),
                Matcher::Regex("THIS IS NOW THE NEXT MESSAGE".into()),
            ]))
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(
                r#"{"choices":[{"message":{"role":"assistant","content":"```json\n[{\"next_action\":\"Follow Up\"}]\n```"}}]}"#,
            )
            .create();

        let classifier =
            Classifier::new(format!("{}/api/v1", server.url()), "test/model", "sk-test").unwrap();
        let prompt = build_prompt("me", &["one".to_string(), "two".to_string()]);
        let payload = classifier.classify(&prompt).unwrap();

        assert_eq!(payload, r#"[{"next_action":"Follow Up"}]"#);
        assert_eq!(parse_actions(&payload).unwrap()[0].next_action, NextAction::FollowUp);
        mock.assert();
    }

    #[test]
    fn endpoint_error_is_reported() {
        let mut server = mockito::Server::new();
        let _mock = server
            .mock("POST", "/chat/completions")
            .with_status(429)
            .with_body("rate limited")
            .create();

        let classifier = Classifier::new(server.url(), "m", "k").unwrap();
        let err = classifier
            .complete(&build_prompt("me", &["x".to_string()]))
            .unwrap_err();
        assert!(err.to_string().contains("429"));
    }
}
