use anyhow::{Result, anyhow};
use base64::Engine as _;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;

use mail_triage::classify::{MESSAGE_DELIMITER, build_prompt};
use mail_triage::domain::email::{
    BodyPart, Header, Message, MessagePage, MessagePayload, MessageRef, PartBody,
};
use mail_triage::mail::fetcher::MailApi;
use mail_triage::normalize::SkipReason;
use mail_triage::pipeline::collect_texts;

/// Two list pages; the last one has no next-page token.
struct Inbox;

fn encoded(text: &str) -> Option<PartBody> {
    Some(PartBody {
        data: Some(URL_SAFE_NO_PAD.encode(text)),
        ..Default::default()
    })
}

fn text_part(id: &str, mime: &str, text: &str) -> BodyPart {
    BodyPart {
        part_id: id.to_string(),
        mime_type: mime.to_string(),
        body: encoded(text),
        parts: None,
    }
}

fn refs(ids: &[&str]) -> Vec<MessageRef> {
    ids.iter()
        .map(|id| MessageRef {
            id: id.to_string(),
            thread_id: None,
        })
        .collect()
}

impl MailApi for Inbox {
    fn list_messages(&self, page_token: Option<&str>) -> Result<MessagePage> {
        match page_token {
            None => Ok(MessagePage {
                messages: refs(&["signature", "inline"]),
                next_page_token: Some("2".to_string()),
            }),
            Some("2") => Ok(MessagePage {
                messages: refs(&["duplicate", "attachment-only"]),
                next_page_token: None,
            }),
            Some(other) => Err(anyhow!("unexpected page token {other}")),
        }
    }

    fn get_message(&self, id: &str) -> Result<Message> {
        let headers = vec![Header {
            name: "From".to_string(),
            value: "Jack <jack@example.com>".to_string(),
        }];
        let payload = match id {
            "signature" => MessagePayload {
                mime_type: "multipart/alternative".to_string(),
                headers,
                body: None,
                parts: Some(vec![
                    text_part(
                        "0",
                        "text/plain",
                        "Hello,\r\n\r\nThis is a test.\n----------\nBest,\nJack",
                    ),
                    text_part(
                        "1",
                        "text/html",
                        "<p>Hello,</p><p>This is a test.</p><p>----------</p><p>Best,<br>Jack</p>",
                    ),
                ]),
            },
            "inline" => MessagePayload {
                mime_type: "text/plain".to_string(),
                headers,
                body: encoded("Plain text body"),
                parts: None,
            },
            "duplicate" => MessagePayload {
                mime_type: "text/plain".to_string(),
                headers,
                body: encoded("Plain   text\nbody"),
                parts: None,
            },
            "attachment-only" => MessagePayload {
                mime_type: "multipart/mixed".to_string(),
                headers,
                body: None,
                parts: Some(vec![BodyPart {
                    part_id: "0".to_string(),
                    mime_type: "application/pdf".to_string(),
                    body: Some(PartBody {
                        attachment_id: Some("ANGjdJ".to_string()),
                        size: 52_000,
                        ..Default::default()
                    }),
                    parts: None,
                }]),
            },
            other => return Err(anyhow!("no message {other}")),
        };
        Ok(Message {
            id: id.to_string(),
            snippet: None,
            payload: Some(payload),
        })
    }
}

#[test]
fn mailbox_reduces_to_unique_clean_texts() {
    let (texts, report) = collect_texts(&Inbox).unwrap();

    assert_eq!(report.messages, 4);
    assert_eq!(
        texts.iter().collect::<Vec<_>>(),
        vec!["Hello, This is a test. Best, Jack", "Plain text body"]
    );
    // html twin of the signature mail and the reflowed inline body collapse
    assert_eq!(report.duplicates, 2);

    assert_eq!(report.skipped.len(), 1);
    assert_eq!(report.skipped[0].message_id, "attachment-only");
    assert_eq!(report.skipped[0].reason, SkipReason::MissingData);
}

#[test]
fn prompt_carries_every_text_once() {
    let (texts, _) = collect_texts(&Inbox).unwrap();
    let prompt = build_prompt("Jack Fan", texts.as_slice());

    assert_eq!(prompt.messages.matches(MESSAGE_DELIMITER).count(), 1);
    assert_eq!(prompt.messages.matches("Plain text body").count(), 1);
    let first = prompt.messages.find("Hello, This is a test.").unwrap();
    let second = prompt.messages.find("Plain text body").unwrap();
    assert!(first < second);
}
