use serde::Deserialize;

pub type MessageId = String;

/// One entry of a `users.messages.list` page.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MessageRef {
    pub id: MessageId,
    #[serde(default)]
    pub thread_id: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MessagePage {
    #[serde(default)]
    pub messages: Vec<MessageRef>,
    #[serde(default)]
    pub next_page_token: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Message {
    pub id: MessageId,
    #[serde(default)]
    pub snippet: Option<String>,
    #[serde(default)]
    pub payload: Option<MessagePayload>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MessagePayload {
    #[serde(default)]
    pub mime_type: String,
    #[serde(default)]
    pub headers: Vec<Header>,
    #[serde(default)]
    pub body: Option<PartBody>,
    #[serde(default)]
    pub parts: Option<Vec<BodyPart>>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Header {
    pub name: String,
    pub value: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BodyPart {
    #[serde(default)]
    pub part_id: String,
    #[serde(default)]
    pub mime_type: String,
    #[serde(default)]
    pub body: Option<PartBody>,
    /// Set on nested multipart containers (e.g. multipart/alternative).
    #[serde(default)]
    pub parts: Option<Vec<BodyPart>>,
}

/// Base64url encoded content of a part. `data` is absent for attachments
/// and multipart containers.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PartBody {
    #[serde(default)]
    pub data: Option<String>,
    #[serde(default)]
    pub attachment_id: Option<String>,
    #[serde(default)]
    pub size: u64,
}

/// Where the text of a payload lives.
#[derive(Debug, Clone, Copy)]
pub enum Segments<'a> {
    Multipart(&'a [BodyPart]),
    Inline(&'a PartBody),
}

impl MessagePayload {
    /// `None` when the payload carries neither parts nor a top-level body.
    pub fn segments(&self) -> Option<Segments<'_>> {
        match (&self.parts, &self.body) {
            (Some(parts), _) => Some(Segments::Multipart(parts)),
            (None, Some(body)) => Some(Segments::Inline(body)),
            (None, None) => None,
        }
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|h| h.name.eq_ignore_ascii_case(name))
            .map(|h| h.value.as_str())
    }
}

impl Message {
    pub fn sender(&self) -> &str {
        self.payload
            .as_ref()
            .and_then(|p| p.header("From"))
            .unwrap_or("(unknown)")
    }

    pub fn subject(&self) -> &str {
        self.payload
            .as_ref()
            .and_then(|p| p.header("Subject"))
            .unwrap_or("(no subject)")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_multipart_message() {
        let raw = r#"{
            "id": "m1",
            "threadId": "t1",
            "payload": {
                "mimeType": "multipart/alternative",
                "headers": [
                    {"name": "from", "value": "Ann <ann@example.com>"},
                    {"name": "Subject", "value": "Lunch"}
                ],
                "body": {"size": 0},
                "parts": [
                    {"partId": "0", "mimeType": "text/plain", "body": {"size": 5, "data": "SGVsbG8"}},
                    {"partId": "1", "mimeType": "image/png", "body": {"size": 42, "attachmentId": "att"}}
                ]
            }
        }"#;
        let msg: Message = serde_json::from_str(raw).unwrap();
        assert_eq!(msg.sender(), "Ann <ann@example.com>");
        assert_eq!(msg.subject(), "Lunch");

        let payload = msg.payload.as_ref().unwrap();
        match payload.segments() {
            Some(Segments::Multipart(parts)) => {
                assert_eq!(parts.len(), 2);
                assert!(parts[1].body.as_ref().unwrap().data.is_none());
            }
            other => panic!("expected multipart, got {other:?}"),
        }
    }

    #[test]
    fn inline_and_empty_payloads() {
        let inline: MessagePayload =
            serde_json::from_str(r#"{"mimeType":"text/plain","body":{"data":"eA"}}"#).unwrap();
        assert!(matches!(inline.segments(), Some(Segments::Inline(_))));

        let empty: MessagePayload = serde_json::from_str(r#"{"mimeType":"text/plain"}"#).unwrap();
        assert!(empty.segments().is_none());
    }

    #[test]
    fn list_page_without_token_or_messages() {
        let page: MessagePage = serde_json::from_str(r#"{"resultSizeEstimate": 0}"#).unwrap();
        assert!(page.messages.is_empty());
        assert!(page.next_page_token.is_none());
    }
}
