//! Turns fetched messages into flat, deduplicated text.
//!
//! Every body segment is decoded and cleaned on its own. Failures never
//! abort the run: each one is recorded as a [`SkipReason`] in the
//! [`NormalizeReport`] and the segment is left out.

use std::collections::HashSet;
use std::sync::LazyLock;

use html2text::render::TrivialDecorator;
use log::{debug, info};
use regex::Regex;
use thiserror::Error;

use crate::domain::email::{BodyPart, Message, PartBody, Segments};
use crate::mail::decoders::{decode_body_data, preview};

/// Upper bound on cleaning passes; each pass that changes the text shortens it.
const MAX_PASSES: usize = 8;

static WHITESPACE_RUN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\s+").expect("static regex"));
static HYPHEN_RUN: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"-{10,}").expect("static regex"));
static QUOTE_MARKER: LazyLock<Regex> = LazyLock::new(|| Regex::new(r">{2}").expect("static regex"));

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SkipReason {
    #[error("part has no body data")]
    MissingData,
    #[error("invalid base64url: {0}")]
    Base64(String),
    #[error("invalid utf-8: {0}")]
    Utf8(String),
    #[error("markup extraction failed: {0}")]
    Markup(String),
    #[error("no text left after cleaning")]
    EmptyText,
    #[error("payload has neither parts nor a body")]
    EmptyPayload,
}

/// Clean decoded body text into a single line of visible text.
///
/// Escaped markup such as `&lt;b&gt;` only becomes a tag after one pass,
/// so passes repeat until the text stops changing.
pub fn clean_text(input: &str) -> Result<String, SkipReason> {
    let mut text = clean_once(input)?;
    for _ in 1..MAX_PASSES {
        let next = clean_once(&text)?;
        if next == text {
            return Ok(text);
        }
        text = next;
    }
    debug!("cleaning did not settle after {MAX_PASSES} passes");
    Ok(text)
}

fn clean_once(input: &str) -> Result<String, SkipReason> {
    let visible = visible_text(input)?;

    let text = replace_space_separators(visible.trim());
    let mut text = collapse_whitespace(&text);

    // Dropping ">>" can glue two short hyphen runs into a long one, and the
    // other way round, so strip until neither pattern is left.
    loop {
        let without_rules = HYPHEN_RUN.replace_all(&text, "");
        let next = QUOTE_MARKER.replace_all(&without_rules, "").into_owned();
        if next == text {
            break;
        }
        text = next;
    }

    Ok(collapse_whitespace(&text).trim().to_string())
}

/// Text nodes and image alt text only: no emphasis marks, link footnotes,
/// list bullets, heading hashes or table borders.
fn visible_text(input: &str) -> Result<String, SkipReason> {
    // No rendered line is wider than the input is long, so nothing wraps.
    let width = input.len() + 2;
    html2text::config::with_decorator(TrivialDecorator::new())
        .link_footnotes(false)
        .raw_mode(true)
        .allow_width_overflow()
        .string_from_read(input.as_bytes(), width)
        .map_err(|e| SkipReason::Markup(e.to_string()))
}

fn replace_space_separators(s: &str) -> String {
    s.chars()
        .map(|c| if is_space_separator(c) { ' ' } else { c })
        .collect()
}

// Unicode general category Zs.
fn is_space_separator(c: char) -> bool {
    matches!(
        c,
        '\u{00A0}' | '\u{1680}' | '\u{2000}'..='\u{200A}' | '\u{202F}' | '\u{205F}' | '\u{3000}'
    )
}

fn collapse_whitespace(s: &str) -> String {
    WHITESPACE_RUN.replace_all(s, " ").into_owned()
}

/// Insertion-ordered set of cleaned texts.
#[derive(Debug, Default, Clone)]
pub struct NormalizedTexts {
    order: Vec<String>,
    seen: HashSet<String>,
}

impl NormalizedTexts {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns `false` when the text was already present.
    pub fn insert(&mut self, text: String) -> bool {
        if self.seen.contains(&text) {
            return false;
        }
        self.seen.insert(text.clone());
        self.order.push(text);
        true
    }

    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.order.iter().map(String::as_str)
    }

    pub fn as_slice(&self) -> &[String] {
        &self.order
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }
}

/// Result of extracting one segment of a message.
#[derive(Debug, Clone)]
pub struct PartOutcome {
    pub part_id: String,
    pub result: Result<String, SkipReason>,
}

#[derive(Debug, Clone)]
pub struct SkippedPart {
    pub message_id: String,
    pub part_id: String,
    pub reason: SkipReason,
}

#[derive(Debug, Default, Clone)]
pub struct NormalizeReport {
    pub messages: usize,
    pub extracted: usize,
    pub duplicates: usize,
    pub skipped: Vec<SkippedPart>,
}

/// Decode and clean every segment of a message.
pub fn normalize_message(message: &Message) -> Vec<PartOutcome> {
    let Some(payload) = &message.payload else {
        return vec![PartOutcome {
            part_id: String::new(),
            result: Err(SkipReason::EmptyPayload),
        }];
    };

    match payload.segments() {
        Some(Segments::Inline(body)) => vec![PartOutcome {
            part_id: "body".to_string(),
            result: extract(Some(body)),
        }],
        Some(Segments::Multipart(parts)) => {
            let mut out = Vec::with_capacity(parts.len());
            collect_parts(parts, &mut out);
            out
        }
        None => vec![PartOutcome {
            part_id: String::new(),
            result: Err(SkipReason::EmptyPayload),
        }],
    }
}

fn collect_parts(parts: &[BodyPart], out: &mut Vec<PartOutcome>) {
    for part in parts {
        let has_data = part.body.as_ref().is_some_and(|b| b.data.is_some());
        let children = part.parts.as_deref().unwrap_or_default();

        // A container with no data of its own only stands for its children.
        if has_data || children.is_empty() {
            out.push(PartOutcome {
                part_id: part.part_id.clone(),
                result: extract(part.body.as_ref()),
            });
        }
        collect_parts(children, out);
    }
}

fn extract(body: Option<&PartBody>) -> Result<String, SkipReason> {
    let data = body
        .and_then(|b| b.data.as_deref())
        .filter(|d| !d.is_empty())
        .ok_or(SkipReason::MissingData)?;
    let text = decode_body_data(data)?;
    let cleaned = clean_text(&text)?;
    if cleaned.is_empty() {
        return Err(SkipReason::EmptyText);
    }
    Ok(cleaned)
}

/// Accumulates cleaned text across all messages of a run.
#[derive(Debug, Default)]
pub struct Normalizer {
    texts: NormalizedTexts,
    report: NormalizeReport,
}

impl Normalizer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_message(&mut self, message: &Message) {
        self.report.messages += 1;
        debug!(
            "normalizing {} from {:?}: {:?}",
            message.id,
            message.sender(),
            message.subject()
        );

        for outcome in normalize_message(message) {
            match outcome.result {
                Ok(text) => {
                    self.report.extracted += 1;
                    debug!("  part {:?}: {}", outcome.part_id, preview(&text, 80));
                    if !self.texts.insert(text) {
                        self.report.duplicates += 1;
                    }
                }
                Err(reason) => {
                    debug!("  part {:?} skipped: {reason}", outcome.part_id);
                    self.report.skipped.push(SkippedPart {
                        message_id: message.id.clone(),
                        part_id: outcome.part_id,
                        reason,
                    });
                }
            }
        }
    }

    pub fn finish(self) -> (NormalizedTexts, NormalizeReport) {
        info!(
            "normalized {} messages: {} segments, {} unique, {} duplicates, {} skipped",
            self.report.messages,
            self.report.extracted,
            self.texts.len(),
            self.report.duplicates,
            self.report.skipped.len()
        );
        (self.texts, self.report)
    }
}

pub fn normalize_all(messages: &[Message]) -> (NormalizedTexts, NormalizeReport) {
    let mut normalizer = Normalizer::new();
    for message in messages {
        normalizer.add_message(message);
    }
    normalizer.finish()
}
