//! Message parser — raw transport bytes to a structured `ParsedEmail`.

use mail_parser::MessageParser;
use uuid::Uuid;

use crate::error::ParseError;
use crate::pipeline::types::ParsedEmail;

/// Substituted when the Subject header is missing.
pub const DEFAULT_SUBJECT: &str = "(no subject)";

/// Substituted when no sender address can be determined.
pub const UNKNOWN_SENDER: &str = "unknown";

/// Parse raw message bytes into a `ParsedEmail`.
///
/// Tolerates missing optional headers by substituting defaults; fails
/// only when the bytes cannot be interpreted as a MIME message at all.
pub fn parse_raw_email(raw: &[u8]) -> Result<ParsedEmail, ParseError> {
    let parsed = MessageParser::default()
        .parse(raw)
        .ok_or(ParseError::Unparseable)?;

    let message_id = parsed
        .message_id()
        .map(str::to_string)
        .unwrap_or_else(|| format!("generated-{}", Uuid::new_v4()));

    let subject = parsed.subject().unwrap_or(DEFAULT_SUBJECT).to_string();

    let (from_address, from_name) = sender_identity(&parsed);

    let list_unsubscribe = parsed
        .header_raw("List-Unsubscribe")
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty());

    Ok(ParsedEmail {
        message_id,
        subject,
        from_address,
        from_name,
        list_unsubscribe,
        body_text: extract_text(&parsed),
    })
}

/// Extract the sender address and display name from the From header.
fn sender_identity(parsed: &mail_parser::Message) -> (String, Option<String>) {
    let Some(addr) = parsed.from().and_then(|from| from.first()) else {
        return (UNKNOWN_SENDER.to_string(), None);
    };
    let address = addr
        .address
        .as_ref()
        .map(|a| a.to_string())
        .unwrap_or_else(|| UNKNOWN_SENDER.to_string());
    let name = addr
        .name
        .as_ref()
        .map(|n| n.trim().to_string())
        .filter(|n| !n.is_empty());
    (address, name)
}

/// Extract readable body text, preferring the plain-text part.
///
/// HTML-only messages are stripped to text; messages with no readable
/// part yield an empty string (classified as insufficient content).
fn extract_text(parsed: &mail_parser::Message) -> String {
    if let Some(text) = parsed.body_text(0) {
        return text.to_string();
    }
    if let Some(html) = parsed.body_html(0) {
        return strip_html(html.as_ref());
    }
    String::new()
}

/// Strip HTML tags from content (basic) and normalize whitespace.
pub fn strip_html(html: &str) -> String {
    let mut result = String::new();
    let mut in_tag = false;
    for ch in html.chars() {
        match ch {
            '<' => in_tag = true,
            '>' => in_tag = false,
            _ if !in_tag => result.push(ch),
            _ => {}
        }
    }
    result.split_whitespace().collect::<Vec<_>>().join(" ")
}
