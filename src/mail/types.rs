//! Inbound email type and address/body helpers.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// An unread email fetched from the mailbox.
///
/// Produced by the reader, consumed once by the pipeline, never persisted.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InboundEmail {
    /// From header as decoded — may be `Display Name <addr>` or a bare address.
    pub sender: String,
    pub subject: String,
    /// Plain-text body.
    pub body: String,
    pub received_at: DateTime<Utc>,
}

impl InboundEmail {
    /// The bare address of the sender, with any display name stripped.
    pub fn sender_address(&self) -> &str {
        bare_address(&self.sender)
    }
}

/// Strip a display name from an address: `Alice <a@b.de>` → `a@b.de`.
///
/// Inputs without an angle-bracket pair pass through unchanged.
pub fn bare_address(sender: &str) -> &str {
    if let (Some(start), Some(end)) = (sender.find('<'), sender.rfind('>'))
        && start < end
    {
        return sender[start + 1..end].trim();
    }
    sender.trim()
}

/// Extract the sender from a parsed message, preferring the bare address.
pub fn extract_sender(parsed: &mail_parser::Message) -> String {
    parsed
        .from()
        .and_then(|addr| addr.first())
        .and_then(|a| a.address())
        .map(|s| s.to_string())
        .unwrap_or_else(|| "unknown".into())
}

/// Extract readable text from a parsed message.
///
/// Prefers the plain-text part; falls back to tag-stripped HTML.
pub fn extract_text(parsed: &mail_parser::Message) -> String {
    if let Some(text) = parsed.body_text(0) {
        return text.trim().to_string();
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

#[cfg(test)]
mod tests {
    use super::*;

    // ── bare_address ────────────────────────────────────────────────

    #[test]
    fn bare_address_strips_display_name() {
        assert_eq!(
            bare_address("Max Mustermann <max@example.de>"),
            "max@example.de"
        );
    }

    #[test]
    fn bare_address_passes_through_plain_address() {
        assert_eq!(bare_address("max@example.de"), "max@example.de");
    }

    #[test]
    fn bare_address_trims_whitespace() {
        assert_eq!(bare_address("  max@example.de "), "max@example.de");
        assert_eq!(bare_address("Max < max@example.de >"), "max@example.de");
    }

    #[test]
    fn bare_address_handles_mismatched_brackets() {
        // '>' before '<' — not a bracket pair, pass through.
        assert_eq!(bare_address("weird> <"), "weird> <");
    }

    #[test]
    fn sender_address_delegates_to_bare_address() {
        let email = InboundEmail {
            sender: "Büro Schmidt <info@schmidt-bau.de>".into(),
            subject: "Anfrage".into(),
            body: "Hallo".into(),
            received_at: Utc::now(),
        };
        assert_eq!(email.sender_address(), "info@schmidt-bau.de");
    }

    // ── strip_html ──────────────────────────────────────────────────

    #[test]
    fn strip_html_removes_tags() {
        assert_eq!(strip_html("<p>Guten <b>Tag</b></p>"), "Guten Tag");
    }

    #[test]
    fn strip_html_normalizes_whitespace() {
        assert_eq!(strip_html("<div>  Hallo   Welt  </div>"), "Hallo Welt");
    }

    #[test]
    fn strip_html_plain_text_passthrough() {
        assert_eq!(strip_html("Kein HTML"), "Kein HTML");
    }

    // ── extract helpers on parsed messages ─────────────────────────

    #[test]
    fn extract_sender_and_text_from_rfc822() {
        let raw = concat!(
            "From: Max Mustermann <max@example.de>\r\n",
            "To: einkauf@example.com\r\n",
            "Subject: Anfrage: Baugrundgutachten / Feldarbeiten\r\n",
            "Content-Type: text/plain; charset=utf-8\r\n",
            "\r\n",
            "Wir haben Interesse.\r\n",
        );
        let parsed = mail_parser::MessageParser::default()
            .parse(raw.as_bytes())
            .unwrap();
        assert_eq!(extract_sender(&parsed), "max@example.de");
        assert_eq!(extract_text(&parsed), "Wir haben Interesse.");
    }

    #[test]
    fn extract_text_falls_back_to_html() {
        let raw = concat!(
            "From: a@b.de\r\n",
            "Subject: Test\r\n",
            "Content-Type: text/html; charset=utf-8\r\n",
            "\r\n",
            "<html><body><p>Guten Tag</p></body></html>\r\n",
        );
        let parsed = mail_parser::MessageParser::default()
            .parse(raw.as_bytes())
            .unwrap();
        // mail-parser may already convert HTML to text; either way the
        // result must contain the visible content without tags.
        let text = extract_text(&parsed);
        assert!(text.contains("Guten Tag"));
        assert!(!text.contains('<'));
    }

    #[test]
    fn extract_sender_unknown_when_missing() {
        let raw = "Subject: nothing else\r\n\r\nbody\r\n";
        let parsed = mail_parser::MessageParser::default()
            .parse(raw.as_bytes())
            .unwrap();
        assert_eq!(extract_sender(&parsed), "unknown");
    }
}
