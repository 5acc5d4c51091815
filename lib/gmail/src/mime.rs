//! RFC 2822 message construction and Gmail payload decoding.

use base64::Engine;
use base64::engine::general_purpose::{STANDARD, URL_SAFE_NO_PAD};
use serde::Deserialize;

/// Why an outgoing message could not be built.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InvalidMessage {
    pub reason: String,
}

impl std::fmt::Display for InvalidMessage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.reason)
    }
}

impl std::error::Error for InvalidMessage {}

fn invalid(reason: impl Into<String>) -> InvalidMessage {
    InvalidMessage {
        reason: reason.into(),
    }
}

/// A plain-text message to send or save as a draft.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutgoingMessage {
    pub to: Vec<String>,
    pub cc: Vec<String>,
    pub bcc: Vec<String>,
    pub subject: String,
    pub body: String,
}

impl OutgoingMessage {
    /// Renders the message as RFC 2822 text with CRLF line endings.
    ///
    /// # Errors
    ///
    /// Returns an error if there are no recipients, or if an address or
    /// the subject contains a line break.
    pub fn to_rfc2822(&self) -> Result<String, InvalidMessage> {
        if self.to.iter().all(|addr| addr.trim().is_empty()) {
            return Err(invalid("at least one recipient is required"));
        }

        let mut out = String::new();
        push_address_header(&mut out, "To", &self.to)?;
        push_address_header(&mut out, "Cc", &self.cc)?;
        push_address_header(&mut out, "Bcc", &self.bcc)?;

        if has_line_break(&self.subject) {
            return Err(invalid("subject must not contain line breaks"));
        }
        out.push_str("Subject: ");
        out.push_str(&encode_header_value(&self.subject));
        out.push_str("\r\n");
        out.push_str("MIME-Version: 1.0\r\n");
        out.push_str("Content-Type: text/plain; charset=\"utf-8\"\r\n");
        out.push_str("Content-Transfer-Encoding: 8bit\r\n");
        out.push_str("\r\n");
        out.push_str(&normalize_newlines(&self.body));
        Ok(out)
    }

    /// Renders the message in the base64url form the Gmail API expects in
    /// its `raw` field.
    ///
    /// # Errors
    ///
    /// Returns an error if the message cannot be rendered.
    pub fn to_raw(&self) -> Result<String, InvalidMessage> {
        Ok(URL_SAFE_NO_PAD.encode(self.to_rfc2822()?))
    }
}

fn has_line_break(value: &str) -> bool {
    value.contains(['\r', '\n'])
}

fn push_address_header(
    out: &mut String,
    name: &str,
    addresses: &[String],
) -> Result<(), InvalidMessage> {
    let addresses: Vec<&str> = addresses
        .iter()
        .map(|a| a.trim())
        .filter(|a| !a.is_empty())
        .collect();
    if addresses.is_empty() {
        return Ok(());
    }
    if let Some(bad) = addresses.iter().find(|a| has_line_break(a)) {
        return Err(invalid(format!("address {bad:?} contains a line break")));
    }
    out.push_str(name);
    out.push_str(": ");
    out.push_str(&addresses.join(", "));
    out.push_str("\r\n");
    Ok(())
}

/// RFC 2047 encoded-word for non-ASCII header values.
fn encode_header_value(value: &str) -> String {
    if value.is_ascii() {
        value.to_string()
    } else {
        format!("=?utf-8?B?{}?=", STANDARD.encode(value))
    }
}

fn normalize_newlines(body: &str) -> String {
    body.replace("\r\n", "\n").replace('\n', "\r\n")
}

/// Decodes Gmail's base64url body data. Padding is optional.
#[must_use]
pub fn decode_base64url(data: &str) -> Option<Vec<u8>> {
    URL_SAFE_NO_PAD.decode(data.trim_end_matches('=')).ok()
}

/// A MIME part as returned by `users.messages.get`.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MessagePart {
    #[serde(default)]
    pub mime_type: String,
    #[serde(default)]
    pub headers: Vec<Header>,
    #[serde(default)]
    pub body: PartBody,
    #[serde(default)]
    pub parts: Vec<MessagePart>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Header {
    pub name: String,
    pub value: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct PartBody {
    #[serde(default)]
    pub data: Option<String>,
}

impl MessagePart {
    /// Returns the first header with `name`, compared case-insensitively.
    #[must_use]
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|h| h.name.eq_ignore_ascii_case(name))
            .map(|h| h.value.as_str())
    }

    /// Returns the text of the first `text/plain` part, depth first.
    #[must_use]
    pub fn plain_text_body(&self) -> Option<String> {
        if self.mime_type.eq_ignore_ascii_case("text/plain") {
            if let Some(bytes) = self.body.data.as_deref().and_then(decode_base64url) {
                return Some(String::from_utf8_lossy(&bytes).into_owned());
            }
        }
        self.parts.iter().find_map(MessagePart::plain_text_body)
    }
}
