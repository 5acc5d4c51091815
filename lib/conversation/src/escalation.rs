//! Detection of replies that hand control back to a human.
//!
//! The model is instructed to say it is "unable to fulfill" a request it
//! cannot complete. Matching is a case-insensitive substring check, so a
//! paraphrase ("I can't do that") is not detected.

/// Phrase whose presence in a reply marks the turn for human follow-up.
pub const ESCALATION_MARKER: &str = "unable to fulfill";

/// Returns true if `reply` asks for human follow-up.
#[must_use]
pub fn requires_human(reply: &str) -> bool {
    reply.to_lowercase().contains(ESCALATION_MARKER)
}
