//! Shared foundations for the courier assistant.
//!
//! Every other crate in the workspace builds on the identifiers and the
//! `Result` alias defined here.

pub mod error;
pub mod id;

pub use error::Result;
pub use id::{ConversationSessionId, MessageId, ParseIdError, TurnId};
