//! Gmail tools for the courier assistant.
//!
//! A [`GmailToolkit`] binds one delegated credential and exposes search,
//! read, send and draft operations as conversation tools.

pub mod client;
pub mod error;
pub mod mime;
pub mod tools;

pub use client::{GMAIL_API_BASE_URL, GmailClient};
pub use error::GmailError;
pub use mime::OutgoingMessage;
pub use tools::GmailToolkit;
