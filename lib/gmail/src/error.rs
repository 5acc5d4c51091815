//! Error types for the Gmail crate.

use std::fmt;

/// Errors from Gmail API operations.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GmailError {
    /// Connection to the API failed.
    ConnectionFailed { reason: String },
    /// The credential was rejected.
    AuthenticationFailed { reason: String },
    /// The API answered with a non-success status.
    Api { status: u16, message: String },
    /// The API answered with something we could not read.
    ProtocolError { reason: String },
    /// Client configuration is unusable.
    InvalidConfig { reason: String },
}

impl fmt::Display for GmailError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ConnectionFailed { reason } => {
                write!(f, "connection failed: {reason}")
            }
            Self::AuthenticationFailed { reason } => {
                write!(f, "authentication failed: {reason}")
            }
            Self::Api { status, message } => {
                write!(f, "Gmail API error (status {status}): {message}")
            }
            Self::ProtocolError { reason } => {
                write!(f, "protocol error: {reason}")
            }
            Self::InvalidConfig { reason } => {
                write!(f, "invalid Gmail client configuration: {reason}")
            }
        }
    }
}

impl std::error::Error for GmailError {}
