//! Error types for the credential crate.
//!
//! - `StoreError`: persisted credential could not be read or written
//! - `AuthorizationError`: the interactive flow did not produce tokens
//! - `RefreshError`: the authorization server refused a silent refresh
//! - `LifecycleError`: no usable credential could be produced at all

use std::fmt;

/// Errors from credential persistence.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoreError {
    /// A record exists but could not be parsed.
    Corrupt { path: String, reason: String },
    /// Reading or writing the backing file failed.
    Io { path: String, reason: String },
}

impl StoreError {
    /// Returns true if the stored record exists but is unreadable.
    #[must_use]
    pub fn is_corrupt(&self) -> bool {
        matches!(self, Self::Corrupt { .. })
    }
}

impl fmt::Display for StoreError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Corrupt { path, reason } => {
                write!(f, "stored credential at {path} is corrupt: {reason}")
            }
            Self::Io { path, reason } => {
                write!(f, "credential store I/O failed for {path}: {reason}")
            }
        }
    }
}

impl std::error::Error for StoreError {}

/// Errors from the interactive authorization flow.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AuthorizationError {
    /// The client secrets artifact is missing or malformed.
    InvalidClientSecrets { reason: String },
    /// An endpoint or redirect URL is invalid.
    Configuration { reason: String },
    /// The loopback redirect listener could not be started.
    Listener { reason: String },
    /// The user did not complete the flow in time.
    TimedOut { seconds: u64 },
    /// The user or the provider declined the request.
    Denied { reason: String },
    /// The redirect carried a state value we did not issue.
    CsrfMismatch,
    /// The redirect carried no authorization code.
    MissingCode,
    /// Exchanging the authorization code for tokens failed.
    TokenExchange { reason: String },
}

impl fmt::Display for AuthorizationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InvalidClientSecrets { reason } => {
                write!(f, "invalid client secrets: {reason}")
            }
            Self::Configuration { reason } => write!(f, "configuration error: {reason}"),
            Self::Listener { reason } => {
                write!(f, "redirect listener failed: {reason}")
            }
            Self::TimedOut { seconds } => {
                write!(f, "authorization not completed within {seconds}s")
            }
            Self::Denied { reason } => write!(f, "authorization denied: {reason}"),
            Self::CsrfMismatch => write!(f, "CSRF state mismatch on redirect"),
            Self::MissingCode => write!(f, "redirect did not include an authorization code"),
            Self::TokenExchange { reason } => write!(f, "token exchange failed: {reason}"),
        }
    }
}

impl std::error::Error for AuthorizationError {}

/// Errors from a silent token refresh.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RefreshError {
    /// The authorization server rejected the refresh token.
    Rejected { reason: String },
    /// The refresh request never got an answer.
    Transport { reason: String },
    /// The refreshed token no longer covers the required scopes.
    ScopesNarrowed { missing: Vec<String> },
}

impl fmt::Display for RefreshError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Rejected { reason } => write!(f, "refresh token rejected: {reason}"),
            Self::Transport { reason } => write!(f, "refresh request failed: {reason}"),
            Self::ScopesNarrowed { missing } => {
                write!(f, "refreshed token is missing scopes: {}", missing.join(", "))
            }
        }
    }
}

impl std::error::Error for RefreshError {}

/// Errors that leave the lifecycle manager without a usable credential.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LifecycleError {
    /// Interactive authorization did not complete.
    AuthorizationAborted { reason: String },
    /// The user completed the flow but withheld required scopes.
    ScopesNotGranted { missing: Vec<String> },
}

impl fmt::Display for LifecycleError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::AuthorizationAborted { reason } => {
                write!(f, "authorization aborted: {reason}")
            }
            Self::ScopesNotGranted { missing } => {
                write!(f, "required scopes not granted: {}", missing.join(", "))
            }
        }
    }
}

impl std::error::Error for LifecycleError {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn store_error_display() {
        let err = StoreError::Corrupt {
            path: "token.json".to_string(),
            reason: "expected value at line 1".to_string(),
        };
        assert!(err.is_corrupt());
        assert!(err.to_string().contains("token.json"));
        assert!(err.to_string().contains("corrupt"));
    }

    #[test]
    fn authorization_timeout_display() {
        let err = AuthorizationError::TimedOut { seconds: 300 };
        assert!(err.to_string().contains("300s"));
    }

    #[test]
    fn lifecycle_error_lists_missing_scopes() {
        let err = LifecycleError::ScopesNotGranted {
            missing: vec!["a".to_string(), "b".to_string()],
        };
        assert!(err.to_string().ends_with("a, b"));
    }
}
