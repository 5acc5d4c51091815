//! Credential lifecycle for the courier assistant.
//!
//! This crate provides:
//!
//! - **Credential record**: access/refresh tokens, expiry and granted scopes
//! - **Credential store**: atomic persistence of the current record
//! - **OAuth client**: interactive loopback authorization and silent refresh
//! - **Lifecycle manager**: hands out a valid credential, refreshing or
//!   re-authorizing only when it has to

pub mod config;
pub mod error;
pub mod lifecycle;
pub mod oauth;
pub mod record;
pub mod store;

pub use config::{CredentialConfig, DEFAULT_GMAIL_SCOPES};
pub use error::{AuthorizationError, LifecycleError, RefreshError, StoreError};
pub use lifecycle::{AuthorizationServer, CredentialLifecycleManager, LifecycleState};
pub use oauth::{ClientSecrets, GoogleOAuthClient};
pub use record::{CredentialRecord, ScopeSet, TokenGrant};
pub use store::{CredentialStore, FileCredentialStore, InMemoryCredentialStore};
