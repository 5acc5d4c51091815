//! Startup wiring: credential acquisition.

use crate::error::StartupError;
use async_trait::async_trait;
use courier_credential::{
    AuthorizationError, AuthorizationServer, ClientSecrets, CredentialConfig,
    CredentialLifecycleManager, CredentialRecord, FileCredentialStore, GoogleOAuthClient,
    RefreshError, ScopeSet, TokenGrant,
};
use tracing::{info, warn};

/// Authorization server used at startup.
///
/// A missing or broken client-secrets file only matters once the stored
/// credential cannot be used as is, so the load failure is carried here
/// and reported from whichever call first needs the server.
pub enum StartupAuthorization {
    Google(GoogleOAuthClient),
    Unavailable(AuthorizationError),
}

impl StartupAuthorization {
    /// Loads client secrets and builds the OAuth client.
    pub async fn from_config(config: &CredentialConfig) -> Self {
        let client = match ClientSecrets::from_file(&config.client_secrets_path).await {
            Ok(secrets) => {
                GoogleOAuthClient::new(secrets, config.redirect_port, config.flow_timeout())
            }
            Err(e) => Err(e),
        };
        match client {
            Ok(client) => Self::Google(client),
            Err(e) => {
                warn!(
                    path = %config.client_secrets_path.display(),
                    error = %e,
                    "OAuth client unavailable"
                );
                Self::Unavailable(e)
            }
        }
    }
}

#[async_trait]
impl AuthorizationServer for StartupAuthorization {
    async fn authorize(&self, scopes: &ScopeSet) -> Result<TokenGrant, AuthorizationError> {
        match self {
            Self::Google(client) => client.authorize(scopes).await,
            Self::Unavailable(e) => Err(e.clone()),
        }
    }

    async fn refresh(&self, refresh_token: &str) -> Result<TokenGrant, RefreshError> {
        match self {
            Self::Google(client) => client.refresh(refresh_token).await,
            Self::Unavailable(e) => Err(RefreshError::Transport {
                reason: e.to_string(),
            }),
        }
    }
}

/// Obtains a valid mailbox credential, prompting the user if needed.
///
/// # Errors
///
/// Returns an error if interactive authorization does not complete or the
/// credential cannot be persisted.
pub async fn obtain_credential(
    config: &CredentialConfig,
) -> courier_core::Result<CredentialRecord, StartupError> {
    let store = FileCredentialStore::new(&config.token_path);
    let authorization = StartupAuthorization::from_config(config).await;
    let mut manager =
        CredentialLifecycleManager::new(store, authorization, config.required_scopes())
            .with_expiry_skew(config.expiry_skew());

    let record = manager
        .obtain()
        .await
        .map_err(|e| StartupError::Credential {
            details: e.to_string(),
        })?;

    info!(
        scopes = record.scopes.len(),
        expiry = %record.expiry,
        "mailbox credential ready"
    );
    Ok(record)
}
