//! Google OAuth client for delegated mailbox access.
//!
//! The interactive flow is the installed-application flow:
//! - bind a loopback listener and use it as the redirect URI
//! - send the user to Google's consent screen (PKCE, offline access)
//! - receive the authorization code on the loopback redirect
//! - exchange the code for tokens
//!
//! Refresh uses the standard `refresh_token` grant.

use crate::error::{AuthorizationError, RefreshError};
use crate::lifecycle::AuthorizationServer;
use crate::record::{ScopeSet, TokenGrant};
use async_trait::async_trait;
use axum::{
    Router,
    extract::{Query, State},
    response::Html,
    routing::get,
};
use oauth2::{
    AuthUrl, AuthorizationCode, ClientId, ClientSecret, CsrfToken, EmptyExtraTokenFields,
    PkceCodeChallenge, PkceCodeVerifier, RedirectUrl, RefreshToken, RequestTokenError, Scope,
    StandardTokenResponse, TokenResponse, TokenUrl,
    basic::{BasicClient, BasicTokenType},
};
use serde::Deserialize;
use std::path::Path;
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, info, instrument};

/// Google OAuth authorization URL.
const GOOGLE_AUTH_URL: &str = "https://accounts.google.com/o/oauth2/auth";

/// Google OAuth token URL.
const GOOGLE_TOKEN_URL: &str = "https://oauth2.googleapis.com/token";

type GoogleTokenResponse = StandardTokenResponse<EmptyExtraTokenFields, BasicTokenType>;

/// OAuth client identity, as found in a Google client-secrets file.
#[derive(Clone, Deserialize)]
pub struct ClientSecrets {
    pub client_id: String,
    pub client_secret: String,
    #[serde(default = "default_auth_uri")]
    pub auth_uri: String,
    #[serde(default = "default_token_uri")]
    pub token_uri: String,
}

impl std::fmt::Debug for ClientSecrets {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ClientSecrets")
            .field("client_id", &self.client_id)
            .field("client_secret", &"[redacted]")
            .field("auth_uri", &self.auth_uri)
            .field("token_uri", &self.token_uri)
            .finish()
    }
}

fn default_auth_uri() -> String {
    GOOGLE_AUTH_URL.to_string()
}

fn default_token_uri() -> String {
    GOOGLE_TOKEN_URL.to_string()
}

/// The downloaded file nests the identity under the application type.
#[derive(Deserialize)]
struct ClientSecretsFile {
    installed: Option<ClientSecrets>,
    web: Option<ClientSecrets>,
}

impl ClientSecrets {
    /// Parses a client-secrets document.
    ///
    /// # Errors
    ///
    /// Returns an error if the JSON is malformed or has neither an
    /// `installed` nor a `web` section.
    pub fn from_json(json: &str) -> Result<Self, AuthorizationError> {
        let file: ClientSecretsFile =
            serde_json::from_str(json).map_err(|e| AuthorizationError::InvalidClientSecrets {
                reason: e.to_string(),
            })?;

        file.installed
            .or(file.web)
            .ok_or_else(|| AuthorizationError::InvalidClientSecrets {
                reason: "expected an \"installed\" or \"web\" section".to_string(),
            })
    }

    /// Reads and parses a client-secrets file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed.
    pub async fn from_file(path: &Path) -> Result<Self, AuthorizationError> {
        let json = tokio::fs::read_to_string(path).await.map_err(|e| {
            AuthorizationError::InvalidClientSecrets {
                reason: format!("reading {}: {e}", path.display()),
            }
        })?;
        Self::from_json(&json)
    }
}

/// Google OAuth client implementing both the interactive flow and refresh.
#[derive(Clone)]
pub struct GoogleOAuthClient {
    secrets: ClientSecrets,
    redirect_port: u16,
    flow_timeout: Duration,
    http_client: reqwest::Client,
}

impl GoogleOAuthClient {
    /// Creates a client from its identity.
    ///
    /// # Errors
    ///
    /// Returns an error if the endpoints are not valid URLs.
    pub fn new(
        secrets: ClientSecrets,
        redirect_port: u16,
        flow_timeout: Duration,
    ) -> Result<Self, AuthorizationError> {
        auth_url(&secrets.auth_uri)?;
        token_url(&secrets.token_uri)?;

        // Following redirects from the token endpoint is an SSRF vector.
        let http_client = reqwest::Client::builder()
            .redirect(reqwest::redirect::Policy::none())
            .build()
            .map_err(|e| AuthorizationError::Configuration {
                reason: format!("HTTP client error: {e}"),
            })?;

        Ok(Self {
            secrets,
            redirect_port,
            flow_timeout,
            http_client,
        })
    }

    /// Builds the consent URL for `redirect_url`.
    ///
    /// Returns the URL together with the CSRF state and PKCE verifier that
    /// the redirect and code exchange must match.
    fn authorization_url(
        &self,
        redirect_url: &str,
        scopes: &ScopeSet,
    ) -> Result<(String, CsrfToken, PkceCodeVerifier), AuthorizationError> {
        let client = BasicClient::new(ClientId::new(self.secrets.client_id.clone()))
            .set_auth_uri(auth_url(&self.secrets.auth_uri)?)
            .set_redirect_uri(redirect(redirect_url)?);

        let (pkce_challenge, pkce_verifier) = PkceCodeChallenge::new_random_sha256();

        let mut request = client
            .authorize_url(CsrfToken::new_random)
            .set_pkce_challenge(pkce_challenge);
        for scope in scopes.iter() {
            request = request.add_scope(Scope::new(scope.to_string()));
        }

        // Offline access plus forced consent so Google always issues a
        // refresh token.
        let (url, csrf_token) = request
            .add_extra_param("access_type", "offline")
            .add_extra_param("prompt", "consent")
            .url();

        Ok((url.to_string(), csrf_token, pkce_verifier))
    }

    async fn exchange_code(
        &self,
        code: String,
        redirect_url: &str,
        pkce_verifier: PkceCodeVerifier,
    ) -> Result<TokenGrant, AuthorizationError> {
        let client = BasicClient::new(ClientId::new(self.secrets.client_id.clone()))
            .set_client_secret(ClientSecret::new(self.secrets.client_secret.clone()))
            .set_token_uri(token_url(&self.secrets.token_uri)?)
            .set_redirect_uri(redirect(redirect_url)?);

        let token: GoogleTokenResponse = client
            .exchange_code(AuthorizationCode::new(code))
            .set_pkce_verifier(pkce_verifier)
            .request_async(&self.http_client)
            .await
            .map_err(|e| AuthorizationError::TokenExchange {
                reason: e.to_string(),
            })?;

        Ok(grant_from_response(&token))
    }
}

#[async_trait]
impl AuthorizationServer for GoogleOAuthClient {
    #[instrument(skip_all, fields(scopes = scopes.len()))]
    async fn authorize(&self, scopes: &ScopeSet) -> Result<TokenGrant, AuthorizationError> {
        let listener = TcpListener::bind(("127.0.0.1", self.redirect_port))
            .await
            .map_err(|e| AuthorizationError::Listener {
                reason: e.to_string(),
            })?;
        let port = listener
            .local_addr()
            .map_err(|e| AuthorizationError::Listener {
                reason: e.to_string(),
            })?
            .port();
        let redirect_url = format!("http://127.0.0.1:{port}/");

        let (url, csrf_token, pkce_verifier) = self.authorization_url(&redirect_url, scopes)?;

        info!(port, %url, "waiting for the user to complete authorization");
        eprintln!("Please visit this URL to authorize this application:\n{url}");

        let params = tokio::time::timeout(self.flow_timeout, receive_redirect(listener))
            .await
            .map_err(|_| AuthorizationError::TimedOut {
                seconds: self.flow_timeout.as_secs(),
            })??;

        if let Some(error) = params.error {
            return Err(AuthorizationError::Denied { reason: error });
        }
        if params.state.as_deref() != Some(csrf_token.secret().as_str()) {
            return Err(AuthorizationError::CsrfMismatch);
        }
        let code = params.code.ok_or(AuthorizationError::MissingCode)?;

        debug!("authorization code received, exchanging");
        self.exchange_code(code, &redirect_url, pkce_verifier).await
    }

    #[instrument(skip_all)]
    async fn refresh(&self, refresh_token: &str) -> Result<TokenGrant, RefreshError> {
        let token_url = token_url(&self.secrets.token_uri).map_err(|e| RefreshError::Transport {
            reason: e.to_string(),
        })?;
        let client = BasicClient::new(ClientId::new(self.secrets.client_id.clone()))
            .set_client_secret(ClientSecret::new(self.secrets.client_secret.clone()))
            .set_token_uri(token_url);

        let token: GoogleTokenResponse = client
            .exchange_refresh_token(&RefreshToken::new(refresh_token.to_string()))
            .request_async(&self.http_client)
            .await
            .map_err(|e| match e {
                RequestTokenError::ServerResponse(response) => RefreshError::Rejected {
                    reason: response.to_string(),
                },
                other => RefreshError::Transport {
                    reason: other.to_string(),
                },
            })?;

        Ok(grant_from_response(&token))
    }
}

fn auth_url(raw: &str) -> Result<AuthUrl, AuthorizationError> {
    AuthUrl::new(raw.to_string()).map_err(|e| AuthorizationError::Configuration {
        reason: format!("invalid auth URL: {e}"),
    })
}

fn token_url(raw: &str) -> Result<TokenUrl, AuthorizationError> {
    TokenUrl::new(raw.to_string()).map_err(|e| AuthorizationError::Configuration {
        reason: format!("invalid token URL: {e}"),
    })
}

fn redirect(raw: &str) -> Result<RedirectUrl, AuthorizationError> {
    RedirectUrl::new(raw.to_string()).map_err(|e| AuthorizationError::Configuration {
        reason: format!("invalid redirect URL: {e}"),
    })
}

fn grant_from_response(token: &GoogleTokenResponse) -> TokenGrant {
    TokenGrant {
        access_token: token.access_token().secret().clone(),
        refresh_token: token.refresh_token().map(|t| t.secret().clone()),
        expires_in: token.expires_in(),
        scopes: token
            .scopes()
            .map(|scopes| scopes.iter().map(|s| s.as_str()).collect()),
    }
}

/// Query parameters Google appends to the redirect.
#[derive(Debug, Default, Deserialize)]
struct RedirectParams {
    code: Option<String>,
    state: Option<String>,
    error: Option<String>,
}

/// Serves the loopback redirect until the first hit on `/`.
async fn receive_redirect(listener: TcpListener) -> Result<RedirectParams, AuthorizationError> {
    let (params_tx, mut params_rx) = mpsc::channel::<RedirectParams>(1);
    let (shutdown_tx, shutdown_rx) = oneshot::channel::<()>();

    let app = Router::new()
        .route("/", get(redirect_handler))
        .with_state(params_tx);

    // Dropping `shutdown_tx` (including when the caller times out) stops
    // the listener.
    tokio::spawn(async move {
        let shutdown = async {
            let _ = shutdown_rx.await;
        };
        if let Err(e) = axum::serve(listener, app)
            .with_graceful_shutdown(shutdown)
            .await
        {
            debug!(error = %e, "redirect listener stopped with an error");
        }
    });

    let params = params_rx.recv().await.ok_or_else(|| AuthorizationError::Listener {
        reason: "redirect listener closed".to_string(),
    });
    let _ = shutdown_tx.send(());
    params
}

async fn redirect_handler(
    State(params_tx): State<mpsc::Sender<RedirectParams>>,
    Query(params): Query<RedirectParams>,
) -> Html<&'static str> {
    let denied = params.error.is_some();
    // A second hit (for example a browser retry) finds the channel full.
    let _ = params_tx.try_send(params);

    if denied {
        Html("<p>Authorization was not granted. You may close this window.</p>")
    } else {
        Html("<p>The authentication flow has completed. You may close this window.</p>")
    }
}
