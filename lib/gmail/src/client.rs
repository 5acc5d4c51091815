//! Minimal Gmail REST client bound to one access token.

use crate::error::GmailError;
use crate::mime::MessagePart;
use courier_credential::CredentialRecord;
use reqwest::StatusCode;
use serde::Deserialize;
use serde::de::DeserializeOwned;
use serde_json::json;
use std::fmt;
use std::time::Duration;
use tracing::{debug, instrument};

/// Gmail API root.
pub const GMAIL_API_BASE_URL: &str = "https://gmail.googleapis.com/gmail/v1";

const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Reference to a message, as returned by list calls.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MessageRef {
    pub id: String,
    pub thread_id: String,
}

#[derive(Debug, Default, Deserialize)]
struct MessageList {
    #[serde(default)]
    messages: Vec<MessageRef>,
}

/// A message as returned by `users.messages.get`.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GmailMessage {
    pub id: String,
    pub thread_id: String,
    #[serde(default)]
    pub snippet: String,
    #[serde(default)]
    pub payload: MessagePart,
}

impl GmailMessage {
    #[must_use]
    pub fn header(&self, name: &str) -> &str {
        self.payload.header(name).unwrap_or_default()
    }
}

/// A thread as returned by `users.threads.get`.
#[derive(Debug, Clone, Deserialize)]
pub struct GmailThread {
    pub id: String,
    #[serde(default)]
    pub messages: Vec<GmailMessage>,
}

/// A draft as returned by `users.drafts.create`.
#[derive(Debug, Clone, Deserialize)]
pub struct GmailDraft {
    pub id: String,
    pub message: MessageRef,
}

/// How much of a message to fetch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MessageFormat {
    /// Headers and snippet only.
    Metadata,
    /// Full payload including bodies.
    Full,
}

impl MessageFormat {
    fn as_str(self) -> &'static str {
        match self {
            Self::Metadata => "metadata",
            Self::Full => "full",
        }
    }
}

/// Gmail client for the authorized user's mailbox.
///
/// The access token is copied from the credential at construction and
/// never refreshed. Once it lapses (about an hour for Google tokens) every
/// call fails with [`GmailError::AuthenticationFailed`] until a client is
/// built from a fresh credential.
#[derive(Clone)]
pub struct GmailClient {
    http: reqwest::Client,
    base_url: String,
    access_token: String,
}

impl fmt::Debug for GmailClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GmailClient")
            .field("base_url", &self.base_url)
            .finish_non_exhaustive()
    }
}

impl GmailClient {
    /// Creates a client using the record's access token.
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be built.
    pub fn new(credential: &CredentialRecord) -> Result<Self, GmailError> {
        Self::with_base_url(credential, GMAIL_API_BASE_URL)
    }

    /// Creates a client against a different API root.
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be built.
    pub fn with_base_url(
        credential: &CredentialRecord,
        base_url: impl Into<String>,
    ) -> Result<Self, GmailError> {
        let http = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .map_err(|e| GmailError::InvalidConfig {
                reason: e.to_string(),
            })?;

        Ok(Self {
            http,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            access_token: credential.access_token.clone(),
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}/users/me/{path}", self.base_url)
    }

    async fn read<T: DeserializeOwned>(response: reqwest::Response) -> Result<T, GmailError> {
        let status = response.status();
        if status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN {
            let message = response.text().await.unwrap_or_default();
            return Err(GmailError::AuthenticationFailed { reason: message });
        }
        if !status.is_success() {
            let message = response.text().await.unwrap_or_default();
            return Err(GmailError::Api {
                status: status.as_u16(),
                message,
            });
        }
        response
            .json()
            .await
            .map_err(|e| GmailError::ProtocolError {
                reason: e.to_string(),
            })
    }

    async fn get<T: DeserializeOwned>(
        &self,
        path: &str,
        query: &[(&str, String)],
    ) -> Result<T, GmailError> {
        let response = self
            .http
            .get(self.url(path))
            .bearer_auth(&self.access_token)
            .query(query)
            .send()
            .await
            .map_err(connection_failed)?;
        Self::read(response).await
    }

    async fn post<T: DeserializeOwned>(
        &self,
        path: &str,
        body: &serde_json::Value,
    ) -> Result<T, GmailError> {
        let response = self
            .http
            .post(self.url(path))
            .bearer_auth(&self.access_token)
            .json(body)
            .send()
            .await
            .map_err(connection_failed)?;
        Self::read(response).await
    }

    /// Lists messages matching a Gmail search query.
    #[instrument(skip(self))]
    pub async fn list_messages(
        &self,
        query: &str,
        max_results: u32,
    ) -> Result<Vec<MessageRef>, GmailError> {
        let list: MessageList = self
            .get(
                "messages",
                &[("q", query.to_string()), ("maxResults", max_results.to_string())],
            )
            .await?;
        debug!(found = list.messages.len(), "messages listed");
        Ok(list.messages)
    }

    /// Fetches one message.
    #[instrument(skip(self))]
    pub async fn get_message(
        &self,
        id: &str,
        format: MessageFormat,
    ) -> Result<GmailMessage, GmailError> {
        let mut query = vec![("format", format.as_str().to_string())];
        if format == MessageFormat::Metadata {
            for header in ["Subject", "From", "To", "Date"] {
                query.push(("metadataHeaders", header.to_string()));
            }
        }
        self.get(&format!("messages/{id}"), &query).await
    }

    /// Fetches a thread with minimal message detail.
    #[instrument(skip(self))]
    pub async fn get_thread(&self, id: &str) -> Result<GmailThread, GmailError> {
        self.get(
            &format!("threads/{id}"),
            &[("format", MessageFormat::Metadata.as_str().to_string())],
        )
        .await
    }

    /// Sends a base64url-encoded RFC 2822 message.
    #[instrument(skip_all)]
    pub async fn send_raw(&self, raw: &str) -> Result<MessageRef, GmailError> {
        self.post("messages/send", &json!({ "raw": raw })).await
    }

    /// Saves a base64url-encoded RFC 2822 message as a draft.
    #[instrument(skip_all)]
    pub async fn create_draft(&self, raw: &str) -> Result<GmailDraft, GmailError> {
        self.post("drafts", &json!({ "message": { "raw": raw } }))
            .await
    }
}

fn connection_failed(err: reqwest::Error) -> GmailError {
    GmailError::ConnectionFailed {
        reason: err.to_string(),
    }
}
