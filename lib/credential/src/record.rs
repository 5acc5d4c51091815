//! The persisted credential record and the scope sets it is checked against.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;

/// Lifetime assumed for tokens whose response omits `expires_in`.
const DEFAULT_TOKEN_LIFETIME_SECS: i64 = 3600;

/// A set of OAuth scopes.
///
/// Ordered so that serialized records are stable across writes.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ScopeSet(BTreeSet<String>);

impl ScopeSet {
    /// Creates an empty scope set.
    #[must_use]
    pub fn new() -> Self {
        Self(BTreeSet::new())
    }

    /// Parses a comma- or whitespace-separated scope list.
    #[must_use]
    pub fn parse_list(raw: &str) -> Self {
        raw.split(|c: char| c == ',' || c.is_whitespace())
            .filter(|s| !s.is_empty())
            .collect()
    }

    /// Returns true if the scope is in the set.
    #[must_use]
    pub fn contains(&self, scope: &str) -> bool {
        self.0.contains(scope)
    }

    /// Returns true if every scope in `required` is granted by this set.
    #[must_use]
    pub fn satisfies(&self, required: &ScopeSet) -> bool {
        self.0.is_superset(&required.0)
    }

    /// Returns the scopes of `required` this set does not grant.
    #[must_use]
    pub fn missing_from(&self, required: &ScopeSet) -> Vec<String> {
        required.0.difference(&self.0).cloned().collect()
    }

    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.0.iter().map(String::as_str)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl<S: Into<String>> FromIterator<S> for ScopeSet {
    fn from_iter<I: IntoIterator<Item = S>>(iter: I) -> Self {
        Self(iter.into_iter().map(Into::into).collect())
    }
}

/// Tokens returned by the authorization server for one grant.
#[derive(Clone, PartialEq, Eq)]
pub struct TokenGrant {
    pub access_token: String,
    pub refresh_token: Option<String>,
    pub expires_in: Option<std::time::Duration>,
    /// Scopes the server reports as granted, if it reported any.
    pub scopes: Option<ScopeSet>,
}

impl fmt::Debug for TokenGrant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TokenGrant")
            .field("access_token", &"[redacted]")
            .field("has_refresh_token", &self.refresh_token.is_some())
            .field("expires_in", &self.expires_in)
            .field("scopes", &self.scopes)
            .finish()
    }
}

impl TokenGrant {
    fn expiry_from(&self, now: DateTime<Utc>) -> DateTime<Utc> {
        let lifetime = self
            .expires_in
            .and_then(|d| Duration::from_std(d).ok())
            .unwrap_or_else(|| Duration::seconds(DEFAULT_TOKEN_LIFETIME_SECS));
        now + lifetime
    }
}

/// A delegated-access credential as persisted to the store.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CredentialRecord {
    pub access_token: String,
    pub refresh_token: Option<String>,
    pub expiry: DateTime<Utc>,
    pub scopes: ScopeSet,
    #[serde(default = "default_token_type")]
    pub token_type: String,
}

fn default_token_type() -> String {
    "Bearer".to_string()
}

impl fmt::Debug for CredentialRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CredentialRecord")
            .field("access_token", &"[redacted]")
            .field("has_refresh_token", &self.refresh_token.is_some())
            .field("expiry", &self.expiry)
            .field("scopes", &self.scopes)
            .field("token_type", &self.token_type)
            .finish()
    }
}

impl CredentialRecord {
    /// Creates a record without a refresh token.
    #[must_use]
    pub fn new(access_token: impl Into<String>, expiry: DateTime<Utc>, scopes: ScopeSet) -> Self {
        Self {
            access_token: access_token.into(),
            refresh_token: None,
            expiry,
            scopes,
            token_type: default_token_type(),
        }
    }

    /// Attaches a refresh token.
    #[must_use]
    pub fn with_refresh_token(mut self, refresh_token: impl Into<String>) -> Self {
        self.refresh_token = Some(refresh_token.into());
        self
    }

    /// Builds a record from a fresh interactive grant.
    ///
    /// A server that does not echo scopes back is taken to have granted
    /// everything that was requested.
    #[must_use]
    pub fn from_grant(grant: TokenGrant, requested: &ScopeSet, now: DateTime<Utc>) -> Self {
        let expiry = grant.expiry_from(now);
        Self {
            access_token: grant.access_token,
            refresh_token: grant.refresh_token,
            expiry,
            scopes: grant.scopes.unwrap_or_else(|| requested.clone()),
            token_type: default_token_type(),
        }
    }

    /// Returns this record updated with a refresh grant.
    ///
    /// Refresh responses usually omit the refresh token and often the
    /// scopes; both carry over from the previous record.
    #[must_use]
    pub fn refreshed(&self, grant: TokenGrant, now: DateTime<Utc>) -> Self {
        let expiry = grant.expiry_from(now);
        Self {
            access_token: grant.access_token,
            refresh_token: grant.refresh_token.or_else(|| self.refresh_token.clone()),
            expiry,
            scopes: grant.scopes.unwrap_or_else(|| self.scopes.clone()),
            token_type: self.token_type.clone(),
        }
    }

    /// Returns true if the token is expired, or will be within `skew`.
    #[must_use]
    pub fn is_expired_at(&self, now: DateTime<Utc>, skew: Duration) -> bool {
        self.expiry <= now + skew
    }

    /// Returns true if the record can produce a working access token,
    /// either directly or through a refresh.
    #[must_use]
    pub fn is_usable_at(&self, now: DateTime<Utc>, skew: Duration) -> bool {
        !self.access_token.is_empty()
            && (!self.is_expired_at(now, skew) || self.refresh_token.is_some())
    }

    /// Returns true if the record grants every required scope.
    #[must_use]
    pub fn grants(&self, required: &ScopeSet) -> bool {
        self.scopes.satisfies(required)
    }
}
