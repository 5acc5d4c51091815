//! Credential lifecycle manager.
//!
//! Produces a valid credential on demand:
//! 1. Load the stored record
//! 2. Return it untouched if it is unexpired and covers the required scopes
//! 3. Otherwise refresh it silently when a refresh token is available
//! 4. Fall back to interactive authorization when nothing else works
//!
//! Only step 4 needs the user, and it is the only step that can fail.

use crate::error::{AuthorizationError, LifecycleError, RefreshError};
use crate::record::{CredentialRecord, ScopeSet, TokenGrant};
use crate::store::CredentialStore;
use async_trait::async_trait;
use chrono::{Duration, Utc};
use std::fmt;
use tracing::{debug, info, instrument, warn};

/// The authorization server a credential is obtained from.
#[async_trait]
pub trait AuthorizationServer: Send + Sync {
    /// Runs the interactive flow, asking the user to grant `scopes`.
    ///
    /// Blocks until the user finishes or the flow times out.
    async fn authorize(&self, scopes: &ScopeSet) -> Result<TokenGrant, AuthorizationError>;

    /// Exchanges a refresh token for a new access token.
    async fn refresh(&self, refresh_token: &str) -> Result<TokenGrant, RefreshError>;
}

/// Where the manager is in the credential lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LifecycleState {
    NoCredential,
    InteractiveAuthPending,
    Valid,
    Expired,
    RefreshPending,
    ReauthRequired,
}

impl fmt::Display for LifecycleState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::NoCredential => "no_credential",
            Self::InteractiveAuthPending => "interactive_auth_pending",
            Self::Valid => "valid",
            Self::Expired => "expired",
            Self::RefreshPending => "refresh_pending",
            Self::ReauthRequired => "reauth_required",
        };
        f.write_str(name)
    }
}

/// Hands out a valid, sufficiently scoped credential.
pub struct CredentialLifecycleManager<S, A> {
    store: S,
    authorization_server: A,
    required_scopes: ScopeSet,
    expiry_skew: Duration,
    state: LifecycleState,
}

impl<S, A> CredentialLifecycleManager<S, A>
where
    S: CredentialStore,
    A: AuthorizationServer,
{
    /// Creates a manager requiring `required_scopes` on every credential.
    #[must_use]
    pub fn new(store: S, authorization_server: A, required_scopes: ScopeSet) -> Self {
        Self {
            store,
            authorization_server,
            required_scopes,
            expiry_skew: Duration::zero(),
            state: LifecycleState::NoCredential,
        }
    }

    /// Treats tokens expiring within `skew` as already expired.
    #[must_use]
    pub fn with_expiry_skew(mut self, skew: Duration) -> Self {
        self.expiry_skew = skew;
        self
    }

    #[must_use]
    pub fn state(&self) -> LifecycleState {
        self.state
    }

    #[must_use]
    pub fn required_scopes(&self) -> &ScopeSet {
        &self.required_scopes
    }

    #[must_use]
    pub fn store(&self) -> &S {
        &self.store
    }

    #[must_use]
    pub fn authorization_server(&self) -> &A {
        &self.authorization_server
    }

    /// Returns a credential that is unexpired and grants every required
    /// scope.
    ///
    /// # Errors
    ///
    /// Returns an error only when interactive authorization was needed
    /// and did not produce a sufficient credential.
    #[instrument(skip_all, fields(required_scopes = self.required_scopes.len()))]
    pub async fn obtain(&mut self) -> Result<CredentialRecord, LifecycleError> {
        let Some(record) = self.load_stored().await else {
            return self.authorize_interactively().await;
        };

        if !record.grants(&self.required_scopes) {
            warn!(
                missing = ?record.scopes.missing_from(&self.required_scopes),
                "stored credential does not cover required scopes"
            );
            return self.authorize_interactively().await;
        }

        let now = Utc::now();
        if !record.is_expired_at(now, self.expiry_skew) {
            self.transition(LifecycleState::Valid);
            return Ok(record);
        }

        // A usable expired record always carries a refresh token.
        self.transition(LifecycleState::Expired);
        let Some(refresh_token) = record.refresh_token.clone() else {
            return self.authorize_interactively().await;
        };

        match self.refresh(&record, &refresh_token).await {
            Ok(refreshed) => Ok(refreshed),
            Err(err) => {
                warn!(error = %err, "silent refresh failed");
                self.transition(LifecycleState::ReauthRequired);
                self.authorize_interactively().await
            }
        }
    }

    async fn load_stored(&mut self) -> Option<CredentialRecord> {
        match self.store.load().await {
            Ok(Some(record)) if !record.is_usable_at(Utc::now(), self.expiry_skew) => {
                warn!(
                    has_access_token = !record.access_token.is_empty(),
                    has_refresh_token = record.refresh_token.is_some(),
                    "stored credential is unusable"
                );
                None
            }
            Ok(Some(record)) => Some(record),
            Ok(None) => {
                info!("no stored credential");
                self.transition(LifecycleState::NoCredential);
                None
            }
            Err(err) => {
                warn!(error = %err, "stored credential unreadable, re-authorizing");
                self.transition(LifecycleState::NoCredential);
                None
            }
        }
    }

    async fn refresh(
        &mut self,
        record: &CredentialRecord,
        refresh_token: &str,
    ) -> Result<CredentialRecord, RefreshError> {
        self.transition(LifecycleState::RefreshPending);

        let grant = self.authorization_server.refresh(refresh_token).await?;
        let refreshed = record.refreshed(grant, Utc::now());
        if !refreshed.grants(&self.required_scopes) {
            return Err(RefreshError::ScopesNarrowed {
                missing: refreshed.scopes.missing_from(&self.required_scopes),
            });
        }

        self.persist(&refreshed).await;
        self.transition(LifecycleState::Valid);
        info!(expiry = %refreshed.expiry, "credential refreshed");
        Ok(refreshed)
    }

    async fn authorize_interactively(&mut self) -> Result<CredentialRecord, LifecycleError> {
        self.transition(LifecycleState::InteractiveAuthPending);

        let grant = match self
            .authorization_server
            .authorize(&self.required_scopes)
            .await
        {
            Ok(grant) => grant,
            Err(err) => {
                self.transition(LifecycleState::NoCredential);
                return Err(LifecycleError::AuthorizationAborted {
                    reason: err.to_string(),
                });
            }
        };

        let record = CredentialRecord::from_grant(grant, &self.required_scopes, Utc::now());
        if !record.grants(&self.required_scopes) {
            self.transition(LifecycleState::NoCredential);
            return Err(LifecycleError::ScopesNotGranted {
                missing: record.scopes.missing_from(&self.required_scopes),
            });
        }

        self.persist(&record).await;
        self.transition(LifecycleState::Valid);
        info!(expiry = %record.expiry, "credential authorized");
        Ok(record)
    }

    /// A failed write is not fatal: the fresh record still works for this
    /// process, the next start simply authorizes again.
    async fn persist(&self, record: &CredentialRecord) {
        if let Err(err) = self.store.save(record).await {
            warn!(error = %err, "failed to persist credential");
        }
    }

    fn transition(&mut self, next: LifecycleState) {
        if self.state != next {
            debug!(from = %self.state, to = %next, "credential state transition");
            self.state = next;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::{FileCredentialStore, InMemoryCredentialStore};
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};

    const MAIL: &str = "https://mail.google.com/";
    const SEND: &str = "https://www.googleapis.com/auth/gmail.send";

    fn required() -> ScopeSet {
        [MAIL, SEND].into_iter().collect()
    }

    #[derive(Default)]
    struct MockAuthorizationServer {
        authorize_calls: AtomicUsize,
        refresh_calls: AtomicUsize,
        refresh_fails: bool,
        authorize_fails: bool,
        granted_scopes: Mutex<Option<ScopeSet>>,
    }

    impl MockAuthorizationServer {
        fn rejecting_refresh() -> Self {
            Self {
                refresh_fails: true,
                ..Self::default()
            }
        }

        fn aborting() -> Self {
            Self {
                authorize_fails: true,
                ..Self::default()
            }
        }

        fn granting(scopes: ScopeSet) -> Self {
            Self {
                granted_scopes: Mutex::new(Some(scopes)),
                ..Self::default()
            }
        }

        fn authorize_count(&self) -> usize {
            self.authorize_calls.load(Ordering::SeqCst)
        }

        fn refresh_count(&self) -> usize {
            self.refresh_calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl AuthorizationServer for MockAuthorizationServer {
        async fn authorize(&self, _scopes: &ScopeSet) -> Result<TokenGrant, AuthorizationError> {
            let n = self.authorize_calls.fetch_add(1, Ordering::SeqCst) + 1;
            if self.authorize_fails {
                return Err(AuthorizationError::TimedOut { seconds: 1 });
            }
            Ok(TokenGrant {
                access_token: format!("interactive-{n}"),
                refresh_token: Some("refresh-interactive".to_string()),
                expires_in: Some(std::time::Duration::from_secs(3600)),
                scopes: self.granted_scopes.lock().unwrap().clone(),
            })
        }

        async fn refresh(&self, refresh_token: &str) -> Result<TokenGrant, RefreshError> {
            self.refresh_calls.fetch_add(1, Ordering::SeqCst);
            if self.refresh_fails {
                return Err(RefreshError::Rejected {
                    reason: "invalid_grant".to_string(),
                });
            }
            Ok(TokenGrant {
                access_token: format!("refreshed-from-{refresh_token}"),
                refresh_token: None,
                expires_in: Some(std::time::Duration::from_secs(3600)),
                scopes: None,
            })
        }
    }

    fn valid_record() -> CredentialRecord {
        CredentialRecord::new("stored", Utc::now() + Duration::hours(1), required())
            .with_refresh_token("refresh-stored")
    }

    fn expired_record() -> CredentialRecord {
        CredentialRecord::new("stale", Utc::now() - Duration::hours(1), required())
            .with_refresh_token("refresh-stored")
    }

    fn manager(
        store: InMemoryCredentialStore,
        auth: MockAuthorizationServer,
    ) -> CredentialLifecycleManager<InMemoryCredentialStore, MockAuthorizationServer> {
        CredentialLifecycleManager::new(store, auth, required())
    }

    #[tokio::test]
    async fn valid_record_is_returned_without_network_calls() {
        let stored = valid_record();
        let mut manager = manager(
            InMemoryCredentialStore::with_record(stored.clone()),
            MockAuthorizationServer::default(),
        );

        let record = manager.obtain().await.unwrap();

        assert_eq!(record, stored);
        assert_eq!(manager.state(), LifecycleState::Valid);
        assert_eq!(manager.authorization_server().refresh_count(), 0);
        assert_eq!(manager.authorization_server().authorize_count(), 0);
        assert_eq!(manager.store().save_count(), 0);
    }

    #[tokio::test]
    async fn repeated_obtain_is_idempotent() {
        let mut manager = manager(
            InMemoryCredentialStore::with_record(valid_record()),
            MockAuthorizationServer::default(),
        );

        let first = manager.obtain().await.unwrap();
        let second = manager.obtain().await.unwrap();

        assert_eq!(first, second);
        assert_eq!(
            serde_json::to_vec(&first).unwrap(),
            serde_json::to_vec(&second).unwrap()
        );
        assert_eq!(manager.authorization_server().refresh_count(), 0);
        assert_eq!(manager.authorization_server().authorize_count(), 0);
    }

    #[tokio::test]
    async fn expired_record_is_refreshed_and_persisted() {
        let stale = expired_record();
        let mut manager = manager(
            InMemoryCredentialStore::with_record(stale.clone()),
            MockAuthorizationServer::default(),
        );

        let record = manager.obtain().await.unwrap();

        assert_eq!(record.access_token, "refreshed-from-refresh-stored");
        assert!(record.expiry > stale.expiry);
        assert_eq!(record.refresh_token.as_deref(), Some("refresh-stored"));
        assert_eq!(manager.store().current(), Some(record));
        assert_eq!(manager.authorization_server().refresh_count(), 1);
        assert_eq!(manager.authorization_server().authorize_count(), 0);
        assert_eq!(manager.state(), LifecycleState::Valid);
    }

    #[tokio::test]
    async fn rejected_refresh_falls_back_to_interactive() {
        let mut manager = manager(
            InMemoryCredentialStore::with_record(expired_record()),
            MockAuthorizationServer::rejecting_refresh(),
        );

        let record = manager.obtain().await.unwrap();

        assert_eq!(record.access_token, "interactive-1");
        assert_eq!(manager.authorization_server().refresh_count(), 1);
        assert_eq!(manager.authorization_server().authorize_count(), 1);
        assert_eq!(manager.store().current(), Some(record));
    }

    #[tokio::test]
    async fn expired_record_without_refresh_token_reauthorizes() {
        let mut stale = expired_record();
        stale.refresh_token = None;
        let mut manager = manager(
            InMemoryCredentialStore::with_record(stale),
            MockAuthorizationServer::default(),
        );

        manager.obtain().await.unwrap();

        assert_eq!(manager.authorization_server().refresh_count(), 0);
        assert_eq!(manager.authorization_server().authorize_count(), 1);
    }

    #[tokio::test]
    async fn insufficient_scopes_force_interactive_even_when_unexpired() {
        let narrow = CredentialRecord::new(
            "narrow",
            Utc::now() + Duration::hours(1),
            [MAIL].into_iter().collect(),
        )
        .with_refresh_token("refresh-stored");
        let mut manager = manager(
            InMemoryCredentialStore::with_record(narrow),
            MockAuthorizationServer::default(),
        );

        let record = manager.obtain().await.unwrap();

        assert_eq!(record.access_token, "interactive-1");
        assert!(record.grants(&required()));
        assert_eq!(manager.authorization_server().refresh_count(), 0);
        assert_eq!(manager.authorization_server().authorize_count(), 1);
    }

    #[tokio::test]
    async fn insufficient_scopes_on_expired_record_skip_refresh() {
        let narrow = CredentialRecord::new(
            "narrow",
            Utc::now() - Duration::hours(1),
            [MAIL].into_iter().collect(),
        )
        .with_refresh_token("refresh-stored");
        let mut manager = manager(
            InMemoryCredentialStore::with_record(narrow),
            MockAuthorizationServer::default(),
        );

        let record = manager.obtain().await.unwrap();

        assert_eq!(record.access_token, "interactive-1");
        assert_eq!(manager.authorization_server().refresh_count(), 0);
        assert_eq!(manager.authorization_server().authorize_count(), 1);

        let again = manager.obtain().await.unwrap();
        assert_eq!(again, record);
        assert_eq!(manager.authorization_server().refresh_count(), 0);
        assert_eq!(manager.authorization_server().authorize_count(), 1);
    }

    #[tokio::test]
    async fn empty_access_token_reauthorizes() {
        let blank = CredentialRecord::new("", Utc::now() + Duration::hours(1), required())
            .with_refresh_token("refresh-stored");
        let mut manager = manager(
            InMemoryCredentialStore::with_record(blank),
            MockAuthorizationServer::default(),
        );

        let record = manager.obtain().await.unwrap();

        assert_eq!(record.access_token, "interactive-1");
        assert_eq!(manager.authorization_server().refresh_count(), 0);
        assert_eq!(manager.authorization_server().authorize_count(), 1);
    }

    #[tokio::test]
    async fn failed_save_after_refresh_still_returns_record() {
        let mut manager = manager(
            InMemoryCredentialStore::with_record(expired_record()).with_failing_saves(),
            MockAuthorizationServer::default(),
        );

        let record = manager.obtain().await.unwrap();

        assert_eq!(record.access_token, "refreshed-from-refresh-stored");
        assert_eq!(manager.state(), LifecycleState::Valid);
        assert_eq!(manager.store().save_count(), 1);
        assert_eq!(manager.store().current().unwrap().access_token, "stale");
    }

    #[tokio::test]
    async fn failed_save_after_authorization_still_returns_record() {
        let mut manager = manager(
            InMemoryCredentialStore::new().with_failing_saves(),
            MockAuthorizationServer::default(),
        );

        let record = manager.obtain().await.unwrap();

        assert_eq!(record.access_token, "interactive-1");
        assert_eq!(manager.state(), LifecycleState::Valid);
        assert_eq!(manager.store().save_count(), 1);
        assert_eq!(manager.store().current(), None);
    }

    #[tokio::test]
    async fn first_run_authorizes_and_persists() {
        let mut manager = manager(
            InMemoryCredentialStore::new(),
            MockAuthorizationServer::default(),
        );

        let record = manager.obtain().await.unwrap();

        assert_eq!(manager.store().save_count(), 1);
        assert_eq!(manager.store().current(), Some(record));
    }

    #[tokio::test]
    async fn corrupt_store_proceeds_to_interactive_authorization() {
        let mut manager = manager(
            InMemoryCredentialStore::corrupt(),
            MockAuthorizationServer::default(),
        );

        let record = manager.obtain().await.unwrap();

        assert_eq!(record.access_token, "interactive-1");
        assert_eq!(manager.authorization_server().authorize_count(), 1);
    }

    #[tokio::test]
    async fn corrupt_file_on_disk_is_replaced() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("token.json");
        std::fs::write(&path, "{\"access_token\": 42").unwrap();

        let mut manager = CredentialLifecycleManager::new(
            FileCredentialStore::new(&path),
            MockAuthorizationServer::default(),
            required(),
        );
        let record = manager.obtain().await.unwrap();

        let on_disk = FileCredentialStore::new(&path).load().await.unwrap();
        assert_eq!(on_disk, Some(record));
    }

    #[tokio::test]
    async fn aborted_authorization_is_reported() {
        let mut manager = manager(
            InMemoryCredentialStore::new(),
            MockAuthorizationServer::aborting(),
        );

        let err = manager.obtain().await.unwrap_err();

        assert!(matches!(err, LifecycleError::AuthorizationAborted { .. }));
        assert_eq!(manager.state(), LifecycleState::NoCredential);
        assert_eq!(manager.store().save_count(), 0);
    }

    #[tokio::test]
    async fn withheld_scopes_are_rejected() {
        let mut manager = manager(
            InMemoryCredentialStore::new(),
            MockAuthorizationServer::granting([MAIL].into_iter().collect()),
        );

        let err = manager.obtain().await.unwrap_err();

        assert_eq!(
            err,
            LifecycleError::ScopesNotGranted {
                missing: vec![SEND.to_string()],
            }
        );
        assert_eq!(manager.store().save_count(), 0);
    }

    #[tokio::test]
    async fn skew_treats_nearly_expired_tokens_as_expired() {
        let soon = CredentialRecord::new("soon", Utc::now() + Duration::seconds(10), required())
            .with_refresh_token("refresh-stored");
        let mut manager = manager(
            InMemoryCredentialStore::with_record(soon),
            MockAuthorizationServer::default(),
        )
        .with_expiry_skew(Duration::seconds(60));

        let record = manager.obtain().await.unwrap();

        assert_eq!(record.access_token, "refreshed-from-refresh-stored");
        assert_eq!(manager.authorization_server().refresh_count(), 1);
    }
}
