use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::api::ApiError;
use crate::models::TokenPair;

use super::claims::{Claims, DecodeError, JwtCodec, TokenCodec};
use super::store::{
    SessionStore, ACCESS_TOKEN_KEY, PENDING_DESTINATION_KEY, REFRESH_TOKEN_KEY, SESSION_KEYS,
    USER_ID_KEY,
};

/// Landing view when nothing was remembered
pub const DEFAULT_DESTINATION: &str = "expense";

/// Outcome of a session check. There is no "refreshing" state: the check
/// does not resolve until any refresh has finished.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionStatus {
    Valid,
    Unauthenticated,
}

impl SessionStatus {
    pub fn is_valid(self) -> bool {
        self == SessionStatus::Valid
    }
}

/// Exchanges a refresh token for a new credential pair. One call, no retries.
#[async_trait]
pub trait TokenRefresher: Send + Sync {
    async fn refresh_token(&self, refresh_token: &str) -> Result<TokenPair, ApiError>;
}

#[async_trait]
impl<T: TokenRefresher + ?Sized> TokenRefresher for Arc<T> {
    async fn refresh_token(&self, refresh_token: &str) -> Result<TokenPair, ApiError> {
        (**self).refresh_token(refresh_token).await
    }
}

/// Gatekeeper for protected views.
///
/// Holds no session state of its own; everything lives in the injected
/// store so the guard can be rebuilt at any time. Refreshes are
/// single-flight: concurrent checks against the same expired token share
/// one refresh call.
pub struct SessionGuard<S, R, C = JwtCodec> {
    store: S,
    refresher: R,
    codec: C,
    default_destination: String,
    refresh_lock: Mutex<()>,
}

impl<S, R> SessionGuard<S, R, JwtCodec>
where
    S: SessionStore,
    R: TokenRefresher,
{
    pub fn new(store: S, refresher: R) -> Self {
        Self::with_codec(store, refresher, JwtCodec)
    }
}

impl<S, R, C> SessionGuard<S, R, C>
where
    S: SessionStore,
    R: TokenRefresher,
    C: TokenCodec,
{
    pub fn with_codec(store: S, refresher: R, codec: C) -> Self {
        Self {
            store,
            refresher,
            codec,
            default_destination: DEFAULT_DESTINATION.to_string(),
            refresh_lock: Mutex::new(()),
        }
    }

    /// Override the destination returned when none was recorded
    pub fn with_default_destination(mut self, destination: impl Into<String>) -> Self {
        self.default_destination = destination.into();
        self
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    /// Check the held session against the system clock.
    pub async fn check_session(&self) -> Result<SessionStatus> {
        self.check_session_at(Utc::now()).await
    }

    /// Check the held session against `now`, refreshing once if the access
    /// token has expired. `Err` only means the store could not be read or written.
    pub async fn check_session_at(&self, now: DateTime<Utc>) -> Result<SessionStatus> {
        let Some(access_token) = self
            .store
            .get(ACCESS_TOKEN_KEY)?
            .filter(|token| !token.is_empty())
        else {
            debug!("No access token held");
            return Ok(SessionStatus::Unauthenticated);
        };

        match self.usable_claims(&access_token, now) {
            Ok(claims) => {
                debug!(subject = %claims.subject_id, expires_at = %claims.expires_at, "Access token valid");
                Ok(SessionStatus::Valid)
            }
            Err(reason) => {
                debug!(%reason, "Access token unusable, refreshing");
                self.refresh(&access_token, now).await
            }
        }
    }

    /// Decode a token and accept it only if it is still live at `now`.
    fn usable_claims(&self, token: &str, now: DateTime<Utc>) -> Result<Claims, String> {
        match self.codec.decode(token) {
            Ok(claims) if claims.is_expired_at(now) => {
                Err(format!("expired at {}", claims.expires_at))
            }
            Ok(claims) => Ok(claims),
            Err(e) => Err(e.to_string()),
        }
    }

    async fn refresh(&self, stale_access_token: &str, now: DateTime<Utc>) -> Result<SessionStatus> {
        let _flight = self.refresh_lock.lock().await;

        // Whoever held the lock before us may already have settled the session
        match self.store.get(ACCESS_TOKEN_KEY)? {
            None => {
                debug!("Session ended while waiting to refresh");
                return Ok(SessionStatus::Unauthenticated);
            }
            Some(current) if current != stale_access_token => {
                if self.usable_claims(&current, now).is_ok() {
                    debug!("Access token refreshed by a concurrent check");
                    return Ok(SessionStatus::Valid);
                }
            }
            Some(_) => {}
        }

        let Some(refresh_token) = self.store.get(REFRESH_TOKEN_KEY)? else {
            warn!("Access token expired and no refresh token held, ending session");
            self.end_session()?;
            return Ok(SessionStatus::Unauthenticated);
        };

        let pair = match self.refresher.refresh_token(&refresh_token).await {
            Ok(pair) => pair,
            Err(e) => {
                warn!(error = %e, "Token refresh failed, ending session");
                self.end_session()?;
                return Ok(SessionStatus::Unauthenticated);
            }
        };

        match self.persist_pair(&pair) {
            Ok(claims) => {
                info!(subject = %claims.subject_id, expires_at = %claims.expires_at, "Session refreshed");
                Ok(SessionStatus::Valid)
            }
            Err(PersistError::Decode(e)) => {
                warn!(error = %e, "Server returned an unreadable access token, ending session");
                self.end_session()?;
                Ok(SessionStatus::Unauthenticated)
            }
            Err(PersistError::Store(e)) => Err(e),
        }
    }

    /// Store a freshly issued pair after login. The access token must decode;
    /// a malformed token is never written.
    pub fn begin_session(&self, pair: &TokenPair) -> Result<Claims> {
        match self.persist_pair(pair) {
            Ok(claims) => {
                info!(subject = %claims.subject_id, "Session started");
                Ok(claims)
            }
            Err(PersistError::Decode(e)) => {
                Err(anyhow::Error::new(e).context("Server issued an unreadable access token"))
            }
            Err(PersistError::Store(e)) => Err(e),
        }
    }

    fn persist_pair(&self, pair: &TokenPair) -> std::result::Result<Claims, PersistError> {
        let claims = self
            .codec
            .decode(&pair.access_token)
            .map_err(PersistError::Decode)?;

        self.store
            .set_many(&[
                (ACCESS_TOKEN_KEY, pair.access_token.as_str()),
                (REFRESH_TOKEN_KEY, pair.refresh_token.as_str()),
                (USER_ID_KEY, claims.subject_id.as_str()),
            ])
            .map_err(PersistError::Store)?;

        Ok(claims)
    }

    /// Forget everything about the current session. Safe to call repeatedly.
    pub fn end_session(&self) -> Result<()> {
        self.store.remove_many(&SESSION_KEYS)?;
        debug!("Session state cleared");
        Ok(())
    }

    /// Remember where the user was heading. Last write wins.
    pub fn record_destination(&self, name: &str) -> Result<()> {
        self.store.set(PENDING_DESTINATION_KEY, name)
    }

    /// The remembered destination, or the default. Does not clear it.
    pub fn consume_destination(&self) -> Result<String> {
        Ok(self
            .store
            .get(PENDING_DESTINATION_KEY)?
            .unwrap_or_else(|| self.default_destination.clone()))
    }

    /// Bearer token for API calls, if one is held
    pub fn access_token(&self) -> Result<Option<String>> {
        self.store.get(ACCESS_TOKEN_KEY)
    }

    /// User id recorded at login or the last refresh
    pub fn subject_id(&self) -> Result<Option<String>> {
        self.store.get(USER_ID_KEY)
    }

    /// Claims of the held access token, if it decodes
    pub fn claims(&self) -> Result<Option<Claims>> {
        Ok(self
            .store
            .get(ACCESS_TOKEN_KEY)?
            .and_then(|token| self.codec.decode(&token).ok()))
    }
}

enum PersistError {
    Decode(DecodeError),
    Store(anyhow::Error),
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration as StdDuration;

    use chrono::Duration;
    use serde_json::json;

    use super::*;
    use crate::auth::claims::encode_unsigned;
    use crate::auth::store::MemoryStore;

    /// Refresher that hands out a canned result and counts calls
    struct FakeRefresher {
        calls: AtomicUsize,
        seen: std::sync::Mutex<Vec<String>>,
        response: Box<dyn Fn() -> Result<TokenPair, ApiError> + Send + Sync>,
        delay: Option<StdDuration>,
    }

    impl FakeRefresher {
        fn returning(pair: TokenPair) -> Self {
            Self {
                calls: AtomicUsize::new(0),
                seen: std::sync::Mutex::new(Vec::new()),
                response: Box::new(move || Ok::<_, ApiError>(pair.clone())),
                delay: None,
            }
        }

        fn failing() -> Self {
            Self {
                calls: AtomicUsize::new(0),
                seen: std::sync::Mutex::new(Vec::new()),
                response: Box::new(|| {
                    Err::<TokenPair, _>(ApiError::Rejected("refresh token revoked".to_string()))
                }),
                delay: None,
            }
        }

        fn with_delay(mut self, delay: StdDuration) -> Self {
            self.delay = Some(delay);
            self
        }

        fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl TokenRefresher for FakeRefresher {
        async fn refresh_token(&self, refresh_token: &str) -> Result<TokenPair, ApiError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.seen.lock().unwrap().push(refresh_token.to_string());
            if let Some(delay) = self.delay {
                tokio::time::sleep(delay).await;
            }
            (self.response)()
        }
    }

    fn token_expiring(subject: &str, expires_at: DateTime<Utc>) -> String {
        encode_unsigned(&json!({"sub": subject, "exp": expires_at.timestamp()}))
    }

    fn pair(access: &str, refresh: &str) -> TokenPair {
        TokenPair {
            access_token: access.to_string(),
            refresh_token: refresh.to_string(),
        }
    }

    fn seeded_store(access: &str, refresh: &str) -> MemoryStore {
        let store = MemoryStore::new();
        store
            .set_many(&[(ACCESS_TOKEN_KEY, access), (REFRESH_TOKEN_KEY, refresh)])
            .unwrap();
        store
    }

    #[tokio::test]
    async fn test_no_access_token_is_unauthenticated_without_network() {
        let refresher = Arc::new(FakeRefresher::failing());
        let guard = SessionGuard::new(MemoryStore::new(), refresher.clone());

        let status = guard.check_session().await.unwrap();
        assert_eq!(status, SessionStatus::Unauthenticated);
        assert_eq!(refresher.calls(), 0);
    }

    #[tokio::test]
    async fn test_empty_access_token_is_unauthenticated_without_network() {
        let refresher = Arc::new(FakeRefresher::failing());
        let guard = SessionGuard::new(seeded_store("", "R1"), refresher.clone());

        let status = guard.check_session().await.unwrap();
        assert_eq!(status, SessionStatus::Unauthenticated);
        assert_eq!(refresher.calls(), 0);
    }

    #[tokio::test]
    async fn test_fresh_token_is_valid_without_refresh() {
        let now = Utc::now();
        let access = token_expiring("u1", now + Duration::minutes(15));
        let refresher = Arc::new(FakeRefresher::failing());
        let guard = SessionGuard::new(seeded_store(&access, "r1"), refresher.clone());

        assert_eq!(guard.check_session_at(now).await.unwrap(), SessionStatus::Valid);
        assert_eq!(refresher.calls(), 0);
        assert_eq!(guard.access_token().unwrap().as_deref(), Some(access.as_str()));
    }

    #[tokio::test]
    async fn test_token_expiring_exactly_now_is_refreshed() {
        let now = Utc::now();
        let access = token_expiring("u1", now);
        let new_access = token_expiring("u1", now + Duration::minutes(15));
        let refresher = Arc::new(FakeRefresher::returning(pair(&new_access, "r2")));
        let guard = SessionGuard::new(seeded_store(&access, "r1"), refresher.clone());

        assert_eq!(guard.check_session_at(now).await.unwrap(), SessionStatus::Valid);
        assert_eq!(refresher.calls(), 1);
    }

    #[tokio::test]
    async fn test_expired_token_refreshes_and_replaces_pair() {
        let now = Utc::now();
        let access = token_expiring("u1", now - Duration::seconds(1));
        let a2 = token_expiring("u1", now + Duration::minutes(15));
        let refresher = Arc::new(FakeRefresher::returning(pair(&a2, "R2")));
        let guard = SessionGuard::new(seeded_store(&access, "R1"), refresher.clone());

        assert_eq!(guard.check_session_at(now).await.unwrap(), SessionStatus::Valid);
        assert_eq!(refresher.calls(), 1);
        assert_eq!(refresher.seen.lock().unwrap().as_slice(), ["R1".to_string()]);

        let store = guard.store();
        assert_eq!(store.get(ACCESS_TOKEN_KEY).unwrap().as_deref(), Some(a2.as_str()));
        assert_eq!(store.get(REFRESH_TOKEN_KEY).unwrap().as_deref(), Some("R2"));
        assert_eq!(guard.subject_id().unwrap().as_deref(), Some("u1"));

        // The next check uses the new pair and stays offline
        assert_eq!(guard.check_session_at(now).await.unwrap(), SessionStatus::Valid);
        assert_eq!(refresher.calls(), 1);
    }

    #[tokio::test]
    async fn test_failed_refresh_clears_everything() {
        let now = Utc::now();
        let access = token_expiring("u1", now - Duration::seconds(1));
        let refresher = Arc::new(FakeRefresher::failing());
        let guard = SessionGuard::new(seeded_store(&access, "R1"), refresher.clone());
        guard.record_destination("reports").unwrap();

        assert_eq!(
            guard.check_session_at(now).await.unwrap(),
            SessionStatus::Unauthenticated
        );
        assert_eq!(refresher.calls(), 1);

        let store = guard.store();
        for key in SESSION_KEYS {
            assert_eq!(store.get(key).unwrap(), None, "{} should be cleared", key);
        }

        // Terminal: no further refresh attempts
        assert_eq!(
            guard.check_session_at(now).await.unwrap(),
            SessionStatus::Unauthenticated
        );
        assert_eq!(refresher.calls(), 1);
    }

    #[tokio::test]
    async fn test_malformed_access_token_takes_refresh_path() {
        let now = Utc::now();
        let a2 = token_expiring("u1", now + Duration::minutes(15));
        let refresher = Arc::new(FakeRefresher::returning(pair(&a2, "R2")));
        let guard = SessionGuard::new(seeded_store("not-a-token", "R1"), refresher.clone());

        assert_eq!(guard.check_session_at(now).await.unwrap(), SessionStatus::Valid);
        assert_eq!(refresher.calls(), 1);
    }

    #[tokio::test]
    async fn test_unreadable_refreshed_token_is_not_persisted() {
        let now = Utc::now();
        let access = token_expiring("u1", now - Duration::seconds(1));
        let refresher = Arc::new(FakeRefresher::returning(pair("garbage", "R2")));
        let guard = SessionGuard::new(seeded_store(&access, "R1"), refresher.clone());

        assert_eq!(
            guard.check_session_at(now).await.unwrap(),
            SessionStatus::Unauthenticated
        );
        assert_eq!(guard.access_token().unwrap(), None);
        assert_eq!(guard.store().get(REFRESH_TOKEN_KEY).unwrap(), None);
    }

    #[tokio::test]
    async fn test_missing_refresh_token_ends_session_offline() {
        let now = Utc::now();
        let access = token_expiring("u1", now - Duration::seconds(1));
        let store = MemoryStore::new();
        store.set(ACCESS_TOKEN_KEY, &access).unwrap();
        let refresher = Arc::new(FakeRefresher::failing());
        let guard = SessionGuard::new(store, refresher.clone());

        assert_eq!(
            guard.check_session_at(now).await.unwrap(),
            SessionStatus::Unauthenticated
        );
        assert_eq!(refresher.calls(), 0);
        assert!(guard.store().is_empty());
    }

    #[tokio::test]
    async fn test_concurrent_checks_share_one_refresh() {
        let now = Utc::now();
        let access = token_expiring("u1", now - Duration::seconds(1));
        let a2 = token_expiring("u1", now + Duration::minutes(15));
        let refresher = Arc::new(
            FakeRefresher::returning(pair(&a2, "R2")).with_delay(StdDuration::from_millis(50)),
        );
        let guard = Arc::new(SessionGuard::new(seeded_store(&access, "R1"), refresher.clone()));

        let mut handles = Vec::new();
        for _ in 0..8 {
            let guard = guard.clone();
            handles.push(tokio::spawn(async move { guard.check_session_at(now).await }));
        }
        for handle in handles {
            assert_eq!(handle.await.unwrap().unwrap(), SessionStatus::Valid);
        }

        assert_eq!(refresher.calls(), 1);
        assert_eq!(guard.store().get(REFRESH_TOKEN_KEY).unwrap().as_deref(), Some("R2"));
    }

    #[test]
    fn test_destination_is_sticky_and_last_write_wins() {
        let guard = SessionGuard::new(MemoryStore::new(), FakeRefresher::failing());
        assert_eq!(guard.consume_destination().unwrap(), DEFAULT_DESTINATION);

        guard.record_destination("categories").unwrap();
        guard.record_destination("reports").unwrap();
        assert_eq!(guard.consume_destination().unwrap(), "reports");
        assert_eq!(guard.consume_destination().unwrap(), "reports");
    }

    #[test]
    fn test_custom_default_destination() {
        let guard = SessionGuard::new(MemoryStore::new(), FakeRefresher::failing())
            .with_default_destination("report");
        assert_eq!(guard.consume_destination().unwrap(), "report");
    }

    #[test]
    fn test_end_session_is_idempotent() {
        let now = Utc::now();
        let access = token_expiring("u1", now + Duration::minutes(5));
        let guard = SessionGuard::new(seeded_store(&access, "R1"), FakeRefresher::failing());
        guard.record_destination("reports").unwrap();

        guard.end_session().unwrap();
        assert!(guard.store().is_empty());
        guard.end_session().unwrap();
        assert!(guard.store().is_empty());
        assert_eq!(guard.consume_destination().unwrap(), DEFAULT_DESTINATION);
    }

    #[test]
    fn test_begin_session_persists_pair_and_subject() {
        let now = Utc::now();
        let access = encode_unsigned(&json!({
            "userInfo": {"id": "u-42"},
            "exp": (now + Duration::minutes(15)).timestamp()
        }));
        let guard = SessionGuard::new(MemoryStore::new(), FakeRefresher::failing());

        let claims = guard.begin_session(&pair(&access, "R1")).unwrap();
        assert_eq!(claims.subject_id, "u-42");
        assert_eq!(guard.subject_id().unwrap().as_deref(), Some("u-42"));
        assert_eq!(guard.store().get(REFRESH_TOKEN_KEY).unwrap().as_deref(), Some("R1"));
        assert_eq!(guard.claims().unwrap(), Some(claims));
    }

    #[test]
    fn test_begin_session_rejects_malformed_token() {
        let guard = SessionGuard::new(MemoryStore::new(), FakeRefresher::failing());
        assert!(guard.begin_session(&pair("nope", "R1")).is_err());
        assert!(guard.store().is_empty());
    }
}
