//! Session manager
//!
//! Issues, reads, renews and revokes sessions on top of a [`SessionStore`].
//! The manager keeps no mutable state of its own, so one instance is cloned
//! into every request.

use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use common::store::{SessionStore, StoreError};
use thiserror::Error;
use tracing::{debug, error, info, warn};

use super::clock::{Clock, SystemClock};
use super::key::SessionKey;
use super::record::{Identity, SessionRecord};

/// Session timing policy
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SessionConfig {
    /// Sliding window a login stays valid without activity
    pub session_duration: Duration,
    /// Hard limit from login, renewals never extend past it
    pub max_session_duration: Duration,
    /// Renewals closer than this to the last write are not persisted
    pub min_write_interval: Duration,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            session_duration: Duration::hours(1),
            max_session_duration: Duration::hours(24),
            min_write_interval: Duration::minutes(2),
        }
    }
}

impl SessionConfig {
    /// Replace non-positive durations with the defaults
    pub fn normalized(self) -> Self {
        let defaults = Self::default();
        let pick = |value: Duration, fallback: Duration| {
            if value > Duration::zero() { value } else { fallback }
        };
        Self {
            session_duration: pick(self.session_duration, defaults.session_duration),
            max_session_duration: pick(self.max_session_duration, defaults.max_session_duration),
            min_write_interval: pick(self.min_write_interval, defaults.min_write_interval),
        }
    }
}

/// Errors raised by the session manager
///
/// An absent or expired session is not an error: it is a record with
/// `authenticated == false`.
#[derive(Error, Debug)]
pub enum SessionError {
    #[error("Cannot issue a session without a user id")]
    EmptyIdentity,

    #[error("Failed to read session: {0}")]
    StoreRead(#[source] StoreError),

    #[error("Failed to write session: {0}")]
    StoreWrite(#[source] StoreError),

    #[error("Failed to encode session: {0}")]
    Encode(#[from] serde_json::Error),
}

/// Result of [`SessionManager::read_and_renew`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Renewal {
    /// The derived record, renewed if a write happened
    pub record: SessionRecord,
    /// Whether the record was written back to the store
    pub persisted: bool,
}

/// Session manager for issuing and checking login sessions
#[derive(Clone)]
pub struct SessionManager {
    store: Arc<dyn SessionStore>,
    clock: Arc<dyn Clock>,
    config: SessionConfig,
}

impl SessionManager {
    /// Create a new session manager using the wall clock
    pub fn new(store: Arc<dyn SessionStore>, config: SessionConfig) -> Self {
        Self::with_clock(store, config, Arc::new(SystemClock))
    }

    /// Create a new session manager with an explicit time source
    pub fn with_clock(
        store: Arc<dyn SessionStore>,
        config: SessionConfig,
        clock: Arc<dyn Clock>,
    ) -> Self {
        let config = config.normalized();
        if config.max_session_duration < config.session_duration {
            warn!(
                "max session duration ({}s) is shorter than the session duration ({}s); \
                 sessions will end at the forced re-authentication deadline",
                config.max_session_duration.num_seconds(),
                config.session_duration.num_seconds()
            );
        }
        Self {
            store,
            clock,
            config,
        }
    }

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    /// Write a freshly authenticated session for `identity` under `key`
    ///
    /// The caller is responsible for having verified the user's credentials.
    /// The write bypasses the throttle: a login is always persisted.
    pub async fn issue(
        &self,
        key: &SessionKey,
        identity: Identity,
    ) -> Result<SessionRecord, SessionError> {
        if identity.user_id.trim().is_empty() {
            return Err(SessionError::EmptyIdentity);
        }

        let now = self.clock.now();
        let record = SessionRecord {
            identity,
            authenticated: true,
            expires_at: now + self.config.session_duration,
            force_reauth_at: now + self.config.max_session_duration,
            last_persisted_at: now,
        };

        self.persist(key, &record).await?;
        info!("Issued session for user: {}", record.identity.user_id);
        Ok(record)
    }

    /// End the session bound to `key`
    ///
    /// Always writes, bypassing the throttle. Revoking a session that is
    /// already revoked or never existed succeeds.
    pub async fn revoke(&self, key: Option<&SessionKey>) -> Result<(), SessionError> {
        let Some(key) = key else {
            debug!("Revoke without a session key, nothing to do");
            return Ok(());
        };

        let record = SessionRecord {
            last_persisted_at: self.clock.now(),
            ..SessionRecord::default()
        };
        self.persist(key, &record).await?;
        info!("Revoked session");
        Ok(())
    }

    /// Read the session bound to `key` and apply both expiry clocks
    ///
    /// Never writes to the store.
    pub async fn read(&self, key: Option<&SessionKey>) -> Result<SessionRecord, SessionError> {
        let now = self.clock.now();
        Ok(self.load(key).await?.derive(now))
    }

    /// Read the session and extend its sliding expiry
    ///
    /// The renewal is only written when at least `min_write_interval` has
    /// passed since the last write; otherwise the derived record is returned
    /// unchanged. Unauthenticated sessions are never written.
    pub async fn read_and_renew(&self, key: Option<&SessionKey>) -> Result<Renewal, SessionError> {
        let now = self.clock.now();
        let record = self.load(key).await?.derive(now);

        let key = match key {
            Some(key) if record.authenticated => key,
            _ => {
                return Ok(Renewal {
                    record,
                    persisted: false,
                });
            }
        };

        if self.write_throttled(&record, now) {
            debug!(
                "Skipping session renewal for user {}, last write at {}",
                record.identity.user_id, record.last_persisted_at
            );
            return Ok(Renewal {
                record,
                persisted: false,
            });
        }

        let renewed = SessionRecord {
            expires_at: now + self.config.session_duration,
            last_persisted_at: now,
            ..record
        };
        self.persist(key, &renewed).await?;
        debug!(
            "Renewed session for user {} until {}",
            renewed.identity.user_id, renewed.expires_at
        );

        Ok(Renewal {
            record: renewed,
            persisted: true,
        })
    }

    fn write_throttled(&self, record: &SessionRecord, now: DateTime<Utc>) -> bool {
        now < record.last_persisted_at + self.config.min_write_interval
    }

    async fn load(&self, key: Option<&SessionKey>) -> Result<SessionRecord, SessionError> {
        let Some(key) = key else {
            return Ok(SessionRecord::default());
        };

        let raw = self.store.get(key.as_str()).await.map_err(|e| {
            error!("Failed to read session from store: {}", e);
            SessionError::StoreRead(e)
        })?;

        let Some(raw) = raw else {
            return Ok(SessionRecord::default());
        };

        match serde_json::from_slice(&raw) {
            Ok(record) => Ok(record),
            Err(e) => {
                warn!("Discarding undecodable session record: {}", e);
                Ok(SessionRecord::default())
            }
        }
    }

    async fn persist(&self, key: &SessionKey, record: &SessionRecord) -> Result<(), SessionError> {
        let raw = serde_json::to_vec(record)?;
        self.store.set(key.as_str(), &raw).await.map_err(|e| {
            error!("Failed to write session to store: {}", e);
            SessionError::StoreWrite(e)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::clock::ManualClock;
    use async_trait::async_trait;
    use chrono::TimeZone;
    use common::store::{MemoryStore, StoreResult};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tokio::sync::{Notify, oneshot};

    /// Memory store that counts writes
    #[derive(Default)]
    struct CountingStore {
        inner: MemoryStore,
        writes: AtomicUsize,
    }

    impl CountingStore {
        fn writes(&self) -> usize {
            self.writes.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl SessionStore for CountingStore {
        async fn get(&self, key: &str) -> StoreResult<Option<Vec<u8>>> {
            self.inner.get(key).await
        }

        async fn set(&self, key: &str, value: &[u8]) -> StoreResult<()> {
            self.writes.fetch_add(1, Ordering::SeqCst);
            self.inner.set(key, value).await
        }
    }

    /// Store whose every call fails
    struct BrokenStore;

    #[async_trait]
    impl SessionStore for BrokenStore {
        async fn get(&self, _key: &str) -> StoreResult<Option<Vec<u8>>> {
            Err(StoreError::Unavailable("connection refused".into()))
        }

        async fn set(&self, _key: &str, _value: &[u8]) -> StoreResult<()> {
            Err(StoreError::Unavailable("connection refused".into()))
        }
    }

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 3, 1, 8, 0, 0).unwrap()
    }

    fn setup() -> (SessionManager, Arc<CountingStore>, Arc<ManualClock>) {
        let store = Arc::new(CountingStore::default());
        let clock = Arc::new(ManualClock::new(t0()));
        let manager = SessionManager::with_clock(
            store.clone(),
            SessionConfig::default(),
            clock.clone(),
        );
        (manager, store, clock)
    }

    #[test]
    fn test_zero_durations_fall_back_to_defaults() {
        let manager = SessionManager::new(
            Arc::new(MemoryStore::new()),
            SessionConfig {
                session_duration: Duration::zero(),
                max_session_duration: Duration::seconds(-5),
                min_write_interval: Duration::zero(),
            },
        );
        assert_eq!(*manager.config(), SessionConfig::default());
    }

    #[tokio::test]
    async fn test_issue_sets_both_clocks() {
        let (manager, store, _) = setup();
        let key = SessionKey::generate();

        let record = manager.issue(&key, Identity::new("demo")).await.unwrap();
        assert!(record.authenticated);
        assert_eq!(record.expires_at, t0() + Duration::hours(1));
        assert_eq!(record.force_reauth_at, t0() + Duration::hours(24));
        assert_eq!(store.writes(), 1);

        let read = manager.read(Some(&key)).await.unwrap();
        assert_eq!(read, record);
    }

    #[tokio::test]
    async fn test_issue_rejects_empty_user() {
        let (manager, store, _) = setup();
        let err = manager
            .issue(&SessionKey::generate(), Identity::new("  "))
            .await
            .unwrap_err();
        assert!(matches!(err, SessionError::EmptyIdentity));
        assert_eq!(store.writes(), 0);
    }

    #[tokio::test]
    async fn test_issue_bypasses_throttle() {
        let (manager, store, clock) = setup();
        let key = SessionKey::generate();

        manager.issue(&key, Identity::new("demo")).await.unwrap();
        clock.advance(Duration::seconds(10));
        manager.issue(&key, Identity::new("admin")).await.unwrap();

        assert_eq!(store.writes(), 2);
        let read = manager.read(Some(&key)).await.unwrap();
        assert_eq!(read.identity.user_id, "admin");
    }

    #[tokio::test]
    async fn test_read_without_key_or_entry_is_anonymous() {
        let (manager, store, _) = setup();

        let record = manager.read(None).await.unwrap();
        assert_eq!(record, SessionRecord::default());

        let record = manager.read(Some(&SessionKey::generate())).await.unwrap();
        assert!(!record.authenticated);

        let renewal = manager.read_and_renew(None).await.unwrap();
        assert!(!renewal.persisted);
        assert_eq!(store.writes(), 0);
    }

    #[tokio::test]
    async fn test_read_never_writes_back_an_expired_record() {
        let (manager, store, clock) = setup();
        let key = SessionKey::generate();
        manager.issue(&key, Identity::new("demo")).await.unwrap();

        clock.advance(Duration::hours(2));
        let record = manager.read(Some(&key)).await.unwrap();
        assert!(!record.authenticated);
        assert_eq!(store.writes(), 1);

        let raw = store.inner.get(key.as_str()).await.unwrap().unwrap();
        let stored: SessionRecord = serde_json::from_slice(&raw).unwrap();
        assert!(stored.authenticated, "stored blob must be left untouched");
    }

    #[tokio::test]
    async fn test_renewal_never_moves_force_reauth() {
        let (manager, _, clock) = setup();
        let key = SessionKey::generate();
        manager.issue(&key, Identity::new("demo")).await.unwrap();

        // Renew every 30 minutes: well inside the 1h sliding window.
        let mut elapsed = Duration::zero();
        while elapsed + Duration::minutes(30) < Duration::hours(24) {
            clock.advance(Duration::minutes(30));
            elapsed += Duration::minutes(30);

            let renewal = manager.read_and_renew(Some(&key)).await.unwrap();
            assert!(renewal.record.authenticated, "lapsed after {elapsed}");
            assert_eq!(renewal.record.force_reauth_at, t0() + Duration::hours(24));
        }

        // Past the ceiling, activity no longer helps.
        clock.set(t0() + Duration::hours(24) + Duration::seconds(1));
        let renewal = manager.read_and_renew(Some(&key)).await.unwrap();
        assert!(!renewal.record.authenticated);
        assert!(!renewal.persisted);
        assert!(!manager.read(Some(&key)).await.unwrap().authenticated);
    }

    #[tokio::test]
    async fn test_read_past_force_reauth_is_unauthenticated() {
        let (manager, _, clock) = setup();
        let key = SessionKey::generate();
        manager.issue(&key, Identity::new("demo")).await.unwrap();

        clock.set(t0() + Duration::hours(23) + Duration::minutes(50));
        let renewal = manager.read_and_renew(Some(&key)).await.unwrap();
        assert!(renewal.persisted);
        assert!(renewal.record.expires_at > t0() + Duration::hours(24));

        clock.set(t0() + Duration::hours(25));
        let record = manager.read(Some(&key)).await.unwrap();
        assert!(!record.authenticated);
        assert_eq!(record.identity.user_id, "demo");
    }

    #[tokio::test]
    async fn test_revoke_is_idempotent() {
        let (manager, store, _) = setup();
        let key = SessionKey::generate();
        manager.issue(&key, Identity::new("demo")).await.unwrap();

        manager.revoke(Some(&key)).await.unwrap();
        let first = manager.read(Some(&key)).await.unwrap();

        manager.revoke(Some(&key)).await.unwrap();
        let second = manager.read(Some(&key)).await.unwrap();

        assert!(!first.authenticated);
        assert_eq!(first.authenticated, second.authenticated);
        assert_eq!(first.identity, second.identity);
        assert_eq!(store.writes(), 3);

        manager.revoke(None).await.unwrap();
        manager.revoke(Some(&SessionKey::generate())).await.unwrap();
    }

    #[tokio::test]
    async fn test_revoke_bypasses_throttle() {
        let (manager, _, clock) = setup();
        let key = SessionKey::generate();
        manager.issue(&key, Identity::new("demo")).await.unwrap();

        clock.advance(Duration::seconds(1));
        manager.revoke(Some(&key)).await.unwrap();
        assert!(!manager.read(Some(&key)).await.unwrap().authenticated);
    }

    #[tokio::test]
    async fn test_throttle_skips_writes_inside_the_window() {
        let (manager, store, clock) = setup();
        let key = SessionKey::generate();
        manager.issue(&key, Identity::new("demo")).await.unwrap();

        // First renewal, outside the window of the issue write.
        clock.advance(Duration::minutes(3));
        assert!(manager.read_and_renew(Some(&key)).await.unwrap().persisted);
        assert_eq!(store.writes(), 2);

        // Less than W later: skipped.
        clock.advance(Duration::minutes(1));
        let renewal = manager.read_and_renew(Some(&key)).await.unwrap();
        assert!(!renewal.persisted);
        assert!(renewal.record.authenticated);
        assert_eq!(store.writes(), 2);

        // More than W after the last write: persisted.
        clock.advance(Duration::minutes(2));
        assert!(manager.read_and_renew(Some(&key)).await.unwrap().persisted);
        assert_eq!(store.writes(), 3);
    }

    #[tokio::test]
    async fn test_renewal_thirty_minutes_in() {
        let (manager, _, clock) = setup();
        let key = SessionKey::generate();
        manager.issue(&key, Identity::new("demo")).await.unwrap();

        clock.set(t0() + Duration::minutes(30));
        let renewal = manager.read_and_renew(Some(&key)).await.unwrap();
        assert!(renewal.record.authenticated);
        assert!(renewal.persisted);
        assert_eq!(
            renewal.record.expires_at,
            t0() + Duration::hours(1) + Duration::minutes(30)
        );

        // Within the throttle window the previous expiry is kept.
        clock.set(t0() + Duration::minutes(31));
        let renewal = manager.read_and_renew(Some(&key)).await.unwrap();
        assert!(renewal.record.authenticated);
        assert!(!renewal.persisted);
        assert_eq!(
            renewal.record.expires_at,
            t0() + Duration::hours(1) + Duration::minutes(30)
        );
    }

    #[tokio::test]
    async fn test_throttled_renewal_can_lag_behind_activity() {
        let config = SessionConfig {
            session_duration: Duration::minutes(5),
            max_session_duration: Duration::hours(1),
            min_write_interval: Duration::minutes(4),
        };
        let clock = Arc::new(ManualClock::new(t0()));
        let manager =
            SessionManager::with_clock(Arc::new(MemoryStore::new()), config, clock.clone());
        let key = SessionKey::generate();
        manager.issue(&key, Identity::new("demo")).await.unwrap();

        // Activity at +3m is inside the write window, so the expiry stays at +5m.
        clock.advance(Duration::minutes(3));
        assert!(!manager.read_and_renew(Some(&key)).await.unwrap().persisted);

        clock.advance(Duration::minutes(2) + Duration::seconds(1));
        assert!(!manager.read(Some(&key)).await.unwrap().authenticated);
    }

    #[tokio::test]
    async fn test_store_failures_are_errors_not_anonymous() {
        let manager = SessionManager::new(Arc::new(BrokenStore), SessionConfig::default());
        let key = SessionKey::generate();

        assert!(matches!(
            manager.read(Some(&key)).await,
            Err(SessionError::StoreRead(_))
        ));
        assert!(matches!(
            manager.read_and_renew(Some(&key)).await,
            Err(SessionError::StoreRead(_))
        ));
        assert!(matches!(
            manager.issue(&key, Identity::new("demo")).await,
            Err(SessionError::StoreWrite(_))
        ));
        assert!(matches!(
            manager.revoke(Some(&key)).await,
            Err(SessionError::StoreWrite(_))
        ));

        // Without a key the store is never consulted.
        assert!(!manager.read(None).await.unwrap().authenticated);
    }

    #[tokio::test]
    async fn test_undecodable_blob_reads_as_anonymous() {
        let (manager, store, _) = setup();
        let key = SessionKey::generate();
        store.inner.set(key.as_str(), b"not json").await.unwrap();

        let record = manager.read(Some(&key)).await.unwrap();
        assert_eq!(record, SessionRecord::default());
    }

    /// Store that parks the first armed write until released
    #[derive(Default)]
    struct GatedStore {
        inner: MemoryStore,
        gate: std::sync::Mutex<Option<oneshot::Receiver<()>>>,
        parked: Notify,
    }

    #[async_trait]
    impl SessionStore for GatedStore {
        async fn get(&self, key: &str) -> StoreResult<Option<Vec<u8>>> {
            self.inner.get(key).await
        }

        async fn set(&self, key: &str, value: &[u8]) -> StoreResult<()> {
            let gate = self.gate.lock().unwrap().take();
            if let Some(gate) = gate {
                self.parked.notify_one();
                let _ = gate.await;
            }
            self.inner.set(key, value).await
        }
    }

    /// Renewal writes are last-write-wins. A renewal that read the session
    /// before a concurrent logout and writes after it brings the session
    /// back; the client has to log out again.
    #[tokio::test]
    async fn test_revoke_racing_a_renewal_can_resurrect_the_session() {
        let store = Arc::new(GatedStore::default());
        let clock = Arc::new(ManualClock::new(t0()));
        let manager =
            SessionManager::with_clock(store.clone(), SessionConfig::default(), clock.clone());
        let key = SessionKey::generate();
        manager.issue(&key, Identity::new("demo")).await.unwrap();
        clock.advance(Duration::minutes(5));

        let (release, gate) = oneshot::channel();
        *store.gate.lock().unwrap() = Some(gate);

        let renewing = {
            let manager = manager.clone();
            let key = key.clone();
            tokio::spawn(async move { manager.read_and_renew(Some(&key)).await })
        };
        store.parked.notified().await;

        manager.revoke(Some(&key)).await.unwrap();
        assert!(!manager.read(Some(&key)).await.unwrap().authenticated);

        release.send(()).unwrap();
        let renewal = renewing.await.unwrap().unwrap();
        assert!(renewal.persisted);

        assert!(
            manager.read(Some(&key)).await.unwrap().authenticated,
            "the late renewal wins"
        );

        manager.revoke(Some(&key)).await.unwrap();
        assert!(!manager.read(Some(&key)).await.unwrap().authenticated);
    }
}
