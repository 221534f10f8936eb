//! Pluggable key-value backends for the security core.
//!
//! The protocol logic never assumes a single process: the same traits run
//! against an in-memory map in tests and a shared Redis cache in
//! production. Expiry is enforced synchronously on the read paths; the
//! sweep methods are best-effort cleanup behind them.

pub mod error;
pub mod memory;
pub mod redis_store;

pub use error::{Result, StoreError};
pub use memory::{InMemoryCsrfStore, InMemorySecondFactorStore, InMemorySessionStore};
pub use redis_store::{RedisConfig, RedisCsrfStore, RedisSecondFactorStore, RedisSessionStore};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use hms_models::{SecondFactorProfile, Session};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Outcome of a refresh-token rotation attempt. Exactly one of two racing
/// rotations for the same token may observe `Rotated`.
#[derive(Debug, Clone)]
pub enum RotationOutcome {
    /// The chain marker matched and was swapped; the updated session.
    Rotated(Session),
    /// The presented jti was already consumed by an earlier rotation.
    Replayed,
    /// The session exists but has been revoked.
    Revoked,
    /// No such session.
    Missing,
}

/// Keyed record of active sessions per user/device.
#[async_trait]
pub trait SessionStore: Send + Sync + 'static {
    /// Insert a session, evicting least-recently-active sessions beyond
    /// `max_per_user`. Returns the evicted sessions.
    async fn insert(&self, session: Session, max_per_user: usize) -> Result<Vec<Session>>;

    async fn get(&self, session_id: Uuid) -> Result<Option<Session>>;

    /// Active (non-revoked) sessions for a user.
    async fn list_for_user(&self, user_id: Uuid) -> Result<Vec<Session>>;

    /// Update `last_activity_at`.
    async fn touch(&self, session_id: Uuid, at: DateTime<Utc>) -> Result<()>;

    /// Compare-and-swap the session's refresh chain marker. Succeeds only
    /// if the session is active and its current jti equals `expected_jti`.
    async fn rotate_refresh_jti(
        &self,
        session_id: Uuid,
        expected_jti: &str,
        next_jti: &str,
        at: DateTime<Utc>,
    ) -> Result<RotationOutcome>;

    /// Mark a session revoked. Returns false if it did not exist.
    async fn revoke(&self, session_id: Uuid) -> Result<bool>;

    /// Revoke every session of a user. Returns how many were revoked.
    async fn revoke_all_for_user(&self, user_id: Uuid) -> Result<u64>;

    async fn delete(&self, session_id: Uuid) -> Result<()>;

    /// Drop sessions idle past `timeout_minutes` (and revoked leftovers).
    /// Returns the inactive sessions removed, for audit reporting.
    async fn sweep_inactive(
        &self,
        timeout_minutes: i64,
        now: DateTime<Utc>,
    ) -> Result<Vec<Session>>;
}

/// Anti-forgery token bound to a session, with creation timestamp.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CsrfRecord {
    pub token: String,
    pub created_at: DateTime<Utc>,
}

#[async_trait]
pub trait CsrfTokenStore: Send + Sync + 'static {
    async fn put(&self, session_id: Uuid, record: CsrfRecord) -> Result<()>;
    async fn get(&self, session_id: Uuid) -> Result<Option<CsrfRecord>>;
    async fn delete(&self, session_id: Uuid) -> Result<()>;

    /// Remove records older than `max_age_minutes`. Returns how many.
    async fn sweep_expired(&self, max_age_minutes: i64, now: DateTime<Utc>) -> Result<u64>;
}

/// Per-user second-factor enrollment state.
#[async_trait]
pub trait SecondFactorStore: Send + Sync + 'static {
    async fn get(&self, user_id: Uuid) -> Result<Option<SecondFactorProfile>>;
    async fn put(&self, profile: SecondFactorProfile) -> Result<()>;
    async fn delete(&self, user_id: Uuid) -> Result<()>;

    /// Atomically consume the backup code matched by `matches`. The
    /// callback receives each stored hash; at most one matching code is
    /// removed. Returns true when a code was consumed.
    async fn consume_backup_code(
        &self,
        user_id: Uuid,
        matches: &(dyn for<'a> Fn(&'a str) -> bool + Sync),
    ) -> Result<bool>;
}
