//! Redis-backed stores for multi-instance deployments.
//!
//! Sessions are JSON values with a per-user index set. The refresh chain
//! marker lives in its own small key so rotation can be a server-side
//! compare-and-swap: of two racing refreshes, exactly one wins.

use crate::error::Result;
use crate::{CsrfRecord, CsrfTokenStore, RotationOutcome, SecondFactorStore, SessionStore};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use hms_models::{SecondFactorProfile, Session};
use redis::{aio::ConnectionManager, AsyncCommands, Client, Script};
use uuid::Uuid;

#[derive(Debug, Clone)]
pub struct RedisConfig {
    pub url: String,
}

impl Default for RedisConfig {
    fn default() -> Self {
        Self {
            url: "redis://localhost:6379".to_string(),
        }
    }
}

impl RedisConfig {
    pub fn from_env() -> Self {
        Self {
            url: std::env::var("REDIS_URL").unwrap_or_else(|_| Self::default().url),
        }
    }

    pub async fn connect(&self) -> Result<ConnectionManager> {
        let client = Client::open(self.url.clone())?;
        Ok(ConnectionManager::new(client).await?)
    }
}

fn session_key(session_id: Uuid) -> String {
    format!("session:{}", session_id)
}

fn session_jti_key(session_id: Uuid) -> String {
    format!("session_jti:{}", session_id)
}

fn user_sessions_key(user_id: Uuid) -> String {
    format!("user_sessions:{}", user_id)
}

fn csrf_key(session_id: Uuid) -> String {
    format!("csrf:{}", session_id)
}

fn second_factor_key(user_id: Uuid) -> String {
    format!("second_factor:{}", user_id)
}

fn backup_codes_key(user_id: Uuid) -> String {
    format!("second_factor_codes:{}", user_id)
}

/// CAS on the refresh chain marker: 1 = swapped, -1 = value mismatch
/// (already consumed), 0 = key gone.
const ROTATE_JTI_SCRIPT: &str = r#"
local current = redis.call('GET', KEYS[1])
if not current then
  return 0
end
if current ~= ARGV[1] then
  return -1
end
redis.call('SET', KEYS[1], ARGV[2], 'KEEPTTL')
return 1
"#;

pub struct RedisSessionStore {
    conn: ConnectionManager,
    rotate_script: Script,
    /// Hard upper bound on session record lifetime (refresh TTL).
    ttl_seconds: u64,
}

impl RedisSessionStore {
    pub fn new(conn: ConnectionManager, ttl_seconds: u64) -> Self {
        Self {
            conn,
            rotate_script: Script::new(ROTATE_JTI_SCRIPT),
            ttl_seconds,
        }
    }

    async fn write_session(&self, session: &Session, keep_ttl: bool) -> Result<()> {
        let mut conn = self.conn.clone();
        let payload = serde_json::to_string(session)?;
        if keep_ttl {
            redis::cmd("SET")
                .arg(session_key(session.session_id))
                .arg(payload)
                .arg("KEEPTTL")
                .query_async::<()>(&mut conn)
                .await?;
        } else {
            conn.set_ex::<_, _, ()>(session_key(session.session_id), payload, self.ttl_seconds)
                .await?;
        }
        Ok(())
    }

    async fn read_session(&self, session_id: Uuid) -> Result<Option<Session>> {
        let mut conn = self.conn.clone();
        let raw: Option<String> = conn.get(session_key(session_id)).await?;
        match raw {
            Some(json) => Ok(Some(serde_json::from_str(&json)?)),
            None => Ok(None),
        }
    }
}

#[async_trait]
impl SessionStore for RedisSessionStore {
    async fn insert(&self, session: Session, max_per_user: usize) -> Result<Vec<Session>> {
        let mut conn = self.conn.clone();

        self.write_session(&session, false).await?;
        conn.set_ex::<_, _, ()>(
            session_jti_key(session.session_id),
            session.refresh_jti.clone(),
            self.ttl_seconds,
        )
        .await?;
        conn.sadd::<_, _, ()>(user_sessions_key(session.user_id), session.session_id.to_string())
            .await?;

        // Cap enforcement is read-sort-delete here; the in-memory backend
        // does it under one lock. A brief overshoot across instances is
        // tolerated, the sweep converges it.
        let mut active = self.list_for_user(session.user_id).await?;
        active.sort_by_key(|s| (s.last_activity_at, s.created_at));

        let overflow = active.len().saturating_sub(max_per_user);
        let mut evicted = Vec::with_capacity(overflow);
        for stale in active
            .into_iter()
            .filter(|s| s.session_id != session.session_id)
            .take(overflow)
        {
            self.delete(stale.session_id).await?;
            conn.srem::<_, _, ()>(
                user_sessions_key(stale.user_id),
                stale.session_id.to_string(),
            )
            .await?;
            evicted.push(stale);
        }

        Ok(evicted)
    }

    async fn get(&self, session_id: Uuid) -> Result<Option<Session>> {
        self.read_session(session_id).await
    }

    async fn list_for_user(&self, user_id: Uuid) -> Result<Vec<Session>> {
        let mut conn = self.conn.clone();
        let ids: Vec<String> = conn.smembers(user_sessions_key(user_id)).await?;

        let mut sessions = Vec::with_capacity(ids.len());
        for id in ids {
            let session_id = match id.parse::<Uuid>() {
                Ok(parsed) => parsed,
                Err(_) => continue,
            };
            match self.read_session(session_id).await? {
                Some(session) if !session.revoked => sessions.push(session),
                Some(_) => {}
                None => {
                    // Expired record, drop the dangling index entry
                    conn.srem::<_, _, ()>(user_sessions_key(user_id), id).await?;
                }
            }
        }

        sessions.sort_by_key(|s| std::cmp::Reverse(s.last_activity_at));
        Ok(sessions)
    }

    async fn touch(&self, session_id: Uuid, at: DateTime<Utc>) -> Result<()> {
        if let Some(mut session) = self.read_session(session_id).await? {
            session.last_activity_at = at;
            self.write_session(&session, true).await?;
        }
        Ok(())
    }

    async fn rotate_refresh_jti(
        &self,
        session_id: Uuid,
        expected_jti: &str,
        next_jti: &str,
        at: DateTime<Utc>,
    ) -> Result<RotationOutcome> {
        let mut session = match self.read_session(session_id).await? {
            Some(s) => s,
            None => return Ok(RotationOutcome::Missing),
        };
        if session.revoked {
            return Ok(RotationOutcome::Revoked);
        }

        let mut conn = self.conn.clone();
        let swapped: i64 = self
            .rotate_script
            .key(session_jti_key(session_id))
            .arg(expected_jti)
            .arg(next_jti)
            .invoke_async(&mut conn)
            .await?;

        match swapped {
            1 => {
                session.refresh_jti = next_jti.to_string();
                session.last_activity_at = at;
                self.write_session(&session, true).await?;
                Ok(RotationOutcome::Rotated(session))
            }
            -1 => Ok(RotationOutcome::Replayed),
            _ => Ok(RotationOutcome::Missing),
        }
    }

    async fn revoke(&self, session_id: Uuid) -> Result<bool> {
        match self.read_session(session_id).await? {
            Some(mut session) => {
                session.revoked = true;
                self.write_session(&session, true).await?;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn revoke_all_for_user(&self, user_id: Uuid) -> Result<u64> {
        let sessions = self.list_for_user(user_id).await?;
        let mut count = 0;
        for session in sessions {
            if self.revoke(session.session_id).await? {
                count += 1;
            }
        }
        Ok(count)
    }

    async fn delete(&self, session_id: Uuid) -> Result<()> {
        let mut conn = self.conn.clone();
        conn.del::<_, ()>(session_key(session_id)).await?;
        conn.del::<_, ()>(session_jti_key(session_id)).await?;
        Ok(())
    }

    async fn sweep_inactive(
        &self,
        timeout_minutes: i64,
        now: DateTime<Utc>,
    ) -> Result<Vec<Session>> {
        let mut conn = self.conn.clone();
        let keys: Vec<String> = conn.keys("session:*").await?;

        let mut removed = Vec::new();
        for key in keys {
            let raw: Option<String> = conn.get(&key).await?;
            let session: Session = match raw.map(|j| serde_json::from_str(&j)) {
                Some(Ok(s)) => s,
                _ => continue,
            };

            if session.revoked || session.is_inactive(timeout_minutes, now) {
                self.delete(session.session_id).await?;
                conn.srem::<_, _, ()>(
                    user_sessions_key(session.user_id),
                    session.session_id.to_string(),
                )
                .await?;
                if !session.revoked {
                    removed.push(session);
                }
            }
        }

        Ok(removed)
    }
}

pub struct RedisCsrfStore {
    conn: ConnectionManager,
    ttl_seconds: u64,
}

impl RedisCsrfStore {
    pub fn new(conn: ConnectionManager, ttl_seconds: u64) -> Self {
        Self { conn, ttl_seconds }
    }
}

#[async_trait]
impl CsrfTokenStore for RedisCsrfStore {
    async fn put(&self, session_id: Uuid, record: CsrfRecord) -> Result<()> {
        let mut conn = self.conn.clone();
        let payload = serde_json::to_string(&record)?;
        conn.set_ex::<_, _, ()>(csrf_key(session_id), payload, self.ttl_seconds)
            .await?;
        Ok(())
    }

    async fn get(&self, session_id: Uuid) -> Result<Option<CsrfRecord>> {
        let mut conn = self.conn.clone();
        let raw: Option<String> = conn.get(csrf_key(session_id)).await?;
        match raw {
            Some(json) => Ok(Some(serde_json::from_str(&json)?)),
            None => Ok(None),
        }
    }

    async fn delete(&self, session_id: Uuid) -> Result<()> {
        let mut conn = self.conn.clone();
        conn.del::<_, ()>(csrf_key(session_id)).await?;
        Ok(())
    }

    async fn sweep_expired(&self, _max_age_minutes: i64, _now: DateTime<Utc>) -> Result<u64> {
        // Redis TTLs expire these keys on their own
        Ok(0)
    }
}

pub struct RedisSecondFactorStore {
    conn: ConnectionManager,
}

impl RedisSecondFactorStore {
    pub fn new(conn: ConnectionManager) -> Self {
        Self { conn }
    }
}

#[async_trait]
impl SecondFactorStore for RedisSecondFactorStore {
    async fn get(&self, user_id: Uuid) -> Result<Option<SecondFactorProfile>> {
        let mut conn = self.conn.clone();
        let raw: Option<String> = conn.get(second_factor_key(user_id)).await?;

        let mut profile: SecondFactorProfile = match raw {
            Some(json) => serde_json::from_str(&json)?,
            None => return Ok(None),
        };

        // Backup code hashes live in their own set so consumption can be a
        // single atomic SREM
        profile.backup_code_hashes = conn.smembers(backup_codes_key(user_id)).await?;
        Ok(Some(profile))
    }

    async fn put(&self, profile: SecondFactorProfile) -> Result<()> {
        let mut conn = self.conn.clone();
        let user_id = profile.user_id;

        let mut stored = profile.clone();
        let hashes = std::mem::take(&mut stored.backup_code_hashes);
        let payload = serde_json::to_string(&stored)?;

        conn.set::<_, _, ()>(second_factor_key(user_id), payload).await?;
        conn.del::<_, ()>(backup_codes_key(user_id)).await?;
        if !hashes.is_empty() {
            conn.sadd::<_, _, ()>(backup_codes_key(user_id), hashes).await?;
        }
        Ok(())
    }

    async fn delete(&self, user_id: Uuid) -> Result<()> {
        let mut conn = self.conn.clone();
        conn.del::<_, ()>(second_factor_key(user_id)).await?;
        conn.del::<_, ()>(backup_codes_key(user_id)).await?;
        Ok(())
    }

    async fn consume_backup_code(
        &self,
        user_id: Uuid,
        matches: &(dyn for<'a> Fn(&'a str) -> bool + Sync),
    ) -> Result<bool> {
        let mut conn = self.conn.clone();
        let hashes: Vec<String> = conn.smembers(backup_codes_key(user_id)).await?;

        for hash in hashes {
            if matches(&hash) {
                // SREM returns 0 if another verifier consumed it first
                let removed: i64 = conn.srem(backup_codes_key(user_id), &hash).await?;
                return Ok(removed == 1);
            }
        }

        Ok(false)
    }
}
