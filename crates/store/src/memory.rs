//! In-memory backends: a `RwLock<HashMap>` per store. Used in tests and
//! single-process deployments; the Redis backends are the production swap.

use crate::error::Result;
use crate::{CsrfRecord, CsrfTokenStore, RotationOutcome, SecondFactorStore, SessionStore};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use hms_models::{SecondFactorProfile, Session};
use std::collections::HashMap;
use tokio::sync::RwLock;
use uuid::Uuid;

#[derive(Default)]
pub struct InMemorySessionStore {
    sessions: RwLock<HashMap<Uuid, Session>>,
}

impl InMemorySessionStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl SessionStore for InMemorySessionStore {
    async fn insert(&self, session: Session, max_per_user: usize) -> Result<Vec<Session>> {
        let mut sessions = self.sessions.write().await;

        let mut active: Vec<&Session> = sessions
            .values()
            .filter(|s| s.user_id == session.user_id && !s.revoked)
            .collect();
        active.sort_by_key(|s| (s.last_activity_at, s.created_at));

        // Room for the incoming session: evict least-recently-active first
        let overflow = (active.len() + 1).saturating_sub(max_per_user);
        let evict_ids: Vec<Uuid> = active
            .iter()
            .take(overflow)
            .map(|s| s.session_id)
            .collect();

        let mut evicted = Vec::with_capacity(evict_ids.len());
        for id in evict_ids {
            if let Some(old) = sessions.remove(&id) {
                evicted.push(old);
            }
        }

        sessions.insert(session.session_id, session);
        Ok(evicted)
    }

    async fn get(&self, session_id: Uuid) -> Result<Option<Session>> {
        Ok(self.sessions.read().await.get(&session_id).cloned())
    }

    async fn list_for_user(&self, user_id: Uuid) -> Result<Vec<Session>> {
        let sessions = self.sessions.read().await;
        let mut active: Vec<Session> = sessions
            .values()
            .filter(|s| s.user_id == user_id && !s.revoked)
            .cloned()
            .collect();
        active.sort_by_key(|s| std::cmp::Reverse(s.last_activity_at));
        Ok(active)
    }

    async fn touch(&self, session_id: Uuid, at: DateTime<Utc>) -> Result<()> {
        if let Some(session) = self.sessions.write().await.get_mut(&session_id) {
            session.last_activity_at = at;
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
        let mut sessions = self.sessions.write().await;

        let session = match sessions.get_mut(&session_id) {
            Some(s) => s,
            None => return Ok(RotationOutcome::Missing),
        };

        if session.revoked {
            return Ok(RotationOutcome::Revoked);
        }
        if session.refresh_jti != expected_jti {
            return Ok(RotationOutcome::Replayed);
        }

        session.refresh_jti = next_jti.to_string();
        session.last_activity_at = at;
        Ok(RotationOutcome::Rotated(session.clone()))
    }

    async fn revoke(&self, session_id: Uuid) -> Result<bool> {
        let mut sessions = self.sessions.write().await;
        match sessions.get_mut(&session_id) {
            Some(session) => {
                session.revoked = true;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn revoke_all_for_user(&self, user_id: Uuid) -> Result<u64> {
        let mut sessions = self.sessions.write().await;
        let mut count = 0;
        for session in sessions.values_mut() {
            if session.user_id == user_id && !session.revoked {
                session.revoked = true;
                count += 1;
            }
        }
        Ok(count)
    }

    async fn delete(&self, session_id: Uuid) -> Result<()> {
        self.sessions.write().await.remove(&session_id);
        Ok(())
    }

    async fn sweep_inactive(
        &self,
        timeout_minutes: i64,
        now: DateTime<Utc>,
    ) -> Result<Vec<Session>> {
        let mut sessions = self.sessions.write().await;

        let timed_out: Vec<Uuid> = sessions
            .values()
            .filter(|s| !s.revoked && s.is_inactive(timeout_minutes, now))
            .map(|s| s.session_id)
            .collect();

        let mut removed = Vec::with_capacity(timed_out.len());
        for id in timed_out {
            if let Some(session) = sessions.remove(&id) {
                removed.push(session);
            }
        }

        // Revoked leftovers are no longer addressable; drop them too
        sessions.retain(|_, s| !s.revoked);

        Ok(removed)
    }
}

#[derive(Default)]
pub struct InMemoryCsrfStore {
    records: RwLock<HashMap<Uuid, CsrfRecord>>,
}

impl InMemoryCsrfStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl CsrfTokenStore for InMemoryCsrfStore {
    async fn put(&self, session_id: Uuid, record: CsrfRecord) -> Result<()> {
        self.records.write().await.insert(session_id, record);
        Ok(())
    }

    async fn get(&self, session_id: Uuid) -> Result<Option<CsrfRecord>> {
        Ok(self.records.read().await.get(&session_id).cloned())
    }

    async fn delete(&self, session_id: Uuid) -> Result<()> {
        self.records.write().await.remove(&session_id);
        Ok(())
    }

    async fn sweep_expired(&self, max_age_minutes: i64, now: DateTime<Utc>) -> Result<u64> {
        let cutoff = now - chrono::Duration::minutes(max_age_minutes);
        let mut records = self.records.write().await;
        let before = records.len();
        records.retain(|_, r| r.created_at > cutoff);
        Ok((before - records.len()) as u64)
    }
}

#[derive(Default)]
pub struct InMemorySecondFactorStore {
    profiles: RwLock<HashMap<Uuid, SecondFactorProfile>>,
}

impl InMemorySecondFactorStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl SecondFactorStore for InMemorySecondFactorStore {
    async fn get(&self, user_id: Uuid) -> Result<Option<SecondFactorProfile>> {
        Ok(self.profiles.read().await.get(&user_id).cloned())
    }

    async fn put(&self, profile: SecondFactorProfile) -> Result<()> {
        self.profiles.write().await.insert(profile.user_id, profile);
        Ok(())
    }

    async fn delete(&self, user_id: Uuid) -> Result<()> {
        self.profiles.write().await.remove(&user_id);
        Ok(())
    }

    async fn consume_backup_code(
        &self,
        user_id: Uuid,
        matches: &(dyn for<'a> Fn(&'a str) -> bool + Sync),
    ) -> Result<bool> {
        // The write lock spans the hash checks so two concurrent attempts
        // cannot both consume the same code.
        let mut profiles = self.profiles.write().await;

        let profile = match profiles.get_mut(&user_id) {
            Some(p) => p,
            None => return Ok(false),
        };

        let position = profile
            .backup_code_hashes
            .iter()
            .position(|hash| matches(hash));

        match position {
            Some(index) => {
                profile.backup_code_hashes.remove(index);
                profile.updated_at = Utc::now();
                Ok(true)
            }
            None => Ok(false),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use hms_models::NewSession;

    fn new_session(user_id: Uuid, now: DateTime<Utc>) -> Session {
        NewSession {
            user_id,
            tenant_id: Uuid::new_v4(),
            branch_id: Uuid::new_v4(),
            username: "jdoe".to_string(),
            role_ids: vec![],
            refresh_jti: Uuid::new_v4().to_string(),
            ip_address: None,
            user_agent: None,
        }
        .into_session(now)
    }

    #[tokio::test]
    async fn test_cap_evicts_least_recently_active() {
        let store = InMemorySessionStore::new();
        let user_id = Uuid::new_v4();
        let now = Utc::now();

        let mut first = new_session(user_id, now);
        first.last_activity_at = now - chrono::Duration::minutes(10);
        let second = new_session(user_id, now - chrono::Duration::minutes(5));
        let third = new_session(user_id, now);
        let stale_id = first.session_id;

        assert!(store.insert(first, 3).await.unwrap().is_empty());
        assert!(store.insert(second, 3).await.unwrap().is_empty());
        assert!(store.insert(third, 3).await.unwrap().is_empty());

        let fourth = new_session(user_id, now);
        let evicted = store.insert(fourth, 3).await.unwrap();
        assert_eq!(evicted.len(), 1);
        assert_eq!(evicted[0].session_id, stale_id);

        let remaining = store.list_for_user(user_id).await.unwrap();
        assert_eq!(remaining.len(), 3);
        assert!(remaining.iter().all(|s| s.session_id != stale_id));
    }

    #[tokio::test]
    async fn test_rotation_is_single_use() {
        let store = InMemorySessionStore::new();
        let now = Utc::now();
        let session = new_session(Uuid::new_v4(), now);
        let session_id = session.session_id;
        let old_jti = session.refresh_jti.clone();

        store.insert(session, 3).await.unwrap();

        let outcome = store
            .rotate_refresh_jti(session_id, &old_jti, "next", now)
            .await
            .unwrap();
        assert!(matches!(outcome, RotationOutcome::Rotated(_)));

        let outcome = store
            .rotate_refresh_jti(session_id, &old_jti, "other", now)
            .await
            .unwrap();
        assert!(matches!(outcome, RotationOutcome::Replayed));
    }

    #[tokio::test]
    async fn test_revoked_sessions_leave_listing() {
        let store = InMemorySessionStore::new();
        let user_id = Uuid::new_v4();
        let now = Utc::now();
        let session = new_session(user_id, now);
        let session_id = session.session_id;

        store.insert(session, 3).await.unwrap();
        store.insert(new_session(user_id, now), 3).await.unwrap();

        assert!(store.revoke(session_id).await.unwrap());
        let listed = store.list_for_user(user_id).await.unwrap();
        assert_eq!(listed.len(), 1);

        let outcome = store
            .rotate_refresh_jti(session_id, "anything", "next", now)
            .await
            .unwrap();
        assert!(matches!(outcome, RotationOutcome::Revoked));
    }

    #[tokio::test]
    async fn test_inactivity_sweep() {
        let store = InMemorySessionStore::new();
        let user_id = Uuid::new_v4();
        let now = Utc::now();

        let mut idle = new_session(user_id, now);
        idle.last_activity_at = now - chrono::Duration::minutes(45);
        let idle_id = idle.session_id;
        let fresh = new_session(user_id, now);

        store.insert(idle, 3).await.unwrap();
        store.insert(fresh, 3).await.unwrap();

        let removed = store.sweep_inactive(30, now).await.unwrap();
        assert_eq!(removed.len(), 1);
        assert_eq!(removed[0].session_id, idle_id);
        assert!(store.get(idle_id).await.unwrap().is_none());
        assert_eq!(store.list_for_user(user_id).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_csrf_sweep() {
        let store = InMemoryCsrfStore::new();
        let now = Utc::now();

        let fresh = Uuid::new_v4();
        let stale = Uuid::new_v4();
        store
            .put(
                fresh,
                CsrfRecord {
                    token: "a".repeat(64),
                    created_at: now,
                },
            )
            .await
            .unwrap();
        store
            .put(
                stale,
                CsrfRecord {
                    token: "b".repeat(64),
                    created_at: now - chrono::Duration::minutes(90),
                },
            )
            .await
            .unwrap();

        let removed = store.sweep_expired(60, now).await.unwrap();
        assert_eq!(removed, 1);
        assert!(store.get(stale).await.unwrap().is_none());
        assert!(store.get(fresh).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_backup_code_consumed_once() {
        let store = InMemorySecondFactorStore::new();
        let user_id = Uuid::new_v4();

        let mut profile = SecondFactorProfile::new(user_id);
        profile.backup_code_hashes = vec!["h1".to_string(), "h2".to_string()];
        store.put(profile).await.unwrap();

        let matcher = |hash: &str| hash == "h2";
        assert!(store.consume_backup_code(user_id, &matcher).await.unwrap());
        assert!(!store.consume_backup_code(user_id, &matcher).await.unwrap());

        let profile = store.get(user_id).await.unwrap().unwrap();
        assert_eq!(profile.backup_code_hashes, vec!["h1".to_string()]);
    }

    #[tokio::test]
    async fn test_backup_code_matcher_may_capture_locals() {
        let store = InMemorySecondFactorStore::new();
        let user_id = Uuid::new_v4();

        let mut profile = SecondFactorProfile::new(user_id);
        profile.backup_code_hashes = vec!["h1".to_string()];
        store.put(profile).await.unwrap();

        // The real verifier closes over the presented code, so the
        // matcher borrows each stored hash independently of the closure.
        let presented = String::from("h1");
        assert!(store
            .consume_backup_code(user_id, &|hash| hash == presented)
            .await
            .unwrap());
        assert!(store
            .get(user_id)
            .await
            .unwrap()
            .unwrap()
            .backup_code_hashes
            .is_empty());
    }
}
