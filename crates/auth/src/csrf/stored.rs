use crate::error::Result;
use chrono::Utc;
use hms_crypto::{constant_time_eq_str, random_token_hex};
use hms_store::{CsrfRecord, CsrfTokenStore};
use std::sync::Arc;
use uuid::Uuid;

const TOKEN_BYTES: usize = 32;

/// Server-side stored-token strategy: one anti-forgery token per session,
/// persisted with its creation time. Expired entries are evicted lazily on
/// verify and periodically by the background sweep.
pub struct StoredTokenGuard {
    store: Arc<dyn CsrfTokenStore>,
    ttl_minutes: i64,
}

impl StoredTokenGuard {
    pub fn new(store: Arc<dyn CsrfTokenStore>, ttl_minutes: i64) -> Self {
        Self { store, ttl_minutes }
    }

    /// Issue (or replace) the token bound to a session.
    pub async fn issue(&self, session_id: Uuid) -> Result<String> {
        let token = random_token_hex(TOKEN_BYTES);
        self.store
            .put(
                session_id,
                CsrfRecord {
                    token: token.clone(),
                    created_at: Utc::now(),
                },
            )
            .await?;
        Ok(token)
    }

    /// Check existence, expiry, and constant-time equality. Expired
    /// records are deleted here rather than waiting for the sweep.
    pub async fn verify(&self, session_id: Uuid, supplied: &str) -> Result<bool> {
        let record = match self.store.get(session_id).await? {
            Some(r) => r,
            None => return Ok(false),
        };

        let age = Utc::now() - record.created_at;
        if age > chrono::Duration::minutes(self.ttl_minutes) {
            self.store.delete(session_id).await?;
            return Ok(false);
        }

        Ok(constant_time_eq_str(&record.token, supplied))
    }

    pub async fn invalidate(&self, session_id: Uuid) -> Result<()> {
        self.store.delete(session_id).await?;
        Ok(())
    }

    /// Periodic eviction pass; best-effort, verify rejects expired tokens
    /// regardless.
    pub async fn sweep(&self) -> Result<u64> {
        Ok(self.store.sweep_expired(self.ttl_minutes, Utc::now()).await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use hms_store::InMemoryCsrfStore;

    fn guard() -> StoredTokenGuard {
        StoredTokenGuard::new(Arc::new(InMemoryCsrfStore::new()), 60)
    }

    #[tokio::test]
    async fn test_issue_and_verify() {
        let guard = guard();
        let session_id = Uuid::new_v4();

        let token = guard.issue(session_id).await.unwrap();
        assert!(guard.verify(session_id, &token).await.unwrap());
        assert!(!guard.verify(Uuid::new_v4(), &token).await.unwrap());
    }

    #[tokio::test]
    async fn test_any_single_character_difference_fails() {
        let guard = guard();
        let session_id = Uuid::new_v4();
        let token = guard.issue(session_id).await.unwrap();

        for i in 0..token.len() {
            let mut tampered: Vec<u8> = token.as_bytes().to_vec();
            tampered[i] = if tampered[i] == b'0' { b'1' } else { b'0' };
            let tampered = String::from_utf8(tampered).unwrap();
            assert!(!guard.verify(session_id, &tampered).await.unwrap());
        }
    }

    #[tokio::test]
    async fn test_expired_token_rejected_and_evicted() {
        let store = Arc::new(InMemoryCsrfStore::new());
        let guard = StoredTokenGuard::new(store.clone(), 60);
        let session_id = Uuid::new_v4();

        store
            .put(
                session_id,
                CsrfRecord {
                    token: "f".repeat(64),
                    created_at: Utc::now() - chrono::Duration::minutes(61),
                },
            )
            .await
            .unwrap();

        assert!(!guard.verify(session_id, &"f".repeat(64)).await.unwrap());
        // Lazy eviction removed the record
        assert!(store.get(session_id).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_reissue_replaces_token() {
        let guard = guard();
        let session_id = Uuid::new_v4();

        let first = guard.issue(session_id).await.unwrap();
        let second = guard.issue(session_id).await.unwrap();
        assert_ne!(first, second);
        assert!(!guard.verify(session_id, &first).await.unwrap());
        assert!(guard.verify(session_id, &second).await.unwrap());
    }
}
