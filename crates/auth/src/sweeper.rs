use crate::csrf::StoredTokenGuard;
use chrono::Utc;
use hms_models::{AuditSink, SecurityEvent, SecurityEventKind, SecurityOutcome};
use hms_store::SessionStore;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;

/// Periodically evict expired stored CSRF tokens. Verification rejects
/// expired tokens on its own; this just bounds store growth.
pub fn start_csrf_sweep(guard: Arc<StoredTokenGuard>, interval_secs: u64) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(Duration::from_secs(interval_secs));
        loop {
            interval.tick().await;
            match guard.sweep().await {
                Ok(0) => {}
                Ok(removed) => {
                    tracing::debug!(removed, "evicted expired CSRF tokens");
                }
                Err(e) => {
                    tracing::warn!(error = %e, "CSRF token sweep failed");
                }
            }
        }
    })
}

/// Periodically drop sessions idle past the inactivity timeout, reporting
/// each removal as a security event. The verification path rejects
/// inactive sessions synchronously; the sweep reclaims their storage.
pub fn start_inactivity_sweep(
    sessions: Arc<dyn SessionStore>,
    audit: Arc<dyn AuditSink>,
    timeout_minutes: i64,
    interval_secs: u64,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(Duration::from_secs(interval_secs));
        loop {
            interval.tick().await;
            match sessions.sweep_inactive(timeout_minutes, Utc::now()).await {
                Ok(removed) => {
                    for session in removed {
                        audit.record(
                            SecurityEvent::builder(
                                SecurityEventKind::SessionInactivityTimeout,
                                SecurityOutcome::Failure,
                            )
                            .tenant(session.tenant_id)
                            .user(session.user_id)
                            .session(session.session_id)
                            .build(),
                        );
                    }
                }
                Err(e) => {
                    tracing::warn!(error = %e, "session inactivity sweep failed");
                }
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use hms_models::{NewSession, TracingAuditSink};
    use hms_store::{InMemoryCsrfStore, InMemorySessionStore};
    use uuid::Uuid;

    #[tokio::test]
    async fn test_inactivity_sweep_removes_idle_sessions() {
        let store = Arc::new(InMemorySessionStore::new());
        let mut session = NewSession {
            user_id: Uuid::new_v4(),
            tenant_id: Uuid::new_v4(),
            branch_id: Uuid::new_v4(),
            username: "nward".to_string(),
            role_ids: vec![],
            refresh_jti: Uuid::new_v4().to_string(),
            ip_address: None,
            user_agent: None,
        }
        .into_session(Utc::now());
        session.last_activity_at = Utc::now() - chrono::Duration::minutes(45);
        let session_id = session.session_id;
        store.insert(session, 3).await.unwrap();

        let handle = start_inactivity_sweep(
            store.clone(),
            Arc::new(TracingAuditSink),
            30,
            1,
        );

        // First tick fires immediately
        tokio::time::sleep(Duration::from_millis(100)).await;
        handle.abort();

        assert!(store.get(session_id).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_csrf_sweep_runs() {
        let guard = Arc::new(StoredTokenGuard::new(
            Arc::new(InMemoryCsrfStore::new()),
            60,
        ));
        let handle = start_csrf_sweep(guard, 1);
        tokio::time::sleep(Duration::from_millis(100)).await;
        handle.abort();
    }
}
