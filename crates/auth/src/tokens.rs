use crate::error::{AuthError, Result};
use crate::jwt::{hash_token, JwtService};
use chrono::Utc;
use hms_models::{
    AuditSink, NewSession, SecurityEvent, SecurityEventKind, SecurityOutcome, Session,
    SessionSummary,
};
use hms_store::{RotationOutcome, SessionStore};
use std::sync::Arc;
use uuid::Uuid;

/// Identity attributes for a session being opened, as established by the
/// credential verifier (and, where enabled, the second factor).
#[derive(Debug, Clone)]
pub struct IssueRequest {
    pub user_id: Uuid,
    pub tenant_id: Uuid,
    pub branch_id: Uuid,
    pub username: String,
    pub role_ids: Vec<Uuid>,
    pub ip_address: Option<String>,
    pub user_agent: Option<String>,
}

#[derive(Debug, Clone)]
pub struct IssuedTokens {
    pub access_token: String,
    pub refresh_token: String,
    pub session_id: Uuid,
}

/// Issues, verifies and rotates signed access/refresh token pairs, backed
/// by the session store for revocation and the concurrency cap.
pub struct TokenService {
    jwt: JwtService,
    sessions: Arc<dyn SessionStore>,
    audit: Arc<dyn AuditSink>,
    max_concurrent_sessions: usize,
    inactivity_timeout_minutes: i64,
}

impl TokenService {
    pub fn new(
        jwt: JwtService,
        sessions: Arc<dyn SessionStore>,
        audit: Arc<dyn AuditSink>,
        max_concurrent_sessions: usize,
        inactivity_timeout_minutes: i64,
    ) -> Self {
        Self {
            jwt,
            sessions,
            audit,
            max_concurrent_sessions,
            inactivity_timeout_minutes,
        }
    }

    pub fn jwt(&self) -> &JwtService {
        &self.jwt
    }

    /// Create a session and mint its first token pair. A user already at
    /// the concurrency cap loses their least-recently-active session.
    pub async fn issue(&self, request: IssueRequest) -> Result<IssuedTokens> {
        let now = Utc::now();
        // The session keeps only the digest of the rotation marker; the
        // raw jti exists nowhere but inside the signed refresh token.
        let refresh_jti = Uuid::new_v4().to_string();
        let session = NewSession {
            user_id: request.user_id,
            tenant_id: request.tenant_id,
            branch_id: request.branch_id,
            username: request.username,
            role_ids: request.role_ids,
            refresh_jti: hash_token(&refresh_jti),
            ip_address: request.ip_address,
            user_agent: request.user_agent,
        }
        .into_session(now);

        let evicted = self
            .sessions
            .insert(session.clone(), self.max_concurrent_sessions)
            .await?;

        for stale in evicted {
            self.audit.record(
                SecurityEvent::builder(SecurityEventKind::SessionEvicted, SecurityOutcome::Success)
                    .tenant(stale.tenant_id)
                    .user(stale.user_id)
                    .session(stale.session_id)
                    .detail("concurrent session cap reached")
                    .build(),
            );
        }

        Ok(IssuedTokens {
            access_token: self.jwt.generate_access_token(&session)?,
            refresh_token: self.jwt.generate_refresh_token(&session, &refresh_jti)?,
            session_id: session.session_id,
        })
    }

    /// Stateless access-token check: signature and expiry only, no store
    /// lookup. `ExpiredCredential` is surfaced distinctly so the caller
    /// can prompt for a refresh instead of a hard re-login.
    pub fn verify_access(&self, access_token: &str) -> Result<crate::jwt::Claims> {
        self.jwt.validate_access_token(access_token)
    }

    /// Use a refresh token exactly once to mint a new pair. The rotation
    /// is a store-level compare-and-swap: replaying a consumed token fails
    /// and is reported as a possible theft signal.
    pub async fn refresh(&self, refresh_token: &str) -> Result<IssuedTokens> {
        let claims = self.jwt.validate_refresh_token(refresh_token)?;
        let session_id = claims.session_id()?;
        let now = Utc::now();

        // An idle-timed-out session must not be resurrected by a refresh
        // that lands before the sweep; reject it here like any request.
        if let Some(session) = self.sessions.get(session_id).await? {
            if !session.revoked && session.is_inactive(self.inactivity_timeout_minutes, now) {
                self.expire_inactive(&session).await?;
                return Err(AuthError::RevokedSession);
            }
        }

        let next_jti = Uuid::new_v4().to_string();
        let outcome = self
            .sessions
            .rotate_refresh_jti(session_id, &hash_token(&claims.jti), &hash_token(&next_jti), now)
            .await?;

        match outcome {
            RotationOutcome::Rotated(session) => Ok(IssuedTokens {
                access_token: self.jwt.generate_access_token(&session)?,
                refresh_token: self.jwt.generate_refresh_token(&session, &next_jti)?,
                session_id: session.session_id,
            }),
            RotationOutcome::Replayed => {
                self.audit.record(
                    SecurityEvent::builder(
                        SecurityEventKind::RefreshTokenReplayed,
                        SecurityOutcome::Failure,
                    )
                    .session(session_id)
                    .detail("consumed refresh token presented again")
                    .build(),
                );
                Err(AuthError::ReplayedRefreshToken)
            }
            RotationOutcome::Revoked => Err(AuthError::RevokedSession),
            RotationOutcome::Missing => {
                Err(AuthError::InvalidCredential("unknown session".to_string()))
            }
        }
    }

    /// Mark a session inactive. Access tokens already issued for it stay
    /// valid until natural expiry; keeping the access TTL short bounds
    /// that window. The next refresh attempt fails.
    pub async fn revoke(&self, session_id: Uuid) -> Result<()> {
        if self.sessions.revoke(session_id).await? {
            self.audit.record(
                SecurityEvent::builder(SecurityEventKind::SessionRevoked, SecurityOutcome::Success)
                    .session(session_id)
                    .build(),
            );
        }
        Ok(())
    }

    /// Revoke every session of a user (logout from all devices).
    pub async fn revoke_all(&self, user_id: Uuid) -> Result<u64> {
        let count = self.sessions.revoke_all_for_user(user_id).await?;
        if count > 0 {
            self.audit.record(
                SecurityEvent::builder(SecurityEventKind::SessionRevoked, SecurityOutcome::Success)
                    .user(user_id)
                    .detail(format!("revoked {} sessions", count))
                    .build(),
            );
        }
        Ok(count)
    }

    pub async fn list_sessions(&self, user_id: Uuid) -> Result<Vec<SessionSummary>> {
        let sessions = self.sessions.list_for_user(user_id).await?;
        Ok(sessions.iter().map(SessionSummary::from).collect())
    }

    /// Per-request session check behind a verified access token: rejects
    /// revoked or idle-timed-out sessions and refreshes `last_activity_at`.
    pub async fn record_activity(&self, session_id: Uuid) -> Result<Session> {
        let now = Utc::now();
        let session = self
            .sessions
            .get(session_id)
            .await?
            .ok_or(AuthError::RevokedSession)?;

        if session.revoked {
            return Err(AuthError::RevokedSession);
        }

        if session.is_inactive(self.inactivity_timeout_minutes, now) {
            self.expire_inactive(&session).await?;
            return Err(AuthError::RevokedSession);
        }

        self.sessions.touch(session_id, now).await?;
        Ok(session)
    }

    /// Revoke and report an idle-timed-out session. Rejection happens
    /// synchronously on the request paths; the sweep only removes the
    /// record later.
    async fn expire_inactive(&self, session: &Session) -> Result<()> {
        self.sessions.revoke(session.session_id).await?;
        self.audit.record(
            SecurityEvent::builder(
                SecurityEventKind::SessionInactivityTimeout,
                SecurityOutcome::Failure,
            )
            .tenant(session.tenant_id)
            .user(session.user_id)
            .session(session.session_id)
            .build(),
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use hms_models::TracingAuditSink;
    use hms_store::InMemorySessionStore;

    fn service(max_sessions: usize, inactivity_minutes: i64) -> TokenService {
        service_with_store(
            Arc::new(InMemorySessionStore::new()),
            max_sessions,
            inactivity_minutes,
        )
    }

    fn service_with_store(
        store: Arc<InMemorySessionStore>,
        max_sessions: usize,
        inactivity_minutes: i64,
    ) -> TokenService {
        TokenService::new(
            JwtService::new("test-secret-key-min-32-characters-long"),
            store,
            Arc::new(TracingAuditSink),
            max_sessions,
            inactivity_minutes,
        )
    }

    fn request(user_id: Uuid) -> IssueRequest {
        IssueRequest {
            user_id,
            tenant_id: Uuid::new_v4(),
            branch_id: Uuid::new_v4(),
            username: "jdoe".to_string(),
            role_ids: vec![Uuid::new_v4()],
            ip_address: Some("10.0.0.7".to_string()),
            user_agent: Some("Mozilla/5.0".to_string()),
        }
    }

    #[tokio::test]
    async fn test_issue_and_verify() {
        let service = service(3, 30);
        let issued = service.issue(request(Uuid::new_v4())).await.unwrap();

        let claims = service.verify_access(&issued.access_token).unwrap();
        assert_eq!(claims.session_id().unwrap(), issued.session_id);
    }

    #[tokio::test]
    async fn test_refresh_replay_fails() {
        let service = service(3, 30);
        let issued = service.issue(request(Uuid::new_v4())).await.unwrap();

        let rotated = service.refresh(&issued.refresh_token).await.unwrap();
        assert_eq!(rotated.session_id, issued.session_id);
        assert_ne!(rotated.refresh_token, issued.refresh_token);

        // Immediate replay of the consumed token must fail
        let replay = service.refresh(&issued.refresh_token).await;
        assert!(matches!(replay, Err(AuthError::ReplayedRefreshToken)));

        // The rotated token still works
        assert!(service.refresh(&rotated.refresh_token).await.is_ok());
    }

    #[tokio::test]
    async fn test_concurrency_cap() {
        let service = service(3, 30);
        let user_id = Uuid::new_v4();

        let first = service.issue(request(user_id)).await.unwrap();
        for _ in 0..2 {
            service.issue(request(user_id)).await.unwrap();
        }

        // Make the first session the least recently active, then overflow
        for session in service.list_sessions(user_id).await.unwrap() {
            if session.session_id != first.session_id {
                service.record_activity(session.session_id).await.unwrap();
            }
        }
        let fourth = service.issue(request(user_id)).await.unwrap();

        let sessions = service.list_sessions(user_id).await.unwrap();
        assert_eq!(sessions.len(), 3);
        assert!(sessions.iter().all(|s| s.session_id != first.session_id));
        assert!(sessions.iter().any(|s| s.session_id == fourth.session_id));

        // The evicted session's refresh token is dead
        assert!(service.refresh(&first.refresh_token).await.is_err());
    }

    #[tokio::test]
    async fn test_revoked_session_refuses_refresh_and_activity() {
        let service = service(3, 30);
        let issued = service.issue(request(Uuid::new_v4())).await.unwrap();

        service.revoke(issued.session_id).await.unwrap();

        assert!(matches!(
            service.refresh(&issued.refresh_token).await,
            Err(AuthError::RevokedSession)
        ));
        assert!(matches!(
            service.record_activity(issued.session_id).await,
            Err(AuthError::RevokedSession)
        ));
    }

    #[tokio::test]
    async fn test_revoke_all() {
        let service = service(3, 30);
        let user_id = Uuid::new_v4();
        for _ in 0..3 {
            service.issue(request(user_id)).await.unwrap();
        }

        assert_eq!(service.revoke_all(user_id).await.unwrap(), 3);
        assert!(service.list_sessions(user_id).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_inactivity_rejected_on_next_request() {
        // Zero-minute timeout: any elapsed idle time is too much
        let service = service(3, 0);
        let issued = service.issue(request(Uuid::new_v4())).await.unwrap();

        tokio::time::sleep(std::time::Duration::from_millis(5)).await;

        assert!(matches!(
            service.record_activity(issued.session_id).await,
            Err(AuthError::RevokedSession)
        ));
        assert!(service.refresh(&issued.refresh_token).await.is_err());
    }

    #[tokio::test]
    async fn test_refresh_rejects_idle_session() {
        let service = service(3, 0);
        let issued = service.issue(request(Uuid::new_v4())).await.unwrap();

        tokio::time::sleep(std::time::Duration::from_millis(5)).await;

        // Straight to refresh, with no intervening request to revoke the
        // session first: the idle timeout must still apply.
        assert!(matches!(
            service.refresh(&issued.refresh_token).await,
            Err(AuthError::RevokedSession)
        ));
    }

    #[tokio::test]
    async fn test_store_holds_refresh_jti_digest_only() {
        let store = Arc::new(InMemorySessionStore::new());
        let service = service_with_store(store.clone(), 3, 30);
        let issued = service.issue(request(Uuid::new_v4())).await.unwrap();

        let claims = service
            .jwt()
            .validate_refresh_token(&issued.refresh_token)
            .unwrap();
        let session = store.get(issued.session_id).await.unwrap().unwrap();

        assert_ne!(session.refresh_jti, claims.jti);
        assert_eq!(session.refresh_jti, crate::jwt::hash_token(&claims.jti));
    }
}
