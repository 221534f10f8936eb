use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// One authenticated device/browser for one user.
///
/// `role_ids` is a snapshot taken at issuance; it is not re-read from the
/// directory per request and stays stale until the next login.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Session {
    pub session_id: Uuid,
    pub user_id: Uuid,
    pub tenant_id: Uuid,
    pub branch_id: Uuid,
    pub username: String,
    pub role_ids: Vec<Uuid>,
    /// JWT id of the currently valid refresh token. Rotation swaps this;
    /// a refresh token whose jti no longer matches has been consumed.
    pub refresh_jti: String,
    pub revoked: bool,
    pub ip_address: Option<String>,
    pub user_agent: Option<String>,
    pub created_at: DateTime<Utc>,
    pub last_activity_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewSession {
    pub user_id: Uuid,
    pub tenant_id: Uuid,
    pub branch_id: Uuid,
    pub username: String,
    pub role_ids: Vec<Uuid>,
    pub refresh_jti: String,
    pub ip_address: Option<String>,
    pub user_agent: Option<String>,
}

impl NewSession {
    pub fn into_session(self, now: DateTime<Utc>) -> Session {
        Session {
            session_id: Uuid::new_v4(),
            user_id: self.user_id,
            tenant_id: self.tenant_id,
            branch_id: self.branch_id,
            username: self.username,
            role_ids: self.role_ids,
            refresh_jti: self.refresh_jti,
            revoked: false,
            ip_address: self.ip_address,
            user_agent: self.user_agent,
            created_at: now,
            last_activity_at: now,
        }
    }
}

/// Session view for the "active sessions" listing. Carries no secrets.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionSummary {
    pub session_id: Uuid,
    pub created_at: DateTime<Utc>,
    pub last_activity_at: DateTime<Utc>,
    pub ip_address: Option<String>,
    pub user_agent: Option<String>,
}

impl From<&Session> for SessionSummary {
    fn from(session: &Session) -> Self {
        Self {
            session_id: session.session_id,
            created_at: session.created_at,
            last_activity_at: session.last_activity_at,
            ip_address: session.ip_address.clone(),
            user_agent: session.user_agent.clone(),
        }
    }
}

impl Session {
    /// Whether the session has been idle longer than the allowed window.
    pub fn is_inactive(&self, timeout_minutes: i64, now: DateTime<Utc>) -> bool {
        now - self.last_activity_at > chrono::Duration::minutes(timeout_minutes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_inactivity_window() {
        let now = Utc::now();
        let mut session = NewSession {
            user_id: Uuid::new_v4(),
            tenant_id: Uuid::new_v4(),
            branch_id: Uuid::new_v4(),
            username: "jdoe".to_string(),
            role_ids: vec![],
            refresh_jti: Uuid::new_v4().to_string(),
            ip_address: None,
            user_agent: None,
        }
        .into_session(now);

        assert!(!session.is_inactive(30, now));

        session.last_activity_at = now - chrono::Duration::minutes(31);
        assert!(session.is_inactive(30, now));
    }
}
