use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Security-relevant event classes this core reports.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum SecurityEventKind {
    LoginSuccess,
    LoginFailure,
    TokenInvalid,
    TokenExpired,
    RefreshTokenReplayed,
    SessionRevoked,
    SessionEvicted,
    SessionInactivityTimeout,
    CsrfFailure,
    PermissionDenied,
    SecondFactorEnrolled,
    SecondFactorVerified,
    SecondFactorFailed,
    SecondFactorDisabled,
    BackupCodeConsumed,
}

impl std::fmt::Display for SecurityEventKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            SecurityEventKind::LoginSuccess => "login_success",
            SecurityEventKind::LoginFailure => "login_failure",
            SecurityEventKind::TokenInvalid => "token_invalid",
            SecurityEventKind::TokenExpired => "token_expired",
            SecurityEventKind::RefreshTokenReplayed => "refresh_token_replayed",
            SecurityEventKind::SessionRevoked => "session_revoked",
            SecurityEventKind::SessionEvicted => "session_evicted",
            SecurityEventKind::SessionInactivityTimeout => "session_inactivity_timeout",
            SecurityEventKind::CsrfFailure => "csrf_failure",
            SecurityEventKind::PermissionDenied => "permission_denied",
            SecurityEventKind::SecondFactorEnrolled => "second_factor_enrolled",
            SecurityEventKind::SecondFactorVerified => "second_factor_verified",
            SecurityEventKind::SecondFactorFailed => "second_factor_failed",
            SecurityEventKind::SecondFactorDisabled => "second_factor_disabled",
            SecurityEventKind::BackupCodeConsumed => "backup_code_consumed",
        };
        write!(f, "{}", s)
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum SecurityOutcome {
    Success,
    Failure,
}

/// Structured security event handed to the audit collaborator.
///
/// Log storage lives outside this core; every authentication failure,
/// CSRF failure, permission denial and 2FA event must pass through here.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SecurityEvent {
    pub kind: SecurityEventKind,
    pub outcome: SecurityOutcome,
    pub tenant_id: Option<Uuid>,
    pub user_id: Option<Uuid>,
    pub session_id: Option<Uuid>,
    pub ip_address: Option<String>,
    pub path: Option<String>,
    pub method: Option<String>,
    pub detail: Option<String>,
    pub occurred_at: DateTime<Utc>,
}

impl SecurityEvent {
    pub fn builder(kind: SecurityEventKind, outcome: SecurityOutcome) -> SecurityEventBuilder {
        SecurityEventBuilder {
            event: SecurityEvent {
                kind,
                outcome,
                tenant_id: None,
                user_id: None,
                session_id: None,
                ip_address: None,
                path: None,
                method: None,
                detail: None,
                occurred_at: Utc::now(),
            },
        }
    }
}

pub struct SecurityEventBuilder {
    event: SecurityEvent,
}

impl SecurityEventBuilder {
    pub fn tenant(mut self, tenant_id: Uuid) -> Self {
        self.event.tenant_id = Some(tenant_id);
        self
    }

    pub fn user(mut self, user_id: Uuid) -> Self {
        self.event.user_id = Some(user_id);
        self
    }

    pub fn session(mut self, session_id: Uuid) -> Self {
        self.event.session_id = Some(session_id);
        self
    }

    pub fn ip(mut self, ip: impl Into<String>) -> Self {
        self.event.ip_address = Some(ip.into());
        self
    }

    pub fn route(mut self, method: impl Into<String>, path: impl Into<String>) -> Self {
        self.event.method = Some(method.into());
        self.event.path = Some(path.into());
        self
    }

    pub fn detail(mut self, detail: impl Into<String>) -> Self {
        self.event.detail = Some(detail.into());
        self
    }

    pub fn build(self) -> SecurityEvent {
        self.event
    }
}

/// Collaborator boundary for audit/security logging.
///
/// Recording is synchronous and must be cheap; implementations that persist
/// events should queue internally rather than block the request path.
pub trait AuditSink: Send + Sync {
    fn record(&self, event: SecurityEvent);
}

/// Default sink: structured tracing events on the `security_audit` target.
#[derive(Debug, Clone, Default)]
pub struct TracingAuditSink;

impl AuditSink for TracingAuditSink {
    fn record(&self, event: SecurityEvent) {
        match event.outcome {
            SecurityOutcome::Success => tracing::info!(
                target: "security_audit",
                kind = %event.kind,
                tenant_id = ?event.tenant_id,
                user_id = ?event.user_id,
                session_id = ?event.session_id,
                ip = ?event.ip_address,
                method = ?event.method,
                path = ?event.path,
                detail = ?event.detail,
                "security event"
            ),
            SecurityOutcome::Failure => tracing::warn!(
                target: "security_audit",
                kind = %event.kind,
                tenant_id = ?event.tenant_id,
                user_id = ?event.user_id,
                session_id = ?event.session_id,
                ip = ?event.ip_address,
                method = ?event.method,
                path = ?event.path,
                detail = ?event.detail,
                "security event"
            ),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builder_carries_context() {
        let user_id = Uuid::new_v4();
        let event = SecurityEvent::builder(
            SecurityEventKind::PermissionDenied,
            SecurityOutcome::Failure,
        )
        .user(user_id)
        .route("POST", "/api/labs/orders")
        .detail("required one of [labs:write]")
        .build();

        assert_eq!(event.kind, SecurityEventKind::PermissionDenied);
        assert_eq!(event.user_id, Some(user_id));
        assert_eq!(event.method.as_deref(), Some("POST"));
        assert_eq!(event.path.as_deref(), Some("/api/labs/orders"));
    }
}
