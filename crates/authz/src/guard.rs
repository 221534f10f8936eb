use crate::error::{AuthzError, Result};
use hms_models::{
    AuditSink, AuthenticatedPrincipal, Permission, RolePermissionTable, SecurityEvent,
    SecurityEventKind, SecurityOutcome,
};
use std::sync::Arc;
use uuid::Uuid;

/// Role-based access checks over a static permission table.
///
/// The predicates are pure and synchronous: the table is loaded once at
/// startup and the principal's `role_ids` are a login-time snapshot, so no
/// I/O happens on the request path. Every denial goes to the audit sink.
pub struct PermissionGuard {
    table: RolePermissionTable,
    audit: Arc<dyn AuditSink>,
}

impl PermissionGuard {
    pub fn new(table: RolePermissionTable, audit: Arc<dyn AuditSink>) -> Self {
        Self { table, audit }
    }

    /// Pass when the principal holds at least ONE of `required`. An empty
    /// requirement list denies everyone; routes with no permission gate
    /// simply do not call the guard.
    pub fn check_any_permission(
        &self,
        principal: &AuthenticatedPrincipal,
        required: &[Permission],
        method: &str,
        path: &str,
    ) -> Result<()> {
        let held = self.table.permissions_for_roles(&principal.role_ids);

        if required.iter().any(|p| held.contains(p)) {
            return Ok(());
        }

        self.record_denial(
            principal,
            method,
            path,
            format!(
                "required one of [{}], held [{}]",
                join_permissions(required.iter()),
                join_permissions(held.iter()),
            ),
        );
        Err(AuthzError::PermissionDenied)
    }

    /// Exact-role gate for surfaces tied to a role rather than a
    /// capability (e.g. a pharmacy-only dispensing screen).
    pub fn check_role(
        &self,
        principal: &AuthenticatedPrincipal,
        role_id: Uuid,
        method: &str,
        path: &str,
    ) -> Result<()> {
        if principal.role_ids.contains(&role_id) {
            return Ok(());
        }

        self.record_denial(
            principal,
            method,
            path,
            format!("required role {}, held {:?}", role_id, principal.role_ids),
        );
        Err(AuthzError::PermissionDenied)
    }

    fn record_denial(
        &self,
        principal: &AuthenticatedPrincipal,
        method: &str,
        path: &str,
        detail: String,
    ) {
        self.audit.record(
            SecurityEvent::builder(SecurityEventKind::PermissionDenied, SecurityOutcome::Failure)
                .tenant(principal.tenant_id)
                .user(principal.user_id)
                .session(principal.session_id)
                .route(method, path)
                .detail(detail)
                .build(),
        );
    }
}

fn join_permissions<'a>(permissions: impl Iterator<Item = &'a Permission>) -> String {
    permissions
        .map(|p| p.as_str())
        .collect::<Vec<_>>()
        .join(", ")
}
