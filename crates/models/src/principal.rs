use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Typed identity attached to an authenticated request.
///
/// Built from validated access-token claims by the auth middleware and
/// carried through request extensions, never as loose properties.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthenticatedPrincipal {
    pub user_id: Uuid,
    pub username: String,
    pub tenant_id: Uuid,
    pub branch_id: Uuid,
    pub role_ids: Vec<Uuid>,
    pub session_id: Uuid,
}
