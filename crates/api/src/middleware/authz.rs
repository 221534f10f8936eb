use crate::handlers::auth::ErrorResponse;
use crate::AppState;
use axum::{
    extract::{Request, State},
    http::StatusCode,
    middleware::Next,
    response::Response,
    Json,
};
use hms_models::{AuthenticatedPrincipal, Permission};
use std::sync::Arc;

/// Route-level permission requirement, attached as an extension layer
/// outside `require_permission`.
#[derive(Debug, Clone)]
pub struct RequiredPermissions(pub Vec<Permission>);

impl RequiredPermissions {
    pub fn any_of(names: &[&str]) -> Self {
        Self(names.iter().map(|n| Permission::from(*n)).collect())
    }
}

/// Deny unless the principal holds at least one of the route's required
/// permissions. Runs inside `require_auth`; denials are audited by the
/// guard itself.
pub async fn require_permission(
    State(state): State<Arc<AppState>>,
    request: Request,
    next: Next,
) -> Result<Response, (StatusCode, Json<ErrorResponse>)> {
    let principal = request
        .extensions()
        .get::<AuthenticatedPrincipal>()
        .cloned()
        .ok_or_else(|| {
            (
                StatusCode::UNAUTHORIZED,
                Json(ErrorResponse::new(
                    "missing_credentials",
                    "Authentication required",
                )),
            )
        })?;

    let required = request
        .extensions()
        .get::<RequiredPermissions>()
        .cloned()
        .unwrap_or_else(|| RequiredPermissions(Vec::new()));

    let method = request.method().as_str();
    let path = request.uri().path();

    state
        .guard
        .check_any_permission(&principal, &required.0, method, path)
        .map_err(|_| {
            (
                StatusCode::FORBIDDEN,
                Json(ErrorResponse::new(
                    "insufficient_permissions",
                    "This action requires additional permissions",
                )),
            )
        })?;

    Ok(next.run(request).await)
}
