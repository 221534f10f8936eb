use crate::handlers::auth::{auth_error, client_ip, ErrorResponse};
use crate::AppState;
use axum::{
    extract::{Request, State},
    http::{HeaderMap, StatusCode},
    middleware::Next,
    response::Response,
    Json,
};
use hms_auth::AuthError;
use hms_models::{AuditSink, SecurityEvent, SecurityEventKind, SecurityOutcome};
use std::sync::Arc;

/// Extract the bearer token from the Authorization header.
pub fn extract_bearer_token(
    headers: &HeaderMap,
) -> Result<String, (StatusCode, Json<ErrorResponse>)> {
    let auth_header = headers
        .get("authorization")
        .ok_or_else(|| auth_error(AuthError::MissingCredential))?
        .to_str()
        .map_err(|_| {
            auth_error(AuthError::InvalidCredential(
                "malformed Authorization header".to_string(),
            ))
        })?;

    match auth_header.strip_prefix("Bearer ") {
        Some(token) => Ok(token.to_string()),
        None => Err(auth_error(AuthError::InvalidCredential(
            "Authorization header must use Bearer scheme".to_string(),
        ))),
    }
}

/// Report a rejected access token to the audit sink. Expired tokens are
/// classed apart from malformed or forged ones.
fn audit_token_failure(
    audit: &dyn AuditSink,
    error: &AuthError,
    method: &str,
    path: &str,
    ip: Option<String>,
) {
    let kind = match error {
        AuthError::ExpiredCredential => SecurityEventKind::TokenExpired,
        _ => SecurityEventKind::TokenInvalid,
    };

    let mut builder = SecurityEvent::builder(kind, SecurityOutcome::Failure)
        .route(method, path)
        .detail(error.to_string());
    if let Some(ip) = ip {
        builder = builder.ip(ip);
    }
    audit.record(builder.build());
}

/// Require a valid access token backed by a live session.
///
/// Signature/expiry checks are stateless; the session lookup then rejects
/// revoked or idle-timed-out sessions and refreshes the activity clock.
/// The resulting principal rides in request extensions.
pub async fn require_auth(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    mut request: Request,
    next: Next,
) -> Result<Response, (StatusCode, Json<ErrorResponse>)> {
    let method = request.method().to_string();
    let path = request.uri().path().to_string();

    let token = extract_bearer_token(&headers)?;
    let claims = state.tokens.verify_access(&token).map_err(|e| {
        audit_token_failure(state.audit.as_ref(), &e, &method, &path, client_ip(&headers));
        auth_error(e)
    })?;
    let principal = claims.to_principal().map_err(|e| {
        audit_token_failure(state.audit.as_ref(), &e, &method, &path, client_ip(&headers));
        auth_error(e)
    })?;

    state
        .tokens
        .record_activity(principal.session_id)
        .await
        .map_err(auth_error)?;

    request.extensions_mut().insert(principal);
    Ok(next.run(request).await)
}
