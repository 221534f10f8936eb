use crate::handlers::auth::{auth_error, ErrorResponse, MessageResponse};
use crate::AppState;
use axum::{
    extract::{Path, State},
    http::StatusCode,
    Extension, Json,
};
use hms_models::{AuthenticatedPrincipal, SessionSummary};
use std::sync::Arc;
use uuid::Uuid;

/// Active sessions of the calling user (device overview).
pub async fn list_sessions(
    State(state): State<Arc<AppState>>,
    Extension(principal): Extension<AuthenticatedPrincipal>,
) -> Result<Json<Vec<SessionSummary>>, (StatusCode, Json<ErrorResponse>)> {
    let sessions = state
        .tokens
        .list_sessions(principal.user_id)
        .await
        .map_err(auth_error)?;
    Ok(Json(sessions))
}

/// Revoke one of the calling user's own sessions (e.g. a lost device).
pub async fn revoke_session(
    State(state): State<Arc<AppState>>,
    Extension(principal): Extension<AuthenticatedPrincipal>,
    Path(session_id): Path<Uuid>,
) -> Result<Json<MessageResponse>, (StatusCode, Json<ErrorResponse>)> {
    let owned = state
        .tokens
        .list_sessions(principal.user_id)
        .await
        .map_err(auth_error)?
        .iter()
        .any(|s| s.session_id == session_id);

    if !owned {
        return Err((
            StatusCode::NOT_FOUND,
            Json(ErrorResponse::new("not_found", "No such session")),
        ));
    }

    state.tokens.revoke(session_id).await.map_err(auth_error)?;
    Ok(Json(MessageResponse {
        message: "Session revoked".to_string(),
    }))
}

/// Force-logout every session of another user. Security-admin surface,
/// gated by a permission layer in the router.
pub async fn revoke_user_sessions(
    State(state): State<Arc<AppState>>,
    Path(user_id): Path<Uuid>,
) -> Result<Json<MessageResponse>, (StatusCode, Json<ErrorResponse>)> {
    let revoked = state.tokens.revoke_all(user_id).await.map_err(auth_error)?;
    Ok(Json(MessageResponse {
        message: format!("Revoked {} sessions", revoked),
    }))
}
