use crate::handlers;
use crate::middleware::{self, RequiredPermissions};
use crate::AppState;
use axum::{
    middleware::from_fn_with_state,
    routing::{delete, get, post},
    Extension, Router,
};
use std::sync::Arc;

pub fn create_router(state: Arc<AppState>) -> Router {
    // Public: credential presentation and token rotation
    let public = Router::new()
        .route("/health", get(handlers::health::health_check))
        .route("/api/auth/login", post(handlers::auth::login))
        .route(
            "/api/auth/login/second-factor",
            post(handlers::auth::login_second_factor),
        )
        .route(
            "/api/auth/login/sms-otp",
            post(handlers::auth::login_send_sms_otp),
        )
        .route("/api/auth/refresh", post(handlers::auth::refresh));

    // Protected: live session required; state-changing methods also pass
    // the CSRF check (auth runs first, CSRF second)
    let protected = Router::new()
        .route("/api/auth/logout", post(handlers::auth::logout))
        .route("/api/auth/logout-all", post(handlers::auth::logout_all))
        .route("/api/auth/me", get(handlers::auth::me))
        .route("/api/auth/csrf", get(handlers::csrf::issue_csrf_token))
        .route("/api/auth/sessions", get(handlers::sessions::list_sessions))
        .route(
            "/api/auth/sessions/:session_id",
            delete(handlers::sessions::revoke_session),
        )
        .route("/api/mfa/totp/enroll", post(handlers::mfa::enroll_totp))
        .route(
            "/api/mfa/totp/verify",
            post(handlers::mfa::verify_totp_setup),
        )
        .route("/api/mfa/sms/enroll", post(handlers::mfa::enroll_sms))
        .route("/api/mfa/sms/confirm", post(handlers::mfa::confirm_sms))
        .route("/api/mfa/status", get(handlers::mfa::status))
        .route("/api/mfa", delete(handlers::mfa::disable))
        .route(
            "/api/mfa/backup-codes/regenerate",
            post(handlers::mfa::regenerate_backup_codes),
        )
        .route_layer(from_fn_with_state(state.clone(), middleware::require_csrf))
        .route_layer(from_fn_with_state(state.clone(), middleware::require_auth));

    // Security-admin: additionally gated by permission
    let admin = Router::new()
        .route(
            "/api/admin/users/:user_id/sessions",
            delete(handlers::sessions::revoke_user_sessions),
        )
        .route_layer(from_fn_with_state(
            state.clone(),
            middleware::require_permission,
        ))
        .route_layer(from_fn_with_state(state.clone(), middleware::require_csrf))
        .route_layer(from_fn_with_state(state.clone(), middleware::require_auth))
        .route_layer(Extension(RequiredPermissions::any_of(&[
            "security:sessions:revoke",
        ])));

    Router::new()
        .merge(public)
        .merge(protected)
        .merge(admin)
        .with_state(state)
}
