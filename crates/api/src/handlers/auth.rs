use crate::handlers::csrf::establish_csrf;
use crate::AppState;
use axum::{
    extract::State,
    http::{HeaderMap, StatusCode},
    Extension, Json,
};
use chrono::Utc;
use hms_auth::{AuthError, IssueRequest};
use hms_models::{
    AuthenticatedPrincipal, NewSession, SecondFactorMethod, SecurityEvent, SecurityEventKind,
    SecurityOutcome,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use uuid::Uuid;
use validator::Validate;

pub fn check_valid(
    request: &impl Validate,
) -> Result<(), (StatusCode, Json<ErrorResponse>)> {
    request.validate().map_err(|e| {
        (
            StatusCode::BAD_REQUEST,
            Json(ErrorResponse::new("validation_error", &e.to_string())),
        )
    })
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
    pub message: String,
}

impl ErrorResponse {
    pub fn new(error: &str, message: &str) -> Self {
        Self {
            error: error.to_string(),
            message: message.to_string(),
        }
    }
}

/// Map core errors onto the HTTP boundary: 401 for credential problems,
/// 403 for CSRF, 400 for validation. Internal causes stay out of bodies.
pub fn auth_error(e: AuthError) -> (StatusCode, Json<ErrorResponse>) {
    let (status, code, message) = match &e {
        AuthError::MissingCredential => (
            StatusCode::UNAUTHORIZED,
            "missing_credentials",
            e.to_string(),
        ),
        AuthError::ExpiredCredential => {
            (StatusCode::UNAUTHORIZED, "token_expired", e.to_string())
        }
        AuthError::InvalidCredentials => (
            StatusCode::UNAUTHORIZED,
            "invalid_credentials",
            "Invalid credentials".to_string(),
        ),
        AuthError::InvalidCredential(_) => {
            (StatusCode::UNAUTHORIZED, "invalid_token", e.to_string())
        }
        AuthError::RevokedSession => {
            (StatusCode::UNAUTHORIZED, "session_revoked", e.to_string())
        }
        AuthError::ReplayedRefreshToken => {
            (StatusCode::UNAUTHORIZED, "invalid_token", e.to_string())
        }
        AuthError::CsrfTokenMissing | AuthError::CsrfTokenInvalid => {
            (StatusCode::FORBIDDEN, "csrf_failure", e.to_string())
        }
        AuthError::SecondFactorRequired { .. } => (
            StatusCode::UNAUTHORIZED,
            "second_factor_required",
            e.to_string(),
        ),
        AuthError::SecondFactorInvalid => (
            StatusCode::UNAUTHORIZED,
            "second_factor_invalid",
            e.to_string(),
        ),
        AuthError::ValidationError(_) => {
            (StatusCode::BAD_REQUEST, "validation_error", e.to_string())
        }
        AuthError::Store(_) | AuthError::Crypto(_) | AuthError::Internal(_) => {
            tracing::error!(error = %e, "internal error on auth surface");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                "internal_error",
                "Internal error".to_string(),
            )
        }
    };
    (status, Json(ErrorResponse::new(code, &message)))
}

pub fn client_ip(headers: &HeaderMap) -> Option<String> {
    headers
        .get("x-forwarded-for")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.split(',').next())
        .map(|v| v.trim().to_string())
}

pub fn user_agent(headers: &HeaderMap) -> Option<String> {
    headers
        .get("user-agent")
        .and_then(|v| v.to_str().ok())
        .map(|v| v.to_string())
}

#[derive(Debug, Deserialize, Validate)]
pub struct LoginRequest {
    pub tenant_id: Uuid,

    #[validate(length(min = 1, max = 128))]
    pub username: String,

    #[validate(length(min = 1))]
    pub password: String,
}

#[derive(Debug, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum LoginResponse {
    Ok {
        access_token: String,
        refresh_token: String,
        session_id: Uuid,
    },
    SecondFactorRequired {
        pending_token: String,
    },
}

/// Password login. Accounts with an enabled second factor get a pending
/// token instead of a session; unknown user and wrong password produce
/// the same response. Session-establishing responses carry a fresh CSRF
/// token in the response headers.
pub async fn login(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Json(request): Json<LoginRequest>,
) -> Result<(HeaderMap, Json<LoginResponse>), (StatusCode, Json<ErrorResponse>)> {
    check_valid(&request)?;

    let identity = state
        .directory
        .verify_credentials(request.tenant_id, &request.username, &request.password)
        .await
        .map_err(auth_error)?;

    let identity = match identity {
        Some(identity) => identity,
        None => {
            state.audit.record(
                SecurityEvent::builder(SecurityEventKind::LoginFailure, SecurityOutcome::Failure)
                    .tenant(request.tenant_id)
                    .ip(client_ip(&headers).unwrap_or_default())
                    .detail("password verification failed")
                    .build(),
            );
            return Err(auth_error(AuthError::InvalidCredentials));
        }
    };

    if state
        .two_factor
        .is_required(identity.user_id)
        .await
        .map_err(auth_error)?
    {
        // Transient session for the pending-token claims only; nothing is
        // stored until the second factor passes.
        let placeholder = NewSession {
            user_id: identity.user_id,
            tenant_id: identity.tenant_id,
            branch_id: identity.branch_id,
            username: identity.username,
            role_ids: identity.role_ids,
            refresh_jti: Uuid::new_v4().to_string(),
            ip_address: client_ip(&headers),
            user_agent: user_agent(&headers),
        }
        .into_session(Utc::now());

        let pending_token = state
            .tokens
            .jwt()
            .generate_pending_token(&placeholder)
            .map_err(auth_error)?;
        return Ok((
            HeaderMap::new(),
            Json(LoginResponse::SecondFactorRequired { pending_token }),
        ));
    }

    let user_id = identity.user_id;
    let issued = state
        .tokens
        .issue(IssueRequest {
            user_id: identity.user_id,
            tenant_id: identity.tenant_id,
            branch_id: identity.branch_id,
            username: identity.username,
            role_ids: identity.role_ids,
            ip_address: client_ip(&headers),
            user_agent: user_agent(&headers),
        })
        .await
        .map_err(auth_error)?;

    state.audit.record(
        SecurityEvent::builder(SecurityEventKind::LoginSuccess, SecurityOutcome::Success)
            .tenant(request.tenant_id)
            .user(user_id)
            .session(issued.session_id)
            .ip(client_ip(&headers).unwrap_or_default())
            .build(),
    );

    let (response_headers, _) = establish_csrf(
        &state.csrf_guard,
        state.csrf_strategy,
        state.secure_cookies,
        issued.session_id,
    )
    .await?;

    Ok((
        response_headers,
        Json(LoginResponse::Ok {
            access_token: issued.access_token,
            refresh_token: issued.refresh_token,
            session_id: issued.session_id,
        }),
    ))
}

#[derive(Debug, Deserialize, Validate)]
pub struct SecondFactorLoginRequest {
    pub pending_token: String,

    #[validate(length(min = 6, max = 16))]
    pub code: String,

    pub method: SecondFactorMethod,
}

/// Complete a 2FA login: pending token plus a valid code yields the
/// real token pair.
pub async fn login_second_factor(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Json(request): Json<SecondFactorLoginRequest>,
) -> Result<(HeaderMap, Json<LoginResponse>), (StatusCode, Json<ErrorResponse>)> {
    check_valid(&request)?;

    let claims = state
        .tokens
        .jwt()
        .validate_pending_token(&request.pending_token)
        .map_err(auth_error)?;
    let user_id = claims.user_id().map_err(auth_error)?;

    let verified = state
        .two_factor
        .verify(user_id, &request.code, request.method)
        .await
        .map_err(auth_error)?;
    if !verified {
        return Err(auth_error(AuthError::SecondFactorInvalid));
    }

    let principal = claims.to_principal().map_err(auth_error)?;
    let issued = state
        .tokens
        .issue(IssueRequest {
            user_id: principal.user_id,
            tenant_id: principal.tenant_id,
            branch_id: principal.branch_id,
            username: principal.username,
            role_ids: principal.role_ids,
            ip_address: client_ip(&headers),
            user_agent: user_agent(&headers),
        })
        .await
        .map_err(auth_error)?;

    state.audit.record(
        SecurityEvent::builder(SecurityEventKind::LoginSuccess, SecurityOutcome::Success)
            .tenant(principal.tenant_id)
            .user(user_id)
            .session(issued.session_id)
            .ip(client_ip(&headers).unwrap_or_default())
            .detail(format!("second factor: {}", request.method))
            .build(),
    );

    let (response_headers, _) = establish_csrf(
        &state.csrf_guard,
        state.csrf_strategy,
        state.secure_cookies,
        issued.session_id,
    )
    .await?;

    Ok((
        response_headers,
        Json(LoginResponse::Ok {
            access_token: issued.access_token,
            refresh_token: issued.refresh_token,
            session_id: issued.session_id,
        }),
    ))
}

#[derive(Debug, Deserialize)]
pub struct PendingTokenRequest {
    pub pending_token: String,
}

/// Dispatch a login OTP to the SMS factor of a user mid-2FA-login.
pub async fn login_send_sms_otp(
    State(state): State<Arc<AppState>>,
    Json(request): Json<PendingTokenRequest>,
) -> Result<Json<MessageResponse>, (StatusCode, Json<ErrorResponse>)> {
    let claims = state
        .tokens
        .jwt()
        .validate_pending_token(&request.pending_token)
        .map_err(auth_error)?;
    let user_id = claims.user_id().map_err(auth_error)?;

    state
        .two_factor
        .send_login_otp(user_id)
        .await
        .map_err(auth_error)?;

    Ok(Json(MessageResponse {
        message: "Verification code sent".to_string(),
    }))
}

#[derive(Debug, Deserialize)]
pub struct RefreshRequest {
    pub refresh_token: String,
}

#[derive(Debug, Serialize)]
pub struct TokenPairResponse {
    pub access_token: String,
    pub refresh_token: String,
    pub session_id: Uuid,
}

/// Rotate a refresh token into a new pair. Each refresh token works once.
pub async fn refresh(
    State(state): State<Arc<AppState>>,
    Json(request): Json<RefreshRequest>,
) -> Result<Json<TokenPairResponse>, (StatusCode, Json<ErrorResponse>)> {
    let issued = state
        .tokens
        .refresh(&request.refresh_token)
        .await
        .map_err(auth_error)?;

    Ok(Json(TokenPairResponse {
        access_token: issued.access_token,
        refresh_token: issued.refresh_token,
        session_id: issued.session_id,
    }))
}

#[derive(Debug, Serialize)]
pub struct MessageResponse {
    pub message: String,
}

/// End the current session.
pub async fn logout(
    State(state): State<Arc<AppState>>,
    Extension(principal): Extension<AuthenticatedPrincipal>,
) -> Result<Json<MessageResponse>, (StatusCode, Json<ErrorResponse>)> {
    state
        .tokens
        .revoke(principal.session_id)
        .await
        .map_err(auth_error)?;
    state
        .csrf_guard
        .invalidate(principal.session_id)
        .await
        .map_err(auth_error)?;

    Ok(Json(MessageResponse {
        message: "Logged out".to_string(),
    }))
}

/// End every session of the current user (all devices).
pub async fn logout_all(
    State(state): State<Arc<AppState>>,
    Extension(principal): Extension<AuthenticatedPrincipal>,
) -> Result<Json<MessageResponse>, (StatusCode, Json<ErrorResponse>)> {
    let revoked = state
        .tokens
        .revoke_all(principal.user_id)
        .await
        .map_err(auth_error)?;

    Ok(Json(MessageResponse {
        message: format!("Logged out of {} sessions", revoked),
    }))
}

/// Identity of the calling token.
pub async fn me(
    Extension(principal): Extension<AuthenticatedPrincipal>,
) -> Json<AuthenticatedPrincipal> {
    Json(principal)
}
