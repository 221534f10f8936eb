use crate::handlers::auth::{auth_error, ErrorResponse};
use crate::AppState;
use axum::{
    extract::{Request, State},
    http::{header, HeaderMap, StatusCode},
    middleware::Next,
    response::Response,
    Json,
};
use hms_auth::{
    requires_csrf_check, verify_double_submit, AuthError, CsrfStrategy, API_CLIENT_HEADER,
    CSRF_COOKIE, CSRF_HEADER,
};
use hms_models::{
    AuthenticatedPrincipal, SecurityEvent, SecurityEventKind, SecurityOutcome,
};
use std::sync::Arc;

fn header_value<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers.get(name).and_then(|v| v.to_str().ok())
}

fn cookie_value<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    header_value(headers, header::COOKIE.as_str())?
        .split(';')
        .filter_map(|pair| pair.trim().split_once('='))
        .find(|(key, _)| *key == name)
        .map(|(_, value)| value)
}

/// Enforce CSRF on state-changing requests. Safe methods and API-client
/// calls pass through; everything else must present a token matching the
/// configured strategy. Runs inside `require_auth`, so the principal is
/// already in extensions.
pub async fn require_csrf(
    State(state): State<Arc<AppState>>,
    request: Request,
    next: Next,
) -> Result<Response, (StatusCode, Json<ErrorResponse>)> {
    let method = request.method().as_str().to_string();
    let has_api_client = request.headers().contains_key(API_CLIENT_HEADER);

    if !requires_csrf_check(&method, has_api_client) {
        return Ok(next.run(request).await);
    }

    let headers = request.headers().clone();
    let principal = request
        .extensions()
        .get::<AuthenticatedPrincipal>()
        .cloned();
    let path = request.uri().path().to_string();

    let outcome = match state.csrf_strategy {
        CsrfStrategy::Stored => {
            let principal = principal
                .as_ref()
                .ok_or_else(|| auth_error(AuthError::MissingCredential))?;
            match header_value(&headers, CSRF_HEADER) {
                None => Err(AuthError::CsrfTokenMissing),
                Some(supplied) => {
                    if state
                        .csrf_guard
                        .verify(principal.session_id, supplied)
                        .await
                        .map_err(auth_error)?
                    {
                        Ok(())
                    } else {
                        Err(AuthError::CsrfTokenInvalid)
                    }
                }
            }
        }
        CsrfStrategy::DoubleSubmit => verify_double_submit(
            cookie_value(&headers, CSRF_COOKIE),
            header_value(&headers, CSRF_HEADER),
        ),
    };

    if let Err(e) = outcome {
        let mut event =
            SecurityEvent::builder(SecurityEventKind::CsrfFailure, SecurityOutcome::Failure)
                .route(&method, &path)
                .detail(e.to_string());
        if let Some(p) = &principal {
            event = event.tenant(p.tenant_id).user(p.user_id).session(p.session_id);
        }
        state.audit.record(event.build());
        return Err(auth_error(e));
    }

    Ok(next.run(request).await)
}
