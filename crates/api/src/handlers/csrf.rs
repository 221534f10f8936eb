use crate::handlers::auth::{auth_error, ErrorResponse};
use crate::AppState;
use axum::{
    extract::State,
    http::{header, HeaderMap, HeaderValue, StatusCode},
    Extension, Json,
};
use hms_auth::{
    build_csrf_cookie, issue_cookie_token, CsrfStrategy, StoredTokenGuard, CSRF_HEADER,
};
use hms_models::AuthenticatedPrincipal;
use serde::Serialize;
use std::sync::Arc;
use uuid::Uuid;

#[derive(Debug, Serialize)]
pub struct CsrfTokenResponse {
    pub csrf_token: String,
    pub strategy: CsrfStrategy,
}

fn internal_error() -> (StatusCode, Json<ErrorResponse>) {
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        Json(ErrorResponse::new("internal_error", "Internal error")),
    )
}

/// Mint the anti-forgery token for a session and build the response
/// headers carrying it: the token is echoed in the CSRF header, and under
/// double-submit also set as the readable cookie the client echoes back.
pub async fn establish_csrf(
    csrf_guard: &StoredTokenGuard,
    strategy: CsrfStrategy,
    secure_cookies: bool,
    session_id: Uuid,
) -> Result<(HeaderMap, String), (StatusCode, Json<ErrorResponse>)> {
    let mut headers = HeaderMap::new();

    let token = match strategy {
        CsrfStrategy::Stored => csrf_guard.issue(session_id).await.map_err(auth_error)?,
        CsrfStrategy::DoubleSubmit => {
            let token = issue_cookie_token();
            let cookie = build_csrf_cookie(&token, secure_cookies);
            headers.insert(
                header::SET_COOKIE,
                HeaderValue::from_str(&cookie).map_err(|_| internal_error())?,
            );
            token
        }
    };

    headers.insert(
        CSRF_HEADER,
        HeaderValue::from_str(&token).map_err(|_| internal_error())?,
    );
    Ok((headers, token))
}

/// Issue the anti-forgery token for the caller's session. Clients that
/// miss (or drop) the token handed out at login fetch a fresh one here.
pub async fn issue_csrf_token(
    State(state): State<Arc<AppState>>,
    Extension(principal): Extension<AuthenticatedPrincipal>,
) -> Result<(HeaderMap, Json<CsrfTokenResponse>), (StatusCode, Json<ErrorResponse>)> {
    let (headers, token) = establish_csrf(
        &state.csrf_guard,
        state.csrf_strategy,
        state.secure_cookies,
        principal.session_id,
    )
    .await?;

    Ok((
        headers,
        Json(CsrfTokenResponse {
            csrf_token: token,
            strategy: state.csrf_strategy,
        }),
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use hms_store::InMemoryCsrfStore;

    fn guard() -> StoredTokenGuard {
        StoredTokenGuard::new(Arc::new(InMemoryCsrfStore::new()), 60)
    }

    #[tokio::test]
    async fn test_stored_strategy_echoes_verifiable_token() {
        let guard = guard();
        let session_id = Uuid::new_v4();

        let (headers, token) = establish_csrf(&guard, CsrfStrategy::Stored, false, session_id)
            .await
            .unwrap();

        assert_eq!(headers.get(CSRF_HEADER).unwrap().to_str().unwrap(), token);
        assert!(headers.get(header::SET_COOKIE).is_none());
        assert!(guard.verify(session_id, &token).await.unwrap());
    }

    #[tokio::test]
    async fn test_double_submit_sets_matching_cookie() {
        let guard = guard();

        let (headers, token) =
            establish_csrf(&guard, CsrfStrategy::DoubleSubmit, true, Uuid::new_v4())
                .await
                .unwrap();

        assert_eq!(headers.get(CSRF_HEADER).unwrap().to_str().unwrap(), token);
        let cookie = headers.get(header::SET_COOKIE).unwrap().to_str().unwrap();
        assert!(cookie.starts_with(&format!("csrf-token={}", token)));
        assert!(cookie.contains("Secure"));
    }
}
