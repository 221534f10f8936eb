use crate::csrf::CSRF_COOKIE;
use crate::error::{AuthError, Result};
use hms_crypto::{constant_time_eq_str, random_token_hex};

const TOKEN_BYTES: usize = 32;

/// Token for the double-submit cookie. Set once per session establishment;
/// no server-side state.
pub fn issue_cookie_token() -> String {
    random_token_hex(TOKEN_BYTES)
}

/// The cookie the client script reads back and echoes in the header.
/// Deliberately not HttpOnly; Secure outside development.
pub fn build_csrf_cookie(token: &str, secure: bool) -> String {
    let mut cookie = format!("{}={}; SameSite=Strict; Path=/", CSRF_COOKIE, token);
    if secure {
        cookie.push_str("; Secure");
    }
    cookie
}

/// Stateless verification: the cookie value must equal the header value,
/// compared in constant time.
pub fn verify_double_submit(cookie_value: Option<&str>, header_value: Option<&str>) -> Result<()> {
    let cookie = cookie_value.ok_or(AuthError::CsrfTokenMissing)?;
    let header = header_value.ok_or(AuthError::CsrfTokenMissing)?;

    if cookie.is_empty() || header.is_empty() {
        return Err(AuthError::CsrfTokenMissing);
    }

    if !constant_time_eq_str(cookie, header) {
        return Err(AuthError::CsrfTokenInvalid);
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_matching_values_pass() {
        let token = issue_cookie_token();
        assert!(verify_double_submit(Some(&token), Some(&token)).is_ok());
    }

    #[test]
    fn test_mismatch_rejected() {
        let token = issue_cookie_token();
        let other = issue_cookie_token();
        assert!(matches!(
            verify_double_submit(Some(&token), Some(&other)),
            Err(AuthError::CsrfTokenInvalid)
        ));
    }

    #[test]
    fn test_missing_either_side_rejected() {
        let token = issue_cookie_token();
        assert!(matches!(
            verify_double_submit(None, Some(&token)),
            Err(AuthError::CsrfTokenMissing)
        ));
        assert!(matches!(
            verify_double_submit(Some(&token), None),
            Err(AuthError::CsrfTokenMissing)
        ));
        assert!(matches!(
            verify_double_submit(Some(""), Some("")),
            Err(AuthError::CsrfTokenMissing)
        ));
    }

    #[test]
    fn test_cookie_attributes() {
        let cookie = build_csrf_cookie("abc123", true);
        assert!(cookie.starts_with("csrf-token=abc123"));
        assert!(cookie.contains("SameSite=Strict"));
        assert!(cookie.contains("Secure"));
        assert!(!cookie.contains("HttpOnly"));

        let dev_cookie = build_csrf_cookie("abc123", false);
        assert!(!dev_cookie.contains("Secure"));
    }
}
