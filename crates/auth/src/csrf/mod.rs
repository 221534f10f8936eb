//! Anti-forgery defense, independent of the bearer-token service.
//!
//! Two enforcement strategies, selectable per deployment: a server-side
//! stored token bound to the session, and a stateless double-submit
//! cookie. Both compare in constant time only.

pub mod double_submit;
pub mod stored;

pub use double_submit::{build_csrf_cookie, issue_cookie_token, verify_double_submit};
pub use stored::StoredTokenGuard;

use serde::{Deserialize, Serialize};

/// Header carrying the client's echo of the CSRF token.
pub const CSRF_HEADER: &str = "x-csrf-token";

/// Cookie used by the double-submit strategy. Not httpOnly: the client
/// script must read it to echo it in the header.
pub const CSRF_COOKIE: &str = "csrf-token";

/// Marker header for machine-to-machine callers authenticating with an
/// API-client credential. CSRF targets browser credential reuse, so these
/// callers are exempt.
pub const API_CLIENT_HEADER: &str = "x-api-client";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CsrfStrategy {
    Stored,
    DoubleSubmit,
}

/// Whether a request must present a CSRF token. Safe (read-only) methods
/// and API-client calls are exempt.
pub fn requires_csrf_check(method: &str, has_api_client_header: bool) -> bool {
    if has_api_client_header {
        return false;
    }
    !matches!(method, "GET" | "HEAD" | "OPTIONS")
}
