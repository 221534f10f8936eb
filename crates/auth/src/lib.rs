//! Credential and session security core: token pairs with rotation,
//! session concurrency and inactivity policy, CSRF strategies, and
//! second-factor enrollment/verification.

pub mod config;
pub mod csrf;
pub mod error;
pub mod identity;
pub mod jwt;
pub mod mfa;
pub mod sweeper;
pub mod tokens;

pub use config::AuthConfig;
pub use csrf::{
    build_csrf_cookie, issue_cookie_token, requires_csrf_check, verify_double_submit,
    CsrfStrategy, StoredTokenGuard, API_CLIENT_HEADER, CSRF_COOKIE, CSRF_HEADER,
};
pub use error::{AuthError, Result};
pub use identity::{CredentialVerifier, InMemoryDirectory, VerifiedIdentity};
pub use jwt::{Claims, JwtService, TokenType};
pub use mfa::{
    HttpSmsSender, NoopSmsSender, SmsEnrollment, SmsSender, TotpEnrollment, TwoFactorService,
};
pub use sweeper::{start_csrf_sweep, start_inactivity_sweep};
pub use tokens::{IssueRequest, IssuedTokens, TokenService};
