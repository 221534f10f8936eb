use thiserror::Error;

pub type Result<T> = std::result::Result<T, AuthError>;

#[derive(Debug, Error)]
pub enum AuthError {
    #[error("Invalid credentials")]
    InvalidCredentials,

    #[error("Authentication credential missing")]
    MissingCredential,

    #[error("Credential expired")]
    ExpiredCredential,

    #[error("Invalid credential: {0}")]
    InvalidCredential(String),

    #[error("Session revoked")]
    RevokedSession,

    #[error("Refresh token already consumed")]
    ReplayedRefreshToken,

    #[error("CSRF token missing")]
    CsrfTokenMissing,

    #[error("CSRF token invalid or expired")]
    CsrfTokenInvalid,

    #[error("Second factor required")]
    SecondFactorRequired { pending_token: String },

    #[error("Invalid second factor")]
    SecondFactorInvalid,

    #[error("Validation error: {0}")]
    ValidationError(String),

    #[error("Store error: {0}")]
    Store(#[from] hms_store::StoreError),

    #[error("Crypto error: {0}")]
    Crypto(#[from] hms_crypto::CryptoError),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl From<jsonwebtoken::errors::Error> for AuthError {
    fn from(err: jsonwebtoken::errors::Error) -> Self {
        use jsonwebtoken::errors::ErrorKind;
        match err.kind() {
            ErrorKind::ExpiredSignature => AuthError::ExpiredCredential,
            _ => AuthError::InvalidCredential(err.to_string()),
        }
    }
}
