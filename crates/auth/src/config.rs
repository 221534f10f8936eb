use crate::error::{AuthError, Result};

/// Tunables for the security core, read from the environment. Every knob
/// has a production-reasonable default except the signing secret.
#[derive(Debug, Clone)]
pub struct AuthConfig {
    pub jwt_secret: String,
    pub access_token_ttl_minutes: i64,
    pub refresh_token_ttl_days: i64,
    pub pending_token_ttl_minutes: i64,
    pub max_concurrent_sessions: usize,
    pub inactivity_timeout_minutes: i64,
    pub csrf_token_ttl_minutes: i64,
    pub csrf_sweep_interval_secs: u64,
    pub session_sweep_interval_secs: u64,
    pub sms_enrollment_requires_confirmation: bool,
    pub sms_otp_ttl_minutes: i64,
    pub totp_issuer: String,
}

fn env_parse<T: std::str::FromStr>(key: &str, default: T) -> T {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

impl AuthConfig {
    pub fn from_env() -> Result<Self> {
        let jwt_secret = std::env::var("JWT_SECRET")
            .map_err(|_| AuthError::Internal("JWT_SECRET must be set".to_string()))?;

        Ok(Self {
            jwt_secret,
            access_token_ttl_minutes: env_parse("ACCESS_TOKEN_TTL_MINUTES", 15),
            refresh_token_ttl_days: env_parse("REFRESH_TOKEN_TTL_DAYS", 7),
            pending_token_ttl_minutes: env_parse("PENDING_TOKEN_TTL_MINUTES", 5),
            max_concurrent_sessions: env_parse("MAX_CONCURRENT_SESSIONS", 3),
            inactivity_timeout_minutes: env_parse("SESSION_INACTIVITY_TIMEOUT_MINUTES", 30),
            csrf_token_ttl_minutes: env_parse("CSRF_TOKEN_TTL_MINUTES", 60),
            csrf_sweep_interval_secs: env_parse("CSRF_SWEEP_INTERVAL_SECS", 900),
            session_sweep_interval_secs: env_parse("SESSION_SWEEP_INTERVAL_SECS", 300),
            sms_enrollment_requires_confirmation: env_parse(
                "SMS_ENROLLMENT_REQUIRES_CONFIRMATION",
                true,
            ),
            sms_otp_ttl_minutes: env_parse("SMS_OTP_TTL_MINUTES", 5),
            totp_issuer: std::env::var("TOTP_ISSUER").unwrap_or_else(|_| "HMS".to_string()),
        })
    }
}
