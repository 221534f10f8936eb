use crate::error::{AuthError, Result};
use chrono::{Duration, Utc};
use hms_models::{AuthenticatedPrincipal, Session};
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct Claims {
    pub sub: String,         // User ID
    pub username: String,
    pub tenant_id: String,
    pub branch_id: String,
    pub role_ids: Vec<Uuid>, // Snapshot at issuance, stale until re-login
    pub sid: String,         // Session ID
    pub exp: i64,
    pub iat: i64,
    pub jti: String,
    pub token_type: TokenType,
}

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq)]
#[serde(rename_all = "lowercase")]
pub enum TokenType {
    Access,
    Refresh,
    /// Password accepted but a second factor is still outstanding.
    Pending,
}

impl Claims {
    pub fn user_id(&self) -> Result<Uuid> {
        Uuid::parse_str(&self.sub)
            .map_err(|_| AuthError::InvalidCredential("malformed user id".to_string()))
    }

    pub fn session_id(&self) -> Result<Uuid> {
        Uuid::parse_str(&self.sid)
            .map_err(|_| AuthError::InvalidCredential("malformed session id".to_string()))
    }

    pub fn to_principal(&self) -> Result<AuthenticatedPrincipal> {
        Ok(AuthenticatedPrincipal {
            user_id: self.user_id()?,
            username: self.username.clone(),
            tenant_id: Uuid::parse_str(&self.tenant_id)
                .map_err(|_| AuthError::InvalidCredential("malformed tenant id".to_string()))?,
            branch_id: Uuid::parse_str(&self.branch_id)
                .map_err(|_| AuthError::InvalidCredential("malformed branch id".to_string()))?,
            role_ids: self.role_ids.clone(),
            session_id: self.session_id()?,
        })
    }
}

pub struct JwtService {
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
    algorithm: Algorithm,
    access_token_ttl_minutes: i64,
    refresh_token_ttl_days: i64,
    pending_token_ttl_minutes: i64,
}

impl JwtService {
    pub fn new(secret: &str) -> Self {
        Self {
            encoding_key: EncodingKey::from_secret(secret.as_bytes()),
            decoding_key: DecodingKey::from_secret(secret.as_bytes()),
            algorithm: Algorithm::HS256,
            // Short access TTL bounds the revocation exposure window
            access_token_ttl_minutes: 15,
            refresh_token_ttl_days: 7,
            pending_token_ttl_minutes: 5,
        }
    }

    pub fn with_ttls(
        secret: &str,
        access_token_ttl_minutes: i64,
        refresh_token_ttl_days: i64,
        pending_token_ttl_minutes: i64,
    ) -> Self {
        Self {
            access_token_ttl_minutes,
            refresh_token_ttl_days,
            pending_token_ttl_minutes,
            ..Self::new(secret)
        }
    }

    pub fn refresh_token_ttl_days(&self) -> i64 {
        self.refresh_token_ttl_days
    }

    /// Generate an access token for a session. Verification of the result
    /// is stateless: signature and expiry only.
    pub fn generate_access_token(&self, session: &Session) -> Result<String> {
        let now = Utc::now();
        let exp = now + Duration::minutes(self.access_token_ttl_minutes);
        self.encode_claims(session, TokenType::Access, now.timestamp(), exp.timestamp(), None)
    }

    /// Generate a refresh token carrying `jti` as its rotation chain
    /// marker. The session stores only the digest of this value, so the
    /// store never holds replayable token material.
    pub fn generate_refresh_token(&self, session: &Session, jti: &str) -> Result<String> {
        let now = Utc::now();
        let exp = now + Duration::days(self.refresh_token_ttl_days);
        self.encode_claims(
            session,
            TokenType::Refresh,
            now.timestamp(),
            exp.timestamp(),
            Some(jti.to_string()),
        )
    }

    /// Short-lived token bridging password success and second-factor
    /// completion. Grants no API access.
    pub fn generate_pending_token(&self, session: &Session) -> Result<String> {
        let now = Utc::now();
        let exp = now + Duration::minutes(self.pending_token_ttl_minutes);
        self.encode_claims(session, TokenType::Pending, now.timestamp(), exp.timestamp(), None)
    }

    fn encode_claims(
        &self,
        session: &Session,
        token_type: TokenType,
        iat: i64,
        exp: i64,
        jti: Option<String>,
    ) -> Result<String> {
        let claims = Claims {
            sub: session.user_id.to_string(),
            username: session.username.clone(),
            tenant_id: session.tenant_id.to_string(),
            branch_id: session.branch_id.to_string(),
            role_ids: session.role_ids.clone(),
            sid: session.session_id.to_string(),
            exp,
            iat,
            jti: jti.unwrap_or_else(|| Uuid::new_v4().to_string()),
            token_type,
        };

        let token = encode(&Header::new(self.algorithm), &claims, &self.encoding_key)?;
        Ok(token)
    }

    /// Validate and decode a token of any type.
    pub fn validate_token(&self, token: &str) -> Result<Claims> {
        let validation = Validation::new(self.algorithm);
        let token_data = decode::<Claims>(token, &self.decoding_key, &validation)?;
        Ok(token_data.claims)
    }

    pub fn validate_access_token(&self, token: &str) -> Result<Claims> {
        let claims = self.validate_token(token)?;
        if claims.token_type != TokenType::Access {
            return Err(AuthError::InvalidCredential(
                "token is not an access token".to_string(),
            ));
        }
        Ok(claims)
    }

    pub fn validate_refresh_token(&self, token: &str) -> Result<Claims> {
        let claims = self.validate_token(token)?;
        if claims.token_type != TokenType::Refresh {
            return Err(AuthError::InvalidCredential(
                "token is not a refresh token".to_string(),
            ));
        }
        Ok(claims)
    }

    pub fn validate_pending_token(&self, token: &str) -> Result<Claims> {
        let claims = self.validate_token(token)?;
        if claims.token_type != TokenType::Pending {
            return Err(AuthError::InvalidCredential(
                "token is not a pending-login token".to_string(),
            ));
        }
        Ok(claims)
    }
}

/// SHA-256 digest of a token, for server-side storage of token references.
pub fn hash_token(token: &str) -> String {
    hms_crypto::sha256_hex(token.as_bytes())
}
