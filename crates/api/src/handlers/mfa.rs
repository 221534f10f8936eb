use crate::handlers::auth::{auth_error, ErrorResponse, MessageResponse};
use crate::AppState;
use axum::{extract::State, http::StatusCode, Extension, Json};
use base64::Engine;
use hms_auth::{AuthError, SmsEnrollment};
use hms_models::{AuthenticatedPrincipal, SecondFactorStatus};
use crate::handlers::auth::check_valid;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use validator::Validate;

#[derive(Debug, Serialize)]
pub struct TotpEnrollmentResponse {
    pub secret: String,
    pub otpauth_uri: String,
    /// PNG, base64-encoded for JSON transport.
    pub qr_code_png: String,
    pub backup_codes: Vec<String>,
}

/// Begin TOTP enrollment. The secret and backup codes in the response are
/// shown exactly once; the factor activates after `verify_totp_setup`.
pub async fn enroll_totp(
    State(state): State<Arc<AppState>>,
    Extension(principal): Extension<AuthenticatedPrincipal>,
) -> Result<Json<TotpEnrollmentResponse>, (StatusCode, Json<ErrorResponse>)> {
    let enrollment = state
        .two_factor
        .enroll_totp(principal.user_id, &principal.username)
        .await
        .map_err(auth_error)?;

    Ok(Json(TotpEnrollmentResponse {
        secret: enrollment.secret,
        otpauth_uri: enrollment.otpauth_uri,
        qr_code_png: base64::engine::general_purpose::STANDARD.encode(enrollment.qr_code_png),
        backup_codes: enrollment.backup_codes,
    }))
}

#[derive(Debug, Deserialize, Validate)]
pub struct CodeRequest {
    #[validate(length(min = 6, max = 16))]
    pub code: String,
}

#[derive(Debug, Serialize)]
pub struct VerifiedResponse {
    pub verified: bool,
}

/// Confirm TOTP setup with one live code.
pub async fn verify_totp_setup(
    State(state): State<Arc<AppState>>,
    Extension(principal): Extension<AuthenticatedPrincipal>,
    Json(request): Json<CodeRequest>,
) -> Result<Json<VerifiedResponse>, (StatusCode, Json<ErrorResponse>)> {
    check_valid(&request)?;

    let verified = state
        .two_factor
        .verify_setup(principal.user_id, &request.code)
        .await
        .map_err(auth_error)?;
    Ok(Json(VerifiedResponse { verified }))
}

#[derive(Debug, Deserialize, Validate)]
pub struct SmsEnrollRequest {
    #[validate(length(min = 7, max = 20))]
    pub phone_number: String,
}

#[derive(Debug, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum SmsEnrollResponse {
    Enabled,
    ConfirmationSent,
}

/// Bind a phone number as a second factor.
pub async fn enroll_sms(
    State(state): State<Arc<AppState>>,
    Extension(principal): Extension<AuthenticatedPrincipal>,
    Json(request): Json<SmsEnrollRequest>,
) -> Result<Json<SmsEnrollResponse>, (StatusCode, Json<ErrorResponse>)> {
    check_valid(&request)?;

    let outcome = state
        .two_factor
        .enroll_sms(principal.user_id, &request.phone_number)
        .await
        .map_err(auth_error)?;

    Ok(Json(match outcome {
        SmsEnrollment::Enabled => SmsEnrollResponse::Enabled,
        SmsEnrollment::ConfirmationSent => SmsEnrollResponse::ConfirmationSent,
    }))
}

/// Complete SMS enrollment with the delivered OTP.
pub async fn confirm_sms(
    State(state): State<Arc<AppState>>,
    Extension(principal): Extension<AuthenticatedPrincipal>,
    Json(request): Json<CodeRequest>,
) -> Result<Json<VerifiedResponse>, (StatusCode, Json<ErrorResponse>)> {
    check_valid(&request)?;

    let verified = state
        .two_factor
        .confirm_sms(principal.user_id, &request.code)
        .await
        .map_err(auth_error)?;
    Ok(Json(VerifiedResponse { verified }))
}

/// Enrollment overview for the settings screen.
pub async fn status(
    State(state): State<Arc<AppState>>,
    Extension(principal): Extension<AuthenticatedPrincipal>,
) -> Result<Json<SecondFactorStatus>, (StatusCode, Json<ErrorResponse>)> {
    let status = state
        .two_factor
        .get_status(principal.user_id)
        .await
        .map_err(auth_error)?;
    Ok(Json(status))
}

#[derive(Debug, Deserialize)]
pub struct DisableRequest {
    /// Fresh password confirmation; a stolen session must not be enough
    /// to strip 2FA.
    pub password: String,
}

pub async fn disable(
    State(state): State<Arc<AppState>>,
    Extension(principal): Extension<AuthenticatedPrincipal>,
    Json(request): Json<DisableRequest>,
) -> Result<Json<MessageResponse>, (StatusCode, Json<ErrorResponse>)> {
    let identity = state
        .directory
        .verify_credentials(principal.tenant_id, &principal.username, &request.password)
        .await
        .map_err(auth_error)?;
    if identity.is_none() {
        return Err(auth_error(AuthError::InvalidCredentials));
    }

    state
        .two_factor
        .disable(principal.user_id)
        .await
        .map_err(auth_error)?;

    Ok(Json(MessageResponse {
        message: "Second factors disabled".to_string(),
    }))
}

#[derive(Debug, Serialize)]
pub struct BackupCodesResponse {
    pub backup_codes: Vec<String>,
}

/// Replace the backup-code set; previous codes stop working immediately.
pub async fn regenerate_backup_codes(
    State(state): State<Arc<AppState>>,
    Extension(principal): Extension<AuthenticatedPrincipal>,
) -> Result<Json<BackupCodesResponse>, (StatusCode, Json<ErrorResponse>)> {
    let backup_codes = state
        .two_factor
        .regenerate_backup_codes(principal.user_id)
        .await
        .map_err(auth_error)?;
    Ok(Json(BackupCodesResponse { backup_codes }))
}
