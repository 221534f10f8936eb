use crate::error::{AuthError, Result};
use crate::mfa::backup_codes::{generate_backup_codes, hash_backup_code, verify_backup_code};
use crate::mfa::sms::{generate_otp_code, SmsSender};
use crate::mfa::totp::{generate_secret, provisioning_uri, qr_code_png, verify_totp};
use chrono::Utc;
use hms_models::{
    AuditSink, SecondFactorMethod, SecondFactorProfile, SecondFactorStatus, SecurityEvent,
    SecurityEventKind, SecurityOutcome, SmsFactor, SmsOtpChallenge, TotpState,
};
use hms_store::SecondFactorStore;
use std::sync::Arc;
use uuid::Uuid;

/// Everything the client needs to finish TOTP setup. The secret and the
/// plaintext backup codes are shown exactly once.
pub struct TotpEnrollment {
    pub secret: String,
    pub otpauth_uri: String,
    pub qr_code_png: Vec<u8>,
    pub backup_codes: Vec<String>,
}

/// Outcome of binding a phone number.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SmsEnrollment {
    /// Factor active immediately (confirmation disabled by deployment).
    Enabled,
    /// An OTP was dispatched; `confirm_sms` must succeed before the
    /// factor gates login.
    ConfirmationSent,
}

/// Enrolls and verifies TOTP, SMS-OTP and backup-code second factors.
///
/// Callers must not grant a fully authenticated session until `verify`
/// returns true for accounts where 2FA is enabled.
pub struct TwoFactorService {
    store: Arc<dyn SecondFactorStore>,
    sms: Arc<dyn SmsSender>,
    audit: Arc<dyn AuditSink>,
    issuer: String,
    sms_enrollment_requires_confirmation: bool,
    sms_otp_ttl_minutes: i64,
}

impl TwoFactorService {
    pub fn new(
        store: Arc<dyn SecondFactorStore>,
        sms: Arc<dyn SmsSender>,
        audit: Arc<dyn AuditSink>,
        issuer: String,
        sms_enrollment_requires_confirmation: bool,
        sms_otp_ttl_minutes: i64,
    ) -> Self {
        Self {
            store,
            sms,
            audit,
            issuer,
            sms_enrollment_requires_confirmation,
            sms_otp_ttl_minutes,
        }
    }

    async fn load_or_new(&self, user_id: Uuid) -> Result<SecondFactorProfile> {
        Ok(self
            .store
            .get(user_id)
            .await?
            .unwrap_or_else(|| SecondFactorProfile::new(user_id)))
    }

    /// Whether a successful password check must still be gated by a
    /// second factor for this user.
    pub async fn is_required(&self, user_id: Uuid) -> Result<bool> {
        Ok(self
            .store
            .get(user_id)
            .await?
            .map(|p| p.requires_second_factor())
            .unwrap_or(false))
    }

    /// Start TOTP enrollment: generate the shared secret and a fresh
    /// backup-code set. The secret gates nothing until `verify_setup`
    /// confirms one live code.
    pub async fn enroll_totp(&self, user_id: Uuid, account_name: &str) -> Result<TotpEnrollment> {
        let mut profile = self.load_or_new(user_id).await?;

        if profile.totp.is_enabled() {
            return Err(AuthError::ValidationError(
                "TOTP is already enabled".to_string(),
            ));
        }

        let secret = generate_secret();
        let backup_codes = generate_backup_codes();
        profile.backup_code_hashes = backup_codes
            .iter()
            .map(|code| hash_backup_code(code))
            .collect::<Result<Vec<_>>>()?;
        profile.totp = TotpState::PendingSetup {
            secret: secret.clone(),
        };
        profile.updated_at = Utc::now();
        self.store.put(profile).await?;

        let otpauth_uri = provisioning_uri(&secret, account_name, &self.issuer);
        let qr = qr_code_png(&otpauth_uri)?;

        Ok(TotpEnrollment {
            secret,
            otpauth_uri,
            qr_code_png: qr,
            backup_codes,
        })
    }

    /// Confirm TOTP setup with one live code, activating the factor.
    pub async fn verify_setup(&self, user_id: Uuid, code: &str) -> Result<bool> {
        let mut profile = self.load_or_new(user_id).await?;

        let secret = match &profile.totp {
            TotpState::PendingSetup { secret } => secret.clone(),
            _ => {
                return Err(AuthError::ValidationError(
                    "no TOTP setup in progress".to_string(),
                ))
            }
        };

        if !verify_totp(&secret, code)? {
            self.record_factor_event(
                user_id,
                SecurityEventKind::SecondFactorFailed,
                SecurityOutcome::Failure,
                "totp setup confirmation failed",
            );
            return Ok(false);
        }

        profile.totp = TotpState::Enabled { secret };
        profile.updated_at = Utc::now();
        self.store.put(profile).await?;

        self.record_factor_event(
            user_id,
            SecurityEventKind::SecondFactorEnrolled,
            SecurityOutcome::Success,
            "totp enabled",
        );
        Ok(true)
    }

    /// Bind a phone number. Depending on deployment configuration the
    /// factor either activates immediately or waits for `confirm_sms`.
    pub async fn enroll_sms(&self, user_id: Uuid, phone_number: &str) -> Result<SmsEnrollment> {
        if phone_number.trim().is_empty() {
            return Err(AuthError::ValidationError(
                "phone number is required".to_string(),
            ));
        }

        let mut profile = self.load_or_new(user_id).await?;
        profile.sms = Some(SmsFactor {
            phone_number: phone_number.to_string(),
            enabled: !self.sms_enrollment_requires_confirmation,
        });
        profile.updated_at = Utc::now();

        if self.sms_enrollment_requires_confirmation {
            let code = self.start_otp_challenge(&mut profile)?;
            self.store.put(profile).await?;
            self.dispatch_otp(phone_number, &code).await;
            Ok(SmsEnrollment::ConfirmationSent)
        } else {
            self.store.put(profile).await?;
            self.record_factor_event(
                user_id,
                SecurityEventKind::SecondFactorEnrolled,
                SecurityOutcome::Success,
                "sms enabled without live-code confirmation",
            );
            Ok(SmsEnrollment::Enabled)
        }
    }

    /// Complete SMS enrollment with the OTP delivered to the new number.
    pub async fn confirm_sms(&self, user_id: Uuid, code: &str) -> Result<bool> {
        let mut profile = self.load_or_new(user_id).await?;

        if profile.sms.is_none() {
            return Err(AuthError::ValidationError(
                "no phone number bound".to_string(),
            ));
        }

        if !Self::check_and_consume_otp(&mut profile, code) {
            self.store.put(profile).await?;
            self.record_factor_event(
                user_id,
                SecurityEventKind::SecondFactorFailed,
                SecurityOutcome::Failure,
                "sms enrollment confirmation failed",
            );
            return Ok(false);
        }

        if let Some(sms) = profile.sms.as_mut() {
            sms.enabled = true;
        }
        profile.updated_at = Utc::now();
        self.store.put(profile).await?;

        self.record_factor_event(
            user_id,
            SecurityEventKind::SecondFactorEnrolled,
            SecurityOutcome::Success,
            "sms enabled",
        );
        Ok(true)
    }

    /// Generate and dispatch a login OTP to the user's enabled SMS factor.
    pub async fn send_login_otp(&self, user_id: Uuid) -> Result<()> {
        let mut profile = self.load_or_new(user_id).await?;

        let phone = match &profile.sms {
            Some(factor) if factor.enabled => factor.phone_number.clone(),
            _ => {
                return Err(AuthError::ValidationError(
                    "SMS factor not enabled".to_string(),
                ))
            }
        };

        let code = self.start_otp_challenge(&mut profile)?;
        self.store.put(profile).await?;
        self.dispatch_otp(&phone, &code).await;
        Ok(())
    }

    /// Verify a second factor for login gating.
    pub async fn verify(&self, user_id: Uuid, code: &str, method: SecondFactorMethod) -> Result<bool> {
        let verified = match method {
            SecondFactorMethod::Totp => {
                let profile = self.load_or_new(user_id).await?;
                match &profile.totp {
                    TotpState::Enabled { secret } => verify_totp(secret, code)?,
                    _ => false,
                }
            }
            SecondFactorMethod::Sms => {
                let mut profile = self.load_or_new(user_id).await?;
                let ok = profile.sms.as_ref().is_some_and(|s| s.enabled)
                    && Self::check_and_consume_otp(&mut profile, code);
                self.store.put(profile).await?;
                ok
            }
            SecondFactorMethod::Backup => {
                let consumed = self
                    .store
                    .consume_backup_code(user_id, &|hash| verify_backup_code(code, hash))
                    .await?;
                if consumed {
                    self.record_factor_event(
                        user_id,
                        SecurityEventKind::BackupCodeConsumed,
                        SecurityOutcome::Success,
                        "backup code used",
                    );
                }
                consumed
            }
        };

        self.record_factor_event(
            user_id,
            if verified {
                SecurityEventKind::SecondFactorVerified
            } else {
                SecurityEventKind::SecondFactorFailed
            },
            if verified {
                SecurityOutcome::Success
            } else {
                SecurityOutcome::Failure
            },
            format!("method={}", method),
        );

        Ok(verified)
    }

    pub async fn get_status(&self, user_id: Uuid) -> Result<SecondFactorStatus> {
        let profile = self.load_or_new(user_id).await?;
        Ok(SecondFactorStatus {
            totp_enabled: profile.totp.is_enabled(),
            totp_pending_setup: matches!(profile.totp, TotpState::PendingSetup { .. }),
            sms_enabled: profile.sms.as_ref().is_some_and(|s| s.enabled),
            backup_codes_remaining: profile.backup_code_hashes.len(),
        })
    }

    /// Clear every mechanism for a user. The caller layer must have
    /// re-confirmed the user's password immediately before invoking this.
    pub async fn disable(&self, user_id: Uuid) -> Result<()> {
        self.store.delete(user_id).await?;
        self.record_factor_event(
            user_id,
            SecurityEventKind::SecondFactorDisabled,
            SecurityOutcome::Success,
            "all second factors cleared",
        );
        Ok(())
    }

    /// Replace the backup-code set entirely; prior codes stop working.
    pub async fn regenerate_backup_codes(&self, user_id: Uuid) -> Result<Vec<String>> {
        let mut profile = self.load_or_new(user_id).await?;

        let codes = generate_backup_codes();
        profile.backup_code_hashes = codes
            .iter()
            .map(|code| hash_backup_code(code))
            .collect::<Result<Vec<_>>>()?;
        profile.updated_at = Utc::now();
        self.store.put(profile).await?;

        Ok(codes)
    }

    fn start_otp_challenge(&self, profile: &mut SecondFactorProfile) -> Result<String> {
        let code = generate_otp_code();
        let now = Utc::now();
        profile.pending_sms_otp = Some(SmsOtpChallenge {
            code_hash: hms_crypto::hash_secret(&code)?,
            created_at: now,
            expires_at: now + chrono::Duration::minutes(self.sms_otp_ttl_minutes),
        });
        Ok(code)
    }

    /// True when the pending OTP matches and has not expired. The
    /// challenge is cleared either way once a decision is made; callers
    /// persist the profile.
    fn check_and_consume_otp(profile: &mut SecondFactorProfile, code: &str) -> bool {
        let challenge = match profile.pending_sms_otp.take() {
            Some(c) => c,
            None => return false,
        };

        if Utc::now() > challenge.expires_at {
            return false;
        }

        hms_crypto::verify_secret(code, &challenge.code_hash).unwrap_or(false)
    }

    /// Delivery is fire-and-forget: a gateway failure is logged, not
    /// surfaced, and the challenge stays pending for a retry.
    async fn dispatch_otp(&self, phone_number: &str, code: &str) {
        let message = format!("Your verification code is {}", code);
        if let Err(e) = self.sms.send(phone_number, &message).await {
            tracing::warn!(error = %e, "SMS OTP dispatch failed");
        }
    }

    fn record_factor_event(
        &self,
        user_id: Uuid,
        kind: SecurityEventKind,
        outcome: SecurityOutcome,
        detail: impl Into<String>,
    ) {
        self.audit.record(
            SecurityEvent::builder(kind, outcome)
                .user(user_id)
                .detail(detail)
                .build(),
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mfa::totp::generate_totp;
    use async_trait::async_trait;
    use hms_models::TracingAuditSink;
    use hms_store::InMemorySecondFactorStore;
    use std::sync::Mutex;

    /// Records the last message so tests can read the OTP back out.
    #[derive(Default)]
    struct CapturingSmsSender {
        last: Mutex<Option<String>>,
    }

    impl CapturingSmsSender {
        fn last_code(&self) -> Option<String> {
            self.last.lock().unwrap().as_ref().map(|message| {
                message
                    .chars()
                    .filter(|c| c.is_ascii_digit())
                    .collect::<String>()
            })
        }
    }

    #[async_trait]
    impl SmsSender for CapturingSmsSender {
        async fn send(&self, _phone_number: &str, message: &str) -> Result<()> {
            *self.last.lock().unwrap() = Some(message.to_string());
            Ok(())
        }
    }

    fn service(
        requires_confirmation: bool,
    ) -> (TwoFactorService, Arc<CapturingSmsSender>) {
        let sms = Arc::new(CapturingSmsSender::default());
        let service = TwoFactorService::new(
            Arc::new(InMemorySecondFactorStore::new()),
            sms.clone(),
            Arc::new(TracingAuditSink),
            "HMS".to_string(),
            requires_confirmation,
            5,
        );
        (service, sms)
    }

    #[tokio::test]
    async fn test_totp_enrollment_state_machine() {
        let (service, _) = service(true);
        let user_id = Uuid::new_v4();

        let enrollment = service.enroll_totp(user_id, "nward@stmarys.example").await.unwrap();
        assert_eq!(enrollment.backup_codes.len(), 10);

        // Pending setup does not gate login yet
        assert!(!service.is_required(user_id).await.unwrap());
        let status = service.get_status(user_id).await.unwrap();
        assert!(status.totp_pending_setup);
        assert!(!status.totp_enabled);

        // Wrong code keeps it pending
        assert!(!service.verify_setup(user_id, "000000").await.unwrap()
            || generate_totp(&enrollment.secret).unwrap() == "000000");

        let live_code = generate_totp(&enrollment.secret).unwrap();
        assert!(service.verify_setup(user_id, &live_code).await.unwrap());

        assert!(service.is_required(user_id).await.unwrap());
        assert!(service
            .verify(user_id, &generate_totp(&enrollment.secret).unwrap(), SecondFactorMethod::Totp)
            .await
            .unwrap());
    }

    #[tokio::test]
    async fn test_verify_setup_without_enrollment_errors() {
        let (service, _) = service(true);
        assert!(service.verify_setup(Uuid::new_v4(), "123456").await.is_err());
    }

    #[tokio::test]
    async fn test_backup_code_single_use() {
        let (service, _) = service(true);
        let user_id = Uuid::new_v4();

        let enrollment = service.enroll_totp(user_id, "nward@stmarys.example").await.unwrap();
        let code = enrollment.backup_codes[3].clone();

        assert!(service
            .verify(user_id, &code, SecondFactorMethod::Backup)
            .await
            .unwrap());
        let status = service.get_status(user_id).await.unwrap();
        assert_eq!(status.backup_codes_remaining, 9);

        // Same code again must fail and not consume anything further
        assert!(!service
            .verify(user_id, &code, SecondFactorMethod::Backup)
            .await
            .unwrap());
        let status = service.get_status(user_id).await.unwrap();
        assert_eq!(status.backup_codes_remaining, 9);
    }

    #[tokio::test]
    async fn test_sms_enroll_with_confirmation() {
        let (service, sms) = service(true);
        let user_id = Uuid::new_v4();

        let outcome = service.enroll_sms(user_id, "+15550100").await.unwrap();
        assert_eq!(outcome, SmsEnrollment::ConfirmationSent);
        assert!(!service.get_status(user_id).await.unwrap().sms_enabled);

        let code = sms.last_code().unwrap();
        assert!(service.confirm_sms(user_id, &code).await.unwrap());
        assert!(service.get_status(user_id).await.unwrap().sms_enabled);
        assert!(service.is_required(user_id).await.unwrap());
    }

    #[tokio::test]
    async fn test_sms_enroll_without_confirmation() {
        let (service, _) = service(false);
        let user_id = Uuid::new_v4();

        let outcome = service.enroll_sms(user_id, "+15550100").await.unwrap();
        assert_eq!(outcome, SmsEnrollment::Enabled);
        assert!(service.get_status(user_id).await.unwrap().sms_enabled);
    }

    #[tokio::test]
    async fn test_sms_login_otp_is_single_use() {
        let (service, sms) = service(false);
        let user_id = Uuid::new_v4();
        service.enroll_sms(user_id, "+15550100").await.unwrap();

        service.send_login_otp(user_id).await.unwrap();
        let code = sms.last_code().unwrap();

        assert!(service
            .verify(user_id, &code, SecondFactorMethod::Sms)
            .await
            .unwrap());
        // Consumed: the same OTP cannot pass twice
        assert!(!service
            .verify(user_id, &code, SecondFactorMethod::Sms)
            .await
            .unwrap());
    }

    #[tokio::test]
    async fn test_disable_clears_everything() {
        let (service, _) = service(false);
        let user_id = Uuid::new_v4();

        let enrollment = service.enroll_totp(user_id, "nward@stmarys.example").await.unwrap();
        let live_code = generate_totp(&enrollment.secret).unwrap();
        service.verify_setup(user_id, &live_code).await.unwrap();
        service.enroll_sms(user_id, "+15550100").await.unwrap();

        service.disable(user_id).await.unwrap();

        let status = service.get_status(user_id).await.unwrap();
        assert!(!status.totp_enabled);
        assert!(!status.sms_enabled);
        assert_eq!(status.backup_codes_remaining, 0);
        assert!(!service.is_required(user_id).await.unwrap());
    }

    #[tokio::test]
    async fn test_regenerate_replaces_backup_codes() {
        let (service, _) = service(true);
        let user_id = Uuid::new_v4();

        let enrollment = service.enroll_totp(user_id, "nward@stmarys.example").await.unwrap();
        let old_code = enrollment.backup_codes[0].clone();

        let fresh = service.regenerate_backup_codes(user_id).await.unwrap();
        assert_eq!(fresh.len(), 10);

        assert!(!service
            .verify(user_id, &old_code, SecondFactorMethod::Backup)
            .await
            .unwrap());
        assert!(service
            .verify(user_id, &fresh[0], SecondFactorMethod::Backup)
            .await
            .unwrap());
    }
}
