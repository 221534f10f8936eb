use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// TOTP enrollment state machine.
///
/// The secret generated during setup is not trusted for login gating until
/// the user has verified one live code (`PendingSetup` -> `Enabled`).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum TotpState {
    Disabled,
    PendingSetup { secret: String },
    Enabled { secret: String },
}

impl TotpState {
    pub fn is_enabled(&self) -> bool {
        matches!(self, TotpState::Enabled { .. })
    }
}

/// SMS second factor. Whether binding a phone number requires a live OTP
/// confirmation before the factor is enabled is a deployment decision.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SmsFactor {
    pub phone_number: String,
    pub enabled: bool,
}

/// An outstanding SMS OTP. The code itself is stored as a salted hash.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SmsOtpChallenge {
    pub code_hash: String,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

/// Per-user second-factor enrollment record.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SecondFactorProfile {
    pub user_id: Uuid,
    pub totp: TotpState,
    pub sms: Option<SmsFactor>,
    /// Argon2 hashes of the outstanding backup codes. Each code is
    /// single-use; verification removes the matched hash.
    pub backup_code_hashes: Vec<String>,
    pub pending_sms_otp: Option<SmsOtpChallenge>,
    pub updated_at: DateTime<Utc>,
}

impl SecondFactorProfile {
    pub fn new(user_id: Uuid) -> Self {
        Self {
            user_id,
            totp: TotpState::Disabled,
            sms: None,
            backup_code_hashes: Vec::new(),
            pending_sms_otp: None,
            updated_at: Utc::now(),
        }
    }

    /// True when at least one mechanism gates login for this user.
    pub fn requires_second_factor(&self) -> bool {
        self.totp.is_enabled() || self.sms.as_ref().is_some_and(|s| s.enabled)
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum SecondFactorMethod {
    Totp,
    Sms,
    Backup,
}

impl std::fmt::Display for SecondFactorMethod {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SecondFactorMethod::Totp => write!(f, "totp"),
            SecondFactorMethod::Sms => write!(f, "sms"),
            SecondFactorMethod::Backup => write!(f, "backup"),
        }
    }
}

/// Enrollment summary returned to the client.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SecondFactorStatus {
    pub totp_enabled: bool,
    pub totp_pending_setup: bool,
    pub sms_enabled: bool,
    pub backup_codes_remaining: usize,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_requires_second_factor() {
        let mut profile = SecondFactorProfile::new(Uuid::new_v4());
        assert!(!profile.requires_second_factor());

        // A pending setup does not gate login yet
        profile.totp = TotpState::PendingSetup {
            secret: "JBSWY3DPEHPK3PXP".to_string(),
        };
        assert!(!profile.requires_second_factor());

        profile.totp = TotpState::Enabled {
            secret: "JBSWY3DPEHPK3PXP".to_string(),
        };
        assert!(profile.requires_second_factor());

        profile.totp = TotpState::Disabled;
        profile.sms = Some(SmsFactor {
            phone_number: "+15550100".to_string(),
            enabled: true,
        });
        assert!(profile.requires_second_factor());
    }
}
