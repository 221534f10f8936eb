pub mod backup_codes;
pub mod service;
pub mod sms;
pub mod totp;

pub use backup_codes::{generate_backup_codes, hash_backup_code, verify_backup_code};
pub use service::{SmsEnrollment, TotpEnrollment, TwoFactorService};
pub use sms::{generate_otp_code, HttpSmsSender, NoopSmsSender, SmsSender};
pub use totp::{generate_secret, generate_totp, provisioning_uri, qr_code_png, verify_totp};
