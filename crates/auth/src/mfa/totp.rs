use crate::error::{AuthError, Result};
use base32::Alphabet;
use hms_crypto::constant_time_eq_str;
use image::Luma;
use qrcode::QrCode;
use rand::RngCore;
use totp_lite::{totp_custom, Sha1};

const TOTP_DIGITS: u32 = 6;
const TOTP_STEP: u64 = 30;
const SECRET_BYTES: usize = 20;

/// Generate a random base32-encoded TOTP shared secret.
pub fn generate_secret() -> String {
    let mut secret_bytes = [0u8; SECRET_BYTES];
    rand::rngs::OsRng.fill_bytes(&mut secret_bytes);
    base32::encode(Alphabet::Rfc4648 { padding: false }, &secret_bytes)
}

fn code_at(secret_bytes: &[u8], time: u64) -> String {
    let value = totp_custom::<Sha1>(TOTP_STEP, TOTP_DIGITS, secret_bytes, time);
    format!("{:0width$}", value, width = TOTP_DIGITS as usize)
}

fn unix_now() -> Result<u64> {
    Ok(std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map_err(|e| AuthError::Internal(format!("system clock error: {}", e)))?
        .as_secs())
}

fn decode_secret(secret: &str) -> Result<Vec<u8>> {
    base32::decode(Alphabet::Rfc4648 { padding: false }, secret)
        .ok_or_else(|| AuthError::ValidationError("invalid TOTP secret format".to_string()))
}

/// Current code for a secret. Test and enrollment-preview use only.
pub fn generate_totp(secret: &str) -> Result<String> {
    let secret_bytes = decode_secret(secret)?;
    Ok(code_at(&secret_bytes, unix_now()?))
}

/// Verify a TOTP code, accepting one step of clock drift either way.
pub fn verify_totp(secret: &str, code: &str) -> Result<bool> {
    let secret_bytes = decode_secret(secret)?;
    let now = unix_now()?;

    for offset in [-1i64, 0, 1] {
        let window = (now as i64 + offset * TOTP_STEP as i64) as u64;
        if constant_time_eq_str(&code_at(&secret_bytes, window), code) {
            return Ok(true);
        }
    }

    Ok(false)
}

/// otpauth:// provisioning URI for authenticator apps.
pub fn provisioning_uri(secret: &str, account_name: &str, issuer: &str) -> String {
    format!(
        "otpauth://totp/{}:{}?secret={}&issuer={}&algorithm=SHA1&digits={}&period={}",
        urlencoding::encode(issuer),
        urlencoding::encode(account_name),
        secret,
        urlencoding::encode(issuer),
        TOTP_DIGITS,
        TOTP_STEP
    )
}

/// Render a provisioning URI as a PNG QR code.
pub fn qr_code_png(uri: &str) -> Result<Vec<u8>> {
    let qr = QrCode::new(uri.as_bytes())
        .map_err(|e| AuthError::Internal(format!("QR code generation failed: {}", e)))?;

    let rendered = qr.render::<Luma<u8>>().min_dimensions(256, 256).build();

    let mut png = Vec::new();
    image::DynamicImage::ImageLuma8(rendered)
        .write_to(&mut std::io::Cursor::new(&mut png), image::ImageFormat::Png)
        .map_err(|e| AuthError::Internal(format!("PNG encoding failed: {}", e)))?;

    Ok(png)
}
