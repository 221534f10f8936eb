use crate::error::{CryptoError, Result};
use aes_gcm::{
    aead::{Aead, KeyInit},
    Aes256Gcm, Nonce,
};
use argon2::Argon2;
use rand::RngCore;
use std::collections::HashMap;

const NONCE_LEN: usize = 12;
const TAG_LEN: usize = 16;

/// Application-level salt for field-key derivation. Fixed by design: the
/// key must be reproducible across processes from the configured secret.
const KEY_DERIVATION_SALT: &[u8] = b"hms-phi-field-encryption";

/// Derive a 256-bit field-encryption key from a configured secret.
///
/// Argon2id is deliberately slow; call once at startup, never per request.
fn derive_key(secret: &str) -> Result<[u8; 32]> {
    let mut key = [0u8; 32];
    Argon2::default()
        .hash_password_into(secret.as_bytes(), KEY_DERIVATION_SALT, &mut key)
        .map_err(|e| CryptoError::KeyDerivation(e.to_string()))?;
    Ok(key)
}

/// Versioned registry of field-encryption keys.
///
/// Key id 1 is the original single-key scheme; its ciphertexts use the bare
/// `iv:tag:cipher` format. Later keys prefix their ciphertexts with `k<id>:`
/// so rotation needs no breaking format change.
pub struct KeyRegistry {
    keys: HashMap<u32, Aes256Gcm>,
    active: u32,
}

impl KeyRegistry {
    /// Registry with a single key (id 1) derived from `secret`.
    pub fn from_secret(secret: &str) -> Result<Self> {
        let mut registry = Self {
            keys: HashMap::new(),
            active: 1,
        };
        registry.add_key(1, secret)?;
        Ok(registry)
    }

    /// Derive and register an additional key under `key_id`.
    pub fn add_key(&mut self, key_id: u32, secret: &str) -> Result<()> {
        let key = derive_key(secret)?;
        let cipher = Aes256Gcm::new_from_slice(&key)
            .map_err(|e| CryptoError::KeyDerivation(e.to_string()))?;
        self.keys.insert(key_id, cipher);
        Ok(())
    }

    /// Select which key new ciphertexts are produced under. Decryption
    /// keeps working for every registered key.
    pub fn set_active(&mut self, key_id: u32) -> Result<()> {
        if !self.keys.contains_key(&key_id) {
            return Err(CryptoError::UnknownKey(key_id));
        }
        self.active = key_id;
        Ok(())
    }

    fn cipher(&self, key_id: u32) -> Result<&Aes256Gcm> {
        self.keys.get(&key_id).ok_or(CryptoError::UnknownKey(key_id))
    }
}

/// Encrypts and decrypts protected-health-information field values for
/// at-rest storage. One fresh random IV per encryption; tag mismatch on
/// decrypt fails closed, never returning partial plaintext.
pub struct FieldCipher {
    registry: KeyRegistry,
}

impl FieldCipher {
    pub fn new(registry: KeyRegistry) -> Self {
        Self { registry }
    }

    pub fn from_secret(secret: &str) -> Result<Self> {
        Ok(Self::new(KeyRegistry::from_secret(secret)?))
    }

    /// Encrypt a field value as `ivHex:authTagHex:cipherHex` (key id 1) or
    /// `k<id>:ivHex:authTagHex:cipherHex` (rotated keys).
    pub fn encrypt(&self, plaintext: &str) -> Result<String> {
        let key_id = self.registry.active;
        let cipher = self.registry.cipher(key_id)?;

        let mut nonce_bytes = [0u8; NONCE_LEN];
        rand::rngs::OsRng.fill_bytes(&mut nonce_bytes);
        let nonce = Nonce::from_slice(&nonce_bytes);

        let sealed = cipher
            .encrypt(nonce, plaintext.as_bytes())
            .map_err(|e| CryptoError::EncryptionFailed(e.to_string()))?;

        // aes-gcm appends the 16-byte tag to the ciphertext
        let (ciphertext, tag) = sealed.split_at(sealed.len() - TAG_LEN);

        let body = format!(
            "{}:{}:{}",
            hex::encode(nonce_bytes),
            hex::encode(tag),
            hex::encode(ciphertext)
        );

        if key_id == 1 {
            Ok(body)
        } else {
            Ok(format!("k{}:{}", key_id, body))
        }
    }

    /// Decrypt a stored field value. Format errors and authentication-tag
    /// mismatches are both terminal for the read that triggered them.
    pub fn decrypt(&self, stored: &str) -> Result<String> {
        let parts: Vec<&str> = stored.split(':').collect();

        let (key_id, iv_hex, tag_hex, ct_hex) = match parts.as_slice() {
            [iv, tag, ct] => (1u32, *iv, *tag, *ct),
            [key, iv, tag, ct] => {
                let id = key
                    .strip_prefix('k')
                    .and_then(|n| n.parse::<u32>().ok())
                    .ok_or_else(|| {
                        CryptoError::InvalidFormat(format!("bad key prefix: {}", key))
                    })?;
                (id, *iv, *tag, *ct)
            }
            _ => {
                return Err(CryptoError::InvalidFormat(format!(
                    "expected 3 colon-separated parts, got {}",
                    parts.len()
                )))
            }
        };

        let iv = hex::decode(iv_hex)
            .map_err(|_| CryptoError::InvalidFormat("iv is not valid hex".to_string()))?;
        let tag = hex::decode(tag_hex)
            .map_err(|_| CryptoError::InvalidFormat("tag is not valid hex".to_string()))?;
        let ciphertext = hex::decode(ct_hex)
            .map_err(|_| CryptoError::InvalidFormat("ciphertext is not valid hex".to_string()))?;

        if iv.len() != NONCE_LEN || tag.len() != TAG_LEN {
            return Err(CryptoError::InvalidFormat(
                "iv or tag has wrong length".to_string(),
            ));
        }

        let cipher = self.registry.cipher(key_id)?;
        let nonce = Nonce::from_slice(&iv);

        let mut sealed = ciphertext;
        sealed.extend_from_slice(&tag);

        let plaintext = cipher
            .decrypt(nonce, sealed.as_ref())
            .map_err(|_| CryptoError::DecryptionFailed)?;

        String::from_utf8(plaintext).map_err(|_| CryptoError::DecryptionFailed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cipher() -> FieldCipher {
        FieldCipher::from_secret("unit-test-phi-secret").unwrap()
    }

    #[test]
    fn test_round_trip() {
        let cipher = cipher();
        for plaintext in ["123-45-6789", "", "a:b:c", "пациент", "O+ allergic to penicillin"] {
            let stored = cipher.encrypt(plaintext).unwrap();
            assert_eq!(stored.split(':').count(), 3);
            assert_eq!(cipher.decrypt(&stored).unwrap(), plaintext);
        }
    }

    #[test]
    fn test_fresh_iv_per_call() {
        let cipher = cipher();
        let a = cipher.encrypt("same value").unwrap();
        let b = cipher.encrypt("same value").unwrap();
        assert_ne!(a, b);
    }

    #[test]
    fn test_tamper_fails_closed() {
        let cipher = cipher();
        let stored = cipher.encrypt("123-45-6789").unwrap();

        // Flipping any single hex character must fail, not alter plaintext
        for i in 0..stored.len() {
            let original = stored.as_bytes()[i];
            if original == b':' {
                continue;
            }
            let replacement = if original == b'0' { b'1' } else { b'0' };
            let mut tampered = stored.clone().into_bytes();
            tampered[i] = replacement;
            let tampered = String::from_utf8(tampered).unwrap();
            assert!(cipher.decrypt(&tampered).is_err(), "tamper at {} accepted", i);
        }
    }

    #[test]
    fn test_malformed_input() {
        let cipher = cipher();
        assert!(matches!(
            cipher.decrypt("only-one-part"),
            Err(CryptoError::InvalidFormat(_))
        ));
        assert!(matches!(
            cipher.decrypt("a:b"),
            Err(CryptoError::InvalidFormat(_))
        ));
        assert!(matches!(
            cipher.decrypt("zz:zz:zz"),
            Err(CryptoError::InvalidFormat(_))
        ));
        assert!(cipher.decrypt("a:b:c:d:e").is_err());
    }

    #[test]
    fn test_key_rotation_keeps_old_ciphertexts_readable() {
        let mut registry = KeyRegistry::from_secret("original-secret").unwrap();
        registry.add_key(2, "rotated-secret").unwrap();

        let cipher = FieldCipher::new(registry);
        let v1 = cipher.encrypt("record").unwrap();

        let mut registry = KeyRegistry::from_secret("original-secret").unwrap();
        registry.add_key(2, "rotated-secret").unwrap();
        registry.set_active(2).unwrap();
        let cipher = FieldCipher::new(registry);

        let v2 = cipher.encrypt("record").unwrap();
        assert!(v2.starts_with("k2:"));

        assert_eq!(cipher.decrypt(&v1).unwrap(), "record");
        assert_eq!(cipher.decrypt(&v2).unwrap(), "record");
    }

    #[test]
    fn test_unknown_key_id() {
        let cipher = cipher();
        let stored = cipher.encrypt("record").unwrap();
        let moved = format!("k9:{}", stored);
        assert!(matches!(
            cipher.decrypt(&moved),
            Err(CryptoError::UnknownKey(9))
        ));
    }
}
