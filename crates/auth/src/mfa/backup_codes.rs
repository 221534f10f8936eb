use crate::error::Result;
use rand::{distributions::Alphanumeric, Rng};

const CODE_LENGTH: usize = 8;
const CODE_COUNT: usize = 10;

/// Generate a fresh set of one-time backup codes, formatted XXXX-XXXX.
/// Plaintext is shown to the user once; only hashes are stored.
pub fn generate_backup_codes() -> Vec<String> {
    let mut rng = rand::thread_rng();
    (0..CODE_COUNT)
        .map(|_| {
            let raw: String = (0..CODE_LENGTH)
                .map(|_| rng.sample(Alphanumeric) as char)
                .collect();
            format!("{}-{}", &raw[..4], &raw[4..])
        })
        .collect()
}

/// Hash a backup code for storage. The hyphen is presentation only.
pub fn hash_backup_code(code: &str) -> Result<String> {
    Ok(hms_crypto::hash_secret(&normalize(code))?)
}

/// Verify a submitted code against one stored hash.
pub fn verify_backup_code(code: &str, stored_hash: &str) -> bool {
    hms_crypto::verify_secret(&normalize(code), stored_hash).unwrap_or(false)
}

fn normalize(code: &str) -> String {
    code.replace('-', "").to_uppercase()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_generated_set_shape() {
        let codes = generate_backup_codes();
        assert_eq!(codes.len(), CODE_COUNT);
        for code in &codes {
            assert_eq!(code.len(), CODE_LENGTH + 1);
            assert_eq!(code.chars().nth(4), Some('-'));
        }
    }

    #[test]
    fn test_hash_and_verify() {
        let hash = hash_backup_code("AbCd-Ef12").unwrap();
        assert!(verify_backup_code("AbCd-Ef12", &hash));
        assert!(verify_backup_code("ABCDEF12", &hash));
        assert!(verify_backup_code("abcd-ef12", &hash));
        assert!(!verify_backup_code("AbCd-Ef13", &hash));
    }
}
