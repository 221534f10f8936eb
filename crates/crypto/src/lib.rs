pub mod error;
pub mod field;
pub mod hashing;
pub mod masking;
pub mod primitives;

pub use error::{CryptoError, Result};
pub use field::{FieldCipher, KeyRegistry};
pub use hashing::{hash_secret, verify_secret};
pub use masking::mask;
pub use primitives::{constant_time_eq, constant_time_eq_str, random_token_hex, sha256_hex};
