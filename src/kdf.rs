//! Passphrase to key derivation using PBKDF2-HMAC-SHA256

use pbkdf2::pbkdf2_hmac;
use rand::RngCore;
use rand::rngs::OsRng;
use sha2::Sha256;
use tracing::trace;

use crate::config::CryptConfig;
use crate::error::{ErrorCategory, ErrorKind, Result, SolaceError};
use crate::secret::{DerivedKey, KEY_LEN};

/// Length of salt in bytes
pub const SALT_LEN: usize = 16;

pub type Salt = [u8; SALT_LEN];

/// Derive a key with the default work factor.
///
/// When `salt` is `None` a fresh random salt is generated (encryption);
/// otherwise the given salt is used unchanged (decryption). The salt
/// actually used is returned alongside the key.
pub fn derive_key(passphrase: &[u8], salt: Option<Salt>) -> Result<(DerivedKey, Salt)> {
    derive_key_with(&CryptConfig::default(), passphrase, salt)
}

pub fn derive_key_with(
    config: &CryptConfig,
    passphrase: &[u8],
    salt: Option<Salt>,
) -> Result<(DerivedKey, Salt)> {
    if config.kdf_iterations == 0 {
        return Err(SolaceError::with_kind(
            ErrorCategory::User,
            ErrorKind::InvalidConfig,
            "KDF iteration count must be at least 1",
        ));
    }

    let salt = match salt {
        Some(salt) => salt,
        None => {
            let mut salt = [0u8; SALT_LEN];
            fill_random(&mut salt)?;
            salt
        }
    };

    trace!(iterations = config.kdf_iterations, "deriving key");
    let mut key = [0u8; KEY_LEN];
    pbkdf2_hmac::<Sha256>(passphrase, &salt, config.kdf_iterations, &mut key);
    let derived = DerivedKey::from_bytes(key);
    // `key` was copied into `derived`; clear the stack original.
    zeroize::Zeroize::zeroize(&mut key);

    Ok((derived, salt))
}

/// Fill `buf` from the operating system CSPRNG.
pub(crate) fn fill_random(buf: &mut [u8]) -> Result<()> {
    OsRng.try_fill_bytes(buf).map_err(|e| {
        SolaceError::with_kind_and_source(
            ErrorCategory::Internal,
            ErrorKind::Randomness,
            "operating system random source failed",
            e,
        )
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn to_hex(bytes: &[u8]) -> String {
        bytes.iter().map(|b| format!("{:02x}", b)).collect()
    }

    #[test]
    fn test_known_answer() {
        // Computed independently with another PBKDF2 implementation.
        let (key, salt) = derive_key(b"correct horse", Some([0x42; SALT_LEN])).unwrap();
        assert_eq!(salt, [0x42; SALT_LEN]);
        assert_eq!(
            to_hex(key.as_bytes()),
            "3872797d391b4a20b4a99bbd10b31787c506c365c668fbd18f18803862c989f7"
        );
    }

    #[test]
    fn test_iterations_are_honored() {
        let salt = *b"saltsaltsaltsalt";
        let one = CryptConfig::default().with_kdf_iterations(1);
        let two = CryptConfig::default().with_kdf_iterations(2);

        let (k1, _) = derive_key_with(&one, b"password", Some(salt)).unwrap();
        let (k2, _) = derive_key_with(&two, b"password", Some(salt)).unwrap();

        assert_eq!(
            to_hex(k1.as_bytes()),
            "b13d6697e99cd6d1745da097ee03e4be501341e76fe9161a788de3d4cd0be219"
        );
        assert_eq!(
            to_hex(k2.as_bytes()),
            "b3a65a254dd590fab9aacfabd5695a0bd79727d2899a6a519d26f13b52d8e6f4"
        );
    }

    #[test]
    fn test_deterministic_for_same_salt() {
        let config = CryptConfig::default().with_kdf_iterations(10);
        let (k1, salt) = derive_key_with(&config, b"pass", None).unwrap();
        let (k2, salt2) = derive_key_with(&config, b"pass", Some(salt)).unwrap();

        assert_eq!(salt, salt2);
        assert_eq!(k1.as_bytes(), k2.as_bytes());
    }

    #[test]
    fn test_fresh_salt_each_time() {
        let config = CryptConfig::default().with_kdf_iterations(10);
        let (k1, s1) = derive_key_with(&config, b"pass", None).unwrap();
        let (k2, s2) = derive_key_with(&config, b"pass", None).unwrap();

        assert_ne!(s1, s2);
        assert_ne!(k1.as_bytes(), k2.as_bytes());
    }

    #[test]
    fn test_zero_iterations_rejected() {
        let config = CryptConfig::default().with_kdf_iterations(0);
        let err = derive_key_with(&config, b"pass", None).expect_err("expected config error");
        assert_eq!(err.kind, Some(ErrorKind::InvalidConfig));
    }
}
