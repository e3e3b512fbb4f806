//! Tunable parameters for encryption and secure deletion
//!
//! Nothing here is persisted. An artifact does not record the KDF work
//! factor, so a non-default `kdf_iterations` must be supplied again when
//! decrypting.

use crate::error::{ErrorCategory, ErrorKind, Result, SolaceError};

/// PBKDF2-HMAC-SHA256 iteration count used unless overridden.
pub const PBKDF2_ITERATIONS: u32 = 100_000;

/// Number of random overwrite passes performed by secure deletion.
pub const WIPE_PASSES: u32 = 3;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CryptConfig {
    pub kdf_iterations: u32,
    pub wipe_passes: u32,
}

impl Default for CryptConfig {
    fn default() -> Self {
        Self {
            kdf_iterations: PBKDF2_ITERATIONS,
            wipe_passes: WIPE_PASSES,
        }
    }
}

impl CryptConfig {
    pub fn with_kdf_iterations(mut self, iterations: u32) -> Self {
        self.kdf_iterations = iterations;
        self
    }

    pub fn with_wipe_passes(mut self, passes: u32) -> Self {
        self.wipe_passes = passes;
        self
    }

    pub fn validate(&self) -> Result<()> {
        if self.kdf_iterations == 0 {
            return Err(SolaceError::with_kind(
                ErrorCategory::User,
                ErrorKind::InvalidConfig,
                "KDF iteration count must be at least 1",
            ));
        }
        if self.wipe_passes == 0 {
            return Err(SolaceError::with_kind(
                ErrorCategory::User,
                ErrorKind::InvalidConfig,
                "secure deletion needs at least one overwrite pass",
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = CryptConfig::default();
        assert_eq!(config.kdf_iterations, 100_000);
        assert_eq!(config.wipe_passes, 3);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_zero_values_rejected() {
        let err = CryptConfig::default()
            .with_kdf_iterations(0)
            .validate()
            .expect_err("zero iterations must be rejected");
        assert_eq!(err.kind, Some(ErrorKind::InvalidConfig));

        let err = CryptConfig::default()
            .with_wipe_passes(0)
            .validate()
            .expect_err("zero passes must be rejected");
        assert_eq!(err.kind, Some(ErrorKind::InvalidConfig));
    }
}
