//! Owned wrappers for passphrases and derived keys
//!
//! Both types keep their bytes in a single owned buffer that is zeroed when
//! the value is dropped, so every exit path of an encrypt or decrypt call,
//! including early returns through `?`, scrubs the secret.
//!
//! Zeroing is best-effort: it cannot reach copies made by the operating
//! system (swap, core dumps) or by callers before the value was handed over.

use std::fmt;

use zeroize::{Zeroize, ZeroizeOnDrop, Zeroizing};

/// Length of a derived key in bytes
pub const KEY_LEN: usize = 32;

/// A passphrase as arbitrary bytes (not necessarily UTF-8).
#[derive(Clone)]
pub struct Passphrase(Zeroizing<Vec<u8>>);

impl Passphrase {
    pub fn new(bytes: Vec<u8>) -> Self {
        Self(Zeroizing::new(bytes))
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl From<Vec<u8>> for Passphrase {
    fn from(bytes: Vec<u8>) -> Self {
        Self::new(bytes)
    }
}

impl From<Zeroizing<Vec<u8>>> for Passphrase {
    fn from(bytes: Zeroizing<Vec<u8>>) -> Self {
        Self(bytes)
    }
}

impl From<String> for Passphrase {
    fn from(s: String) -> Self {
        Self::new(s.into_bytes())
    }
}

impl From<&str> for Passphrase {
    fn from(s: &str) -> Self {
        Self::new(s.as_bytes().to_vec())
    }
}

impl fmt::Debug for Passphrase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Passphrase(<redacted>)")
    }
}

/// A 256-bit symmetric key produced by the KDF.
#[derive(Zeroize, ZeroizeOnDrop)]
pub struct DerivedKey([u8; KEY_LEN]);

impl DerivedKey {
    pub(crate) fn from_bytes(bytes: [u8; KEY_LEN]) -> Self {
        Self(bytes)
    }

    pub fn as_bytes(&self) -> &[u8; KEY_LEN] {
        &self.0
    }
}

impl fmt::Debug for DerivedKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("DerivedKey(<redacted>)")
    }
}

/// Overwrite each buffer with zero bytes.
///
/// For values that outlive a single call prefer [`Passphrase`] or
/// [`DerivedKey`], which do this automatically on drop.
pub fn scrub(buffers: &mut [&mut [u8]]) {
    for buf in buffers.iter_mut() {
        buf.zeroize();
    }
}
