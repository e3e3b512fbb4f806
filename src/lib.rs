//! solacecrypt - passphrase-based file encryption
//!
//! Keys are derived with PBKDF2-HMAC-SHA256 and data is sealed with
//! AES-256-GCM. An encrypted file is `salt(16) || nonce(12) || frames`; see
//! [`container`] for the frame layout.
//!
//! Most callers only need [`file_ops::encrypt_file`] and
//! [`file_ops::decrypt_file`].

#![forbid(unsafe_code)]

pub mod config;
pub mod container;
pub mod error;
pub mod file_ops;
pub mod kdf;
pub mod passphrase;
pub mod secret;
pub mod wipe;

pub use config::CryptConfig;
pub use error::{ErrorCategory, ErrorKind, Result, SolaceError};
pub use file_ops::{decrypt_file, encrypt_file};
pub use secret::{DerivedKey, Passphrase, scrub};
pub use wipe::secure_delete;
