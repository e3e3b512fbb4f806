use std::error::Error as StdError;

use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[non_exhaustive]
pub enum ErrorCategory {
    /// Any failure that cannot be confidently attributed to any other error
    /// category in this enum.
    ///
    /// In particular this means that use of Internal is never a guarantee
    /// the error is not, for example due to a user error - merely that it
    /// cannot be confidently determined by the code.
    Internal,

    /// The user provided invalid input or performed an action that is
    /// unsupported or impossible to complete.
    User,
}

/// Fine-grained condition flags for consumers that want to branch on error kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[non_exhaustive]
pub enum ErrorKind {
    /// The artifact is shorter than its header, or carries no ciphertext.
    MalformedArtifact,
    /// Authentication failed due to an incorrect passphrase or tampering
    /// or corruption. The two causes are deliberately indistinguishable.
    AuthenticationFailed,
    /// Overwriting or removing the plaintext original failed. Any artifact
    /// written before the failure remains valid.
    SecureDelete,
    /// Passphrase could not be obtained from the configured reader.
    PassphraseUnavailable,
    /// The operating system random source failed.
    Randomness,
    /// AES-256-GCM refused to seal data.
    Cipher,
    /// Input needs more frames than the nonce counter can address.
    TooLarge,
    /// A configuration value is out of range.
    InvalidConfig,
    /// Interaction with the filesystem, stdin/stdout, or other I/O failed.
    Io,
}

#[derive(Debug, Error)]
#[error("{msg}")]
pub struct SolaceError {
    /// Broad error category, always provided.
    pub category: ErrorCategory,
    /// Optional specific condition tag for consumers that need to
    /// branch their behavior. Any code consuming errors MUST handle
    /// the absence of a defined kind.
    pub kind: Option<ErrorKind>,
    #[source]
    source: Option<Box<dyn StdError + Send + Sync + 'static>>,
    msg: String,
}

impl SolaceError {
    /// Creates a new error that also tags the failure with a kind.
    pub fn with_kind(category: ErrorCategory, kind: ErrorKind, msg: impl Into<String>) -> Self {
        Self {
            category,
            kind: Some(kind),
            source: None,
            msg: msg.into(),
        }
    }

    /// Creates a new error that carries both a kind tag and the originating source error.
    pub fn with_kind_and_source(
        category: ErrorCategory,
        kind: ErrorKind,
        msg: impl Into<String>,
        source: impl StdError + Send + Sync + 'static,
    ) -> Self {
        Self {
            category,
            kind: Some(kind),
            source: Some(Box::new(source)),
            msg: msg.into(),
        }
    }

    /// Wraps the current error with a higher-level message while preserving the original as source.
    ///
    /// The kind is carried over so callers can still branch on it after
    /// context has been added.
    pub fn with_context(self, msg: impl Into<String>) -> Self {
        let category = self.category;
        let kind = self.kind;
        Self {
            category,
            kind,
            source: Some(Box::new(self)),
            msg: msg.into(),
        }
    }

    pub fn is_authentication_failure(&self) -> bool {
        self.kind == Some(ErrorKind::AuthenticationFailed)
    }
}

/// Convenience alias.
pub type Result<T> = std::result::Result<T, SolaceError>;
