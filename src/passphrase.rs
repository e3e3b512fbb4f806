//! Passphrase reading functionality

use crate::error::{ErrorCategory, ErrorKind, Result, SolaceError};
use crate::secret::Passphrase;
use std::io::{self, IsTerminal, Read};
use zeroize::Zeroizing;

/// Trait for reading passphrases from various sources
pub trait PassphraseReader {
    /// Read a passphrase as arbitrary bytes (not necessarily UTF-8)
    ///
    /// The returned `Passphrase` is wiped from memory when dropped.
    fn read_passphrase(&mut self) -> Result<Passphrase>;
}

/// Returns a fixed passphrase (for testing)
pub struct ConstantPassphraseReader {
    passphrase: Passphrase,
}

impl ConstantPassphraseReader {
    pub fn new(passphrase: Vec<u8>) -> Self {
        Self {
            passphrase: Passphrase::new(passphrase),
        }
    }
}

impl PassphraseReader for ConstantPassphraseReader {
    fn read_passphrase(&mut self) -> Result<Passphrase> {
        Ok(self.passphrase.clone())
    }
}

/// Reads passphrase from any io::Read source
///
/// Everything up to end of input is the passphrase, including any trailing
/// newline.
pub struct ReaderPassphraseReader {
    reader: Box<dyn Read>,
}

impl ReaderPassphraseReader {
    pub fn new(reader: Box<dyn Read>) -> Self {
        Self { reader }
    }
}

impl PassphraseReader for ReaderPassphraseReader {
    fn read_passphrase(&mut self) -> Result<Passphrase> {
        let mut data = Zeroizing::new(Vec::new());
        self.reader.read_to_end(&mut data).map_err(|e| {
            SolaceError::with_kind_and_source(
                ErrorCategory::Internal,
                ErrorKind::PassphraseUnavailable,
                format!("error reading passphrase: {}", e),
                e,
            )
        })?;
        Ok(Passphrase::from(data))
    }
}

/// Reads passphrase from terminal with no echo
pub struct TerminalPassphraseReader {
    prompt: &'static str,
}

impl TerminalPassphraseReader {
    pub fn new() -> Self {
        Self {
            prompt: "Passphrase (solacecrypt): ",
        }
    }
}

impl Default for TerminalPassphraseReader {
    fn default() -> Self {
        Self::new()
    }
}

impl PassphraseReader for TerminalPassphraseReader {
    /// Read passphrase from terminal.
    ///
    /// Note: Terminal input is limited to UTF-8 due to rpassword library constraints.
    /// For non-UTF-8 passphrases, use --passphrase-stdin instead.
    fn read_passphrase(&mut self) -> Result<Passphrase> {
        if !io::stdin().is_terminal() {
            return Err(SolaceError::with_kind(
                ErrorCategory::User,
                ErrorKind::PassphraseUnavailable,
                "cannot read passphrase from terminal - stdin is not a terminal",
            ));
        }

        // Read password *without echo*. The prompt goes to the controlling
        // terminal, not stdout.
        let passphrase = rpassword::prompt_password(self.prompt).map_err(|e| {
            SolaceError::with_kind_and_source(
                ErrorCategory::Internal,
                ErrorKind::PassphraseUnavailable,
                format!("failure reading passphrase: {}", e),
                e,
            )
        })?;

        Ok(Passphrase::from(passphrase))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_constant_reader() {
        let mut reader = ConstantPassphraseReader::new(b"test123".to_vec());
        assert_eq!(reader.read_passphrase().unwrap().as_bytes(), b"test123");
        assert_eq!(reader.read_passphrase().unwrap().as_bytes(), b"test123");
    }

    /// Tests the terminal reader. This is ignored by default and must be run
    /// explicitly and with human input:
    ///
    /// cargo test test_terminal_reader_interactive -- --ignored --nocapture
    #[test]
    #[ignore]
    fn test_terminal_reader_interactive() {
        let mut reader = TerminalPassphraseReader::new();
        println!("\nPlease enter a test passphrase:");
        let passphrase = reader.read_passphrase().unwrap();
        assert!(!passphrase.is_empty(), "Expected non-empty passphrase");
    }

    #[test]
    fn test_reader_passphrase_reader() {
        let data = b"mypassword";
        let mut reader = ReaderPassphraseReader::new(Box::new(&data[..]));
        assert_eq!(reader.read_passphrase().unwrap().as_bytes(), b"mypassword");
    }

    #[test]
    fn test_reader_passphrase_reader_empty() {
        let data = b"";
        let mut reader = ReaderPassphraseReader::new(Box::new(&data[..]));
        assert!(reader.read_passphrase().unwrap().is_empty());
    }

    /// Verifies that ReaderPassphraseReader accepts arbitrary byte sequences,
    /// not just valid UTF-8. This enables --passphrase-stdin to work with
    /// passphrases containing non-UTF-8 bytes.
    #[test]
    fn test_reader_passphrase_reader_non_utf8() {
        let data: &[u8] = &[0xff, 0xfe, 0x00, 0x01];
        let mut reader = ReaderPassphraseReader::new(Box::new(data));
        assert_eq!(reader.read_passphrase().unwrap().as_bytes(), data);
    }

    #[test]
    fn test_reader_error_is_tagged() {
        struct Broken;

        impl Read for Broken {
            fn read(&mut self, _buf: &mut [u8]) -> io::Result<usize> {
                Err(io::Error::other("device gone"))
            }
        }

        let mut reader = ReaderPassphraseReader::new(Box::new(Broken));
        let err = reader.read_passphrase().expect_err("expected read failure");
        assert_eq!(err.kind, Some(ErrorKind::PassphraseUnavailable));
    }
}
