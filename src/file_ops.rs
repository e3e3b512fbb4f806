//! File encryption/decryption operations
//!
//! This module provides the file-level entry points used by front ends:
//! encrypting a file (optionally destroying the original) and decrypting an
//! artifact back to plaintext.
//!
//! Every output is written to a temporary file in the destination directory,
//! flushed, fsynced and then renamed over the destination, so readers see
//! either the previous file or the complete new one. A failed decryption
//! therefore never leaves plaintext at the output path.

use crate::config::CryptConfig;
use crate::container;
use crate::error::{ErrorCategory, ErrorKind, Result, SolaceError};
use crate::secret::Passphrase;
use crate::wipe;
use std::ffi::OsString;
use std::fs::{self, File};
use std::io::{self, BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

/// Extension appended to encrypted files when no output path is given
pub const ENCRYPTED_EXTENSION: &str = "enc";

/// Extension used for decrypted files whose artifact had no extension to strip
pub const DECRYPTED_EXTENSION: &str = "dec";

/// Encrypt a file with a passphrase
///
/// Reads plaintext from `input_path`, encrypts it, and atomically writes the
/// artifact to `output_path`. When `delete_original` is set, the input is
/// securely deleted, but only after the artifact is durably in place. If
/// that deletion fails the error has kind `SecureDelete` and the artifact
/// remains valid.
///
/// The output file is created with mode 0o600 (read/write for owner only) on Unix systems.
pub fn encrypt_file(
    input_path: &Path,
    output_path: &Path,
    passphrase: Passphrase,
    delete_original: bool,
) -> Result<()> {
    encrypt_file_with(
        &CryptConfig::default(),
        input_path,
        output_path,
        passphrase,
        delete_original,
    )
}

pub fn encrypt_file_with(
    config: &CryptConfig,
    input_path: &Path,
    output_path: &Path,
    passphrase: Passphrase,
    delete_original: bool,
) -> Result<()> {
    if delete_original {
        config.validate()?;
        if same_file(input_path, output_path) {
            return Err(SolaceError::with_kind(
                ErrorCategory::User,
                ErrorKind::InvalidConfig,
                "refusing to delete the original when it is also the output",
            ));
        }
    }

    let input = File::open(input_path).map_err(|e| read_error(input_path, e))?;
    debug!(input = %input_path.display(), output = %output_path.display(), "encrypting");

    let written = write_atomically(output_path, |out| {
        container::seal_stream(config, passphrase.as_bytes(), BufReader::new(input), out)
    })
    .map_err(|e| e.with_context("encryption failed"))?;
    drop(passphrase);
    info!(output = %output_path.display(), bytes = written, "wrote encrypted file");

    if delete_original {
        wipe::secure_delete_with(config, input_path).map_err(|e| {
            e.with_context(format!(
                "encrypted to {} but failed to securely delete {}",
                output_path.display(),
                input_path.display()
            ))
        })?;
    }

    Ok(())
}

/// Decrypt a file with a passphrase
///
/// Reads the artifact from `input_path`, decrypts it, and atomically writes
/// the plaintext to `output_path` once every frame has authenticated.
///
/// On authentication failure nothing is written and any file already present
/// at `output_path` is removed before the error is returned, so a stale
/// plaintext from an earlier attempt cannot be mistaken for the result. The
/// exception is `output_path` naming the artifact itself, which is kept.
///
/// The output file is created with mode 0o600 (read/write for owner only) on Unix systems.
pub fn decrypt_file(input_path: &Path, output_path: &Path, passphrase: Passphrase) -> Result<()> {
    decrypt_file_with(&CryptConfig::default(), input_path, output_path, passphrase)
}

pub fn decrypt_file_with(
    config: &CryptConfig,
    input_path: &Path,
    output_path: &Path,
    passphrase: Passphrase,
) -> Result<()> {
    let input = File::open(input_path).map_err(|e| read_error(input_path, e))?;
    let in_place = same_file(input_path, output_path);
    debug!(input = %input_path.display(), output = %output_path.display(), in_place, "decrypting");

    let result = write_atomically(output_path, |out| {
        container::open_stream(config, passphrase.as_bytes(), BufReader::new(input), out)
    });
    drop(passphrase);

    match result {
        Ok(written) => {
            info!(output = %output_path.display(), bytes = written, "wrote decrypted file");
            Ok(())
        }
        Err(e) if e.is_authentication_failure() => {
            warn!(input = %input_path.display(), "artifact failed authentication");
            if !in_place {
                remove_stale_output(output_path);
            }
            Err(e.with_context("failed to decrypt"))
        }
        Err(e) => Err(e.with_context("failed to decrypt")),
    }
}

/// Output path used when encrypting `input` without an explicit destination:
/// the input path with `.enc` appended.
pub fn default_encrypt_output(input: &Path) -> PathBuf {
    let mut name: OsString = input.as_os_str().to_owned();
    name.push(".");
    name.push(ENCRYPTED_EXTENSION);
    PathBuf::from(name)
}

/// Output path used when decrypting `input` without an explicit destination:
/// the last extension is stripped (`notes.txt.enc` becomes `notes.txt`).
/// Inputs without an extension get `.dec` appended so the artifact is never
/// overwritten by its own plaintext.
pub fn default_decrypt_output(input: &Path) -> PathBuf {
    if input.extension().is_some() {
        input.with_extension("")
    } else {
        let mut name: OsString = input.as_os_str().to_owned();
        name.push(".");
        name.push(DECRYPTED_EXTENSION);
        PathBuf::from(name)
    }
}

/// Write to a temporary file next to `path` and rename it into place once
/// `fill` succeeds and the data is synced. On any error the temporary file
/// is removed and `path` is left untouched.
fn write_atomically<T, F>(path: &Path, fill: F) -> Result<T>
where
    F: FnOnce(&mut BufWriter<&mut File>) -> Result<T>,
{
    let dir = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };
    let mut temp_file = tempfile::Builder::new()
        .prefix(".solacecrypt-")
        .tempfile_in(dir)
        .map_err(|e| {
            SolaceError::with_kind_and_source(
                ErrorCategory::User,
                ErrorKind::Io,
                format!("failed to create temporary file in {}", dir.display()),
                e,
            )
        })?;

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        temp_file
            .as_file()
            .set_permissions(fs::Permissions::from_mode(0o600))
            .map_err(|e| {
                SolaceError::with_kind_and_source(
                    ErrorCategory::Internal,
                    ErrorKind::Io,
                    "failed to set tempfile permissions",
                    e,
                )
            })?;
    }

    let value = {
        let mut writer = BufWriter::new(temp_file.as_file_mut());
        let value = fill(&mut writer)?;
        writer.flush().map_err(|e| {
            SolaceError::with_kind_and_source(
                ErrorCategory::Internal,
                ErrorKind::Io,
                "failed to flush tempfile",
                e,
            )
        })?;
        value
    };

    // fsync() such that the rename later, if it succeeds, will always
    // point to a valid file.
    temp_file.as_file().sync_all().map_err(|e| {
        SolaceError::with_kind_and_source(
            ErrorCategory::Internal,
            ErrorKind::Io,
            "failed to sync file prior to rename",
            e,
        )
    })?;

    temp_file.persist(path).map_err(|e| {
        SolaceError::with_kind_and_source(
            ErrorCategory::User,
            ErrorKind::Io,
            format!("failed to rename to target file {}", path.display()),
            e,
        )
    })?;

    Ok(value)
}

fn remove_stale_output(path: &Path) {
    match fs::remove_file(path) {
        Ok(()) => debug!(path = %path.display(), "removed stale output"),
        Err(e) if e.kind() == io::ErrorKind::NotFound => {}
        Err(e) => warn!(path = %path.display(), error = %e, "failed to remove stale output"),
    }
}

/// Whether both paths resolve to the same existing file.
pub fn same_file(a: &Path, b: &Path) -> bool {
    match (fs::canonicalize(a), fs::canonicalize(b)) {
        (Ok(a), Ok(b)) => a == b,
        _ => false,
    }
}

fn read_error(path: &Path, err: io::Error) -> SolaceError {
    let category = if err.kind() == io::ErrorKind::NotFound {
        ErrorCategory::User
    } else {
        ErrorCategory::Internal
    };
    SolaceError::with_kind_and_source(
        category,
        ErrorKind::Io,
        format!("failed to read from {}", path.display()),
        err,
    )
}
