//! Authenticated container: PBKDF2-HMAC-SHA256 + AES-256-GCM
//!
//! The binary format is:
//! - salt: 16 bytes
//! - nonce: 12 bytes
//! - frames: variable length
//!
//! The plaintext is cut into frames of `CHUNK_SIZE` bytes; only the last
//! frame may be shorter (and it is empty only when the whole plaintext is).
//! Each frame is sealed independently and carries its own 16-byte GCM tag,
//! so a frame on disk is at most `CHUNK_SIZE + TAG_LEN` bytes.
//!
//! Frame `i` is sealed under the base nonce XORed with a mask holding `i`
//! as a big-endian u32 in bytes 8..12 and, for every frame except the last,
//! the continuation flag `0x01` in byte 7. Dropping, reordering or appending
//! frames therefore breaks authentication.
//!
//! A plaintext of at most `CHUNK_SIZE` bytes is a single final frame at
//! index 0, whose nonce is the base nonce itself: the artifact is then
//! exactly `salt || nonce || AES-256-GCM(plaintext)`.

use std::io::{self, Read, Write};

use aes_gcm::aead::{Aead, KeyInit};
use aes_gcm::{Aes256Gcm, Key, Nonce};
use tracing::debug;
use zeroize::Zeroizing;

use crate::config::CryptConfig;
use crate::error::{ErrorCategory, ErrorKind, Result, SolaceError};
use crate::kdf::{self, SALT_LEN, Salt};
use crate::secret::DerivedKey;

/// Length of nonce in bytes
pub const NONCE_LEN: usize = 12;

/// Length of the GCM authentication tag appended to every frame
pub const TAG_LEN: usize = 16;

/// Salt followed by nonce
pub const HEADER_LEN: usize = SALT_LEN + NONCE_LEN;

/// Smallest well-formed artifact: header plus one empty frame
pub const MIN_ARTIFACT_LEN: usize = HEADER_LEN + TAG_LEN;

/// Plaintext bytes per frame
pub const CHUNK_SIZE: usize = 64 * 1024;

/// Largest frame data (everything after the header) retried as a single
/// whole-file GCM message when the first frame fails to authenticate.
/// Anything bigger fails authentication without being buffered.
pub const SINGLE_SHOT_LIMIT: usize = 32 * 1024 * 1024;

const FRAME_LEN: usize = CHUNK_SIZE + TAG_LEN;

const FLAG_OFFSET: usize = 7;
const COUNTER_OFFSET: usize = 8;
const CONTINUATION_FLAG: u8 = 0x01;

pub type BaseNonce = [u8; NONCE_LEN];

/// Encrypt plaintext with a passphrase using random salt and nonce
///
/// Returns salt(16) + nonce(12) + frames.
pub fn seal(passphrase: &[u8], plaintext: &[u8]) -> Result<Vec<u8>> {
    seal_with(&CryptConfig::default(), passphrase, plaintext)
}

pub fn seal_with(config: &CryptConfig, passphrase: &[u8], plaintext: &[u8]) -> Result<Vec<u8>> {
    let mut output = Vec::with_capacity(sealed_len(plaintext.len()));
    seal_stream(config, passphrase, plaintext, &mut output)?;
    Ok(output)
}

/// Encrypt plaintext with a passphrase using provided salt and nonce
///
/// This function is ONLY for testing purposes to generate deterministic output.
/// NEVER use this in production - always use `seal()` which generates random salt/nonce.
pub fn seal_deterministic(
    config: &CryptConfig,
    passphrase: &[u8],
    plaintext: &[u8],
    salt: &Salt,
    nonce: &BaseNonce,
) -> Result<Vec<u8>> {
    let (key, salt) = kdf::derive_key_with(config, passphrase, Some(*salt))?;
    let mut output = Vec::with_capacity(sealed_len(plaintext.len()));
    seal_frames(&key, &salt, nonce, plaintext, &mut output)?;
    Ok(output)
}

/// Encrypt everything `reader` yields into `writer`.
///
/// A fresh salt and nonce are drawn for every call. Memory use is bounded
/// by two frames regardless of input size. Returns the number of bytes
/// written.
pub fn seal_stream<R: Read, W: Write>(
    config: &CryptConfig,
    passphrase: &[u8],
    reader: R,
    writer: W,
) -> Result<u64> {
    let (key, salt) = kdf::derive_key_with(config, passphrase, None)?;
    let mut nonce = [0u8; NONCE_LEN];
    kdf::fill_random(&mut nonce)?;
    seal_frames(&key, &salt, &nonce, reader, writer)
}

/// Decrypt an in-memory artifact with a passphrase
pub fn open(passphrase: &[u8], artifact: &[u8]) -> Result<Zeroizing<Vec<u8>>> {
    open_with(&CryptConfig::default(), passphrase, artifact)
}

pub fn open_with(
    config: &CryptConfig,
    passphrase: &[u8],
    artifact: &[u8],
) -> Result<Zeroizing<Vec<u8>>> {
    let mut plaintext = Zeroizing::new(Vec::with_capacity(artifact.len()));
    open_stream(config, passphrase, artifact, &mut *plaintext)?;
    Ok(plaintext)
}

/// Decrypt an artifact read from `reader` into `writer`.
///
/// Frames are written as soon as they authenticate, so on error `writer`
/// may already hold a verified prefix of the plaintext. Callers writing to
/// a final destination must discard the output unless this returns `Ok`.
///
/// If the first of several frames fails to authenticate, the data is retried
/// as one whole-file GCM message, but only up to [`SINGLE_SHOT_LIMIT`]
/// bytes; a wrong passphrase on a larger artifact reads at most that much.
/// Returns the number of plaintext bytes written.
pub fn open_stream<R: Read, W: Write>(
    config: &CryptConfig,
    passphrase: &[u8],
    mut reader: R,
    mut writer: W,
) -> Result<u64> {
    let mut header = [0u8; HEADER_LEN];
    let got = read_full(&mut reader, &mut header)?;
    if got < SALT_LEN {
        return Err(malformed("invalid encrypted file: missing salt"));
    }
    if got < HEADER_LEN {
        return Err(malformed("invalid encrypted file: missing nonce"));
    }

    let mut current = vec![0u8; FRAME_LEN];
    let mut filled = read_full(&mut reader, &mut current)?;
    if filled == 0 {
        return Err(malformed("invalid encrypted file: no encrypted data"));
    }
    if filled < TAG_LEN {
        return Err(malformed(
            "invalid encrypted file: ciphertext shorter than authentication tag",
        ));
    }

    let mut salt = [0u8; SALT_LEN];
    salt.copy_from_slice(&header[..SALT_LEN]);
    let mut nonce = [0u8; NONCE_LEN];
    nonce.copy_from_slice(&header[SALT_LEN..]);

    let (key, _) = kdf::derive_key_with(config, passphrase, Some(salt))?;
    let cipher = Aes256Gcm::new(Key::<Aes256Gcm>::from_slice(key.as_bytes()));

    let mut next = vec![0u8; FRAME_LEN];
    let mut next_filled = 0;
    let mut index: u32 = 0;
    let mut written: u64 = 0;
    loop {
        let last = if filled < FRAME_LEN {
            true
        } else {
            next_filled = read_full(&mut reader, &mut next)?;
            next_filled == 0
        };

        let iv = frame_nonce(&nonce, index, last);
        let plaintext = match cipher.decrypt(Nonce::from_slice(&iv), &current[..filled]) {
            Ok(plaintext) => Zeroizing::new(plaintext),
            Err(_) if index == 0 && !last => {
                debug!("first frame did not authenticate; retrying as single-shot artifact");
                let mut whole = Zeroizing::new(Vec::new());
                whole.extend_from_slice(&current[..filled]);
                whole.extend_from_slice(&next[..next_filled]);
                let budget = (SINGLE_SHOT_LIMIT + 1).saturating_sub(whole.len()) as u64;
                (&mut reader)
                    .take(budget)
                    .read_to_end(&mut whole)
                    .map_err(|e| io_error("failed to read input", e))?;
                if whole.len() > SINGLE_SHOT_LIMIT {
                    debug!(limit = SINGLE_SHOT_LIMIT, "too large for single-shot retry");
                    return Err(authentication_failed());
                }
                let plaintext = cipher
                    .decrypt(Nonce::from_slice(&nonce), whole.as_slice())
                    .map_err(|_| authentication_failed())?;
                let plaintext = Zeroizing::new(plaintext);
                write_all(&mut writer, &plaintext)?;
                return Ok(plaintext.len() as u64);
            }
            Err(_) => {
                debug!(frame = index, last, "frame failed authentication");
                return Err(authentication_failed());
            }
        };
        write_all(&mut writer, &plaintext)?;
        written += plaintext.len() as u64;

        if last {
            break;
        }
        std::mem::swap(&mut current, &mut next);
        filled = next_filled;
        index = index.checked_add(1).ok_or_else(too_large)?;
    }

    debug!(frames = index as u64 + 1, bytes = written, "opened artifact");
    Ok(written)
}

/// Size of the artifact produced for a plaintext of `plaintext_len` bytes.
pub fn sealed_len(plaintext_len: usize) -> usize {
    let frames = plaintext_len.div_ceil(CHUNK_SIZE).max(1);
    HEADER_LEN + plaintext_len + frames * TAG_LEN
}

fn seal_frames<R: Read, W: Write>(
    key: &DerivedKey,
    salt: &Salt,
    nonce: &BaseNonce,
    mut reader: R,
    mut writer: W,
) -> Result<u64> {
    let cipher = Aes256Gcm::new(Key::<Aes256Gcm>::from_slice(key.as_bytes()));

    write_all(&mut writer, salt)?;
    write_all(&mut writer, nonce)?;
    let mut written = HEADER_LEN as u64;

    let mut current = Zeroizing::new(vec![0u8; CHUNK_SIZE]);
    let mut next = Zeroizing::new(vec![0u8; CHUNK_SIZE]);
    let mut filled = read_full(&mut reader, &mut current)?;
    let mut next_filled = 0;
    let mut index: u32 = 0;
    loop {
        // A full frame is only known to be the last one once the reader
        // reports end of input.
        let last = if filled < CHUNK_SIZE {
            true
        } else {
            next_filled = read_full(&mut reader, &mut next)?;
            next_filled == 0
        };

        let iv = frame_nonce(nonce, index, last);
        let sealed = cipher
            .encrypt(Nonce::from_slice(&iv), &current[..filled])
            .map_err(|e| {
                SolaceError::with_kind(
                    ErrorCategory::Internal,
                    ErrorKind::Cipher,
                    format!("encryption failed: {}", e),
                )
            })?;
        write_all(&mut writer, &sealed)?;
        written += sealed.len() as u64;

        if last {
            break;
        }
        std::mem::swap(&mut current, &mut next);
        filled = next_filled;
        index = index.checked_add(1).ok_or_else(too_large)?;
    }

    debug!(frames = index as u64 + 1, bytes = written, "sealed artifact");
    Ok(written)
}

fn frame_nonce(base: &BaseNonce, index: u32, last: bool) -> BaseNonce {
    let mut nonce = *base;
    for (byte, counter) in nonce[COUNTER_OFFSET..].iter_mut().zip(index.to_be_bytes()) {
        *byte ^= counter;
    }
    if !last {
        nonce[FLAG_OFFSET] ^= CONTINUATION_FLAG;
    }
    nonce
}

/// Read until `buf` is full or the reader is exhausted.
fn read_full<R: Read>(reader: &mut R, buf: &mut [u8]) -> Result<usize> {
    let mut filled = 0;
    while filled < buf.len() {
        match reader.read(&mut buf[filled..]) {
            Ok(0) => break,
            Ok(n) => filled += n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(io_error("failed to read input", e)),
        }
    }
    Ok(filled)
}

fn write_all<W: Write>(writer: &mut W, bytes: &[u8]) -> Result<()> {
    writer
        .write_all(bytes)
        .map_err(|e| io_error("failed to write output", e))
}

fn io_error(msg: &str, err: io::Error) -> SolaceError {
    SolaceError::with_kind_and_source(ErrorCategory::Internal, ErrorKind::Io, msg, err)
}

fn malformed(msg: &str) -> SolaceError {
    SolaceError::with_kind(ErrorCategory::User, ErrorKind::MalformedArtifact, msg)
}

fn authentication_failed() -> SolaceError {
    SolaceError::with_kind(
        ErrorCategory::User,
        ErrorKind::AuthenticationFailed,
        "corrupt input, tampered-with data, or bad passphrase",
    )
}

fn too_large() -> SolaceError {
    SolaceError::with_kind(
        ErrorCategory::User,
        ErrorKind::TooLarge,
        "input exceeds the maximum number of frames",
    )
}
