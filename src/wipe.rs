//! Best-effort secure deletion of plaintext files
//!
//! The file's current byte range is overwritten with fresh random data for a
//! number of passes, each flushed and synced to stable storage before the
//! next, and the directory entry is then removed.
//!
//! This only defends against casual inspection of the raw disk. It does not
//! reach data that the storage stack has moved elsewhere: copy-on-write
//! filesystems (btrfs, ZFS, APFS), SSD wear-levelling and filesystem
//! snapshots may all keep the original blocks around.

use std::fs::{self, OpenOptions};
use std::io::{self, Seek, SeekFrom, Write};
use std::path::Path;

use rand::rngs::{OsRng, StdRng};
use rand::{RngCore, SeedableRng};
use tracing::{debug, info};

use crate::config::CryptConfig;
use crate::error::{ErrorCategory, ErrorKind, Result, SolaceError};

const BLOCK_SIZE: usize = 64 * 1024;

/// Overwrite `path` with random bytes `WIPE_PASSES` times, then remove it.
pub fn secure_delete(path: &Path) -> Result<()> {
    secure_delete_with(&CryptConfig::default(), path)
}

pub fn secure_delete_with(config: &CryptConfig, path: &Path) -> Result<()> {
    if config.wipe_passes == 0 {
        return Err(SolaceError::with_kind(
            ErrorCategory::User,
            ErrorKind::InvalidConfig,
            "secure deletion needs at least one overwrite pass",
        ));
    }

    overwrite(path, config.wipe_passes)?;
    fs::remove_file(path)
        .map_err(|e| wipe_error(format!("failed to remove {}", path.display()), e))?;

    info!(path = %path.display(), passes = config.wipe_passes, "securely deleted file");
    Ok(())
}

/// Overwrite the existing contents of `path` without changing its length.
fn overwrite(path: &Path, passes: u32) -> Result<()> {
    let mut file = OpenOptions::new()
        .write(true)
        .open(path)
        .map_err(|e| wipe_error(format!("failed to open {}", path.display()), e))?;
    let len = file
        .metadata()
        .map_err(|e| wipe_error(format!("failed to stat {}", path.display()), e))?
        .len();

    let mut rng = StdRng::from_rng(OsRng).map_err(|e| {
        SolaceError::with_kind_and_source(
            ErrorCategory::Internal,
            ErrorKind::Randomness,
            "operating system random source failed",
            e,
        )
    })?;
    let mut block = vec![0u8; BLOCK_SIZE];

    for pass in 1..=passes {
        file.seek(SeekFrom::Start(0))
            .map_err(|e| wipe_error(format!("failed to rewind {}", path.display()), e))?;

        let mut remaining = len;
        while remaining > 0 {
            let n = remaining.min(BLOCK_SIZE as u64) as usize;
            rng.fill_bytes(&mut block[..n]);
            file.write_all(&block[..n])
                .map_err(|e| wipe_error(format!("failed to overwrite {}", path.display()), e))?;
            remaining -= n as u64;
        }

        file.flush()
            .map_err(|e| wipe_error(format!("failed to flush {}", path.display()), e))?;
        file.sync_all()
            .map_err(|e| wipe_error(format!("failed to sync {}", path.display()), e))?;
        debug!(pass, bytes = len, "overwrite pass complete");
    }

    Ok(())
}

fn wipe_error(msg: String, err: io::Error) -> SolaceError {
    let category = match err.kind() {
        io::ErrorKind::NotFound | io::ErrorKind::PermissionDenied => ErrorCategory::User,
        _ => ErrorCategory::Internal,
    };
    SolaceError::with_kind_and_source(category, ErrorKind::SecureDelete, msg, err)
}
