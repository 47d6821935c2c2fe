//! File-based locking to prevent concurrent execution.
//!
//! Two runs interleaving their delete and create steps against the same
//! account would leave lists that no policy references, so mutating
//! commands hold an advisory lock for their whole duration.

use anyhow::{Context, Result};
use fs2::FileExt;
use std::fs::{self, File, OpenOptions};
use std::path::Path;

/// A guard that holds an exclusive lock on the lock file.
/// The lock is automatically released when the guard is dropped.
#[derive(Debug)]
pub struct LockGuard {
    _file: File,
}

impl LockGuard {
    /// Attempt to acquire an exclusive lock on `path`.
    /// Returns an error if another instance is already running.
    pub fn acquire(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)
                    .with_context(|| format!("Failed to create lock directory: {:?}", parent))?;
            }
        }

        // Open without truncating so creation and locking cannot race
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(path)
            .with_context(|| format!("Failed to open lock file: {:?}", path))?;

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            fs::set_permissions(path, fs::Permissions::from_mode(0o600))
                .context("Failed to set lock file permissions")?;
        }

        file.try_lock_exclusive().map_err(|_| {
            anyhow::anyhow!(
                "Another gateway-adblock run is in progress.\n\
                 If you believe this is an error, remove the lock file: {:?}",
                path
            )
        })?;

        Ok(Self { _file: file })
    }
}
