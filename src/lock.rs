//! Exclusive lock on the state directory so two syncs never interleave.

use std::fs::{self, File};
use std::path::Path;

use anyhow::{Context, Result};
use fs2::FileExt;

const LOCK_FILE: &str = "calmirror.lock";

/// Releases the lock when dropped
pub struct LockGuard {
    _file: File,
}

/// Acquire the lock, failing if another calmirror holds it
pub fn acquire(state_dir: &Path) -> Result<LockGuard> {
    fs::create_dir_all(state_dir)
        .with_context(|| format!("Failed to create state directory {}", state_dir.display()))?;

    let path = state_dir.join(LOCK_FILE);
    let file = File::create(&path).context("Failed to create lock file")?;

    file.try_lock_exclusive().map_err(|_| {
        anyhow::anyhow!(
            "Another calmirror instance is already using {}.\n\
            If you believe this is an error, remove: {}",
            state_dir.display(),
            path.display()
        )
    })?;

    Ok(LockGuard { _file: file })
}
