//! Cross-process lock for a game directory.
//!
//! Lock files live in the engine's data directory (`{data_dir}/locks/`), never
//! inside the game directory. The file name is derived from a SHA-256 of the
//! canonical target path, so two processes pointing at the same directory
//! through different spellings still contend for one lock.
//!
//! # Async Safety
//!
//! File opens and lock attempts run in `spawn_blocking`; waiting uses
//! exponential backoff so the runtime is never blocked.

use anyhow::{Context, Result};
use fs4::fs_std::FileExt;
use sha2::{Digest, Sha256};
use std::fs::{File, OpenOptions};
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tokio_retry::strategy::ExponentialBackoff;
use tracing::debug;

use crate::constants::{MAX_BACKOFF_DELAY_MS, STARTING_BACKOFF_DELAY_MS, default_lock_timeout};
use crate::core::SctoolsError;

/// Held while an install, uninstall or toggle runs against one target.
///
/// Released on drop. The lock file itself stays: waiters hold handles on it, and
/// unlinking would let a newcomer lock a fresh file at the same path.
#[derive(Debug)]
pub struct TargetLock {
    _file: Arc<File>,
    lock_name: String,
}

impl Drop for TargetLock {
    fn drop(&mut self) {
        debug!(lock_name = %self.lock_name, "Target lock released");
    }
}

/// Stable key for a target: its canonical path when it exists, else the path as given.
pub fn target_key(target: &Path) -> String {
    std::fs::canonicalize(target)
        .unwrap_or_else(|_| target.to_path_buf())
        .to_string_lossy()
        .into_owned()
}

fn lock_file_name(key: &str) -> String {
    let digest = Sha256::digest(key.as_bytes());
    format!("target-{}.lock", &hex::encode(digest)[..16])
}

impl TargetLock {
    pub async fn acquire(locks_dir: &Path, target: &Path) -> Result<Self> {
        Self::acquire_with_timeout(locks_dir, target, default_lock_timeout()).await
    }

    /// Waits up to `timeout` for the lock, backing off from 10ms to 500ms between attempts.
    pub async fn acquire_with_timeout(locks_dir: &Path, target: &Path, timeout: Duration) -> Result<Self> {
        let key = target_key(target);
        let lock_name = format!("target:{key}");
        debug!(lock_name = %lock_name, "Waiting for target lock");

        tokio::fs::create_dir_all(locks_dir)
            .await
            .with_context(|| format!("Failed to create locks directory: {}", locks_dir.display()))?;
        let lock_path = locks_dir.join(lock_file_name(&key));

        let open_path = lock_path.clone();
        let file = tokio::task::spawn_blocking(move || {
            OpenOptions::new().create(true).write(true).truncate(false).open(&open_path)
        })
        .await
        .with_context(|| "spawn_blocking panicked")?
        .with_context(|| format!("Failed to open lock file: {}", lock_path.display()))?;
        let file = Arc::new(file);

        let start = std::time::Instant::now();
        let backoff = ExponentialBackoff::from_millis(STARTING_BACKOFF_DELAY_MS)
            .max_delay(Duration::from_millis(MAX_BACKOFF_DELAY_MS));

        for delay in backoff {
            let attempt = Arc::clone(&file);
            let locked = tokio::task::spawn_blocking(move || attempt.try_lock_exclusive())
                .await
                .with_context(|| "spawn_blocking panicked")?;

            match locked {
                Ok(true) => {
                    debug!(
                        lock_name = %lock_name,
                        wait_ms = start.elapsed().as_millis(),
                        "Target lock acquired"
                    );
                    return Ok(Self { _file: file, lock_name });
                }
                Ok(false) | Err(_) => {
                    let remaining = timeout.saturating_sub(start.elapsed());
                    if remaining.is_zero() {
                        break;
                    }
                    tokio::time::sleep(delay.min(remaining)).await;
                }
            }
        }

        Err(SctoolsError::LockTimeout {
            name: key,
            timeout_secs: timeout.as_secs(),
        }
        .into())
    }
}
