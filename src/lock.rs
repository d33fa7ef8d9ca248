//! Advisory single-writer lock for a combined store directory.

use std::fs::File;
use std::path::{Path, PathBuf};
use std::thread;
use std::time::{Duration, Instant};

use fs2::FileExt;

use crate::constants::STORE_LOCK_FILE;
use crate::error::{DocvecError, Result};
use crate::types::LockSettings;

/// Exclusive lock on `<dir>/.docvec.lock`, released on drop.
#[derive(Debug)]
pub struct StoreLock {
    file: File,
    path: PathBuf,
}

impl StoreLock {
    /// Blocks (polling) until the lock is free or `settings.timeout_ms` elapses.
    pub fn acquire(dir: &Path, settings: &LockSettings) -> Result<Self> {
        fs_err::create_dir_all(dir)?;
        let (file, path) = fs_err::OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(dir.join(STORE_LOCK_FILE))?
            .into_parts();

        let deadline = Instant::now() + Duration::from_millis(settings.timeout_ms);
        let poll = Duration::from_millis(settings.poll_ms.max(1));
        loop {
            match file.try_lock_exclusive() {
                Ok(()) => {
                    tracing::debug!(lock = ?path, "store lock acquired");
                    return Ok(Self { file, path });
                }
                Err(err) if err.kind() == fs2::lock_contended_error().kind() => {
                    if Instant::now() >= deadline {
                        return Err(DocvecError::Lock(format!(
                            "{} is held by another writer (waited {} ms)",
                            path.display(),
                            settings.timeout_ms
                        )));
                    }
                    thread::sleep(poll);
                }
                Err(err) => return Err(err.into()),
            }
        }
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for StoreLock {
    fn drop(&mut self) {
        if let Err(err) = FileExt::unlock(&self.file) {
            tracing::warn!(lock = ?self.path, error = %err, "failed to release store lock");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn quick() -> LockSettings {
        LockSettings {
            timeout_ms: 50,
            poll_ms: 5,
        }
    }

    #[test]
    fn second_writer_times_out() {
        let dir = TempDir::new().expect("tempdir");
        let _held = StoreLock::acquire(dir.path(), &quick()).expect("first lock");
        let err = StoreLock::acquire(dir.path(), &quick()).expect_err("contended");
        assert!(matches!(err, DocvecError::Lock(_)));
    }

    #[test]
    fn unwritable_lock_path_reports_the_path() {
        let dir = TempDir::new().expect("tempdir");
        fs_err::create_dir(dir.path().join(STORE_LOCK_FILE)).expect("occupy lock path");
        let err = StoreLock::acquire(dir.path(), &quick()).expect_err("directory in the way");
        assert!(matches!(err, DocvecError::Io { .. }));
        assert!(err.to_string().contains(STORE_LOCK_FILE));
    }

    #[test]
    fn lock_is_released_on_drop() {
        let dir = TempDir::new().expect("tempdir");
        {
            let lock = StoreLock::acquire(dir.path(), &quick()).expect("first lock");
            assert!(lock.path().ends_with(STORE_LOCK_FILE));
        }
        StoreLock::acquire(dir.path(), &quick()).expect("relock");
    }
}
