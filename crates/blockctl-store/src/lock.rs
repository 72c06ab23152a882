//! Directory locking shared by the file-backed registry and metadata store.

use crate::error::StoreError;
use fs4::fs_std::FileExt;
use std::fs::{File, OpenOptions};
use std::path::Path;

const LOCK_FILE_NAME: &str = ".blockctl.lock";

/// Takes an exclusive, non-blocking lock on `<dir>/.blockctl.lock`, writing
/// the current PID into it. The returned `File` must be held for the
/// lifetime of the owning store; dropping it releases the lock.
pub fn acquire_directory_lock(dir: &Path) -> Result<File, StoreError> {
    let lock_path = dir.join(LOCK_FILE_NAME);
    let lock_file = OpenOptions::new()
        .create(true)
        .read(true)
        .write(true)
        .truncate(false)
        .open(&lock_path)
        .map_err(|e| StoreError::from_io_error(e, "opening directory lock file"))?;

    if lock_file.try_lock_exclusive().is_err() {
        let existing_pid = std::fs::read_to_string(&lock_path)
            .ok()
            .and_then(|s| s.lines().next().and_then(|l| l.trim().parse().ok()));
        return Err(StoreError::DirectoryLocked {
            context: dir.display().to_string(),
            pid: existing_pid,
        });
    }

    write_lock_metadata(&lock_file)?;
    Ok(lock_file)
}

fn write_lock_metadata(lock_file: &File) -> Result<(), StoreError> {
    use std::io::{Seek, SeekFrom, Write};
    let mut file = lock_file;
    file.set_len(0)
        .map_err(|e| StoreError::from_io_error(e, "truncating lock file"))?;
    file.seek(SeekFrom::Start(0))
        .map_err(|e| StoreError::from_io_error(e, "seeking lock file"))?;
    writeln!(file, "{}", std::process::id())
        .map_err(|e| StoreError::from_io_error(e, "writing lock metadata"))?;
    writeln!(file, "{}", chrono::Utc::now().to_rfc3339())
        .map_err(|e| StoreError::from_io_error(e, "writing lock metadata"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn second_lock_on_same_directory_fails() {
        let dir = tempfile::tempdir().unwrap();
        let _first = acquire_directory_lock(dir.path()).unwrap();
        let second = acquire_directory_lock(dir.path());
        assert!(matches!(second, Err(StoreError::DirectoryLocked { .. })));
    }

    #[test]
    fn lock_is_released_on_drop() {
        let dir = tempfile::tempdir().unwrap();
        {
            let _first = acquire_directory_lock(dir.path()).unwrap();
        }
        let second = acquire_directory_lock(dir.path());
        assert!(second.is_ok());
    }
}
