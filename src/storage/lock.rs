//! Advisory single-writer lock next to the history file. Released when dropped.

use super::history::StoreError;
use std::fs::{File, OpenOptions};
use std::path::Path;

pub(crate) struct FileLock {
    _file: File,
}

impl FileLock {
    pub(crate) fn try_acquire(path: &Path) -> Result<Self, StoreError> {
        let file = OpenOptions::new()
            .write(true)
            .create(true)
            .truncate(false)
            .open(path)
            .map_err(|e| StoreError::io("open_lock", path, e))?;
        lock_exclusive(&file, path)?;
        Ok(Self { _file: file })
    }
}

#[cfg(unix)]
fn lock_exclusive(file: &File, path: &Path) -> Result<(), StoreError> {
    use std::os::unix::io::AsRawFd;

    // SAFETY: flock only needs a valid descriptor; `file` is borrowed for the whole
    // call, so its fd stays open.
    let result = unsafe { libc::flock(file.as_raw_fd(), libc::LOCK_EX | libc::LOCK_NB) };
    if result == 0 {
        return Ok(());
    }
    let err = std::io::Error::last_os_error();
    if err.raw_os_error() == Some(libc::EWOULDBLOCK) || err.raw_os_error() == Some(libc::EAGAIN) {
        return Err(StoreError::Locked {
            path: path.to_path_buf(),
        });
    }
    Err(StoreError::io("flock", path, err))
}

// No advisory locking off unix; a single writer per history file is assumed.
#[cfg(not(unix))]
fn lock_exclusive(_file: &File, _path: &Path) -> Result<(), StoreError> {
    Ok(())
}
