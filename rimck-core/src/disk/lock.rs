// SPDX-License-Identifier: MIT

use std::fs::{DirBuilder, File, OpenOptions};
use std::io::{self, Write};
use std::os::unix::fs::{DirBuilderExt, OpenOptionsExt};
use std::os::unix::io::AsRawFd;
use std::path::{Path, PathBuf};

use crate::error::{CoreError, CoreResult};
use crate::sched::CancelToken;

pub const DEFAULT_LOCK_DIR: &str = "/run/fsck";

/// Exclusive advisory lock on `<dir>/<disk>.lock`, held until drop.
#[derive(Debug)]
pub struct DeviceLock {
    path: PathBuf,
    _file: File,
}

enum TryLock {
    Acquired,
    Busy,
}

/// A blocking wait gives up on `EINTR` once `cancel` is requested.
fn flock(file: &File, nonblocking: bool, cancel: Option<&CancelToken>) -> io::Result<TryLock> {
    let mut op = libc::LOCK_EX;
    if nonblocking {
        op |= libc::LOCK_NB;
    }
    loop {
        // SAFETY: the descriptor is owned by `file` and stays open for the call.
        let rc = unsafe { libc::flock(file.as_raw_fd(), op) };
        if rc == 0 {
            return Ok(TryLock::Acquired);
        }
        let err = io::Error::last_os_error();
        match err.raw_os_error() {
            Some(libc::EINTR) if cancel.is_some_and(CancelToken::is_requested) => {
                return Err(err);
            }
            Some(libc::EINTR) => continue,
            Some(libc::EWOULDBLOCK) if nonblocking => return Ok(TryLock::Busy),
            _ => return Err(err),
        }
    }
}

fn ensure_lock_dir(dir: &Path) -> CoreResult<()> {
    if dir.exists() {
        return Ok(());
    }
    match DirBuilder::new().mode(0o755).recursive(true).create(dir) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == io::ErrorKind::AlreadyExists => Ok(()),
        Err(source) => Err(CoreError::LockDir {
            path: dir.to_path_buf(),
            source,
        }),
    }
}

impl DeviceLock {
    pub fn lock_path(dir: &Path, disk_name: &str) -> PathBuf {
        dir.join(format!("{disk_name}.lock"))
    }

    /// Blocks until the lock for `disk_name` is ours.
    pub fn acquire(dir: &Path, disk_name: &str) -> CoreResult<Self> {
        Self::acquire_inner(dir, disk_name, None)
    }

    /// Like [`DeviceLock::acquire`], but a signal that requests cancellation
    /// ends the wait with an error.
    pub fn acquire_cancellable(
        dir: &Path,
        disk_name: &str,
        cancel: &CancelToken,
    ) -> CoreResult<Self> {
        Self::acquire_inner(dir, disk_name, Some(cancel))
    }

    fn acquire_inner(
        dir: &Path,
        disk_name: &str,
        cancel: Option<&CancelToken>,
    ) -> CoreResult<Self> {
        ensure_lock_dir(dir)?;
        let path = Self::lock_path(dir, disk_name);

        if crate::utils::verbose() {
            print!("Locking disk by {} ... ", path.display());
            let _ = io::stdout().flush();
        }

        let res = Self::open_and_lock(&path, cancel);

        crate::log_verbose!("{}.", if res.is_ok() { "succeeded" } else { "failed" });

        res.map_err(|source| CoreError::Lock { path: path.clone(), source })
            .map(|file| DeviceLock { path, _file: file })
    }

    fn open_and_lock(path: &Path, cancel: Option<&CancelToken>) -> io::Result<File> {
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .mode(0o644)
            .custom_flags(libc::O_CLOEXEC)
            .open(path)?;

        if let TryLock::Busy = flock(&file, true, None)? {
            if crate::utils::verbose() {
                print!("(waiting) ");
                let _ = io::stdout().flush();
            }
            flock(&file, false, cancel)?;
        }
        Ok(file)
    }

    /// Non-blocking variant, `None` when somebody else holds the lock.
    pub fn try_acquire(dir: &Path, disk_name: &str) -> CoreResult<Option<Self>> {
        ensure_lock_dir(dir)?;
        let path = Self::lock_path(dir, disk_name);
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .mode(0o644)
            .open(&path)
            .map_err(|source| CoreError::Lock { path: path.clone(), source })?;

        match flock(&file, true, None) {
            Ok(TryLock::Acquired) => Ok(Some(DeviceLock { path, _file: file })),
            Ok(TryLock::Busy) => Ok(None),
            Err(source) => Err(CoreError::Lock { path, source }),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for DeviceLock {
    fn drop(&mut self) {
        crate::log_verbose!("Unlocking {}.", self.path.display());
    }
}
