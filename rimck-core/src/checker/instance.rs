// SPDX-License-Identifier: MIT

use std::path::{Path, PathBuf};
use std::time::Instant;

use bitflags::bitflags;

use crate::checker::kind::CheckerKind;
use crate::disk::{DeviceLock, DiskId};
use crate::exit::ExitStatus;

bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct InstanceFlags: u8 {
        /// Termination observed and status harvested.
        const DONE = 0x01;
        /// Holds the shared progress token.
        const PROGRESS = 0x02;
    }
}

/// Resource usage of a reaped checker.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ResourceUsage {
    /// Peak resident set size, KiB.
    pub max_rss: i64,
    pub user: time::Duration,
    pub system: time::Duration,
}

fn timeval(tv: libc::timeval) -> time::Duration {
    time::Duration::new(tv.tv_sec as i64, (tv.tv_usec as i32) * 1_000)
}

impl ResourceUsage {
    pub(crate) fn from_rusage(ru: &libc::rusage) -> Self {
        Self {
            max_rss: ru.ru_maxrss as i64,
            user: timeval(ru.ru_utime),
            system: timeval(ru.ru_stime),
        }
    }
}

/// How a child process ended, decoded from a `wait` status word.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Termination {
    Exited(i32),
    Signaled(i32),
    Unknown(i32),
}

impl Termination {
    pub fn from_wait_status(status: i32) -> Self {
        if libc::WIFEXITED(status) {
            Termination::Exited(libc::WEXITSTATUS(status))
        } else if libc::WIFSIGNALED(status) {
            Termination::Signaled(libc::WTERMSIG(status))
        } else {
            Termination::Unknown(status)
        }
    }

    /// Exit status the front-end accounts for this termination.
    ///
    /// `SIGINT` is what an interrupted check looks like, so it counts as
    /// errors left uncorrected rather than an operational error.
    pub fn exit_status(self) -> ExitStatus {
        match self {
            Termination::Exited(code) => ExitStatus::from_code(code),
            Termination::Signaled(libc::SIGINT) => ExitStatus::UNCORRECTED,
            Termination::Signaled(_) | Termination::Unknown(_) => ExitStatus::ERROR,
        }
    }
}

/// One dispatched checker, running or finished.
#[derive(Debug)]
pub struct CheckInstance {
    pub(crate) pid: Option<libc::pid_t>,
    pub(crate) entry: usize,
    pub(crate) device: String,
    pub(crate) program: String,
    pub(crate) program_path: PathBuf,
    pub(crate) fstype: String,
    pub(crate) kind: CheckerKind,
    pub(crate) flags: InstanceFlags,
    pub(crate) lock: Option<DeviceLock>,
    pub(crate) disk: Option<DiskId>,
    pub(crate) stacked: bool,
    pub(crate) started: Instant,
    pub(crate) finished: Option<Instant>,
    pub(crate) rusage: ResourceUsage,
    pub(crate) exit_status: Option<ExitStatus>,
}

impl CheckInstance {
    /// `None` for dry-run instances.
    pub fn pid(&self) -> Option<i32> {
        self.pid
    }

    /// Catalog index of the checked entry.
    pub fn entry(&self) -> usize {
        self.entry
    }

    pub fn device(&self) -> &str {
        &self.device
    }

    pub fn program(&self) -> &str {
        &self.program
    }

    pub fn program_path(&self) -> &Path {
        &self.program_path
    }

    pub fn fstype(&self) -> &str {
        &self.fstype
    }

    pub fn kind(&self) -> CheckerKind {
        self.kind
    }

    pub fn flags(&self) -> InstanceFlags {
        self.flags
    }

    pub fn is_done(&self) -> bool {
        self.flags.contains(InstanceFlags::DONE)
    }

    pub fn has_progress(&self) -> bool {
        self.flags.contains(InstanceFlags::PROGRESS)
    }

    pub fn is_locked(&self) -> bool {
        self.lock.is_some()
    }

    pub fn disk(&self) -> Option<DiskId> {
        self.disk
    }

    pub fn is_stacked(&self) -> bool {
        self.stacked
    }

    pub fn rusage(&self) -> ResourceUsage {
        self.rusage
    }

    /// Harvested status; `OK` while still running.
    pub fn exit_status(&self) -> ExitStatus {
        self.exit_status.unwrap_or(ExitStatus::OK)
    }

    pub fn is_harvested(&self) -> bool {
        self.exit_status.is_some()
    }

    /// Wall time between spawn and reap, or until now while running.
    pub fn elapsed(&self) -> time::Duration {
        let end = self.finished.unwrap_or_else(Instant::now);
        time::Duration::try_from(end.duration_since(self.started)).unwrap_or(time::Duration::ZERO)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // Linux wait status encodings.
    fn exited(code: i32) -> i32 {
        (code & 0xff) << 8
    }
    fn signaled(sig: i32) -> i32 {
        sig & 0x7f
    }

    #[test]
    fn test_exited_maps_to_code() {
        let t = Termination::from_wait_status(exited(4));
        assert_eq!(t, Termination::Exited(4));
        assert_eq!(t.exit_status(), ExitStatus::UNCORRECTED);
        assert_eq!(Termination::from_wait_status(exited(0)).exit_status(), ExitStatus::OK);
    }

    #[test]
    fn test_sigint_maps_to_uncorrected() {
        let t = Termination::from_wait_status(signaled(libc::SIGINT));
        assert_eq!(t, Termination::Signaled(libc::SIGINT));
        assert_eq!(t.exit_status(), ExitStatus::UNCORRECTED);
    }

    #[test]
    fn test_other_signals_map_to_error() {
        let t = Termination::from_wait_status(signaled(libc::SIGKILL));
        assert_eq!(t.exit_status(), ExitStatus::ERROR);
        let t = Termination::from_wait_status(signaled(libc::SIGSEGV));
        assert_eq!(t.exit_status(), ExitStatus::ERROR);
    }

    #[test]
    fn test_stopped_status_is_unknown() {
        // WIFSTOPPED: 0x7f in the low byte
        let t = Termination::from_wait_status((libc::SIGSTOP << 8) | 0x7f);
        assert!(matches!(t, Termination::Unknown(_)));
        assert_eq!(t.exit_status(), ExitStatus::ERROR);
    }

    #[test]
    fn test_rusage_conversion() {
        let mut ru: libc::rusage = unsafe { std::mem::zeroed() };
        ru.ru_maxrss = 2048;
        ru.ru_utime.tv_sec = 1;
        ru.ru_utime.tv_usec = 250_000;
        ru.ru_stime.tv_usec = 500;
        let usage = ResourceUsage::from_rusage(&ru);
        assert_eq!(usage.max_rss, 2048);
        assert_eq!(usage.user, time::Duration::milliseconds(1250));
        assert_eq!(usage.system, time::Duration::microseconds(500));
    }
}
