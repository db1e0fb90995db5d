// SPDX-License-Identifier: MIT

//! Checker subprocess lifecycle.
//!
//! The supervisor owns every [`CheckInstance`]: it spawns them, reaps them
//! through `wait4(2)`, accounts their exit status and keeps a per-disk
//! occupancy index the scheduler queries for admission.

use std::collections::HashMap;
use std::io;
use std::os::unix::process::CommandExt;
use std::path::PathBuf;
use std::process::{Command, Stdio};
use std::thread;
use std::time::{Duration, Instant};

use crate::catalog::{FilesystemCatalog, fstypes};
use crate::checker::instance::{CheckInstance, InstanceFlags, ResourceUsage, Termination};
use crate::checker::kind::{CheckerKind, ProgressArg};
use crate::checker::locator::CheckerLocator;
use crate::checker::stats::StatsReporter;
use crate::disk::{DeviceLock, DiskId, DiskTopology};
use crate::error::{CoreError, CoreResult};
use crate::exit::ExitStatus;
use crate::sched::CancelToken;
use crate::{log_debug, log_info, log_warn};

/// A new progress owner younger than this gets its `SIGUSR1` late, so its
/// handler has a chance to be installed.
const PROGRESS_GRACE: Duration = Duration::from_secs(2);
const PROGRESS_DELAY: Duration = Duration::from_secs(1);

#[derive(Debug, Clone, Default)]
pub struct SupervisorOptions {
    /// Dry run: print what would be executed, spawn nothing.
    pub noexecute: bool,
    /// Descriptor checkers report progress on (`-C`).
    pub progress_fd: Option<i32>,
    /// Lock whole rotational disks under this directory (`-l`).
    pub lock_dir: Option<PathBuf>,
    /// Passed to every checker before the device.
    pub checker_args: Vec<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WaitMode {
    /// Until the run-list is empty.
    All,
    /// At least one reap, then whatever else already finished.
    AtLeastOne,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Spawned {
    Started,
    /// No checker for a type nobody insists on.
    Skipped,
    /// Cancellation came in while waiting for the disk lock.
    Cancelled,
}

type DryRunStatus = Box<dyn FnMut(&CheckInstance) -> ExitStatus>;

pub struct CheckerSupervisor {
    opts: SupervisorOptions,
    locator: CheckerLocator,
    stats: StatsReporter,
    cancel: CancelToken,
    running: Vec<CheckInstance>,
    occupancy: HashMap<DiskId, usize>,
    unknown_disks: usize,
    stacked_disks: usize,
    kill_sent: bool,
    broadcasts: usize,
    dry_run_status: Option<DryRunStatus>,
}

impl CheckerSupervisor {
    pub fn new(opts: SupervisorOptions, locator: CheckerLocator, cancel: CancelToken) -> Self {
        Self {
            opts,
            locator,
            stats: StatsReporter::disabled(),
            cancel,
            running: Vec::new(),
            occupancy: HashMap::new(),
            unknown_disks: 0,
            stacked_disks: 0,
            kill_sent: false,
            broadcasts: 0,
            dry_run_status: None,
        }
    }

    pub fn with_stats(mut self, stats: StatsReporter) -> Self {
        self.stats = stats;
        self
    }

    /// Status synthesized for dry-run instances when they are reaped.
    pub fn with_dry_run_status(
        mut self,
        f: impl FnMut(&CheckInstance) -> ExitStatus + 'static,
    ) -> Self {
        self.dry_run_status = Some(Box::new(f));
        self
    }

    pub fn options(&self) -> &SupervisorOptions {
        &self.opts
    }

    pub fn locator(&self) -> &CheckerLocator {
        &self.locator
    }

    pub fn cancel_token(&self) -> &CancelToken {
        &self.cancel
    }

    /// Instances spawned and not reaped yet, in spawn order.
    pub fn running(&self) -> &[CheckInstance] {
        &self.running
    }

    pub fn running_count(&self) -> usize {
        self.running.len()
    }

    pub fn is_disk_busy(&self, disk: DiskId) -> bool {
        self.occupancy.contains_key(&disk)
    }

    /// Running instances whose disk could not be determined.
    pub fn unknown_running(&self) -> usize {
        self.unknown_disks
    }

    pub fn stacked_running(&self) -> usize {
        self.stacked_disks
    }

    pub fn progress_active(&self) -> bool {
        self.running.iter().any(CheckInstance::has_progress)
    }

    pub fn kill_sent(&self) -> bool {
        self.kill_sent
    }

    /// How many termination broadcasts went out this run.
    pub fn cancel_broadcasts(&self) -> usize {
        self.broadcasts
    }

    /// Starts the checker for catalog entry `idx`.
    pub fn spawn(
        &mut self,
        catalog: &mut FilesystemCatalog,
        idx: usize,
        topology: &dyn DiskTopology,
        interactive: bool,
    ) -> CoreResult<Spawned> {
        let fstype = catalog.effective_type(idx);
        let device = catalog.device(idx).to_string();
        let program = CheckerLocator::program_name(&fstype);

        let Some(path) = self.locator.find(&fstype) else {
            if fstypes::is_check_required(&fstype) {
                return Err(CoreError::CheckerNotFound { program, device });
            }
            return Ok(Spawned::Skipped);
        };

        let kind = CheckerKind::of(&fstype);
        let mut flags = InstanceFlags::empty();
        let progress = match self.opts.progress_fd {
            Some(fd) if kind.supports_progress() => {
                if self.progress_active() {
                    ProgressArg::Standby(fd)
                } else {
                    flags |= InstanceFlags::PROGRESS;
                    ProgressArg::Owner(fd)
                }
            }
            _ => ProgressArg::None,
        };
        let argv = kind.build_argv(&program, &self.opts.checker_args, progress, &device);

        if self.opts.noexecute || crate::utils::verbose() {
            log_info!(
                "[{} ({}) -- {}] {}",
                path.display(),
                self.running.len() + 1,
                catalog.entry(idx).display_target(),
                argv.join(" ")
            );
        }

        let lock = match self.opts.lock_dir.clone() {
            Some(dir) => lock_disk(catalog, idx, topology, &dir, &self.cancel),
            None => None,
        };
        if self.cancel.is_requested() {
            log_debug!("Not starting {program} for {device}, cancelled");
            return Ok(Spawned::Cancelled);
        }

        let pid = if self.opts.noexecute {
            None
        } else {
            let mut cmd = Command::new(&path);
            cmd.arg0(&program).args(&argv[1..]);
            if !interactive {
                cmd.stdin(Stdio::null());
            }
            match cmd.spawn() {
                // The child is reaped by wait4(-1) below, never through `Child`.
                Ok(child) => Some(child.id() as libc::pid_t),
                Err(source) => {
                    return Err(CoreError::Spawn {
                        program,
                        device,
                        source,
                    });
                }
            }
        };

        let entry = catalog.entry(idx);
        let disk = entry.disk();
        let stacked = entry.is_stacked();
        self.occupy(disk, stacked);

        self.running.push(CheckInstance {
            pid,
            entry: idx,
            device,
            program,
            program_path: path,
            fstype,
            kind,
            flags,
            lock,
            disk,
            stacked,
            started: Instant::now(),
            finished: None,
            rusage: ResourceUsage::default(),
            exit_status: None,
        });
        Ok(Spawned::Started)
    }

    /// Reaps one finished instance.
    ///
    /// With `block` unset returns `None` as soon as nothing is ready.
    pub fn wait_one(&mut self, block: bool) -> Option<CheckInstance> {
        if self.running.is_empty() {
            return None;
        }

        if self.opts.noexecute {
            self.poll_cancel();
            let inst = self.running.remove(0);
            let status = match self.dry_run_status.as_mut() {
                Some(f) => f(&inst),
                None => ExitStatus::OK,
            };
            return Some(self.finish(inst, status, ResourceUsage::default()));
        }

        let (pos, raw, usage) = loop {
            self.poll_cancel();

            let mut raw: libc::c_int = 0;
            // SAFETY: rusage is plain old data, all-zero is a valid value.
            let mut ru: libc::rusage = unsafe { std::mem::zeroed() };
            let options = if block { 0 } else { libc::WNOHANG };
            // SAFETY: both out-pointers refer to live locals.
            let pid = unsafe { libc::wait4(-1, &mut raw, options, &mut ru) };
            let err = (pid < 0).then(io::Error::last_os_error);

            self.poll_cancel();

            if let Some(err) = err {
                match err.raw_os_error() {
                    Some(libc::EINTR) | Some(libc::EAGAIN) => continue,
                    Some(libc::ECHILD) => {
                        log_warn!("wait: no more child process?!?");
                        return None;
                    }
                    _ => {
                        log_warn!("wait failed: {err}");
                        continue;
                    }
                }
            }
            if pid == 0 {
                return None;
            }
            if let Some(pos) = self.running.iter().position(|i| i.pid == Some(pid)) {
                break (pos, raw, ResourceUsage::from_rusage(&ru));
            }
        };

        let inst = self.running.remove(pos);
        let status = classify(&inst, raw);
        Some(self.finish(inst, status, usage))
    }

    /// Reaps per `mode` and returns the OR of the harvested statuses.
    pub fn wait_many(&mut self, mode: WaitMode) -> ExitStatus {
        let mut status = ExitStatus::OK;
        let mut block = true;
        while let Some(inst) = self.wait_one(block) {
            status |= inst.exit_status();
            if mode == WaitMode::AtLeastOne {
                block = false;
            }
        }
        status
    }

    /// Sends `sig` to every running checker; dry-run instances are counted
    /// but obviously not signalled.
    pub fn kill_all(&mut self, sig: libc::c_int) -> usize {
        let mut n = 0;
        for inst in self.running.iter().filter(|i| !i.is_done()) {
            if let Some(pid) = inst.pid {
                // SAFETY: pid is a child we spawned and have not reaped yet.
                unsafe { libc::kill(pid, sig) };
            }
            n += 1;
        }
        n
    }

    /// Asks every checker to stop. Only the first call per run does anything.
    pub fn broadcast_cancel(&mut self) -> bool {
        if self.kill_sent {
            return false;
        }
        self.kill_sent = true;
        self.broadcasts += 1;
        let n = self.kill_all(libc::SIGTERM);
        log_debug!("Sent SIGTERM to {n} checker(s)");
        true
    }

    fn poll_cancel(&mut self) {
        if self.cancel.is_requested() {
            self.broadcast_cancel();
        }
    }

    fn finish(
        &mut self,
        mut inst: CheckInstance,
        status: ExitStatus,
        usage: ResourceUsage,
    ) -> CheckInstance {
        inst.exit_status = Some(status);
        inst.flags |= InstanceFlags::DONE;
        inst.finished = Some(Instant::now());
        inst.rusage = usage;

        self.release(&inst);
        inst.lock = None;

        if inst.has_progress() && !self.progress_active() {
            self.hand_over_progress();
        }

        if !self.opts.noexecute {
            if let Err(e) = self.stats.report(&inst) {
                log_warn!("cannot write statistics: {e}");
            }
        }

        log_debug!("Finished with {} (exit status {})", inst.device, status);
        inst
    }

    fn hand_over_progress(&mut self) {
        let Some(next) = self
            .running
            .iter_mut()
            .find(|i| !i.is_done() && i.kind.supports_progress())
        else {
            return;
        };
        next.flags |= InstanceFlags::PROGRESS;

        let Some(pid) = next.pid else {
            return;
        };
        if next.started.elapsed() < PROGRESS_GRACE {
            thread::spawn(move || {
                thread::sleep(PROGRESS_DELAY);
                // SAFETY: kill(2) has no memory-safety preconditions.
                unsafe { libc::kill(pid, libc::SIGUSR1) };
            });
        } else {
            // SAFETY: as above.
            unsafe { libc::kill(pid, libc::SIGUSR1) };
        }
    }

    fn occupy(&mut self, disk: Option<DiskId>, stacked: bool) {
        match disk {
            Some(d) => *self.occupancy.entry(d).or_default() += 1,
            None => self.unknown_disks += 1,
        }
        if stacked {
            self.stacked_disks += 1;
        }
    }

    fn release(&mut self, inst: &CheckInstance) {
        match inst.disk {
            Some(d) => {
                if let Some(n) = self.occupancy.get_mut(&d) {
                    *n -= 1;
                    if *n == 0 {
                        self.occupancy.remove(&d);
                    }
                }
            }
            None => self.unknown_disks = self.unknown_disks.saturating_sub(1),
        }
        if inst.stacked {
            self.stacked_disks = self.stacked_disks.saturating_sub(1);
        }
    }
}

fn classify(inst: &CheckInstance, raw: i32) -> ExitStatus {
    let termination = Termination::from_wait_status(raw);
    match termination {
        Termination::Signaled(sig) if sig != libc::SIGINT => log_warn!(
            "Warning... {} for device {} exited with signal {}.",
            inst.program,
            inst.device,
            sig
        ),
        Termination::Unknown(st) => log_warn!(
            "{} {}: status is {:x}, should never happen.",
            inst.program,
            inst.device,
            st
        ),
        _ => {}
    }
    termination.exit_status()
}

/// Locks the whole disk of a rotational device. Failures only warn.
fn lock_disk(
    catalog: &mut FilesystemCatalog,
    idx: usize,
    topology: &dyn DiskTopology,
    dir: &std::path::Path,
    cancel: &CancelToken,
) -> Option<DeviceLock> {
    let disk = catalog.disk_of(idx, topology)?;
    if !topology.is_rotational(disk).unwrap_or(true) {
        return None;
    }
    let name = topology.disk_name(disk).ok()?;
    match DeviceLock::acquire_cancellable(dir, &name, cancel) {
        Ok(lock) => Some(lock),
        Err(_) if cancel.is_requested() => None,
        Err(e) => {
            log_warn!("{e}");
            None
        }
    }
}
