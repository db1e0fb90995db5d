// SPDX-License-Identifier: MIT

//! Pass-ordered admission.
//!
//! Entries are dispatched in catalog order, pass by pass. Within a pass an
//! entry waits while its disk is busy; a pass only ends once everything it
//! dispatched has been reaped.

use crate::catalog::FilesystemCatalog;
use crate::checker::{CheckerSupervisor, Spawned, WaitMode};
use crate::disk::DiskTopology;
use crate::exit::ExitStatus;
use crate::{log_debug, log_verbose, log_warn};

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SchedulerOptions {
    /// One checker at a time (`-s`).
    pub serialize: bool,
    /// Check `/` together with everything else (`-P`).
    pub parallel_root: bool,
    /// Never check `/` (`-R`).
    pub skip_root: bool,
    /// Leave mounted filesystems alone (`-M`).
    pub skip_mounted: bool,
    /// Disable disk contention checks entirely.
    pub force_all_parallel: bool,
    /// Cap on concurrently running checkers.
    pub max_running: Option<usize>,
}

/// When an entry got dispatched.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    /// The `/` check that runs alone before the pass loop.
    Root,
    Pass(u32),
    /// Named on the command line.
    Explicit,
}

/// One successful spawn, recorded for inspection after the run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Dispatch {
    pub entry: usize,
    pub stage: Stage,
    /// Entries whose checkers were still running at that moment.
    pub alongside: Vec<usize>,
}

/// Which entry point a run takes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RunMode {
    /// `-A`
    All,
    /// Explicit devices or mount points.
    Devices(Vec<String>),
}

#[derive(Debug)]
struct RunState {
    pass: u32,
    status: ExitStatus,
}

impl Default for RunState {
    fn default() -> Self {
        Self {
            pass: 1,
            status: ExitStatus::OK,
        }
    }
}

pub struct Scheduler {
    opts: SchedulerOptions,
    catalog: FilesystemCatalog,
    supervisor: CheckerSupervisor,
    topology: Box<dyn DiskTopology>,
    state: RunState,
    journal: Vec<Dispatch>,
}

impl Scheduler {
    pub fn new(
        opts: SchedulerOptions,
        catalog: FilesystemCatalog,
        supervisor: CheckerSupervisor,
        topology: impl DiskTopology + 'static,
    ) -> Self {
        Self {
            opts,
            catalog,
            supervisor,
            topology: Box::new(topology),
            state: RunState::default(),
            journal: Vec::new(),
        }
    }

    pub fn options(&self) -> &SchedulerOptions {
        &self.opts
    }

    pub fn catalog(&self) -> &FilesystemCatalog {
        &self.catalog
    }

    pub fn supervisor(&self) -> &CheckerSupervisor {
        &self.supervisor
    }

    pub fn dispatches(&self) -> &[Dispatch] {
        &self.journal
    }

    /// Pass the loop is in, or stopped at.
    pub fn pass(&self) -> u32 {
        self.state.pass
    }

    pub fn into_parts(self) -> (FilesystemCatalog, CheckerSupervisor) {
        (self.catalog, self.supervisor)
    }

    /// Runs `mode`; with no devices named this is a serialized check of
    /// everything.
    pub fn run(&mut self, mode: RunMode) -> ExitStatus {
        match mode {
            RunMode::All => self.check_all(),
            RunMode::Devices(devices) if devices.is_empty() => {
                self.opts.serialize = true;
                self.check_all()
            }
            RunMode::Devices(devices) => self.check_devices(&devices),
        }
    }

    fn cancelled(&self) -> bool {
        self.supervisor.cancel_token().is_requested()
    }

    /// Checks every catalog entry in pass order.
    pub fn check_all(&mut self) -> ExitStatus {
        log_verbose!("Checking all file systems.");

        for idx in 0..self.catalog.len() {
            if self
                .catalog
                .ignore(idx, self.supervisor.locator(), self.topology.as_ref())
            {
                self.catalog.set_done(idx);
            }
        }

        if !self.opts.parallel_root {
            if let Some(root) = self.catalog.find_root() {
                if !self.opts.skip_root
                    && !self.catalog.is_done(root)
                    && !(self.opts.skip_mounted && self.catalog.is_mounted(root))
                {
                    let status = self.dispatch(root, Stage::Root, true);
                    self.state.status |= status;
                    self.state.status |= self.supervisor.wait_many(WaitMode::All);
                    if self.state.status.is_beyond_nondestruct() {
                        return self.state.status;
                    }
                }
                self.catalog.set_done(root);
            }
        }

        if self.opts.skip_root {
            for idx in 0..self.catalog.len() {
                if self.catalog.entry(idx).is_root() {
                    self.catalog.set_done(idx);
                }
            }
        }

        let mut not_done_yet = true;
        while not_done_yet {
            not_done_yet = false;
            let mut pass_done = true;

            for idx in 0..self.catalog.len() {
                if self.cancelled() {
                    break;
                }
                if self.catalog.is_done(idx) {
                    continue;
                }
                if self.catalog.entry(idx).passno > self.state.pass {
                    not_done_yet = true;
                    continue;
                }
                if self.opts.skip_mounted && self.catalog.is_mounted(idx) {
                    self.catalog.set_done(idx);
                    continue;
                }
                if self.disk_already_active(idx) {
                    pass_done = false;
                    continue;
                }

                let stage = Stage::Pass(self.state.pass);
                let status = self.dispatch(idx, stage, self.opts.serialize);
                self.state.status |= status;
                self.catalog.set_done(idx);

                if self.opts.serialize || self.at_capacity() {
                    pass_done = false;
                    break;
                }
            }

            if self.cancelled() {
                break;
            }

            log_debug!("--waiting-- (pass {})", self.state.pass);
            let mode = if pass_done {
                WaitMode::All
            } else {
                WaitMode::AtLeastOne
            };
            self.state.status |= self.supervisor.wait_many(mode);

            if pass_done {
                log_debug!("----------------------------------");
                self.state.pass = self.next_pass();
            } else {
                not_done_yet = true;
            }
        }

        if self.cancelled() {
            self.supervisor.broadcast_cancel();
        }
        self.state.status |= self.supervisor.wait_many(WaitMode::All);
        self.state.status
    }

    /// Checks the named devices or mount points, in order.
    pub fn check_devices<S: AsRef<str>>(&mut self, devices: &[S]) -> ExitStatus {
        let interactive = devices.len() == 1 || self.opts.serialize;

        for device in devices {
            if self.cancelled() {
                self.supervisor.broadcast_cancel();
                break;
            }

            let device = device.as_ref();
            let idx = match self.catalog.lookup(device) {
                Some(idx) if self.catalog.is_ignored_type(idx) => continue,
                Some(idx) => idx,
                None => self.catalog.add_dummy(device),
            };
            if self.opts.skip_mounted && self.catalog.is_mounted(idx) {
                continue;
            }

            let status = self.dispatch(idx, Stage::Explicit, interactive);
            self.state.status |= status;

            if self.opts.serialize || self.at_capacity() {
                if let Some(inst) = self.supervisor.wait_one(true) {
                    self.state.status |= inst.exit_status();
                }
                log_debug!("----------------------------------");
            }
        }

        self.state.status |= self.supervisor.wait_many(WaitMode::All);
        self.state.status
    }

    /// Lowest pass number still waiting, so empty passes are skipped.
    fn next_pass(&self) -> u32 {
        let current = self.state.pass;
        self.catalog
            .entries()
            .iter()
            .filter(|e| !e.is_done() && e.passno > current)
            .map(|e| e.passno)
            .min()
            .unwrap_or(current.saturating_add(1))
    }

    fn at_capacity(&self) -> bool {
        matches!(self.opts.max_running, Some(max) if max > 0 && self.supervisor.running_count() >= max)
    }

    /// Whether dispatching `idx` now would put two checkers on one disk.
    ///
    /// Unknown and stacked disks conflict with everything.
    pub fn disk_already_active(&mut self, idx: usize) -> bool {
        if self.opts.force_all_parallel {
            return false;
        }
        if self.supervisor.stacked_running() > 0 {
            return true;
        }

        // Resolved even when idle: the running instance snapshots it.
        let busy = self.supervisor.running_count() > 0;
        match self.catalog.disk_of(idx, self.topology.as_ref()) {
            None => busy,
            Some(_) if self.catalog.entry(idx).is_stacked() => busy,
            Some(disk) => {
                self.supervisor.unknown_running() > 0 || self.supervisor.is_disk_busy(disk)
            }
        }
    }

    fn dispatch(&mut self, idx: usize, stage: Stage, interactive: bool) -> ExitStatus {
        let alongside: Vec<usize> = self.supervisor.running().iter().map(|i| i.entry()).collect();

        match self
            .supervisor
            .spawn(&mut self.catalog, idx, self.topology.as_ref(), interactive)
        {
            Ok(Spawned::Started) => {
                self.journal.push(Dispatch {
                    entry: idx,
                    stage,
                    alongside,
                });
                ExitStatus::OK
            }
            Ok(Spawned::Skipped | Spawned::Cancelled) => ExitStatus::OK,
            Err(e) => {
                log_warn!("{e}");
                e.exit_status()
            }
        }
    }
}
