// SPDX-License-Identifier: MIT

#![allow(dead_code)]

use std::cell::RefCell;
use std::collections::{HashMap, HashSet};
use std::io;
use std::os::unix::fs::PermissionsExt;
use std::path::Path;
use std::rc::Rc;

use rimck_core::checker::{CheckerSupervisor, SupervisorOptions};
use rimck_core::sched::Dispatch;
use rimck_core::*;

/// In-memory block topology: device path to disk, plus stacked disks.
#[derive(Debug, Default, Clone)]
pub struct FakeTopology {
    devices: HashMap<String, DiskId>,
    stacked: HashSet<DiskId>,
}

impl FakeTopology {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn device(mut self, path: &str, major: u32, minor: u32) -> Self {
        self.devices.insert(path.to_string(), DiskId::new(major, minor));
        self
    }

    pub fn stacked(mut self, major: u32, minor: u32) -> Self {
        self.stacked.insert(DiskId::new(major, minor));
        self
    }
}

impl DiskTopology for FakeTopology {
    fn whole_disk(&self, device: &str) -> io::Result<DiskId> {
        self.devices
            .get(device)
            .copied()
            .ok_or_else(|| io::Error::from(io::ErrorKind::NotFound))
    }

    fn count_slaves(&self, disk: DiskId) -> io::Result<usize> {
        Ok(if self.stacked.contains(&disk) { 2 } else { 0 })
    }

    fn is_rotational(&self, _disk: DiskId) -> io::Result<bool> {
        Ok(true)
    }

    fn disk_name(&self, disk: DiskId) -> io::Result<String> {
        Ok(format!("disk-{}-{}", disk.major, disk.minor))
    }

    fn is_block_device(&self, device: &str) -> bool {
        self.devices.contains_key(device)
    }
}

/// Directory of `fsck.<type>` shell scripts.
pub fn checker_dir(scripts: &[(&str, &str)]) -> tempfile::TempDir {
    let dir = tempfile::tempdir().unwrap();
    for (fstype, body) in scripts {
        write_script(dir.path(), &format!("fsck.{fstype}"), body);
    }
    dir
}

pub fn write_script(dir: &Path, name: &str, body: &str) {
    let path = dir.join(name);
    std::fs::write(&path, format!("#!/bin/sh\n{body}\n")).unwrap();
    std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();
}

pub fn entry(source: &str, target: &str, fstype: &str, passno: u32) -> TableEntry {
    TableEntry::new(source)
        .with_target(target)
        .with_fstype(fstype)
        .with_passno(passno)
}

/// A dry-run scheduler plus what it reaped, in order.
pub struct DryRun {
    pub scheduler: Scheduler,
    pub reaped: Rc<RefCell<Vec<String>>>,
    pub cancel: CancelToken,
    _bin: tempfile::TempDir,
}

impl DryRun {
    pub fn new(rows: Vec<TableEntry>, topology: FakeTopology, opts: SchedulerOptions) -> Self {
        Self::with_status(rows, topology, opts, |_| ExitStatus::OK)
    }

    /// `status` decides what each reaped device "exited" with.
    pub fn with_status(
        rows: Vec<TableEntry>,
        topology: FakeTopology,
        opts: SchedulerOptions,
        status: impl FnMut(&str) -> ExitStatus + 'static,
    ) -> Self {
        Self::with_token(rows, topology, opts, CancelToken::new(), status)
    }

    pub fn with_token(
        rows: Vec<TableEntry>,
        topology: FakeTopology,
        opts: SchedulerOptions,
        cancel: CancelToken,
        mut status: impl FnMut(&str) -> ExitStatus + 'static,
    ) -> Self {
        let bin = checker_dir(&[("ext2", "exit 0"), ("ext4", "exit 0"), ("xfs", "exit 0")]);
        let reaped = Rc::new(RefCell::new(Vec::new()));

        let log = Rc::clone(&reaped);
        let sup_opts = SupervisorOptions {
            noexecute: true,
            ..Default::default()
        };
        let supervisor =
            CheckerSupervisor::new(sup_opts, CheckerLocator::new(bin.path()), cancel.clone())
                .with_dry_run_status(move |inst| {
                    log.borrow_mut().push(inst.device().to_string());
                    status(inst.device())
                });

        let catalog = FilesystemCatalog::new(rows);
        let scheduler = Scheduler::new(opts, catalog, supervisor, topology);
        Self {
            scheduler,
            reaped,
            cancel,
            _bin: bin,
        }
    }

    /// Dispatched devices, in dispatch order.
    pub fn order(&self) -> Vec<String> {
        self.scheduler
            .dispatches()
            .iter()
            .map(|d| self.scheduler.catalog().entry(d.entry).device().to_string())
            .collect()
    }

    pub fn dispatches(&self) -> &[Dispatch] {
        self.scheduler.dispatches()
    }

    /// Panics when two checkers ever shared a disk, or an unknown or stacked
    /// disk ran next to anything.
    pub fn assert_one_per_disk(&self) {
        let catalog = self.scheduler.catalog();
        for d in self.dispatches() {
            let me = catalog.entry(d.entry);
            for &other in &d.alongside {
                let them = catalog.entry(other);
                let (Some(a), Some(b)) = (me.disk(), them.disk()) else {
                    panic!("{} ran next to {} with an unknown disk", me.device(), them.device());
                };
                assert!(
                    !me.is_stacked() && !them.is_stacked(),
                    "stacked disk shared: {} / {}",
                    me.device(),
                    them.device()
                );
                assert_ne!(a, b, "{} and {} share disk {a}", me.device(), them.device());
            }
        }
    }
}
