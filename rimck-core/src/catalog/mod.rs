// SPDX-License-Identifier: MIT

//! The worklist of filesystems for one run.
//!
//! Rows come from an already parsed filesystem table. The catalog owns the
//! per-entry state the scheduler needs (`done`, cached disk identity) and
//! decides, once per entry, whether it should ever be checked.

pub mod entry;
pub mod filter;
pub mod fstypes;

pub use entry::*;
pub use filter::*;

use crate::checker::CheckerLocator;
use crate::disk::{DiskId, DiskTopology};

/// Maps a table source (`UUID=...`, symlink, path) to a device path.
pub trait SpecResolver {
    fn resolve(&self, spec: &str) -> Option<String>;
}

/// Detects the filesystem type of a device for `auto` entries.
pub trait TypeProbe {
    /// `None` when the type is unknown or ambiguous.
    fn probe(&self, device: &str) -> Option<String>;
}

/// View of the currently mounted filesystems.
pub trait MountTable {
    fn is_mounted(&self, source: &str, device: &str) -> bool;
}

/// Leaves sources untouched.
#[derive(Debug, Default, Clone, Copy)]
pub struct PlainSpecs;

impl SpecResolver for PlainSpecs {
    fn resolve(&self, _spec: &str) -> Option<String> {
        None
    }
}

#[derive(Debug, Default, Clone, Copy)]
pub struct NoProbe;

impl TypeProbe for NoProbe {
    fn probe(&self, _device: &str) -> Option<String> {
        None
    }
}

#[derive(Debug, Default, Clone, Copy)]
pub struct NoMounts;

impl MountTable for NoMounts {
    fn is_mounted(&self, _source: &str, _device: &str) -> bool {
        false
    }
}

pub struct FilesystemCatalog {
    entries: Vec<FsEntry>,
    filter: TypeFilter,
    default_type: String,
    resolver: Box<dyn SpecResolver>,
    probe: Box<dyn TypeProbe>,
    mounts: Box<dyn MountTable>,
}

impl FilesystemCatalog {
    pub fn new(rows: Vec<TableEntry>) -> Self {
        Self {
            entries: rows.into_iter().map(FsEntry::from_table).collect(),
            filter: TypeFilter::default(),
            default_type: fstypes::DEFAULT_FSTYPE.to_string(),
            resolver: Box::new(PlainSpecs),
            probe: Box::new(NoProbe),
            mounts: Box::new(NoMounts),
        }
    }

    pub fn with_filter(mut self, filter: TypeFilter) -> Self {
        self.filter = filter;
        self
    }

    pub fn with_default_type(mut self, fstype: impl Into<String>) -> Self {
        self.default_type = fstype.into();
        self
    }

    pub fn with_resolver(mut self, resolver: impl SpecResolver + 'static) -> Self {
        self.resolver = Box::new(resolver);
        self
    }

    pub fn with_probe(mut self, probe: impl TypeProbe + 'static) -> Self {
        self.probe = Box::new(probe);
        self
    }

    pub fn with_mounts(mut self, mounts: impl MountTable + 'static) -> Self {
        self.mounts = Box::new(mounts);
        self
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn entries(&self) -> &[FsEntry] {
        &self.entries
    }

    pub fn entry(&self, idx: usize) -> &FsEntry {
        &self.entries[idx]
    }

    pub fn filter(&self) -> &TypeFilter {
        &self.filter
    }

    pub fn set_done(&mut self, idx: usize) {
        self.entries[idx].set_done();
    }

    pub fn is_done(&self, idx: usize) -> bool {
        self.entries[idx].is_done()
    }

    /// Canonical device path of the entry, resolved once.
    pub fn device(&mut self, idx: usize) -> &str {
        let entry = &mut self.entries[idx];
        if entry.device.is_none() {
            let resolved = self
                .resolver
                .resolve(&entry.source)
                .unwrap_or_else(|| entry.source.clone());
            entry.device = Some(resolved);
        }
        entry.device()
    }

    /// Replaces an `auto` or missing type by the probed one. Runs once.
    pub fn interpret_type(&mut self, idx: usize) {
        if self.entries[idx].type_resolved {
            return;
        }
        self.entries[idx].type_resolved = true;

        match self.entries[idx].fstype.as_deref() {
            Some(t) if t != "auto" => return,
            _ => {}
        }

        let device = self.device(idx).to_string();
        self.entries[idx].fstype = self.probe.probe(&device);
    }

    /// Type the checker is chosen for.
    pub fn effective_type(&mut self, idx: usize) -> String {
        self.interpret_type(idx);
        match self.entries[idx].fstype.as_deref() {
            Some(t) if t != "auto" => t.to_string(),
            _ => self
                .filter
                .forced_type()
                .unwrap_or(self.default_type.as_str())
                .to_string(),
        }
    }

    /// Network, pseudo and swap filesystems, plus the built-in ignore list.
    pub fn is_ignored_type(&self, idx: usize) -> bool {
        let Some(t) = self.entries[idx].fstype.as_deref() else {
            return false;
        };
        fstypes::is_netfs(t)
            || fstypes::is_pseudofs(t)
            || fstypes::is_swap(t)
            || fstypes::is_ignored_type(t)
    }

    fn has_disk(&self, idx: usize) -> bool {
        match self.entries[idx].fstype.as_deref() {
            Some(t) => !fstypes::is_netfs(t) && !fstypes::is_pseudofs(t),
            None => true,
        }
    }

    /// Whole disk of the entry, resolved and cached on first use.
    ///
    /// `None` for network and pseudo filesystems and for devices the
    /// topology cannot place. Failed lookups are retried on the next call.
    pub fn disk_of(&mut self, idx: usize, topology: &dyn DiskTopology) -> Option<DiskId> {
        if let Some(disk) = self.entries[idx].disk {
            return Some(disk);
        }
        if !self.has_disk(idx) {
            return None;
        }

        let device = self.device(idx).to_string();
        let disk = topology.whole_disk(&device).ok()?;
        let stacked = topology.count_slaves(disk).map(|n| n > 0).unwrap_or(false);

        let entry = &mut self.entries[idx];
        entry.disk = Some(disk);
        entry.stacked = stacked;
        Some(disk)
    }

    pub fn is_mounted(&mut self, idx: usize) -> bool {
        let device = self.device(idx).to_string();
        let source = &self.entries[idx].source;
        let mounted = self.mounts.is_mounted(source, &device);
        if mounted {
            crate::log_verbose!("{source} is mounted");
        } else {
            crate::log_verbose!("{source} is not mounted");
        }
        mounted
    }

    /// Whether the entry must never be checked.
    pub fn ignore(
        &mut self,
        idx: usize,
        locator: &CheckerLocator,
        topology: &dyn DiskTopology,
    ) -> bool {
        let device = self.device(idx).to_string();
        let entry = &self.entries[idx];

        if entry.passno == 0 {
            return true;
        }

        if entry.options.has("bind") {
            crate::log_warn!(
                "{}: skipping bad line in fstab: bind mount with nonzero fsck pass number",
                entry.display_target()
            );
            return true;
        }

        if !topology.is_block_device(&device) {
            if entry.options.has("nofail") {
                crate::log_verbose!("{device}: skipping nonexistent device");
                return true;
            }
            crate::log_verbose!(
                "{device}: nonexistent device (\"nofail\" fstab option may be used to skip this device)"
            );
        }

        self.interpret_type(idx);
        let entry = &self.entries[idx];

        if !self.filter.matches(entry.fstype.as_deref(), &entry.options) {
            return true;
        }

        let Some(fstype) = entry.fstype.as_deref() else {
            crate::log_verbose!("{device}: skipping unknown filesystem type");
            return true;
        };

        if self.is_ignored_type(idx) {
            return true;
        }

        if locator.find(fstype).is_none() {
            if fstypes::is_check_required(fstype) {
                crate::log_warn!(
                    "cannot check {device}: {} not found",
                    CheckerLocator::program_name(fstype)
                );
            }
            return true;
        }

        false
    }

    /// Entry for a device path, or failing that a mount target.
    pub fn lookup(&mut self, path: &str) -> Option<usize> {
        (0..self.entries.len())
            .find(|&idx| self.device(idx) == path)
            .or_else(|| {
                self.entries
                    .iter()
                    .position(|e| e.target.as_deref() == Some(path))
            })
    }

    /// Registers an ad-hoc entry for a device missing from the table.
    pub fn add_dummy(&mut self, device: &str) -> usize {
        self.entries.push(FsEntry::from_table(TableEntry::new(device)));
        self.entries.len() - 1
    }

    /// First entry mounted at `/`.
    pub fn find_root(&self) -> Option<usize> {
        self.entries.iter().position(FsEntry::is_root)
    }
}
