// SPDX-License-Identifier: MIT

use crate::disk::DiskId;

/// One row of the filesystem table, as handed over by the table reader.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TableEntry {
    /// Device spec: path, or a tag such as `UUID=...`.
    pub source: String,
    pub target: Option<String>,
    pub fstype: Option<String>,
    pub options: String,
    pub passno: u32,
}

impl TableEntry {
    pub fn new(source: impl Into<String>) -> Self {
        Self {
            source: source.into(),
            ..Default::default()
        }
    }

    pub fn with_target(mut self, target: impl Into<String>) -> Self {
        self.target = Some(target.into());
        self
    }

    pub fn with_fstype(mut self, fstype: impl Into<String>) -> Self {
        self.fstype = Some(fstype.into());
        self
    }

    pub fn with_options(mut self, options: impl Into<String>) -> Self {
        self.options = options.into();
        self
    }

    pub fn with_passno(mut self, passno: u32) -> Self {
        self.passno = passno;
        self
    }
}

/// Comma-separated mount option list.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MountOptions(String);

impl MountOptions {
    pub fn new(raw: impl Into<String>) -> Self {
        Self(raw.into())
    }

    /// Exact match against one comma-delimited item.
    pub fn has(&self, opt: &str) -> bool {
        self.iter().any(|o| o == opt)
    }

    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.0.split(',').filter(|o| !o.is_empty())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

/// A filesystem candidate for one scheduling run.
#[derive(Debug, Clone)]
pub struct FsEntry {
    pub source: String,
    pub target: Option<String>,
    pub fstype: Option<String>,
    pub options: MountOptions,
    pub passno: u32,

    pub(crate) device: Option<String>,
    pub(crate) type_resolved: bool,
    pub(crate) done: bool,
    pub(crate) disk: Option<DiskId>,
    pub(crate) stacked: bool,
}

impl FsEntry {
    pub fn from_table(row: TableEntry) -> Self {
        Self {
            source: row.source,
            target: row.target,
            fstype: row.fstype,
            options: MountOptions::new(row.options),
            passno: row.passno,
            device: None,
            type_resolved: false,
            done: false,
            disk: None,
            stacked: false,
        }
    }

    /// Resolved device path, falling back to the raw source until resolved.
    pub fn device(&self) -> &str {
        self.device.as_deref().unwrap_or(&self.source)
    }

    /// Target for display purposes, the device when there is none.
    pub fn display_target(&self) -> &str {
        self.target.as_deref().unwrap_or_else(|| self.device())
    }

    pub fn is_root(&self) -> bool {
        self.target.as_deref() == Some("/")
    }

    pub fn is_done(&self) -> bool {
        self.done
    }

    /// Marks the entry as dispatched or filtered out. Repeated calls are no-ops.
    pub fn set_done(&mut self) {
        self.done = true;
    }

    /// Cached whole-disk identity, if it has been resolved.
    pub fn disk(&self) -> Option<DiskId> {
        self.disk
    }

    pub fn is_stacked(&self) -> bool {
        self.stacked
    }
}
