// SPDX-License-Identifier: MIT

//! Block device topology lookups.
//!
//! The scheduler needs three answers about a device: which whole disk it
//! lives on, whether that disk is composed from other block devices (md,
//! dm, ...), and whether it is rotational. On Linux all three come from
//! `/sys/dev/block/<major>:<minor>`.

use std::fs;
use std::io;
use std::os::unix::fs::{FileTypeExt, MetadataExt};
use std::path::{Path, PathBuf};

/// Whole-disk identity, a block device number.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct DiskId {
    pub major: u32,
    pub minor: u32,
}

impl DiskId {
    pub const fn new(major: u32, minor: u32) -> Self {
        Self { major, minor }
    }

    /// Splits a Linux `dev_t` the way glibc's `major()`/`minor()` do.
    pub fn from_rdev(rdev: u64) -> Self {
        let major = ((rdev >> 8) & 0xfff) | ((rdev >> 32) & !0xfff);
        let minor = (rdev & 0xff) | ((rdev >> 12) & !0xff);
        Self {
            major: major as u32,
            minor: minor as u32,
        }
    }
}

impl core::fmt::Display for DiskId {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "{}:{}", self.major, self.minor)
    }
}

impl core::str::FromStr for DiskId {
    type Err = io::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || io::Error::new(io::ErrorKind::InvalidData, format!("bad devno '{s}'"));
        let (maj, min) = s.trim().split_once(':').ok_or_else(invalid)?;
        Ok(DiskId {
            major: maj.parse().map_err(|_| invalid())?,
            minor: min.parse().map_err(|_| invalid())?,
        })
    }
}

/// Oracle over the host block device topology.
pub trait DiskTopology {
    /// Whole disk owning `device`.
    fn whole_disk(&self, device: &str) -> io::Result<DiskId>;

    /// Number of block devices `disk` is composed from.
    fn count_slaves(&self, disk: DiskId) -> io::Result<usize>;

    fn is_rotational(&self, disk: DiskId) -> io::Result<bool>;

    /// Kernel name of the disk, e.g. `sda`.
    fn disk_name(&self, disk: DiskId) -> io::Result<String>;

    fn is_block_device(&self, device: &str) -> bool {
        fs::metadata(device)
            .map(|m| m.file_type().is_block_device())
            .unwrap_or(false)
    }
}

/// [`DiskTopology`] backed by sysfs.
#[derive(Debug, Clone)]
pub struct SysfsTopology {
    root: PathBuf,
}

impl Default for SysfsTopology {
    fn default() -> Self {
        Self::with_root("/sys")
    }
}

impl SysfsTopology {
    pub fn with_root(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    fn devno_dir(&self, disk: DiskId) -> PathBuf {
        self.root.join("dev/block").join(disk.to_string())
    }

    /// Maps a partition devno to its parent disk; whole disks map to themselves.
    pub fn whole_disk_of(&self, devno: DiskId) -> io::Result<DiskId> {
        let dir = fs::canonicalize(self.devno_dir(devno))?;
        if !dir.join("partition").exists() {
            return Ok(devno);
        }
        let parent = dir
            .parent()
            .ok_or_else(|| io::Error::new(io::ErrorKind::NotFound, "partition without parent"))?;
        read_devno(&parent.join("dev"))
    }
}

fn read_devno(path: &Path) -> io::Result<DiskId> {
    fs::read_to_string(path)?.parse()
}

impl DiskTopology for SysfsTopology {
    fn whole_disk(&self, device: &str) -> io::Result<DiskId> {
        let meta = fs::metadata(device)?;
        if !meta.file_type().is_block_device() {
            return Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                format!("{device}: not a block device"),
            ));
        }
        self.whole_disk_of(DiskId::from_rdev(meta.rdev()))
    }

    fn count_slaves(&self, disk: DiskId) -> io::Result<usize> {
        let mut count = 0;
        for dent in fs::read_dir(self.devno_dir(disk).join("slaves"))? {
            let dent = dent?;
            let ft = dent.file_type()?;
            if ft.is_symlink() || ft.is_file() {
                count += 1;
            }
        }
        Ok(count)
    }

    fn is_rotational(&self, disk: DiskId) -> io::Result<bool> {
        let path = self.devno_dir(disk).join("queue/rotational");
        let raw = fs::read_to_string(&path)?;
        let value: i32 = raw.trim().parse().map_err(|_| {
            io::Error::new(
                io::ErrorKind::InvalidData,
                format!("parse error: {}", path.display()),
            )
        })?;
        Ok(value != 0)
    }

    fn disk_name(&self, disk: DiskId) -> io::Result<String> {
        let dir = fs::canonicalize(self.devno_dir(disk))?;
        dir.file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .ok_or_else(|| io::Error::new(io::ErrorKind::NotFound, "no disk name"))
    }
}
