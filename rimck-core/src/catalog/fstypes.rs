// SPDX-License-Identifier: MIT

/// Types used when neither the table nor `-t` names one.
pub const DEFAULT_FSTYPE: &str = "ext2";

/// Never checked, whatever the table says.
pub const IGNORED_TYPES: &[&str] = &["ignore", "iso9660", "sw"];

/// Types whose missing checker deserves a loud warning.
pub const REALLY_WANTED: &[&str] = &["minix", "ext2", "ext3", "ext4", "ext4dev", "jfs", "reiserfs"];

// Sorted, searched with binary_search.
const PSEUDO_TYPES: &[&str] = &[
    "anon_inodefs",
    "autofs",
    "bdev",
    "binfmt_misc",
    "cgroup",
    "cgroup2",
    "configfs",
    "cpuset",
    "debugfs",
    "devfs",
    "devpts",
    "devtmpfs",
    "dlmfs",
    "efivarfs",
    "fuse.gvfs-fuse-daemon",
    "fusectl",
    "hugetlbfs",
    "mqueue",
    "nfsd",
    "none",
    "pipefs",
    "proc",
    "pstore",
    "ramfs",
    "rootfs",
    "rpc_pipefs",
    "securityfs",
    "sockfs",
    "spufs",
    "sysfs",
    "tmpfs",
];

pub fn is_check_required(fstype: &str) -> bool {
    REALLY_WANTED.contains(&fstype)
}

pub fn is_ignored_type(fstype: &str) -> bool {
    IGNORED_TYPES.contains(&fstype)
}

pub fn is_pseudofs(fstype: &str) -> bool {
    PSEUDO_TYPES.binary_search(&fstype).is_ok()
}

pub fn is_netfs(fstype: &str) -> bool {
    matches!(fstype, "cifs" | "smbfs" | "afs" | "ncpfs")
        || fstype.starts_with("nfs")
        || fstype.starts_with("9p")
}

pub fn is_swap(fstype: &str) -> bool {
    fstype == "swap"
}
